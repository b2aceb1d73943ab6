//! Persistent CLI profile configuration.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tally_core::util::{normalize_text_option, write_file_atomically};

const CONFIG_FILE_NAME: &str = "cli-config.json";
pub const ENV_PROFILE: &str = "TALLY_PROFILE";
pub const DEFAULT_PROFILE: &str = "default";

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct CliProfilesConfig {
    #[serde(default = "default_config_version")]
    pub version: u32,
    #[serde(default)]
    pub active_profile: Option<String>,
    #[serde(default)]
    pub profiles: BTreeMap<String, CliProfile>,
}

/// Where a profile syncs to. The token is kept in the OS keychain, not here.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct CliProfile {
    #[serde(default)]
    pub repository: Option<String>,
    #[serde(default)]
    pub branch: Option<String>,
    #[serde(default)]
    pub directory: Option<String>,
    #[serde(default)]
    pub api_base_url: Option<String>,
}

const fn default_config_version() -> u32 {
    1
}

pub fn tally_config_dir() -> Result<PathBuf, String> {
    dirs::config_dir()
        .map(|dir| dir.join("tally"))
        .ok_or_else(|| "Failed to resolve CLI config directory".to_string())
}

pub fn default_config_path() -> Result<PathBuf, String> {
    Ok(tally_config_dir()?.join(CONFIG_FILE_NAME))
}

pub fn normalize_profile_name(value: Option<&str>) -> Option<String> {
    let value = value?;
    let value = value.trim();
    if value.is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}

impl CliProfilesConfig {
    pub fn load() -> Result<Self, String> {
        Self::load_from_path(&default_config_path()?)
    }

    pub fn load_from_path(path: &Path) -> Result<Self, String> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let raw = std::fs::read_to_string(path)
            .map_err(|error| format!("Failed to read config at {}: {}", path.display(), error))?;
        let mut config = serde_json::from_str::<Self>(&raw)
            .map_err(|error| format!("Failed to parse config at {}: {}", path.display(), error))?;
        config.normalize();
        Ok(config)
    }

    pub fn save(&self) -> Result<PathBuf, String> {
        let path = default_config_path()?;
        self.save_to_path(&path)?;
        Ok(path)
    }

    pub fn save_to_path(&self, path: &Path) -> Result<(), String> {
        let mut normalized = self.clone();
        normalized.normalize();
        let mut serialized = serde_json::to_string_pretty(&normalized)
            .map_err(|error| format!("Failed to serialize config: {error}"))?;
        serialized.push('\n');
        write_file_atomically(path, serialized.as_bytes())
            .map_err(|error| format!("Failed to write config at {}: {error}", path.display()))
    }

    pub fn resolve_profile_name(&self, explicit: Option<&str>) -> String {
        self.resolve_profile_name_with(explicit, std::env::var(ENV_PROFILE).ok().as_deref())
    }

    fn resolve_profile_name_with(&self, explicit: Option<&str>, from_env: Option<&str>) -> String {
        normalize_profile_name(explicit)
            .or_else(|| normalize_profile_name(from_env))
            .or_else(|| normalize_profile_name(self.active_profile.as_deref()))
            .unwrap_or_else(|| DEFAULT_PROFILE.to_string())
    }

    pub fn profile(&self, name: &str) -> Option<&CliProfile> {
        self.profiles.get(name)
    }

    pub fn profile_mut_or_default(&mut self, name: &str) -> &mut CliProfile {
        self.profiles.entry(name.to_string()).or_default()
    }

    /// Drop a profile; the active profile is unset if it was this one.
    pub fn remove_profile(&mut self, name: &str) -> Option<CliProfile> {
        if self.active_profile.as_deref() == Some(name) {
            self.active_profile = None;
        }
        self.profiles.remove(name)
    }

    fn normalize(&mut self) {
        self.active_profile = normalize_profile_name(self.active_profile.as_deref());
        for profile in self.profiles.values_mut() {
            profile.normalize();
        }
    }
}

impl CliProfile {
    fn normalize(&mut self) {
        self.repository = normalize_text_option(self.repository.take());
        self.branch = normalize_text_option(self.branch.take());
        self.api_base_url = normalize_text_option(self.api_base_url.take());
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn normalize_profile_name_rejects_empty() {
        assert_eq!(normalize_profile_name(None), None);
        assert_eq!(normalize_profile_name(Some(" ")), None);
    }

    #[test]
    fn config_roundtrip_preserves_profiles() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);

        let mut config = CliProfilesConfig {
            version: 1,
            active_profile: Some(" default ".to_string()),
            profiles: BTreeMap::new(),
        };
        config.profiles.insert(
            "default".to_string(),
            CliProfile {
                repository: Some(" octo/ledger ".to_string()),
                branch: Some("   ".to_string()),
                directory: Some("expenses".to_string()),
                api_base_url: None,
            },
        );

        config.save_to_path(&path).unwrap();
        let loaded = CliProfilesConfig::load_from_path(&path).unwrap();
        assert_eq!(loaded.active_profile.as_deref(), Some("default"));
        let profile = loaded.profile("default").unwrap();
        assert_eq!(profile.repository.as_deref(), Some("octo/ledger"));
        assert_eq!(profile.branch, None);
        assert_eq!(profile.directory.as_deref(), Some("expenses"));
    }

    #[test]
    fn missing_config_file_loads_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let loaded = CliProfilesConfig::load_from_path(&dir.path().join("absent.json")).unwrap();
        assert_eq!(loaded, CliProfilesConfig::default());
    }

    #[test]
    fn resolve_profile_name_prefers_explicit_then_env_then_active() {
        let config = CliProfilesConfig {
            version: 1,
            active_profile: Some("work".to_string()),
            profiles: BTreeMap::new(),
        };
        assert_eq!(
            config.resolve_profile_name_with(Some("phone"), Some("env")),
            "phone"
        );
        assert_eq!(config.resolve_profile_name_with(None, Some("env")), "env");
        assert_eq!(config.resolve_profile_name_with(None, None), "work");
        assert_eq!(
            CliProfilesConfig::default().resolve_profile_name_with(None, None),
            DEFAULT_PROFILE
        );
    }

    #[test]
    fn removing_active_profile_unsets_it() {
        let mut config = CliProfilesConfig::default();
        config.profile_mut_or_default("work").repository = Some("octo/work".to_string());
        config.active_profile = Some("work".to_string());

        assert!(config.remove_profile("work").is_some());
        assert_eq!(config.active_profile, None);
        assert!(config.profile("work").is_none());
    }
}
