use std::env;
use std::io::{self, BufRead, IsTerminal, Write};
use std::path::PathBuf;

use serde::Serialize;
use tally_core::checkpoint::JsonCheckpointStore;
use tally_core::config::{
    SyncConfig, ENV_API_BASE_URL, ENV_BRANCH, ENV_DIRECTORY, ENV_REPOSITORY, ENV_TOKEN,
};
use tally_core::hash_store::JsonHashStore;
use tally_core::ledger::JsonFileLedger;
use tally_core::remote::GithubClient;
use tally_core::util::{normalize_text_option, unix_millis_now};
use tally_core::SyncEngine;

use crate::auth::TokenStore;
use crate::config_profiles::{CliProfile, CliProfilesConfig};
use crate::error::CliError;

const ENV_LEDGER_PATH: &str = "TALLY_LEDGER_PATH";
const ENV_STATE_DIR: &str = "TALLY_STATE_DIR";

/// Global options shared by every command.
#[derive(Debug, Clone)]
pub struct CommandContext {
    pub profile_name: String,
    pub ledger_path: PathBuf,
    pub state_dir: PathBuf,
}

impl CommandContext {
    pub fn resolve(
        profile: Option<&str>,
        ledger: Option<PathBuf>,
        state_dir: Option<PathBuf>,
    ) -> Result<Self, CliError> {
        let config = CliProfilesConfig::load().map_err(CliError::Config)?;
        let profile_name = config.resolve_profile_name(profile);
        let ledger_path = match ledger.or_else(|| env::var_os(ENV_LEDGER_PATH).map(PathBuf::from))
        {
            Some(path) => path,
            None => default_data_dir()?.join("ledger.json"),
        };
        let state_dir = match state_dir.or_else(|| env::var_os(ENV_STATE_DIR).map(PathBuf::from)) {
            Some(path) => path,
            None => default_data_dir()?.join("state").join(&profile_name),
        };
        Ok(Self {
            profile_name,
            ledger_path,
            state_dir,
        })
    }

    pub fn ledger(&self) -> JsonFileLedger {
        JsonFileLedger::new(&self.ledger_path)
    }
}

pub fn default_data_dir() -> Result<PathBuf, CliError> {
    dirs::data_dir()
        .map(|dir| dir.join("tally"))
        .ok_or_else(|| CliError::Config("Failed to resolve CLI data directory".to_string()))
}

/// Effective sync configuration: environment first, then the profile, with
/// the token falling back to the keychain.
pub fn resolve_sync_config(profile_name: &str) -> Result<SyncConfig, CliError> {
    let config = CliProfilesConfig::load().map_err(CliError::Config)?;
    resolve_sync_config_with(
        profile_name,
        config.profile(profile_name),
        |key| env::var(key).ok(),
        || TokenStore::new(profile_name).load(),
    )
}

pub fn resolve_sync_config_with(
    profile_name: &str,
    profile: Option<&CliProfile>,
    lookup: impl Fn(&str) -> Option<String>,
    stored_token: impl FnOnce() -> Result<Option<String>, CliError>,
) -> Result<SyncConfig, CliError> {
    let from_env = |key: &str| normalize_text_option(lookup(key));

    let repository = from_env(ENV_REPOSITORY)
        .or_else(|| profile.and_then(|profile| profile.repository.clone()))
        .ok_or(CliError::SyncNotConfigured)?;
    let token = match from_env(ENV_TOKEN) {
        Some(token) => token,
        None => stored_token()?.ok_or_else(|| CliError::MissingToken(profile_name.to_string()))?,
    };

    let mut config = SyncConfig::new(token, &repository)?;
    if let Some(branch) =
        from_env(ENV_BRANCH).or_else(|| profile.and_then(|profile| profile.branch.clone()))
    {
        config = config.with_branch(&branch)?;
    }
    if let Some(directory) = lookup(ENV_DIRECTORY)
        .or_else(|| profile.and_then(|profile| profile.directory.clone()))
    {
        config = config.with_directory(&directory);
    }
    if let Some(url) =
        from_env(ENV_API_BASE_URL).or_else(|| profile.and_then(|profile| profile.api_base_url.clone()))
    {
        config = config.with_api_base_url(&url)?;
    }
    Ok(config)
}

pub fn open_engine(
    context: &CommandContext,
    config: &SyncConfig,
) -> Result<SyncEngine<GithubClient>, CliError> {
    let client = GithubClient::new(config)?;
    tracing::debug!(
        "Using {} on branch {} (state in {})",
        config.repository,
        config.branch,
        context.state_dir.display()
    );
    Ok(SyncEngine::new(
        client,
        JsonHashStore::in_dir(&context.state_dir),
        JsonCheckpointStore::in_dir(&context.state_dir),
    )
    .with_directory(&config.directory))
}

pub fn print_json(value: &impl Serialize) -> Result<(), CliError> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

pub fn format_sync_timestamp(timestamp_ms: i64) -> String {
    chrono::DateTime::from_timestamp_millis(timestamp_ms).map_or_else(
        || timestamp_ms.to_string(),
        |date_time| date_time.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
    )
}

pub fn format_optional_timestamp(timestamp_ms: Option<i64>) -> String {
    timestamp_ms.map_or_else(
        || "never".to_string(),
        |timestamp_ms| {
            format!(
                "{} ({})",
                format_sync_timestamp(timestamp_ms),
                format_relative_time(timestamp_ms, unix_millis_now())
            )
        },
    )
}

pub fn format_relative_time(timestamp_ms: i64, now_ms: i64) -> String {
    let diff = now_ms.saturating_sub(timestamp_ms);
    let minute = 60_000;
    let hour = 60 * minute;
    let day = 24 * hour;
    let week = 7 * day;
    let month = 30 * day;
    let year = 365 * day;

    if diff < minute {
        "just now".to_string()
    } else if diff < hour {
        format!("{}m ago", diff / minute)
    } else if diff < day {
        format!("{}h ago", diff / hour)
    } else if diff < week {
        format!("{}d ago", diff / day)
    } else if diff < month {
        format!("{}w ago", diff / week)
    } else if diff < year {
        format!("{}mo ago", diff / month)
    } else {
        format!("{}y ago", diff / year)
    }
}

/// Ask a yes/no question on the terminal; anything but `y`/`yes` is a no.
pub fn confirm(prompt: &str) -> Result<bool, CliError> {
    if !io::stdin().is_terminal() {
        return Ok(false);
    }
    print!("{prompt} [y/N] ");
    io::stdout().flush()?;
    let mut answer = String::new();
    io::stdin().lock().read_line(&mut answer)?;
    Ok(is_affirmative(&answer))
}

pub fn is_affirmative(answer: &str) -> bool {
    matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes")
}
