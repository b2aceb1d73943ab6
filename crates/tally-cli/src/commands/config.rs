use serde::Serialize;
use tally_core::config::{normalize_branch, normalize_directory, RepositoryId};
use tally_core::util::{is_http_url, normalize_text_option};

use crate::auth::TokenStore;
use crate::cli::ConfigCommands;
use crate::commands::common::{print_json, resolve_sync_config, CommandContext};
use crate::config_profiles::CliProfilesConfig;
use crate::error::CliError;

pub fn run_config(command: ConfigCommands, context: &CommandContext) -> Result<(), CliError> {
    match command {
        ConfigCommands::Init {
            repo,
            branch,
            directory,
            api_base_url,
            token,
            no_activate,
        } => run_config_init(
            context,
            &ProfileInput {
                repo,
                branch,
                directory,
                api_base_url,
                token,
            },
            no_activate,
        ),
        ConfigCommands::Show => run_config_show(context),
        ConfigCommands::Clear => run_config_clear(context),
    }
}

pub struct ProfileInput {
    pub repo: String,
    pub branch: Option<String>,
    pub directory: Option<String>,
    pub api_base_url: Option<String>,
    pub token: Option<String>,
}

/// Validate `config init` arguments before anything is written.
pub fn validate_profile_input(input: &ProfileInput) -> Result<(), CliError> {
    input.repo.parse::<RepositoryId>()?;
    if let Some(branch) = input.branch.as_deref() {
        normalize_branch(branch)?;
    }
    if let Some(url) = normalize_text_option(input.api_base_url.clone()) {
        if !is_http_url(&url) {
            return Err(CliError::Config(
                "--api-base-url must include http:// or https://".to_string(),
            ));
        }
    }
    Ok(())
}

fn run_config_init(
    context: &CommandContext,
    input: &ProfileInput,
    no_activate: bool,
) -> Result<(), CliError> {
    validate_profile_input(input)?;

    let mut config = CliProfilesConfig::load().map_err(CliError::Config)?;
    let profile_name = context.profile_name.clone();
    let profile = config.profile_mut_or_default(&profile_name);
    profile.repository = Some(input.repo.parse::<RepositoryId>()?.to_string());
    if let Some(branch) = input.branch.as_deref() {
        profile.branch = Some(normalize_branch(branch)?);
    }
    if let Some(directory) = input.directory.as_deref() {
        profile.directory = Some(normalize_directory(directory));
    }
    if let Some(url) = normalize_text_option(input.api_base_url.clone()) {
        profile.api_base_url = Some(url);
    }

    if !no_activate {
        config.active_profile = Some(profile_name.clone());
    }
    let path = config.save().map_err(CliError::Config)?;

    if let Some(token) = normalize_text_option(input.token.clone()) {
        TokenStore::new(&profile_name).save(&token)?;
        println!("Token stored in the system keychain");
    }

    println!("Saved profile '{profile_name}' to {}", path.display());
    if !no_activate {
        println!("Active profile: {profile_name}");
    }
    Ok(())
}

#[derive(Debug, Serialize)]
struct ConfigView {
    profile: String,
    repository: String,
    branch: String,
    directory: String,
    api_base_url: String,
    token: &'static str,
    ledger: String,
    state_dir: String,
}

fn run_config_show(context: &CommandContext) -> Result<(), CliError> {
    let config = resolve_sync_config(&context.profile_name)?;
    print_json(&ConfigView {
        profile: context.profile_name.clone(),
        repository: config.repository.to_string(),
        branch: config.branch.clone(),
        directory: config.directory.clone(),
        api_base_url: config.api_base_url.clone(),
        token: "[REDACTED]",
        ledger: context.ledger_path.display().to_string(),
        state_dir: context.state_dir.display().to_string(),
    })
}

fn run_config_clear(context: &CommandContext) -> Result<(), CliError> {
    let mut config = CliProfilesConfig::load().map_err(CliError::Config)?;
    let removed = config.remove_profile(&context.profile_name).is_some();
    config.save().map_err(CliError::Config)?;
    TokenStore::new(&context.profile_name).clear()?;

    if removed {
        println!("Removed profile '{}'", context.profile_name);
    } else {
        println!(
            "Profile '{}' was not configured; cleared any stored token",
            context.profile_name
        );
    }
    Ok(())
}
