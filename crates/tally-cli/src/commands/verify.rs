use crate::commands::common::{open_engine, print_json, resolve_sync_config, CommandContext};
use crate::error::CliError;

/// Fails with a permission error unless the token can push.
pub async fn run_verify(context: &CommandContext, as_json: bool) -> Result<(), CliError> {
    let config = resolve_sync_config(&context.profile_name)?;
    let engine = open_engine(context, &config)?;
    let access = engine.verify_access().await?;

    if as_json {
        return print_json(&access);
    }

    println!(
        "Authenticated as {} with '{}' access to {}",
        access.login, access.permission, config.repository
    );
    Ok(())
}
