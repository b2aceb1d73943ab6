use serde::Serialize;
use tally_core::ledger::LocalLedger;
use tally_core::sync::{DirectionReport, SyncDirection};

use crate::commands::common::{
    format_optional_timestamp, open_engine, print_json, resolve_sync_config, CommandContext,
};
use crate::error::CliError;

#[derive(Debug, Serialize)]
struct StatusView<'a> {
    profile: &'a str,
    repository: String,
    branch: &'a str,
    records: usize,
    #[serde(flatten)]
    report: DirectionReport,
}

pub async fn run_status(context: &CommandContext, as_json: bool) -> Result<(), CliError> {
    let config = resolve_sync_config(&context.profile_name)?;
    let engine = open_engine(context, &config)?;
    let ledger = context.ledger();

    let records = ledger.all_records()?.len();
    let has_local_changes = engine.has_local_changes(&ledger)?;
    let report = engine.determine_sync_direction(has_local_changes).await?;

    if as_json {
        return print_json(&StatusView {
            profile: &context.profile_name,
            repository: config.repository.to_string(),
            branch: &config.branch,
            records,
            report,
        });
    }

    println!("Profile:       {}", context.profile_name);
    println!("Repository:    {} ({})", config.repository, config.branch);
    println!("Local records: {records}");
    println!("Last sync:     {}", format_optional_timestamp(report.last_sync_at));
    println!("Remote commit: {}", format_optional_timestamp(report.remote_time));
    println!(
        "Local changes: {}",
        if report.has_local_changes { "yes" } else { "no" }
    );
    println!("Next step:     {}", direction_hint(report.direction));
    Ok(())
}

pub const fn direction_hint(direction: SyncDirection) -> &'static str {
    match direction {
        SyncDirection::InSync => "nothing to do",
        SyncDirection::Push => "push local changes (`tally push`)",
        SyncDirection::Pull => "pull remote changes (`tally pull --replace`)",
        SyncDirection::Conflict => "both sides changed; merge them (`tally merge`)",
    }
}
