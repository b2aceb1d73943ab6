use tally_core::sync::{SyncOutcome, SyncPolicy};

use crate::commands::common::{
    format_optional_timestamp, open_engine, print_json, resolve_sync_config, CommandContext,
};
use crate::commands::merge::print_analysis;
use crate::commands::push::print_upload_summary;
use crate::error::CliError;

pub async fn run_sync(
    context: &CommandContext,
    merge_on_conflict: bool,
    as_json: bool,
) -> Result<(), CliError> {
    let config = resolve_sync_config(&context.profile_name)?;
    let engine = open_engine(context, &config)?;
    let ledger = context.ledger();

    let outcome = engine
        .sync(&ledger, SyncPolicy { merge_on_conflict })
        .await?;

    if as_json {
        return print_json(&outcome);
    }

    match outcome {
        SyncOutcome::InSync { last_sync_at } => {
            println!("Already in sync (last sync {})", format_optional_timestamp(last_sync_at));
        }
        SyncOutcome::Pushed(report) => print_upload_summary(&report),
        SyncOutcome::Merged(report) => {
            println!(
                "Merged: {} new and {} updated from remote, {} records total",
                report.new_from_remote, report.updated_from_remote, report.total_records
            );
            print_upload_summary(&report.upload);
        }
        SyncOutcome::ConflictDetected(analysis) => {
            println!("Both the ledger and the remote changed since the last sync.");
            print_analysis(&analysis);
            println!("Run `tally merge` or `tally sync --merge-on-conflict` to reconcile.");
        }
    }
    Ok(())
}
