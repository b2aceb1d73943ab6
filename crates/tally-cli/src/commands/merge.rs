use tally_core::merge::ConflictAnalysis;

use crate::commands::common::{
    confirm, format_optional_timestamp, open_engine, print_json, resolve_sync_config,
    CommandContext,
};
use crate::commands::push::print_upload_summary;
use crate::error::CliError;

pub async fn run_merge(context: &CommandContext, yes: bool, as_json: bool) -> Result<(), CliError> {
    let config = resolve_sync_config(&context.profile_name)?;
    let engine = open_engine(context, &config)?;
    let ledger = context.ledger();

    let analysis = engine.analyze_conflicts(&ledger).await?;
    if !as_json {
        print_analysis(&analysis);
    }

    if analysis.overwrites_local()
        && !yes
        && !confirm("Remote changes will overwrite local records. Continue?")?
    {
        return Err(CliError::Cancelled);
    }

    let report = engine.smart_merge(&ledger).await?;
    if as_json {
        return print_json(&report);
    }
    println!(
        "Merged: {} new and {} updated from remote, {} records total",
        report.new_from_remote, report.updated_from_remote, report.total_records
    );
    print_upload_summary(&report.upload);
    println!("Last sync: {}", format_optional_timestamp(report.last_sync_at));
    Ok(())
}

pub fn print_analysis(analysis: &ConflictAnalysis) {
    println!("Remote wins:        {}", analysis.remote_wins);
    println!("Local wins:         {}", analysis.local_wins);
    println!("Local only:         {}", analysis.local_only);
    println!("New from remote:    {}", analysis.new_from_remote);
    println!("Deleted locally:    {}", analysis.deleted_locally);
}
