use tally_core::sync::UploadReport;

use crate::commands::common::{
    format_optional_timestamp, open_engine, print_json, resolve_sync_config, CommandContext,
};
use crate::error::CliError;

pub async fn run_push(
    context: &CommandContext,
    per_file: bool,
    as_json: bool,
) -> Result<(), CliError> {
    let config = resolve_sync_config(&context.profile_name)?;
    let engine = open_engine(context, &config)?;
    let ledger = context.ledger();

    let report = if per_file {
        engine.sync_up(&ledger).await?
    } else {
        engine.sync_up_atomic(&ledger).await?
    };

    if as_json {
        return print_json(&report);
    }
    print_upload_summary(&report);
    Ok(())
}

pub fn print_upload_summary(report: &UploadReport) {
    if report.attempted() == 0 {
        println!("Remote already up to date ({} files unchanged)", report.unchanged);
    } else {
        println!(
            "Uploaded {}, deleted {}, unchanged {}",
            report.uploaded, report.deleted, report.unchanged
        );
    }
    if let Some(commit) = report.commit.as_deref() {
        println!("Commit: {commit}");
    }
    for failure in &report.failures {
        eprintln!("Failed {} [{}]: {}", failure.path, failure.kind, failure.message);
    }
    if report.is_partial() {
        eprintln!("Push was partial; run it again to retry the failed files");
    }
    println!("Last sync: {}", format_optional_timestamp(report.last_sync_at));
}
