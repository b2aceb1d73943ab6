use serde::Serialize;
use tally_core::merge::sort_for_display;
use tally_core::sync::DownloadReport;

use crate::commands::common::{
    confirm, format_optional_timestamp, format_sync_timestamp, open_engine, print_json,
    resolve_sync_config, CommandContext,
};
use crate::error::CliError;

const PREVIEW_ROWS: usize = 20;

#[derive(Debug, Serialize)]
struct PreviewView<'a> {
    record_count: usize,
    #[serde(flatten)]
    report: &'a DownloadReport,
}

pub async fn run_pull(
    context: &CommandContext,
    days: Option<usize>,
    replace: bool,
    yes: bool,
    as_json: bool,
) -> Result<(), CliError> {
    let config = resolve_sync_config(&context.profile_name)?;
    let engine = open_engine(context, &config)?;

    if !replace {
        let mut report = engine.sync_down(days).await?;
        if as_json {
            return print_json(&PreviewView {
                record_count: report.record_count(),
                report: &report,
            });
        }
        sort_for_display(&mut report.records);
        print_preview(&report);
        return Ok(());
    }

    if !yes && !confirm("Replace the local ledger with the remote copy?")? {
        return Err(CliError::Cancelled);
    }
    let ledger = context.ledger();
    let report = engine.pull_replace(&ledger).await?;
    if as_json {
        return print_json(&report);
    }
    println!(
        "Replaced local ledger with {} records from {} files",
        report.records, report.files
    );
    if report.settings_applied {
        println!("Applied remote settings");
    }
    println!("Last sync: {}", format_optional_timestamp(report.last_sync_at));
    Ok(())
}

fn print_preview(report: &DownloadReport) {
    let days = report
        .days
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>();
    println!(
        "Remote holds {} records across {} days{}",
        report.record_count(),
        days.len(),
        if report.has_more { " (older days not fetched)" } else { "" }
    );
    if !days.is_empty() {
        println!("Days: {}", days.join(", "));
    }
    for record in report.records.iter().take(PREVIEW_ROWS) {
        println!(
            "{}  {:>10}  {}  {}",
            format_sync_timestamp(record.date),
            record.amount.to_string(),
            record.category,
            record.note.as_deref().unwrap_or("")
        );
    }
    if report.record_count() > PREVIEW_ROWS {
        println!("... {} more", report.record_count() - PREVIEW_ROWS);
    }
    println!("Nothing local was changed; pass --replace to overwrite the local ledger");
}
