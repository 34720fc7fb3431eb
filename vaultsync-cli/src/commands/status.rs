//! `vaultsync status`: sync visibility for every tracked note.

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use serde::Serialize;
use tabled::{settings::Style, Table, Tabled};

use vaultsync_sync::status::{collect, format_datetime_age, StatusReport, SyncSignal, TrackedDocument};

use super::GlobalArgs;

/// Arguments for `vaultsync status`.
#[derive(Args, Debug)]
pub struct StatusArgs {
    /// Emit machine-readable JSON.
    #[arg(long)]
    pub json: bool,
}

impl StatusArgs {
    pub fn run(self, global: &GlobalArgs) -> Result<()> {
        let config = global.load(Default::default())?;
        let report = collect(&config)
            .with_context(|| format!("status failed for vault '{}'", config.vault.display()))?;

        if self.json {
            print_json(&report)?;
            return Ok(());
        }
        print_table(report);
        Ok(())
    }
}

#[derive(Serialize)]
struct StatusJson<'a> {
    summary: StatusSummaryJson<'a>,
    documents: Vec<DocumentJson<'a>>,
}

#[derive(Serialize)]
struct StatusSummaryJson<'a> {
    state_file: &'a std::path::Path,
    origin_tag: &'a str,
    never_synced: bool,
    tracked: usize,
    published: usize,
    pending: usize,
    assets: usize,
}

#[derive(Serialize)]
struct DocumentJson<'a> {
    #[serde(flatten)]
    document: &'a TrackedDocument,
    last_sync_age: String,
}

#[derive(Tabled)]
struct StatusTableRow {
    #[tabled(rename = "note")]
    source: String,
    #[tabled(rename = "output")]
    output: String,
    #[tabled(rename = "published")]
    published: &'static str,
    #[tabled(rename = "status")]
    status: String,
    #[tabled(rename = "last sync")]
    last_sync: String,
}

fn print_json(report: &StatusReport) -> Result<()> {
    let payload = StatusJson {
        summary: StatusSummaryJson {
            state_file: &report.state_file,
            origin_tag: &report.origin_tag,
            never_synced: report.never_synced,
            tracked: report.documents.len(),
            published: report.published(),
            pending: report.pending(),
            assets: report.assets,
        },
        documents: report
            .documents
            .iter()
            .map(|document| DocumentJson {
                document,
                last_sync_age: format_datetime_age(document.last_synced),
            })
            .collect(),
    };
    println!(
        "{}",
        serde_json::to_string_pretty(&payload).context("failed to serialize status JSON")?
    );
    Ok(())
}

fn print_table(report: StatusReport) {
    println!(
        "vaultsync v{} | {} tracked | {} published | {} assets | {} pending",
        env!("CARGO_PKG_VERSION"),
        report.documents.len(),
        report.published(),
        report.assets,
        report.pending(),
    );

    if report.never_synced {
        println!("Never synced. Run 'vaultsync sync' to publish the vault.");
        return;
    }
    if report.documents.is_empty() {
        println!("No notes tracked.");
        return;
    }

    let separator = "■".repeat(67).bright_black().to_string();
    println!("{separator}");
    println!(
        "Indicators: {} CURRENT  {} MODIFIED  {} OUTPUT MISSING  {} SOURCE MISSING",
        signal_indicator(SyncSignal::Current),
        signal_indicator(SyncSignal::Modified),
        signal_indicator(SyncSignal::OutputMissing),
        signal_indicator(SyncSignal::SourceMissing),
    );
    println!("{separator}");

    let pending = report.pending();
    let rows: Vec<StatusTableRow> = report
        .documents
        .into_iter()
        .map(|doc| StatusTableRow {
            source: doc.source.display().to_string(),
            output: if doc.published {
                doc.output.display().to_string()
            } else {
                "-".to_string()
            },
            published: if doc.published { "yes" } else { "no" },
            status: format!("{} {}", signal_indicator(doc.signal), signal_label(doc.signal)),
            last_sync: format_datetime_age(doc.last_synced),
        })
        .collect();
    let mut table = Table::new(rows);
    table.with(Style::rounded());
    println!("{table}");

    if pending > 0 {
        println!("Run 'vaultsync sync' to bring {pending} note(s) up to date.");
    }
}

fn signal_label(signal: SyncSignal) -> &'static str {
    match signal {
        SyncSignal::Current => "CURRENT",
        SyncSignal::Modified => "MODIFIED",
        SyncSignal::OutputMissing => "OUTPUT MISSING",
        SyncSignal::SourceMissing => "SOURCE MISSING",
    }
}

fn signal_indicator(signal: SyncSignal) -> String {
    match signal {
        SyncSignal::Current => "■".green().bold().to_string(),
        SyncSignal::Modified => "■".yellow().bold().to_string(),
        SyncSignal::OutputMissing => "■".red().bold().to_string(),
        SyncSignal::SourceMissing => "■".magenta().bold().to_string(),
    }
}
