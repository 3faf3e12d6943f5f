use crate::infra::{
    file_service, parse_destination, parse_now, parse_scope, run_configs, DestinationScope,
};
use chrono::{DateTime, Local};
use clap::Args;
use lab_match::config::AppConfig;
use lab_match::error::AppError;
use lab_match::telemetry;
use lab_match::workflows::matching::{DestinationKind, RunSummary, StoredRun};
use lab_match::workflows::proposals::{export_csv, proposals_from_run};
use std::path::PathBuf;

#[derive(Args, Debug)]
pub(crate) struct MatchArgs {
    /// Destination to allocate: primary, secondary or all
    #[arg(value_parser = parse_scope, default_value = "all")]
    pub(crate) scope: DestinationScope,
    /// Override the configured JSON store
    #[arg(long)]
    pub(crate) store: Option<PathBuf>,
    /// Evaluate the run as of this RFC 3339 instant (defaults to now)
    #[arg(long, value_parser = parse_now)]
    pub(crate) now: Option<DateTime<Local>>,
}

#[derive(Args, Debug)]
pub(crate) struct LatestArgs {
    /// Destination whose results node is read
    #[arg(value_parser = parse_destination)]
    pub(crate) destination: DestinationKind,
    /// Override the configured JSON store
    #[arg(long)]
    pub(crate) store: Option<PathBuf>,
}

#[derive(Args, Debug)]
pub(crate) struct ExportArgs {
    /// Destination whose latest run is exported
    #[arg(value_parser = parse_destination)]
    pub(crate) destination: DestinationKind,
    /// CSV file to write
    #[arg(long)]
    pub(crate) out: PathBuf,
    /// Override the configured JSON store
    #[arg(long)]
    pub(crate) store: Option<PathBuf>,
}

pub(crate) fn run_match(args: MatchArgs) -> Result<(), AppError> {
    let MatchArgs { scope, store, now } = args;
    let config = AppConfig::load()?;
    telemetry::init(&config.telemetry)?;

    let configs = run_configs(&config.matching, &scope.kinds())?;
    let service = file_service(&config.matching, store);
    let now = now.unwrap_or_else(Local::now);
    let reports = service.run_all(&configs, now)?;

    for report in &reports {
        render_summary(&report.summary());
    }
    Ok(())
}

pub(crate) fn run_latest(args: LatestArgs) -> Result<(), AppError> {
    let config = AppConfig::load()?;
    let run = latest_run(&config, args.destination, args.store)?;
    let json = serde_json::to_string_pretty(&run).map_err(std::io::Error::from)?;
    println!("{json}");
    Ok(())
}

pub(crate) fn run_export(args: ExportArgs) -> Result<(), AppError> {
    let ExportArgs {
        destination,
        out,
        store,
    } = args;
    let config = AppConfig::load()?;
    let run = latest_run(&config, destination, store)?;
    let updates = proposals_from_run(&run);
    export_csv(&out, &updates)?;

    println!(
        "Exported {} proposal updates from run {} to {}",
        updates.len(),
        run.run_id,
        out.display()
    );
    Ok(())
}

fn latest_run(
    config: &AppConfig,
    destination: DestinationKind,
    store: Option<PathBuf>,
) -> Result<StoredRun, AppError> {
    let node = destination.destination().results_node;
    file_service(&config.matching, store)
        .latest(&node)?
        .ok_or(AppError::RunNotFound(node))
}

fn render_summary(summary: &RunSummary) {
    println!("Matching run {} ({})", summary.run_id, summary.destination);
    println!(
        "  Requests: {} total, {} eligible",
        summary.requests_total, summary.requests_eligible
    );
    println!(
        "  Labs: {} for this audience, {} for others",
        summary.labs_accepted, summary.labs_rejected
    );
    println!(
        "  Proposals: {} assigned, {} cleared, {} seats left",
        summary.assigned, summary.cleared, summary.seats_left
    );

    let phases = &summary.phase_counts;
    println!("  By phase:");
    for (label, count) in [
        ("repair", phases.repair),
        ("low demand", phases.low_demand),
        ("high demand", phases.high_demand),
        ("fallback", phases.fallback),
        ("no availability", phases.no_availability),
    ] {
        println!("    {label:<16} {count}");
    }

    if !summary.anomalies.is_empty() {
        println!("  Skipped input:");
        for anomaly in &summary.anomalies {
            println!("    - {anomaly}");
        }
    }
}
