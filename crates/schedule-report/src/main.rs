use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use batching::bucket_by_week;
use chrono::NaiveDate;
use clap::Parser;
use schedule_report::sink::{format_summary, render_report, write_report, ReportFormat};
use schedule_report::{build_classifier, load_messages, Pipeline, ReportConfig, SourceOptions};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Classify a chat export of schedule requests into a weekly report.
#[derive(Parser, Debug)]
#[command(name = "schedule-report")]
#[command(version)]
struct Args {
    /// JSON array of exported messages
    #[arg(short, long)]
    input: PathBuf,

    /// Report file (.json for JSON, otherwise YAML). Printed to stdout when omitted.
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Keep messages on or after this local date (YYYY-MM-DD)
    #[arg(long)]
    since: Option<NaiveDate>,

    /// Keep messages on or before this local date (YYYY-MM-DD)
    #[arg(long)]
    until: Option<NaiveDate>,

    /// Upper bound on weeks classified at the same time
    #[arg(long)]
    max_concurrent: Option<usize>,

    /// Minutes east of UTC used to compute local dates
    #[arg(long, allow_hyphen_values = true)]
    utc_offset: Option<i32>,

    /// Print week ranges and message counts without calling the service
    #[arg(long)]
    dry_run: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let mut config = ReportConfig::load(args.config.as_deref())?;
    if let Some(n) = args.max_concurrent {
        config.max_concurrent_weeks = n;
    }
    if let Some(minutes) = args.utc_offset {
        config.utc_offset_minutes = minutes;
    }
    config
        .validate_offline()
        .map_err(|e| anyhow::anyhow!("invalid configuration: {e}"))?;

    if let (Some(since), Some(until)) = (args.since, args.until) {
        if since > until {
            bail!("--since {since} is after --until {until}");
        }
    }

    let options = SourceOptions {
        utc_offset_minutes: config.utc_offset_minutes,
        since: args.since,
        until: args.until,
    };
    let messages = load_messages(&args.input, &options)?;
    info!(
        input = %args.input.display(),
        messages = messages.len(),
        provider = %config.provider,
        model = %config.model,
        "Schedule report starting"
    );

    if args.dry_run {
        for bucket in bucket_by_week(messages) {
            println!("{}  {} message(s)", bucket.week_range(), bucket.messages().len());
        }
        return Ok(());
    }

    let classifier = build_classifier(&config).context("failed to set up classifier")?;
    let pipeline = Pipeline::from_config(&config, classifier);

    let cancel = pipeline.dispatcher().cancellation_token();
    tokio::spawn(cancel_on_ctrl_c(cancel));

    let outcome = pipeline.run(messages).await?;

    match &args.output {
        Some(path) => write_report(path, &outcome.report)?,
        None => print!("{}", render_report(&outcome.report, ReportFormat::Yaml)?),
    }
    eprintln!("{}", format_summary(&outcome.report.summary()));

    Ok(())
}

async fn cancel_on_ctrl_c(cancel: CancellationToken) {
    match tokio::signal::ctrl_c().await {
        Ok(()) => {
            warn!("Interrupt received, cancelling run");
            cancel.cancel();
        }
        Err(e) => warn!("Failed to listen for Ctrl-C: {e}"),
    }
}
