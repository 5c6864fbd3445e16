//! Billboard Compliance - console client
//!
//! Main entry point: analyze an image file, follow the report feed, and
//! review individual reports.

use anyhow::Context;
use billboard_compliance::{
    media_capture::MediaCaptureController,
    models::{ReportId, ReportSnapshot, ReportStatus},
    state::{AppConfig, AppState},
};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tokio::sync::broadcast::error::RecvError;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "billboard-compliance")]
#[command(about = "Billboard compliance capture and report client")]
struct Args {
    /// Compliance service URL (overrides COMPLIANCE_API_URL)
    #[arg(long)]
    api_url: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Check that the compliance service is reachable
    Health,
    /// Submit an image file for analysis
    Analyze {
        /// Path to a jpg/png/webp/gif image
        path: PathBuf,
    },
    /// Follow statistics and recent reports until Ctrl-C
    Watch {
        /// Polling interval (overrides FEED_POLL_INTERVAL_MS)
        #[arg(long)]
        interval_ms: Option<u64>,
    },
    /// Show one report
    Report { id: String },
    /// Change a report's review status (pending, approved, rejected, resolved)
    SetStatus { id: String, status: String },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "billboard_compliance=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();

    let mut config = AppConfig::from_env();
    if let Some(url) = args.api_url {
        config.api_url = url;
    }
    tracing::info!(
        api_url = %config.api_url,
        poll_interval_ms = config.poll_interval_ms,
        report_limit = config.report_limit,
        http_timeout_secs = ?config.http_timeout.map(|t| t.as_secs()),
        "Configuration loaded"
    );

    let state = AppState::new(config)?;

    let outcome = match args.command {
        Command::Health => health(&state).await,
        Command::Analyze { path } => analyze(&state, &path).await,
        Command::Watch { interval_ms } => watch(&state, interval_ms).await,
        Command::Report { id } => report(&state, &id).await,
        Command::SetStatus { id, status } => set_status(&state, &id, &status).await,
    };

    if let Err(e) = &outcome {
        tracing::error!(error = %e, "Command failed");
    }
    outcome
}

async fn health(state: &AppState) -> anyhow::Result<()> {
    if state.api.health_check().await? {
        println!("compliance service at {} is healthy", state.api.base_url());
        Ok(())
    } else {
        anyhow::bail!("compliance service at {} is unreachable", state.api.base_url())
    }
}

async fn analyze(state: &AppState, path: &Path) -> anyhow::Result<()> {
    let data = tokio::fs::read(path)
        .await
        .with_context(|| format!("failed to read {}", path.display()))?;
    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("upload");

    let mut capture = MediaCaptureController::new();
    capture.select_named_file(file_name, data, mime_for_path(path))?;
    let payload = capture.take_payload().context("no image selected")?;

    let result = state.coordinator.analyze(payload).await?;

    println!("verdict:    {}", result.compliance_status());
    println!("violations: {}", result.violation_count);
    if result.has_violations() {
        for violation in &result.violations_found {
            println!("  - {}", violation);
        }
        for context in &result.violation_context {
            println!("    \"{}\"", context);
        }
    }
    if !result.extracted_text.is_empty() {
        println!("text:       {}", result.extracted_text);
    }
    if let Some(id) = &result.report_id {
        println!("report:     {}", id);
    }
    Ok(())
}

async fn watch(state: &AppState, interval_ms: Option<u64>) -> anyhow::Result<()> {
    let mut snapshots = state.feed.subscribe();
    let mut notices = state.feed.notices();

    state
        .feed
        .start(interval_ms.unwrap_or(state.config.poll_interval_ms))
        .await?;

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = &mut shutdown => break,
            changed = snapshots.changed() => {
                if changed.is_err() {
                    break;
                }
                let snapshot = snapshots.borrow_and_update().clone();
                print_snapshot(&snapshot);
            }
            notice = notices.recv() => match notice {
                Ok(notice) => println!("! {}", notice.to_error()),
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped = skipped, "Feed notices dropped");
                }
                Err(RecvError::Closed) => break,
            },
        }
    }

    state.feed.stop().await;
    Ok(())
}

fn print_snapshot(snapshot: &ReportSnapshot) {
    if snapshot.is_loading() {
        println!("loading...");
        return;
    }

    match &snapshot.statistics {
        Some(stats) => println!(
            "total {} | pending {} | resolved {} | this week {}",
            stats.total_reports, stats.pending, stats.resolved, stats.this_week
        ),
        None => println!("statistics unavailable"),
    }
    for report in snapshot.reports() {
        println!(
            "  {:<12} {:<20} {:<13} {} violation(s)",
            report.id.as_str(),
            report.status.as_str(),
            report
                .compliance_status()
                .map_or("unknown", |status| status.as_str()),
            report.violation_count
        );
    }
}

async fn report(state: &AppState, id: &str) -> anyhow::Result<()> {
    let report = state.api.get_report(&ReportId::new(id)).await?;
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

async fn set_status(state: &AppState, id: &str, status: &str) -> anyhow::Result<()> {
    let report = state
        .api
        .update_report_status(&ReportId::new(id), &ReportStatus::from(status))
        .await?;
    println!("report {} is now {}", report.id, report.status);
    Ok(())
}

fn mime_for_path(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();

    match ext.as_str() {
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "webp" => "image/webp",
        "gif" => "image/gif",
        "bmp" => "image/bmp",
        "heic" => "image/heic",
        _ => "application/octet-stream",
    }
}
