//! Command-line interface for scampr-nowcast.
//!
//! Provides commands for running a nowcast, acquiring the latest step,
//! inspecting handoff state and listing recent runs.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::warn;

use crate::config::{RunConfig, RunContext};
use crate::core::{count_rasters, read_pointer, report_path, Orchestrator, RunJournal};
use crate::domain::{
    HandoffDocument, NowcastLatest, PngLatest, RawLatest, RunReport, RunState, TifFileList,
    Timestamp,
};

/// scampr-nowcast - satellite rain-rate nowcast orchestrator
#[derive(Parser, Debug)]
#[command(name = "scampr-nowcast")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run one nowcast: fill the window, forecast, publish
    Run {
        /// Config file (YAML)
        #[arg(short, long)]
        config: PathBuf,

        /// Base time (YYYYmmddHHMM, on the 10-minute grid)
        #[arg(short, long)]
        time: Option<String>,
    },

    /// Acquire one step; without a time, the newest available one
    Acquire {
        /// Config file (YAML)
        #[arg(short, long)]
        config: PathBuf,

        /// Step to acquire (YYYYmmddHHMM)
        #[arg(short, long)]
        time: Option<String>,
    },

    /// Show handoff documents and raster count for the domain
    Status {
        /// Config file (YAML)
        #[arg(short, long)]
        config: PathBuf,
    },

    /// List recent runs
    Runs {
        /// Config file (YAML)
        #[arg(short, long)]
        config: PathBuf,

        /// Maximum number of runs to show
        #[arg(short, long, default_value = "10")]
        limit: usize,
    },
}

impl Cli {
    /// Execute the CLI command
    pub async fn execute(self) -> Result<()> {
        match self.command {
            Commands::Run { config, time } => run_nowcast(&config, time).await,
            Commands::Acquire { config, time } => acquire_latest(&config, time).await,
            Commands::Status { config } => show_status(&config).await,
            Commands::Runs { config, limit } => list_runs(&config, limit).await,
        }
    }
}

fn load_config(path: &Path) -> Result<RunConfig> {
    RunConfig::load(path).with_context(|| format!("Failed to load config: {}", path.display()))
}

/// Run one nowcast
async fn run_nowcast(config_path: &Path, time: Option<String>) -> Result<()> {
    let config = load_config(config_path)?;
    let ctx = RunContext::new(config, time);
    let orchestrator = Orchestrator::from_config(&ctx.config);

    match orchestrator.run(&ctx).await {
        Ok(report) => {
            if let RunState::CompletedWithGaps { dropped } = report.state {
                warn!(dropped, "Some steps could not be acquired");
            }
            print_report(&report);
            eprintln!("\n[Run {} completed]", ctx.run_id);
            Ok(())
        }
        Err(e) => {
            eprintln!("\n[Run {} failed ({}): {}]", ctx.run_id, e.class().as_str(), e);
            std::process::exit(1);
        }
    }
}

/// Acquire one step and report its raster
async fn acquire_latest(config_path: &Path, time: Option<String>) -> Result<()> {
    let config = load_config(config_path)?;
    let orchestrator = Orchestrator::from_config(&config);

    let raster = orchestrator
        .acquire(&config, time.as_deref(), Timestamp::now_floor())
        .await?;
    println!("{}", raster.path.display());
    Ok(())
}

/// Print the handoff documents and the raster count
async fn show_status(config_path: &Path) -> Result<()> {
    let config = load_config(config_path)?;
    let handoff = &config.handoff;

    println!("Domain: {}", config.layout.domain_key());
    print_document::<RawLatest>(&handoff.raw_latest).await?;
    print_document::<TifFileList>(&handoff.tif_file_list).await?;
    print_document::<NowcastLatest>(&handoff.nowcast_latest).await?;
    print_document::<PngLatest>(&handoff.png_latest).await?;

    let rasters = count_rasters(&config.layout)?;
    println!("\nRasters on disk: {} ({})", rasters, config.layout.raster_directory().display());
    Ok(())
}

async fn print_document<T: HandoffDocument>(path: &Path) -> Result<()> {
    match read_pointer::<T>(path).await {
        Some(doc) => {
            let json = serde_json::to_string_pretty(&doc).context("Failed to format document")?;
            println!("\n{} ({}):\n{}", T::LABEL, path.display(), json);
        }
        None => println!("\n{} ({}): none", T::LABEL, path.display()),
    }
    Ok(())
}

/// List recent runs, newest first
async fn list_runs(config_path: &Path, limit: usize) -> Result<()> {
    let config = load_config(config_path)?;
    let runs_dir = config.runs_dir();

    let mut reports = Vec::new();
    for run_id in RunJournal::list_runs(&runs_dir).await? {
        let path = report_path(&runs_dir, run_id);
        let Ok(bytes) = tokio::fs::read(&path).await else {
            continue;
        };
        match serde_json::from_slice::<RunReport>(&bytes) {
            Ok(report) => reports.push(report),
            Err(e) => warn!(path = %path.display(), error = %e, "Skipping unreadable run report"),
        }
    }

    if reports.is_empty() {
        println!("No runs found");
        return Ok(());
    }

    reports.sort_by(|a, b| b.started_at.cmp(&a.started_at));

    println!("{:<38} {:<12} {:<18} {:<18}", "RUN ID", "DOMAIN", "BASE TIME", "STATE");
    println!("{}", "-".repeat(88));
    for report in reports.into_iter().take(limit) {
        let base = report
            .effective_base_time
            .or(report.requested_base_time)
            .map(|t| t.compact())
            .unwrap_or_else(|| "-".to_string());
        println!(
            "{:<38} {:<12} {:<18} {:<18}",
            report.run_id,
            report.domain,
            base,
            state_label(&report.state)
        );
    }

    Ok(())
}

fn state_label(state: &RunState) -> String {
    match state {
        RunState::Running => "running".to_string(),
        RunState::Completed => "completed".to_string(),
        RunState::CompletedWithGaps { dropped } => format!("gaps ({} dropped)", dropped),
        RunState::Failed { .. } => "failed".to_string(),
    }
}

fn print_report(report: &RunReport) {
    if let Some(base) = report.effective_base_time {
        println!("Base time: {}", base);
    }
    let usable: Vec<String> = report.usable.iter().map(|t| t.compact()).collect();
    println!("Inputs: {}", usable.join(", "));
    if !report.dropped.is_empty() {
        let dropped: Vec<String> = report.dropped.iter().map(|t| t.compact()).collect();
        println!("Dropped: {}", dropped.join(", "));
    }
    if let Some(path) = &report.forecast_path {
        println!("Forecast: {}", path.display());
    }
    if report.preview_count > 0 {
        println!("Previews: {}", report.preview_count);
    }
}
