//! Main orchestrator for a nowcast run.
//!
//! Resolve window, fill gaps, validate, forecast, aggregate, write the
//! forecast artifact, publish handoff documents, then render previews and
//! distribute. Every stage is journaled; any fatal stage leaves the handoff
//! documents exactly as they were.

use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{Context, Result};
use tracing::{error, info, instrument, warn};

use crate::adapters::{
    AcquisitionGateway, CommandEngine, CommandGateway, CommandRenderer, CommandSink,
    DistributionSink, ForecastEngine, GridFileReader, PreviewRenderer, RasterReader,
};
use crate::config::{RunConfig, RunContext};
use crate::domain::{
    ArtifactRef, Event, EventType, NowcastLatest, RawLatest, RunMode, RunReport, RunState,
    RunWindow, TifFileList, Timestamp,
};

use super::availability::AvailabilityTracker;
use super::ensemble::aggregate;
use super::error::PipelineError;
use super::forecast::{write_forecast, ForecastInvoker};
use super::gap_fill::{GapFillCoordinator, GapFillReport};
use super::journal::RunJournal;
use super::preview::PreviewStage;
use super::publisher::{self, read_pointer};
use super::sequence;
use super::window::WindowResolver;

/// Main pipeline orchestrator
pub struct Orchestrator {
    gateway: Box<dyn AcquisitionGateway>,
    reader: Box<dyn RasterReader>,
    engine: Option<Box<dyn ForecastEngine>>,
    renderer: Option<Box<dyn PreviewRenderer>>,
    sink: Option<Box<dyn DistributionSink>>,
}

impl Orchestrator {
    pub fn new(gateway: Box<dyn AcquisitionGateway>, reader: Box<dyn RasterReader>) -> Self {
        Self {
            gateway,
            reader,
            engine: None,
            renderer: None,
            sink: None,
        }
    }

    pub fn with_engine(mut self, engine: Box<dyn ForecastEngine>) -> Self {
        self.engine = Some(engine);
        self
    }

    pub fn with_renderer(mut self, renderer: Box<dyn PreviewRenderer>) -> Self {
        self.renderer = Some(renderer);
        self
    }

    pub fn with_sink(mut self, sink: Box<dyn DistributionSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Build the command-backed collaborators a config describes
    pub fn from_config(config: &RunConfig) -> Self {
        let mut orchestrator = Self::new(
            Box::new(CommandGateway::from_settings(&config.acquisition)),
            Box::new(GridFileReader::new()),
        );
        if let Some(engine) = &config.model.engine {
            orchestrator = orchestrator.with_engine(Box::new(CommandEngine::new(engine.clone())));
        }
        if let Some(preview) = &config.preview {
            let renderer = CommandRenderer::new(preview.render.clone());
            orchestrator = orchestrator.with_renderer(Box::new(renderer));
        }
        if let Some(distribution) = &config.distribution {
            let sink = CommandSink::new(distribution.send.clone());
            orchestrator = orchestrator.with_sink(Box::new(sink));
        }
        orchestrator
    }

    /// Execute one run with the wall clock as "now"
    pub async fn run(&self, ctx: &RunContext) -> Result<RunReport, PipelineError> {
        self.run_at(ctx, Timestamp::now_floor()).await
    }

    /// Execute one run with an explicit "now" (used by manual mode without a time)
    #[instrument(skip(self, ctx), fields(run_id = %ctx.run_id, domain = %ctx.config.domain))]
    pub async fn run_at(
        &self,
        ctx: &RunContext,
        now: Timestamp,
    ) -> Result<RunReport, PipelineError> {
        info!("Starting nowcast run");
        let mut report = RunReport::new(ctx.run_id, ctx.config.layout.domain_key());

        // A run rejected here leaves nothing behind, not even a journal
        let (engine, window) = match self.prepare(ctx, now).await {
            Ok(prepared) => prepared,
            Err(e) => {
                error!(error = %e, class = e.class().as_str(), "Run rejected");
                return Err(e);
            }
        };
        report.requested_base_time = Some(window.base_time);
        info!(base_time = %window.base_time, steps = window.len(), "Window resolved");

        let journal = match RunJournal::open(&ctx.config.runs_dir(), ctx.run_id).await {
            Ok(journal) => Some(journal),
            Err(e) => {
                warn!(error = %e, "Run journal unavailable, continuing without it");
                None
            }
        };
        record(
            &journal,
            Event::new(
                ctx.run_id,
                EventType::RunStarted,
                format!("domain={} mode={}", report.domain, ctx.config.run_mode),
            ),
        )
        .await;
        record(
            &journal,
            Event::new(ctx.run_id, EventType::WindowResolved, format!("{} steps", window.len()))
                .with_step(window.base_time),
        )
        .await;

        let result = self.execute(ctx, engine, &window, &journal, &mut report).await;
        report.completed_at = Some(chrono::Utc::now());

        match result {
            Ok(()) => {
                report.state = if report.dropped.is_empty() {
                    RunState::Completed
                } else {
                    RunState::CompletedWithGaps {
                        dropped: report.dropped.len(),
                    }
                };
                info!(
                    effective_base_time = ?report.effective_base_time.map(|t| t.datestring()),
                    dropped = report.dropped.len(),
                    "Run completed"
                );
                record(
                    &journal,
                    Event::new(ctx.run_id, EventType::RunCompleted, format!("{:?}", report.state)),
                )
                .await;
                save_report(&journal, &report).await;
                Ok(report)
            }
            Err(e) => {
                error!(error = %e, class = e.class().as_str(), "Run failed");
                report.state = RunState::Failed { error: e.to_string() };
                record(
                    &journal,
                    Event::new(ctx.run_id, EventType::RunFailed, e.class().as_str())
                        .with_error(e.to_string()),
                )
                .await;
                save_report(&journal, &report).await;
                Err(e)
            }
        }
    }

    /// Configuration checks and window resolution, before any acquisition
    async fn prepare(
        &self,
        ctx: &RunContext,
        now: Timestamp,
    ) -> Result<(&dyn ForecastEngine, RunWindow), PipelineError> {
        let config = &ctx.config;
        let engine = self.engine.as_deref().ok_or_else(|| {
            PipelineError::invalid_config("model.engine is required to run a forecast")
        })?;
        let resolver = WindowResolver::new(
            config.run_mode,
            config.prior_steps,
            config.handoff.raw_latest.clone(),
        )?;

        let requested = ctx.requested_time.as_deref();
        let raw_latest = if requested.is_none() && config.run_mode == RunMode::Auto {
            read_pointer::<RawLatest>(&config.handoff.raw_latest).await
        } else {
            None
        };
        let window = resolver.resolve(requested, now, raw_latest.as_ref())?;
        Ok((engine, window))
    }

    async fn execute(
        &self,
        ctx: &RunContext,
        engine: &dyn ForecastEngine,
        window: &RunWindow,
        journal: &Option<RunJournal>,
        report: &mut RunReport,
    ) -> Result<(), PipelineError> {
        let config = &ctx.config;
        let layout = &config.layout;

        // Availability + gap fill
        let availability = AvailabilityTracker::filesystem(config.acquisition.min_valid_bytes)
            .check(layout, window);
        let coordinator =
            GapFillCoordinator::new(self.gateway.as_ref(), config.acquisition.max_parallel);
        let gap_fill = coordinator.fill(layout, &availability).await;
        journal_gap_fill(journal, ctx, &gap_fill).await;
        report.dropped = gap_fill.failed_timestamps();

        // Validation
        let validated = sequence::validate(gap_fill.usable, config.prior_steps)?;
        report.usable = validated.series.timestamps();
        report.effective_base_time = Some(validated.base_time);
        if validated.base_time != window.base_time {
            warn!(
                requested = %window.base_time,
                effective = %validated.base_time,
                "Newest step unavailable, base time moved back"
            );
        }
        record(
            journal,
            Event::new(
                ctx.run_id,
                EventType::SeriesValidated,
                format!("{} usable", validated.series.len()),
            )
            .with_step(validated.base_time),
        )
        .await;

        // Forecast + aggregation
        let started = Instant::now();
        let cube = ForecastInvoker::new(self.reader.as_ref(), engine, &config.model)
            .invoke(&validated)
            .await?;
        let summary = aggregate(&cube, config.model.exceedance_threshold)?;
        record(
            journal,
            Event::new(
                ctx.run_id,
                EventType::ForecastCompleted,
                format!("{} members x {} leadtimes", summary.members, summary.times.len()),
            )
            .with_step(validated.base_time)
            .with_duration(started.elapsed().as_millis() as u64),
        )
        .await;

        let forecast = layout.forecast(validated.base_time);
        write_forecast(&summary, &config.model.method, &forecast.path).await?;
        report.forecast_path = Some(forecast.path.clone());

        // Publication, nowcast-latest before tif-file-list
        let nowcast_latest = NowcastLatest {
            base_time: validated.base_time,
            file_path: forecast.path.clone(),
            method: config.model.method.clone(),
            members: summary.members,
            leadtimes: summary.times.len(),
        };
        publisher::publish(&config.handoff.nowcast_latest, &nowcast_latest).await?;
        record(journal, published(ctx, "nowcast-latest", &config.handoff.nowcast_latest)).await;

        let inputs = TifFileList(validated.series.paths());
        publisher::publish(&config.handoff.tif_file_list, &inputs).await?;
        record(journal, published(ctx, "tif-file-list", &config.handoff.tif_file_list)).await;

        let mut produced: Vec<PathBuf> = vec![forecast.path.clone()];

        // Previews
        if let (Some(settings), Some(renderer)) = (&config.preview, self.renderer.as_deref()) {
            let output = PreviewStage::new(renderer, settings).render(layout, &summary).await?;
            publisher::publish(&config.handoff.png_latest, &output.manifest).await?;
            record(journal, published(ctx, "png-latest", &config.handoff.png_latest)).await;

            report.preview_count = output.frames.len();
            produced.extend(output.frames.iter().map(|f: &ArtifactRef| f.path.clone()));
            produced.push(config.handoff.png_latest.clone());
        }

        // Distribution never changes the outcome
        if let Some(sink) = self.sink.as_deref() {
            distribute(sink, &produced).await;
        }

        Ok(())
    }

    /// Acquire one step.
    ///
    /// With a time, acquire exactly that step. Without, walk back from `now`
    /// up to `lookback_steps` steps until the gateway succeeds, then publish
    /// raw-latest for that step.
    #[instrument(skip(self, config), fields(domain = %config.domain))]
    pub async fn acquire(
        &self,
        config: &RunConfig,
        requested: Option<&str>,
        now: Timestamp,
    ) -> Result<ArtifactRef> {
        let layout = &config.layout;

        if let Some(time) = requested {
            let timestamp = Timestamp::parse(time).map_err(PipelineError::from)?;
            return self
                .gateway
                .acquire(layout, timestamp)
                .await
                .with_context(|| format!("Failed to acquire {}", timestamp));
        }

        let mut last_error = None;
        for step in 0..=config.acquisition.lookback_steps {
            let timestamp = now.minus_steps(step);
            match self.gateway.acquire(layout, timestamp).await {
                Ok(raster) => {
                    let raw = layout.raw(timestamp);
                    let pointer = RawLatest {
                        latest_filename: raw.file_name(),
                        file_path: raw.path,
                        time_coverage_start: timestamp,
                    };
                    publisher::publish(&config.handoff.raw_latest, &pointer).await?;
                    info!(%timestamp, "Latest step acquired");
                    return Ok(raster);
                }
                Err(e) => {
                    info!(%timestamp, error = %e, "Step not available, looking further back");
                    last_error = Some(e);
                }
            }
        }

        match last_error {
            Some(e) => Err(e).with_context(|| {
                format!(
                    "No step acquirable within {} steps of {}",
                    config.acquisition.lookback_steps, now
                )
            }),
            None => anyhow::bail!("No step acquirable from {}", now),
        }
    }
}

async fn record(journal: &Option<RunJournal>, event: Event) {
    if let Some(journal) = journal {
        journal.record(event).await;
    }
}

fn published(ctx: &RunContext, label: &str, path: &Path) -> Event {
    Event::new(ctx.run_id, EventType::Published, format!("{} -> {}", label, path.display()))
}

async fn journal_gap_fill(
    journal: &Option<RunJournal>,
    ctx: &RunContext,
    gap_fill: &GapFillReport,
) {
    for attempt in &gap_fill.attempts {
        let event = match &attempt.result {
            Ok(artifact) => Event::new(ctx.run_id, EventType::StepAcquired, artifact.file_name()),
            Err(e) => {
                Event::new(ctx.run_id, EventType::StepFailed, "dropped").with_error(e.to_string())
            }
        };
        record(
            journal,
            event.with_step(attempt.timestamp).with_duration(attempt.duration_ms),
        )
        .await;
    }
}

async fn save_report(journal: &Option<RunJournal>, report: &RunReport) {
    let Some(journal) = journal else {
        return;
    };
    let path = journal.report_path();
    let result = match serde_json::to_vec_pretty(report) {
        Ok(bytes) => publisher::write_atomic(&path, bytes).await.map_err(anyhow::Error::from),
        Err(e) => Err(anyhow::Error::from(e)),
    };
    if let Err(e) = result {
        warn!(error = %e, path = %path.display(), "Failed to save run report");
    }
}

async fn distribute(sink: &dyn DistributionSink, files: &[PathBuf]) {
    for file in files {
        let remote = file
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        if let Err(e) = sink.send(file, &remote).await {
            warn!(file = %file.display(), error = %format!("{:#}", e), "Distribution failed");
        }
    }
}
