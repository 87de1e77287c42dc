//! Configuration for a nowcast deployment.
//!
//! Configuration sources (highest priority first):
//! 1. Environment variable `SCAMPR_STATE_DIR` (state directory only)
//! 2. Config file given on the command line (`-c CONFIG`)
//! 3. Defaults (`~/.scampr`)
//!
//! Relative paths in the config file are resolved against the config file's
//! parent directory. Directory and filename values are templates and may use
//! `{domain}` and the other artifact placeholders.

use std::path::{Path, PathBuf};

use serde::Deserialize;
use uuid::Uuid;

use crate::adapters::{CommandSpec, ForecastParams};
use crate::core::error::PipelineError;
use crate::domain::artifact::DEFAULT_PREVIEW_FILENAME;
use crate::domain::{ArtifactLayout, RunMode, CADENCE_MINUTES};

/// Environment variable overriding the state directory
pub const STATE_DIR_ENV: &str = "SCAMPR_STATE_DIR";

/// Raw config file schema (matches YAML structure)
#[derive(Debug, Clone, Deserialize)]
pub struct ConfigFile {
    /// `auto` or `manual`; kept as text so a bad value is a validation error
    #[serde(default = "default_run_mode")]
    pub run_mode: String,

    pub domain: String,

    /// Number of time steps in the run window (N)
    #[serde(default = "default_prior_steps")]
    pub prior_steps: u32,

    #[serde(default)]
    pub paths: PathsConfig,

    #[serde(default)]
    pub acquisition: AcquisitionSettings,

    #[serde(default)]
    pub model: ModelSettings,

    #[serde(default)]
    pub preview: Option<PreviewSettings>,

    #[serde(default)]
    pub distribution: Option<DistributionSettings>,
}

fn default_run_mode() -> String {
    "auto".to_string()
}

fn default_prior_steps() -> u32 {
    3
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    /// Engine state directory (handoff documents, run journals)
    pub state_dir: Option<String>,
    pub raw_dir: Option<String>,
    pub raw_filename_template: String,
    pub raster_dir: Option<String>,
    pub raster_filename_template: String,
    pub forecast_dir: Option<String>,
    pub forecast_filename_template: String,
    pub preview_dir: Option<String>,
    pub preview_filename_template: String,
    pub raw_latest: Option<String>,
    pub tif_file_list: Option<String>,
    pub nowcast_latest: Option<String>,
    pub png_latest: Option<String>,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            state_dir: None,
            raw_dir: None,
            raw_filename_template: "SCaMPR_{datestring}.nc".to_string(),
            raster_dir: None,
            raster_filename_template: "scampr_{domain}_{datestring}.tif".to_string(),
            forecast_dir: None,
            forecast_filename_template: "scampr_nowcast_{method}_{domain}_{base_time}.grid"
                .to_string(),
            preview_dir: None,
            preview_filename_template: DEFAULT_PREVIEW_FILENAME.to_string(),
            raw_latest: None,
            tif_file_list: None,
            nowcast_latest: None,
            png_latest: None,
        }
    }
}

/// Acquisition (fetch + convert) settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AcquisitionSettings {
    pub fetch: Option<CommandSpec>,
    pub convert: Option<CommandSpec>,

    /// Rasters smaller than this are treated as corrupt and re-acquired
    pub min_valid_bytes: u64,

    /// Raw fields smaller than this are re-fetched
    pub raw_min_valid_bytes: u64,

    /// Concurrent acquisitions during gap-fill
    pub max_parallel: usize,

    /// Steps the `acquire` command walks back looking for the newest field
    pub lookback_steps: u32,
}

impl Default for AcquisitionSettings {
    fn default() -> Self {
        Self {
            fetch: None,
            convert: None,
            min_valid_bytes: 1,
            raw_min_valid_bytes: 700 * 1024,
            max_parallel: 1,
            lookback_steps: 6,
        }
    }
}

/// Nowcast model parameters
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ModelSettings {
    pub method: String,
    pub n_input_frames: usize,
    pub n_leadtimes: usize,
    pub n_ens_members: usize,
    pub km_per_pixel: f64,

    /// Minutes between forecast steps
    pub timestep: i64,

    /// Precipitation threshold in dB-transformed space
    pub precip_thr: f64,

    /// Rain rate (mm/h) the exceedance probability is computed against
    pub exceedance_threshold: f32,

    pub fill_value: f32,
    pub min_intensity: f32,
    pub max_intensity: f32,
    pub max_velocity: f64,
    pub seed: u64,

    /// Engine command; required by `run`
    pub engine: Option<CommandSpec>,
}

impl Default for ModelSettings {
    fn default() -> Self {
        Self {
            method: "steps".to_string(),
            n_input_frames: 3,
            n_leadtimes: 12,
            n_ens_members: 20,
            km_per_pixel: 2.0,
            timestep: CADENCE_MINUTES,
            precip_thr: -10.0,
            exceedance_threshold: 1.0,
            fill_value: 0.0,
            min_intensity: 0.0,
            max_intensity: 300.0,
            max_velocity: 100.0,
            seed: 42,
            engine: None,
        }
    }
}

impl ModelSettings {
    /// Engine parameters for a stack of `frames` inputs
    pub fn forecast_params(&self, frames: usize) -> ForecastParams {
        ForecastParams {
            method: self.method.clone(),
            n_input_frames: self.n_input_frames.min(frames),
            n_leadtimes: self.n_leadtimes,
            n_ens_members: self.n_ens_members,
            km_per_pixel: self.km_per_pixel,
            timestep_minutes: self.timestep,
            precip_thr: self.precip_thr,
            max_velocity: self.max_velocity,
            seed: self.seed,
        }
    }
}

/// Preview rendering settings
#[derive(Debug, Clone, Deserialize)]
pub struct PreviewSettings {
    pub render: CommandSpec,

    #[serde(default = "default_preview_title")]
    pub title: String,

    #[serde(default)]
    pub local_time_offset_hours: i64,

    #[serde(default = "default_local_time_code")]
    pub local_time_code: String,
}

fn default_preview_title() -> String {
    "SCAMPR Nowcast Rain Rate".to_string()
}

fn default_local_time_code() -> String {
    "UTC".to_string()
}

/// Downstream distribution settings
#[derive(Debug, Clone, Deserialize)]
pub struct DistributionSettings {
    pub send: CommandSpec,
}

/// Paths of the four handoff documents for one domain
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandoffPaths {
    pub raw_latest: PathBuf,
    pub tif_file_list: PathBuf,
    pub nowcast_latest: PathBuf,
    pub png_latest: PathBuf,
}

/// Resolved configuration with absolute paths
#[derive(Debug, Clone)]
pub struct RunConfig {
    pub run_mode: RunMode,
    pub domain: String,
    pub prior_steps: u32,
    pub state_dir: PathBuf,
    pub layout: ArtifactLayout,
    pub handoff: HandoffPaths,
    pub acquisition: AcquisitionSettings,
    pub model: ModelSettings,
    pub preview: Option<PreviewSettings>,
    pub distribution: Option<DistributionSettings>,

    /// Path to config file (if loaded from one)
    pub config_file: Option<PathBuf>,
}

impl RunConfig {
    /// Load, resolve and validate a config file
    pub fn load(path: &Path) -> Result<Self, PipelineError> {
        let file = load_config_file(path)?;
        let base = path.parent().unwrap_or(Path::new("."));
        let state_override = std::env::var(STATE_DIR_ENV).ok().map(PathBuf::from);
        let mut config = Self::resolve(file, base, state_override)?;
        config.config_file = Some(path.to_path_buf());
        Ok(config)
    }

    /// Resolve a parsed config against a base directory
    pub fn resolve(
        file: ConfigFile,
        base: &Path,
        state_override: Option<PathBuf>,
    ) -> Result<Self, PipelineError> {
        let run_mode: RunMode = file
            .run_mode
            .parse()
            .map_err(PipelineError::InvalidConfiguration)?;

        let state_dir = match (state_override, &file.paths.state_dir) {
            (Some(dir), _) => dir,
            (None, Some(dir)) => resolve_path(base, dir),
            (None, None) => dirs::home_dir()
                .ok_or_else(|| PipelineError::invalid_config("Failed to determine home directory"))?
                .join(".scampr"),
        };

        let paths = &file.paths;
        let dir = |configured: &Option<String>, default: &str| -> String {
            let resolved = match configured {
                Some(d) => resolve_path(base, d),
                None => state_dir.join(default),
            };
            resolved.display().to_string()
        };

        let layout = ArtifactLayout {
            domain: file.domain.clone(),
            method: file.model.method.clone(),
            raw_dir: dir(&paths.raw_dir, "nc"),
            raw_filename: paths.raw_filename_template.clone(),
            raster_dir: dir(&paths.raster_dir, "tif/{domain}"),
            raster_filename: paths.raster_filename_template.clone(),
            forecast_dir: dir(&paths.forecast_dir, "nowcast/{domain}"),
            forecast_filename: paths.forecast_filename_template.clone(),
            preview_dir: dir(&paths.preview_dir, "png/{domain}/{basetime}"),
            preview_filename: paths.preview_filename_template.clone(),
        };

        let domain_state = state_dir.join(layout.domain_key());
        let handoff_path = |configured: &Option<String>, name: &str| -> PathBuf {
            match configured {
                Some(p) => PathBuf::from(crate::domain::render_template(
                    &resolve_path(base, p).display().to_string(),
                    &[("domain".to_string(), layout.domain_key())],
                )),
                None => domain_state.join(name),
            }
        };
        let handoff = HandoffPaths {
            raw_latest: handoff_path(&paths.raw_latest, "raw_latest.json"),
            tif_file_list: handoff_path(&paths.tif_file_list, "tif_file_list.json"),
            nowcast_latest: handoff_path(&paths.nowcast_latest, "nowcast_latest.json"),
            png_latest: handoff_path(&paths.png_latest, "png_latest.json"),
        };

        let config = Self {
            run_mode,
            domain: file.domain,
            prior_steps: file.prior_steps,
            state_dir,
            layout,
            handoff,
            acquisition: file.acquisition,
            model: file.model,
            preview: file.preview,
            distribution: file.distribution,
            config_file: None,
        };
        config.validate()?;
        Ok(config)
    }

    /// Check invariants that parsing alone cannot enforce
    pub fn validate(&self) -> Result<(), PipelineError> {
        if self.domain.trim().is_empty() {
            return Err(PipelineError::invalid_config("domain must not be empty"));
        }
        if self.prior_steps == 0 {
            return Err(PipelineError::invalid_config("prior_steps must be at least 1"));
        }
        for (key, template) in [
            ("raw_filename_template", &self.layout.raw_filename),
            ("raster_filename_template", &self.layout.raster_filename),
        ] {
            if !template.contains("{datestring}") {
                return Err(PipelineError::invalid_config(format!(
                    "{} must contain {{datestring}}: {}",
                    key, template
                )));
            }
        }
        let forecast = &self.layout.forecast_filename;
        if !forecast.contains("{base_time}") && !forecast.contains("{basetime}") {
            return Err(PipelineError::invalid_config(format!(
                "forecast_filename_template must contain {{base_time}}: {}",
                forecast
            )));
        }

        let model = &self.model;
        if model.n_input_frames == 0 || model.n_leadtimes == 0 || model.n_ens_members == 0 {
            return Err(PipelineError::invalid_config(
                "model.n_input_frames, n_leadtimes and n_ens_members must be positive",
            ));
        }
        if model.timestep <= 0 || model.timestep % CADENCE_MINUTES != 0 {
            return Err(PipelineError::invalid_config(format!(
                "model.timestep must be a positive multiple of {} minutes, got {}",
                CADENCE_MINUTES, model.timestep
            )));
        }
        if model.min_intensity > model.max_intensity {
            return Err(PipelineError::invalid_config(
                "model.min_intensity exceeds model.max_intensity",
            ));
        }
        if self.acquisition.max_parallel == 0 {
            return Err(PipelineError::invalid_config(
                "acquisition.max_parallel must be at least 1",
            ));
        }
        Ok(())
    }

    /// Directory holding per-run journals
    pub fn runs_dir(&self) -> PathBuf {
        self.state_dir.join("runs")
    }
}

/// Per-invocation context handed to every stage
#[derive(Debug, Clone)]
pub struct RunContext {
    pub run_id: Uuid,
    pub config: RunConfig,

    /// Time given on the command line, unparsed
    pub requested_time: Option<String>,
}

impl RunContext {
    pub fn new(config: RunConfig, requested_time: Option<String>) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            config,
            requested_time,
        }
    }

    pub fn layout(&self) -> &ArtifactLayout {
        &self.config.layout
    }

    pub fn handoff(&self) -> &HandoffPaths {
        &self.config.handoff
    }
}

/// Load and parse config file
fn load_config_file(path: &Path) -> Result<ConfigFile, PipelineError> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        PipelineError::invalid_config(format!(
            "Failed to read config file {}: {}",
            path.display(),
            e
        ))
    })?;

    serde_yaml::from_str(&content).map_err(|e| {
        PipelineError::invalid_config(format!(
            "Failed to parse config file {}: {}",
            path.display(),
            e
        ))
    })
}

/// Resolve a path that may be relative to the config file's parent
fn resolve_path(base: &Path, path_str: &str) -> PathBuf {
    let path = PathBuf::from(path_str);
    if path.is_absolute() {
        path
    } else {
        base.join(path)
            .canonicalize()
            .unwrap_or_else(|_| base.join(path_str))
    }
}
