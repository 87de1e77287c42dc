//! Artifacts and their canonical on-disk names.
//!
//! An artifact's path is a pure function of its kind, domain and timestamp.
//! That determinism is what lets the pipeline check for existing work by
//! looking at a single path, with no separate index.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use super::timestamp::Timestamp;

/// Kinds of artifacts produced along the pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactKind {
    /// Raw satellite field as fetched (NetCDF)
    Raw,

    /// Domain-clipped raster converted from the raw field
    Raster,

    /// Ensemble summary produced by a forecast run
    Forecast,

    /// Rendered preview frame of the forecast
    Preview,
}

impl ArtifactKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Raw => "raw",
            Self::Raster => "raster",
            Self::Forecast => "forecast",
            Self::Preview => "preview",
        }
    }
}

impl fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Reference to one artifact. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ArtifactRef {
    pub kind: ArtifactKind,
    pub domain: String,
    pub timestamp: Timestamp,
    pub path: PathBuf,
}

impl ArtifactRef {
    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }
}

/// Directory and filename templates for every artifact kind.
///
/// Templates use `{placeholder}` substitution. Recognised placeholders:
/// `{domain}` (lowercased), `{datestring}` (`YYYYMMDDHHMM000`),
/// `{method}`, `{base_time}` (`YYYYMMDDHHMM`), `{basetime}` (same),
/// `{base_datestring}` (`YYYYMMDDHHMM000`), `{valid}` (`YYYYMMDDHHMM000`),
/// `{leadtime}` (minutes).
#[derive(Debug, Clone)]
pub struct ArtifactLayout {
    pub domain: String,
    pub method: String,
    pub raw_dir: String,
    pub raw_filename: String,
    pub raster_dir: String,
    pub raster_filename: String,
    pub forecast_dir: String,
    pub forecast_filename: String,
    pub preview_dir: String,
    pub preview_filename: String,
}

/// Default preview frame name, matching what the map front-end expects
pub const DEFAULT_PREVIEW_FILENAME: &str =
    "scampr_steps_{domain}_base{base_datestring}_valid{valid}_{leadtime}.png";

impl ArtifactLayout {
    /// Domain key used inside paths
    pub fn domain_key(&self) -> String {
        self.domain.to_lowercase()
    }

    pub fn raw(&self, timestamp: Timestamp) -> ArtifactRef {
        let vars = self.vars(&[("datestring", timestamp.datestring())]);
        self.make_ref(ArtifactKind::Raw, timestamp, &self.raw_dir, &self.raw_filename, &vars)
    }

    pub fn raster(&self, timestamp: Timestamp) -> ArtifactRef {
        let vars = self.vars(&[("datestring", timestamp.datestring())]);
        self.make_ref(
            ArtifactKind::Raster,
            timestamp,
            &self.raster_dir,
            &self.raster_filename,
            &vars,
        )
    }

    /// Forecast output for an effective base time
    pub fn forecast(&self, base_time: Timestamp) -> ArtifactRef {
        let vars = self.vars(&[
            ("base_time", base_time.compact()),
            ("basetime", base_time.compact()),
            ("datestring", base_time.datestring()),
        ]);
        self.make_ref(
            ArtifactKind::Forecast,
            base_time,
            &self.forecast_dir,
            &self.forecast_filename,
            &vars,
        )
    }

    /// Preview frame valid at `valid`, rendered from the run based at `base_time`
    pub fn preview(
        &self,
        base_time: Timestamp,
        valid: Timestamp,
        leadtime_minutes: i64,
    ) -> ArtifactRef {
        let vars = self.vars(&[
            ("base_time", base_time.compact()),
            ("basetime", base_time.compact()),
            ("base_datestring", base_time.datestring()),
            ("valid", valid.datestring()),
            ("leadtime", leadtime_minutes.to_string()),
        ]);
        self.make_ref(
            ArtifactKind::Preview,
            valid,
            &self.preview_dir,
            &self.preview_filename,
            &vars,
        )
    }

    /// Rendered raster directory for this domain
    pub fn raster_directory(&self) -> PathBuf {
        PathBuf::from(render_template(&self.raster_dir, &self.vars(&[])))
    }

    /// Glob pattern matching every raster of this domain
    pub fn raster_pattern(&self) -> String {
        let vars = self.vars(&[("datestring", "*".to_string())]);
        let dir = render_template(&self.raster_dir, &vars);
        let file = render_template(&self.raster_filename, &vars);
        Path::new(&dir).join(file).display().to_string()
    }

    /// Rendered preview directory for a run
    pub fn preview_directory(&self, base_time: Timestamp) -> PathBuf {
        let vars = self.vars(&[
            ("base_time", base_time.compact()),
            ("basetime", base_time.compact()),
        ]);
        PathBuf::from(render_template(&self.preview_dir, &vars))
    }

    fn vars(&self, extra: &[(&str, String)]) -> Vec<(String, String)> {
        let mut vars = vec![
            ("domain".to_string(), self.domain_key()),
            ("method".to_string(), self.method.clone()),
        ];
        vars.extend(extra.iter().map(|(k, v)| (k.to_string(), v.clone())));
        vars
    }

    fn make_ref(
        &self,
        kind: ArtifactKind,
        timestamp: Timestamp,
        dir_template: &str,
        file_template: &str,
        vars: &[(String, String)],
    ) -> ArtifactRef {
        let dir = render_template(dir_template, vars);
        let file = render_template(file_template, vars);
        ArtifactRef {
            kind,
            domain: self.domain_key(),
            timestamp,
            path: Path::new(&dir).join(file),
        }
    }
}

/// Substitute `{key}` placeholders. Unknown placeholders are left untouched.
pub fn render_template(template: &str, vars: &[(String, String)]) -> String {
    vars.iter().fold(template.to_string(), |acc, (key, value)| {
        acc.replace(&format!("{{{}}}", key), value)
    })
}
