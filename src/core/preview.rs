//! Preview frames and the png-latest manifest.
//!
//! One image per forecast time, rendered from the ensemble mean, plus a
//! manifest the map front-end reads to place and label the frames.

use chrono::Duration;
use ndarray::Axis;
use tracing::{info, instrument};

use crate::adapters::PreviewRenderer;
use crate::config::PreviewSettings;
use crate::core::error::PipelineError;
use crate::domain::{ArtifactLayout, ArtifactRef, EnsembleSummary, Legend, OverlayBounds, PngLatest};

/// Rendered frames and the manifest describing them
#[derive(Debug, Clone)]
pub struct PreviewOutput {
    pub frames: Vec<ArtifactRef>,
    pub manifest: PngLatest,
}

pub struct PreviewStage<'a> {
    renderer: &'a dyn PreviewRenderer,
    settings: &'a PreviewSettings,
}

impl<'a> PreviewStage<'a> {
    pub fn new(renderer: &'a dyn PreviewRenderer, settings: &'a PreviewSettings) -> Self {
        Self { renderer, settings }
    }

    /// Render every forecast time. Any frame failing fails the stage.
    #[instrument(skip(self, layout, summary), fields(base_time = %summary.base_time))]
    pub async fn render(
        &self,
        layout: &ArtifactLayout,
        summary: &EnsembleSummary,
    ) -> Result<PreviewOutput, PipelineError> {
        let dir = layout.preview_directory(summary.base_time);
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| PipelineError::PublicationFailed {
                label: "preview".to_string(),
                path: dir.clone(),
                reason: e.to_string(),
            })?;

        let mut frames = Vec::with_capacity(summary.times.len());
        for (i, (valid, leadtime)) in summary.times.iter().zip(&summary.leadtimes).enumerate() {
            let frame_ref = layout.preview(summary.base_time, *valid, *leadtime);
            let frame = summary.mean.data.index_axis(Axis(0), i).to_owned();

            self.renderer
                .render(&frame, &summary.georef, &frame_ref.path)
                .await
                .map_err(|e| PipelineError::PublicationFailed {
                    label: "preview".to_string(),
                    path: frame_ref.path.clone(),
                    reason: format!("{:#}", e),
                })?;
            frames.push(frame_ref);
        }

        info!(frames = frames.len(), dir = %dir.display(), "Preview frames rendered");
        let manifest = build_manifest(self.settings, &layout.domain_key(), summary, &frames);
        Ok(PreviewOutput { frames, manifest })
    }
}

/// Build the png-latest manifest for rendered frames
pub fn build_manifest(
    settings: &PreviewSettings,
    domain: &str,
    summary: &EnsembleSummary,
    frames: &[ArtifactRef],
) -> PngLatest {
    let offset = Duration::hours(settings.local_time_offset_hours);
    let mut time_utc = Vec::with_capacity(frames.len());
    let mut time_local = Vec::with_capacity(frames.len());
    for (valid, leadtime) in summary.times.iter().zip(&summary.leadtimes) {
        let dt = valid.as_datetime();
        time_utc.push(format!("{} UTC (+{:03}min)", dt.format("%Y-%m-%d %H:%M"), leadtime));
        time_local.push(format!(
            "{} {} (+{:03}min)",
            (dt + offset).format("%Y-%m-%d %H:%M"),
            settings.local_time_code,
            leadtime
        ));
    }

    let (_, rows, cols) = summary.mean.data.dim();
    let lons = summary.georef.lons(cols);
    let lats = summary.georef.lats(rows);

    PngLatest {
        title: settings.title.clone(),
        domain: domain.to_string(),
        base_time_utc: summary.base_time.to_string(),
        time_utc,
        time_local,
        file: frames.iter().map(|f| f.file_name()).collect(),
        bounds: OverlayBounds {
            top_left: [min_of(&lons), max_of(&lats)],
            bottom_right: [max_of(&lons), min_of(&lats)],
        },
        legend: Legend::default(),
    }
}

fn min_of(values: &[f64]) -> f64 {
    values.iter().cloned().fold(f64::INFINITY, f64::min)
}

fn max_of(values: &[f64]) -> f64 {
    values.iter().cloned().fold(f64::NEG_INFINITY, f64::max)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::CommandSpec;
    use crate::core::ensemble::aggregate;
    use crate::domain::{EnsembleCube, Georeference, Timestamp};
    use anyhow::Result;
    use async_trait::async_trait;
    use ndarray::{Array2, Array4};
    use std::path::Path;
    use std::sync::Mutex;
    use tempfile::TempDir;

    struct RecordingRenderer {
        fail_on: Option<usize>,
        rendered: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl PreviewRenderer for RecordingRenderer {
        async fn render(
            &self,
            _frame: &Array2<f32>,
            _georef: &Georeference,
            output: &Path,
        ) -> Result<()> {
            let mut rendered = self.rendered.lock().unwrap();
            if self.fail_on == Some(rendered.len()) {
                anyhow::bail!("renderer crashed");
            }
            std::fs::write(output, b"png")?;
            rendered.push(output.display().to_string());
            Ok(())
        }
    }

    fn settings() -> PreviewSettings {
        PreviewSettings {
            render: CommandSpec::new("render", &[]),
            title: "SCAMPR Nowcast Rain Rate".to_string(),
            local_time_offset_hours: 7,
            local_time_code: "WIB".to_string(),
        }
    }

    fn summary() -> EnsembleSummary {
        let cube = EnsembleCube {
            data: Array4::from_elem((2, 2, 3, 4), 1.0),
            base_time: Timestamp::parse("202501151230").unwrap(),
            timestep_minutes: 10,
            georef: Georeference {
                projection: "EPSG:4326".to_string(),
                left: 95.01,
                bottom: -11.04,
                right: 141.02,
                top: 6.03,
                yorigin: "upper".to_string(),
            },
        };
        aggregate(&cube, 1.0).unwrap()
    }

    fn layout(root: &Path) -> ArtifactLayout {
        ArtifactLayout {
            domain: "Indonesia".to_string(),
            method: "steps".to_string(),
            raw_dir: root.join("nc").display().to_string(),
            raw_filename: "SCaMPR_{datestring}.nc".to_string(),
            raster_dir: root.join("tif").display().to_string(),
            raster_filename: "scampr_{domain}_{datestring}.tif".to_string(),
            forecast_dir: root.join("out").display().to_string(),
            forecast_filename: "f_{base_time}.grid".to_string(),
            preview_dir: root.join("png/{domain}/{basetime}").display().to_string(),
            preview_filename: crate::domain::artifact::DEFAULT_PREVIEW_FILENAME.to_string(),
        }
    }

    #[test]
    fn test_manifest_labels_and_bounds() {
        let summary = summary();
        let frames: Vec<ArtifactRef> = vec![];
        let manifest = build_manifest(&settings(), "indonesia", &summary, &frames);

        assert_eq!(manifest.base_time_utc, "2025-01-15 12:30 UTC");
        assert_eq!(manifest.time_utc[0], "2025-01-15 12:40 UTC (+010min)");
        assert_eq!(manifest.time_local[1], "2025-01-15 19:50 WIB (+020min)");
        assert_eq!(manifest.bounds.top_left, [95.0, 6.0]);
        assert_eq!(manifest.bounds.bottom_right, [141.0, -11.0]);
        assert_eq!(manifest.legend.units, "mm/hr");
    }

    #[tokio::test]
    async fn test_render_names_frames_by_base_and_valid_time() {
        let temp = TempDir::new().unwrap();
        let renderer = RecordingRenderer {
            fail_on: None,
            rendered: Mutex::new(Vec::new()),
        };
        let settings = settings();

        let output = PreviewStage::new(&renderer, &settings)
            .render(&layout(temp.path()), &summary())
            .await
            .unwrap();

        assert_eq!(output.frames.len(), 2);
        assert_eq!(
            output.manifest.file[0],
            "scampr_steps_indonesia_base202501151230000_valid202501151240000_10.png"
        );
        assert!(temp
            .path()
            .join("png/indonesia/202501151230")
            .join(&output.manifest.file[1])
            .exists());
    }

    #[tokio::test]
    async fn test_render_failure_fails_stage() {
        let temp = TempDir::new().unwrap();
        let renderer = RecordingRenderer {
            fail_on: Some(1),
            rendered: Mutex::new(Vec::new()),
        };
        let settings = settings();

        let err = PreviewStage::new(&renderer, &settings)
            .render(&layout(temp.path()), &summary())
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::PublicationFailed { .. }));
    }
}
