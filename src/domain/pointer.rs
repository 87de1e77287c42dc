//! "Latest artifact" handoff documents.
//!
//! Each document is a small JSON record, one per (kind, domain), read by
//! downstream processes (tiling, imagery, distribution) to discover fresh
//! output. Field names follow what those consumers already parse.

use std::path::PathBuf;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use super::timestamp::Timestamp;

/// A document the state publisher can write atomically
pub trait HandoffDocument: Serialize + DeserializeOwned {
    /// Short label used in logs and journal entries
    const LABEL: &'static str;
}

/// Most recent raw field fetched without an explicit time
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawLatest {
    pub latest_filename: String,
    pub file_path: PathBuf,
    pub time_coverage_start: Timestamp,
}

impl HandoffDocument for RawLatest {
    const LABEL: &'static str = "raw-latest";
}

/// Rasters that formed the series of the most recent forecast, oldest first
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TifFileList(pub Vec<PathBuf>);

impl HandoffDocument for TifFileList {
    const LABEL: &'static str = "tif-file-list";
}

/// Most recent forecast artifact
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NowcastLatest {
    /// Effective base time (newest input actually used)
    pub base_time: Timestamp,
    pub file_path: PathBuf,
    pub method: String,
    pub members: usize,
    pub leadtimes: usize,
}

impl HandoffDocument for NowcastLatest {
    const LABEL: &'static str = "nowcast-latest";
}

/// Preview frame manifest for the map front-end
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PngLatest {
    pub title: String,
    pub domain: String,
    pub base_time_utc: String,
    pub time_utc: Vec<String>,
    pub time_local: Vec<String>,
    pub file: Vec<String>,
    pub bounds: OverlayBounds,
    pub legend: Legend,
}

impl HandoffDocument for PngLatest {
    const LABEL: &'static str = "png-latest";
}

/// Overlay corners as [lon, lat]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OverlayBounds {
    #[serde(rename = "overlayTLC")]
    pub top_left: [f64; 2],
    #[serde(rename = "overlayBRC")]
    pub bottom_right: [f64; 2],
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Legend {
    pub levels: Vec<f64>,
    pub colors: Vec<String>,
    pub units: String,
}

impl Default for Legend {
    fn default() -> Self {
        Self {
            levels: vec![0.1, 1.0, 2.0, 5.0, 7.0, 9.0, 10.0, 12.0, 15.0, 20.0, 50.0, 100.0],
            colors: [
                "#0000c7", "#0079ff", "#32c8ff", "#78ebff", "#ffffff", "#fff7c0",
                "#ffe500", "#ff7300", "#ff3f00", "#c80000", "#960000", "#6e0000",
            ]
            .iter()
            .map(|c| c.to_string())
            .collect(),
            units: "mm/hr".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_raw_latest_wire_format() {
        let json = r#"{
            "latest_filename": "scampr_202501151230000.nc",
            "file_path": "/data/nc/scampr_202501151230000.nc",
            "time_coverage_start": "202501151230000"
        }"#;

        let parsed: RawLatest = serde_json::from_str(json).unwrap();
        assert_eq!(parsed.time_coverage_start.compact(), "202501151230");
    }

    #[test]
    fn test_tif_file_list_is_a_bare_array() {
        let list = TifFileList(vec![PathBuf::from("/a.tif"), PathBuf::from("/b.tif")]);
        assert_eq!(serde_json::to_string(&list).unwrap(), r#"["/a.tif","/b.tif"]"#);
    }

    #[test]
    fn test_png_latest_uses_front_end_keys() {
        let doc = PngLatest {
            title: "SCAMPR Nowcast Rain Rate".to_string(),
            domain: "indonesia".to_string(),
            base_time_utc: "2025-01-15 12:30 UTC".to_string(),
            time_utc: vec![],
            time_local: vec![],
            file: vec![],
            bounds: OverlayBounds {
                top_left: [95.0, 6.0],
                bottom_right: [141.0, -11.0],
            },
            legend: Legend::default(),
        };

        let value = serde_json::to_value(&doc).unwrap();
        assert!(value.get("baseTimeUtc").is_some());
        assert!(value.get("timeLocal").is_some());
        assert_eq!(value["bounds"]["overlayTLC"][0], 95.0);
        assert_eq!(value["legend"]["colors"].as_array().unwrap().len(), 12);
    }
}
