//! Publisher Integration Tests
//!
//! A crash between writing and renaming must never expose a partial
//! handoff document.

use std::collections::BTreeMap;
use std::io::Write;
use std::path::PathBuf;

use scampr_nowcast::core::{publish, read_pointer};
use scampr_nowcast::domain::{HandoffDocument, NowcastLatest, Timestamp};
use scampr_nowcast::PipelineError;
use serde::{Deserialize, Serialize};
use tempfile::TempDir;

/// Document whose non-string map keys JSON cannot represent once populated
#[derive(Debug, Default, PartialEq, Serialize, Deserialize)]
struct CellCounts(BTreeMap<(u8, u8), u8>);

impl HandoffDocument for CellCounts {
    const LABEL: &'static str = "cell-counts";
}

fn nowcast(time: &str) -> NowcastLatest {
    NowcastLatest {
        base_time: Timestamp::parse(time).unwrap(),
        file_path: PathBuf::from(format!("/nowcast/scampr_nowcast_steps_indonesia_{}.grid", time)),
        method: "steps".to_string(),
        members: 20,
        leadtimes: 12,
    }
}

#[test]
fn test_crash_mid_write_keeps_previous_document() {
    tokio_test::block_on(async {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("indonesia/nowcast_latest.json");
        publish(&path, &nowcast("202501151220")).await.unwrap();

        // A writer that died after a partial write leaves its temp file behind
        let mut partial = tempfile::Builder::new()
            .tempfile_in(path.parent().unwrap())
            .unwrap();
        partial.write_all(b"{\"base_time\": \"2025011512").unwrap();
        let leftover = partial.into_temp_path().keep().unwrap();

        let read: NowcastLatest = read_pointer(&path).await.unwrap();
        assert_eq!(read, nowcast("202501151220"));

        // The next successful publish replaces the document regardless
        publish(&path, &nowcast("202501151230")).await.unwrap();
        let read: NowcastLatest = read_pointer(&path).await.unwrap();
        assert_eq!(read, nowcast("202501151230"));
        assert!(leftover.exists());
    });
}

#[test]
fn test_document_is_always_complete_json() {
    tokio_test::block_on(async {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("nowcast_latest.json");

        for minute in ["1200", "1210", "1220", "1230"] {
            publish(&path, &nowcast(&format!("20250115{}", minute))).await.unwrap();
            let text = std::fs::read_to_string(&path).unwrap();
            let value: serde_json::Value = serde_json::from_str(&text).unwrap();
            assert_eq!(value["members"], 20);
        }
    });
}

#[test]
fn test_failed_publish_keeps_previous_document() {
    tokio_test::block_on(async {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("cell_counts.json");
        publish(&path, &CellCounts::default()).await.unwrap();
        let before = std::fs::read(&path).unwrap();

        let mut counts = CellCounts::default();
        counts.0.insert((1, 2), 3);
        let err = publish(&path, &counts).await.unwrap_err();

        match err {
            PipelineError::PublicationFailed { label, path: failed, .. } => {
                assert_eq!(label, "cell-counts");
                assert_eq!(failed, path);
            }
            other => panic!("unexpected error: {:?}", other),
        }
        assert_eq!(std::fs::read(&path).unwrap(), before);
        let read: CellCounts = read_pointer(&path).await.unwrap();
        assert_eq!(read, CellCounts::default());
        assert_eq!(std::fs::read_dir(temp.path()).unwrap().count(), 1);
    });
}
