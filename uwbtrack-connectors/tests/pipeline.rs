//! End-to-end: JSON configuration, tracking cycles, CSV log behind a forwarder

use std::fs;

use uwbtrack_connectors::csv_log::CsvLogSink;
use uwbtrack_connectors::forward::TelemetryForwarder;
use uwbtrack_connectors::load_tracker_config;
use uwbtrack_core::{AnchorSet, CycleController, RangeSource, TrackerConfig};

/// Noise-free ranges from a fixed point, anchor 2 silent
struct StillTag {
    anchors: AnchorSet,
    position: (f32, f32),
}

impl RangeSource for StillTag {
    fn distance(&mut self, anchor: usize) -> Option<f32> {
        if anchor == 2 {
            return None;
        }
        Some(self.anchors[anchor].distance_to(self.position.0, self.position.1))
    }
}

#[test]
fn logs_every_cycle_from_loaded_config() {
    let dir = tempfile::tempdir().unwrap();
    let config_path = dir.path().join("tracker.json");
    let log_path = dir.path().join("tracking_log.csv");

    fs::write(
        &config_path,
        r#"{
            "anchors": [{"x": 0.0, "y": 0.0}, {"x": 1.7, "y": 0.0},
                        {"x": 0.0, "y": 6.3}, {"x": 1.7, "y": 6.3}],
            "smoothing": {"moving_average": {"window": 1}}
        }"#,
    )
    .unwrap();

    let config: TrackerConfig = load_tracker_config(&config_path).unwrap();
    let mut tracker = CycleController::new(config).unwrap();
    let mut tag = StillTag {
        anchors: config.anchors,
        position: (0.85, 3.15),
    };

    let log: CsvLogSink<fs::File> = CsvLogSink::create(&log_path).unwrap();
    let mut forwarder: TelemetryForwarder = TelemetryForwarder::spawn(log, 32).unwrap();

    for k in 1..=10u64 {
        tracker.step_and_emit(&mut tag, &mut forwarder, k * 200);
    }
    let stats = forwarder.shutdown();

    assert_eq!(stats.messages_sent, 10);
    assert_eq!(tracker.stats().telemetry_failures, 0);

    let text = fs::read_to_string(&log_path).unwrap();
    let rows: Vec<Vec<&str>> = text.lines().map(|l| l.split(',').collect()).collect();
    assert_eq!(rows.len(), 11);
    assert_eq!(rows[0], ["timestamp", "dist0", "dist1", "dist2", "dist3", "x", "y"]);

    let last = rows.last().unwrap();
    assert_eq!(last.len(), 7);
    assert_eq!(last[3], "");
    let x: f32 = last[5].parse().unwrap();
    let y: f32 = last[6].parse().unwrap();
    assert!((x - 0.85).abs() < 1e-3 && (y - 3.15).abs() < 1e-3, "({}, {})", x, y);
}
