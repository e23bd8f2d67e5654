//! Tracker configuration from JSON
//!
//! Only `anchors` is required; every other field falls back to the tag
//! defaults. The result is validated before it is returned.
//!
//! ```json
//! {
//!   "anchors": [{"x": 0.0, "y": 0.0}, {"x": 1.7, "y": 0.0},
//!               {"x": 0.0, "y": 6.3}, {"x": 1.7, "y": 6.3}],
//!   "smoothing": {"moving_average": {"window": 3}},
//!   "estimator": {"accel_noise_std": 0.5}
//! }
//! ```

use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use uwbtrack_core::TrackerConfig;

use crate::ConnectorError;

/// Parse and validate a configuration document
pub fn parse_tracker_config<const N: usize>(json: &str) -> Result<TrackerConfig<N>, ConnectorError> {
    let config: TrackerConfig<N> =
        serde_json::from_str(json).map_err(|e| ConnectorError::ConfigError(e.to_string()))?;
    checked(config)
}

/// Read, parse and validate a configuration file
pub fn load_tracker_config<const N: usize>(
    path: impl AsRef<Path>,
) -> Result<TrackerConfig<N>, ConnectorError> {
    let path = path.as_ref();
    let reader = BufReader::new(File::open(path)?);
    let config: TrackerConfig<N> = serde_json::from_reader(reader)
        .map_err(|e| ConnectorError::ConfigError(format!("{}: {}", path.display(), e)))?;
    log::info!("loaded tracker configuration from {}", path.display());
    checked(config)
}

fn checked<const N: usize>(config: TrackerConfig<N>) -> Result<TrackerConfig<N>, ConnectorError> {
    config
        .validate()
        .map_err(|e| ConnectorError::ConfigError(e.to_string()))?;
    Ok(config)
}
