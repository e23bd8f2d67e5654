//! Positioning core for a UWB ranging tag
//!
//! Turns per-anchor range readings into a 2-D position and velocity estimate.
//! Designed to run on the tag itself, one fixed-period cycle at a time.
//!
//! Key constraints:
//! - No heap allocation anywhere in the cycle
//! - Fixed-size (≤4×4) matrix math, `f32` throughout
//! - A bad reading, a singular matrix or a dropped anchor never stops the loop
//!
//! ```no_run
//! use uwbtrack_core::{CycleController, TrackerConfig, RangeSample};
//!
//! let mut tracker = CycleController::new(TrackerConfig::default()).unwrap();
//!
//! let samples = [
//!     RangeSample::new(0, Some(3.26)),
//!     RangeSample::new(1, Some(3.26)),
//!     RangeSample::new(2, Some(3.26)),
//!     RangeSample::new(3, None), // anchor 3 missed this cycle
//! ];
//! let report = tracker.step_samples(&samples, 200);
//! let state = report.state;
//! ```

#![cfg_attr(not(feature = "std"), no_std)]
#![deny(unsafe_code)]
#![warn(missing_docs)]

#[macro_use]
mod logging;

pub mod config;
pub mod constants;
pub mod controller;
pub mod ekf;
pub mod errors;
pub mod filter;
pub mod linalg;
pub mod noise;
pub mod telemetry;
pub mod time;
pub mod trilateration;

// Public API
pub use config::{AnchorPoint, AnchorSet, EstimatorConfig, Smoothing, TrackerConfig};
pub use controller::{Correction, CycleController, CycleReport, CycleStats, RangeSample, RangeSource};
pub use ekf::{EstimatorState, RangeEkf, UpdateOutcome};
pub use errors::{TrackingError, TrackingResult};
pub use noise::MeasurementNoiseConfig;
pub use telemetry::{NullSink, TelemetryFrame, TelemetrySink};
pub use time::{FixedTime, TimeSource, Timestamp};
pub use trilateration::{trilaterate, Position};

#[cfg(feature = "std")]
pub use time::MonotonicClock;

/// Crate version, from Cargo metadata
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_exists() {
        assert!(!VERSION.is_empty());
    }
}
