//! Tracker configuration
//!
//! [`TrackerConfig`] bundles everything fixed at startup: the anchor table,
//! the estimator tuning, the range smoother and the cycle timing. Builders
//! follow the `with_*` pattern and [`TrackerConfig::validate`] is the single
//! place malformed input is turned away; the cycle controller refuses to
//! start on an invalid configuration.
//!
//! ```rust
//! use uwbtrack_core::TrackerConfig;
//!
//! let config = TrackerConfig::default()
//!     .with_window(3)
//!     .with_gating_multiplier(8.0);
//! assert!(config.validate().is_ok());
//!
//! // Three anchors is the minimum for a 2-D fix
//! assert!(TrackerConfig::default().with_min_anchors(2).validate().is_err());
//! ```

use core::ops::Index;

use crate::constants::*;
use crate::errors::{TrackingError, TrackingResult};
use crate::linalg::SquareMatrix;
use crate::noise::MeasurementNoiseConfig;

/// Fixed 2-D anchor position in meters
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct AnchorPoint {
    /// X coordinate (m)
    pub x: f32,
    /// Y coordinate (m)
    pub y: f32,
}

impl AnchorPoint {
    /// Anchor at (x, y)
    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    /// Euclidean distance to a point
    pub fn distance_to(&self, x: f32, y: f32) -> f32 {
        let dx = x - self.x;
        let dy = y - self.y;
        libm::sqrtf(dx * dx + dy * dy)
    }
}

/// Ordered anchor table, indexed by anchor id
///
/// Never changes once the controller is built.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AnchorSet<const N: usize = ANCHOR_COUNT> {
    points: [AnchorPoint; N],
}

impl<const N: usize> AnchorSet<N> {
    /// Anchor table from points
    pub const fn new(points: [AnchorPoint; N]) -> Self {
        Self { points }
    }

    /// Anchor table from `(x, y)` pairs
    pub fn from_coords(coords: [(f32, f32); N]) -> Self {
        Self {
            points: coords.map(|(x, y)| AnchorPoint::new(x, y)),
        }
    }

    /// Anchor by id
    pub fn get(&self, index: usize) -> Option<&AnchorPoint> {
        self.points.get(index)
    }

    /// All anchors
    pub fn points(&self) -> &[AnchorPoint; N] {
        &self.points
    }

    /// Iterate in id order
    pub fn iter(&self) -> core::slice::Iter<'_, AnchorPoint> {
        self.points.iter()
    }

    /// Number of anchors
    pub const fn len(&self) -> usize {
        N
    }

    /// True only for a zero-anchor table
    pub const fn is_empty(&self) -> bool {
        N == 0
    }

    /// Distances from a point to every anchor
    pub fn ranges_from(&self, x: f32, y: f32) -> [f32; N] {
        self.points.map(|a| a.distance_to(x, y))
    }

    /// Coordinates must be finite and pairwise distinct
    pub fn validate(&self) -> TrackingResult<()> {
        if N < MIN_ANCHORS_FOR_UPDATE {
            return Err(TrackingError::InvalidConfig {
                reason: "at least three anchors are required",
            });
        }
        for (i, a) in self.points.iter().enumerate() {
            if !a.x.is_finite() || !a.y.is_finite() {
                return Err(TrackingError::InvalidConfig {
                    reason: "anchor coordinates must be finite",
                });
            }
            for b in &self.points[i + 1..] {
                if a.distance_to(b.x, b.y) < 1e-3 {
                    return Err(TrackingError::InvalidConfig {
                        reason: "anchors must be at distinct positions",
                    });
                }
            }
        }
        Ok(())
    }
}

impl<const N: usize> Index<usize> for AnchorSet<N> {
    type Output = AnchorPoint;

    fn index(&self, index: usize) -> &Self::Output {
        &self.points[index]
    }
}

impl Default for AnchorSet<ANCHOR_COUNT> {
    fn default() -> Self {
        Self::from_coords(DEFAULT_ANCHORS)
    }
}

// serde's derives stop at fixed array lengths, so the table is a plain
// sequence of N points on the wire.
#[cfg(feature = "serde")]
impl<const N: usize> serde::Serialize for AnchorSet<N> {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        use serde::ser::SerializeSeq;

        let mut seq = serializer.serialize_seq(Some(N))?;
        for point in &self.points {
            seq.serialize_element(point)?;
        }
        seq.end()
    }
}

#[cfg(feature = "serde")]
impl<'de, const N: usize> serde::Deserialize<'de> for AnchorSet<N> {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct AnchorVisitor<const N: usize>;

        impl<'de, const N: usize> serde::de::Visitor<'de> for AnchorVisitor<N> {
            type Value = AnchorSet<N>;

            fn expecting(&self, f: &mut core::fmt::Formatter) -> core::fmt::Result {
                write!(f, "a sequence of {} anchor points", N)
            }

            fn visit_seq<A: serde::de::SeqAccess<'de>>(self, mut seq: A) -> Result<Self::Value, A::Error> {
                let mut points = [AnchorPoint::default(); N];
                for (i, slot) in points.iter_mut().enumerate() {
                    *slot = seq
                        .next_element()?
                        .ok_or_else(|| serde::de::Error::invalid_length(i, &self))?;
                }
                if seq.next_element::<AnchorPoint>()?.is_some() {
                    return Err(serde::de::Error::invalid_length(N + 1, &self));
                }
                Ok(AnchorSet::new(points))
            }
        }

        deserializer.deserialize_seq(AnchorVisitor::<N>)
    }
}

/// How each anchor channel smooths its raw ranges
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum Smoothing {
    /// Arithmetic mean of the last `window` valid readings
    MovingAverage {
        /// Samples kept per channel
        window: usize,
    },
    /// Exponential average that skips isolated jumps
    SpikeRejectingEma {
        /// Weight of a new reading
        alpha: f32,
        /// Largest accepted jump (m) from the previous accepted reading
        spike_threshold: f32,
        /// Consecutive rejections after which the channel re-seeds
        reacquire_after: u32,
    },
}

impl Default for Smoothing {
    fn default() -> Self {
        Self::MovingAverage {
            window: DEFAULT_WINDOW,
        }
    }
}

impl Smoothing {
    /// Spike-rejecting EMA with default tuning
    pub const fn spike_rejecting() -> Self {
        Self::SpikeRejectingEma {
            alpha: DEFAULT_EMA_ALPHA,
            spike_threshold: DEFAULT_SPIKE_THRESHOLD_M,
            reacquire_after: DEFAULT_SPIKE_REACQUIRE_COUNT,
        }
    }

    fn validate(&self) -> TrackingResult<()> {
        match *self {
            Self::MovingAverage { window } => {
                if window == 0 || window > MAX_WINDOW {
                    return Err(TrackingError::InvalidConfig {
                        reason: "moving-average window must be within 1..=32",
                    });
                }
            }
            Self::SpikeRejectingEma { alpha, spike_threshold, reacquire_after } => {
                if !(alpha > 0.0 && alpha <= 1.0) {
                    return Err(TrackingError::InvalidConfig {
                        reason: "EMA alpha must be within (0, 1]",
                    });
                }
                if !(spike_threshold > 0.0) || !spike_threshold.is_finite() {
                    return Err(TrackingError::InvalidConfig {
                        reason: "spike threshold must be finite and positive",
                    });
                }
                if reacquire_after == 0 {
                    return Err(TrackingError::InvalidConfig {
                        reason: "reacquire count must be at least one",
                    });
                }
            }
        }
        Ok(())
    }
}

/// Tuning of the 4-state range EKF
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct EstimatorConfig {
    /// Fixed timestep (s); equals the cycle period
    pub dt: f32,
    /// Acceleration noise standard deviation (m/s²)
    pub accel_noise_std: f32,
    /// Initial variance of every state component
    pub initial_variance: f32,
    /// Fewest ranges for a correction
    pub min_anchors: usize,
    /// Mahalanobis gate per measurement
    pub gating_multiplier: f32,
    /// Per-range noise model
    pub noise: MeasurementNoiseConfig,
    /// Force a reseed when the last one is older than this (ms)
    pub reseed_timeout_ms: u64,
    /// Force a reseed when positional variance exceeds this (m²)
    pub reseed_variance_threshold: f32,
    /// Positional variance after a reseed (m²)
    pub reseed_position_variance: f32,
}

impl Default for EstimatorConfig {
    fn default() -> Self {
        Self {
            dt: DEFAULT_CYCLE_PERIOD_MS as f32 / 1000.0,
            accel_noise_std: DEFAULT_ACCEL_NOISE_STD,
            initial_variance: INITIAL_VARIANCE,
            min_anchors: MIN_ANCHORS_FOR_UPDATE,
            gating_multiplier: DEFAULT_GATING_MULTIPLIER,
            noise: MeasurementNoiseConfig::default(),
            reseed_timeout_ms: DEFAULT_RESEED_TIMEOUT_MS,
            reseed_variance_threshold: DEFAULT_RESEED_VARIANCE_THRESHOLD,
            reseed_position_variance: RESEED_POSITION_VARIANCE,
        }
    }
}

impl EstimatorConfig {
    /// Process noise Q for a constant-velocity model driven by white
    /// acceleration noise, state order [x, y, vx, vy]
    pub fn process_noise(&self) -> SquareMatrix<4> {
        let dt = self.dt;
        let s2 = self.accel_noise_std * self.accel_noise_std;
        let dt2 = dt * dt;
        let pos = s2 * dt2 * dt2 / 4.0;
        let cross = s2 * dt2 * dt / 2.0;
        let vel = s2 * dt2;

        [
            [pos, 0.0, cross, 0.0],
            [0.0, pos, 0.0, cross],
            [cross, 0.0, vel, 0.0],
            [0.0, cross, 0.0, vel],
        ]
    }

    fn validate(&self, anchor_count: usize) -> TrackingResult<()> {
        if !(self.dt > 0.0) || !self.dt.is_finite() {
            return Err(TrackingError::InvalidConfig { reason: "dt must be finite and positive" });
        }
        if !(self.accel_noise_std > 0.0) || !self.accel_noise_std.is_finite() {
            return Err(TrackingError::InvalidConfig {
                reason: "acceleration noise must be finite and positive",
            });
        }
        if !(self.initial_variance > 0.0) || !(self.reseed_position_variance > 0.0) {
            return Err(TrackingError::InvalidConfig { reason: "variances must be positive" });
        }
        if self.min_anchors < MIN_ANCHORS_FOR_UPDATE || self.min_anchors > anchor_count {
            return Err(TrackingError::InvalidConfig {
                reason: "min_anchors must be between 3 and the anchor count",
            });
        }
        if !(self.gating_multiplier > 0.0) {
            return Err(TrackingError::InvalidConfig { reason: "gating multiplier must be positive" });
        }
        if !(self.reseed_variance_threshold > 0.0) {
            return Err(TrackingError::InvalidConfig {
                reason: "reseed variance threshold must be positive",
            });
        }
        self.noise.validate()
    }
}

#[cfg(feature = "serde")]
fn default_period_ms() -> u32 {
    DEFAULT_CYCLE_PERIOD_MS
}

#[cfg(feature = "serde")]
fn default_min_sleep_ms() -> u32 {
    MIN_CYCLE_SLEEP_MS
}

#[cfg(feature = "serde")]
fn default_channel_timeout() -> u32 {
    DEFAULT_CHANNEL_TIMEOUT_CYCLES
}

/// Complete tracker configuration
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TrackerConfig<const N: usize = ANCHOR_COUNT> {
    /// Anchor table
    pub anchors: AnchorSet<N>,
    /// EKF tuning
    #[cfg_attr(feature = "serde", serde(default))]
    pub estimator: EstimatorConfig,
    /// Range smoother per channel
    #[cfg_attr(feature = "serde", serde(default))]
    pub smoothing: Smoothing,
    /// Cycle period (ms)
    #[cfg_attr(feature = "serde", serde(default = "default_period_ms"))]
    pub period_ms: u32,
    /// Floor on the sleep between cycles (ms)
    #[cfg_attr(feature = "serde", serde(default = "default_min_sleep_ms"))]
    pub min_sleep_ms: u32,
    /// Missed cycles before a channel is cleared
    #[cfg_attr(feature = "serde", serde(default = "default_channel_timeout"))]
    pub channel_timeout_cycles: u32,
}

impl Default for TrackerConfig<ANCHOR_COUNT> {
    fn default() -> Self {
        Self::new(AnchorSet::default())
    }
}

impl<const N: usize> TrackerConfig<N> {
    /// Default tuning around a custom anchor table
    pub fn new(anchors: AnchorSet<N>) -> Self {
        Self {
            anchors,
            estimator: EstimatorConfig::default(),
            smoothing: Smoothing::default(),
            period_ms: DEFAULT_CYCLE_PERIOD_MS,
            min_sleep_ms: MIN_CYCLE_SLEEP_MS,
            channel_timeout_cycles: DEFAULT_CHANNEL_TIMEOUT_CYCLES,
        }
    }

    /// Set the cycle period; the EKF timestep follows
    pub fn with_period_ms(mut self, period_ms: u32) -> Self {
        self.period_ms = period_ms;
        self.estimator.dt = period_ms as f32 / 1000.0;
        self
    }

    /// Set the moving-average window
    pub fn with_window(mut self, window: usize) -> Self {
        self.smoothing = Smoothing::MovingAverage { window };
        self
    }

    /// Set the range smoother
    pub fn with_smoothing(mut self, smoothing: Smoothing) -> Self {
        self.smoothing = smoothing;
        self
    }

    /// Set the acceleration noise standard deviation
    pub fn with_accel_noise(mut self, std: f32) -> Self {
        self.estimator.accel_noise_std = std;
        self
    }

    /// Set the Mahalanobis gate per measurement
    pub fn with_gating_multiplier(mut self, multiplier: f32) -> Self {
        self.estimator.gating_multiplier = multiplier;
        self
    }

    /// Set the fewest ranges for a correction
    pub fn with_min_anchors(mut self, min_anchors: usize) -> Self {
        self.estimator.min_anchors = min_anchors;
        self
    }

    /// Set the measurement-noise model
    pub fn with_noise(mut self, noise: MeasurementNoiseConfig) -> Self {
        self.estimator.noise = noise;
        self
    }

    /// Set the reseed timeout
    pub fn with_reseed_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.estimator.reseed_timeout_ms = timeout_ms;
        self
    }

    /// Set the missed-cycle limit per channel
    pub fn with_channel_timeout(mut self, cycles: u32) -> Self {
        self.channel_timeout_cycles = cycles;
        self
    }

    /// Startup checks; every failure is [`TrackingError::InvalidConfig`]
    pub fn validate(&self) -> TrackingResult<()> {
        self.anchors.validate()?;

        if self.period_ms == 0 {
            return Err(TrackingError::InvalidConfig { reason: "cycle period must be positive" });
        }
        let period_s = self.period_ms as f32 / 1000.0;
        if libm::fabsf(self.estimator.dt - period_s) > 1e-6 {
            return Err(TrackingError::InvalidConfig {
                reason: "estimator dt must equal the cycle period",
            });
        }
        if self.channel_timeout_cycles == 0 {
            return Err(TrackingError::InvalidConfig {
                reason: "channel timeout must be at least one cycle",
            });
        }

        self.smoothing.validate()?;
        self.estimator.validate(N)
    }
}
