//! Tracker Constants
//!
//! Defaults for the anchor layout, the cycle timing, the range filter and
//! the EKF. Every tunable here is also a field of [`TrackerConfig`] so a
//! deployment can override it; the numerical guards at the bottom are not.
//!
//! ## Usage Guidelines
//!
//! 1. Use these constants instead of magic numbers
//! 2. Distances are meters, times are milliseconds unless the name says otherwise
//! 3. Standard deviations are named `*_STD` / `*_SIGMA`, variances `*_VARIANCE`
//!
//! [`TrackerConfig`]: crate::config::TrackerConfig

// ===== ANCHOR LAYOUT =====

/// Number of anchors in the default deployment.
pub const ANCHOR_COUNT: usize = 4;

/// Anchor coordinates of the default deployment, in meters.
///
/// A 1.7 m × 6.3 m rectangle with anchor 0 at the origin, listed row by
/// row: the two anchors at y = 0 first, then the two at y = 6.3. These are
/// the fixed coordinates the tag firmware ships with.
pub const DEFAULT_ANCHORS: [(f32, f32); ANCHOR_COUNT] = [
    (0.0, 0.0),
    (1.7, 0.0),
    (0.0, 6.3),
    (1.7, 6.3),
];

// ===== CYCLE TIMING =====

/// Fixed cycle period (5 Hz).
///
/// Must match the ranging interval programmed into the UWB module so each
/// cycle sees at most one fresh reading per anchor.
pub const DEFAULT_CYCLE_PERIOD_MS: u32 = 200;

/// Lower bound on the sleep between cycles.
///
/// Keeps an overrunning cycle from turning the loop into a busy spin.
pub const MIN_CYCLE_SLEEP_MS: u32 = 10;

/// Consecutive cycles without a valid reading before a channel is cleared.
pub const DEFAULT_CHANNEL_TIMEOUT_CYCLES: u32 = 5;

// ===== RANGE SMOOTHING =====

/// Moving-average window per anchor channel.
pub const DEFAULT_WINDOW: usize = 5;

/// Largest window a channel buffer can hold.
pub const MAX_WINDOW: usize = 32;

/// EMA weight of a new reading in the spike-rejecting smoother.
pub const DEFAULT_EMA_ALPHA: f32 = 0.4;

/// Largest jump (m) between consecutive accepted raw readings.
pub const DEFAULT_SPIKE_THRESHOLD_M: f32 = 0.5;

/// Consecutive rejected readings after which the EMA re-seeds.
pub const DEFAULT_SPIKE_REACQUIRE_COUNT: u32 = 5;

// ===== PROCESS MODEL =====

/// Acceleration noise standard deviation (m/s²).
///
/// Larger values track turns faster but pass more ranging noise into the
/// estimate.
pub const DEFAULT_ACCEL_NOISE_STD: f32 = 0.8;

/// Initial variance for every state component.
pub const INITIAL_VARIANCE: f32 = 1.0;

// ===== MEASUREMENT NOISE =====

/// Range standard deviation used when no quality metric is available.
pub const DEFAULT_RANGE_SIGMA: f32 = 0.2;

/// Range standard deviation at or above [`HIGH_QUALITY_THRESHOLD`].
pub const HIGH_QUALITY_RANGE_SIGMA: f32 = 0.12;

/// Range standard deviation at or below [`LOW_QUALITY_THRESHOLD`].
pub const LOW_QUALITY_RANGE_SIGMA: f32 = 0.6;

/// Quality metric at which a reading is fully trusted.
pub const HIGH_QUALITY_THRESHOLD: f32 = 80.0;

/// Quality metric at which a reading is least trusted.
pub const LOW_QUALITY_THRESHOLD: f32 = 30.0;

/// Range/prediction disagreement (m) that marks a channel as suspect.
pub const DEVIATION_THRESHOLD_M: f32 = 1.2;

/// Minimum standard deviation for a suspect channel.
pub const DEVIATION_SIGMA_FLOOR: f32 = 1.0;

// ===== GATING =====

/// Mahalanobis gate per measurement.
///
/// The gate is `multiplier × m` for `m` ranges, a loose chi-square bound
/// (χ²₄ at 99.9% is ~18.5, the default gate for four ranges is 24).
pub const DEFAULT_GATING_MULTIPLIER: f32 = 6.0;

/// Factor applied to every range sigma for the single retry after a gate
/// rejection.
pub const GATING_RETRY_INFLATION: f32 = 4.0;

/// Fewest ranges that constrain a 2-D position.
pub const MIN_ANCHORS_FOR_UPDATE: usize = 3;

// ===== RESEEDING =====

/// Time without a trilateration reseed after which the next one is forced.
pub const DEFAULT_RESEED_TIMEOUT_MS: u64 = 5_000;

/// Positional variance (m²) above which the estimate is considered lost.
pub const DEFAULT_RESEED_VARIANCE_THRESHOLD: f32 = 5.0;

/// Positional variance (m²) assigned after a reseed.
pub const RESEED_POSITION_VARIANCE: f32 = 0.5;

// ===== TELEMETRY =====

/// Upper bound on one telemetry send.
pub const TELEMETRY_TIMEOUT_MS: u64 = 1_000;

// ===== NUMERICAL GUARDS =====

/// Smallest pivot accepted by elimination.
pub const PIVOT_EPSILON: f32 = 1e-10;

/// Largest range accepted as a reading (m).
///
/// Anything beyond this is a radio fault, not a distance.
pub const MAX_RANGE_M: f32 = 1_000.0;

/// Smallest |det(AᵀA)| accepted by the trilateration normal equations.
pub const NORMAL_MATRIX_DET_EPSILON: f32 = 1e-6;

/// Floor on a predicted range, keeps the Jacobian finite at an anchor.
pub const MIN_PREDICTED_RANGE: f32 = 1e-6;
