//! Error Types for the Positioning Core
//!
//! ## Design Philosophy
//!
//! The tracker runs in a fixed-period loop on the tag. None of these errors is
//! allowed to end that loop; each one maps to a degraded cycle:
//!
//! | Error                 | Cycle outcome                                  |
//! |-----------------------|------------------------------------------------|
//! | `SingularMatrix`      | trilateration: no solution; EKF: update failed |
//! | `InsufficientAnchors` | no reseed and/or predict-only cycle            |
//! | `GatingRejected`      | one inflated-noise retry, then predict-only    |
//! | `InvalidConfig`       | startup only, before the loop exists           |
//!
//! Errors are `Copy` and carry only numbers and `&'static str` reasons, so they
//! can be stored in a cycle report without allocating.
//!
//! Range readings that are NaN, infinite or non-positive are not errors: they
//! are filtered out before smoothing and counted in the cycle statistics.
//!
//! ## Example
//!
//! ```rust
//! use uwbtrack_core::{TrackingError, linalg::invert};
//!
//! let singular = [[1.0, 2.0], [2.0, 4.0]];
//! let mut inverse = [[0.0; 2]; 2];
//! assert_eq!(invert(&singular, &mut inverse), Err(TrackingError::SingularMatrix));
//! ```

use thiserror_no_std::Error;

/// Result type for positioning operations
pub type TrackingResult<T> = Result<T, TrackingError>;

/// Positioning errors - kept small for embedded use
#[derive(Error, Debug, Clone, Copy, PartialEq)]
pub enum TrackingError {
    /// No usable pivot during inversion or solve
    #[error("Matrix is singular: no pivot above epsilon")]
    SingularMatrix,

    /// Fewer valid ranges than the operation needs
    #[error("Insufficient anchors: need {required}, have {available}")]
    InsufficientAnchors {
        /// Minimum number of anchors with a valid range
        required: usize,
        /// Anchors with a valid range this cycle
        available: usize,
    },

    /// Innovation is statistically too far from the prediction
    #[error("Gating rejected update: Mahalanobis distance {distance} exceeds {threshold}")]
    GatingRejected {
        /// Squared Mahalanobis distance of the innovation
        distance: f32,
        /// Gate threshold (multiplier × measurement count)
        threshold: f32,
    },

    /// Configuration rejected at startup
    #[error("Invalid configuration: {reason}")]
    InvalidConfig {
        /// Which check failed
        reason: &'static str,
    },
}

#[cfg(feature = "defmt")]
impl defmt::Format for TrackingError {
    fn format(&self, fmt: defmt::Formatter) {
        match self {
            Self::SingularMatrix =>
                defmt::write!(fmt, "Singular matrix"),
            Self::InsufficientAnchors { required, available } =>
                defmt::write!(fmt, "Need {} anchors, have {}", required, available),
            Self::GatingRejected { distance, threshold } =>
                defmt::write!(fmt, "Gated: {} > {}", distance, threshold),
            Self::InvalidConfig { reason } =>
                defmt::write!(fmt, "Invalid config: {}", reason),
        }
    }
}
