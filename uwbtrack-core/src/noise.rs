//! Adaptive measurement noise
//!
//! Each range gets its own standard deviation. A quality metric, when the
//! ranging module reports one, moves the sigma between a trusted and an
//! untrusted bound. A range that disagrees with the current prediction by
//! more than [`DEVIATION_THRESHOLD_M`] is treated as a likely non-line-of-sight
//! reading and its sigma is raised to a floor instead of being thrown away.

use crate::constants::{
    DEFAULT_RANGE_SIGMA, DEVIATION_SIGMA_FLOOR, DEVIATION_THRESHOLD_M, HIGH_QUALITY_RANGE_SIGMA,
    HIGH_QUALITY_THRESHOLD, LOW_QUALITY_RANGE_SIGMA, LOW_QUALITY_THRESHOLD,
};
use crate::errors::{TrackingError, TrackingResult};

/// Measurement-noise model for range readings
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct MeasurementNoiseConfig {
    /// Sigma (m) when the reading carries no quality metric
    pub default_sigma: f32,
    /// Sigma (m) at or above `high_quality_threshold`; the lower bound
    pub min_sigma: f32,
    /// Sigma (m) at or below `low_quality_threshold`; the upper bound
    pub max_sigma: f32,
    /// Quality at which `min_sigma` applies
    pub high_quality_threshold: f32,
    /// Quality at which `max_sigma` applies
    pub low_quality_threshold: f32,
    /// Range/prediction disagreement (m) that marks a reading as suspect
    pub deviation_threshold: f32,
    /// Smallest sigma (m) for a suspect reading
    pub deviation_sigma_floor: f32,
}

impl Default for MeasurementNoiseConfig {
    fn default() -> Self {
        Self {
            default_sigma: DEFAULT_RANGE_SIGMA,
            min_sigma: HIGH_QUALITY_RANGE_SIGMA,
            max_sigma: LOW_QUALITY_RANGE_SIGMA,
            high_quality_threshold: HIGH_QUALITY_THRESHOLD,
            low_quality_threshold: LOW_QUALITY_THRESHOLD,
            deviation_threshold: DEVIATION_THRESHOLD_M,
            deviation_sigma_floor: DEVIATION_SIGMA_FLOOR,
        }
    }
}

impl MeasurementNoiseConfig {
    /// Set the sigma used without a quality metric
    pub fn with_default_sigma(mut self, sigma: f32) -> Self {
        self.default_sigma = sigma;
        self
    }

    /// Set the sigma bounds
    pub fn with_bounds(mut self, min_sigma: f32, max_sigma: f32) -> Self {
        self.min_sigma = min_sigma;
        self.max_sigma = max_sigma;
        self
    }

    /// Set the suspect-reading threshold and floor
    pub fn with_deviation(mut self, threshold: f32, sigma_floor: f32) -> Self {
        self.deviation_threshold = threshold;
        self.deviation_sigma_floor = sigma_floor;
        self
    }

    /// Sigma for a reading with the given quality metric
    ///
    /// Piecewise linear between the two quality thresholds, clamped outside
    /// them. A missing or non-finite quality yields `default_sigma`.
    pub fn sigma_for(&self, quality: Option<f32>) -> f32 {
        let q = match quality {
            Some(q) if q.is_finite() => q,
            _ => return self.default_sigma,
        };

        if q >= self.high_quality_threshold {
            self.min_sigma
        } else if q <= self.low_quality_threshold {
            self.max_sigma
        } else {
            let s = (q - self.low_quality_threshold)
                / (self.high_quality_threshold - self.low_quality_threshold);
            self.max_sigma * (1.0 - s) + self.min_sigma * s
        }
    }

    /// Apply the suspect-reading floor to `sigma`
    pub fn inflate_for_deviation(&self, sigma: f32, measured: f32, predicted: f32) -> f32 {
        if libm::fabsf(measured - predicted) > self.deviation_threshold {
            sigma.max(self.deviation_sigma_floor)
        } else {
            sigma
        }
    }

    /// Per-anchor sigmas for one cycle
    ///
    /// Entries without a measurement keep `default_sigma`; the EKF ignores
    /// them.
    pub fn sigmas<const N: usize>(
        &self,
        measured: &[Option<f32>; N],
        qualities: &[Option<f32>; N],
        predicted: &[f32; N],
    ) -> [f32; N] {
        let mut sigmas = [self.default_sigma; N];
        for i in 0..N {
            if let Some(z) = measured[i] {
                let sigma = self.sigma_for(qualities[i]);
                sigmas[i] = self.inflate_for_deviation(sigma, z, predicted[i]);
            }
        }
        sigmas
    }

    /// Startup checks
    pub fn validate(&self) -> TrackingResult<()> {
        let sigmas = [self.default_sigma, self.min_sigma, self.max_sigma, self.deviation_sigma_floor];
        if sigmas.iter().any(|s| !s.is_finite() || *s <= 0.0) {
            return Err(TrackingError::InvalidConfig {
                reason: "measurement sigmas must be finite and positive",
            });
        }
        if self.min_sigma > self.max_sigma {
            return Err(TrackingError::InvalidConfig {
                reason: "min_sigma exceeds max_sigma",
            });
        }
        if !(self.high_quality_threshold > self.low_quality_threshold) {
            return Err(TrackingError::InvalidConfig {
                reason: "quality thresholds must be ordered low < high",
            });
        }
        if !(self.deviation_threshold > 0.0) {
            return Err(TrackingError::InvalidConfig {
                reason: "deviation threshold must be positive",
            });
        }
        Ok(())
    }
}
