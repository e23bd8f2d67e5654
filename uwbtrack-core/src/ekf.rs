//! Range-Only Extended Kalman Filter
//!
//! ## Model
//!
//! State `[x, y, vx, vy]`, constant velocity between cycles:
//!
//! ```text
//! Predict:   x̂ = F·x          F = [1 0 dt 0; 0 1 0 dt; 0 0 1 0; 0 0 0 1]
//!            P = F·P·Fᵀ + Q
//! ```
//!
//! Each anchor with a range contributes one nonlinear measurement
//! `h_i(x) = ‖p − a_i‖`, linearized around the prediction:
//!
//! ```text
//! H_i  = [(x − ax)/h_i, (y − ay)/h_i, 0, 0]
//! S    = H·P·Hᵀ + diag(σ²)
//! δ    = yᵀ·S⁻¹·y                      gate: δ ≤ multiplier × m
//! K    = P·Hᵀ·S⁻¹
//! x̂    = x̂ + K·y
//! P    = (I − K·H)·P·(I − K·H)ᵀ + K·diag(σ²)·Kᵀ
//! ```
//!
//! ## Fixed Shapes
//!
//! The measurement side is always N rows, one per anchor. An anchor without
//! a range gets a zero Jacobian row, zero innovation and a unit diagonal in
//! S, which makes its Kalman gain column exactly zero. The gate still counts
//! only the `m` anchors that actually reported.
//!
//! ## Failure Semantics
//!
//! [`RangeEkf::try_update`] computes everything before touching the state, so
//! every error leaves the prior belief exactly as it was.

use crate::{
    config::{AnchorSet, EstimatorConfig},
    constants::{GATING_RETRY_INFLATION, MIN_PREDICTED_RANGE},
    errors::{TrackingError, TrackingResult},
    linalg::{
        add, diagonal, identity, invert, make_symmetric, matvec, multiply, subtract, transpose,
        Matrix, SquareMatrix, Vector,
    },
    trilateration::Position,
};

/// State dimension: x, y, vx, vy
pub const STATE_DIM: usize = 4;

/// Position and velocity snapshot
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct EstimatorState {
    /// X position (m)
    pub x: f32,
    /// Y position (m)
    pub y: f32,
    /// X velocity (m/s)
    pub vx: f32,
    /// Y velocity (m/s)
    pub vy: f32,
}

impl EstimatorState {
    /// Position part
    pub fn position(&self) -> Position {
        Position { x: self.x, y: self.y }
    }

    fn as_vector(&self) -> Vector<STATE_DIM> {
        [self.x, self.y, self.vx, self.vy]
    }

    fn from_vector(v: &Vector<STATE_DIM>) -> Self {
        Self { x: v[0], y: v[1], vx: v[2], vy: v[3] }
    }
}

/// Result of an accepted correction
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct UpdateOutcome {
    /// Squared Mahalanobis distance of the innovation
    pub mahalanobis: f32,
    /// Gate it was compared against
    pub threshold: f32,
    /// Ranges used
    pub measurements: usize,
    /// Accepted only after the inflated-noise retry
    pub retried: bool,
}

/// 4-state constant-velocity EKF over anchor ranges
#[derive(Debug, Clone)]
pub struct RangeEkf<const N: usize> {
    state: Vector<STATE_DIM>,
    covariance: SquareMatrix<STATE_DIM>,
    anchors: AnchorSet<N>,
    transition: SquareMatrix<STATE_DIM>,
    process_noise: SquareMatrix<STATE_DIM>,
    config: EstimatorConfig,
}

impl<const N: usize> RangeEkf<N> {
    /// Filter at the origin with covariance `initial_variance · I`
    pub fn new(anchors: AnchorSet<N>, config: EstimatorConfig) -> Self {
        let dt = config.dt;
        let mut transition = identity();
        transition[0][2] = dt;
        transition[1][3] = dt;

        Self {
            state: [0.0; STATE_DIM],
            covariance: diagonal(&[config.initial_variance; STATE_DIM]),
            anchors,
            transition,
            process_noise: config.process_noise(),
            config,
        }
    }

    /// Propagate one timestep
    pub fn predict(&mut self) {
        let mut next = [0.0; STATE_DIM];
        matvec(&self.transition, &self.state, &mut next);
        self.state = next;

        let mut fp = [[0.0; STATE_DIM]; STATE_DIM];
        multiply(&self.transition, &self.covariance, &mut fp);

        let mut f_t = [[0.0; STATE_DIM]; STATE_DIM];
        transpose(&self.transition, &mut f_t);

        let mut fpf_t = [[0.0; STATE_DIM]; STATE_DIM];
        multiply(&fp, &f_t, &mut fpf_t);

        add(&fpf_t, &self.process_noise, &mut self.covariance);
        make_symmetric(&mut self.covariance);
    }

    /// Range from the current position estimate to every anchor
    pub fn predicted_ranges(&self) -> [f32; N] {
        self.anchors.ranges_from(self.state[0], self.state[1])
    }

    /// Single correction attempt; on any error the state is unchanged
    ///
    /// `ranges[i]` and `sigmas[i]` belong to anchor `i`. Sigmas of anchors
    /// without a range are ignored.
    pub fn try_update(
        &mut self,
        ranges: &[Option<f32>; N],
        sigmas: &[f32; N],
    ) -> TrackingResult<UpdateOutcome> {
        let m = ranges.iter().filter(|r| r.is_some()).count();
        if m < self.config.min_anchors {
            return Err(TrackingError::InsufficientAnchors {
                required: self.config.min_anchors,
                available: m,
            });
        }

        // Jacobian, innovation and noise, one row per anchor
        let mut h: Matrix<N, STATE_DIM> = [[0.0; STATE_DIM]; N];
        let mut innovation: Vector<N> = [0.0; N];
        let mut r_var: Vector<N> = [0.0; N];
        for (i, range) in ranges.iter().enumerate() {
            let z = match range {
                Some(z) => *z,
                None => continue,
            };
            let dx = self.state[0] - self.anchors[i].x;
            let dy = self.state[1] - self.anchors[i].y;
            let predicted = libm::sqrtf(dx * dx + dy * dy).max(MIN_PREDICTED_RANGE);

            h[i] = [dx / predicted, dy / predicted, 0.0, 0.0];
            innovation[i] = z - predicted;
            r_var[i] = sigmas[i] * sigmas[i];
        }

        // S = H·P·Hᵀ + R
        let mut h_t: Matrix<STATE_DIM, N> = [[0.0; N]; STATE_DIM];
        transpose(&h, &mut h_t);

        let mut hp: Matrix<N, STATE_DIM> = [[0.0; STATE_DIM]; N];
        multiply(&h, &self.covariance, &mut hp);

        let mut s: SquareMatrix<N> = [[0.0; N]; N];
        multiply(&hp, &h_t, &mut s);
        for i in 0..N {
            s[i][i] += if ranges[i].is_some() { r_var[i] } else { 1.0 };
        }

        let mut s_inv: SquareMatrix<N> = [[0.0; N]; N];
        if let Err(e) = invert(&s, &mut s_inv) {
            log_warn!("innovation covariance is singular, update skipped");
            return Err(e);
        }

        // Gate on δ = yᵀ·S⁻¹·y
        let mut s_inv_y: Vector<N> = [0.0; N];
        matvec(&s_inv, &innovation, &mut s_inv_y);
        let mahalanobis: f32 = innovation.iter().zip(s_inv_y.iter()).map(|(a, b)| a * b).sum();
        let threshold = self.config.gating_multiplier * m as f32;

        if !(mahalanobis <= threshold) {
            return Err(TrackingError::GatingRejected {
                distance: mahalanobis,
                threshold,
            });
        }

        // K = P·Hᵀ·S⁻¹
        let mut ph_t: Matrix<STATE_DIM, N> = [[0.0; N]; STATE_DIM];
        multiply(&self.covariance, &h_t, &mut ph_t);

        let mut gain: Matrix<STATE_DIM, N> = [[0.0; N]; STATE_DIM];
        multiply(&ph_t, &s_inv, &mut gain);

        let mut correction = [0.0; STATE_DIM];
        matvec(&gain, &innovation, &mut correction);
        for (x, dx) in self.state.iter_mut().zip(correction.iter()) {
            *x += dx;
        }

        self.joseph_update(&gain, &h, &r_var);

        Ok(UpdateOutcome {
            mahalanobis,
            threshold,
            measurements: m,
            retried: false,
        })
    }

    /// P = (I − K·H)·P·(I − K·H)ᵀ + K·R·Kᵀ
    fn joseph_update(
        &mut self,
        gain: &Matrix<STATE_DIM, N>,
        h: &Matrix<N, STATE_DIM>,
        r_var: &Vector<N>,
    ) {
        let mut kh = [[0.0; STATE_DIM]; STATE_DIM];
        multiply(gain, h, &mut kh);

        let mut i_kh = [[0.0; STATE_DIM]; STATE_DIM];
        subtract(&identity(), &kh, &mut i_kh);

        let mut i_kh_t = [[0.0; STATE_DIM]; STATE_DIM];
        transpose(&i_kh, &mut i_kh_t);

        let mut temp = [[0.0; STATE_DIM]; STATE_DIM];
        multiply(&i_kh, &self.covariance, &mut temp);

        let mut projected = [[0.0; STATE_DIM]; STATE_DIM];
        multiply(&temp, &i_kh_t, &mut projected);

        let r: SquareMatrix<N> = diagonal(r_var);
        let mut kr: Matrix<STATE_DIM, N> = [[0.0; N]; STATE_DIM];
        multiply(gain, &r, &mut kr);

        let mut k_t: Matrix<N, STATE_DIM> = [[0.0; STATE_DIM]; N];
        transpose(gain, &mut k_t);

        let mut krk_t = [[0.0; STATE_DIM]; STATE_DIM];
        multiply(&kr, &k_t, &mut krk_t);

        add(&projected, &krk_t, &mut self.covariance);
        make_symmetric(&mut self.covariance);
    }

    /// Correction with one inflated-noise retry
    ///
    /// A gate rejection is retried exactly once through
    /// [`retry_inflated`](Self::retry_inflated). Other failures are returned
    /// as they are.
    pub fn update(
        &mut self,
        ranges: &[Option<f32>; N],
        sigmas: &[f32; N],
    ) -> TrackingResult<UpdateOutcome> {
        match self.try_update(ranges, sigmas) {
            Err(TrackingError::GatingRejected { distance, threshold }) => {
                log_debug!("gating rejected ({} > {}), retrying with inflated noise", distance, threshold);
                self.retry_inflated(ranges, sigmas)
            }
            other => other,
        }
    }

    /// Second correction attempt with every sigma multiplied by four
    ///
    /// Whatever the result, the attempt counts as a retry; a success is
    /// marked `retried`.
    pub fn retry_inflated(
        &mut self,
        ranges: &[Option<f32>; N],
        sigmas: &[f32; N],
    ) -> TrackingResult<UpdateOutcome> {
        let inflated = sigmas.map(|s| s * GATING_RETRY_INFLATION);
        match self.try_update(ranges, &inflated) {
            Ok(outcome) => Ok(UpdateOutcome { retried: true, ..outcome }),
            Err(e) => {
                log_warn!("update abandoned after inflated retry: {}", e);
                Err(e)
            }
        }
    }

    /// Hard reset to a trilateration fix
    ///
    /// Velocity is zeroed, so its variance returns to the initial value along
    /// with the positional reset.
    pub fn reseed(&mut self, position: Position) {
        self.state = [position.x, position.y, 0.0, 0.0];
        let pv = self.config.reseed_position_variance;
        let vv = self.config.initial_variance;
        self.covariance = diagonal(&[pv, pv, vv, vv]);
    }

    /// Overwrite the state and optionally the covariance
    pub fn set_state(&mut self, state: EstimatorState, covariance: Option<SquareMatrix<STATE_DIM>>) {
        self.state = state.as_vector();
        if let Some(p) = covariance {
            self.covariance = p;
            make_symmetric(&mut self.covariance);
        }
    }

    /// Back to the origin with the initial covariance
    pub fn reset(&mut self) {
        self.state = [0.0; STATE_DIM];
        self.covariance = diagonal(&[self.config.initial_variance; STATE_DIM]);
    }

    /// Current estimate
    pub fn snapshot(&self) -> EstimatorState {
        EstimatorState::from_vector(&self.state)
    }

    /// Current position estimate
    pub fn position(&self) -> Position {
        Position { x: self.state[0], y: self.state[1] }
    }

    /// State covariance
    pub fn covariance(&self) -> &SquareMatrix<STATE_DIM> {
        &self.covariance
    }

    /// Larger of the x and y variances
    pub fn position_variance(&self) -> f32 {
        self.covariance[0][0].max(self.covariance[1][1])
    }

    /// Anchor table the measurement model uses
    pub fn anchors(&self) -> &AnchorSet<N> {
        &self.anchors
    }

    /// Tuning
    pub fn config(&self) -> &EstimatorConfig {
        &self.config
    }
}
