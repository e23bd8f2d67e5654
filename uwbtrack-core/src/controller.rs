//! Real-Time Cycle Controller
//!
//! ## One Cycle
//!
//! ```text
//! ┌──────────┐   ┌──────────┐   ┌───────────────┐   ┌─────────┐   ┌──────────┐   ┌──────┐
//! │  ingest  │ → │  smooth  │ → │ reseed (cond.)│ → │ predict │ → │ correct  │ → │ emit │
//! │ raw + q  │   │ channels │   │ trilateration │   │         │   │ (cond.)  │   │      │
//! └──────────┘   └──────────┘   └───────────────┘   └─────────┘   └──────────┘   └──────┘
//! ```
//!
//! - Readings that are missing, NaN, infinite or not positive count as "no
//!   reading" for their anchor. Invalid ones are counted in [`CycleStats`].
//! - A reseed runs when enough anchors were heard and either the position
//!   variance is large or the last reseed is older than the timeout.
//! - Predict always runs. Correction needs `min_anchors` fresh ranges.
//! - Nothing in a cycle is fatal. Every failure degrades to a predict-only
//!   cycle and shows up in [`CycleReport::correction`].
//!
//! The controller owns all mutable tracking state: filters, estimator,
//! reseed clock and counters. Hardware sits behind [`RangeSource`], the
//! network behind [`TelemetrySink`].

use crate::{
    config::TrackerConfig,
    constants::ANCHOR_COUNT,
    ekf::{EstimatorState, RangeEkf, UpdateOutcome},
    errors::{TrackingError, TrackingResult},
    filter::{ChannelInput, FilterChannel},
    telemetry::{TelemetryFrame, TelemetrySink},
    time::Timestamp,
    trilateration::trilaterate,
};

#[cfg(feature = "std")]
use crate::time::{remaining_sleep_ms, TimeSource};

/// One raw reading for one anchor
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RangeSample {
    /// Anchor id
    pub anchor: usize,
    /// Distance (m); `None` when the anchor did not answer
    pub distance: Option<f32>,
    /// Link quality metric, if the module reports one
    pub quality: Option<f32>,
}

impl RangeSample {
    /// Reading without a quality metric
    pub const fn new(anchor: usize, distance: Option<f32>) -> Self {
        Self { anchor, distance, quality: None }
    }

    /// Attach a quality metric
    pub const fn with_quality(mut self, quality: f32) -> Self {
        self.quality = Some(quality);
        self
    }
}

/// Per-anchor ranging hardware
pub trait RangeSource {
    /// Called once at the start of every cycle, before any reading
    fn refresh(&mut self) {}

    /// Latest distance to `anchor` in meters, `None` without a reading
    fn distance(&mut self, anchor: usize) -> Option<f32>;

    /// Link quality for `anchor`, when the hardware reports one
    fn quality(&mut self, _anchor: usize) -> Option<f32> {
        None
    }
}

impl<S: RangeSource + ?Sized> RangeSource for &mut S {
    fn refresh(&mut self) {
        (**self).refresh()
    }

    fn distance(&mut self, anchor: usize) -> Option<f32> {
        (**self).distance(anchor)
    }

    fn quality(&mut self, anchor: usize) -> Option<f32> {
        (**self).quality(anchor)
    }
}

/// What happened to the correction step
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Correction {
    /// Ranges were fused into the estimate
    Applied(UpdateOutcome),
    /// Predict-only cycle, with the reason
    Skipped(TrackingError),
}

impl Correction {
    /// True when the estimate was corrected
    pub fn is_applied(&self) -> bool {
        matches!(self, Self::Applied(_))
    }
}

/// Result of one cycle
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CycleReport<const N: usize = ANCHOR_COUNT> {
    /// Cycle start
    pub timestamp: Timestamp,
    /// Estimate after the cycle
    pub state: EstimatorState,
    /// Filtered range per anchor; `None` for anchors not heard this cycle
    pub ranges: [Option<f32>; N],
    /// Estimator was hard-reset from trilateration
    pub reseeded: bool,
    /// Outcome of the correction step
    pub correction: Correction,
    /// Anchors with a fresh filtered range
    pub valid_anchors: usize,
}

impl<const N: usize> CycleReport<N> {
    /// Frame for the telemetry sink
    pub fn telemetry_frame(&self) -> TelemetryFrame<N> {
        TelemetryFrame {
            timestamp: self.timestamp,
            state: self.state,
            distances: self.ranges,
        }
    }
}

/// Running counters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CycleStats {
    /// Cycles run
    pub cycles: u64,
    /// Corrections applied, retried ones included
    pub corrections: u64,
    /// Inflated-noise retries attempted, whatever their outcome
    pub retries: u64,
    /// Corrections dropped by the gate after the retry
    pub rejections: u64,
    /// Corrections dropped for a singular innovation covariance
    pub singular_failures: u64,
    /// Cycles with too few anchors to correct
    pub predict_only: u64,
    /// Trilateration reseeds
    pub reseeds: u64,
    /// Reseeds attempted without a solution
    pub trilateration_failures: u64,
    /// Readings discarded as NaN, infinite or not positive
    pub invalid_samples: u64,
    /// Readings discarded by the spike-rejecting smoother
    pub spikes_rejected: u64,
    /// Telemetry frames the sink did not take
    pub telemetry_failures: u64,
}

/// Owner of the whole tracking pipeline
#[derive(Debug, Clone)]
pub struct CycleController<const N: usize = ANCHOR_COUNT> {
    config: TrackerConfig<N>,
    ekf: RangeEkf<N>,
    channels: [FilterChannel; N],
    last_reseed: Option<Timestamp>,
    stats: CycleStats,
}

impl<const N: usize> CycleController<N> {
    /// Validate the configuration and build the pipeline
    pub fn new(config: TrackerConfig<N>) -> TrackingResult<Self> {
        config.validate()?;
        log_info!("tracker ready: {} anchors, period {} ms", N, config.period_ms);

        Ok(Self {
            ekf: RangeEkf::new(config.anchors, config.estimator),
            channels: Self::fresh_channels(&config),
            last_reseed: None,
            stats: CycleStats::default(),
            config,
        })
    }

    fn fresh_channels(config: &TrackerConfig<N>) -> [FilterChannel; N] {
        core::array::from_fn(|i| FilterChannel::new(i, &config.smoothing, config.channel_timeout_cycles))
    }

    /// Run one cycle on readings already taken
    ///
    /// Anchors absent from `samples` count as missing. A sample for an
    /// unknown anchor id is counted as invalid and ignored.
    pub fn step_samples(&mut self, samples: &[RangeSample], now: Timestamp) -> CycleReport<N> {
        let mut raw = [None; N];
        let mut quality = [None; N];
        for sample in samples {
            if sample.anchor < N {
                raw[sample.anchor] = sample.distance;
                quality[sample.anchor] = sample.quality;
            } else {
                self.stats.invalid_samples += 1;
            }
        }
        self.cycle(&raw, &quality, now)
    }

    /// Read every anchor from `source` and run one cycle
    pub fn step<S: RangeSource + ?Sized>(&mut self, source: &mut S, now: Timestamp) -> CycleReport<N> {
        source.refresh();

        let mut raw = [None; N];
        let mut quality = [None; N];
        for i in 0..N {
            raw[i] = source.distance(i);
            quality[i] = source.quality(i);
        }
        self.cycle(&raw, &quality, now)
    }

    /// [`step`](Self::step), then hand the frame to `sink`
    ///
    /// A failed send is logged and counted, never retried.
    pub fn step_and_emit<S, T>(&mut self, source: &mut S, sink: &mut T, now: Timestamp) -> CycleReport<N>
    where
        S: RangeSource + ?Sized,
        T: TelemetrySink<N> + ?Sized,
    {
        let report = self.step(source, now);
        if sink.send(&report.telemetry_frame()).is_err() {
            self.stats.telemetry_failures += 1;
            log_warn!("telemetry send failed at t={} ms", now);
        }
        report
    }

    fn cycle(
        &mut self,
        raw: &[Option<f32>; N],
        quality: &[Option<f32>; N],
        now: Timestamp,
    ) -> CycleReport<N> {
        self.stats.cycles += 1;

        // Smooth
        let mut ranges = [None; N];
        for (i, channel) in self.channels.iter_mut().enumerate() {
            match channel.ingest(raw[i]) {
                ChannelInput::Invalid => self.stats.invalid_samples += 1,
                ChannelInput::Rejected => self.stats.spikes_rejected += 1,
                ChannelInput::Accepted | ChannelInput::Missing => {}
            }
            ranges[i] = channel.fresh_mean();
        }
        let valid = ranges.iter().filter(|r| r.is_some()).count();
        let min_anchors = self.config.estimator.min_anchors;

        // Reseed
        let reseeded = valid >= min_anchors && self.reseed_due(now) && self.try_reseed(&ranges, now);

        self.ekf.predict();

        // Correct
        let correction = if valid >= min_anchors {
            let sigmas = self
                .config
                .estimator
                .noise
                .sigmas(&ranges, quality, &self.ekf.predicted_ranges());
            self.correct(&ranges, &sigmas)
        } else {
            self.stats.predict_only += 1;
            Correction::Skipped(TrackingError::InsufficientAnchors {
                required: min_anchors,
                available: valid,
            })
        };

        CycleReport {
            timestamp: now,
            state: self.ekf.snapshot(),
            ranges,
            reseeded,
            correction,
            valid_anchors: valid,
        }
    }

    fn reseed_due(&self, now: Timestamp) -> bool {
        let estimator = &self.config.estimator;
        if self.ekf.position_variance() > estimator.reseed_variance_threshold {
            return true;
        }
        match self.last_reseed {
            Some(last) => now.saturating_sub(last) > estimator.reseed_timeout_ms,
            None => true,
        }
    }

    fn try_reseed(&mut self, ranges: &[Option<f32>; N], now: Timestamp) -> bool {
        match trilaterate(&self.config.anchors, ranges, self.config.estimator.min_anchors) {
            Ok(position) if position.x.is_finite() && position.y.is_finite() => {
                log_debug!("reseed at ({}, {})", position.x, position.y);
                self.ekf.reseed(position);
                self.last_reseed = Some(now);
                self.stats.reseeds += 1;
                true
            }
            _ => {
                log_debug!("trilateration found no solution, reseed skipped");
                self.stats.trilateration_failures += 1;
                false
            }
        }
    }

    fn correct(&mut self, ranges: &[Option<f32>; N], sigmas: &[f32; N]) -> Correction {
        let result = match self.ekf.try_update(ranges, sigmas) {
            Err(TrackingError::GatingRejected { distance, threshold }) => {
                log_debug!("gating rejected ({} > {}), retrying with inflated noise", distance, threshold);
                self.stats.retries += 1;
                self.ekf.retry_inflated(ranges, sigmas)
            }
            other => other,
        };

        match result {
            Ok(outcome) => {
                self.stats.corrections += 1;
                Correction::Applied(outcome)
            }
            Err(e) => {
                match e {
                    TrackingError::GatingRejected { .. } => self.stats.rejections += 1,
                    TrackingError::SingularMatrix => self.stats.singular_failures += 1,
                    TrackingError::InsufficientAnchors { .. } => self.stats.predict_only += 1,
                    TrackingError::InvalidConfig { .. } => {}
                }
                Correction::Skipped(e)
            }
        }
    }

    /// Cycle forever until `stop` is set
    ///
    /// `stop` is checked between cycles only. Each cycle is followed by a
    /// sleep of the period minus the processing time, floored at the
    /// configured minimum.
    #[cfg(feature = "std")]
    pub fn run<S, T, C>(
        &mut self,
        source: &mut S,
        sink: &mut T,
        clock: &C,
        stop: &core::sync::atomic::AtomicBool,
    ) -> CycleStats
    where
        S: RangeSource + ?Sized,
        T: TelemetrySink<N> + ?Sized,
        C: TimeSource + ?Sized,
    {
        use core::sync::atomic::Ordering;

        log_info!("tracking loop started, period {} ms", self.config.period_ms);

        while !stop.load(Ordering::Relaxed) {
            let start = clock.now();
            self.step_and_emit(source, sink, start);

            let elapsed = clock.elapsed_since(start);
            let sleep_ms = remaining_sleep_ms(self.config.period_ms, elapsed, self.config.min_sleep_ms);
            std::thread::sleep(std::time::Duration::from_millis(sleep_ms));
        }

        log_info!("tracking loop stopped after {} cycles", self.stats.cycles);
        self.stats
    }

    /// Current estimate
    pub fn state(&self) -> EstimatorState {
        self.ekf.snapshot()
    }

    /// The estimator
    pub fn estimator(&self) -> &RangeEkf<N> {
        &self.ekf
    }

    /// Mutable estimator, for seeding a known start position
    pub fn estimator_mut(&mut self) -> &mut RangeEkf<N> {
        &mut self.ekf
    }

    /// Per-anchor channels
    pub fn channels(&self) -> &[FilterChannel; N] {
        &self.channels
    }

    /// Time of the last reseed
    pub fn last_reseed(&self) -> Option<Timestamp> {
        self.last_reseed
    }

    /// Counters since construction or the last reset
    pub fn stats(&self) -> &CycleStats {
        &self.stats
    }

    /// Configuration in use
    pub fn config(&self) -> &TrackerConfig<N> {
        &self.config
    }

    /// Forget everything: estimate, channel history, reseed clock, counters
    pub fn reset(&mut self) {
        self.ekf.reset();
        self.channels = Self::fresh_channels(&self.config);
        self.last_reseed = None;
        self.stats = CycleStats::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{AnchorSet, Smoothing};
    use crate::telemetry::NullSink;

    const PERIOD: u64 = 200;

    fn samples_at(x: f32, y: f32) -> [RangeSample; 4] {
        let ranges = AnchorSet::default().ranges_from(x, y);
        core::array::from_fn(|i| RangeSample::new(i, Some(ranges[i])))
    }

    struct FixedSource {
        ranges: [Option<f32>; 4],
        refreshed: u32,
    }

    impl RangeSource for FixedSource {
        fn refresh(&mut self) {
            self.refreshed += 1;
        }

        fn distance(&mut self, anchor: usize) -> Option<f32> {
            self.ranges[anchor]
        }

        fn quality(&mut self, _anchor: usize) -> Option<f32> {
            Some(90.0)
        }
    }

    struct RejectingSink;

    impl TelemetrySink<4> for RejectingSink {
        type Error = ();

        fn send(&mut self, _frame: &TelemetryFrame<4>) -> Result<(), ()> {
            Err(())
        }
    }

    #[test]
    fn invalid_config_is_refused() {
        let config = TrackerConfig::default().with_window(0);
        assert!(matches!(
            CycleController::new(config),
            Err(TrackingError::InvalidConfig { .. })
        ));
    }

    #[test]
    fn first_cycle_reseeds_and_corrects() {
        let mut tracker = CycleController::new(TrackerConfig::default()).unwrap();
        let report = tracker.step_samples(&samples_at(0.85, 3.15), PERIOD);

        assert!(report.reseeded);
        assert!(report.correction.is_applied());
        assert_eq!(report.valid_anchors, 4);
        assert!((report.state.x - 0.85).abs() < 1e-3);
        assert!((report.state.y - 3.15).abs() < 1e-3);
        assert_eq!(tracker.last_reseed(), Some(PERIOD));
        assert_eq!(tracker.stats().reseeds, 1);
    }

    #[test]
    fn reseed_waits_for_timeout() {
        let mut tracker = CycleController::new(TrackerConfig::default()).unwrap();
        let samples = samples_at(0.85, 3.15);

        let mut reseeds = 0;
        for k in 1..=30u64 {
            if tracker.step_samples(&samples, k * PERIOD).reseeded {
                reseeds += 1;
            }
        }
        // t = 200 and then the first cycle more than 5 s later (t = 5400)
        assert_eq!(reseeds, 2);
        assert_eq!(tracker.last_reseed(), Some(27 * PERIOD));
    }

    #[test]
    fn two_anchors_is_predict_only() {
        let mut tracker = CycleController::new(TrackerConfig::default()).unwrap();
        let samples = [
            RangeSample::new(0, Some(3.0)),
            RangeSample::new(1, Some(f32::NAN)),
            RangeSample::new(2, Some(3.0)),
            RangeSample::new(3, Some(-1.0)),
        ];
        let report = tracker.step_samples(&samples, PERIOD);

        assert!(!report.reseeded);
        assert_eq!(
            report.correction,
            Correction::Skipped(TrackingError::InsufficientAnchors { required: 3, available: 2 })
        );
        assert_eq!(report.ranges, [Some(3.0), None, Some(3.0), None]);
        assert_eq!(tracker.stats().invalid_samples, 2);
        assert_eq!(tracker.stats().predict_only, 1);
        // Predict ran: uncertainty grew from the initial value
        assert!(tracker.estimator().position_variance() > 1.0);
    }

    #[test]
    fn overflowing_range_is_discarded() {
        let mut tracker = CycleController::new(TrackerConfig::default()).unwrap();
        let mut samples = samples_at(0.85, 3.15);
        samples[0].distance = Some(3.0e19);

        let report = tracker.step_samples(&samples, PERIOD);

        assert!(report.reseeded);
        assert_eq!(report.ranges[0], None);
        assert_eq!(report.valid_anchors, 3);
        assert_eq!(tracker.stats().invalid_samples, 1);
        let state = tracker.state();
        assert!([state.x, state.y, state.vx, state.vy].iter().all(|v| v.is_finite()));
        assert!((state.x - 0.85).abs() < 1e-2);
        assert!((state.y - 3.15).abs() < 1e-2);
    }

    #[test]
    fn unknown_anchor_is_counted() {
        let mut tracker = CycleController::new(TrackerConfig::default()).unwrap();
        tracker.step_samples(&[RangeSample::new(7, Some(2.0))], PERIOD);
        assert_eq!(tracker.stats().invalid_samples, 1);
    }

    #[test]
    fn source_is_polled_every_cycle() {
        let ranges = AnchorSet::default().ranges_from(1.0, 2.0).map(Some);
        let mut source = FixedSource { ranges, refreshed: 0 };
        let mut tracker = CycleController::new(TrackerConfig::default()).unwrap();

        for k in 1..=3 {
            tracker.step(&mut source, k * PERIOD);
        }
        assert_eq!(source.refreshed, 3);
        assert!((tracker.state().x - 1.0).abs() < 1e-3);
    }

    #[test]
    fn telemetry_failure_is_not_fatal() {
        let ranges = AnchorSet::default().ranges_from(1.0, 2.0).map(Some);
        let mut source = FixedSource { ranges, refreshed: 0 };
        let mut tracker = CycleController::new(TrackerConfig::default()).unwrap();

        for k in 1..=4 {
            let report = tracker.step_and_emit(&mut source, &mut RejectingSink, k * PERIOD);
            assert!(report.correction.is_applied());
        }
        assert_eq!(tracker.stats().telemetry_failures, 4);
        assert_eq!(tracker.stats().cycles, 4);

        tracker.step_and_emit(&mut source, &mut NullSink, 5 * PERIOD);
        assert_eq!(tracker.stats().telemetry_failures, 4);
    }

    #[test]
    fn frame_mirrors_report() {
        let mut tracker = CycleController::new(TrackerConfig::default()).unwrap();
        let mut samples = samples_at(0.85, 3.15);
        samples[1].distance = None;

        let report = tracker.step_samples(&samples, PERIOD);
        let frame = report.telemetry_frame();
        assert_eq!(frame.timestamp, PERIOD);
        assert_eq!(frame.state, report.state);
        assert_eq!(frame.distances[1], None);
        assert_eq!(frame.valid_distances(), 3);
    }

    #[test]
    fn spike_smoother_counts_rejections() {
        let config = TrackerConfig::default().with_smoothing(Smoothing::spike_rejecting());
        let mut tracker = CycleController::new(config).unwrap();
        let mut samples = samples_at(0.85, 3.15);

        tracker.step_samples(&samples, PERIOD);
        samples[0].distance = samples[0].distance.map(|d| d + 3.0);
        tracker.step_samples(&samples, 2 * PERIOD);

        assert_eq!(tracker.stats().spikes_rejected, 1);
        assert!((tracker.state().x - 0.85).abs() < 0.05);
    }

    #[test]
    fn reset_forgets_everything() {
        let mut tracker = CycleController::new(TrackerConfig::default()).unwrap();
        tracker.step_samples(&samples_at(0.85, 3.15), PERIOD);

        tracker.reset();

        assert_eq!(tracker.state(), EstimatorState::default());
        assert_eq!(tracker.last_reseed(), None);
        assert_eq!(tracker.stats().cycles, 0);
        assert!(tracker.channels().iter().all(|c| !c.ready()));
    }
}
