//! Per-anchor range smoothing
//!
//! Every anchor has one [`FilterChannel`]. The channel drops invalid readings,
//! feeds valid ones to its smoother and keeps track of whether it heard from
//! its anchor this cycle. A channel that stays silent for too long is cleared
//! so a reacquired anchor starts from fresh readings rather than ranges taken
//! before the dropout.
//!
//! Two smoothers are available:
//!
//! - [`MovingAverage`]: arithmetic mean of the last W valid readings.
//! - [`SpikeRejectingEma`]: exponential average that ignores a reading which
//!   jumps too far from the previous accepted one, and re-seeds after a run of
//!   such jumps so a tag that really moved is picked up again.
//!
//! ```rust
//! use uwbtrack_core::filter::MovingAverage;
//!
//! let mut ma = MovingAverage::new(3);
//! assert_eq!(ma.mean(), None);
//!
//! for r in [1.0, 2.0, 3.0, 4.0] {
//!     ma.add(r);
//! }
//! // 1.0 was evicted
//! assert_eq!(ma.mean(), Some(3.0));
//! ```

use heapless::Deque;

use crate::config::Smoothing;
use crate::constants::{MAX_RANGE_M, MAX_WINDOW};

/// Keep a reading only if it is a strictly positive distance no larger
/// than [`MAX_RANGE_M`]
pub fn sanitize_range(reading: Option<f32>) -> Option<f32> {
    reading.filter(|d| *d > 0.0 && *d <= MAX_RANGE_M)
}

/// Bounded FIFO mean
#[derive(Debug, Clone)]
pub struct MovingAverage {
    samples: Deque<f32, MAX_WINDOW>,
    window: usize,
}

impl MovingAverage {
    /// Empty filter; `window` is clamped to `1..=MAX_WINDOW`
    pub fn new(window: usize) -> Self {
        Self {
            samples: Deque::new(),
            window: window.clamp(1, MAX_WINDOW),
        }
    }

    /// Window length
    pub fn window(&self) -> usize {
        self.window
    }

    /// Append a reading, evicting the oldest once the window is full
    pub fn add(&mut self, value: f32) {
        while self.samples.len() >= self.window {
            self.samples.pop_front();
        }
        // Room was made above and window <= capacity
        let _ = self.samples.push_back(value);
    }

    /// Mean of the stored readings, `None` when empty
    pub fn mean(&self) -> Option<f32> {
        if self.samples.is_empty() {
            return None;
        }
        let sum: f32 = self.samples.iter().sum();
        Some(sum / self.samples.len() as f32)
    }

    /// At least one reading stored
    pub fn ready(&self) -> bool {
        !self.samples.is_empty()
    }

    /// Stored readings
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// No readings stored
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Oldest to newest
    pub fn iter(&self) -> impl Iterator<Item = &f32> {
        self.samples.iter()
    }

    /// Drop every stored reading
    pub fn clear(&mut self) {
        self.samples.clear();
    }
}

/// Exponential smoother that skips isolated jumps
#[derive(Debug, Clone)]
pub struct SpikeRejectingEma {
    alpha: f32,
    threshold: f32,
    reacquire_after: u32,
    estimate: Option<f32>,
    last_accepted: Option<f32>,
    rejected_run: u32,
}

impl SpikeRejectingEma {
    /// Empty smoother
    pub fn new(alpha: f32, threshold: f32, reacquire_after: u32) -> Self {
        Self {
            alpha,
            threshold,
            reacquire_after,
            estimate: None,
            last_accepted: None,
            rejected_run: 0,
        }
    }

    /// Feed a reading; returns whether it was accepted
    ///
    /// The jump is measured against the previous accepted raw reading, not
    /// against the smoothed value.
    pub fn add(&mut self, value: f32) -> bool {
        let (estimate, last) = match (self.estimate, self.last_accepted) {
            (Some(e), Some(l)) => (e, l),
            _ => {
                self.seed(value);
                return true;
            }
        };

        if libm::fabsf(value - last) > self.threshold {
            if self.rejected_run >= self.reacquire_after {
                log_debug!("range channel re-seeded after {} rejected readings", self.rejected_run);
                self.seed(value);
                return true;
            }
            self.rejected_run += 1;
            return false;
        }

        self.estimate = Some(self.alpha * value + (1.0 - self.alpha) * estimate);
        self.last_accepted = Some(value);
        self.rejected_run = 0;
        true
    }

    fn seed(&mut self, value: f32) {
        self.estimate = Some(value);
        self.last_accepted = Some(value);
        self.rejected_run = 0;
    }

    /// Smoothed range, `None` before the first reading
    pub fn mean(&self) -> Option<f32> {
        self.estimate
    }

    /// At least one reading accepted
    pub fn ready(&self) -> bool {
        self.estimate.is_some()
    }

    /// Consecutive rejected readings
    pub fn rejected_run(&self) -> u32 {
        self.rejected_run
    }

    /// Forget all history
    pub fn clear(&mut self) {
        self.estimate = None;
        self.last_accepted = None;
        self.rejected_run = 0;
    }
}

/// Smoother selected by [`Smoothing`]
#[derive(Debug, Clone)]
pub enum RangeSmoother {
    /// See [`MovingAverage`]
    MovingAverage(MovingAverage),
    /// See [`SpikeRejectingEma`]
    SpikeRejectingEma(SpikeRejectingEma),
}

impl RangeSmoother {
    /// Build the configured smoother
    pub fn from_config(smoothing: &Smoothing) -> Self {
        match *smoothing {
            Smoothing::MovingAverage { window } => Self::MovingAverage(MovingAverage::new(window)),
            Smoothing::SpikeRejectingEma { alpha, spike_threshold, reacquire_after } => {
                Self::SpikeRejectingEma(SpikeRejectingEma::new(alpha, spike_threshold, reacquire_after))
            }
        }
    }

    /// Feed a valid reading; false when the smoother discarded it
    pub fn add(&mut self, value: f32) -> bool {
        match self {
            Self::MovingAverage(ma) => {
                ma.add(value);
                true
            }
            Self::SpikeRejectingEma(ema) => ema.add(value),
        }
    }

    /// Current smoothed range
    pub fn mean(&self) -> Option<f32> {
        match self {
            Self::MovingAverage(ma) => ma.mean(),
            Self::SpikeRejectingEma(ema) => ema.mean(),
        }
    }

    /// Has a value to report
    pub fn ready(&self) -> bool {
        match self {
            Self::MovingAverage(ma) => ma.ready(),
            Self::SpikeRejectingEma(ema) => ema.ready(),
        }
    }

    /// Forget all history
    pub fn clear(&mut self) {
        match self {
            Self::MovingAverage(ma) => ma.clear(),
            Self::SpikeRejectingEma(ema) => ema.clear(),
        }
    }
}

/// What one cycle's reading did to a channel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelInput {
    /// Valid reading, taken by the smoother
    Accepted,
    /// Valid reading the smoother discarded as a spike
    Rejected,
    /// Reading present but NaN, infinite or not positive
    Invalid,
    /// No reading this cycle
    Missing,
}

/// Smoothing state of one anchor
#[derive(Debug, Clone)]
pub struct FilterChannel {
    anchor: usize,
    smoother: RangeSmoother,
    timeout_cycles: u32,
    missed_cycles: u32,
    fresh: bool,
}

impl FilterChannel {
    /// Empty channel for `anchor`
    pub fn new(anchor: usize, smoothing: &Smoothing, timeout_cycles: u32) -> Self {
        Self {
            anchor,
            smoother: RangeSmoother::from_config(smoothing),
            timeout_cycles,
            missed_cycles: 0,
            fresh: false,
        }
    }

    /// Anchor this channel belongs to
    pub fn anchor(&self) -> usize {
        self.anchor
    }

    /// Take this cycle's raw reading
    ///
    /// Any valid reading, spike or not, counts as hearing from the anchor.
    /// Invalid and missing readings both count as a miss.
    pub fn ingest(&mut self, reading: Option<f32>) -> ChannelInput {
        let input = match (reading, sanitize_range(reading)) {
            (_, Some(value)) => {
                if self.smoother.add(value) {
                    ChannelInput::Accepted
                } else {
                    ChannelInput::Rejected
                }
            }
            (Some(_), None) => ChannelInput::Invalid,
            (None, None) => ChannelInput::Missing,
        };

        match input {
            ChannelInput::Accepted | ChannelInput::Rejected => {
                self.missed_cycles = 0;
                self.fresh = self.smoother.ready();
            }
            ChannelInput::Invalid | ChannelInput::Missing => {
                self.fresh = false;
                self.missed_cycles = self.missed_cycles.saturating_add(1);
                if self.missed_cycles >= self.timeout_cycles && self.smoother.ready() {
                    log_debug!("anchor {} silent for {} cycles, channel cleared", self.anchor, self.missed_cycles);
                    self.smoother.clear();
                }
            }
        }
        input
    }

    /// Smoothed range if the anchor was heard this cycle
    pub fn fresh_mean(&self) -> Option<f32> {
        if self.fresh {
            self.smoother.mean()
        } else {
            None
        }
    }

    /// Smoothed range regardless of freshness
    pub fn mean(&self) -> Option<f32> {
        self.smoother.mean()
    }

    /// Has any history
    pub fn ready(&self) -> bool {
        self.smoother.ready()
    }

    /// Heard from the anchor this cycle
    pub fn is_fresh(&self) -> bool {
        self.fresh
    }

    /// Consecutive cycles without a valid reading
    pub fn missed_cycles(&self) -> u32 {
        self.missed_cycles
    }

    /// Forget all history
    pub fn reset(&mut self) {
        self.smoother.clear();
        self.missed_cycles = 0;
        self.fresh = false;
    }
}
