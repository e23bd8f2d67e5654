//! Common test utilities for tracking integration tests
//!
//! - [`SimulatedTag`]: a range source over the default anchor layout with
//!   seeded Gaussian noise, per-anchor dropouts and biases
//! - Recording and failing telemetry sinks
//! - Small statistics helpers

#![allow(dead_code)]

pub mod sinks;

use rand::{rngs::StdRng, SeedableRng};
use rand_distr::{Distribution, Normal};

use uwbtrack_core::{AnchorSet, CycleController, CycleReport, RangeSource, Timestamp, TrackerConfig};

/// Cycle period used by every scenario (ms)
pub const PERIOD_MS: Timestamp = 200;

/// Tag moving over the default four-anchor layout
pub struct SimulatedTag {
    anchors: AnchorSet<4>,
    position: (f32, f32),
    noise: Normal<f32>,
    rng: StdRng,
    dropped: [bool; 4],
    bias: [f32; 4],
    quality: Option<f32>,
}

impl SimulatedTag {
    /// Tag at the origin, ranging noise `noise_std` (m)
    pub fn new(seed: u64, noise_std: f32) -> Self {
        Self {
            anchors: AnchorSet::default(),
            position: (0.0, 0.0),
            noise: Normal::new(0.0, noise_std).unwrap(),
            rng: StdRng::seed_from_u64(seed),
            dropped: [false; 4],
            bias: [0.0; 4],
            quality: None,
        }
    }

    /// Noise-free tag
    pub fn exact() -> Self {
        Self::new(0, 0.0)
    }

    pub fn at(mut self, x: f32, y: f32) -> Self {
        self.position = (x, y);
        self
    }

    pub fn move_to(&mut self, x: f32, y: f32) {
        self.position = (x, y);
    }

    pub fn drop_anchor(&mut self, anchor: usize) {
        self.dropped[anchor] = true;
    }

    pub fn silence(&mut self) {
        self.dropped = [true; 4];
    }

    pub fn restore_all(&mut self) {
        self.dropped = [false; 4];
    }

    /// Constant offset added to one anchor's readings
    pub fn set_bias(&mut self, anchor: usize, bias: f32) {
        self.bias[anchor] = bias;
    }

    pub fn report_quality(&mut self, quality: Option<f32>) {
        self.quality = quality;
    }

    pub fn true_ranges(&self) -> [f32; 4] {
        self.anchors.ranges_from(self.position.0, self.position.1)
    }
}

impl RangeSource for SimulatedTag {
    fn distance(&mut self, anchor: usize) -> Option<f32> {
        if self.dropped[anchor] {
            return None;
        }
        let (x, y) = self.position;
        let truth = self.anchors[anchor].distance_to(x, y);
        Some(truth + self.bias[anchor] + self.noise.sample(&mut self.rng))
    }

    fn quality(&mut self, _anchor: usize) -> Option<f32> {
        self.quality
    }
}

/// Default tracker with the given moving-average window
pub fn tracker_with_window(window: usize) -> CycleController {
    CycleController::new(TrackerConfig::default().with_window(window)).unwrap()
}

/// Run `cycles` cycles starting at cycle index `first`, tag held in place
pub fn run_stationary(
    tracker: &mut CycleController,
    tag: &mut SimulatedTag,
    first: u64,
    cycles: u64,
) -> CycleReport {
    let mut last = None;
    for k in first..first + cycles {
        last = Some(tracker.step(tag, k * PERIOD_MS));
    }
    last.expect("at least one cycle")
}

pub fn distance(a: (f32, f32), b: (f32, f32)) -> f32 {
    let dx = a.0 - b.0;
    let dy = a.1 - b.1;
    (dx * dx + dy * dy).sqrt()
}

pub fn median(values: &mut [f32]) -> f32 {
    values.sort_by(|a, b| a.partial_cmp(b).unwrap());
    values[values.len() / 2]
}
