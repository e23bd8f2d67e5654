//! Simulated Walk Example
//!
//! Walks a simulated tag around the corridor covered by the default
//! four-anchor layout and prints the estimate every cycle, the way the tag
//! prints it on its serial console.
//!
//! ## What You'll See
//!
//! - Trilateration seeding the filter on the first cycle
//! - Anchor 3 dropping out for two seconds without losing track
//! - A 4 m multipath spike on anchor 1 being gated
//!
//! ## Running the Example
//!
//! ```bash
//! cargo run --example 01_simulated_walk
//! ```

use std::convert::Infallible;

use rand::{rngs::StdRng, SeedableRng};
use rand_distr::{Distribution, Normal};

use uwbtrack_core::{
    AnchorSet, Correction, CycleController, RangeSource, TelemetryFrame, TelemetrySink,
    TrackerConfig,
};

const PERIOD_MS: u64 = 200;
const CYCLES: u64 = 150;

/// Tag following a rectangle at walking pace
struct WalkingTag {
    anchors: AnchorSet,
    position: (f32, f32),
    noise: Normal<f32>,
    rng: StdRng,
    dropped: Option<usize>,
    spike: Option<(usize, f32)>,
}

impl WalkingTag {
    fn new() -> Self {
        Self {
            anchors: AnchorSet::default(),
            position: (0.3, 0.5),
            noise: Normal::new(0.0, 0.05).unwrap(),
            rng: StdRng::seed_from_u64(2024),
            dropped: None,
            spike: None,
        }
    }

    /// Position along a 1.1 m × 5.3 m loop, one lap every 20 s
    fn walk_to(&mut self, t_s: f32) {
        let (w, h) = (1.1, 5.3);
        let perimeter = 2.0 * (w + h);
        let s = (t_s / 20.0).fract() * perimeter;
        let (x, y) = if s < h {
            (0.3, 0.5 + s)
        } else if s < h + w {
            (0.3 + (s - h), 0.5 + h)
        } else if s < 2.0 * h + w {
            (0.3 + w, 0.5 + h - (s - h - w))
        } else {
            (0.3 + w - (s - 2.0 * h - w), 0.5)
        };
        self.position = (x, y);
    }
}

impl RangeSource for WalkingTag {
    fn distance(&mut self, anchor: usize) -> Option<f32> {
        if self.dropped == Some(anchor) {
            return None;
        }
        let (x, y) = self.position;
        let mut d = self.anchors[anchor].distance_to(x, y) + self.noise.sample(&mut self.rng);
        if let Some((spiked, extra)) = self.spike {
            if spiked == anchor {
                d += extra;
            }
        }
        Some(d)
    }
}

/// Prints each frame as a console line
struct ConsoleSink;

impl TelemetrySink<4> for ConsoleSink {
    type Error = Infallible;

    fn send(&mut self, frame: &TelemetryFrame<4>) -> Result<(), Infallible> {
        let dists: Vec<String> = frame
            .distances
            .iter()
            .map(|d| d.map_or_else(|| "N/A".to_string(), |v| format!("{:.2}", v)))
            .collect();
        println!(
            "{:>6} ms  POS: {:6.3},{:6.3}  V: {:6.3},{:6.3}  d=[{}]",
            frame.timestamp,
            frame.state.x,
            frame.state.y,
            frame.state.vx,
            frame.state.vy,
            dists.join(", ")
        );
        Ok(())
    }
}

fn main() {
    println!("UWB Tag Tracking - Simulated Walk");
    println!("=================================\n");

    let mut tracker = match CycleController::new(TrackerConfig::default()) {
        Ok(tracker) => tracker,
        Err(e) => {
            eprintln!("configuration rejected: {}", e);
            return;
        }
    };
    let mut tag = WalkingTag::new();
    let mut sink = ConsoleSink;
    let mut worst_error: f32 = 0.0;

    for k in 1..=CYCLES {
        let now = k * PERIOD_MS;
        tag.walk_to(now as f32 / 1000.0);

        // Anchor 3 out between 8 s and 10 s, one spike at 15 s
        tag.dropped = if (40..50).contains(&k) { Some(3) } else { None };
        tag.spike = if k == 75 { Some((1, 4.0)) } else { None };

        let report = tracker.step_and_emit(&mut tag, &mut sink, now);

        if report.reseeded {
            println!("          reseeded from trilateration");
        }
        if let Correction::Skipped(reason) = report.correction {
            println!("          no correction: {}", reason);
        }

        if k > 10 {
            let dx = report.state.x - tag.position.0;
            let dy = report.state.y - tag.position.1;
            worst_error = worst_error.max((dx * dx + dy * dy).sqrt());
        }
    }

    let stats = tracker.stats();
    println!("\nSummary");
    println!("-------");
    println!("cycles:            {}", stats.cycles);
    println!("corrections:       {}", stats.corrections);
    println!("  after retry:     {}", stats.retries - stats.rejections);
    println!("rejected:          {}", stats.rejections);
    println!("predict-only:      {}", stats.predict_only);
    println!("reseeds:           {}", stats.reseeds);
    println!("worst error (m):   {:.3}", worst_error);
}
