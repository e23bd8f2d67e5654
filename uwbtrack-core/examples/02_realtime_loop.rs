//! Real-Time Loop Example
//!
//! Runs the blocking tracking loop on its own thread at 5 Hz against a tag
//! circling the corridor, and receives telemetry frames on the main thread.
//!
//! ## What You'll Learn
//!
//! - Driving [`CycleController::run`] with a wall clock
//! - Stopping the loop from another thread
//! - Forwarding frames over a channel so the loop never blocks on output
//!
//! ## Running the Example
//!
//! ```bash
//! cargo run --example 02_realtime_loop
//! ```

use std::sync::{
    atomic::{AtomicBool, Ordering},
    mpsc::{self, Sender},
    Arc,
};
use std::thread;
use std::time::{Duration, Instant};

use uwbtrack_core::{
    AnchorSet, CycleController, MonotonicClock, RangeSource, TelemetryFrame, TelemetrySink,
    TrackerConfig,
};

const RUN_FOR: Duration = Duration::from_secs(4);

/// Tag on a 0.5 m circle around the middle of the corridor
struct CirclingTag {
    anchors: AnchorSet,
    started: Instant,
    position: (f32, f32),
}

impl RangeSource for CirclingTag {
    fn refresh(&mut self) {
        let t = self.started.elapsed().as_secs_f32();
        let angle = t * std::f32::consts::TAU / 8.0;
        self.position = (0.85 + 0.5 * angle.cos(), 3.15 + 0.5 * angle.sin());
    }

    fn distance(&mut self, anchor: usize) -> Option<f32> {
        let (x, y) = self.position;
        Some(self.anchors[anchor].distance_to(x, y))
    }
}

/// Hands frames to another thread
struct ChannelSink(Sender<TelemetryFrame<4>>);

impl TelemetrySink<4> for ChannelSink {
    type Error = mpsc::SendError<TelemetryFrame<4>>;

    fn send(&mut self, frame: &TelemetryFrame<4>) -> Result<(), Self::Error> {
        self.0.send(*frame)
    }
}

fn main() {
    println!("UWB Tag Tracking - Real-Time Loop");
    println!("=================================\n");

    let config = TrackerConfig::default();
    println!("period:  {} ms", config.period_ms);
    println!("window:  {:?}\n", config.smoothing);

    let mut tracker = match CycleController::new(config) {
        Ok(tracker) => tracker,
        Err(e) => {
            eprintln!("configuration rejected: {}", e);
            return;
        }
    };

    let stop = Arc::new(AtomicBool::new(false));
    let (tx, rx) = mpsc::channel();

    let loop_stop = Arc::clone(&stop);
    let worker = thread::spawn(move || {
        let mut tag = CirclingTag {
            anchors: AnchorSet::default(),
            started: Instant::now(),
            position: (0.85, 3.15),
        };
        let mut sink = ChannelSink(tx);
        tracker.run(&mut tag, &mut sink, &MonotonicClock::new(), &loop_stop)
    });

    let deadline = Instant::now() + RUN_FOR;
    while Instant::now() < deadline {
        if let Ok(frame) = rx.recv_timeout(Duration::from_millis(500)) {
            println!(
                "{:>6} ms  POS: {:6.3},{:6.3}  V: {:6.3},{:6.3}",
                frame.timestamp, frame.state.x, frame.state.y, frame.state.vx, frame.state.vy
            );
        }
    }

    stop.store(true, Ordering::Relaxed);
    match worker.join() {
        Ok(stats) => {
            println!("\nloop stopped");
            println!("cycles:       {}", stats.cycles);
            println!("corrections:  {}", stats.corrections);
            println!("reseeds:      {}", stats.reseeds);
        }
        Err(_) => eprintln!("tracking thread panicked"),
    }
}
