//! Telemetry sinks for tests

use std::convert::Infallible;

use uwbtrack_core::{TelemetryFrame, TelemetrySink};

/// Keeps every frame
#[derive(Default)]
pub struct RecordingSink {
    pub frames: Vec<TelemetryFrame<4>>,
}

impl TelemetrySink<4> for RecordingSink {
    type Error = Infallible;

    fn send(&mut self, frame: &TelemetryFrame<4>) -> Result<(), Infallible> {
        self.frames.push(*frame);
        Ok(())
    }
}

/// Refuses every frame, counting attempts
#[derive(Default)]
pub struct FailingSink {
    pub attempts: usize,
}

impl TelemetrySink<4> for FailingSink {
    type Error = &'static str;

    fn send(&mut self, _frame: &TelemetryFrame<4>) -> Result<(), &'static str> {
        self.attempts += 1;
        Err("link down")
    }
}
