//! Per-cycle telemetry
//!
//! One [`TelemetryFrame`] leaves the tracker every cycle. On the wire it is
//! a flat object, missing channels as `null`:
//!
//! ```text
//! {"x": 0.84, "y": 3.17, "dist0": 3.26, "dist1": null, "dist2": 3.31, "dist3": 3.29}
//! ```
//!
//! Delivery is best effort. A sink reports failure through its `Result`
//! and the controller counts it; nothing is retried within a cycle.

use core::convert::Infallible;

use crate::ekf::EstimatorState;
use crate::time::Timestamp;

/// Estimate and filtered ranges of one cycle
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TelemetryFrame<const N: usize> {
    /// Cycle start (ms, monotonic)
    pub timestamp: Timestamp,
    /// Position and velocity after the cycle
    pub state: EstimatorState,
    /// Filtered range per anchor; `None` when the anchor was not heard
    pub distances: [Option<f32>; N],
}

impl<const N: usize> TelemetryFrame<N> {
    /// X position (m)
    pub fn x(&self) -> f32 {
        self.state.x
    }

    /// Y position (m)
    pub fn y(&self) -> f32 {
        self.state.y
    }

    /// Anchors with a filtered range in this frame
    pub fn valid_distances(&self) -> usize {
        self.distances.iter().filter(|d| d.is_some()).count()
    }
}

#[cfg(feature = "serde")]
struct DistKey(usize);

#[cfg(feature = "serde")]
impl serde::Serialize for DistKey {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(&format_args!("dist{}", self.0))
    }
}

#[cfg(feature = "serde")]
impl<const N: usize> serde::Serialize for TelemetryFrame<N> {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        use serde::ser::SerializeMap;

        let mut map = serializer.serialize_map(Some(2 + N))?;
        map.serialize_entry("x", &self.state.x)?;
        map.serialize_entry("y", &self.state.y)?;
        for (i, d) in self.distances.iter().enumerate() {
            map.serialize_entry(&DistKey(i), d)?;
        }
        map.end()
    }
}

/// Destination of per-cycle telemetry
pub trait TelemetrySink<const N: usize> {
    /// Delivery failure
    type Error;

    /// Deliver one frame; must not block for longer than a short timeout
    fn send(&mut self, frame: &TelemetryFrame<N>) -> Result<(), Self::Error>;
}

impl<S, const N: usize> TelemetrySink<N> for &mut S
where
    S: TelemetrySink<N> + ?Sized,
{
    type Error = S::Error;

    fn send(&mut self, frame: &TelemetryFrame<N>) -> Result<(), Self::Error> {
        (**self).send(frame)
    }
}

/// Sink that drops every frame
#[derive(Debug, Clone, Copy, Default)]
pub struct NullSink;

impl<const N: usize> TelemetrySink<N> for NullSink {
    type Error = Infallible;

    fn send(&mut self, _frame: &TelemetryFrame<N>) -> Result<(), Self::Error> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame() -> TelemetryFrame<4> {
        TelemetryFrame {
            timestamp: 400,
            state: EstimatorState { x: 0.5, y: 2.0, vx: 0.1, vy: 0.0 },
            distances: [Some(2.0), None, Some(4.5), Some(4.75)],
        }
    }

    #[test]
    fn counts_valid_distances() {
        assert_eq!(frame().valid_distances(), 3);
        assert_eq!(frame().x(), 0.5);
    }

    #[test]
    fn null_sink_accepts_everything() {
        let mut sink = NullSink;
        assert!(TelemetrySink::<4>::send(&mut sink, &frame()).is_ok());

        let mut by_ref = &mut sink;
        assert!(TelemetrySink::<4>::send(&mut by_ref, &frame()).is_ok());
    }
}
