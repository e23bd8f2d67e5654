//! Background telemetry forwarder
//!
//! Moves a blocking sink off the cycle thread. Frames go through a bounded
//! queue to a worker thread that owns the sink; `send` never waits. When the
//! queue is full the frame is dropped and `send` returns
//! [`ConnectorError::BufferFull`], which the controller counts as a telemetry
//! failure.
//!
//! Dropping the forwarder closes the queue, lets the worker drain what is
//! already queued, and joins it.

use std::fmt;
use std::sync::mpsc::{self, Receiver, SyncSender, TrySendError};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};

use uwbtrack_core::{TelemetryFrame, TelemetrySink};

use crate::{lock_stats, ConnectionStats, ConnectorError};

/// Default queue depth, in frames
pub const DEFAULT_QUEUE_DEPTH: usize = 16;

/// Sink that hands frames to a worker thread
pub struct TelemetryForwarder<const N: usize = 4> {
    tx: Option<SyncSender<TelemetryFrame<N>>>,
    worker: Option<JoinHandle<()>>,
    stats: Arc<Mutex<ConnectionStats>>,
}

impl<const N: usize> TelemetryForwarder<N> {
    /// Start a worker that owns `sink`, with room for `capacity` queued frames
    pub fn spawn<S>(sink: S, capacity: usize) -> Result<Self, ConnectorError>
    where
        S: TelemetrySink<N> + Send + 'static,
        S::Error: fmt::Display,
    {
        if capacity == 0 {
            return Err(ConnectorError::ConfigError("queue capacity must be at least one".into()));
        }

        let (tx, rx) = mpsc::sync_channel(capacity);
        let stats = Arc::new(Mutex::new(ConnectionStats::default()));
        let worker_stats = Arc::clone(&stats);

        let worker = thread::Builder::new()
            .name("telemetry-forwarder".into())
            .spawn(move || forward_loop(sink, rx, &worker_stats))?;

        Ok(Self {
            tx: Some(tx),
            worker: Some(worker),
            stats,
        })
    }

    /// Snapshot of delivery statistics
    pub fn stats(&self) -> ConnectionStats {
        lock_stats(&self.stats).clone()
    }

    /// Deliver everything queued, stop the worker and return final statistics
    pub fn shutdown(mut self) -> ConnectionStats {
        self.stop();
        self.stats()
    }

    fn stop(&mut self) {
        self.tx.take();
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                log::warn!("telemetry worker panicked");
            }
        }
    }
}

impl<const N: usize> Drop for TelemetryForwarder<N> {
    fn drop(&mut self) {
        self.stop();
    }
}

impl<const N: usize> TelemetrySink<N> for TelemetryForwarder<N> {
    type Error = ConnectorError;

    fn send(&mut self, frame: &TelemetryFrame<N>) -> Result<(), Self::Error> {
        let tx = self.tx.as_ref().ok_or(ConnectorError::NotConnected)?;

        match tx.try_send(*frame) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => {
                lock_stats(&self.stats).messages_dropped += 1;
                Err(ConnectorError::BufferFull)
            }
            Err(TrySendError::Disconnected(_)) => Err(ConnectorError::NotConnected),
        }
    }
}

fn forward_loop<S, const N: usize>(
    mut sink: S,
    rx: Receiver<TelemetryFrame<N>>,
    stats: &Mutex<ConnectionStats>,
) where
    S: TelemetrySink<N>,
    S::Error: fmt::Display,
{
    for frame in rx {
        match sink.send(&frame) {
            Ok(()) => lock_stats(stats).messages_sent += 1,
            Err(e) => {
                log::warn!("telemetry delivery failed: {}", e);
                lock_stats(stats).record_failure(e);
            }
        }
    }
    log::debug!("telemetry queue closed");
}
