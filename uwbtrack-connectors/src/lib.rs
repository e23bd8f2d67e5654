//! Telemetry Sinks and Configuration Loading
//!
//! ## Overview
//!
//! The tracking core hands one [`TelemetryFrame`](uwbtrack_core::TelemetryFrame)
//! per cycle to a [`TelemetrySink`](uwbtrack_core::TelemetrySink). This crate
//! provides the sinks a deployment actually uses, plus loading of the tracker
//! configuration from JSON.
//!
//! ## Sinks
//!
//! | Sink | Use | Blocking |
//! |------|-----|----------|
//! | [`http::HttpSink`] | POST to the tracking server's `/log` | up to 1 s |
//! | [`csv_log::CsvLogSink`] | local tracking log | disk write |
//! | [`forward::TelemetryForwarder`] | wraps either of the above | never |
//!
//! A blocking sink on the cycle thread stretches the cycle whenever the link
//! is slow. Wrap it in a forwarder to move delivery onto a worker thread; a
//! full queue then drops the frame and the controller counts the failure.
//!
//! ## Example Usage
//!
//! ```no_run
//! use uwbtrack_connectors::csv_log::CsvLogSink;
//! use uwbtrack_connectors::forward::{TelemetryForwarder, DEFAULT_QUEUE_DEPTH};
//! use uwbtrack_connectors::load_tracker_config;
//! use uwbtrack_core::{CycleController, TrackerConfig};
//!
//! let config: TrackerConfig = load_tracker_config("tracker.json")?;
//! let mut tracker = CycleController::new(config)?;
//!
//! let log: CsvLogSink<std::fs::File> = CsvLogSink::create("tracking_log.csv")?;
//! let mut sink: TelemetryForwarder = TelemetryForwarder::spawn(log, DEFAULT_QUEUE_DEPTH)?;
//!
//! # struct Radio;
//! # impl uwbtrack_core::RangeSource for Radio {
//! #     fn distance(&mut self, _anchor: usize) -> Option<f32> { None }
//! # }
//! # let mut source = Radio;
//! tracker.step_and_emit(&mut source, &mut sink, 200);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod config;
pub mod csv_log;
pub mod forward;

#[cfg(feature = "http")]
pub mod http;

pub use config::{load_tracker_config, parse_tracker_config};

#[cfg(feature = "http")]
pub use http::{AuthMethod, HttpConfig, HttpError, HttpSink};

use std::sync::{Mutex, MutexGuard, PoisonError};

use thiserror::Error;

/// Common connector errors
#[derive(Debug, Error)]
pub enum ConnectorError {
    #[error("Not connected")]
    NotConnected,

    #[error("Buffer full")]
    BufferFull,

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Delivery statistics common to all sinks
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ConnectionStats {
    /// Frames delivered
    pub messages_sent: u64,
    /// Frames the transport refused
    pub messages_failed: u64,
    /// Frames discarded before reaching the transport
    pub messages_dropped: u64,
    /// Payload bytes delivered
    pub bytes_sent: u64,
    /// Last error message
    pub last_error: Option<String>,
}

impl ConnectionStats {
    pub(crate) fn record_sent(&mut self, bytes: usize) {
        self.messages_sent += 1;
        self.bytes_sent += bytes as u64;
    }

    pub(crate) fn record_failure(&mut self, error: impl ToString) {
        self.messages_failed += 1;
        self.last_error = Some(error.to_string());
    }
}

// A panicking sink must not take the stats with it.
pub(crate) fn lock_stats(stats: &Mutex<ConnectionStats>) -> MutexGuard<'_, ConnectionStats> {
    stats.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stats_record_outcomes() {
        let mut stats = ConnectionStats::default();
        stats.record_sent(40);
        stats.record_sent(2);
        stats.record_failure("timed out");

        assert_eq!(stats.messages_sent, 2);
        assert_eq!(stats.bytes_sent, 42);
        assert_eq!(stats.messages_failed, 1);
        assert_eq!(stats.last_error.as_deref(), Some("timed out"));
    }

    #[test]
    fn io_errors_convert() {
        let err: ConnectorError = std::io::Error::new(std::io::ErrorKind::NotFound, "gone").into();
        assert!(matches!(err, ConnectorError::Io(_)));
        assert!(err.to_string().contains("gone"));
    }
}
