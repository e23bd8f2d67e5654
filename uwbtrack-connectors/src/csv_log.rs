//! CSV tracking log
//!
//! Same file the tracking server keeps: one row per frame, wall-clock
//! ISO-8601 timestamp first, missing ranges as empty cells.
//!
//! ```text
//! timestamp,dist0,dist1,dist2,dist3,x,y
//! 2024-05-01T12:00:00.200Z,3.26,,3.31,3.29,0.84,3.17
//! ```

use std::fmt::Write as _;
use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::Path;

use chrono::{DateTime, SecondsFormat, Utc};
use thiserror::Error;
use uwbtrack_core::{TelemetryFrame, TelemetrySink};

use crate::ConnectionStats;

/// CSV log errors
#[derive(Debug, Error)]
pub enum CsvLogError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Header row for `N` anchors
pub fn header<const N: usize>() -> String {
    let mut line = String::from("timestamp");
    for i in 0..N {
        let _ = write!(line, ",dist{}", i);
    }
    line.push_str(",x,y\n");
    line
}

/// Telemetry sink appending rows to a CSV log
pub struct CsvLogSink<W: Write, const N: usize = 4> {
    writer: W,
    clock: fn() -> DateTime<Utc>,
    stats: ConnectionStats,
}

impl<const N: usize> CsvLogSink<File, N> {
    /// Open `path` for appending; the header is written only when the file
    /// is new or empty
    pub fn create(path: impl AsRef<Path>) -> Result<Self, CsvLogError> {
        let file = OpenOptions::new().create(true).append(true).open(path.as_ref())?;
        let empty = file.metadata()?.len() == 0;
        log::debug!(
            "CSV log {} opened{}",
            path.as_ref().display(),
            if empty { ", writing header" } else { "" }
        );
        Self::new(file, empty)
    }
}

impl<W: Write, const N: usize> CsvLogSink<W, N> {
    /// Log into any writer
    pub fn new(mut writer: W, write_header: bool) -> Result<Self, CsvLogError> {
        if write_header {
            writer.write_all(header::<N>().as_bytes())?;
            writer.flush()?;
        }
        Ok(Self {
            writer,
            clock: Utc::now,
            stats: ConnectionStats::default(),
        })
    }

    /// Replace the wall clock used for row timestamps
    pub fn with_clock(mut self, clock: fn() -> DateTime<Utc>) -> Self {
        self.clock = clock;
        self
    }

    /// Delivery statistics
    pub fn stats(&self) -> &ConnectionStats {
        &self.stats
    }

    /// Underlying writer
    pub fn into_inner(self) -> W {
        self.writer
    }

    fn row(&self, frame: &TelemetryFrame<N>) -> String {
        let mut line = (self.clock)().to_rfc3339_opts(SecondsFormat::Millis, true);
        for d in &frame.distances {
            line.push(',');
            if let Some(d) = d {
                let _ = write!(line, "{}", d);
            }
        }
        let _ = writeln!(line, ",{},{}", frame.state.x, frame.state.y);
        line
    }
}

impl<W: Write, const N: usize> TelemetrySink<N> for CsvLogSink<W, N> {
    type Error = CsvLogError;

    fn send(&mut self, frame: &TelemetryFrame<N>) -> Result<(), Self::Error> {
        let line = self.row(frame);
        // Whole rows only
        let result = self
            .writer
            .write_all(line.as_bytes())
            .and_then(|()| self.writer.flush());

        match result {
            Ok(()) => {
                self.stats.record_sent(line.len());
                Ok(())
            }
            Err(e) => {
                self.stats.record_failure(&e);
                Err(e.into())
            }
        }
    }
}
