//! Newline-delimited JSON detection streams
//!
//! Each line carries either the detections of one frame or a bus envelope,
//! stamped with its offset from the start of the recording:
//!
//! ```text
//! {"at_ms": 0,    "frame": {"vehicles": [{"x": 20, "y": 170, "width": 60, "height": 60}]}}
//! {"at_ms": 1200, "bus": {"message": {"type": "CarOutOfSight"}}}
//! ```
//!
//! Blank lines and lines starting with `#` are skipped.

use std::path::Path;
use std::time::Duration;

use kiwi_bus::Envelope;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncRead, BufReader, Lines};
use tokio::time::Instant;
use tracing::{debug, info};

use crate::{FrameDetections, SourceError};

/// Payload of one stream line
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StreamItem {
    /// Detector output for one camera frame
    Frame(FrameDetections),
    /// A message to inject on the bus
    Bus(Envelope),
}

/// One stream line
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamRecord {
    /// Offset from the start of the stream (milliseconds)
    #[serde(default)]
    pub at_ms: u64,
    #[serde(flatten)]
    pub item: StreamItem,
}

/// Reader yielding stream items at their recorded time
pub struct DetectionStream<R> {
    lines: Lines<R>,
    line_no: usize,
    started: Instant,
    /// Parsed record still waiting for its offset
    pending: Option<StreamRecord>,
}

impl DetectionStream<BufReader<Box<dyn AsyncRead + Unpin + Send>>> {
    /// Open a stream from a file, or from stdin when `path` is `-`
    pub async fn open(path: &str) -> Result<Self, SourceError> {
        let reader: Box<dyn AsyncRead + Unpin + Send> = if path == "-" {
            info!("Reading detections from stdin");
            Box::new(tokio::io::stdin())
        } else {
            info!("Reading detections from {}", Path::new(path).display());
            Box::new(tokio::fs::File::open(path).await?)
        };
        Ok(Self::new(BufReader::new(reader)))
    }
}

impl<R: AsyncBufRead + Unpin> DetectionStream<R> {
    /// Wrap a buffered reader; record offsets count from now
    pub fn new(reader: R) -> Self {
        Self {
            lines: reader.lines(),
            line_no: 0,
            started: Instant::now(),
            pending: None,
        }
    }

    /// Next item, waiting until its recorded offset has elapsed.
    /// Returns `None` at end of stream.
    ///
    /// Cancel safe: a record whose offset has not elapsed yet is kept and
    /// returned by the next call.
    pub async fn next(&mut self) -> Result<Option<StreamItem>, SourceError> {
        if self.pending.is_none() {
            self.pending = self.read_record().await?;
        }
        let Some(at_ms) = self.pending.as_ref().map(|record| record.at_ms) else {
            return Ok(None);
        };

        tokio::time::sleep_until(self.started + Duration::from_millis(at_ms)).await;
        debug!(line = self.line_no, at_ms, "Stream record released");
        Ok(self.pending.take().map(|record| record.item))
    }

    async fn read_record(&mut self) -> Result<Option<StreamRecord>, SourceError> {
        while let Some(line) = self.lines.next_line().await? {
            self.line_no += 1;
            let trimmed = line.trim();
            if trimmed.is_empty() || trimmed.starts_with('#') {
                continue;
            }

            let record = serde_json::from_str(trimmed).map_err(|source| SourceError::Parse {
                line: self.line_no,
                source,
            })?;
            return Ok(Some(record));
        }
        Ok(None)
    }

    /// Number of lines consumed so far
    pub fn line_no(&self) -> usize {
        self.line_no
    }
}
