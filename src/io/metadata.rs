//! Time-indexed store of decoded telemetry frames.

use crate::io::is_gzip_content;
use crate::io::telemetry::MetadataFrame;
use crate::types::{DrapeError, DrapeResult};
use flate2::read::GzDecoder;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::io::{BufRead, BufReader, Cursor};
use std::path::Path;

/// What `push` does with a timestamp that does not advance the timeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum OutOfOrderPolicy {
    /// Drop the frame and report `Ok(false)`
    #[default]
    Ignore,
    /// Fail with `DrapeError::OutOfOrder`
    Reject,
}

/// Timeline configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TimelineParams {
    pub out_of_order: OutOfOrderPolicy,
}

/// Append-only timeline with nearest-timestamp lookup.
///
/// `timestamps` is strictly increasing and parallel to `frames`.
#[derive(Debug, Clone, Default)]
pub struct MetadataTimeline {
    timestamps: Vec<f64>,
    frames: Vec<MetadataFrame>,
    params: TimelineParams,
}

impl MetadataTimeline {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_params(params: TimelineParams) -> Self {
        Self {
            params,
            ..Self::default()
        }
    }

    /// Replace the contents with the records of a newline-delimited JSON
    /// stream. Malformed lines are dropped; frames are stably sorted by
    /// time and a repeated timestamp keeps the first record. Returns the
    /// number of frames kept.
    pub fn load<R: BufRead>(&mut self, reader: R) -> DrapeResult<usize> {
        let mut parsed = Vec::new();
        let mut dropped = 0usize;

        for (line_no, raw) in reader.split(b'\n').enumerate() {
            let raw = raw?;
            let line = match std::str::from_utf8(&raw) {
                Ok(line) => line,
                Err(e) => {
                    dropped += 1;
                    log::warn!("Dropping metadata line {}: {}", line_no + 1, e);
                    continue;
                }
            };
            if line.trim().is_empty() {
                continue;
            }
            match MetadataFrame::from_json_str(line) {
                Ok(frame) => parsed.push(frame),
                Err(e) => {
                    dropped += 1;
                    log::warn!("Dropping metadata line {}: {}", line_no + 1, e);
                }
            }
        }

        // sort_by is stable: equal timestamps keep file order
        parsed.sort_by(|a, b| a.timestamp.total_cmp(&b.timestamp));

        self.timestamps.clear();
        self.frames.clear();
        for frame in parsed {
            if self.timestamps.last().map_or(false, |&last| frame.timestamp <= last) {
                dropped += 1;
                log::debug!("Dropping duplicate timestamp {}", frame.timestamp);
                continue;
            }
            self.timestamps.push(frame.timestamp);
            self.frames.push(frame);
        }

        log::info!(
            "Loaded {} metadata frames ({} dropped), span {:.3} s",
            self.frames.len(),
            dropped,
            self.span()
        );
        Ok(self.frames.len())
    }

    /// Load a plain or gzip-compressed NDJSON file
    pub fn load_path<P: AsRef<Path>>(&mut self, path: P) -> DrapeResult<usize> {
        let path = path.as_ref();
        log::info!("Loading metadata from: {}", path.display());
        let raw = std::fs::read(path)?;
        self.load_bytes(raw)
    }

    /// Fetch and load an NDJSON document over HTTP
    pub fn fetch(&mut self, url: &str) -> DrapeResult<usize> {
        log::info!("Fetching metadata from: {}", url);
        let response = reqwest::blocking::get(url)?;
        if !response.status().is_success() {
            return Err(DrapeError::Processing(format!(
                "HTTP {} {}: {}",
                response.status().as_u16(),
                response.status().canonical_reason().unwrap_or(""),
                url
            )));
        }
        let body = response.bytes()?;
        self.load_bytes(body.to_vec())
    }

    fn load_bytes(&mut self, raw: Vec<u8>) -> DrapeResult<usize> {
        if is_gzip_content(&raw) {
            log::debug!("Decompressing gzipped metadata");
            self.load(BufReader::new(GzDecoder::new(Cursor::new(raw))))
        } else {
            self.load(Cursor::new(raw))
        }
    }

    /// Append a frame. Returns `Ok(true)` when stored; a timestamp not
    /// strictly after the last one is handled per [`OutOfOrderPolicy`].
    /// A non-finite timestamp is malformed and dropped (`Ok(false)`).
    pub fn push(&mut self, frame: MetadataFrame) -> DrapeResult<bool> {
        if !frame.timestamp.is_finite() {
            log::warn!("Dropping metadata frame with timestamp {}", frame.timestamp);
            return Ok(false);
        }
        if let Some(&last) = self.timestamps.last() {
            if !(frame.timestamp > last) {
                return match self.params.out_of_order {
                    OutOfOrderPolicy::Ignore => {
                        log::debug!(
                            "Ignoring out-of-order frame at {} (last {})",
                            frame.timestamp, last
                        );
                        Ok(false)
                    }
                    OutOfOrderPolicy::Reject => Err(DrapeError::OutOfOrder {
                        timestamp: frame.timestamp,
                        last,
                    }),
                };
            }
        }
        self.timestamps.push(frame.timestamp);
        self.frames.push(frame);
        Ok(true)
    }

    /// Append a raw record; malformed records are dropped (`Ok(false)`)
    pub fn push_json(&mut self, record: &Value) -> DrapeResult<bool> {
        match MetadataFrame::from_json(record) {
            Ok(frame) => self.push(frame),
            Err(e) => {
                log::warn!("Dropping metadata record: {}", e);
                Ok(false)
            }
        }
    }

    /// Frame nearest to `timestamp`; ties go to the earlier frame
    pub fn get(&self, timestamp: f64) -> Option<&MetadataFrame> {
        if self.timestamps.is_empty() || timestamp.is_nan() {
            return None;
        }

        let idx = match self.timestamps.binary_search_by(|t| t.total_cmp(&timestamp)) {
            Ok(i) => return self.frames.get(i),
            Err(i) => i,
        };

        if idx == 0 {
            return self.frames.first();
        }
        if idx >= self.timestamps.len() {
            return self.frames.last();
        }

        let before = timestamp - self.timestamps[idx - 1];
        let after = self.timestamps[idx] - timestamp;
        if after < before {
            self.frames.get(idx)
        } else {
            self.frames.get(idx - 1)
        }
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn timestamps(&self) -> &[f64] {
        &self.timestamps
    }

    pub fn frames(&self) -> &[MetadataFrame] {
        &self.frames
    }

    pub fn first(&self) -> Option<&MetadataFrame> {
        self.frames.first()
    }

    pub fn last(&self) -> Option<&MetadataFrame> {
        self.frames.last()
    }

    /// Most recent frame; alias of [`last`](Self::last) for live feeds
    pub fn latest(&self) -> Option<&MetadataFrame> {
        self.last()
    }

    /// Seconds between first and last frame, 0 when fewer than two
    pub fn span(&self) -> f64 {
        match (self.timestamps.first(), self.timestamps.last()) {
            (Some(first), Some(last)) => last - first,
            _ => 0.0,
        }
    }

    pub fn params(&self) -> &TimelineParams {
        &self.params
    }
}
