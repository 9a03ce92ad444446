//! Frame ingestion.
//!
//! The pose collaborator delivers one JSON object per line:
//!
//! ```text
//! {"timestamp": 1700000000.0, "keypoints": {"nose": {"x": 200, "y": 100, "z": 0.0, "visibility": 0.98}, ...}}
//! {"timestamp": 1700000000.1, "keypoints": null}
//! ```
//!
//! `keypoints: null` means no body was found. Payloads are parsed strictly:
//! unknown fields or parts are rejected rather than ignored.

use anyhow::{anyhow, Result};
use std::io::BufRead;

mod payload;

pub use payload::{parse_frame_payload, FrameMessage};

/// Parses one line of the frame stream.
pub fn parse_frame_line(line: &str) -> Result<FrameMessage> {
    let value: serde_json::Value =
        serde_json::from_str(line).map_err(|e| anyhow!("invalid frame JSON: {}", e))?;
    parse_frame_payload(&value)
}

/// Iterates frame messages from a line-oriented reader.
///
/// Blank lines are skipped. A bad line yields an `Err` and iteration
/// continues with the next line; a read error ends the stream.
pub struct FrameReader<R> {
    reader: R,
    line_number: usize,
    buf: String,
    finished: bool,
}

impl<R: BufRead> FrameReader<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            line_number: 0,
            buf: String::new(),
            finished: false,
        }
    }

    /// Number of the line most recently read (1-based).
    pub fn line_number(&self) -> usize {
        self.line_number
    }
}

impl<R: BufRead> Iterator for FrameReader<R> {
    type Item = Result<FrameMessage>;

    fn next(&mut self) -> Option<Self::Item> {
        while !self.finished {
            self.buf.clear();
            match self.reader.read_line(&mut self.buf) {
                Ok(0) => self.finished = true,
                Ok(_) => {
                    self.line_number += 1;
                    let line = self.buf.trim();
                    if line.is_empty() {
                        continue;
                    }
                    return Some(
                        parse_frame_line(line)
                            .map_err(|e| e.context(format!("line {}", self.line_number))),
                    );
                }
                Err(err) => {
                    self.finished = true;
                    return Some(Err(anyhow!("failed to read frame stream: {}", err)));
                }
            }
        }
        None
    }
}
