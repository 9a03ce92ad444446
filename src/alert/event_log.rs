use anyhow::{anyhow, Context, Result};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::alert::{AlertRecord, AlertSink};

const FIELD_SEPARATOR: &str = " - ";

/// Formats one durable log line, newline included.
pub fn format_log_line(record: &AlertRecord) -> String {
    format!(
        "{}{sep}{}{sep}{}\n",
        record.timestamp,
        record.alert_type,
        record.description,
        sep = FIELD_SEPARATOR
    )
}

/// One parsed line of the alert log.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LogEntry {
    pub timestamp: String,
    pub alert_type: String,
    pub description: String,
}

/// Splits on the first two separators; descriptions may contain " - ".
pub fn parse_log_line(line: &str) -> Result<LogEntry> {
    let line = line.trim_end_matches(['\r', '\n']);
    let mut fields = line.splitn(3, FIELD_SEPARATOR);
    match (fields.next(), fields.next(), fields.next()) {
        (Some(timestamp), Some(alert_type), Some(description)) if !timestamp.is_empty() => {
            Ok(LogEntry {
                timestamp: timestamp.to_string(),
                alert_type: alert_type.to_string(),
                description: description.to_string(),
            })
        }
        _ => Err(anyhow!("malformed alert log line: {:?}", line)),
    }
}

/// Append-only text log of fired alerts.
pub struct EventLogSink {
    path: PathBuf,
}

impl EventLogSink {
    /// Creates the parent directory if needed. The file itself is opened per write.
    pub fn new(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).with_context(|| {
                    format!("failed to create alert log directory {}", parent.display())
                })?;
            }
        }
        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn append(&self, record: &AlertRecord) -> Result<()> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .with_context(|| format!("failed to open alert log {}", self.path.display()))?;
        file.write_all(format_log_line(record).as_bytes())
            .and_then(|_| file.flush())
            .map_err(|e| anyhow!("failed to write alert log {}: {}", self.path.display(), e))
    }

    /// Reads every entry back. A missing file reads as empty.
    pub fn read_entries(&self) -> Result<Vec<LogEntry>> {
        let contents = match fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => {
                return Err(anyhow!(
                    "failed to read alert log {}: {}",
                    self.path.display(),
                    err
                ))
            }
        };
        contents
            .lines()
            .filter(|line| !line.trim().is_empty())
            .map(parse_log_line)
            .collect()
    }
}

impl AlertSink for EventLogSink {
    fn name(&self) -> &str {
        "event_log"
    }

    fn deliver(&mut self, record: &AlertRecord) -> Result<()> {
        self.append(record)
    }
}
