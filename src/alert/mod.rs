//! Alert records and the sinks that receive them.
//!
//! A fired `AlertDecision` becomes one `AlertRecord`, which the
//! `AlertDispatcher` hands to every registered sink in order. A failing sink
//! is logged and counted; it never stops the remaining sinks or the caller.

use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::{AlertDecision, AlertType, Timestamp};

mod broadcast;
mod event_log;

pub use broadcast::BroadcastSink;
pub use event_log::{format_log_line, parse_log_line, EventLogSink, LogEntry};

/// Notification payload for one fired alert.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AlertRecord {
    /// ISO-8601 (RFC 3339, UTC) instant the alert fired.
    pub timestamp: String,
    pub alert_type: AlertType,
    pub confidence: f32,
    pub description: String,
}

impl AlertRecord {
    /// Returns `None` for decisions that did not fire.
    pub fn from_decision(decision: &AlertDecision, at: Timestamp) -> Option<Self> {
        if !decision.alert {
            return None;
        }
        Some(Self {
            timestamp: at.to_rfc3339(),
            alert_type: decision.alert_type,
            confidence: decision.confidence,
            description: decision.description.clone(),
        })
    }
}

/// Receives fired alerts.
pub trait AlertSink: Send {
    fn name(&self) -> &str;

    fn deliver(&mut self, record: &AlertRecord) -> Result<()>;
}

/// Outcome of handing one record to every sink.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DispatchReport {
    pub delivered: usize,
    /// Names of sinks that returned an error.
    pub failed: Vec<String>,
}

impl DispatchReport {
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Ordered fan-out over registered sinks.
#[derive(Default)]
pub struct AlertDispatcher {
    sinks: Vec<Box<dyn AlertSink>>,
}

impl AlertDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_sink(mut self, sink: impl AlertSink + 'static) -> Self {
        self.add_sink(sink);
        self
    }

    pub fn add_sink(&mut self, sink: impl AlertSink + 'static) {
        self.sinks.push(Box::new(sink));
    }

    pub fn sink_names(&self) -> Vec<&str> {
        self.sinks.iter().map(|sink| sink.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.sinks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }

    pub fn dispatch(&mut self, record: &AlertRecord) -> DispatchReport {
        let mut report = DispatchReport::default();
        for sink in self.sinks.iter_mut() {
            match sink.deliver(record) {
                Ok(()) => report.delivered += 1,
                Err(err) => {
                    log::error!(
                        "alert sink {} failed for {} alert: {:#}",
                        sink.name(),
                        record.alert_type,
                        err
                    );
                    report.failed.push(sink.name().to_string());
                }
            }
        }
        report
    }
}
