//! Monitoring session.
//!
//! Couples one `SeizureDetector` with an `AlertDispatcher`. Frames are only
//! analyzed while monitoring is active; every fired alert is recorded in
//! every registered sink.

use serde::Serialize;

use crate::alert::{AlertDispatcher, AlertRecord};
use crate::config::ClockSource;
use crate::ingest::FrameMessage;
use crate::pose::KeypointFrame;
use crate::{AlertDecision, SeizureDetector, Timestamp};

impl ClockSource {
    /// Analysis instant for a frame carrying `frame_timestamp`.
    pub fn resolve(self, frame_timestamp: Option<Timestamp>) -> Timestamp {
        match (self, frame_timestamp) {
            (ClockSource::Frame, Some(ts)) => ts,
            _ => Timestamp::now(),
        }
    }
}

/// Snapshot returned by `MonitorSession::status`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct SessionStatus {
    pub is_monitoring: bool,
    pub alert_count: u64,
    pub frames_processed: u64,
    pub sink_failures: u64,
}

pub struct MonitorSession {
    detector: SeizureDetector,
    dispatcher: AlertDispatcher,
    clock: ClockSource,
    is_monitoring: bool,
    alert_count: u64,
    frames_processed: u64,
    sink_failures: u64,
}

impl MonitorSession {
    /// Starts stopped; call `start` before feeding frames.
    pub fn new(detector: SeizureDetector, dispatcher: AlertDispatcher, clock: ClockSource) -> Self {
        Self {
            detector,
            dispatcher,
            clock,
            is_monitoring: false,
            alert_count: 0,
            frames_processed: 0,
            sink_failures: 0,
        }
    }

    /// Returns `false` if monitoring was already active.
    pub fn start(&mut self) -> bool {
        if self.is_monitoring {
            return false;
        }
        self.is_monitoring = true;
        log::info!("monitoring started");
        true
    }

    /// Returns `false` if monitoring was already stopped.
    pub fn stop(&mut self) -> bool {
        if !self.is_monitoring {
            return false;
        }
        self.is_monitoring = false;
        log::info!(
            "monitoring stopped after {} frames, {} alerts",
            self.frames_processed,
            self.alert_count
        );
        true
    }

    pub fn is_monitoring(&self) -> bool {
        self.is_monitoring
    }

    pub fn alert_count(&self) -> u64 {
        self.alert_count
    }

    pub fn detector(&self) -> &SeizureDetector {
        &self.detector
    }

    pub fn dispatcher_mut(&mut self) -> &mut AlertDispatcher {
        &mut self.dispatcher
    }

    /// Processes one ingested message, resolving its instant from the clock source.
    ///
    /// Returns `None` while stopped.
    pub fn process(&mut self, message: &FrameMessage) -> Option<AlertDecision> {
        let now = self.clock.resolve(message.timestamp);
        self.process_at(message.pose.as_ref(), now)
    }

    pub fn process_at(
        &mut self,
        pose: Option<&KeypointFrame>,
        now: Timestamp,
    ) -> Option<AlertDecision> {
        if !self.is_monitoring {
            return None;
        }
        self.frames_processed += 1;

        let decision = self.detector.analyze(pose, now);
        if let Some(record) = AlertRecord::from_decision(&decision, now) {
            self.alert_count += 1;
            log::info!(
                "ALERT {} (confidence {:.2}): {}",
                record.alert_type,
                record.confidence,
                record.description
            );
            let report = self.dispatcher.dispatch(&record);
            self.sink_failures += report.failed.len() as u64;
        }
        Some(decision)
    }

    pub fn status(&self) -> SessionStatus {
        SessionStatus {
            is_monitoring: self.is_monitoring,
            alert_count: self.alert_count,
            frames_processed: self.frames_processed,
            sink_failures: self.sink_failures,
        }
    }

    /// New subject: clears detector state. Counters are kept.
    pub fn reset(&mut self) {
        self.detector.reset();
    }
}
