use anyhow::Result;
use std::sync::mpsc::{self, Receiver, Sender};

use crate::alert::{AlertRecord, AlertSink};

/// In-process fan-out to any number of listeners.
///
/// Listeners that hang up are dropped on the next delivery.
#[derive(Default)]
pub struct BroadcastSink {
    listeners: Vec<Sender<AlertRecord>>,
}

impl BroadcastSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&mut self) -> Receiver<AlertRecord> {
        let (tx, rx) = mpsc::channel();
        self.listeners.push(tx);
        rx
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }
}

impl AlertSink for BroadcastSink {
    fn name(&self) -> &str {
        "broadcast"
    }

    fn deliver(&mut self, record: &AlertRecord) -> Result<()> {
        let before = self.listeners.len();
        self.listeners.retain(|tx| tx.send(record.clone()).is_ok());
        let dropped = before - self.listeners.len();
        if dropped > 0 {
            log::debug!("dropped {} disconnected alert listener(s)", dropped);
        }
        Ok(())
    }
}
