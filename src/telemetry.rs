// Write-only telemetry sinks
//
// The controller writes (path, value, timestamp) triples here and never
// depends on them being delivered.

use std::sync::Mutex;

use tokio::sync::mpsc;

use crate::messages::{TelemetryEntry, TelemetryValue};

pub trait TelemetrySink: Send + Sync {
    fn record(&self, path: &str, value: TelemetryValue, timestamp: f64);
}

/// Discards everything
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl TelemetrySink for NullSink {
    fn record(&self, _path: &str, _value: TelemetryValue, _timestamp: f64) {}
}

/// Forwards entries to the runtime's publisher task
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<TelemetryEntry>,
}

impl ChannelSink {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<TelemetryEntry>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl TelemetrySink for ChannelSink {
    fn record(&self, path: &str, value: TelemetryValue, timestamp: f64) {
        // A closed receiver just means nobody is listening any more
        let _ = self.tx.send(TelemetryEntry {
            path: path.to_string(),
            value,
            timestamp,
        });
    }
}

/// Keeps every entry in memory
#[derive(Debug, Default)]
pub struct RecordingSink {
    entries: Mutex<Vec<TelemetryEntry>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> Vec<TelemetryEntry> {
        self.entries
            .lock()
            .map(|entries| entries.clone())
            .unwrap_or_default()
    }

    /// Entries whose path ends with `suffix`
    pub fn find(&self, suffix: &str) -> Vec<TelemetryEntry> {
        self.entries()
            .into_iter()
            .filter(|entry| entry.path.ends_with(suffix))
            .collect()
    }
}

impl TelemetrySink for RecordingSink {
    fn record(&self, path: &str, value: TelemetryValue, timestamp: f64) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.push(TelemetryEntry {
                path: path.to_string(),
                value,
                timestamp,
            });
        }
    }
}
