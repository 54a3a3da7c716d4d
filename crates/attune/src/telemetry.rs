//! Fire-and-forget transition records for an external logging sink.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::module::ModuleKind;
use crate::stage::{EventKind, Stage};

/// One committed stage change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransitionRecord {
    pub module: ModuleKind,
    pub session_id: Option<String>,
    pub from: Stage,
    pub to: Stage,
    pub event: EventKind,
    pub generation: u64,
    pub at: DateTime<Utc>,
}

/// Receives transition records. Implementations must not block.
pub trait TransitionSink: Send + Sync {
    fn record(&self, record: &TransitionRecord);
}

/// Discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl TransitionSink for NullSink {
    fn record(&self, _record: &TransitionRecord) {}
}

/// Emits each record as a structured tracing event.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl TransitionSink for TracingSink {
    fn record(&self, record: &TransitionRecord) {
        info!(
            module = %record.module,
            session = record.session_id.as_deref().unwrap_or("-"),
            from = %record.from,
            to = %record.to,
            event = %record.event,
            generation = record.generation,
            "stage transition"
        );
    }
}

/// Forwards records to an unbounded channel; a dropped receiver is ignored.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<TransitionRecord>,
}

impl ChannelSink {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<TransitionRecord>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl TransitionSink for ChannelSink {
    fn record(&self, record: &TransitionRecord) {
        if self.tx.send(record.clone()).is_err() {
            debug!("transition sink receiver closed, dropping {} -> {}", record.from, record.to);
        }
    }
}

/// Fans a record out to several sinks.
#[derive(Clone, Default)]
pub struct FanoutSink {
    sinks: Vec<Arc<dyn TransitionSink>>,
}

impl FanoutSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, sink: Arc<dyn TransitionSink>) -> Self {
        self.sinks.push(sink);
        self
    }
}

impl TransitionSink for FanoutSink {
    fn record(&self, record: &TransitionRecord) {
        for sink in &self.sinks {
            sink.record(record);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record() -> TransitionRecord {
        TransitionRecord {
            module: ModuleKind::Unhooking,
            session_id: Some("unhook_1_abcdefghi".to_string()),
            from: Stage::Intro,
            to: Stage::Fog,
            event: EventKind::Start,
            generation: 1,
            at: Utc::now(),
        }
    }

    #[test]
    fn test_channel_sink_delivers() {
        let (sink, mut rx) = ChannelSink::new();
        sink.record(&record());
        let got = rx.try_recv().unwrap();
        assert_eq!(got.to, Stage::Fog);
    }

    #[test]
    fn test_channel_sink_survives_closed_receiver() {
        let (sink, rx) = ChannelSink::new();
        drop(rx);
        sink.record(&record());
    }

    #[test]
    fn test_fanout() {
        let (a, mut rx_a) = ChannelSink::new();
        let (b, mut rx_b) = ChannelSink::new();
        let fanout = FanoutSink::new().with(Arc::new(a)).with(Arc::new(b));
        fanout.record(&record());
        assert!(rx_a.try_recv().is_ok());
        assert!(rx_b.try_recv().is_ok());
    }

    #[test]
    fn test_record_serializes() {
        let json = serde_json::to_value(record()).unwrap();
        assert_eq!(json["from"], "intro");
        assert_eq!(json["to"], "fog");
        assert_eq!(json["event"], "START");
        assert_eq!(json["module"], "unhooking");
    }
}
