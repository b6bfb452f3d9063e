//! Tracer system for coordinating tracer events
//!
//! The central system for recording and querying tracer events. It coordinates with
//! the event store and provides convenience methods for the events the orchestrator
//! emits.

use super::event_store::{EventFilter, EventStore};
use super::tracer_events::*;
use crate::llm::models::FinishReason;
use serde_json::Value;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

/// Summary of a model turn, as handed to [`TracerSystem::record_model_turn`]
#[derive(Debug, Clone, Default)]
pub struct TurnRecord {
    pub model: String,
    pub turn: usize,
    pub message_count: usize,
    pub tools: Vec<String>,
    pub text: String,
    pub tool_calls: Vec<String>,
    pub finish_reason: Option<FinishReason>,
    pub duration_ms: f64,
}

/// Central system for capturing and querying tracer events
pub struct TracerSystem {
    event_store: Arc<EventStore>,
    enabled: AtomicBool,
}

impl TracerSystem {
    /// Create a new tracer system, sharing `event_store` if one is given
    pub fn new(event_store: Option<Arc<EventStore>>, enabled: bool) -> Self {
        Self {
            event_store: event_store.unwrap_or_default(),
            enabled: AtomicBool::new(enabled),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    pub fn enable(&self) {
        self.enabled.store(true, Ordering::SeqCst);
    }

    pub fn disable(&self) {
        self.enabled.store(false, Ordering::SeqCst);
    }

    pub fn event_store(&self) -> &Arc<EventStore> {
        &self.event_store
    }

    /// Record a tracer event in the event store
    pub fn record_event(&self, event: Box<dyn TracerEvent>) {
        if self.is_enabled() {
            self.event_store.store(event);
        }
    }

    /// Record a completed model turn
    pub fn record_model_turn(
        &self,
        record: TurnRecord,
        source: impl Into<String>,
        correlation_id: impl Into<String>,
    ) {
        if !self.is_enabled() {
            return;
        }
        self.event_store.store(Box::new(ModelTurnTracerEvent {
            timestamp: current_timestamp(),
            correlation_id: correlation_id.into(),
            source: source.into(),
            model: record.model,
            turn: record.turn,
            message_count: record.message_count,
            tools: record.tools,
            text: record.text,
            tool_calls: record.tool_calls,
            finish_reason: record.finish_reason,
            duration_ms: record.duration_ms,
        }));
    }

    /// Record one tool execution
    #[allow(clippy::too_many_arguments)]
    pub fn record_tool_call(
        &self,
        tool_name: impl Into<String>,
        call_id: impl Into<String>,
        arguments: Value,
        result: Value,
        failed: bool,
        source: impl Into<String>,
        correlation_id: impl Into<String>,
    ) {
        if !self.is_enabled() {
            return;
        }
        self.event_store.store(Box::new(ToolCallTracerEvent {
            timestamp: current_timestamp(),
            correlation_id: correlation_id.into(),
            source: source.into(),
            tool_name: tool_name.into(),
            call_id: call_id.into(),
            arguments,
            result,
            failed,
        }));
    }

    /// Record a correlation anomaly reported by an upstream service
    pub fn record_protocol_anomaly(
        &self,
        description: impl Into<String>,
        source: impl Into<String>,
        correlation_id: impl Into<String>,
    ) {
        if !self.is_enabled() {
            return;
        }
        self.event_store.store(Box::new(ProtocolAnomalyTracerEvent {
            timestamp: current_timestamp(),
            correlation_id: correlation_id.into(),
            source: source.into(),
            description: description.into(),
        }));
    }

    pub fn get_event_summaries(
        &self,
        start_time: Option<f64>,
        end_time: Option<f64>,
        filter: Option<EventFilter<'_>>,
    ) -> Vec<String> {
        self.event_store.get_event_summaries(start_time, end_time, filter)
    }

    pub fn get_last_n_summaries(&self, n: usize, filter: Option<EventFilter<'_>>) -> Vec<String> {
        self.event_store.get_last_n_summaries(n, filter)
    }

    /// Summaries of every event recorded for one run
    pub fn run_summaries(&self, correlation_id: &str) -> Vec<String> {
        let same_run = |event: &dyn TracerEvent| event.correlation_id() == correlation_id;
        self.event_store.get_event_summaries(None, None, Some(&same_run))
    }

    pub fn count_events(
        &self,
        start_time: Option<f64>,
        end_time: Option<f64>,
        filter: Option<EventFilter<'_>>,
    ) -> usize {
        self.event_store.count_events(start_time, end_time, filter)
    }

    pub fn clear(&self) {
        self.event_store.clear();
    }

    pub fn len(&self) -> usize {
        self.event_store.len()
    }

    pub fn is_empty(&self) -> bool {
        self.event_store.is_empty()
    }
}

impl Default for TracerSystem {
    fn default() -> Self {
        Self::new(None, true)
    }
}

fn current_timestamp() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_records_when_enabled() {
        let tracer = TracerSystem::default();
        tracer.record_model_turn(
            TurnRecord {
                model: "m".to_string(),
                turn: 1,
                ..Default::default()
            },
            "test",
            "run-1",
        );
        tracer.record_tool_call("f", "c1", json!({}), json!(1), false, "test", "run-1");
        tracer.record_protocol_anomaly("bad id", "test", "run-2");

        assert_eq!(tracer.len(), 3);
        assert_eq!(tracer.run_summaries("run-1").len(), 2);
        assert_eq!(tracer.event_store().count_kind("protocol_anomaly"), 1);
    }

    #[test]
    fn test_disabled_tracer_drops_events() {
        let tracer = TracerSystem::new(None, false);
        tracer.record_protocol_anomaly("ignored", "test", "run");
        assert!(tracer.is_empty());

        tracer.enable();
        tracer.record_protocol_anomaly("kept", "test", "run");
        assert_eq!(tracer.len(), 1);

        tracer.disable();
        assert!(!tracer.is_enabled());
    }

    #[test]
    fn test_shared_event_store() {
        let store = Arc::new(EventStore::default());
        let first = TracerSystem::new(Some(store.clone()), true);
        let second = TracerSystem::new(Some(store.clone()), true);

        first.record_protocol_anomaly("a", "first", "run");
        second.record_protocol_anomaly("b", "second", "run");

        assert_eq!(store.len(), 2);
        first.clear();
        assert!(second.is_empty());
    }
}
