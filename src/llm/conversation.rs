//! State of one in-flight run.
//!
//! A [`ConversationState`] is owned by exactly one run. It holds the history, the
//! read-only tool registry, and the per-turn buffers (accumulator, call coordinator,
//! first-chunk flag, finish reason). Nothing in it is shared, so independent runs can
//! proceed concurrently without coordination.

use crate::llm::accumulator::MessageAccumulator;
use crate::llm::gateway::OutputConstraint;
use crate::llm::models::{FinishReason, LlmMessage, MessageRole, Part, PartDelta, StreamDelta};
use crate::llm::tool_call_ids::ToolCallIdCoordinator;
use crate::llm::tools::{ResultCaptureTool, ToolBinding, ToolDescriptor, ToolRegistry};
use serde_json::Value;
use std::time::{Duration, Instant};
use tracing::debug;

/// Where the orchestrator is within a turn
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnPhase {
    StreamingText,
    Consolidating,
    ToolsPending,
    ExecutingTools,
    Done,
}

pub struct ConversationState {
    history: Vec<LlmMessage>,
    tools: ToolRegistry,
    result_capture: Option<ResultCaptureTool>,
    accumulator: MessageAccumulator,
    coordinator: ToolCallIdCoordinator,
    first_chunk: bool,
    finish_reason: Option<FinishReason>,
    phase: TurnPhase,
    turns: usize,
    turn_started: Instant,
    output: Option<Value>,
    captured_text: Option<String>,
}

impl ConversationState {
    pub fn new(history: Vec<LlmMessage>, tools: ToolRegistry) -> Self {
        Self {
            history,
            tools,
            result_capture: None,
            accumulator: MessageAccumulator::new(MessageRole::Model),
            coordinator: ToolCallIdCoordinator::new(),
            first_chunk: true,
            finish_reason: None,
            phase: TurnPhase::StreamingText,
            turns: 0,
            turn_started: Instant::now(),
            output: None,
            captured_text: None,
        }
    }

    /// Offer the synthetic result-capture tool alongside the registered tools
    pub fn with_result_capture(mut self, tool: ResultCaptureTool) -> Self {
        self.result_capture = Some(tool);
        self
    }

    /// Clear the per-turn buffers; history and tools are kept
    pub fn reset_for_new_turn(&mut self) {
        self.accumulator.reset();
        self.coordinator.begin_turn();
        self.first_chunk = true;
        self.finish_reason = None;
        self.phase = TurnPhase::StreamingText;
        self.turns += 1;
        self.turn_started = Instant::now();
    }

    /// Feed one streamed chunk into the turn buffer.
    ///
    /// Returns the non-empty text fragments of the chunk, in order, for passthrough.
    pub fn accumulate(&mut self, delta: StreamDelta) -> Vec<String> {
        if self.first_chunk {
            self.first_chunk = false;
            debug!(
                "First chunk of turn {} after {:.2}ms",
                self.turns,
                self.turn_started.elapsed().as_secs_f64() * 1000.0
            );
        }
        if let Some(reason) = delta.finish_reason {
            self.finish_reason = Some(reason);
        }

        let mut fragments = Vec::new();
        for part in delta.parts {
            match &part {
                PartDelta::Text(text) | PartDelta::Part(Part::Text { text }) if !text.is_empty() => {
                    fragments.push(text.clone());
                }
                _ => {}
            }
            self.accumulator.push(part);
        }
        fragments
    }

    /// Merge the turn's fragments into its final message
    pub fn consolidate_turn(&mut self) -> LlmMessage {
        self.phase = TurnPhase::Consolidating;
        self.accumulator.consolidate()
    }

    pub fn register_tool_call(&mut self, id: &str, name: &str, arguments: &Value) -> String {
        self.coordinator.register_tool_call(id, name, arguments)
    }

    /// Register every call part of `message`, writing the correlation key into each part
    pub fn assign_call_ids(&mut self, mut message: LlmMessage) -> LlmMessage {
        for part in message.parts.iter_mut() {
            if let Part::Tool(tool) = part {
                if tool.is_call() {
                    let arguments = tool.arguments.clone().unwrap_or(Value::Null);
                    tool.id = self.coordinator.register_tool_call(&tool.id, &tool.name, &arguments);
                }
            }
        }
        message
    }

    pub fn validate_result_id(&mut self, id: &str) -> bool {
        self.coordinator.validate_result_id(id)
    }

    pub fn record_failure(&mut self, id: &str) {
        self.coordinator.record_failure(id);
    }

    /// Append a finalized message; history is append-only
    pub fn add_to_history(&mut self, message: LlmMessage) {
        self.history.push(message);
    }

    /// Stop the run at the driver's next check
    pub fn mark_complete(&mut self) {
        self.phase = TurnPhase::Done;
    }

    pub fn is_complete(&self) -> bool {
        self.phase == TurnPhase::Done
    }

    pub fn set_phase(&mut self, phase: TurnPhase) {
        debug!("Turn {}: {:?} -> {:?}", self.turns, self.phase, phase);
        self.phase = phase;
    }

    pub fn phase(&self) -> TurnPhase {
        self.phase
    }

    pub fn history(&self) -> &[LlmMessage] {
        &self.history
    }

    pub fn tools(&self) -> &ToolRegistry {
        &self.tools
    }

    pub fn result_capture(&self) -> Option<&ResultCaptureTool> {
        self.result_capture.as_ref()
    }

    /// Resolve a tool name for this run
    pub fn binding_for(&self, name: &str) -> Option<ToolBinding<'_>> {
        if let Some(capture) = &self.result_capture {
            if capture.descriptor().name() == name {
                return Some(ToolBinding::ResultCapture(capture));
            }
        }
        self.tools.get(name).map(ToolBinding::Handler)
    }

    /// Everything the model may call this turn
    pub fn tool_descriptors(&self) -> Vec<ToolDescriptor> {
        let mut descriptors = self.tools.descriptors();
        if let Some(capture) = &self.result_capture {
            descriptors.push(capture.descriptor());
        }
        descriptors
    }

    pub fn output_constraint(&self) -> Option<OutputConstraint> {
        self.result_capture.as_ref().map(|capture| OutputConstraint {
            schema: capture.schema().clone(),
            capture_tool: capture.descriptor().function.name,
        })
    }

    pub fn finish_reason(&self) -> Option<FinishReason> {
        self.finish_reason
    }

    pub fn turns(&self) -> usize {
        self.turns
    }

    pub fn turn_elapsed(&self) -> Duration {
        self.turn_started.elapsed()
    }

    pub fn set_output(&mut self, output: Value) {
        self.output = Some(output);
    }

    pub fn output(&self) -> Option<&Value> {
        self.output.as_ref()
    }

    pub fn set_captured_text(&mut self, text: String) {
        self.captured_text = Some(text);
    }

    pub fn captured_text(&self) -> Option<&str> {
        self.captured_text.as_deref()
    }

    /// Hand the history back to the caller along with any structured output
    pub fn into_parts(self) -> (Vec<LlmMessage>, Option<Value>, Option<String>) {
        (self.history, self.output, self.captured_text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::models::ToolCallDelta;
    use crate::llm::testing::EchoTool;
    use crate::llm::tools::RESULT_CAPTURE_TOOL_NAME;
    use serde_json::json;
    use std::sync::Arc;

    fn state() -> ConversationState {
        let tools = ToolRegistry::new().with_tool(Arc::new(EchoTool::new("echo"))).unwrap();
        ConversationState::new(vec![LlmMessage::user("hi")], tools)
    }

    #[test]
    fn test_reset_keeps_history_and_tools() {
        let mut state = state();
        state.reset_for_new_turn();
        state.accumulate(StreamDelta::text("partial"));
        state.reset_for_new_turn();

        assert!(state.consolidate_turn().is_empty());
        assert_eq!(state.history().len(), 1);
        assert_eq!(state.tools().len(), 1);
        assert_eq!(state.turns(), 2);
    }

    #[test]
    fn test_accumulate_returns_text_fragments_and_tracks_finish_reason() {
        let mut state = state();
        state.reset_for_new_turn();
        let delta = StreamDelta {
            parts: vec![
                PartDelta::Text("a".to_string()),
                PartDelta::Text(String::new()),
                PartDelta::ToolCall(ToolCallDelta::complete("c", "echo", json!({}))),
                PartDelta::Text("b".to_string()),
            ],
            finish_reason: Some(FinishReason::ToolCalls),
        };

        assert_eq!(state.accumulate(delta), vec!["a", "b"]);
        assert_eq!(state.finish_reason(), Some(FinishReason::ToolCalls));

        let message = state.consolidate_turn();
        assert_eq!(message.text(), Some("ab"));
        assert_eq!(state.phase(), TurnPhase::Consolidating);
    }

    #[test]
    fn test_whole_text_parts_are_passed_through() {
        let mut state = state();
        state.reset_for_new_turn();
        let delta = StreamDelta {
            parts: vec![
                PartDelta::Part(Part::text("hi")),
                PartDelta::Text(" there".to_string()),
                PartDelta::Part(Part::text("")),
            ],
            finish_reason: Some(FinishReason::Stop),
        };

        assert_eq!(state.accumulate(delta), vec!["hi", " there"]);
        assert_eq!(state.consolidate_turn().text(), Some("hi there"));
    }

    #[test]
    fn test_finish_reason_resets_each_turn() {
        let mut state = state();
        state.reset_for_new_turn();
        state.accumulate(StreamDelta::finished(FinishReason::Stop));
        state.reset_for_new_turn();
        assert_eq!(state.finish_reason(), None);
    }

    #[test]
    fn test_assign_call_ids_rewrites_empty_ids() {
        let mut state = state();
        state.reset_for_new_turn();
        state.accumulate(StreamDelta::tool_call(ToolCallDelta::complete("", "echo", json!({"x": 1}))));
        state.accumulate(StreamDelta::tool_call(ToolCallDelta::complete("", "echo", json!({"x": 2}))));

        let message = state.consolidate_turn();
        let message = state.assign_call_ids(message);
        let ids: Vec<_> = message.tool_calls().map(|c| c.id.clone()).collect();

        assert_eq!(ids.len(), 2);
        assert_ne!(ids[0], ids[1]);
        assert!(state.validate_result_id(&ids[1]));
        assert!(state.validate_result_id(&ids[0]));
        assert!(!state.validate_result_id(&ids[0]));
    }

    #[test]
    fn test_mark_complete() {
        let mut state = state();
        assert!(!state.is_complete());
        state.mark_complete();
        assert!(state.is_complete());
        assert_eq!(state.phase(), TurnPhase::Done);
    }

    #[test]
    fn test_binding_resolution() {
        let state = state().with_result_capture(ResultCaptureTool::new(json!({"type": "object"})));

        assert!(matches!(state.binding_for("echo"), Some(ToolBinding::Handler(_))));
        assert!(matches!(
            state.binding_for(RESULT_CAPTURE_TOOL_NAME),
            Some(ToolBinding::ResultCapture(_))
        ));
        assert!(state.binding_for("missing").is_none());

        let names: Vec<_> = state.tool_descriptors().iter().map(|d| d.name().to_string()).collect();
        assert_eq!(names, vec!["echo", RESULT_CAPTURE_TOOL_NAME]);
        assert_eq!(
            state.output_constraint().unwrap().capture_tool,
            RESULT_CAPTURE_TOOL_NAME
        );
    }

    #[test]
    fn test_into_parts_transfers_history() {
        let mut state = state();
        state.add_to_history(LlmMessage::model("hello"));
        state.set_output(json!({"ok": true}));
        state.set_captured_text("aside".to_string());

        let (history, output, captured) = state.into_parts();
        assert_eq!(history.len(), 2);
        assert_eq!(output, Some(json!({"ok": true})));
        assert_eq!(captured.as_deref(), Some("aside"));
    }
}
