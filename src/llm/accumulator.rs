//! Consolidation of streamed fragments into a single message.
//!
//! Upstream services stream a turn as a series of partial fragments: text arrives in
//! arbitrary slices, and tool calls may arrive with only some of their fields populated
//! (an id with no name, a name followed later by argument text, argument JSON split across
//! many chunks). [`MessageAccumulator`] merges those fragments and produces the canonical
//! form of the turn: at most one text part, one part per tool call, arguments parsed.

use crate::llm::models::{LlmMessage, MessageRole, Part, PartDelta, ToolCallDelta, ToolPart};
use serde_json::{Map, Value};
use tracing::warn;

/// Tool call being assembled from fragments
#[derive(Debug, Clone, Default)]
struct PendingToolCall {
    id: String,
    name: String,
    index: Option<usize>,
    arguments_text: String,
    arguments: Option<Value>,
}

impl PendingToolCall {
    fn from_delta(delta: ToolCallDelta) -> Self {
        let mut call = Self {
            index: delta.index,
            ..Default::default()
        };
        call.merge(delta);
        call
    }

    /// Overwrite field-by-field, only where the fragment carries a value
    fn merge(&mut self, delta: ToolCallDelta) {
        if let Some(id) = delta.id.filter(|id| !id.is_empty()) {
            self.id = id;
        }
        if let Some(name) = delta.name.filter(|name| !name.is_empty()) {
            self.name = name;
        }
        if self.index.is_none() {
            self.index = delta.index;
        }
        if let Some(fragment) = delta.arguments_delta {
            self.arguments_text.push_str(&fragment);
        }
        if let Some(arguments) = delta.arguments.filter(|args| !args.is_null()) {
            self.arguments = Some(arguments);
        }
    }

    fn name_compatible(&self, name: Option<&str>) -> bool {
        match name {
            None | Some("") => true,
            Some(name) => self.name.is_empty() || self.name == name,
        }
    }

    fn parsed_arguments(&self) -> Value {
        if let Some(arguments) = &self.arguments {
            return arguments.clone();
        }
        if self.arguments_text.trim().is_empty() {
            return Value::Object(Map::new());
        }
        match serde_json::from_str(&self.arguments_text) {
            Ok(arguments) => arguments,
            Err(e) => {
                warn!("Unparsable arguments for tool call {}: {}", self.name, e);
                Value::Object(Map::new())
            }
        }
    }
}

#[derive(Debug, Clone)]
enum Slot {
    Text(String),
    Call(PendingToolCall),
    Part(Part),
}

/// Per-turn buffer that merges streamed fragments into one message
#[derive(Debug, Clone)]
pub struct MessageAccumulator {
    role: MessageRole,
    slots: Vec<Slot>,
    text_slot: Option<usize>,
}

impl Default for MessageAccumulator {
    fn default() -> Self {
        Self::new(MessageRole::Model)
    }
}

impl MessageAccumulator {
    pub fn new(role: MessageRole) -> Self {
        Self {
            role,
            slots: Vec::new(),
            text_slot: None,
        }
    }

    /// Drop everything accumulated so far
    pub fn reset(&mut self) {
        self.slots.clear();
        self.text_slot = None;
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// The text accumulated so far this turn
    pub fn text(&self) -> Option<&str> {
        self.text_slot.and_then(|i| match &self.slots[i] {
            Slot::Text(text) => Some(text.as_str()),
            _ => None,
        })
    }

    /// Feed one fragment into the buffer
    pub fn push(&mut self, delta: PartDelta) {
        match delta {
            PartDelta::Text(text) => self.push_text(&text),
            PartDelta::ToolCall(call) => self.push_tool_call(call),
            PartDelta::Part(Part::Text { text }) => self.push_text(&text),
            PartDelta::Part(Part::Tool(tool)) if tool.is_call() => self.push_tool_call(tool.into()),
            PartDelta::Part(part) => self.slots.push(Slot::Part(part)),
        }
    }

    /// Extend the single text part of the turn, creating it on first use
    pub fn push_text(&mut self, fragment: &str) {
        if fragment.is_empty() {
            return;
        }
        match self.text_slot {
            Some(i) => {
                if let Slot::Text(text) = &mut self.slots[i] {
                    text.push_str(fragment);
                }
            }
            None => {
                self.text_slot = Some(self.slots.len());
                self.slots.push(Slot::Text(fragment.to_string()));
            }
        }
    }

    /// Merge a tool call fragment into the call it belongs to, or start a new one.
    ///
    /// A non-empty id wins; an id-less fragment is matched on its name and position.
    pub fn push_tool_call(&mut self, delta: ToolCallDelta) {
        match self.find_call(&delta) {
            Some(i) => {
                if let Slot::Call(call) = &mut self.slots[i] {
                    call.merge(delta);
                }
            }
            None => self.slots.push(Slot::Call(PendingToolCall::from_delta(delta))),
        }
    }

    fn find_call(&self, delta: &ToolCallDelta) -> Option<usize> {
        let id = delta.id.as_deref().unwrap_or("");
        let name = delta.name.as_deref();

        if !id.is_empty() {
            if let Some(i) = self.position_of(|call| call.id == id) {
                return Some(i);
            }
            // The id may show up after the call was opened by an anonymous fragment.
            return delta.index.and_then(|index| {
                self.position_of(|call| {
                    call.id.is_empty() && call.index == Some(index) && call.name_compatible(name)
                })
            });
        }

        match delta.index {
            Some(index) => {
                self.position_of(|call| call.index == Some(index) && call.name_compatible(name))
            }
            // Without id or index, a name opens a new call and anything else continues the last.
            None if name.is_some_and(|n| !n.is_empty()) => None,
            None => self.slots.iter().rposition(|slot| matches!(slot, Slot::Call(_))),
        }
    }

    fn position_of(&self, predicate: impl Fn(&PendingToolCall) -> bool) -> Option<usize> {
        self.slots.iter().position(|slot| match slot {
            Slot::Call(call) => predicate(call),
            _ => false,
        })
    }

    /// Produce the canonical message for everything accumulated so far
    pub fn consolidate(&self) -> LlmMessage {
        let mut parts = Vec::with_capacity(self.slots.len());
        for slot in &self.slots {
            match slot {
                Slot::Text(text) => parts.push(Part::text(text.clone())),
                Slot::Part(part) => parts.push(part.clone()),
                Slot::Call(call) if call.name.is_empty() => {
                    warn!("Dropping tool call fragment without a name (id: {:?})", call.id);
                }
                Slot::Call(call) => parts.push(Part::Tool(ToolPart::call(
                    call.id.clone(),
                    call.name.clone(),
                    call.parsed_arguments(),
                ))),
            }
        }

        debug_assert!(
            parts.iter().filter(|p| matches!(p, Part::Text { .. })).count() <= 1,
            "consolidated message carries more than one text part"
        );

        LlmMessage::new(self.role, parts)
    }
}

impl LlmMessage {
    /// Canonical form of this message: text parts merged, tool calls parsed.
    ///
    /// Consolidating an already-consolidated message returns it unchanged.
    pub fn consolidated(&self) -> LlmMessage {
        let mut accumulator = MessageAccumulator::new(self.role);
        for part in &self.parts {
            accumulator.push(PartDelta::from(part.clone()));
        }
        accumulator.consolidate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn name_delta(id: &str, name: &str, index: usize) -> ToolCallDelta {
        ToolCallDelta {
            id: Some(id.to_string()),
            name: Some(name.to_string()),
            index: Some(index),
            ..Default::default()
        }
    }

    #[test]
    fn test_text_fragments_merge_into_one_part() {
        let mut acc = MessageAccumulator::default();
        for fragment in ["Hel", "lo, ", "world"] {
            acc.push(PartDelta::Text(fragment.to_string()));
        }

        let msg = acc.consolidate();
        assert_eq!(msg.role, MessageRole::Model);
        assert_eq!(msg.parts, vec![Part::text("Hello, world")]);
    }

    #[test]
    fn test_text_after_tool_call_extends_existing_text() {
        let mut acc = MessageAccumulator::default();
        acc.push(PartDelta::Text("Let me ".to_string()));
        acc.push(PartDelta::ToolCall(ToolCallDelta::complete("c1", "f", json!({}))));
        acc.push(PartDelta::Text("check.".to_string()));

        let msg = acc.consolidate();
        assert_eq!(msg.parts.len(), 2);
        assert_eq!(msg.parts[0], Part::text("Let me check."));
    }

    #[test]
    fn test_empty_text_fragments_are_ignored() {
        let mut acc = MessageAccumulator::default();
        acc.push(PartDelta::Text(String::new()));
        assert!(acc.is_empty());
        assert!(acc.consolidate().parts.is_empty());
    }

    #[test]
    fn test_streamed_arguments_are_joined_then_parsed() {
        let mut acc = MessageAccumulator::default();
        acc.push_tool_call(name_delta("call_1", "get_weather", 0));
        acc.push_tool_call(ToolCallDelta::arguments_at(0, "{\"location\""));
        acc.push_tool_call(ToolCallDelta::arguments_at(0, ": \"NYC\"}"));

        let msg = acc.consolidate();
        let call = msg.tool_calls().next().unwrap();
        assert_eq!(call.id, "call_1");
        assert_eq!(call.name, "get_weather");
        assert_eq!(call.arguments, Some(json!({"location": "NYC"})));
    }

    #[test]
    fn test_interleaved_calls_are_matched_by_index() {
        let mut acc = MessageAccumulator::default();
        acc.push_tool_call(name_delta("a", "first", 0));
        acc.push_tool_call(name_delta("b", "second", 1));
        acc.push_tool_call(ToolCallDelta::arguments_at(1, "{\"n\":2}"));
        acc.push_tool_call(ToolCallDelta::arguments_at(0, "{\"n\":1}"));

        let msg = acc.consolidate();
        let calls: Vec<_> = msg.tool_calls().collect();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].name, "first");
        assert_eq!(calls[0].arguments, Some(json!({"n": 1})));
        assert_eq!(calls[1].name, "second");
        assert_eq!(calls[1].arguments, Some(json!({"n": 2})));
    }

    #[test]
    fn test_fragment_with_id_only_gets_name_later() {
        let mut acc = MessageAccumulator::default();
        acc.push_tool_call(ToolCallDelta {
            id: Some("call_9".to_string()),
            ..Default::default()
        });
        acc.push_tool_call(ToolCallDelta {
            id: Some("call_9".to_string()),
            name: Some("lookup".to_string()),
            arguments_delta: Some("{}".to_string()),
            ..Default::default()
        });

        let msg = acc.consolidate();
        let calls: Vec<_> = msg.tool_calls().collect();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].name, "lookup");
    }

    #[test]
    fn test_late_id_is_adopted_by_anonymous_call_at_same_index() {
        let mut acc = MessageAccumulator::default();
        acc.push_tool_call(ToolCallDelta {
            name: Some("f".to_string()),
            index: Some(0),
            ..Default::default()
        });
        acc.push_tool_call(ToolCallDelta {
            id: Some("late".to_string()),
            index: Some(0),
            arguments_delta: Some("{\"x\":1}".to_string()),
            ..Default::default()
        });

        let msg = acc.consolidate();
        let calls: Vec<_> = msg.tool_calls().collect();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].id, "late");
        assert_eq!(calls[0].arguments, Some(json!({"x": 1})));
    }

    #[test]
    fn test_whole_calls_with_empty_ids_stay_distinct() {
        let mut acc = MessageAccumulator::default();
        acc.push_tool_call(ToolCallDelta::complete("", "f", json!({"x": 1})));
        acc.push_tool_call(ToolCallDelta::complete("", "f", json!({"x": 2})));

        let msg = acc.consolidate();
        let args: Vec<_> = msg.tool_calls().map(|c| c.arguments.clone().unwrap()).collect();
        assert_eq!(args, vec![json!({"x": 1}), json!({"x": 2})]);
    }

    #[test]
    fn test_later_empty_values_do_not_overwrite() {
        let mut acc = MessageAccumulator::default();
        acc.push_tool_call(name_delta("c", "keep_me", 0));
        acc.push_tool_call(ToolCallDelta {
            id: Some(String::new()),
            name: Some(String::new()),
            index: Some(0),
            arguments: Some(Value::Null),
            ..Default::default()
        });

        let msg = acc.consolidate();
        let call = msg.tool_calls().next().unwrap();
        assert_eq!(call.id, "c");
        assert_eq!(call.name, "keep_me");
        assert_eq!(call.arguments, Some(json!({})));
    }

    #[test]
    fn test_unparsable_arguments_become_empty_object() {
        let mut acc = MessageAccumulator::default();
        acc.push_tool_call(name_delta("c", "f", 0));
        acc.push_tool_call(ToolCallDelta::arguments_at(0, "{\"broken\":"));

        let msg = acc.consolidate();
        assert_eq!(msg.tool_calls().next().unwrap().arguments, Some(json!({})));
    }

    #[test]
    fn test_nameless_call_is_dropped() {
        let mut acc = MessageAccumulator::default();
        acc.push_tool_call(ToolCallDelta::arguments_at(3, "{}"));
        assert!(acc.consolidate().parts.is_empty());
    }

    #[test]
    fn test_non_text_parts_keep_their_order() {
        let mut acc = MessageAccumulator::default();
        acc.push(PartDelta::Part(Part::link("https://example.com")));
        acc.push(PartDelta::Text("see above".to_string()));
        acc.push(PartDelta::Part(Part::data(vec![0xff], "image/png")));

        let msg = acc.consolidate();
        assert_eq!(
            msg.parts,
            vec![
                Part::link("https://example.com"),
                Part::text("see above"),
                Part::data(vec![0xff], "image/png"),
            ]
        );
    }

    #[test]
    fn test_reset_clears_buffer() {
        let mut acc = MessageAccumulator::default();
        acc.push_text("stale");
        acc.reset();
        assert!(acc.is_empty());
        assert_eq!(acc.text(), None);
        acc.push_text("fresh");
        assert_eq!(acc.text(), Some("fresh"));
    }

    #[test]
    fn test_consolidation_is_idempotent() {
        let mut acc = MessageAccumulator::default();
        acc.push_text("Looking");
        acc.push_tool_call(ToolCallDelta::complete("", "f", json!({"x": 1})));
        acc.push_tool_call(ToolCallDelta::complete("", "f", json!({"x": 2})));
        acc.push_tool_call(name_delta("id", "g", 5));
        acc.push_text(" it up");

        let once = acc.consolidate();
        let twice = once.consolidated();
        assert_eq!(once, twice);
        assert_eq!(twice.consolidated(), once);
    }

    #[test]
    fn test_consolidated_merges_split_text_parts() {
        let msg = LlmMessage::new(MessageRole::Model, vec![Part::text("a"), Part::text("b")]);
        assert_eq!(msg.consolidated().parts, vec![Part::text("ab")]);
    }
}
