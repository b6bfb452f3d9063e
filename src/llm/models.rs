use base64::Engine;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

/// Message role in LLM conversation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    System,
    User,
    Model,
}

/// Whether a tool part is a request from the model or the answer fed back to it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolPartKind {
    Call,
    Result,
}

/// A tool call or a tool result inside a message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolPart {
    pub kind: ToolPartKind,
    #[serde(default)]
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arguments: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
}

impl ToolPart {
    /// Create a tool call part
    pub fn call(id: impl Into<String>, name: impl Into<String>, arguments: Value) -> Self {
        Self {
            kind: ToolPartKind::Call,
            id: id.into(),
            name: name.into(),
            arguments: Some(arguments),
            result: None,
        }
    }

    /// Create a tool result part
    pub fn result(id: impl Into<String>, name: impl Into<String>, result: Value) -> Self {
        Self {
            kind: ToolPartKind::Result,
            id: id.into(),
            name: name.into(),
            arguments: None,
            result: Some(result),
        }
    }

    pub fn is_call(&self) -> bool {
        self.kind == ToolPartKind::Call
    }

    pub fn is_result(&self) -> bool {
        self.kind == ToolPartKind::Result
    }
}

/// One ordered element of a message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Part {
    Text {
        text: String,
    },
    Data {
        #[serde(with = "base64_bytes")]
        bytes: Vec<u8>,
        mime_type: String,
    },
    Link {
        url: String,
    },
    Tool(ToolPart),
}

impl Part {
    pub fn text(text: impl Into<String>) -> Self {
        Part::Text { text: text.into() }
    }

    pub fn data(bytes: Vec<u8>, mime_type: impl Into<String>) -> Self {
        Part::Data {
            bytes,
            mime_type: mime_type.into(),
        }
    }

    pub fn link(url: impl Into<String>) -> Self {
        Part::Link { url: url.into() }
    }

    /// Get the tool part if this is one
    pub fn as_tool(&self) -> Option<&ToolPart> {
        match self {
            Part::Tool(tool) => Some(tool),
            _ => None,
        }
    }
}

/// Message in LLM conversation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LlmMessage {
    #[serde(default = "default_role")]
    pub role: MessageRole,
    #[serde(default)]
    pub parts: Vec<Part>,
}

fn default_role() -> MessageRole {
    MessageRole::User
}

impl LlmMessage {
    /// Create a message from explicit parts
    pub fn new(role: MessageRole, parts: Vec<Part>) -> Self {
        Self { role, parts }
    }

    /// Create a user message
    pub fn user(content: impl Into<String>) -> Self {
        Self::new(MessageRole::User, vec![Part::text(content)])
    }

    /// Create a system message
    pub fn system(content: impl Into<String>) -> Self {
        Self::new(MessageRole::System, vec![Part::text(content)])
    }

    /// Create a model message
    pub fn model(content: impl Into<String>) -> Self {
        Self::new(MessageRole::Model, vec![Part::text(content)])
    }

    /// Append attachment parts (images, documents, links) to this message
    pub fn with_parts(mut self, parts: impl IntoIterator<Item = Part>) -> Self {
        self.parts.extend(parts);
        self
    }

    /// The text of this message, if it carries any
    pub fn text(&self) -> Option<&str> {
        self.parts.iter().find_map(|part| match part {
            Part::Text { text } => Some(text.as_str()),
            _ => None,
        })
    }

    /// Tool call parts in message order
    pub fn tool_calls(&self) -> impl Iterator<Item = &ToolPart> {
        self.parts.iter().filter_map(Part::as_tool).filter(|tool| tool.is_call())
    }

    /// Tool result parts in message order
    pub fn tool_results(&self) -> impl Iterator<Item = &ToolPart> {
        self.parts.iter().filter_map(Part::as_tool).filter(|tool| tool.is_result())
    }

    pub fn has_tool_calls(&self) -> bool {
        self.tool_calls().next().is_some()
    }

    pub fn has_tool_results(&self) -> bool {
        self.tool_results().next().is_some()
    }

    pub fn is_empty(&self) -> bool {
        self.parts.is_empty()
    }
}

/// Why the upstream service stopped generating
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FinishReason {
    Stop,
    Length,
    ToolCalls,
    ContentFilter,
    Unspecified,
}

impl FinishReason {
    /// Map a provider tag onto a finish reason. Unknown tags are unspecified.
    pub fn from_tag(tag: &str) -> Self {
        match tag {
            "stop" | "end_turn" | "STOP" => FinishReason::Stop,
            "length" | "max_tokens" | "MAX_TOKENS" => FinishReason::Length,
            "tool_calls" | "tool_use" | "function_call" => FinishReason::ToolCalls,
            "content_filter" | "SAFETY" => FinishReason::ContentFilter,
            _ => FinishReason::Unspecified,
        }
    }

    /// Stop and length end a generation for good; everything else may be an artifact
    pub fn is_terminal(&self) -> bool {
        matches!(self, FinishReason::Stop | FinishReason::Length)
    }
}

/// Partial tool call as streamed by the upstream service
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ToolCallDelta {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Position of the call within the turn, when the service reports one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub index: Option<usize>,
    /// Fragment of the JSON argument text
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arguments_delta: Option<String>,
    /// Fully parsed arguments, for services that send calls whole
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arguments: Option<Value>,
}

impl ToolCallDelta {
    /// A complete call in one fragment
    pub fn complete(id: impl Into<String>, name: impl Into<String>, arguments: Value) -> Self {
        Self {
            id: Some(id.into()),
            name: Some(name.into()),
            index: None,
            arguments_delta: None,
            arguments: Some(arguments),
        }
    }

    /// A fragment carrying a piece of argument text for the call at `index`
    pub fn arguments_at(index: usize, fragment: impl Into<String>) -> Self {
        Self {
            index: Some(index),
            arguments_delta: Some(fragment.into()),
            ..Default::default()
        }
    }
}

impl From<ToolPart> for ToolCallDelta {
    fn from(part: ToolPart) -> Self {
        Self {
            id: Some(part.id),
            name: Some(part.name),
            index: None,
            arguments_delta: None,
            arguments: part.arguments,
        }
    }
}

/// One incremental piece of a model message
#[derive(Debug, Clone, PartialEq)]
pub enum PartDelta {
    Text(String),
    ToolCall(ToolCallDelta),
    /// A complete non-text part (attachments, links, tool results)
    Part(Part),
}

impl From<Part> for PartDelta {
    fn from(part: Part) -> Self {
        match part {
            Part::Text { text } => PartDelta::Text(text),
            Part::Tool(tool) if tool.is_call() => PartDelta::ToolCall(tool.into()),
            other => PartDelta::Part(other),
        }
    }
}

/// A chunk of the upstream response stream
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StreamDelta {
    pub parts: Vec<PartDelta>,
    pub finish_reason: Option<FinishReason>,
}

impl StreamDelta {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            parts: vec![PartDelta::Text(text.into())],
            finish_reason: None,
        }
    }

    pub fn tool_call(delta: ToolCallDelta) -> Self {
        Self {
            parts: vec![PartDelta::ToolCall(delta)],
            finish_reason: None,
        }
    }

    /// A chunk that carries nothing but the finish reason
    pub fn finished(reason: FinishReason) -> Self {
        Self {
            parts: Vec::new(),
            finish_reason: Some(reason),
        }
    }

    pub fn with_finish_reason(mut self, reason: FinishReason) -> Self {
        self.finish_reason = Some(reason);
        self
    }
}

mod base64_bytes {
    use super::*;

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&base64::engine::general_purpose::STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        base64::engine::general_purpose::STANDARD
            .decode(encoded.as_bytes())
            .map_err(serde::de::Error::custom)
    }
}
