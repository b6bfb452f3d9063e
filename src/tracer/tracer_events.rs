//! Tracer event types for tracking orchestrated runs
//!
//! Events record what the orchestrator saw and did: each model turn, each tool
//! execution, and each correlation anomaly reported by an upstream service. All events
//! implement [`TracerEvent`], which provides timestamps, correlation IDs, and printable
//! summaries.

use crate::llm::models::FinishReason;
use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Base trait for all tracer events
pub trait TracerEvent: Send + Sync {
    /// Unix timestamp (seconds) when the event occurred
    fn timestamp(&self) -> f64;

    /// Correlation ID shared by every event of one run
    fn correlation_id(&self) -> &str;

    /// Component that recorded the event
    fn source(&self) -> &str;

    /// Short type tag, used for filtering
    fn kind(&self) -> &'static str;

    /// Get a formatted string summary of the event
    fn printable_summary(&self) -> String;
}

fn format_time(timestamp: f64) -> String {
    DateTime::from_timestamp_millis((timestamp * 1000.0) as i64)
        .map(|dt| dt.with_timezone(&Local).format("%H:%M:%S%.3f").to_string())
        .unwrap_or_else(|| "??:??:??".to_string())
}

fn preview(text: &str, limit: usize) -> String {
    match text.char_indices().nth(limit) {
        Some((cut, _)) => format!("{}...", &text[..cut]),
        None => text.to_string(),
    }
}

/// Records one completed model turn
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelTurnTracerEvent {
    pub timestamp: f64,
    pub correlation_id: String,
    pub source: String,
    /// The model that produced the turn
    pub model: String,
    /// 1-based turn number within the run
    pub turn: usize,
    /// History length sent with the request
    pub message_count: usize,
    /// Tools advertised for the turn
    pub tools: Vec<String>,
    /// Consolidated text of the turn
    pub text: String,
    /// Names of the tools the model called
    pub tool_calls: Vec<String>,
    pub finish_reason: Option<FinishReason>,
    pub duration_ms: f64,
}

impl TracerEvent for ModelTurnTracerEvent {
    fn timestamp(&self) -> f64 {
        self.timestamp
    }

    fn correlation_id(&self) -> &str {
        &self.correlation_id
    }

    fn source(&self) -> &str {
        &self.source
    }

    fn kind(&self) -> &'static str {
        "model_turn"
    }

    fn printable_summary(&self) -> String {
        let mut summary = format!(
            "[{}] ModelTurnTracerEvent (correlation_id: {})\n   Model: {} (turn {}, {} messages)",
            format_time(self.timestamp),
            self.correlation_id,
            self.model,
            self.turn,
            self.message_count
        );

        if !self.tools.is_empty() {
            summary.push_str(&format!("\n   Available Tools: {}", self.tools.join(", ")));
        }
        if !self.text.is_empty() {
            summary.push_str(&format!("\n   Content: {}", preview(&self.text, 100)));
        }
        if !self.tool_calls.is_empty() {
            summary.push_str(&format!("\n   Tool Calls: {}", self.tool_calls.join(", ")));
        }
        if let Some(reason) = self.finish_reason {
            summary.push_str(&format!("\n   Finish Reason: {:?}", reason));
        }
        summary.push_str(&format!("\n   Duration: {:.2}ms", self.duration_ms));
        summary
    }
}

/// Records one tool execution
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCallTracerEvent {
    pub timestamp: f64,
    pub correlation_id: String,
    pub source: String,
    pub tool_name: String,
    /// Correlation key of the call within the turn
    pub call_id: String,
    pub arguments: Value,
    pub result: Value,
    pub failed: bool,
}

impl TracerEvent for ToolCallTracerEvent {
    fn timestamp(&self) -> f64 {
        self.timestamp
    }

    fn correlation_id(&self) -> &str {
        &self.correlation_id
    }

    fn source(&self) -> &str {
        &self.source
    }

    fn kind(&self) -> &'static str {
        "tool_call"
    }

    fn printable_summary(&self) -> String {
        format!(
            "[{}] ToolCallTracerEvent (correlation_id: {})\n   Tool: {} [{}]{}\n   Arguments: {}\n   Result: {}",
            format_time(self.timestamp),
            self.correlation_id,
            self.tool_name,
            self.call_id,
            if self.failed { " (failed)" } else { "" },
            self.arguments,
            preview(&self.result.to_string(), 100)
        )
    }
}

/// Records a violation of call/result correlation by an upstream service
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProtocolAnomalyTracerEvent {
    pub timestamp: f64,
    pub correlation_id: String,
    pub source: String,
    pub description: String,
}

impl TracerEvent for ProtocolAnomalyTracerEvent {
    fn timestamp(&self) -> f64 {
        self.timestamp
    }

    fn correlation_id(&self) -> &str {
        &self.correlation_id
    }

    fn source(&self) -> &str {
        &self.source
    }

    fn kind(&self) -> &'static str {
        "protocol_anomaly"
    }

    fn printable_summary(&self) -> String {
        format!(
            "[{}] ProtocolAnomalyTracerEvent (correlation_id: {})\n   {}",
            format_time(self.timestamp),
            self.correlation_id,
            self.description
        )
    }
}
