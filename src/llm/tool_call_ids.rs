//! Correlation of tool calls with their results.
//!
//! Some upstream services leave call identifiers empty (or reuse them) and pair calls
//! with results purely by position. The coordinator gives every call of a turn a key
//! that is unique within the run, and makes sure each key is answered at most once.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

/// Prefix of keys the coordinator invents for calls without a usable id
pub const SYNTHETIC_ID_PREFIX: &str = "synthetic:";

/// Lifecycle of a detected tool call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolCallStatus {
    Pending,
    Completed,
    Failed,
}

/// A tool call the coordinator knows about
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallRecord {
    pub id: String,
    pub name: String,
    pub arguments: Value,
    pub status: ToolCallStatus,
}

#[derive(Debug, Default)]
pub struct ToolCallIdCoordinator {
    records: Vec<ToolCallRecord>,
    position: usize,
}

impl ToolCallIdCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a new turn: positions restart at zero and resolved records are forgotten
    pub fn begin_turn(&mut self) {
        for record in self.pending() {
            warn!("Tool call {} ({}) was never answered", record.id, record.name);
        }
        self.records.retain(|record| record.status == ToolCallStatus::Pending);
        self.position = 0;
    }

    /// Record a call and return the key its result must carry.
    ///
    /// A non-empty id is kept as is. An empty id, or one that is already pending this
    /// run, is replaced by a key built from the name, the canonical arguments and the
    /// position of the call within the turn.
    pub fn register_tool_call(&mut self, id: &str, name: &str, arguments: &Value) -> String {
        let position = self.position;
        self.position += 1;

        let key = if id.is_empty() {
            synthesize_key(name, arguments, position)
        } else if self.is_pending(id) {
            warn!("Upstream reused pending tool call id {}; assigning a synthetic key", id);
            synthesize_key(name, arguments, position)
        } else {
            id.to_string()
        };

        self.records.push(ToolCallRecord {
            id: key.clone(),
            name: name.to_string(),
            arguments: arguments.clone(),
            status: ToolCallStatus::Pending,
        });
        key
    }

    /// Resolve a result id. True only the first time a registered, pending id is seen.
    pub fn validate_result_id(&mut self, id: &str) -> bool {
        match self
            .records
            .iter_mut()
            .find(|record| record.id == id && record.status == ToolCallStatus::Pending)
        {
            Some(record) => {
                record.status = ToolCallStatus::Completed;
                true
            }
            None => false,
        }
    }

    /// Mark a resolved call as failed
    pub fn record_failure(&mut self, id: &str) {
        if let Some(record) = self.records.iter_mut().find(|record| record.id == id) {
            record.status = ToolCallStatus::Failed;
        }
    }

    pub fn is_pending(&self, id: &str) -> bool {
        self.records
            .iter()
            .any(|record| record.id == id && record.status == ToolCallStatus::Pending)
    }

    pub fn pending(&self) -> impl Iterator<Item = &ToolCallRecord> {
        self.records.iter().filter(|record| record.status == ToolCallStatus::Pending)
    }

    pub fn record(&self, id: &str) -> Option<&ToolCallRecord> {
        self.records.iter().find(|record| record.id == id)
    }

    /// Whether an id was invented by the coordinator rather than sent upstream
    pub fn is_synthetic(id: &str) -> bool {
        id.starts_with(SYNTHETIC_ID_PREFIX)
    }
}

fn synthesize_key(name: &str, arguments: &Value, position: usize) -> String {
    format!("{}{}:{}:{}", SYNTHETIC_ID_PREFIX, name, canonical_json(arguments), position)
}

/// JSON text with object keys in sorted order
fn canonical_json(value: &Value) -> String {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            let fields: Vec<String> = keys
                .into_iter()
                .map(|key| format!("{}:{}", Value::String(key.clone()), canonical_json(&map[key])))
                .collect();
            format!("{{{}}}", fields.join(","))
        }
        Value::Array(items) => {
            let items: Vec<String> = items.iter().map(canonical_json).collect();
            format!("[{}]", items.join(","))
        }
        other => other.to_string(),
    }
}
