//! Batch execution of tool calls.
//!
//! Every call in a batch produces exactly one [`ToolOutcome`], in the order the calls were
//! given. Unknown tools, handler errors, bad arguments and panics are all turned into a
//! structured `{"error": ...}` result so the model can read about them on the next turn.

use crate::error::ToolflowError;
use crate::llm::models::{Part, ToolPart};
use crate::llm::tools::{LlmTool, ToolRegistry};
use futures::FutureExt;
use futures_util::future::join_all;
use serde_json::{json, Value};
use std::any::Any;
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// A tool call ready to run
#[derive(Debug, Clone, PartialEq)]
pub struct ToolInvocation {
    pub id: String,
    pub name: String,
    pub arguments: Value,
}

impl ToolInvocation {
    pub fn new(id: impl Into<String>, name: impl Into<String>, arguments: Value) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            arguments,
        }
    }
}

impl From<&ToolPart> for ToolInvocation {
    fn from(part: &ToolPart) -> Self {
        Self::new(
            part.id.clone(),
            part.name.clone(),
            part.arguments.clone().unwrap_or(Value::Null),
        )
    }
}

/// Result of one tool call
#[derive(Debug, Clone, PartialEq)]
pub struct ToolOutcome {
    pub id: String,
    pub name: String,
    pub result: Value,
    pub failed: bool,
}

impl ToolOutcome {
    pub fn success(id: impl Into<String>, name: impl Into<String>, result: Value) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            result,
            failed: false,
        }
    }

    pub fn error(id: impl Into<String>, name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            result: json!({ "error": message.into() }),
            failed: true,
        }
    }

    /// The result part fed back to the model
    pub fn to_part(&self) -> Part {
        Part::Tool(ToolPart::result(self.id.clone(), self.name.clone(), self.result.clone()))
    }
}

type Slot = (usize, ToolInvocation, Option<Arc<dyn LlmTool>>);

/// Runs batches of tool calls against a registry
pub struct ToolExecutor<'a> {
    registry: &'a ToolRegistry,
    parallel: bool,
}

impl<'a> ToolExecutor<'a> {
    pub fn new(registry: &'a ToolRegistry) -> Self {
        Self {
            registry,
            parallel: true,
        }
    }

    /// Run every call one after another, even across different tools
    pub fn sequential(mut self) -> Self {
        self.parallel = false;
        self
    }

    /// Execute a batch and return one outcome per call, in call order.
    ///
    /// Calls to the same tool run in order; different tools run concurrently. Each group
    /// runs on its own task, so a dropped caller does not interrupt tools already started.
    pub async fn execute(&self, calls: Vec<ToolInvocation>) -> Vec<ToolOutcome> {
        let bound = calls
            .into_iter()
            .map(|call| {
                let tool = self.registry.get(&call.name);
                (call, tool)
            })
            .collect();
        self.execute_bound(bound).await
    }

    /// Execute calls whose handlers were resolved by the caller.
    ///
    /// A call paired with `None` is answered as not found.
    pub async fn execute_bound(&self, calls: Vec<(ToolInvocation, Option<Arc<dyn LlmTool>>)>) -> Vec<ToolOutcome> {
        if calls.is_empty() {
            return Vec::new();
        }
        info!("Tool calls requested: {}", calls.len());

        let count = calls.len();
        let mut groups: Vec<(String, Vec<Slot>)> = Vec::new();
        for (position, (call, tool)) in calls.into_iter().enumerate() {
            let key = if self.parallel { call.name.clone() } else { String::new() };
            match groups.iter_mut().find(|(name, _)| *name == key) {
                Some((_, slots)) => slots.push((position, call, tool)),
                None => groups.push((key, vec![(position, call, tool)])),
            }
        }
        debug!("Dispatching {} tool group(s)", groups.len());

        let handles = groups.into_iter().map(|(_, slots)| {
            let labels: Vec<(usize, String, String)> = slots
                .iter()
                .map(|(position, call, _)| (*position, call.id.clone(), call.name.clone()))
                .collect();
            let handle = tokio::spawn(run_group(slots));
            async move { (labels, handle.await) }
        });

        let mut outcomes: Vec<Option<ToolOutcome>> = vec![None; count];
        for (labels, joined) in join_all(handles).await {
            match joined {
                Ok(results) => {
                    for (position, outcome) in results {
                        outcomes[position] = Some(outcome);
                    }
                }
                Err(e) => {
                    warn!("Tool task did not complete: {}", e);
                    for (position, id, name) in labels {
                        outcomes[position] = Some(ToolOutcome::error(
                            id,
                            name.clone(),
                            format!("Tool {} did not complete: {}", name, e),
                        ));
                    }
                }
            }
        }

        outcomes.into_iter().flatten().collect()
    }
}

async fn run_group(slots: Vec<Slot>) -> Vec<(usize, ToolOutcome)> {
    let mut results = Vec::with_capacity(slots.len());
    for (position, call, tool) in slots {
        results.push((position, run_one(call, tool).await));
    }
    results
}

async fn run_one(call: ToolInvocation, tool: Option<Arc<dyn LlmTool>>) -> ToolOutcome {
    let Some(tool) = tool else {
        warn!("Tool not found: {}", call.name);
        return ToolOutcome::error(call.id, call.name.clone(), ToolflowError::ToolNotFound(call.name).to_string());
    };

    let args: HashMap<String, Value> = match call.arguments {
        Value::Object(map) => map.into_iter().collect(),
        Value::Null => HashMap::new(),
        other => {
            warn!("Tool {} received non-object arguments", call.name);
            let message = format!("Tool {} expects an object of arguments, got {}", call.name, other);
            return ToolOutcome::error(call.id, call.name, message);
        }
    };

    info!("Executing tool: {}", call.name);
    match AssertUnwindSafe(tool.run(&args)).catch_unwind().await {
        Ok(Ok(result)) => ToolOutcome::success(call.id, call.name, result),
        Ok(Err(e)) => {
            warn!("Tool execution failed: {}", e);
            ToolOutcome::error(call.id, call.name, e.to_string())
        }
        Err(panic) => {
            let message = format!("Tool {} panicked: {}", call.name, panic_message(panic.as_ref()));
            warn!("{}", message);
            ToolOutcome::error(call.id, call.name, message)
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
