//! Test doubles shared by the unit tests of the `llm` module.

use crate::error::{Result, ToolflowError};
use crate::llm::gateway::{CompletionConfig, DeltaStream, LlmGateway, OutputConstraint};
use crate::llm::models::{FinishReason, LlmMessage, StreamDelta, ToolCallDelta};
use crate::llm::tools::{LlmTool, ToolDescriptor};
use async_trait::async_trait;
use futures::stream;
use serde_json::{json, Value};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// What the gateway was asked for on one turn
#[derive(Debug, Clone)]
pub(crate) struct RecordedRequest {
    pub messages: Vec<LlmMessage>,
    pub tools: Vec<String>,
    pub output: Option<OutputConstraint>,
}

/// Gateway that replays one scripted delta sequence per call
pub(crate) struct ScriptedGateway {
    scripts: Mutex<VecDeque<Vec<Result<StreamDelta>>>>,
    requests: Mutex<Vec<RecordedRequest>>,
}

impl ScriptedGateway {
    pub fn new(scripts: Vec<Vec<Result<StreamDelta>>>) -> Self {
        Self {
            scripts: Mutex::new(scripts.into()),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

impl LlmGateway for ScriptedGateway {
    fn complete_stream<'a>(
        &'a self,
        _model: &'a str,
        messages: &'a [LlmMessage],
        tools: &'a [ToolDescriptor],
        output: Option<&'a OutputConstraint>,
        _config: &'a CompletionConfig,
    ) -> DeltaStream<'a> {
        self.requests.lock().unwrap().push(RecordedRequest {
            messages: messages.to_vec(),
            tools: tools.iter().map(|t| t.name().to_string()).collect(),
            output: output.cloned(),
        });

        let script = self.scripts.lock().unwrap().pop_front().unwrap_or_else(|| {
            vec![Err(ToolflowError::GatewayError("script exhausted".to_string()))]
        });
        Box::pin(stream::iter(script))
    }
}

/// A turn that streams text and stops
pub(crate) fn text_turn(fragments: &[&str]) -> Vec<Result<StreamDelta>> {
    let mut script: Vec<Result<StreamDelta>> =
        fragments.iter().map(|f| Ok(StreamDelta::text(*f))).collect();
    script.push(Ok(StreamDelta::finished(FinishReason::Stop)));
    script
}

/// A turn that issues whole tool calls
pub(crate) fn call_turn(calls: Vec<ToolCallDelta>) -> Vec<Result<StreamDelta>> {
    let mut script: Vec<Result<StreamDelta>> =
        calls.into_iter().map(|c| Ok(StreamDelta::tool_call(c))).collect();
    script.push(Ok(StreamDelta::finished(FinishReason::ToolCalls)));
    script
}

/// Returns its arguments unchanged
pub(crate) struct EchoTool {
    name: String,
}

impl EchoTool {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

#[async_trait]
impl LlmTool for EchoTool {
    async fn run(&self, args: &HashMap<String, Value>) -> Result<Value> {
        Ok(Value::Object(args.clone().into_iter().collect()))
    }

    fn descriptor(&self) -> ToolDescriptor {
        ToolDescriptor::function(self.name.clone(), "Echo the arguments", json!({"type": "object"}))
    }
}

/// Always returns an error
pub(crate) struct FailingTool {
    name: String,
}

impl FailingTool {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

#[async_trait]
impl LlmTool for FailingTool {
    async fn run(&self, _args: &HashMap<String, Value>) -> Result<Value> {
        Err(ToolflowError::ToolError(format!("{} failed", self.name)))
    }

    fn descriptor(&self) -> ToolDescriptor {
        ToolDescriptor::function(self.name.clone(), "Always fails", json!({"type": "object"}))
    }
}

/// Panics when run
pub(crate) struct PanickingTool {
    name: String,
}

impl PanickingTool {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

#[async_trait]
impl LlmTool for PanickingTool {
    async fn run(&self, _args: &HashMap<String, Value>) -> Result<Value> {
        panic!("{} blew up", self.name)
    }

    fn descriptor(&self) -> ToolDescriptor {
        ToolDescriptor::function(self.name.clone(), "Panics", json!({"type": "object"}))
    }
}

/// Sleeps, logs its name on completion, and returns its name
pub(crate) struct SlowTool {
    name: String,
    delay: Duration,
    log: Arc<Mutex<Vec<String>>>,
}

impl SlowTool {
    pub fn new(name: impl Into<String>, delay_ms: u64, log: Arc<Mutex<Vec<String>>>) -> Self {
        Self {
            name: name.into(),
            delay: Duration::from_millis(delay_ms),
            log,
        }
    }
}

#[async_trait]
impl LlmTool for SlowTool {
    async fn run(&self, _args: &HashMap<String, Value>) -> Result<Value> {
        tokio::time::sleep(self.delay).await;
        self.log.lock().unwrap().push(self.name.clone());
        Ok(json!(self.name))
    }

    fn descriptor(&self) -> ToolDescriptor {
        ToolDescriptor::function(self.name.clone(), "Sleeps", json!({"type": "object"}))
    }
}

/// Multiplies `x` by ten.
///
/// Smaller `x` sleeps longer, but calls to one tool run in order, so completion order
/// only changes relative to calls to other tools.
pub(crate) struct ScaleTool;

#[async_trait]
impl LlmTool for ScaleTool {
    async fn run(&self, args: &HashMap<String, Value>) -> Result<Value> {
        let x = args
            .get("x")
            .and_then(Value::as_i64)
            .ok_or_else(|| ToolflowError::ToolError("missing x".to_string()))?;
        tokio::time::sleep(Duration::from_millis((10 - x.clamp(0, 10)) as u64 * 5)).await;
        Ok(json!({ "x": x, "scaled": x * 10 }))
    }

    fn descriptor(&self) -> ToolDescriptor {
        ToolDescriptor::function(
            "f",
            "Scale x by ten",
            json!({"type": "object", "properties": {"x": {"type": "integer"}}}),
        )
    }
}
