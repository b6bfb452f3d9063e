use crate::error::Result;
use crate::llm::tools::{LlmTool, ToolDescriptor};
use async_trait::async_trait;
use chrono::Local;
use serde_json::{json, Value};
use std::collections::HashMap;

/// Tool for getting the current date and time
///
/// Models have no clock of their own; this tool returns the local time with an
/// optional strftime-style format.
///
/// # Examples
///
/// ```ignore
/// use toolflow::llm::tools::CurrentDatetimeTool;
///
/// let registry = ToolRegistry::new().with_tool(Arc::new(CurrentDatetimeTool::new()))?;
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct CurrentDatetimeTool;

impl CurrentDatetimeTool {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl LlmTool for CurrentDatetimeTool {
    async fn run(&self, args: &HashMap<String, Value>) -> Result<Value> {
        let format_string = args
            .get("format_string")
            .and_then(|v| v.as_str())
            .unwrap_or("%Y-%m-%d %H:%M:%S");

        let now = Local::now();

        Ok(json!({
            "current_datetime": now.format(format_string).to_string(),
            "timestamp": now.timestamp(),
            "timezone": now.offset().to_string()
        }))
    }

    fn descriptor(&self) -> ToolDescriptor {
        ToolDescriptor::function(
            "get_current_datetime",
            "Get the current date and time. Useful when you need to know the current time or date.",
            json!({
                "type": "object",
                "properties": {
                    "format_string": {
                        "type": "string",
                        "description": "Format string for the datetime (e.g., '%Y-%m-%d %H:%M:%S', '%A, %B %d, %Y'). Default is ISO format."
                    }
                },
                "required": []
            }),
        )
    }
}
