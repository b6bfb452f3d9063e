pub mod current_datetime_tool;
pub mod registry;
pub mod result_capture;
mod tool;

pub use current_datetime_tool::CurrentDatetimeTool;
pub use registry::{ToolBinding, ToolRegistry};
pub use result_capture::{ResultCaptureTool, RESULT_CAPTURE_TOOL_NAME};
pub use tool::{FunctionDescriptor, LlmTool, ToolDescriptor};
