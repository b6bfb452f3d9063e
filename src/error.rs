//! Error types and result aliases for the toolflow library.
//!
//! This module defines the core error type [`ToolflowError`] and the [`Result`] type alias
//! used throughout the library. Gateway failures abort a run and surface to the caller;
//! tool failures are never raised past the executor, which turns them into structured
//! data for the model to read.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ToolflowError {
    #[error("LLM gateway error: {0}")]
    GatewayError(String),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Tool error: {0}")]
    ToolError(String),

    #[error("Tool {0} not found")]
    ToolNotFound(String),

    #[error("Invalid configuration: {0}")]
    ConfigError(String),

    #[error("Turn limit exceeded: run stopped after {0} turns")]
    TurnLimitExceeded(usize),

    #[error("Model finished without delivering a structured result")]
    MissingStructuredOutput,

    #[error("Run ended without a final outcome")]
    IncompleteRun,
}

pub type Result<T> = std::result::Result<T, ToolflowError>;
