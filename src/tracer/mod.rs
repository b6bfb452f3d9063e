//! Tracer system for observability and debugging
//!
//! The tracer records what happened during orchestrated runs: every model turn, every
//! tool execution, and every correlation anomaly reported by an upstream service.
//! Events carry a timestamp and the run's correlation ID, so one run can be pulled out
//! of a shared store.
//!
//! # Architecture
//!
//! - **TracerEvent**: Base trait for all event types
//! - **EventStore**: Thread-safe storage for events with callbacks and filtering
//! - **TracerSystem**: Coordination layer with convenience methods for recording events
//!
//! # Usage Example
//!
//! ```rust,ignore
//! use toolflow::tracer::TracerSystem;
//! use std::sync::Arc;
//!
//! let tracer = Arc::new(TracerSystem::default());
//! let broker = LlmBroker::new("qwen3:32b", gateway).with_tracer(tracer.clone());
//!
//! let outcome = broker.generate(request).await?;
//! for summary in tracer.run_summaries(&outcome.correlation_id) {
//!     println!("{}", summary);
//! }
//! ```

pub mod event_store;
pub mod tracer_events;
pub mod tracer_system;

pub use event_store::{EventCallback, EventFilter, EventStore};
pub use tracer_events::{
    ModelTurnTracerEvent, ProtocolAnomalyTracerEvent, ToolCallTracerEvent, TracerEvent,
};
pub use tracer_system::{TracerSystem, TurnRecord};
