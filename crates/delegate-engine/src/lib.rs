//! Delegated task execution for tool-restricted sub-agents.
//!
//! A caller hands over a natural-language task plus the connector toolkits
//! the sub-agent may use. The engine validates the request, checks the
//! toolkits against what the caller has enabled, provisions only those
//! tools, drives the model runtime, streams progress snapshots and finally
//! reconciles the run into one authoritative result.
//!
//! # Usage
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use delegate_engine::prelude::*;
//! use delegate_engine::replay::{RuntimeScript, ScriptedRuntime};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), EngineError> {
//! let catalog = StaticCatalog::new().with_tool(
//!     "gmail",
//!     CatalogEntry::new("GMAIL_SEND_EMAIL", Arc::new(FixedResponse(serde_json::json!({"id": "m1"})))),
//! );
//! let runtime = ScriptedRuntime::new(RuntimeScript::new(vec![
//!     StreamEvent::tool_call("c1", "GMAIL_SEND_EMAIL", serde_json::json!({"to": "team"})),
//!     StreamEvent::tool_result("c1", serde_json::json!({"id": "m1"})),
//!     StreamEvent::text("Sent the update."),
//! ]));
//!
//! let engine = DelegateEngine::builder()
//!     .catalog(Arc::new(catalog))
//!     .runtime(Arc::new(runtime))
//!     .build()?;
//!
//! let mut stream = engine.delegate(
//!     CallerContext::new("user-1").permit(["gmail"]),
//!     DelegateInput::new("gmail", "Email the weekly update to the team"),
//! );
//! while let Some(snapshot) = stream.next_snapshot().await {
//!     println!("{} tool calls so far", snapshot.tool_calls.len());
//! }
//! let result = stream.finish().await;
//! println!("{:?}", classify_snapshot(&result));
//! # Ok(())
//! # }
//! ```

/// Post-run aggregation and step-history reconciliation.
pub mod aggregate;
/// Caller identity and toolkit availability checks.
pub mod availability;
/// Tool catalog contracts and tool provisioning.
pub mod catalog;
/// Pass/fail classification of finished runs.
pub mod classifier;
/// Engine configuration.
pub mod config;
/// Tool name to connector category mapping.
pub mod connector;
/// Engine entry point and builder.
pub mod engine;
/// Public error types.
pub mod errors;
/// Logging setup.
pub mod observability;
/// Common imports for typical usage.
pub mod prelude;
/// Sub-agent instructions.
pub mod prompt;
/// Scripted runtime for replays and tests.
pub mod replay;
/// Raw input and input validation.
pub mod request;
/// Progress stream, cancellation handle and the run task.
pub mod run;
/// Model runtime contracts.
pub mod runtime;
/// Execution snapshots.
pub mod snapshot;
mod state;
/// Runtime stream events.
pub mod stream;
/// Live tool-call tracking.
pub mod tracker;

pub use availability::{CallerContext, ConnectorStatus, ConnectorStatusProvider};
pub use catalog::{CatalogEntry, FixedResponse, StaticCatalog, ToolCatalog, ToolHandler, ToolSet};
pub use classifier::{ClassificationResult, classify, classify_snapshot};
pub use config::{EngineConfig, ModelRef};
pub use engine::{DelegateEngine, EngineBuilder};
pub use errors::{CatalogError, DelegateError, EngineError, RuntimeError, ToolError};
pub use observability::init_observability;
pub use request::{DelegateInput, ToolkitSelection};
pub use run::{AbortHandle, ExecutionStream};
pub use runtime::{ModelRuntime, RuntimeHandle, RuntimeRequest, StepRecord, Usage};
pub use snapshot::{ExecutionSnapshot, ExecutionStatus};
pub use stream::{FinishReason, StreamEvent};
pub use tracker::{ToolCallRecord, ToolCallStatus};
