//! Common imports for typical engine usage.
pub use crate::{
    AbortHandle, CallerContext, CatalogEntry, DelegateEngine, DelegateError, DelegateInput,
    EngineConfig, EngineError, ExecutionSnapshot, ExecutionStatus, ExecutionStream, FinishReason,
    FixedResponse, ModelRuntime, StaticCatalog, StreamEvent, ToolCallStatus, ToolCatalog,
    classify_snapshot,
};
