//! Contract between the engine and the model runtime that actually drives the
//! sub-agent. The runtime is a black box: it streams [`StreamEvent`]s and,
//! once the stream ends, reports its authoritative step history and usage.

use std::pin::Pin;

use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};

use crate::catalog::ToolSet;
use crate::config::ModelRef;
use crate::errors::RuntimeError;
use crate::stream::{FinishReason, StreamEvent};

/// Boxed event stream returned by a runtime.
pub type EventStream =
    Pin<Box<dyn futures::Stream<Item = Result<StreamEvent, RuntimeError>> + Send + 'static>>;

/// Token accounting for a run.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Usage {
    #[serde(default)]
    pub input_tokens: u64,
    #[serde(default)]
    pub output_tokens: u64,
    #[serde(default)]
    pub total_tokens: u64,
}

impl Usage {
    pub fn new(input_tokens: u64, output_tokens: u64) -> Self {
        Self {
            input_tokens,
            output_tokens,
            total_tokens: input_tokens.saturating_add(output_tokens),
        }
    }
}

/// A tool call as recorded in the step history.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepToolCall {
    pub call_id: String,
    pub tool_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input: Option<serde_json::Value>,
}

/// A tool result as recorded in the step history.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepToolResult {
    pub call_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<serde_json::Value>,
}

/// One model step as the runtime executed it.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepRecord {
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub tool_calls: Vec<StepToolCall>,
    #[serde(default)]
    pub tool_results: Vec<StepToolResult>,
    #[serde(default)]
    pub finish_reason: FinishReason,
}

/// Everything a runtime needs to start a sub-agent run.
#[derive(Clone, Debug)]
pub struct RuntimeRequest {
    pub run_id: uuid::Uuid,
    pub model: ModelRef,
    pub system_prompt: String,
    pub prompt: String,
    /// The only tools the sub-agent may call.
    pub tools: ToolSet,
    pub max_steps: u32,
}

/// A started run: the live event stream plus the values that become
/// available once the stream has ended.
pub struct RuntimeHandle {
    pub events: EventStream,
    pub steps: BoxFuture<'static, Result<Vec<StepRecord>, RuntimeError>>,
    /// Best-effort; failures are tolerated by the engine.
    pub usage: BoxFuture<'static, Result<Usage, RuntimeError>>,
}

/// Model runtime driving a tool-restricted sub-agent.
#[async_trait::async_trait]
pub trait ModelRuntime: Send + Sync {
    /// Stable identifier used in logs and errors.
    fn id(&self) -> &str;

    async fn start(&self, request: RuntimeRequest) -> Result<RuntimeHandle, RuntimeError>;
}
