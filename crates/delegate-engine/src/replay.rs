//! Deterministic [`ModelRuntime`] that replays a scripted event sequence.
//!
//! Backs the `delegate run` command and the engine tests. With
//! `invoke_tools` set, each replayed `tool-call` runs the matching
//! provisioned handler and the outcome is injected as the next event.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, PoisonError};

use futures::{FutureExt as _, StreamExt as _, stream};
use serde::{Deserialize, Serialize};

use crate::catalog::ToolSet;
use crate::errors::RuntimeError;
use crate::runtime::{ModelRuntime, RuntimeHandle, RuntimeRequest, StepRecord, Usage};
use crate::stream::StreamEvent;

const RUNTIME_ID: &str = "replay";

/// Recorded behaviour for one run.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RuntimeScript {
    pub events: Vec<StreamEvent>,
    /// Stream failure raised after all events were delivered.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stream_error: Option<String>,
    /// Step history to report. Derived from the replayed events when absent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub steps: Option<Vec<StepRecord>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub steps_error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_error: Option<String>,
    /// Keep the stream pending once the script is exhausted.
    pub hold_open: bool,
    /// Execute provisioned handlers for replayed tool calls.
    pub invoke_tools: bool,
}

impl RuntimeScript {
    /// Replays `events` in order, then ends the stream.
    pub fn new(events: Vec<StreamEvent>) -> Self {
        Self {
            events,
            ..Self::default()
        }
    }

    /// Reports these step records instead of deriving them.
    pub fn steps(mut self, steps: Vec<StepRecord>) -> Self {
        self.steps = Some(steps);
        self
    }

    /// Reports this token usage once the stream ends.
    pub fn usage(mut self, usage: Usage) -> Self {
        self.usage = Some(usage);
        self
    }

    /// Fails the stream with `message` after the last event.
    pub fn stream_error(mut self, message: impl Into<String>) -> Self {
        self.stream_error = Some(message.into());
        self
    }

    /// Never ends the stream once the events are exhausted.
    pub fn hold_open(mut self) -> Self {
        self.hold_open = true;
        self
    }

    /// Runs provisioned handlers for replayed tool calls.
    pub fn invoke_tools(mut self) -> Self {
        self.invoke_tools = true;
        self
    }
}

/// [`ModelRuntime`] replaying one [`RuntimeScript`] per run.
#[derive(Debug, Default)]
pub struct ScriptedRuntime {
    script: RuntimeScript,
    requests: Mutex<Vec<RuntimeRequest>>,
}

impl ScriptedRuntime {
    pub fn new(script: RuntimeScript) -> Self {
        Self {
            script,
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Requests received so far, oldest first.
    pub fn requests(&self) -> Vec<RuntimeRequest> {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait::async_trait]
impl ModelRuntime for ScriptedRuntime {
    fn id(&self) -> &str {
        RUNTIME_ID
    }

    async fn start(&self, request: RuntimeRequest) -> Result<RuntimeHandle, RuntimeError> {
        let tools = request.tools.clone();
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(request);

        if let Some(message) = &self.script.start_error {
            return Err(RuntimeError::provider(RUNTIME_ID, message.clone()));
        }

        let history = Arc::new(Mutex::new(StepHistory::default()));
        let events = replay_stream(ReplayState {
            pending: self.script.events.iter().cloned().collect(),
            tools,
            invoke_tools: self.script.invoke_tools,
            stream_error: self.script.stream_error.clone(),
            hold_open: self.script.hold_open,
            history: history.clone(),
        });

        let scripted_steps = self.script.steps.clone();
        let steps_error = self.script.steps_error.clone();
        let steps = async move {
            if let Some(message) = steps_error {
                return Err(RuntimeError::protocol(RUNTIME_ID, message));
            }
            Ok(match scripted_steps {
                Some(steps) => steps,
                None => history
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .finish(),
            })
        }
        .boxed();

        let scripted_usage = self.script.usage.clone();
        let usage = async move {
            scripted_usage
                .ok_or_else(|| RuntimeError::protocol(RUNTIME_ID, "no usage recorded"))
        }
        .boxed();

        Ok(RuntimeHandle {
            events: events.boxed(),
            steps,
            usage,
        })
    }
}

struct ReplayState {
    pending: VecDeque<StreamEvent>,
    tools: ToolSet,
    invoke_tools: bool,
    stream_error: Option<String>,
    hold_open: bool,
    history: Arc<Mutex<StepHistory>>,
}

fn replay_stream(
    state: ReplayState,
) -> impl futures::Stream<Item = Result<StreamEvent, RuntimeError>> + Send + 'static {
    stream::unfold(state, |mut state| async move {
        let Some(event) = state.pending.pop_front() else {
            if let Some(message) = state.stream_error.take() {
                return Some((Err(RuntimeError::transport(RUNTIME_ID, message)), state));
            }
            if state.hold_open {
                futures::future::pending::<()>().await;
            }
            return None;
        };

        if state.invoke_tools
            && let StreamEvent::ToolCall {
                call_id,
                tool_name,
                input,
            } = &event
        {
            let outcome = invoke(&state.tools, call_id, tool_name, input.clone()).await;
            state.pending.push_front(outcome);
        }

        state
            .history
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .record(&event);
        Some((Ok(event), state))
    })
}

async fn invoke(
    tools: &ToolSet,
    call_id: &str,
    tool_name: &str,
    input: Option<serde_json::Value>,
) -> StreamEvent {
    let Some(tool) = tools.get(tool_name) else {
        return StreamEvent::tool_error(
            call_id,
            format!("Tool {tool_name} is not available to this agent."),
        );
    };
    match tool
        .handler
        .invoke(input.unwrap_or(serde_json::Value::Null))
        .await
    {
        Ok(output) => StreamEvent::tool_result(call_id, output),
        Err(err) => StreamEvent::tool_error(call_id, err.message),
    }
}

/// Builds step records from the events as they are replayed. A step closes
/// at each `step-finish`; trailing events form a final open step.
#[derive(Default)]
struct StepHistory {
    steps: Vec<StepRecord>,
    current: StepRecord,
}

impl StepHistory {
    fn record(&mut self, event: &StreamEvent) {
        match event {
            StreamEvent::TextDelta { text } => self.current.text.push_str(text),
            StreamEvent::ToolCall {
                call_id,
                tool_name,
                input,
            } => self.current.tool_calls.push(crate::runtime::StepToolCall {
                call_id: call_id.clone(),
                tool_name: tool_name.clone(),
                input: input.clone(),
            }),
            StreamEvent::ToolResult {
                call_id,
                output,
                preliminary: false,
            } => self.current.tool_results.push(crate::runtime::StepToolResult {
                call_id: call_id.clone(),
                output: output.clone(),
            }),
            StreamEvent::ToolResult { .. } | StreamEvent::ToolError { .. } => {}
            StreamEvent::StepFinish { finish_reason } => {
                self.current.finish_reason = *finish_reason;
                self.steps.push(std::mem::take(&mut self.current));
            }
        }
    }

    fn finish(&mut self) -> Vec<StepRecord> {
        let current = std::mem::take(&mut self.current);
        if current != StepRecord::default() {
            self.steps.push(current);
        }
        std::mem::take(&mut self.steps)
    }
}
