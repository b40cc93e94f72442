//! Per-event transition table for a running delegation.

use crate::errors::DelegateError;
use crate::request::TaskRequest;
use crate::snapshot::{ExecutionSnapshot, final_text};
use crate::stream::{FinishReason, StreamEvent, tool_error_message};
use crate::tracker::ToolCallTracker;

/// What the event loop should do after applying one event.
#[derive(Debug)]
pub(crate) enum Transition {
    /// Nothing observable changed (or there is nothing to show yet).
    Quiet,
    /// Emit this in-progress snapshot.
    Progress(ExecutionSnapshot),
    /// The step bound was reached; stop consuming and aggregate.
    StepLimit,
    /// A tool failed; emit this failed snapshot and end the run.
    ToolFailed(ExecutionSnapshot),
}

pub(crate) struct ExecutionState {
    request: TaskRequest,
    tracker: ToolCallTracker,
    text: String,
    steps: u32,
    max_steps: u32,
    finish_reason: Option<FinishReason>,
}

impl ExecutionState {
    pub(crate) fn new(request: TaskRequest, max_steps: u32) -> Self {
        let tracker = ToolCallTracker::new(request.toolkits().to_vec());
        Self {
            request,
            tracker,
            text: String::new(),
            steps: 0,
            max_steps,
            finish_reason: None,
        }
    }

    pub(crate) fn request(&self) -> &TaskRequest {
        &self.request
    }

    pub(crate) fn tracker(&self) -> &ToolCallTracker {
        &self.tracker
    }

    pub(crate) fn text(&self) -> &str {
        &self.text
    }

    pub(crate) fn finish_reason(&self) -> Option<FinishReason> {
        self.finish_reason
    }

    pub(crate) fn apply(&mut self, event: StreamEvent) -> Transition {
        match event {
            StreamEvent::TextDelta { text } => {
                self.text.push_str(&text);
                if self.has_content() {
                    Transition::Progress(self.progress())
                } else {
                    Transition::Quiet
                }
            }
            StreamEvent::ToolCall {
                call_id,
                tool_name,
                input,
            } => {
                self.tracker.record_call(&call_id, &tool_name, input);
                Transition::Progress(self.progress())
            }
            StreamEvent::ToolResult {
                call_id,
                output,
                preliminary,
            } => {
                if self.tracker.record_result(&call_id, output, preliminary) {
                    Transition::Progress(self.progress())
                } else {
                    Transition::Quiet
                }
            }
            StreamEvent::ToolError { call_id, error } => {
                let message = tool_error_message(error.as_ref());
                self.tracker.record_error(&call_id, message.clone());
                Transition::ToolFailed(self.failed(&DelegateError::ToolExecution { call_id, message }))
            }
            StreamEvent::StepFinish { finish_reason } => {
                self.steps = self.steps.saturating_add(1);
                self.finish_reason = Some(finish_reason);
                if self.steps >= self.max_steps {
                    Transition::StepLimit
                } else {
                    Transition::Quiet
                }
            }
        }
    }

    /// Failed snapshot carrying the tracker's current state.
    pub(crate) fn failed(&self, error: &DelegateError) -> ExecutionSnapshot {
        ExecutionSnapshot::failed(
            self.request.task(),
            self.request.toolkits(),
            self.tracker.snapshot(),
            &self.text,
            error,
        )
    }

    fn has_content(&self) -> bool {
        !self.tracker.is_empty() || final_text(&self.text).is_some()
    }

    fn progress(&self) -> ExecutionSnapshot {
        ExecutionSnapshot::in_progress(
            self.request.task(),
            self.request.toolkits(),
            self.tracker.snapshot(),
            &self.text,
        )
    }
}
