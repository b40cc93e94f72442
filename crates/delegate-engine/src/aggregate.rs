use std::collections::HashMap;

use futures::future::BoxFuture;
use tracing::{debug, warn};

use crate::errors::{DelegateError, RuntimeError};
use crate::runtime::{StepRecord, Usage};
use crate::snapshot::ExecutionSnapshot;
use crate::state::ExecutionState;
use crate::tracker::{ToolCallRecord, ToolCallTracker};

pub(crate) const NO_RESULT: &str = "Tool did not return a result.";

/// Rebuilds the tool-call list from the runtime's step history.
///
/// Every call in every step is matched by id against the results of the
/// whole history: a match is a success, anything else failed with
/// "Tool did not return a result.". Inputs missing from the history are
/// filled from the live tracker.
pub fn reconcile(
    steps: &[StepRecord],
    live: &ToolCallTracker,
    toolkits: &[String],
) -> Vec<ToolCallRecord> {
    let results: HashMap<&str, Option<&serde_json::Value>> = steps
        .iter()
        .flat_map(|step| step.tool_results.iter())
        .map(|result| (result.call_id.as_str(), result.output.as_ref()))
        .collect();

    let mut reconciled = ToolCallTracker::new(toolkits.to_vec());
    for call in steps.iter().flat_map(|step| step.tool_calls.iter()) {
        let input = call
            .input
            .clone()
            .or_else(|| live.get(&call.call_id).and_then(|record| record.input.clone()));
        reconciled.record_call(&call.call_id, &call.tool_name, input);
        match results.get(call.call_id.as_str()) {
            Some(output) => {
                reconciled.record_result(&call.call_id, output.cloned(), false);
            }
            None => {
                reconciled.record_error(&call.call_id, NO_RESULT);
            }
        }
    }
    reconciled.snapshot()
}

/// Produces the terminal result once the event stream has ended naturally.
pub(crate) async fn aggregate(
    state: &ExecutionState,
    steps: BoxFuture<'static, Result<Vec<StepRecord>, RuntimeError>>,
    usage: BoxFuture<'static, Result<Usage, RuntimeError>>,
) -> Result<ExecutionSnapshot, DelegateError> {
    let steps = steps
        .await
        .map_err(|err| DelegateError::stream(err.message()))?;
    let usage = match usage.await {
        Ok(usage) => Some(usage),
        Err(err) => {
            warn!(error = %err, "usage unavailable; finishing without it");
            None
        }
    };

    let request = state.request();
    let tool_calls = reconcile(&steps, state.tracker(), request.toolkits());
    let finish_reason = steps
        .last()
        .map(|step| step.finish_reason)
        .or(state.finish_reason());
    debug!(
        steps = steps.len(),
        tool_calls = tool_calls.len(),
        live_tool_calls = state.tracker().len(),
        "reconciled step history"
    );

    Ok(ExecutionSnapshot::succeeded(
        request.task(),
        request.toolkits(),
        tool_calls,
        state.text(),
        finish_reason,
        usage,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::{DelegateInput, validate};
    use crate::runtime::{StepToolCall, StepToolResult};
    use crate::snapshot::ExecutionStatus;
    use crate::stream::{FinishReason, StreamEvent};
    use crate::tracker::ToolCallStatus;
    use futures::FutureExt as _;
    use serde_json::json;

    fn call(id: &str, name: &str) -> StepToolCall {
        StepToolCall {
            call_id: id.into(),
            tool_name: name.into(),
            input: None,
        }
    }

    fn result(id: &str, output: serde_json::Value) -> StepToolResult {
        StepToolResult {
            call_id: id.into(),
            output: Some(output),
        }
    }

    fn kits() -> Vec<String> {
        vec!["GMAIL".into()]
    }

    #[test]
    fn matched_call_is_success_with_output() {
        let steps = vec![StepRecord {
            tool_calls: vec![call("c1", "GMAIL_SEND_EMAIL")],
            tool_results: vec![result("c1", json!({"id": "m1"}))],
            ..StepRecord::default()
        }];
        let records = reconcile(&steps, &ToolCallTracker::default(), &kits());
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].status, ToolCallStatus::Success);
        assert_eq!(records[0].output, Some(json!({"id": "m1"})));
        assert_eq!(records[0].error, None);
    }

    #[test]
    fn unmatched_call_is_error() {
        let steps = vec![StepRecord {
            tool_calls: vec![call("c1", "GMAIL_SEND_EMAIL")],
            ..StepRecord::default()
        }];
        let records = reconcile(&steps, &ToolCallTracker::default(), &kits());
        assert_eq!(records[0].status, ToolCallStatus::Error);
        assert_eq!(records[0].error.as_deref(), Some(NO_RESULT));
    }

    #[test]
    fn results_are_matched_across_steps_and_order_is_preserved() {
        let steps = vec![
            StepRecord {
                tool_calls: vec![call("c1", "GMAIL_SEARCH"), call("c2", "GMAIL_SEND_EMAIL")],
                tool_results: vec![result("c1", json!([]))],
                ..StepRecord::default()
            },
            StepRecord {
                tool_results: vec![result("c2", json!({"ok": true}))],
                ..StepRecord::default()
            },
        ];
        let records = reconcile(&steps, &ToolCallTracker::default(), &kits());
        let ids: Vec<&str> = records.iter().map(|r| r.call_id.as_str()).collect();
        assert_eq!(ids, vec!["c1", "c2"]);
        assert!(records.iter().all(|r| r.status == ToolCallStatus::Success));
    }

    #[test]
    fn history_is_authoritative_over_live_tracker() {
        let mut live = ToolCallTracker::new(kits());
        live.record_call("c1", "GMAIL_SEND_EMAIL", Some(json!({"to": "x"})));
        live.record_call("stray", "GMAIL_SEARCH", None);
        let steps = vec![StepRecord {
            tool_calls: vec![call("c1", "GMAIL_SEND_EMAIL")],
            tool_results: vec![result("c1", json!("sent"))],
            ..StepRecord::default()
        }];
        let records = reconcile(&steps, &live, &kits());
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].input, Some(json!({"to": "x"})));
    }

    #[tokio::test]
    async fn usage_failure_is_not_fatal() {
        let request = validate(&DelegateInput::new("gmail", "t")).expect("valid");
        let mut state = ExecutionState::new(request, 8);
        state.apply(StreamEvent::text(" all done "));
        let steps = async {
            Ok::<_, RuntimeError>(vec![StepRecord {
                finish_reason: FinishReason::Stop,
                ..StepRecord::default()
            }])
        }
        .boxed();
        let usage = async { Err::<Usage, _>(RuntimeError::protocol("test", "no usage")) }.boxed();
        let snapshot = aggregate(&state, steps, usage).await.expect("aggregate");
        assert_eq!(snapshot.status, ExecutionStatus::Succeeded);
        assert!(snapshot.success);
        assert_eq!(snapshot.final_text.as_deref(), Some("all done"));
        assert_eq!(snapshot.finish_reason, Some(FinishReason::Stop));
        assert_eq!(snapshot.usage, None);
    }

    #[tokio::test]
    async fn step_history_failure_is_a_stream_error() {
        let request = validate(&DelegateInput::new("gmail", "t")).expect("valid");
        let state = ExecutionState::new(request, 8);
        let steps =
            async { Err::<Vec<StepRecord>, _>(RuntimeError::transport("test", "history lost")) }
                .boxed();
        let usage = async { Ok::<_, RuntimeError>(Usage::default()) }.boxed();
        let err = aggregate(&state, steps, usage).await.expect_err("history fails");
        assert_eq!(err, DelegateError::Stream("history lost".into()));
    }
}
