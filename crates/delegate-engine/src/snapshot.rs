use serde::{Deserialize, Serialize};

use crate::errors::DelegateError;
use crate::runtime::Usage;
use crate::stream::FinishReason;
use crate::tracker::ToolCallRecord;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ExecutionStatus {
    InProgress,
    Succeeded,
    Failed,
}

/// Point-in-time view of a delegated run. Intermediate progress and the
/// terminal result share this shape.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionSnapshot {
    pub status: ExecutionStatus,
    pub success: bool,
    pub task: String,
    pub requested_toolkits: Vec<String>,
    pub tool_calls: Vec<ToolCallRecord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub final_text: Option<String>,
    /// Finish reason of the last model step, when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finish_reason: Option<FinishReason>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ExecutionSnapshot {
    pub(crate) fn in_progress(
        task: &str,
        requested_toolkits: &[String],
        tool_calls: Vec<ToolCallRecord>,
        text: &str,
    ) -> Self {
        Self {
            status: ExecutionStatus::InProgress,
            success: false,
            task: task.to_string(),
            requested_toolkits: requested_toolkits.to_vec(),
            tool_calls,
            final_text: final_text(text),
            finish_reason: None,
            usage: None,
            error: None,
        }
    }

    pub(crate) fn failed(
        task: &str,
        requested_toolkits: &[String],
        tool_calls: Vec<ToolCallRecord>,
        text: &str,
        error: &DelegateError,
    ) -> Self {
        Self {
            status: ExecutionStatus::Failed,
            error: Some(error.to_string()),
            ..Self::in_progress(task, requested_toolkits, tool_calls, text)
        }
    }

    pub(crate) fn succeeded(
        task: &str,
        requested_toolkits: &[String],
        tool_calls: Vec<ToolCallRecord>,
        text: &str,
        finish_reason: Option<FinishReason>,
        usage: Option<Usage>,
    ) -> Self {
        Self {
            status: ExecutionStatus::Succeeded,
            success: true,
            finish_reason,
            usage,
            ..Self::in_progress(task, requested_toolkits, tool_calls, text)
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self.status, ExecutionStatus::InProgress)
    }
}

/// Trimmed text, or `None` when nothing but whitespace was produced.
pub(crate) fn final_text(buffer: &str) -> Option<String> {
    let trimmed = buffer.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn failed_snapshot_serializes_outbound_shape() {
        let snapshot = ExecutionSnapshot::failed(
            "send it",
            &["GMAIL".to_string()],
            Vec::new(),
            "  ",
            &DelegateError::SessionRequired,
        );
        assert_eq!(
            serde_json::to_value(&snapshot).expect("serialize"),
            json!({
                "status": "failed",
                "success": false,
                "task": "send it",
                "requestedToolkits": ["GMAIL"],
                "toolCalls": [],
                "error": "User session required to use connectors."
            })
        );
        assert!(snapshot.is_terminal());
    }

    #[test]
    fn succeeded_snapshot_trims_text_and_carries_usage() {
        let snapshot = ExecutionSnapshot::succeeded(
            "t",
            &[],
            Vec::new(),
            "\n Done. \n",
            Some(FinishReason::Stop),
            Some(Usage::new(10, 5)),
        );
        assert!(snapshot.success);
        assert_eq!(snapshot.final_text.as_deref(), Some("Done."));
        assert_eq!(snapshot.usage.as_ref().map(|u| u.total_tokens), Some(15));
    }
}
