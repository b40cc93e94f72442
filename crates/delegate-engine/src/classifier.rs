//! Post-hoc pass/fail scoring of a finished delegation, for monitoring.

use serde::{Deserialize, Serialize};

use crate::snapshot::ExecutionSnapshot;
use crate::stream::FinishReason;

/// Outputs shorter than this are considered insufficient.
pub const MIN_OUTPUT_CHARS: usize = 25;
/// Summary length cap, in characters.
pub const SUMMARY_MAX_CHARS: usize = 300;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassificationResult {
    pub success: bool,
    pub tool_call_count: usize,
    pub tool_names: Vec<String>,
    pub finish_reason: FinishReason,
    pub issues: Vec<String>,
    pub summary: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

/// Scores a run. Every applicable issue is collected, in a fixed order; the
/// run passes only when there are none.
pub fn classify<S: AsRef<str>>(
    tool_names: &[S],
    finish_reason: FinishReason,
    final_text: &str,
    error: Option<&str>,
) -> ClassificationResult {
    let mut issues = Vec::new();
    if let Some(message) = error {
        issues.push(format!("Error: {message}"));
    }
    if tool_names.is_empty() {
        issues.push("No tools were called".to_string());
    }
    if finish_reason.is_error() {
        issues.push("Sub-agent encountered an error".to_string());
    }
    if finish_reason.is_interrupted() {
        issues.push("Sub-agent stopped mid-execution".to_string());
    }
    if final_text.chars().count() < MIN_OUTPUT_CHARS {
        issues.push("Insufficient output produced".to_string());
    }

    ClassificationResult {
        success: issues.is_empty(),
        tool_call_count: tool_names.len(),
        tool_names: tool_names.iter().map(|name| name.as_ref().to_string()).collect(),
        finish_reason,
        issues,
        summary: final_text.chars().take(SUMMARY_MAX_CHARS).collect(),
        error_message: error.map(ToOwned::to_owned),
    }
}

/// Scores a terminal snapshot. A missing finish reason counts as
/// [`FinishReason::Error`] for failed runs and [`FinishReason::Unknown`]
/// otherwise.
pub fn classify_snapshot(snapshot: &ExecutionSnapshot) -> ClassificationResult {
    let tool_names: Vec<&str> = snapshot
        .tool_calls
        .iter()
        .map(|call| call.tool_name.as_str())
        .collect();
    let finish_reason = snapshot.finish_reason.unwrap_or(if snapshot.error.is_some() {
        FinishReason::Error
    } else {
        FinishReason::Unknown
    });
    classify(
        &tool_names,
        finish_reason,
        snapshot.final_text.as_deref().unwrap_or_default(),
        snapshot.error.as_deref(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    const NO_TOOLS: [&str; 0] = [];

    #[test]
    fn zero_tool_calls_is_the_only_issue_for_clean_stop() {
        let text = "x".repeat(40);
        let result = classify(&NO_TOOLS, FinishReason::Stop, &text, None);
        assert!(!result.success);
        assert_eq!(result.issues, vec!["No tools were called".to_string()]);
        assert_eq!(result.tool_call_count, 0);
    }

    #[test]
    fn summary_is_truncated_to_exactly_three_hundred_chars() {
        let text = "y".repeat(500);
        let result = classify(&["GMAIL_SEND_EMAIL"], FinishReason::Stop, &text, None);
        assert!(result.success);
        assert_eq!(result.summary.chars().count(), SUMMARY_MAX_CHARS);
        assert!(!result.summary.ends_with("..."));
    }

    #[test]
    fn all_applicable_issues_are_collected() {
        let result = classify(&NO_TOOLS, FinishReason::Error, "short", Some("rate limited"));
        assert_eq!(
            result.issues,
            vec![
                "Error: rate limited".to_string(),
                "No tools were called".to_string(),
                "Sub-agent encountered an error".to_string(),
                "Insufficient output produced".to_string(),
            ]
        );
        assert_eq!(result.error_message.as_deref(), Some("rate limited"));
    }

    #[test]
    fn tool_calls_finish_reason_means_interrupted() {
        let text = "z".repeat(30);
        let result = classify(&["NOTION_SEARCH"], FinishReason::ToolCalls, &text, None);
        assert_eq!(result.issues, vec!["Sub-agent stopped mid-execution".to_string()]);
        assert_eq!(result.tool_names, vec!["NOTION_SEARCH".to_string()]);
    }

    #[test]
    fn output_length_boundary_is_exclusive() {
        let at_limit = "a".repeat(MIN_OUTPUT_CHARS);
        assert!(classify(&["T"], FinishReason::Stop, &at_limit, None).success);
        let below = "a".repeat(MIN_OUTPUT_CHARS - 1);
        assert!(!classify(&["T"], FinishReason::Stop, &below, None).success);
    }
}
