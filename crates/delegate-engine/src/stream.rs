use std::fmt;

use serde::{Deserialize, Serialize};

const TOOL_FAILED: &str = "Tool execution failed.";

/// One unit of model runtime output, consumed strictly in arrival order.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum StreamEvent {
    /// Incremental assistant text.
    TextDelta { text: String },
    /// The model invoked a tool.
    #[serde(rename_all = "camelCase")]
    ToolCall {
        call_id: String,
        tool_name: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        input: Option<serde_json::Value>,
    },
    /// A tool produced output. Preliminary results keep the call pending.
    #[serde(rename_all = "camelCase")]
    ToolResult {
        call_id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        output: Option<serde_json::Value>,
        #[serde(default)]
        preliminary: bool,
    },
    /// A tool failed. `error` is whatever the runtime reported, not
    /// necessarily a string.
    #[serde(rename_all = "camelCase")]
    ToolError {
        call_id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<serde_json::Value>,
    },
    /// A model step ended.
    #[serde(rename_all = "camelCase")]
    StepFinish {
        #[serde(default)]
        finish_reason: FinishReason,
    },
}

impl StreamEvent {
    /// A `text-delta` carrying the next chunk of assistant text.
    pub fn text(text: impl Into<String>) -> Self {
        Self::TextDelta { text: text.into() }
    }

    /// A `tool-call` announcing an invocation with the given input.
    pub fn tool_call(
        call_id: impl Into<String>,
        tool_name: impl Into<String>,
        input: serde_json::Value,
    ) -> Self {
        Self::ToolCall {
            call_id: call_id.into(),
            tool_name: tool_name.into(),
            input: Some(input),
        }
    }

    /// A final `tool-result` for a call.
    pub fn tool_result(call_id: impl Into<String>, output: serde_json::Value) -> Self {
        Self::ToolResult {
            call_id: call_id.into(),
            output: Some(output),
            preliminary: false,
        }
    }

    /// A preliminary `tool-result`; the call stays pending.
    pub fn preliminary_result(call_id: impl Into<String>, output: serde_json::Value) -> Self {
        Self::ToolResult {
            call_id: call_id.into(),
            output: Some(output),
            preliminary: true,
        }
    }

    /// A `tool-error` whose payload is the given message.
    pub fn tool_error(call_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ToolError {
            call_id: call_id.into(),
            error: Some(serde_json::Value::String(message.into())),
        }
    }

    /// Closes the current step with `finish_reason`.
    pub fn step_finish(finish_reason: FinishReason) -> Self {
        Self::StepFinish { finish_reason }
    }

    /// Wire name of the event type.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::TextDelta { .. } => "text-delta",
            Self::ToolCall { .. } => "tool-call",
            Self::ToolResult { .. } => "tool-result",
            Self::ToolError { .. } => "tool-error",
            Self::StepFinish { .. } => "step-finish",
        }
    }
}

/// Message for a `tool-error` payload; non-string or blank payloads get a
/// generic message.
pub(crate) fn tool_error_message(error: Option<&serde_json::Value>) -> String {
    error
        .and_then(serde_json::Value::as_str)
        .map(str::trim)
        .filter(|message| !message.is_empty())
        .unwrap_or(TOOL_FAILED)
        .to_string()
}

/// Why a model step sequence ended.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum FinishReason {
    /// Natural end of generation.
    Stop,
    /// Output token limit reached.
    Length,
    ContentFilter,
    /// Stopped while the model still expected tool results.
    ToolCalls,
    Error,
    Other,
    #[default]
    Unknown,
}

impl FinishReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Stop => "stop",
            Self::Length => "length",
            Self::ContentFilter => "content-filter",
            Self::ToolCalls => "tool-calls",
            Self::Error => "error",
            Self::Other => "other",
            Self::Unknown => "unknown",
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Self::Error)
    }

    /// True when the run stopped in the middle of a tool-call sequence.
    pub fn is_interrupted(&self) -> bool {
        matches!(self, Self::ToolCalls)
    }
}

impl fmt::Display for FinishReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<&str> for FinishReason {
    fn from(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().replace('_', "-").as_str() {
            "stop" | "end-turn" => Self::Stop,
            "length" | "max-tokens" => Self::Length,
            "content-filter" => Self::ContentFilter,
            "tool-calls" | "tool-use" => Self::ToolCalls,
            "error" => Self::Error,
            "other" => Self::Other,
            _ => Self::Unknown,
        }
    }
}

impl From<String> for FinishReason {
    fn from(value: String) -> Self {
        Self::from(value.as_str())
    }
}

impl From<FinishReason> for String {
    fn from(value: FinishReason) -> Self {
        value.as_str().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn deserializes_wire_events() {
        let event: StreamEvent = serde_json::from_value(json!({
            "type": "tool-result",
            "callId": "c1",
            "output": {"sent": true},
            "preliminary": true
        }))
        .expect("tool-result");
        assert_eq!(event, StreamEvent::preliminary_result("c1", json!({"sent": true})));

        let event: StreamEvent = serde_json::from_value(json!({
            "type": "tool-call",
            "callId": "c2",
            "toolName": "GMAIL_SEND_EMAIL"
        }))
        .expect("tool-call without input");
        assert!(matches!(event, StreamEvent::ToolCall { input: None, .. }));
    }

    #[test]
    fn tool_error_message_defaults_for_unusable_payloads() {
        assert_eq!(tool_error_message(Some(&json!("boom"))), "boom");
        assert_eq!(tool_error_message(Some(&json!("   "))), TOOL_FAILED);
        assert_eq!(tool_error_message(Some(&json!({"code": 500}))), TOOL_FAILED);
        assert_eq!(tool_error_message(None), TOOL_FAILED);
    }

    #[test]
    fn finish_reason_parses_common_spellings() {
        assert_eq!(FinishReason::from("stop"), FinishReason::Stop);
        assert_eq!(FinishReason::from("tool_calls"), FinishReason::ToolCalls);
        assert_eq!(FinishReason::from("TOOL-CALLS"), FinishReason::ToolCalls);
        assert_eq!(FinishReason::from("whatever"), FinishReason::Unknown);
        let parsed: FinishReason = serde_json::from_value(json!("error")).expect("parse");
        assert!(parsed.is_error());
        assert_eq!(
            serde_json::to_value(FinishReason::ContentFilter).expect("ser"),
            json!("content-filter")
        );
    }
}
