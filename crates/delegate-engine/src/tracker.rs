use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::connector::connector_type;

/// Lifecycle of a single tool call.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolCallStatus {
    Pending,
    Success,
    Error,
}

impl ToolCallStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Pending)
    }
}

/// One invocation of one tool during a run.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolCallRecord {
    pub call_id: String,
    pub tool_name: String,
    pub connector_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub status: ToolCallStatus,
}

/// Insertion-ordered registry of tool calls keyed by call id.
///
/// Records live in an arena; `index` maps a call id to its slot, so ordering
/// is by first-seen id and records are never reordered or removed.
#[derive(Debug, Default)]
pub struct ToolCallTracker {
    toolkits: Vec<String>,
    records: Vec<ToolCallRecord>,
    index: HashMap<String, usize>,
}

impl ToolCallTracker {
    /// `toolkits` are used to derive each record's connector type.
    pub fn new(toolkits: Vec<String>) -> Self {
        Self {
            toolkits,
            records: Vec::new(),
            index: HashMap::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn records(&self) -> &[ToolCallRecord] {
        &self.records
    }

    pub fn get(&self, call_id: &str) -> Option<&ToolCallRecord> {
        self.index.get(call_id).map(|&slot| &self.records[slot])
    }

    /// Point-in-time copy of all records.
    pub fn snapshot(&self) -> Vec<ToolCallRecord> {
        self.records.clone()
    }

    /// Registers a call, or merges into an existing one without touching its
    /// status.
    pub fn record_call(
        &mut self,
        call_id: &str,
        tool_name: &str,
        input: Option<serde_json::Value>,
    ) {
        if let Some(&slot) = self.index.get(call_id) {
            let record = &mut self.records[slot];
            if !tool_name.is_empty() {
                record.tool_name = tool_name.to_string();
            }
            if input.is_some() {
                record.input = input;
            }
            record.connector_type = connector_type(&record.tool_name, &self.toolkits);
            return;
        }

        self.index.insert(call_id.to_string(), self.records.len());
        self.records.push(ToolCallRecord {
            call_id: call_id.to_string(),
            tool_name: tool_name.to_string(),
            connector_type: connector_type(tool_name, &self.toolkits),
            input,
            output: None,
            error: None,
            status: ToolCallStatus::Pending,
        });
    }

    /// Applies a result. Returns `false` when the event was ignored: unknown
    /// call id, or a call that already reached a terminal status.
    pub fn record_result(
        &mut self,
        call_id: &str,
        output: Option<serde_json::Value>,
        preliminary: bool,
    ) -> bool {
        let Some(record) = self.pending_mut(call_id) else {
            return false;
        };
        record.output = output;
        record.error = None;
        record.status = if preliminary {
            ToolCallStatus::Pending
        } else {
            ToolCallStatus::Success
        };
        true
    }

    /// Marks a pending call as failed. Returns `false` when ignored.
    pub fn record_error(&mut self, call_id: &str, message: impl Into<String>) -> bool {
        let Some(record) = self.pending_mut(call_id) else {
            return false;
        };
        record.error = Some(message.into());
        record.status = ToolCallStatus::Error;
        true
    }

    fn pending_mut(&mut self, call_id: &str) -> Option<&mut ToolCallRecord> {
        let Some(&slot) = self.index.get(call_id) else {
            debug!(call_id, "ignoring event for unknown tool call");
            return None;
        };
        let record = &mut self.records[slot];
        if record.status.is_terminal() {
            debug!(call_id, status = ?record.status, "ignoring event for settled tool call");
            return None;
        }
        Some(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn tracker() -> ToolCallTracker {
        ToolCallTracker::new(vec!["GMAIL".into(), "NOTION".into()])
    }

    #[test]
    fn call_then_result_succeeds() {
        let mut t = tracker();
        t.record_call("c1", "GMAIL_SEND_EMAIL", Some(json!({"to": "a@b.c"})));
        assert_eq!(t.get("c1").expect("c1").status, ToolCallStatus::Pending);
        assert!(t.record_result("c1", Some(json!({"id": "m1"})), false));
        let record = t.get("c1").expect("c1");
        assert_eq!(record.status, ToolCallStatus::Success);
        assert_eq!(record.output, Some(json!({"id": "m1"})));
        assert_eq!(record.error, None);
        assert_eq!(record.connector_type, "Gmail");
    }

    #[test]
    fn preliminary_results_keep_call_pending() {
        let mut t = tracker();
        t.record_call("c1", "NOTION_SEARCH", None);
        assert!(t.record_result("c1", Some(json!({"progress": 1})), true));
        assert!(t.record_result("c1", Some(json!({"progress": 2})), true));
        let record = t.get("c1").expect("c1");
        assert_eq!(record.status, ToolCallStatus::Pending);
        assert_eq!(record.output, Some(json!({"progress": 2})));
        assert!(t.record_result("c1", Some(json!({"done": true})), false));
        assert_eq!(t.get("c1").expect("c1").status, ToolCallStatus::Success);
    }

    #[test]
    fn terminal_status_is_never_reverted() {
        let mut t = tracker();
        t.record_call("c1", "GMAIL_SEND_EMAIL", None);
        t.record_result("c1", Some(json!("done")), false);
        assert!(!t.record_result("c1", Some(json!("late")), true));
        assert!(!t.record_error("c1", "late failure"));
        let record = t.get("c1").expect("c1");
        assert_eq!(record.status, ToolCallStatus::Success);
        assert_eq!(record.output, Some(json!("done")));
    }

    #[test]
    fn result_for_unknown_call_is_ignored() {
        let mut t = tracker();
        assert!(!t.record_result("ghost", Some(json!(1)), false));
        assert!(t.is_empty());
    }

    #[test]
    fn repeated_call_merges_in_place() {
        let mut t = tracker();
        t.record_call("c1", "GMAIL_SEND_EMAIL", None);
        t.record_call("c2", "NOTION_SEARCH", None);
        t.record_call("c1", "GMAIL_SEND_EMAIL", Some(json!({"to": "x"})));
        assert_eq!(t.len(), 2);
        let ids: Vec<&str> = t.records().iter().map(|r| r.call_id.as_str()).collect();
        assert_eq!(ids, vec!["c1", "c2"]);
        assert_eq!(t.get("c1").expect("c1").input, Some(json!({"to": "x"})));
    }

    #[test]
    fn snapshot_is_detached_from_later_mutation() {
        let mut t = tracker();
        t.record_call("c1", "GMAIL_SEND_EMAIL", None);
        let before = t.snapshot();
        t.record_error("c1", "boom");
        assert_eq!(before[0].status, ToolCallStatus::Pending);
        assert_eq!(t.get("c1").expect("c1").status, ToolCallStatus::Error);
    }

    #[test]
    fn serializes_camel_case_and_omits_empty_fields() {
        let mut t = tracker();
        t.record_call("c1", "GMAIL_SEND_EMAIL", None);
        let value = serde_json::to_value(&t.records()[0]).expect("serialize");
        assert_eq!(
            value,
            json!({
                "callId": "c1",
                "toolName": "GMAIL_SEND_EMAIL",
                "connectorType": "Gmail",
                "status": "pending"
            })
        );
    }
}
