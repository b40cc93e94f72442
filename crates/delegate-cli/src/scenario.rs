//! Recorded delegation scenarios: caller, input, tool catalog and the
//! runtime script to replay.

use std::path::Path;
use std::sync::Arc;

use anyhow::Context as _;
use delegate_engine::errors::ToolError;
use delegate_engine::replay::{RuntimeScript, ScriptedRuntime};
use delegate_engine::{
    CallerContext, CatalogEntry, ConnectorStatus, ConnectorStatusProvider, DelegateEngine,
    DelegateInput, EngineConfig, StaticCatalog, ToolHandler,
};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Scenario {
    #[serde(default)]
    pub caller: CallerContext,
    pub input: DelegateInput,
    #[serde(default)]
    pub tools: Vec<ToolSpec>,
    /// Advisory connector status reported for the caller.
    #[serde(default)]
    pub connectors: Option<ConnectorStatus>,
    #[serde(default)]
    pub script: RuntimeScript,
}

/// A catalog tool with a canned outcome.
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolSpec {
    pub toolkit: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub input_schema: Option<serde_json::Value>,
    #[serde(default)]
    pub response: serde_json::Value,
    /// When set, every invocation fails with this message.
    #[serde(default)]
    pub error: Option<String>,
}

impl Scenario {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read scenario {}", path.display()))?;
        serde_json::from_str(&raw)
            .with_context(|| format!("failed to parse scenario {}", path.display()))
    }

    pub fn catalog(&self) -> StaticCatalog {
        self.tools.iter().fold(StaticCatalog::new(), |catalog, tool| {
            let mut entry = CatalogEntry::new(
                tool.name.clone(),
                Arc::new(CannedTool {
                    response: tool.response.clone(),
                    error: tool.error.clone(),
                }),
            );
            if let Some(description) = &tool.description {
                entry = entry.description(description.clone());
            }
            if let Some(schema) = &tool.input_schema {
                entry = entry.input_schema(schema.clone());
            }
            catalog.with_tool(&tool.toolkit, entry)
        })
    }

    /// Engine wired to this scenario's catalog, script and connector status.
    pub fn engine(&self, config: EngineConfig) -> anyhow::Result<DelegateEngine> {
        let mut builder = DelegateEngine::builder()
            .catalog(Arc::new(self.catalog()))
            .runtime(Arc::new(ScriptedRuntime::new(self.script.clone())))
            .config(config);
        if let Some(status) = &self.connectors {
            builder = builder.connector_status(Arc::new(FixedStatus(status.clone())));
        }
        builder.build().context("failed to build delegate engine")
    }
}

struct CannedTool {
    response: serde_json::Value,
    error: Option<String>,
}

#[async_trait::async_trait]
impl ToolHandler for CannedTool {
    async fn invoke(&self, _input: serde_json::Value) -> Result<serde_json::Value, ToolError> {
        match &self.error {
            Some(message) => Err(ToolError::new(message.clone())),
            None => Ok(self.response.clone()),
        }
    }
}

struct FixedStatus(ConnectorStatus);

#[async_trait::async_trait]
impl ConnectorStatusProvider for FixedStatus {
    async fn status(&self, _caller_id: &str) -> Result<ConnectorStatus, String> {
        Ok(self.0.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use delegate_engine::{ExecutionStatus, ToolCallStatus};
    use std::io::Write as _;

    const SCENARIO: &str = r#"{
        "caller": {"callerId": "user-1", "permittedToolkits": ["gmail", "slack"]},
        "input": {"toolkits": ["gmail", "slack"], "task": "Share the release notes"},
        "tools": [
            {"toolkit": "gmail", "name": "GMAIL_SEND_EMAIL", "response": {"id": "m1"}},
            {"toolkit": "slack", "name": "SLACK_POST_MESSAGE", "error": "channel_not_found"}
        ],
        "connectors": {"enabled": ["GMAIL", "SLACK"]},
        "script": {
            "invokeTools": true,
            "events": [
                {"type": "tool-call", "callId": "c1", "toolName": "GMAIL_SEND_EMAIL", "input": {"to": "team"}},
                {"type": "step-finish", "finishReason": "tool-calls"},
                {"type": "tool-call", "callId": "c2", "toolName": "SLACK_POST_MESSAGE", "input": {}}
            ]
        }
    }"#;

    fn write_scenario(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        file.write_all(contents.as_bytes()).expect("write scenario");
        file
    }

    #[test]
    fn loads_scenario_file() {
        let file = write_scenario(SCENARIO);
        let scenario = Scenario::load(file.path()).expect("load");
        assert_eq!(scenario.tools.len(), 2);
        assert_eq!(scenario.caller.session(), Some("user-1"));
        assert!(scenario.script.invoke_tools);
    }

    #[test]
    fn malformed_scenario_reports_the_path() {
        let file = write_scenario("{not json");
        let err = Scenario::load(file.path()).expect_err("parse fails");
        assert!(err.to_string().contains("failed to parse scenario"));
    }

    #[tokio::test]
    async fn failing_tool_fails_the_replayed_run() {
        let file = write_scenario(SCENARIO);
        let scenario = Scenario::load(file.path()).expect("load");
        let engine = scenario.engine(EngineConfig::default()).expect("engine");

        let result = engine.run(scenario.caller.clone(), scenario.input.clone()).await;

        assert_eq!(result.status, ExecutionStatus::Failed);
        assert_eq!(result.error.as_deref(), Some("channel_not_found"));
        assert_eq!(result.tool_calls.len(), 2);
        assert_eq!(result.tool_calls[0].status, ToolCallStatus::Success);
        assert_eq!(result.tool_calls[0].connector_type, "Gmail");
        assert_eq!(result.tool_calls[1].status, ToolCallStatus::Error);
    }
}
