use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use tracing::debug;

use crate::errors::{CatalogError, DelegateError, ToolError};

const NO_TOOLS: &str = "No connector tools available for the requested selection.";

/// The invocable behind a connector tool.
#[async_trait::async_trait]
pub trait ToolHandler: Send + Sync {
    async fn invoke(&self, input: serde_json::Value) -> Result<serde_json::Value, ToolError>;
}

/// One entry as returned by a [`ToolCatalog`]. Entries without a handler or a
/// name are not executable and are dropped during provisioning.
#[derive(Clone, Default)]
pub struct CatalogEntry {
    pub name: String,
    pub description: Option<String>,
    pub input_schema: Option<serde_json::Value>,
    pub handler: Option<Arc<dyn ToolHandler>>,
}

impl CatalogEntry {
    /// An executable entry with no description or schema.
    pub fn new(name: impl Into<String>, handler: Arc<dyn ToolHandler>) -> Self {
        Self {
            name: name.into(),
            description: None,
            input_schema: None,
            handler: Some(handler),
        }
    }

    /// Sets the description shown to the sub-agent.
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Sets the JSON schema of the tool's input.
    pub fn input_schema(mut self, schema: serde_json::Value) -> Self {
        self.input_schema = Some(schema);
        self
    }
}

impl fmt::Debug for CatalogEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CatalogEntry")
            .field("name", &self.name)
            .field("description", &self.description)
            .field("executable", &self.handler.is_some())
            .finish()
    }
}

/// External source of connector tools for a caller.
#[async_trait::async_trait]
pub trait ToolCatalog: Send + Sync {
    async fn fetch(
        &self,
        caller_id: &str,
        toolkits: &[String],
    ) -> Result<Vec<CatalogEntry>, CatalogError>;
}

/// A tool that passed the executable-shape check.
#[derive(Clone)]
pub struct ProvisionedTool {
    pub name: String,
    pub description: Option<String>,
    pub input_schema: Option<serde_json::Value>,
    pub handler: Arc<dyn ToolHandler>,
}

impl fmt::Debug for ProvisionedTool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProvisionedTool")
            .field("name", &self.name)
            .field("description", &self.description)
            .finish_non_exhaustive()
    }
}

/// Tools a sub-agent is restricted to, in catalog order, unique by name.
#[derive(Clone, Debug, Default)]
pub struct ToolSet {
    tools: Vec<ProvisionedTool>,
}

impl ToolSet {
    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    pub fn names(&self) -> Vec<&str> {
        self.tools.iter().map(|tool| tool.name.as_str()).collect()
    }

    pub fn get(&self, name: &str) -> Option<&ProvisionedTool> {
        self.tools.iter().find(|tool| tool.name == name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ProvisionedTool> {
        self.tools.iter()
    }

    /// Keeps executable entries only; the first entry wins on duplicate names.
    pub fn from_entries(entries: Vec<CatalogEntry>) -> Self {
        let mut seen = HashSet::new();
        let mut tools = Vec::with_capacity(entries.len());
        for entry in entries {
            let name = entry.name.trim();
            let Some(handler) = entry.handler else {
                debug!(tool = name, "dropping catalog entry without handler");
                continue;
            };
            if name.is_empty() || !seen.insert(name.to_string()) {
                debug!(tool = name, "dropping unnamed or duplicate catalog entry");
                continue;
            }
            tools.push(ProvisionedTool {
                name: name.to_string(),
                description: entry.description,
                input_schema: entry.input_schema,
                handler,
            });
        }
        Self { tools }
    }
}

/// Fetches and filters the tools for `toolkits`.
pub async fn provision_tools(
    catalog: &dyn ToolCatalog,
    caller_id: &str,
    toolkits: &[String],
) -> Result<ToolSet, DelegateError> {
    let entries = catalog
        .fetch(caller_id, toolkits)
        .await
        .map_err(|err| DelegateError::Provisioning(err.message))?;
    let fetched = entries.len();
    let tools = ToolSet::from_entries(entries);
    debug!(fetched, usable = tools.len(), "provisioned connector tools");
    if tools.is_empty() {
        return Err(DelegateError::Provisioning(NO_TOOLS.into()));
    }
    Ok(tools)
}

/// In-memory catalog keyed by toolkit. Useful for replays and tests.
#[derive(Clone, Debug, Default)]
pub struct StaticCatalog {
    entries: Vec<(String, CatalogEntry)>,
}

impl StaticCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `entry` under `toolkit` (case-insensitive).
    pub fn with_tool(mut self, toolkit: impl AsRef<str>, entry: CatalogEntry) -> Self {
        self.entries
            .push((toolkit.as_ref().trim().to_uppercase(), entry));
        self
    }
}

#[async_trait::async_trait]
impl ToolCatalog for StaticCatalog {
    async fn fetch(
        &self,
        _caller_id: &str,
        toolkits: &[String],
    ) -> Result<Vec<CatalogEntry>, CatalogError> {
        Ok(self
            .entries
            .iter()
            .filter(|(toolkit, _)| toolkits.contains(toolkit))
            .map(|(_, entry)| entry.clone())
            .collect())
    }
}

/// Handler that returns a fixed value for every invocation.
#[derive(Clone, Debug)]
pub struct FixedResponse(pub serde_json::Value);

#[async_trait::async_trait]
impl ToolHandler for FixedResponse {
    async fn invoke(&self, _input: serde_json::Value) -> Result<serde_json::Value, ToolError> {
        Ok(self.0.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FailingCatalog {
        calls: AtomicUsize,
    }

    #[async_trait::async_trait]
    impl ToolCatalog for FailingCatalog {
        async fn fetch(
            &self,
            _caller_id: &str,
            _toolkits: &[String],
        ) -> Result<Vec<CatalogEntry>, CatalogError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(CatalogError::new("catalog service unreachable"))
        }
    }

    fn handler() -> Arc<dyn ToolHandler> {
        Arc::new(FixedResponse(serde_json::json!({"ok": true})))
    }

    fn kits(values: &[&str]) -> Vec<String> {
        values.iter().map(|v| v.to_string()).collect()
    }

    #[test]
    fn from_entries_drops_non_executable_and_duplicates() {
        let entries = vec![
            CatalogEntry::new("GMAIL_SEND_EMAIL", handler()),
            CatalogEntry {
                name: "GMAIL_BROKEN".into(),
                ..CatalogEntry::default()
            },
            CatalogEntry::new("  ", handler()),
            CatalogEntry::new("GMAIL_SEND_EMAIL", handler()),
            CatalogEntry::new("GMAIL_LIST_THREADS", handler()),
        ];
        let tools = ToolSet::from_entries(entries);
        assert_eq!(tools.names(), vec!["GMAIL_SEND_EMAIL", "GMAIL_LIST_THREADS"]);
    }

    #[tokio::test]
    async fn catalog_failure_carries_underlying_message() {
        let catalog = FailingCatalog {
            calls: AtomicUsize::new(0),
        };
        let err = provision_tools(&catalog, "user-1", &kits(&["GMAIL"]))
            .await
            .expect_err("catalog fails");
        assert_eq!(
            err,
            DelegateError::Provisioning("catalog service unreachable".into())
        );
        assert_eq!(catalog.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn empty_usable_set_is_a_provisioning_error() {
        let catalog = StaticCatalog::new().with_tool(
            "gmail",
            CatalogEntry {
                name: "GMAIL_BROKEN".into(),
                ..CatalogEntry::default()
            },
        );
        let err = provision_tools(&catalog, "user-1", &kits(&["GMAIL"]))
            .await
            .expect_err("nothing executable");
        assert_eq!(err.to_string(), NO_TOOLS);
    }

    #[tokio::test]
    async fn static_catalog_filters_by_toolkit() {
        let catalog = StaticCatalog::new()
            .with_tool("gmail", CatalogEntry::new("GMAIL_SEND_EMAIL", handler()))
            .with_tool("slack", CatalogEntry::new("SLACK_POST", handler()));
        let tools = provision_tools(&catalog, "user-1", &kits(&["SLACK"]))
            .await
            .expect("slack tools");
        assert_eq!(tools.names(), vec!["SLACK_POST"]);
        let output = tools
            .get("SLACK_POST")
            .expect("tool")
            .handler
            .invoke(serde_json::Value::Null)
            .await
            .expect("invoke");
        assert_eq!(output, serde_json::json!({"ok": true}));
    }
}
