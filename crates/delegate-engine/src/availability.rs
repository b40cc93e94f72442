use serde::{Deserialize, Serialize};

use crate::errors::DelegateError;
use crate::request::normalize_toolkits;

/// Who is delegating and which toolkits they may use.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallerContext {
    /// Authenticated caller id; `None` means no session.
    #[serde(default)]
    pub caller_id: Option<String>,
    /// Toolkits the caller has enabled and connected.
    #[serde(default)]
    pub permitted_toolkits: Vec<String>,
}

impl CallerContext {
    /// An authenticated caller with no permitted toolkits yet.
    pub fn new(caller_id: impl Into<String>) -> Self {
        Self {
            caller_id: Some(caller_id.into()),
            permitted_toolkits: Vec::new(),
        }
    }

    /// A caller with no session.
    pub fn anonymous() -> Self {
        Self::default()
    }

    /// Adds toolkits to the permitted set. Names are matched case-insensitively.
    pub fn permit<I, S>(mut self, toolkits: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.permitted_toolkits
            .extend(toolkits.into_iter().map(Into::into));
        self
    }

    /// Caller id, if present and not blank.
    pub fn session(&self) -> Option<&str> {
        self.caller_id
            .as_deref()
            .map(str::trim)
            .filter(|id| !id.is_empty())
    }
}

/// Requested toolkits missing from the permitted set, in request order.
pub fn unavailable_toolkits(requested: &[String], permitted: &[String]) -> Vec<String> {
    let permitted = normalize_toolkits(permitted.iter().map(String::as_str));
    requested
        .iter()
        .filter(|toolkit| !permitted.contains(toolkit))
        .cloned()
        .collect()
}

/// Fails when any requested toolkit is not permitted for the caller.
pub fn ensure_available(requested: &[String], permitted: &[String]) -> Result<(), DelegateError> {
    let unavailable = unavailable_toolkits(requested, permitted);
    if unavailable.is_empty() {
        Ok(())
    } else {
        Err(DelegateError::Availability { unavailable })
    }
}

/// Advisory connector state for a caller. Only used to shape instructions for
/// the sub-agent, never for authorization.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectorStatus {
    #[serde(default)]
    pub enabled: Vec<String>,
    #[serde(default)]
    pub disabled: Vec<String>,
    #[serde(default)]
    pub not_connected: Vec<String>,
}

/// Source of [`ConnectorStatus`] for a caller.
#[async_trait::async_trait]
pub trait ConnectorStatusProvider: Send + Sync {
    async fn status(&self, caller_id: &str) -> Result<ConnectorStatus, String>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(values: &[&str]) -> Vec<String> {
        values.iter().map(|v| v.to_string()).collect()
    }

    #[test]
    fn permitted_set_is_compared_case_insensitively() {
        let missing = unavailable_toolkits(&ids(&["GMAIL", "NOTION"]), &ids(&["gmail", " Notion"]));
        assert!(missing.is_empty());
    }

    #[test]
    fn reports_every_unavailable_toolkit_comma_joined() {
        let err = ensure_available(&ids(&["GMAIL", "SLACK", "NOTION"]), &ids(&["GMAIL"]))
            .expect_err("slack and notion are missing");
        assert_eq!(
            err,
            DelegateError::Availability {
                unavailable: ids(&["SLACK", "NOTION"])
            }
        );
        assert!(err.to_string().contains("SLACK, NOTION"));
    }

    #[test]
    fn blank_caller_id_is_not_a_session() {
        assert_eq!(CallerContext::new("  ").session(), None);
        assert_eq!(CallerContext::anonymous().session(), None);
        assert_eq!(CallerContext::new("user-1").session(), Some("user-1"));
    }
}
