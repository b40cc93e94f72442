//! Maps raw tool names (`GMAIL_SEND_EMAIL`) to the connector they belong to.

use tracing::trace;

#[derive(Debug, thiserror::Error)]
enum ConnectorNameError {
    #[error("tool name is empty")]
    Empty,
    #[error("tool name {0:?} has no toolkit prefix")]
    NoPrefix(String),
}

/// Human-facing connector category for `tool_name`.
///
/// Prefers the longest requested toolkit that prefixes the name, then the
/// segment before the first `_`. Never fails: anything undeterminable yields
/// the raw tool name.
pub fn connector_type(tool_name: &str, toolkits: &[String]) -> String {
    match try_connector_type(tool_name, toolkits) {
        Ok(name) => name,
        Err(err) => {
            trace!(tool_name, error = %err, "falling back to raw tool name");
            tool_name.to_string()
        }
    }
}

fn try_connector_type(tool_name: &str, toolkits: &[String]) -> Result<String, ConnectorNameError> {
    let trimmed = tool_name.trim();
    if trimmed.is_empty() {
        return Err(ConnectorNameError::Empty);
    }
    let upper = trimmed.to_uppercase();
    let toolkit = toolkits
        .iter()
        .filter(|toolkit| {
            upper == **toolkit
                || upper
                    .strip_prefix(toolkit.as_str())
                    .is_some_and(|rest| rest.starts_with('_'))
        })
        .max_by_key(|toolkit| toolkit.len())
        .cloned()
        .or_else(|| {
            upper
                .split_once('_')
                .map(|(prefix, _)| prefix.to_string())
                .filter(|prefix| !prefix.is_empty())
        })
        .ok_or_else(|| ConnectorNameError::NoPrefix(trimmed.to_string()))?;
    Ok(display_name(&toolkit))
}

fn display_name(toolkit: &str) -> String {
    toolkit
        .split('_')
        .filter(|word| !word.is_empty())
        .map(|word| {
            let lower = word.to_lowercase();
            let mut chars = lower.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn toolkits(values: &[&str]) -> Vec<String> {
        values.iter().map(|v| v.to_string()).collect()
    }

    #[test]
    fn uses_requested_toolkit_prefix() {
        assert_eq!(connector_type("GMAIL_SEND_EMAIL", &toolkits(&["GMAIL"])), "Gmail");
    }

    #[test]
    fn prefers_longest_matching_toolkit() {
        let kits = toolkits(&["GOOGLE", "GOOGLE_CALENDAR"]);
        assert_eq!(
            connector_type("google_calendar_create_event", &kits),
            "Google Calendar"
        );
    }

    #[test]
    fn falls_back_to_first_segment_when_no_toolkit_matches() {
        assert_eq!(connector_type("SLACK_POST_MESSAGE", &[]), "Slack");
    }

    #[test]
    fn falls_back_to_raw_name_when_undeterminable() {
        assert_eq!(connector_type("search", &[]), "search");
        assert_eq!(connector_type("_weird", &[]), "_weird");
        assert_eq!(connector_type("", &[]), "");
    }
}
