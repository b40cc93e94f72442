use crate::availability::ConnectorStatus;
use crate::catalog::ToolSet;
use crate::request::TaskRequest;

/// Supplementary instructions for the sub-agent: which connectors it may use,
/// which tools it was given, what the caller cannot use right now, and any
/// extra context supplied with the task.
pub fn build_system_prompt(
    request: &TaskRequest,
    tools: &ToolSet,
    status: &ConnectorStatus,
) -> String {
    let mut lines = vec![
        "You are a delegated sub-agent completing one task with connector tools.".to_string(),
        format!(
            "You may only use these connectors: {}.",
            request.toolkits().join(", ")
        ),
        format!("Available tools: {}.", tools.names().join(", ")),
    ];

    let unavailable: Vec<&str> = status
        .disabled
        .iter()
        .chain(status.not_connected.iter())
        .map(|toolkit| toolkit.trim())
        .filter(|toolkit| !toolkit.is_empty())
        .collect();
    if !unavailable.is_empty() {
        lines.push(format!(
            "These connectors are unavailable to the user and must not be relied on: {}.",
            unavailable.join(", ")
        ));
    }

    lines.push(
        "Finish with a concise summary of what you did and anything that still needs attention."
            .to_string(),
    );

    if let Some(context) = request
        .context()
        .map(str::trim)
        .filter(|context| !context.is_empty())
    {
        lines.push(String::new());
        lines.push("Additional context:".to_string());
        lines.push(context.to_string());
    }

    lines.join("\n")
}
