use serde::{Deserialize, Serialize};

use crate::errors::DelegateError;

/// Upper bound for the task description, in characters.
pub const MAX_TASK_CHARS: usize = 2_000;
/// Upper bound for the optional supplementary context, in characters.
pub const MAX_CONTEXT_CHARS: usize = 5_000;

const NO_TOOLKITS: &str = "At least one connector toolkit must be specified.";

/// Toolkit selection as supplied by the caller: a single identifier or a list.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ToolkitSelection {
    One(String),
    Many(Vec<String>),
}

impl ToolkitSelection {
    /// Iterates the raw identifiers in caller order.
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        let items: &[String] = match self {
            Self::One(value) => std::slice::from_ref(value),
            Self::Many(values) => values,
        };
        items.iter().map(String::as_str)
    }
}

impl From<&str> for ToolkitSelection {
    fn from(value: &str) -> Self {
        Self::One(value.to_string())
    }
}

impl From<String> for ToolkitSelection {
    fn from(value: String) -> Self {
        Self::One(value)
    }
}

impl From<Vec<String>> for ToolkitSelection {
    fn from(values: Vec<String>) -> Self {
        Self::Many(values)
    }
}

impl From<Vec<&str>> for ToolkitSelection {
    fn from(values: Vec<&str>) -> Self {
        Self::Many(values.into_iter().map(ToOwned::to_owned).collect())
    }
}

/// Raw inbound request for a delegated task.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DelegateInput {
    pub toolkits: ToolkitSelection,
    pub task: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
}

impl DelegateInput {
    pub fn new(toolkits: impl Into<ToolkitSelection>, task: impl Into<String>) -> Self {
        Self {
            toolkits: toolkits.into(),
            task: task.into(),
            context: None,
        }
    }

    /// Attaches supplementary instructions for the sub-agent.
    pub fn context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }
}

/// A validated task request with canonical toolkit identifiers.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskRequest {
    toolkits: Vec<String>,
    task: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    context: Option<String>,
}

impl TaskRequest {
    /// Canonical (trimmed, uppercased, deduplicated) toolkit identifiers.
    pub fn toolkits(&self) -> &[String] {
        &self.toolkits
    }

    pub fn task(&self) -> &str {
        &self.task
    }

    pub fn context(&self) -> Option<&str> {
        self.context.as_deref()
    }
}

/// Trims, drops blanks, uppercases and deduplicates toolkit identifiers,
/// keeping first-seen order. Re-normalizing the output is a no-op.
pub fn normalize_toolkits<'a>(raw: impl IntoIterator<Item = &'a str>) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for id in raw {
        let id = id.trim();
        if id.is_empty() {
            continue;
        }
        let canonical = id.to_uppercase();
        if !out.contains(&canonical) {
            out.push(canonical);
        }
    }
    out
}

/// Validates the raw input and produces a [`TaskRequest`].
pub fn validate(input: &DelegateInput) -> Result<TaskRequest, DelegateError> {
    let toolkits = normalize_toolkits(input.toolkits.iter());
    if toolkits.is_empty() {
        return Err(DelegateError::Validation(NO_TOOLKITS.into()));
    }

    let task_len = input.task.chars().count();
    if task_len == 0 || task_len > MAX_TASK_CHARS {
        return Err(DelegateError::Validation(format!(
            "Task description must be between 1 and {MAX_TASK_CHARS} characters."
        )));
    }

    if let Some(context) = &input.context
        && context.chars().count() > MAX_CONTEXT_CHARS
    {
        return Err(DelegateError::Validation(format!(
            "Context must be at most {MAX_CONTEXT_CHARS} characters."
        )));
    }

    Ok(TaskRequest {
        toolkits,
        task: input.task.clone(),
        context: input.context.clone(),
    })
}
