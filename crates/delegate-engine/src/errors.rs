/// Errors returned by a model runtime, either when a run is started or while
/// its event stream is being consumed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RuntimeError {
    /// The runtime rejected the run (auth, quota, bad request, etc.).
    #[error("runtime error ({runtime}): {message}")]
    Provider { runtime: String, message: String },
    /// Transport or stream I/O failed.
    #[error("transport error ({runtime}): {message}")]
    Transport { runtime: String, message: String },
    /// Event shape or sequencing was invalid.
    #[error("protocol error ({runtime}): {message}")]
    Protocol { runtime: String, message: String },
}

impl RuntimeError {
    /// Creates a provider-level error.
    pub fn provider(runtime: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Provider {
            runtime: runtime.into(),
            message: message.into(),
        }
    }

    /// Creates a transport-level error.
    pub fn transport(runtime: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Transport {
            runtime: runtime.into(),
            message: message.into(),
        }
    }

    /// Creates a protocol-level error.
    pub fn protocol(runtime: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Protocol {
            runtime: runtime.into(),
            message: message.into(),
        }
    }

    /// Returns the human-readable message without the runtime prefix.
    pub fn message(&self) -> &str {
        match self {
            Self::Provider { message, .. }
            | Self::Transport { message, .. }
            | Self::Protocol { message, .. } => message,
        }
    }
}

/// Failure reported by a tool catalog fetch.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct CatalogError {
    pub message: String,
}

impl CatalogError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Failure reported by a single tool invocation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct ToolError {
    pub message: String,
}

impl ToolError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Why a delegated run did not succeed.
///
/// Every variant is converted into a failed [`ExecutionSnapshot`](crate::ExecutionSnapshot)
/// before it reaches the caller; the `Display` text is what ends up in the
/// snapshot's `error` field.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DelegateError {
    /// Toolkit, task or context failed shape checks.
    #[error("{0}")]
    Validation(String),
    /// No caller identity was supplied.
    #[error("User session required to use connectors.")]
    SessionRequired,
    /// Some requested toolkits are not enabled for the caller.
    #[error(
        "The following connectors are not available: {}. Enable them in your connector settings and try again.",
        .unavailable.join(", ")
    )]
    Availability { unavailable: Vec<String> },
    /// The tool catalog failed or returned nothing usable.
    #[error("{0}")]
    Provisioning(String),
    /// The model runtime failed to start or its stream broke mid-run.
    #[error("{0}")]
    Stream(String),
    /// A tool reported a failure; fail-fast for the whole run.
    #[error("{message}")]
    ToolExecution { call_id: String, message: String },
    #[error("Delegated agent execution was cancelled.")]
    Cancelled,
    #[error("Delegated agent execution timed out.")]
    TimedOut,
    /// The run task ended without producing a result.
    #[error("Agent execution failed unexpectedly.")]
    Unexpected,
}

impl DelegateError {
    pub(crate) const STREAM_FAILED: &'static str = "Delegated agent execution failed.";

    /// Builds a stream error, falling back to a generic message when the
    /// underlying one is blank.
    pub(crate) fn stream(message: &str) -> Self {
        let message = message.trim();
        if message.is_empty() {
            Self::Stream(Self::STREAM_FAILED.to_string())
        } else {
            Self::Stream(message.to_string())
        }
    }
}

/// Errors raised while assembling a [`DelegateEngine`](crate::DelegateEngine).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EngineError {
    /// Invalid engine configuration.
    #[error("config error: {0}")]
    Config(String),
    /// A required collaborator was not registered on the builder.
    #[error("missing collaborator: {0}")]
    MissingCollaborator(&'static str),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn availability_message_lists_every_toolkit() {
        let err = DelegateError::Availability {
            unavailable: vec!["SLACK".into(), "NOTION".into()],
        };
        assert!(err.to_string().contains("SLACK, NOTION"));
    }

    #[test]
    fn blank_stream_message_uses_generic_text() {
        assert_eq!(
            DelegateError::stream("  ").to_string(),
            "Delegated agent execution failed."
        );
        assert_eq!(DelegateError::stream("socket closed").to_string(), "socket closed");
    }

    #[test]
    fn runtime_error_message_omits_runtime_prefix() {
        let err = RuntimeError::transport("scripted", "connection reset");
        assert_eq!(err.message(), "connection reset");
        assert_eq!(err.to_string(), "transport error (scripted): connection reset");
    }
}
