use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::errors::EngineError;

/// Model selection for sub-agent runs.
#[derive(Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct ModelRef {
    /// Runtime/provider that owns the model.
    pub provider: String,
    /// Provider-specific model name.
    pub model: String,
}

impl ModelRef {
    pub fn new(provider: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
            model: model.into(),
        }
    }
}

impl fmt::Display for ModelRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.provider, self.model)
    }
}

impl Default for ModelRef {
    fn default() -> Self {
        Self::new("openai", "gpt-5-nano")
    }
}

/// Engine-wide run settings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Hard upper bound on model steps per run.
    pub max_steps: u32,
    /// Bounded snapshot buffer between the run task and the consumer.
    pub stream_buffer_capacity: usize,
    /// Optional wall-clock limit for the whole run, from provisioning
    /// through aggregation.
    pub timeout: Option<Duration>,
    pub model: ModelRef,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_steps: 8,
            stream_buffer_capacity: 128,
            timeout: None,
            model: ModelRef::default(),
        }
    }
}

impl EngineConfig {
    /// Defaults overridden from the environment.
    ///
    /// Environment variables:
    /// - `DELEGATE_MAX_STEPS`: step bound (default 8).
    /// - `DELEGATE_BUFFER`: snapshot buffer capacity (default 128).
    /// - `DELEGATE_TIMEOUT_SECS`: optional run timeout in seconds.
    /// - `DELEGATE_MODEL_PROVIDER` / `DELEGATE_MODEL`: model selection.
    pub fn from_env() -> Result<Self, EngineError> {
        let mut config = Self::default();
        if let Some(max_steps) = env_parse::<u32>("DELEGATE_MAX_STEPS")? {
            config.max_steps = max_steps;
        }
        if let Some(capacity) = env_parse::<usize>("DELEGATE_BUFFER")? {
            config.stream_buffer_capacity = capacity;
        }
        if let Some(secs) = env_parse::<u64>("DELEGATE_TIMEOUT_SECS")? {
            config.timeout = Some(Duration::from_secs(secs));
        }
        if let Some(provider) = env_parse::<String>("DELEGATE_MODEL_PROVIDER")? {
            config.model.provider = provider;
        }
        if let Some(model) = env_parse::<String>("DELEGATE_MODEL")? {
            config.model.model = model;
        }
        config.validate()?;
        Ok(config)
    }

    /// Caps the number of model steps per run.
    pub fn max_steps(mut self, max_steps: u32) -> Self {
        self.max_steps = max_steps;
        self
    }

    /// Snapshots buffered before the run waits for the caller.
    pub fn stream_buffer_capacity(mut self, capacity: usize) -> Self {
        self.stream_buffer_capacity = capacity;
        self
    }

    /// Fails runs that take longer than `timeout`.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn model(mut self, model: ModelRef) -> Self {
        self.model = model;
        self
    }

    /// Rejects zero step bounds and zero-capacity buffers.
    pub fn validate(&self) -> Result<(), EngineError> {
        if self.max_steps == 0 {
            return Err(EngineError::Config("max_steps must be greater than 0".into()));
        }
        if self.stream_buffer_capacity == 0 {
            return Err(EngineError::Config(
                "stream_buffer_capacity must be greater than 0".into(),
            ));
        }
        if self.model.provider.trim().is_empty() || self.model.model.trim().is_empty() {
            return Err(EngineError::Config("model must not be empty".into()));
        }
        Ok(())
    }
}

fn env_parse<T: FromStr>(key: &str) -> Result<Option<T>, EngineError> {
    let Ok(raw) = std::env::var(key) else {
        return Ok(None);
    };
    let raw = raw.trim();
    if raw.is_empty() {
        return Ok(None);
    }
    raw.parse()
        .map(Some)
        .map_err(|_| EngineError::Config(format!("invalid value for {key}: {raw:?}")))
}
