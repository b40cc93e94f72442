//! Process-wide `tracing` setup for binaries embedding the engine.

use std::path::{Path, PathBuf};

use once_cell::sync::OnceCell;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt as _;
use tracing_subscriber::util::SubscriberInitExt as _;

static INIT: OnceCell<()> = OnceCell::new();

const DEFAULT_LOG_FILE: &str = "delegate.logs.jsonl";

/// Logging settings resolved from the environment.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ObservabilitySettings {
    pub enabled: bool,
    /// Explicit filter directive; falls back to `RUST_LOG`, then `info`.
    pub level: Option<String>,
    /// JSONL log file. Console logging to stderr when unset.
    pub json_log_path: Option<PathBuf>,
}

impl ObservabilitySettings {
    /// Environment variables:
    /// - `DELEGATE_OBSERVABILITY_ENABLED` / `DELEGATE_OBSERVABILITY`: enable flag (default enabled).
    /// - `DELEGATE_LOG_LEVEL`: level or filter override (`info`, `delegate_engine=debug`, ...).
    /// - `DELEGATE_JSON_LOG_PATH`: write JSONL to this file instead of the console.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let enabled = ["DELEGATE_OBSERVABILITY_ENABLED", "DELEGATE_OBSERVABILITY"]
            .into_iter()
            .find_map(&lookup)
            .map(|value| parse_bool(&value).unwrap_or(true))
            .unwrap_or(true);
        let non_blank = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());
        Self {
            enabled,
            level: non_blank("DELEGATE_LOG_LEVEL"),
            json_log_path: non_blank("DELEGATE_JSON_LOG_PATH").map(PathBuf::from),
        }
    }

    fn env_filter(&self) -> EnvFilter {
        if let Some(level) = &self.level
            && let Ok(filter) = EnvFilter::try_new(level)
        {
            return filter;
        }
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" | "enabled" => Some(true),
        "0" | "false" | "no" | "off" | "disabled" => Some(false),
        _ => None,
    }
}

/// Initializes logging once per process from [`ObservabilitySettings::from_env`].
///
/// Later calls are no-ops, as is everything after another global subscriber
/// was installed.
pub fn init_observability() {
    INIT.get_or_init(|| install(&ObservabilitySettings::from_env()));
}

fn install(settings: &ObservabilitySettings) {
    if !settings.enabled {
        return;
    }

    let env_filter = settings.env_filter();
    match &settings.json_log_path {
        Some(path) => {
            let dir = path
                .parent()
                .filter(|parent| !parent.as_os_str().is_empty())
                .unwrap_or_else(|| Path::new("."));
            let _ = std::fs::create_dir_all(dir);
            let file_name = path
                .file_name()
                .and_then(|name| name.to_str())
                .unwrap_or(DEFAULT_LOG_FILE);
            let writer = tracing_appender::rolling::never(dir, file_name);
            let json_layer = tracing_subscriber::fmt::layer()
                .json()
                .with_current_span(true)
                .with_span_list(true)
                .with_target(false)
                .with_writer(writer);
            let _ = tracing_subscriber::registry()
                .with(env_filter)
                .with(json_layer)
                .try_init();
        }
        None => {
            // stdout carries command output.
            let console_layer = tracing_subscriber::fmt::layer()
                .compact()
                .with_target(false)
                .with_writer(std::io::stderr);
            let _ = tracing_subscriber::registry()
                .with(env_filter)
                .with(console_layer)
                .try_init();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn settings(pairs: &[(&str, &str)]) -> ObservabilitySettings {
        let env: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        ObservabilitySettings::from_lookup(|key| env.get(key).cloned())
    }

    #[test]
    fn defaults_to_enabled_console_logging() {
        let resolved = settings(&[]);
        assert!(resolved.enabled);
        assert_eq!(resolved.level, None);
        assert_eq!(resolved.json_log_path, None);
    }

    #[test]
    fn first_present_flag_wins_and_unknown_values_enable() {
        assert!(!settings(&[("DELEGATE_OBSERVABILITY_ENABLED", "off")]).enabled);
        assert!(!settings(&[("DELEGATE_OBSERVABILITY", "0")]).enabled);
        assert!(
            settings(&[
                ("DELEGATE_OBSERVABILITY_ENABLED", "yes"),
                ("DELEGATE_OBSERVABILITY", "no"),
            ])
            .enabled
        );
        assert!(settings(&[("DELEGATE_OBSERVABILITY", "maybe")]).enabled);
    }

    #[test]
    fn blank_values_are_ignored() {
        let resolved = settings(&[
            ("DELEGATE_LOG_LEVEL", "  "),
            ("DELEGATE_JSON_LOG_PATH", "logs/run.jsonl"),
        ]);
        assert_eq!(resolved.level, None);
        assert_eq!(resolved.json_log_path, Some(PathBuf::from("logs/run.jsonl")));
    }
}
