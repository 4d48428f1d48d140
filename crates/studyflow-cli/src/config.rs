//! Simulator settings

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use studyflow_runtime::{RuleErrorPolicy, DEFAULT_MAX_DEPTH};

/// Settings for the rule simulator
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// YAML file describing external services (`services:` list)
    #[serde(default)]
    pub services_file: Option<PathBuf>,

    /// Log level used when `RUST_LOG` is not set
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Maximum nesting depth of rule trees
    #[serde(default = "default_max_depth")]
    pub max_depth: usize,

    /// What to do when a rule fails (`continue` or `abort`)
    #[serde(default)]
    pub error_policy: RuleErrorPolicy,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_max_depth() -> usize {
    DEFAULT_MAX_DEPTH
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            services_file: None,
            log_level: default_log_level(),
            max_depth: default_max_depth(),
            error_policy: RuleErrorPolicy::default(),
        }
    }
}

impl Settings {
    /// Load settings from `.env`, the optional `config/studyflow` file and
    /// `STUDYFLOW_*` environment variables
    pub fn load() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();
        Self::build(config::File::with_name("config/studyflow").required(false))
    }

    /// Load settings from an explicit file plus `STUDYFLOW_*` overrides
    pub fn load_from(path: &Path) -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();
        Self::build(config::File::from(path))
    }

    fn build<S>(file: S) -> anyhow::Result<Self>
    where
        S: config::Source + Send + Sync + 'static,
    {
        config::Config::builder()
            .add_source(file)
            .add_source(config::Environment::with_prefix("STUDYFLOW").try_parsing(true))
            .build()
            .map_err(|e| anyhow::anyhow!("Failed to load settings: {}", e))?
            .try_deserialize()
            .map_err(|e| anyhow::anyhow!("Failed to deserialize settings: {}", e))
    }

    /// Default tracing filter for the configured level
    pub fn log_filter(&self) -> String {
        format!(
            "studyflow_runtime={level},studyflow_cli={level}",
            level = self.log_level
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_settings_default() {
        let settings = Settings::default();

        assert!(settings.services_file.is_none());
        assert_eq!(settings.log_level, "info");
        assert_eq!(settings.max_depth, DEFAULT_MAX_DEPTH);
        assert_eq!(settings.error_policy, RuleErrorPolicy::Continue);
    }

    #[test]
    fn test_settings_partial_yaml_uses_defaults() {
        let settings: Settings = serde_yaml::from_str("error_policy: abort\n").unwrap();

        assert_eq!(settings.error_policy, RuleErrorPolicy::Abort);
        assert_eq!(settings.log_level, "info");
        assert_eq!(settings.max_depth, DEFAULT_MAX_DEPTH);
    }

    #[test]
    fn test_log_filter() {
        let settings = Settings {
            log_level: "debug".to_string(),
            ..Settings::default()
        };
        assert_eq!(
            settings.log_filter(),
            "studyflow_runtime=debug,studyflow_cli=debug"
        );
    }
}
