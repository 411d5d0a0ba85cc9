use std::collections::HashMap;
use std::path::Path;
use std::path::PathBuf;

use serde::Deserialize;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::filter::Targets;

use super::diagnostics::format_diagnostics;
use super::diagnostics::Diagnostic;
use super::diagnostics::Error;
use super::diagnostics::SourceInfo;
use super::diagnostics::ValidationError;
use super::diagnostics::Warning;
use crate::integrations::mqtt::topic;
use crate::integrations::mqtt::MqttConfig;
use crate::phone;
use crate::phone::service::is_valid_object_id;

/// Top-level configuration structure
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    #[serde(default)]
    pub logging: LoggingConfig,

    /// HTTP API; not served when absent
    pub api: Option<ApiConfig>,

    #[serde(default)]
    pub integrations: IntegrationsConfig,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl From<LogLevel> for LevelFilter {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Trace => LevelFilter::TRACE,
            LogLevel::Debug => LevelFilter::DEBUG,
            LogLevel::Info => LevelFilter::INFO,
            LogLevel::Warn => LevelFilter::WARN,
            LogLevel::Error => LevelFilter::ERROR,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error
    #[serde(default)]
    pub level: LogLevel,

    /// Per-target levels, e.g. `"phoned::integrations::mqtt" = "debug"`
    #[serde(default)]
    pub overrides: HashMap<String, LogLevel>,
}

impl LoggingConfig {
    /// Build the per-target filter for the tracing subscriber.
    pub fn targets(&self) -> Targets {
        Targets::new()
            .with_default(LevelFilter::from(self.level))
            .with_targets(
                self.overrides
                    .iter()
                    .map(|(target, level)| (target.clone(), LevelFilter::from(*level))),
            )
    }
}

fn default_listen() -> String {
    "127.0.0.1".to_string()
}

fn default_api_port() -> u16 {
    8565
}

/// HTTP API configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ApiConfig {
    #[serde(default = "default_listen")]
    pub listen: String,

    #[serde(default = "default_api_port")]
    pub port: u16,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            port: default_api_port(),
        }
    }
}

/// Integration configuration container
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct IntegrationsConfig {
    /// MQTT phones; the integration only starts when this is present
    pub mqtt: Option<MqttConfig>,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {0}: {1}")]
    Io(PathBuf, #[source] std::io::Error),

    #[error("Failed to parse {path}: {error}")]
    Parse {
        path: PathBuf,
        #[source]
        error: toml::de::Error,
    },

    #[error("Invalid configuration:\n{0}")]
    Invalid(String),
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// Returns Ok((Config, diagnostics)) where diagnostics only holds
    /// warnings. Any validation error fails the load with every diagnostic
    /// rendered into the error.
    pub fn from_file(path: impl AsRef<Path>) -> Result<(Self, Vec<Diagnostic>), ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Io(path.to_path_buf(), e))?;

        Self::from_source(SourceInfo {
            file_path: path.to_path_buf(),
            content,
        })
    }

    /// Parse and validate configuration text
    pub fn from_source(source: SourceInfo) -> Result<(Self, Vec<Diagnostic>), ConfigError> {
        let config: Config =
            toml::from_str(&source.content).map_err(|error| ConfigError::Parse {
                path: source.file_path.clone(),
                error,
            })?;

        let diagnostics = config.validate(&source);
        if diagnostics.iter().any(Diagnostic::is_error) {
            return Err(ConfigError::Invalid(format_diagnostics(&diagnostics)));
        }

        Ok((config, diagnostics))
    }

    /// Check constraints the types alone cannot express
    pub fn validate(&self, source: &SourceInfo) -> Vec<Diagnostic> {
        let mut diagnostics = Vec::new();

        let Some(mqtt) = &self.integrations.mqtt else {
            return diagnostics;
        };

        if mqtt.phones.is_empty() {
            diagnostics.push(Diagnostic::Warning(Warning::NoPhones));
        }

        for (object_id, phone_config) in &mqtt.phones {
            let field_path = format!("integrations.mqtt.phones.{}", object_id);

            if !is_valid_object_id(object_id) {
                diagnostics.push(Diagnostic::Error(Error::Validation(ValidationError {
                    field_path: field_path.clone(),
                    message: "object id must only contain a-z, 0-9 and _".to_string(),
                    span: None,
                    source: Some(source.clone()),
                })));
            }

            match &phone_config.state_topic {
                Some(state_topic) => {
                    if let Err(message) = topic::valid_subscribe_topic(state_topic.get_ref()) {
                        diagnostics.push(Diagnostic::Error(Error::Validation(ValidationError {
                            field_path: format!("{}.state_topic", field_path),
                            message,
                            span: Some(state_topic.span()),
                            source: Some(source.clone()),
                        })));
                    }
                }
                None if !phone_config.optimistic => {
                    diagnostics.push(Diagnostic::Warning(Warning::ForcedOptimistic {
                        entity_id: phone::entity_id(object_id),
                    }));
                }
                None => {}
            }

            let command_topic = &phone_config.command_topic;
            if let Err(message) = topic::valid_publish_topic(command_topic.get_ref()) {
                diagnostics.push(Diagnostic::Error(Error::Validation(ValidationError {
                    field_path: format!("{}.command_topic", field_path),
                    message,
                    span: Some(command_topic.span()),
                    source: Some(source.clone()),
                })));
            }
        }

        diagnostics
    }
}
