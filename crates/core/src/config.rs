use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

/// What the coordinator does when an operation arrives while another is in flight
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BusyPolicy {
    /// Fail fast with `Error::Busy` (default)
    #[default]
    Reject,
    /// Wait for the in-flight operation to finish
    Queue,
}

impl BusyPolicy {
    pub const VALUES: &[BusyPolicy] = &[BusyPolicy::Reject, BusyPolicy::Queue];

    pub fn as_str(&self) -> &'static str {
        match self {
            BusyPolicy::Reject => "reject",
            BusyPolicy::Queue => "queue",
        }
    }
}

impl std::fmt::Display for BusyPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for BusyPolicy {
    type Err = Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "reject" => Ok(BusyPolicy::Reject),
            "queue" => Ok(BusyPolicy::Queue),
            _ => Err(Error::Config(ConfigError::InvalidBusyPolicy(s.to_string()).to_string())),
        }
    }
}

/// Model transport configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "provider", rename_all = "lowercase")]
pub enum ProviderConfig {
    /// OpenAI-compatible chat completions endpoint
    #[serde(rename = "openai")]
    OpenAi {
        /// API key for authentication
        api_key: String,
        /// Model name (e.g., "gpt-4o-mini")
        model: String,
        /// Base URL for the API
        #[serde(default = "default_openai_base_url")]
        base_url: String,
    },
    /// Scripted responses for offline use and tests
    Mock {
        /// TOML file with `[[responses]]` entries
        #[serde(default)]
        responses_file: Option<PathBuf>,
    },
}

impl ProviderConfig {
    pub fn name(&self) -> &'static str {
        match self {
            ProviderConfig::OpenAi { .. } => "openai",
            ProviderConfig::Mock { .. } => "mock",
        }
    }
}

pub fn default_openai_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

/// Coordinator settings
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NotebookConfig {
    /// Sampling temperature passed to every model call
    #[serde(default)]
    pub temperature: Option<f32>,

    /// Completion token limit passed to every model call
    #[serde(default)]
    pub max_tokens: Option<u32>,

    #[serde(default)]
    pub busy_policy: BusyPolicy,
}

/// `[logging]` section
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    /// `pretty`, `json` or `compact`
    #[serde(default = "default_log_format")]
    pub format: String,

    #[serde(default)]
    pub file: FileLoggingConfig,

    #[serde(default)]
    pub privacy: PrivacySettings,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
            file: FileLoggingConfig::default(),
            privacy: PrivacySettings::default(),
        }
    }
}

/// `[logging.file]` section
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileLoggingConfig {
    #[serde(default)]
    pub enabled: bool,

    /// Absolute directory for log files (default: `~/.cellbook/logs`)
    #[serde(default)]
    pub directory: Option<PathBuf>,
}

/// `[logging.privacy]` section
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PrivacySettings {
    /// `none`, `truncate` or `full`
    #[serde(default = "default_log_content")]
    pub log_content: String,

    #[serde(default = "default_truncate_length")]
    pub truncate_length: usize,
}

impl Default for PrivacySettings {
    fn default() -> Self {
        Self { log_content: default_log_content(), truncate_length: default_truncate_length() }
    }
}

fn default_log_level() -> String {
    "warn".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

fn default_log_content() -> String {
    "truncate".to_string()
}

fn default_truncate_length() -> usize {
    200
}

/// Root configuration structure for cellbook.toml
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    pub provider: ProviderConfig,

    #[serde(default)]
    pub notebook: NotebookConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from a TOML string
    pub fn from_toml_str(toml_str: &str) -> Result<Self> {
        let config: Config = toml::from_str(toml_str).map_err(|e| Error::Config(ConfigError::from(e).to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Validate the configuration
    fn validate(&self) -> Result<()> {
        if let ProviderConfig::OpenAi { model, .. } = &self.provider
            && model.trim().is_empty()
        {
            return Err(Error::Config(ConfigError::MissingField("provider.model".to_string()).to_string()));
        }

        if let Some(temperature) = self.notebook.temperature
            && !(0.0..=2.0).contains(&temperature)
        {
            return Err(Error::Config(ConfigError::OutOfRange(format!("notebook.temperature = {}", temperature)).to_string()));
        }

        if let Some(dir) = &self.logging.file.directory
            && !dir.is_absolute()
        {
            return Err(Error::Config(
                ConfigError::AbsolutePathRequired("logging.file.directory".to_string()).to_string(),
            ));
        }

        Ok(())
    }

    /// Get example configuration (as a string)
    pub fn example() -> &'static str {
        r#"# Cellbook Configuration Example

# Model transport
[provider]
# Provider type: "openai" or "mock"
provider = "openai"
api_key = "your-api-key-here"
model = "gpt-4o-mini"
# Base URL (optional, any OpenAI-compatible endpoint)
# base_url = "https://api.openai.com/v1"

# For offline use:
# [provider]
# provider = "mock"
# responses_file = "mock_responses.toml"

[notebook]
# temperature = 0.7
# max_tokens = 4096
# "reject" fails a run issued while another is in flight, "queue" waits for it
busy_policy = "reject"

[logging]
level = "warn"
# "pretty", "json" or "compact"
format = "pretty"

[logging.file]
enabled = false
# directory = "/absolute/path/to/logs"

[logging.privacy]
# How cell text and model output appear in logs: "none", "truncate" or "full"
log_content = "truncate"
truncate_length = 200
"#
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            provider: ProviderConfig::Mock { responses_file: None },
            notebook: NotebookConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

/// Configuration-specific errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Invalid busy policy
    #[error("invalid busy policy: {0}")]
    InvalidBusyPolicy(String),

    /// Required field missing or blank
    #[error("missing field: {0}")]
    MissingField(String),

    /// Value outside its accepted range
    #[error("value out of range: {0}")]
    OutOfRange(String),

    /// Absolute path required
    #[error("absolute path required: {0}")]
    AbsolutePathRequired(String),

    /// TOML parse error
    #[error("TOML parse error: {0}")]
    TomlParse(String),
}

impl From<toml::de::Error> for ConfigError {
    fn from(err: toml::de::Error) -> Self {
        ConfigError::TomlParse(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::str::FromStr;

    #[test]
    fn test_busy_policy_values() {
        assert_eq!(BusyPolicy::Reject.as_str(), "reject");
        assert_eq!(BusyPolicy::Queue.as_str(), "queue");
        assert_eq!(BusyPolicy::default(), BusyPolicy::Reject);
    }

    #[test]
    fn test_busy_policy_from_str() {
        assert_eq!(BusyPolicy::from_str("REJECT").unwrap(), BusyPolicy::Reject);
        assert_eq!(BusyPolicy::from_str("queue").unwrap(), BusyPolicy::Queue);
        assert!(BusyPolicy::from_str("drop").is_err());
    }

    #[test]
    fn test_config_from_toml_str_openai() {
        let toml = r#"
[provider]
provider = "openai"
api_key = "test-key"
model = "gpt-4o-mini"

[notebook]
temperature = 0.2
max_tokens = 1024
busy_policy = "queue"
"#;

        let config = Config::from_toml_str(toml).unwrap();
        match &config.provider {
            ProviderConfig::OpenAi { api_key, model, base_url } => {
                assert_eq!(api_key, "test-key");
                assert_eq!(model, "gpt-4o-mini");
                assert_eq!(base_url, &default_openai_base_url());
            }
            _ => panic!("Expected OpenAI provider"),
        }
        assert_eq!(config.notebook.temperature, Some(0.2));
        assert_eq!(config.notebook.max_tokens, Some(1024));
        assert_eq!(config.notebook.busy_policy, BusyPolicy::Queue);
        assert_eq!(config.logging, LoggingConfig::default());
    }

    #[test]
    fn test_config_from_toml_str_mock() {
        let toml = r#"
[provider]
provider = "mock"
responses_file = "responses.toml"
"#;

        let config = Config::from_toml_str(toml).unwrap();
        assert_eq!(
            config.provider,
            ProviderConfig::Mock { responses_file: Some(PathBuf::from("responses.toml")) }
        );
        assert_eq!(config.provider.name(), "mock");
        assert_eq!(config.notebook.busy_policy, BusyPolicy::Reject);
    }

    #[test]
    fn test_config_logging_section() {
        let toml = r#"
[provider]
provider = "mock"

[logging]
level = "debug"
format = "json"

[logging.file]
enabled = true
directory = "/var/log/cellbook"

[logging.privacy]
log_content = "full"
"#;

        let config = Config::from_toml_str(toml).unwrap();
        assert_eq!(config.logging.level, "debug");
        assert_eq!(config.logging.format, "json");
        assert!(config.logging.file.enabled);
        assert_eq!(config.logging.file.directory, Some(PathBuf::from("/var/log/cellbook")));
        assert_eq!(config.logging.privacy.log_content, "full");
        assert_eq!(config.logging.privacy.truncate_length, 200);
    }

    #[test]
    fn test_config_rejects_blank_model() {
        let toml = r#"
[provider]
provider = "openai"
api_key = "k"
model = "  "
"#;
        let err = Config::from_toml_str(toml).unwrap_err();
        assert!(err.to_string().contains("missing field: provider.model"));
    }

    #[test]
    fn test_config_rejects_temperature_out_of_range() {
        let toml = r#"
[provider]
provider = "mock"

[notebook]
temperature = 3.5
"#;
        let err = Config::from_toml_str(toml).unwrap_err();
        assert!(err.to_string().contains("value out of range"));
    }

    #[test]
    fn test_config_rejects_relative_log_directory() {
        let toml = r#"
[provider]
provider = "mock"

[logging.file]
enabled = true
directory = "logs"
"#;
        let err = Config::from_toml_str(toml).unwrap_err();
        assert!(err.to_string().contains("absolute path required"));
    }

    #[test]
    fn test_config_rejects_unknown_fields() {
        let toml = r#"
[provider]
provider = "mock"

[notebook]
parallel = true
"#;
        let err = Config::from_toml_str(toml).unwrap_err();
        assert!(err.to_string().contains("TOML parse error"));
    }

    #[test]
    fn test_config_rejects_unknown_provider() {
        let toml = r#"
[provider]
provider = "carrier-pigeon"
"#;
        assert!(Config::from_toml_str(toml).is_err());
    }

    #[test]
    fn test_example_config_parses() {
        let config = Config::from_toml_str(Config::example()).unwrap();
        assert_eq!(config.provider.name(), "openai");
        assert_eq!(config.notebook.busy_policy, BusyPolicy::Reject);
    }

    #[test]
    fn test_config_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[provider]\nprovider = \"mock\"").unwrap();

        let config = Config::from_file(file.path()).unwrap();
        assert_eq!(config.provider, ProviderConfig::Mock { responses_file: None });
    }

    #[test]
    fn test_config_from_missing_file() {
        let err = Config::from_file(Path::new("/nonexistent/cellbook.toml")).unwrap_err();
        assert!(matches!(err, Error::Io(_)));
    }

    #[test]
    fn test_config_default() {
        let config = Config::default();
        assert_eq!(config.provider.name(), "mock");
        assert_eq!(config.logging.level, "warn");
    }

    #[test]
    fn test_config_error_display() {
        let err = ConfigError::InvalidBusyPolicy("drop".to_string());
        assert_eq!(err.to_string(), "invalid busy policy: drop");

        let err = ConfigError::AbsolutePathRequired("logging.file.directory".to_string());
        assert_eq!(err.to_string(), "absolute path required: logging.file.directory");
    }
}
