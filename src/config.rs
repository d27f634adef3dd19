//! Configuration types for Tapedeck

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::{Result, TapedeckError};

/// Default location of fixture files, relative to the crate under test
pub const DEFAULT_FIXTURES_DIR: &str = "testdata/fixtures";

/// Default environment variable that forces replay
pub const DEFAULT_REPLAY_ONLY_ENV: &str = "CI";

/// Recorder operating mode
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    /// Always go live and rewrite the fixture
    Record,
    /// Serve from the fixture only; no live traffic
    Replay,
    /// Replay when the fixture exists, otherwise record it
    #[default]
    RecordOnce,
    /// Go live and record nothing
    Passthrough,
}

impl Mode {
    /// Check if mode is Record
    #[must_use]
    pub fn is_record(&self) -> bool {
        matches!(self, Mode::Record)
    }

    /// Check if mode is Replay
    #[must_use]
    pub fn is_replay(&self) -> bool {
        matches!(self, Mode::Replay)
    }
}

/// Main configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Configured mode, before the forced-replay override
    #[serde(default)]
    pub mode: Mode,
    /// Directory for storing/loading fixtures
    #[serde(default = "default_fixtures_dir")]
    pub fixtures_dir: PathBuf,
    /// Environment variable that forces replay when truthy
    #[serde(default = "default_replay_only_env")]
    pub replay_only_env: String,
    /// Redaction configuration
    #[serde(default)]
    pub redaction: RedactionConfig,
    /// Resource limits
    #[serde(default)]
    pub limits: LimitsConfig,
}

fn default_fixtures_dir() -> PathBuf {
    PathBuf::from(DEFAULT_FIXTURES_DIR)
}

fn default_replay_only_env() -> String {
    DEFAULT_REPLAY_ONLY_ENV.to_string()
}

/// Redaction configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedactionConfig {
    /// Headers removed from stored interactions (case-insensitive)
    #[serde(default = "default_redacted_headers")]
    pub headers: Vec<String>,
    /// Literal secrets to redact
    #[serde(default)]
    pub secrets: Vec<String>,
    /// Regex patterns for redaction
    #[serde(default)]
    pub regex_patterns: Vec<String>,
}

fn default_redacted_headers() -> Vec<String> {
    vec!["X-FilesAPI-Key".to_string(), "Authorization".to_string()]
}

impl Default for RedactionConfig {
    fn default() -> Self {
        Self {
            headers: default_redacted_headers(),
            secrets: Vec::new(),
            regex_patterns: Vec::new(),
        }
    }
}

/// Resource limits
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LimitsConfig {
    /// Maximum request body size in bytes
    pub max_request_size: usize,
    /// Maximum response body size in bytes
    pub max_response_size: usize,
    /// Maximum headers per request/response
    pub max_headers: usize,
    /// Maximum interactions per fixture
    pub max_interactions: usize,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_request_size: 16 * 1024 * 1024,   // 16 MB
            max_response_size: 256 * 1024 * 1024, // 256 MB
            max_headers: 128,
            max_interactions: 65_536,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            mode: Mode::default(),
            fixtures_dir: default_fixtures_dir(),
            replay_only_env: default_replay_only_env(),
            redaction: RedactionConfig::default(),
            limits: LimitsConfig::default(),
        }
    }
}

impl Config {
    /// Default configuration rooted at a fixtures directory
    #[must_use]
    pub fn with_fixtures_dir(fixtures_dir: impl Into<PathBuf>) -> Self {
        Self {
            fixtures_dir: fixtures_dir.into(),
            ..Self::default()
        }
    }

    /// Load configuration from TOML file
    ///
    /// # Errors
    ///
    /// Returns error if file cannot be read or parsed
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| TapedeckError::ConfigError(format!("Failed to read config file: {e}")))?;

        let config: Self = toml::from_str(&content)
            .map_err(|e| TapedeckError::ConfigError(format!("Failed to parse config: {e}")))?;

        config.validate()?;
        Ok(config)
    }

    /// Validate configuration
    ///
    /// # Errors
    ///
    /// Returns error if configuration is invalid
    pub fn validate(&self) -> Result<()> {
        if self.fixtures_dir.as_os_str().is_empty() {
            return Err(TapedeckError::ConfigError(
                "fixtures_dir cannot be empty".to_string(),
            ));
        }

        if self.replay_only_env.is_empty() {
            return Err(TapedeckError::ConfigError(
                "replay_only_env cannot be empty".to_string(),
            ));
        }

        for (i, header) in self.redaction.headers.iter().enumerate() {
            if header.trim().is_empty() {
                return Err(TapedeckError::ConfigError(format!(
                    "Redacted header {i}: name cannot be empty"
                )));
            }
        }

        for pattern in &self.redaction.regex_patterns {
            regex::Regex::new(pattern).map_err(|e| {
                TapedeckError::ConfigError(format!("Invalid redaction pattern '{pattern}': {e}"))
            })?;
        }

        let limits = [
            ("max_request_size", self.limits.max_request_size),
            ("max_response_size", self.limits.max_response_size),
            ("max_headers", self.limits.max_headers),
            ("max_interactions", self.limits.max_interactions),
        ];
        for (name, value) in limits {
            if value == 0 {
                return Err(TapedeckError::ConfigError(format!("{name} must be > 0")));
            }
        }

        Ok(())
    }

    /// Check whether the forced-replay environment flag is set
    #[must_use]
    pub fn replay_forced(&self) -> bool {
        std::env::var(&self.replay_only_env)
            .map(|value| is_truthy(&value))
            .unwrap_or(false)
    }

    /// Resolve the effective mode for one fixture
    ///
    /// The forced-replay flag wins over the configured mode. `RecordOnce`
    /// becomes `Replay` or `Record` depending on whether the fixture exists.
    #[must_use]
    pub fn resolve_mode(&self, fixture_exists: bool) -> Mode {
        if self.replay_forced() {
            return Mode::Replay;
        }

        match self.mode {
            Mode::RecordOnce if fixture_exists => Mode::Replay,
            Mode::RecordOnce => Mode::Record,
            mode => mode,
        }
    }
}

/// Interpret a boolean-ish environment value
fn is_truthy(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_config_parse() {
        let config_toml = r#"
            mode = "record"
            fixtures_dir = "/tmp/fixtures"

            [redaction]
            secrets = ["abc"]
        "#;

        let config: Config = toml::from_str(config_toml).unwrap();
        assert_eq!(config.mode, Mode::Record);
        assert_eq!(config.fixtures_dir, PathBuf::from("/tmp/fixtures"));
        assert_eq!(config.replay_only_env, "CI");
        assert_eq!(config.redaction.headers, default_redacted_headers());
        assert_eq!(config.limits.max_headers, 128);
    }

    #[test]
    fn test_config_defaults() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.mode, Mode::RecordOnce);
        assert_eq!(config.fixtures_dir, PathBuf::from(DEFAULT_FIXTURES_DIR));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_from_file() {
        let mut file = NamedTempFile::new().unwrap();
        let config_toml = r#"
            mode = "replay_once"
        "#;
        file.write_all(config_toml.as_bytes()).unwrap();
        assert!(Config::from_file(file.path()).is_err());

        let mut file = NamedTempFile::new().unwrap();
        let config_toml = r#"
            mode = "passthrough"
            replay_only_env = "TAPEDECK_REPLAY"

            [limits]
            max_interactions = 10
        "#;
        file.write_all(config_toml.as_bytes()).unwrap();

        let config = Config::from_file(file.path()).unwrap();
        assert_eq!(config.mode, Mode::Passthrough);
        assert_eq!(config.limits.max_interactions, 10);
        assert_eq!(config.limits.max_request_size, 16 * 1024 * 1024);
    }

    #[test]
    fn test_invalid_limits() {
        let mut config = Config::default();
        config.limits.max_headers = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_invalid_regex() {
        let mut config = Config::default();
        config.redaction.regex_patterns.push("[".to_string());
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_resolve_mode() {
        let mut config = Config::default();
        config.replay_only_env = "TAPEDECK_CONFIG_TEST_UNSET_FLAG".to_string();

        assert_eq!(config.resolve_mode(true), Mode::Replay);
        assert_eq!(config.resolve_mode(false), Mode::Record);

        config.mode = Mode::Record;
        assert_eq!(config.resolve_mode(true), Mode::Record);

        config.mode = Mode::Passthrough;
        assert_eq!(config.resolve_mode(false), Mode::Passthrough);
    }

    #[test]
    fn test_forced_replay() {
        let mut config = Config::default();
        config.replay_only_env = "TAPEDECK_CONFIG_TEST_FORCED_FLAG".to_string();
        config.mode = Mode::Record;

        std::env::set_var(&config.replay_only_env, "true");
        assert!(config.replay_forced());
        assert_eq!(config.resolve_mode(false), Mode::Replay);

        std::env::set_var(&config.replay_only_env, "0");
        assert!(!config.replay_forced());
        assert_eq!(config.resolve_mode(false), Mode::Record);

        std::env::remove_var(&config.replay_only_env);
    }

    #[test]
    fn test_is_truthy() {
        assert!(is_truthy("1"));
        assert!(is_truthy("TRUE"));
        assert!(is_truthy(" yes "));
        assert!(!is_truthy(""));
        assert!(!is_truthy("false"));
        assert!(!is_truthy("0"));
    }
}
