//! Configuration loading, validation, and management for Madoguchi.
//!
//! Loads configuration from `~/.madoguchi/config.toml` with environment
//! variable overrides. Credentials are checked separately by
//! [`AppConfig::validate_credentials`] so that offline commands (`rank`,
//! `doctor`) work without secrets while `serve` refuses to start without them.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// The root configuration structure.
///
/// Maps directly to `~/.madoguchi/config.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// External model settings
    #[serde(default)]
    pub model: ModelConfig,

    /// LINE Messaging API credentials
    #[serde(default)]
    pub line: LineConfig,

    /// HTTP gateway settings
    #[serde(default)]
    pub gateway: GatewayConfig,

    /// Service catalog source
    #[serde(default)]
    pub catalog: CatalogConfig,

    /// Prompting and conversation behavior
    #[serde(default)]
    pub dialogue: DialogueConfig,

    /// Turn journal (logging sink)
    #[serde(default)]
    pub journal: JournalConfig,
}

/// Redact a secret for Debug output.
fn redact(s: &Option<String>) -> &'static str {
    match s {
        Some(_) => "[REDACTED]",
        None => "None",
    }
}

#[derive(Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Model name
    #[serde(default = "default_model")]
    pub name: String,

    /// API key (usually from `GEMINI_API_KEY`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Override the API base URL
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_url: Option<String>,

    #[serde(default = "default_temperature")]
    pub temperature: f32,

    #[serde(default = "default_max_output_tokens")]
    pub max_output_tokens: u32,

    /// Per-attempt deadline for one model call
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Retries after the first attempt, for transient failures only
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Initial backoff; doubles per retry
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,

    /// Deadline for a whole model call including retries. Keep it under
    /// the LINE reply-token lifetime so the degraded reply still lands.
    #[serde(default = "default_turn_budget_secs")]
    pub turn_budget_secs: u64,
}

fn default_model() -> String {
    "gemini-1.5-flash".into()
}
fn default_temperature() -> f32 {
    0.7
}
fn default_max_output_tokens() -> u32 {
    1024
}
fn default_timeout_secs() -> u64 {
    30
}
fn default_max_retries() -> u32 {
    2
}
fn default_retry_backoff_ms() -> u64 {
    500
}
fn default_turn_budget_secs() -> u64 {
    45
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            name: default_model(),
            api_key: None,
            api_url: None,
            temperature: default_temperature(),
            max_output_tokens: default_max_output_tokens(),
            timeout_secs: default_timeout_secs(),
            max_retries: default_max_retries(),
            retry_backoff_ms: default_retry_backoff_ms(),
            turn_budget_secs: default_turn_budget_secs(),
        }
    }
}

impl std::fmt::Debug for ModelConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelConfig")
            .field("name", &self.name)
            .field("api_key", &redact(&self.api_key))
            .field("api_url", &self.api_url)
            .field("temperature", &self.temperature)
            .field("max_output_tokens", &self.max_output_tokens)
            .field("timeout_secs", &self.timeout_secs)
            .field("max_retries", &self.max_retries)
            .field("retry_backoff_ms", &self.retry_backoff_ms)
            .field("turn_budget_secs", &self.turn_budget_secs)
            .finish()
    }
}

#[derive(Clone, Default, Serialize, Deserialize)]
pub struct LineConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel_secret: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel_access_token: Option<String>,

    /// Override the Messaging API base URL
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_url: Option<String>,
}

impl std::fmt::Debug for LineConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LineConfig")
            .field("channel_secret", &redact(&self.channel_secret))
            .field("channel_access_token", &redact(&self.channel_access_token))
            .field("api_url", &self.api_url)
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_body_limit")]
    pub body_limit_bytes: usize,
}

fn default_port() -> u16 {
    8080
}
fn default_host() -> String {
    "127.0.0.1".into()
}
fn default_body_limit() -> usize {
    1024 * 1024
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            host: default_host(),
            body_limit_bytes: default_body_limit(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogConfig {
    /// JSON file holding the service records
    #[serde(default = "default_catalog_path")]
    pub path: PathBuf,

    /// Maximum ranked matches handed to the assembler
    #[serde(default = "default_catalog_limit")]
    pub limit: usize,
}

fn default_catalog_path() -> PathBuf {
    PathBuf::from("services.json")
}
fn default_catalog_limit() -> usize {
    3
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            path: default_catalog_path(),
            limit: default_catalog_limit(),
        }
    }
}

/// How the assembled instruction orders the model's tasks.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PromptMode {
    /// General answer first, then optionally a matched service
    #[default]
    GeneralFirst,
    /// Classify the intent among fixed categories, then act on it
    ClassifyIntent,
    /// Introduce matched services first, brief general advice after
    ServiceFocused,
}

impl std::fmt::Display for PromptMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::GeneralFirst => "general_first",
            Self::ClassifyIntent => "classify_intent",
            Self::ServiceFocused => "service_focused",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DialogueConfig {
    #[serde(default)]
    pub mode: PromptMode,

    /// Length ceiling stated to the model, in characters
    #[serde(default = "default_max_reply_chars")]
    pub max_reply_chars: usize,

    /// Replace the built-in persona entirely
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub persona: Option<String>,

    /// Messages that reset the sender's conversation
    #[serde(default = "default_reset_commands")]
    pub reset_commands: Vec<String>,

    /// Where clinically sensitive questions are referred
    #[serde(default = "default_help_line")]
    pub help_line: String,
}

fn default_max_reply_chars() -> usize {
    400
}
fn default_reset_commands() -> Vec<String> {
    vec!["リセット".into(), "reset".into()]
}
fn default_help_line() -> String {
    "かかりつけの小児科医、または小児救急電話相談（#8000）".into()
}

impl Default for DialogueConfig {
    fn default() -> Self {
        Self {
            mode: PromptMode::default(),
            max_reply_chars: default_max_reply_chars(),
            persona: None,
            reset_commands: default_reset_commands(),
            help_line: default_help_line(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JournalConfig {
    /// "none", "file", or "sqlite"
    #[serde(default = "default_journal_backend")]
    pub backend: String,

    /// Backend location; defaults to `~/.madoguchi/journal.{jsonl,db}`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
}

fn default_journal_backend() -> String {
    "none".into()
}

impl Default for JournalConfig {
    fn default() -> Self {
        Self {
            backend: default_journal_backend(),
            path: None,
        }
    }
}

const JOURNAL_BACKENDS: &[&str] = &["none", "file", "sqlite"];

impl AppConfig {
    /// Load configuration from the default path (~/.madoguchi/config.toml),
    /// then apply environment overrides:
    /// - `GEMINI_API_KEY`
    /// - `LINE_CHANNEL_SECRET`
    /// - `LINE_CHANNEL_ACCESS_TOKEN`
    /// - `MADOGUCHI_MODEL`
    /// - `MADOGUCHI_CATALOG`
    /// - `PORT`
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_dir().join("config.toml");
        Self::load_with_env(&config_path)
    }

    /// Load from a specific file, then apply environment overrides.
    pub fn load_with_env(path: &Path) -> Result<Self, ConfigError> {
        let mut config = Self::load_from(path)?;
        config.apply_overrides(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!("No config file found at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Apply overrides from an environment lookup. Environment wins over file.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(key) = non_empty("GEMINI_API_KEY") {
            self.model.api_key = Some(key);
        }
        if let Some(secret) = non_empty("LINE_CHANNEL_SECRET") {
            self.line.channel_secret = Some(secret);
        }
        if let Some(token) = non_empty("LINE_CHANNEL_ACCESS_TOKEN") {
            self.line.channel_access_token = Some(token);
        }
        if let Some(model) = non_empty("MADOGUCHI_MODEL") {
            self.model.name = model;
        }
        if let Some(path) = non_empty("MADOGUCHI_CATALOG") {
            self.catalog.path = PathBuf::from(path);
        }
        if let Some(port) = non_empty("PORT") {
            match port.parse() {
                Ok(p) => self.gateway.port = p,
                Err(_) => tracing::warn!(value = %port, "Ignoring invalid PORT"),
            }
        }
    }

    /// Load `KEY=value` pairs from a `.env` file into the process
    /// environment; variables that are already set win. `None` searches the
    /// current directory and its parents. Returns the file that was loaded.
    pub fn load_env_file(path: Option<&Path>) -> Option<PathBuf> {
        let result = match path {
            Some(path) => dotenvy::from_path(path).map(|()| path.to_path_buf()),
            None => dotenvy::dotenv(),
        };
        match result {
            Ok(path) => Some(path),
            Err(e) if e.not_found() => None,
            Err(e) => {
                tracing::warn!(error = %e, "Ignoring unreadable .env file");
                None
            }
        }
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".madoguchi")
    }

    /// Default journal location for the configured backend.
    pub fn journal_path(&self) -> PathBuf {
        if let Some(path) = &self.journal.path {
            return path.clone();
        }
        let file = match self.journal.backend.as_str() {
            "sqlite" => "journal.db",
            _ => "journal.jsonl",
        };
        Self::config_dir().join(file)
    }

    /// Validate value ranges.
    fn validate(&self) -> Result<(), ConfigError> {
        if self.model.temperature < 0.0 || self.model.temperature > 2.0 {
            return Err(ConfigError::ValidationError(
                "model.temperature must be between 0.0 and 2.0".into(),
            ));
        }

        if self.model.timeout_secs == 0 {
            return Err(ConfigError::ValidationError(
                "model.timeout_secs must be > 0".into(),
            ));
        }

        if self.model.turn_budget_secs == 0 {
            return Err(ConfigError::ValidationError(
                "model.turn_budget_secs must be > 0".into(),
            ));
        }

        if self.catalog.limit == 0 {
            return Err(ConfigError::ValidationError(
                "catalog.limit must be > 0".into(),
            ));
        }

        if !JOURNAL_BACKENDS.contains(&self.journal.backend.as_str()) {
            return Err(ConfigError::ValidationError(format!(
                "journal.backend must be one of {JOURNAL_BACKENDS:?}, got '{}'",
                self.journal.backend
            )));
        }

        Ok(())
    }

    /// Check that every secret the webhook server needs is present.
    pub fn validate_credentials(&self) -> Result<(), ConfigError> {
        let missing: Vec<&'static str> = [
            ("GEMINI_API_KEY", &self.model.api_key),
            ("LINE_CHANNEL_SECRET", &self.line.channel_secret),
            ("LINE_CHANNEL_ACCESS_TOKEN", &self.line.channel_access_token),
        ]
        .into_iter()
        .filter(|(_, value)| value.as_deref().is_none_or(|v| v.trim().is_empty()))
        .map(|(name, _)| name)
        .collect();

        if missing.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::MissingCredential(missing.join(", ")))
        }
    }
}

/// Get the user's home directory.
fn dirs_home() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var("USERPROFILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("C:\\Users\\Default"))
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/tmp"))
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {reason}")]
    ReadError { path: PathBuf, reason: String },

    #[error("Failed to parse config file at {path}: {reason}")]
    ParseError { path: PathBuf, reason: String },

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),

    #[error("Missing required credentials: {0}")]
    MissingCredential(String),
}
