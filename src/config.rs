//! Layered configuration for the support desk.
//!
//! Values are resolved in this order, later layers winning:
//! built-in defaults → `supportdesk.toml` → environment → CLI flags.
//!
//! API keys only ever come from the environment (or a `.env` file loaded
//! at startup) and are never written back to disk.
//!
//! # Configuration File Format
//!
//! ```toml
//! [database]
//! path = "data/crm_ecommerce.db"
//!
//! [server]
//! host = "127.0.0.1"
//! port = 5000
//! cors = false
//! processing_delay_min_secs = 0
//! processing_delay_max_secs = 0
//!
//! [anthropic]
//! model = "claude-sonnet-4-20250514"
//! base_url = "https://api.anthropic.com"
//! timeout_secs = 60
//!
//! [openai]
//! model = "gpt-3.5-turbo"
//! base_url = "https://api.openai.com/v1"
//!
//! [logging]
//! level = "info"
//! format = "compact"
//! ```

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Config file looked up in the working directory when `--config` is absent.
pub const DEFAULT_CONFIG_FILE: &str = "supportdesk.toml";

/// Output format of the tracing subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Compact,
    Json,
}

impl std::fmt::Display for LogFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LogFormat::Compact => write!(f, "compact"),
            LogFormat::Json => write!(f, "json"),
        }
    }
}

impl std::str::FromStr for LogFormat {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "compact" | "text" | "pretty" => Ok(LogFormat::Compact),
            "json" => Ok(LogFormat::Json),
            _ => anyhow::bail!("Invalid log format '{}'. Valid values: compact, json", s),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseSection {
    #[serde(default = "default_db_path")]
    pub path: PathBuf,
}

fn default_db_path() -> PathBuf {
    PathBuf::from("data/crm_ecommerce.db")
}

impl Default for DatabaseSection {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSection {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Lower bound of the simulated processing delay, in seconds.
    #[serde(default)]
    pub processing_delay_min_secs: u64,
    /// Upper bound of the simulated processing delay, in seconds.
    #[serde(default)]
    pub processing_delay_max_secs: u64,
    /// Add a permissive CORS layer.
    #[serde(default)]
    pub cors: bool,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    5000
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            processing_delay_min_secs: 0,
            processing_delay_max_secs: 0,
            cors: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnthropicSection {
    #[serde(default = "default_anthropic_model")]
    pub model: String,
    #[serde(default = "default_anthropic_base_url")]
    pub base_url: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// From `ANTHROPIC_API_KEY` only.
    #[serde(skip)]
    pub api_key: Option<String>,
}

fn default_anthropic_model() -> String {
    "claude-sonnet-4-20250514".to_string()
}

fn default_anthropic_base_url() -> String {
    "https://api.anthropic.com".to_string()
}

fn default_timeout_secs() -> u64 {
    60
}

impl Default for AnthropicSection {
    fn default() -> Self {
        Self {
            model: default_anthropic_model(),
            base_url: default_anthropic_base_url(),
            timeout_secs: default_timeout_secs(),
            api_key: None,
        }
    }
}

impl AnthropicSection {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenAiSection {
    #[serde(default = "default_openai_model")]
    pub model: String,
    #[serde(default = "default_openai_base_url")]
    pub base_url: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// From `OPENAI_API_KEY` only.
    #[serde(skip)]
    pub api_key: Option<String>,
}

fn default_openai_model() -> String {
    "gpt-3.5-turbo".to_string()
}

fn default_openai_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

impl Default for OpenAiSection {
    fn default() -> Self {
        Self {
            model: default_openai_model(),
            base_url: default_openai_base_url(),
            timeout_secs: default_timeout_secs(),
            api_key: None,
        }
    }
}

impl OpenAiSection {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingSection {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub format: LogFormat,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
        }
    }
}

/// Complete configuration (supportdesk.toml plus environment).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SupportConfig {
    #[serde(default)]
    pub database: DatabaseSection,
    #[serde(default)]
    pub server: ServerSection,
    #[serde(default)]
    pub anthropic: AnthropicSection,
    #[serde(default)]
    pub openai: OpenAiSection,
    #[serde(default)]
    pub logging: LoggingSection,
}

impl SupportConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        Self::parse(&content)
    }

    /// Parse configuration from a TOML string.
    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).context("Failed to parse supportdesk.toml")
    }

    /// Load `path` if it exists, otherwise return defaults.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Save configuration to a TOML file. API keys are never written.
    pub fn save(&self, path: &Path) -> Result<()> {
        let content =
            toml::to_string_pretty(self).context("Failed to serialize supportdesk.toml")?;
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("Failed to create {}", parent.display()))?;
            }
        }
        std::fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;
        Ok(())
    }

    /// Resolve file then process environment.
    pub fn resolve(config_path: Option<&Path>) -> Result<Self> {
        let path = config_path
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE));
        let mut config = match config_path {
            // An explicit --config must exist.
            Some(_) => Self::load(&path)?,
            None => Self::load_or_default(&path)?,
        };
        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Overlay environment variables, read through `lookup`.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(path) = non_empty("SUPPORTDESK_DB_PATH") {
            self.database.path = PathBuf::from(path);
        }
        if let Some(host) = non_empty("SUPPORTDESK_HOST") {
            self.server.host = host;
        }
        if let Some(port) = non_empty("SUPPORTDESK_PORT") {
            match port.trim().parse::<u16>() {
                Ok(p) => self.server.port = p,
                Err(_) => tracing::warn!(value = %port, "Ignoring invalid SUPPORTDESK_PORT"),
            }
        }
        if let Some(model) = non_empty("ANTHROPIC_MODEL") {
            self.anthropic.model = model;
        }
        if let Some(key) = non_empty("ANTHROPIC_API_KEY") {
            self.anthropic.api_key = Some(key.trim().to_string());
        }
        if let Some(key) = non_empty("OPENAI_API_KEY") {
            self.openai.api_key = Some(key.trim().to_string());
        }
    }

    /// Apply CLI flag overrides.
    pub fn with_cli_overrides(
        mut self,
        db_path: Option<PathBuf>,
        log_level: Option<String>,
        log_format: Option<LogFormat>,
    ) -> Self {
        if let Some(path) = db_path {
            self.database.path = path;
        }
        if let Some(level) = log_level {
            self.logging.level = level;
        }
        if let Some(format) = log_format {
            self.logging.format = format;
        }
        self
    }

    /// Check for invalid combinations. Returns one message per problem.
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();
        if self.server.port == 0 {
            errors.push("server.port must be greater than 0".to_string());
        }
        if self.server.processing_delay_min_secs > self.server.processing_delay_max_secs {
            errors.push(format!(
                "server.processing_delay_min_secs ({}) exceeds processing_delay_max_secs ({})",
                self.server.processing_delay_min_secs, self.server.processing_delay_max_secs
            ));
        }
        if self.anthropic.timeout_secs == 0 {
            errors.push("anthropic.timeout_secs must be greater than 0".to_string());
        }
        if self.database.path.as_os_str().is_empty() {
            errors.push("database.path must not be empty".to_string());
        }
        errors
    }

    /// Effective configuration as TOML, followed by masked key status.
    pub fn render_masked(&self) -> Result<String> {
        let mut out =
            toml::to_string_pretty(self).context("Failed to serialize configuration")?;
        out.push_str("\n# secrets (environment)\n");
        out.push_str(&format!(
            "# ANTHROPIC_API_KEY = {}\n",
            mask_secret(self.anthropic.api_key.as_deref())
        ));
        out.push_str(&format!(
            "# OPENAI_API_KEY = {}\n",
            mask_secret(self.openai.api_key.as_deref())
        ));
        Ok(out)
    }
}

/// Show at most the first four characters of a secret.
pub fn mask_secret(secret: Option<&str>) -> String {
    match secret {
        None => "(not set)".to_string(),
        Some(s) if s.chars().count() <= 8 => "****".to_string(),
        Some(s) => {
            let prefix: String = s.chars().take(4).collect();
            format!("{}****", prefix)
        }
    }
}
