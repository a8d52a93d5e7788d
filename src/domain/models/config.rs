use serde::{Deserialize, Serialize};

/// Main configuration structure for Factotum
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct Config {
    /// Database configuration
    #[serde(default)]
    pub database: DatabaseConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Reasoning oracle configuration
    #[serde(default)]
    pub oracle: OracleConfig,

    /// Orchestration engine tunables
    #[serde(default)]
    pub engine: EngineConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database: DatabaseConfig::default(),
            logging: LoggingConfig::default(),
            oracle: OracleConfig::default(),
            engine: EngineConfig::default(),
        }
    }
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct DatabaseConfig {
    /// Path to `SQLite` database file
    #[serde(default = "default_database_path")]
    pub path: String,

    /// Maximum number of database connections in pool
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_database_path() -> String {
    ".factotum/factotum.db".to_string()
}

const fn default_max_connections() -> u32 {
    5
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_database_path(),
            max_connections: default_max_connections(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format: json or pretty
    #[serde(default = "default_log_format")]
    pub format: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

/// Reasoning oracle configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct OracleConfig {
    /// API base URL
    #[serde(default = "default_oracle_base_url")]
    pub base_url: String,

    /// Model to use
    #[serde(default = "default_oracle_model")]
    pub model: String,

    /// Max tokens per completion
    #[serde(default = "default_oracle_max_tokens")]
    pub max_tokens: u32,

    /// Request timeout in seconds
    #[serde(default = "default_oracle_timeout_secs")]
    pub timeout_secs: u64,

    /// API key; falls back to the ANTHROPIC_API_KEY environment variable
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
}

fn default_oracle_base_url() -> String {
    "https://api.anthropic.com".to_string()
}

fn default_oracle_model() -> String {
    "claude-sonnet-4-5".to_string()
}

const fn default_oracle_max_tokens() -> u32 {
    2048
}

const fn default_oracle_timeout_secs() -> u64 {
    120
}

impl Default for OracleConfig {
    fn default() -> Self {
        Self {
            base_url: default_oracle_base_url(),
            model: default_oracle_model(),
            max_tokens: default_oracle_max_tokens(),
            timeout_secs: default_oracle_timeout_secs(),
            api_key: None,
        }
    }
}

/// Orchestration engine tunables
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct EngineConfig {
    /// Default retry budget for new tasks
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Window for the recency matching fallback, in minutes
    #[serde(default = "default_recency_window_minutes")]
    pub recency_window_minutes: i64,

    /// Maximum steps accepted from one breakdown
    #[serde(default = "default_max_plan_steps")]
    pub max_plan_steps: usize,
}

const fn default_max_retries() -> u32 {
    3
}

const fn default_recency_window_minutes() -> i64 {
    120
}

const fn default_max_plan_steps() -> usize {
    20
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            recency_window_minutes: default_recency_window_minutes(),
            max_plan_steps: default_max_plan_steps(),
        }
    }
}
