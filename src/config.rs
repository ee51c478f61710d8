//! Configuration System
//!
//! Handles loading configuration from files and environment variables.
//! Supports TOML config files and `FIELDFORGE_*` environment variable overrides.

use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Main configuration structure
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub auth: AuthConfig,

    #[serde(default)]
    pub realtime: RealtimeConfig,

    #[serde(default)]
    pub hourglass: HourglassConfig,

    #[serde(default)]
    pub notifications: NotificationsConfig,

    #[serde(default)]
    pub narrator: NarratorConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// HTTP server configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default)]
    pub cors_origins: Vec<String>,

    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8090
}

fn default_max_body_bytes() -> usize {
    8 * 1024 * 1024 // base64 of a 5 MB receipt image plus fields
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            cors_origins: Vec::new(),
            max_body_bytes: default_max_body_bytes(),
        }
    }
}

impl ServerConfig {
    /// Get the socket address string
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Database location
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_data_dir")]
    pub data_dir: String,
}

fn default_data_dir() -> String {
    dirs::data_local_dir()
        .map(|p| p.join("fieldforge").to_string_lossy().to_string())
        .unwrap_or_else(|| "./fieldforge_data".to_string())
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
        }
    }
}

impl StorageConfig {
    /// Full path of the SQLite database file
    pub fn database_path(&self) -> PathBuf {
        PathBuf::from(&self.data_dir).join("fieldforge.db")
    }
}

/// Bearer token settings
#[derive(Debug, Clone, Deserialize)]
pub struct AuthConfig {
    #[serde(default = "default_jwt_secret")]
    pub jwt_secret: String,

    #[serde(default = "default_token_ttl")]
    pub token_ttl_secs: u64,
}

fn default_jwt_secret() -> String {
    "change-me-in-production".to_string()
}

fn default_token_ttl() -> u64 {
    24 * 3600
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            jwt_secret: default_jwt_secret(),
            token_ttl_secs: default_token_ttl(),
        }
    }
}

/// WebSocket fan-out settings
#[derive(Debug, Clone, Deserialize)]
pub struct RealtimeConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_realtime_ttl")]
    pub token_ttl_secs: u64,

    #[serde(default = "default_max_connections")]
    pub max_connections: usize,
}

fn default_true() -> bool {
    true
}

fn default_realtime_ttl() -> u64 {
    3600
}

fn default_max_connections() -> usize {
    1000
}

impl Default for RealtimeConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            token_ttl_secs: default_realtime_ttl(),
            max_connections: default_max_connections(),
        }
    }
}

/// Angry Lips response-window worker
#[derive(Debug, Clone, Deserialize)]
pub struct HourglassConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,

    #[serde(default = "default_warning_threshold")]
    pub warning_threshold_secs: i64,

    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    #[serde(default = "default_app_base_url")]
    pub app_base_url: String,
}

fn default_interval_secs() -> u64 {
    30
}

fn default_warning_threshold() -> i64 {
    60
}

fn default_batch_size() -> usize {
    50
}

fn default_app_base_url() -> String {
    "http://localhost:5173".to_string()
}

impl Default for HourglassConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_secs: default_interval_secs(),
            warning_threshold_secs: default_warning_threshold(),
            batch_size: default_batch_size(),
            app_base_url: default_app_base_url(),
        }
    }
}

/// Outbound notification transports
#[derive(Debug, Clone, Deserialize)]
pub struct NotificationsConfig {
    pub discord_webhook_url: Option<String>,

    /// Relay that delivers email and SMS payloads
    pub relay_webhook_url: Option<String>,

    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
}

fn default_request_timeout_ms() -> u64 {
    5000
}

impl Default for NotificationsConfig {
    fn default() -> Self {
        Self {
            discord_webhook_url: None,
            relay_webhook_url: None,
            request_timeout_ms: default_request_timeout_ms(),
        }
    }
}

/// AI co-host backend
#[derive(Debug, Clone, Deserialize)]
pub struct NarratorConfig {
    #[serde(default = "default_narrator_provider")]
    pub provider: String,

    #[serde(default = "default_narrator_url")]
    pub base_url: String,

    pub api_key: Option<String>,

    #[serde(default = "default_narrator_model")]
    pub model: String,

    #[serde(default = "default_narrator_timeout")]
    pub request_timeout_ms: u64,
}

fn default_narrator_provider() -> String {
    "local".to_string()
}

fn default_narrator_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_narrator_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_narrator_timeout() -> u64 {
    15_000
}

impl Default for NarratorConfig {
    fn default() -> Self {
        Self {
            provider: default_narrator_provider(),
            base_url: default_narrator_url(),
            api_key: None,
            model: default_narrator_model(),
            request_timeout_ms: default_narrator_timeout(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

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

impl Config {
    /// Load configuration from a file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.to_path_buf(),
            error: e.to_string(),
        })?;

        Self::parse(&content).map_err(|error| match error {
            ConfigError::Parse { error, .. } => ConfigError::Parse {
                path: path.to_path_buf(),
                error,
            },
            other => other,
        })
    }

    /// Parse configuration from TOML text
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(|e| ConfigError::Parse {
            path: PathBuf::new(),
            error: e.to_string(),
        })
    }

    /// Load configuration from environment variables only
    pub fn from_env() -> Self {
        let mut config = Config::default();
        config.apply_env_overrides();
        config
    }

    /// Load configuration with environment variable overrides
    pub fn load_with_env(path: &Path) -> Result<Self, ConfigError> {
        let mut config = Self::load(path)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Load from default locations or environment
    pub fn load_default() -> Self {
        let config_paths = [
            dirs::config_dir().map(|p| p.join("fieldforge").join("config.toml")),
            Some(PathBuf::from("/etc/fieldforge/config.toml")),
            Some(PathBuf::from("./config.toml")),
        ];

        for path in config_paths.iter().flatten() {
            if path.exists() {
                match Self::load_with_env(path) {
                    Ok(config) => {
                        tracing::info!("Loaded config from {:?}", path);
                        return config;
                    }
                    Err(e) => {
                        tracing::warn!("Failed to load config from {:?}: {}", path, e);
                    }
                }
            }
        }

        tracing::info!("Using default config with environment overrides");
        Self::from_env()
    }

    /// Reject settings the server cannot run with
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.auth.jwt_secret.trim().is_empty() {
            return Err(ConfigError::Invalid("auth.jwt_secret must not be empty".into()));
        }
        if self.hourglass.interval_secs == 0 {
            return Err(ConfigError::Invalid(
                "hourglass.interval_secs must be greater than zero".into(),
            ));
        }
        if self.hourglass.warning_threshold_secs <= 0 {
            return Err(ConfigError::Invalid(
                "hourglass.warning_threshold_secs must be greater than zero".into(),
            ));
        }
        Ok(())
    }

    /// Apply environment variable overrides to an existing config
    fn apply_env_overrides(&mut self) {
        if let Ok(data_dir) = std::env::var("FIELDFORGE_DATA_DIR") {
            self.storage.data_dir = data_dir;
        }

        if let Ok(host) = std::env::var("FIELDFORGE_HOST") {
            self.server.host = host;
        }
        if let Ok(port) = std::env::var("FIELDFORGE_PORT") {
            if let Ok(p) = port.parse() {
                self.server.port = p;
            }
        }

        if let Ok(secret) = std::env::var("FIELDFORGE_JWT_SECRET") {
            self.auth.jwt_secret = secret;
        }

        if let Ok(url) = std::env::var("FIELDFORGE_APP_BASE_URL") {
            self.hourglass.app_base_url = url;
        }

        if let Ok(url) = std::env::var("FIELDFORGE_DISCORD_WEBHOOK_URL") {
            self.notifications.discord_webhook_url = Some(url);
        }
        if let Ok(url) = std::env::var("FIELDFORGE_RELAY_WEBHOOK_URL") {
            self.notifications.relay_webhook_url = Some(url);
        }

        if let Ok(url) = std::env::var("FIELDFORGE_NARRATOR_URL") {
            self.narrator.base_url = url;
            self.narrator.provider = "openai".to_string();
        }
        if let Ok(key) = std::env::var("FIELDFORGE_NARRATOR_API_KEY") {
            self.narrator.api_key = Some(key);
        }

        if let Ok(level) = std::env::var("FIELDFORGE_LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Ok(format) = std::env::var("FIELDFORGE_LOG_FORMAT") {
            self.logging.format = format;
        }
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path:?}: {error}")]
    Io { path: PathBuf, error: String },

    #[error("Failed to parse config file {path:?}: {error}")]
    Parse { path: PathBuf, error: String },

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Generate a default config file content
pub fn generate_default_config() -> String {
    r#"# FieldForge Configuration
#
# Environment variables override these settings:
# - FIELDFORGE_DATA_DIR
# - FIELDFORGE_HOST / FIELDFORGE_PORT
# - FIELDFORGE_JWT_SECRET
# - FIELDFORGE_APP_BASE_URL
# - FIELDFORGE_DISCORD_WEBHOOK_URL / FIELDFORGE_RELAY_WEBHOOK_URL
# - FIELDFORGE_NARRATOR_URL / FIELDFORGE_NARRATOR_API_KEY
# - FIELDFORGE_LOG_LEVEL / FIELDFORGE_LOG_FORMAT

[server]
host = "0.0.0.0"
port = 8090

# Allowed CORS origins (empty = permissive)
cors_origins = []

# Maximum request body size in bytes
max_body_bytes = 8388608

[storage]
# Directory holding fieldforge.db
data_dir = "~/.local/share/fieldforge"

[auth]
# HS256 secret shared with the identity provider
jwt_secret = "change-me-in-production"

# Lifetime of tokens minted by `fieldforge-cli token`
token_ttl_secs = 86400

[realtime]
enabled = true

# Lifetime of /ws tokens issued by the realtime token endpoint
token_ttl_secs = 3600

max_connections = 1000

[hourglass]
# Enforce Angry Lips response windows in the background
enabled = true

# Seconds between passes
interval_secs = 30

# Send a one-time warning when this many seconds remain
warning_threshold_secs = 60

# Turns examined per pass
batch_size = 50

# Used to build turn links in notifications
app_base_url = "http://localhost:5173"

[notifications]
# discord_webhook_url = "https://discord.com/api/webhooks/..."
# relay_webhook_url = "https://relay.example.com/notify"
request_timeout_ms = 5000

[narrator]
# local (deterministic, offline) or openai (any OpenAI-compatible endpoint)
provider = "local"
base_url = "https://api.openai.com/v1"
# api_key = ""
model = "gpt-4o-mini"
request_timeout_ms = 15000

[logging]
# Log level: trace, debug, info, warn, error
level = "info"

# Log format: pretty (for development) or json (for production)
format = "pretty"
"#
    .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_parses() {
        let config = Config::parse(&generate_default_config()).unwrap();
        assert_eq!(config.server.port, 8090);
        assert_eq!(config.hourglass.interval_secs, 30);
        assert_eq!(config.hourglass.warning_threshold_secs, 60);
        assert_eq!(config.narrator.provider, "local");
        assert!(config.notifications.discord_webhook_url.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let config = Config::parse("[server]\nport = 9000\n").unwrap();
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.hourglass.batch_size, 50);
        assert_eq!(config.server.addr(), "0.0.0.0:9000");
    }

    #[test]
    fn test_invalid_toml() {
        let err = Config::parse("[server\nport = ").unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[test]
    fn test_load_missing_file() {
        let err = Config::load(Path::new("/definitely/not/here.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[storage]\ndata_dir = \"/tmp/ff\"\n").unwrap();

        let config = Config::load(&path).unwrap();
        assert_eq!(config.storage.data_dir, "/tmp/ff");
        assert_eq!(
            config.storage.database_path(),
            PathBuf::from("/tmp/ff/fieldforge.db")
        );
    }

    #[test]
    fn test_validate_rejects_empty_secret() {
        let mut config = Config::default();
        config.auth.jwt_secret = "  ".to_string();
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));

        let mut config = Config::default();
        config.hourglass.interval_secs = 0;
        assert!(config.validate().is_err());
    }
}
