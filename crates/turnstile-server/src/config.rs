use std::path::{Path, PathBuf};
use std::time::Duration;

use axum::http::HeaderName;
use serde::Deserialize;

use crate::events::DEFAULT_CHANNEL;

pub const DEFAULT_API_ID_HEADER: &str = "x-turnstile-api-id";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub http: HttpConfig,
    pub token: TokenConfig,
    pub notifications: NotificationConfig,
    pub decision: DecisionConfig,
    pub store: StoreConfig,
    pub log: LogConfig,
    pub tracing: TracingConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TokenConfig {
    pub public_key_path: PathBuf,
    pub leeway_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct NotificationConfig {
    pub channel: String,
    pub queue_capacity: usize,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DecisionConfig {
    pub timeout_ms: u64,
    pub api_id_header: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// How long removal markers are kept before they may be purged.
    pub removal_retention_secs: u64,
    pub purge_interval_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    pub format: LogFormat,
    pub level: String,
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Json,
    Pretty,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TracingConfig {
    pub enabled: bool,
    pub otlp_endpoint: String,
    pub service_name: String,
    pub sample_rate: f64,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 9191,
        }
    }
}

impl Default for TokenConfig {
    fn default() -> Self {
        Self {
            public_key_path: PathBuf::from("certs/verification_key.pem"),
            leeway_secs: 30,
        }
    }
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            channel: DEFAULT_CHANNEL.to_string(),
            queue_capacity: 1024,
        }
    }
}

impl Default for DecisionConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 250,
            api_id_header: DEFAULT_API_ID_HEADER.to_string(),
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            removal_retention_secs: 3600,
            purge_interval_secs: 300,
        }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            format: LogFormat::Json,
            level: "info".to_string(),
        }
    }
}

impl Default for TracingConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            otlp_endpoint: "http://localhost:4317".to_string(),
            service_name: "turnstile".to_string(),
            sample_rate: 1.0,
        }
    }
}

impl AppConfig {
    pub fn load(config_path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = if let Some(path) = config_path {
            let contents = std::fs::read_to_string(path)
                .map_err(|e| ConfigError::ReadFile(path.display().to_string(), e.to_string()))?;
            toml::from_str::<AppConfig>(&contents)
                .map_err(|e| ConfigError::ParseToml(e.to_string()))?
        } else {
            AppConfig::default()
        };

        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(v) = std::env::var("TURNSTILE_HTTP_HOST") {
            self.http.host = v;
        }
        if let Ok(v) = std::env::var("TURNSTILE_HTTP_PORT")
            && let Ok(port) = v.parse()
        {
            self.http.port = port;
        }
        if let Ok(v) = std::env::var("TURNSTILE_TOKEN_PUBLIC_KEY_PATH") {
            self.token.public_key_path = PathBuf::from(v);
        }
        if let Ok(v) = std::env::var("TURNSTILE_TOKEN_LEEWAY_SECS")
            && let Ok(n) = v.parse()
        {
            self.token.leeway_secs = n;
        }
        if let Ok(v) = std::env::var("TURNSTILE_NOTIFICATIONS_CHANNEL") {
            self.notifications.channel = v;
        }
        if let Ok(v) = std::env::var("TURNSTILE_NOTIFICATIONS_QUEUE_CAPACITY")
            && let Ok(n) = v.parse()
        {
            self.notifications.queue_capacity = n;
        }
        if let Ok(v) = std::env::var("TURNSTILE_DECISION_TIMEOUT_MS")
            && let Ok(n) = v.parse()
        {
            self.decision.timeout_ms = n;
        }
        if let Ok(v) = std::env::var("TURNSTILE_DECISION_API_ID_HEADER") {
            self.decision.api_id_header = v;
        }
        if let Ok(v) = std::env::var("TURNSTILE_LOG_LEVEL") {
            self.log.level = v;
        }
        if let Ok(v) = std::env::var("TURNSTILE_LOG_FORMAT") {
            match v.as_str() {
                "json" => self.log.format = LogFormat::Json,
                "pretty" => self.log.format = LogFormat::Pretty,
                _ => {}
            }
        }
        if let Ok(v) = std::env::var("TURNSTILE_TRACING_ENABLED")
            && let Ok(enabled) = v.parse()
        {
            self.tracing.enabled = enabled;
        }
        if let Ok(v) = std::env::var("TURNSTILE_TRACING_OTLP_ENDPOINT") {
            self.tracing.otlp_endpoint = v;
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.http.port == 0 {
            return Err(ConfigError::Validation(
                "http.port must be non-zero".to_string(),
            ));
        }
        if self.notifications.channel.trim().is_empty() {
            return Err(ConfigError::Validation(
                "notifications.channel must not be empty".to_string(),
            ));
        }
        if self.notifications.queue_capacity == 0 {
            return Err(ConfigError::Validation(
                "notifications.queue_capacity must be non-zero".to_string(),
            ));
        }
        if self.decision.timeout_ms == 0 {
            return Err(ConfigError::Validation(
                "decision.timeout_ms must be non-zero".to_string(),
            ));
        }
        if HeaderName::from_bytes(self.decision.api_id_header.as_bytes()).is_err() {
            return Err(ConfigError::Validation(format!(
                "decision.api_id_header '{}' is not a valid header name",
                self.decision.api_id_header
            )));
        }
        if !(0.0..=1.0).contains(&self.tracing.sample_rate) {
            return Err(ConfigError::Validation(
                "tracing.sample_rate must be between 0.0 and 1.0".to_string(),
            ));
        }
        Ok(())
    }

    pub fn http_addr(&self) -> String {
        format!("{}:{}", self.http.host, self.http.port)
    }

    pub fn decision_timeout(&self) -> Duration {
        Duration::from_millis(self.decision.timeout_ms)
    }

    /// Header carrying the target API id. Falls back to the default when the
    /// configured name was never validated.
    pub fn api_id_header(&self) -> HeaderName {
        HeaderName::from_bytes(self.decision.api_id_header.as_bytes())
            .unwrap_or(HeaderName::from_static(DEFAULT_API_ID_HEADER))
    }

    pub fn removal_retention(&self) -> Duration {
        Duration::from_secs(self.store.removal_retention_secs)
    }

    pub fn purge_interval(&self) -> Option<Duration> {
        (self.store.purge_interval_secs > 0)
            .then(|| Duration::from_secs(self.store.purge_interval_secs))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file '{0}': {1}")]
    ReadFile(String, String),

    #[error("failed to parse TOML config: {0}")]
    ParseToml(String),

    #[error("config validation failed: {0}")]
    Validation(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn default_config_has_sensible_values() {
        let config = AppConfig::default();
        assert_eq!(config.http.host, "0.0.0.0");
        assert_eq!(config.http.port, 9191);
        assert_eq!(config.notifications.channel, "notification");
        assert_eq!(config.notifications.queue_capacity, 1024);
        assert_eq!(config.decision.timeout_ms, 250);
        assert_eq!(config.token.leeway_secs, 30);
        assert_eq!(config.log.format, LogFormat::Json);
        assert!(!config.tracing.enabled);
    }

    #[test]
    fn load_from_toml_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(
            file,
            r#"
[http]
host = "127.0.0.1"
port = 8181

[token]
public_key_path = "/etc/turnstile/key.pem"

[decision]
timeout_ms = 100
api_id_header = "x-api-id"

[log]
format = "pretty"
level = "debug"
"#
        )
        .unwrap();

        let config = AppConfig::load(Some(&path)).unwrap();
        assert_eq!(config.http.host, "127.0.0.1");
        assert_eq!(config.http.port, 8181);
        assert_eq!(
            config.token.public_key_path,
            PathBuf::from("/etc/turnstile/key.pem")
        );
        assert_eq!(config.decision_timeout(), Duration::from_millis(100));
        assert_eq!(config.api_id_header().as_str(), "x-api-id");
        assert_eq!(config.log.format, LogFormat::Pretty);
        assert_eq!(config.log.level, "debug");
    }

    #[test]
    fn missing_config_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.toml");

        let result = AppConfig::load(Some(&path));

        assert!(matches!(result, Err(ConfigError::ReadFile(..))));
    }

    #[test]
    fn malformed_toml_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[http\nport = ").unwrap();

        let result = AppConfig::load(Some(&path));

        assert!(matches!(result, Err(ConfigError::ParseToml(_))));
    }

    #[test]
    fn env_vars_override_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(
            file,
            r#"
[notifications]
queue_capacity = 16
"#
        )
        .unwrap();

        // SAFETY: test runs single-threaded for this env var
        unsafe { std::env::set_var("TURNSTILE_NOTIFICATIONS_QUEUE_CAPACITY", "64") };
        let config = AppConfig::load(Some(&path)).unwrap();
        unsafe { std::env::remove_var("TURNSTILE_NOTIFICATIONS_QUEUE_CAPACITY") };

        assert_eq!(config.notifications.queue_capacity, 64);
    }

    #[test]
    fn validation_rejects_zero_port() {
        let mut config = AppConfig::default();
        config.http.port = 0;
        let result = config.validate();
        assert!(matches!(result, Err(ConfigError::Validation(ref msg)) if msg.contains("port")));
    }

    #[test]
    fn validation_rejects_zero_queue_capacity() {
        let mut config = AppConfig::default();
        config.notifications.queue_capacity = 0;
        let result = config.validate();
        assert!(
            matches!(result, Err(ConfigError::Validation(ref msg)) if msg.contains("queue_capacity"))
        );
    }

    #[test]
    fn validation_rejects_zero_timeout() {
        let mut config = AppConfig::default();
        config.decision.timeout_ms = 0;
        let result = config.validate();
        assert!(
            matches!(result, Err(ConfigError::Validation(ref msg)) if msg.contains("timeout_ms"))
        );
    }

    #[test]
    fn validation_rejects_empty_channel() {
        let mut config = AppConfig::default();
        config.notifications.channel = "  ".to_string();
        let result = config.validate();
        assert!(matches!(result, Err(ConfigError::Validation(ref msg)) if msg.contains("channel")));
    }

    #[test]
    fn validation_rejects_invalid_header_name() {
        let mut config = AppConfig::default();
        config.decision.api_id_header = "x api id".to_string();
        let result = config.validate();
        assert!(
            matches!(result, Err(ConfigError::Validation(ref msg)) if msg.contains("api_id_header"))
        );
    }

    #[test]
    fn purge_interval_zero_disables_purging() {
        let mut config = AppConfig::default();
        assert_eq!(config.purge_interval(), Some(Duration::from_secs(300)));
        config.store.purge_interval_secs = 0;
        assert_eq!(config.purge_interval(), None);
    }
}
