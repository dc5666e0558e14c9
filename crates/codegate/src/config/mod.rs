use std::env;
use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

const DEFAULT_QUEUE_NAME: &str = "codegate:submissions";
const DEFAULT_WORKER_ID: &str = "worker-0";
const DEFAULT_WORKER_CONCURRENCY: usize = 4;
const DEFAULT_MAX_ATTEMPTS: u32 = 3;
const DEFAULT_RETRY_BACKOFF_MS: u64 = 2_000;
const DEFAULT_FETCH_TIMEOUT_SECS: u64 = 30;

/// Distinguishes runtime behavior for different stages of the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppEnvironment {
    Development,
    Test,
    Production,
}

impl AppEnvironment {
    fn from_str(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "prod" | "production" => Self::Production,
            "test" | "ci" => Self::Test,
            _ => Self::Development,
        }
    }
}

/// Top-level configuration for the worker.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub environment: AppEnvironment,
    pub server: ServerConfig,
    pub telemetry: TelemetryConfig,
    pub queue: QueueConfig,
    pub archive: ArchiveConfig,
    pub notify_url: Option<String>,
}

impl AppConfig {
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let environment = AppEnvironment::from_str(
            &env::var("APP_ENV").unwrap_or_else(|_| "development".to_string()),
        );

        let host = env::var("APP_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let port = env::var("APP_PORT")
            .unwrap_or_else(|_| "3000".to_string())
            .parse::<u16>()
            .map_err(|_| ConfigError::InvalidPort)?;

        let log_level = env::var("APP_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

        let broker_url = non_empty_var("CODEGATE_BROKER_URL").or_else(|| non_empty_var("REDIS_URL"));
        let force_in_process = non_empty_var("CODEGATE_QUEUE_IN_PROCESS")
            .map(|value| parse_flag("CODEGATE_QUEUE_IN_PROCESS", &value))
            .transpose()?
            .unwrap_or(false);
        let queue_name =
            non_empty_var("CODEGATE_QUEUE_NAME").unwrap_or_else(|| DEFAULT_QUEUE_NAME.to_string());
        let worker_id =
            non_empty_var("CODEGATE_WORKER_ID").unwrap_or_else(|| DEFAULT_WORKER_ID.to_string());
        let worker_concurrency = parse_number("CODEGATE_WORKER_CONCURRENCY")?
            .unwrap_or(DEFAULT_WORKER_CONCURRENCY)
            .max(1);
        let max_attempts = parse_number("CODEGATE_MAX_ATTEMPTS")?
            .unwrap_or(DEFAULT_MAX_ATTEMPTS)
            .max(1);
        let retry_backoff = Duration::from_millis(
            parse_number("CODEGATE_RETRY_BACKOFF_MS")?.unwrap_or(DEFAULT_RETRY_BACKOFF_MS),
        );

        let max_bytes = parse_number("CODEGATE_ARCHIVE_MAX_BYTES")?;
        let fetch_timeout = Duration::from_secs(
            parse_number("CODEGATE_FETCH_TIMEOUT_SECS")?.unwrap_or(DEFAULT_FETCH_TIMEOUT_SECS),
        );

        Ok(Self {
            environment,
            server: ServerConfig { host, port },
            telemetry: TelemetryConfig { log_level },
            queue: QueueConfig {
                broker_url,
                force_in_process,
                queue_name,
                worker_id,
                worker_concurrency,
                max_attempts,
                retry_backoff,
            },
            archive: ArchiveConfig {
                max_bytes,
                fetch_timeout,
            },
            notify_url: non_empty_var("CODEGATE_NOTIFY_URL"),
        })
    }
}

fn non_empty_var(name: &str) -> Option<String> {
    env::var(name)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn parse_number<T: std::str::FromStr>(name: &'static str) -> Result<Option<T>, ConfigError> {
    non_empty_var(name)
        .map(|value| {
            value
                .parse::<T>()
                .map_err(|_| ConfigError::InvalidNumber { name, value })
        })
        .transpose()
}

fn parse_flag(name: &'static str, value: &str) -> Result<bool, ConfigError> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidFlag {
            name,
            value: value.to_string(),
        }),
    }
}

/// Settings controlling the probe HTTP server binding.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl ServerConfig {
    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        if self.host.eq_ignore_ascii_case("localhost") {
            return Ok(SocketAddr::new(IpAddr::from([127, 0, 0, 1]), self.port));
        }

        let ip: IpAddr = self
            .host
            .parse()
            .map_err(|source| ConfigError::InvalidHost { source })?;

        Ok(SocketAddr::new(ip, self.port))
    }
}

/// Tracing controls.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    pub log_level: String,
}

/// Inputs for choosing and tuning the submission queue backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueConfig {
    pub broker_url: Option<String>,
    pub force_in_process: bool,
    pub queue_name: String,
    /// Stable identity of this worker; names its broker processing list.
    pub worker_id: String,
    pub worker_concurrency: usize,
    pub max_attempts: u32,
    /// Delay before the first redelivery; doubles with each further attempt.
    pub retry_backoff: Duration,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            broker_url: None,
            force_in_process: false,
            queue_name: DEFAULT_QUEUE_NAME.to_string(),
            worker_id: DEFAULT_WORKER_ID.to_string(),
            worker_concurrency: DEFAULT_WORKER_CONCURRENCY,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            retry_backoff: Duration::from_millis(DEFAULT_RETRY_BACKOFF_MS),
        }
    }
}

/// Limits applied while fetching submitted archives. `max_bytes` caps both the
/// fetched size and the total decompressed size.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveConfig {
    pub max_bytes: Option<u64>,
    pub fetch_timeout: Duration,
}

impl Default for ArchiveConfig {
    fn default() -> Self {
        Self {
            max_bytes: None,
            fetch_timeout: Duration::from_secs(DEFAULT_FETCH_TIMEOUT_SECS),
        }
    }
}

#[derive(Debug)]
pub enum ConfigError {
    InvalidPort,
    InvalidHost { source: std::net::AddrParseError },
    InvalidNumber { name: &'static str, value: String },
    InvalidFlag { name: &'static str, value: String },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::InvalidPort => write!(f, "APP_PORT must be a valid u16"),
            ConfigError::InvalidHost { .. } => {
                write!(f, "APP_HOST must parse to an IPv4 or IPv6 address")
            }
            ConfigError::InvalidNumber { name, value } => {
                write!(f, "{name} must be a non-negative integer (found '{value}')")
            }
            ConfigError::InvalidFlag { name, value } => {
                write!(f, "{name} must be a boolean flag (found '{value}')")
            }
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::InvalidHost { source } => Some(source),
            ConfigError::InvalidPort
            | ConfigError::InvalidNumber { .. }
            | ConfigError::InvalidFlag { .. } => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;
    use std::sync::{Mutex, OnceLock};

    fn env_guard() -> &'static Mutex<()> {
        static GUARD: OnceLock<Mutex<()>> = OnceLock::new();
        GUARD.get_or_init(|| Mutex::new(()))
    }

    fn reset_env() {
        for name in [
            "APP_ENV",
            "APP_HOST",
            "APP_PORT",
            "APP_LOG_LEVEL",
            "CODEGATE_BROKER_URL",
            "REDIS_URL",
            "CODEGATE_QUEUE_IN_PROCESS",
            "CODEGATE_QUEUE_NAME",
            "CODEGATE_WORKER_ID",
            "CODEGATE_WORKER_CONCURRENCY",
            "CODEGATE_MAX_ATTEMPTS",
            "CODEGATE_RETRY_BACKOFF_MS",
            "CODEGATE_ARCHIVE_MAX_BYTES",
            "CODEGATE_FETCH_TIMEOUT_SECS",
            "CODEGATE_NOTIFY_URL",
        ] {
            env::remove_var(name);
        }
    }

    #[test]
    fn load_uses_defaults_when_env_missing() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        let config = AppConfig::load().expect("config loads with defaults");
        assert_eq!(config.environment, AppEnvironment::Development);
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.server.port, 3000);
        assert_eq!(config.telemetry.log_level, "info");
        assert_eq!(config.queue, QueueConfig::default());
        assert_eq!(config.archive, ArchiveConfig::default());
        assert!(config.notify_url.is_none());
    }

    #[test]
    fn accepts_localhost_host() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        env::set_var("APP_HOST", "localhost");
        let config = AppConfig::load().expect("config loads");
        let addr = config.server.socket_addr().expect("localhost resolves");
        assert_eq!(addr, SocketAddr::new(IpAddr::from([127, 0, 0, 1]), 3000));
        reset_env();
    }

    #[test]
    fn broker_url_falls_back_to_redis_url() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        env::set_var("REDIS_URL", "redis://cache:6379");
        env::set_var("CODEGATE_QUEUE_IN_PROCESS", "true");
        env::set_var("CODEGATE_WORKER_CONCURRENCY", "8");
        env::set_var("CODEGATE_RETRY_BACKOFF_MS", "250");
        let config = AppConfig::load().expect("config loads");
        assert_eq!(config.queue.broker_url.as_deref(), Some("redis://cache:6379"));
        assert!(config.queue.force_in_process);
        assert_eq!(config.queue.worker_concurrency, 8);
        assert_eq!(config.queue.retry_backoff, Duration::from_millis(250));
        reset_env();
    }

    #[test]
    fn rejects_malformed_numbers_and_flags() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        env::set_var("CODEGATE_MAX_ATTEMPTS", "many");
        assert!(matches!(
            AppConfig::load(),
            Err(ConfigError::InvalidNumber {
                name: "CODEGATE_MAX_ATTEMPTS",
                ..
            })
        ));

        reset_env();
        env::set_var("CODEGATE_QUEUE_IN_PROCESS", "maybe");
        assert!(matches!(
            AppConfig::load(),
            Err(ConfigError::InvalidFlag { .. })
        ));
        reset_env();
    }
}
