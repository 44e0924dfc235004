use std::env;
use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::str::FromStr;
use std::time::Duration;

use crate::workflows::underwriting::{
    LendingSettings, PaginationConfig, ProcessorConfig, RetryPolicy, ThresholdConfig,
};

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

/// Top-level configuration for the application.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub environment: AppEnvironment,
    pub server: ServerConfig,
    pub telemetry: TelemetryConfig,
    pub lending: LendingSettings,
}

impl AppConfig {
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let environment = AppEnvironment::from_str(
            &env::var("APP_ENV").unwrap_or_else(|_| "development".to_string()),
        );

        let host = env::var("APP_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let port = env::var("APP_PORT")
            .unwrap_or_else(|_| "8080".to_string())
            .parse::<u16>()
            .map_err(|_| ConfigError::InvalidPort)?;

        let log_level = env::var("APP_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());
        let format = match env::var("APP_LOG_FORMAT") {
            Ok(raw) if raw.trim().eq_ignore_ascii_case("json") => LogFormat::Json,
            _ => LogFormat::Compact,
        };

        let lending = load_lending_settings()?;

        Ok(Self {
            environment,
            server: ServerConfig { host, port },
            telemetry: TelemetryConfig { log_level, format },
            lending,
        })
    }
}

fn load_lending_settings() -> Result<LendingSettings, ConfigError> {
    let defaults = LendingSettings::default();

    let thresholds = ThresholdConfig {
        auto_approve_below: env_or(
            "LOAN_AUTO_APPROVE_BELOW",
            defaults.thresholds.auto_approve_below,
        )?,
        auto_reject_above: env_or(
            "LOAN_AUTO_REJECT_ABOVE",
            defaults.thresholds.auto_reject_above,
        )?,
    };
    if thresholds.auto_approve_below > thresholds.auto_reject_above {
        return Err(ConfigError::Inconsistent {
            detail: "LOAN_AUTO_APPROVE_BELOW must not exceed LOAN_AUTO_REJECT_ABOVE",
        });
    }

    let processor = ProcessorConfig {
        workers: env_or("LOAN_WORKERS", defaults.processor.workers)?,
        queue_capacity: env_or("LOAN_QUEUE_CAPACITY", defaults.processor.queue_capacity)?,
        feed_interval: Duration::from_secs(env_or(
            "LOAN_FEED_INTERVAL_SECS",
            defaults.processor.feed_interval.as_secs(),
        )?),
        review_delay_min: millis_or(
            "LOAN_REVIEW_DELAY_MIN_MS",
            defaults.processor.review_delay_min,
        )?,
        review_delay_max: millis_or(
            "LOAN_REVIEW_DELAY_MAX_MS",
            defaults.processor.review_delay_max,
        )?,
        retry: RetryPolicy {
            max_attempts: env_or(
                "LOAN_RETRY_MAX_ATTEMPTS",
                defaults.processor.retry.max_attempts,
            )?,
            base_backoff: millis_or("LOAN_RETRY_BASE_MS", defaults.processor.retry.base_backoff)?,
            max_backoff: millis_or("LOAN_RETRY_MAX_MS", defaults.processor.retry.max_backoff)?,
        },
    };
    if processor.workers == 0 {
        return Err(ConfigError::Inconsistent {
            detail: "LOAN_WORKERS must be at least 1",
        });
    }
    if processor.queue_capacity == 0 {
        return Err(ConfigError::Inconsistent {
            detail: "LOAN_QUEUE_CAPACITY must be at least 1",
        });
    }
    if processor.feed_interval.is_zero() {
        return Err(ConfigError::Inconsistent {
            detail: "LOAN_FEED_INTERVAL_SECS must be at least 1",
        });
    }
    if processor.review_delay_min > processor.review_delay_max {
        return Err(ConfigError::Inconsistent {
            detail: "LOAN_REVIEW_DELAY_MIN_MS must not exceed LOAN_REVIEW_DELAY_MAX_MS",
        });
    }

    let pagination = PaginationConfig {
        min_page_size: env_or("LOAN_PAGE_SIZE_MIN", defaults.pagination.min_page_size)?,
        max_page_size: env_or("LOAN_PAGE_SIZE_MAX", defaults.pagination.max_page_size)?,
        default_page_size: env_or(
            "LOAN_PAGE_SIZE_DEFAULT",
            defaults.pagination.default_page_size,
        )?,
    };
    if pagination.min_page_size == 0
        || pagination.min_page_size > pagination.default_page_size
        || pagination.default_page_size > pagination.max_page_size
    {
        return Err(ConfigError::Inconsistent {
            detail: "page sizes must satisfy 1 <= MIN <= DEFAULT <= MAX",
        });
    }

    Ok(LendingSettings {
        thresholds,
        processor,
        pagination,
    })
}

fn env_or<T: FromStr>(key: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|_| ConfigError::InvalidValue { key, value: raw }),
        Err(_) => Ok(default),
    }
}

fn millis_or(key: &'static str, default: Duration) -> Result<Duration, ConfigError> {
    let millis = env_or(key, default.as_millis() as u64)?;
    Ok(Duration::from_millis(millis))
}

/// Settings controlling the HTTP server binding.
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

/// Output shape for log lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Compact,
    Json,
}

/// Tracing controls.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    pub log_level: String,
    pub format: LogFormat,
}

#[derive(Debug)]
pub enum ConfigError {
    InvalidPort,
    InvalidHost { source: std::net::AddrParseError },
    InvalidValue { key: &'static str, value: String },
    Inconsistent { detail: &'static str },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::InvalidPort => write!(f, "APP_PORT must be a valid u16"),
            ConfigError::InvalidHost { .. } => {
                write!(f, "APP_HOST must parse to an IPv4 or IPv6 address")
            }
            ConfigError::InvalidValue { key, value } => {
                write!(f, "{key} has an unparseable value '{value}'")
            }
            ConfigError::Inconsistent { detail } => write!(f, "{detail}"),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::InvalidHost { source } => Some(source),
            ConfigError::InvalidPort
            | ConfigError::InvalidValue { .. }
            | ConfigError::Inconsistent { .. } => None,
        }
    }
}
