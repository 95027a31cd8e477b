//! Environment-driven configuration for the HTTP shell, ledger database,
//! logging and payer redirects.

use reqwest::Url;
use std::env;
use std::str::FromStr;

/// Everything the binary reads from the environment at startup.
///
/// Provider credentials, the payment policy and the repair worker read their
/// own sections (`StripeConfig::from_env`, `PaymentPolicy::from_env`,
/// `SettlementRepairConfig::from_env`).
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub server: ServerConfig,
    /// `None` runs the service on the in-memory ledger store.
    pub database: Option<DatabaseConfig>,
    pub logging: LoggingConfig,
    pub redirect: RedirectConfig,
}

/// Listener address.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

/// Postgres pool settings, only read with the `database` feature.
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
    pub connection_timeout: u64,   // seconds
    pub idle_timeout: Option<u64>, // seconds
}

#[derive(Debug, Clone)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

/// `LOG_FORMAT`: json or plain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Json,
    Plain,
}

/// Where the payer's browser is sent after the provider redirect is handled.
#[derive(Debug, Clone)]
pub struct RedirectConfig {
    pub success_url: Url,
    pub error_url: Url,
}

impl AppConfig {
    /// Loads `.env` when present, then every section from the environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        let _ = dotenv::dotenv();

        Ok(AppConfig {
            server: ServerConfig::from_env()?,
            database: DatabaseConfig::from_env_optional()?,
            logging: LoggingConfig::from_env()?,
            redirect: RedirectConfig::from_env()?,
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.server.validate()?;
        self.database.iter().try_for_each(DatabaseConfig::validate)?;
        self.logging.validate()?;
        self.redirect.validate()
    }
}

impl ServerConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(ServerConfig {
            host: env_or("SERVER_HOST", "127.0.0.1"),
            port: env_parse("SERVER_PORT", 8000)?,
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        ensure(self.port != 0, "SERVER_PORT cannot be 0")?;
        ensure(!self.host.trim().is_empty(), "SERVER_HOST cannot be empty")
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl DatabaseConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(DatabaseConfig {
            url: env::var("DATABASE_URL")
                .map_err(|_| ConfigError::MissingVariable("DATABASE_URL".to_string()))?,
            max_connections: env_parse("DB_MAX_CONNECTIONS", 10)?,
            min_connections: env_parse("DB_MIN_CONNECTIONS", 1)?,
            connection_timeout: env_parse("DB_CONNECTION_TIMEOUT", 30)?,
            idle_timeout: env::var("DB_IDLE_TIMEOUT")
                .ok()
                .map(|raw| {
                    raw.trim()
                        .parse()
                        .map_err(|_| ConfigError::InvalidValue("DB_IDLE_TIMEOUT".to_string()))
                })
                .transpose()?,
        })
    }

    /// `Ok(None)` when `DATABASE_URL` is unset or blank; the service then
    /// keeps its ledger in memory.
    pub fn from_env_optional() -> Result<Option<Self>, ConfigError> {
        match env::var("DATABASE_URL") {
            Ok(url) if !url.trim().is_empty() => Self::from_env().map(Some),
            _ => Ok(None),
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        ensure(
            self.url.starts_with("postgres://") || self.url.starts_with("postgresql://"),
            "DATABASE_URL must be a postgres:// URL",
        )?;
        ensure(self.max_connections > 0, "DB_MAX_CONNECTIONS must be positive")?;
        ensure(
            self.min_connections <= self.max_connections,
            "DB_MIN_CONNECTIONS must be <= DB_MAX_CONNECTIONS",
        )
    }
}

impl LoggingConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let format = match env_or("LOG_FORMAT", "plain").to_lowercase().as_str() {
            "json" => LogFormat::Json,
            "plain" | "text" => LogFormat::Plain,
            other => {
                return Err(ConfigError::InvalidValue(format!(
                    "LOG_FORMAT: expected json or plain, got {}",
                    other
                )))
            }
        };
        Ok(LoggingConfig {
            level: env_or("LOG_LEVEL", "info"),
            format,
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        const LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];
        ensure(
            LEVELS.contains(&self.level.to_lowercase().as_str()),
            "LOG_LEVEL must be one of trace, debug, info, warn, error",
        )
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Plain,
        }
    }
}

impl RedirectConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(RedirectConfig {
            success_url: env_url("PAYMENT_SUCCESS_URL", "http://localhost:3000/payment/success")?,
            error_url: env_url("PAYMENT_ERROR_URL", "http://localhost:3000/payment/error")?,
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        ensure(
            matches!(self.success_url.scheme(), "http" | "https"),
            "PAYMENT_SUCCESS_URL must be an http(s) URL",
        )?;
        ensure(
            matches!(self.error_url.scheme(), "http" | "https"),
            "PAYMENT_ERROR_URL must be an http(s) URL",
        )
    }

    /// Success page for a settled order, carrying the order reference.
    pub fn success_redirect(&self, order_ref: &str) -> String {
        with_query(&self.success_url, "orderId", order_ref)
    }

    /// Error page carrying a human-readable reason.
    pub fn error_redirect(&self, reason: &str) -> String {
        with_query(&self.error_url, "error", reason)
    }
}

fn with_query(base: &Url, key: &str, value: &str) -> String {
    let mut url = base.clone();
    url.query_pairs_mut().append_pair(key, value);
    url.to_string()
}

fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

/// Parses `key` when set, `default` otherwise. A set but unparseable value is an error.
fn env_parse<T: FromStr>(key: &str, default: T) -> Result<T, ConfigError> {
    match env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidValue(format!("{}: {:?}", key, raw))),
        Err(_) => Ok(default),
    }
}

fn env_url(key: &str, default: &str) -> Result<Url, ConfigError> {
    let raw = env_or(key, default);
    Url::parse(&raw).map_err(|e| ConfigError::InvalidValue(format!("{}: {}", key, e)))
}

fn ensure(condition: bool, message: &str) -> Result<(), ConfigError> {
    if condition {
        Ok(())
    } else {
        Err(ConfigError::ValidationFailed(message.to_string()))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("missing environment variable: {0}")]
    MissingVariable(String),

    #[error("invalid configuration value: {0}")]
    InvalidValue(String),

    #[error("configuration rejected: {0}")]
    ValidationFailed(String),
}
