use crate::core::error::AppError;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::time::Duration;

pub const DEFAULT_EVENT_CHANNEL: &str = "fw:events";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Configuration {
    pub cache: CacheConfig,
    pub database: DatabaseConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    pub host: String,
    pub port: u16,
    pub db: i64,
    pub password: Option<String>,
    /// エージェントが購読するイベントチャネル
    pub channel: String,
    pub connect_timeout_ms: u64,
    pub op_timeout_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub database: String,
    pub max_connections: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    pub file: String,
}

impl CacheConfig {
    pub fn url(&self) -> String {
        match &self.password {
            Some(password) => format!(
                "redis://:{}@{}:{}/{}",
                password, self.host, self.port, self.db
            ),
            None => format!("redis://{}:{}/{}", self.host, self.port, self.db),
        }
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn op_timeout(&self) -> Duration {
        Duration::from_millis(self.op_timeout_ms)
    }
}

impl DatabaseConfig {
    pub fn connection_string(&self) -> String {
        format!(
            "host={} port={} user={} password={} dbname={}",
            self.host, self.port, self.username, self.password, self.database
        )
    }
}

fn env_or<T>(name: &str, default: &str) -> Result<T, AppError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    std::env::var(name)
        .unwrap_or_else(|_| default.to_string())
        .parse()
        .map_err(|e| AppError::Config(format!("{}の値が無効です: {}", name, e)))
}

fn env_required(name: &str) -> Result<String, AppError> {
    std::env::var(name).map_err(|_| AppError::Config(format!("{}が設定されていません", name)))
}

impl Configuration {
    pub fn from_env() -> Result<Self, AppError> {
        dotenv::dotenv().ok();

        Ok(Configuration {
            cache: CacheConfig {
                host: env_or("REDIS_HOST", "127.0.0.1")?,
                port: env_or("REDIS_PORT", "6379")?,
                db: env_or("REDIS_DB", "0")?,
                password: std::env::var("REDIS_PASSWORD")
                    .ok()
                    .filter(|p| !p.is_empty()),
                channel: env_or("REDIS_CHANNEL", DEFAULT_EVENT_CHANNEL)?,
                connect_timeout_ms: env_or("REDIS_CONNECT_TIMEOUT_MS", "1000")?,
                op_timeout_ms: env_or("REDIS_OP_TIMEOUT_MS", "2000")?,
            },
            database: DatabaseConfig {
                host: env_required("DB_HOST")?,
                port: env_or("DB_PORT", "5432")?,
                username: env_required("DB_USER")?,
                password: env_required("DB_PASSWORD")?,
                database: env_required("DB_NAME")?,
                max_connections: env_or("DB_MAX_CONNECTIONS", "10")?,
            },
            logging: LoggingConfig {
                level: env_or("LOG_LEVEL", "info")?,
                file: env_or("LOG_FILE", "fw-propagator.log")?,
            },
        })
    }

    #[cfg(test)]
    pub fn for_testing() -> Self {
        Self {
            cache: CacheConfig {
                host: "localhost".to_string(),
                port: 6379,
                db: 0,
                password: None,
                channel: DEFAULT_EVENT_CHANNEL.to_string(),
                connect_timeout_ms: 1000,
                op_timeout_ms: 2000,
            },
            database: DatabaseConfig {
                host: "localhost".to_string(),
                port: 5432,
                username: "test".to_string(),
                password: "test".to_string(),
                database: "test_db".to_string(),
                max_connections: 5,
            },
            logging: LoggingConfig {
                level: "info".to_string(),
                file: "fw-propagator.log".to_string(),
            },
        }
    }
}
