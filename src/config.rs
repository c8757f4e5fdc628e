//! Runtime configuration
//!
//! Every setting is a CLI flag with an environment fallback, so a `.env`
//! file loaded before parsing configures the service as well.

use clap::{Parser, ValueEnum};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

pub const DEV_JWT_SECRET: &str = "hospital-dev-secret-change-me";

const MAX_TOKEN_TTL_HOURS: i64 = 87_600;

#[derive(Parser, Debug, Clone)]
#[command(name = "hospital")]
#[command(about = "Hospital records API - patients, doctors and appointments")]
pub struct Config {
    /// Address the HTTP server listens on
    #[arg(long, env = "HOSPITAL_BIND_ADDR", default_value = "0.0.0.0:8080")]
    pub bind_addr: SocketAddr,

    /// Token signing secret
    #[arg(long, env = "JWT_SECRET", default_value = DEV_JWT_SECRET, hide_env_values = true)]
    pub jwt_secret: String,

    /// Token lifetime in hours (1 hour to 10 years)
    #[arg(
        long,
        env = "JWT_TTL_HOURS",
        default_value = "24",
        value_parser = clap::value_parser!(i64).range(1..=MAX_TOKEN_TTL_HOURS)
    )]
    pub token_ttl_hours: i64,

    /// Record store backing
    #[arg(long = "storage", env = "STORAGE_BACKEND", value_enum, default_value = "memory")]
    pub storage: StorageBackend,

    /// Snapshot file for the memory backing
    #[arg(long, env = "DATA_FILE", default_value = "hospital_data.json")]
    pub data_file: PathBuf,

    /// SQLite URL for the sql backing
    #[arg(long, env = "DATABASE_URL", default_value = "sqlite://hospital.db")]
    pub database_url: String,

    #[arg(long, env = "DB_MAX_CONNECTIONS", default_value = "10")]
    pub db_max_connections: u32,

    #[arg(long, env = "DB_MIN_CONNECTIONS", default_value = "1")]
    pub db_min_connections: u32,

    /// Idle connections are closed after this many seconds
    #[arg(long, env = "DB_MAX_IDLE_SECS", default_value = "300")]
    pub db_max_idle_secs: u64,

    #[arg(long, env = "DB_ACQUIRE_TIMEOUT_SECS", default_value = "5")]
    pub db_acquire_timeout_secs: u64,

    /// Append-only text log of every request
    #[arg(long, env = "ACCESS_LOG", default_value = "api_logs.txt")]
    pub access_log: PathBuf,

    /// Disable the access log file
    #[arg(long, env = "NO_ACCESS_LOG")]
    pub no_access_log: bool,

    /// TOML file with `[[users]]` entries (built-in table when unset)
    #[arg(long, env = "CREDENTIALS_FILE")]
    pub credentials_file: Option<PathBuf>,

    /// Per-request timeout in seconds
    #[arg(long, env = "REQUEST_TIMEOUT_SECS", default_value = "10")]
    pub request_timeout_secs: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum StorageBackend {
    /// In-process collections persisted as a JSON snapshot
    Memory,
    /// Pooled SQLite
    Sql,
}

/// Connection pool bounds for the relational store.
#[derive(Debug, Clone)]
pub struct PoolSettings {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
    pub max_idle: Duration,
    pub acquire_timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct StorageSettings {
    pub backend: StorageBackend,
    pub data_file: PathBuf,
    pub pool: PoolSettings,
}

impl Config {
    pub fn storage_settings(&self) -> StorageSettings {
        StorageSettings {
            backend: self.storage,
            data_file: self.data_file.clone(),
            pool: PoolSettings {
                url: self.database_url.clone(),
                max_connections: self.db_max_connections,
                min_connections: self.db_min_connections.min(self.db_max_connections),
                max_idle: Duration::from_secs(self.db_max_idle_secs),
                acquire_timeout: Duration::from_secs(self.db_acquire_timeout_secs),
            },
        }
    }

    pub fn token_ttl(&self) -> chrono::Duration {
        chrono::Duration::hours(self.token_ttl_hours)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// `None` when the access log is disabled.
    pub fn access_log_path(&self) -> Option<&PathBuf> {
        (!self.no_access_log).then_some(&self.access_log)
    }
}
