use chrono_tz::Tz;
use clap::Parser;
use orderdesk_backend::{
    BackendError, DynBackend, SupabaseBackend, SupabaseConfig, TestBackend, ViewerRole,
};
use sqlx::SqlitePool;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{Level, warn};

use crate::poller::PollerConfig;
use crate::telemetry::{TelemetryGuard, setup_telemetry};

#[derive(clap::ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl From<LogLevel> for Level {
    fn from(log_level: LogLevel) -> Self {
        match log_level {
            LogLevel::Trace => Self::TRACE,
            LogLevel::Debug => Self::DEBUG,
            LogLevel::Info => Self::INFO,
            LogLevel::Warn => Self::WARN,
            LogLevel::Error => Self::ERROR,
        }
    }
}

impl From<&LogLevel> for Level {
    fn from(log_level: &LogLevel) -> Self {
        (*log_level).into()
    }
}

#[derive(clap::ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Admin,
    Vendor,
    Cashier,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("ROLE=vendor requires VENDOR_ID")]
    MissingVendorId,
    #[error("ROLE=cashier requires USER_ID")]
    MissingUserId,
    #[error("Unknown time zone: {0}")]
    InvalidTimezone(String),
    #[error("REFRESH_INTERVAL must be at least one second")]
    InvalidRefreshInterval,
}

#[derive(Parser, Debug, Clone)]
pub struct Env {
    #[clap(long = "db", env, default_value = "sqlite:orderdesk.db")]
    pub database_url: String,
    #[clap(long, env, default_value = "info")]
    pub log_level: LogLevel,
    #[clap(flatten)]
    pub supabase: SupabaseConfig,
    #[clap(long, env, value_enum, default_value = "admin")]
    pub role: Role,
    #[clap(long, env)]
    pub vendor_id: Option<String>,
    /// Operator's user id, used to find the vendor of a cashier
    #[clap(long, env)]
    pub user_id: Option<String>,
    /// Seconds between order list refreshes
    #[clap(long, env, default_value = "30")]
    pub refresh_interval: u64,
    /// IANA time zone used for pickup slots
    #[clap(long, env, default_value = "UTC")]
    pub timezone: String,
    #[clap(long, env, default_value = "8080")]
    pub port: u16,
    /// Use an in-memory backend instead of Supabase
    #[clap(long, env, default_value = "false")]
    pub dry_run: bool,
    /// OTLP/HTTP traces endpoint (optional)
    #[clap(long, env)]
    pub otel_exporter_endpoint: Option<String>,
    #[clap(long, env)]
    pub otel_exporter_api_key: Option<String>,
}

impl Env {
    pub async fn get_sqlite_pool(&self) -> Result<SqlitePool, sqlx::Error> {
        let options = SqliteConnectOptions::from_str(&self.database_url)?.create_if_missing(true);

        // every connection to an in-memory database opens a fresh one
        if self.database_url.contains(":memory:") {
            return SqlitePoolOptions::new()
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
                .connect_with(options)
                .await;
        }

        SqlitePool::connect_with(options).await
    }

    pub fn viewer_role(&self) -> Result<ViewerRole, ConfigError> {
        match self.role {
            Role::Admin => Ok(ViewerRole::Admin),
            Role::Vendor => self
                .vendor_id
                .clone()
                .filter(|id| !id.trim().is_empty())
                .map(|vendor_id| ViewerRole::Vendor { vendor_id })
                .ok_or(ConfigError::MissingVendorId),
            Role::Cashier => self
                .user_id
                .clone()
                .filter(|id| !id.trim().is_empty())
                .map(|user_id| ViewerRole::Cashier { user_id })
                .ok_or(ConfigError::MissingUserId),
        }
    }

    pub fn timezone(&self) -> Result<Tz, ConfigError> {
        self.timezone
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidTimezone(self.timezone.clone()))
    }

    pub fn get_poller_config(&self) -> Result<PollerConfig, ConfigError> {
        if self.refresh_interval == 0 {
            return Err(ConfigError::InvalidRefreshInterval);
        }

        Ok(PollerConfig {
            interval: Duration::from_secs(self.refresh_interval),
        })
    }

    pub fn get_backend(&self) -> Result<DynBackend, BackendError> {
        if self.dry_run {
            warn!("Dry run: orders live in memory and are lost on exit");
            Ok(Arc::new(TestBackend::new()))
        } else {
            Ok(Arc::new(SupabaseBackend::try_from_config(&self.supabase)?))
        }
    }
}

/// Installs the global subscriber. The returned guard must be kept alive for
/// spans to be exported.
pub fn setup_tracing(env: &Env) -> Option<TelemetryGuard> {
    let level: Level = env.log_level.into();

    if let Some(endpoint) = &env.otel_exporter_endpoint {
        match setup_telemetry(endpoint, env.otel_exporter_api_key.as_deref(), level) {
            Ok(guard) => return Some(guard),
            Err(e) => eprintln!("Failed to set up telemetry: {e}, falling back to console logging"),
        }
    }

    let default_filter = format!("orderdesk={level},orderdesk_backend={level}");
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .compact()
        .init();

    None
}
