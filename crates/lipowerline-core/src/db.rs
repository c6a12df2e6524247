use std::{env, fmt::Display, str::FromStr, time::Duration};

use anyhow::{anyhow, bail, Context, Result};
use sqlx::{postgres::PgPoolOptions, Pool, Postgres};
use tracing::debug;

pub type DbPool = Pool<Postgres>;

pub const DEFAULT_MAX_CONNECTIONS: u32 = 10;
pub const DEFAULT_ACQUIRE_TIMEOUT_SECS: u64 = 10;

/// Connection settings for the import pool.
///
/// Read from `DATABASE_URL` (or `LIPOWERLINE_DATABASE_URL`),
/// `LIPOWERLINE_DB_MAX_CONNECTIONS` and `LIPOWERLINE_DB_ACQUIRE_TIMEOUT_SECS`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DbSettings {
    pub database_url: String,
    pub max_connections: u32,
    pub acquire_timeout: Duration,
}

impl DbSettings {
    pub fn new(database_url: impl Into<String>) -> Self {
        Self {
            database_url: database_url.into(),
            max_connections: DEFAULT_MAX_CONNECTIONS,
            acquire_timeout: Duration::from_secs(DEFAULT_ACQUIRE_TIMEOUT_SECS),
        }
    }

    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let database_url = lookup("DATABASE_URL")
            .or_else(|| lookup("LIPOWERLINE_DATABASE_URL"))
            .filter(|url| !url.trim().is_empty())
            .context("DATABASE_URL (or LIPOWERLINE_DATABASE_URL) must be set")?;

        let max_connections =
            parse_setting(&lookup, "LIPOWERLINE_DB_MAX_CONNECTIONS", DEFAULT_MAX_CONNECTIONS)?;
        if max_connections == 0 {
            bail!("LIPOWERLINE_DB_MAX_CONNECTIONS must be at least 1");
        }
        let timeout_secs = parse_setting(
            &lookup,
            "LIPOWERLINE_DB_ACQUIRE_TIMEOUT_SECS",
            DEFAULT_ACQUIRE_TIMEOUT_SECS,
        )?;

        Ok(Self {
            database_url,
            max_connections,
            acquire_timeout: Duration::from_secs(timeout_secs),
        })
    }
}

fn parse_setting<F, T>(lookup: &F, key: &str, default: T) -> Result<T>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: Display,
{
    match lookup(key) {
        None => Ok(default),
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|err| anyhow!("{key} has invalid value '{raw}': {err}")),
    }
}

/// Pool with default settings; used by tests and one-off tools.
pub async fn connect(database_url: &str) -> Result<DbPool> {
    connect_with(&DbSettings::new(database_url)).await
}

pub async fn connect_with(settings: &DbSettings) -> Result<DbPool> {
    debug!(
        max_connections = settings.max_connections,
        acquire_timeout_secs = settings.acquire_timeout.as_secs(),
        "Opening Postgres pool"
    );
    PgPoolOptions::new()
        .max_connections(settings.max_connections)
        .acquire_timeout(settings.acquire_timeout)
        .connect(&settings.database_url)
        .await
        .with_context(|| "failed to connect to Postgres")
}

/// Applies the embedded staging and canonical schema migrations.
pub async fn run_migrations(pool: &DbPool) -> Result<()> {
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .with_context(|| "failed to run database migrations")
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect();
        move |key: &str| vars.get(key).cloned()
    }

    #[test]
    fn settings_fall_back_to_project_url_and_defaults() {
        let settings =
            DbSettings::from_lookup(lookup(&[("LIPOWERLINE_DATABASE_URL", "postgres://lp")]))
                .expect("settings");
        assert_eq!(settings, DbSettings::new("postgres://lp"));
    }

    #[test]
    fn settings_read_pool_overrides() {
        let settings = DbSettings::from_lookup(lookup(&[
            ("DATABASE_URL", "postgres://main"),
            ("LIPOWERLINE_DATABASE_URL", "postgres://ignored"),
            ("LIPOWERLINE_DB_MAX_CONNECTIONS", " 4 "),
            ("LIPOWERLINE_DB_ACQUIRE_TIMEOUT_SECS", "30"),
        ]))
        .expect("settings");
        assert_eq!(settings.database_url, "postgres://main");
        assert_eq!(settings.max_connections, 4);
        assert_eq!(settings.acquire_timeout, Duration::from_secs(30));
    }

    #[test]
    fn settings_reject_missing_url_and_bad_pool_values() {
        assert!(DbSettings::from_lookup(lookup(&[])).is_err());
        assert!(DbSettings::from_lookup(lookup(&[
            ("DATABASE_URL", "postgres://main"),
            ("LIPOWERLINE_DB_MAX_CONNECTIONS", "0"),
        ]))
        .is_err());
        assert!(DbSettings::from_lookup(lookup(&[
            ("DATABASE_URL", "postgres://main"),
            ("LIPOWERLINE_DB_ACQUIRE_TIMEOUT_SECS", "soon"),
        ]))
        .is_err());
    }
}
