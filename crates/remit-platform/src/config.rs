use std::time::Duration;

use anyhow::{Context, Result};

const DEFAULT_PUBLISH_TIMEOUT_MS: u64 = 2000;
const DEFAULT_PUBLISH_MAX_ATTEMPTS: u32 = 3;
const DEFAULT_FETCH_TIMEOUT_MS: u64 = 1500;

#[derive(Clone, Debug)]
pub struct ServiceConfig {
    pub database_url: String,
    pub redis_url: String,
    pub http_addr: String,
    pub publish_timeout: Duration,
    pub publish_max_attempts: u32,
    pub fetch_timeout: Duration,
}

impl ServiceConfig {
    pub fn from_env(default_http_addr: &str) -> Result<Self> {
        Self::from_lookup(default_http_addr, true, |name| std::env::var(name).ok())
    }

    /// Board side: reads snapshots from Redis only, so no database is needed.
    pub fn reader_from_env(default_http_addr: &str) -> Result<Self> {
        Self::from_lookup(default_http_addr, false, |name| std::env::var(name).ok())
    }

    fn from_lookup(
        default_http_addr: &str,
        needs_database: bool,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self> {
        let database_url = if needs_database {
            lookup("DATABASE_URL").context("DATABASE_URL is required")?
        } else {
            lookup("DATABASE_URL").unwrap_or_default()
        };
        let redis_url = lookup("REDIS_URL").context("REDIS_URL is required")?;
        let http_addr = lookup("HTTP_ADDR").unwrap_or_else(|| default_http_addr.to_string());

        Ok(Self {
            database_url,
            redis_url,
            http_addr,
            publish_timeout: millis(&lookup, "PUBLISH_TIMEOUT_MS", DEFAULT_PUBLISH_TIMEOUT_MS)?,
            publish_max_attempts: attempts(&lookup)?,
            fetch_timeout: millis(&lookup, "FETCH_TIMEOUT_MS", DEFAULT_FETCH_TIMEOUT_MS)?,
        })
    }
}

fn millis(lookup: &impl Fn(&str) -> Option<String>, name: &str, default: u64) -> Result<Duration> {
    let Some(raw) = lookup(name) else {
        return Ok(Duration::from_millis(default));
    };
    let value: u64 = raw
        .trim()
        .parse()
        .with_context(|| format!("{name} must be a whole number of milliseconds, got {raw:?}"))?;
    if value == 0 {
        anyhow::bail!("{name} must be greater than zero");
    }
    Ok(Duration::from_millis(value))
}

fn attempts(lookup: &impl Fn(&str) -> Option<String>) -> Result<u32> {
    let Some(raw) = lookup("PUBLISH_MAX_ATTEMPTS") else {
        return Ok(DEFAULT_PUBLISH_MAX_ATTEMPTS);
    };
    let value: u32 = raw
        .trim()
        .parse()
        .with_context(|| format!("PUBLISH_MAX_ATTEMPTS must be a positive integer, got {raw:?}"))?;
    if value == 0 {
        anyhow::bail!("PUBLISH_MAX_ATTEMPTS must be at least 1");
    }
    Ok(value)
}
