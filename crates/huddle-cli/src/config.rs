use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};

pub struct Config {
    pub db_path: PathBuf,
    pub poll_interval: Duration,
}

impl Config {
    /// Read from the environment (after `.env` has been loaded).
    pub fn from_env() -> Result<Self> {
        let db_path = std::env::var("HUDDLE_DB_PATH").unwrap_or_else(|_| "huddle.db".into());
        let poll_interval_ms: u64 = std::env::var("HUDDLE_POLL_INTERVAL_MS")
            .unwrap_or_else(|_| "1000".into())
            .parse()
            .context("HUDDLE_POLL_INTERVAL_MS must be a number of milliseconds")?;

        Ok(Self {
            db_path: PathBuf::from(db_path),
            poll_interval: Duration::from_millis(poll_interval_ms),
        })
    }
}
