// ⚙️ Configuration
// Everything comes from the environment (with `.env` loaded first). Paths
// default to locations under PROJECT_PATH.

use crate::pipeline::RetryPolicy;
use crate::reconciliation::FormerFoundersPolicy;
use anyhow::{anyhow, Context, Result};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub level: log::LevelFilter,
    pub file: PathBuf,
}

#[derive(Clone, Debug)]
pub struct Config {
    pub project_path: PathBuf,
    pub download_dir: PathBuf,
    pub database_path: PathBuf,
    pub logging: LoggingConfig,
    pub max_retries: u32,
    pub retry_delay: Duration,
    pub update_interval: Duration,
    pub former_founders_policy: FormerFoundersPolicy,
}

impl Config {
    /// Load `.env` (if any) and read the process environment
    pub fn from_env() -> Result<Self> {
        dotenv::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let project_path = PathBuf::from(
            get("PROJECT_PATH").ok_or_else(|| anyhow!("PROJECT_PATH environment variable not set"))?,
        );

        let download_dir = get("DOWNLOAD_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|| project_path.join("downloads"));

        let database_path = get("DATABASE_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|| project_path.join("founders.db"));

        let log_file = get("LOG_FILE")
            .map(PathBuf::from)
            .unwrap_or_else(|| project_path.join("parser_inn.log"));

        let level = parse_or("LOG_LEVEL", get("LOG_LEVEL"), log::LevelFilter::Info)?;
        let max_retries = parse_or("MAX_RETRIES", get("MAX_RETRIES"), 3u32)?;
        let retry_delay_secs = parse_or("RETRY_DELAY_SECS", get("RETRY_DELAY_SECS"), 5u64)?;
        let interval_hours = parse_or("UPDATE_INTERVAL_HOURS", get("UPDATE_INTERVAL_HOURS"), 24u64)?;
        let former_founders_policy = parse_or(
            "FORMER_FOUNDERS_POLICY",
            get("FORMER_FOUNDERS_POLICY"),
            FormerFoundersPolicy::default(),
        )?;

        if max_retries == 0 {
            return Err(anyhow!("MAX_RETRIES must be at least 1"));
        }
        if interval_hours == 0 {
            return Err(anyhow!("UPDATE_INTERVAL_HOURS must be at least 1"));
        }

        Ok(Self {
            project_path,
            download_dir,
            database_path,
            logging: LoggingConfig {
                level,
                file: log_file,
            },
            max_retries,
            retry_delay: Duration::from_secs(retry_delay_secs),
            update_interval: Duration::from_secs(interval_hours * 60 * 60),
            former_founders_policy,
        })
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.max_retries, self.retry_delay)
    }
}

fn parse_or<T>(key: &str, raw: Option<String>, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match raw {
        None => Ok(default),
        Some(raw) => raw
            .parse::<T>()
            .map_err(|e| anyhow!("{}", e))
            .with_context(|| format!("Invalid value {:?} for {}", raw, key)),
    }
}
