//! Server configuration, read from the environment.
//!
//! Every variable is looked up with the `CV_EXPORT_` prefix first and then
//! without it, so `REDIS_URL` or `WORKER_CONCURRENCY` set for other services
//! are picked up too.

use anyhow::{bail, Context};
use std::fmt;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

const PREFIX: &str = "CV_EXPORT_";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    Memory,
    Redis,
}

impl FromStr for StoreBackend {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "memory" | "mem" => Ok(StoreBackend::Memory),
            "redis" => Ok(StoreBackend::Redis),
            other => bail!("unknown job store backend '{other}' (expected memory or redis)"),
        }
    }
}

impl fmt::Display for StoreBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreBackend::Memory => write!(f, "memory"),
            StoreBackend::Redis => write!(f, "redis"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub bind_addr: SocketAddr,
    pub job_ttl: Duration,
    pub sweep_interval: Duration,
    pub render_timeout: Duration,
    pub output_dir: PathBuf,
    /// Base of the URLs handed out for rendered files, without trailing slash.
    pub public_base_url: String,
    pub worker_concurrency: usize,
    pub store: StoreBackend,
    pub redis_url: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
            job_ttl: Duration::from_secs(600),
            sweep_interval: Duration::from_secs(60),
            render_timeout: Duration::from_secs(60),
            output_dir: PathBuf::from("./exports"),
            public_base_url: "http://localhost:8080".to_string(),
            worker_concurrency: 4,
            store: StoreBackend::Memory,
            redis_url: "redis://127.0.0.1/".to_string(),
        }
    }
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds a config from an arbitrary variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let var = |name: &str| {
            lookup(&format!("{PREFIX}{name}"))
                .filter(|s| !s.trim().is_empty())
                .or_else(|| lookup(name).filter(|s| !s.trim().is_empty()))
        };
        let defaults = Self::default();

        let bind_addr = parse_or(var("BIND_ADDR"), "BIND_ADDR", defaults.bind_addr)?;
        let job_ttl = secs_or(var("JOB_TTL_SECS"), "JOB_TTL_SECS", defaults.job_ttl)?;
        let sweep_interval = secs_or(
            var("SWEEP_INTERVAL_SECS"),
            "SWEEP_INTERVAL_SECS",
            defaults.sweep_interval,
        )?;
        let render_timeout = secs_or(
            var("RENDER_TIMEOUT_SECS"),
            "RENDER_TIMEOUT_SECS",
            defaults.render_timeout,
        )?;
        let output_dir = var("OUTPUT_DIR")
            .map(PathBuf::from)
            .unwrap_or(defaults.output_dir);
        let public_base_url = var("PUBLIC_BASE_URL")
            .map(|u| u.trim_end_matches('/').to_string())
            .unwrap_or(defaults.public_base_url);
        let worker_concurrency = parse_or(
            var("WORKER_CONCURRENCY"),
            "WORKER_CONCURRENCY",
            defaults.worker_concurrency,
        )?;
        let store = parse_or(var("JOB_STORE"), "JOB_STORE", defaults.store)?;
        let redis_url = var("REDIS_URL").unwrap_or(defaults.redis_url);

        let config = Self {
            bind_addr,
            job_ttl,
            sweep_interval,
            render_timeout,
            output_dir,
            public_base_url,
            worker_concurrency,
            store,
            redis_url,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.job_ttl.is_zero() {
            bail!("job TTL must be positive");
        }
        if self.sweep_interval.is_zero() {
            bail!("sweep interval must be positive");
        }
        if self.render_timeout.is_zero() {
            bail!("render timeout must be positive");
        }
        if self.worker_concurrency == 0 {
            bail!("worker concurrency must be at least 1");
        }
        // a job still rendering when its record expires could never be reported
        if self.render_timeout >= self.job_ttl {
            bail!(
                "render timeout ({}s) must be shorter than the job TTL ({}s)",
                self.render_timeout.as_secs(),
                self.job_ttl.as_secs()
            );
        }
        Ok(())
    }
}

fn parse_or<T>(value: Option<String>, name: &str, default: T) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: fmt::Display,
{
    match value {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|e| anyhow::anyhow!("{e}"))
            .with_context(|| format!("{PREFIX}{name} has an invalid value '{raw}'")),
        None => Ok(default),
    }
}

fn secs_or(value: Option<String>, name: &str, default: Duration) -> anyhow::Result<Duration> {
    let default_secs = default.as_secs();
    parse_or(value, name, default_secs).map(Duration::from_secs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(vars: &[(&str, &str)]) -> anyhow::Result<Config> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = config_from(&[]).unwrap();
        assert_eq!(config.bind_addr.port(), 8080);
        assert_eq!(config.job_ttl, Duration::from_secs(600));
        assert_eq!(config.worker_concurrency, 4);
        assert_eq!(config.store, StoreBackend::Memory);
        assert_eq!(config.public_base_url, "http://localhost:8080");
    }

    #[test]
    fn test_prefixed_variable_wins_over_plain() {
        let config = config_from(&[
            ("CV_EXPORT_REDIS_URL", "redis://cache:6379/"),
            ("REDIS_URL", "redis://other/"),
            ("WORKER_CONCURRENCY", "8"),
        ])
        .unwrap();
        assert_eq!(config.redis_url, "redis://cache:6379/");
        assert_eq!(config.worker_concurrency, 8);
    }

    #[test]
    fn test_public_base_url_loses_trailing_slash() {
        let config = config_from(&[("CV_EXPORT_PUBLIC_BASE_URL", "https://cv.example.com/")]).unwrap();
        assert_eq!(config.public_base_url, "https://cv.example.com");
    }

    #[test]
    fn test_store_backend_parsing() {
        let config = config_from(&[("CV_EXPORT_JOB_STORE", "Redis")]).unwrap();
        assert_eq!(config.store, StoreBackend::Redis);
        assert!(config_from(&[("CV_EXPORT_JOB_STORE", "postgres")]).is_err());
    }

    #[test]
    fn test_invalid_number_is_an_error() {
        let err = config_from(&[("CV_EXPORT_JOB_TTL_SECS", "ten")]).unwrap_err();
        assert!(format!("{err:#}").contains("CV_EXPORT_JOB_TTL_SECS"));
    }

    #[test]
    fn test_validation() {
        assert!(config_from(&[("CV_EXPORT_JOB_TTL_SECS", "0")]).is_err());
        assert!(config_from(&[("CV_EXPORT_WORKER_CONCURRENCY", "0")]).is_err());
        assert!(config_from(&[("CV_EXPORT_RENDER_TIMEOUT_SECS", "0")]).is_err());
        assert!(config_from(&[
            ("CV_EXPORT_JOB_TTL_SECS", "30"),
            ("CV_EXPORT_RENDER_TIMEOUT_SECS", "30"),
        ])
        .is_err());
        assert!(config_from(&[
            ("CV_EXPORT_JOB_TTL_SECS", "30"),
            ("CV_EXPORT_RENDER_TIMEOUT_SECS", "10"),
        ])
        .is_ok());
    }
}
