//! Configuration module
//!
//! This module provides the configuration of the readiness server: the
//! readiness route and its CPU threshold, the upstream proxy API that is polled
//! until its routing data settles, and the CPU sampler settings.

use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

// Common constants
const SERVER_PORT: u16 = 8080;
const READY_PATH: &str = "/ready";
const READY_CPU_LIMIT: f64 = 0.8;
const TRAEFIK_API_HOST: &str = "localhost";
const TRAEFIK_API_PORT: u16 = 9000;
const TRAEFIK_API_RAWDATA_PATH: &str = "/api/rawdata";
const RAWDATA_POLL_INTERVAL_MS: u64 = 1000;
const CPU_SAMPLE_INTERVAL_SECS: u64 = 10;
const CGROUP_ROOT: &str = "/sys/fs/cgroup";

/// Readiness server configuration
#[derive(Clone, Debug)]
pub struct ReadinessConfig {
    pub server_port: u16,
    pub environment: String,
    pub log_format: String,
    // Readiness route
    pub ready_path: String,
    pub ready_cpu_limit: f64,
    pub dry_run: bool,
    // Upstream proxy API
    pub traefik_api_host: String,
    pub traefik_api_port: u16,
    pub traefik_api_rawdata_path: String,
    pub rawdata_poll_interval_ms: u64,
    // CPU sampler
    pub cpu_sample_interval_secs: u64,
    pub cgroup_root: PathBuf,
}

impl Default for ReadinessConfig {
    fn default() -> Self {
        Self {
            server_port: SERVER_PORT,
            environment: "development".to_string(),
            log_format: "text".to_string(),
            ready_path: READY_PATH.to_string(),
            ready_cpu_limit: READY_CPU_LIMIT,
            dry_run: false,
            traefik_api_host: TRAEFIK_API_HOST.to_string(),
            traefik_api_port: TRAEFIK_API_PORT,
            traefik_api_rawdata_path: TRAEFIK_API_RAWDATA_PATH.to_string(),
            rawdata_poll_interval_ms: RAWDATA_POLL_INTERVAL_MS,
            cpu_sample_interval_secs: CPU_SAMPLE_INTERVAL_SECS,
            cgroup_root: PathBuf::from(CGROUP_ROOT),
        }
    }
}

/// Application configuration.
#[derive(Clone, Debug)]
pub struct Config(pub Box<ReadinessConfig>);

impl Config {
    fn inner(&self) -> &ReadinessConfig {
        &self.0
    }

    pub fn from_env() -> Result<Self, anyhow::Error> {
        let config = ReadinessConfig::from_env()?;
        Ok(Config(Box::new(config)))
    }

    pub fn validate(&self) -> Result<(), anyhow::Error> {
        self.inner().validate()
    }

    // Convenience getters for common fields
    pub fn server_port(&self) -> u16 {
        self.inner().server_port
    }

    pub fn environment(&self) -> &str {
        &self.inner().environment
    }

    pub fn log_json(&self) -> bool {
        self.inner().log_format.eq_ignore_ascii_case("json")
    }

    pub fn ready_path(&self) -> &str {
        &self.inner().ready_path
    }

    pub fn ready_cpu_limit(&self) -> f64 {
        self.inner().ready_cpu_limit
    }

    pub fn dry_run(&self) -> bool {
        self.inner().dry_run
    }

    /// Full URL of the upstream raw data endpoint.
    pub fn traefik_api_rawdata_url(&self) -> String {
        let inner = self.inner();
        format!(
            "http://{}:{}{}",
            inner.traefik_api_host, inner.traefik_api_port, inner.traefik_api_rawdata_path
        )
    }

    pub fn rawdata_poll_interval(&self) -> Duration {
        Duration::from_millis(self.inner().rawdata_poll_interval_ms)
    }

    pub fn cpu_sample_interval(&self) -> Duration {
        Duration::from_secs(self.inner().cpu_sample_interval_secs)
    }

    pub fn cgroup_root(&self) -> &Path {
        &self.inner().cgroup_root
    }
}

impl ReadinessConfig {
    pub fn from_env() -> Result<Self, anyhow::Error> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build the configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, anyhow::Error>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = ReadinessConfig::default();

        let config = ReadinessConfig {
            server_port: lookup("PORT")
                .unwrap_or_else(|| SERVER_PORT.to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("PORT must be a valid number"))?,
            environment: lookup("ENVIRONMENT")
                .or_else(|| lookup("APP_ENV"))
                .unwrap_or(defaults.environment),
            log_format: lookup("LOG_FORMAT")
                .map(|s| s.to_lowercase())
                .unwrap_or(defaults.log_format),
            ready_path: lookup("READY_PATH")
                .filter(|s| !s.is_empty())
                .unwrap_or(defaults.ready_path),
            ready_cpu_limit: lookup("READY_CPU_LIMIT")
                .unwrap_or_else(|| READY_CPU_LIMIT.to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("READY_CPU_LIMIT must be a number"))?,
            dry_run: lookup("DRY_RUN")
                .unwrap_or_else(|| "false".to_string())
                .to_lowercase()
                .parse()
                .map_err(|_| anyhow::anyhow!("DRY_RUN must be true or false"))?,
            traefik_api_host: lookup("TRAEFIK_API_HOST")
                .filter(|s| !s.is_empty())
                .unwrap_or(defaults.traefik_api_host),
            traefik_api_port: lookup("TRAEFIK_API_PORT")
                .unwrap_or_else(|| TRAEFIK_API_PORT.to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("TRAEFIK_API_PORT must be a valid number"))?,
            traefik_api_rawdata_path: lookup("TRAEFIK_API_RAWDATA_PATH")
                .filter(|s| !s.is_empty())
                .unwrap_or(defaults.traefik_api_rawdata_path),
            rawdata_poll_interval_ms: lookup("RAWDATA_POLL_INTERVAL_MS")
                .unwrap_or_else(|| RAWDATA_POLL_INTERVAL_MS.to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("RAWDATA_POLL_INTERVAL_MS must be a valid number"))?,
            cpu_sample_interval_secs: lookup("CPU_SAMPLE_INTERVAL_SECS")
                .unwrap_or_else(|| CPU_SAMPLE_INTERVAL_SECS.to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("CPU_SAMPLE_INTERVAL_SECS must be a valid number"))?,
            cgroup_root: lookup("CGROUP_ROOT")
                .filter(|s| !s.is_empty())
                .map(PathBuf::from)
                .unwrap_or(defaults.cgroup_root),
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), anyhow::Error> {
        if !self.ready_path.starts_with('/') {
            return Err(anyhow::anyhow!("READY_PATH must start with '/'"));
        }

        if !self.traefik_api_rawdata_path.starts_with('/') {
            return Err(anyhow::anyhow!(
                "TRAEFIK_API_RAWDATA_PATH must start with '/'"
            ));
        }

        if !(self.ready_cpu_limit > 0.0 && self.ready_cpu_limit <= 1.0) {
            return Err(anyhow::anyhow!(
                "READY_CPU_LIMIT must be in (0, 1], got {}",
                self.ready_cpu_limit
            ));
        }

        if self.cpu_sample_interval_secs == 0 {
            return Err(anyhow::anyhow!(
                "CPU_SAMPLE_INTERVAL_SECS must be greater than zero"
            ));
        }

        if self.rawdata_poll_interval_ms == 0 {
            return Err(anyhow::anyhow!(
                "RAWDATA_POLL_INTERVAL_MS must be greater than zero"
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = Config(Box::new(ReadinessConfig::from_lookup(lookup_from(&[])).unwrap()));

        assert_eq!(config.server_port(), 8080);
        assert_eq!(config.ready_path(), "/ready");
        assert!((config.ready_cpu_limit() - 0.8).abs() < f64::EPSILON);
        assert!(!config.dry_run());
        assert_eq!(
            config.traefik_api_rawdata_url(),
            "http://localhost:9000/api/rawdata"
        );
        assert_eq!(config.cpu_sample_interval(), Duration::from_secs(10));
        assert_eq!(config.rawdata_poll_interval(), Duration::from_secs(1));
        assert_eq!(config.cgroup_root(), Path::new("/sys/fs/cgroup"));
        assert_eq!(config.environment(), "development");
    }

    #[test]
    fn test_overrides() {
        let config = ReadinessConfig::from_lookup(lookup_from(&[
            ("PORT", "9100"),
            ("READY_PATH", "/healthz"),
            ("READY_CPU_LIMIT", "0.5"),
            ("DRY_RUN", "TRUE"),
            ("TRAEFIK_API_HOST", "traefik"),
            ("TRAEFIK_API_PORT", "8081"),
            ("CPU_SAMPLE_INTERVAL_SECS", "2"),
            ("CGROUP_ROOT", "/tmp/cgroup"),
            ("ENVIRONMENT", "prod"),
        ]))
        .unwrap();
        let config = Config(Box::new(config));

        assert_eq!(config.server_port(), 9100);
        assert_eq!(config.ready_path(), "/healthz");
        assert!(config.dry_run());
        assert_eq!(
            config.traefik_api_rawdata_url(),
            "http://traefik:8081/api/rawdata"
        );
        assert_eq!(config.cpu_sample_interval(), Duration::from_secs(2));
        assert_eq!(config.cgroup_root(), Path::new("/tmp/cgroup"));
        assert_eq!(config.environment(), "prod");
    }

    #[test]
    fn test_invalid_port_is_rejected() {
        let result = ReadinessConfig::from_lookup(lookup_from(&[("PORT", "not-a-port")]));
        assert!(result.is_err());
    }

    #[test]
    fn test_unparsable_values_are_rejected() {
        for (key, value) in [
            ("DRY_RUN", "yes"),
            ("RAWDATA_POLL_INTERVAL_MS", "1s"),
            ("CPU_SAMPLE_INTERVAL_SECS", "-3"),
            ("READY_CPU_LIMIT", "high"),
            ("TRAEFIK_API_PORT", "70000"),
        ] {
            let result = ReadinessConfig::from_lookup(lookup_from(&[(key, value)]));
            let err = result.expect_err(key).to_string();
            assert!(err.contains(key), "{key}: {err}");
        }
    }

    #[test]
    fn test_cpu_limit_out_of_range_is_rejected() {
        let result = ReadinessConfig::from_lookup(lookup_from(&[("READY_CPU_LIMIT", "1.5")]));
        assert!(result.is_err());

        let result = ReadinessConfig::from_lookup(lookup_from(&[("READY_CPU_LIMIT", "0")]));
        assert!(result.is_err());
    }

    #[test]
    fn test_zero_sample_interval_is_rejected() {
        let result =
            ReadinessConfig::from_lookup(lookup_from(&[("CPU_SAMPLE_INTERVAL_SECS", "0")]));
        assert!(result.is_err());
    }

    #[test]
    fn test_ready_path_must_be_absolute() {
        let result = ReadinessConfig::from_lookup(lookup_from(&[("READY_PATH", "ready")]));
        assert!(result.is_err());
    }
}
