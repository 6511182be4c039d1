// Copyright (c) 2025 SOLARE S.R.O.
//
// This file is part of nest-exporter.
//
// Licensed under the Creative Commons Attribution-NonCommercial-NoDerivatives 4.0 International
// (CC BY-NC-ND 4.0). You may use and share this file for non-commercial purposes only and you may not
// create derivatives. See <https://creativecommons.org/licenses/by-nc-nd/4.0/>.
//
// This software is provided "AS IS", without warranty of any kind.
//
// For commercial licensing, please contact: info@solare.cz

use anyhow::{Context, Result, bail};
use chrono::TimeDelta;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::cli::Cli;

pub const PROJECT_ID_ENV: &str = "NEST_PROJECT_ID";
/// Longest accepted cache TTL (one day)
pub const MAX_TTL_SECS: u64 = 86_400;
pub const MAX_RETRIES: u32 = 10;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ExporterConfig {
    #[serde(default)]
    pub web: WebSettings,
    #[serde(default)]
    pub nest: NestSettings,
    #[serde(default)]
    pub cache: CacheSettings,
    #[serde(default)]
    pub auth: AuthSettings,
    #[serde(default)]
    pub metrics: MetricsSettings,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WebSettings {
    #[serde(default = "default_listen_address")]
    pub listen_address: String,
    #[serde(default = "default_telemetry_path")]
    pub telemetry_path: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NestSettings {
    #[serde(default)]
    pub project_id: Option<String>,
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CacheSettings {
    #[serde(default = "default_ttl_secs")]
    pub ttl_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AuthSettings {
    #[serde(default = "default_client_secret")]
    pub client_secret: PathBuf,
    /// Defaults to `~/.nest-metrics-credentials.json`
    #[serde(default)]
    pub credentials_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct MetricsSettings {
    #[serde(default)]
    pub room_label: RoomLabel,
    /// Also export Fahrenheit copies of the temperature gauges
    #[serde(default)]
    pub fahrenheit: bool,
}

/// Room label for a thermostat that sits directly in a structure
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RoomLabel {
    /// Repeat the structure name
    #[default]
    Structure,
    /// Leave the label empty
    Empty,
}

fn default_listen_address() -> String {
    ":9810".to_owned()
}

fn default_telemetry_path() -> String {
    "/metrics".to_owned()
}

fn default_api_base_url() -> String {
    nest_sdm::DEFAULT_API_BASE_URL.to_owned()
}

fn default_request_timeout_secs() -> u64 {
    10
}

fn default_max_retries() -> u32 {
    3
}

fn default_retry_delay_ms() -> u64 {
    500
}

fn default_ttl_secs() -> u64 {
    15
}

fn default_client_secret() -> PathBuf {
    PathBuf::from("client_secret.json")
}

impl Default for WebSettings {
    fn default() -> Self {
        Self {
            listen_address: default_listen_address(),
            telemetry_path: default_telemetry_path(),
        }
    }
}

impl Default for NestSettings {
    fn default() -> Self {
        Self {
            project_id: None,
            api_base_url: default_api_base_url(),
            request_timeout_secs: default_request_timeout_secs(),
            max_retries: default_max_retries(),
            retry_delay_ms: default_retry_delay_ms(),
        }
    }
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            ttl_secs: default_ttl_secs(),
        }
    }
}

impl Default for AuthSettings {
    fn default() -> Self {
        Self {
            client_secret: default_client_secret(),
            credentials_path: None,
        }
    }
}

impl ExporterConfig {
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        toml::from_str(&content).with_context(|| "Failed to parse config TOML")
    }

    /// Config file (if any) with flags and `NEST_PROJECT_ID` applied, validated
    pub fn load(cli: &Cli) -> Result<Self> {
        let mut config = match &cli.config_file {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_cli(cli, std::env::var(PROJECT_ID_ENV).ok());
        config.validate()?;
        Ok(config)
    }

    /// Flags win over file values; the environment only fills a missing project id
    pub fn apply_cli(&mut self, cli: &Cli, env_project_id: Option<String>) {
        if let Some(address) = &cli.listen_address {
            self.web.listen_address.clone_from(address);
        }
        if let Some(path) = &cli.telemetry_path {
            self.web.telemetry_path.clone_from(path);
        }
        if let Some(secret) = &cli.client_secret {
            self.auth.client_secret.clone_from(secret);
        }
        if cli.project_id.is_some() {
            self.nest.project_id.clone_from(&cli.project_id);
        }
        if self.nest.project_id.is_none() {
            self.nest.project_id = env_project_id.filter(|id| !id.is_empty());
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.project_id().is_none() {
            bail!("nest.project_id must be set (flag, config file or {PROJECT_ID_ENV})");
        }
        if !self.web.telemetry_path.starts_with('/') || self.web.telemetry_path == "/" {
            bail!("web.telemetry_path must be an absolute path other than '/'");
        }
        if self.cache.ttl_secs == 0 || self.cache.ttl_secs > MAX_TTL_SECS {
            bail!("cache.ttl_secs must be between 1 and {MAX_TTL_SECS}");
        }
        if self.nest.max_retries == 0 || self.nest.max_retries > MAX_RETRIES {
            bail!("nest.max_retries must be between 1 and {MAX_RETRIES}");
        }
        if self.nest.request_timeout_secs == 0 {
            bail!("nest.request_timeout_secs must be greater than zero");
        }
        bind_address(&self.web.listen_address)?;
        Ok(())
    }

    pub fn project_id(&self) -> Option<&str> {
        self.nest
            .project_id
            .as_deref()
            .filter(|id| !id.trim().is_empty())
    }

    pub fn bind_address(&self) -> Result<String> {
        bind_address(&self.web.listen_address)
    }

    /// Cache TTL, clamped to [`MAX_TTL_SECS`]
    pub fn ttl(&self) -> TimeDelta {
        let secs = i64::try_from(self.cache.ttl_secs.min(MAX_TTL_SECS)).unwrap_or(i64::MAX);
        TimeDelta::try_seconds(secs).unwrap_or(TimeDelta::MAX)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.nest.request_timeout_secs)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.nest.retry_delay_ms)
    }

    /// Bound on one whole device fetch: every attempt timing out plus the
    /// doubling backoff between attempts
    pub fn fetch_budget(&self) -> Duration {
        let attempts = self.nest.max_retries.clamp(1, MAX_RETRIES);
        let mut budget = self.request_timeout().saturating_mul(attempts);
        let mut delay = self.retry_delay();
        for _ in 1..attempts {
            budget = budget.saturating_add(delay);
            delay = delay.saturating_mul(2);
        }
        budget
    }

    pub fn credentials_path(&self) -> PathBuf {
        self.auth
            .credentials_path
            .clone()
            .unwrap_or_else(nest_sdm::default_credentials_path)
    }
}

/// `:9810` binds every interface; `host:port` is passed through
pub fn bind_address(listen_address: &str) -> Result<String> {
    let (host, port) = listen_address
        .rsplit_once(':')
        .with_context(|| format!("listen address '{listen_address}' has no port"))?;
    port.parse::<u16>()
        .with_context(|| format!("invalid port in listen address '{listen_address}'"))?;

    if host.is_empty() {
        Ok(format!("0.0.0.0:{port}"))
    } else {
        Ok(listen_address.to_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn cli() -> Cli {
        Cli::default()
    }

    #[test]
    fn defaults_match_documented_values() {
        let config = ExporterConfig::default();
        assert_eq!(config.web.listen_address, ":9810");
        assert_eq!(config.web.telemetry_path, "/metrics");
        assert_eq!(config.cache.ttl_secs, 15);
        assert_eq!(config.auth.client_secret, PathBuf::from("client_secret.json"));
        assert_eq!(config.metrics.room_label, RoomLabel::Structure);
        assert!(!config.metrics.fahrenheit);
    }

    #[test]
    fn partial_file_keeps_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
[nest]
project_id = "from-file"

[metrics]
room_label = "empty"
fahrenheit = true
"#
        )
        .unwrap();

        let config = ExporterConfig::from_file(file.path()).unwrap();
        assert_eq!(config.project_id(), Some("from-file"));
        assert_eq!(config.metrics.room_label, RoomLabel::Empty);
        assert!(config.metrics.fahrenheit);
        assert_eq!(config.web.listen_address, ":9810");
        assert_eq!(config.nest.max_retries, 3);
    }

    #[test]
    fn flags_override_file_and_env_fills_gaps() {
        let mut config = ExporterConfig::default();
        config.nest.project_id = Some("from-file".to_owned());

        let mut flags = cli();
        flags.listen_address = Some("127.0.0.1:1234".to_owned());
        config.apply_cli(&flags, Some("from-env".to_owned()));
        assert_eq!(config.project_id(), Some("from-file"));
        assert_eq!(config.web.listen_address, "127.0.0.1:1234");

        flags.project_id = Some("from-flag".to_owned());
        config.apply_cli(&flags, Some("from-env".to_owned()));
        assert_eq!(config.project_id(), Some("from-flag"));

        let mut empty = ExporterConfig::default();
        empty.apply_cli(&cli(), Some("from-env".to_owned()));
        assert_eq!(empty.project_id(), Some("from-env"));
    }

    #[test]
    fn missing_project_id_fails_validation() {
        let config = ExporterConfig::default();
        assert!(config.validate().is_err());
    }

    #[test]
    fn bad_telemetry_path_fails_validation() {
        let mut config = ExporterConfig::default();
        config.nest.project_id = Some("p".to_owned());
        config.web.telemetry_path = "metrics".to_owned();
        assert!(config.validate().is_err());

        config.web.telemetry_path = "/".to_owned();
        assert!(config.validate().is_err());
    }

    #[test]
    fn ttl_is_bounded() {
        let mut config = ExporterConfig::default();
        config.nest.project_id = Some("p".to_owned());
        config.cache.ttl_secs = 10_000_000_000_000;
        assert!(config.validate().is_err());

        config.cache.ttl_secs = MAX_TTL_SECS;
        assert!(config.validate().is_ok());
        assert_eq!(config.ttl(), TimeDelta::days(1));

        // Unvalidated values are clamped rather than overflowing
        config.cache.ttl_secs = u64::MAX;
        assert_eq!(config.ttl(), TimeDelta::days(1));
        assert!(chrono::Utc::now().checked_add_signed(config.ttl()).is_some());
    }

    #[test]
    fn retries_are_bounded() {
        let mut config = ExporterConfig::default();
        config.nest.project_id = Some("p".to_owned());
        config.nest.max_retries = 0;
        assert!(config.validate().is_err());
        config.nest.max_retries = MAX_RETRIES + 1;
        assert!(config.validate().is_err());
    }

    #[test]
    fn fetch_budget_covers_every_retry() {
        let config = ExporterConfig::default();
        // 3 attempts of 10s plus 500ms and 1s of backoff
        assert_eq!(config.fetch_budget(), Duration::from_millis(31_500));

        let mut single = ExporterConfig::default();
        single.nest.max_retries = 1;
        assert_eq!(single.fetch_budget(), single.request_timeout());
    }

    #[test]
    fn listen_address_forms() {
        assert_eq!(bind_address(":9810").unwrap(), "0.0.0.0:9810");
        assert_eq!(bind_address("127.0.0.1:80").unwrap(), "127.0.0.1:80");
        assert_eq!(bind_address("localhost:9810").unwrap(), "localhost:9810");
        assert!(bind_address("9810").is_err());
        assert!(bind_address(":http").is_err());
    }

    #[test]
    fn unknown_room_label_is_rejected() {
        let result: Result<ExporterConfig, _> =
            toml::from_str("[metrics]\nroom_label = \"floor\"\n");
        assert!(result.is_err());
    }
}
