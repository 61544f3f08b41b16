use figment::{
    providers::{Env, Format, Json, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

use crate::util::RetryPolicy;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] figment::Error),
    #[error("invalid setting `{key}`: {reason}")]
    Invalid { key: &'static str, reason: String },
}

fn invalid(key: &'static str, reason: impl Into<String>) -> ConfigError {
    ConfigError::Invalid {
        key,
        reason: reason.into(),
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    pub check_interval_secs: u64,
    pub request_timeout_secs: u64,
    pub detection_attempts: u32,
    pub detection_backoff_ms: u64,

    pub vcs_enabled: bool,
    pub vcs_attempts: u32,
    pub vcs_backoff_ms: u64,
    pub git_binary: String,
    pub repo_dir: PathBuf,
    pub commit_paths: Vec<String>,
    pub commit_message_max_len: usize,

    pub record_file: PathBuf,
    pub record_key: String,
    pub updated_by: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remote_url: Option<String>,

    pub dns_enabled: bool,
    pub dns_resolver: String,
    pub dns_query: String,
    pub http_endpoints: Vec<String>,

    pub health_threshold: u32,
    pub max_recent_errors: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status_file: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notify_webhook: Option<String>,

    pub manual_trigger_limit: usize,
    pub manual_trigger_window_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            check_interval_secs: 300,
            request_timeout_secs: 10,
            detection_attempts: 3,
            detection_backoff_ms: 500,
            vcs_enabled: true,
            vcs_attempts: 3,
            vcs_backoff_ms: 2000,
            git_binary: "git".into(),
            repo_dir: PathBuf::from("."),
            commit_paths: Vec::new(),
            commit_message_max_len: 120,
            record_file: PathBuf::from("ip.json"),
            record_key: "ip".into(),
            updated_by: "addrwatch".into(),
            remote_url: None,
            dns_enabled: true,
            // OpenDNS answers myip.opendns.com with the caller's address
            dns_resolver: "208.67.222.222".into(),
            dns_query: "myip.opendns.com".into(),
            http_endpoints: vec![
                "https://api.ipify.org".into(),
                "https://ifconfig.me/ip".into(),
                "https://icanhazip.com".into(),
            ],
            health_threshold: 5,
            max_recent_errors: 10,
            status_file: None,
            notify_webhook: None,
            manual_trigger_limit: 3,
            manual_trigger_window_secs: 60,
        }
    }
}

impl Config {
    /// Loads defaults, then `addrwatch.toml`, `addrwatch.json` and
    /// `ADDRWATCH_*` environment variables, and validates the result.
    pub fn load() -> Result<Self, ConfigError> {
        Self::from_figment(
            Figment::from(Serialized::defaults(Config::default()))
                .merge(Toml::file("addrwatch.toml"))
                .merge(Json::file("addrwatch.json"))
                .merge(Env::prefixed("ADDRWATCH_")),
        )
    }

    pub fn from_figment(figment: Figment) -> Result<Self, ConfigError> {
        let config: Config = figment.extract()?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.check_interval_secs == 0 {
            return Err(invalid("check_interval_secs", "must be greater than zero"));
        }
        if self.request_timeout_secs == 0 {
            return Err(invalid("request_timeout_secs", "must be greater than zero"));
        }
        if self.detection_attempts == 0 {
            return Err(invalid("detection_attempts", "must be at least 1"));
        }
        if self.vcs_attempts == 0 {
            return Err(invalid("vcs_attempts", "must be at least 1"));
        }
        if self.health_threshold == 0 {
            return Err(invalid("health_threshold", "must be at least 1"));
        }
        if self.max_recent_errors == 0 {
            return Err(invalid("max_recent_errors", "must be at least 1"));
        }
        if self.commit_message_max_len < 16 {
            return Err(invalid("commit_message_max_len", "must be at least 16"));
        }
        if self.manual_trigger_limit == 0 || self.manual_trigger_window_secs == 0 {
            return Err(invalid(
                "manual_trigger_limit",
                "limit and window must both be greater than zero",
            ));
        }
        if self.record_key.trim().is_empty() {
            return Err(invalid("record_key", "must not be empty"));
        }
        if self.vcs_enabled && self.git_binary.trim().is_empty() {
            return Err(invalid("git_binary", "must not be empty"));
        }
        if !self.dns_enabled && self.http_endpoints.is_empty() {
            return Err(invalid(
                "http_endpoints",
                "at least one detection strategy is required",
            ));
        }
        if self.dns_enabled {
            self.dns_resolver
                .parse::<IpAddr>()
                .map_err(|e| invalid("dns_resolver", e.to_string()))?;
            if self.dns_query.trim().is_empty() {
                return Err(invalid("dns_query", "must not be empty"));
            }
        }
        for endpoint in &self.http_endpoints {
            reqwest::Url::parse(endpoint)
                .map_err(|e| invalid("http_endpoints", format!("{}: {}", endpoint, e)))?;
        }
        if let Some(ref url) = self.remote_url {
            reqwest::Url::parse(url).map_err(|e| invalid("remote_url", e.to_string()))?;
        }
        if let Some(ref url) = self.notify_webhook {
            reqwest::Url::parse(url).map_err(|e| invalid("notify_webhook", e.to_string()))?;
        }
        Ok(())
    }

    pub fn check_interval(&self) -> Duration {
        Duration::from_secs(self.check_interval_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn manual_trigger_window(&self) -> Duration {
        Duration::from_secs(self.manual_trigger_window_secs)
    }

    pub fn detection_retry(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.detection_attempts,
            Duration::from_millis(self.detection_backoff_ms),
        )
    }

    pub fn vcs_retry(&self) -> RetryPolicy {
        RetryPolicy::new(self.vcs_attempts, Duration::from_millis(self.vcs_backoff_ms))
    }

    /// The record file as seen from the process working directory.
    pub fn record_path(&self) -> PathBuf {
        if self.record_file.is_absolute() {
            self.record_file.clone()
        } else {
            self.repo_dir.join(&self.record_file)
        }
    }

    /// Paths handed to `git add`, relative to `repo_dir`. Without explicit
    /// `commit_paths` only the record file is staged.
    pub fn commit_targets(&self) -> Vec<String> {
        if self.commit_paths.is_empty() {
            vec![self.record_file.to_string_lossy().into_owned()]
        } else {
            self.commit_paths.clone()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn with_toml(toml: &str) -> Result<Config, ConfigError> {
        Config::from_figment(
            Figment::from(Serialized::defaults(Config::default())).merge(Toml::string(toml)),
        )
    }

    #[test]
    fn defaults_are_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.health_threshold, 5);
        assert_eq!(config.check_interval(), Duration::from_secs(300));
    }

    #[test]
    fn toml_overrides_defaults() {
        let config = with_toml(
            r#"
            check_interval_secs = 60
            remote_url = "https://example.com/ip.json"
            http_endpoints = ["https://api.ipify.org"]
            "#,
        )
        .unwrap();
        assert_eq!(config.check_interval_secs, 60);
        assert_eq!(config.remote_url.as_deref(), Some("https://example.com/ip.json"));
        assert_eq!(config.http_endpoints.len(), 1);
        // untouched keys keep their defaults
        assert_eq!(config.record_key, "ip");
    }

    #[test]
    fn zero_interval_is_rejected() {
        let err = with_toml("check_interval_secs = 0").unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Invalid { key: "check_interval_secs", .. }
        ));
    }

    #[test]
    fn no_strategies_is_rejected() {
        let err = with_toml("dns_enabled = false\nhttp_endpoints = []").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { key: "http_endpoints", .. }));
    }

    #[test]
    fn bad_resolver_and_urls_are_rejected() {
        assert!(with_toml(r#"dns_resolver = "not-an-ip""#).is_err());
        assert!(with_toml(r#"remote_url = "::nope""#).is_err());
        assert!(with_toml(r#"http_endpoints = ["nope"]"#).is_err());
    }

    #[test]
    fn wrong_type_is_a_load_error() {
        let err = with_toml(r#"health_threshold = "five""#).unwrap_err();
        assert!(matches!(err, ConfigError::Load(_)));
    }

    #[test]
    fn record_path_is_relative_to_repo() {
        let config = with_toml(r#"repo_dir = "/srv/mirror""#).unwrap();
        assert_eq!(config.record_path(), PathBuf::from("/srv/mirror/ip.json"));
    }

    #[test]
    fn only_the_record_is_staged_by_default() {
        let config = with_toml(r#"status_file = "status.json""#).unwrap();
        assert_eq!(config.commit_targets(), ["ip.json"]);

        let config = with_toml(r#"commit_paths = ["ip.json", "README.md"]"#).unwrap();
        assert_eq!(config.commit_targets(), ["ip.json", "README.md"]);
    }
}
