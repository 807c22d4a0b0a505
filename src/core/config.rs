//! Layered broker configuration: CLI flags > environment > config file > defaults.
//!
//! The bearer token is deliberately not accepted from the config file — CI
//! platforms supply it as a masked secret via flag or environment, and a toml
//! file on disk is exactly where it must not end up.

use crate::constants;
use anyhow::{Context, Result};
use secrecy::SecretString;
use serde::Deserialize;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Fully resolved configuration handed to the broker client and orchestrator.
#[derive(Clone)]
pub struct Config {
    pub broker_addr: String,
    pub broker_token: SecretString,
    /// Region injected as AWS_DEFAULT_REGION/AWS_REGION, when set.
    pub region: Option<String>,
    pub http_timeout: Duration,
    pub retry_attempts: u32,
    pub backoff_base: Duration,
    pub command_timeout: Duration,
    /// Audit trail file; auditing is disabled when unset.
    pub audit_path: Option<PathBuf>,
}

/// Optional on-disk settings (`leaserun.toml`).
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConfigFile {
    #[serde(default)]
    pub broker_addr: Option<String>,
    #[serde(default)]
    pub region: Option<String>,
    #[serde(default)]
    pub http_timeout_secs: Option<u64>,
    #[serde(default)]
    pub retry_attempts: Option<u32>,
    #[serde(default)]
    pub backoff_base_ms: Option<u64>,
    #[serde(default)]
    pub command_timeout_secs: Option<u64>,
    #[serde(default)]
    pub audit_path: Option<PathBuf>,
}

impl ConfigFile {
    /// Load a config file, treating a missing file as empty settings.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = fs::read_to_string(path)
            .with_context(|| format!("read config file {}", path.display()))?;
        toml::from_str(&content)
            .with_context(|| format!("parse config file {}", path.display()))
    }
}

/// Values gathered from CLI flags and environment before the file is merged.
/// Kept partial so `doctor` can report on missing pieces without failing.
#[derive(Default)]
pub struct ConfigParts {
    pub broker_addr: Option<String>,
    pub broker_token: Option<SecretString>,
    pub region: Option<String>,
    pub http_timeout_secs: Option<u64>,
    pub retry_attempts: Option<u32>,
    pub backoff_base_ms: Option<u64>,
    pub command_timeout_secs: Option<u64>,
    pub audit_path: Option<PathBuf>,
    /// Where the config file was loaded from, for diagnostics.
    pub file_path: Option<PathBuf>,
}

impl ConfigParts {
    /// Resolve the config file path: explicit flag, then env var, then
    /// `./leaserun.toml` when present.
    pub fn config_file_path(explicit: Option<PathBuf>) -> Option<PathBuf> {
        if explicit.is_some() {
            return explicit;
        }
        if let Ok(p) = env::var(constants::ENV_CONFIG_FILE) {
            return Some(PathBuf::from(p));
        }
        let default = PathBuf::from(constants::CONFIG_FILE_NAME);
        default.exists().then_some(default)
    }

    /// Layer file settings under any values already present.
    pub fn merge_file(&mut self, file: ConfigFile) {
        self.broker_addr = self.broker_addr.take().or(file.broker_addr);
        self.region = self.region.take().or(file.region);
        self.http_timeout_secs = self.http_timeout_secs.take().or(file.http_timeout_secs);
        self.retry_attempts = self.retry_attempts.take().or(file.retry_attempts);
        self.backoff_base_ms = self.backoff_base_ms.take().or(file.backoff_base_ms);
        self.command_timeout_secs = self
            .command_timeout_secs
            .take()
            .or(file.command_timeout_secs);
        self.audit_path = self.audit_path.take().or(file.audit_path);
    }

    /// Finish resolution, applying defaults and requiring addr and token.
    pub fn finish(self) -> Result<Config> {
        let broker_addr = self
            .broker_addr
            .with_context(|| {
                format!(
                    "broker address not configured (set --broker-addr or {})",
                    constants::ENV_BROKER_ADDR
                )
            })?
            .trim_end_matches('/')
            .to_string();
        let broker_token = self.broker_token.with_context(|| {
            format!(
                "broker token not configured (set --broker-token or {})",
                constants::ENV_BROKER_TOKEN
            )
        })?;
        Ok(Config {
            broker_addr,
            broker_token,
            region: self.region,
            http_timeout: Duration::from_secs(
                self.http_timeout_secs
                    .unwrap_or(constants::DEFAULT_HTTP_TIMEOUT_SECS),
            ),
            retry_attempts: self
                .retry_attempts
                .unwrap_or(constants::DEFAULT_RETRY_ATTEMPTS)
                .max(1),
            backoff_base: Duration::from_millis(
                self.backoff_base_ms
                    .unwrap_or(constants::DEFAULT_BACKOFF_BASE_MS),
            ),
            command_timeout: Duration::from_secs(
                self.command_timeout_secs
                    .unwrap_or(constants::DEFAULT_COMMAND_TIMEOUT_SECS),
            ),
            audit_path: self.audit_path,
        })
    }
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("broker_addr", &self.broker_addr)
            .field("broker_token", &"[REDACTED]")
            .field("region", &self.region)
            .field("http_timeout", &self.http_timeout)
            .field("retry_attempts", &self.retry_attempts)
            .field("backoff_base", &self.backoff_base)
            .field("command_timeout", &self.command_timeout)
            .field("audit_path", &self.audit_path)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn parts_with_required() -> ConfigParts {
        ConfigParts {
            broker_addr: Some("http://broker.local:8200/".to_string()),
            broker_token: Some(SecretString::from("tok")),
            ..Default::default()
        }
    }

    #[test]
    fn test_finish_applies_defaults_and_trims_addr() {
        let cfg = parts_with_required().finish().unwrap();
        assert_eq!(cfg.broker_addr, "http://broker.local:8200");
        assert_eq!(
            cfg.http_timeout,
            Duration::from_secs(constants::DEFAULT_HTTP_TIMEOUT_SECS)
        );
        assert_eq!(cfg.retry_attempts, constants::DEFAULT_RETRY_ATTEMPTS);
        assert_eq!(
            cfg.command_timeout,
            Duration::from_secs(constants::DEFAULT_COMMAND_TIMEOUT_SECS)
        );
        assert!(cfg.audit_path.is_none());
    }

    #[test]
    fn test_finish_requires_addr_and_token() {
        let err = ConfigParts::default().finish().unwrap_err();
        assert!(err.to_string().contains("broker address"));

        let mut parts = ConfigParts::default();
        parts.broker_addr = Some("http://x".into());
        let err = parts.finish().unwrap_err();
        assert!(err.to_string().contains("broker token"));
    }

    #[test]
    fn test_merge_file_does_not_override_flags() {
        let mut parts = parts_with_required();
        parts.retry_attempts = Some(5);
        parts.merge_file(ConfigFile {
            broker_addr: Some("http://from-file".into()),
            retry_attempts: Some(1),
            region: Some("eu-west-1".into()),
            ..Default::default()
        });
        let cfg = parts.finish().unwrap();
        // flag/env values win; file fills gaps
        assert_eq!(cfg.broker_addr, "http://broker.local:8200");
        assert_eq!(cfg.retry_attempts, 5);
        assert_eq!(cfg.region.as_deref(), Some("eu-west-1"));
    }

    #[test]
    fn test_load_missing_file_is_empty() {
        let file = ConfigFile::load(Path::new("/nonexistent/leaserun.toml")).unwrap();
        assert!(file.broker_addr.is_none());
    }

    #[test]
    fn test_load_parses_toml() {
        let mut tmp = NamedTempFile::new().unwrap();
        writeln!(
            tmp,
            "broker_addr = \"http://broker:8200\"\ncommand_timeout_secs = 600"
        )
        .unwrap();
        let file = ConfigFile::load(tmp.path()).unwrap();
        assert_eq!(file.broker_addr.as_deref(), Some("http://broker:8200"));
        assert_eq!(file.command_timeout_secs, Some(600));
    }

    #[test]
    fn test_retry_attempts_floor_of_one() {
        let mut parts = parts_with_required();
        parts.retry_attempts = Some(0);
        assert_eq!(parts.finish().unwrap().retry_attempts, 1);
    }
}
