//! Deploy configuration file.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use sitedeploy_transfer::{RetryPolicy, TargetConfig, UploadPolicy};
use tracing::debug;

use crate::error::DeployError;

/// Environment variable that overrides `target.credentials.password`.
pub const PASSWORD_ENV: &str = "SITEDEPLOY_FTP_PASSWORD";

/// A local directory deployed under one remote base.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PartConfig {
    pub name: String,
    /// Local build directory, relative to the config file.
    pub local_dir: PathBuf,
    /// Remote directory the part lands in, relative to the tenant folder.
    #[serde(default = "default_remote_base")]
    pub remote_base: String,
    /// File or directory names to skip; `*.ext` matches by suffix.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub exclude: Vec<String>,
}

fn default_remote_base() -> String {
    "/httpdocs".into()
}

fn default_parts() -> Vec<PartConfig> {
    vec![PartConfig {
        name: "site".into(),
        local_dir: PathBuf::from("dist"),
        remote_base: default_remote_base(),
        exclude: Vec::new(),
    }]
}

/// Retry and pacing overrides. Missing fields keep their defaults.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadSettings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_attempts: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_base_delay_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub directory_pacing_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub upload_pacing_ms: Option<u64>,
}

impl UploadSettings {
    pub fn to_policy(&self) -> UploadPolicy {
        let defaults = UploadPolicy::default();
        UploadPolicy {
            retry: RetryPolicy {
                max_attempts: self.max_attempts.unwrap_or(defaults.retry.max_attempts),
                base_delay: self
                    .retry_base_delay_ms
                    .map(Duration::from_millis)
                    .unwrap_or(defaults.retry.base_delay),
            },
            directory_pacing: self
                .directory_pacing_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.directory_pacing),
            upload_pacing: self
                .upload_pacing_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.upload_pacing),
        }
    }
}

/// Top-level deploy config.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeployConfig {
    pub target: TargetConfig,
    #[serde(default = "default_parts")]
    pub parts: Vec<PartConfig>,
    #[serde(default)]
    pub upload: UploadSettings,
}

impl DeployConfig {
    /// Reads, overrides and validates a config file.
    pub fn load(path: &Path) -> Result<Self, DeployError> {
        let raw = std::fs::read_to_string(path)?;
        let mut config = Self::from_json(&raw)?;
        config.apply_password_override(std::env::var(PASSWORD_ENV).ok());
        config.validate()?;
        debug!(path = %path.display(), parts = config.parts.len(), "deploy config loaded");
        Ok(config)
    }

    pub fn from_json(raw: &str) -> Result<Self, DeployError> {
        Ok(serde_json::from_str(raw)?)
    }

    /// Replaces the password when `password` is set and non-empty.
    pub fn apply_password_override(&mut self, password: Option<String>) {
        if let Some(password) = password.filter(|p| !p.is_empty()) {
            debug!("FTP password taken from {PASSWORD_ENV}");
            self.target.credentials.password = password;
        }
    }

    pub fn validate(&self) -> Result<(), DeployError> {
        self.target
            .validate()
            .map_err(|e| DeployError::Config(e.to_string()))?;

        if self.parts.is_empty() {
            return Err(DeployError::Config("at least one part is required".into()));
        }
        let mut names = HashSet::new();
        for part in &self.parts {
            if !names.insert(part.name.as_str()) {
                return Err(DeployError::Config(format!(
                    "duplicate part name: {}",
                    part.name
                )));
            }
            if part.remote_base.split('/').any(|s| s == "..") {
                return Err(DeployError::Config(format!(
                    "remote base of part {} escapes the tenant folder",
                    part.name
                )));
            }
        }

        if self.upload.max_attempts == Some(0) {
            return Err(DeployError::Config("maxAttempts must be at least 1".into()));
        }
        Ok(())
    }

    pub fn upload_policy(&self) -> UploadPolicy {
        self.upload.to_policy()
    }
}
