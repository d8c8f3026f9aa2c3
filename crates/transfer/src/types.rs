//! Data types for the upload flow.

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use sitedeploy_ftp::{DEFAULT_PORT, FtpConfig};
use sitedeploy_remote_path::PublicSite;

use crate::TransferError;
use crate::retry::RetryPolicy;

/// How files reach the target.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeployMethod {
    #[default]
    Ftp,
    /// Local copy. Recognised in config files but not supported.
    Copy,
}

/// FTP login for a target.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Credentials {
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    pub user: String,
    #[serde(default)]
    pub password: String,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_timeout_ms() -> u64 {
    30_000
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("password", &"****")
            .field("timeout_ms", &self.timeout_ms)
            .finish()
    }
}

/// One deploy target: where the site lives and how to log in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TargetConfig {
    /// Public hostname the site is served from.
    pub domain: String,
    /// Folder name of the site on the host. Defaults to `domain`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tenant: Option<String>,
    #[serde(default = "default_remote_root")]
    pub remote_root: String,
    pub credentials: Credentials,
    #[serde(default)]
    pub method: DeployMethod,
}

fn default_remote_root() -> String {
    "/".into()
}

impl TargetConfig {
    /// The tenant id used for path sanitization.
    pub fn tenant_id(&self) -> &str {
        match self.tenant.as_deref() {
            Some(t) if !t.trim().is_empty() => t.trim(),
            _ => self.domain.trim(),
        }
    }

    pub fn public_site(&self) -> PublicSite {
        PublicSite {
            domain: self.domain.clone(),
            tenant: self.tenant_id().to_string(),
            remote_root: self.remote_root.clone(),
        }
    }

    pub fn ftp_config(&self) -> FtpConfig {
        FtpConfig {
            host: self.credentials.host.clone(),
            port: self.credentials.port,
            user: self.credentials.user.clone(),
            password: self.credentials.password.clone(),
            timeout: Duration::from_millis(self.credentials.timeout_ms),
        }
    }

    /// Checks that the target can be deployed to over FTP.
    pub fn validate(&self) -> Result<(), TransferError> {
        if self.method != DeployMethod::Ftp {
            return Err(TransferError::Config(format!(
                "deploy method {:?} is not supported",
                self.method
            )));
        }
        if self.credentials.host.trim().is_empty() {
            return Err(TransferError::Config("missing FTP host".into()));
        }
        if self.credentials.user.trim().is_empty() {
            return Err(TransferError::Config("missing FTP user".into()));
        }
        if self.tenant_id().contains('/') {
            return Err(TransferError::Config(format!(
                "tenant must be a single folder name: {}",
                self.tenant_id()
            )));
        }
        Ok(())
    }
}

/// Timing knobs for a batch upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadPolicy {
    pub retry: RetryPolicy,
    /// Pause between directory creations.
    pub directory_pacing: Duration,
    /// Pause between file uploads.
    pub upload_pacing: Duration,
}

impl Default for UploadPolicy {
    fn default() -> Self {
        Self {
            retry: RetryPolicy::default(),
            directory_pacing: Duration::from_millis(50),
            upload_pacing: Duration::from_millis(150),
        }
    }
}

/// A local file and where it should land.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileMapping {
    pub local_path: PathBuf,
    /// Path relative to the local build directory, used in reports.
    pub relative_path: String,
    /// Intended remote location. May still carry tenant or public-root
    /// prefixes; it is resolved against the effective root before use.
    pub remote_path: String,
    /// Public path hint, e.g. `/js/app.js`.
    pub web_path: String,
    /// Name of the deploy part the file belongs to.
    pub part: String,
    pub size_bytes: u64,
}

/// Lifecycle of one file in a batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileState {
    Pending,
    Uploading,
    Retrying,
    Succeeded,
    Failed,
}

impl FileState {
    /// Whether `self -> next` is a legal transition.
    pub fn can_transition_to(self, next: FileState) -> bool {
        use FileState::*;
        matches!(
            (self, next),
            (Pending, Uploading)
                | (Pending, Failed)
                | (Uploading, Succeeded)
                | (Uploading, Retrying)
                | (Uploading, Failed)
                | (Retrying, Uploading)
                | (Retrying, Failed)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, FileState::Succeeded | FileState::Failed)
    }
}

/// Final result for one file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadOutcome {
    pub relative_path: String,
    pub final_remote_path: String,
    /// Number of upload attempts made. Zero when rejected before upload.
    pub attempts: u32,
    pub succeeded: bool,
    pub last_error: Option<String>,
}

/// Result of a whole batch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchResult {
    pub success_count: usize,
    pub fail_count: usize,
    pub outcomes: Vec<UploadOutcome>,
}

impl BatchResult {
    pub fn from_outcomes(outcomes: Vec<UploadOutcome>) -> Self {
        let success_count = outcomes.iter().filter(|o| o.succeeded).count();
        Self {
            success_count,
            fail_count: outcomes.len() - success_count,
            outcomes,
        }
    }

    pub fn is_success(&self) -> bool {
        self.fail_count == 0
    }

    pub fn failures(&self) -> impl Iterator<Item = &UploadOutcome> {
        self.outcomes.iter().filter(|o| !o.succeeded)
    }

    /// One-line human summary, e.g. `4 uploaded, 1 failed`.
    pub fn summary(&self) -> String {
        format!("{} uploaded, {} failed", self.success_count, self.fail_count)
    }
}

/// Progress event emitted during a batch upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UploadEvent {
    /// The effective root was decided.
    RootResolved { root: String },
    /// A remote directory was created or found.
    DirectoryEnsured { path: String },
    /// An upload attempt started.
    FileStarted {
        relative_path: String,
        remote_path: String,
        attempt: u32,
    },
    /// An attempt failed transiently; the connection is being replaced.
    FileRetrying {
        relative_path: String,
        attempt: u32,
        error: String,
    },
    FileSucceeded {
        relative_path: String,
        remote_path: String,
        attempts: u32,
    },
    FileFailed {
        relative_path: String,
        attempts: u32,
        error: String,
    },
    BatchFinished {
        success_count: usize,
        fail_count: usize,
    },
}
