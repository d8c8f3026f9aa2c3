//! Resilient FTP upload engine.
//!
//! A [`TransferSession`] owns one live connection and can replace it after a
//! drop. [`EffectiveRootProbe`] works out where the login actually lands,
//! and [`ResilientUploader`] pushes a batch of files through both with
//! bounded per-file retries.

mod connection;
mod probe;
mod retry;
mod session;
mod types;
mod uploader;
mod validation;

#[cfg(test)]
mod testing;

pub use connection::{BoxFuture, Connector, FtpConnector, RemoteFs};
pub use probe::{EffectiveRoot, EffectiveRootProbe, ProbeReport};
pub use retry::{RetryNotice, RetryPolicy, is_transient, retry_with_backoff};
pub use session::TransferSession;
pub use types::{
    BatchResult, Credentials, DeployMethod, FileMapping, FileState, TargetConfig, UploadEvent,
    UploadOutcome, UploadPolicy,
};
pub use uploader::ResilientUploader;
pub use validation::validate_remote_path;

use sitedeploy_ftp::FtpError;
use sitedeploy_remote_path::PathError;

/// Errors produced by the transfer crate.
#[derive(Debug, thiserror::Error)]
pub enum TransferError {
    #[error("ftp: {0}")]
    Ftp(#[from] FtpError),

    #[error(transparent)]
    Path(#[from] PathError),

    #[error("invalid path: {0}")]
    InvalidPath(String),

    /// The session has no live connection (a reconnect failed).
    #[error("client is closed")]
    Closed,

    #[error("invalid target configuration: {0}")]
    Config(String),
}
