//! Deploy error types.

/// Errors produced while preparing or running a deployment.
#[derive(Debug, thiserror::Error)]
pub enum DeployError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid config: {0}")]
    Config(String),

    #[error("transfer error: {0}")]
    Transfer(#[from] sitedeploy_transfer::TransferError),
}
