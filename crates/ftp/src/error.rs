//! FTP error type.

/// Result alias for FTP operations.
pub type FtpResult<T> = Result<T, FtpError>;

/// Broad category of an FTP failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum FtpErrorKind {
    /// TCP connect or name resolution failed.
    #[error("connection failed")]
    ConnectionFailed,
    /// Login rejected.
    #[error("authentication failed")]
    AuthFailed,
    /// The server answered a command with a 4xx/5xx reply.
    #[error("command rejected")]
    CommandRejected,
    /// 450/451: the server could not act right now.
    #[error("temporary failure")]
    TemporaryFailure,
    /// Passive data connection could not be opened.
    #[error("data channel failed")]
    DataChannelFailed,
    /// An operation exceeded its timeout.
    #[error("timeout")]
    Timeout,
    /// Control connection was reset or closed.
    #[error("disconnected")]
    Disconnected,
    /// Server denied access to a path.
    #[error("permission denied")]
    PermissionDenied,
    /// Remote file or directory does not exist.
    #[error("not found")]
    NotFound,
    /// Unparseable server reply.
    #[error("protocol error")]
    ProtocolError,
    /// Local I/O failure.
    #[error("I/O error")]
    Io,
}

/// An FTP failure with its category and, when the server replied, the code.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{kind}{}: {message}", .code.map(|c| format!(" ({c})")).unwrap_or_default())]
pub struct FtpError {
    pub kind: FtpErrorKind,
    pub message: String,
    pub code: Option<u16>,
}

impl FtpError {
    pub fn new(kind: FtpErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            code: None,
        }
    }

    pub fn connection_failed(message: impl Into<String>) -> Self {
        Self::new(FtpErrorKind::ConnectionFailed, message)
    }

    pub fn data_channel(message: impl Into<String>) -> Self {
        Self::new(FtpErrorKind::DataChannelFailed, message)
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(FtpErrorKind::Timeout, message)
    }

    pub fn disconnected(message: impl Into<String>) -> Self {
        Self::new(FtpErrorKind::Disconnected, message)
    }

    pub fn protocol(message: impl Into<String>) -> Self {
        Self::new(FtpErrorKind::ProtocolError, message)
    }

    /// Classifies a negative server reply.
    pub fn from_reply(code: u16, text: &str) -> Self {
        let kind = match code {
            421 => FtpErrorKind::Disconnected,
            425 | 426 => FtpErrorKind::DataChannelFailed,
            430 | 530 | 532 => FtpErrorKind::AuthFailed,
            450 | 451 => FtpErrorKind::TemporaryFailure,
            550 | 553 => {
                let lower = text.to_lowercase();
                if lower.contains("permission") || lower.contains("denied") {
                    FtpErrorKind::PermissionDenied
                } else if lower.contains("not found") || lower.contains("no such") {
                    FtpErrorKind::NotFound
                } else {
                    FtpErrorKind::CommandRejected
                }
            }
            _ => FtpErrorKind::CommandRejected,
        };
        Self {
            kind,
            message: text.to_string(),
            code: Some(code),
        }
    }

    /// Whether retrying on a fresh connection may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(
            self.kind,
            FtpErrorKind::Timeout
                | FtpErrorKind::Disconnected
                | FtpErrorKind::DataChannelFailed
                | FtpErrorKind::TemporaryFailure
        )
    }
}

impl From<std::io::Error> for FtpError {
    fn from(e: std::io::Error) -> Self {
        use std::io::ErrorKind;

        match e.kind() {
            ErrorKind::TimedOut => Self::timeout(format!("I/O timed out: {e}")),
            ErrorKind::ConnectionReset
            | ErrorKind::ConnectionAborted
            | ErrorKind::BrokenPipe
            | ErrorKind::NotConnected
            | ErrorKind::UnexpectedEof => Self::disconnected(format!("connection reset: {e}")),
            _ => Self::new(FtpErrorKind::Io, e.to_string()),
        }
    }
}
