//! Minimal async FTP client for deploy uploads.
//!
//! Covers the subset of RFC 959 / RFC 2428 a deploy needs: login, PWD, CWD,
//! MKD, binary STOR over a passive (EPSV, falling back to PASV) data channel,
//! and QUIT. Every network operation is bounded by the configured timeout.

mod client;
mod data;
mod error;
mod protocol;

pub use client::{FtpClient, FtpConfig};
pub use error::{FtpError, FtpErrorKind, FtpResult};
pub use protocol::{FtpCodec, Reply};

/// Default FTP control port.
pub const DEFAULT_PORT: u16 = 21;
