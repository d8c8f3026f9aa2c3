//! Remote path resolution for shared-hosting deploy targets.
//!
//! Shared hosts expose each site under a per-domain tenant folder
//! (`/{domain}/httpdocs/...`) and some of them chroot the FTP account inside
//! that folder already. Paths arriving from configuration are therefore
//! untrusted: this crate normalizes them, refuses duplicated segments, joins
//! them under the session's effective root and derives public URLs.
//!
//! Everything here is pure string manipulation; no I/O.

mod resolver;
mod sanitize;
mod web;

pub use resolver::{join_root, resolve_remote_path};
pub use sanitize::{
    ensure_safe, has_duplicated_segments, is_env_file, normalize, segment_count,
    strip_tenant_prefix, to_web_path,
};
pub use web::{PublicSite, to_web_url};

/// Directory segment that marks the public web root on shared hosts.
pub const PUBLIC_ROOT: &str = "httpdocs";

/// Errors produced while resolving or validating a remote path.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PathError {
    #[error("duplicated path segment in {0}")]
    Duplicated(String),

    #[error("refusing to place env file inside the public web root: {0}")]
    EnvInPublicRoot(String),
}
