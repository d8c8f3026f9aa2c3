//! Public URL derivation for uploaded files.

use tracing::warn;

use crate::sanitize::{normalize, to_web_path};

/// The public face of a deploy target.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PublicSite {
    /// Public hostname, e.g. `acme.com` or `admin.acme.com`. Empty when the
    /// target has no public domain.
    pub domain: String,
    /// Tenant folder name on the host (may be empty).
    pub tenant: String,
    /// Configured remote root.
    pub remote_root: String,
}

/// Derives the `https://` URL a remote file is served from.
///
/// Returns `None` (and logs a warning) when no domain is configured. A path
/// that is already a URL is returned as-is.
pub fn to_web_url(site: &PublicSite, file_path: &str) -> Option<String> {
    if site.domain.trim().is_empty() {
        warn!(path = %file_path, "no public domain configured, cannot build web URL");
        return None;
    }

    if file_path.starts_with("https://") || file_path.starts_with("http://") {
        return Some(file_path.to_string());
    }

    let mut path = normalize(file_path, &site.tenant);

    let root = normalize(&site.remote_root, &site.tenant);
    let root = root.trim_end_matches('/');
    if !root.is_empty() {
        if path == root {
            path = "/".to_string();
        } else if let Some(rest) = path.strip_prefix(root)
            && rest.starts_with('/')
        {
            path = rest.to_string();
        }
    }

    let web_path = collapse_subdomain(&to_web_path(&path, &site.tenant), &site.domain);
    Some(format!("https://{}{}", site.domain.trim_end_matches('/'), web_path))
}

/// `admin.acme.com` serving `/admin/admin/x` is a doubled subdomain folder.
fn collapse_subdomain(web_path: &str, domain: &str) -> String {
    let labels: Vec<&str> = domain.split('.').collect();
    if labels.len() < 3 {
        return web_path.to_string();
    }

    let doubled = format!("/{0}/{0}", labels[0]);
    match web_path.strip_prefix(&doubled) {
        Some(rest) if rest.is_empty() || rest.starts_with('/') => {
            format!("/{}{}", labels[0], rest)
        }
        _ => web_path.to_string(),
    }
}
