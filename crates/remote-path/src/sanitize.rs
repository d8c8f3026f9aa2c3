//! Deterministic, side-effect-free path normalization.
//!
//! Tenant ids are compared as whole path segments, never interpolated into a
//! pattern, so ids such as `my+site.com` or `a.b` are matched literally.

use crate::{PUBLIC_ROOT, PathError};

/// Normalizes a remote path for a tenant.
///
/// - backslashes become `/`, repeated slashes collapse, one leading `/`
/// - adjacent runs of `/{tenant}` or `/httpdocs` collapse to one segment
/// - `/{tenant}/httpdocs/{tenant}/httpdocs` collapses to `/{tenant}/httpdocs`
///
/// A trailing slash is preserved. Empty input maps to `/`. The result is a
/// fixed point: normalizing it again returns it unchanged.
pub fn normalize(path: &str, tenant: &str) -> String {
    let unified = path.replace('\\', "/");
    let trailing = unified.ends_with('/');
    let mut segments = split_segments(&unified);

    // Each pass that changes anything removes at least one segment, so
    // `len + 1` passes always reach the fixed point.
    for _ in 0..=segments.len() {
        if !collapse_once(&mut segments, tenant) {
            break;
        }
    }

    join_segments(&segments, trailing)
}

/// Removes exactly one leading `/{tenant}` segment.
///
/// Only whole-segment matches are stripped: tenant `ab` leaves `/abc/x`
/// untouched.
pub fn strip_tenant_prefix(path: &str, tenant: &str) -> String {
    if tenant.is_empty() {
        return path.to_string();
    }

    let prefix = format!("/{tenant}");
    if path == prefix {
        return "/".to_string();
    }
    match path.strip_prefix(&prefix) {
        Some(rest) if rest.starts_with('/') => rest.to_string(),
        _ => path.to_string(),
    }
}

/// Reports whether a path repeats the tenant folder or `httpdocs` in
/// adjacent segments.
pub fn has_duplicated_segments(path: &str, tenant: &str) -> bool {
    let unified = path.replace('\\', "/");
    split_segments(&unified)
        .windows(2)
        .any(|pair| pair[0] == pair[1] && is_collapsible(pair[0], tenant))
}

/// Maps a remote path to the path component of its public URL.
///
/// Leading tenant folders and everything up to and including the first
/// `httpdocs` segment never appear in URLs.
pub fn to_web_path(path: &str, tenant: &str) -> String {
    let normalized = normalize(path, tenant);
    let trailing = normalized.ends_with('/');
    let mut segments = split_segments(&normalized);

    let tenant_run = segments
        .iter()
        .take_while(|s| !tenant.is_empty() && **s == tenant)
        .count();
    segments.drain(..tenant_run);

    if let Some(pos) = segments.iter().position(|s| *s == PUBLIC_ROOT) {
        segments.drain(..=pos);
    }

    join_segments(&segments, trailing)
}

/// Whether the final path component is a dotenv file (`.env`, `.env.local`,
/// `.env-prod`, `.env_test`).
pub fn is_env_file(path: &str) -> bool {
    let name = path.rsplit(['/', '\\']).next().unwrap_or("");
    match name.strip_prefix(".env") {
        Some(rest) => rest.is_empty() || rest.starts_with(['.', '-', '_']),
        None => false,
    }
}

/// Hard gate run before any write: rejects duplicated segments and env files
/// that would land inside the public web root.
pub fn ensure_safe(path: &str, tenant: &str) -> Result<(), PathError> {
    if has_duplicated_segments(path, tenant) {
        return Err(PathError::Duplicated(path.to_string()));
    }

    let unified = path.replace('\\', "/");
    if is_env_file(&unified) && split_segments(&unified).contains(&PUBLIC_ROOT) {
        return Err(PathError::EnvInPublicRoot(path.to_string()));
    }

    Ok(())
}

/// Number of non-empty segments in a path (`/` has zero).
pub fn segment_count(path: &str) -> usize {
    path.split(['/', '\\']).filter(|s| !s.is_empty()).count()
}

fn split_segments(path: &str) -> Vec<&str> {
    path.split('/').filter(|s| !s.is_empty()).collect()
}

fn join_segments(segments: &[&str], trailing: bool) -> String {
    if segments.is_empty() {
        return "/".to_string();
    }
    let mut out = String::with_capacity(segments.iter().map(|s| s.len() + 1).sum::<usize>() + 1);
    for segment in segments {
        out.push('/');
        out.push_str(segment);
    }
    if trailing {
        out.push('/');
    }
    out
}

fn is_collapsible(segment: &str, tenant: &str) -> bool {
    segment == PUBLIC_ROOT || (!tenant.is_empty() && segment == tenant)
}

/// One collapse pass. Returns `true` if any segment was removed.
fn collapse_once(segments: &mut Vec<&str>, tenant: &str) -> bool {
    let before = segments.len();

    segments.dedup_by(|current, previous| {
        *current == *previous && is_collapsible(previous, tenant)
    });

    if !tenant.is_empty() {
        let mut i = 0;
        while i + 3 < segments.len() {
            let doubled = segments[i] == tenant
                && segments[i + 1] == PUBLIC_ROOT
                && segments[i + 2] == tenant
                && segments[i + 3] == PUBLIC_ROOT;
            if doubled {
                segments.drain(i + 2..i + 4);
            } else {
                i += 1;
            }
        }
    }

    segments.len() != before
}
