//! Joins an effective root with a per-file remote path.

use crate::PathError;
use crate::sanitize::{ensure_safe, has_duplicated_segments, normalize, strip_tenant_prefix};

/// Joins `file_remote_path` under `effective_root`.
///
/// An absolute file path is appended below the root, never substituted for
/// it. When the root already contains the tenant folder, a leading tenant
/// segment on the file path is dropped so the prefix is not doubled.
///
/// The result is normalized; a duplicated segment surviving normalization is
/// a resolver bug and is returned as [`PathError::Duplicated`].
pub fn join_root(
    effective_root: &str,
    file_remote_path: &str,
    tenant: &str,
) -> Result<String, PathError> {
    let root = normalize(effective_root, tenant);
    let mut file = normalize(file_remote_path, tenant);

    if root_encodes_tenant(&root, tenant) {
        file = strip_tenant_prefix(&file, tenant);
    }

    let joined = if root == "/" {
        file
    } else {
        format!(
            "{}/{}",
            root.trim_end_matches('/'),
            file.trim_start_matches('/')
        )
    };

    let resolved = normalize(&joined, tenant);
    if has_duplicated_segments(&resolved, tenant) {
        return Err(PathError::Duplicated(resolved));
    }
    Ok(resolved)
}

/// Resolves the final remote path for an upload and applies the write gate.
///
/// Same as [`join_root`], plus refusal of env files that would land inside
/// the public web root.
pub fn resolve_remote_path(
    effective_root: &str,
    file_remote_path: &str,
    tenant: &str,
) -> Result<String, PathError> {
    let resolved = join_root(effective_root, file_remote_path, tenant)?;
    ensure_safe(&resolved, tenant)?;
    Ok(resolved)
}

fn root_encodes_tenant(root: &str, tenant: &str) -> bool {
    !tenant.is_empty() && root.split('/').any(|segment| segment == tenant)
}
