//! File scanning for upload.
//!
//! Recursively walks a part's local directory and produces file mappings
//! with relative paths normalized to forward slashes.

use std::path::Path;

use sitedeploy_remote_path::{normalize, to_web_path};
use sitedeploy_transfer::FileMapping;
use tracing::debug;

use crate::config::PartConfig;
use crate::error::DeployError;

/// Scans `part.local_dir` (relative to `base_dir`) into file mappings.
///
/// Remote paths are `{remote_base}/{relative}` and still relative to the
/// tenant folder; the uploader resolves them against the live root.
/// Mappings are sorted by relative path.
pub fn scan_part(
    base_dir: &Path,
    part: &PartConfig,
    tenant: &str,
) -> Result<Vec<FileMapping>, DeployError> {
    let root = base_dir.join(&part.local_dir);
    let mut files = Vec::new();

    walk_dir(&root, &root, part, tenant, &mut files)?;
    files.sort_by(|a, b| a.relative_path.cmp(&b.relative_path));

    debug!(part = %part.name, root = %root.display(), files = files.len(), "part scanned");
    Ok(files)
}

fn walk_dir(
    root: &Path,
    current: &Path,
    part: &PartConfig,
    tenant: &str,
    files: &mut Vec<FileMapping>,
) -> Result<(), DeployError> {
    let entries = std::fs::read_dir(current)?;

    for entry in entries {
        let entry = entry?;
        let path = entry.path();
        let name = entry.file_name().to_string_lossy().into_owned();
        if is_excluded(&name, &part.exclude) {
            continue;
        }
        let metadata = entry.metadata()?;

        if metadata.is_dir() {
            walk_dir(root, &path, part, tenant, files)?;
        } else if metadata.is_file() {
            let rel_path = path.strip_prefix(root).map_err(std::io::Error::other)?;

            // Normalize to forward slashes.
            let rel_str = rel_path.to_string_lossy().replace('\\', "/");
            let remote_path = normalize(
                &format!("{}/{rel_str}", part.remote_base.trim_end_matches('/')),
                tenant,
            );

            files.push(FileMapping {
                local_path: path.clone(),
                web_path: to_web_path(&remote_path, tenant),
                remote_path,
                relative_path: rel_str,
                part: part.name.clone(),
                size_bytes: metadata.len(),
            });
        }
    }

    Ok(())
}

fn is_excluded(name: &str, patterns: &[String]) -> bool {
    patterns.iter().any(|pattern| match pattern.strip_prefix('*') {
        Some(suffix) => name.ends_with(suffix),
        None => name == pattern,
    })
}
