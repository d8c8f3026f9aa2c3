use crate::TransferError;

/// Validates a resolved remote path before it is sent to the server.
///
/// Rejects:
/// - Empty or relative paths
/// - Parent directory traversal (`..`) and `.` segments
/// - Control characters (a CR/LF would split the FTP command line)
pub fn validate_remote_path(remote_path: &str) -> Result<(), TransferError> {
    if remote_path.is_empty() {
        return Err(TransferError::InvalidPath("empty path".into()));
    }

    if !remote_path.starts_with('/') {
        return Err(TransferError::InvalidPath(format!(
            "remote path must be absolute: {remote_path}"
        )));
    }

    if remote_path.chars().any(char::is_control) {
        return Err(TransferError::InvalidPath(format!(
            "control character in remote path: {remote_path:?}"
        )));
    }

    for segment in remote_path.split('/') {
        match segment {
            ".." => {
                return Err(TransferError::InvalidPath(format!(
                    "parent directory traversal not allowed: {remote_path}"
                )));
            }
            "." => {
                return Err(TransferError::InvalidPath(format!(
                    "current directory segment not allowed: {remote_path}"
                )));
            }
            _ => {}
        }
    }

    Ok(())
}
