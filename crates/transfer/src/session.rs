//! One replaceable connection to the target.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::TransferError;
use crate::connection::{Connector, RemoteFs};

/// Wraps the live connection plus the means to replace it.
///
/// After a failed reconnect the session holds no connection and every
/// operation fails with [`TransferError::Closed`], which the retry policy
/// treats as transient.
pub struct TransferSession {
    connector: Arc<dyn Connector>,
    conn: Option<Box<dyn RemoteFs>>,
    reconnects: u32,
}

impl TransferSession {
    /// Opens the first connection. Failure here is fatal for a batch.
    pub async fn open(connector: Arc<dyn Connector>) -> Result<Self, TransferError> {
        let conn = connector.connect().await?;
        debug!("transfer session opened");
        Ok(Self {
            connector,
            conn: Some(conn),
            reconnects: 0,
        })
    }

    fn conn(&mut self) -> Result<&mut (dyn RemoteFs + 'static), TransferError> {
        self.conn.as_deref_mut().ok_or(TransferError::Closed)
    }

    pub fn is_connected(&self) -> bool {
        self.conn.is_some()
    }

    /// Number of times the connection has been replaced.
    pub fn reconnects(&self) -> u32 {
        self.reconnects
    }

    pub async fn pwd(&mut self) -> Result<String, TransferError> {
        self.conn()?.pwd().await
    }

    pub async fn change_dir(&mut self, path: &str) -> Result<(), TransferError> {
        self.conn()?.change_dir(path).await
    }

    /// Makes sure every segment of absolute `path` exists, creating the
    /// missing ones. Leaves the working directory at `path`.
    pub async fn ensure_directory(&mut self, path: &str) -> Result<(), TransferError> {
        let conn = self.conn()?;
        conn.change_dir("/").await?;
        for segment in path.split('/').filter(|s| !s.is_empty()) {
            if conn.change_dir(segment).await.is_ok() {
                continue;
            }
            // A failed MKD is fine when the directory appeared meanwhile.
            if let Err(e) = conn.make_dir(segment).await {
                debug!(segment, error = %e, "MKD failed, checking whether it exists");
            }
            conn.change_dir(segment).await?;
        }
        Ok(())
    }

    /// Uploads `local` to absolute `remote_path`. The parent directory must
    /// already exist.
    pub async fn upload_file(
        &mut self,
        local: &Path,
        remote_path: &str,
    ) -> Result<u64, TransferError> {
        let (parent, name) = match remote_path.rsplit_once('/') {
            Some((parent, name)) if !name.is_empty() => (parent, name),
            _ => {
                return Err(TransferError::InvalidPath(format!(
                    "no file name in remote path: {remote_path}"
                )));
            }
        };

        let conn = self.conn()?;
        conn.change_dir("/").await?;
        if !parent.is_empty() {
            conn.change_dir(parent).await?;
        }
        conn.put(local, name).await
    }

    /// Drops the current connection, waits `delay`, and connects again.
    ///
    /// On failure the session is left without a connection so the next
    /// operation fails transiently.
    pub async fn reconnect(&mut self, delay: Duration) -> Result<(), TransferError> {
        if let Some(old) = self.conn.take() {
            old.close().await;
        }
        tokio::time::sleep(delay).await;

        self.reconnects += 1;
        match self.connector.connect().await {
            Ok(conn) => {
                info!(reconnects = self.reconnects, "connection re-established");
                self.conn = Some(conn);
                Ok(())
            }
            Err(e) => {
                warn!(reconnects = self.reconnects, error = %e, "reconnect failed");
                Err(e)
            }
        }
    }

    /// Closes the connection, ignoring errors.
    pub async fn close(mut self) {
        if let Some(conn) = self.conn.take() {
            conn.close().await;
        }
    }
}
