//! Remote filesystem seam.
//!
//! `RemoteFs` is one live connection; `Connector` opens new ones with the
//! same credentials. The FTP implementations live here, tests plug in
//! scripted mocks.

use std::future::Future;
use std::path::Path;
use std::pin::Pin;

use sitedeploy_ftp::{FtpClient, FtpConfig};

use crate::TransferError;

/// Boxed, sendable future returned by the seam traits.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// A single connection to the remote host.
pub trait RemoteFs: Send {
    /// Current working directory as reported by the server.
    fn pwd(&mut self) -> BoxFuture<'_, Result<String, TransferError>>;

    /// Changes directory; `path` may be absolute or relative.
    fn change_dir<'a>(&'a mut self, path: &'a str) -> BoxFuture<'a, Result<(), TransferError>>;

    /// Creates one directory.
    fn make_dir<'a>(&'a mut self, path: &'a str) -> BoxFuture<'a, Result<(), TransferError>>;

    /// Stores `local` as `name` in the current directory. Returns bytes sent.
    fn put<'a>(
        &'a mut self,
        local: &'a Path,
        name: &'a str,
    ) -> BoxFuture<'a, Result<u64, TransferError>>;

    /// Closes the connection, ignoring any error.
    fn close(self: Box<Self>) -> BoxFuture<'static, ()>;
}

/// Opens connections to one target.
pub trait Connector: Send + Sync {
    fn connect(&self) -> BoxFuture<'_, Result<Box<dyn RemoteFs>, TransferError>>;
}

/// Connector backed by [`FtpClient`].
#[derive(Debug, Clone)]
pub struct FtpConnector {
    config: FtpConfig,
}

impl FtpConnector {
    pub fn new(config: FtpConfig) -> Self {
        Self { config }
    }
}

impl Connector for FtpConnector {
    fn connect(&self) -> BoxFuture<'_, Result<Box<dyn RemoteFs>, TransferError>> {
        Box::pin(async move {
            let client = FtpClient::connect(&self.config).await?;
            Ok(Box::new(client) as Box<dyn RemoteFs>)
        })
    }
}

impl RemoteFs for FtpClient {
    fn pwd(&mut self) -> BoxFuture<'_, Result<String, TransferError>> {
        Box::pin(async move { Ok(FtpClient::pwd(self).await?) })
    }

    fn change_dir<'a>(&'a mut self, path: &'a str) -> BoxFuture<'a, Result<(), TransferError>> {
        Box::pin(async move { Ok(self.cwd(path).await?) })
    }

    fn make_dir<'a>(&'a mut self, path: &'a str) -> BoxFuture<'a, Result<(), TransferError>> {
        Box::pin(async move { Ok(self.mkd(path).await?) })
    }

    fn put<'a>(
        &'a mut self,
        local: &'a Path,
        name: &'a str,
    ) -> BoxFuture<'a, Result<u64, TransferError>> {
        Box::pin(async move { Ok(self.stor(local, name).await?) })
    }

    fn close(self: Box<Self>) -> BoxFuture<'static, ()> {
        Box::pin(async move { (*self).quit().await })
    }
}
