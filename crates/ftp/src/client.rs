//! Stateful FTP client owning one control connection.

use std::fmt;
use std::future::Future;
use std::path::Path;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::debug;

use crate::data;
use crate::error::{FtpError, FtpErrorKind, FtpResult};
use crate::protocol::FtpCodec;

const UPLOAD_BUFFER: usize = 64 * 1024;

/// Connection parameters for one FTP account.
#[derive(Clone, PartialEq, Eq)]
pub struct FtpConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    /// Bound applied to every protocol operation.
    pub timeout: Duration,
}

impl fmt::Debug for FtpConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FtpConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("password", &"****")
            .field("timeout", &self.timeout)
            .finish()
    }
}

/// A logged-in FTP session in binary mode.
pub struct FtpClient {
    id: String,
    codec: FtpCodec,
    timeout: Duration,
}

impl FtpClient {
    /// Connects, reads the greeting, logs in and switches to `TYPE I`.
    pub async fn connect(config: &FtpConfig) -> FtpResult<Self> {
        if config.host.is_empty() {
            return Err(FtpError::connection_failed("host must not be empty"));
        }

        let addr = format!("{}:{}", config.host, config.port);
        let tcp = timeout(config.timeout, TcpStream::connect(&addr))
            .await
            .map_err(|_| FtpError::timeout(format!("connect to {addr} timed out")))?
            .map_err(|e| FtpError::connection_failed(format!("connect to {addr}: {e}")))?;
        tcp.set_nodelay(true).ok();

        let mut client = Self {
            id: uuid::Uuid::new_v4().to_string(),
            codec: FtpCodec::new(tcp),
            timeout: config.timeout,
        };

        let greeting = bounded(client.timeout, "greeting", client.codec.read_reply()).await?;
        if !greeting.is_completion() {
            return Err(FtpError::from_reply(greeting.code, &greeting.text()));
        }

        client.login(&config.user, &config.password).await?;
        bounded(client.timeout, "TYPE", client.codec.expect_ok("TYPE I")).await?;

        debug!(session = %client.id, host = %config.host, user = %config.user, "ftp session ready");
        Ok(client)
    }

    async fn login(&mut self, user: &str, password: &str) -> FtpResult<()> {
        let limit = self.timeout;
        let reply = bounded(limit, "USER", self.codec.execute(&format!("USER {user}"))).await?;
        let reply = if reply.is_intermediate() {
            bounded(limit, "PASS", self.codec.execute(&format!("PASS {password}"))).await?
        } else {
            reply
        };

        if reply.is_completion() {
            Ok(())
        } else {
            Err(FtpError {
                kind: FtpErrorKind::AuthFailed,
                message: reply.text(),
                code: Some(reply.code),
            })
        }
    }

    /// Session id used in log fields.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Current working directory as reported by `PWD`.
    pub async fn pwd(&mut self) -> FtpResult<String> {
        let reply = bounded(self.timeout, "PWD", self.codec.expect_ok("PWD")).await?;
        parse_pwd(&reply.text())
    }

    pub async fn cwd(&mut self, path: &str) -> FtpResult<()> {
        bounded(self.timeout, "CWD", self.codec.expect_ok(&format!("CWD {path}"))).await?;
        Ok(())
    }

    pub async fn mkd(&mut self, path: &str) -> FtpResult<()> {
        bounded(self.timeout, "MKD", self.codec.expect_ok(&format!("MKD {path}"))).await?;
        Ok(())
    }

    /// Uploads `local` as `remote_name` in the current directory.
    ///
    /// The timeout bounds each write to the data connection, not the whole
    /// transfer. Returns the number of bytes sent.
    pub async fn stor(&mut self, local: &Path, remote_name: &str) -> FtpResult<u64> {
        let limit = self.timeout;
        let mut file = tokio::fs::File::open(local).await.map_err(|e| {
            FtpError::new(FtpErrorKind::Io, format!("{}: {e}", local.display()))
        })?;

        let mut stream = bounded(
            limit,
            "data connection",
            data::open_passive(&mut self.codec, limit),
        )
        .await?;

        let reply = bounded(
            limit,
            "STOR",
            self.codec.execute(&format!("STOR {remote_name}")),
        )
        .await?;
        if !reply.is_preliminary() && !reply.is_completion() {
            return Err(FtpError::from_reply(reply.code, &reply.text()));
        }

        let mut buf = vec![0u8; UPLOAD_BUFFER];
        let mut sent: u64 = 0;
        loop {
            let n = file.read(&mut buf).await?;
            if n == 0 {
                break;
            }
            bounded(limit, "data write", async {
                stream.write_all(&buf[..n]).await.map_err(FtpError::from)
            })
            .await?;
            sent += n as u64;
        }
        bounded(limit, "data close", async {
            stream.shutdown().await.map_err(FtpError::from)
        })
        .await?;
        drop(stream);

        if reply.is_preliminary() {
            let done = bounded(limit, "STOR completion", self.codec.read_reply()).await?;
            if !done.is_completion() {
                return Err(FtpError::from_reply(done.code, &done.text()));
            }
        }

        debug!(session = %self.id, file = %remote_name, bytes = sent, "stored");
        Ok(sent)
    }

    /// Sends `QUIT` and drops the connection; errors are ignored.
    pub async fn quit(mut self) {
        let _ = bounded(self.timeout, "QUIT", self.codec.execute("QUIT")).await;
    }
}

async fn bounded<T>(
    limit: Duration,
    what: &str,
    fut: impl Future<Output = FtpResult<T>>,
) -> FtpResult<T> {
    timeout(limit, fut)
        .await
        .map_err(|_| FtpError::timeout(format!("{what} timed out after {}ms", limit.as_millis())))?
}

/// Extracts the path from `257 "/some/path" is current directory`.
/// Doubled quotes inside the path are an escaped quote.
fn parse_pwd(text: &str) -> FtpResult<String> {
    let start = text
        .find('"')
        .ok_or_else(|| FtpError::protocol(format!("cannot parse PWD reply: {text}")))?;

    let mut path = String::new();
    let mut chars = text[start + 1..].chars().peekable();
    while let Some(c) = chars.next() {
        if c == '"' {
            if chars.peek() == Some(&'"') {
                chars.next();
                path.push('"');
            } else {
                return Ok(path);
            }
        } else {
            path.push(c);
        }
    }
    Err(FtpError::protocol(format!("unterminated PWD reply: {text}")))
}
