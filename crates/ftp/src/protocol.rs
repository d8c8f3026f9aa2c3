//! Control-channel codec: CRLF commands out, (multi-line) replies in.

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tracing::trace;

use crate::error::{FtpError, FtpResult};

/// A complete server reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub code: u16,
    pub lines: Vec<String>,
}

impl Reply {
    /// All reply lines joined with `\n`.
    pub fn text(&self) -> String {
        self.lines.join("\n")
    }

    /// 1xx.
    pub fn is_preliminary(&self) -> bool {
        (100..200).contains(&self.code)
    }

    /// 2xx.
    pub fn is_completion(&self) -> bool {
        (200..300).contains(&self.code)
    }

    /// 3xx.
    pub fn is_intermediate(&self) -> bool {
        (300..400).contains(&self.code)
    }
}

/// Command/reply codec over the split control connection.
pub struct FtpCodec {
    reader: BufReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
}

impl FtpCodec {
    pub fn new(stream: TcpStream) -> Self {
        let (rd, wr) = stream.into_split();
        Self {
            reader: BufReader::new(rd),
            writer: wr,
        }
    }

    /// Sends one command line; CRLF is appended.
    pub async fn send_command(&mut self, cmd: &str) -> FtpResult<()> {
        self.writer
            .write_all(format!("{cmd}\r\n").as_bytes())
            .await?;
        if cmd.starts_with("PASS ") {
            trace!(">>> PASS ****");
        } else {
            trace!(">>> {cmd}");
        }
        Ok(())
    }

    async fn read_line(&mut self) -> FtpResult<String> {
        let mut buf = String::new();
        let n = self.reader.read_line(&mut buf).await?;
        if n == 0 {
            return Err(FtpError::disconnected("server closed the control connection"));
        }
        Ok(buf.trim_end_matches(['\r', '\n']).to_string())
    }

    /// Reads a full reply. `NNN-` opens a multi-line reply that ends at the
    /// first line starting with `NNN `.
    pub async fn read_reply(&mut self) -> FtpResult<Reply> {
        let first = self.read_line().await?;
        let code = parse_code(&first)?;
        let mut lines = vec![first.clone()];

        if first.as_bytes().get(3) == Some(&b'-') {
            let terminator = format!("{code} ");
            loop {
                let next = self.read_line().await?;
                let done = next.starts_with(&terminator) || next == code.to_string();
                lines.push(next);
                if done {
                    break;
                }
            }
        }

        trace!("<<< {}", lines.last().map(String::as_str).unwrap_or_default());
        Ok(Reply { code, lines })
    }

    /// Sends a command and reads its reply, whatever the code.
    pub async fn execute(&mut self, cmd: &str) -> FtpResult<Reply> {
        self.send_command(cmd).await?;
        self.read_reply().await
    }

    /// Sends a command and requires a 2xx reply.
    pub async fn expect_ok(&mut self, cmd: &str) -> FtpResult<Reply> {
        let reply = self.execute(cmd).await?;
        if !reply.is_completion() {
            return Err(FtpError::from_reply(reply.code, &reply.text()));
        }
        Ok(reply)
    }

    /// Peer address of the control connection.
    pub fn peer_addr(&self) -> FtpResult<std::net::SocketAddr> {
        Ok(self.writer.peer_addr()?)
    }
}

fn parse_code(line: &str) -> FtpResult<u16> {
    line.get(..3)
        .and_then(|c| c.parse::<u16>().ok())
        .filter(|c| (100..600).contains(c))
        .ok_or_else(|| FtpError::protocol(format!("invalid reply line: {line:?}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncReadExt;
    use tokio::net::TcpListener;

    async fn pair(server_bytes: &'static [u8]) -> (FtpCodec, tokio::task::JoinHandle<Vec<u8>>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = tokio::spawn(async move {
            let (mut sock, _) = listener.accept().await.unwrap();
            sock.write_all(server_bytes).await.unwrap();
            sock.shutdown().await.unwrap();
            let mut received = Vec::new();
            let _ = sock.read_to_end(&mut received).await;
            received
        });
        let stream = TcpStream::connect(addr).await.unwrap();
        (FtpCodec::new(stream), server)
    }

    #[tokio::test]
    async fn reads_single_line_reply() {
        let (mut codec, _server) = pair(b"220 ready\r\n").await;
        let reply = codec.read_reply().await.unwrap();
        assert_eq!(reply.code, 220);
        assert_eq!(reply.text(), "220 ready");
        assert!(reply.is_completion());
    }

    #[tokio::test]
    async fn reads_multi_line_reply() {
        let (mut codec, _server) =
            pair(b"230-Welcome\r\n230-line two\r\n 230 indented\r\n230 Logged in\r\n").await;
        let reply = codec.read_reply().await.unwrap();
        assert_eq!(reply.code, 230);
        assert_eq!(reply.lines.len(), 4);
        assert_eq!(reply.lines[3], "230 Logged in");
    }

    #[tokio::test]
    async fn closed_connection_is_disconnect() {
        let (mut codec, _server) = pair(b"").await;
        let err = codec.read_reply().await.unwrap_err();
        assert_eq!(err.kind, crate::FtpErrorKind::Disconnected);
    }

    #[tokio::test]
    async fn garbage_reply_is_protocol_error() {
        let (mut codec, _server) = pair(b"hello\r\n").await;
        let err = codec.read_reply().await.unwrap_err();
        assert_eq!(err.kind, crate::FtpErrorKind::ProtocolError);
    }

    #[tokio::test]
    async fn expect_ok_rejects_negative_reply() {
        let (mut codec, server) = pair(b"550 No such file or directory\r\n").await;
        let err = codec.expect_ok("CWD /missing").await.unwrap_err();
        assert_eq!(err.kind, crate::FtpErrorKind::NotFound);
        assert_eq!(err.code, Some(550));
        drop(codec);
        let sent = server.await.unwrap();
        assert_eq!(sent, b"CWD /missing\r\n");
    }
}
