//! Passive-mode data connections (EPSV with PASV fallback).

use std::net::{IpAddr, SocketAddr};
use std::sync::LazyLock;
use std::time::Duration;

use regex::Regex;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::debug;

use crate::error::{FtpError, FtpResult};
use crate::protocol::FtpCodec;

static PASV_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(\d{1,3}),(\d{1,3}),(\d{1,3}),(\d{1,3}),(\d{1,3}),(\d{1,3})")
        .expect("static PASV pattern")
});

static EPSV_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\|\|\|(\d+)\|").expect("static EPSV pattern"));

/// Opens a passive data connection.
///
/// Tries EPSV first; a negative reply falls back to PASV. A PASV address
/// that is private or unspecified is replaced by the control peer's IP,
/// since NATed shared hosts commonly advertise their internal address.
pub async fn open_passive(codec: &mut FtpCodec, op_timeout: Duration) -> FtpResult<TcpStream> {
    let peer = codec.peer_addr()?;

    let epsv = codec.execute("EPSV").await?;
    let addr = if epsv.is_completion() {
        SocketAddr::new(peer.ip(), parse_epsv(&epsv.text())?)
    } else {
        debug!(code = epsv.code, "EPSV refused, falling back to PASV");
        let pasv = codec.expect_ok("PASV").await?;
        let advertised = parse_pasv(&pasv.text())?;
        if is_unroutable(advertised.ip()) && !is_unroutable(peer.ip()) {
            SocketAddr::new(peer.ip(), advertised.port())
        } else {
            advertised
        }
    };

    timeout(op_timeout, TcpStream::connect(addr))
        .await
        .map_err(|_| {
            FtpError::data_channel(format!("can't open data connection to {addr}: timed out"))
        })?
        .map_err(|e| FtpError::data_channel(format!("can't open data connection to {addr}: {e}")))
}

/// Parses `227 Entering Passive Mode (h1,h2,h3,h4,p1,p2)`.
fn parse_pasv(text: &str) -> FtpResult<SocketAddr> {
    let caps = PASV_RE
        .captures(text)
        .ok_or_else(|| FtpError::protocol(format!("cannot parse PASV reply: {text}")))?;

    let mut nums = [0u8; 6];
    for (i, slot) in nums.iter_mut().enumerate() {
        *slot = caps[i + 1]
            .parse::<u8>()
            .map_err(|_| FtpError::protocol(format!("PASV number out of range: {text}")))?;
    }

    let ip = IpAddr::from([nums[0], nums[1], nums[2], nums[3]]);
    let port = u16::from(nums[4]) * 256 + u16::from(nums[5]);
    Ok(SocketAddr::new(ip, port))
}

/// Parses `229 Entering Extended Passive Mode (|||port|)`.
fn parse_epsv(text: &str) -> FtpResult<u16> {
    EPSV_RE
        .captures(text)
        .and_then(|caps| caps[1].parse::<u16>().ok())
        .ok_or_else(|| FtpError::protocol(format!("cannot parse EPSV reply: {text}")))
}

fn is_unroutable(ip: IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => v4.is_private() || v4.is_unspecified() || v4.is_link_local(),
        IpAddr::V6(v6) => v6.is_unspecified(),
    }
}
