//! SSH banner grab, inserted between DNS-PTR and the AFP banner in the
//! priority order (the overview names SSH as one of C4's methods but the
//! priority table omits it; see the design ledger for the placement
//! rationale).
//!
//! RFC 4253 section 4.2 identification strings look like
//! `SSH-protoversion-softwareversion SP comments`. The `comments` field is
//! the only part of the banner that could plausibly carry a hostname, so
//! that is what gets extracted.

use std::net::Ipv4Addr;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::trace;

const BANNER_TIMEOUT: Duration = Duration::from_millis(750);

pub async fn banner_hostname(ip: Ipv4Addr) -> Option<String> {
    let mut stream = match timeout(BANNER_TIMEOUT, TcpStream::connect((ip, 22))).await {
        Ok(Ok(s)) => s,
        Ok(Err(e)) => {
            trace!(%ip, error = %e, "ssh banner connect failed");
            return None;
        }
        Err(_) => {
            trace!(%ip, "ssh banner connect timed out");
            return None;
        }
    };
    let mut buf = vec![0u8; 256];
    let n = match timeout(BANNER_TIMEOUT, stream.read(&mut buf)).await {
        Ok(Ok(n)) => n,
        Ok(Err(e)) => {
            trace!(%ip, error = %e, "ssh banner read failed");
            return None;
        }
        Err(_) => {
            trace!(%ip, "ssh banner read timed out");
            return None;
        }
    };
    let _ = stream.shutdown().await;
    let line = String::from_utf8_lossy(&buf[..n]);
    let line = line.trim_end();
    let comment = parse_comment(line);
    if comment.is_none() {
        trace!(%ip, "ssh banner carried no usable comment field");
    }
    comment
}

fn parse_comment(line: &str) -> Option<String> {
    let rest = line.strip_prefix("SSH-")?;
    let (_, tail) = rest.split_once('-')?;
    let (_, comment) = tail.split_once(' ')?;
    if comment.trim().is_empty() {
        None
    } else {
        Some(comment.trim().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_comment_field_when_present() {
        let line = "SSH-2.0-OpenSSH_8.9 fileserver01";
        assert_eq!(parse_comment(line).as_deref(), Some("fileserver01"));
    }

    #[test]
    fn returns_none_without_a_comment_field() {
        let line = "SSH-2.0-OpenSSH_8.9";
        assert_eq!(parse_comment(line), None);
    }

    #[test]
    fn returns_none_for_non_ssh_banner() {
        assert_eq!(parse_comment("HTTP/1.1 200 OK"), None);
    }
}
