//! Step 2: AFP banner (port 548). Also the strongest device-type signal in
//! the chain — a successful exchange always tags the host `Apple`.

use std::net::Ipv4Addr;
use std::time::Duration;

use once_cell::sync::Lazy;
use regex::Regex;
use tokio::io::AsyncReadExt;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::trace;

const TIMEOUT: Duration = Duration::from_secs(3);

static AFP_NAME_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"AFP[^(]*\(([^)]+)\)").unwrap());

pub async fn banner_hostname(ip: Ipv4Addr) -> Option<String> {
    let mut stream = match timeout(TIMEOUT, TcpStream::connect((ip, 548))).await {
        Ok(Ok(s)) => s,
        Ok(Err(e)) => {
            trace!(%ip, error = %e, "afp banner connect failed");
            return None;
        }
        Err(_) => {
            trace!(%ip, "afp banner connect timed out");
            return None;
        }
    };
    let mut buf = vec![0u8; 512];
    let n = match timeout(TIMEOUT, stream.read(&mut buf)).await {
        Ok(Ok(n)) => n,
        Ok(Err(e)) => {
            trace!(%ip, error = %e, "afp banner read failed");
            return None;
        }
        Err(_) => {
            trace!(%ip, "afp banner read timed out");
            return None;
        }
    };
    let line = String::from_utf8_lossy(&buf[..n]);
    let name = parse_afp_name(&line);
    if name.is_none() {
        trace!(%ip, "afp banner did not match expected name pattern");
    }
    name
}

fn parse_afp_name(line: &str) -> Option<String> {
    AFP_NAME_RE
        .captures(line)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().trim().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_name_from_parenthesised_afp_banner() {
        let line = "AFP0000(MacBookPro)\r\n";
        assert_eq!(parse_afp_name(line).as_deref(), Some("MacBookPro"));
    }

    #[test]
    fn returns_none_without_afp_marker() {
        assert_eq!(parse_afp_name("220 ftp.example.com FTP ready"), None);
    }
}
