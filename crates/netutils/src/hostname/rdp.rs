//! Step 5: RDP / TLS certificate hostname extraction (port 3389).

use std::net::Ipv4Addr;
use std::sync::Arc;
use std::time::Duration;

use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::pki_types::{CertificateDer, ServerName, UnixTime};
use rustls::{ClientConfig, SignatureScheme};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::debug;

use super::is_valid_hostname;

const TIMEOUT: Duration = Duration::from_secs(3);

/// Exact 19-byte X.224 Connection Request TPDU carrying an RDP Negotiation
/// Request with protocol mask `0x07` (RDP | TLS | CredSSP).
const NEGOTIATION_REQUEST: [u8; 19] = [
    0x03, 0x00, 0x00, 0x13, 0x0e, 0xe0, 0x00, 0x00, 0x00, 0x00, 0x00, 0x01, 0x00, 0x08, 0x00, 0x07,
    0x00, 0x00, 0x00,
];

const PROTOCOL_TLS: u32 = 0x02;
const PROTOCOL_CREDSSP: u32 = 0x04;

/// Parses the selected-protocol field out of an RDP negotiation response,
/// validating the TPKT and COTP headers first. Total function: never
/// panics, rejects anything shorter than the 19-byte minimum.
fn parse_selected_protocol(buf: &[u8]) -> Option<u32> {
    if buf.len() < 19 {
        return None;
    }
    if buf[0] != 0x03 || buf[1] != 0x00 {
        return None;
    }
    if buf[5] != 0xd0 {
        return None;
    }
    Some(u32::from_le_bytes([buf[15], buf[16], buf[17], buf[18]]))
}

async fn negotiate(stream: &mut TcpStream) -> Option<u32> {
    match timeout(TIMEOUT, stream.write_all(&NEGOTIATION_REQUEST)).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => {
            debug!(error = %e, "rdp negotiation request failed");
            return None;
        }
        Err(_) => {
            debug!("rdp negotiation request timed out");
            return None;
        }
    }
    let mut buf = vec![0u8; 64];
    let n = match timeout(TIMEOUT, stream.read(&mut buf)).await {
        Ok(Ok(n)) => n,
        Ok(Err(e)) => {
            debug!(error = %e, "rdp negotiation response read failed");
            return None;
        }
        Err(_) => {
            debug!("rdp negotiation response timed out");
            return None;
        }
    };
    let selected = parse_selected_protocol(&buf[..n]);
    if selected.is_none() {
        debug!("rdp negotiation response was malformed");
    }
    selected
}

#[derive(Debug)]
struct AcceptAnyCert;

impl ServerCertVerifier for AcceptAnyCert {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> Result<ServerCertVerified, rustls::Error> {
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &rustls::DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        Ok(HandshakeSignatureValid::assertion())
    }

    fn verify_tls13_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &rustls::DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        Ok(HandshakeSignatureValid::assertion())
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        vec![
            SignatureScheme::RSA_PKCS1_SHA256,
            SignatureScheme::RSA_PKCS1_SHA384,
            SignatureScheme::RSA_PKCS1_SHA512,
            SignatureScheme::ECDSA_NISTP256_SHA256,
            SignatureScheme::ECDSA_NISTP384_SHA384,
            SignatureScheme::RSA_PSS_SHA256,
            SignatureScheme::RSA_PSS_SHA384,
            SignatureScheme::RSA_PSS_SHA512,
            SignatureScheme::ED25519,
        ]
    }
}

fn tls_config() -> Arc<ClientConfig> {
    let mut config = ClientConfig::builder()
        .dangerous()
        .with_custom_certificate_verifier(Arc::new(AcceptAnyCert))
        .with_no_client_auth();
    config.enable_early_data = false;
    Arc::new(config)
}

/// Extracts the first validated name from a leaf certificate: DNS SANs,
/// then subject common name, then subject organisation, then any other RDN
/// of OID 2.5.4.3 (commonName).
fn names_from_cert(der: &[u8]) -> Vec<String> {
    use x509_parser::extensions::GeneralName;
    use x509_parser::prelude::{FromDer, X509Certificate};

    let mut names = Vec::new();
    let Ok((_, cert)) = X509Certificate::from_der(der) else {
        return names;
    };

    if let Ok(Some(san)) = cert.subject_alternative_name() {
        for gn in san.value.general_names.iter() {
            if let GeneralName::DNSName(name) = gn {
                names.push(name.to_string());
            }
        }
    }

    for rdn in cert.subject().iter_common_name() {
        if let Ok(s) = rdn.as_str() {
            names.push(s.to_string());
        }
    }
    for rdn in cert.subject().iter_organization() {
        if let Ok(s) = rdn.as_str() {
            names.push(s.to_string());
        }
    }

    names
}

async fn connect(ip: Ipv4Addr) -> Option<TcpStream> {
    match timeout(TIMEOUT, TcpStream::connect((ip, 3389))).await {
        Ok(Ok(s)) => Some(s),
        Ok(Err(e)) => {
            debug!(%ip, error = %e, "rdp connect failed");
            None
        }
        Err(_) => {
            debug!(%ip, "rdp connect timed out");
            None
        }
    }
}

pub async fn resolve_hostname(ip: Ipv4Addr) -> Option<String> {
    let mut stream = connect(ip).await?;
    let selected = negotiate(&mut stream).await?;

    if selected & PROTOCOL_TLS == 0 && selected & PROTOCOL_CREDSSP == 0 {
        debug!(%ip, "rdp server negotiated neither TLS nor CredSSP");
        return None;
    }

    let mut second = connect(ip).await?;
    negotiate(&mut second).await?;

    let connector = tokio_rustls::TlsConnector::from(tls_config());
    let server_name =
        rustls::pki_types::ServerName::IpAddress(rustls::pki_types::IpAddr::from(std::net::IpAddr::V4(ip)));
    let tls_stream = match timeout(TIMEOUT, connector.connect(server_name, second)).await {
        Ok(Ok(s)) => s,
        Ok(Err(e)) => {
            debug!(%ip, error = %e, "rdp TLS handshake failed");
            return None;
        }
        Err(_) => {
            debug!(%ip, "rdp TLS handshake timed out");
            return None;
        }
    };

    let Some(certs) = tls_stream.get_ref().1.peer_certificates() else {
        debug!(%ip, "rdp TLS session carried no peer certificate");
        return None;
    };
    let certs = certs.to_vec();
    let Some(leaf) = certs.first() else {
        debug!(%ip, "rdp peer certificate chain was empty");
        return None;
    };

    let name = names_from_cert(leaf.as_ref())
        .into_iter()
        .find(|n| is_valid_hostname(n));
    if name.is_none() {
        debug!(%ip, "rdp leaf certificate carried no usable hostname");
    }
    name
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn selected_protocol_parses_from_documented_response_layout() {
        let mut buf = vec![0u8; 19];
        buf[0] = 0x03;
        buf[1] = 0x00;
        buf[5] = 0xd0;
        buf[15..19].copy_from_slice(&2u32.to_le_bytes());
        assert_eq!(parse_selected_protocol(&buf), Some(2));
    }

    #[test]
    fn rejects_response_with_bad_tpkt_magic() {
        let mut buf = vec![0u8; 19];
        buf[0] = 0xff;
        buf[5] = 0xd0;
        assert_eq!(parse_selected_protocol(&buf), None);
    }

    #[test]
    fn parser_never_panics_on_short_input() {
        for len in 0..19 {
            let buf = vec![0u8; len];
            assert_eq!(parse_selected_protocol(&buf), None);
        }
    }
}
