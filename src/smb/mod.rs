//! SMB dialect, signing and host metadata probing
//!
//! The probe negotiates SMBv1 first because old dialects leak the most
//! metadata, then falls back to SMBv2 on a fresh connection. Either way
//! it stops after the session setup response: the NTLMSSP CHALLENGE and
//! the negotiate response carry everything needed without completing
//! authentication.

pub mod ntlmssp;
pub mod packets;

use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;

use crate::config::ProbeConfig;
use crate::findings::{Finding, ProbeOutcome, ProbeVariant, VulnerabilityStatus};
use crate::{ProbeError, Result};

pub use ntlmssp::HostMetadata;

/// Dialect family the server settled on
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum SmbDialect {
    V1,
    V2,
}

/// Result of a completed SMB probe
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct SmbNegotiation {
    pub dialect: SmbDialect,

    /// Whether the server demands message signing. A relay against this
    /// host only works when this is false.
    pub signing_required: bool,

    pub metadata: HostMetadata,
}

/// Prober for a single SMB endpoint
pub struct SmbProber {
    config: ProbeConfig,
}

impl SmbProber {
    pub fn new(config: ProbeConfig) -> Self {
        Self { config }
    }

    /// Probe the configured SMB port
    pub async fn probe(&self, host: &str) -> Result<SmbNegotiation> {
        self.probe_port(host, self.config.smb_port).await
    }

    /// Probe an explicit port. Port 139 gets the NetBIOS session
    /// request prefix before any SMB traffic.
    pub async fn probe_port(&self, host: &str, port: u16) -> Result<SmbNegotiation> {
        let op_timeout = self.config.timeout_duration();
        let mut stream = connect(host, port, op_timeout).await?;

        if port == 139 {
            exchange(&mut stream, &packets::netbios_session_request(), op_timeout).await?;
        }

        match self.try_smb1(&mut stream, op_timeout).await {
            Ok(negotiation) => Ok(negotiation),
            Err(ProbeError::Timeout) => Err(ProbeError::Timeout),
            Err(e) => {
                log::debug!(
                    "{}:{}: SMBv1 probe failed ({}), retrying with SMBv2",
                    host,
                    port,
                    e
                );
                drop(stream);
                let mut stream = connect(host, port, op_timeout).await?;
                if port == 139 {
                    exchange(&mut stream, &packets::netbios_session_request(), op_timeout)
                        .await?;
                }
                self.try_smb2(&mut stream, op_timeout).await
            }
        }
    }

    /// Probe and fold the signing verdict into a finding
    pub async fn probe_finding(&self, host: &str) -> Finding {
        let endpoint = format!("{}:{}", host, self.config.smb_port);
        let (outcome, status) = match self.probe(host).await {
            Ok(negotiation) if negotiation.signing_required => (
                ProbeOutcome::Success,
                VulnerabilityStatus::not_vulnerable("SMB signing is required"),
            ),
            Ok(_) => (
                ProbeOutcome::Success,
                VulnerabilityStatus::vulnerable(
                    "SMB signing is not required; inbound NTLM relay is possible",
                ),
            ),
            Err(e) => {
                let outcome = ProbeOutcome::from(&e);
                let status = if matches!(e, ProbeError::Unreachable(_)) {
                    VulnerabilityStatus::not_vulnerable("port inaccessible")
                } else {
                    VulnerabilityStatus::indeterminate(e.to_string())
                };
                (outcome, status)
            }
        };
        Finding::new(endpoint, ProbeVariant::SmbSigning, outcome, status)
    }

    async fn try_smb1(
        &self,
        stream: &mut TcpStream,
        op_timeout: Duration,
    ) -> Result<SmbNegotiation> {
        let negotiate = exchange(stream, &packets::smb1_negotiate_request(), op_timeout).await?;
        // security mode of the negotiate response; 0x0F means signing
        // enabled and required
        let signing_required = negotiate.get(39) == Some(&0x0F);

        let blob = packets::spnego_neg_token_init(&packets::ntlmssp_negotiate_v1());
        let setup = exchange(
            stream,
            &packets::smb1_session_setup_request(&blob),
            op_timeout,
        )
        .await?;

        let ntlm = ntlmssp::find_ntlmssp(&setup).ok_or_else(|| {
            ProbeError::Protocol("no NTLMSSP challenge in SMBv1 session setup response".to_string())
        })?;
        let mut metadata = ntlmssp::parse_challenge_metadata(ntlm)?;
        if let Some((os, lanman)) = ntlmssp::parse_native_strings(&setup) {
            metadata.native_os = Some(os);
            metadata.native_lan_manager = Some(lanman);
        }

        Ok(SmbNegotiation {
            dialect: SmbDialect::V1,
            signing_required,
            metadata,
        })
    }

    async fn try_smb2(
        &self,
        stream: &mut TcpStream,
        op_timeout: Duration,
    ) -> Result<SmbNegotiation> {
        let discovery = exchange(stream, &packets::smb2_discovery_request(), op_timeout).await?;
        if discovery.len() < 72 || &discovery[4..8] != b"\xFESMB" {
            return Err(ProbeError::Protocol(
                "server did not answer SMB2 dialect discovery".to_string(),
            ));
        }
        // SMB2 security mode: 0x03 = signing enabled and required
        let signing_required = discovery[70] == 0x03;

        exchange(stream, &packets::smb2_negotiate_request(), op_timeout).await?;

        let blob =
            packets::spnego_neg_token_init(&packets::ntlmssp_negotiate_v2(signing_required));
        let setup = exchange(
            stream,
            &packets::smb2_session_setup_request(&blob),
            op_timeout,
        )
        .await?;

        let ntlm = ntlmssp::find_ntlmssp(&setup).ok_or_else(|| {
            ProbeError::Protocol("no NTLMSSP challenge in SMB2 session setup response".to_string())
        })?;
        let metadata = ntlmssp::parse_challenge_metadata(ntlm)?;

        Ok(SmbNegotiation {
            dialect: SmbDialect::V2,
            signing_required,
            metadata,
        })
    }
}

async fn connect(host: &str, port: u16, op_timeout: Duration) -> Result<TcpStream> {
    timeout(op_timeout, TcpStream::connect((host, port)))
        .await?
        .map_err(|e| ProbeError::Unreachable(format!("{}:{}: {}", host, port, e)))
}

/// Send one frame and read one NetBIOS-framed response. The returned
/// buffer keeps the 4-byte prefix so SMB field offsets match captures.
async fn exchange(stream: &mut TcpStream, frame: &[u8], op_timeout: Duration) -> Result<Vec<u8>> {
    timeout(op_timeout, stream.write_all(frame)).await??;

    let mut header = [0u8; 4];
    timeout(op_timeout, stream.read_exact(&mut header)).await??;
    let body_len = ((header[1] as usize) << 16) | ((header[2] as usize) << 8) | header[3] as usize;

    let mut response = header.to_vec();
    let mut body = vec![0u8; body_len];
    timeout(op_timeout, stream.read_exact(&mut body)).await??;
    response.extend_from_slice(&body);
    Ok(response)
}
