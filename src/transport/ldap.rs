//! LDAP transport for NTLM handshakes
//!
//! Tokens travel inside GSS-SPNEGO SASL bind requests with an empty bind
//! DN. The server challenge comes back in `serverSaslCreds` of a
//! `saslBindInProgress` response. Certificate validation is disabled for
//! the same reason as the HTTP transport.

use native_tls::TlsConnector;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;

use super::ber::{self, BindResponse};
use super::{NtlmTransport, TransportResponse};
use crate::{ProbeError, Result};

/// SASL mechanism used for the token exchange
pub const GSS_SPNEGO: &str = "GSS-SPNEGO";

/// LDAP result codes relevant to bind probing
pub mod result_code {
    pub const SUCCESS: u32 = 0;
    pub const STRONGER_AUTH_REQUIRED: u32 = 8;
    pub const SASL_BIND_IN_PROGRESS: u32 = 14;
    pub const INVALID_CREDENTIALS: u32 = 49;
    pub const BUSY: u32 = 51;
    pub const SERVER_DOWN: u32 = 81;
}

enum LdapStream {
    Plain(TcpStream),
    Tls(Box<tokio_native_tls::TlsStream<TcpStream>>),
}

impl LdapStream {
    async fn write_all(&mut self, buf: &[u8]) -> std::io::Result<()> {
        match self {
            LdapStream::Plain(s) => s.write_all(buf).await,
            LdapStream::Tls(s) => s.write_all(buf).await,
        }
    }

    async fn read_exact(&mut self, buf: &mut [u8]) -> std::io::Result<()> {
        match self {
            LdapStream::Plain(s) => s.read_exact(buf).await.map(|_| ()),
            LdapStream::Tls(s) => s.read_exact(buf).await.map(|_| ()),
        }
    }
}

/// One NTLM handshake over a dedicated LDAP connection
pub struct LdapTransport {
    stream: LdapStream,
    endpoint: String,
    next_message_id: i32,
    timeout: Duration,
}

impl LdapTransport {
    /// Connect over plaintext LDAP
    pub async fn connect(host: &str, port: u16, op_timeout: Duration) -> Result<Self> {
        let stream = Self::tcp_connect(host, port, op_timeout).await?;
        Ok(Self {
            stream: LdapStream::Plain(stream),
            endpoint: format!("{}:{}", host, port),
            next_message_id: 1,
            timeout: op_timeout,
        })
    }

    /// Connect over LDAPS
    pub async fn connect_tls(host: &str, port: u16, op_timeout: Duration) -> Result<Self> {
        let tcp = Self::tcp_connect(host, port, op_timeout).await?;

        let connector = TlsConnector::builder()
            .danger_accept_invalid_certs(true)
            .danger_accept_invalid_hostnames(true)
            .build()?;
        let connector = tokio_native_tls::TlsConnector::from(connector);

        let stream = timeout(op_timeout, connector.connect(host, tcp))
            .await?
            .map_err(|e| ProbeError::Protocol(format!("TLS handshake failed: {}", e)))?;

        Ok(Self {
            stream: LdapStream::Tls(Box::new(stream)),
            endpoint: format!("{}:{}", host, port),
            next_message_id: 1,
            timeout: op_timeout,
        })
    }

    async fn tcp_connect(host: &str, port: u16, op_timeout: Duration) -> Result<TcpStream> {
        timeout(op_timeout, TcpStream::connect((host, port)))
            .await?
            .map_err(|e| ProbeError::Unreachable(format!("{}:{}: {}", host, port, e)))
    }

    /// Send one GSS-SPNEGO bind leg and decode the response
    pub(crate) async fn sasl_bind(&mut self, token: &[u8]) -> Result<BindResponse> {
        let message_id = self.next_message_id;
        self.next_message_id += 1;

        let request = ber::encode_sasl_bind_request(message_id, "", GSS_SPNEGO, token);
        timeout(self.timeout, self.stream.write_all(&request)).await??;

        let message = timeout(self.timeout, read_ber_message(&mut self.stream)).await??;
        let response = ber::decode_bind_response(&message)?;

        if response.message_id != message_id {
            return Err(ProbeError::Protocol(format!(
                "{}: bind response for message {} while expecting {}",
                self.endpoint, response.message_id, message_id
            )));
        }
        Ok(response)
    }
}

/// Upper bound on a bind response; the length field is attacker
/// controlled and must not drive the allocation
const MAX_BER_MESSAGE: usize = 1 << 20;

/// Read one complete BER TLV frame from the stream
async fn read_ber_message(stream: &mut LdapStream) -> Result<Vec<u8>> {
    let mut header = [0u8; 2];
    stream.read_exact(&mut header).await?;

    let mut message = header.to_vec();
    let first = header[1];

    let content_len = if first & 0x80 == 0 {
        first as usize
    } else {
        let count = (first & 0x7F) as usize;
        if count == 0 || count > 4 {
            return Err(ProbeError::Protocol(
                "unsupported BER length encoding".to_string(),
            ));
        }
        let mut len_bytes = vec![0u8; count];
        stream.read_exact(&mut len_bytes).await?;
        message.extend_from_slice(&len_bytes);
        len_bytes.iter().fold(0usize, |acc, &b| (acc << 8) | b as usize)
    };

    if content_len > MAX_BER_MESSAGE {
        return Err(ProbeError::Protocol(format!(
            "BER message declares {} bytes, limit is {}",
            content_len, MAX_BER_MESSAGE
        )));
    }

    let mut content = vec![0u8; content_len];
    stream.read_exact(&mut content).await?;
    message.extend_from_slice(&content);
    Ok(message)
}

#[async_trait::async_trait]
impl NtlmTransport for LdapTransport {
    async fn negotiate(&mut self, token: &[u8]) -> Result<Vec<u8>> {
        let response = self.sasl_bind(token).await?;

        match response.result_code {
            result_code::SASL_BIND_IN_PROGRESS => {
                response.server_sasl_creds.ok_or_else(|| {
                    ProbeError::MissingChallenge(format!(
                        "{}: saslBindInProgress without server credentials",
                        self.endpoint
                    ))
                })
            }
            result_code::SUCCESS => Err(ProbeError::MissingChallenge(format!(
                "{}: bind succeeded before a challenge was issued",
                self.endpoint
            ))),
            code => Err(ProbeError::LdapBind {
                result_code: code,
                server_message: response.diagnostic_message,
            }),
        }
    }

    async fn authenticate(&mut self, token: &[u8]) -> Result<TransportResponse> {
        let response = self.sasl_bind(token).await?;
        Ok(TransportResponse::LdapBind {
            result_code: response.result_code,
            server_message: response.diagnostic_message,
        })
    }
}
