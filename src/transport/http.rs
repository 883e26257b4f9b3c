//! HTTP transport for NTLM handshakes
//!
//! Tokens travel base64-encoded in `Authorization` / `WWW-Authenticate`
//! headers. Certificate validation is disabled on purpose: enrollment
//! endpoints are routinely deployed with private CA certificates and the
//! probe must reach the authentication layer regardless.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use reqwest::header::{AUTHORIZATION, WWW_AUTHENTICATE};
use reqwest::{redirect, Client, Response, StatusCode};
use std::time::Duration;
use url::Url;

use super::{NtlmTransport, TransportResponse};
use crate::{ProbeError, Result};

/// Authentication schemes usable for an NTLM token exchange
const NTLM_SCHEMES: [&str; 2] = ["NTLM", "Negotiate"];

/// One NTLM handshake over HTTP, bound to a single scheme
pub struct HttpTransport {
    client: Client,
    url: Url,
    scheme: String,
}

impl HttpTransport {
    pub fn new(url: Url, scheme: impl Into<String>, timeout: Duration) -> Result<Self> {
        Ok(Self {
            client: build_client(timeout)?,
            url,
            scheme: scheme.into(),
        })
    }

    /// Ask the endpoint which NTLM-capable schemes it offers.
    ///
    /// Returns the schemes restricted to NTLM and Negotiate, deduplicated,
    /// in the order the server advertised them.
    pub async fn discover_supported_schemes(
        url: &Url,
        timeout: Duration,
    ) -> Result<Vec<String>> {
        let client = build_client(timeout)?;
        let response = client
            .get(url.clone())
            .send()
            .await
            .map_err(|e| map_reqwest_error(url, e))?;

        match response.status() {
            StatusCode::UNAUTHORIZED => {}
            StatusCode::OK => {
                return Err(ProbeError::AuthNotSolicited(format!(
                    "{} answered 200 without requesting authentication",
                    url
                )))
            }
            StatusCode::NOT_FOUND => return Err(ProbeError::NotFound(url.to_string())),
            StatusCode::FORBIDDEN => return Err(ProbeError::Forbidden(url.to_string())),
            StatusCode::INTERNAL_SERVER_ERROR => {
                return Err(ProbeError::RemoteServerError(url.to_string()))
            }
            other => return Err(ProbeError::UnexpectedStatus(other.as_u16())),
        }

        let mut schemes = Vec::new();
        for value in response.headers().get_all(WWW_AUTHENTICATE) {
            let Ok(value) = value.to_str() else { continue };
            let scheme = value.split_whitespace().next().unwrap_or_default();
            let Some(known) = NTLM_SCHEMES
                .iter()
                .find(|known| known.eq_ignore_ascii_case(scheme))
            else {
                continue;
            };
            if !schemes.iter().any(|s: &String| s == known) {
                schemes.push(known.to_string());
            }
        }

        if schemes.is_empty() {
            return Err(ProbeError::MissingChallenge(format!(
                "{} offered no NTLM or Negotiate scheme",
                url
            )));
        }
        Ok(schemes)
    }

    async fn send_token(&self, token: &[u8]) -> Result<Response> {
        self.client
            .get(self.url.clone())
            .header(
                AUTHORIZATION,
                format!("{} {}", self.scheme, BASE64.encode(token)),
            )
            .send()
            .await
            .map_err(|e| map_reqwest_error(&self.url, e))
    }

    /// Extract the server token for our scheme from WWW-Authenticate
    fn challenge_from(&self, response: &Response) -> Option<String> {
        for value in response.headers().get_all(WWW_AUTHENTICATE) {
            let Ok(value) = value.to_str() else { continue };
            let mut parts = value.splitn(2, ' ');
            let scheme = parts.next().unwrap_or_default();
            if scheme.eq_ignore_ascii_case(&self.scheme) {
                if let Some(token) = parts.next() {
                    let token = token.trim();
                    if !token.is_empty() {
                        return Some(token.to_string());
                    }
                }
            }
        }
        None
    }
}

#[async_trait::async_trait]
impl NtlmTransport for HttpTransport {
    async fn negotiate(&mut self, token: &[u8]) -> Result<Vec<u8>> {
        let response = self.send_token(token).await?;
        let status = response.status();

        if let Some(challenge) = self.challenge_from(&response) {
            return BASE64.decode(challenge.as_bytes()).map_err(|e| {
                ProbeError::Protocol(format!("challenge is not valid base64: {}", e))
            });
        }

        match status {
            StatusCode::NOT_FOUND => Err(ProbeError::NotFound(self.url.to_string())),
            StatusCode::FORBIDDEN => Err(ProbeError::Forbidden(self.url.to_string())),
            StatusCode::INTERNAL_SERVER_ERROR => {
                Err(ProbeError::RemoteServerError(self.url.to_string()))
            }
            StatusCode::OK => Err(ProbeError::AuthNotSolicited(format!(
                "{} accepted the initial token outright",
                self.url
            ))),
            _ => Err(ProbeError::MissingChallenge(format!(
                "{} answered {} without a {} challenge",
                self.url, status, self.scheme
            ))),
        }
    }

    async fn authenticate(&mut self, token: &[u8]) -> Result<TransportResponse> {
        let response = self.send_token(token).await?;
        Ok(TransportResponse::Http {
            status: response.status().as_u16(),
        })
    }
}

fn build_client(timeout: Duration) -> Result<Client> {
    Client::builder()
        .danger_accept_invalid_certs(true)
        .redirect(redirect::Policy::none())
        .timeout(timeout)
        .build()
        .map_err(|e| ProbeError::Config(format!("HTTP client setup failed: {}", e)))
}

fn map_reqwest_error(url: &Url, e: reqwest::Error) -> ProbeError {
    if e.is_timeout() {
        ProbeError::Timeout
    } else if e.is_connect() {
        ProbeError::Unreachable(format!("{}: {}", url, e))
    } else {
        ProbeError::Protocol(format!("{}: {}", url, e))
    }
}
