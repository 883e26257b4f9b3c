//! AD CS web enrollment probing
//!
//! Certificate authorities expose two HTTP attack surfaces for NTLM
//! relay: the legacy web enrollment application under `/certsrv/` and
//! the enrollment web service under `/{CA}_CES_Kerberos/service.svc`.
//! Each is probed twice: plain HTTP, where any completed NTLM handshake
//! is relayable, and HTTPS with deliberately mismatched channel
//! bindings, where completion proves bindings are not enforced.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use url::Url;

use crate::config::ProbeConfig;
use crate::context::{create_security_context, ChannelBindings, ContextRequest};
use crate::findings::{Finding, ProbeOutcome, ProbeVariant, VulnerabilityStatus};
use crate::handshake::perform_ntlm_handshake;
use crate::transport::http::HttpTransport;
use crate::transport::TransportResponse;
use crate::{ProbeError, Result};

/// Which of the two enrollment surfaces a URL belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CaEndpointType {
    /// Legacy web enrollment application (`/certsrv/`)
    WebEnrollment,
    /// Certificate enrollment web service (`/{CA}_CES_Kerberos/service.svc`)
    EnrollmentWebService,
}

/// One classified probe result annotated with its enrollment surface
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaEndpointFinding {
    pub endpoint_type: CaEndpointType,
    pub finding: Finding,
}

/// Prober for the web enrollment endpoints of one certificate authority
pub struct CaEnrollmentScanner {
    host: String,
    ca_name: String,
    config: ProbeConfig,
}

impl CaEnrollmentScanner {
    pub fn new(host: impl Into<String>, ca_name: impl Into<String>, config: ProbeConfig) -> Self {
        Self {
            host: host.into(),
            ca_name: ca_name.into(),
            config,
        }
    }

    /// All enrollment URLs for this CA, paired with their surface and
    /// the probe variant that applies to their scheme
    fn endpoints(&self) -> Vec<(String, CaEndpointType, ProbeVariant)> {
        let mut endpoints = Vec::with_capacity(4);
        for (scheme, variant) in [
            ("http", ProbeVariant::HttpPlain),
            ("https", ProbeVariant::HttpsBadChannelBinding),
        ] {
            endpoints.push((
                format!("{}://{}/certsrv/", scheme, self.host),
                CaEndpointType::WebEnrollment,
                variant,
            ));
            endpoints.push((
                format!(
                    "{}://{}/{}_CES_Kerberos/service.svc",
                    scheme, self.host, self.ca_name
                ),
                CaEndpointType::EnrollmentWebService,
                variant,
            ));
        }
        endpoints
    }

    /// Probe every enrollment endpoint. Failures are isolated per
    /// endpoint; one broken URL never hides the others.
    pub async fn scan(&self) -> Vec<CaEndpointFinding> {
        let endpoints = self.endpoints();

        if let Err(e) = resolve(&self.host, self.config.timeout_duration()).await {
            let outcome = ProbeOutcome::from(&e);
            let status = VulnerabilityStatus::indeterminate(e.to_string());
            return endpoints
                .into_iter()
                .map(|(url, endpoint_type, variant)| CaEndpointFinding {
                    endpoint_type,
                    finding: Finding::new(url, variant, outcome.clone(), status.clone()),
                })
                .collect();
        }

        let probes = endpoints
            .iter()
            .map(|(url, endpoint_type, variant)| async move {
                CaEndpointFinding {
                    endpoint_type: *endpoint_type,
                    finding: self.scan_endpoint(url, *variant).await,
                }
            });
        futures::future::join_all(probes).await
    }

    /// Probe one explicit URL with the given variant
    pub async fn scan_endpoint(&self, url: &str, variant: ProbeVariant) -> Finding {
        let bad_bindings = variant == ProbeVariant::HttpsBadChannelBinding;
        let result = self.authenticate(url, bad_bindings).await;
        let outcome = ProbeOutcome::from_result(&result);
        let status = classify_http_outcome(bad_bindings, result);
        Finding::new(url, variant, outcome, status)
    }

    /// One full NTLM handshake against a single URL
    async fn authenticate(&self, url: &str, bad_bindings: bool) -> Result<TransportResponse> {
        let url = Url::parse(url).map_err(|e| ProbeError::Config(format!("{}: {}", url, e)))?;
        let op_timeout = self.config.timeout_duration();

        let schemes = HttpTransport::discover_supported_schemes(&url, op_timeout).await?;
        let scheme = schemes
            .first()
            .cloned()
            .ok_or_else(|| ProbeError::MissingChallenge(url.to_string()))?;

        let mut request = ContextRequest::anonymous(format!("HTTP/{}", self.host.to_uppercase()))
            .with_workstation(self.config.workstation.clone());
        if bad_bindings {
            request = request.with_bindings(ChannelBindings::mismatched());
        }
        let mut context = create_security_context(&request)?;

        let mut transport = HttpTransport::new(url, scheme, op_timeout)?;
        perform_ntlm_handshake(context.as_mut(), &mut transport).await
    }
}

async fn resolve(host: &str, op_timeout: Duration) -> Result<()> {
    let lookup = tokio::net::lookup_host((host, 443u16));
    match tokio::time::timeout(op_timeout, lookup).await? {
        Ok(mut addrs) => {
            if addrs.next().is_some() {
                Ok(())
            } else {
                Err(ProbeError::NameResolution(format!(
                    "{} resolved to no addresses",
                    host
                )))
            }
        }
        Err(e) => Err(ProbeError::NameResolution(format!("{}: {}", host, e))),
    }
}

fn classify_http_outcome(
    bad_bindings: bool,
    outcome: Result<TransportResponse>,
) -> VulnerabilityStatus {
    let status = match outcome {
        Ok(TransportResponse::Http { status }) => status,
        Ok(TransportResponse::LdapBind { .. }) => {
            return VulnerabilityStatus::indeterminate(
                "unexpected LDAP verdict from an HTTP exchange",
            )
        }
        Err(e) => return classify_http_error(e),
    };

    match status {
        200 => {
            if bad_bindings {
                VulnerabilityStatus::vulnerable(
                    "completed an NTLM handshake despite mismatched channel bindings",
                )
            } else {
                VulnerabilityStatus::vulnerable(
                    "completed an NTLM handshake over an unprotected channel",
                )
            }
        }
        401 if bad_bindings => {
            VulnerabilityStatus::not_vulnerable("channel binding is enforced")
        }
        401 => VulnerabilityStatus::indeterminate("anonymous NTLM authentication was rejected"),
        403 => VulnerabilityStatus::not_vulnerable("endpoint denies access"),
        500 => VulnerabilityStatus::not_vulnerable("endpoint failed server-side"),
        other => {
            VulnerabilityStatus::indeterminate(format!("unexpected HTTP status {}", other))
        }
    }
}

fn classify_http_error(e: ProbeError) -> VulnerabilityStatus {
    match e {
        ProbeError::Unreachable(_) => VulnerabilityStatus::not_vulnerable("port inaccessible"),
        ProbeError::NotFound(_) => VulnerabilityStatus::not_vulnerable("endpoint not present"),
        ProbeError::Forbidden(_) => VulnerabilityStatus::not_vulnerable("endpoint denies access"),
        ProbeError::RemoteServerError(_) => {
            VulnerabilityStatus::not_vulnerable("endpoint failed server-side")
        }
        ProbeError::MissingChallenge(_) => {
            VulnerabilityStatus::not_vulnerable("no NTLM challenge offered")
        }
        ProbeError::AuthNotSolicited(_) => {
            VulnerabilityStatus::indeterminate("endpoint did not request authentication")
        }
        other => VulnerabilityStatus::indeterminate(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn http(status: u16) -> Result<TransportResponse> {
        Ok(TransportResponse::Http { status })
    }

    #[test]
    fn test_endpoint_urls() {
        let scanner =
            CaEnrollmentScanner::new("ca01.corp.local", "CORP-CA", ProbeConfig::default());
        let urls: Vec<String> = scanner.endpoints().into_iter().map(|(u, _, _)| u).collect();
        assert_eq!(
            urls,
            vec![
                "http://ca01.corp.local/certsrv/",
                "http://ca01.corp.local/CORP-CA_CES_Kerberos/service.svc",
                "https://ca01.corp.local/certsrv/",
                "https://ca01.corp.local/CORP-CA_CES_Kerberos/service.svc",
            ]
        );
    }

    #[test]
    fn test_endpoint_variants_follow_scheme() {
        let scanner = CaEnrollmentScanner::new("ca01", "CA", ProbeConfig::default());
        for (url, endpoint_type, variant) in scanner.endpoints() {
            if url.starts_with("https") {
                assert_eq!(variant, ProbeVariant::HttpsBadChannelBinding);
            } else {
                assert_eq!(variant, ProbeVariant::HttpPlain);
            }
            if url.contains("certsrv") {
                assert_eq!(endpoint_type, CaEndpointType::WebEnrollment);
            } else {
                assert_eq!(endpoint_type, CaEndpointType::EnrollmentWebService);
            }
        }
    }

    #[test]
    fn test_accepted_handshake_is_vulnerable() {
        assert!(classify_http_outcome(false, http(200)).is_vulnerable());
        assert!(classify_http_outcome(true, http(200)).is_vulnerable());
    }

    #[test]
    fn test_rejected_bindings_proves_enforcement() {
        assert_eq!(
            classify_http_outcome(true, http(401)),
            VulnerabilityStatus::not_vulnerable("channel binding is enforced")
        );
    }

    #[test]
    fn test_plain_rejection_is_indeterminate() {
        // A 401 on the plain probe may just mean anonymous NTLM is
        // disabled; it says nothing about relayability
        assert!(matches!(
            classify_http_outcome(false, http(401)),
            VulnerabilityStatus::Indeterminate { .. }
        ));
    }

    #[test]
    fn test_server_errors_are_not_vulnerable() {
        for status in [403, 500] {
            assert!(matches!(
                classify_http_outcome(false, http(status)),
                VulnerabilityStatus::NotVulnerable { .. }
            ));
        }
    }

    #[test]
    fn test_missing_endpoint_is_not_vulnerable() {
        let status = classify_http_outcome(
            false,
            Err(ProbeError::NotFound("http://ca/certsrv/".into())),
        );
        assert_eq!(
            status,
            VulnerabilityStatus::not_vulnerable("endpoint not present")
        );
    }

    #[test]
    fn test_transport_failures() {
        assert_eq!(
            classify_http_outcome(false, Err(ProbeError::Unreachable("ca:80".into()))),
            VulnerabilityStatus::not_vulnerable("port inaccessible")
        );
        assert!(matches!(
            classify_http_outcome(false, Err(ProbeError::Timeout)),
            VulnerabilityStatus::Indeterminate { .. }
        ));
        assert!(matches!(
            classify_http_outcome(true, Err(ProbeError::NameResolution("ca".into()))),
            VulnerabilityStatus::Indeterminate { .. }
        ));
    }
}
