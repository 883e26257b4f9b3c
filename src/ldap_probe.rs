//! LDAP signing and LDAPS channel-binding probes
//!
//! Two questions per directory host: does plaintext LDAP accept an
//! unsigned NTLM bind, and does LDAPS accept an NTLM bind whose channel
//! bindings cannot possibly match the TLS channel. Both answers come
//! from the result code and diagnostic of the final SASL bind leg.

use std::sync::Arc;

use crate::config::ProbeConfig;
use crate::context::{create_security_context, ChannelBindings, ContextRequest};
use crate::findings::{Finding, ProbeOutcome, ProbeVariant, VulnerabilityStatus};
use crate::handshake::perform_ntlm_handshake;
use crate::portscan::{PortCheck, PortScanner};
use crate::transport::ldap::{result_code, LdapTransport};
use crate::transport::TransportResponse;
use crate::{ProbeError, Result};

/// Windows security layer sub-code for "NTLM not supported"
const SEC_E_UNSUPPORTED_FUNCTION: &str = "80090302";
/// Windows security layer sub-code for "channel bindings mismatch"
const SEC_E_BAD_BINDINGS: &str = "80090346";

/// Results of scanning one directory host
#[derive(Debug, Clone)]
pub struct LdapProbeReport {
    pub ldap_reachable: bool,
    pub ldaps_reachable: bool,
    pub findings: Vec<Finding>,
}

/// Prober for the LDAP services of a single host
pub struct LdapProber {
    host: String,
    config: ProbeConfig,
    port_check: Arc<dyn PortCheck>,
}

impl LdapProber {
    pub fn new(host: impl Into<String>, config: ProbeConfig) -> Self {
        Self {
            host: host.into(),
            config,
            port_check: Arc::new(PortScanner::new()),
        }
    }

    /// Share a reachability cache with other probers
    pub fn with_port_check(mut self, port_check: Arc<dyn PortCheck>) -> Self {
        self.port_check = port_check;
        self
    }

    /// Run both probes, preceded by reachability checks
    pub async fn scan(&self) -> LdapProbeReport {
        let precheck = self.config.port_scan_timeout_duration();
        let ldap_reachable = self
            .port_check
            .check_port(&self.host, self.config.ldap_port, precheck)
            .await;
        let ldaps_reachable = self
            .port_check
            .check_port(&self.host, self.config.ldaps_port, precheck)
            .await;

        let mut findings = Vec::with_capacity(2);

        let (signing_outcome, signing_status) = if ldap_reachable {
            let result = self.authenticate(false, None).await;
            (ProbeOutcome::from_result(&result), classify_signing(result))
        } else {
            (
                ProbeOutcome::TransportUnreachable,
                VulnerabilityStatus::indeterminate(format!(
                    "port {} not reachable",
                    self.config.ldap_port
                )),
            )
        };
        findings.push(Finding::new(
            format!("{}:{}", self.host, self.config.ldap_port),
            ProbeVariant::LdapSigning,
            signing_outcome,
            signing_status,
        ));

        let (binding_outcome, binding_status) = if ldaps_reachable {
            let result = self
                .authenticate(true, Some(ChannelBindings::mismatched()))
                .await;
            (
                ProbeOutcome::from_result(&result),
                classify_channel_binding(result),
            )
        } else {
            (
                ProbeOutcome::TransportUnreachable,
                VulnerabilityStatus::indeterminate(format!(
                    "port {} not reachable",
                    self.config.ldaps_port
                )),
            )
        };
        findings.push(Finding::new(
            format!("{}:{}", self.host, self.config.ldaps_port),
            ProbeVariant::LdapsChannelBinding,
            binding_outcome,
            binding_status,
        ));

        LdapProbeReport {
            ldap_reachable,
            ldaps_reachable,
            findings,
        }
    }

    /// One full NTLM bind attempt on a dedicated connection
    async fn authenticate(
        &self,
        use_tls: bool,
        bindings: Option<ChannelBindings>,
    ) -> Result<TransportResponse> {
        let mut request = ContextRequest::anonymous(format!("LDAP/{}", self.host.to_uppercase()))
            .with_workstation(self.config.workstation.clone());
        if let Some(bindings) = bindings {
            request = request.with_bindings(bindings);
        }
        let mut context = create_security_context(&request)?;

        let op_timeout = self.config.timeout_duration();
        let mut transport = if use_tls {
            LdapTransport::connect_tls(&self.host, self.config.ldaps_port, op_timeout).await?
        } else {
            LdapTransport::connect(&self.host, self.config.ldap_port, op_timeout).await?
        };

        perform_ntlm_handshake(context.as_mut(), &mut transport).await
    }
}

/// Bind verdicts surface either as a transport response or as a typed
/// bind error from the negotiate leg; fold both into one shape.
fn bind_verdict(outcome: Result<TransportResponse>) -> std::result::Result<(u32, String), ProbeError> {
    match outcome {
        Ok(TransportResponse::LdapBind {
            result_code,
            server_message,
        }) => Ok((result_code, server_message)),
        Ok(TransportResponse::Http { status }) => Err(ProbeError::Protocol(format!(
            "unexpected HTTP verdict ({}) from an LDAP exchange",
            status
        ))),
        Err(ProbeError::LdapBind {
            result_code,
            server_message,
        }) => Ok((result_code, server_message)),
        Err(e) => Err(e),
    }
}

fn classify_signing(outcome: Result<TransportResponse>) -> VulnerabilityStatus {
    let (code, message) = match bind_verdict(outcome) {
        Ok(verdict) => verdict,
        Err(e) => return VulnerabilityStatus::indeterminate(e.to_string()),
    };

    match code {
        result_code::SUCCESS => VulnerabilityStatus::vulnerable(
            "accepted an unsigned NTLM bind over plaintext LDAP",
        ),
        result_code::STRONGER_AUTH_REQUIRED => {
            VulnerabilityStatus::not_vulnerable("LDAP signing is enforced")
        }
        result_code::INVALID_CREDENTIALS
            if message.trim_start().starts_with(SEC_E_UNSUPPORTED_FUNCTION) =>
        {
            VulnerabilityStatus::indeterminate("endpoint does not support NTLM authentication")
        }
        result_code::INVALID_CREDENTIALS => {
            VulnerabilityStatus::not_vulnerable("server rejected the unsigned bind")
        }
        result_code::BUSY => VulnerabilityStatus::indeterminate("server busy"),
        result_code::SERVER_DOWN => {
            VulnerabilityStatus::indeterminate("LDAP endpoint not accessible")
        }
        other => VulnerabilityStatus::indeterminate(format!(
            "unhandled LDAP result code {}: {}",
            other, message
        )),
    }
}

fn classify_channel_binding(outcome: Result<TransportResponse>) -> VulnerabilityStatus {
    let (code, message) = match bind_verdict(outcome) {
        Ok(verdict) => verdict,
        Err(e) => return VulnerabilityStatus::indeterminate(e.to_string()),
    };

    match code {
        result_code::SUCCESS => VulnerabilityStatus::vulnerable(
            "accepted an NTLM bind with mismatched channel bindings over LDAPS",
        ),
        result_code::INVALID_CREDENTIALS
            if message.trim_start().starts_with(SEC_E_BAD_BINDINGS) =>
        {
            VulnerabilityStatus::not_vulnerable("channel binding is enforced")
        }
        result_code::INVALID_CREDENTIALS
            if message.trim_start().starts_with(SEC_E_UNSUPPORTED_FUNCTION) =>
        {
            VulnerabilityStatus::indeterminate("endpoint does not support NTLM authentication")
        }
        result_code::INVALID_CREDENTIALS => VulnerabilityStatus::indeterminate(
            "bind rejected without a channel binding diagnostic",
        ),
        result_code::SERVER_DOWN => {
            VulnerabilityStatus::indeterminate("LDAPS endpoint not accessible")
        }
        other => VulnerabilityStatus::indeterminate(format!(
            "unhandled LDAP result code {}: {}",
            other, message
        )),
    }
}
