//! Probe outcome and vulnerability finding types
//!
//! A prober produces a [`Finding`] per endpoint variant it tested. The
//! three-way [`VulnerabilityStatus`] keeps "the endpoint is safe" distinct
//! from "we could not tell", which matters when results feed reporting.

use serde::{Deserialize, Serialize};

use crate::transport::TransportResponse;
use crate::ProbeError;

/// Low-level result of a single authenticated exchange
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProbeOutcome {
    /// The endpoint accepted the authentication attempt
    Success,

    /// Authentication was solicited but the final leg was rejected
    AuthRequiredButFailed { reason: String },

    /// The transport could not be established at all
    TransportUnreachable,

    /// The endpoint answered with a protocol-level failure
    ProtocolError {
        code: Option<u32>,
        server_message: String,
    },

    /// A network operation exceeded its deadline
    Timeout,
}

impl ProbeOutcome {
    /// Fold a completed or failed exchange into an outcome
    pub fn from_result(result: &crate::Result<TransportResponse>) -> Self {
        match result {
            Ok(response) => response.into(),
            Err(e) => e.into(),
        }
    }
}

impl From<&TransportResponse> for ProbeOutcome {
    fn from(response: &TransportResponse) -> Self {
        match response {
            TransportResponse::Http { status: 200 } => ProbeOutcome::Success,
            TransportResponse::Http { status } => ProbeOutcome::AuthRequiredButFailed {
                reason: format!("HTTP status {}", status),
            },
            TransportResponse::LdapBind { result_code: 0, .. } => ProbeOutcome::Success,
            TransportResponse::LdapBind {
                result_code,
                server_message,
            } => ProbeOutcome::ProtocolError {
                code: Some(*result_code),
                server_message: server_message.clone(),
            },
        }
    }
}

impl From<&ProbeError> for ProbeOutcome {
    fn from(e: &ProbeError) -> Self {
        match e {
            ProbeError::Unreachable(_) | ProbeError::NameResolution(_) => {
                ProbeOutcome::TransportUnreachable
            }
            ProbeError::Timeout => ProbeOutcome::Timeout,
            ProbeError::LdapBind {
                result_code,
                server_message,
            } => ProbeOutcome::ProtocolError {
                code: Some(*result_code),
                server_message: server_message.clone(),
            },
            other => ProbeOutcome::ProtocolError {
                code: None,
                server_message: other.to_string(),
            },
        }
    }
}

/// Classification of a probed endpoint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", content = "detail")]
pub enum VulnerabilityStatus {
    /// The endpoint accepted authentication it should have rejected
    Vulnerable { reason: String },

    /// The endpoint enforced the protection under test
    NotVulnerable { reason: String },

    /// The probe could not produce a definitive answer
    Indeterminate { error: String },
}

impl VulnerabilityStatus {
    pub fn vulnerable(reason: impl Into<String>) -> Self {
        VulnerabilityStatus::Vulnerable {
            reason: reason.into(),
        }
    }

    pub fn not_vulnerable(reason: impl Into<String>) -> Self {
        VulnerabilityStatus::NotVulnerable {
            reason: reason.into(),
        }
    }

    pub fn indeterminate(error: impl Into<String>) -> Self {
        VulnerabilityStatus::Indeterminate {
            error: error.into(),
        }
    }

    pub fn is_vulnerable(&self) -> bool {
        matches!(self, VulnerabilityStatus::Vulnerable { .. })
    }
}

/// Which protection a probe variant exercises
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ProbeVariant {
    /// NTLM over plaintext HTTP, relayable when accepted
    HttpPlain,

    /// NTLM over HTTPS with deliberately wrong channel bindings
    HttpsBadChannelBinding,

    /// Unsigned NTLM bind over plaintext LDAP
    LdapSigning,

    /// NTLM bind over LDAPS with deliberately wrong channel bindings
    LdapsChannelBinding,

    /// SMB dialect and signing negotiation
    SmbSigning,
}

impl ProbeVariant {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProbeVariant::HttpPlain => "http",
            ProbeVariant::HttpsBadChannelBinding => "https-channel-binding",
            ProbeVariant::LdapSigning => "ldap-signing",
            ProbeVariant::LdapsChannelBinding => "ldaps-channel-binding",
            ProbeVariant::SmbSigning => "smb-signing",
        }
    }
}

/// A single classified probe result
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Finding {
    /// Endpoint that was probed (URL or host:port)
    pub endpoint: String,

    /// Which protection was exercised
    pub variant: ProbeVariant,

    /// What the exchange itself produced, before classification
    pub outcome: ProbeOutcome,

    /// The classification
    pub status: VulnerabilityStatus,
}

impl Finding {
    pub fn new(
        endpoint: impl Into<String>,
        variant: ProbeVariant,
        outcome: ProbeOutcome,
        status: VulnerabilityStatus,
    ) -> Self {
        Self {
            endpoint: endpoint.into(),
            variant,
            outcome,
            status,
        }
    }
}
