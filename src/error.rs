//! Error handling for relay probing operations
//!
//! Every probe failure is folded into [`ProbeError`] so callers can map
//! transport and protocol failures onto vulnerability classifications
//! without inspecting strings.

use thiserror::Error;

/// Main error type for probing operations
#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("Target unreachable: {0}")]
    Unreachable(String),

    #[error("Name resolution failed: {0}")]
    NameResolution(String),

    #[error("Timeout error")]
    Timeout,

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("LDAP bind failed (result code {result_code}): {server_message}")]
    LdapBind {
        result_code: u32,
        server_message: String,
    },

    #[error("Security context error: {0}")]
    Context(String),

    #[error("Invalid operation: {0}")]
    InvalidOperation(String),

    #[error("Server did not issue an NTLM challenge: {0}")]
    MissingChallenge(String),

    #[error("Server did not solicit authentication: {0}")]
    AuthNotSolicited(String),

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Access forbidden: {0}")]
    Forbidden(String),

    #[error("Remote server error: {0}")]
    RemoteServerError(String),

    #[error("Unexpected HTTP status {0}")]
    UnexpectedStatus(u16),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

/// Result type alias for probe operations
pub type ProbeResult<T> = Result<T, ProbeError>;

impl From<tokio::time::error::Elapsed> for ProbeError {
    fn from(_: tokio::time::error::Elapsed) -> Self {
        ProbeError::Timeout
    }
}

impl From<native_tls::Error> for ProbeError {
    fn from(e: native_tls::Error) -> Self {
        ProbeError::Protocol(format!("TLS handshake failed: {}", e))
    }
}

impl ProbeError {
    /// True when the failure happened before any protocol exchange,
    /// meaning the endpoint itself could not be reached.
    pub fn is_connectivity(&self) -> bool {
        matches!(
            self,
            ProbeError::Unreachable(_) | ProbeError::NameResolution(_) | ProbeError::Timeout
        )
    }
}
