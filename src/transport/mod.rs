//! Transports that carry NTLM tokens to an endpoint
//!
//! A transport knows how to deliver the NEGOTIATE token, bring back the
//! server CHALLENGE, and deliver the final AUTHENTICATE token. Protocol
//! verdicts (HTTP status, LDAP result code) are returned uninterpreted;
//! classification lives with the probers.

pub(crate) mod ber;
pub mod http;
pub mod ldap;

use async_trait::async_trait;

pub use http::HttpTransport;
pub use ldap::LdapTransport;

/// Final verdict of an authenticated exchange, per protocol
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportResponse {
    /// HTTP status of the response to the AUTHENTICATE request
    Http { status: u16 },

    /// LDAP bind result of the final SASL leg
    LdapBind {
        result_code: u32,
        server_message: String,
    },
}

/// Carrier for one NTLM handshake
#[async_trait]
pub trait NtlmTransport: Send {
    /// Deliver the NEGOTIATE token and return the raw server CHALLENGE
    async fn negotiate(&mut self, token: &[u8]) -> crate::Result<Vec<u8>>;

    /// Deliver the AUTHENTICATE token and return the protocol verdict
    async fn authenticate(&mut self, token: &[u8]) -> crate::Result<TransportResponse>;
}
