//! Client-side security context abstraction
//!
//! A [`SecurityContext`] drives one NTLM handshake: the first `step`
//! produces the NEGOTIATE token, the second consumes the CHALLENGE and
//! produces AUTHENTICATE. Providers are tried in order so an environment
//! without a usable NTLM implementation still degrades predictably.

pub mod external;
pub mod ntlm;

use md5::{Digest, Md5};

use crate::{ProbeError, Result};

pub use external::ExternalContext;
pub use ntlm::NtlmContext;

/// Lifecycle of a security context
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextState {
    /// No token produced yet
    Uninitialized,
    /// NEGOTIATE sent, waiting for the server CHALLENGE
    AwaitingChallenge,
    /// AUTHENTICATE produced, session key established
    Complete,
    /// A step failed; the context cannot be reused
    Failed,
}

/// Explicit account credentials for the handshake
#[derive(Debug, Clone)]
pub struct Credentials {
    pub username: String,
    pub domain: String,
    pub password: String,
}

/// GSS-API channel bindings (SEC_CHANNEL_BINDINGS)
///
/// For probing, `application_data` is deliberately set to values that can
/// never match the real TLS channel so enforcement becomes observable.
#[derive(Debug, Clone, Default)]
pub struct ChannelBindings {
    pub initiator_addr_type: u32,
    pub initiator_address: Vec<u8>,
    pub acceptor_addr_type: u32,
    pub acceptor_address: Vec<u8>,
    pub application_data: Vec<u8>,
}

impl ChannelBindings {
    /// Bindings carrying only application data
    pub fn with_application_data(data: Vec<u8>) -> Self {
        Self {
            application_data: data,
            ..Default::default()
        }
    }

    /// Bindings guaranteed not to match any real TLS channel
    pub fn mismatched() -> Self {
        Self::with_application_data(vec![0, 0, 0, 0])
    }

    /// MD5 of the serialized gss_channel_bindings_struct, the value carried
    /// in the MsvAvChannelBindings AV pair
    pub(crate) fn av_pair_hash(&self) -> [u8; 16] {
        let mut buf = Vec::with_capacity(20 + self.application_data.len());
        buf.extend_from_slice(&self.initiator_addr_type.to_le_bytes());
        buf.extend_from_slice(&(self.initiator_address.len() as u32).to_le_bytes());
        buf.extend_from_slice(&self.initiator_address);
        buf.extend_from_slice(&self.acceptor_addr_type.to_le_bytes());
        buf.extend_from_slice(&(self.acceptor_address.len() as u32).to_le_bytes());
        buf.extend_from_slice(&self.acceptor_address);
        buf.extend_from_slice(&(self.application_data.len() as u32).to_le_bytes());
        buf.extend_from_slice(&self.application_data);

        let digest = Md5::digest(&buf);
        let mut hash = [0u8; 16];
        hash.copy_from_slice(&digest);
        hash
    }
}

/// Everything needed to build a context for one handshake
#[derive(Debug, Clone)]
pub struct ContextRequest {
    /// Explicit credentials, or None for an anonymous handshake
    pub credentials: Option<Credentials>,

    /// Service principal name of the target (e.g. `LDAP/DC01.CORP.LOCAL`)
    pub target_spn: String,

    /// Channel bindings folded into the AUTHENTICATE message
    pub bindings: Option<ChannelBindings>,

    /// Workstation name reported in the AUTHENTICATE message
    pub workstation: String,

    /// Request message integrity (signing)
    pub integrity: bool,

    /// Request message confidentiality (sealing)
    pub confidentiality: bool,
}

impl ContextRequest {
    /// Anonymous request without integrity or confidentiality, the shape
    /// used by signing and channel-binding probes
    pub fn anonymous(target_spn: impl Into<String>) -> Self {
        Self {
            credentials: None,
            target_spn: target_spn.into(),
            bindings: None,
            workstation: String::new(),
            integrity: false,
            confidentiality: false,
        }
    }

    /// Attach channel bindings
    pub fn with_bindings(mut self, bindings: ChannelBindings) -> Self {
        self.bindings = Some(bindings);
        self
    }

    /// Set the reported workstation name
    pub fn with_workstation(mut self, workstation: impl Into<String>) -> Self {
        self.workstation = workstation.into();
        self
    }
}

/// Client side of a GSS-style token exchange
pub trait SecurityContext: Send {
    /// Advance the handshake. `None` input produces the initial token;
    /// subsequent calls consume the peer token from the previous leg.
    fn step(&mut self, input_token: Option<&[u8]>) -> Result<Vec<u8>>;

    /// Sign (and with confidentiality, seal) a message. Only valid once
    /// the context is [`ContextState::Complete`].
    fn wrap(&mut self, data: &[u8]) -> Result<Vec<u8>>;

    /// Verify and strip the signature produced by [`SecurityContext::wrap`]
    fn unwrap(&mut self, data: &[u8]) -> Result<Vec<u8>>;

    /// Current lifecycle state
    fn state(&self) -> ContextState;
}

/// A way of obtaining a [`SecurityContext`]
trait ContextProvider {
    fn name(&self) -> &'static str;

    /// Cheap availability check, consulted before `create`
    fn available(&self, request: &ContextRequest) -> bool;

    fn create(&self, request: &ContextRequest) -> Result<Box<dyn SecurityContext>>;
}

struct NtlmProvider;

impl ContextProvider for NtlmProvider {
    fn name(&self) -> &'static str {
        "ntlm"
    }

    fn available(&self, _request: &ContextRequest) -> bool {
        true
    }

    fn create(&self, request: &ContextRequest) -> Result<Box<dyn SecurityContext>> {
        Ok(Box::new(NtlmContext::new(request.clone())))
    }
}

struct ExternalProvider;

impl ContextProvider for ExternalProvider {
    fn name(&self) -> &'static str {
        "external"
    }

    fn available(&self, request: &ContextRequest) -> bool {
        // The pass-through context cannot carry credentials or bindings
        request.credentials.is_none() && request.bindings.is_none()
    }

    fn create(&self, _request: &ContextRequest) -> Result<Box<dyn SecurityContext>> {
        Ok(Box::new(ExternalContext::new()))
    }
}

/// Build a context from the first provider that succeeds.
///
/// Failures from every candidate are aggregated into one error so the
/// caller sees why each strategy was rejected.
pub fn create_security_context(request: &ContextRequest) -> Result<Box<dyn SecurityContext>> {
    let providers: [&dyn ContextProvider; 2] = [&NtlmProvider, &ExternalProvider];
    let mut failures = Vec::new();

    for provider in providers {
        if !provider.available(request) {
            failures.push(format!("{}: not available", provider.name()));
            continue;
        }
        match provider.create(request) {
            Ok(context) => {
                log::debug!(
                    "security context created by provider '{}' for {}",
                    provider.name(),
                    request.target_spn
                );
                return Ok(context);
            }
            Err(e) => failures.push(format!("{}: {}", provider.name(), e)),
        }
    }

    Err(ProbeError::Context(format!(
        "no security context provider succeeded: {}",
        failures.join("; ")
    )))
}
