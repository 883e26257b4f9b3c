//! relayprobe - NTLM relay and downgrade vulnerability prober
//!
//! Probes HTTP certificate-enrollment endpoints, LDAP/LDAPS and SMB for
//! missing NTLM relay mitigations: plaintext NTLM acceptance, unenforced
//! channel bindings, and disabled signing.

pub mod ca_enrollment;
pub mod config;
pub mod context;
pub mod error;
pub mod findings;
pub mod handshake;
pub mod ldap_probe;
pub mod portscan;
pub mod smb;
pub mod transport;

// Re-export commonly used types
pub use ca_enrollment::{CaEndpointFinding, CaEndpointType, CaEnrollmentScanner};
pub use config::ProbeConfig;
pub use context::{create_security_context, ChannelBindings, ContextRequest, SecurityContext};
pub use error::{ProbeError, ProbeResult};
pub use findings::{Finding, ProbeOutcome, ProbeVariant, VulnerabilityStatus};
pub use ldap_probe::{LdapProbeReport, LdapProber};
pub use portscan::{PortCheck, PortScanner};
pub use smb::SmbProber;

pub type Result<T> = std::result::Result<T, ProbeError>;
