//! Configuration for probe runs

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Shared configuration for all probers
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProbeConfig {
    /// Timeout for each network operation in milliseconds
    pub timeout: u64,

    /// Timeout for reachability pre-checks in milliseconds
    pub port_scan_timeout: u64,

    /// SMB endpoint port
    pub smb_port: u16,

    /// Plaintext LDAP port
    pub ldap_port: u16,

    /// LDAP-over-TLS port
    pub ldaps_port: u16,

    /// Workstation name reported in NTLM messages (empty is valid)
    pub workstation: String,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            timeout: 10_000,
            port_scan_timeout: 2_000,
            smb_port: 445,
            ldap_port: 389,
            ldaps_port: 636,
            workstation: String::new(),
        }
    }
}

impl ProbeConfig {
    /// Create a new probe configuration with defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the per-operation timeout in milliseconds
    pub fn with_timeout(mut self, timeout: u64) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the reachability pre-check timeout in milliseconds
    pub fn with_port_scan_timeout(mut self, timeout: u64) -> Self {
        self.port_scan_timeout = timeout;
        self
    }

    /// Set the SMB port
    pub fn with_smb_port(mut self, port: u16) -> Self {
        self.smb_port = port;
        self
    }

    /// Set the LDAP and LDAPS ports
    pub fn with_ldap_ports(mut self, ldap: u16, ldaps: u16) -> Self {
        self.ldap_port = ldap;
        self.ldaps_port = ldaps;
        self
    }

    /// Get the operation timeout as Duration
    pub fn timeout_duration(&self) -> Duration {
        Duration::from_millis(self.timeout)
    }

    /// Get the reachability timeout as Duration
    pub fn port_scan_timeout_duration(&self) -> Duration {
        Duration::from_millis(self.port_scan_timeout)
    }

    /// Validate the configuration
    pub fn validate(&self) -> crate::Result<()> {
        if self.timeout == 0 {
            return Err(crate::ProbeError::Config(
                "Timeout must be greater than 0".to_string(),
            ));
        }

        if self.port_scan_timeout == 0 {
            return Err(crate::ProbeError::Config(
                "Port scan timeout must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = ProbeConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.timeout_duration(), Duration::from_secs(10));
        assert_eq!(config.smb_port, 445);
    }

    #[test]
    fn test_builder_chain() {
        let config = ProbeConfig::new()
            .with_timeout(500)
            .with_port_scan_timeout(250)
            .with_ldap_ports(10389, 10636);
        assert_eq!(config.timeout, 500);
        assert_eq!(config.ldap_port, 10389);
        assert_eq!(config.ldaps_port, 10636);
    }

    #[test]
    fn test_zero_timeout_rejected() {
        let config = ProbeConfig::new().with_timeout(0);
        assert!(config.validate().is_err());
    }
}
