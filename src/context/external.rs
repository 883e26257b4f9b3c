//! Pass-through security context
//!
//! Stands in when no native NTLM handshake can be produced: it emits
//! empty tokens and lets the transport observe the server's reaction to
//! an unauthenticated exchange. It can never carry credentials, channel
//! bindings, or message protection.

use super::{ContextState, SecurityContext};
use crate::{ProbeError, Result};

/// A context whose tokens are produced outside this library
pub struct ExternalContext {
    state: ContextState,
}

impl ExternalContext {
    pub fn new() -> Self {
        Self {
            state: ContextState::Uninitialized,
        }
    }
}

impl Default for ExternalContext {
    fn default() -> Self {
        Self::new()
    }
}

impl SecurityContext for ExternalContext {
    fn step(&mut self, _input_token: Option<&[u8]>) -> Result<Vec<u8>> {
        match self.state {
            ContextState::Uninitialized => {
                self.state = ContextState::AwaitingChallenge;
                Ok(Vec::new())
            }
            ContextState::AwaitingChallenge => {
                self.state = ContextState::Complete;
                Ok(Vec::new())
            }
            ContextState::Complete | ContextState::Failed => Err(ProbeError::InvalidOperation(
                "pass-through context cannot continue".to_string(),
            )),
        }
    }

    fn wrap(&mut self, _data: &[u8]) -> Result<Vec<u8>> {
        Err(ProbeError::InvalidOperation(
            "pass-through context cannot protect messages".to_string(),
        ))
    }

    fn unwrap(&mut self, _data: &[u8]) -> Result<Vec<u8>> {
        Err(ProbeError::InvalidOperation(
            "pass-through context cannot protect messages".to_string(),
        ))
    }

    fn state(&self) -> ContextState {
        self.state
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_completes_after_two_steps() {
        let mut ctx = ExternalContext::new();
        assert!(ctx.step(None).unwrap().is_empty());
        assert_eq!(ctx.state(), ContextState::AwaitingChallenge);
        assert!(ctx.step(Some(b"ignored")).unwrap().is_empty());
        assert_eq!(ctx.state(), ContextState::Complete);
        assert!(ctx.step(None).is_err());
    }

    #[test]
    fn test_wrap_always_rejected() {
        let mut ctx = ExternalContext::new();
        ctx.step(None).unwrap();
        ctx.step(None).unwrap();
        assert!(ctx.wrap(b"data").is_err());
    }
}
