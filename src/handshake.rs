//! NTLM handshake orchestration
//!
//! The handshake shape is identical across transports: send NEGOTIATE,
//! feed the CHALLENGE back into the context, send AUTHENTICATE, and hand
//! the protocol verdict to the caller.

use crate::context::SecurityContext;
use crate::transport::{NtlmTransport, TransportResponse};
use crate::Result;

/// Drive one complete NTLM handshake over the given transport.
///
/// Errors from either side propagate untouched so probers can classify
/// them; the transport verdict of the final leg is returned on success.
pub async fn perform_ntlm_handshake(
    context: &mut dyn SecurityContext,
    transport: &mut dyn NtlmTransport,
) -> Result<TransportResponse> {
    let negotiate = context.step(None)?;
    log::trace!("sending NEGOTIATE ({} bytes)", negotiate.len());

    let challenge = transport.negotiate(&negotiate).await?;
    log::trace!("received CHALLENGE ({} bytes)", challenge.len());

    let authenticate = context.step(Some(&challenge))?;
    log::trace!("sending AUTHENTICATE ({} bytes)", authenticate.len());

    transport.authenticate(&authenticate).await
}
