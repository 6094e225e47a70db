//! STARTTLS (RFC 3207).

use postbox_common::internal;

use crate::{
    channel::Channel,
    error::{Result, SendError},
};

/// Asks the server to start TLS and, on `220`, performs the handshake on the
/// same socket.
///
/// Nothing from the plaintext session survives the upgrade: the caller must
/// greet the server again before issuing anything else.
///
/// # Errors
///
/// - [`SendError::StartTlsRejected`] if the reply isn't `220`
/// - [`SendError::Tls`] if the server sent anything after its `220`, or the
///   handshake fails
/// - an IO error if the STARTTLS exchange itself fails
pub async fn upgrade(channel: &mut Channel, domain: &str, accept_invalid_certs: bool) -> Result<()> {
    let reply = channel.send("STARTTLS").await?;
    if !reply.is(220) {
        return Err(SendError::StartTlsRejected { reply });
    }

    // Anything already buffered was sent in plaintext before the handshake
    // and could have been injected.
    if channel.has_buffered_data() {
        return Err(SendError::Tls(
            "Server sent data after accepting STARTTLS".to_string(),
        ));
    }

    channel.upgrade_to_tls(domain, accept_invalid_certs).await?;
    internal!(level = DEBUG, "Connection upgraded to TLS");

    Ok(())
}
