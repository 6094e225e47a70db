//! AUTH LOGIN (draft-murchison-sasl-login).

use base64::{Engine as _, engine::general_purpose::STANDARD};
use postbox_common::internal;

use crate::{
    channel::Channel,
    config::Credentials,
    error::{AuthStep, Result, SendError},
    reply::Reply,
};

/// Server is waiting for the next piece of the exchange.
const CONTINUE: u16 = 334;

/// Authentication succeeded.
const AUTHENTICATED: u16 = 235;

/// Runs the three AUTH LOGIN exchanges, each of which must get the expected
/// reply before the next is sent.
///
/// # Errors
///
/// Returns [`SendError::Authentication`] naming the failed step if any reply
/// is unexpected, or an IO error if the exchange fails.
pub async fn authenticate(channel: &mut Channel, credentials: &Credentials<'_>) -> Result<()> {
    expect(
        channel.send("AUTH LOGIN").await?,
        AuthStep::Mechanism,
        CONTINUE,
    )?;

    let username = STANDARD.encode(credentials.username());
    expect(
        channel.send_masked(&username, "<username>").await?,
        AuthStep::Username,
        CONTINUE,
    )?;

    let password = STANDARD.encode(credentials.password());
    expect(
        channel.send_masked(&password, "<password>").await?,
        AuthStep::Password,
        AUTHENTICATED,
    )?;

    internal!(level = DEBUG, "Authenticated as {}", credentials.username());
    Ok(())
}

fn expect(reply: Reply, step: AuthStep, code: u16) -> Result<()> {
    if reply.is(code) {
        Ok(())
    } else {
        Err(SendError::Authentication { step, reply })
    }
}
