//! The mail transaction: MAIL FROM, RCPT TO, DATA, payload and QUIT.

use postbox_common::{internal, outgoing, tracing};

use crate::{
    channel::{Channel, within},
    config::ReplyPolicy,
    envelope::{Envelope, check_address},
    error::{Result, SendError},
    reply::Reply,
};

/// Runs one mail transaction and returns the reply to the terminating `.`.
///
/// Under [`ReplyPolicy::Lenient`] the replies to MAIL FROM, RCPT TO and DATA
/// are read but not judged. Under [`ReplyPolicy::Strict`] an unexpected one
/// sends QUIT and fails the transaction. QUIT is sent in either case once the
/// transaction has run; its outcome only gets logged.
///
/// The addresses and payload are checked before anything is written, so a
/// malformed envelope never reaches the server.
///
/// # Errors
///
/// - [`SendError::InvalidEnvelope`] if an address or the payload would change
///   the command stream
/// - [`SendError::UnexpectedReply`] for a rejected step under the strict policy
/// - an IO error if the connection fails or a deadline passes
pub async fn transmit(
    channel: &mut Channel,
    envelope: &Envelope,
    from_email: &str,
    policy: ReplyPolicy,
    dot_stuffing: bool,
) -> Result<Reply> {
    check_address(from_email)?;
    check_address(&envelope.to)?;
    let payload = envelope.payload(dot_stuffing)?;

    let reply = channel.send(&format!("MAIL FROM: <{from_email}>")).await?;
    check(channel, policy, "MAIL FROM", reply, Reply::is_success).await?;

    let reply = channel.send(&format!("RCPT TO: <{}>", envelope.to)).await?;
    check(channel, policy, "RCPT TO", reply, Reply::is_success).await?;

    let reply = channel.send("DATA").await?;
    check(channel, policy, "DATA", reply, |reply| reply.is(354)).await?;

    let after = channel.timeouts().data();
    let reply = within("DATA transfer", after, async {
        outgoing!("<{} bytes of message data>", payload.len());
        channel.write_raw(payload.as_bytes()).await?;
        outgoing!(".");
        channel.write_raw(b".\r\n").await?;
        channel.read_reply().await
    })
    .await?;

    quit(channel).await;

    Ok(reply)
}

async fn check(
    channel: &mut Channel,
    policy: ReplyPolicy,
    command: &str,
    reply: Reply,
    accept: impl Fn(&Reply) -> bool,
) -> Result<()> {
    if accept(&reply) {
        return Ok(());
    }

    match policy {
        ReplyPolicy::Lenient => {
            internal!(
                level = DEBUG,
                "Ignoring reply to {command} under lenient policy: {reply}"
            );
            Ok(())
        }
        ReplyPolicy::Strict => {
            quit(channel).await;
            Err(SendError::UnexpectedReply {
                command: command.to_string(),
                reply,
            })
        }
    }
}

/// Sends QUIT and reads its reply, bounded by the quit timeout. Never fails.
pub async fn quit(channel: &mut Channel) {
    let after = channel.timeouts().quit();
    match tokio::time::timeout(after, channel.send("QUIT")).await {
        Ok(Ok(_)) => {}
        Ok(Err(err)) => tracing::debug!("QUIT failed: {err}"),
        Err(_) => tracing::debug!("QUIT timed out after {after:?}"),
    }
}
