//! The client callers use: one `send` per message, one connection per send.

use std::sync::Arc;

use postbox_common::{internal, tracing};

use crate::{
    auth,
    channel::Channel,
    config::ServerConfig,
    envelope::Envelope,
    error::{ErrorKind, Result, SendError},
    reply::Reply,
    tls, transmit,
};

/// The outcome of a [`SmtpClient::send`].
#[derive(Debug)]
pub struct SendResult {
    /// The server accepted the message at the end of DATA.
    pub delivered: bool,
    /// Why it wasn't, when it wasn't.
    pub error: Option<SendError>,
}

impl SendResult {
    const fn delivered() -> Self {
        Self {
            delivered: true,
            error: None,
        }
    }

    const fn failed(error: SendError) -> Self {
        Self {
            delivered: false,
            error: Some(error),
        }
    }

    /// Shorthand for the error's [`ErrorKind`].
    #[must_use]
    pub fn error_kind(&self) -> Option<ErrorKind> {
        self.error.as_ref().map(SendError::kind)
    }
}

/// Sends messages through one configured SMTP server.
///
/// The client holds configuration only. Each [`SmtpClient::send`] opens its
/// own connection and closes it before returning, so a client can be cloned
/// and shared between tasks freely.
///
/// # Examples
///
/// ```no_run
/// use postbox_smtp::{Envelope, ServerConfig, SmtpClient};
///
/// # async fn example() {
/// let client = SmtpClient::new(
///     ServerConfig::new("smtp.example.com", 587, "orders@example.com")
///         .with_tls(true)
///         .with_credentials("orders", "secret"),
/// );
///
/// let result = client
///     .send(&Envelope::new("buyer@example.com", "Your order", "<p>Thanks!</p>"))
///     .await;
///
/// assert!(result.delivered, "{:?}", result.error);
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct SmtpClient {
    config: Arc<ServerConfig>,
}

impl SmtpClient {
    #[must_use]
    pub fn new(config: ServerConfig) -> Self {
        Self {
            config: Arc::new(config),
        }
    }

    #[must_use]
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Delivers `envelope` in a single attempt.
    ///
    /// Never panics or errors on protocol conditions: every failure is
    /// reported in the returned [`SendResult`].
    #[tracing::instrument(level = "info", skip(self, envelope), fields(server = %self.config.address(), to = %envelope.to))]
    pub async fn send(&self, envelope: &Envelope) -> SendResult {
        if self.config.accept_invalid_certs && self.config.tls {
            tracing::warn!(
                server = %self.config.address(),
                "SECURITY WARNING: TLS certificate validation is disabled for this connection"
            );
        }

        let mut channel =
            match Channel::connect(&self.config.host, self.config.port, self.config.timeouts).await {
                Ok(channel) => channel,
                Err(err) => {
                    tracing::warn!("{err}");
                    return SendResult::failed(err);
                }
            };

        let outcome = self.session(&mut channel, envelope).await;
        channel.close().await;

        match outcome {
            Ok(reply) if reply.is_accepted() => {
                tracing::info!("Message accepted: {reply}");
                SendResult::delivered()
            }
            Ok(reply) => {
                tracing::warn!("Message not accepted: {reply}");
                SendResult::failed(SendError::UnexpectedReply {
                    command: "end of DATA".to_string(),
                    reply,
                })
            }
            Err(err) => {
                tracing::warn!("{err}");
                SendResult::failed(err)
            }
        }
    }

    /// Everything between connecting and closing; returns the reply to the
    /// end of DATA.
    async fn session(&self, channel: &mut Channel, envelope: &Envelope) -> Result<Reply> {
        let config = &*self.config;

        // The banner is read to stay in step with the server, never judged.
        channel.read_greeting().await?;

        let helo = format!("HELO {}", config.host);
        channel.send(&helo).await?;

        if config.tls {
            tls::upgrade(channel, &config.host, config.accept_invalid_certs).await?;
            channel.send(&helo).await?;
        }

        if let Some(credentials) = config.credentials() {
            auth::authenticate(channel, &credentials).await?;
        } else {
            internal!("No credentials configured, skipping AUTH");
        }

        transmit::transmit(
            channel,
            envelope,
            &config.from_email,
            config.reply_policy,
            config.dot_stuffing,
        )
        .await
    }
}

impl From<ServerConfig> for SmtpClient {
    fn from(config: ServerConfig) -> Self {
        Self::new(config)
    }
}
