//! Per-send SMTP configuration.

use std::fmt;

use postbox_common::config::ClientTimeouts;
use serde::{Deserialize, Serialize};

/// How strictly the replies to MAIL FROM, RCPT TO and DATA are checked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ReplyPolicy {
    /// Read the intermediate replies but only judge the reply to the final
    /// `.`: a rejected RCPT TO still has its payload pushed.
    #[default]
    Lenient,

    /// MAIL FROM and RCPT TO must get a 2xx and DATA a 354; anything else
    /// ends the transaction with QUIT.
    Strict,
}

/// Everything needed to reach and talk to one SMTP server.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,

    /// Issue STARTTLS after the first HELO.
    #[serde(default)]
    pub tls: bool,

    #[serde(default)]
    pub username: Option<String>,

    #[serde(default)]
    pub password: Option<String>,

    /// Envelope sender.
    pub from_email: String,

    /// Display name for the `From:` header.
    #[serde(default)]
    pub from_name: Option<String>,

    #[serde(default)]
    pub timeouts: ClientTimeouts,

    #[serde(default)]
    pub reply_policy: ReplyPolicy,

    /// Escape body lines starting with `.` (RFC 5321 section 4.5.2).
    ///
    /// Default: `true`. `false` sends the body verbatim.
    #[serde(default = "default_dot_stuffing")]
    pub dot_stuffing: bool,

    /// **SECURITY WARNING**: disables certificate validation after STARTTLS.
    /// Only for testing against self-signed servers.
    #[serde(default)]
    pub accept_invalid_certs: bool,
}

const fn default_dot_stuffing() -> bool {
    true
}

impl ServerConfig {
    /// A plaintext, unauthenticated configuration with default timeouts.
    #[must_use]
    pub fn new(host: impl Into<String>, port: u16, from_email: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port,
            tls: false,
            username: None,
            password: None,
            from_email: from_email.into(),
            from_name: None,
            timeouts: ClientTimeouts::default(),
            reply_policy: ReplyPolicy::default(),
            dot_stuffing: default_dot_stuffing(),
            accept_invalid_certs: false,
        }
    }

    #[must_use]
    pub const fn with_tls(mut self, tls: bool) -> Self {
        self.tls = tls;
        self
    }

    #[must_use]
    pub fn with_credentials(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self.password = Some(password.into());
        self
    }

    #[must_use]
    pub fn with_from_name(mut self, from_name: impl Into<String>) -> Self {
        self.from_name = Some(from_name.into());
        self
    }

    #[must_use]
    pub const fn with_timeouts(mut self, timeouts: ClientTimeouts) -> Self {
        self.timeouts = timeouts;
        self
    }

    #[must_use]
    pub const fn with_reply_policy(mut self, reply_policy: ReplyPolicy) -> Self {
        self.reply_policy = reply_policy;
        self
    }

    #[must_use]
    pub const fn with_dot_stuffing(mut self, dot_stuffing: bool) -> Self {
        self.dot_stuffing = dot_stuffing;
        self
    }

    #[must_use]
    pub const fn accept_invalid_certs(mut self, accept: bool) -> Self {
        self.accept_invalid_certs = accept;
        self
    }

    /// The credentials to authenticate with.
    ///
    /// `None` unless both username and password are set and non-empty, in
    /// which case no AUTH command is sent at all.
    #[must_use]
    pub fn credentials(&self) -> Option<Credentials<'_>> {
        match (self.username.as_deref(), self.password.as_deref()) {
            (Some(username), Some(password)) if !username.is_empty() && !password.is_empty() => {
                Some(Credentials { username, password })
            }
            _ => None,
        }
    }

    /// `host:port`, as used for logging and connection errors.
    #[must_use]
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl fmt::Debug for ServerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServerConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("tls", &self.tls)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("from_email", &self.from_email)
            .field("from_name", &self.from_name)
            .field("timeouts", &self.timeouts)
            .field("reply_policy", &self.reply_policy)
            .field("dot_stuffing", &self.dot_stuffing)
            .field("accept_invalid_certs", &self.accept_invalid_certs)
            .finish()
    }
}

/// A username/password pair borrowed from a [`ServerConfig`].
#[derive(Clone, Copy)]
pub struct Credentials<'a> {
    username: &'a str,
    password: &'a str,
}

impl<'a> Credentials<'a> {
    #[must_use]
    pub const fn username(&self) -> &'a str {
        self.username
    }

    #[must_use]
    pub const fn password(&self) -> &'a str {
        self.password
    }
}

impl fmt::Debug for Credentials<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}
