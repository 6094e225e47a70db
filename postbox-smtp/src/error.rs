//! Error types for a single SMTP send.

use std::{fmt, io};

use thiserror::Error;

use crate::{envelope::EnvelopeError, reply::Reply};

/// Coarse classification of a failed send.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// The transport could not be established (DNS, refused, timeout).
    Connection,
    /// STARTTLS was rejected or the handshake failed.
    TlsNegotiation,
    /// An AUTH LOGIN step received an unexpected reply.
    Authentication,
    /// The server sent something we couldn't accept.
    Protocol,
    /// Read or write failure on an established connection.
    Io,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Connection => "connection",
            Self::TlsNegotiation => "tls negotiation",
            Self::Authentication => "authentication",
            Self::Protocol => "protocol",
            Self::Io => "io",
        })
    }
}

/// Which AUTH LOGIN exchange failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthStep {
    Mechanism,
    Username,
    Password,
}

impl fmt::Display for AuthStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Mechanism => "AUTH LOGIN",
            Self::Username => "username",
            Self::Password => "password",
        })
    }
}

/// Errors that can occur while sending a message.
#[derive(Error, Debug)]
pub enum SendError {
    /// Couldn't open a TCP connection to the server.
    #[error("Failed to connect to {address}: {source}")]
    Connection {
        address: String,
        #[source]
        source: io::Error,
    },

    /// The server answered STARTTLS with something other than 220.
    #[error("STARTTLS rejected: {reply}")]
    StartTlsRejected { reply: Reply },

    /// TLS handshake or upgrade failed.
    #[error("TLS negotiation failed: {0}")]
    Tls(String),

    /// The server rejected one of the AUTH LOGIN steps.
    #[error("Authentication failed at {step}: {reply}")]
    Authentication { step: AuthStep, reply: Reply },

    /// The server replied to `command` with something we can't accept.
    #[error("Unexpected reply to {command}: {reply}")]
    UnexpectedReply { command: String, reply: Reply },

    /// The envelope would not survive being put on the wire as given.
    #[error("Invalid envelope: {0}")]
    InvalidEnvelope(#[from] EnvelopeError),

    /// The reply could not be framed at all.
    #[error("Malformed reply: {0}")]
    MalformedReply(String),

    /// IO error occurred during network operations.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// Connection was closed unexpectedly.
    #[error("Connection closed unexpectedly")]
    ConnectionClosed,
}

impl SendError {
    /// The taxonomy bucket this error belongs to.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::Connection { .. } => ErrorKind::Connection,
            Self::StartTlsRejected { .. } | Self::Tls(_) => ErrorKind::TlsNegotiation,
            Self::Authentication { .. } => ErrorKind::Authentication,
            Self::UnexpectedReply { .. } | Self::InvalidEnvelope(_) | Self::MalformedReply(_) => {
                ErrorKind::Protocol
            }
            Self::Io(_) | Self::ConnectionClosed => ErrorKind::Io,
        }
    }

    /// The server reply that caused this error, if there was one.
    #[must_use]
    pub const fn reply(&self) -> Option<&Reply> {
        match self {
            Self::StartTlsRejected { reply }
            | Self::Authentication { reply, .. }
            | Self::UnexpectedReply { reply, .. } => Some(reply),
            _ => None,
        }
    }

    pub(crate) fn timed_out(operation: &str, after: std::time::Duration) -> Self {
        Self::Io(io::Error::new(
            io::ErrorKind::TimedOut,
            format!("{operation} timed out after {after:?}"),
        ))
    }
}

/// Specialized `Result` type for SMTP client operations.
pub type Result<T> = std::result::Result<T, SendError>;
