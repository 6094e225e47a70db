//! A single-shot SMTP client for transactional mail.
//!
//! Each [`SmtpClient::send`] opens one connection to a pre-resolved server,
//! and runs the whole conversation over it:
//!
//! 1. read the banner and send `HELO`
//! 2. optionally `STARTTLS`, followed by a second `HELO`
//! 3. optionally `AUTH LOGIN`
//! 4. `MAIL FROM`, `RCPT TO`, `DATA`, the payload, `.` and `QUIT`
//!
//! and then closes it, whatever happened. The outcome is a [`SendResult`];
//! the message counts as delivered when the reply to the final `.` is in
//! the 250 class.
//!
//! The modules are usable on their own for anything that needs to drive a
//! [`Channel`] by hand.

pub mod auth;
pub mod channel;
pub mod client;
pub mod config;
pub mod connection;
pub mod envelope;
pub mod error;
pub mod reply;
pub mod tls;
pub mod transmit;

pub use channel::Channel;
pub use client::{SendResult, SmtpClient};
pub use config::{Credentials, ReplyPolicy, ServerConfig};
pub use envelope::{ContentType, Envelope, EnvelopeError, HeaderBlock, HeaderError};
pub use error::{AuthStep, ErrorKind, Result, SendError};
pub use reply::Reply;
