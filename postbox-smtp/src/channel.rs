//! Command/reply transport over a single connection.
//!
//! The channel knows how to frame commands and replies but nothing about
//! which command comes next; the components built on it decide that.

use std::{future::Future, time::Duration};

use postbox_common::{config::ClientTimeouts, incoming, internal, outgoing, tracing};
use tokio::net::TcpStream;

use crate::{
    connection::Connection,
    error::{Result, SendError},
    reply::Reply,
};

/// Initial size of the read buffer for SMTP replies.
const BUFFER_SIZE: usize = 8192;

/// Maximum size of the read buffer to prevent unbounded growth (1MB).
const MAX_BUFFER_SIZE: usize = 1024 * 1024;

/// Runs `fut`, failing with a timed-out IO error once `after` has elapsed.
pub(crate) async fn within<T>(
    operation: &str,
    after: Duration,
    fut: impl Future<Output = Result<T>>,
) -> Result<T> {
    tokio::time::timeout(after, fut)
        .await
        .map_err(|_| SendError::timed_out(operation, after))?
}

/// An open SMTP connection plus its reply buffer.
pub struct Channel {
    connection: Option<Connection>,
    buffer: Vec<u8>,
    buffer_pos: usize,
    timeouts: ClientTimeouts,
}

impl Channel {
    /// Opens a TCP connection to `host:port`, bounded by the connect timeout.
    ///
    /// # Errors
    ///
    /// Returns [`SendError::Connection`] if resolution or the connect fails or
    /// takes too long.
    pub async fn connect(host: &str, port: u16, timeouts: ClientTimeouts) -> Result<Self> {
        let address = format!("{host}:{port}");
        let connect_timeout = timeouts.connect();

        let stream = match tokio::time::timeout(connect_timeout, TcpStream::connect((host, port)))
            .await
        {
            Ok(Ok(stream)) => stream,
            Ok(Err(source)) => return Err(SendError::Connection { address, source }),
            Err(_) => {
                return Err(SendError::Connection {
                    address,
                    source: std::io::Error::new(
                        std::io::ErrorKind::TimedOut,
                        format!("connect timed out after {connect_timeout:?}"),
                    ),
                });
            }
        };

        internal!(level = DEBUG, "Connected to {address}");

        Ok(Self::from_connection(Connection::Plain(stream), timeouts))
    }

    pub(crate) fn from_connection(connection: Connection, timeouts: ClientTimeouts) -> Self {
        Self {
            connection: Some(connection),
            buffer: vec![0u8; BUFFER_SIZE],
            buffer_pos: 0,
            timeouts,
        }
    }

    #[must_use]
    pub const fn timeouts(&self) -> &ClientTimeouts {
        &self.timeouts
    }

    /// Returns `true` once the connection has been upgraded to TLS.
    #[must_use]
    pub fn is_tls(&self) -> bool {
        self.connection.as_ref().is_some_and(Connection::is_tls)
    }

    /// Returns `true` if bytes have arrived that no reply has consumed yet.
    #[must_use]
    pub const fn has_buffered_data(&self) -> bool {
        self.buffer_pos > 0
    }

    /// Sends `command` followed by CRLF and reads the single reply to it.
    ///
    /// # Errors
    ///
    /// Returns an IO error if the write or the read fails or exceeds the
    /// command timeout.
    pub async fn send(&mut self, command: &str) -> Result<Reply> {
        self.exchange(command, command).await
    }

    /// Like [`Channel::send`] but logs `shown` in place of the command.
    ///
    /// Used for lines carrying credentials.
    ///
    /// # Errors
    ///
    /// See [`Channel::send`].
    pub async fn send_masked(&mut self, command: &str, shown: &str) -> Result<Reply> {
        self.exchange(command, shown).await
    }

    async fn exchange(&mut self, command: &str, shown: &str) -> Result<Reply> {
        let verb = shown.split_whitespace().next().unwrap_or_default().to_string();
        let after = self.timeouts.command();

        within(&verb, after, async {
            outgoing!("{shown}");
            self.write_raw(format!("{command}\r\n").as_bytes()).await?;
            self.read_reply().await
        })
        .await
    }

    /// Reads one reply without sending anything, e.g. the server banner.
    ///
    /// # Errors
    ///
    /// Returns an error if the read fails, exceeds the command timeout or the
    /// reply is larger than the read buffer may grow.
    pub async fn read_greeting(&mut self) -> Result<Reply> {
        within("greeting", self.timeouts.command(), self.read_reply()).await
    }

    /// Writes `data` verbatim.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection is closed or the write fails.
    pub async fn write_raw(&mut self, data: &[u8]) -> Result<()> {
        self.connection
            .as_mut()
            .ok_or(SendError::ConnectionClosed)?
            .send(data)
            .await
    }

    /// Reads a complete SMTP reply from the server.
    ///
    /// No deadline of its own: callers wrap it in the one that applies.
    ///
    /// # Errors
    ///
    /// Returns an error if reading fails or the reply is too large.
    pub async fn read_reply(&mut self) -> Result<Reply> {
        loop {
            if let Some((reply, consumed)) = Reply::parse(&self.buffer[..self.buffer_pos]) {
                self.buffer.copy_within(consumed..self.buffer_pos, 0);
                self.buffer_pos -= consumed;

                incoming!("{reply}");
                return Ok(reply);
            }

            if self.buffer_pos >= self.buffer.len() {
                let new_size = self.buffer.len() * 2;
                if new_size > MAX_BUFFER_SIZE {
                    return Err(SendError::MalformedReply(format!(
                        "Reply too large (exceeds {MAX_BUFFER_SIZE} bytes)"
                    )));
                }
                self.buffer.resize(new_size, 0);
            }

            let connection = self
                .connection
                .as_mut()
                .ok_or(SendError::ConnectionClosed)?;
            let n = connection.read(&mut self.buffer[self.buffer_pos..]).await?;
            self.buffer_pos += n;
        }
    }

    /// Replaces the plain connection with a TLS one negotiated over the same
    /// socket.
    ///
    /// # Errors
    ///
    /// Returns [`SendError::Tls`] if the handshake fails or exceeds the
    /// STARTTLS timeout.
    pub async fn upgrade_to_tls(&mut self, domain: &str, accept_invalid_certs: bool) -> Result<()> {
        let connection = self.connection.take().ok_or(SendError::ConnectionClosed)?;
        let after = self.timeouts.starttls();

        let upgraded = within(
            "TLS handshake",
            after,
            connection.upgrade_to_tls(domain, accept_invalid_certs),
        )
        .await
        .map_err(|e| match e {
            SendError::Tls(_) => e,
            other => SendError::Tls(other.to_string()),
        })?;

        self.buffer_pos = 0;
        self.connection = Some(upgraded);
        Ok(())
    }

    /// Closes the connection. Consuming the channel means this happens once.
    pub async fn close(mut self) {
        if let Some(mut connection) = self.connection.take() {
            match tokio::time::timeout(self.timeouts.quit(), connection.shutdown()).await {
                Ok(Ok(())) => {}
                Ok(Err(err)) => tracing::debug!("Error while closing SMTP connection: {err}"),
                Err(_) => tracing::debug!("Timed out while closing SMTP connection"),
            }
            internal!(level = DEBUG, "Connection closed");
        }
    }
}
