//! Mock SMTP server for exercising the client
//!
//! This module provides a scripted mock SMTP server that can:
#![allow(dead_code)] // Test utility module - not all methods used in every test
//! - Reply to each command with a configured (possibly malformed) response
//! - Accept STARTTLS with a self-signed certificate
//! - Script the AUTH LOGIN exchange
//! - Drop the connection after N commands
//! - Record everything it received, including the client closing the socket
//!
//! # Example
//!
//! ```rust,no_run
//! use support::mock_server::MockSmtpServer;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let server = MockSmtpServer::builder()
//!     .with_rcpt_to_response(550, "User unknown")
//!     .build()
//!     .await?;
//!
//! // Point the client at 127.0.0.1:server.port()
//!
//! server.shutdown();
//! # Ok(())
//! # }
//! ```

use std::{
    net::SocketAddr,
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    },
    time::Duration,
};

use tokio::{
    io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader},
    net::{TcpListener, TcpStream},
    sync::RwLock,
    time::timeout,
};
use tokio_rustls::{
    TlsAcceptor,
    rustls::{
        self,
        pki_types::{CertificateDer, PrivateKeyDer, PrivatePkcs8KeyDer},
    },
};

/// Something the mock server observed on a connection
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SmtpCommand {
    /// EHLO command with hostname
    Ehlo(String),
    /// HELO command with hostname
    Helo(String),
    /// MAIL command, everything after `MAIL `
    MailFrom(String),
    /// RCPT command, everything after `RCPT `
    RcptTo(String),
    /// DATA command
    Data,
    /// Message content (after DATA, without the final dot)
    MessageContent(Vec<u8>),
    /// QUIT command
    Quit,
    /// STARTTLS command
    StartTls,
    /// TLS handshake completed
    TlsEstablished,
    /// AUTH command with its mechanism
    Auth(String),
    /// A line sent in answer to a 334 challenge
    AuthData(String),
    /// The client closed its side of the connection
    Closed,
    /// Unknown/other command
    Other(String),
}

/// A reply the server sends, stored as the exact bytes written
#[derive(Debug, Clone)]
pub struct SmtpResponse {
    /// SMTP status code, `None` for a raw reply
    pub code: Option<u16>,
    bytes: Vec<u8>,
}

impl SmtpResponse {
    pub fn new(code: u16, message: impl Into<String>) -> Self {
        Self {
            code: Some(code),
            bytes: format!("{code} {}\r\n", message.into()).into_bytes(),
        }
    }

    /// A multi-line reply, every line but the last marked as a continuation
    pub fn multi(code: u16, lines: &[&str]) -> Self {
        let mut text = String::new();
        for (i, line) in lines.iter().enumerate() {
            let separator = if i + 1 == lines.len() { ' ' } else { '-' };
            text.push_str(&format!("{code}{separator}{line}\r\n"));
        }
        Self {
            code: Some(code),
            bytes: text.into_bytes(),
        }
    }

    /// Exactly these bytes, however malformed
    pub fn raw(text: impl Into<String>) -> Self {
        Self {
            code: None,
            bytes: text.into().into_bytes(),
        }
    }

    fn to_bytes(&self) -> &[u8] {
        &self.bytes
    }
}

/// Mock SMTP server configuration
#[derive(Clone)]
struct MockServerConfig {
    greeting: SmtpResponse,
    helo_response: SmtpResponse,
    ehlo_response: SmtpResponse,
    starttls_response: Option<SmtpResponse>,
    starttls_trailing: Option<Vec<u8>>,
    tls_acceptor: Option<TlsAcceptor>,
    auth_responses: Vec<SmtpResponse>,
    mail_from_response: SmtpResponse,
    rcpt_to_response: SmtpResponse,
    data_response: SmtpResponse,
    data_end_response: SmtpResponse,
    quit_response: SmtpResponse,

    // Failure injection
    drop_after_commands: Option<usize>,
    hang_on_command: Option<usize>,
}

impl Default for MockServerConfig {
    fn default() -> Self {
        Self {
            greeting: SmtpResponse::new(220, "Mock SMTP Server"),
            helo_response: SmtpResponse::new(250, "Hello"),
            ehlo_response: SmtpResponse::multi(250, &["localhost", "STARTTLS", "AUTH LOGIN"]),
            starttls_response: None,
            starttls_trailing: None,
            tls_acceptor: None,
            auth_responses: vec![
                SmtpResponse::new(334, "VXNlcm5hbWU6"),
                SmtpResponse::new(334, "UGFzc3dvcmQ6"),
                SmtpResponse::new(235, "Authentication successful"),
            ],
            mail_from_response: SmtpResponse::new(250, "OK"),
            rcpt_to_response: SmtpResponse::new(250, "OK"),
            data_response: SmtpResponse::new(354, "Start mail input; end with <CRLF>.<CRLF>"),
            data_end_response: SmtpResponse::new(250, "OK: Message accepted"),
            quit_response: SmtpResponse::new(221, "Bye"),
            drop_after_commands: None,
            hang_on_command: None,
        }
    }
}

trait Io: AsyncRead + AsyncWrite + Unpin + Send {}
impl<T: AsyncRead + AsyncWrite + Unpin + Send> Io for T {}

/// Mock SMTP server for testing
pub struct MockSmtpServer {
    addr: SocketAddr,
    commands_received: Arc<RwLock<Vec<SmtpCommand>>>,
    shutdown: Arc<AtomicBool>,
    connections: Arc<AtomicUsize>,
}

impl MockSmtpServer {
    /// Create a new builder for configuring the mock server
    #[must_use]
    pub fn builder() -> MockSmtpServerBuilder {
        MockSmtpServerBuilder::new()
    }

    /// Get the address the server is listening on
    #[must_use]
    pub const fn addr(&self) -> SocketAddr {
        self.addr
    }

    #[must_use]
    pub const fn port(&self) -> u16 {
        self.addr.port()
    }

    /// Get all commands received by the server
    pub async fn commands(&self) -> Vec<SmtpCommand> {
        self.commands_received.read().await.clone()
    }

    /// Wait until the client has closed the connection, then return the commands
    pub async fn commands_after_close(&self) -> Vec<SmtpCommand> {
        for _ in 0..100 {
            let commands = self.commands().await;
            if commands.contains(&SmtpCommand::Closed) {
                return commands;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        self.commands().await
    }

    /// Number of connections accepted so far
    #[must_use]
    pub fn connections(&self) -> usize {
        self.connections.load(Ordering::Relaxed)
    }

    /// Shutdown the server
    pub fn shutdown(&self) {
        self.shutdown.store(true, Ordering::Relaxed);
    }

    /// Handle a single client connection
    #[allow(clippy::too_many_lines)]
    async fn handle_client(
        stream: TcpStream,
        config: Arc<MockServerConfig>,
        commands: Arc<RwLock<Vec<SmtpCommand>>>,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let stream: Box<dyn Io> = Box::new(stream);
        let mut reader = BufReader::new(stream);
        let mut line = String::new();
        let mut command_count = 0;
        let mut auth_step: Option<usize> = None;

        reader.get_mut().write_all(config.greeting.to_bytes()).await?;
        reader.get_mut().flush().await?;

        loop {
            line.clear();

            if let Some(drop_after) = config.drop_after_commands
                && command_count >= drop_after
            {
                // Silently close connection
                return Ok(());
            }

            if let Some(hang_on) = config.hang_on_command
                && command_count == hang_on
            {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                return Ok(());
            }

            let bytes_read = match timeout(Duration::from_secs(10), reader.read_line(&mut line)).await {
                Ok(Ok(n)) => n,
                Ok(Err(err)) => {
                    commands.write().await.push(SmtpCommand::Closed);
                    return Err(err.into());
                }
                Err(_) => return Ok(()),
            };

            if bytes_read == 0 {
                commands.write().await.push(SmtpCommand::Closed);
                return Ok(());
            }

            command_count += 1;
            let cmd_line = line.trim_end_matches(['\r', '\n']).to_string();
            tracing::debug!("Mock server received: {}", cmd_line);

            if let Some(step) = auth_step {
                commands
                    .write()
                    .await
                    .push(SmtpCommand::AuthData(cmd_line.clone()));
                let response = config
                    .auth_responses
                    .get(step)
                    .cloned()
                    .unwrap_or_else(|| SmtpResponse::new(503, "Bad sequence of commands"));
                auth_step = (response.code == Some(334)).then_some(step + 1);
                reader.get_mut().write_all(response.to_bytes()).await?;
                reader.get_mut().flush().await?;
                continue;
            }

            let parts: Vec<&str> = cmd_line.splitn(2, ' ').collect();
            let command = parts[0].to_uppercase();
            let argument = (*parts.get(1).unwrap_or(&"")).to_string();

            let (response, smtp_cmd) = match command.as_str() {
                "EHLO" => (config.ehlo_response.clone(), SmtpCommand::Ehlo(argument)),
                "HELO" => (config.helo_response.clone(), SmtpCommand::Helo(argument)),
                "MAIL" => (
                    config.mail_from_response.clone(),
                    SmtpCommand::MailFrom(argument),
                ),
                "RCPT" => (config.rcpt_to_response.clone(), SmtpCommand::RcptTo(argument)),
                "DATA" => (config.data_response.clone(), SmtpCommand::Data),
                "AUTH" => {
                    let response = config
                        .auth_responses
                        .first()
                        .cloned()
                        .unwrap_or_else(|| SmtpResponse::new(502, "Command not implemented"));
                    auth_step = (response.code == Some(334)).then_some(1);
                    (response, SmtpCommand::Auth(argument))
                }
                "QUIT" => (config.quit_response.clone(), SmtpCommand::Quit),
                "STARTTLS" => (
                    config
                        .starttls_response
                        .clone()
                        .unwrap_or_else(|| SmtpResponse::new(502, "Command not implemented")),
                    SmtpCommand::StartTls,
                ),
                _ => (
                    SmtpResponse::new(500, "Unknown command"),
                    SmtpCommand::Other(cmd_line.clone()),
                ),
            };

            commands.write().await.push(smtp_cmd.clone());

            if smtp_cmd == SmtpCommand::StartTls && response.code == Some(220) {
                let mut bytes = response.to_bytes().to_vec();
                if let Some(trailing) = &config.starttls_trailing {
                    bytes.extend_from_slice(trailing);
                }
                reader.get_mut().write_all(&bytes).await?;
                reader.get_mut().flush().await?;

                if let Some(acceptor) = &config.tls_acceptor {
                    let inner = reader.into_inner();
                    let tls = acceptor.accept(inner).await?;
                    commands.write().await.push(SmtpCommand::TlsEstablished);
                    let tls: Box<dyn Io> = Box::new(tls);
                    reader = BufReader::new(tls);
                }
                continue;
            }

            reader.get_mut().write_all(response.to_bytes()).await?;
            reader.get_mut().flush().await?;

            // Read message content until we see <CRLF>.<CRLF>
            if smtp_cmd == SmtpCommand::Data && response.code == Some(354) {
                let mut message_content = Vec::new();
                let mut data_line = String::new();

                loop {
                    data_line.clear();
                    let bytes_read = reader.read_line(&mut data_line).await?;
                    if bytes_read == 0 {
                        commands.write().await.push(SmtpCommand::Closed);
                        return Ok(());
                    }

                    if data_line == ".\r\n" {
                        commands
                            .write()
                            .await
                            .push(SmtpCommand::MessageContent(message_content.clone()));

                        reader
                            .get_mut()
                            .write_all(config.data_end_response.to_bytes())
                            .await?;
                        reader.get_mut().flush().await?;
                        break;
                    }

                    message_content.extend_from_slice(data_line.as_bytes());
                }
            }
        }
    }
}

/// A TLS acceptor with a freshly generated certificate for `localhost`
#[must_use]
pub fn self_signed_acceptor() -> TlsAcceptor {
    let cert = rcgen::generate_simple_self_signed(vec![
        "localhost".to_string(),
        "127.0.0.1".to_string(),
    ])
    .unwrap();
    let cert_der = CertificateDer::from(cert.serialize_der().unwrap());
    let key_der = PrivateKeyDer::Pkcs8(PrivatePkcs8KeyDer::from(cert.serialize_private_key_der()));

    let config = rustls::ServerConfig::builder()
        .with_no_client_auth()
        .with_single_cert(vec![cert_der], key_der)
        .unwrap();

    TlsAcceptor::from(Arc::new(config))
}

/// Builder for configuring a `MockSmtpServer`
pub struct MockSmtpServerBuilder {
    config: MockServerConfig,
}

impl MockSmtpServerBuilder {
    fn new() -> Self {
        Self {
            config: MockServerConfig::default(),
        }
    }

    /// Set the greeting message
    #[must_use]
    pub fn with_greeting(mut self, greeting: SmtpResponse) -> Self {
        self.config.greeting = greeting;
        self
    }

    /// Set the HELO response
    #[must_use]
    pub fn with_helo_response(mut self, response: SmtpResponse) -> Self {
        self.config.helo_response = response;
        self
    }

    /// Set the STARTTLS response; 220 makes the server expect a handshake
    #[must_use]
    pub fn with_starttls_response(mut self, code: u16, message: impl Into<String>) -> Self {
        self.config.starttls_response = Some(SmtpResponse::new(code, message));
        self
    }

    /// Accept STARTTLS and complete the handshake with a self-signed certificate
    #[must_use]
    pub fn with_tls(mut self) -> Self {
        self.config.starttls_response = Some(SmtpResponse::new(220, "Ready to start TLS"));
        self.config.tls_acceptor = Some(self_signed_acceptor());
        self
    }

    /// Bytes written straight after the 220 to STARTTLS, before any handshake
    #[must_use]
    pub fn with_starttls_trailing(mut self, trailing: impl Into<Vec<u8>>) -> Self {
        self.config.starttls_trailing = Some(trailing.into());
        self
    }

    /// Set the replies to AUTH and to each following credential line
    #[must_use]
    pub fn with_auth_responses(mut self, responses: Vec<SmtpResponse>) -> Self {
        self.config.auth_responses = responses;
        self
    }

    /// Set the MAIL FROM response
    #[must_use]
    pub fn with_mail_from_response(mut self, code: u16, message: impl Into<String>) -> Self {
        self.config.mail_from_response = SmtpResponse::new(code, message);
        self
    }

    /// Set the RCPT TO response
    #[must_use]
    pub fn with_rcpt_to_response(mut self, code: u16, message: impl Into<String>) -> Self {
        self.config.rcpt_to_response = SmtpResponse::new(code, message);
        self
    }

    /// Set the DATA command response
    #[must_use]
    pub fn with_data_response(mut self, code: u16, message: impl Into<String>) -> Self {
        self.config.data_response = SmtpResponse::new(code, message);
        self
    }

    /// Set the response after message content (after `<CRLF>.<CRLF>`)
    #[must_use]
    pub fn with_data_end_response(mut self, response: SmtpResponse) -> Self {
        self.config.data_end_response = response;
        self
    }

    /// Set the QUIT response
    #[must_use]
    pub fn with_quit_response(mut self, code: u16, message: impl Into<String>) -> Self {
        self.config.quit_response = SmtpResponse::new(code, message);
        self
    }

    /// Drop the connection after N commands
    #[must_use]
    pub const fn with_network_error_after_commands(mut self, count: usize) -> Self {
        self.config.drop_after_commands = Some(count);
        self
    }

    /// Hang without replying on the Nth command (0-indexed)
    #[must_use]
    pub const fn with_hang_on_command(mut self, command_index: usize) -> Self {
        self.config.hang_on_command = Some(command_index);
        self
    }

    /// Build and start the mock SMTP server
    ///
    /// # Errors
    ///
    /// Returns an error if the server fails to bind to a port
    pub async fn build(self) -> Result<MockSmtpServer, std::io::Error> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;

        let config = Arc::new(self.config);
        let commands = Arc::new(RwLock::new(Vec::new()));
        let shutdown = Arc::new(AtomicBool::new(false));
        let connections = Arc::new(AtomicUsize::new(0));

        let commands_clone = Arc::clone(&commands);
        let shutdown_clone = Arc::clone(&shutdown);
        let connections_clone = Arc::clone(&connections);

        tokio::spawn(async move {
            loop {
                if shutdown_clone.load(Ordering::Relaxed) {
                    break;
                }

                // Accept connection with timeout to allow checking shutdown flag
                let accept_result = timeout(Duration::from_millis(100), listener.accept()).await;

                if let Ok(Ok((stream, _peer))) = accept_result {
                    connections_clone.fetch_add(1, Ordering::Relaxed);
                    let config = Arc::clone(&config);
                    let commands = Arc::clone(&commands_clone);

                    tokio::spawn(async move {
                        if let Err(e) = MockSmtpServer::handle_client(stream, config, commands).await
                        {
                            tracing::debug!("Mock server client error: {}", e);
                        }
                    });
                }
            }
        });

        Ok(MockSmtpServer {
            addr,
            commands_received: commands,
            shutdown,
            connections,
        })
    }
}
