//! The message handed to the client, and how it is laid out on the wire.

use std::fmt::Write;

use thiserror::Error;

/// One outbound message to a single recipient.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    /// Recipient address, used for RCPT TO.
    pub to: String,
    pub subject: String,
    /// Pre-built header block, CRLF-joined, without `Subject`.
    pub headers: String,
    /// Rendered HTML or plain-text body.
    pub body: String,
}

impl Envelope {
    #[must_use]
    pub fn new(to: impl Into<String>, subject: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            to: to.into(),
            subject: subject.into(),
            headers: String::new(),
            body: body.into(),
        }
    }

    #[must_use]
    pub fn with_headers(mut self, headers: impl Into<String>) -> Self {
        self.headers = headers.into();
        self
    }

    /// Everything sent between the DATA reply and the terminating `.` line.
    ///
    /// `Subject`, the header block, a blank line, then the body and a final
    /// CRLF. With `dot_stuffing` the body's line endings become CRLF and lines
    /// starting with `.` get another one in front; without it the body is
    /// copied as is.
    ///
    /// # Errors
    ///
    /// Returns an error if the subject contains a line break, or the header
    /// block has a bare CR or LF, a blank line or a line starting with `.`.
    pub fn payload(&self, dot_stuffing: bool) -> Result<String, EnvelopeError> {
        if self.subject.contains(['\r', '\n']) {
            return Err(EnvelopeError::SubjectLineBreak);
        }

        // A trailing CRLF here would end the header section early.
        let headers = self.headers.trim_end_matches(['\r', '\n']);
        if !headers.is_empty() {
            check_header_lines(headers)?;
        }

        let mut payload = String::with_capacity(self.subject.len() + self.headers.len() + self.body.len() + 32);

        let _ = write!(payload, "Subject: {}\r\n", self.subject);

        if !headers.is_empty() {
            payload.push_str(headers);
            payload.push_str("\r\n");
        }
        payload.push_str("\r\n");

        if dot_stuffing {
            payload.push_str(&dot_stuff(&self.body));
        } else {
            payload.push_str(&self.body);
        }
        payload.push_str("\r\n");

        Ok(payload)
    }
}

fn check_header_lines(headers: &str) -> Result<(), EnvelopeError> {
    for (i, line) in headers.split("\r\n").enumerate() {
        let reason = if line.contains(['\r', '\n']) {
            "bare CR or LF"
        } else if line.is_empty() {
            "blank line"
        } else if line.starts_with('.') {
            "starts with '.'"
        } else {
            continue;
        };

        return Err(EnvelopeError::MalformedHeaders { line: i + 1, reason });
    }

    Ok(())
}

/// Checks that `address` can go between the angle brackets of MAIL FROM or
/// RCPT TO without changing the command line.
///
/// # Errors
///
/// Returns [`EnvelopeError::InvalidAddress`] if it contains a control
/// character or an angle bracket.
pub fn check_address(address: &str) -> Result<(), EnvelopeError> {
    if address.chars().any(|c| c.is_control() || c == '<' || c == '>') {
        return Err(EnvelopeError::InvalidAddress(address.to_string()));
    }
    Ok(())
}

/// Rewrites `body` with CRLF line endings, doubling a leading `.` on any line
/// (RFC 5321 section 4.5.2). The result has no trailing line ending.
#[must_use]
pub fn dot_stuff(body: &str) -> String {
    let mut stuffed = String::with_capacity(body.len() + 16);

    for (i, line) in body.lines().enumerate() {
        if i > 0 {
            stuffed.push_str("\r\n");
        }
        if line.starts_with('.') {
            stuffed.push('.');
        }
        stuffed.push_str(line);
    }

    stuffed
}

/// Why an envelope can't be put on the wire as given.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum EnvelopeError {
    #[error("Invalid address {0:?}")]
    InvalidAddress(String),

    #[error("Subject contains a line break")]
    SubjectLineBreak,

    #[error("Header block line {line} is malformed: {reason}")]
    MalformedHeaders { line: usize, reason: &'static str },
}

/// Why a header block couldn't be built.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum HeaderError {
    #[error("Invalid header name: {0:?}")]
    InvalidName(String),

    #[error("Header {0} contains a line break")]
    LineBreak(String),
}

/// Body format announced in `Content-Type`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ContentType {
    #[default]
    Html,
    Plain,
}

/// Builds the header block for [`Envelope::headers`].
///
/// # Examples
///
/// ```
/// use postbox_smtp::HeaderBlock;
///
/// let headers = HeaderBlock::new("orders@example.com")
///     .from_name("Order Desk")
///     .build()
///     .unwrap();
///
/// assert!(headers.starts_with("From: Order Desk <orders@example.com>\r\n"));
/// ```
#[derive(Debug, Clone)]
pub struct HeaderBlock {
    from_email: String,
    from_name: Option<String>,
    content_type: ContentType,
    extra: Vec<(String, String)>,
}

impl HeaderBlock {
    #[must_use]
    pub fn new(from_email: impl Into<String>) -> Self {
        Self {
            from_email: from_email.into(),
            from_name: None,
            content_type: ContentType::default(),
            extra: Vec::new(),
        }
    }

    #[must_use]
    pub fn from_name(mut self, name: impl Into<String>) -> Self {
        self.from_name = Some(name.into());
        self
    }

    #[must_use]
    pub const fn content_type(mut self, content_type: ContentType) -> Self {
        self.content_type = content_type;
        self
    }

    /// Appends a custom header after the standard ones.
    #[must_use]
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.extra.push((name.into(), value.into()));
        self
    }

    /// Renders the block, CRLF-joined with no trailing line ending.
    ///
    /// # Errors
    ///
    /// Returns an error if a header name isn't a printable token or any value
    /// contains CR or LF.
    pub fn build(self) -> Result<String, HeaderError> {
        let from = match self.from_name.as_deref() {
            Some(name) if !name.is_empty() => format!("{name} <{}>", self.from_email),
            _ => format!("<{}>", self.from_email),
        };

        let mut headers = vec![
            ("From".to_string(), from),
            ("Reply-To".to_string(), self.from_email.clone()),
            (
                "X-Mailer".to_string(),
                concat!("postbox/", env!("CARGO_PKG_VERSION")).to_string(),
            ),
        ];

        match self.content_type {
            ContentType::Html => {
                headers.push(("MIME-Version".to_string(), "1.0".to_string()));
                headers.push((
                    "Content-Type".to_string(),
                    "text/html; charset=UTF-8".to_string(),
                ));
            }
            ContentType::Plain => headers.push((
                "Content-Type".to_string(),
                "text/plain; charset=UTF-8".to_string(),
            )),
        }

        headers.extend(self.extra);

        let mut block = String::new();
        for (name, value) in &headers {
            if name.is_empty() || !name.bytes().all(|b| b.is_ascii_graphic() && b != b':') {
                return Err(HeaderError::InvalidName(name.clone()));
            }
            if value.contains(['\r', '\n']) {
                return Err(HeaderError::LineBreak(name.clone()));
            }
            if !block.is_empty() {
                block.push_str("\r\n");
            }
            let _ = write!(block, "{name}: {value}");
        }

        Ok(block)
    }
}
