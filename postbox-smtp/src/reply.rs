//! SMTP reply parsing and representation.

use std::fmt;

/// One line of an SMTP reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplyLine {
    /// The status code, or `None` when the line didn't start with three digits.
    pub code: Option<u16>,
    /// Whether this line ends the reply (`250 ` rather than `250-`).
    pub is_last: bool,
    /// The text following the code and separator.
    pub text: String,
}

/// A complete SMTP reply.
///
/// Multi-line replies collapse into their final line: continuation lines are
/// consumed from the stream but only the last code and text are kept.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    code: Option<u16>,
    text: String,
}

impl Reply {
    #[must_use]
    pub fn new(code: Option<u16>, text: impl Into<String>) -> Self {
        Self {
            code,
            text: text.into(),
        }
    }

    /// The three digit status code, `None` if the server sent something else.
    #[must_use]
    pub const fn code(&self) -> Option<u16> {
        self.code
    }

    #[must_use]
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Returns `true` if the reply carries exactly `code`.
    #[must_use]
    pub fn is(&self, code: u16) -> bool {
        self.code == Some(code)
    }

    /// Returns `true` if the reply could not be parsed.
    #[must_use]
    pub const fn is_unparsed(&self) -> bool {
        self.code.is_none()
    }

    /// Returns `true` for a positive completion (2xx).
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.code.is_some_and(|code| (200..300).contains(&code))
    }

    /// Returns `true` for a 250-class reply (250-259), which is how the end of
    /// DATA reports an accepted message.
    #[must_use]
    pub fn is_accepted(&self) -> bool {
        self.code.is_some_and(|code| (250..260).contains(&code))
    }

    /// Parses a single reply line, without its line terminator.
    ///
    /// Never fails: a line that doesn't start with three ASCII digits is
    /// reported with no code and treated as the last line of its reply.
    #[must_use]
    pub fn parse_line(line: &str) -> ReplyLine {
        let bytes = line.as_bytes();

        if bytes.len() < 3 || !bytes[..3].iter().all(u8::is_ascii_digit) {
            return ReplyLine {
                code: None,
                is_last: true,
                text: line.to_string(),
            };
        }

        let code = line[..3].parse::<u16>().ok();

        let (is_last, text) = match bytes.get(3) {
            None => (true, ""),
            Some(b'-') => (false, &line[4..]),
            Some(b' ') => (true, &line[4..]),
            Some(_) => (true, &line[3..]),
        };

        ReplyLine {
            code,
            is_last,
            text: text.to_string(),
        }
    }

    /// Parses one complete, possibly multi-line, reply from the start of `buffer`.
    ///
    /// Returns the reply and the number of bytes it occupied, or `None` if the
    /// buffer doesn't yet hold a final line. Lines may end in CRLF or a bare LF;
    /// blank lines are skipped.
    #[must_use]
    pub fn parse(buffer: &[u8]) -> Option<(Self, usize)> {
        let mut consumed = 0;

        while let Some(end) = buffer[consumed..].iter().position(|&b| b == b'\n') {
            let raw = &buffer[consumed..consumed + end];
            consumed += end + 1;

            let raw = raw.strip_suffix(b"\r").unwrap_or(raw);
            if raw.is_empty() {
                continue;
            }

            let line = Self::parse_line(&String::from_utf8_lossy(raw));
            if line.is_last {
                return Some((Self::new(line.code, line.text), consumed));
            }
        }

        None
    }
}

impl fmt::Display for Reply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.code {
            Some(code) => write!(f, "{code} {}", self.text),
            None => f.write_str(&self.text),
        }
    }
}
