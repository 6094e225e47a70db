//! Configuration loading and message assembly for the `postbox` binary.

use std::path::{Path, PathBuf};

use anyhow::Context;
use postbox_smtp::{ContentType, Envelope, HeaderBlock, ServerConfig};
use serde::{Deserialize, Serialize};

/// Environment variable naming the configuration file.
pub const CONFIG_ENV: &str = "POSTBOX_CONFIG";

/// Searched in order when neither `--config` nor [`CONFIG_ENV`] is given.
pub const DEFAULT_CONFIG_PATHS: [&str; 2] =
    ["./postbox.config.ron", "/etc/postbox/postbox.config.ron"];

/// The whole configuration file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Postbox {
    pub smtp: ServerConfig,
}

impl Postbox {
    /// Parses a RON document.
    ///
    /// # Errors
    ///
    /// Returns an error if the document isn't a valid configuration.
    pub fn from_ron(content: &str) -> anyhow::Result<Self> {
        let postbox: Self = ron::from_str(content)?;

        anyhow::ensure!(!postbox.smtp.host.is_empty(), "smtp.host must not be empty");
        anyhow::ensure!(
            !postbox.smtp.from_email.is_empty(),
            "smtp.from_email must not be empty"
        );

        Ok(postbox)
    }

    /// Reads and parses the configuration at `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the file can't be read or parsed.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config from {}", path.display()))?;

        Self::from_ron(&content).with_context(|| format!("Invalid config in {}", path.display()))
    }

    /// The configuration as RON, with the password replaced.
    ///
    /// # Errors
    ///
    /// Returns an error if serialisation fails.
    pub fn redacted(&self) -> anyhow::Result<String> {
        let mut redacted = self.clone();
        if redacted.smtp.password.is_some() {
            redacted.smtp.password = Some("<redacted>".to_string());
        }

        Ok(ron::ser::to_string_pretty(
            &redacted,
            ron::ser::PrettyConfig::default(),
        )?)
    }

    /// Builds the envelope for one message, headers included.
    ///
    /// # Errors
    ///
    /// Returns an error if the configured sender makes an invalid header.
    pub fn envelope(
        &self,
        to: impl Into<String>,
        subject: impl Into<String>,
        body: impl Into<String>,
        content_type: ContentType,
    ) -> anyhow::Result<Envelope> {
        let mut headers = HeaderBlock::new(&self.smtp.from_email).content_type(content_type);
        if let Some(name) = &self.smtp.from_name {
            headers = headers.from_name(name);
        }

        Ok(Envelope::new(to, subject, body).with_headers(headers.build()?))
    }
}

/// Find the configuration file using the following precedence:
/// 1. `explicit`, from the command line
/// 2. `from_env`, the value of [`CONFIG_ENV`]
/// 3. the first of `defaults` that exists
///
/// # Errors
///
/// Returns an error if an explicitly named file doesn't exist, or nothing
/// was found.
pub fn find_config_file(
    explicit: Option<PathBuf>,
    from_env: Option<PathBuf>,
    defaults: &[PathBuf],
) -> anyhow::Result<PathBuf> {
    if let Some(path) = explicit {
        if path.exists() {
            return Ok(path);
        }
        anyhow::bail!("--config points to non-existent file: {}", path.display());
    }

    if let Some(path) = from_env {
        if path.exists() {
            return Ok(path);
        }
        anyhow::bail!(
            "{CONFIG_ENV} points to non-existent file: {}",
            path.display()
        );
    }

    if let Some(path) = defaults.iter().find(|path| path.exists()) {
        return Ok(path.clone());
    }

    let paths_tried = defaults
        .iter()
        .map(|p| format!("  - {}", p.display()))
        .collect::<Vec<_>>()
        .join("\n");

    anyhow::bail!(
        "No configuration file found. Tried:\n  - --config\n  - {CONFIG_ENV} environment variable\n{paths_tried}"
    )
}
