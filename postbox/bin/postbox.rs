//! Sends one message through the configured SMTP server.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use postbox::{CONFIG_ENV, DEFAULT_CONFIG_PATHS, Postbox, find_config_file};
use postbox_common::{internal, logging, tracing};
use postbox_smtp::{ContentType, SmtpClient};
use tokio::io::AsyncReadExt;

/// Send transactional mail through an SMTP server
#[derive(Parser, Debug)]
#[command(name = "postbox")]
#[command(about = "Send transactional mail through an SMTP server", long_about = None)]
#[command(version)]
struct Cli {
    /// Path to the configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Send a single message
    Send {
        /// Recipient address
        #[arg(long)]
        to: String,

        /// Subject line
        #[arg(long)]
        subject: String,

        /// File holding the body; read from stdin when absent
        #[arg(long)]
        body_file: Option<PathBuf>,

        /// Send the body as text/plain instead of HTML
        #[arg(long)]
        plain: bool,
    },
    /// Validate the configuration and print it, password redacted
    CheckConfig,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    logging::init();

    let cli = Cli::parse();

    let defaults = DEFAULT_CONFIG_PATHS.map(PathBuf::from);
    let config_path = find_config_file(
        cli.config,
        std::env::var_os(CONFIG_ENV).map(PathBuf::from),
        &defaults,
    )?;
    let postbox = Postbox::load(&config_path)?;
    internal!("Loaded configuration from {}", config_path.display());

    match cli.command {
        Commands::Send {
            to,
            subject,
            body_file,
            plain,
        } => {
            let body = match body_file {
                Some(path) => tokio::fs::read_to_string(&path).await?,
                None => {
                    let mut body = String::new();
                    tokio::io::stdin().read_to_string(&mut body).await?;
                    body
                }
            };

            let content_type = if plain {
                ContentType::Plain
            } else {
                ContentType::Html
            };
            let envelope = postbox.envelope(to, subject, body, content_type)?;

            let result = SmtpClient::new(postbox.smtp).send(&envelope).await;
            if let Some(err) = result.error {
                anyhow::bail!("Message not delivered ({}): {err}", err.kind());
            }

            tracing::info!("Message delivered to {}", envelope.to);
        }
        Commands::CheckConfig => {
            println!("{}", postbox.redacted()?);
        }
    }

    Ok(())
}
