//! Log setup and the wire-logging macros.
//!
//! SMTP traffic goes to `postbox::wire::outgoing` and
//! `postbox::wire::incoming`, under [`WIRE_TARGET`], so one filter can show
//! or hide the conversation without touching the rest of the crate's events.

use std::str::FromStr;

use tracing::metadata::LevelFilter;
use tracing_subscriber::{
    Layer, filter::FilterFn, prelude::__tracing_subscriber_SubscriberExt,
    util::{SubscriberInitExt, TryInitError},
};

/// Parent target of every `outgoing!` / `incoming!` event.
pub const WIRE_TARGET: &str = "postbox::wire";

/// Environment variable holding the log level.
pub const LEVEL_ENV: &str = "LOG_LEVEL";

#[doc(hidden)]
#[macro_export]
macro_rules! wire {
    ($level:ident, $direction:literal, $($msg:expr),*) => {
        $crate::tracing::event!(
            target: concat!("postbox::wire::", $direction),
            $crate::tracing::Level::$level,
            $($msg),*
        )
    };
}

/// Something we sent to the SMTP server.
#[macro_export]
macro_rules! outgoing {
    (level = $level:ident, $($msg:expr),*) => {
        $crate::wire!($level, "outgoing", $($msg),*)
    };

    ($($msg:expr),*) => {
        $crate::outgoing!(level = TRACE, $($msg),*)
    };
}

/// Something the SMTP server sent to us.
#[macro_export]
macro_rules! incoming {
    (level = $level:ident, $($msg:expr),*) => {
        $crate::wire!($level, "incoming", $($msg),*)
    };

    ($($msg:expr),*) => {
        $crate::incoming!(level = TRACE, $($msg),*)
    };
}

/// Client state changes, logged at the calling module's target.
#[macro_export]
macro_rules! internal {
    (level = $level:ident, $($msg:expr),*) => {
        $crate::tracing::event!($crate::tracing::Level::$level, $($msg),*)
    };

    ($($msg:expr),*) => {
        $crate::internal!(level = TRACE, $($msg),*)
    };
}

/// Resolves the log level from a `LOG_LEVEL` style value.
///
/// Falls back to `default` (and says so on stderr) when the value isn't a level.
pub fn level_from(value: Option<&str>, default: LevelFilter) -> LevelFilter {
    value.map_or(default, |level| {
        LevelFilter::from_str(level).unwrap_or_else(|_| {
            eprintln!("Invalid log level specified {level}, defaulting to {default}");
            default
        })
    })
}

/// Whether events from `target` are ours: the `postbox` binary, any
/// `postbox_*` crate, or the wire target.
pub fn is_postbox_target(target: &str) -> bool {
    target == "postbox"
        || target.starts_with("postbox::")
        || target.starts_with("postbox_")
}

/// Installs the global subscriber.
///
/// # Errors
///
/// Returns an error if a global subscriber is already set.
pub fn try_init() -> Result<(), TryInitError> {
    let default = if cfg!(debug_assertions) {
        LevelFilter::TRACE
    } else {
        LevelFilter::INFO
    };

    let level = level_from(std::env::var(LEVEL_ENV).ok().as_deref(), default);

    tracing_subscriber::Registry::default()
        .with(
            tracing_subscriber::fmt::layer()
                .with_file(false)
                .with_line_number(false)
                .compact()
                .with_ansi(true)
                .with_timer(tracing_subscriber::fmt::time::ChronoUtc::rfc_3339())
                .with_filter(level)
                .with_filter(FilterFn::new(|metadata| {
                    is_postbox_target(metadata.target())
                })),
        )
        .try_init()
}

/// Like [`try_init`], but a second call only warns.
pub fn init() {
    if let Err(err) = try_init() {
        eprintln!("Logging already initialised: {err}");
    }
}
