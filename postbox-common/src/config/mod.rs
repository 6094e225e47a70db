//! Configuration shared by the postbox crates.
//!
//! - [`timeouts`]: deadlines for every blocking step of an SMTP send

pub mod timeouts;

pub use timeouts::ClientTimeouts;
