//! Tracing setup with automatic credential redaction
//!
//! Rotation logs routinely touch Astra tokens, client secrets and bearer
//! headers. Everything written through [`init_tracing`] is passed through a
//! [`TokenRedactor`] before it reaches stderr, and the `redacted_*` macros
//! apply the same masking to ad-hoc messages.
//!
//! # Redacted Data Types
//!
//! - **Astra tokens**: `AstraCS:abc:123` → `AstraCS:[REDACTED]`
//! - **Bearer headers**: `Bearer xyz` → `Bearer [REDACTED]`
//! - **Secret JSON fields**: `astraKey`, `clientSecret`, `secret`, `token`
//! - **Custom Patterns**: configurable regex replacements
//!
//! # Example
//!
//! ```rust,no_run
//! use logger_redacted::{init_tracing, redacted_info, LoggerConfig};
//!
//! init_tracing(&LoggerConfig::default().with_json(true)).unwrap();
//!
//! let payload = r#"{"astraKey":"AstraCS:abc:123","clientID":"C1"}"#;
//! redacted_info!("wrote pending version {}", payload);
//! // Output: wrote pending version {"astraKey":"[REDACTED]","clientID":"C1"}
//! ```

pub mod config;
pub mod macros;
pub mod redactor;
pub mod subscriber;

pub use config::*;
pub use redactor::*;
pub use subscriber::*;

#[doc(hidden)]
pub use tracing as __tracing;

use lazy_static::lazy_static;

lazy_static! {
    static ref DEFAULT_REDACTOR: TokenRedactor = TokenRedactor::default();
}

/// Redact `text` with the default rules.
pub fn redact(text: &str) -> String {
    DEFAULT_REDACTOR.redact(text)
}
