//! Shared error-code contract.
//!
//! Every library error exposes a stable, grepable code so callers (the CLI,
//! an editor integration, a server wrapping this crate) can report failures
//! without matching on display strings.

/// Grepable error code plus retry hint, implemented by every library error.
pub trait ErrorCode: std::fmt::Display {
    fn error_code(&self) -> &'static str;

    fn retryable(&self) -> bool {
        false
    }
}
