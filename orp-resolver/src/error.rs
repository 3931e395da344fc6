//! Error types for orp-resolver.
//!
//! Every failure is a value. Nothing here escapes the pipeline as a panic.

use thiserror::Error;

use orp_core::UriError;

/// Why the daemon could not resolve an address. Always triggers fallback.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DaemonFailure {
    /// Connection refused, timeout, DNS failure.
    #[error("daemon unreachable: {reason}")]
    Unreachable { reason: String },

    /// The daemon answered, but not with a usable resolution.
    #[error("daemon rejected request: {reason}")]
    Rejected { reason: String },
}

/// Terminal outcome of a failed pipeline run.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolveError {
    /// Malformed address; no network call was made.
    #[error("malformed address: {0}")]
    Parse(#[from] UriError),

    /// Daemon failed and no candidate port responded.
    #[error("could not resolve {uri}: {daemon}; no fallback port answered")]
    FallbackExhausted { uri: String, daemon: DaemonFailure },

    /// The resolution task itself failed (panic, dropped leader).
    #[error("resolution aborted: {0}")]
    Internal(String),
}

impl ResolveError {
    /// `true` when the pipeline ran to completion and found nothing, as
    /// opposed to aborting.
    pub fn is_unresolved(&self) -> bool {
        !matches!(self, ResolveError::Internal(_))
    }
}
