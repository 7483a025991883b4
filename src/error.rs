//! Error types for scan requests.

use thiserror::Error;

/// Result type alias for scan operations.
pub type Result<T> = std::result::Result<T, ScanError>;

/// Conditions that halt a scan before any probing happens.
///
/// Everything else (bad port tokens, refused connects, a missing external
/// tool, cancellation, log write failures) degrades into the result instead.
#[derive(Error, Debug)]
pub enum ScanError {
    /// No target was supplied.
    #[error("no target specified")]
    EmptyTarget,

    /// Target contains whitespace or control characters.
    #[error("invalid target {0:?}: whitespace and control characters are not allowed")]
    InvalidTarget(String),

    /// Invalid scan options.
    #[error("configuration error: {0}")]
    Config(String),

    /// The target did not resolve to any address.
    #[error("failed to resolve target {target}: {source}")]
    Resolution {
        target: String,
        #[source]
        source: std::io::Error,
    },
}
