//! Error taxonomy shared by every crate in the workspace.
//!
//! One enum, one `Result` alias. Leaf crates convert their underlying
//! errors (`reqwest`, `rusqlite`, `serde_json`) into `Error` via `#[from]`
//! rather than inventing their own error types.

use std::fmt;

use thiserror::Error;

/// The crate-wide result alias.
pub type Result<T> = std::result::Result<T, Error>;

/// The closed set of error kinds the crawler can surface.
#[derive(Debug, Error)]
pub enum Error {
    /// Unrecoverable login failure: bad credentials, or the login retry
    /// loop exhausted its attempts.
    #[error("authentication failed: {0}")]
    Auth(String),

    /// Timeouts, throttling (429), or 5xx responses that exhausted their
    /// retry budget. The caller skips the associated operation.
    #[error("transient transport failure: {0}")]
    TransportTransient(String),

    /// 404/405/410, or a response body that failed to decode. The
    /// associated record is treated as absent.
    #[error("permanent transport failure: {0}")]
    TransportPermanent(String),

    /// The control plane asked the running operation to stop.
    #[error("stop requested: {0}")]
    StopRequested(String),

    /// The embedded store failed in a way that cannot be recovered from
    /// in-process (disk full, corrupt file, schema invariant violated).
    #[error("storage error: {0}")]
    Storage(String),

    /// A decoded response violated an invariant the decoder relies on
    /// (missing required field, unknown enum tag). The associated record
    /// is skipped and a warning logged by the caller.
    #[error("decode invariant violated: {0}")]
    DecodeInvariant(String),
}

impl Error {
    pub fn auth(msg: impl fmt::Display) -> Self {
        Self::Auth(msg.to_string())
    }

    pub fn transport_transient(msg: impl fmt::Display) -> Self {
        Self::TransportTransient(msg.to_string())
    }

    pub fn transport_permanent(msg: impl fmt::Display) -> Self {
        Self::TransportPermanent(msg.to_string())
    }

    pub fn stop_requested(reason: impl fmt::Display) -> Self {
        Self::StopRequested(reason.to_string())
    }

    pub fn storage(msg: impl fmt::Display) -> Self {
        Self::Storage(msg.to_string())
    }

    pub fn decode_invariant(msg: impl fmt::Display) -> Self {
        Self::DecodeInvariant(msg.to_string())
    }

    /// True for errors the orchestrator should treat as a clean,
    /// zero-exit-code stop rather than a failure.
    pub fn is_stop_requested(&self) -> bool {
        matches!(self, Self::StopRequested(_))
    }
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() || err.is_connect() {
            Self::TransportTransient(err.to_string())
        } else {
            Self::TransportPermanent(err.to_string())
        }
    }
}

impl From<rusqlite::Error> for Error {
    fn from(err: rusqlite::Error) -> Self {
        Self::Storage(err.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::DecodeInvariant(err.to_string())
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Self::Storage(err.to_string())
    }
}
