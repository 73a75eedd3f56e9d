use thiserror::Error;

/// Coarse classification used when deciding how loudly to report a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The daemon could not be reached at all.
    Dial,
    /// The daemon was reached but the call failed.
    Rpc,
    /// User-supplied input was rejected before anything was sent.
    Validation,
    /// A desktop handler (browser, file opener) could not be launched.
    Desktop,
    /// The latest-release lookup failed.
    Release,
}

#[derive(Error, Debug)]
pub enum Error {
    #[error("dial daemon at {addr}: {reason}")]
    Dial { addr: String, reason: String },

    #[error("daemon error: {message} (code: {code})")]
    Daemon { code: i32, message: String },

    #[error("daemon call {method} timed out")]
    Timeout { method: &'static str },

    #[error("connection to daemon closed")]
    Closed,

    #[error("invalid response to {method}: {reason}")]
    InvalidResponse { method: &'static str, reason: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid pre-shared key: {0}")]
    InvalidPreSharedKey(String),

    #[error("opening {url} failed: {reason}")]
    OpenUrl { url: String, reason: String },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("release check at {url} failed: {reason}")]
    Release { url: String, reason: String },
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Dial { .. } => ErrorKind::Dial,
            Error::Daemon { .. }
            | Error::Timeout { .. }
            | Error::Closed
            | Error::InvalidResponse { .. }
            | Error::Io(_)
            | Error::Json(_) => ErrorKind::Rpc,
            Error::InvalidPreSharedKey(_) => ErrorKind::Validation,
            Error::OpenUrl { .. } => ErrorKind::Desktop,
            Error::Http(_) | Error::Release { .. } => ErrorKind::Release,
        }
    }

    /// True when the underlying stream is unusable and the client should be
    /// dialed again. Daemon-side errors and slow calls leave the channel intact.
    pub fn is_channel_broken(&self) -> bool {
        matches!(self, Error::Closed | Error::Io(_))
    }
}

pub type Result<T> = std::result::Result<T, Error>;
