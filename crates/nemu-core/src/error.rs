//! Error types for the transfer pipeline.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias using `NemuError`.
pub type Result<T> = std::result::Result<T, NemuError>;

/// Errors produced by the encoder, the transport client and the decoder.
#[derive(Error, Debug)]
pub enum NemuError {
    /// I/O operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The source tree could not be traversed.
    #[error("cannot walk {path}: {source}")]
    Walk {
        /// Path that failed.
        path: PathBuf,
        /// Underlying failure.
        #[source]
        source: std::io::Error,
    },

    /// The upload carried no body at all.
    #[error("request body is empty")]
    EmptyBody,

    /// The body is not a readable compressed stream.
    #[error("failed to process gzip data: {0}")]
    Decompress(String),

    /// The archive container is truncated or has a corrupt header.
    #[error("invalid archive: {0}")]
    InvalidArchive(String),

    /// The archive decoded cleanly but materialized nothing.
    #[error("no valid entries processed in archive")]
    NoEntries,

    /// An entry name resolves outside the safe root.
    #[error("path traversal detected: '{}' resolves outside '{}'", path.display(), root.display())]
    PathTraversal {
        /// The offending entry name.
        path: PathBuf,
        /// The safe root it was resolved against.
        root: PathBuf,
    },

    /// A symlink target resolves outside the safe root.
    #[error("symlink target outside extraction directory: {} -> {}", path.display(), target.display())]
    SymlinkEscape {
        /// The symlink entry name.
        path: PathBuf,
        /// The declared target.
        target: PathBuf,
    },

    /// Token digest did not match.
    #[error("unauthorized")]
    Unauthorized,

    /// The transfer session was cancelled.
    #[error("transfer cancelled")]
    Cancelled,

    /// The transfer session deadline elapsed.
    #[error("transfer deadline exceeded")]
    DeadlineExceeded,

    /// The opposite side of the byte pipe is gone.
    #[error("pipe closed: {reason}")]
    PipeClosed {
        /// Why the pipe was closed, as reported by the closing side.
        reason: String,
    },

    /// The server URL could not be turned into a request.
    #[error("invalid server URL '{url}': {reason}")]
    InvalidUrl {
        /// URL as given.
        url: String,
        /// Parser message.
        reason: String,
    },

    /// The request could not be sent or the connection broke.
    #[error("HTTP request failed: {0}")]
    Http(String),

    /// The server answered with a non-2xx status.
    #[error("server returned non-OK status: {status}, body: {body}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Response body text.
        body: String,
    },

    /// The response body could not be read.
    #[error("failed to read response body: {0}")]
    ResponseBody(#[source] std::io::Error),

    /// A transfer failed and the encoder failed independently as well.
    #[error("{cause}, and encoder also failed: {encoder}")]
    Transfer {
        /// The failure that ended the transfer.
        cause: Box<NemuError>,
        /// The encoder's own failure.
        encoder: Box<NemuError>,
    },

    /// The server accepted the upload but the encoder failed while closing.
    #[error("upload accepted, but encoder failed: {0}")]
    EncoderAfterSuccess(Box<NemuError>),

    /// The encoder thread panicked.
    #[error("encoder panicked: {0}")]
    EncoderPanic(String),

    /// Configuration is missing or malformed.
    #[error("configuration error: {0}")]
    Config(String),
}

impl NemuError {
    /// Returns `true` for the "echo" errors one side observes after the
    /// other side terminated: cancellation, deadline expiry and a closed pipe.
    ///
    /// # Examples
    ///
    /// ```
    /// use nemu_core::NemuError;
    ///
    /// assert!(NemuError::Cancelled.is_expected_shutdown());
    /// assert!(!NemuError::NoEntries.is_expected_shutdown());
    /// ```
    #[must_use]
    pub const fn is_expected_shutdown(&self) -> bool {
        matches!(
            self,
            Self::Cancelled | Self::DeadlineExceeded | Self::PipeClosed { .. }
        )
    }

    /// Returns `true` if the error was raised by a safe-root check.
    #[must_use]
    pub const fn is_security_violation(&self) -> bool {
        matches!(
            self,
            Self::PathTraversal { .. } | Self::SymlinkEscape { .. } | Self::Unauthorized
        )
    }

    /// Returns `true` if the upload itself is at fault (4xx class).
    #[must_use]
    pub const fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::EmptyBody
                | Self::NoEntries
                | Self::PathTraversal { .. }
                | Self::SymlinkEscape { .. }
                | Self::Unauthorized
        )
    }

    /// HTTP status the receiving endpoint answers with for this error.
    ///
    /// # Examples
    ///
    /// ```
    /// use nemu_core::NemuError;
    ///
    /// assert_eq!(NemuError::Unauthorized.http_status(), 401);
    /// assert_eq!(NemuError::NoEntries.http_status(), 400);
    /// assert_eq!(NemuError::Decompress("bad magic".into()).http_status(), 500);
    /// ```
    #[must_use]
    pub const fn http_status(&self) -> u16 {
        match self {
            Self::Unauthorized => 401,
            Self::EmptyBody
            | Self::NoEntries
            | Self::PathTraversal { .. }
            | Self::SymlinkEscape { .. } => 400,
            _ => 500,
        }
    }

    /// Classifies an I/O error from the byte pipe.
    ///
    /// `BrokenPipe` means the consumer stopped reading; everything else is
    /// kept as a plain I/O error.
    pub(crate) fn from_pipe_io(err: std::io::Error) -> Self {
        if err.kind() == std::io::ErrorKind::BrokenPipe {
            Self::PipeClosed {
                reason: err.to_string(),
            }
        } else {
            Self::Io(err)
        }
    }
}
