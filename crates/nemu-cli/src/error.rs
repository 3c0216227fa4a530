//! Error conversion utilities for CLI.
//!
//! Converts nemu-core's typed errors (thiserror) into user-friendly
//! contextual errors (anyhow) with actionable guidance.

use anyhow::anyhow;
use nemu_core::NemuError;

/// Converts `NemuError` to a user-friendly anyhow error with context.
pub fn convert_push_error(err: NemuError, url: &str) -> anyhow::Error {
    match err {
        NemuError::Status { status: 401, .. } => {
            anyhow!(
                "Server at '{url}' rejected the token\n\
                 HINT: Run `nemu hash --password <secret>` and set the digest as the server's token."
            )
        }
        NemuError::Status {
            status: 400,
            body,
        } => {
            anyhow!(
                "Server at '{url}' rejected the upload: {body}\n\
                 HINT: The source may be empty or contain names the server refuses."
            )
        }
        NemuError::Status { status, body } => {
            anyhow!("Server at '{url}' returned status {status}: {body}")
        }
        NemuError::DeadlineExceeded => {
            anyhow!(
                "Upload to '{url}' did not finish in time\n\
                 HINT: Use --timeout to allow more time for large sites."
            )
        }
        NemuError::InvalidUrl { url, reason } => {
            anyhow!(
                "Invalid server URL '{url}': {reason}\n\
                 HINT: Pass a host like example.com or https://example.com."
            )
        }
        NemuError::Http(reason) => {
            anyhow!(
                "Could not complete the request to '{url}': {reason}\n\
                 HINT: Check --host. Use --debug to keep a plain http:// host as given."
            )
        }
        NemuError::Walk { path, source } => {
            anyhow!("Cannot read '{}' while archiving: {source}", path.display())
        }
        NemuError::Transfer { cause, encoder } => {
            convert_push_error(*cause, url).context(format!("encoder also failed: {encoder}"))
        }
        _ => anyhow::Error::from(err).context(format!("Upload to '{url}' failed")),
    }
}

/// Adds push context to a core result.
pub fn add_push_context<T>(result: Result<T, NemuError>, url: &str) -> anyhow::Result<T> {
    result.map_err(|e| convert_push_error(e, url))
}
