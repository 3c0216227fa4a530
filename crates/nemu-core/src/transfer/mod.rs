//! Transport client: streams the encoder's output as one upload request.

mod session;

use std::path::PathBuf;
use std::time::Instant;

use tracing::debug;
use tracing::info;
use url::Url;

use crate::CancelScope;
use crate::NemuError;
use crate::ProgressCallback;
use crate::Result;
use crate::TransferReport;
use crate::token::TOKEN_HEADER;
use crate::token::digest_token;
use session::Session;

/// Content type of the upload body.
pub const CONTENT_TYPE: &str = "application/octet-stream";

/// Where and what to upload.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Full upload URL, including the upload path.
    pub server_url: String,

    /// Shared secret. Only its digest is sent.
    pub token: String,

    /// Directory (or single file) to archive.
    pub source: PathBuf,

    /// `User-Agent` header value.
    pub user_agent: String,
}

impl ClientConfig {
    /// Creates a config with the default user agent.
    pub fn new(
        server_url: impl Into<String>,
        token: impl Into<String>,
        source: impl Into<PathBuf>,
    ) -> Self {
        Self {
            server_url: server_url.into(),
            token: token.into(),
            source: source.into(),
            user_agent: format!("nemu/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

/// Archives `config.source` and uploads it in a single streaming request.
///
/// The encoder runs on its own thread and writes into a bounded pipe whose
/// read side is the request body. The session scope is a child of `parent`:
/// cancelling `parent` or reaching its deadline stops both sides.
///
/// Succeeds only if the receiver answered 2xx, its body was read, and the
/// encoder finished without a failure of its own. On any failure the
/// encoder is stopped and awaited; its error is attached to the returned
/// [`NemuError::Transfer`] unless it was merely a consequence of the
/// request failing.
///
/// # Examples
///
/// ```no_run
/// use nemu_core::CancelScope;
/// use nemu_core::NoopProgress;
/// use nemu_core::transfer::ClientConfig;
/// use nemu_core::transfer::send_archive;
/// use std::time::Duration;
///
/// let config = ClientConfig::new("https://example.com/nemu/upload", "secret", "public");
/// let scope = CancelScope::with_timeout(Duration::from_secs(300));
/// let report = send_archive(&config, &scope, Box::new(NoopProgress))?;
/// println!("{} entries uploaded", report.encode.total_entries());
/// # Ok::<(), nemu_core::NemuError>(())
/// ```
pub fn send_archive(
    config: &ClientConfig,
    parent: &CancelScope,
    progress: Box<dyn ProgressCallback>,
) -> Result<TransferReport> {
    let start = Instant::now();
    let (session, body) = Session::start(config.source.clone(), parent, progress)?;

    let url = match Url::parse(&config.server_url) {
        Ok(url) => url,
        Err(e) => {
            return Err(session.fail(NemuError::InvalidUrl {
                url: config.server_url.clone(),
                reason: e.to_string(),
            }));
        }
    };

    let mut agent = ureq::AgentBuilder::new()
        .redirects(0)
        .user_agent(&config.user_agent);
    if let Some(remaining) = session.scope().remaining() {
        agent = agent.timeout(remaining);
    }
    let agent = agent.build();

    info!(url = %url, source = %config.source.display(), "uploading");
    let response = agent
        .request_url("POST", &url)
        .set("Content-Type", CONTENT_TYPE)
        .set(TOKEN_HEADER, &digest_token(&config.token))
        .send(body);

    let (status, text) = match read_response(response, session.scope()) {
        Ok(accepted) => accepted,
        Err(cause) => return Err(session.fail(cause)),
    };

    let encode = session.finish()?;
    debug!(status, response = %text, "upload accepted");
    Ok(TransferReport {
        encode,
        status,
        response: text,
        duration: start.elapsed(),
    })
}

/// Turns the request outcome into `(status, body)` for a 2xx answer or the
/// error that ended the exchange.
fn read_response(
    response: std::result::Result<ureq::Response, ureq::Error>,
    scope: &CancelScope,
) -> Result<(u16, String)> {
    let response = match response {
        Ok(response) => response,
        Err(ureq::Error::Status(status, response)) => {
            return Err(NemuError::Status {
                status,
                body: response.into_string().unwrap_or_default(),
            });
        }
        Err(ureq::Error::Transport(transport)) => {
            // A body read that failed because the scope ended surfaces here
            // as a transport error; report the scope instead.
            scope.check()?;
            return Err(NemuError::Http(transport.to_string()));
        }
    };

    let status = response.status();
    if !(200..300).contains(&status) {
        return Err(NemuError::Status {
            status,
            body: response.into_string().unwrap_or_default(),
        });
    }
    let text = response.into_string().map_err(NemuError::ResponseBody)?;
    Ok((status, text))
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::NoopProgress;
    use tempfile::TempDir;

    #[test]
    fn test_client_config_defaults() {
        let config = ClientConfig::new("http://localhost/nemu/upload", "pw", "public");
        assert!(config.user_agent.starts_with("nemu/"));
        assert_eq!(config.source, PathBuf::from("public"));
    }

    #[test]
    fn test_invalid_url_stops_encoder() {
        let temp = TempDir::new().expect("failed to create temp dir");
        std::fs::write(temp.path().join("a.txt"), "a").unwrap();

        let config = ClientConfig::new("not a url", "pw", temp.path());
        let err = send_archive(&config, &CancelScope::new(), Box::new(NoopProgress)).unwrap_err();
        assert!(matches!(err, NemuError::InvalidUrl { .. }), "got {err}");
    }

    #[test]
    fn test_connection_refused_with_missing_source() {
        let temp = TempDir::new().expect("failed to create temp dir");
        // Bind then drop to get a port nothing listens on.
        let port = std::net::TcpListener::bind("127.0.0.1:0")
            .unwrap()
            .local_addr()
            .unwrap()
            .port();

        let config = ClientConfig::new(
            format!("http://127.0.0.1:{port}/nemu/upload"),
            "pw",
            temp.path().join("missing"),
        );
        let err = send_archive(&config, &CancelScope::new(), Box::new(NoopProgress)).unwrap_err();
        match err {
            NemuError::Transfer { encoder, .. } => {
                assert!(matches!(*encoder, NemuError::Walk { .. }));
            }
            NemuError::Http(_) => {}
            other => panic!("unexpected {other}"),
        }
    }
}
