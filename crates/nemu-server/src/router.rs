//! Request routing and the upload endpoint.

use std::io;
use std::io::Read;

use nemu_core::DecodeOptions;
use nemu_core::SafeRoot;
use nemu_core::decode_upload;
use nemu_core::token::TOKEN_HEADER;
use serde_json::json;
use tiny_http::Header;
use tiny_http::Method;
use tiny_http::Request;
use tiny_http::Response;
use tiny_http::ResponseBox;
use tiny_http::StatusCode;
use tracing::error;
use tracing::info;
use tracing::warn;

use crate::errpage::ErrorPages;
use crate::static_files;

/// Path of the upload endpoint.
pub const UPLOAD_PATH: &str = "/nemu/upload";

/// Path of the health check.
pub const HEALTH_PATH: &str = "/nemu/health";

/// Shared, read-only state of all workers.
pub struct AppState {
    /// Directory uploads are decoded into and static files served from.
    pub root: SafeRoot,
    /// Expected `Nemu-Token` value, the hex digest of the shared secret.
    pub token_digest: String,
    /// Decoder policy from the `[upload]` table.
    pub options: DecodeOptions,
    /// Rendered error pages.
    pub pages: ErrorPages,
}

/// Answers one request.
pub fn handle(mut request: Request, state: &AppState) {
    let method = request.method().clone();
    let url = request.url().to_string();
    let response = route(&mut request, state);
    let status = response.status_code().0;
    if let Err(e) = request.respond(response) {
        warn!(%method, %url, error = %e, "failed to send response");
        return;
    }
    info!(%method, %url, status, "request served");
}

fn route(request: &mut Request, state: &AppState) -> ResponseBox {
    let method = request.method().clone();
    let path = request.url().split('?').next().unwrap_or_default().to_string();
    match (&method, path.as_str()) {
        (Method::Post, UPLOAD_PATH) => upload(request, state),
        (_, UPLOAD_PATH) => state.pages.response(405).boxed(),
        (Method::Get | Method::Head, HEALTH_PATH) => {
            with_header(Response::from_string("ok"), "Content-Type", "text/plain; charset=utf-8")
                .boxed()
        }
        (Method::Get | Method::Head, _) => serve_static(request.url(), state),
        _ => state.pages.response(405).boxed(),
    }
}

fn upload(request: &mut Request, state: &AppState) -> ResponseBox {
    let token = request
        .headers()
        .iter()
        .find(|h| h.field.equiv(TOKEN_HEADER))
        .map(|h| h.value.as_str().to_string());

    let outcome = decode_upload(
        token.as_deref(),
        &state.token_digest,
        request.as_reader(),
        &state.root,
        &state.options,
    );

    match outcome {
        Ok(report) => {
            // Let the sender finish its body before the connection is reused.
            let _ = io::copy(request.as_reader(), &mut io::sink());
            for warning in &report.warnings {
                warn!(warning = %warning, "upload warning");
            }
            info!(
                files = report.files,
                directories = report.directories,
                symlinks = report.symlinks,
                bytes = report.bytes_written,
                duration = ?report.duration,
                "upload applied"
            );
            json_response(200, "success")
        }
        Err(e) => {
            let status = e.http_status();
            if e.is_security_violation() {
                warn!(error = %e, status, "unsafe upload rejected");
            } else if e.is_client_error() {
                warn!(error = %e, status, "upload rejected");
            } else {
                error!(error = %e, status, "upload failed");
            }
            json_response(status, &e.to_string())
        }
    }
}

fn serve_static(target: &str, state: &AppState) -> ResponseBox {
    match static_files::lookup(&state.root, target) {
        Some(found) => {
            let len = usize::try_from(found.len).ok();
            let response = Response::new(StatusCode(200), Vec::new(), found.file, len, None);
            let response = with_header(response, "Content-Type", found.content_type);
            with_header(response, "Cache-Control", found.cache_control).boxed()
        }
        None => state.pages.response(404).boxed(),
    }
}

fn json_response(status: u16, message: &str) -> ResponseBox {
    let body = json!({ "message": message }).to_string();
    with_header(
        Response::from_string(body).with_status_code(status),
        "Content-Type",
        "application/json",
    )
    .boxed()
}

/// Adds a header. Values that are not valid header text are dropped.
pub fn with_header<R: Read>(response: Response<R>, name: &str, value: &str) -> Response<R> {
    match Header::from_bytes(name.as_bytes(), value.as_bytes()) {
        Ok(header) => response.with_header(header),
        Err(()) => {
            warn!(name, value, "invalid response header");
            response
        }
    }
}
