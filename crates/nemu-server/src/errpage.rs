//! HTML error pages, rendered once per status code and cached.

use std::collections::HashMap;
use std::io::Cursor;
use std::sync::Arc;

use anyhow::Result;
use anyhow::bail;
use parking_lot::RwLock;
use tiny_http::Response;
use tiny_http::StatusCode;
use tracing::error;

use crate::router::with_header;

const TEMPLATE: &str = include_str!("../assets/page.html");

const RENDER_FAILED: &str = "An internal error occurred while trying to render the error page.";

/// Read-through cache of rendered error pages.
pub struct ErrorPages {
    template: String,
    cache: RwLock<HashMap<u16, Arc<str>>>,
}

impl ErrorPages {
    /// Uses the page template embedded in the binary.
    pub fn new() -> Self {
        Self::with_template(TEMPLATE)
    }

    /// Uses a custom template with `{{status_code}}`, `{{status_desc}}` and
    /// `{{description}}` placeholders.
    pub fn with_template(template: impl Into<String>) -> Self {
        Self {
            template: template.into(),
            cache: RwLock::new(HashMap::new()),
        }
    }

    /// Returns the page for `status`, rendering it on first use.
    pub fn page(&self, status: u16) -> Result<Arc<str>> {
        if let Some(page) = self.cache.read().get(&status) {
            return Ok(Arc::clone(page));
        }

        let page: Arc<str> = self.render(status)?.into();
        self.cache.write().insert(status, Arc::clone(&page));
        Ok(page)
    }

    /// Builds the error response for `status`. A render failure yields a
    /// plain-text 500 instead.
    pub fn response(&self, status: u16) -> Response<Cursor<Vec<u8>>> {
        match self.page(status) {
            Ok(page) => with_header(
                Response::from_string(page.as_ref()).with_status_code(status),
                "Content-Type",
                "text/html; charset=utf-8",
            ),
            Err(e) => {
                error!(status, error = %e, "failed to render error page");
                with_header(
                    Response::from_string(RENDER_FAILED).with_status_code(500),
                    "Content-Type",
                    "text/plain; charset=utf-8",
                )
            }
        }
    }

    fn render(&self, status: u16) -> Result<String> {
        if !self.template.contains("{{status_code}}") {
            bail!("error page template has no {{{{status_code}}}} placeholder");
        }
        Ok(self
            .template
            .replace("{{status_code}}", &status.to_string())
            .replace("{{status_desc}}", StatusCode(status).default_reason_phrase())
            .replace("{{description}}", description(status)))
    }

    #[cfg(test)]
    fn cached(&self) -> usize {
        self.cache.read().len()
    }
}

impl Default for ErrorPages {
    fn default() -> Self {
        Self::new()
    }
}

fn description(status: u16) -> &'static str {
    match status {
        400 => "The request could not be understood by the server.",
        401 => "Valid credentials are required to access this resource.",
        403 => "You do not have permission to access this resource.",
        404 => "The page you are looking for does not exist.",
        405 => "This method is not allowed for the requested resource.",
        413 => "The request is larger than the server is willing to process.",
        500 => "The server encountered an unexpected condition.",
        503 => "The server is temporarily unable to handle the request.",
        _ => "Something went wrong while handling your request.",
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::io::Read;

    fn body(response: Response<Cursor<Vec<u8>>>) -> String {
        let mut text = String::new();
        response.into_reader().read_to_string(&mut text).unwrap();
        text
    }

    #[test]
    fn test_page_contains_status() {
        let pages = ErrorPages::new();
        let page = pages.page(404).unwrap();
        assert!(page.contains("404"));
        assert!(page.contains("Not Found"));
        assert!(page.contains("does not exist"));
        assert!(!page.contains("{{"));
    }

    #[test]
    fn test_pages_are_cached() {
        let pages = ErrorPages::new();
        let first = pages.page(405).unwrap();
        let second = pages.page(405).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        pages.page(404).unwrap();
        assert_eq!(pages.cached(), 2);
    }

    #[test]
    fn test_response_status_and_type() {
        let response = ErrorPages::new().response(401);
        assert_eq!(response.status_code(), StatusCode(401));
        assert!(
            response
                .headers()
                .iter()
                .any(|h| h.field.equiv("Content-Type") && h.value.as_str().starts_with("text/html"))
        );
        assert!(body(response).contains("Unauthorized"));
    }

    #[test]
    fn test_render_failure_falls_back_to_plain_text() {
        let pages = ErrorPages::with_template("<p>broken</p>");
        let response = pages.response(404);
        assert_eq!(response.status_code(), StatusCode(500));
        assert_eq!(body(response), RENDER_FAILED);
        assert_eq!(pages.cached(), 0);
    }
}
