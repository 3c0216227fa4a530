//! Static file lookup under the target directory.

use std::fs;
use std::fs::File;
use std::path::Path;
use std::path::PathBuf;

use nemu_core::SafeRoot;
use tracing::debug;
use url::Url;

/// Extensions served with the long-lived cache policy.
const FONT_EXTENSIONS: [&str; 5] = ["woff", "woff2", "ttf", "eot", "otf"];

const FONT_CACHE_CONTROL: &str = "public, max-age=36000, must-revalidate";
const DEFAULT_CACHE_CONTROL: &str = "public, max-age=3600, must-revalidate";

/// A file ready to be sent.
#[derive(Debug)]
pub struct StaticFile {
    /// Open handle, positioned at the start.
    pub file: File,
    /// Size in bytes, sent as `Content-Length`.
    pub len: u64,
    /// `Content-Type` header value.
    pub content_type: &'static str,
    /// `Cache-Control` header value.
    pub cache_control: &'static str,
}

/// Maps a request target (path plus optional query) to a file under `root`.
///
/// Directories are answered with their `index.html`. Returns `None` for
/// anything that does not resolve to a readable regular file, including
/// names that would leave the root.
pub fn lookup(root: &SafeRoot, target: &str) -> Option<StaticFile> {
    let relative = decode_request_path(target)?;
    let mut path = match root.resolve(&relative) {
        Ok(path) => path,
        Err(e) => {
            debug!(target, error = %e, "rejected static path");
            return None;
        }
    };

    let mut meta = fs::metadata(&path).ok()?;
    if meta.is_dir() {
        path.push("index.html");
        meta = fs::metadata(&path).ok()?;
    }
    if !meta.is_file() {
        return None;
    }

    let file = File::open(&path).ok()?;
    Some(StaticFile {
        file,
        len: meta.len(),
        content_type: content_type(&path),
        cache_control: cache_control(target),
    })
}

/// `Cache-Control` value for a request path.
pub fn cache_control(target: &str) -> &'static str {
    let path = target.split(['?', '#']).next().unwrap_or_default();
    let is_font = extension(Path::new(path))
        .is_some_and(|ext| FONT_EXTENSIONS.contains(&ext.as_str()));
    if is_font {
        FONT_CACHE_CONTROL
    } else {
        DEFAULT_CACHE_CONTROL
    }
}

/// `Content-Type` value guessed from the file extension.
pub fn content_type(path: &Path) -> &'static str {
    match extension(path).as_deref() {
        Some("html" | "htm") => "text/html; charset=utf-8",
        Some("css") => "text/css; charset=utf-8",
        Some("js" | "mjs") => "text/javascript; charset=utf-8",
        Some("json" | "map") => "application/json",
        Some("xml") => "application/xml",
        Some("txt") => "text/plain; charset=utf-8",
        Some("svg") => "image/svg+xml",
        Some("png") => "image/png",
        Some("jpg" | "jpeg") => "image/jpeg",
        Some("gif") => "image/gif",
        Some("webp") => "image/webp",
        Some("avif") => "image/avif",
        Some("ico") => "image/x-icon",
        Some("woff") => "font/woff",
        Some("woff2") => "font/woff2",
        Some("ttf") => "font/ttf",
        Some("otf") => "font/otf",
        Some("eot") => "application/vnd.ms-fontobject",
        Some("pdf") => "application/pdf",
        Some("wasm") => "application/wasm",
        Some("mp4") => "video/mp4",
        Some("webm") => "video/webm",
        _ => "application/octet-stream",
    }
}

fn extension(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_ascii_lowercase)
}

/// Normalizes the request target and percent-decodes its path segments.
fn decode_request_path(target: &str) -> Option<PathBuf> {
    let base = Url::parse("http://localhost/").ok()?;
    let url = base.join(target).ok()?;

    let mut path = PathBuf::new();
    for segment in url.path_segments()? {
        if segment.is_empty() {
            continue;
        }
        path.push(decode_segment(segment)?);
    }
    Some(path)
}

/// Decodes one path segment. Malformed escapes, invalid UTF-8 and decoded
/// separators or NUL bytes are refused.
fn decode_segment(segment: &str) -> Option<String> {
    if has_malformed_escape(segment) {
        return None;
    }
    let decoded = urlencoding::decode(segment).ok()?;
    if decoded.contains(['/', '\\', '\0']) {
        return None;
    }
    Some(decoded.into_owned())
}

fn has_malformed_escape(segment: &str) -> bool {
    segment.split('%').skip(1).any(|rest| {
        !rest
            .as_bytes()
            .get(..2)
            .is_some_and(|hex| hex.iter().all(u8::is_ascii_hexdigit))
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use std::io::Read;
    use tempfile::TempDir;

    fn site() -> (TempDir, SafeRoot) {
        let temp = TempDir::new().expect("failed to create temp dir");
        let dir = temp.path().join("public");
        fs::create_dir_all(dir.join("blog/first post")).unwrap();
        fs::write(dir.join("index.html"), "home").unwrap();
        fs::write(dir.join("blog/first post/index.html"), "post").unwrap();
        fs::write(dir.join("font.woff2"), "font").unwrap();
        fs::write(temp.path().join("secret.txt"), "secret").unwrap();
        let root = SafeRoot::new(&dir).unwrap();
        (temp, root)
    }

    fn read(file: StaticFile) -> String {
        let mut text = String::new();
        let mut handle = file.file;
        handle.read_to_string(&mut text).unwrap();
        text
    }

    #[test]
    fn test_directory_serves_index() {
        let (_temp, root) = site();
        let found = lookup(&root, "/").unwrap();
        assert_eq!(found.content_type, "text/html; charset=utf-8");
        assert_eq!(read(found), "home");

        let found = lookup(&root, "/blog/first%20post/?ref=feed").unwrap();
        assert_eq!(found.len, 4);
        assert_eq!(read(found), "post");
    }

    #[test]
    fn test_missing_and_escaping_paths() {
        let (_temp, root) = site();
        assert!(lookup(&root, "/nope.html").is_none());
        assert!(lookup(&root, "/blog").is_none());
        assert!(lookup(&root, "/../secret.txt").is_none());
        assert!(lookup(&root, "/%2e%2e/secret.txt").is_none());
        assert!(lookup(&root, "/blog/..%2f..%2fsecret.txt").is_none());
    }

    #[test]
    fn test_cache_control_by_extension() {
        assert_eq!(cache_control("/fonts/a.woff2"), FONT_CACHE_CONTROL);
        assert_eq!(cache_control("/fonts/a.TTF?v=3"), FONT_CACHE_CONTROL);
        assert_eq!(cache_control("/index.html"), DEFAULT_CACHE_CONTROL);
        assert_eq!(cache_control("/"), DEFAULT_CACHE_CONTROL);
    }

    #[test]
    fn test_content_types() {
        assert_eq!(content_type(Path::new("a.css")), "text/css; charset=utf-8");
        assert_eq!(content_type(Path::new("a.PNG")), "image/png");
        assert_eq!(content_type(Path::new("LICENSE")), "application/octet-stream");
    }

    #[test]
    fn test_decode_segment() {
        assert_eq!(decode_segment("a%20b").unwrap(), "a b");
        assert_eq!(decode_segment("%E4%BD%A0").unwrap(), "你");
        assert_eq!(decode_segment("plain.html").unwrap(), "plain.html");
        assert!(decode_segment("bad%2").is_none());
        assert!(decode_segment("bad%zz").is_none());
        assert!(decode_segment("a%+1b").is_none());
        assert!(decode_segment("%FF").is_none());
        assert!(decode_segment("a%2Fb").is_none());
        assert!(decode_segment("a%5Cb").is_none());
        assert!(decode_segment("a%00b").is_none());
    }
}
