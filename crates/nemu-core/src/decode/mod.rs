//! Archive decoder: authenticated upload body to files under the safe root.
//!
//! Per request the decoder authenticates, opens the gzip stream, then reads
//! tar entries strictly in order, resolving each name through the safe root
//! before anything is written for it. The first hard failure ends the
//! request; entries already written stay on disk.

mod materialize;

use std::borrow::Cow;
use std::io;
use std::io::BufRead;
use std::io::BufReader;
use std::io::Read;
use std::time::Instant;

use flate2::read::GzDecoder;
use serde::Deserialize;
use serde::Serialize;
use tracing::debug;
use tracing::warn;

use crate::DecodeReport;
use crate::EntryKind;
use crate::NemuError;
use crate::Result;
use crate::SafeRoot;
use crate::security::check_symlink_target;
use crate::token::token_matches;
use materialize::DEFAULT_FILE_MODE;
use materialize::EntryMeta;

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// Receiver-side policy switches.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DecodeOptions {
    /// Remove and recreate the safe root before writing entries, so the
    /// target ends up holding exactly the uploaded tree. Irreversible.
    pub wipe_target: bool,

    /// Reject symlinks whose target resolves outside the safe root.
    /// Off by default: link targets are written verbatim.
    pub confine_symlinks: bool,
}

/// Decodes one upload into `root`.
///
/// `token` is the presented `Nemu-Token` header value and `expected_digest`
/// the configured hex digest. On a mismatch the body is not touched.
///
/// # Errors
///
/// - `Unauthorized` on a token mismatch
/// - `EmptyBody` if the body has no bytes at all
/// - `Decompress` if the body is not a gzip stream
/// - `InvalidArchive` on a truncated archive or a corrupt header
/// - `PathTraversal` / `SymlinkEscape` if an entry leaves the root
/// - `NoEntries` if the archive held nothing that could be written
/// - `Io` on filesystem failures
///
/// # Examples
///
/// ```no_run
/// use nemu_core::DecodeOptions;
/// use nemu_core::SafeRoot;
/// use nemu_core::decode::decode_upload;
/// use nemu_core::token::digest_token;
/// use std::fs::File;
///
/// let expected = digest_token("secret");
/// let root = SafeRoot::new("public")?;
/// let body = File::open("site.tar.gz")?;
///
/// let report = decode_upload(Some(&expected), &expected, body, &root, &DecodeOptions::default())?;
/// println!("{} entries written", report.total_entries());
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
pub fn decode_upload<R: Read>(
    token: Option<&str>,
    expected_digest: &str,
    body: R,
    root: &SafeRoot,
    options: &DecodeOptions,
) -> Result<DecodeReport> {
    if !token_matches(token, expected_digest) {
        warn!("rejected upload with invalid token");
        return Err(NemuError::Unauthorized);
    }

    let start = Instant::now();
    let mut body = BufReader::new(body);
    check_gzip_magic(&mut body)?;

    if options.wipe_target {
        debug!(root = %root.as_path().display(), "resetting target directory");
        materialize::reset_directory(root.as_path())?;
    } else {
        root.ensure_exists()?;
    }

    let mut archive = tar::Archive::new(GzDecoder::new(body));
    let mut report = DecodeReport::new();
    for entry in archive.entries().map_err(classify_read_error)? {
        let mut entry = entry.map_err(classify_read_error)?;
        decode_entry(&mut entry, root, options, &mut report)?;
    }

    // Consume the padding after the end-of-archive marker and the gzip
    // trailer so the sender's stream ends cleanly.
    let mut rest = archive.into_inner();
    io::copy(&mut rest, &mut io::sink()).map_err(classify_read_error)?;

    report.duration = start.elapsed();
    if report.total_entries() == 0 {
        return Err(NemuError::NoEntries);
    }
    debug!(
        files = report.files,
        directories = report.directories,
        bytes = report.bytes_written,
        "upload decoded"
    );
    Ok(report)
}

/// Peeks at the first bytes without consuming them.
fn check_gzip_magic<R: Read>(body: &mut BufReader<R>) -> Result<()> {
    let head = body.fill_buf()?;
    if head.is_empty() {
        return Err(NemuError::EmptyBody);
    }
    let matches = head
        .iter()
        .zip(GZIP_MAGIC.iter())
        .all(|(got, want)| got == want);
    if !matches {
        return Err(NemuError::Decompress("invalid gzip header".into()));
    }
    Ok(())
}

/// Sorts read failures into corrupt-compression, corrupt-archive and plain
/// I/O errors.
fn classify_read_error(err: io::Error) -> NemuError {
    match err.kind() {
        io::ErrorKind::InvalidInput | io::ErrorKind::InvalidData => {
            NemuError::Decompress(err.to_string())
        }
        io::ErrorKind::UnexpectedEof | io::ErrorKind::Other => {
            NemuError::InvalidArchive(err.to_string())
        }
        _ => NemuError::Io(err),
    }
}

fn decode_entry<R: Read>(
    entry: &mut tar::Entry<'_, R>,
    root: &SafeRoot,
    options: &DecodeOptions,
    report: &mut DecodeReport,
) -> Result<()> {
    let name = entry.path().map_err(classify_read_error)?.into_owned();
    let link_name = entry
        .link_name()
        .map_err(classify_read_error)?
        .map(Cow::into_owned);
    let header = entry.header();
    let kind = EntryKind::from_header(&header.entry_type(), link_name);
    let meta = EntryMeta {
        mode: header.mode().unwrap_or(DEFAULT_FILE_MODE) & 0o7777,
        mtime: header.mtime().unwrap_or(0),
    };
    let size = entry.size();

    let target = root.resolve(&name)?;
    root.check_parents(&name, &target)?;
    debug!(name = %name.display(), kind = kind.label(), "decoding entry");

    match &kind {
        EntryKind::File => materialize::write_file(&target, &mut *entry, size, meta, report),
        EntryKind::Directory => materialize::create_directory(&target, meta, report),
        EntryKind::Symlink { target: link } => {
            if options.confine_symlinks {
                check_symlink_target(root.as_path(), &target, link).map_err(|_| {
                    NemuError::SymlinkEscape {
                        path: name.clone(),
                        target: link.clone(),
                    }
                })?;
            }
            materialize::create_symlink(&target, link, report)
        }
        EntryKind::Hardlink { target: source } => {
            let resolved = root.resolve(source)?;
            root.check_existing(source, &resolved)?;
            materialize::create_hardlink(&target, &resolved, report)
        }
        EntryKind::Unsupported { flag } => {
            warn!(name = %name.display(), flag = *flag, "skipping unsupported entry type");
            report.add_warning(format!(
                "unsupported entry type {:?} for {}",
                char::from(*flag),
                name.display()
            ));
            Ok(())
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::test_utils::TarTestBuilder;
    use crate::token::digest_token;
    use std::fs;
    use tempfile::TempDir;

    fn setup() -> (TempDir, SafeRoot, String) {
        let temp = TempDir::new().expect("failed to create temp dir");
        let root = SafeRoot::new(temp.path().join("public")).unwrap();
        (temp, root, digest_token("secret"))
    }

    fn decode(bytes: &[u8], root: &SafeRoot, digest: &str) -> Result<DecodeReport> {
        decode_upload(Some(digest), digest, bytes, root, &DecodeOptions::default())
    }

    #[test]
    fn test_decode_files_and_dirs() {
        let (_temp, root, digest) = setup();
        let bytes = TarTestBuilder::new()
            .add_directory("css/")
            .add_file("css/site.css", b"body{}")
            .add_file("index.html", b"<h1>hi</h1>")
            .build_gz();

        let report = decode(&bytes, &root, &digest).unwrap();
        assert_eq!(report.files, 2);
        assert_eq!(report.directories, 1);
        assert_eq!(
            fs::read_to_string(root.as_path().join("css/site.css")).unwrap(),
            "body{}"
        );
    }

    #[test]
    fn test_wrong_token_rejected() {
        let (_temp, root, digest) = setup();
        let bytes = TarTestBuilder::new().add_file("a", b"a").build_gz();
        let err = decode_upload(
            Some(&digest_token("wrong")),
            &digest,
            bytes.as_slice(),
            &root,
            &DecodeOptions::default(),
        )
        .unwrap_err();
        assert!(matches!(err, NemuError::Unauthorized));
        assert!(!root.as_path().exists());
    }

    #[test]
    fn test_empty_body() {
        let (_temp, root, digest) = setup();
        assert!(matches!(
            decode(&[], &root, &digest),
            Err(NemuError::EmptyBody)
        ));
    }

    #[test]
    fn test_not_gzip() {
        let (_temp, root, digest) = setup();
        let err = decode(b"plain text body", &root, &digest).unwrap_err();
        assert!(matches!(err, NemuError::Decompress(_)));
        assert_eq!(err.http_status(), 500);
    }

    #[test]
    fn test_empty_archive_is_no_entries() {
        let (_temp, root, digest) = setup();
        let bytes = TarTestBuilder::new().build_gz();
        let err = decode(&bytes, &root, &digest).unwrap_err();
        assert!(matches!(err, NemuError::NoEntries));
        assert_eq!(err.http_status(), 400);
    }

    #[test]
    fn test_truncated_archive() {
        let (_temp, root, digest) = setup();
        let bytes = TarTestBuilder::new()
            .add_file("big.bin", &[7u8; 100_000])
            .build_gz();
        let err = decode(&bytes[..bytes.len() / 2], &root, &digest).unwrap_err();
        assert_eq!(err.http_status(), 500, "got {err}");
    }

    #[test]
    fn test_traversal_aborts_before_write() {
        let (temp, root, digest) = setup();
        let bytes = TarTestBuilder::new()
            .add_file("ok.txt", b"ok")
            .add_raw_file("../escaped.txt", b"evil")
            .build_gz();

        let err = decode(&bytes, &root, &digest).unwrap_err();
        assert!(matches!(err, NemuError::PathTraversal { .. }));
        assert!(!temp.path().join("escaped.txt").exists());
        assert!(root.as_path().join("ok.txt").exists());
    }

    #[cfg(unix)]
    #[test]
    fn test_symlink_written_verbatim_by_default() {
        let (_temp, root, digest) = setup();
        let bytes = TarTestBuilder::new()
            .add_symlink("etc", "/etc")
            .build_gz();

        let report = decode(&bytes, &root, &digest).unwrap();
        assert_eq!(report.symlinks, 1);
        assert_eq!(
            fs::read_link(root.as_path().join("etc")).unwrap(),
            std::path::Path::new("/etc")
        );
    }

    #[cfg(unix)]
    #[test]
    fn test_confined_symlink_rejected() {
        let (_temp, root, digest) = setup();
        let bytes = TarTestBuilder::new()
            .add_symlink("etc", "../../etc")
            .build_gz();
        let options = DecodeOptions {
            confine_symlinks: true,
            ..DecodeOptions::default()
        };

        let err =
            decode_upload(Some(&digest), &digest, bytes.as_slice(), &root, &options).unwrap_err();
        assert!(matches!(err, NemuError::SymlinkEscape { .. }));
        assert!(fs::symlink_metadata(root.as_path().join("etc")).is_err());
    }

    #[test]
    fn test_hardlink_source_inside_root() {
        let (_temp, root, digest) = setup();
        let bytes = TarTestBuilder::new()
            .add_file("a.txt", b"shared")
            .add_hardlink("b.txt", "a.txt")
            .build_gz();

        let report = decode(&bytes, &root, &digest).unwrap();
        assert_eq!(report.hardlinks, 1);
        assert_eq!(
            fs::read_to_string(root.as_path().join("b.txt")).unwrap(),
            "shared"
        );
    }

    #[test]
    fn test_hardlink_source_outside_root_rejected() {
        let (_temp, root, digest) = setup();
        let bytes = TarTestBuilder::new()
            .add_hardlink("passwd", "../../../etc/passwd")
            .build_gz();
        let err = decode(&bytes, &root, &digest).unwrap_err();
        assert!(matches!(err, NemuError::PathTraversal { .. }));
    }

    #[cfg(unix)]
    #[test]
    fn test_symlink_entry_cannot_redirect_later_writes() {
        let (temp, root, digest) = setup();
        let outside = temp.path().join("outside");
        fs::create_dir(&outside).unwrap();
        let bytes = TarTestBuilder::new()
            .add_symlink("evil", outside.to_str().unwrap())
            .add_file("evil/pwned.txt", b"pwned")
            .build_gz();

        let err = decode(&bytes, &root, &digest).unwrap_err();
        assert!(matches!(err, NemuError::PathTraversal { .. }), "got {err}");
        assert_eq!(err.http_status(), 400);
        assert!(!outside.join("pwned.txt").exists());
    }

    #[cfg(unix)]
    #[test]
    fn test_hardlink_through_symlink_cannot_alias_outside_file() {
        let (temp, root, digest) = setup();
        let outside = temp.path().join("outside");
        fs::create_dir(&outside).unwrap();
        fs::write(outside.join("secret"), "original").unwrap();
        let bytes = TarTestBuilder::new()
            .add_symlink("d", outside.to_str().unwrap())
            .add_hardlink("alias", "d/secret")
            .add_file("alias", b"clobbered")
            .build_gz();

        let err = decode(&bytes, &root, &digest).unwrap_err();
        assert!(matches!(err, NemuError::PathTraversal { .. }), "got {err}");
        assert_eq!(
            fs::read_to_string(outside.join("secret")).unwrap(),
            "original"
        );
    }

    #[test]
    fn test_file_over_hardlink_leaves_source_intact() {
        let (_temp, root, digest) = setup();
        let bytes = TarTestBuilder::new()
            .add_file("a.txt", b"shared")
            .add_hardlink("b.txt", "a.txt")
            .add_file("b.txt", b"replaced")
            .build_gz();

        decode(&bytes, &root, &digest).unwrap();
        assert_eq!(
            fs::read_to_string(root.as_path().join("a.txt")).unwrap(),
            "shared"
        );
        assert_eq!(
            fs::read_to_string(root.as_path().join("b.txt")).unwrap(),
            "replaced"
        );
    }

    #[test]
    fn test_wipe_target_replaces_contents() {
        let (_temp, root, digest) = setup();
        fs::create_dir_all(root.as_path()).unwrap();
        fs::write(root.as_path().join("stale.html"), "old").unwrap();

        let bytes = TarTestBuilder::new().add_file("new.html", b"new").build_gz();
        let options = DecodeOptions {
            wipe_target: true,
            ..DecodeOptions::default()
        };
        decode_upload(Some(&digest), &digest, bytes.as_slice(), &root, &options).unwrap();

        assert!(!root.as_path().join("stale.html").exists());
        assert!(root.as_path().join("new.html").exists());
    }

    #[test]
    fn test_existing_contents_kept_without_wipe() {
        let (_temp, root, digest) = setup();
        fs::create_dir_all(root.as_path()).unwrap();
        fs::write(root.as_path().join("stale.html"), "old").unwrap();

        let bytes = TarTestBuilder::new().add_file("new.html", b"new").build_gz();
        decode(&bytes, &root, &digest).unwrap();
        assert!(root.as_path().join("stale.html").exists());
    }

    #[test]
    fn test_unsupported_entries_only_is_no_entries() {
        let (_temp, root, digest) = setup();
        let bytes = TarTestBuilder::new().add_fifo("pipe").build_gz();
        let err = decode(&bytes, &root, &digest).unwrap_err();
        assert!(matches!(err, NemuError::NoEntries));
    }
}
