//! Helpers for building in-memory upload bodies in tests.
//!
//! # Panics
//!
//! Everything here panics on I/O errors; it is meant for tests only.

#![allow(clippy::unwrap_used, clippy::missing_panics_doc)]

use std::io::Write;

use flate2::Compression;
use flate2::write::GzEncoder;

/// Builder for tar archives with arbitrary entries, including names the
/// `tar` crate refuses to write (`..` segments, absolute paths).
///
/// # Examples
///
/// ```
/// use nemu_core::test_utils::TarTestBuilder;
///
/// let body = TarTestBuilder::new()
///     .add_file("index.html", b"<h1>hi</h1>")
///     .add_directory("css/")
///     .add_symlink("latest", "index.html")
///     .add_raw_file("../escape.txt", b"evil")
///     .build_gz();
/// assert_eq!(&body[..2], &[0x1f, 0x8b]);
/// ```
pub struct TarTestBuilder {
    builder: tar::Builder<Vec<u8>>,
}

impl TarTestBuilder {
    /// Creates an empty builder.
    #[must_use]
    pub fn new() -> Self {
        Self {
            builder: tar::Builder::new(Vec::new()),
        }
    }

    /// Adds a regular file with mode 0o644.
    #[must_use]
    pub fn add_file(self, path: &str, data: &[u8]) -> Self {
        self.add_file_with_mode(path, data, 0o644)
    }

    /// Adds a regular file with a custom mode.
    #[must_use]
    pub fn add_file_with_mode(mut self, path: &str, data: &[u8], mode: u32) -> Self {
        let mut header = tar::Header::new_gnu();
        header.set_size(data.len() as u64);
        header.set_mode(mode);
        header.set_mtime(1_700_000_000);
        header.set_cksum();
        self.builder.append_data(&mut header, path, data).unwrap();
        self
    }

    /// Adds a regular file whose name is copied into the header verbatim.
    /// Names must fit the 100-byte ustar name field.
    #[must_use]
    pub fn add_raw_file(mut self, name: &str, data: &[u8]) -> Self {
        let mut header = raw_header(name, tar::EntryType::Regular);
        header.set_size(data.len() as u64);
        header.set_cksum();
        self.builder.append(&header, data).unwrap();
        self
    }

    /// Adds a directory with mode 0o755.
    #[must_use]
    pub fn add_directory(mut self, path: &str) -> Self {
        let mut header = tar::Header::new_gnu();
        header.set_size(0);
        header.set_mode(0o755);
        header.set_entry_type(tar::EntryType::Directory);
        header.set_cksum();
        self.builder
            .append_data(&mut header, path, std::io::empty())
            .unwrap();
        self
    }

    /// Adds a symlink; the target is written verbatim.
    #[must_use]
    pub fn add_symlink(self, path: &str, target: &str) -> Self {
        self.add_link(path, target, tar::EntryType::Symlink)
    }

    /// Adds a hard link; the source name is written verbatim.
    #[must_use]
    pub fn add_hardlink(self, path: &str, source: &str) -> Self {
        self.add_link(path, source, tar::EntryType::Link)
    }

    /// Adds a fifo entry, which the decoder does not support.
    #[must_use]
    pub fn add_fifo(mut self, path: &str) -> Self {
        let mut header = tar::Header::new_gnu();
        header.set_size(0);
        header.set_mode(0o644);
        header.set_entry_type(tar::EntryType::Fifo);
        header.set_cksum();
        self.builder
            .append_data(&mut header, path, std::io::empty())
            .unwrap();
        self
    }

    /// Returns the uncompressed tar bytes.
    #[must_use]
    pub fn build(self) -> Vec<u8> {
        self.builder.into_inner().unwrap()
    }

    /// Returns the tar bytes wrapped in gzip, as sent on the wire.
    #[must_use]
    pub fn build_gz(self) -> Vec<u8> {
        gzip(&self.build())
    }

    fn add_link(mut self, path: &str, target: &str, kind: tar::EntryType) -> Self {
        let mut header = raw_header(path, kind);
        header.set_mode(0o777);
        copy_into(&mut header.as_old_mut().linkname, target);
        header.set_cksum();
        self.builder.append(&header, std::io::empty()).unwrap();
        self
    }
}

impl Default for TarTestBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Gzip-compresses `data`.
#[must_use]
pub fn gzip(data: &[u8]) -> Vec<u8> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data).unwrap();
    encoder.finish().unwrap()
}

fn raw_header(name: &str, kind: tar::EntryType) -> tar::Header {
    let mut header = tar::Header::new_old();
    header.set_entry_type(kind);
    header.set_size(0);
    header.set_mode(0o644);
    header.set_mtime(1_700_000_000);
    copy_into(&mut header.as_old_mut().name, name);
    header
}

fn copy_into(field: &mut [u8], value: &str) {
    let bytes = value.as_bytes();
    assert!(bytes.len() <= field.len(), "name too long for raw header");
    field.fill(0);
    field[..bytes.len()].copy_from_slice(bytes);
}
