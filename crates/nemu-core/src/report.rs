//! Operation reports and progress callbacks.

use std::time::Duration;

use crate::EntryKind;

/// Report of one encoder run.
#[derive(Debug, Clone, Default)]
pub struct EncodeReport {
    /// Regular files written, empty ones included.
    pub files: usize,

    /// Directories written.
    pub directories: usize,

    /// Symlinks written.
    pub symlinks: usize,

    /// Nodes skipped because their kind cannot be archived.
    pub skipped: usize,

    /// File content bytes fed into the archive (uncompressed).
    pub bytes_read: u64,

    /// Compressed bytes handed to the pipe.
    pub bytes_compressed: u64,

    /// Wall time of the walk including the close sequence.
    pub duration: Duration,
}

impl EncodeReport {
    /// Creates an empty report.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Entries emitted into the archive.
    #[must_use]
    pub fn total_entries(&self) -> usize {
        self.files + self.directories + self.symlinks
    }

    /// Uncompressed content bytes per compressed byte. Zero for an empty
    /// stream.
    ///
    /// # Examples
    ///
    /// ```
    /// use nemu_core::EncodeReport;
    ///
    /// let mut report = EncodeReport::new();
    /// assert_eq!(report.compression_ratio(), 0.0);
    ///
    /// report.bytes_read = 1000;
    /// report.bytes_compressed = 250;
    /// assert_eq!(report.compression_ratio(), 4.0);
    /// ```
    #[must_use]
    pub fn compression_ratio(&self) -> f64 {
        if self.bytes_compressed == 0 {
            return 0.0;
        }
        self.bytes_read as f64 / self.bytes_compressed as f64
    }
}

/// Report of one decoded upload.
#[derive(Debug, Clone, Default)]
pub struct DecodeReport {
    /// Regular files written.
    pub files: usize,

    /// Directories created or already present.
    pub directories: usize,

    /// Symlinks created.
    pub symlinks: usize,

    /// Hard links created.
    pub hardlinks: usize,

    /// File content bytes written to disk.
    pub bytes_written: u64,

    /// Non-fatal problems: unsupported entries, metadata that could not be
    /// applied.
    pub warnings: Vec<String>,

    /// Wall time of the decode.
    pub duration: Duration,
}

impl DecodeReport {
    /// Creates an empty report.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a non-fatal problem.
    pub fn add_warning(&mut self, message: impl Into<String>) {
        self.warnings.push(message.into());
    }

    /// Entries that were materialized.
    #[must_use]
    pub fn total_entries(&self) -> usize {
        self.files + self.directories + self.symlinks + self.hardlinks
    }

    /// Returns whether any warnings were recorded.
    #[must_use]
    pub fn has_warnings(&self) -> bool {
        !self.warnings.is_empty()
    }
}

/// Outcome of a successful transfer session.
#[derive(Debug, Clone)]
pub struct TransferReport {
    /// What the encoder produced.
    pub encode: EncodeReport,

    /// HTTP status of the accepted response.
    pub status: u16,

    /// Response body as sent by the receiver.
    pub response: String,

    /// Wall time from session start until the encoder was joined.
    pub duration: Duration,
}

/// Progress hooks called by the encoder while it walks the source tree.
///
/// Runs on the encoder thread, so implementations must be `Send`.
///
/// # Examples
///
/// ```
/// use nemu_core::EntryKind;
/// use nemu_core::ProgressCallback;
///
/// #[derive(Default)]
/// struct Tally {
///     entries: usize,
///     bytes: u64,
/// }
///
/// impl ProgressCallback for Tally {
///     fn on_entry(&mut self, _name: &str, _kind: &EntryKind) {
///         self.entries += 1;
///     }
///
///     fn on_bytes_written(&mut self, bytes: u64) {
///         self.bytes += bytes;
///     }
///
///     fn on_complete(&mut self) {}
/// }
/// ```
pub trait ProgressCallback: Send {
    /// Called before an entry's header is written.
    fn on_entry(&mut self, name: &str, kind: &EntryKind);

    /// Called after a file's content was copied into the archive.
    fn on_bytes_written(&mut self, bytes: u64);

    /// Called once the walk finished without error.
    fn on_complete(&mut self);
}

/// Progress callback that ignores every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopProgress;

impl ProgressCallback for NoopProgress {
    fn on_entry(&mut self, _name: &str, _kind: &EntryKind) {}

    fn on_bytes_written(&mut self, _bytes: u64) {}

    fn on_complete(&mut self) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_report_totals() {
        let report = EncodeReport {
            files: 3,
            directories: 2,
            symlinks: 1,
            skipped: 4,
            ..EncodeReport::default()
        };
        assert_eq!(report.total_entries(), 6);
    }

    #[test]
    fn test_decode_report_warnings() {
        let mut report = DecodeReport::new();
        assert!(!report.has_warnings());
        report.add_warning("unsupported entry type");
        assert!(report.has_warnings());
        assert_eq!(report.total_entries(), 0);
    }
}
