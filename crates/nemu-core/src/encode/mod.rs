//! Archive encoder: source tree to gzip-compressed tar on a byte pipe.
//!
//! The encoder owns the write end of the pipe and always closes it exactly
//! once: cleanly on success, with the failure as the terminal error
//! otherwise, so the reading side observes why the stream ended.

mod walker;

use std::fs::File;
use std::io;
use std::io::Read;
use std::io::Write;
use std::path::Path;
use std::time::Instant;

use flate2::Compression;
use flate2::write::GzEncoder;
use tar::Builder;
use tar::Header;
use tracing::debug;
use tracing::warn;

use crate::CancelScope;
use crate::EncodeReport;
use crate::EntryKind;
use crate::NemuError;
use crate::ProgressCallback;
use crate::Result;
use crate::io::CountingWriter;
use crate::pipe::PipeHandle;
use crate::pipe::PipeWriter;
use walker::NodeKind;
use walker::SourceNode;
use walker::walk_source;

type ArchiveSink = GzEncoder<CountingWriter<PipeWriter>>;

/// Encodes `source` into `writer` as a tar stream inside gzip.
///
/// `source` may be a directory (its descendants are archived, the root
/// itself is not) or a single file (archived under its base name). The
/// scope is checked before every node; once it is done the walk stops
/// without emitting further entries.
///
/// The close sequence runs on success and failure alike: tar trailer, then
/// gzip trailer, then the pipe. A close failure is kept only when no earlier
/// error exists. A write that fails because the reader went away is
/// reported as [`NemuError::PipeClosed`]; one that fails because the scope
/// ended is reported as `Cancelled` or `DeadlineExceeded`.
///
/// # Examples
///
/// ```no_run
/// use nemu_core::CancelScope;
/// use nemu_core::NoopProgress;
/// use nemu_core::encode::encode_tree;
/// use nemu_core::pipe::pipe;
/// use std::io::Read;
/// use std::path::Path;
///
/// let scope = CancelScope::new();
/// let (mut reader, writer) = pipe(&scope);
/// let encoder = std::thread::spawn(move || {
///     encode_tree(Path::new("public"), writer, &scope, &mut NoopProgress)
/// });
///
/// let mut archive = Vec::new();
/// reader.read_to_end(&mut archive)?;
/// let report = encoder.join().unwrap()?;
/// println!("{} entries, {} bytes", report.total_entries(), archive.len());
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
pub fn encode_tree(
    source: &Path,
    writer: PipeWriter,
    scope: &CancelScope,
    progress: &mut dyn ProgressCallback,
) -> Result<EncodeReport> {
    let start = Instant::now();
    let handle = writer.handle();
    let sink = GzEncoder::new(CountingWriter::new(writer), Compression::default());
    let mut builder = Builder::new(sink);
    let mut report = EncodeReport::new();

    let walked = append_tree(&mut builder, source, scope, &handle, progress, &mut report);
    let mut first_error = walked.err();
    let counting = close_stream(builder, scope, &mut first_error);
    report.duration = start.elapsed();

    match (first_error, counting) {
        (None, Some(counting)) => {
            report.bytes_compressed = counting.total_bytes();
            counting.into_inner().close();
            progress.on_complete();
            debug!(
                entries = report.total_entries(),
                skipped = report.skipped,
                bytes = report.bytes_compressed,
                "encoder finished"
            );
            Ok(report)
        }
        (Some(err), counting) => {
            debug!(error = %err, "encoder stopped");
            if let Some(counting) = counting {
                counting.into_inner().close_with_error(err.to_string());
            }
            Err(err)
        }
        (None, None) => Err(NemuError::PipeClosed {
            reason: "archive stream lost while closing".into(),
        }),
    }
}

/// Writes the tar trailer and finishes the gzip stream, leaving the pipe
/// open so the caller closes it last.
///
/// Returns the counting writer once the compressor has been finished, or
/// `None` if it was lost on a failed finish; a lost writer closes the pipe
/// with an error when dropped. Close failures are folded into `first_error`
/// only when it is still empty.
fn close_stream(
    mut builder: Builder<ArchiveSink>,
    scope: &CancelScope,
    first_error: &mut Option<NemuError>,
) -> Option<CountingWriter<PipeWriter>> {
    let record = |err: io::Error, slot: &mut Option<NemuError>| {
        if slot.is_none() {
            *slot = Some(classify_write_error(err, scope));
        }
    };

    if let Err(err) = builder.finish() {
        record(err, first_error);
    }
    let mut gz = match builder.into_inner() {
        Ok(gz) => gz,
        Err(err) => {
            record(err, first_error);
            return None;
        }
    };

    if let Err(err) = gz.try_finish() {
        record(err, first_error);
    }
    match gz.finish() {
        Ok(counting) => Some(counting),
        Err(err) => {
            record(err, first_error);
            None
        }
    }
}

/// Maps a failed write to its cause: the scope if it ended, a closed pipe if
/// the reader went away, a plain I/O error otherwise.
fn classify_write_error(err: io::Error, scope: &CancelScope) -> NemuError {
    match scope.check() {
        Err(scope_err) => scope_err,
        Ok(()) => NemuError::from_pipe_io(err),
    }
}

fn append_tree<W: Write>(
    builder: &mut Builder<W>,
    source: &Path,
    scope: &CancelScope,
    handle: &PipeHandle,
    progress: &mut dyn ProgressCallback,
    report: &mut EncodeReport,
) -> Result<()> {
    for node in walk_source(source)? {
        scope.check()?;
        if handle.is_read_closed() {
            return Err(NemuError::PipeClosed {
                reason: "reader closed before walk finished".into(),
            });
        }

        let node = node?;
        append_node(builder, &node, progress, report)
            .map_err(|err| classify_append_error(err, scope))?;
    }
    Ok(())
}

fn classify_append_error(err: NemuError, scope: &CancelScope) -> NemuError {
    match err {
        NemuError::Io(io_err) => classify_write_error(io_err, scope),
        other => other,
    }
}

fn append_node<W: Write>(
    builder: &mut Builder<W>,
    node: &SourceNode,
    progress: &mut dyn ProgressCallback,
    report: &mut EncodeReport,
) -> Result<()> {
    let name_display = node.name.to_string_lossy();
    match &node.kind {
        NodeKind::File => {
            progress.on_entry(&name_display, &EntryKind::File);
            let size = append_file(builder, node)?;
            report.files += 1;
            report.bytes_read += size;
            progress.on_bytes_written(size);
        }
        NodeKind::Directory => {
            progress.on_entry(&name_display, &EntryKind::Directory);
            let mut header = Header::new_gnu();
            header.set_entry_type(tar::EntryType::Directory);
            header.set_size(0);
            set_metadata(&mut header, &node.metadata);
            builder.append_data(&mut header, &node.name, io::empty())?;
            report.directories += 1;
        }
        NodeKind::Symlink(target) => {
            progress.on_entry(
                &name_display,
                &EntryKind::Symlink {
                    target: target.clone(),
                },
            );
            let mut header = Header::new_gnu();
            header.set_entry_type(tar::EntryType::Symlink);
            header.set_size(0);
            set_metadata(&mut header, &node.metadata);
            builder.append_link(&mut header, &node.name, target)?;
            report.symlinks += 1;
        }
        NodeKind::Other => {
            warn!(path = %node.path.display(), "skipping unsupported file type");
            report.skipped += 1;
            return Ok(());
        }
    }
    debug!(name = %name_display, "archived");
    Ok(())
}

/// Appends a regular file and returns its content length. Only non-empty
/// files are opened and copied.
fn append_file<W: Write>(builder: &mut Builder<W>, node: &SourceNode) -> Result<u64> {
    let size = node.metadata.len();
    let mut header = Header::new_gnu();
    header.set_entry_type(tar::EntryType::Regular);
    header.set_size(size);
    set_metadata(&mut header, &node.metadata);

    if size == 0 {
        builder.append_data(&mut header, &node.name, io::empty())?;
        return Ok(0);
    }

    let file = File::open(&node.path).map_err(|e| NemuError::Walk {
        path: node.path.clone(),
        source: e,
    })?;
    // A file that grows during the walk must not overrun its header size.
    builder.append_data(&mut header, &node.name, file.take(size))?;
    Ok(size)
}

#[cfg(unix)]
fn set_metadata(header: &mut Header, metadata: &std::fs::Metadata) {
    use std::os::unix::fs::MetadataExt;
    header.set_mode(metadata.mode() & 0o7777);
    header.set_uid(u64::from(metadata.uid()));
    header.set_gid(u64::from(metadata.gid()));
    #[allow(clippy::cast_sign_loss)]
    let mtime = metadata.mtime().max(0) as u64;
    header.set_mtime(mtime);
}

#[cfg(not(unix))]
fn set_metadata(header: &mut Header, metadata: &std::fs::Metadata) {
    let mode = if metadata.is_dir() {
        0o755
    } else if metadata.permissions().readonly() {
        0o444
    } else {
        0o644
    };
    header.set_mode(mode);
    if let Ok(modified) = metadata.modified()
        && let Ok(since_epoch) = modified.duration_since(std::time::UNIX_EPOCH)
    {
        header.set_mtime(since_epoch.as_secs());
    }
}
