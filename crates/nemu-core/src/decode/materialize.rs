//! Writes one decoded entry to disk.
//!
//! Every function here receives a path that already went through the safe
//! root resolver.

use std::fs;
use std::fs::OpenOptions;
use std::io;
use std::io::Read;
use std::path::Path;

use filetime::FileTime;
use tracing::warn;

use crate::DecodeReport;
use crate::NemuError;
use crate::Result;

/// Permission bits applied when a header carries an unreadable mode.
pub(crate) const DEFAULT_FILE_MODE: u32 = 0o644;

/// Mode used for directories created implicitly as parents.
pub(crate) const PARENT_DIR_MODE: u32 = 0o755;

/// Metadata carried over from the header.
#[derive(Debug, Clone, Copy)]
pub(crate) struct EntryMeta {
    pub mode: u32,
    pub mtime: u64,
}

pub(crate) fn write_file(
    path: &Path,
    mut content: impl Read,
    size: u64,
    meta: EntryMeta,
    report: &mut DecodeReport,
) -> Result<()> {
    ensure_parent(path)?;
    // Never write through a symlink or a hard link already at the path.
    remove_non_directory(path)?;

    let mut file = open_for_write(path, meta.mode)?;
    let copied = io::copy(&mut content, &mut file)?;
    if copied != size {
        return Err(NemuError::InvalidArchive(format!(
            "{}: expected {size} bytes, got {copied}",
            path.display()
        )));
    }
    drop(file);

    apply_metadata(path, meta, report);
    report.files += 1;
    report.bytes_written += copied;
    Ok(())
}

pub(crate) fn create_directory(path: &Path, meta: EntryMeta, report: &mut DecodeReport) -> Result<()> {
    create_dir_all_with_mode(path)?;
    apply_metadata(path, meta, report);
    report.directories += 1;
    Ok(())
}

#[cfg(unix)]
pub(crate) fn create_symlink(path: &Path, target: &Path, report: &mut DecodeReport) -> Result<()> {
    ensure_parent(path)?;
    remove_non_directory(path)?;
    std::os::unix::fs::symlink(target, path)?;
    report.symlinks += 1;
    Ok(())
}

#[cfg(not(unix))]
pub(crate) fn create_symlink(path: &Path, target: &Path, report: &mut DecodeReport) -> Result<()> {
    warn!(path = %path.display(), target = %target.display(), "symlinks are not supported on this platform");
    report.add_warning(format!("skipped symlink {}", path.display()));
    Ok(())
}

pub(crate) fn create_hardlink(path: &Path, source: &Path, report: &mut DecodeReport) -> Result<()> {
    ensure_parent(path)?;
    remove_non_directory(path)?;
    fs::hard_link(source, path)?;
    report.hardlinks += 1;
    Ok(())
}

/// Removes the decode root's previous contents and recreates it empty.
pub(crate) fn reset_directory(root: &Path) -> Result<()> {
    match fs::remove_dir_all(root) {
        Ok(()) => {}
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => return Err(e.into()),
    }
    create_dir_all_with_mode(root)
}

fn ensure_parent(path: &Path) -> Result<()> {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => create_dir_all_with_mode(parent),
        _ => Ok(()),
    }
}

fn create_dir_all_with_mode(path: &Path) -> Result<()> {
    let mut builder = fs::DirBuilder::new();
    builder.recursive(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::DirBuilderExt;
        builder.mode(PARENT_DIR_MODE);
    }
    builder.create(path)?;
    Ok(())
}

fn remove_non_directory(path: &Path) -> Result<()> {
    if let Ok(meta) = fs::symlink_metadata(path)
        && !meta.is_dir()
    {
        fs::remove_file(path)?;
    }
    Ok(())
}

#[cfg(unix)]
fn open_for_write(path: &Path, mode: u32) -> io::Result<fs::File> {
    use std::os::unix::fs::OpenOptionsExt;
    OpenOptions::new()
        .read(true)
        .write(true)
        .create_new(true)
        .mode(mode)
        .open(path)
}

#[cfg(not(unix))]
fn open_for_write(path: &Path, _mode: u32) -> io::Result<fs::File> {
    OpenOptions::new()
        .read(true)
        .write(true)
        .create_new(true)
        .open(path)
}

/// Applies permission bits and a non-zero mtime. Failures are warnings.
fn apply_metadata(path: &Path, meta: EntryMeta, report: &mut DecodeReport) {
    if let Err(e) = set_mode(path, meta.mode) {
        warn!(path = %path.display(), error = %e, "failed to set permissions");
        report.add_warning(format!("chmod {}: {e}", path.display()));
    }

    if meta.mtime > 0 {
        let mtime = FileTime::from_unix_time(i64::try_from(meta.mtime).unwrap_or(i64::MAX), 0);
        if let Err(e) = filetime::set_file_times(path, mtime, mtime) {
            warn!(path = %path.display(), error = %e, "failed to set modification time");
            report.add_warning(format!("mtime {}: {e}", path.display()));
        }
    }
}

#[cfg(unix)]
fn set_mode(path: &Path, mode: u32) -> io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(mode))
}

#[cfg(not(unix))]
fn set_mode(_path: &Path, _mode: u32) -> io::Result<()> {
    Ok(())
}
