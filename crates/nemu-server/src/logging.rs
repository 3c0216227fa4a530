//! Log setup: stderr plus an append-only log file rotated at start-up.

use std::fs;
use std::fs::OpenOptions;
use std::io;
use std::path::Path;
use std::path::PathBuf;
use std::sync::Mutex;

use anyhow::Context;
use anyhow::Result;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt;
use tracing_subscriber::prelude::*;

use crate::config::LogSection;

const MIB: u64 = 1024 * 1024;

/// Rotates the log file if needed and installs the global subscriber.
///
/// `RUST_LOG` overrides the configured level.
pub fn init(log: &LogSection) -> Result<()> {
    rotate(&log.file_path, log.max_size_mb.saturating_mul(MIB), log.max_backups)
        .with_context(|| format!("failed to rotate {}", log.file_path.display()))?;

    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(&log.level)
            .with_context(|| format!("invalid log level '{}'", log.level))?,
    };

    if let Some(parent) = log.file_path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent)?;
    }
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log.file_path)
        .with_context(|| format!("failed to open {}", log.file_path.display()))?;

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(io::stderr))
        // `MakeWriter` is only implemented for the std mutex.
        .with(fmt::layer().with_ansi(false).with_writer(Mutex::new(file)))
        .try_init()
        .context("logging already initialised")?;
    Ok(())
}

/// Shifts `<file>` to `<file>.1`, `<file>.1` to `<file>.2` and so on when
/// `<file>` is larger than `max_bytes`. The oldest backup is dropped. With
/// no backups the file is simply removed.
pub fn rotate(path: &Path, max_bytes: u64, max_backups: u32) -> io::Result<()> {
    let size = match fs::metadata(path) {
        Ok(meta) => meta.len(),
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(e),
    };
    if size <= max_bytes {
        return Ok(());
    }

    if max_backups == 0 {
        return fs::remove_file(path);
    }
    for n in (1..max_backups).rev() {
        let from = backup_path(path, n);
        if from.exists() {
            fs::rename(&from, backup_path(path, n + 1))?;
        }
    }
    fs::rename(path, backup_path(path, 1))
}

fn backup_path(path: &Path, n: u32) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(format!(".{n}"));
    PathBuf::from(name)
}
