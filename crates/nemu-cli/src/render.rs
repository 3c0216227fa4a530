//! Site build step run before anything is uploaded.

use anyhow::Context;
use anyhow::Result;
use anyhow::bail;
use std::io;
use std::path::Path;
use std::process::Command;
use std::process::Stdio;
use tracing::info;

/// Runs `command` in `dir` with the terminal attached.
///
/// With `stdout_to_stderr` the child's stdout is redirected so that machine
/// readable output on our stdout stays clean.
pub fn build_site(command: &str, dir: &Path, stdout_to_stderr: bool) -> Result<()> {
    let mut parts = command.split_whitespace();
    let Some(program) = parts.next() else {
        bail!("build command is empty");
    };

    let stdout = if stdout_to_stderr {
        Stdio::from(io::stderr())
    } else {
        Stdio::inherit()
    };

    info!(command, dir = %dir.display(), "building site");
    let status = Command::new(program)
        .args(parts)
        .current_dir(dir)
        .stdin(Stdio::inherit())
        .stdout(stdout)
        .stderr(Stdio::inherit())
        .status()
        .with_context(|| format!("failed to run build command '{command}'"))?;

    if !status.success() {
        bail!(
            "build command '{command}' failed ({status})\n\
             HINT: Fix the build, or pass --no-render to upload the existing output."
        );
    }
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_empty_command_is_rejected() {
        let temp = TempDir::new().expect("failed to create temp dir");
        let err = build_site("   ", temp.path(), false).unwrap_err();
        assert!(err.to_string().contains("empty"));
    }

    #[test]
    fn test_missing_program_fails() {
        let temp = TempDir::new().expect("failed to create temp dir");
        let err = build_site("nemu-no-such-builder --flag", temp.path(), false).unwrap_err();
        assert!(err.to_string().contains("nemu-no-such-builder"));
    }

    #[cfg(unix)]
    #[test]
    fn test_exit_status_is_checked() {
        let temp = TempDir::new().expect("failed to create temp dir");
        build_site("true", temp.path(), true).expect("true should succeed");
        let err = build_site("false", temp.path(), true).unwrap_err();
        assert!(format!("{err:?}").contains("--no-render"));
    }

    #[cfg(unix)]
    #[test]
    fn test_runs_in_given_directory() {
        let temp = TempDir::new().expect("failed to create temp dir");
        build_site("mkdir public", temp.path(), true).expect("mkdir should succeed");
        assert!(temp.path().join("public").is_dir());
    }
}
