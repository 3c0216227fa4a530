//! Push command: build, archive, upload, optionally clean up.

use crate::cli::PushArgs;
use crate::error::add_push_context;
use crate::output::OutputFormatter;
use crate::progress::CliProgress;
use crate::render;
use anyhow::Context;
use anyhow::Result;
use anyhow::bail;
use nemu_core::CancelScope;
use nemu_core::ClientConfig;
use nemu_core::NoopProgress;
use nemu_core::ProgressCallback;
use nemu_core::send_archive;
use std::env;
use std::fs;
use std::path::Path;
use std::time::Duration;
use tracing::info;

/// Path of the upload endpoint on the server.
const UPLOAD_PATH: &str = "/nemu/upload";

pub fn execute(
    args: &PushArgs,
    formatter: &dyn OutputFormatter,
    show_progress: bool,
    json: bool,
) -> Result<()> {
    if args.password.is_empty() {
        bail!(
            "password must not be empty\n\
             HINT: Pass --password or set NEMU_PASSWORD."
        );
    }
    let host = args.host.trim();
    if host.is_empty() {
        bail!("host must not be empty");
    }
    let url = upload_url(host, args.debug);

    if !args.no_render {
        let dir = env::current_dir().context("failed to get current directory")?;
        render::build_site(&args.build_command, &dir, json)?;
    }

    if !args.source.exists() {
        bail!(
            "source directory '{}' does not exist\n\
             HINT: Build the site first or point --source at the output directory.",
            args.source.display()
        );
    }

    info!(url = %url, source = %args.source.display(), "starting upload");
    let config = ClientConfig::new(url, args.password.as_str(), args.source.as_path());
    let scope = CancelScope::with_timeout(Duration::from_secs(args.timeout));
    let progress: Box<dyn ProgressCallback> = if show_progress && CliProgress::should_show() {
        Box::new(CliProgress::new("Uploading"))
    } else {
        Box::new(NoopProgress)
    };

    let report = add_push_context(send_archive(&config, &scope, progress), &config.server_url)?;

    if report.encode.skipped > 0 {
        formatter.format_warning(&format!(
            "skipped {} entries that cannot be archived",
            report.encode.skipped
        ));
    }
    formatter.format_push_result(&config.server_url, &report)?;

    if args.delete {
        remove_source(&args.source)?;
        formatter.format_success(&format!("Removed {}", args.source.display()));
    }
    Ok(())
}

/// Turns the `--host` value into the full upload URL.
///
/// Outside debug mode a bare host gets `https://` and the upload path is
/// appended unless already present. Debug mode only appends the path.
fn upload_url(host: &str, debug: bool) -> String {
    if debug {
        return format!("{host}{UPLOAD_PATH}");
    }
    let mut url = if host.starts_with("http://") || host.starts_with("https://") {
        host.to_string()
    } else {
        format!("https://{host}")
    };
    if !url.ends_with(UPLOAD_PATH) {
        url.push_str(UPLOAD_PATH);
    }
    url
}

fn remove_source(source: &Path) -> Result<()> {
    let removed = if source.is_dir() {
        fs::remove_dir_all(source)
    } else {
        fs::remove_file(source)
    };
    removed.with_context(|| format!("failed to remove '{}'", source.display()))
}
