//! nemu-server binary.

use std::path::PathBuf;

use anyhow::Context;
use anyhow::Result;
use clap::Parser;
use nemu_server::Config;
use nemu_server::NemuServer;
use nemu_server::config::DEFAULT_CONFIG_PATH;
use nemu_server::logging;
use tracing::warn;

#[derive(Parser)]
#[command(name = "nemu-server")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the TOML configuration file (created with defaults if missing)
    #[arg(short, long, value_name = "FILE", default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let config = Config::load(&args.config)
        .with_context(|| format!("failed to load config '{}'", args.config.display()))?;
    logging::init(&config.log)?;

    if config.server.token.trim().is_empty() {
        warn!("server.token is empty: every upload will be rejected");
    }

    NemuServer::bind(&config)?.run()
}
