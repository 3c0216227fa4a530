//! CLI argument parsing using clap.

use clap::Parser;
use clap::Subcommand;
use clap_complete::Shell;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "nemu")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Suppress non-error output
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Output results in JSON format
    #[arg(short, long, global = true)]
    pub json: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Build the site and upload it to a nemu server
    Push(PushArgs),
    /// Print the token digest for the server configuration
    Hash(HashArgs),
    /// Generate shell completions
    Completion {
        /// Target shell
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(clap::Args)]
pub struct PushArgs {
    /// Server host or URL (example.com, https://example.com)
    #[arg(short = 'H', long, value_name = "HOST")]
    pub host: String,

    /// Shared secret; only its digest is sent
    #[arg(short, long, env = "NEMU_PASSWORD", hide_env_values = true)]
    pub password: String,

    /// Directory to upload
    #[arg(long, value_name = "DIR", default_value = "public")]
    pub source: PathBuf,

    /// Use the host verbatim (no https:// default), e.g. for a local server
    #[arg(long)]
    pub debug: bool,

    /// Remove the source directory after a successful upload
    #[arg(short, long)]
    pub delete: bool,

    /// Skip the site build step
    #[arg(long)]
    pub no_render: bool,

    /// Command that builds the site into the source directory
    #[arg(long, value_name = "COMMAND", default_value = "hugo")]
    pub build_command: String,

    /// Upload deadline in seconds
    #[arg(long, value_name = "SECONDS", default_value = "300", value_parser = clap::value_parser!(u64).range(1..))]
    pub timeout: u64,
}

#[derive(clap::Args)]
pub struct HashArgs {
    /// Shared secret to digest
    #[arg(short, long, env = "NEMU_PASSWORD", hide_env_values = true)]
    pub password: String,
}
