//! Hash command: prints the digest the server stores as its token.

use crate::cli::HashArgs;
use crate::output::OutputFormatter;
use anyhow::Result;
use anyhow::bail;
use nemu_core::token::digest_token;

pub fn execute(args: &HashArgs, formatter: &dyn OutputFormatter) -> Result<()> {
    if args.password.is_empty() {
        bail!("password must not be empty");
    }
    formatter.format_digest(&digest_token(&args.password))
}
