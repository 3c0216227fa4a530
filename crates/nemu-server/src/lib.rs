//! Receiving side of nemu: accepts authenticated tar.gz uploads into the
//! target directory and serves that directory as a static site.
//!
//! Routes:
//!
//! - `POST /nemu/upload` decodes the body into the target directory.
//! - `GET /nemu/health` answers `ok`.
//! - Any other `GET`/`HEAD` serves files from the target directory.
//!
//! # Examples
//!
//! ```no_run
//! use nemu_server::config::Config;
//! use nemu_server::server::NemuServer;
//! use std::path::Path;
//!
//! # fn main() -> anyhow::Result<()> {
//! let config = Config::load(Path::new("config/config.toml"))?;
//! NemuServer::bind(&config)?.run()?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod errpage;
pub mod logging;
pub mod router;
pub mod server;
pub mod static_files;

pub use config::Config;
pub use server::NemuServer;
pub use server::ServerHandle;
