//! Streaming directory upload as gzip-compressed tar.
//!
//! The sending side walks a directory, encodes it into a tar stream inside
//! gzip and streams it as the body of one HTTP request, without staging the
//! archive anywhere. The receiving side authenticates the request, decodes
//! the stream entry by entry and materializes it under a safe root that no
//! entry name can escape.
//!
//! # Examples
//!
//! Sending:
//!
//! ```no_run
//! use nemu_core::CancelScope;
//! use nemu_core::NoopProgress;
//! use nemu_core::transfer::ClientConfig;
//! use nemu_core::transfer::send_archive;
//! use std::time::Duration;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = ClientConfig::new("https://example.com/nemu/upload", "secret", "public");
//! let scope = CancelScope::with_timeout(Duration::from_secs(300));
//! let report = send_archive(&config, &scope, Box::new(NoopProgress))?;
//! println!("uploaded {} entries", report.encode.total_entries());
//! # Ok(())
//! # }
//! ```
//!
//! Receiving:
//!
//! ```no_run
//! use nemu_core::DecodeOptions;
//! use nemu_core::SafeRoot;
//! use nemu_core::decode_upload;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! # let body = std::io::empty();
//! # let header: Option<&str> = None;
//! let root = SafeRoot::new("public")?;
//! let expected = nemu_core::token::digest_token("secret");
//! let report = decode_upload(header, &expected, body, &root, &DecodeOptions::default())?;
//! println!("wrote {} files", report.files);
//! # Ok(())
//! # }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod cancel;
pub mod decode;
pub mod encode;
pub mod error;
pub mod io;
pub mod pipe;
pub mod report;
pub mod security;
pub mod token;
pub mod transfer;
pub mod types;

#[doc(hidden)]
pub mod test_utils;

pub use cancel::CancelScope;
pub use decode::DecodeOptions;
pub use decode::decode_upload;
pub use encode::encode_tree;
pub use error::NemuError;
pub use error::Result;
pub use report::DecodeReport;
pub use report::EncodeReport;
pub use report::NoopProgress;
pub use report::ProgressCallback;
pub use report::TransferReport;
pub use transfer::ClientConfig;
pub use transfer::send_archive;
pub use types::EntryKind;
pub use types::SafeRoot;
