//! Subcommand implementations.

pub mod completion;
pub mod hash;
pub mod push;
