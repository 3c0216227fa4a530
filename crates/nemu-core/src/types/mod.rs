//! Validated wrappers used on both sides of a transfer.
//!
//! `SafeRoot` can only be built through [`SafeRoot::new`], so every resolved
//! path is computed against an absolute, cleaned root.

pub mod entry_kind;
pub mod safe_root;

pub use entry_kind::EntryKind;
pub use safe_root::SafeRoot;
