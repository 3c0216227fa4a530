//! Safe root enforcement for decoded entries.

pub mod path;
pub mod symlink;

pub use path::clean_path;
pub use path::resolve_entry_path;
pub use symlink::check_symlink_target;
