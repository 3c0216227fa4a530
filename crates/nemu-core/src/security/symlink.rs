//! Symlink target confinement.
//!
//! Only applied when the receiver opts in; by default link targets are
//! written verbatim.

use std::path::Path;

use super::path::clean_path;
use crate::NemuError;
use crate::Result;

/// Checks that a symlink placed at `link_path` with `target` points inside
/// `root`.
///
/// Relative targets are resolved against the link's parent directory,
/// absolute targets are taken as-is. Both are cleaned lexically.
///
/// # Errors
///
/// Returns `NemuError::SymlinkEscape` if the target leaves `root`.
///
/// # Examples
///
/// ```
/// use nemu_core::security::check_symlink_target;
/// use std::path::Path;
///
/// let root = Path::new("/srv/public");
/// let link = Path::new("/srv/public/docs/latest");
/// assert!(check_symlink_target(root, link, Path::new("../v2")).is_ok());
/// assert!(check_symlink_target(root, link, Path::new("../../../etc")).is_err());
/// assert!(check_symlink_target(root, link, Path::new("/etc/passwd")).is_err());
/// ```
pub fn check_symlink_target(root: &Path, link_path: &Path, target: &Path) -> Result<()> {
    let parent = link_path.parent().unwrap_or(root);
    let resolved = clean_path(&parent.join(target));

    if resolved.starts_with(root) {
        Ok(())
    } else {
        Err(NemuError::SymlinkEscape {
            path: link_path.to_path_buf(),
            target: target.to_path_buf(),
        })
    }
}
