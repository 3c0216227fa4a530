//! Path traversal validation.
//!
//! Resolution is purely lexical: nothing here touches the filesystem, so it
//! is safe to call before any mutation for every entry kind.

use std::path::Component;
use std::path::Path;
use std::path::PathBuf;

use crate::NemuError;
use crate::Result;

/// Lexically normalizes a path.
///
/// `.` segments are dropped and each `..` removes the preceding normal
/// segment. A `..` directly under the root of an absolute path is dropped;
/// leading `..` segments of a relative path are kept. An empty result is
/// returned as `.`.
///
/// # Examples
///
/// ```
/// use nemu_core::security::clean_path;
/// use std::path::Path;
///
/// assert_eq!(clean_path(Path::new("a/./b/../c")), Path::new("a/c"));
/// assert_eq!(clean_path(Path::new("a/../../b")), Path::new("../b"));
/// assert_eq!(clean_path(Path::new("/../etc")), Path::new("/etc"));
/// assert_eq!(clean_path(Path::new("./")), Path::new("."));
/// ```
#[must_use]
pub fn clean_path(path: &Path) -> PathBuf {
    let mut out: Vec<Component<'_>> = Vec::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => match out.last() {
                Some(Component::Normal(_)) => {
                    out.pop();
                }
                Some(Component::RootDir | Component::Prefix(_)) => {}
                _ => out.push(component),
            },
            other => out.push(other),
        }
    }

    if out.is_empty() {
        return PathBuf::from(".");
    }
    out.iter().collect()
}

/// Maps an archive entry name to a path under `root`.
///
/// `root` must already be absolute and clean (see [`crate::SafeRoot`]). The
/// name is cleaned on its own, any root or prefix component is dropped so
/// absolute names are re-rooted, the result is joined onto `root` and
/// cleaned again. If the joined path is not `root` or a descendant of it,
/// the name is rejected.
///
/// # Errors
///
/// Returns `NemuError::PathTraversal` if the name escapes `root`.
///
/// # Examples
///
/// ```
/// use nemu_core::security::resolve_entry_path;
/// use std::path::Path;
///
/// let root = Path::new("/srv/public");
/// assert_eq!(
///     resolve_entry_path(root, Path::new("./index.html")).unwrap(),
///     Path::new("/srv/public/index.html")
/// );
/// assert!(resolve_entry_path(root, Path::new("a/../../b")).is_err());
/// ```
pub fn resolve_entry_path(root: &Path, name: &Path) -> Result<PathBuf> {
    let cleaned = clean_path(name);
    let relative: PathBuf = cleaned
        .components()
        .filter(|c| !matches!(c, Component::RootDir | Component::Prefix(_)))
        .collect();

    let candidate = clean_path(&root.join(relative));
    let escapes = match candidate.strip_prefix(root) {
        Ok(rest) => matches!(rest.components().next(), Some(Component::ParentDir)),
        Err(_) => true,
    };

    if escapes {
        return Err(NemuError::PathTraversal {
            path: name.to_path_buf(),
            root: root.to_path_buf(),
        });
    }
    Ok(candidate)
}
