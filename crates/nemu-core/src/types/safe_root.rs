//! The directory every decoded entry must stay within.

use crate::NemuError;
use crate::Result;
use crate::security::clean_path;
use crate::security::resolve_entry_path;
use std::fs;
use std::io;
use std::path::Path;
use std::path::PathBuf;

/// An absolute, lexically cleaned root directory.
///
/// The directory does not have to exist yet: the receiver creates it on the
/// first upload. When it does exist, symlinks in the root itself are resolved
/// so that later prefix checks compare like with like.
///
/// # Examples
///
/// ```
/// use nemu_core::SafeRoot;
///
/// # fn main() -> nemu_core::Result<()> {
/// let root = SafeRoot::new("/srv/site/./public/../public")?;
/// assert_eq!(root.as_path(), std::path::Path::new("/srv/site/public"));
///
/// let resolved = root.resolve("assets/style.css")?;
/// assert!(resolved.starts_with(root.as_path()));
/// assert!(root.resolve("../../etc/passwd").is_err());
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SafeRoot(PathBuf);

impl SafeRoot {
    /// Builds a root from `path`, relative paths being taken from the
    /// current working directory.
    pub fn new(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if path.as_os_str().is_empty() {
            return Err(NemuError::Config("target directory is empty".into()));
        }

        let absolute = match path.canonicalize() {
            Ok(canonical) => canonical,
            Err(_) => clean_path(&std::path::absolute(path)?),
        };
        Ok(Self(absolute))
    }

    /// Returns the root as a path.
    #[inline]
    #[must_use]
    pub fn as_path(&self) -> &Path {
        &self.0
    }

    /// Maps an archive entry name to a path under this root.
    ///
    /// See [`resolve_entry_path`].
    pub fn resolve(&self, name: impl AsRef<Path>) -> Result<PathBuf> {
        resolve_entry_path(&self.0, name.as_ref())
    }

    /// Rejects `resolved` if a directory already on disk between the root and
    /// its final component is a symlink, or if the nearest existing parent
    /// canonicalizes outside the root.
    ///
    /// [`resolve`](Self::resolve) is lexical only; this closes the gap left
    /// by links written earlier in the same archive (`evil -> /outside`
    /// followed by `evil/x`). `name` is reported in the error.
    pub fn check_parents(&self, name: &Path, resolved: &Path) -> Result<()> {
        self.check_components(name, resolved, false)
    }

    /// Like [`check_parents`](Self::check_parents), but the final component
    /// must not be a symlink either. Used for hard-link sources.
    pub fn check_existing(&self, name: &Path, resolved: &Path) -> Result<()> {
        self.check_components(name, resolved, true)
    }

    fn check_components(&self, name: &Path, resolved: &Path, include_last: bool) -> Result<()> {
        let traversal = || NemuError::PathTraversal {
            path: name.to_path_buf(),
            root: self.0.clone(),
        };
        let relative = resolved.strip_prefix(&self.0).map_err(|_| traversal())?;
        if relative.as_os_str().is_empty() {
            return Ok(());
        }

        let mut current = self.0.clone();
        let mut components = relative.components().peekable();
        while let Some(component) = components.next() {
            if components.peek().is_none() && !include_last {
                break;
            }
            current.push(component);
            match fs::symlink_metadata(&current) {
                Ok(meta) if meta.file_type().is_symlink() => return Err(traversal()),
                Ok(_) => {}
                Err(e) if e.kind() == io::ErrorKind::NotFound => break,
                Err(e) => return Err(e.into()),
            }
        }

        if let Some(parent) = resolved.parent() {
            match (parent.canonicalize(), self.0.canonicalize()) {
                (Ok(parent), Ok(root)) if !parent.starts_with(&root) => return Err(traversal()),
                (Err(e), _) | (_, Err(e)) if e.kind() != io::ErrorKind::NotFound => {
                    return Err(e.into());
                }
                _ => {}
            }
        }
        Ok(())
    }

    /// Creates the root directory and its parents if missing.
    pub fn ensure_exists(&self) -> Result<()> {
        std::fs::create_dir_all(&self.0)?;
        Ok(())
    }
}

impl AsRef<Path> for SafeRoot {
    fn as_ref(&self) -> &Path {
        &self.0
    }
}
