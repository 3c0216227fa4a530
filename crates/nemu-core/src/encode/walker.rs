//! Source tree traversal for the encoder.

use std::fs::Metadata;
use std::path::Path;
use std::path::PathBuf;

use walkdir::WalkDir;

use crate::NemuError;
use crate::Result;

/// One node of the source tree, with its archive name.
#[derive(Debug)]
pub(crate) struct SourceNode {
    /// Path on disk.
    pub path: PathBuf,
    /// Name inside the archive, relative to the source root.
    pub name: PathBuf,
    /// Metadata of the node itself; symlinks are not followed.
    pub metadata: Metadata,
    pub kind: NodeKind,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum NodeKind {
    File,
    Directory,
    /// Target as returned by `read_link`.
    Symlink(PathBuf),
    /// Sockets, fifos, devices.
    Other,
}

/// Walks `source` in lexical order, yielding every descendant.
///
/// The root itself is never yielded when it is a directory. A single-file
/// source yields one node named after its base name.
pub(crate) fn walk_source(source: &Path) -> Result<impl Iterator<Item = Result<SourceNode>>> {
    let root_meta = std::fs::metadata(source).map_err(|e| NemuError::Walk {
        path: source.to_path_buf(),
        source: e,
    })?;

    let (base, min_depth) = if root_meta.is_dir() {
        (source.to_path_buf(), 1)
    } else {
        let parent = source.parent().unwrap_or_else(|| Path::new(""));
        (parent.to_path_buf(), 0)
    };

    let walker = WalkDir::new(source)
        .follow_links(false)
        .min_depth(min_depth)
        .sort_by_file_name()
        .into_iter();

    Ok(walker.map(move |entry| {
        let entry = entry.map_err(|e| {
            let path = e.path().unwrap_or(Path::new("")).to_path_buf();
            NemuError::Walk {
                path,
                source: e.into(),
            }
        })?;
        build_node(&entry, &base)
    }))
}

fn build_node(entry: &walkdir::DirEntry, base: &Path) -> Result<SourceNode> {
    let path = entry.path().to_path_buf();
    let metadata = entry.metadata().map_err(|e| NemuError::Walk {
        path: path.clone(),
        source: e.into(),
    })?;

    let file_type = entry.file_type();
    let kind = if file_type.is_symlink() {
        let target = std::fs::read_link(&path).map_err(|e| NemuError::Walk {
            path: path.clone(),
            source: e,
        })?;
        NodeKind::Symlink(target)
    } else if file_type.is_dir() {
        NodeKind::Directory
    } else if file_type.is_file() {
        NodeKind::File
    } else {
        NodeKind::Other
    };

    let name = archive_name(&path, base);
    Ok(SourceNode {
        path,
        name,
        metadata,
        kind,
    })
}

/// Relative name of `path` under `base`. The tar writer emits `/` separators
/// on every host.
fn archive_name(path: &Path, base: &Path) -> PathBuf {
    path.strip_prefix(base).unwrap_or(path).to_path_buf()
}
