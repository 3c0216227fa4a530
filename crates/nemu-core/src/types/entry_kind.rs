//! Archive entry classification.

use std::path::PathBuf;

/// Kind of an entry in the archive stream.
///
/// Link targets are carried verbatim from the archive header and have NOT
/// been validated.
///
/// # Examples
///
/// ```
/// use nemu_core::EntryKind;
/// use std::path::PathBuf;
///
/// let kind = EntryKind::from_header(&tar::EntryType::Regular, None);
/// assert_eq!(kind, EntryKind::File);
///
/// let kind = EntryKind::from_header(&tar::EntryType::Symlink, Some(PathBuf::from("a.txt")));
/// assert!(kind.is_link());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum EntryKind {
    /// Regular file with content bytes.
    File,

    /// Directory.
    Directory,

    /// Symbolic link.
    Symlink {
        /// Link target as recorded in the header.
        target: PathBuf,
    },

    /// Hard link to an earlier entry.
    Hardlink {
        /// Entry name of the link source, relative to the archive root.
        target: PathBuf,
    },

    /// Anything else (devices, fifos, global pax headers, ...).
    Unsupported {
        /// Raw tar type flag.
        flag: u8,
    },
}

impl EntryKind {
    /// Classifies a tar header type. A link kind without a link name is
    /// treated as unsupported.
    #[must_use]
    pub fn from_header(entry_type: &tar::EntryType, link_name: Option<PathBuf>) -> Self {
        match entry_type {
            tar::EntryType::Regular | tar::EntryType::Continuous => Self::File,
            tar::EntryType::Directory => Self::Directory,
            tar::EntryType::Symlink => match link_name {
                Some(target) => Self::Symlink { target },
                None => Self::Unsupported {
                    flag: entry_type.as_byte(),
                },
            },
            tar::EntryType::Link => match link_name {
                Some(target) => Self::Hardlink { target },
                None => Self::Unsupported {
                    flag: entry_type.as_byte(),
                },
            },
            other => Self::Unsupported {
                flag: other.as_byte(),
            },
        }
    }

    /// Short lowercase label for logs and reports.
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::File => "file",
            Self::Directory => "directory",
            Self::Symlink { .. } => "symlink",
            Self::Hardlink { .. } => "hardlink",
            Self::Unsupported { .. } => "unsupported",
        }
    }

    /// Returns `true` for symbolic and hard links.
    #[must_use]
    pub const fn is_link(&self) -> bool {
        matches!(self, Self::Symlink { .. } | Self::Hardlink { .. })
    }
}
