//! Filesystem entry classification and sync decision types

use std::fmt;
use std::time::SystemTime;

/// Classification of a filesystem entry.
///
/// The final symlink is never followed for classification itself; symlink
/// variants describe what the link resolves to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    /// Regular file
    File,
    /// Directory
    Directory,
    /// Symlink resolving to a regular file
    FileSymlink,
    /// Symlink resolving to a directory
    DirectorySymlink,
    /// Symlink whose target does not exist
    BrokenSymlink,
    /// Symlink resolving to something that is neither file nor directory
    OtherSymlink,
    /// Anything else (device node, socket, FIFO, ...)
    Other,
}

impl EntryKind {
    /// Whether the entry is a symlink of any flavor
    pub fn is_symlink(self) -> bool {
        matches!(
            self,
            Self::FileSymlink | Self::DirectorySymlink | Self::BrokenSymlink | Self::OtherSymlink
        )
    }

    /// Whether the entry occupies a directory slot on the filesystem
    /// (a real directory or a symlink to one)
    pub fn is_dir_like(self) -> bool {
        matches!(self, Self::Directory | Self::DirectorySymlink)
    }

    /// Whether the entry is synced with file semantics
    pub fn is_file_like(self) -> bool {
        matches!(self, Self::File | Self::FileSymlink)
    }
}

impl fmt::Display for EntryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::File => "file",
            Self::Directory => "directory",
            Self::FileSymlink => "file symlink",
            Self::DirectorySymlink => "directory symlink",
            Self::BrokenSymlink => "broken symlink",
            Self::OtherSymlink => "other symlink",
            Self::Other => "other",
        };
        f.write_str(name)
    }
}

/// Metadata for a single filesystem entry
#[derive(Debug, Clone)]
pub struct EntryMeta {
    /// Entry classification
    pub kind: EntryKind,
    /// Size in bytes. For file symlinks this is the size of the target.
    pub len: u64,
    /// Last modification time. For file symlinks this is the target's mtime.
    pub mtime: SystemTime,
    /// Hidden flag (dotfile on Unix, FILE_ATTRIBUTE_HIDDEN on Windows)
    pub hidden: bool,
    /// System flag (always false on Unix, FILE_ATTRIBUTE_SYSTEM on Windows)
    pub system: bool,
}

/// Why a file was (or would be) copied to the target
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncCause {
    /// Target entry does not exist
    New,
    /// Symlink-ness differs between source and target
    Replace,
    /// Source is newer than target
    Newer,
    /// Source is older than target
    Older,
    /// Equal mtimes, source is larger
    Larger,
    /// Equal mtimes, source is smaller
    Smaller,
}

impl fmt::Display for SyncCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::New => "new",
            Self::Replace => "replace",
            Self::Newer => "newer",
            Self::Older => "older",
            Self::Larger => "larger",
            Self::Smaller => "smaller",
        };
        f.write_str(name)
    }
}
