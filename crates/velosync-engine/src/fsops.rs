//! Filesystem primitives consumed by the reconciler and watch engine
//!
//! These are the black-box collaborators of the sync logic: attribute
//! reading with symlink-aware classification, byte+attribute copies,
//! deletion, content hashing, and directory listing. Everything here is
//! a thin, blocking wrapper over `std::fs` plus `filetime` for mtime
//! preservation.

use filetime::FileTime;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::debug;
use velosync_types::{EntryKind, EntryMeta, Error, Result};

/// Options carried into the copy primitives
#[derive(Debug, Clone, Copy, Default)]
pub struct CopyOptions {
    /// Copy permissions/ACL information as well
    pub copy_acl: bool,
    /// Allow reading files opened by other processes where the platform
    /// supports it (best effort; a plain open elsewhere)
    pub allow_reading_open_files: bool,
}

/// Read and classify an entry without following the final symlink.
pub fn read_meta(path: &Path) -> Result<EntryMeta> {
    let lmeta = fs::symlink_metadata(path).map_err(|e| Error::io(path, e))?;
    let (kind, effective) = if lmeta.file_type().is_symlink() {
        match fs::metadata(path) {
            Ok(t) if t.is_dir() => (EntryKind::DirectorySymlink, Some(t)),
            Ok(t) if t.is_file() => (EntryKind::FileSymlink, Some(t)),
            Ok(_) => (EntryKind::OtherSymlink, None),
            Err(e) if e.kind() == io::ErrorKind::NotFound => (EntryKind::BrokenSymlink, None),
            Err(_) => (EntryKind::OtherSymlink, None),
        }
    } else if lmeta.is_dir() {
        (EntryKind::Directory, None)
    } else if lmeta.is_file() {
        (EntryKind::File, None)
    } else {
        (EntryKind::Other, None)
    };

    // File symlinks compare by their target's size and mtime.
    let stat = effective.as_ref().unwrap_or(&lmeta);
    Ok(EntryMeta {
        kind,
        len: stat.len(),
        mtime: stat.modified().map_err(|e| Error::io(path, e))?,
        hidden: is_hidden(path, &lmeta),
        system: is_system(&lmeta),
    })
}

/// Like [`read_meta`] but returns `None` when the entry does not exist.
pub fn read_meta_opt(path: &Path) -> Result<Option<EntryMeta>> {
    match read_meta(path) {
        Ok(meta) => Ok(Some(meta)),
        Err(Error::Io { source, .. }) if source.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e),
    }
}

#[cfg(unix)]
fn is_hidden(path: &Path, _meta: &fs::Metadata) -> bool {
    path.file_name()
        .map(|n| n.to_string_lossy().starts_with('.'))
        .unwrap_or(false)
}

#[cfg(unix)]
fn is_system(_meta: &fs::Metadata) -> bool {
    false
}

#[cfg(windows)]
fn is_hidden(_path: &Path, meta: &fs::Metadata) -> bool {
    use std::os::windows::fs::MetadataExt;
    const FILE_ATTRIBUTE_HIDDEN: u32 = 0x2;
    meta.file_attributes() & FILE_ATTRIBUTE_HIDDEN != 0
}

#[cfg(windows)]
fn is_system(meta: &fs::Metadata) -> bool {
    use std::os::windows::fs::MetadataExt;
    const FILE_ATTRIBUTE_SYSTEM: u32 = 0x4;
    meta.file_attributes() & FILE_ATTRIBUTE_SYSTEM != 0
}

/// List the direct children of `dir`. The order is unspecified.
pub fn list_children(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut children = Vec::new();
    let entries = fs::read_dir(dir).map_err(|e| Error::io(dir, e))?;
    for entry in entries {
        let entry = entry.map_err(|e| Error::io(dir, e))?;
        children.push(entry.path());
    }
    Ok(children)
}

/// Copy file bytes and attributes from `src` to `dst`, returning the
/// number of bytes copied. Follows symlinks on the source side, so a
/// file symlink copies its target's contents. The mtime is always
/// preserved; permissions when `copy_acl` is set.
pub fn copy_file(src: &Path, dst: &Path, opts: &CopyOptions) -> Result<u64> {
    let bytes = fs::copy(src, dst).map_err(|e| Error::io(src, e))?;
    copy_attrs(src, dst, opts)?;
    Ok(bytes)
}

/// Copy attributes only: mtime always, permissions when `copy_acl`.
pub fn copy_attrs(src: &Path, dst: &Path, opts: &CopyOptions) -> Result<()> {
    let meta = fs::metadata(src).map_err(|e| Error::io(src, e))?;
    let mtime = FileTime::from_last_modification_time(&meta);
    filetime::set_file_mtime(dst, mtime).map_err(|e| Error::io(dst, e))?;
    if opts.copy_acl {
        fs::set_permissions(dst, meta.permissions()).map_err(|e| Error::io(dst, e))?;
    }
    Ok(())
}

/// Create the directory `dst` mirroring `src` without copying contents.
pub fn copy_dir_shallow(src: &Path, dst: &Path, opts: &CopyOptions) -> Result<()> {
    fs::create_dir_all(dst).map_err(|e| Error::io(dst, e))?;
    if opts.copy_acl {
        let meta = fs::metadata(src).map_err(|e| Error::io(src, e))?;
        fs::set_permissions(dst, meta.permissions()).map_err(|e| Error::io(dst, e))?;
    }
    Ok(())
}

/// Read the link target of a symlink.
pub fn read_link(path: &Path) -> Result<PathBuf> {
    fs::read_link(path).map_err(|e| Error::io(path, e))
}

/// Create a symlink at `dst` pointing at `link_target`.
///
/// `dir_link` selects the directory flavor on Windows; Unix has a single
/// symlink kind.
pub fn create_symlink(link_target: &Path, dst: &Path, dir_link: bool) -> Result<()> {
    #[cfg(unix)]
    {
        let _ = dir_link;
        std::os::unix::fs::symlink(link_target, dst)
            .map_err(|e| Error::symlink(dst, e.to_string()))
    }
    #[cfg(windows)]
    {
        if dir_link {
            std::os::windows::fs::symlink_dir(link_target, dst)
                .map_err(|e| Error::symlink(dst, e.to_string()))
        } else {
            std::os::windows::fs::symlink_file(link_target, dst)
                .map_err(|e| Error::symlink(dst, e.to_string()))
        }
    }
}

/// Delete an entry of any kind, descending bottom-up for directories.
/// Directory symlinks remove the link itself, never the link target.
pub fn remove_recursive(path: &Path, kind: EntryKind) -> Result<()> {
    match kind {
        EntryKind::Directory => {
            for child in list_children(path)? {
                let child_meta = read_meta(&child)?;
                remove_recursive(&child, child_meta.kind)?;
            }
            fs::remove_dir(path).map_err(|e| Error::io(path, e))
        }
        _ => fs::remove_file(path).map_err(|e| Error::io(path, e)),
    }
}

/// Total size in bytes of an entry, descending into directories.
/// Used to account deleted bytes before a recursive removal.
pub fn entry_size(path: &Path, kind: EntryKind) -> u64 {
    match kind {
        EntryKind::Directory => {
            let mut total = 0;
            if let Ok(children) = list_children(path) {
                for child in children {
                    if let Ok(meta) = read_meta(&child) {
                        total += match meta.kind {
                            EntryKind::Directory => entry_size(&child, meta.kind),
                            _ => meta.len,
                        };
                    }
                }
            }
            total
        }
        EntryKind::File | EntryKind::FileSymlink => {
            read_meta(path).map(|m| m.len).unwrap_or(0)
        }
        _ => 0,
    }
}

/// Compute the blake3 content hash of a file.
pub fn hash_file(path: &Path) -> Result<blake3::Hash> {
    let mut hasher = blake3::Hasher::new();
    let mut file = fs::File::open(path).map_err(|e| Error::io(path, e))?;
    io::copy(&mut file, &mut hasher).map_err(|e| Error::io(path, e))?;
    debug!("hashed {}", path.display());
    Ok(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn classifies_regular_entries() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("a.txt");
        fs::write(&file, b"hello").unwrap();
        let sub = dir.path().join("sub");
        fs::create_dir(&sub).unwrap();

        assert_eq!(read_meta(&file).unwrap().kind, EntryKind::File);
        assert_eq!(read_meta(&file).unwrap().len, 5);
        assert_eq!(read_meta(&sub).unwrap().kind, EntryKind::Directory);
        assert!(read_meta_opt(&dir.path().join("absent")).unwrap().is_none());
    }

    #[cfg(unix)]
    #[test]
    fn classifies_symlinks() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("a.txt");
        fs::write(&file, b"hello").unwrap();
        let sub = dir.path().join("sub");
        fs::create_dir(&sub).unwrap();

        let file_link = dir.path().join("file_link");
        std::os::unix::fs::symlink(&file, &file_link).unwrap();
        let dir_link = dir.path().join("dir_link");
        std::os::unix::fs::symlink(&sub, &dir_link).unwrap();
        let broken = dir.path().join("broken");
        std::os::unix::fs::symlink(dir.path().join("nope"), &broken).unwrap();

        assert_eq!(read_meta(&file_link).unwrap().kind, EntryKind::FileSymlink);
        assert_eq!(read_meta(&dir_link).unwrap().kind, EntryKind::DirectorySymlink);
        assert_eq!(read_meta(&broken).unwrap().kind, EntryKind::BrokenSymlink);
        // A file symlink reports its target's size.
        assert_eq!(read_meta(&file_link).unwrap().len, 5);
    }

    #[cfg(unix)]
    #[test]
    fn dotfiles_are_hidden() {
        let dir = TempDir::new().unwrap();
        let dotted = dir.path().join(".hidden");
        fs::write(&dotted, b"x").unwrap();
        assert!(read_meta(&dotted).unwrap().hidden);
        let plain = dir.path().join("plain");
        fs::write(&plain, b"x").unwrap();
        assert!(!read_meta(&plain).unwrap().hidden);
    }

    #[test]
    fn copy_preserves_mtime() {
        let dir = TempDir::new().unwrap();
        let src = dir.path().join("src.txt");
        fs::write(&src, b"payload").unwrap();
        filetime::set_file_mtime(&src, FileTime::from_unix_time(1_600_000_000, 0)).unwrap();

        let dst = dir.path().join("dst.txt");
        let bytes = copy_file(&src, &dst, &CopyOptions::default()).unwrap();
        assert_eq!(bytes, 7);
        assert_eq!(
            read_meta(&src).unwrap().mtime,
            read_meta(&dst).unwrap().mtime
        );
    }

    #[test]
    fn remove_recursive_deletes_bottom_up() {
        let dir = TempDir::new().unwrap();
        let tree = dir.path().join("a/b/c");
        fs::create_dir_all(&tree).unwrap();
        fs::write(tree.join("f.txt"), b"x").unwrap();

        let root = dir.path().join("a");
        remove_recursive(&root, EntryKind::Directory).unwrap();
        assert!(!root.exists());
    }

    #[test]
    fn hash_detects_content_change() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("f");
        fs::write(&file, b"one").unwrap();
        let h1 = hash_file(&file).unwrap();
        fs::write(&file, b"two").unwrap();
        let h2 = hash_file(&file).unwrap();
        assert_ne!(h1, h2);
    }
}
