use crate::error::FsError;
use silt_disk::{Disk, DiskError, SECTOR_SIZE};
use silt_fs::{
    DirEntry, FileType, Inode, DIRENTS_PER_SECTOR, DIRENT_SIZE, INODE_SIZE, LAYOUT, MAX_NAME,
    MAX_PATH, ROOT_INODE,
};
use thiserror::Error;

#[derive(Debug, Error)]
pub(crate) enum ResolveError {
    #[error("disk layer failure: {0}")]
    Disk(#[from] DiskError),

    #[error("path is not absolute")]
    NotAbsolute,

    #[error("path too long")]
    TooLong,

    #[error("illegal component name")]
    IllegalName,

    #[error("missing path component")]
    Missing,

    #[error("path component is not a directory")]
    NotADirectory,
}

impl ResolveError {
    /// Disk faults always surface as GENERAL; everything else folds into
    /// the caller's "not there / cannot do" code.
    pub(crate) fn into_fs(self, fallback: FsError) -> FsError {
        match self {
            ResolveError::Disk(e) => e.into(),
            _ => fallback,
        }
    }
}

/// Outcome of walking an absolute path. `inode` is `None` when everything
/// up to the last component exists but the component itself does not. For
/// the root path both `parent` and `inode` are the root and `name` is
/// empty.
pub(crate) struct Resolved {
    pub parent: u32,
    pub inode: Option<u32>,
    pub name: String,
}

/// Legal component names are non-empty, shorter than `MAX_NAME` (so the
/// NUL terminator always fits), and drawn from `[A-Za-z0-9._-]`.
pub(crate) fn legal_name(name: &str) -> bool {
    !name.is_empty()
        && name.len() < MAX_NAME
        && name
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'.' || b == b'_' || b == b'-')
}

/// One-sector read cache over the inode table, scoped to a single
/// resolution. Writes elsewhere always go straight to disk, so the cache
/// can never go stale within its scope.
pub(crate) struct InodeCache {
    sector: Option<usize>,
    buf: [u8; SECTOR_SIZE],
}

impl InodeCache {
    pub(crate) fn new() -> Self {
        Self {
            sector: None,
            buf: [0; SECTOR_SIZE],
        }
    }

    pub(crate) fn read(&mut self, disk: &Disk, inode: u32) -> Result<Inode, DiskError> {
        let sector = LAYOUT.inode_sector(inode);
        if self.sector != Some(sector) {
            disk.read(sector, &mut self.buf)?;
            self.sector = Some(sector);
        }
        let offset = silt_fs::Layout::inode_offset(inode);
        Ok(Inode::decode(&self.buf[offset..offset + INODE_SIZE]))
    }
}

/// Walks `path` from the root, ignoring empty components. A missing
/// trailing component is not an error; a missing or non-directory
/// intermediate one is.
pub(crate) fn resolve(disk: &Disk, path: &str) -> Result<Resolved, ResolveError> {
    if path.len() + 1 > MAX_PATH {
        return Err(ResolveError::TooLong);
    }
    let rest = path.strip_prefix('/').ok_or(ResolveError::NotAbsolute)?;

    let mut cache = InodeCache::new();
    let mut parent = ROOT_INODE;
    let mut current = Some(ROOT_INODE);
    let mut name = String::new();

    for component in rest.split('/').filter(|c| !c.is_empty()) {
        if !legal_name(component) {
            return Err(ResolveError::IllegalName);
        }
        let dir = current.ok_or(ResolveError::Missing)?;
        let node = cache.read(disk, dir)?;
        if node.file_type != FileType::Directory {
            return Err(ResolveError::NotADirectory);
        }
        parent = dir;
        current = find_child(disk, &node, component)?;
        name.clear();
        name.push_str(component);
    }

    Ok(Resolved {
        parent,
        inode: current,
        name,
    })
}

/// Linear scan of a directory's data sectors. Only the first `size` slots
/// are live; anything past them is unspecified and never examined.
fn find_child(disk: &Disk, dir: &Inode, name: &str) -> Result<Option<u32>, DiskError> {
    let mut buf = [0u8; SECTOR_SIZE];
    let mut remaining = dir.size as usize;
    let mut group = 0;
    while remaining > 0 {
        disk.read(dir.data[group] as usize, &mut buf)?;
        let live = remaining.min(DIRENTS_PER_SECTOR);
        for slot in 0..live {
            let entry = DirEntry::decode(&buf[slot * DIRENT_SIZE..(slot + 1) * DIRENT_SIZE]);
            if entry.name_as_str() == name {
                return Ok(Some(entry.inode));
            }
        }
        remaining -= live;
        group += 1;
    }
    Ok(None)
}
