use crate::error::FsError;
use crate::path::resolve;
use crate::{read_inode, FileSystem};
use silt_disk::SECTOR_SIZE;
use silt_fs::{FileType, Inode, DIRENTS_PER_SECTOR, DIRENT_SIZE};

impl FileSystem {
    pub fn create_dir(&mut self, path: &str) -> Result<(), FsError> {
        self.create_node(path, FileType::Directory)
    }

    /// Removes an empty directory. The root itself can never be removed.
    pub fn remove_dir(&mut self, path: &str) -> Result<(), FsError> {
        self.remove_node(path, FileType::Directory, FsError::NoSuchDir)
    }

    /// Byte size of the directory's dirent array, not its entry count.
    pub fn dir_size(&self, path: &str) -> Result<usize, FsError> {
        let node = self.lookup_dir(path)?;
        Ok(node.size as usize * DIRENT_SIZE)
    }

    /// Copies every live dirent, in storage order, contiguously into
    /// `buf`. The buffer must hold all of them at once; this is not a
    /// streaming interface. Returns the number of entries copied.
    pub fn read_dir(&self, path: &str, buf: &mut [u8]) -> Result<usize, FsError> {
        let node = self.lookup_dir(path)?;
        let count = node.size as usize;
        if buf.len() < count * DIRENT_SIZE {
            return Err(FsError::BufferTooSmall);
        }

        let mut sector = [0u8; SECTOR_SIZE];
        let mut copied = 0;
        while copied < count {
            let group = copied / DIRENTS_PER_SECTOR;
            self.disk.read(node.data[group] as usize, &mut sector)?;
            let live = (count - copied).min(DIRENTS_PER_SECTOR);
            buf[copied * DIRENT_SIZE..(copied + live) * DIRENT_SIZE]
                .copy_from_slice(&sector[..live * DIRENT_SIZE]);
            copied += live;
        }
        Ok(count)
    }

    fn lookup_dir(&self, path: &str) -> Result<Inode, FsError> {
        let resolved = resolve(&self.disk, path).map_err(|e| e.into_fs(FsError::NoSuchDir))?;
        let inode = resolved.inode.ok_or(FsError::NoSuchDir)?;
        let node = read_inode(&self.disk, inode)?;
        if node.file_type != FileType::Directory {
            return Err(FsError::NoSuchDir);
        }
        Ok(node)
    }
}
