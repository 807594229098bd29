use crate::bitmap::Bitmap;
use crate::error::FsError;
use crate::fd::OpenFile;
use crate::path::resolve;
use crate::{read_inode, write_inode, FileSystem};
use log::debug;
use silt_disk::SECTOR_SIZE;
use silt_fs::{FileType, LAYOUT, MAX_FILE_BYTES};

impl FileSystem {
    pub fn create_file(&mut self, path: &str) -> Result<(), FsError> {
        self.create_node(path, FileType::File)
    }

    /// Unlinks a file. Fails while any descriptor still references it.
    pub fn remove_file(&mut self, path: &str) -> Result<(), FsError> {
        self.remove_node(path, FileType::File, FsError::NoSuchFile)
    }

    /// Opens an existing file and returns its descriptor: the index of
    /// the lowest free table slot, with the cursor at byte 0.
    pub fn open(&mut self, path: &str) -> Result<usize, FsError> {
        let resolved = resolve(&self.disk, path).map_err(|e| e.into_fs(FsError::NoSuchFile))?;
        let inode = resolved.inode.ok_or(FsError::NoSuchFile)?;
        let node = read_inode(&self.disk, inode)?;
        if node.file_type != FileType::File {
            return Err(FsError::General);
        }

        let fd = self
            .table
            .insert(OpenFile {
                inode,
                size: node.size,
                pos: 0,
            })
            .ok_or(FsError::TooManyOpenFiles)?;
        debug!("open {}: fd {}, {} bytes", path, fd, node.size);
        Ok(fd)
    }

    pub fn close(&mut self, fd: usize) -> Result<(), FsError> {
        self.table.remove(fd)
    }

    /// Moves the cursor. The target must stay within the cached size;
    /// seeking past end-of-file is not allowed, so writes can never leave
    /// a gap.
    pub fn seek(&mut self, fd: usize, pos: usize) -> Result<usize, FsError> {
        let open = self.table.get_mut(fd)?;
        if pos > open.size as usize {
            return Err(FsError::SeekOutOfBounds);
        }
        open.pos = pos as u32;
        Ok(pos)
    }

    /// Reads up to `buf.len()` bytes from the cursor, walking every data
    /// sector the range touches. Returns the bytes delivered; 0 at
    /// end-of-file.
    pub fn read(&mut self, fd: usize, buf: &mut [u8]) -> Result<usize, FsError> {
        let open = self.table.get(fd)?;
        let node = read_inode(&self.disk, open.inode)?;
        let total = buf.len().min((open.size - open.pos) as usize);

        let mut done = 0;
        let mut pos = open.pos as usize;
        let mut sector = [0u8; SECTOR_SIZE];
        while done < total {
            let index = pos / SECTOR_SIZE;
            let offset = pos % SECTOR_SIZE;
            let chunk = (SECTOR_SIZE - offset).min(total - done);
            self.disk.read(node.data[index] as usize, &mut sector)?;
            buf[done..done + chunk].copy_from_slice(&sector[offset..offset + chunk]);
            done += chunk;
            pos += chunk;
        }

        self.table.get_mut(fd)?.pos = pos as u32;
        Ok(total)
    }

    /// Writes `buf` at the cursor, growing the file as needed. The size
    /// never shrinks: overwriting the middle of a file leaves its tail in
    /// place.
    pub fn write(&mut self, fd: usize, buf: &[u8]) -> Result<usize, FsError> {
        let open = self.table.get(fd)?;
        let pos = open.pos as usize;
        let end = pos + buf.len();
        if end > MAX_FILE_BYTES {
            return Err(FsError::FileTooBig);
        }

        let mut node = read_inode(&self.disk, open.inode)?;
        debug_assert_eq!(node.file_type, FileType::File);

        // Grow: sectors already covering the file stay; only the gap up
        // to the end of the write range is allocated.
        let allocated = (node.size as usize + SECTOR_SIZE - 1) / SECTOR_SIZE;
        let wanted = (end + SECTOR_SIZE - 1) / SECTOR_SIZE;
        let sectors = Bitmap::sectors(&LAYOUT);
        let mut grown = Vec::new();
        for index in allocated..wanted {
            match sectors.allocate(&mut self.disk) {
                Ok(Some(s)) => {
                    node.data[index] = s as u32;
                    grown.push(s);
                }
                Ok(None) => {
                    // Out of space mid-growth: hand the partial allocation
                    // back before reporting.
                    for &s in &grown {
                        let _ = sectors.free(&mut self.disk, s);
                    }
                    return Err(FsError::NoSpace);
                }
                Err(e) => {
                    for &s in &grown {
                        let _ = sectors.free(&mut self.disk, s);
                    }
                    return Err(e.into());
                }
            }
        }

        node.size = node.size.max(end as u32);
        if let Err(e) = write_inode(&mut self.disk, open.inode, &node) {
            for &s in &grown {
                let _ = sectors.free(&mut self.disk, s);
            }
            return Err(e.into());
        }

        // Read-modify-write every sector the range touches.
        let mut done = 0;
        let mut cur = pos;
        let mut sector = [0u8; SECTOR_SIZE];
        while done < buf.len() {
            let index = cur / SECTOR_SIZE;
            let offset = cur % SECTOR_SIZE;
            let chunk = (SECTOR_SIZE - offset).min(buf.len() - done);
            let s = node.data[index] as usize;
            self.disk.read(s, &mut sector)?;
            sector[offset..offset + chunk].copy_from_slice(&buf[done..done + chunk]);
            self.disk.write(s, &sector)?;
            done += chunk;
            cur += chunk;
        }

        let open = self.table.get_mut(fd)?;
        open.size = open.size.max(end as u32);
        open.pos = end as u32;
        debug!("write: fd {}, {} bytes at {}", fd, buf.len(), pos);
        Ok(buf.len())
    }
}
