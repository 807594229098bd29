use crate::bitmap::Bitmap;
use crate::error::FsError;
use crate::path::resolve;
use crate::{read_inode, write_inode, FileSystem};
use log::debug;
use silt_disk::{DiskError, SECTOR_SIZE};
use silt_fs::{
    DirEntry, FileType, Inode, DIRENTS_PER_SECTOR, DIRENT_SIZE, LAYOUT, MAX_DIR_ENTRIES,
};

impl FileSystem {
    /// Creates a file or directory at `path`. Everything that can go wrong
    /// short of a disk fault reports CREATE: an existing entry, a broken
    /// parent chain, a bad name, or an exhausted bitmap.
    pub(crate) fn create_node(&mut self, path: &str, file_type: FileType) -> Result<(), FsError> {
        let resolved = resolve(&self.disk, path).map_err(|e| e.into_fs(FsError::Create))?;
        if resolved.inode.is_some() {
            return Err(FsError::Create);
        }

        let inodes = Bitmap::inodes(&LAYOUT);
        let Some(inode) = inodes.allocate(&mut self.disk)? else {
            return Err(FsError::Create);
        };
        let inode = inode as u32;

        let node = Inode::new(file_type);
        let committed = write_inode(&mut self.disk, inode, &node)
            .map_err(FsError::from)
            .and_then(|_| self.append_entry(resolved.parent, &resolved.name, inode));
        if let Err(e) = committed {
            // Roll the provisional inode back so a failed create leaks no
            // bitmap bits.
            let _ = inodes.free(&mut self.disk, inode as usize);
            return Err(e);
        }

        debug!("created {:?} {} as inode {}", file_type, path, inode);
        Ok(())
    }

    /// Removes the entry at `path`, which must exist and be of the given
    /// kind. `missing` is the caller's NO_SUCH_* code, reused for
    /// wrong-kind targets.
    pub(crate) fn remove_node(
        &mut self,
        path: &str,
        file_type: FileType,
        missing: FsError,
    ) -> Result<(), FsError> {
        let resolved = resolve(&self.disk, path).map_err(|e| e.into_fs(missing))?;
        if resolved.name.is_empty() {
            // Only the root resolves to no component at all.
            return Err(match file_type {
                FileType::Directory => FsError::RootDir,
                FileType::File => missing,
            });
        }
        let inode = resolved.inode.ok_or(missing)?;

        let node = read_inode(&self.disk, inode)?;
        if node.file_type != file_type {
            return Err(missing);
        }
        match file_type {
            FileType::Directory if node.size > 0 => return Err(FsError::DirNotEmpty),
            FileType::File if self.table.references(inode) => return Err(FsError::FileInUse),
            _ => {}
        }

        // Release the payload sectors, then the record itself.
        let sectors = Bitmap::sectors(&LAYOUT);
        for &sector in node.data.iter().filter(|&&s| s != 0) {
            sectors.free(&mut self.disk, sector as usize)?;
        }
        write_inode(&mut self.disk, inode, &Inode::new(FileType::File))?;
        Bitmap::inodes(&LAYOUT).free(&mut self.disk, inode as usize)?;

        self.remove_entry(resolved.parent, inode)?;
        debug!("removed {:?} {} (inode {})", file_type, path, inode);
        Ok(())
    }

    /// Appends a dirent to `dir`. The parent's size picks the target
    /// group; entry 0 of a group allocates that group's data sector.
    fn append_entry(&mut self, dir: u32, name: &str, inode: u32) -> Result<(), FsError> {
        let mut parent = read_inode(&self.disk, dir)?;
        let count = parent.size as usize;
        if count == MAX_DIR_ENTRIES {
            return Err(FsError::Create);
        }
        let group = count / DIRENTS_PER_SECTOR;
        let slot = count % DIRENTS_PER_SECTOR;

        let mut buf = [0u8; SECTOR_SIZE];
        let mut fresh = None;
        let sector;
        if slot == 0 {
            let Some(s) = Bitmap::sectors(&LAYOUT).allocate(&mut self.disk)? else {
                return Err(FsError::Create);
            };
            // A new group starts from an all-zero sector.
            sector = s;
            fresh = Some(s);
            parent.data[group] = s as u32;
        } else {
            sector = parent.data[group] as usize;
            self.disk.read(sector, &mut buf)?;
        }

        DirEntry::new(inode, name).encode(&mut buf[slot * DIRENT_SIZE..(slot + 1) * DIRENT_SIZE]);
        parent.size += 1;

        let committed: Result<(), DiskError> = self
            .disk
            .write(sector, &buf)
            .and_then(|_| write_inode(&mut self.disk, dir, &parent));
        if let Err(e) = committed {
            if let Some(s) = fresh {
                let _ = Bitmap::sectors(&LAYOUT).free(&mut self.disk, s);
            }
            return Err(e.into());
        }
        Ok(())
    }

    /// Drops the dirent for `inode` from `dir` by swapping the last live
    /// entry into its place and zeroing the vacated slot. A group whose
    /// last entry departs gives its data sector back, so a directory of
    /// size n always owns exactly the sectors its entries fill.
    fn remove_entry(&mut self, dir: u32, inode: u32) -> Result<(), FsError> {
        let mut parent = read_inode(&self.disk, dir)?;
        let count = parent.size as usize;
        debug_assert!(count > 0);
        // The dirent referencing a live inode must exist; a miss means the
        // image is corrupt.
        let victim = self.find_entry(&parent, inode)?.ok_or(FsError::General)?;
        let last = count - 1;

        let (victim_group, victim_slot) = (victim / DIRENTS_PER_SECTOR, victim % DIRENTS_PER_SECTOR);
        let (last_group, last_slot) = (last / DIRENTS_PER_SECTOR, last % DIRENTS_PER_SECTOR);

        let mut last_buf = [0u8; SECTOR_SIZE];
        self.disk
            .read(parent.data[last_group] as usize, &mut last_buf)?;

        if victim != last {
            if victim_group == last_group {
                last_buf.copy_within(
                    last_slot * DIRENT_SIZE..(last_slot + 1) * DIRENT_SIZE,
                    victim_slot * DIRENT_SIZE,
                );
            } else {
                let victim_sector = parent.data[victim_group] as usize;
                let mut victim_buf = [0u8; SECTOR_SIZE];
                self.disk.read(victim_sector, &mut victim_buf)?;
                victim_buf[victim_slot * DIRENT_SIZE..(victim_slot + 1) * DIRENT_SIZE]
                    .copy_from_slice(&last_buf[last_slot * DIRENT_SIZE..(last_slot + 1) * DIRENT_SIZE]);
                self.disk.write(victim_sector, &victim_buf)?;
            }
        }

        last_buf[last_slot * DIRENT_SIZE..(last_slot + 1) * DIRENT_SIZE].fill(0);
        self.disk.write(parent.data[last_group] as usize, &last_buf)?;

        parent.size -= 1;
        if parent.size as usize % DIRENTS_PER_SECTOR == 0 {
            // The final group just emptied out.
            Bitmap::sectors(&LAYOUT).free(&mut self.disk, parent.data[last_group] as usize)?;
            parent.data[last_group] = 0;
        }
        write_inode(&mut self.disk, dir, &parent)?;
        Ok(())
    }

    /// Position of the dirent whose inode field matches, among the first
    /// `size` slots.
    fn find_entry(&self, dir: &Inode, inode: u32) -> Result<Option<usize>, DiskError> {
        let mut buf = [0u8; SECTOR_SIZE];
        let count = dir.size as usize;
        let mut pos = 0;
        while pos < count {
            let group = pos / DIRENTS_PER_SECTOR;
            self.disk.read(dir.data[group] as usize, &mut buf)?;
            let live = (count - pos).min(DIRENTS_PER_SECTOR);
            for slot in 0..live {
                let entry = DirEntry::decode(&buf[slot * DIRENT_SIZE..(slot + 1) * DIRENT_SIZE]);
                if entry.inode == inode {
                    return Ok(Some(pos + slot));
                }
            }
            pos += live;
        }
        Ok(None)
    }
}
