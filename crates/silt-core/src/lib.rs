//! A user-space block-structured file system: a hierarchical namespace of
//! files and directories translated onto raw sector I/O against a
//! fixed-size simulated disk.

use log::{error, info};
use silt_disk::{Disk, DiskError, SECTOR_SIZE, TOTAL_SECTORS};
use silt_fs::{
    FileType, Inode, Layout, SuperBlock, INODE_SIZE, LAYOUT, MAGIC, MAX_FILES, ROOT_INODE,
};
use std::path::PathBuf;

mod bitmap;
mod dir;
mod error;
mod fd;
mod file;
mod ns;
mod path;

pub use error::FsError;
pub use fd::MAX_OPEN_FILES;

use bitmap::Bitmap;
use fd::OpenFileTable;

/// The mounted file system: the in-memory disk image, the path of its
/// backing file, and the process-wide open-file table. All operations are
/// synchronous and run to completion; `&mut self` is the concurrency
/// model.
pub struct FileSystem {
    disk: Disk,
    backing: PathBuf,
    table: OpenFileTable,
}

impl FileSystem {
    /// Mounts the image at `backing`, or formats a fresh one if no such
    /// file exists yet. A present-but-malformed image (wrong length, bad
    /// magic) is an error, never silently reformatted.
    pub fn boot(backing: impl Into<PathBuf>) -> Result<Self, FsError> {
        let backing = backing.into();
        let disk = match Disk::load(&backing) {
            Ok(disk) => {
                let mut buf = [0u8; SECTOR_SIZE];
                disk.read(0, &mut buf)?;
                let superblock = SuperBlock::decode(&buf);
                if superblock.magic != MAGIC {
                    error!(
                        "invalid magic in {}: {:#x} != {:#x}",
                        backing.display(),
                        superblock.magic,
                        MAGIC
                    );
                    return Err(FsError::General);
                }
                info!(
                    "mounted {}: {} sectors, {} inodes",
                    backing.display(),
                    TOTAL_SECTORS,
                    MAX_FILES
                );
                disk
            }
            Err(DiskError::CannotOpen { .. }) => {
                let disk = Self::format()?;
                disk.save(&backing)?;
                info!(
                    "formatted fresh image at {} ({} sectors)",
                    backing.display(),
                    TOTAL_SECTORS
                );
                disk
            }
            Err(e) => return Err(e.into()),
        };

        Ok(Self {
            disk,
            backing,
            table: OpenFileTable::new(),
        })
    }

    /// Persists the in-memory image to the backing file. This is the only
    /// durability primitive; every mutation before it lives in memory.
    pub fn sync(&self) -> Result<(), FsError> {
        self.disk.save(&self.backing)?;
        Ok(())
    }

    /// Lays out an empty image: magic, bitmaps with their reserved
    /// prefixes, a zeroed inode table, and the root directory at inode 0.
    fn format() -> Result<Disk, DiskError> {
        let mut disk = Disk::new();

        // 1. Superblock
        let mut buf = [0u8; SECTOR_SIZE];
        SuperBlock { magic: MAGIC }.encode(&mut buf);
        disk.write(0, &buf)?;

        // 2. Bitmaps: the root inode bit, and every metadata sector up to
        // the first data sector.
        Bitmap::inodes(&LAYOUT).initialize(&mut disk, 1)?;
        Bitmap::sectors(&LAYOUT).initialize(&mut disk, LAYOUT.data_start)?;

        // 3. Inode table, all free except the root directory.
        let zero = [0u8; SECTOR_SIZE];
        for s in 0..LAYOUT.inode_table_sectors {
            disk.write(LAYOUT.inode_table_start + s, &zero)?;
        }
        write_inode(&mut disk, ROOT_INODE, &Inode::new(FileType::Directory))?;

        Ok(disk)
    }

    #[cfg(test)]
    pub(crate) fn fresh() -> Self {
        Self {
            disk: Self::format().expect("in-memory format cannot fail"),
            backing: std::env::temp_dir().join("silt-unit.img"),
            table: OpenFileTable::new(),
        }
    }

    #[cfg(test)]
    pub(crate) fn disk(&self) -> &Disk {
        &self.disk
    }
}

/// Reads one inode record out of its table sector.
pub(crate) fn read_inode(disk: &Disk, inode: u32) -> Result<Inode, DiskError> {
    let mut buf = [0u8; SECTOR_SIZE];
    disk.read(LAYOUT.inode_sector(inode), &mut buf)?;
    let offset = Layout::inode_offset(inode);
    Ok(Inode::decode(&buf[offset..offset + INODE_SIZE]))
}

/// Writes one inode record straight to disk, read-modify-writing its
/// table sector around the neighbors.
pub(crate) fn write_inode(disk: &mut Disk, inode: u32, node: &Inode) -> Result<(), DiskError> {
    let sector = LAYOUT.inode_sector(inode);
    let mut buf = [0u8; SECTOR_SIZE];
    disk.read(sector, &mut buf)?;
    let offset = Layout::inode_offset(inode);
    node.encode(&mut buf[offset..offset + INODE_SIZE]);
    disk.write(sector, &buf)?;
    Ok(())
}
