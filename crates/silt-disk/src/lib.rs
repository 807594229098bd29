use log::debug;
use std::fs::File;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const SECTOR_SIZE: usize = 512;
pub const TOTAL_SECTORS: usize = 256;
pub const DISK_BYTES: usize = SECTOR_SIZE * TOTAL_SECTORS;

#[derive(Debug, Error)]
pub enum DiskError {
    #[error("cannot open disk image {path}: {source}")]
    CannotOpen { path: PathBuf, source: io::Error },

    #[error("disk image {path} is {actual} bytes, expected {expected}")]
    WrongSize {
        path: PathBuf,
        actual: u64,
        expected: u64,
    },

    #[error("sector {0} out of range")]
    BadSector(usize),

    #[error("transfer buffer is {0} bytes, sector is {SECTOR_SIZE}")]
    BadBuffer(usize),

    #[error("disk image i/o: {0}")]
    Io(#[from] io::Error),
}

/// Fixed array of sectors held in memory. Mutations are visible to
/// subsequent reads immediately; the host file only changes on `save`.
pub struct Disk {
    image: Vec<u8>,
}

impl Disk {
    /// A zero-filled disk, as if freshly manufactured.
    pub fn new() -> Self {
        Self {
            image: vec![0; DISK_BYTES],
        }
    }

    /// Reads one whole sector into `buf`.
    pub fn read(&self, sector: usize, buf: &mut [u8]) -> Result<(), DiskError> {
        if buf.len() != SECTOR_SIZE {
            return Err(DiskError::BadBuffer(buf.len()));
        }
        if sector >= TOTAL_SECTORS {
            return Err(DiskError::BadSector(sector));
        }
        let start = sector * SECTOR_SIZE;
        buf.copy_from_slice(&self.image[start..start + SECTOR_SIZE]);
        Ok(())
    }

    /// Writes one whole sector from `buf`.
    pub fn write(&mut self, sector: usize, buf: &[u8]) -> Result<(), DiskError> {
        if buf.len() != SECTOR_SIZE {
            return Err(DiskError::BadBuffer(buf.len()));
        }
        if sector >= TOTAL_SECTORS {
            return Err(DiskError::BadSector(sector));
        }
        let start = sector * SECTOR_SIZE;
        self.image[start..start + SECTOR_SIZE].copy_from_slice(buf);
        Ok(())
    }

    /// Populates a disk from a host image file. An absent file is reported
    /// as `CannotOpen` so callers can tell "format me" apart from real
    /// failures; a file of the wrong length is rejected outright.
    pub fn load(path: &Path) -> Result<Self, DiskError> {
        let mut file = File::open(path).map_err(|source| {
            if source.kind() == io::ErrorKind::NotFound {
                DiskError::CannotOpen {
                    path: path.to_path_buf(),
                    source,
                }
            } else {
                DiskError::Io(source)
            }
        })?;

        let actual = file.metadata()?.len();
        if actual != DISK_BYTES as u64 {
            return Err(DiskError::WrongSize {
                path: path.to_path_buf(),
                actual,
                expected: DISK_BYTES as u64,
            });
        }

        let mut image = vec![0; DISK_BYTES];
        file.read_exact(&mut image)?;
        debug!("loaded {} sectors from {}", TOTAL_SECTORS, path.display());
        Ok(Self { image })
    }

    /// Persists the in-memory image to the host file.
    pub fn save(&self, path: &Path) -> Result<(), DiskError> {
        let mut file = File::create(path)?;
        file.write_all(&self.image)?;
        debug!("saved {} sectors to {}", TOTAL_SECTORS, path.display());
        Ok(())
    }
}

impl Default for Disk {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn temp_image(tag: &str) -> PathBuf {
        static COUNTER: AtomicU32 = AtomicU32::new(0);
        let n = COUNTER.fetch_add(1, Ordering::Relaxed);
        std::env::temp_dir().join(format!("silt-disk-{}-{}-{}.img", tag, std::process::id(), n))
    }

    #[test]
    fn sector_round_trip() {
        let mut disk = Disk::new();
        let mut sector = [0u8; SECTOR_SIZE];
        sector[0] = 0xAB;
        sector[SECTOR_SIZE - 1] = 0xCD;
        disk.write(7, &sector).unwrap();

        let mut back = [0u8; SECTOR_SIZE];
        disk.read(7, &mut back).unwrap();
        assert_eq!(sector, back);

        disk.read(6, &mut back).unwrap();
        assert_eq!(back, [0u8; SECTOR_SIZE]);
    }

    #[test]
    fn rejects_bad_sector_and_buffer() {
        let mut disk = Disk::new();
        let sector = [0u8; SECTOR_SIZE];
        assert!(matches!(
            disk.write(TOTAL_SECTORS, &sector),
            Err(DiskError::BadSector(_))
        ));
        assert!(matches!(
            disk.write(0, &sector[..100]),
            Err(DiskError::BadBuffer(100))
        ));
        let mut short = [0u8; 100];
        assert!(matches!(
            disk.read(0, &mut short),
            Err(DiskError::BadBuffer(100))
        ));
    }

    #[test]
    fn save_and_load_round_trip() {
        let path = temp_image("roundtrip");
        let mut disk = Disk::new();
        let mut sector = [0u8; SECTOR_SIZE];
        sector[3] = 42;
        disk.write(11, &sector).unwrap();
        disk.save(&path).unwrap();

        let loaded = Disk::load(&path).unwrap();
        let mut back = [0u8; SECTOR_SIZE];
        loaded.read(11, &mut back).unwrap();
        assert_eq!(back[3], 42);
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn load_missing_is_cannot_open() {
        let path = temp_image("missing");
        assert!(matches!(
            Disk::load(&path),
            Err(DiskError::CannotOpen { .. })
        ));
    }

    #[test]
    fn load_wrong_size_is_rejected() {
        let path = temp_image("short");
        std::fs::write(&path, [0u8; 100]).unwrap();
        assert!(matches!(
            Disk::load(&path),
            Err(DiskError::WrongSize { actual: 100, .. })
        ));
        let _ = std::fs::remove_file(&path);
    }
}
