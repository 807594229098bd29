use log::error;
use silt_disk::DiskError;
use thiserror::Error;

/// Failure taxonomy for every public operation. Exactly one code per
/// failure; disk-layer faults all collapse into `General`.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum FsError {
    #[error("disk i/o failure")]
    General,

    #[error("cannot create entry")]
    Create,

    #[error("no such file")]
    NoSuchFile,

    #[error("no such directory")]
    NoSuchDir,

    #[error("too many open files")]
    TooManyOpenFiles,

    #[error("bad file descriptor")]
    BadFd,

    #[error("file is in use")]
    FileInUse,

    #[error("file too big")]
    FileTooBig,

    #[error("no space left on the image")]
    NoSpace,

    #[error("seek out of bounds")]
    SeekOutOfBounds,

    #[error("directory not empty")]
    DirNotEmpty,

    #[error("cannot remove the root directory")]
    RootDir,

    #[error("buffer too small")]
    BufferTooSmall,
}

impl From<DiskError> for FsError {
    fn from(e: DiskError) -> Self {
        error!("disk layer failure: {e}");
        FsError::General
    }
}
