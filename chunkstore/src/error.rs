use std::io;
use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Everything that can fail inside the storage engine.
///
/// Absent chunks are not an error; reads of empty slots yield `Ok(None)`.
#[derive(Error, Debug)]
pub enum Error {
    #[error("{}: not a region file (bad magic)", path.display())]
    BadMagic { path: PathBuf },

    #[error("{}: unsupported region format version {found}", path.display())]
    FormatVersion { path: PathBuf, found: u8 },

    #[error("{}: region world version {found}, expected {expected}", path.display())]
    WorldVersion {
        path: PathBuf,
        found: u16,
        expected: u16,
    },

    #[error("{}: region position ({}, {}), expected ({}, {})", path.display(), found.0, found.1, expected.0, expected.1)]
    Position {
        path: PathBuf,
        found: (i32, i32),
        expected: (i32, i32),
    },

    #[error("chunk coordinate ({x}, {z}) out of bounds")]
    OutOfBounds { x: i32, z: i32 },

    #[error("chunk record of {size} bytes exceeds the 1 MiB limit")]
    ChunkTooLarge { size: usize },

    #[error(transparent)]
    Io(#[from] io::Error),
}
