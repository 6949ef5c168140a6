//! Shared error taxonomy (spec §7).
//!
//! Every fallible operation in this crate returns `Result<T, Error>` — one
//! flat enum rather than a per-subsystem error with `From` conversions,
//! since FAT32 and exFAT fail in the same handful of ways (bad geometry, no
//! space, path not found) and a second layer of wrapping would just get
//! matched straight back down to these variants at the browser/editor level.

use core::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// Allocation failed.
    OutOfMemory,
    /// Block device read/write failed.
    Io,
    /// Bad magic, bad CRC, or an unsupported on-disk variant.
    InvalidFormat,
    /// Path resolution failed.
    NotFound,
    /// Destination already present when the operation disallows overwrite.
    Exists,
    /// Directory delete attempted on a non-empty directory.
    NotEmpty,
    /// Write would exceed free space.
    InsufficientSpace,
    /// Operation not valid in the driver's current state (e.g. a second
    /// concurrent stream open).
    InvalidState,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let msg = match self {
            Error::OutOfMemory => "out of memory",
            Error::Io => "I/O error",
            Error::InvalidFormat => "invalid format",
            Error::NotFound => "not found",
            Error::Exists => "already exists",
            Error::NotEmpty => "directory not empty",
            Error::InsufficientSpace => "not enough disk space",
            Error::InvalidState => "invalid operation for current state",
        };
        f.write_str(msg)
    }
}

impl core::error::Error for Error {}

pub type Result<T> = core::result::Result<T, Error>;
