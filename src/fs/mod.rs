//! Filesystem drivers (components D, E, F): FAT32 (with VFAT long names),
//! exFAT, and GPT/MBR disk layout, all built on the [`crate::block::BlockCache`]
//! from component C.

pub mod exfat;
pub mod fat32;
pub mod gpt;

use alloc::string::String;
use alloc::vec::Vec;

use crate::error::Result;
use crate::platform::Timestamp;

/// Attribute bits shared by FAT32 and exFAT directory entries (spec §4.2).
pub mod attr {
    pub const READ_ONLY: u8 = 0x01;
    pub const HIDDEN: u8 = 0x02;
    pub const SYSTEM: u8 = 0x04;
    pub const VOLUME_ID: u8 = 0x08;
    pub const DIRECTORY: u8 = 0x10;
    pub const ARCHIVE: u8 = 0x20;
}

/// One resolved directory entry, independent of which on-disk format it
/// came from — the browser (L) and clone engine (M) only ever see this.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntry {
    pub name: String,
    pub is_dir: bool,
    pub size: u64,
    pub attributes: u8,
}

impl DirEntry {
    pub fn is_hidden_or_system(&self) -> bool {
        self.attributes & (attr::HIDDEN | attr::SYSTEM | attr::VOLUME_ID) != 0
    }
}

/// The whole-file / whole-directory surface the browser, editor and clone
/// engine program against — common to both on-disk formats. The streaming
/// write/read primitives spec.md describes (§4.2) are internal to each
/// driver; everything above this trait works in terms of complete byte
/// buffers, which is all the editor and clone engine ever need (spec §4.9:
/// "each file is read into memory in full").
pub trait Filesystem {
    fn read_dir(&mut self, path: &str) -> Result<Vec<DirEntry>>;
    fn mkdir(&mut self, path: &str) -> Result<()>;
    fn exists(&mut self, path: &str) -> Result<bool>;
    fn is_dir(&mut self, path: &str) -> Result<bool>;
    fn read_file(&mut self, path: &str) -> Result<Vec<u8>>;
    fn write_file(&mut self, path: &str, data: &[u8], timestamp: Timestamp) -> Result<()>;
    fn delete(&mut self, path: &str) -> Result<()>;
    fn rename(&mut self, from: &str, to: &str) -> Result<()>;
    fn free_space_bytes(&mut self) -> Result<u64>;
    fn label(&self) -> &str;
}

/// Splits a `/`-separated absolute path into its non-empty components.
pub(crate) fn split_path(path: &str) -> Vec<&str> {
    path.split('/').filter(|s| !s.is_empty()).collect()
}
