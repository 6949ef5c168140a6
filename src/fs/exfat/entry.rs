//! On-disk exFAT directory entry sets: one file entry (`0x85`), one stream
//! extension (`0xC0`), and `⌈name_len/15⌉` name entries (`0xC1`) (spec §4.3).

use alloc::string::String;
use alloc::vec::Vec;

pub const ENTRY_SIZE: usize = 32;
pub const TYPE_ALLOCATION_BITMAP: u8 = 0x81;
pub const TYPE_VOLUME_LABEL: u8 = 0x83;
pub const TYPE_FILE: u8 = 0x85;
pub const TYPE_STREAM: u8 = 0xC0;
pub const TYPE_NAME: u8 = 0xC1;
const IN_USE_BIT: u8 = 0x80;
const NAME_CHARS_PER_ENTRY: usize = 15;

pub fn is_in_use(entry_type: u8) -> bool {
    entry_type & IN_USE_BIT != 0
}

pub fn clear_in_use(entry_type: u8) -> u8 {
    entry_type & !IN_USE_BIT
}

/// `rol15(x) = x.rotate_left(15)`, equivalent to a 16-bit rotate-right-by-1
/// (spec §4.3's name-hash and entry-set checksum both use this).
fn rol15(x: u16) -> u16 {
    x.rotate_left(15)
}

/// exFAT name hash (spec §4.3): rolling `rol15(hash) + byte` over each
/// UTF-16LE codepoint's two bytes, after ASCII up-casing `'a'..'z'`.
pub fn name_hash(name: &str) -> u16 {
    let mut hash = 0u16;
    for unit in name.encode_utf16() {
        let upcased = if (b'a' as u16..=b'z' as u16).contains(&unit) {
            unit - 32
        } else {
            unit
        };
        for byte in upcased.to_le_bytes() {
            hash = rol15(hash).wrapping_add(byte as u16);
        }
    }
    hash
}

/// Entry-set checksum (spec §4.3): rolling `rol15(checksum) + byte` over
/// every byte of the entry set, except bytes 2-3 of the first entry (the
/// checksum field itself).
pub fn entry_set_checksum(raw_entries: &[[u8; ENTRY_SIZE]]) -> u16 {
    let mut checksum = 0u16;
    for (entry_idx, entry) in raw_entries.iter().enumerate() {
        for (byte_idx, &b) in entry.iter().enumerate() {
            if entry_idx == 0 && (byte_idx == 2 || byte_idx == 3) {
                continue;
            }
            checksum = rol15(checksum).wrapping_add(b as u16);
        }
    }
    checksum
}

#[derive(Debug, Clone)]
pub struct FileEntrySet {
    pub name: String,
    pub attributes: u16,
    pub first_cluster: u32,
    pub data_length: u64,
    pub no_fat_chain: bool,
}

/// Builds the raw entry set (file + stream + name entries) for a new file
/// or directory.
pub fn build_entry_set(name: &str, attributes: u16, first_cluster: u32, data_length: u64) -> Vec<[u8; ENTRY_SIZE]> {
    let units: Vec<u16> = name.encode_utf16().collect();
    let name_entry_count = units.len().div_ceil(NAME_CHARS_PER_ENTRY).max(1);
    let secondary_count = 1 + name_entry_count;

    let mut entries: Vec<[u8; ENTRY_SIZE]> = Vec::with_capacity(1 + secondary_count);

    let mut file_entry = [0u8; ENTRY_SIZE];
    file_entry[0] = TYPE_FILE;
    file_entry[1] = secondary_count as u8;
    file_entry[4..6].copy_from_slice(&attributes.to_le_bytes());
    entries.push(file_entry);

    let mut stream_entry = [0u8; ENTRY_SIZE];
    stream_entry[0] = TYPE_STREAM;
    stream_entry[1] = 0x01; // allocation-possible, FAT chain (bit1 = 0)
    stream_entry[3] = units.len() as u8;
    stream_entry[4..6].copy_from_slice(&name_hash(name).to_le_bytes());
    stream_entry[8..16].copy_from_slice(&data_length.to_le_bytes());
    stream_entry[20..24].copy_from_slice(&first_cluster.to_le_bytes());
    stream_entry[24..32].copy_from_slice(&data_length.to_le_bytes());
    entries.push(stream_entry);

    for chunk in units.chunks(NAME_CHARS_PER_ENTRY) {
        let mut name_entry = [0u8; ENTRY_SIZE];
        name_entry[0] = TYPE_NAME;
        for (i, &u) in chunk.iter().enumerate() {
            name_entry[2 + i * 2..4 + i * 2].copy_from_slice(&u.to_le_bytes());
        }
        entries.push(name_entry);
    }

    let checksum = entry_set_checksum(&entries);
    entries[0][2..4].copy_from_slice(&checksum.to_le_bytes());
    entries
}

/// Parses one file entry set starting at a `0x85` entry (caller has already
/// located it). `raw` must contain exactly `1 + secondary_count` 32-byte
/// entries in order.
pub fn parse_entry_set(raw: &[[u8; ENTRY_SIZE]]) -> Option<FileEntrySet> {
    let file = raw.first()?;
    if clear_in_use(file[0]) != clear_in_use(TYPE_FILE) {
        return None;
    }
    let secondary_count = file[1] as usize;
    if raw.len() < 1 + secondary_count || secondary_count == 0 {
        return None;
    }
    let attributes = u16::from_le_bytes(file[4..6].try_into().unwrap());

    let stream = &raw[1];
    if clear_in_use(stream[0]) != clear_in_use(TYPE_STREAM) {
        return None;
    }
    let flags = stream[1];
    let no_fat_chain = flags & 0x02 != 0;
    let name_len = stream[3] as usize;
    let data_length = u64::from_le_bytes(stream[24..32].try_into().unwrap());
    let first_cluster = u32::from_le_bytes(stream[20..24].try_into().unwrap());

    let mut units: Vec<u16> = Vec::with_capacity(name_len);
    for name_entry in &raw[2..1 + secondary_count] {
        if clear_in_use(name_entry[0]) != clear_in_use(TYPE_NAME) {
            return None;
        }
        for i in 0..NAME_CHARS_PER_ENTRY {
            if units.len() >= name_len {
                break;
            }
            units.push(u16::from_le_bytes(name_entry[2 + i * 2..4 + i * 2].try_into().unwrap()));
        }
    }
    let name = String::from_utf16_lossy(&units);

    Some(FileEntrySet { name, attributes, first_cluster, data_length, no_fat_chain })
}
