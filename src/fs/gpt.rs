//! GPT/MBR layout (component F, spec §4.4): protective MBR, primary and
//! backup GPT headers, a single ESP-type partition entry, incremental
//! CRC32 over the 16 KiB partition-entry array.
//!
//! The mixed-endian `Guid` representation is grounded in the teacher
//! family's `gpt::Guid` (`rrbutani-fatfs`): a GUID's first three fields are
//! little-endian on disk, the last two big-endian, so it is never safe to
//! type-pun a language-native 128-bit integer onto GPT bytes.

use crc::{Crc, CRC_32_ISO_HDLC};

const CRC32: Crc<u32> = Crc::<u32>::new(&CRC_32_ISO_HDLC);

pub const SECTOR_SIZE: usize = 512;
const GPT_ENTRY_SECTORS: u64 = 32;
const PARTITION_ENTRY_SIZE: usize = 128;
const NUM_PARTITION_ENTRIES: u32 = 128;

/// A GPT-style mixed-endian GUID: the first three fields little-endian, the
/// last two (a 2-byte and a 6-byte field) big-endian, per the GPT spec.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Guid {
    time_low: u32,
    time_mid: u16,
    time_hi_version: u16,
    clock_seq: u16,
    node: [u8; 6],
}

impl Guid {
    pub const fn from_fields(time_low: u32, time_mid: u16, time_hi_version: u16, clock_seq: u16, node: [u8; 6]) -> Self {
        Self { time_low, time_mid, time_hi_version, clock_seq, node }
    }

    pub const ESP_TYPE: Guid = Guid::from_fields(
        0xC12A_7328,
        0xF81F,
        0x11D2,
        0xBA4B,
        [0x00, 0xA0, 0xC9, 0x3E, 0xC9, 0x3B],
    );

    pub fn to_bytes(self) -> [u8; 16] {
        let mut out = [0u8; 16];
        out[0..4].copy_from_slice(&self.time_low.to_le_bytes());
        out[4..6].copy_from_slice(&self.time_mid.to_le_bytes());
        out[6..8].copy_from_slice(&self.time_hi_version.to_le_bytes());
        out[8..10].copy_from_slice(&self.clock_seq.to_be_bytes());
        out[10..16].copy_from_slice(&self.node);
        out
    }

    pub fn from_bytes(b: [u8; 16]) -> Self {
        Self {
            time_low: u32::from_le_bytes(b[0..4].try_into().unwrap()),
            time_mid: u16::from_le_bytes(b[4..6].try_into().unwrap()),
            time_hi_version: u16::from_le_bytes(b[6..8].try_into().unwrap()),
            clock_seq: u16::from_be_bytes(b[8..10].try_into().unwrap()),
            node: b[10..16].try_into().unwrap(),
        }
    }

    /// Deterministic per-disk unique GUID derived from the disk's sector
    /// count; real firmware would draw from an RNG, which this workstation
    /// has no platform-exposed source of.
    pub fn deterministic_unique(seed: u64) -> Self {
        let lo = (seed & 0xFFFF_FFFF) as u32;
        let hi = ((seed >> 32) & 0xFFFF) as u16;
        Guid::from_fields(lo, hi, 0x4000, 0x8000, seed.to_be_bytes()[2..8].try_into().unwrap())
    }
}

fn crc32_of(data: &[u8]) -> u32 {
    CRC32.checksum(data)
}

/// Computes the partition-entries-array CRC32 incrementally: the caller
/// supplies the first sector's worth of real entry bytes, then 31 more
/// zero-filled sectors, because the whole 16 KiB region can't live in one
/// sector buffer at a time (spec §4.4).
pub struct IncrementalCrc32 {
    digest: crc::Digest<'static, u32>,
}

impl IncrementalCrc32 {
    pub fn new() -> Self {
        Self { digest: CRC32.digest() }
    }

    pub fn update(&mut self, chunk: &[u8]) {
        self.digest.update(chunk);
    }

    pub fn finish(self) -> u32 {
        self.digest.finalize()
    }
}

impl Default for IncrementalCrc32 {
    fn default() -> Self {
        Self::new()
    }
}

/// Builds the 440+10+4-byte protective MBR sector (spec §4.4).
pub fn build_protective_mbr(total_sectors: u64) -> [u8; SECTOR_SIZE] {
    let mut sector = [0u8; SECTOR_SIZE];
    let entry = &mut sector[446..446 + 16];
    entry[0] = 0x00; // status: not bootable
    entry[1..4].copy_from_slice(&[0x00, 0x02, 0x00]); // symbolic CHS start
    entry[4] = 0xEE; // protective GPT partition type
    entry[5..8].copy_from_slice(&[0xFF, 0xFF, 0xFF]); // symbolic CHS end
    entry[8..12].copy_from_slice(&1u32.to_le_bytes()); // LBA start
    let lba_size = (total_sectors - 1).min(0xFFFF_FFFF) as u32;
    entry[12..16].copy_from_slice(&lba_size.to_le_bytes());
    sector[510..512].copy_from_slice(&0xAA55u16.to_le_bytes());
    sector
}

/// One fully-formed partition entry (the sole ESP partition, spec §4.4).
pub fn build_esp_entry(first_lba: u64, last_lba: u64, unique_guid: Guid) -> [u8; PARTITION_ENTRY_SIZE] {
    let mut entry = [0u8; PARTITION_ENTRY_SIZE];
    entry[0..16].copy_from_slice(&Guid::ESP_TYPE.to_bytes());
    entry[16..32].copy_from_slice(&unique_guid.to_bytes());
    entry[32..40].copy_from_slice(&first_lba.to_le_bytes());
    entry[40..48].copy_from_slice(&last_lba.to_le_bytes());
    entry[48..56].copy_from_slice(&0u64.to_le_bytes());
    let name: Vec<u16> = "SURVIVAL".encode_utf16().collect();
    for (i, &ch) in name.iter().enumerate() {
        entry[56 + i * 2..56 + i * 2 + 2].copy_from_slice(&ch.to_le_bytes());
    }
    entry
}

use alloc::vec::Vec;

#[derive(Debug, Clone, Copy)]
pub struct GptHeader {
    pub my_lba: u64,
    pub alternate_lba: u64,
    pub first_usable_lba: u64,
    pub last_usable_lba: u64,
    pub disk_guid: Guid,
    pub partition_entry_lba: u64,
    pub partition_entry_crc32: u32,
}

/// Builds a 92-byte GPT header (rest of the 512-byte sector left zero) with
/// its own `header_crc32` computed over the header with that field zeroed.
pub fn build_gpt_header_sector(h: GptHeader) -> [u8; SECTOR_SIZE] {
    let mut sector = [0u8; SECTOR_SIZE];
    sector[0..8].copy_from_slice(b"EFI PART");
    sector[8..12].copy_from_slice(&0x0001_0000u32.to_le_bytes());
    sector[12..16].copy_from_slice(&92u32.to_le_bytes());
    // bytes 16..20 (header_crc32) left zero for the CRC computation below.
    sector[24..32].copy_from_slice(&h.my_lba.to_le_bytes());
    sector[32..40].copy_from_slice(&h.alternate_lba.to_le_bytes());
    sector[40..48].copy_from_slice(&h.first_usable_lba.to_le_bytes());
    sector[48..56].copy_from_slice(&h.last_usable_lba.to_le_bytes());
    sector[56..72].copy_from_slice(&h.disk_guid.to_bytes());
    sector[72..80].copy_from_slice(&h.partition_entry_lba.to_le_bytes());
    sector[80..84].copy_from_slice(&NUM_PARTITION_ENTRIES.to_le_bytes());
    sector[84..88].copy_from_slice(&(PARTITION_ENTRY_SIZE as u32).to_le_bytes());
    sector[88..92].copy_from_slice(&h.partition_entry_crc32.to_le_bytes());

    let crc = crc32_of(&sector[0..92]);
    sector[16..20].copy_from_slice(&crc.to_le_bytes());
    sector
}

/// Full layout for a freshly formatted disk (spec §4.4). `total_sectors` is
/// the whole-disk size; the single ESP partition spans
/// `[2048, last_usable_lba]`.
pub struct DiskLayout {
    pub protective_mbr: [u8; SECTOR_SIZE],
    pub primary_header: [u8; SECTOR_SIZE],
    pub primary_entries_lba: u64,
    pub backup_header: [u8; SECTOR_SIZE],
    pub backup_entries_lba: u64,
    pub esp_entry: [u8; PARTITION_ENTRY_SIZE],
    pub esp_first_lba: u64,
    pub esp_last_lba: u64,
}

pub fn build_disk_layout(total_sectors: u64) -> DiskLayout {
    log::debug!(target: "gpt", "building disk layout for {total_sectors} sectors");
    let last_sector = total_sectors - 1;
    let backup_entries_lba = last_sector - GPT_ENTRY_SECTORS;
    let first_usable_lba = 34;
    let last_usable_lba = backup_entries_lba - 1;

    let disk_guid = Guid::deterministic_unique(total_sectors);
    let esp_first_lba = 2048;
    let esp_last_lba = last_usable_lba;
    let unique_guid = Guid::deterministic_unique(total_sectors ^ 0xA5A5_A5A5);
    let esp_entry = build_esp_entry(esp_first_lba, esp_last_lba, unique_guid);

    let entries_crc32 = entries_array_crc32(&esp_entry);

    let primary_header = build_gpt_header_sector(GptHeader {
        my_lba: 1,
        alternate_lba: last_sector,
        first_usable_lba,
        last_usable_lba,
        disk_guid,
        partition_entry_lba: 2,
        partition_entry_crc32: entries_crc32,
    });

    let backup_header = build_gpt_header_sector(GptHeader {
        my_lba: last_sector,
        alternate_lba: 1,
        first_usable_lba,
        last_usable_lba,
        disk_guid,
        partition_entry_lba: backup_entries_lba,
        partition_entry_crc32: entries_crc32,
    });

    DiskLayout {
        protective_mbr: build_protective_mbr(total_sectors),
        primary_header,
        primary_entries_lba: 2,
        backup_header,
        backup_entries_lba,
        esp_entry,
        esp_first_lba,
        esp_last_lba,
    }
}

/// CRC32 over the full 16 KiB (32-sector) partition-entries region, computed
/// incrementally: the first sector carries `entry`, the other 31 are zero
/// (spec §4.4).
fn entries_array_crc32(first_entry: &[u8; PARTITION_ENTRY_SIZE]) -> u32 {
    let mut first_sector = [0u8; SECTOR_SIZE];
    first_sector[..PARTITION_ENTRY_SIZE].copy_from_slice(first_entry);

    let mut crc = IncrementalCrc32::new();
    crc.update(&first_sector);
    let zero_sector = [0u8; SECTOR_SIZE];
    for _ in 0..GPT_ENTRY_SECTORS - 1 {
        crc.update(&zero_sector);
    }
    crc.finish()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn protective_mbr_has_expected_signature_and_type() {
        let mbr = build_protective_mbr(524288);
        assert_eq!(&mbr[510..512], &[0x55, 0xAA]);
        assert_eq!(mbr[446 + 4], 0xEE);
    }

    #[test]
    fn guid_round_trips_through_bytes() {
        let g = Guid::ESP_TYPE;
        assert_eq!(Guid::from_bytes(g.to_bytes()), g);
    }

    #[test]
    fn primary_and_backup_headers_swap_lba_fields() {
        let layout = build_disk_layout(524288);
        assert_eq!(&layout.primary_header[0..8], b"EFI PART");
        assert_eq!(&layout.backup_header[0..8], b"EFI PART");

        let primary_my_lba = u64::from_le_bytes(layout.primary_header[24..32].try_into().unwrap());
        let backup_alt_lba = u64::from_le_bytes(layout.backup_header[32..40].try_into().unwrap());
        assert_eq!(primary_my_lba, backup_alt_lba);
    }
}
