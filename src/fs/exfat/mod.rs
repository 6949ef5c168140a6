//! exFAT driver (component E, spec §4.3): mount, case-insensitive path
//! resolution, in-memory allocation bitmap, rename/delete. Writes always
//! allocate FAT chains (never the no-FAT-chain representation), matching
//! spec.md's explicit choice to keep the writer simple even though the
//! reader must still honour `no_fat_chain` on existing files.

mod entry;

use alloc::string::String;
use alloc::vec;
use alloc::vec::Vec;

use crate::block::BlockCache;
use crate::error::{Error, Result};
use crate::fs::{attr, DirEntry, Filesystem};
use crate::platform::{BlockDevice, Timestamp};

use entry::{ENTRY_SIZE, TYPE_ALLOCATION_BITMAP, TYPE_FILE, TYPE_VOLUME_LABEL};

const FAT_EOC: u32 = 0xFFFF_FFFF;
const FAT_BAD: u32 = 0xFFFF_FFF7;
const DIRECTORY_ATTR: u16 = attr::DIRECTORY as u16;

pub struct ExfatVolume<B: BlockDevice> {
    cache: BlockCache<B>,
    bytes_per_sector: u32,
    sectors_per_cluster: u32,
    fat_offset_sectors: u64,
    cluster_heap_offset_sectors: u64,
    cluster_count: u32,
    root_cluster: u32,
    bitmap: Vec<u8>,
    bitmap_home: u32,
    label: String,
}

impl<B: BlockDevice> ExfatVolume<B> {
    /// Flushes and hands the raw device back, for the unmount side of an
    /// unmount-remount cycle (spec §8's exFAT round-trip property).
    pub fn into_device(self) -> Result<B> {
        self.cache.into_device()
    }

    fn cluster_to_lba(&self, cluster: u32) -> u64 {
        self.cluster_heap_offset_sectors + (cluster as u64 - 2) * self.sectors_per_cluster as u64
    }

    fn sectors_per_cluster(&self) -> u64 {
        self.sectors_per_cluster as u64
    }

    fn bit_index(cluster: u32) -> usize {
        (cluster - 2) as usize
    }

    fn bitmap_get(&self, cluster: u32) -> bool {
        let idx = Self::bit_index(cluster);
        (self.bitmap[idx / 8] >> (idx % 8)) & 1 != 0
    }

    fn bitmap_set(&mut self, cluster: u32, used: bool) {
        let idx = Self::bit_index(cluster);
        if used {
            self.bitmap[idx / 8] |= 1 << (idx % 8);
        } else {
            self.bitmap[idx / 8] &= !(1 << (idx % 8));
        }
    }

    fn fat_entry_location(&self, cluster: u32) -> (u64, usize) {
        let byte_offset = cluster as u64 * 4;
        let sector = self.fat_offset_sectors + byte_offset / self.bytes_per_sector as u64;
        let offset = (byte_offset % self.bytes_per_sector as u64) as usize;
        (sector, offset)
    }

    fn read_fat_entry(&mut self, cluster: u32) -> Result<u32> {
        let (sector, offset) = self.fat_entry_location(cluster);
        let buf = self.cache.read(sector)?;
        Ok(u32::from_le_bytes(buf[offset..offset + 4].try_into().unwrap()))
    }

    fn write_fat_entry(&mut self, cluster: u32, value: u32) -> Result<()> {
        let (sector, offset) = self.fat_entry_location(cluster);
        let buf = self.cache.read_mut(sector)?;
        buf[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
        self.cache.mark_dirty(sector)
    }

    /// Linear scan of the in-memory bitmap for a clear bit; sets it,
    /// writes `EOC` into the FAT slot, and optionally chains `prev` onto it
    /// (spec §4.3).
    fn alloc_cluster(&mut self, prev: Option<u32>) -> Result<u32> {
        let found = (2..self.cluster_count + 2).find(|&c| !self.bitmap_get(c)).ok_or_else(|| {
            log::warn!(target: "exfat", "alloc_cluster: no free cluster found");
            Error::InsufficientSpace
        })?;
        self.bitmap_set(found, true);
        self.write_fat_entry(found, FAT_EOC)?;
        if let Some(p) = prev {
            self.write_fat_entry(p, found)?;
        }
        self.flush_bitmap()?;
        self.cache.flush_all()?;
        log::trace!(target: "exfat", "allocated cluster {found}");
        Ok(found)
    }

    fn zero_cluster(&mut self, cluster: u32) -> Result<()> {
        let lba = self.cluster_to_lba(cluster);
        let sector_size = self.cache.sector_size();
        for i in 0..self.sectors_per_cluster() {
            let buf = self.cache.read_mut(lba + i)?;
            buf[..sector_size].fill(0);
            self.cache.mark_dirty(lba + i)?;
        }
        Ok(())
    }

    /// Allocates `count` clusters as one new FAT chain, returning the first
    /// cluster (or `0` if `count == 0`).
    fn alloc_chain(&mut self, count: u32) -> Result<u32> {
        if count == 0 {
            return Ok(0);
        }
        let first = self.alloc_cluster(None)?;
        let mut prev = first;
        for _ in 1..count {
            let next = self.alloc_cluster(Some(prev))?;
            prev = next;
        }
        Ok(first)
    }

    /// Frees a chain, following FAT links or iterating a contiguous range
    /// depending on `no_fat_chain` (spec §4.3).
    fn free_chain(&mut self, first_cluster: u32, data_length: u64, no_fat_chain: bool) -> Result<()> {
        if first_cluster < 2 {
            return Ok(());
        }
        let cluster_bytes = self.sectors_per_cluster as u64 * self.bytes_per_sector as u64;
        let cluster_span = data_length.div_ceil(cluster_bytes).max(1) as u32;

        if no_fat_chain {
            for c in first_cluster..first_cluster + cluster_span {
                self.bitmap_set(c, false);
            }
        } else {
            let mut cluster = first_cluster;
            while cluster >= 2 && cluster < FAT_BAD {
                let next = self.read_fat_entry(cluster)?;
                self.bitmap_set(cluster, false);
                self.write_fat_entry(cluster, 0)?;
                if next >= FAT_EOC {
                    break;
                }
                cluster = next;
            }
        }
        self.flush_bitmap()?;
        self.cache.flush_all()
    }

    fn read_cluster_data(&mut self, first_cluster: u32, length: u64, no_fat_chain: bool) -> Result<Vec<u8>> {
        let mut out = Vec::with_capacity(length as usize);
        if first_cluster < 2 {
            return Ok(out);
        }
        if no_fat_chain {
            let cluster_bytes = self.sectors_per_cluster as u64 * self.bytes_per_sector as u64;
            let span = length.div_ceil(cluster_bytes).max(1) as u32;
            for c in first_cluster..first_cluster + span {
                self.read_cluster_into(c, length, &mut out)?;
            }
        } else {
            let mut cluster = first_cluster;
            while (out.len() as u64) < length && cluster >= 2 && cluster < FAT_BAD {
                self.read_cluster_into(cluster, length, &mut out)?;
                cluster = self.read_fat_entry(cluster)?;
            }
        }
        out.truncate(length as usize);
        Ok(out)
    }

    fn read_cluster_into(&mut self, cluster: u32, length: u64, out: &mut Vec<u8>) -> Result<()> {
        let lba = self.cluster_to_lba(cluster);
        for i in 0..self.sectors_per_cluster() {
            if out.len() as u64 >= length {
                break;
            }
            let buf = self.cache.read(lba + i)?;
            out.extend_from_slice(buf);
        }
        Ok(())
    }

    fn flush_bitmap(&mut self) -> Result<()> {
        // The bitmap's own home cluster is tracked by a separate allocation
        // bitmap directory entry (spec §4.3); this driver keeps it at a
        // fixed location recorded at mount time via `bitmap_home`.
        let home = self.bitmap_home;
        let sector_size = self.cache.sector_size();
        let lba = self.cluster_to_lba(home);
        for (i, chunk) in self.bitmap.chunks(sector_size).enumerate() {
            let buf = self.cache.read_mut(lba + i as u64)?;
            buf[..chunk.len()].copy_from_slice(chunk);
            self.cache.mark_dirty(lba + i as u64)?;
        }
        self.cache.flush_all()
    }

    /// Reads every live file-entry set directly under `dir_cluster`.
    fn read_dir_raw(&mut self, dir_cluster: u32) -> Result<Vec<(DirEntry, entry::FileEntrySet)>> {
        let raw = self.read_cluster_data(dir_cluster, self.dir_chain_bytes(dir_cluster)?, false)?;
        let mut out = Vec::new();
        let mut i = 0;
        while i + ENTRY_SIZE <= raw.len() {
            let chunk = &raw[i..i + ENTRY_SIZE];
            if chunk[0] == 0x00 {
                break;
            }
            if entry::clear_in_use(chunk[0]) == entry::clear_in_use(TYPE_FILE) && entry::is_in_use(chunk[0]) {
                let secondary_count = chunk[1] as usize;
                let total = 1 + secondary_count;
                if i + total * ENTRY_SIZE > raw.len() {
                    break;
                }
                let mut set_raw = Vec::with_capacity(total);
                for k in 0..total {
                    let mut e = [0u8; ENTRY_SIZE];
                    e.copy_from_slice(&raw[i + k * ENTRY_SIZE..i + (k + 1) * ENTRY_SIZE]);
                    set_raw.push(e);
                }
                if let Some(parsed) = entry::parse_entry_set(&set_raw) {
                    out.push((
                        DirEntry {
                            name: parsed.name.clone(),
                            is_dir: parsed.attributes & DIRECTORY_ATTR != 0,
                            size: parsed.data_length,
                            attributes: parsed.attributes as u8,
                        },
                        parsed,
                    ));
                }
                i += total * ENTRY_SIZE;
            } else {
                i += ENTRY_SIZE;
            }
        }
        Ok(out)
    }

    /// Directory chains aren't pre-sized in this simplified driver: compute
    /// how many bytes to read by walking the FAT chain length.
    fn dir_chain_bytes(&mut self, first_cluster: u32) -> Result<u64> {
        let mut count = 0u64;
        let mut cluster = first_cluster;
        while cluster >= 2 && cluster < FAT_BAD {
            count += 1;
            cluster = self.read_fat_entry(cluster)?;
        }
        Ok(count * self.sectors_per_cluster as u64 * self.bytes_per_sector as u64)
    }

    fn resolve_dir_cluster(&mut self, components: &[&str]) -> Result<u32> {
        let mut cluster = self.root_cluster;
        for &name in components {
            let entries = self.read_dir_raw(cluster)?;
            let hit = entries
                .into_iter()
                .find(|(e, _)| e.name.eq_ignore_ascii_case(name))
                .ok_or(Error::NotFound)?;
            if !hit.0.is_dir {
                return Err(Error::NotFound);
            }
            cluster = hit.1.first_cluster;
        }
        Ok(cluster)
    }

    fn append_entry_set(&mut self, dir_cluster: u32, entries: &[[u8; ENTRY_SIZE]]) -> Result<()> {
        let mut cluster = dir_cluster;
        loop {
            let lba = self.cluster_to_lba(cluster);
            let slots_per_sector = self.cache.sector_size() / ENTRY_SIZE;
            let total_slots = slots_per_sector * self.sectors_per_cluster() as usize;
            let needed = entries.len();
            let mut run_start = None;
            let mut run_len = 0;
            for slot in 0..total_slots {
                let sector_idx = slot / slots_per_sector;
                let in_sector = slot % slots_per_sector;
                let buf = self.cache.read(lba + sector_idx as u64)?;
                let off = in_sector * ENTRY_SIZE;
                let free = buf[off] == 0x00 || !entry::is_in_use(buf[off]);
                if free {
                    if run_start.is_none() {
                        run_start = Some(slot);
                    }
                    run_len += 1;
                    if run_len >= needed {
                        break;
                    }
                } else {
                    run_start = None;
                    run_len = 0;
                }
            }
            if let Some(start) = run_start {
                if run_len >= needed {
                    for (k, raw) in entries.iter().enumerate() {
                        let slot = start + k;
                        let sector_idx = slot / slots_per_sector;
                        let in_sector = slot % slots_per_sector;
                        let off = in_sector * ENTRY_SIZE;
                        let buf = self.cache.read_mut(lba + sector_idx as u64)?;
                        buf[off..off + ENTRY_SIZE].copy_from_slice(raw);
                        self.cache.mark_dirty(lba + sector_idx as u64)?;
                    }
                    self.cache.flush_all()?;
                    return Ok(());
                }
            }
            let next = self.read_fat_entry(cluster)?;
            if next >= FAT_EOC {
                let new_cluster = self.alloc_cluster(Some(cluster))?;
                self.zero_cluster(new_cluster)?;
                cluster = new_cluster;
            } else {
                cluster = next;
            }
        }
    }

    fn mark_deleted(&mut self, dir_cluster: u32, name: &str) -> Result<entry::FileEntrySet> {
        let raw = self.read_cluster_data(dir_cluster, self.dir_chain_bytes(dir_cluster)?, false)?;
        let mut i = 0;
        while i + ENTRY_SIZE <= raw.len() {
            if raw[i] == 0x00 {
                break;
            }
            if entry::clear_in_use(raw[i]) == entry::clear_in_use(TYPE_FILE) && entry::is_in_use(raw[i]) {
                let secondary_count = raw[i + 1] as usize;
                let total = 1 + secondary_count;
                if i + total * ENTRY_SIZE > raw.len() {
                    break;
                }
                let mut set_raw = Vec::with_capacity(total);
                for k in 0..total {
                    let mut e = [0u8; ENTRY_SIZE];
                    e.copy_from_slice(&raw[i + k * ENTRY_SIZE..i + (k + 1) * ENTRY_SIZE]);
                    set_raw.push(e);
                }
                if let Some(parsed) = entry::parse_entry_set(&set_raw) {
                    if parsed.name.eq_ignore_ascii_case(name) {
                        self.clear_entries_in_place(dir_cluster, i, total)?;
                        return Ok(parsed);
                    }
                }
                i += total * ENTRY_SIZE;
            } else {
                i += ENTRY_SIZE;
            }
        }
        Err(Error::NotFound)
    }

    /// Clears the in-use high bit of every entry-type byte in the set
    /// located at byte offset `start` within the directory's flattened
    /// cluster-chain view.
    fn clear_entries_in_place(&mut self, dir_cluster: u32, start: usize, total: usize) -> Result<()> {
        let sector_size = self.cache.sector_size();
        let slots_per_cluster = sector_size / ENTRY_SIZE * self.sectors_per_cluster() as usize;
        let mut cluster = dir_cluster;
        let mut remaining_offset = start;
        while remaining_offset >= slots_per_cluster * ENTRY_SIZE {
            remaining_offset -= slots_per_cluster * ENTRY_SIZE;
            cluster = self.read_fat_entry(cluster)?;
        }
        let lba = self.cluster_to_lba(cluster);
        let slots_per_sector = sector_size / ENTRY_SIZE;
        for k in 0..total {
            let slot = remaining_offset / ENTRY_SIZE + k;
            let sector_idx = slot / slots_per_sector;
            let in_sector = slot % slots_per_sector;
            let off = in_sector * ENTRY_SIZE;
            let buf = self.cache.read_mut(lba + sector_idx as u64)?;
            buf[off] = entry::clear_in_use(buf[off]);
            self.cache.mark_dirty(lba + sector_idx as u64)?;
        }
        self.cache.flush_all()
    }
}

/// Mounts an existing exFAT volume (spec §4.3): verifies the boot sector,
/// extracts geometry, and locates the allocation bitmap and volume label
/// via the root directory.
pub fn mount<B: BlockDevice>(mut device: B) -> Result<ExfatVolume<B>> {
    log::trace!(target: "exfat", "mount: reading boot sector");
    let bytes_per_sector = device.sector_size() as u32;
    let mut boot = vec![0u8; bytes_per_sector as usize];
    device.read(0, &mut boot)?;

    if &boot[3..11] != b"EXFAT   " {
        log::warn!(target: "exfat", "mount: missing EXFAT OEM name");
        return Err(Error::InvalidFormat);
    }
    if boot[11..64].iter().any(|&b| b != 0) {
        log::warn!(target: "exfat", "mount: reserved bytes not zeroed");
        return Err(Error::InvalidFormat);
    }
    if u16::from_le_bytes(boot[510..512].try_into().unwrap()) != 0xAA55 {
        log::warn!(target: "exfat", "mount: missing boot-sector signature");
        return Err(Error::InvalidFormat);
    }

    let fat_offset = u32::from_le_bytes(boot[80..84].try_into().unwrap()) as u64;
    let cluster_heap_offset = u32::from_le_bytes(boot[88..92].try_into().unwrap()) as u64;
    let cluster_count = u32::from_le_bytes(boot[92..96].try_into().unwrap());
    let root_cluster = u32::from_le_bytes(boot[96..100].try_into().unwrap());
    let bytes_per_sector_shift = boot[108];
    let sectors_per_cluster_shift = boot[109];

    if bytes_per_sector_shift < 9 || bytes_per_sector_shift > 12 || sectors_per_cluster_shift > 25 {
        return Err(Error::InvalidFormat);
    }
    let sectors_per_cluster = 1u32 << sectors_per_cluster_shift;

    let mut vol = ExfatVolume {
        cache: BlockCache::new(device),
        bytes_per_sector,
        sectors_per_cluster,
        fat_offset_sectors: fat_offset,
        cluster_heap_offset_sectors: cluster_heap_offset,
        cluster_count,
        root_cluster,
        bitmap: vec![0u8; cluster_count.div_ceil(8) as usize],
        label: String::new(),
        bitmap_home: 0,
    };

    let root_bytes = vol.dir_chain_bytes(root_cluster)?;
    let raw = vol.read_cluster_data(root_cluster, root_bytes, false)?;

    let mut i = 0;
    while i + ENTRY_SIZE <= raw.len() {
        let chunk = &raw[i..i + ENTRY_SIZE];
        match entry::clear_in_use(chunk[0]) {
            t if t == entry::clear_in_use(TYPE_ALLOCATION_BITMAP) && chunk[1] & 0x01 == 0 => {
                let first_cluster = u32::from_le_bytes(chunk[20..24].try_into().unwrap());
                vol.bitmap_home = first_cluster;
                let bitmap_len = u64::from_le_bytes(chunk[24..32].try_into().unwrap());
                vol.bitmap = vol.read_cluster_data(first_cluster, bitmap_len, false)?;
            }
            t if t == entry::clear_in_use(TYPE_VOLUME_LABEL) => {
                let char_count = chunk[1] as usize;
                let mut units = Vec::with_capacity(char_count);
                for k in 0..char_count.min(11) {
                    units.push(u16::from_le_bytes(chunk[2 + k * 2..4 + k * 2].try_into().unwrap()));
                }
                vol.label = String::from_utf16_lossy(&units).chars().map(|c| if c.is_ascii() { c } else { '?' }).collect();
            }
            _ => {}
        }
        i += ENTRY_SIZE;
    }

    if vol.bitmap_home == 0 {
        log::warn!(target: "exfat", "mount: no allocation-bitmap directory entry found");
        return Err(Error::InvalidFormat);
    }
    log::debug!(target: "exfat", "mounted volume '{}', {} clusters", vol.label, vol.cluster_count);
    Ok(vol)
}

impl<B: BlockDevice> Filesystem for ExfatVolume<B> {
    fn read_dir(&mut self, path: &str) -> Result<Vec<DirEntry>> {
        let components = crate::fs::split_path(path);
        let cluster = self.resolve_dir_cluster(&components)?;
        Ok(self.read_dir_raw(cluster)?.into_iter().map(|(e, _)| e).collect())
    }

    fn mkdir(&mut self, path: &str) -> Result<()> {
        let mut components = crate::fs::split_path(path);
        let name = components.pop().ok_or(Error::InvalidState)?;
        let parent = self.resolve_dir_cluster(&components)?;
        if self.read_dir_raw(parent)?.iter().any(|(e, _)| e.name.eq_ignore_ascii_case(name)) {
            return Ok(());
        }
        let new_cluster = self.alloc_chain(1)?;
        self.zero_cluster(new_cluster)?;
        let set = entry::build_entry_set(name, DIRECTORY_ATTR, new_cluster, 0);
        self.append_entry_set(parent, &set)
    }

    fn exists(&mut self, path: &str) -> Result<bool> {
        let mut components = crate::fs::split_path(path);
        let Some(name) = components.pop() else { return Ok(true) };
        let parent = match self.resolve_dir_cluster(&components) {
            Ok(c) => c,
            Err(Error::NotFound) => return Ok(false),
            Err(e) => return Err(e),
        };
        Ok(self.read_dir_raw(parent)?.iter().any(|(e, _)| e.name.eq_ignore_ascii_case(name)))
    }

    fn is_dir(&mut self, path: &str) -> Result<bool> {
        let components = crate::fs::split_path(path);
        if components.is_empty() {
            return Ok(true);
        }
        let mut parent_components = components.clone();
        let name = parent_components.pop().unwrap();
        let parent = self.resolve_dir_cluster(&parent_components)?;
        self.read_dir_raw(parent)?
            .into_iter()
            .find(|(e, _)| e.name.eq_ignore_ascii_case(name))
            .map(|(e, _)| e.is_dir)
            .ok_or(Error::NotFound)
    }

    fn read_file(&mut self, path: &str) -> Result<Vec<u8>> {
        let mut components = crate::fs::split_path(path);
        let name = components.pop().ok_or(Error::NotFound)?;
        let parent = self.resolve_dir_cluster(&components)?;
        let (dir_entry, set) = self
            .read_dir_raw(parent)?
            .into_iter()
            .find(|(e, _)| e.name.eq_ignore_ascii_case(name))
            .ok_or(Error::NotFound)?;
        if dir_entry.is_dir {
            return Err(Error::InvalidState);
        }
        self.read_cluster_data(set.first_cluster, set.data_length, set.no_fat_chain)
    }

    fn write_file(&mut self, path: &str, data: &[u8], _timestamp: Timestamp) -> Result<()> {
        let mut components = crate::fs::split_path(path);
        let name = components.pop().ok_or(Error::InvalidState)?;
        let parent = self.resolve_dir_cluster(&components)?;

        if let Ok(old) = self.mark_deleted(parent, name) {
            self.free_chain(old.first_cluster, old.data_length, old.no_fat_chain)?;
        }

        let cluster_bytes = self.sectors_per_cluster as u64 * self.bytes_per_sector as u64;
        let clusters_needed = if data.is_empty() { 0 } else { (data.len() as u64).div_ceil(cluster_bytes) as u32 };
        let first_cluster = self.alloc_chain(clusters_needed)?;

        let mut written = 0usize;
        let mut cluster = first_cluster;
        while written < data.len() {
            let lba = self.cluster_to_lba(cluster);
            for i in 0..self.sectors_per_cluster() {
                if written >= data.len() {
                    break;
                }
                let sector_size = self.cache.sector_size();
                let mut sector_buf = vec![0u8; sector_size];
                let n = (data.len() - written).min(sector_size);
                sector_buf[..n].copy_from_slice(&data[written..written + n]);
                written += n;
                let buf = self.cache.read_mut(lba + i)?;
                buf[..sector_size].copy_from_slice(&sector_buf);
                self.cache.mark_dirty(lba + i)?;
            }
            cluster = self.read_fat_entry(cluster)?;
            if cluster >= FAT_EOC {
                break;
            }
        }
        self.cache.flush_all()?;

        let set = entry::build_entry_set(name, 0, first_cluster, data.len() as u64);
        self.append_entry_set(parent, &set)
    }

    fn delete(&mut self, path: &str) -> Result<()> {
        let mut components = crate::fs::split_path(path);
        let name = components.pop().ok_or(Error::NotFound)?;
        let parent = self.resolve_dir_cluster(&components)?;
        let set = self.mark_deleted(parent, name)?;
        self.free_chain(set.first_cluster, set.data_length, set.no_fat_chain)
    }

    fn rename(&mut self, from: &str, to: &str) -> Result<()> {
        let mut from_components = crate::fs::split_path(from);
        let from_name = from_components.pop().ok_or(Error::NotFound)?;
        let parent = self.resolve_dir_cluster(&from_components)?;
        let old = self.mark_deleted(parent, from_name)?;

        let mut to_components = crate::fs::split_path(to);
        let to_name = to_components.pop().ok_or(Error::InvalidState)?;
        let dst_parent = self.resolve_dir_cluster(&to_components)?;
        let set = entry::build_entry_set(to_name, old.attributes, old.first_cluster, old.data_length);
        self.append_entry_set(dst_parent, &set)
    }

    fn free_space_bytes(&mut self) -> Result<u64> {
        let free_clusters = (0..self.cluster_count).filter(|&i| (self.bitmap[i as usize / 8] >> (i % 8)) & 1 == 0).count();
        Ok(free_clusters as u64 * self.sectors_per_cluster as u64 * self.bytes_per_sector as u64)
    }

    fn label(&self) -> &str {
        &self.label
    }
}

impl<B: BlockDevice> ExfatVolume<B> {
    /// Sets (or replaces) the volume label directory entry, mirroring
    /// `Fat32Volume::set_label`'s append-an-entry approach: clears any
    /// existing `TYPE_VOLUME_LABEL` entry in the root directory, then
    /// appends a fresh one encoding `label` as UTF-16 (spec §4.3).
    pub fn set_label(&mut self, label: &str) -> Result<()> {
        self.clear_label_entry(self.root_cluster)?;
        let units: Vec<u16> = label.encode_utf16().take(11).collect();
        let mut label_entry = [0u8; ENTRY_SIZE];
        label_entry[0] = TYPE_VOLUME_LABEL;
        label_entry[1] = units.len() as u8;
        for (i, &u) in units.iter().enumerate() {
            label_entry[2 + i * 2..4 + i * 2].copy_from_slice(&u.to_le_bytes());
        }
        self.append_entry_set(self.root_cluster, &[label_entry])?;
        self.label = label.into();
        Ok(())
    }

    /// Clears the in-use bit of an existing volume-label entry in
    /// `dir_cluster`, if one is present, so `set_label` never leaves two
    /// live label entries behind.
    fn clear_label_entry(&mut self, dir_cluster: u32) -> Result<()> {
        let raw = self.read_cluster_data(dir_cluster, self.dir_chain_bytes(dir_cluster)?, false)?;
        let mut i = 0;
        while i + ENTRY_SIZE <= raw.len() {
            if raw[i] == 0x00 {
                break;
            }
            if entry::clear_in_use(raw[i]) == entry::clear_in_use(TYPE_VOLUME_LABEL) {
                self.clear_entries_in_place(dir_cluster, i, 1)?;
                return Ok(());
            }
            i += ENTRY_SIZE;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MemoryBlockDevice;

    /// Hand-builds a minimal valid exFAT volume: 32 one-sector clusters, the
    /// root directory in cluster 2 (an allocation-bitmap entry plus a volume
    /// label), the bitmap itself in cluster 3. There is no exFAT formatter
    /// in this driver (spec.md only asks for mount/read/write), so tests
    /// construct the on-disk image directly.
    fn build_test_image() -> MemoryBlockDevice {
        const FAT_LBA: u64 = 8;
        const HEAP_LBA: u64 = 9;
        const ROOT_CLUSTER: u32 = 2;
        const BITMAP_CLUSTER: u32 = 3;
        const CLUSTER_COUNT: u32 = 32;

        let mut dev = MemoryBlockDevice::new(512, 80);

        {
            let raw = dev.raw_mut();
            let boot = &mut raw[0..512];
            boot[3..11].copy_from_slice(b"EXFAT   ");
            boot[80..84].copy_from_slice(&(FAT_LBA as u32).to_le_bytes());
            boot[88..92].copy_from_slice(&(HEAP_LBA as u32).to_le_bytes());
            boot[92..96].copy_from_slice(&CLUSTER_COUNT.to_le_bytes());
            boot[96..100].copy_from_slice(&ROOT_CLUSTER.to_le_bytes());
            boot[108] = 9; // bytes-per-sector shift: 2^9 = 512
            boot[109] = 0; // sectors-per-cluster shift: 2^0 = 1
            boot[510] = 0x55;
            boot[511] = 0xAA;
        }

        {
            let raw = dev.raw_mut();
            let fat = &mut raw[(FAT_LBA as usize) * 512..(FAT_LBA as usize + 1) * 512];
            fat[(ROOT_CLUSTER as usize) * 4..(ROOT_CLUSTER as usize) * 4 + 4].copy_from_slice(&FAT_EOC.to_le_bytes());
            fat[(BITMAP_CLUSTER as usize) * 4..(BITMAP_CLUSTER as usize) * 4 + 4].copy_from_slice(&FAT_EOC.to_le_bytes());
        }

        let bitmap_lba = HEAP_LBA + (BITMAP_CLUSTER - 2) as u64;
        {
            let raw = dev.raw_mut();
            let bitmap_sector = &mut raw[(bitmap_lba as usize) * 512..(bitmap_lba as usize + 1) * 512];
            bitmap_sector[0] = 0b0000_0011; // clusters 2 and 3 (root, bitmap) in use
        }

        let root_lba = HEAP_LBA + (ROOT_CLUSTER - 2) as u64;
        {
            let raw = dev.raw_mut();
            let root = &mut raw[(root_lba as usize) * 512..(root_lba as usize + 1) * 512];

            let mut bitmap_entry = [0u8; ENTRY_SIZE];
            bitmap_entry[0] = TYPE_ALLOCATION_BITMAP;
            bitmap_entry[1] = 0x00; // primary bitmap
            bitmap_entry[20..24].copy_from_slice(&BITMAP_CLUSTER.to_le_bytes());
            bitmap_entry[24..32].copy_from_slice(&4u64.to_le_bytes());
            root[0..32].copy_from_slice(&bitmap_entry);

            let label = "TESTVOL";
            let units: Vec<u16> = label.encode_utf16().collect();
            let mut label_entry = [0u8; ENTRY_SIZE];
            label_entry[0] = TYPE_VOLUME_LABEL;
            label_entry[1] = units.len() as u8;
            for (i, &u) in units.iter().enumerate() {
                label_entry[2 + i * 2..4 + i * 2].copy_from_slice(&u.to_le_bytes());
            }
            root[32..64].copy_from_slice(&label_entry);
        }

        dev
    }

    #[test]
    fn mount_reads_bitmap_and_label() {
        let dev = build_test_image();
        let vol = mount(dev).unwrap();
        assert_eq!(vol.label(), "TESTVOL");
        assert_eq!(vol.cluster_count, 32);
        // clusters 2 and 3 are pre-marked used; the rest are free.
        assert!(vol.bitmap_get(2));
        assert!(vol.bitmap_get(3));
        assert!(!vol.bitmap_get(4));
    }

    #[test]
    fn write_then_read_file_round_trips() {
        let dev = build_test_image();
        let mut vol = mount(dev).unwrap();
        vol.write_file("/hello.txt", b"hello exfat", Timestamp::FIXED_FALLBACK).unwrap();
        let data = vol.read_file("/hello.txt").unwrap();
        assert_eq!(data, b"hello exfat");
        let entries = vol.read_dir("/").unwrap();
        assert!(entries.iter().any(|e| e.name.eq_ignore_ascii_case("hello.txt") && !e.is_dir));
    }

    #[test]
    fn mkdir_then_write_nested_file() {
        let dev = build_test_image();
        let mut vol = mount(dev).unwrap();
        vol.mkdir("/docs").unwrap();
        assert!(vol.is_dir("/docs").unwrap());
        vol.write_file("/docs/a.txt", b"nested", Timestamp::FIXED_FALLBACK).unwrap();
        assert_eq!(vol.read_file("/docs/a.txt").unwrap(), b"nested");
    }

    #[test]
    fn delete_frees_the_cluster() {
        let dev = build_test_image();
        let mut vol = mount(dev).unwrap();
        vol.write_file("/gone.txt", b"bye", Timestamp::FIXED_FALLBACK).unwrap();
        let free_before = vol.free_space_bytes().unwrap();
        vol.delete("/gone.txt").unwrap();
        let free_after = vol.free_space_bytes().unwrap();
        assert!(free_after > free_before);
        assert!(!vol.exists("/gone.txt").unwrap());
    }

    #[test]
    fn create_delete_create_under_the_same_name() {
        let dev = build_test_image();
        let mut vol = mount(dev).unwrap();

        vol.write_file("/a.txt", b"hello\nthere", Timestamp::FIXED_FALLBACK).unwrap();
        assert_eq!(vol.read_file("/a.txt").unwrap(), b"hello\nthere");

        vol.delete("/a.txt").unwrap();
        assert!(!vol.exists("/a.txt").unwrap());

        vol.write_file("/a.txt", b"world", Timestamp::FIXED_FALLBACK).unwrap();
        assert_eq!(vol.read_file("/a.txt").unwrap(), b"world");
        assert!(vol.exists("/a.txt").unwrap());
    }

    #[test]
    fn rename_moves_the_entry() {
        let dev = build_test_image();
        let mut vol = mount(dev).unwrap();
        vol.write_file("/old.txt", b"data", Timestamp::FIXED_FALLBACK).unwrap();
        vol.rename("/old.txt", "/new.txt").unwrap();
        assert!(!vol.exists("/old.txt").unwrap());
        assert_eq!(vol.read_file("/new.txt").unwrap(), b"data");
    }

    #[test]
    fn overwrite_frees_the_previous_chain() {
        let dev = build_test_image();
        let mut vol = mount(dev).unwrap();
        vol.write_file("/f.txt", b"first", Timestamp::FIXED_FALLBACK).unwrap();
        vol.write_file("/f.txt", b"second version", Timestamp::FIXED_FALLBACK).unwrap();
        assert_eq!(vol.read_file("/f.txt").unwrap(), b"second version");
        let entries = vol.read_dir("/").unwrap();
        assert_eq!(entries.iter().filter(|e| e.name.eq_ignore_ascii_case("f.txt")).count(), 1);
    }

    #[test]
    fn set_label_replaces_the_existing_label() {
        let dev = build_test_image();
        let mut vol = mount(dev).unwrap();
        assert_eq!(vol.label(), "TESTVOL");
        vol.set_label("RENAMED").unwrap();
        assert_eq!(vol.label(), "RENAMED");

        let remounted = vol.into_device().unwrap();
        let vol = mount(remounted).unwrap();
        assert_eq!(vol.label(), "RENAMED");
    }
}
