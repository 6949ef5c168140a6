//! FAT32 driver (component D, spec §4.2): format, mount, directory
//! iteration with VFAT long names, streaming writes, and free-space query.
//! Built on the [`crate::block::BlockCache`] (component C).

mod entry;

use alloc::string::String;
use alloc::vec;
use alloc::vec::Vec;

use crate::block::BlockCache;
use crate::error::{Error, Result};
use crate::fs::{attr, DirEntry, Filesystem};
use crate::platform::{BlockDevice, Timestamp};

use entry::{LfnAccumulator, ShortEntry, DELETED_MARK, END_MARK, ENTRY_SIZE, LFN_ATTR};

const RESERVED_SECTORS: u32 = 32;
const FSINFO_SECTOR: u32 = 1;
const BACKUP_BOOT_SECTOR: u32 = 6;
const FAT_EOC: u32 = 0x0FFF_FFFF;
const FAT_BAD: u32 = 0x0FFF_FFF7;
const FAT_ENTRY_MASK: u32 = 0x0FFF_FFFF;
const MIN_FAT32_CLUSTERS: u32 = 65525;

pub struct Fat32Volume<B: BlockDevice> {
    cache: BlockCache<B>,
    bytes_per_sector: u32,
    sectors_per_cluster: u32,
    fat_start_lba: u64,
    fat_size_sectors: u32,
    num_fats: u32,
    data_start_lba: u64,
    root_cluster: u32,
    total_clusters: u32,
    label: String,
    free_clusters_cache: Option<u32>,
    stream_open: bool,
}

impl<B: BlockDevice> Fat32Volume<B> {
    /// Flushes and hands the raw device back, for the unmount side of an
    /// unmount-remount cycle (spec §8's FAT32 round-trip property).
    pub fn into_device(self) -> Result<B> {
        self.cache.into_device()
    }

    fn cluster_to_lba(&self, cluster: u32) -> u64 {
        self.data_start_lba + ((cluster as u64 - 2) * self.sectors_per_cluster as u64)
    }

    fn sectors_per_cluster(&self) -> u64 {
        self.sectors_per_cluster as u64
    }

    fn fat_entry_location(&self, cluster: u32) -> (u64, usize) {
        let byte_offset = cluster as u64 * 4;
        let sector = self.fat_start_lba + byte_offset / self.bytes_per_sector as u64;
        let offset = (byte_offset % self.bytes_per_sector as u64) as usize;
        (sector, offset)
    }

    fn read_fat_entry(&mut self, cluster: u32) -> Result<u32> {
        let (sector, offset) = self.fat_entry_location(cluster);
        let buf = self.cache.read(sector)?;
        Ok(u32::from_le_bytes(buf[offset..offset + 4].try_into().unwrap()) & FAT_ENTRY_MASK)
    }

    fn write_fat_entry(&mut self, cluster: u32, value: u32) -> Result<()> {
        for fat_idx in 0..self.num_fats {
            let (sector, offset) = self.fat_entry_location(cluster);
            let sector = sector + fat_idx as u64 * self.fat_size_sectors as u64;
            let buf = self.cache.read_mut(sector)?;
            let existing = u32::from_le_bytes(buf[offset..offset + 4].try_into().unwrap());
            let preserved_high = existing & !FAT_ENTRY_MASK;
            buf[offset..offset + 4].copy_from_slice(&((value & FAT_ENTRY_MASK) | preserved_high).to_le_bytes());
            self.cache.mark_dirty(sector)?;
        }
        self.free_clusters_cache = None;
        Ok(())
    }

    fn alloc_cluster_chain(&mut self, count: u32) -> Result<Vec<u32>> {
        if count == 0 {
            return Ok(Vec::new());
        }
        let mut found = Vec::with_capacity(count as usize);
        let mut cluster = 2u32;
        while (found.len() as u32) < count && cluster < self.total_clusters + 2 {
            if self.read_fat_entry(cluster)? == 0 {
                found.push(cluster);
            }
            cluster += 1;
        }
        if (found.len() as u32) < count {
            log::warn!(target: "fat32", "alloc_cluster_chain: insufficient space for {count} clusters");
            return Err(Error::InsufficientSpace);
        }
        for w in found.windows(2) {
            self.write_fat_entry(w[0], w[1])?;
        }
        self.write_fat_entry(*found.last().unwrap(), FAT_EOC)?;
        self.cache.flush_all()?;
        log::trace!(target: "fat32", "allocated {} clusters starting at {}", found.len(), found[0]);
        Ok(found)
    }

    fn free_cluster_chain(&mut self, start: u32) -> Result<()> {
        let mut cluster = start;
        while cluster >= 2 && cluster < FAT_BAD {
            let next = self.read_fat_entry(cluster)?;
            self.write_fat_entry(cluster, 0)?;
            if next >= FAT_EOC {
                break;
            }
            cluster = next;
        }
        self.cache.flush_all()
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

    /// Reads a whole cluster chain's data, up to `size` bytes.
    fn read_chain(&mut self, start: u32, size: u32) -> Result<Vec<u8>> {
        let mut out = Vec::with_capacity(size as usize);
        let mut cluster = start;
        while (out.len() as u32) < size && cluster >= 2 && cluster < FAT_BAD {
            let lba = self.cluster_to_lba(cluster);
            for i in 0..self.sectors_per_cluster() {
                let buf = self.cache.read(lba + i)?;
                let remaining = size as usize - out.len();
                let n = remaining.min(buf.len());
                out.extend_from_slice(&buf[..n]);
                if out.len() as u32 >= size {
                    break;
                }
            }
            cluster = self.read_fat_entry(cluster)?;
        }
        Ok(out)
    }

    /// Streaming write: allocates the full chain up front, then flushes the
    /// caller's bytes sector-by-sector, zero-padding the final partial
    /// sector (spec §4.2).
    fn write_chain(&mut self, data: &[u8]) -> Result<u32> {
        if self.stream_open {
            return Err(Error::InvalidState);
        }
        self.stream_open = true;
        let sector_size = self.cache.sector_size() as u32;
        let cluster_bytes = sector_size * self.sectors_per_cluster as u32;
        let clusters_needed = if data.is_empty() {
            0
        } else {
            data.len().div_ceil(cluster_bytes as usize) as u32
        };

        let chain = if clusters_needed > 0 {
            self.alloc_cluster_chain(clusters_needed)?
        } else {
            Vec::new()
        };

        let mut written = 0usize;
        for &cluster in &chain {
            let lba = self.cluster_to_lba(cluster);
            for i in 0..self.sectors_per_cluster() {
                let mut sector_buf = vec![0u8; sector_size as usize];
                let remaining = data.len() - written;
                let n = remaining.min(sector_size as usize);
                sector_buf[..n].copy_from_slice(&data[written..written + n]);
                written += n;
                let buf = self.cache.read_mut(lba + i)?;
                buf[..sector_size as usize].copy_from_slice(&sector_buf);
                self.cache.mark_dirty(lba + i)?;
            }
        }
        self.cache.flush_all()?;
        self.stream_open = false;
        Ok(chain.first().copied().unwrap_or(0))
    }

    fn resolve_dir_cluster(&mut self, path_components: &[&str]) -> Result<u32> {
        let mut cluster = self.root_cluster;
        for &name in path_components {
            let entries = self.read_dir_raw(cluster)?;
            let hit = entries
                .into_iter()
                .find(|(e, _)| crate::memory::ascii_eq_ignore_case(e.name.as_bytes(), name.as_bytes()))
                .ok_or(Error::NotFound)?;
            if !hit.0.is_dir {
                return Err(Error::NotFound);
            }
            cluster = hit.1;
        }
        Ok(cluster)
    }

    /// Reads every live entry of a directory cluster chain, pairing the
    /// resolved [`DirEntry`] with its first-cluster number.
    fn read_dir_raw(&mut self, dir_cluster: u32) -> Result<Vec<(DirEntry, u32)>> {
        let mut out = Vec::new();
        let mut accumulator = LfnAccumulator::default();
        let mut cluster = dir_cluster;
        'outer: while cluster >= 2 && cluster < FAT_BAD {
            let lba = self.cluster_to_lba(cluster);
            for i in 0..self.sectors_per_cluster() {
                let sector_size = self.cache.sector_size();
                let buf = self.cache.read(lba + i)?.to_vec();
                for chunk in buf.chunks(ENTRY_SIZE) {
                    if chunk.len() < ENTRY_SIZE {
                        continue;
                    }
                    if chunk[0] == END_MARK {
                        break 'outer;
                    }
                    if chunk[0] == DELETED_MARK {
                        continue;
                    }
                    if chunk[11] == LFN_ATTR {
                        accumulator.push(chunk);
                        continue;
                    }
                    let short = ShortEntry::decode(chunk);
                    let long_name = accumulator.finish(&short);
                    if short.attributes & attr::VOLUME_ID != 0 {
                        continue;
                    }
                    let name = long_name.unwrap_or_else(|| short.display_name());
                    if name == "." || name == ".." {
                        continue;
                    }
                    out.push((
                        DirEntry {
                            name,
                            is_dir: entry::is_directory(short.attributes),
                            size: short.size as u64,
                            attributes: short.attributes,
                        },
                        short.first_cluster,
                    ));
                }
                let _ = sector_size;
            }
            cluster = self.read_fat_entry(cluster)?;
        }
        Ok(out)
    }

    /// Appends a raw entry set to a directory's cluster chain, growing the
    /// chain by one cluster if no run of free slots is long enough.
    fn append_entry_set(&mut self, dir_cluster: u32, entries: &[[u8; ENTRY_SIZE]]) -> Result<()> {
        let mut cluster = dir_cluster;
        let needed = entries.len();
        loop {
            let lba = self.cluster_to_lba(cluster);
            let slots_per_sector = self.cache.sector_size() / ENTRY_SIZE;
            let total_slots = slots_per_sector * self.sectors_per_cluster() as usize;
            let mut free_run_start: Option<usize> = None;
            let mut run_len = 0usize;

            for slot in 0..total_slots {
                let sector_idx = slot / slots_per_sector;
                let in_sector = slot % slots_per_sector;
                let buf = self.cache.read(lba + sector_idx as u64)?;
                let off = in_sector * ENTRY_SIZE;
                let lead = buf[off];
                let is_free = lead == END_MARK || lead == DELETED_MARK;
                if is_free {
                    if free_run_start.is_none() {
                        free_run_start = Some(slot);
                    }
                    run_len += 1;
                    if run_len >= needed {
                        break;
                    }
                } else {
                    free_run_start = None;
                    run_len = 0;
                }
            }

            if let Some(start) = free_run_start {
                if run_len >= needed {
                    for (i, raw) in entries.iter().enumerate() {
                        let slot = start + i;
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
                let new_chain = self.alloc_cluster_chain(1)?;
                let new_cluster = new_chain[0];
                self.write_fat_entry(cluster, new_cluster)?;
                self.zero_cluster(new_cluster)?;
                cluster = new_cluster;
            } else {
                cluster = next;
            }
        }
    }

    fn mark_entry_deleted(&mut self, dir_cluster: u32, name: &str) -> Result<(u32, u32)> {
        let mut cluster = dir_cluster;
        let mut accumulator = LfnAccumulator::default();
        let mut pending: Vec<(u64, usize)> = Vec::new();

        while cluster >= 2 && cluster < FAT_BAD {
            let lba = self.cluster_to_lba(cluster);
            let slots_per_sector = self.cache.sector_size() / ENTRY_SIZE;
            for sector_idx in 0..self.sectors_per_cluster() {
                let sector_lba = lba + sector_idx;
                let buf = self.cache.read(sector_lba)?.to_vec();
                for (slot, chunk) in buf.chunks(ENTRY_SIZE).enumerate() {
                    if chunk.len() < ENTRY_SIZE || chunk[0] == END_MARK {
                        continue;
                    }
                    if chunk[0] == DELETED_MARK {
                        pending.clear();
                        continue;
                    }
                    if chunk[11] == LFN_ATTR {
                        accumulator.push(chunk);
                        pending.push((sector_lba, slot));
                        continue;
                    }
                    let short = ShortEntry::decode(chunk);
                    pending.push((sector_lba, slot));
                    let long_name = accumulator.finish(&short);
                    let entry_name = long_name.unwrap_or_else(|| short.display_name());
                    if crate::memory::ascii_eq_ignore_case(entry_name.as_bytes(), name.as_bytes()) {
                        for &(s_lba, s_slot) in &pending {
                            let off = (s_slot % slots_per_sector) * ENTRY_SIZE;
                            let buf = self.cache.read_mut(s_lba)?;
                            buf[off] = DELETED_MARK;
                            self.cache.mark_dirty(s_lba)?;
                        }
                        self.cache.flush_all()?;
                        return Ok((short.first_cluster, short.size));
                    }
                    pending.clear();
                }
            }
            cluster = self.read_fat_entry(cluster)?;
        }
        Err(Error::NotFound)
    }
}

/// Formats fresh media with a valid FAT32 layout (spec §4.2): two FAT
/// copies, a 32-sector reserved region (BPB + backup BPB + FSInfo), and a
/// zeroed root directory cluster carrying one volume-label entry.
pub fn format<B: BlockDevice>(
    mut device: B,
    partition_sectors: u64,
    label: &str,
    mut progress: impl FnMut(u64, u64),
) -> Result<Fat32Volume<B>> {
    log::debug!(target: "fat32", "format: {partition_sectors} sectors, label '{label}'");
    let bytes_per_sector = device.sector_size() as u32;
    let sectors_per_cluster = choose_sectors_per_cluster(partition_sectors, bytes_per_sector);

    let data_sectors_estimate = partition_sectors - RESERVED_SECTORS as u64;
    let approx_clusters = data_sectors_estimate / sectors_per_cluster as u64;
    let fat_size_sectors = fat_size_for(approx_clusters as u32, bytes_per_sector);

    let fat_start = RESERVED_SECTORS as u64;
    let num_fats = 2u32;
    let data_start = fat_start + num_fats as u64 * fat_size_sectors as u64;
    let total_clusters = ((partition_sectors - data_start) / sectors_per_cluster as u64) as u32;

    let total_sectors_to_zero = RESERVED_SECTORS as u64 + num_fats as u64 * fat_size_sectors as u64;
    for sector in 0..total_sectors_to_zero {
        let zero = vec![0u8; bytes_per_sector as usize];
        device.write(sector, &zero)?;
        progress(sector + 1, total_sectors_to_zero);
    }

    write_bpb(&mut device, bytes_per_sector, sectors_per_cluster, fat_size_sectors, partition_sectors)?;
    {
        let backup = read_sector(&mut device, 0, bytes_per_sector)?;
        device.write(BACKUP_BOOT_SECTOR as u64, &backup)?;
    }
    write_fsinfo(&mut device, bytes_per_sector, total_clusters)?;

    let root_cluster = 2u32;
    let mut cache = BlockCache::new(device);
    for fat_idx in 0..num_fats {
        let base = fat_start + fat_idx as u64 * fat_size_sectors as u64;
        set_fat_u32(&mut cache, base, bytes_per_sector, 0, 0x0FFF_FFF8)?;
        set_fat_u32(&mut cache, base, bytes_per_sector, 1, 0x0FFF_FFFF)?;
        set_fat_u32(&mut cache, base, bytes_per_sector, 2, FAT_EOC)?;
    }
    cache.flush_all()?;

    let mut vol = Fat32Volume {
        cache,
        bytes_per_sector,
        sectors_per_cluster,
        fat_start_lba: fat_start,
        fat_size_sectors,
        num_fats,
        data_start_lba: data_start,
        root_cluster,
        total_clusters,
        label: String::new(),
        free_clusters_cache: None,
        stream_open: false,
    };
    vol.zero_cluster(root_cluster)?;
    vol.set_label(label)?;
    Ok(vol)
}

impl<B: BlockDevice> Fat32Volume<B> {
    fn set_label(&mut self, label: &str) -> Result<()> {
        let mut name11 = [b' '; 11];
        for (i, c) in label.bytes().take(11).enumerate() {
            name11[i] = c.to_ascii_uppercase();
        }
        let short = ShortEntry { name_11: name11, attributes: attr::VOLUME_ID, first_cluster: 0, size: 0, nt_reserved: 0 };
        self.append_entry_set(self.root_cluster, &[short.encode()])?;
        self.label = label.into();
        Ok(())
    }
}

fn choose_sectors_per_cluster(partition_sectors: u64, bytes_per_sector: u32) -> u32 {
    let _ = bytes_per_sector;
    let data_sectors = partition_sectors.saturating_sub(RESERVED_SECTORS as u64);
    // Smallest cluster size (largest cluster count) comes first; pick the
    // largest `spc` that still leaves cluster count >= the FAT32 floor
    // (spec §4.2), so clusters stay as small as the volume allows.
    let mut chosen = 1u32;
    for spc in [1u32, 2, 4, 8, 16, 32, 64, 128] {
        let clusters = data_sectors / spc as u64;
        if clusters >= MIN_FAT32_CLUSTERS as u64 {
            chosen = spc;
        } else {
            break;
        }
    }
    chosen
}

fn fat_size_for(clusters: u32, bytes_per_sector: u32) -> u32 {
    let bytes_needed = (clusters as u64 + 2) * 4;
    bytes_needed.div_ceil(bytes_per_sector as u64) as u32
}

fn read_sector<B: BlockDevice>(device: &mut B, lba: u64, sector_size: u32) -> Result<Vec<u8>> {
    let mut buf = vec![0u8; sector_size as usize];
    device.read(lba, &mut buf)?;
    Ok(buf)
}

fn write_bpb<B: BlockDevice>(
    device: &mut B,
    bytes_per_sector: u32,
    sectors_per_cluster: u32,
    fat_size_sectors: u32,
    total_sectors: u64,
) -> Result<()> {
    let mut sector = vec![0u8; bytes_per_sector as usize];
    sector[11..13].copy_from_slice(&(bytes_per_sector as u16).to_le_bytes());
    sector[13] = sectors_per_cluster as u8;
    sector[14..16].copy_from_slice(&(RESERVED_SECTORS as u16).to_le_bytes());
    sector[16] = 2; // number of FATs
    sector[21] = 0xF8; // media descriptor, fixed disk
    sector[36..40].copy_from_slice(&fat_size_sectors.to_le_bytes());
    sector[44..48].copy_from_slice(&2u32.to_le_bytes()); // root cluster
    sector[48..50].copy_from_slice(&(FSINFO_SECTOR as u16).to_le_bytes());
    sector[50..52].copy_from_slice(&(BACKUP_BOOT_SECTOR as u16).to_le_bytes());
    if total_sectors <= u32::MAX as u64 {
        sector[32..36].copy_from_slice(&(total_sectors as u32).to_le_bytes());
    } else {
        return Err(Error::InvalidFormat);
    }
    sector[510..512].copy_from_slice(&0xAA55u16.to_le_bytes());
    device.write(0, &sector)
}

fn write_fsinfo<B: BlockDevice>(device: &mut B, bytes_per_sector: u32, total_clusters: u32) -> Result<()> {
    let mut sector = vec![0u8; bytes_per_sector as usize];
    sector[0..4].copy_from_slice(&0x4161_5252u32.to_le_bytes());
    sector[484..488].copy_from_slice(&0x6172_7272u32.to_le_bytes());
    sector[488..492].copy_from_slice(&(total_clusters.saturating_sub(1)).to_le_bytes());
    sector[492..496].copy_from_slice(&3u32.to_le_bytes()); // next free hint
    sector[508..512].copy_from_slice(&0xAA55_0000u32.to_le_bytes());
    device.write(FSINFO_SECTOR as u64, &sector)
}

fn set_fat_u32<B: BlockDevice>(
    cache: &mut BlockCache<B>,
    fat_base_lba: u64,
    bytes_per_sector: u32,
    index: u32,
    value: u32,
) -> Result<()> {
    let byte_offset = index as u64 * 4;
    let sector = fat_base_lba + byte_offset / bytes_per_sector as u64;
    let offset = (byte_offset % bytes_per_sector as u64) as usize;
    let buf = cache.read_mut(sector)?;
    buf[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
    cache.mark_dirty(sector)
}

/// Mounts an existing FAT32 volume, deriving geometry from the BPB.
pub fn mount<B: BlockDevice>(mut device: B) -> Result<Fat32Volume<B>> {
    log::trace!(target: "fat32", "mount: reading boot sector");
    let bytes_per_sector = device.sector_size() as u32;
    let boot = read_sector(&mut device, 0, bytes_per_sector)?;
    if u16::from_le_bytes(boot[510..512].try_into().unwrap()) != 0xAA55 {
        log::warn!(target: "fat32", "mount: missing boot-sector signature");
        return Err(Error::InvalidFormat);
    }
    let sectors_per_cluster = boot[13] as u32;
    let reserved_sectors = u16::from_le_bytes(boot[14..16].try_into().unwrap()) as u32;
    let num_fats = boot[16] as u32;
    let fat_size_sectors = u32::from_le_bytes(boot[36..40].try_into().unwrap());
    let root_cluster = u32::from_le_bytes(boot[44..48].try_into().unwrap());
    let total_sectors = u32::from_le_bytes(boot[32..36].try_into().unwrap()) as u64;

    let fat_start_lba = reserved_sectors as u64;
    let data_start_lba = fat_start_lba + num_fats as u64 * fat_size_sectors as u64;
    let total_clusters = ((total_sectors - data_start_lba) / sectors_per_cluster as u64) as u32;

    let mut vol = Fat32Volume {
        cache: BlockCache::new(device),
        bytes_per_sector,
        sectors_per_cluster,
        fat_start_lba,
        fat_size_sectors,
        num_fats,
        data_start_lba,
        root_cluster,
        total_clusters,
        label: String::new(),
        free_clusters_cache: None,
        stream_open: false,
    };

    let root_entries = vol.read_dir_raw(root_cluster).unwrap_or_default();
    let _ = root_entries; // label is read separately below via raw scan
    vol.label = scan_label(&mut vol)?;
    log::debug!(target: "fat32", "mounted volume '{}', {} clusters", vol.label, vol.total_clusters);
    Ok(vol)
}

fn scan_label<B: BlockDevice>(vol: &mut Fat32Volume<B>) -> Result<String> {
    let lba = vol.cluster_to_lba(vol.root_cluster);
    for i in 0..vol.sectors_per_cluster() {
        let buf = vol.cache.read(lba + i)?.to_vec();
        for chunk in buf.chunks(ENTRY_SIZE) {
            if chunk.len() < ENTRY_SIZE || chunk[0] == END_MARK {
                continue;
            }
            if chunk[11] & attr::VOLUME_ID != 0 && chunk[11] != LFN_ATTR {
                let short = ShortEntry::decode(chunk);
                return Ok(short.display_name());
            }
        }
    }
    Ok(String::new())
}

impl<B: BlockDevice> Filesystem for Fat32Volume<B> {
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
            return Ok(()); // idempotent mkdir (spec §4.9 clone engine)
        }

        let new_cluster = self.alloc_cluster_chain(1)?[0];
        self.zero_cluster(new_cluster)?;

        let short = ShortEntry {
            name_11: entry::make_short_name(name),
            attributes: attr::DIRECTORY,
            first_cluster: new_cluster,
            size: 0,
            nt_reserved: 0,
        };
        let set = entry::build_entry_set(name, short);
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
        let (entry, cluster) = self
            .read_dir_raw(parent)?
            .into_iter()
            .find(|(e, _)| e.name.eq_ignore_ascii_case(name))
            .ok_or(Error::NotFound)?;
        if entry.is_dir {
            return Err(Error::InvalidState);
        }
        if entry.size == 0 {
            return Ok(Vec::new());
        }
        self.read_chain(cluster, entry.size as u32)
    }

    fn write_file(&mut self, path: &str, data: &[u8], _timestamp: Timestamp) -> Result<()> {
        let mut components = crate::fs::split_path(path);
        let name = components.pop().ok_or(Error::InvalidState)?;
        let parent = self.resolve_dir_cluster(&components)?;

        if let Ok((old_cluster, _)) = self.mark_entry_deleted(parent, name) {
            if old_cluster >= 2 {
                self.free_cluster_chain(old_cluster)?;
            }
        }

        let first_cluster = self.write_chain(data)?;
        let short = ShortEntry {
            name_11: entry::make_short_name(name),
            attributes: attr::ARCHIVE,
            first_cluster,
            size: data.len() as u32,
            nt_reserved: 0,
        };
        let set = entry::build_entry_set(name, short);
        self.append_entry_set(parent, &set)
    }

    fn delete(&mut self, path: &str) -> Result<()> {
        let mut components = crate::fs::split_path(path);
        let name = components.pop().ok_or(Error::NotFound)?;
        let parent = self.resolve_dir_cluster(&components)?;
        let (cluster, _size) = self.mark_entry_deleted(parent, name)?;
        if cluster >= 2 {
            self.free_cluster_chain(cluster)?;
        }
        Ok(())
    }

    fn rename(&mut self, from: &str, to: &str) -> Result<()> {
        let mut from_components = crate::fs::split_path(from);
        let from_name = from_components.pop().ok_or(Error::NotFound)?;
        let parent = self.resolve_dir_cluster(&from_components)?;
        let (entry, cluster) = self
            .read_dir_raw(parent)?
            .into_iter()
            .find(|(e, _)| e.name.eq_ignore_ascii_case(from_name))
            .ok_or(Error::NotFound)?;

        self.mark_entry_deleted(parent, from_name)?;

        let mut to_components = crate::fs::split_path(to);
        let to_name = to_components.pop().ok_or(Error::InvalidState)?;
        let dst_parent = self.resolve_dir_cluster(&to_components)?;
        let short = ShortEntry {
            name_11: entry::make_short_name(to_name),
            attributes: entry.attributes,
            first_cluster: cluster,
            size: entry.size as u32,
            nt_reserved: 0,
        };
        let set = entry::build_entry_set(to_name, short);
        self.append_entry_set(dst_parent, &set)
    }

    fn free_space_bytes(&mut self) -> Result<u64> {
        if let Some(cached) = self.free_clusters_cache {
            return Ok(cached as u64 * self.sectors_per_cluster as u64 * self.bytes_per_sector as u64);
        }
        let mut free = 0u32;
        for cluster in 2..(self.total_clusters + 2) {
            if self.read_fat_entry(cluster)? == 0 {
                free += 1;
            }
        }
        self.free_clusters_cache = Some(free);
        Ok(free as u64 * self.sectors_per_cluster as u64 * self.bytes_per_sector as u64)
    }

    fn label(&self) -> &str {
        &self.label
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MemoryBlockDevice;

    fn formatted() -> Fat32Volume<MemoryBlockDevice> {
        let device = MemoryBlockDevice::new(512, 524288);
        format(device, 524288, "SURVIVAL", |_, _| {}).unwrap()
    }

    #[test]
    fn format_then_mkdir_then_write_then_read() {
        let mut vol = formatted();
        vol.mkdir("/src").unwrap();
        vol.write_file("/src/hello.c", b"int main(){}", Timestamp::FIXED_FALLBACK).unwrap();

        let entries = vol.read_dir("/src").unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].name, "hello.c");
        assert_eq!(entries[0].size, 12);

        let data = vol.read_file("/src/hello.c").unwrap();
        assert_eq!(data, b"int main(){}");
    }

    #[test]
    fn long_name_round_trips() {
        let mut vol = formatted();
        vol.write_file("/a_long_descriptive_name.txt", b"hi", Timestamp::FIXED_FALLBACK).unwrap();
        let entries = vol.read_dir("/").unwrap();
        assert!(entries.iter().any(|e| e.name == "a_long_descriptive_name.txt"));
    }

    #[test]
    fn mkdir_is_idempotent() {
        let mut vol = formatted();
        vol.mkdir("/dir").unwrap();
        vol.mkdir("/dir").unwrap();
        let entries = vol.read_dir("/").unwrap();
        assert_eq!(entries.iter().filter(|e| e.name == "dir").count(), 1);
    }

    #[test]
    fn delete_then_free_space_recovers() {
        let mut vol = formatted();
        vol.write_file("/a.txt", &[1u8; 5000], Timestamp::FIXED_FALLBACK).unwrap();
        let before = vol.free_space_bytes().unwrap();
        vol.delete("/a.txt").unwrap();
        let after = vol.free_space_bytes().unwrap();
        assert!(after > before);
    }

    #[test]
    fn mount_after_format_recovers_label() {
        let device = MemoryBlockDevice::new(512, 524288);
        let vol = format(device, 524288, "SURVIVAL", |_, _| {}).unwrap();
        // Detach the device to remount, simulating a reboot.
        let raw_sectors = vol.cache.device();
        let mut cloned = MemoryBlockDevice::new(512, 524288);
        cloned.raw_mut().copy_from_slice(raw_sectors.raw());
        let remounted = mount(cloned).unwrap();
        assert_eq!(remounted.label(), "SURVIVAL");
    }
}
