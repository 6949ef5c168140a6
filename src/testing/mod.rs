//! In-memory [`platform::PlatformServices`](crate::platform::PlatformServices)
//! and [`platform::BlockDevice`](crate::platform::BlockDevice) implementations
//! used by unit and integration tests, standing in for real UEFI firmware the
//! way the teacher kernel's own `testing` module stood in for a QEMU-run test
//! harness — here the collaborator contract (spec §6.1) is implemented
//! entirely in `std`-backed memory instead of being executed at all.

extern crate std;

use alloc::vec;
use alloc::vec::Vec;
use std::collections::VecDeque;

use crate::error::{Error, Result};
use crate::platform::{
    BlockDevice, FramebufferInfo, PlatformServices, PoolFlavor, RawKey, ResetKind, Timestamp,
};

/// A whole volume's worth of sectors held in a `Vec<u8>`.
pub struct MemoryBlockDevice {
    sector_size: usize,
    sectors: Vec<u8>,
}

impl MemoryBlockDevice {
    pub fn new(sector_size: usize, sector_count: u64) -> Self {
        Self {
            sector_size,
            sectors: vec![0u8; sector_size * sector_count as usize],
        }
    }

    /// Direct access for test setup/assertions that bypass the device trait.
    pub fn raw(&self) -> &[u8] {
        &self.sectors
    }

    pub fn raw_mut(&mut self) -> &mut [u8] {
        &mut self.sectors
    }
}

impl BlockDevice for MemoryBlockDevice {
    fn sector_size(&self) -> usize {
        self.sector_size
    }

    fn sector_count(&self) -> u64 {
        (self.sectors.len() / self.sector_size) as u64
    }

    fn read(&mut self, lba: u64, buf: &mut [u8]) -> Result<()> {
        let start = lba as usize * self.sector_size;
        let end = start + buf.len();
        if end > self.sectors.len() || buf.len() % self.sector_size != 0 {
            return Err(Error::Io);
        }
        buf.copy_from_slice(&self.sectors[start..end]);
        Ok(())
    }

    fn write(&mut self, lba: u64, buf: &[u8]) -> Result<()> {
        let start = lba as usize * self.sector_size;
        let end = start + buf.len();
        if end > self.sectors.len() || buf.len() % self.sector_size != 0 {
            return Err(Error::Io);
        }
        self.sectors[start..end].copy_from_slice(buf);
        Ok(())
    }
}

/// A scripted platform: a `Vec<u32>` framebuffer, a queue of keystrokes fed
/// in up front, a fixed wall clock, and one [`MemoryBlockDevice`] as the
/// boot volume. `stall`/`reset` are recorded rather than acted on so tests
/// can assert on them.
pub struct MemoryPlatform {
    pub framebuffer: Vec<u32>,
    pub fb_width: u32,
    pub fb_height: u32,
    key_queue: VecDeque<RawKey>,
    pub clock: Option<Timestamp>,
    pub block: MemoryBlockDevice,
    pub removable: Option<MemoryBlockDevice>,
    pub stalled_micros: u64,
    pub reset_requested: Option<ResetKind>,
    pools: Vec<(*mut u8, core::alloc::Layout)>,
}

impl MemoryPlatform {
    pub fn new(fb_width: u32, fb_height: u32, block: MemoryBlockDevice) -> Self {
        Self {
            framebuffer: vec![0u32; (fb_width * fb_height) as usize],
            fb_width,
            fb_height,
            key_queue: VecDeque::new(),
            clock: Some(Timestamp::FIXED_FALLBACK),
            block,
            removable: None,
            stalled_micros: 0,
            reset_requested: None,
            pools: Vec::new(),
        }
    }

    /// Attaches a removable volume for a test to clone onto, mirroring a
    /// user plugging in a second drive before pressing F12.
    pub fn attach_removable(&mut self, block: MemoryBlockDevice) {
        self.removable = Some(block);
    }

    pub fn push_key(&mut self, key: RawKey) {
        self.key_queue.push_back(key);
    }

    pub fn push_ascii(&mut self, c: u8) {
        self.push_key(RawKey { scancode: 0, unicode: c as u16, modifiers: 0 });
    }
}

impl Drop for MemoryPlatform {
    fn drop(&mut self) {
        for (ptr, layout) in self.pools.drain(..) {
            // SAFETY: every entry in `pools` was allocated by `std::alloc::alloc`
            // with this exact layout in `allocate_pool`/`allocate_pages_below`.
            unsafe { std::alloc::dealloc(ptr, layout) };
        }
    }
}

impl PlatformServices for MemoryPlatform {
    type Block = MemoryBlockDevice;

    fn framebuffer(&self) -> FramebufferInfo {
        FramebufferInfo {
            base: self.framebuffer.as_ptr() as *mut u32,
            width: self.fb_width,
            height: self.fb_height,
            pixels_per_scanline: self.fb_width,
        }
    }

    unsafe fn put_pixel(&mut self, x: u32, y: u32, bgrx: u32) {
        let idx = (y * self.fb_width + x) as usize;
        if let Some(cell) = self.framebuffer.get_mut(idx) {
            *cell = bgrx;
        }
    }

    fn console_write_utf16(&mut self, _s: &[u16]) {}

    fn read_key(&mut self) -> Option<RawKey> {
        self.key_queue.pop_front()
    }

    fn wait_key(&mut self) -> RawKey {
        self.key_queue.pop_front().expect("MemoryPlatform: key queue exhausted")
    }

    fn boot_block_device(&mut self) -> &mut Self::Block {
        &mut self.block
    }

    fn take_removable_block_device(&mut self) -> Option<Self::Block> {
        self.removable.take()
    }

    fn allocate_pool(&mut self, size: usize, _flavor: PoolFlavor) -> Option<*mut u8> {
        let layout = core::alloc::Layout::from_size_align(size.max(1), 8).ok()?;
        // SAFETY: `layout` has nonzero size.
        let ptr = unsafe { std::alloc::alloc(layout) };
        if ptr.is_null() {
            return None;
        }
        self.pools.push((ptr, layout));
        Some(ptr)
    }

    fn free_pool(&mut self, ptr: *mut u8) {
        if let Some(pos) = self.pools.iter().position(|&(p, _)| p == ptr) {
            let (p, layout) = self.pools.swap_remove(pos);
            // SAFETY: `p`/`layout` match the earlier `alloc` call.
            unsafe { std::alloc::dealloc(p, layout) };
        }
    }

    fn allocate_pages_below(&mut self, _below_address: usize, page_count: usize) -> Option<*mut u8> {
        self.allocate_pool(page_count * 4096, PoolFlavor::Code)
    }

    fn wall_clock(&self) -> Option<Timestamp> {
        self.clock
    }

    fn stall(&mut self, micros: u64) {
        self.stalled_micros += micros;
    }

    fn reset(&mut self, kind: ResetKind) -> ! {
        panic!("MemoryPlatform::reset({:?}) called in test", kind);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn block_device_round_trips_a_sector() {
        let mut dev = MemoryBlockDevice::new(512, 16);
        let data = vec![0xABu8; 512];
        dev.write(3, &data).unwrap();
        let mut out = vec![0u8; 512];
        dev.read(3, &mut out).unwrap();
        assert_eq!(out, data);
    }

    #[test]
    fn pool_allocate_and_free_round_trip() {
        let dev = MemoryBlockDevice::new(512, 4);
        let mut platform = MemoryPlatform::new(4, 4, dev);
        let ptr = platform.allocate_pool(64, PoolFlavor::Data).unwrap();
        assert!(!ptr.is_null());
        platform.free_pool(ptr);
        assert!(platform.pools.is_empty());
    }
}
