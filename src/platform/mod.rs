//! Platform services (component A, spec §6.1): the collaborator contract for
//! everything that needs real UEFI protocol bindings — framebuffer pixel
//! writes, keyboard scan codes, raw block I/O, wall clock, stall and reset.
//!
//! The UEFI bindings themselves are out of scope (spec §1): this module
//! defines the trait boundary the rest of the crate programs against, plus
//! the small value types that cross it. A conforming implementation lives
//! outside this crate (or, for tests, in [`crate::testing::MemoryPlatform`]).

pub mod keymap;

use crate::error::Result;

/// Pixel format the framebuffer query hands back; always 32-bit BGRX on the
/// firmware this workstation targets.
#[derive(Debug, Clone, Copy)]
pub struct FramebufferInfo {
    pub base: *mut u32,
    pub width: u32,
    pub height: u32,
    /// Pixels per scanline; may exceed `width` when the firmware pads rows.
    pub pixels_per_scanline: u32,
}

/// Modifier bitmask for [`keymap::KeyEvent`].
pub mod modifiers {
    pub const CTRL: u8 = 0x01;
    pub const ALT: u8 = 0x02;
    pub const SHIFT: u8 = 0x04;
}

/// One raw keystroke as handed back by the firmware's Simple Text Input
/// protocol: a scan code plus whatever Unicode character (if any) it
/// produced, and the modifier keys the firmware reports as currently held.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawKey {
    pub scancode: u16,
    pub unicode: u16,
    pub modifiers: u8,
}

/// Logical reset targets (spec §6.1).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResetKind {
    Shutdown,
    Cold,
    Warm,
}

/// Pool-allocation hint (spec §6.1): firmware that marks ordinary pool
/// memory non-executable needs `Code` allocations routed to a different
/// pool than heap/document data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoolFlavor {
    Data,
    Code,
}

/// A calendar timestamp (spec §6.1, used only for file create/modify times).
/// Writes that need a timestamp but run on firmware without a working clock
/// fall back to a fixed `2026-01-01` (spec §6.1), decided in `DESIGN.md`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timestamp {
    pub year: u16,
    pub month: u8,
    pub day: u8,
    pub hour: u8,
    pub minute: u8,
    pub second: u8,
}

impl Timestamp {
    /// The fallback used whenever the platform clock is unavailable.
    pub const FIXED_FALLBACK: Timestamp = Timestamp {
        year: 2026,
        month: 1,
        day: 1,
        hour: 0,
        minute: 0,
        second: 0,
    };
}

/// A single fixed-size logical block. Real geometry is 512 or 4096 bytes,
/// learned at mount (spec §3.1); `BLOCK_SIZE` here is the compile-time upper
/// bound the in-memory sector buffers are sized to.
pub const BLOCK_SIZE: usize = 4096;

/// Synchronous, block-aligned, fail-fast raw block I/O (spec §3.1). Exactly
/// one filesystem driver owns a given `BlockDevice` at a time; volume
/// switching (§4.9, §5) is an explicit handoff of ownership, not encoded in
/// this trait.
pub trait BlockDevice {
    /// Native sector size in bytes (512 or 4096), learned once at construction.
    fn sector_size(&self) -> usize;

    /// Total number of addressable sectors.
    fn sector_count(&self) -> u64;

    /// Read `buf.len() / sector_size()` whole sectors starting at `lba`.
    fn read(&mut self, lba: u64, buf: &mut [u8]) -> Result<()>;

    /// Write `buf.len() / sector_size()` whole sectors starting at `lba`.
    fn write(&mut self, lba: u64, buf: &[u8]) -> Result<()>;
}

/// The full platform contract (spec §6.1). One value implementing this
/// trait is constructed in the UEFI entry point and threaded by reference
/// to every component that needs it — never a singleton (spec §9).
pub trait PlatformServices {
    type Block: BlockDevice;

    fn framebuffer(&self) -> FramebufferInfo;

    /// Write one BGRX pixel. Bounds are the caller's responsibility — this
    /// is the innermost primitive the text renderer and image row-callbacks
    /// are built on.
    ///
    /// # Safety
    /// `x < framebuffer().width` and `y < framebuffer().height` must hold;
    /// violating this writes outside the mapped framebuffer region.
    unsafe fn put_pixel(&mut self, x: u32, y: u32, bgrx: u32);

    /// Emit a UTF-16LE, null-terminated string to the firmware's console
    /// text-output protocol. Used only for the handful of pre-framebuffer
    /// boot messages (spec §6.1); everything after boot draws pixels.
    fn console_write_utf16(&mut self, s: &[u16]);

    /// Non-blocking keyboard poll; `None` means no keystroke is queued.
    fn read_key(&mut self) -> Option<RawKey>;

    /// Block until a keystroke is available, then return it.
    fn wait_key(&mut self) -> RawKey;

    /// The boot volume's raw block device.
    fn boot_block_device(&mut self) -> &mut Self::Block;

    /// Hands ownership of the currently user-selected removable volume's
    /// block device to the caller, if one is attached, for mounting ahead of
    /// a clone (spec §4.9). `None` means no removable media is present, in
    /// which case the clone engine is simply unreachable. Takes the device
    /// by value, the same explicit ownership handoff `BlockDevice`'s own doc
    /// comment describes for volume switching generally.
    fn take_removable_block_device(&mut self) -> Option<Self::Block>;

    /// Allocate at least `size` bytes, zero-filled, aligned to at least 8
    /// (spec §6.1). Returns `None` on out-of-memory; never panics.
    fn allocate_pool(&mut self, size: usize, flavor: PoolFlavor) -> Option<*mut u8>;

    /// Reverse a prior `allocate_pool`. `ptr` must not be used afterwards.
    fn free_pool(&mut self, ptr: *mut u8);

    /// Grant page-granular blocks below `below_address`, for firmware that
    /// marks ordinary pool memory non-executable (spec §6.1).
    fn allocate_pages_below(&mut self, below_address: usize, page_count: usize) -> Option<*mut u8>;

    /// Current date/time, or `None` if the platform clock is unavailable.
    fn wall_clock(&self) -> Option<Timestamp>;

    /// Busy-wait at least `micros` microseconds.
    fn stall(&mut self, micros: u64);

    /// Does not return.
    fn reset(&mut self, kind: ResetKind) -> !;
}
