//! Memory primitives (component B, spec §6.1/table row B): zero-initialised
//! byte/page allocation, fill/copy, and simple string helpers, layered over
//! the platform's pool allocator the same way `logging::KernelLogger`
//! layers over a registered debug-output function pointer rather than
//! reaching for a generic type parameter everywhere — the global allocator
//! the Rust compiler wants is a single concrete static, so the concrete
//! [`crate::platform::PlatformServices`] impl registers its pool-allocation
//! entry points here once, at startup, before any `alloc::*` type is used.
//!
//! This replaces the teacher's `allocator.rs`/`memory::heap` first-fit
//! arena: there all block bookkeeping lived in this crate because the
//! teacher owned physical memory directly. Here the platform firmware
//! already implements an allocator (UEFI `AllocatePool`); this module is a
//! thin, zero-initialising, single-threaded front door onto it.

use core::alloc::{GlobalAlloc, Layout};
use core::cell::UnsafeCell;
use core::ptr;
use core::sync::atomic::{AtomicBool, Ordering};

use crate::platform::PoolFlavor;

/// Raw, type-erased entry points into a concrete `PlatformServices` impl.
/// `ctx` is an opaque pointer to that impl; the two `unsafe fn`s are its
/// `allocate_pool`/`free_pool` methods, captured without a vtable since
/// `PlatformServices` is generic and `#[global_allocator]` must name a
/// concrete, non-generic type.
#[derive(Clone, Copy)]
struct PoolOps {
    ctx: *mut (),
    alloc: unsafe fn(*mut (), usize, PoolFlavor) -> Option<*mut u8>,
    free: unsafe fn(*mut (), *mut u8),
}

struct Registration {
    ops: UnsafeCell<Option<PoolOps>>,
}

// SAFETY: the workstation is single-threaded and cooperatively scheduled
// (spec §5); there is never concurrent access to `ops`.
unsafe impl Sync for Registration {}

static REGISTRATION: Registration = Registration { ops: UnsafeCell::new(None) };
static REGISTERED: AtomicBool = AtomicBool::new(false);

/// Register the platform's pool allocator. Must be called exactly once,
/// immediately after platform init and before any `alloc::*` type is
/// touched (spec §2 startup order: A initialises, then B).
///
/// # Safety
/// `platform` must outlive every subsequent allocation/free routed through
/// this module — in practice, the lifetime of the whole program.
pub unsafe fn register<P: crate::platform::PlatformServices>(platform: &mut P) {
    unsafe fn alloc_thunk<P: crate::platform::PlatformServices>(
        ctx: *mut (),
        size: usize,
        flavor: PoolFlavor,
    ) -> Option<*mut u8> {
        let platform = unsafe { &mut *ctx.cast::<P>() };
        platform.allocate_pool(size, flavor)
    }
    unsafe fn free_thunk<P: crate::platform::PlatformServices>(ctx: *mut (), ptr: *mut u8) {
        let platform = unsafe { &mut *ctx.cast::<P>() };
        platform.free_pool(ptr)
    }

    let ops = PoolOps {
        ctx: (platform as *mut P).cast::<()>(),
        alloc: alloc_thunk::<P>,
        free: free_thunk::<P>,
    };
    // SAFETY: single-threaded cooperative execution (spec §5); called once
    // before any other subsystem allocates.
    unsafe {
        *REGISTRATION.ops.get() = Some(ops);
    }
    REGISTERED.store(true, Ordering::Release);
}

pub fn is_registered() -> bool {
    REGISTERED.load(Ordering::Acquire)
}

fn ops() -> Option<PoolOps> {
    // SAFETY: single-threaded cooperative execution (spec §5).
    unsafe { *REGISTRATION.ops.get() }
}

/// Allocate `size` zero-initialised bytes from the platform's data pool.
pub fn alloc_zeroed_bytes(size: usize) -> Option<*mut u8> {
    let ops = ops()?;
    // SAFETY: `ops.ctx` was registered by `register` and outlives this call.
    let raw = unsafe { (ops.alloc)(ops.ctx, size, PoolFlavor::Data)? };
    // SAFETY: `raw` points to `size` freshly allocated, writable bytes.
    unsafe { ptr::write_bytes(raw, 0, size) };
    Some(raw)
}

/// Allocate `size` zero-initialised bytes from the platform's executable
/// pool (spec §6.1's "code" flavour — used for page-aligned regions that
/// must remain executable on firmware that marks ordinary pool pages NX).
pub fn alloc_zeroed_code_bytes(size: usize) -> Option<*mut u8> {
    let ops = ops()?;
    // SAFETY: `ops.ctx` was registered by `register` and outlives this call.
    let raw = unsafe { (ops.alloc)(ops.ctx, size, PoolFlavor::Code)? };
    // SAFETY: `raw` points to `size` freshly allocated, writable bytes.
    unsafe { ptr::write_bytes(raw, 0, size) };
    Some(raw)
}

/// Free a pointer previously returned by `alloc_zeroed_bytes` or
/// `alloc_zeroed_code_bytes`. No-op on a null pointer.
pub fn free_bytes(ptr: *mut u8) {
    if ptr.is_null() {
        return;
    }
    if let Some(ops) = ops() {
        // SAFETY: `ptr` was returned by a prior allocation through the same
        // registered platform, per this function's contract.
        unsafe { (ops.free)(ops.ctx, ptr) };
    }
}

/// Fill `dst` with `value`.
pub fn fill(dst: &mut [u8], value: u8) {
    // SAFETY: `dst` is a valid slice of its own length.
    unsafe { ptr::write_bytes(dst.as_mut_ptr(), value, dst.len()) };
}

/// Copy `min(dst.len(), src.len())` bytes from `src` into `dst`.
pub fn copy(dst: &mut [u8], src: &[u8]) -> usize {
    let n = dst.len().min(src.len());
    dst[..n].copy_from_slice(&src[..n]);
    n
}

/// Case-insensitive ASCII byte-string equality, used by path resolution
/// (FAT32 8.3 names, exFAT up-cased comparisons) instead of a `std`
/// locale-aware compare.
pub fn ascii_eq_ignore_case(a: &[u8], b: &[u8]) -> bool {
    a.len() == b.len() && a.iter().zip(b).all(|(&x, &y)| x.eq_ignore_ascii_case(&y))
}

/// The global allocator wired into the binary (`#[global_allocator]` in
/// `lib.rs`/`main.rs`, `cfg(not(test))`): every `alloc::*` type routes
/// through the registered platform pool allocator.
pub struct PoolAllocator;

// SAFETY: `alloc`/`dealloc` only ever run on the single cooperative thread
// (spec §5), and forward to a platform allocator that itself guarantees
// the alignment `alloc_zeroed_bytes` promises (≥8, per spec §6.1).
unsafe impl GlobalAlloc for PoolAllocator {
    unsafe fn alloc(&self, layout: Layout) -> *mut u8 {
        if layout.align() > 8 {
            return ptr::null_mut();
        }
        alloc_zeroed_bytes(layout.size().max(1)).unwrap_or(ptr::null_mut())
    }

    unsafe fn dealloc(&self, ptr: *mut u8, _layout: Layout) {
        free_bytes(ptr);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fill_and_copy() {
        let mut buf = [0u8; 8];
        fill(&mut buf, 0xAA);
        assert!(buf.iter().all(|&b| b == 0xAA));

        let src = [1u8, 2, 3];
        let n = copy(&mut buf, &src);
        assert_eq!(n, 3);
        assert_eq!(&buf[..3], &src[..]);
        assert_eq!(buf[3], 0xAA);
    }

    #[test]
    fn ascii_case_insensitive_compare() {
        assert!(ascii_eq_ignore_case(b"README.TXT", b"readme.txt"));
        assert!(!ascii_eq_ignore_case(b"README.TXT", b"readme.tx"));
    }
}
