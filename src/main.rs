//! UEFI application entry point.
//!
//! Real UEFI protocol bindings (Simple Text Output, Graphics Output,
//! Simple File System/Block I/O, Boot Services memory map) are out of
//! scope here — this is the thin hand-off the spec describes: once a
//! concrete `PlatformServices` impl exists, the startup order is A
//! (platform init, done by the firmware loader before this runs) → B
//! (`memory::register`) → memory map published → D/E mount the boot
//! volume (`app::mount`) → F/text banner → L's browser loop (`app::App`).
//!
//! `survival_core` carries the `#[global_allocator]` and `#[panic_handler]`
//! for this binary (`#[cfg(not(test))]` in `lib.rs`), so neither is
//! redefined here.

#![no_std]
#![no_main]

extern crate survival_core;

use survival_core::app;
use survival_core::config::Config;
use survival_core::platform::PlatformServices;

/// Drives the boot sequence once the firmware hand-off has produced a
/// concrete `PlatformServices` impl `P`, its boot volume has been taken by
/// value for mounting, and the boot-option string (if any) has been read
/// from the firmware's load options. Generic so it can be exercised against
/// `survival_core::testing::MemoryPlatform` without a real UEFI target.
#[allow(dead_code)]
fn boot<P: PlatformServices>(mut platform: P, boot_device: P::Block, boot_options: &str) -> ! {
    let config = Config::from_boot_options(boot_options);
    survival_core::logging::init(config.log_level, None);

    // SAFETY: called once, before any `alloc::*` type is touched, per
    // `memory::register`'s contract.
    unsafe { survival_core::memory::register(&mut platform) };

    let mut fs = match app::mount(boot_device) {
        Ok(fs) => fs,
        Err(_) => loop {
            core::hint::spin_loop();
        },
    };

    let fb = platform.framebuffer();
    let visible_rows = (fb.height / survival_core::text::GLYPH_HEIGHT).saturating_sub(1) as usize;
    let mut app = match app::App::new(&mut fs, false, visible_rows.max(1), config) {
        Ok(app) => app,
        Err(_) => loop {
            core::hint::spin_loop();
        },
    };

    loop {
        let raw = platform.wait_key();
        let ev = survival_core::platform::keymap::cua_remap(survival_core::platform::keymap::translate(raw));
        app.handle_key(ev, &mut platform, &mut fs);
    }
}

#[unsafe(no_mangle)]
pub extern "C" fn _start() -> ! {
    // The real UEFI entry point (`efi_main(image_handle, system_table)`)
    // constructs the concrete `PlatformServices` impl and its boot block
    // device from the firmware's protocols and hands them to `boot` above;
    // that binding is the out-of-scope part (see module doc).
    loop {
        core::hint::spin_loop();
    }
}
