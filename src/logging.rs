//! Central logging: a `log::Log` implementation that writes every record to
//! the platform's debug/serial output and keeps a bounded in-memory capture
//! ring, the way the teacher kernel's hand-rolled `logln`/capture-buffer
//! pair did — rebuilt on top of the `log` facade so every subsystem can just
//! `log::debug!`/`log::warn!` instead of importing a kernel-specific macro.

use core::cell::UnsafeCell;
use core::fmt::Write as _;
use core::sync::atomic::{AtomicBool, Ordering};

use log::{LevelFilter, Log, Metadata, Record};

const CAPTURE_BUF_SIZE: usize = 16 * 1024;
const LINE_BUF_SIZE: usize = 256;

struct CaptureState {
    enabled: bool,
    len: usize,
    overflow: bool,
    buf: [u8; CAPTURE_BUF_SIZE],
}

struct KernelLogger {
    capture: UnsafeCell<CaptureState>,
    debug_write: UnsafeCell<Option<fn(&str)>>,
}

// SAFETY: the workstation is single-threaded and cooperatively scheduled
// (spec §5); there is never concurrent access to `capture`/`debug_write`.
unsafe impl Sync for KernelLogger {}

static LOGGER: KernelLogger = KernelLogger {
    capture: UnsafeCell::new(CaptureState {
        enabled: false,
        len: 0,
        overflow: false,
        buf: [0; CAPTURE_BUF_SIZE],
    }),
    debug_write: UnsafeCell::new(None),
};

static INITIALIZED: AtomicBool = AtomicBool::new(false);

struct CaptureWriter<'a> {
    state: &'a mut CaptureState,
}

impl core::fmt::Write for CaptureWriter<'_> {
    fn write_str(&mut self, s: &str) -> core::fmt::Result {
        let bytes = s.as_bytes();
        let remaining = self.state.buf.len().saturating_sub(self.state.len);
        let n = remaining.min(bytes.len());
        if n > 0 {
            let start = self.state.len;
            self.state.buf[start..start + n].copy_from_slice(&bytes[..n]);
            self.state.len += n;
        }
        if n < bytes.len() {
            self.state.overflow = true;
        }
        Ok(())
    }
}

/// Fixed on-stack scratch buffer used to format one console line without an
/// allocation; lines longer than this are truncated, never buffer-overrun.
struct LineBuf {
    bytes: [u8; LINE_BUF_SIZE],
    len: usize,
}

impl core::fmt::Write for LineBuf {
    fn write_str(&mut self, s: &str) -> core::fmt::Result {
        let bytes = s.as_bytes();
        let remaining = self.bytes.len().saturating_sub(self.len);
        let n = remaining.min(bytes.len());
        self.bytes[self.len..self.len + n].copy_from_slice(&bytes[..n]);
        self.len += n;
        Ok(())
    }
}

impl LineBuf {
    fn as_str(&self) -> &str {
        core::str::from_utf8(&self.bytes[..self.len]).unwrap_or("")
    }
}

impl Log for KernelLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }

        // SAFETY: single-threaded cooperative execution (spec §5).
        if let Some(write_fn) = unsafe { *self.debug_write.get() } {
            let mut line = LineBuf { bytes: [0; LINE_BUF_SIZE], len: 0 };
            let _ = write!(line, "[{}] {}: {}\n", record.level(), record.target(), record.args());
            write_fn(line.as_str());
        }

        // SAFETY: single-threaded cooperative execution (spec §5).
        let state = unsafe { &mut *self.capture.get() };
        if state.enabled {
            let mut w = CaptureWriter { state };
            let _ = write!(w, "{}|{}\n", record.target(), record.args());
        }
    }

    fn flush(&self) {}
}

/// Install the global logger. `debug_write` is the platform's raw
/// debug-output sink (serial port, QEMU debug console, ...); passing `None`
/// disables the console path and keeps only the capture ring.
pub fn init(level: LevelFilter, debug_write: Option<fn(&str)>) {
    // SAFETY: called once from platform init, before any other subsystem logs.
    unsafe {
        *LOGGER.debug_write.get() = debug_write;
    }
    if !INITIALIZED.swap(true, Ordering::AcqRel) {
        // `set_logger` can only succeed once per process; a re-`init` call
        // (e.g. from a second test in the same binary) just updates the
        // sink/level set above instead of re-registering.
        let _ = log::set_logger(&LOGGER);
    }
    log::set_max_level(level);
}

/// Enable/disable capture and reset its contents.
pub fn set_capture_enabled(enabled: bool) {
    // SAFETY: single-threaded cooperative execution (spec §5).
    let state = unsafe { &mut *LOGGER.capture.get() };
    state.enabled = enabled;
    state.len = 0;
    state.overflow = false;
}

/// Call `on_line` for every captured line belonging to `target`, in order.
/// Returns `true` if the capture ring overflowed (some lines were dropped).
pub fn for_each_captured(target: &str, mut on_line: impl FnMut(&str)) -> bool {
    // SAFETY: single-threaded cooperative execution (spec §5).
    let state = unsafe { &*LOGGER.capture.get() };
    if state.len == 0 {
        return false;
    }
    let Ok(text) = core::str::from_utf8(&state.buf[..state.len]) else {
        return false;
    };
    for raw_line in text.split('\n') {
        if raw_line.is_empty() {
            continue;
        }
        if let Some((line_target, msg)) = raw_line.split_once('|') {
            if line_target == target {
                on_line(msg);
            }
        }
    }
    state.overflow
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capture_round_trips_one_target() {
        init(LevelFilter::Trace, None);
        set_capture_enabled(true);
        log::warn!(target: "fat32", "cluster {} out of range", 7);
        log::info!(target: "exfat", "mounted");

        let mut seen = alloc::vec::Vec::new();
        let overflow = for_each_captured("fat32", |line| seen.push(alloc::string::String::from(line)));
        assert!(!overflow);
        assert_eq!(seen.len(), 1);
        assert!(seen[0].contains("cluster 7"));
    }
}
