//! Top-level wiring (spec §2 startup order, §4.8): mounts whichever
//! filesystem the boot volume turns out to hold, then drives the browser
//! and editor key-dispatch loop. Takes the place of the teacher's
//! `repl.rs` top-level loop, rewired onto the browser/editor state machine
//! instead of a command shell.

use alloc::string::{String, ToString};

use crate::browser::{self, Browser};
use crate::clone::{self, StatusLine};
use crate::config::Config;
use crate::editor::Editor;
use crate::error::Result;
use crate::fs::{exfat, fat32, DirEntry, Filesystem};
use crate::platform::keymap::{self, KeyEvent};
use crate::platform::{BlockDevice, PlatformServices, Timestamp};

/// Either on-disk format the boot or a target volume might hold, unified
/// behind one [`Filesystem`] impl so the rest of the crate never needs to
/// know which driver mounted a given volume (spec §4.2/§4.3 share every
/// browser/editor-facing operation).
pub enum MountedVolume<B: BlockDevice> {
    Fat32(fat32::Fat32Volume<B>),
    Exfat(exfat::ExfatVolume<B>),
}

impl<B: BlockDevice> Filesystem for MountedVolume<B> {
    fn read_dir(&mut self, path: &str) -> Result<alloc::vec::Vec<DirEntry>> {
        match self {
            Self::Fat32(v) => v.read_dir(path),
            Self::Exfat(v) => v.read_dir(path),
        }
    }
    fn mkdir(&mut self, path: &str) -> Result<()> {
        match self {
            Self::Fat32(v) => v.mkdir(path),
            Self::Exfat(v) => v.mkdir(path),
        }
    }
    fn exists(&mut self, path: &str) -> Result<bool> {
        match self {
            Self::Fat32(v) => v.exists(path),
            Self::Exfat(v) => v.exists(path),
        }
    }
    fn is_dir(&mut self, path: &str) -> Result<bool> {
        match self {
            Self::Fat32(v) => v.is_dir(path),
            Self::Exfat(v) => v.is_dir(path),
        }
    }
    fn read_file(&mut self, path: &str) -> Result<alloc::vec::Vec<u8>> {
        match self {
            Self::Fat32(v) => v.read_file(path),
            Self::Exfat(v) => v.read_file(path),
        }
    }
    fn write_file(&mut self, path: &str, data: &[u8], timestamp: Timestamp) -> Result<()> {
        match self {
            Self::Fat32(v) => v.write_file(path, data, timestamp),
            Self::Exfat(v) => v.write_file(path, data, timestamp),
        }
    }
    fn delete(&mut self, path: &str) -> Result<()> {
        match self {
            Self::Fat32(v) => v.delete(path),
            Self::Exfat(v) => v.delete(path),
        }
    }
    fn rename(&mut self, from: &str, to: &str) -> Result<()> {
        match self {
            Self::Fat32(v) => v.rename(from, to),
            Self::Exfat(v) => v.rename(from, to),
        }
    }
    fn free_space_bytes(&mut self) -> Result<u64> {
        match self {
            Self::Fat32(v) => v.free_space_bytes(),
            Self::Exfat(v) => v.free_space_bytes(),
        }
    }
    fn label(&self) -> &str {
        match self {
            Self::Fat32(v) => v.label(),
            Self::Exfat(v) => v.label(),
        }
    }
}

/// Identifies the on-disk format from the BPB-common OEM name field at
/// sector 0, offset 3, without consuming `device` — both `fat32::mount`
/// and `exfat::mount` take ownership of the device they mount, so the
/// format has to be decided from a plain read first.
pub fn mount<B: BlockDevice>(mut device: B) -> Result<MountedVolume<B>> {
    let sector_size = device.sector_size();
    let mut boot_sector = alloc::vec![0u8; sector_size];
    device.read(0, &mut boot_sector)?;
    if boot_sector.len() >= 11 && &boot_sector[3..11] == b"EXFAT   " {
        Ok(MountedVolume::Exfat(exfat::mount(device)?))
    } else {
        Ok(MountedVolume::Fat32(fat32::mount(device)?))
    }
}

/// The clone engine's runtime state once F12 has been pressed (spec §4.9:
/// a warning screen, then a `Y`-key confirmation before anything is copied).
enum CloneState {
    Warning,
    Done(String),
}

/// Which top-level screen currently owns the keyboard.
enum Screen {
    Browser(Browser),
    Editor(Editor),
    CloneConfirm(CloneState),
}

/// The top-level application state (spec §2: L owns the browser loop, K
/// owns the editor document, both driven by N's translated key events).
pub struct App {
    screen: Screen,
    config: Config,
}

impl App {
    pub fn new<F: Filesystem>(fs: &mut F, on_removable: bool, visible_rows: usize, config: Config) -> Result<Self> {
        let mut browser = Browser::new(on_removable, visible_rows);
        browser.reload(fs)?;
        Ok(Self { screen: Screen::Browser(browser), config })
    }

    /// Handles one already-translated keystroke, driving navigation,
    /// editing, and the transition between the two screens.
    pub fn handle_key<P: PlatformServices, F: Filesystem>(&mut self, ev: KeyEvent, platform: &mut P, fs: &mut F) {
        match &mut self.screen {
            Screen::Browser(browser) => {
                let fb = platform.framebuffer();
                match browser.handle_key(ev, fs, None) {
                    Ok(browser::Action::LaunchEditor(path)) => {
                        let data = fs.read_file(&path).unwrap_or_default();
                        let editor = Editor::new(&path, &data, fb.width, fb.height).with_tab_width(self.config.tab_width);
                        self.screen = Screen::Editor(editor);
                    }
                    Ok(browser::Action::InvokeClone) => {
                        log::debug!(target: "clone", "warning screen shown");
                        self.screen = Screen::CloneConfirm(CloneState::Warning);
                    }
                    Ok(browser::Action::None) => {}
                    Err(_) => {}
                }
            }
            Screen::Editor(editor) => {
                if editor.handle_key(ev, fs) == crate::editor::Outcome::Exit {
                    let path = editor.path.clone();
                    let on_removable = false; // returning to the same volume's browser
                    let mut browser = Browser::new(on_removable, 1);
                    let parent = path.rsplit_once('/').map(|(p, _)| p).filter(|p| !p.is_empty()).unwrap_or("/");
                    browser.current_path = parent.to_string();
                    let _ = browser.reload(fs);
                    self.screen = Screen::Browser(browser);
                }
            }
            Screen::CloneConfirm(state) => match state {
                CloneState::Warning if ev.code == b'Y' as u16 || ev.code == b'y' as u16 => {
                    let message = match platform.take_removable_block_device() {
                        Some(device) => match mount(device) {
                            Ok(mut target) => {
                                let mut status = StatusLine::default();
                                match clone::clone(fs, &mut target, "/", "/", &mut status) {
                                    Ok(()) => {
                                        log::info!(target: "clone", "mirrored boot volume onto target");
                                        "Clone complete.".to_string()
                                    }
                                    Err(err) => {
                                        log::warn!(target: "clone", "failed: {err}");
                                        status.message.unwrap_or_else(|| "Clone failed.".to_string())
                                    }
                                }
                            }
                            Err(err) => {
                                log::warn!(target: "clone", "could not mount target volume: {err}");
                                "Could not mount the target volume.".to_string()
                            }
                        },
                        None => {
                            log::warn!(target: "clone", "no removable volume attached");
                            "No removable volume attached.".to_string()
                        }
                    };
                    self.screen = Screen::CloneConfirm(CloneState::Done(message));
                }
                CloneState::Warning => {
                    log::debug!(target: "clone", "cancelled at warning screen");
                    let mut browser = Browser::new(true, 1);
                    let _ = browser.reload(fs);
                    self.screen = Screen::Browser(browser);
                }
                CloneState::Done(_) => {
                    let mut browser = Browser::new(true, 1);
                    let _ = browser.reload(fs);
                    self.screen = Screen::Browser(browser);
                }
            },
        }
    }

    /// The clone confirmation's own status text, for whatever renders the
    /// current screen (spec §4.9: "the user sees which file failed in the
    /// status bar" extends to the warning/result text too).
    pub fn status(&self) -> Option<&str> {
        match &self.screen {
            Screen::CloneConfirm(CloneState::Warning) => {
                Some("Clone boot volume onto target? This overwrites files on the target. Y to confirm, any other key to cancel.")
            }
            Screen::CloneConfirm(CloneState::Done(message)) => Some(message.as_str()),
            _ => None,
        }
    }

    /// Drains every already-queued keystroke from the platform (spec §5:
    /// the real firmware loop instead blocks on `wait_key` between
    /// keystrokes; tests feed a bounded queue and expect this to drain it).
    pub fn run<P: PlatformServices, F: Filesystem>(&mut self, platform: &mut P, fs: &mut F) {
        while let Some(raw) = platform.read_key() {
            let ev = keymap::cua_remap(keymap::translate(raw));
            self.handle_key(ev, platform, fs);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{MemoryBlockDevice, MemoryPlatform};
    use alloc::vec::Vec;

    #[test]
    fn mount_rejects_a_blank_device_as_neither_format() {
        let dev = MemoryBlockDevice::new(512, 4);
        // An all-zero image has neither exFAT's OEM name nor a valid FAT32
        // BPB, so dispatch falls through to fat32::mount and that fails.
        let result = mount(dev);
        assert!(result.is_err());
    }

    #[test]
    fn mount_routes_to_exfat_on_its_oem_name() {
        let mut dev = MemoryBlockDevice::new(512, 4);
        dev.raw_mut()[3..11].copy_from_slice(b"EXFAT   ");
        // Routed to exfat::mount, which then fails on the rest of the
        // (blank) boot sector — still proves the dispatch, not a full
        // mount; `fs::exfat::mod` tests cover a real image end to end.
        let result = mount(dev);
        assert!(matches!(result, Err(_)));
    }

    struct FakeFs {
        entries: Vec<DirEntry>,
    }

    impl Filesystem for FakeFs {
        fn read_dir(&mut self, _path: &str) -> Result<Vec<DirEntry>> {
            Ok(self.entries.clone())
        }
        fn mkdir(&mut self, _path: &str) -> Result<()> {
            Ok(())
        }
        fn exists(&mut self, _path: &str) -> Result<bool> {
            Ok(true)
        }
        fn is_dir(&mut self, _path: &str) -> Result<bool> {
            Ok(false)
        }
        fn read_file(&mut self, _path: &str) -> Result<Vec<u8>> {
            Ok(b"hello".to_vec())
        }
        fn write_file(&mut self, _path: &str, _data: &[u8], _timestamp: Timestamp) -> Result<()> {
            Ok(())
        }
        fn delete(&mut self, _path: &str) -> Result<()> {
            Ok(())
        }
        fn rename(&mut self, _from: &str, _to: &str) -> Result<()> {
            Ok(())
        }
        fn free_space_bytes(&mut self) -> Result<u64> {
            Ok(1_000_000)
        }
        fn label(&self) -> &str {
            "FAKE"
        }
    }

    #[test]
    fn app_construction_reloads_the_root_directory() {
        let mut fs = FakeFs { entries: alloc::vec![DirEntry { name: "a.txt".to_string(), is_dir: false, size: 5, attributes: 0 }] };
        let app = App::new(&mut fs, false, 10, Config::default()).unwrap();
        match app.screen {
            Screen::Browser(b) => assert_eq!(b.entries.len(), 1),
            Screen::Editor(_) => panic!("expected the browser screen"),
            Screen::CloneConfirm(_) => panic!("expected the browser screen"),
        }
    }

    fn f12() -> KeyEvent {
        keymap::translate(crate::platform::RawKey { scancode: 0x16, unicode: 0, modifiers: 0 })
    }

    fn y() -> KeyEvent {
        keymap::translate(crate::platform::RawKey { scancode: 0, unicode: b'Y' as u16, modifiers: 0 })
    }

    #[test]
    fn f12_then_y_clones_the_boot_volume_onto_the_attached_removable() {
        let boot_dev = MemoryBlockDevice::new(512, 524288);
        let mut boot = fat32::format(boot_dev, 524288, "BOOT", |_, _| {}).unwrap();
        boot.write_file("/a.txt", b"hello", Timestamp::FIXED_FALLBACK).unwrap();

        let target_dev = MemoryBlockDevice::new(512, 524288);
        let target_vol = fat32::format(target_dev, 524288, "TARGET", |_, _| {}).unwrap();
        let target_raw = target_vol.into_device().unwrap();

        let mut platform = MemoryPlatform::new(4, 4, MemoryBlockDevice::new(512, 4));
        platform.attach_removable(target_raw);

        let mut app = App::new(&mut boot, true, 10, Config::default()).unwrap();
        app.handle_key(f12(), &mut platform, &mut boot);
        assert_eq!(
            app.status(),
            Some("Clone boot volume onto target? This overwrites files on the target. Y to confirm, any other key to cancel.")
        );

        app.handle_key(y(), &mut platform, &mut boot);
        assert_eq!(app.status(), Some("Clone complete."));
    }

    #[test]
    fn f12_with_no_removable_volume_attached_reports_that_instead_of_cloning() {
        let boot_dev = MemoryBlockDevice::new(512, 524288);
        let mut boot = fat32::format(boot_dev, 524288, "BOOT", |_, _| {}).unwrap();

        let mut platform = MemoryPlatform::new(4, 4, MemoryBlockDevice::new(512, 4));

        let mut app = App::new(&mut boot, true, 10, Config::default()).unwrap();
        app.handle_key(f12(), &mut platform, &mut boot);
        app.handle_key(y(), &mut platform, &mut boot);
        assert_eq!(app.status(), Some("No removable volume attached."));
    }

    #[test]
    fn any_key_other_than_y_cancels_the_clone_back_to_the_browser() {
        let boot_dev = MemoryBlockDevice::new(512, 524288);
        let mut boot = fat32::format(boot_dev, 524288, "BOOT", |_, _| {}).unwrap();

        let mut platform = MemoryPlatform::new(4, 4, MemoryBlockDevice::new(512, 4));

        let mut app = App::new(&mut boot, true, 10, Config::default()).unwrap();
        app.handle_key(f12(), &mut platform, &mut boot);
        app.handle_key(keymap::translate(crate::platform::RawKey { scancode: 0x17, unicode: 0, modifiers: 0 }), &mut platform, &mut boot); // Escape
        assert_eq!(app.status(), None);
        match app.screen {
            Screen::Browser(_) => {}
            _ => panic!("expected to fall back to the browser screen"),
        }
    }
}
