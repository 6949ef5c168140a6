//! File browser (component L, spec §4.8): sorted directory listing,
//! navigation, and the keys that launch the editor or the clone engine.

use alloc::format;
use alloc::string::{String, ToString};
use alloc::vec::Vec;

use crate::editor::document::PathRegister;
use crate::error::{Error, Result};
use crate::fs::{DirEntry, Filesystem};
use crate::platform::keymap::{KeyEvent, NamedKey};

/// What the caller (the top-level UEFI loop, spec §2's startup order) should
/// do after a keystroke was handled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    None,
    LaunchEditor(String),
    InvokeClone,
}

fn join(path: &str, name: &str) -> String {
    if path == "/" {
        format!("/{name}")
    } else {
        format!("{path}/{name}")
    }
}

fn parent_of(path: &str) -> String {
    match path.rfind('/') {
        Some(0) => "/".to_string(),
        Some(idx) => path[..idx].to_string(),
        None => "/".to_string(),
    }
}

fn sort_entries(entries: &mut [DirEntry]) {
    entries.sort_by(|a, b| match (b.is_dir, a.is_dir) {
        (true, false) => core::cmp::Ordering::Greater,
        (false, true) => core::cmp::Ordering::Less,
        _ => a.name.to_ascii_lowercase().cmp(&b.name.to_ascii_lowercase()),
    });
}

pub struct Browser {
    pub current_path: String,
    pub entries: Vec<DirEntry>,
    pub cursor: usize,
    pub scroll: usize,
    pub on_removable: bool,
    cut_register: PathRegister,
    status: Option<String>,
    visible_rows: usize,
}

impl Browser {
    pub fn new(on_removable: bool, visible_rows: usize) -> Self {
        Self {
            current_path: "/".to_string(),
            entries: Vec::new(),
            cursor: 0,
            scroll: 0,
            on_removable,
            cut_register: PathRegister::default(),
            status: None,
            visible_rows: visible_rows.max(1),
        }
    }

    pub fn reload<F: Filesystem>(&mut self, fs: &mut F) -> Result<()> {
        let mut entries = fs.read_dir(&self.current_path)?;
        entries.retain(|e| !e.is_hidden_or_system());
        sort_entries(&mut entries);
        self.entries = entries;
        self.cursor = self.cursor.min(self.entries.len().saturating_sub(1));
        self.scroll = 0;
        Ok(())
    }

    fn selected(&self) -> Option<&DirEntry> {
        self.entries.get(self.cursor)
    }

    fn move_cursor(&mut self, delta: isize) {
        if self.entries.is_empty() {
            return;
        }
        let last = self.entries.len() - 1;
        self.cursor = (self.cursor as isize + delta).clamp(0, last as isize) as usize;
        if self.cursor < self.scroll {
            self.scroll = self.cursor;
        } else if self.cursor >= self.scroll + self.visible_rows {
            self.scroll = self.cursor + 1 - self.visible_rows;
        }
    }

    /// Handles one keystroke (spec §4.8). `new_name` supplies the filename
    /// for F4 (new file) and F9 (rename) prompts, since neither key carries
    /// its own text; the caller collects it via a one-line text prompt
    /// before calling this with the pending key.
    pub fn handle_key<F: Filesystem>(&mut self, ev: KeyEvent, fs: &mut F, new_name: Option<&str>) -> Result<Action> {
        match ev.named() {
            Some(NamedKey::Up) => self.move_cursor(-1),
            Some(NamedKey::Down) => self.move_cursor(1),
            Some(NamedKey::PageUp) => self.move_cursor(-(self.visible_rows as isize)),
            Some(NamedKey::PageDown) => self.move_cursor(self.visible_rows as isize),
            _ if ev.code == b'\r' as u16 => return self.enter(fs),
            _ if ev.code == 0x08 => self.navigate_up(fs)?,
            Some(NamedKey::F3) => self.copy_path_to_register(),
            Some(NamedKey::F8) => self.paste(fs)?,
            Some(NamedKey::F4) => {
                if let Some(name) = new_name {
                    return self.new_file(name);
                }
            }
            Some(NamedKey::F9) => {
                if let Some(name) = new_name {
                    self.rename(name, fs)?;
                }
            }
            Some(NamedKey::F12) if self.on_removable => return Ok(Action::InvokeClone),
            _ => {}
        }
        Ok(Action::None)
    }

    fn enter<F: Filesystem>(&mut self, fs: &mut F) -> Result<Action> {
        let entry = match self.selected() {
            Some(e) => e.clone(),
            None => return Ok(Action::None),
        };
        let path = join(&self.current_path, &entry.name);
        if entry.is_dir {
            self.current_path = path;
            self.reload(fs)?;
            Ok(Action::None)
        } else {
            // Launched unconditionally, even for binaries (spec §4.8) — the
            // editor displays them lossily rather than refusing to open.
            Ok(Action::LaunchEditor(path))
        }
    }

    fn navigate_up<F: Filesystem>(&mut self, fs: &mut F) -> Result<()> {
        if self.current_path != "/" {
            self.current_path = parent_of(&self.current_path);
            self.reload(fs)?;
        }
        Ok(())
    }

    fn copy_path_to_register(&mut self) {
        if let Some(entry) = self.selected() {
            let path = join(&self.current_path, &entry.name);
            self.cut_register.set(path);
            self.status = Some("Copied path.".to_string());
        }
    }

    fn paste<F: Filesystem>(&mut self, fs: &mut F) -> Result<()> {
        let src = match self.cut_register.get() {
            Some(p) => p.to_string(),
            None => return Ok(()),
        };
        let data = fs.read_file(&src).inspect_err(|err| log::warn!(target: "browser", "paste: read '{src}' failed: {err}"))?;
        let name = src.rsplit('/').next().unwrap_or(&src);
        let dst = join(&self.current_path, name);
        fs.write_file(&dst, &data, crate::platform::Timestamp::FIXED_FALLBACK)
            .inspect_err(|err| log::warn!(target: "browser", "paste: write '{dst}' failed: {err}"))?;
        self.reload(fs)?;
        log::debug!(target: "browser", "pasted '{src}' to '{dst}'");
        self.status = Some(format!("Pasted {name}."));
        Ok(())
    }

    fn new_file(&mut self, name: &str) -> Result<Action> {
        if name.is_empty() {
            return Err(Error::InvalidFormat);
        }
        let path = join(&self.current_path, name);
        Ok(Action::LaunchEditor(path))
    }

    fn rename<F: Filesystem>(&mut self, new_name: &str, fs: &mut F) -> Result<()> {
        let entry = match self.selected() {
            Some(e) => e.clone(),
            None => return Ok(()),
        };
        let from = join(&self.current_path, &entry.name);
        let to = join(&self.current_path, new_name);
        fs.rename(&from, &to).inspect_err(|err| log::warn!(target: "browser", "rename '{from}' to '{to}' failed: {err}"))?;
        self.reload(fs)?;
        log::debug!(target: "browser", "renamed '{from}' to '{to}'");
        Ok(())
    }

    /// Context-sensitive hint line (spec §4.8): which keys currently do
    /// something, given the cursor and volume state.
    pub fn status_bar(&self) -> String {
        if let Some(msg) = &self.status {
            return msg.clone();
        }
        let mut hints = String::from("Enter=open Backspace=up F3=copy F8=paste F4=new F9=rename");
        if self.on_removable {
            hints.push_str(" F12=clone");
        }
        format!("{} -- {}", self.current_path, hints)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::keymap;
    use crate::platform::RawKey;

    struct FakeFs {
        dirs: alloc::collections::BTreeMap<String, Vec<DirEntry>>,
        files: alloc::collections::BTreeMap<String, Vec<u8>>,
    }

    impl FakeFs {
        fn new() -> Self {
            Self { dirs: alloc::collections::BTreeMap::new(), files: alloc::collections::BTreeMap::new() }
        }
    }

    impl Filesystem for FakeFs {
        fn read_dir(&mut self, path: &str) -> Result<Vec<DirEntry>> {
            self.dirs.get(path).cloned().ok_or(Error::NotFound)
        }
        fn mkdir(&mut self, _path: &str) -> Result<()> {
            Ok(())
        }
        fn exists(&mut self, path: &str) -> Result<bool> {
            Ok(self.files.contains_key(path))
        }
        fn is_dir(&mut self, path: &str) -> Result<bool> {
            Ok(self.dirs.contains_key(path))
        }
        fn read_file(&mut self, path: &str) -> Result<Vec<u8>> {
            self.files.get(path).cloned().ok_or(Error::NotFound)
        }
        fn write_file(&mut self, path: &str, data: &[u8], _timestamp: crate::platform::Timestamp) -> Result<()> {
            self.files.insert(path.to_string(), data.to_vec());
            Ok(())
        }
        fn delete(&mut self, path: &str) -> Result<()> {
            self.files.remove(path);
            Ok(())
        }
        fn rename(&mut self, from: &str, to: &str) -> Result<()> {
            let data = self.files.remove(from).ok_or(Error::NotFound)?;
            self.files.insert(to.to_string(), data);
            Ok(())
        }
        fn free_space_bytes(&mut self) -> Result<u64> {
            Ok(1_000_000)
        }
        fn label(&self) -> &str {
            "TEST"
        }
    }

    fn de(name: &str, is_dir: bool) -> DirEntry {
        DirEntry { name: name.to_string(), is_dir, size: 0, attributes: 0 }
    }

    fn key(scancode: u16, unicode: u16) -> KeyEvent {
        keymap::translate(RawKey { scancode, unicode, modifiers: 0 })
    }

    #[test]
    fn entries_sort_directories_first_then_case_insensitive() {
        let mut entries = alloc::vec![de("banana", false), de("Apple", true), de("apricot", false)];
        sort_entries(&mut entries);
        assert_eq!(entries[0].name, "Apple");
        assert_eq!(entries[1].name, "apricot");
        assert_eq!(entries[2].name, "banana");
    }

    #[test]
    fn entering_a_directory_navigates_and_reloads() {
        let mut fs = FakeFs::new();
        fs.dirs.insert("/".to_string(), alloc::vec![de("docs", true)]);
        fs.dirs.insert("/docs".to_string(), alloc::vec![de("readme.txt", false)]);
        let mut browser = Browser::new(false, 10);
        browser.reload(&mut fs).unwrap();
        let action = browser.handle_key(key(0, b'\r' as u16), &mut fs, None).unwrap();
        assert_eq!(action, Action::None);
        assert_eq!(browser.current_path, "/docs");
        assert_eq!(browser.entries[0].name, "readme.txt");
    }

    #[test]
    fn entering_a_file_launches_the_editor() {
        let mut fs = FakeFs::new();
        fs.dirs.insert("/".to_string(), alloc::vec![de("readme.txt", false)]);
        let mut browser = Browser::new(false, 10);
        browser.reload(&mut fs).unwrap();
        let action = browser.handle_key(key(0, b'\r' as u16), &mut fs, None).unwrap();
        assert_eq!(action, Action::LaunchEditor("/readme.txt".to_string()));
    }

    #[test]
    fn backspace_navigates_up_to_root() {
        let mut fs = FakeFs::new();
        fs.dirs.insert("/".to_string(), alloc::vec![de("docs", true)]);
        fs.dirs.insert("/docs".to_string(), Vec::new());
        let mut browser = Browser::new(false, 10);
        browser.current_path = "/docs".to_string();
        browser.reload(&mut fs).unwrap();
        browser.handle_key(key(0, 0x08), &mut fs, None).unwrap();
        assert_eq!(browser.current_path, "/");
    }

    #[test]
    fn f12_is_inert_unless_on_a_removable_volume() {
        let mut fs = FakeFs::new();
        fs.dirs.insert("/".to_string(), Vec::new());
        let mut browser = Browser::new(false, 10);
        browser.reload(&mut fs).unwrap();
        let action = browser.handle_key(key(0x16, 0), &mut fs, None).unwrap();
        assert_eq!(action, Action::None);
        browser.on_removable = true;
        let action = browser.handle_key(key(0x16, 0), &mut fs, None).unwrap();
        assert_eq!(action, Action::InvokeClone);
    }

    #[test]
    fn copy_then_paste_duplicates_the_file_into_the_current_directory() {
        let mut fs = FakeFs::new();
        fs.dirs.insert("/".to_string(), alloc::vec![de("a.txt", false)]);
        fs.files.insert("/a.txt".to_string(), b"hi".to_vec());
        let mut browser = Browser::new(false, 10);
        browser.reload(&mut fs).unwrap();
        browser.handle_key(key(0x0D, 0), &mut fs, None).unwrap(); // F3
        browser.handle_key(key(0x12, 0), &mut fs, None).unwrap(); // F8
        assert_eq!(fs.files.get("/a.txt").unwrap(), b"hi");
    }
}
