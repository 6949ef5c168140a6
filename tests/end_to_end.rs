//! End-to-end scenarios driven entirely through the public API, the way a
//! real caller would: format/mount a volume, type into the editor, clone
//! between two volumes. Each test's name mirrors the scenario it exercises.

use survival_core::clone::{clone, StatusLine};
use survival_core::editor::syntax::{highlight_line, recompute_comment_state, TokenKind};
use survival_core::editor::{Document, Editor};
use survival_core::error::{Error, Result};
use survival_core::fs::{fat32, DirEntry, Filesystem};
use survival_core::platform::keymap::{modifiers, translate, KeyEvent};
use survival_core::platform::{RawKey, Timestamp};
use survival_core::testing::MemoryBlockDevice;

fn key(scancode: u16, unicode: u16, mods: u8) -> KeyEvent {
    translate(RawKey { scancode, unicode, modifiers: mods })
}

fn char_key(c: char) -> KeyEvent {
    key(0, c as u16, 0)
}

#[test]
fn format_and_round_trip() {
    let dev = MemoryBlockDevice::new(512, 524288);
    let mut vol = fat32::format(dev, 524288, "BOOT", |_, _| {}).unwrap();

    vol.mkdir("/src").unwrap();
    vol.write_file("/src/hello.c", b"int main(){}", Timestamp::FIXED_FALLBACK).unwrap();

    // Tear down to the raw device and mount fresh, the way a reboot would.
    let raw = vol.into_device().unwrap();
    let mut remounted = fat32::mount(raw).unwrap();

    let entries = remounted.read_dir("/src").unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].name, "hello.c");
    assert_eq!(entries[0].size, 13);
    assert_eq!(remounted.read_file("/src/hello.c").unwrap(), b"int main(){}");
}

#[test]
fn long_filename_round_trips_through_the_lfn_chain() {
    let dev = MemoryBlockDevice::new(512, 524288);
    let mut vol = fat32::format(dev, 524288, "BOOT", |_, _| {}).unwrap();

    let long_name = "Long Filename Example.txt";
    let path = format!("/{long_name}");
    vol.write_file(&path, b"hello there", Timestamp::FIXED_FALLBACK).unwrap();

    let entries = vol.read_dir("/").unwrap();
    let found = entries.iter().find(|e| e.name == long_name).expect("long name entry");
    assert_eq!(found.size, 11);
    assert_eq!(vol.read_file(&path).unwrap(), b"hello there");
}

struct NullFs;

impl Filesystem for NullFs {
    fn read_dir(&mut self, _path: &str) -> Result<Vec<DirEntry>> {
        Ok(Vec::new())
    }
    fn mkdir(&mut self, _path: &str) -> Result<()> {
        Ok(())
    }
    fn exists(&mut self, _path: &str) -> Result<bool> {
        Ok(false)
    }
    fn is_dir(&mut self, _path: &str) -> Result<bool> {
        Ok(false)
    }
    fn read_file(&mut self, _path: &str) -> Result<Vec<u8>> {
        Err(Error::NotFound)
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
        "NULL"
    }
}

#[test]
fn editor_typing_splitting_and_clipboard_round_trip() {
    let mut fs = NullFs;
    let mut ed = Editor::new("/new.txt", b"", 640, 400);

    for c in "abc".chars() {
        ed.handle_key(char_key(c), &mut fs);
    }
    ed.handle_key(key(0, b'\r' as u16, 0), &mut fs);
    for c in "def".chars() {
        ed.handle_key(char_key(c), &mut fs);
    }

    assert_eq!(ed.document.line_count(), 2);
    assert_eq!(ed.document.line(0), b"abc");
    assert_eq!(ed.document.line(1), b"def");
    assert_eq!(ed.cursor, (1, 3));

    // F3 at (1, 0), move to (1, 3), Ctrl+C.
    ed.cursor = (1, 0);
    ed.handle_key(key(0x0D, 0, 0), &mut fs); // F3
    ed.cursor = (1, 3);
    ed.handle_key(key(0, b'c' as u16, modifiers::CTRL), &mut fs); // Ctrl+C
    assert_eq!(ed.clipboard.get(), b"def");

    // Ctrl+V at (0, 3).
    ed.cursor = (0, 3);
    ed.handle_key(key(0, b'v' as u16, modifiers::CTRL), &mut fs); // Ctrl+V
    assert_eq!(ed.document.line(0), b"abcdef");
    assert_eq!(ed.document.line(1), b"def");
}

#[test]
fn syntax_state_across_a_comment_spanning_two_lines() {
    let doc = Document::from_bytes(b"/* a\nb */ c");
    let states = recompute_comment_state(&doc);
    assert!(!states[0]);
    assert!(states[1]);

    let spans = highlight_line(doc.line(1), states[1]);
    let comment_span = spans.iter().find(|(start, end, kind)| *kind == TokenKind::Comment && *start == 0 && *end == 4);
    assert!(comment_span.is_some(), "expected a comment span covering 'b */'");
    let default_span = spans.iter().find(|(_, _, kind)| *kind == TokenKind::Default);
    assert!(default_span.is_some(), "expected default-coloured ' c' after the comment closes");
}

#[test]
fn clone_mirrors_one_volume_onto_another() {
    let boot_dev = MemoryBlockDevice::new(512, 524288);
    let mut boot = fat32::format(boot_dev, 524288, "BOOT", |_, _| {}).unwrap();
    boot.mkdir("/a").unwrap();
    boot.mkdir("/b").unwrap();
    boot.write_file("/a/f1", b"aaaa", Timestamp::FIXED_FALLBACK).unwrap();
    boot.write_file("/b/f2", b"bbbb", Timestamp::FIXED_FALLBACK).unwrap();

    let target_dev = MemoryBlockDevice::new(512, 524288);
    let mut target = fat32::format(target_dev, 524288, "TARGET", |_, _| {}).unwrap();

    let mut status = StatusLine::default();
    clone(&mut boot, &mut target, "/", "/", &mut status).unwrap();

    let raw = target.into_device().unwrap();
    let mut remounted = fat32::mount(raw).unwrap();

    assert_eq!(remounted.read_file("/a/f1").unwrap(), b"aaaa");
    assert_eq!(remounted.read_file("/b/f2").unwrap(), b"bbbb");
    assert_eq!(remounted.read_dir("/").unwrap().len(), 2);
}
