//! Text editor core (component K, spec §3.6-§3.8, §4.7): the line buffer,
//! cursor/selection/clipboard state, C/H syntax highlighting, and the
//! key-dispatch loop that drives them.

pub mod document;
pub mod syntax;

use alloc::string::{String, ToString};
use alloc::vec::Vec;

use crate::color::Color;
use crate::error::Result;
use crate::fs::Filesystem;
use crate::platform::keymap::{KeyEvent, NamedKey};
use crate::platform::{PlatformServices, Timestamp};
use crate::text::{self, GLYPH_HEIGHT, GLYPH_WIDTH};

pub use document::{Clipboard, Document, Pos, Selection};

const CTRL_C: u16 = 3;
const CTRL_X: u16 = 24;
const CTRL_V: u16 = 22;

const BG: Color = Color::BLACK;
const INFO_FG: Color = Color { r: 0, g: 0, b: 0 };
const INFO_BG: Color = Color { r: 200, g: 200, b: 200 };

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Editing,
    ConfirmExit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Continue,
    Exit,
}

/// What [`Editor::render`] needs to repaint, decided by [`Editor::handle_key`]
/// (spec §4.7's incremental redraw optimisation).
enum RedrawPlan {
    Full,
    Rows(usize, usize),
}

pub struct Editor {
    pub document: Document,
    pub path: String,
    pub cursor: Pos,
    pub scroll: (usize, usize),
    pub selection: Option<Selection>,
    pub clipboard: Clipboard,
    mode: Mode,
    status: Option<String>,
    comment_state: Vec<bool>,
    is_c_file: bool,
    rows: usize,
    cols: usize,
    tab_width: u8,
    redraw: RedrawPlan,
}

impl Editor {
    pub fn new(path: &str, data: &[u8], fb_width: u32, fb_height: u32) -> Self {
        let is_c_file = path.ends_with(".c") || path.ends_with(".h");
        let document = Document::from_bytes(data);
        let comment_state = if is_c_file { syntax::recompute_comment_state(&document) } else { Vec::new() };
        let cols = (fb_width / GLYPH_WIDTH) as usize;
        let rows = (fb_height / GLYPH_HEIGHT).saturating_sub(1) as usize; // last row is the info bar
        Self {
            document,
            path: path.to_string(),
            cursor: (0, 0),
            scroll: (0, 0),
            selection: None,
            clipboard: Clipboard::default(),
            mode: Mode::Editing,
            status: None,
            comment_state,
            is_c_file,
            rows: rows.max(1),
            cols: cols.max(1),
            tab_width: 4,
            redraw: RedrawPlan::Full,
        }
    }

    /// Overrides the number of spaces Tab inserts (`config::Config::tab_width`).
    pub fn with_tab_width(mut self, tab_width: u8) -> Self {
        self.tab_width = tab_width.max(1);
        self
    }

    fn line_len(&self, y: usize) -> usize {
        self.document.line_len(y)
    }

    fn clamp_cursor(&mut self) {
        let cy = self.cursor.0.min(self.document.line_count() - 1);
        let cx = self.cursor.1.min(self.line_len(cy));
        self.cursor = (cy, cx);
    }

    fn clamp_scroll(&mut self) {
        let (cy, cx) = self.cursor;
        if cy < self.scroll.0 {
            self.scroll.0 = cy;
        } else if cy >= self.scroll.0 + self.rows {
            self.scroll.0 = cy + 1 - self.rows;
        }
        if cx < self.scroll.1 {
            self.scroll.1 = cx;
        } else if cx >= self.scroll.1 + self.cols {
            self.scroll.1 = cx + 1 - self.cols;
        }
    }

    fn delete_selection_if_any(&mut self) {
        if let Some(sel) = self.selection.take() {
            let (start, end) = sel.range(self.cursor);
            self.cursor = self.document.delete_range(start, end);
        }
    }

    fn insert_printable(&mut self, byte: u8) {
        self.delete_selection_if_any();
        let (cy, cx) = self.cursor;
        self.document.insert_byte(cy, cx, byte);
        self.cursor = (cy, cx + 1);
    }

    fn do_enter(&mut self) {
        self.delete_selection_if_any();
        let (cy, cx) = self.cursor;
        self.document.split_line(cy, cx);
        self.cursor = (cy + 1, 0);
    }

    fn do_backspace(&mut self) {
        if self.selection.is_some() {
            self.delete_selection_if_any();
            return;
        }
        let (cy, cx) = self.cursor;
        if cx > 0 {
            self.document.delete_byte(cy, cx - 1);
            self.cursor = (cy, cx - 1);
        } else if cy > 0 {
            let prev_len = self.line_len(cy - 1);
            self.document.join_line(cy - 1);
            self.cursor = (cy - 1, prev_len);
        }
    }

    fn do_delete(&mut self) {
        if self.selection.is_some() {
            self.delete_selection_if_any();
            return;
        }
        let (cy, cx) = self.cursor;
        if cx < self.line_len(cy) {
            self.document.delete_byte(cy, cx);
        } else if cy + 1 < self.document.line_count() {
            self.document.join_line(cy);
        }
    }

    fn move_up(&mut self) {
        let (cy, cx) = self.cursor;
        if cy > 0 {
            self.cursor = (cy - 1, cx.min(self.line_len(cy - 1)));
        }
    }

    fn move_down(&mut self) {
        let (cy, cx) = self.cursor;
        if cy + 1 < self.document.line_count() {
            self.cursor = (cy + 1, cx.min(self.line_len(cy + 1)));
        }
    }

    fn move_left(&mut self) {
        let (cy, cx) = self.cursor;
        if cx > 0 {
            self.cursor = (cy, cx - 1);
        } else if cy > 0 {
            self.cursor = (cy - 1, self.line_len(cy - 1));
        }
    }

    fn move_right(&mut self) {
        let (cy, cx) = self.cursor;
        if cx < self.line_len(cy) {
            self.cursor = (cy, cx + 1);
        } else if cy + 1 < self.document.line_count() {
            self.cursor = (cy + 1, 0);
        }
    }

    fn move_page(&mut self, delta: isize) {
        let (cy, cx) = self.cursor;
        let last = self.document.line_count() - 1;
        let new_cy = (cy as isize + delta).clamp(0, last as isize) as usize;
        self.cursor = (new_cy, cx.min(self.line_len(new_cy)));
    }

    fn copy(&mut self) {
        if let Some(sel) = self.selection {
            let (start, end) = sel.range(self.cursor);
            let bytes = self.document.bytes_in_range(start, end);
            let _ = self.clipboard.set(bytes);
        }
    }

    fn cut(&mut self) {
        self.copy();
        self.delete_selection_if_any();
    }

    fn paste(&mut self) {
        self.delete_selection_if_any();
        let bytes = self.clipboard.get().to_vec();
        let (cy, cx) = self.cursor;
        self.cursor = self.document.insert_bytes(cy, cx, &bytes);
    }

    /// Drives one keystroke through the editor (spec §4.7). `fs` is only
    /// touched by the save path.
    pub fn handle_key<F: Filesystem>(&mut self, ev: KeyEvent, fs: &mut F) -> Outcome {
        if self.mode == Mode::ConfirmExit {
            return self.handle_confirm_exit_key(ev, fs);
        }

        let before_cy = self.cursor.0;
        let before_scroll = self.scroll;
        let mut is_pure_move = false;

        if ev.named() == Some(NamedKey::Escape) {
            return self.request_exit();
        } else if ev.named() == Some(NamedKey::F2) {
            self.try_save(fs);
        } else if ev.ctrl() && ev.code == CTRL_C {
            self.copy();
        } else if ev.ctrl() && ev.code == CTRL_X {
            self.cut();
        } else if ev.ctrl() && ev.code == CTRL_V {
            self.paste();
        } else if ev.code == NamedKey::F3 as u16 {
            self.selection = match self.selection {
                None => Some(Selection { anchor: self.cursor }),
                Some(_) => None,
            };
        } else if let Some(named) = ev.named() {
            match named {
                NamedKey::Up => { self.move_up(); is_pure_move = true; }
                NamedKey::Down => { self.move_down(); is_pure_move = true; }
                NamedKey::Left => { self.move_left(); is_pure_move = true; }
                NamedKey::Right => { self.move_right(); is_pure_move = true; }
                NamedKey::Home => { self.cursor.1 = 0; is_pure_move = true; }
                NamedKey::End => { self.cursor.1 = self.line_len(self.cursor.0); is_pure_move = true; }
                NamedKey::PageUp => { self.move_page(-(self.rows as isize)); is_pure_move = true; }
                NamedKey::PageDown => { self.move_page(self.rows as isize); is_pure_move = true; }
                NamedKey::Delete => self.do_delete(),
                _ => {}
            }
        } else if ev.code == b'\t' as u16 {
            for _ in 0..self.tab_width {
                self.insert_printable(b' ');
            }
        } else if ev.code == b'\r' as u16 || ev.code == b'\n' as u16 {
            self.do_enter();
        } else if ev.code == 0x08 {
            self.do_backspace();
        } else if let Some(byte) = ev.printable_ascii() {
            self.insert_printable(byte);
        }

        self.clamp_cursor();
        self.clamp_scroll();

        if self.is_c_file && !is_pure_move {
            self.comment_state = syntax::recompute_comment_state(&self.document);
        }

        let scroll_unchanged = self.scroll == before_scroll;
        self.redraw = if is_pure_move && self.selection.is_none() && scroll_unchanged {
            RedrawPlan::Rows(before_cy, self.cursor.0)
        } else {
            RedrawPlan::Full
        };

        Outcome::Continue
    }

    fn request_exit(&mut self) -> Outcome {
        if self.document.modified() {
            self.mode = Mode::ConfirmExit;
            self.status = Some("Save changes? F2=save F10=discard ESC=cancel".to_string());
            self.redraw = RedrawPlan::Full;
            Outcome::Continue
        } else {
            Outcome::Exit
        }
    }

    fn handle_confirm_exit_key<F: Filesystem>(&mut self, ev: KeyEvent, fs: &mut F) -> Outcome {
        self.redraw = RedrawPlan::Full;
        match ev.named() {
            Some(NamedKey::F2) => {
                if self.try_save(fs) {
                    Outcome::Exit
                } else {
                    self.mode = Mode::Editing;
                    Outcome::Continue
                }
            }
            Some(NamedKey::F10) => Outcome::Exit,
            Some(NamedKey::Escape) => {
                self.mode = Mode::Editing;
                self.status = None;
                Outcome::Continue
            }
            _ => Outcome::Continue,
        }
    }

    /// Saves the document (spec §4.7). Returns whether the save succeeded;
    /// either way a status-bar message is left for the caller to render.
    fn try_save<F: Filesystem>(&mut self, fs: &mut F) -> bool {
        match self.save(fs) {
            Ok(()) => {
                self.status = Some("Saved.".to_string());
                true
            }
            Err(e) => {
                self.status = Some(alloc::format!("Save failed: {e}"));
                false
            }
        }
    }

    fn save<F: Filesystem>(&mut self, fs: &mut F) -> Result<()> {
        let bytes = self.document.serialize();
        let old_size = fs.read_file(&self.path).map(|d| d.len() as u64).unwrap_or(0);
        let free = fs.free_space_bytes()?;
        if bytes.len() as u64 > free + old_size {
            log::warn!(target: "editor", "save: insufficient space for '{}' ({} bytes)", self.path, bytes.len());
            return Err(crate::error::Error::InsufficientSpace);
        }
        fs.write_file(&self.path, &bytes, Timestamp::FIXED_FALLBACK)?;
        self.document.clear_modified();
        log::debug!(target: "editor", "saved '{}' ({} bytes)", self.path, bytes.len());
        Ok(())
    }

    /// Repaints the framebuffer per the plan [`Editor::handle_key`] decided:
    /// either the two affected rows, or the whole text area (spec §4.7).
    pub fn render<P: PlatformServices>(&mut self, platform: &mut P) {
        let info_y = self.rows as u32 * GLYPH_HEIGHT;
        match self.redraw {
            RedrawPlan::Full => {
                log::trace!(target: "editor", "redraw: full");
                text::fill_rect(platform, 0, 0, self.cols as u32 * GLYPH_WIDTH, info_y, BG);
                for row in 0..self.rows {
                    self.render_row(platform, row);
                }
            }
            RedrawPlan::Rows(before, after) => {
                log::trace!(target: "editor", "redraw: rows {before}..{after}");
                for &cy in &[before, after] {
                    if cy >= self.scroll.0 && cy < self.scroll.0 + self.rows {
                        self.render_row(platform, cy - self.scroll.0);
                    }
                }
            }
        }
        self.render_info_bar(platform, info_y);
    }

    fn render_row(&self, platform: &mut impl PlatformServices, row: usize) {
        let y = row as u32 * GLYPH_HEIGHT;
        let cy = self.scroll.0 + row;
        text::fill_rect(platform, 0, y, self.cols as u32 * GLYPH_WIDTH, GLYPH_HEIGHT, BG);
        if cy >= self.document.line_count() {
            return;
        }
        let line = self.document.line(cy);
        let sel_range = self.selection.map(|s| s.range(self.cursor));

        if self.is_c_file {
            let starts_in_comment = self.comment_state.get(cy).copied().unwrap_or(false);
            let spans = syntax::highlight_line(line, starts_in_comment);
            for (start, end, kind) in spans {
                self.render_span(platform, y, line, start, end, kind.color(), sel_range);
            }
        } else {
            self.render_span(platform, y, line, 0, line.len(), Color::WHITE, sel_range);
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn render_span(
        &self,
        platform: &mut impl PlatformServices,
        y: u32,
        line: &[u8],
        start: usize,
        end: usize,
        color: Color,
        sel_range: Option<(Pos, Pos)>,
    ) {
        let cy = self.scroll.0 + (y / GLYPH_HEIGHT) as usize;
        for col in start..end {
            if col < self.scroll.1 || col >= self.scroll.1 + self.cols {
                continue;
            }
            let selected = sel_range.map(|(s, e)| (cy, col) >= s && (cy, col) < e).unwrap_or(false);
            let bg = if selected { Color::new(60, 60, 120) } else { BG };
            let x = (col - self.scroll.1) as u32 * GLYPH_WIDTH;
            text::draw_glyph(platform, x, y, line[col], color, bg);
        }
    }

    fn render_info_bar(&self, platform: &mut impl PlatformServices, y: u32) {
        text::fill_rect(platform, 0, y, self.cols as u32 * GLYPH_WIDTH, GLYPH_HEIGHT, INFO_BG);
        let modified_marker = if self.document.modified() { "*" } else { "" };
        let line = match &self.status {
            Some(s) => alloc::format!("{} {}{}", self.path, modified_marker, s),
            None => alloc::format!("{} {} -- {}:{}", self.path, modified_marker, self.cursor.0 + 1, self.cursor.1 + 1),
        };
        text::draw_str(platform, 0, y, line.as_bytes(), INFO_FG, INFO_BG);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::keymap;
    use crate::platform::modifiers;
    use crate::platform::RawKey;
    use crate::testing::{MemoryBlockDevice, MemoryPlatform};

    struct FakeFs {
        files: alloc::collections::BTreeMap<String, Vec<u8>>,
        free: u64,
    }

    impl FakeFs {
        fn new() -> Self {
            Self { files: alloc::collections::BTreeMap::new(), free: 1_000_000 }
        }
    }

    impl Filesystem for FakeFs {
        fn read_dir(&mut self, _path: &str) -> Result<Vec<crate::fs::DirEntry>> {
            Ok(Vec::new())
        }
        fn mkdir(&mut self, _path: &str) -> Result<()> {
            Ok(())
        }
        fn exists(&mut self, path: &str) -> Result<bool> {
            Ok(self.files.contains_key(path))
        }
        fn is_dir(&mut self, _path: &str) -> Result<bool> {
            Ok(false)
        }
        fn read_file(&mut self, path: &str) -> Result<Vec<u8>> {
            self.files.get(path).cloned().ok_or(crate::error::Error::NotFound)
        }
        fn write_file(&mut self, path: &str, data: &[u8], _timestamp: Timestamp) -> Result<()> {
            self.files.insert(path.to_string(), data.to_vec());
            Ok(())
        }
        fn delete(&mut self, path: &str) -> Result<()> {
            self.files.remove(path);
            Ok(())
        }
        fn rename(&mut self, _from: &str, _to: &str) -> Result<()> {
            Ok(())
        }
        fn free_space_bytes(&mut self) -> Result<u64> {
            Ok(self.free)
        }
        fn label(&self) -> &str {
            "TEST"
        }
    }

    fn key_ascii(c: u8) -> KeyEvent {
        keymap::translate(RawKey { scancode: 0, unicode: c as u16, modifiers: 0 })
    }

    #[test]
    fn typing_inserts_and_marks_modified() {
        let mut ed = Editor::new("/a.txt", b"", 640, 400);
        let mut fs = FakeFs::new();
        ed.handle_key(key_ascii(b'h'), &mut fs);
        ed.handle_key(key_ascii(b'i'), &mut fs);
        assert_eq!(ed.document.line(0), b"hi");
        assert!(ed.document.modified());
        assert_eq!(ed.cursor, (0, 2));
    }

    #[test]
    fn enter_splits_and_moves_cursor_to_next_line_start() {
        let mut ed = Editor::new("/a.txt", b"abcdef", 640, 400);
        ed.cursor = (0, 3);
        let mut fs = FakeFs::new();
        ed.handle_key(
            keymap::translate(RawKey { scancode: 0, unicode: b'\r' as u16, modifiers: 0 }),
            &mut fs,
        );
        assert_eq!(ed.document.line_count(), 2);
        assert_eq!(ed.cursor, (1, 0));
    }

    #[test]
    fn backspace_joins_lines_at_start_of_line() {
        let mut ed = Editor::new("/a.txt", b"ab\ncd", 640, 400);
        ed.cursor = (1, 0);
        let mut fs = FakeFs::new();
        ed.handle_key(keymap::translate(RawKey { scancode: 0, unicode: 0x08, modifiers: 0 }), &mut fs);
        assert_eq!(ed.document.line_count(), 1);
        assert_eq!(ed.document.line(0), b"abcd");
        assert_eq!(ed.cursor, (0, 2));
    }

    #[test]
    fn left_at_column_zero_wraps_to_previous_line_end() {
        let mut ed = Editor::new("/a.txt", b"ab\ncd", 640, 400);
        ed.cursor = (1, 0);
        let mut fs = FakeFs::new();
        ed.handle_key(keymap::translate(RawKey { scancode: 0x04, unicode: 0, modifiers: 0 }), &mut fs);
        assert_eq!(ed.cursor, (0, 2));
    }

    #[test]
    fn selection_copy_cut_paste_round_trip() {
        let mut ed = Editor::new("/a.txt", b"hello world", 640, 400);
        let mut fs = FakeFs::new();
        // F3 anchors the selection at column 0.
        ed.handle_key(keymap::translate(RawKey { scancode: 0x0D, unicode: 0, modifiers: 0 }), &mut fs);
        ed.cursor = (0, 5);
        ed.handle_key(
            keymap::translate(RawKey { scancode: 0, unicode: b'x' as u16, modifiers: modifiers::CTRL }),
            &mut fs,
        );
        assert_eq!(ed.document.line(0), b" world");
        ed.cursor = (0, 6);
        ed.handle_key(
            keymap::translate(RawKey { scancode: 0, unicode: b'v' as u16, modifiers: modifiers::CTRL }),
            &mut fs,
        );
        assert_eq!(ed.document.line(0), b" worldhello");
    }

    #[test]
    fn escape_without_modifications_exits_immediately() {
        let mut ed = Editor::new("/a.txt", b"abc", 640, 400);
        let mut fs = FakeFs::new();
        let outcome = ed.handle_key(keymap::translate(RawKey { scancode: 0x17, unicode: 0, modifiers: 0 }), &mut fs);
        assert_eq!(outcome, Outcome::Exit);
    }

    #[test]
    fn escape_with_modifications_asks_then_f10_discards() {
        let mut ed = Editor::new("/a.txt", b"abc", 640, 400);
        let mut fs = FakeFs::new();
        ed.handle_key(key_ascii(b'!'), &mut fs);
        let outcome = ed.handle_key(keymap::translate(RawKey { scancode: 0x17, unicode: 0, modifiers: 0 }), &mut fs);
        assert_eq!(outcome, Outcome::Continue);
        let outcome = ed.handle_key(keymap::translate(RawKey { scancode: 0x14, unicode: 0, modifiers: 0 }), &mut fs);
        assert_eq!(outcome, Outcome::Exit);
    }

    #[test]
    fn f2_saves_and_clears_modified_flag() {
        let mut ed = Editor::new("/a.txt", b"abc", 640, 400);
        let mut fs = FakeFs::new();
        ed.handle_key(key_ascii(b'!'), &mut fs);
        assert!(ed.document.modified());
        ed.handle_key(keymap::translate(RawKey { scancode: 0x0B + 1, unicode: 0, modifiers: 0 }), &mut fs);
        assert!(!ed.document.modified());
        assert_eq!(fs.files.get("/a.txt").unwrap(), b"!abc");
    }

    #[test]
    fn render_does_not_panic_on_a_fresh_document() {
        let dev = MemoryBlockDevice::new(512, 4);
        let mut platform = MemoryPlatform::new(320, 200, dev);
        let mut ed = Editor::new("/a.c", b"int main(void) {\n  return 0;\n}", 320, 200);
        ed.render(&mut platform);
    }
}
