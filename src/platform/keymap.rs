//! Keyboard mapping (component N, spec §4.10): normalizes a platform
//! [`RawKey`](super::RawKey) into a [`KeyEvent`] with a closed set of named
//! keys, and applies the Ctrl-letter normalisation rule that shields the
//! editor from firmware variance in how Ctrl+<letter> is reported.

use super::{modifiers, RawKey};

/// Named non-printable keys, matching the UEFI Simple Text Input scan-code
/// set this workstation's firmware exposes. Values above `0xFF00` can never
/// collide with a Unicode codepoint or a Ctrl-normalised control character.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum NamedKey {
    Up = 0xFF01,
    Down = 0xFF02,
    Right = 0xFF03,
    Left = 0xFF04,
    Home = 0xFF05,
    End = 0xFF06,
    Insert = 0xFF07,
    Delete = 0xFF08,
    PageUp = 0xFF09,
    PageDown = 0xFF0A,
    F1 = 0xFF10,
    F2 = 0xFF11,
    F3 = 0xFF12,
    F4 = 0xFF13,
    F5 = 0xFF14,
    F6 = 0xFF15,
    F7 = 0xFF16,
    F8 = 0xFF17,
    F9 = 0xFF18,
    F10 = 0xFF19,
    F11 = 0xFF1A,
    F12 = 0xFF1B,
    Escape = 0xFF1C,
}

/// Raw UEFI-style scan codes, in firmware order starting at 1.
const SCAN_UP: u16 = 0x01;
const SCAN_DOWN: u16 = 0x02;
const SCAN_RIGHT: u16 = 0x03;
const SCAN_LEFT: u16 = 0x04;
const SCAN_HOME: u16 = 0x05;
const SCAN_END: u16 = 0x06;
const SCAN_INSERT: u16 = 0x07;
const SCAN_DELETE: u16 = 0x08;
const SCAN_PAGE_UP: u16 = 0x09;
const SCAN_PAGE_DOWN: u16 = 0x0A;
const SCAN_F1: u16 = 0x0B;
const SCAN_F12: u16 = 0x16;
const SCAN_ESC: u16 = 0x17;

/// A normalised keystroke: a `code` (Unicode/ASCII, a [`NamedKey`], or a
/// Ctrl-normalised control character 1..26), the original firmware
/// `scancode`, and the modifier bitmask (spec §6.3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyEvent {
    pub code: u16,
    pub scancode: u16,
    pub modifiers: u8,
}

impl KeyEvent {
    pub fn ctrl(self) -> bool {
        self.modifiers & modifiers::CTRL != 0
    }
    pub fn alt(self) -> bool {
        self.modifiers & modifiers::ALT != 0
    }
    pub fn shift(self) -> bool {
        self.modifiers & modifiers::SHIFT != 0
    }

    pub fn named(self) -> Option<NamedKey> {
        named_key_from_code(self.code)
    }

    /// The byte this event would insert into a document, if it is a plain
    /// printable ASCII character with no Ctrl/Alt held.
    pub fn printable_ascii(self) -> Option<u8> {
        if self.ctrl() || self.alt() {
            return None;
        }
        if (0x20..=0x7E).contains(&self.code) {
            Some(self.code as u8)
        } else {
            None
        }
    }
}

fn named_key_from_code(code: u16) -> Option<NamedKey> {
    use NamedKey::*;
    Some(match code {
        0xFF01 => Up,
        0xFF02 => Down,
        0xFF03 => Right,
        0xFF04 => Left,
        0xFF05 => Home,
        0xFF06 => End,
        0xFF07 => Insert,
        0xFF08 => Delete,
        0xFF09 => PageUp,
        0xFF0A => PageDown,
        0xFF10 => F1,
        0xFF11 => F2,
        0xFF12 => F3,
        0xFF13 => F4,
        0xFF14 => F5,
        0xFF15 => F6,
        0xFF16 => F7,
        0xFF17 => F8,
        0xFF18 => F9,
        0xFF19 => F10,
        0xFF1A => F11,
        0xFF1B => F12,
        0xFF1C => Escape,
        _ => return None,
    })
}

fn scancode_to_named(scancode: u16) -> Option<NamedKey> {
    use NamedKey::*;
    Some(match scancode {
        SCAN_UP => Up,
        SCAN_DOWN => Down,
        SCAN_RIGHT => Right,
        SCAN_LEFT => Left,
        SCAN_HOME => Home,
        SCAN_END => End,
        SCAN_INSERT => Insert,
        SCAN_DELETE => Delete,
        SCAN_PAGE_UP => PageUp,
        SCAN_PAGE_DOWN => PageDown,
        SCAN_ESC => Escape,
        SCAN_F1..=SCAN_F12 => {
            let idx = scancode - SCAN_F1;
            // F1..F12 are contiguous in both the scan-code space and the enum.
            return Some(unsafe {
                core::mem::transmute::<u16, NamedKey>(NamedKey::F1 as u16 + idx)
            });
        }
        _ => return None,
    })
}

/// Translate one firmware keystroke into a [`KeyEvent`], applying the
/// Ctrl-letter normalisation rule (spec §4.10): when Ctrl is held and the
/// reported Unicode character is in `[a-zA-Z]`, `code` becomes the
/// corresponding control character (1..26) regardless of whether the
/// firmware already delivered it that way.
pub fn translate(raw: RawKey) -> KeyEvent {
    let code = if let Some(named) = scancode_to_named(raw.scancode) {
        named as u16
    } else if raw.modifiers & modifiers::CTRL != 0 && raw.unicode.is_ascii() && (raw.unicode as u8).is_ascii_alphabetic() {
        (((raw.unicode as u8).to_ascii_uppercase() - b'A') + 1) as u16
    } else if raw.unicode != 0 {
        raw.unicode
    } else {
        0
    };

    KeyEvent {
        code,
        scancode: raw.scancode,
        modifiers: raw.modifiers,
    }
}

/// CUA remaps applied one level above keymap translation (spec §4.10): the
/// editor and browser both need the same three rewrites, so they are data
/// here instead of duplicated match arms at each call site.
pub fn cua_remap(ev: KeyEvent) -> KeyEvent {
    match (ev.named(), ev.shift(), ev.ctrl()) {
        (Some(NamedKey::Insert), true, _) => ctrl_letter(ev, b'V'),
        (Some(NamedKey::Insert), _, true) => ctrl_letter(ev, b'C'),
        (Some(NamedKey::Delete), true, _) => ctrl_letter(ev, b'X'),
        _ => ev,
    }
}

fn ctrl_letter(ev: KeyEvent, letter: u8) -> KeyEvent {
    KeyEvent {
        code: ((letter - b'A') + 1) as u16,
        scancode: ev.scancode,
        modifiers: modifiers::CTRL,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(scancode: u16, unicode: u16, mods: u8) -> RawKey {
        RawKey { scancode, unicode, modifiers: mods }
    }

    #[test]
    fn ctrl_c_normalises_regardless_of_firmware_delivery() {
        // Firmware A: delivers the letter with Ctrl held.
        let a = translate(raw(0, b'c' as u16, modifiers::CTRL));
        // Firmware B: delivers the control character directly.
        let b = translate(raw(0, 0x03, modifiers::CTRL));
        assert_eq!(a.code, 3);
        assert_eq!(b.code, 3);
    }

    #[test]
    fn named_keys_survive_round_trip() {
        let ev = translate(raw(SCAN_F1 + 2, 0, 0));
        assert_eq!(ev.named(), Some(NamedKey::F3));
    }

    #[test]
    fn printable_ascii_rejects_ctrl_and_alt() {
        let ev = translate(raw(0, b'x' as u16, modifiers::ALT));
        assert_eq!(ev.printable_ascii(), None);
        let ev2 = translate(raw(0, b'x' as u16, 0));
        assert_eq!(ev2.printable_ascii(), Some(b'x'));
    }

    #[test]
    fn cua_shift_insert_is_ctrl_v() {
        let ev = translate(raw(SCAN_INSERT, 0, modifiers::SHIFT));
        let remapped = cua_remap(ev);
        assert_eq!(remapped.code, 22); // Ctrl+V
        assert!(remapped.ctrl());
    }
}
