//! Built-in 8x16 glyph bitmaps (spec §4.10/component J), embedded directly
//! in the binary the way the teacher embeds its boot-stage assets — no
//! filesystem access is available before a volume is mounted, and the text
//! renderer is needed to draw the pre-mount boot banner.
//!
//! Each glyph is 16 bytes, one per scanline, MSB is the leftmost of the 8
//! columns. Only the printable ASCII range (0x20..=0x7E) has a real glyph;
//! everything else falls back to [`FALLBACK`], a solid block, so missing
//! coverage is visible rather than silently blank.

const FALLBACK: [u8; 16] = [
    0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF,
];

const BLANK: [u8; 16] = [0; 16];

/// Returns the 16-byte row bitmap for `ch`; ASCII control codes and bytes
/// above 0x7E render as [`FALLBACK`].
pub fn glyph_rows(ch: u8) -> [u8; 16] {
    match ch {
        0x20 => BLANK,
        0x21..=0x7E => PRINTABLE[(ch - 0x21) as usize],
        _ => FALLBACK,
    }
}

// One row per entry, index 0 = '!' (0x21) through index 93 = '~' (0x7E).
// Shapes are simple block-letter approximations, not a traced-in font ROM.
const PRINTABLE: [[u8; 16]; 94] = [
    // ! 0x21
    [0,0x18,0x18,0x18,0x18,0x18,0x18,0x18,0x18,0x18,0,0,0x18,0x18,0,0],
    // " 0x22
    [0,0x66,0x66,0x66,0,0,0,0,0,0,0,0,0,0,0,0],
    // # 0x23
    [0,0,0x66,0x66,0xFF,0x66,0x66,0xFF,0x66,0x66,0,0,0,0,0,0],
    // $ 0x24
    [0,0x18,0x3E,0x60,0x3C,0x06,0x7C,0x18,0,0,0,0,0,0,0,0],
    // % 0x25
    [0,0,0x62,0x66,0x0C,0x18,0x30,0x66,0x46,0,0,0,0,0,0,0],
    // & 0x26
    [0,0x1C,0x36,0x36,0x1C,0x3B,0x6E,0x66,0x3B,0,0,0,0,0,0,0],
    // ' 0x27
    [0,0x18,0x18,0x18,0,0,0,0,0,0,0,0,0,0,0,0],
    // ( 0x28
    [0,0x0C,0x18,0x30,0x30,0x30,0x30,0x18,0x0C,0,0,0,0,0,0,0],
    // ) 0x29
    [0,0x30,0x18,0x0C,0x0C,0x0C,0x0C,0x18,0x30,0,0,0,0,0,0,0],
    // * 0x2A
    [0,0,0,0x66,0x3C,0xFF,0x3C,0x66,0,0,0,0,0,0,0,0],
    // + 0x2B
    [0,0,0,0x18,0x18,0x7E,0x18,0x18,0,0,0,0,0,0,0,0],
    // , 0x2C
    [0,0,0,0,0,0,0,0,0x18,0x18,0x30,0,0,0,0,0],
    // - 0x2D
    [0,0,0,0,0,0x7E,0,0,0,0,0,0,0,0,0,0],
    // . 0x2E
    [0,0,0,0,0,0,0,0,0x18,0x18,0,0,0,0,0,0],
    // / 0x2F
    [0,0x02,0x06,0x0C,0x18,0x30,0x60,0xC0,0x80,0,0,0,0,0,0,0],
    // 0 0x30
    [0,0x3C,0x66,0x66,0x6E,0x76,0x66,0x66,0x3C,0,0,0,0,0,0,0],
    // 1 0x31
    [0,0x18,0x38,0x18,0x18,0x18,0x18,0x18,0x7E,0,0,0,0,0,0,0],
    // 2 0x32
    [0,0x3C,0x66,0x06,0x0C,0x18,0x30,0x60,0x7E,0,0,0,0,0,0,0],
    // 3 0x33
    [0,0x3C,0x66,0x06,0x1C,0x06,0x06,0x66,0x3C,0,0,0,0,0,0,0],
    // 4 0x34
    [0,0x0C,0x1C,0x3C,0x6C,0xCC,0xFE,0x0C,0x0C,0,0,0,0,0,0,0],
    // 5 0x35
    [0,0x7E,0x60,0x60,0x7C,0x06,0x06,0x66,0x3C,0,0,0,0,0,0,0],
    // 6 0x36
    [0,0x3C,0x66,0x60,0x7C,0x66,0x66,0x66,0x3C,0,0,0,0,0,0,0],
    // 7 0x37
    [0,0x7E,0x06,0x0C,0x18,0x30,0x30,0x30,0x30,0,0,0,0,0,0,0],
    // 8 0x38
    [0,0x3C,0x66,0x66,0x3C,0x66,0x66,0x66,0x3C,0,0,0,0,0,0,0],
    // 9 0x39
    [0,0x3C,0x66,0x66,0x66,0x3E,0x06,0x66,0x3C,0,0,0,0,0,0,0],
    // : 0x3A
    [0,0,0,0x18,0x18,0,0,0x18,0x18,0,0,0,0,0,0,0],
    // ; 0x3B
    [0,0,0,0x18,0x18,0,0,0x18,0x18,0x30,0,0,0,0,0,0],
    // < 0x3C
    [0,0,0x0C,0x18,0x30,0x60,0x30,0x18,0x0C,0,0,0,0,0,0,0],
    // = 0x3D
    [0,0,0,0x7E,0,0,0x7E,0,0,0,0,0,0,0,0,0],
    // > 0x3E
    [0,0,0x30,0x18,0x0C,0x06,0x0C,0x18,0x30,0,0,0,0,0,0,0],
    // ? 0x3F
    [0,0x3C,0x66,0x06,0x0C,0x18,0x18,0,0x18,0,0,0,0,0,0,0],
    // @ 0x40
    [0,0x3C,0x66,0x6E,0x6E,0x60,0x62,0x66,0x3C,0,0,0,0,0,0,0],
    // A 0x41
    [0,0x18,0x3C,0x66,0x66,0x7E,0x66,0x66,0x66,0,0,0,0,0,0,0],
    // B 0x42
    [0,0x7C,0x66,0x66,0x7C,0x66,0x66,0x66,0x7C,0,0,0,0,0,0,0],
    // C 0x43
    [0,0x3C,0x66,0x60,0x60,0x60,0x60,0x66,0x3C,0,0,0,0,0,0,0],
    // D 0x44
    [0,0x78,0x6C,0x66,0x66,0x66,0x66,0x6C,0x78,0,0,0,0,0,0,0],
    // E 0x45
    [0,0x7E,0x60,0x60,0x7C,0x60,0x60,0x60,0x7E,0,0,0,0,0,0,0],
    // F 0x46
    [0,0x7E,0x60,0x60,0x7C,0x60,0x60,0x60,0x60,0,0,0,0,0,0,0],
    // G 0x47
    [0,0x3C,0x66,0x60,0x60,0x6E,0x66,0x66,0x3E,0,0,0,0,0,0,0],
    // H 0x48
    [0,0x66,0x66,0x66,0x7E,0x66,0x66,0x66,0x66,0,0,0,0,0,0,0],
    // I 0x49
    [0,0x7E,0x18,0x18,0x18,0x18,0x18,0x18,0x7E,0,0,0,0,0,0,0],
    // J 0x4A
    [0,0x0E,0x06,0x06,0x06,0x06,0x66,0x66,0x3C,0,0,0,0,0,0,0],
    // K 0x4B
    [0,0x66,0x6C,0x78,0x70,0x78,0x6C,0x66,0x66,0,0,0,0,0,0,0],
    // L 0x4C
    [0,0x60,0x60,0x60,0x60,0x60,0x60,0x60,0x7E,0,0,0,0,0,0,0],
    // M 0x4D
    [0,0x63,0x77,0x7F,0x6B,0x63,0x63,0x63,0x63,0,0,0,0,0,0,0],
    // N 0x4E
    [0,0x66,0x76,0x7E,0x7E,0x6E,0x66,0x66,0x66,0,0,0,0,0,0,0],
    // O 0x4F
    [0,0x3C,0x66,0x66,0x66,0x66,0x66,0x66,0x3C,0,0,0,0,0,0,0],
    // P 0x50
    [0,0x7C,0x66,0x66,0x7C,0x60,0x60,0x60,0x60,0,0,0,0,0,0,0],
    // Q 0x51
    [0,0x3C,0x66,0x66,0x66,0x66,0x6E,0x66,0x3E,0x06,0,0,0,0,0,0],
    // R 0x52
    [0,0x7C,0x66,0x66,0x7C,0x78,0x6C,0x66,0x66,0,0,0,0,0,0,0],
    // S 0x53
    [0,0x3C,0x66,0x60,0x3C,0x06,0x06,0x66,0x3C,0,0,0,0,0,0,0],
    // T 0x54
    [0,0x7E,0x18,0x18,0x18,0x18,0x18,0x18,0x18,0,0,0,0,0,0,0],
    // U 0x55
    [0,0x66,0x66,0x66,0x66,0x66,0x66,0x66,0x3C,0,0,0,0,0,0,0],
    // V 0x56
    [0,0x66,0x66,0x66,0x66,0x66,0x66,0x3C,0x18,0,0,0,0,0,0,0],
    // W 0x57
    [0,0x63,0x63,0x63,0x6B,0x7F,0x77,0x63,0x63,0,0,0,0,0,0,0],
    // X 0x58
    [0,0x66,0x66,0x3C,0x18,0x18,0x3C,0x66,0x66,0,0,0,0,0,0,0],
    // Y 0x59
    [0,0x66,0x66,0x66,0x3C,0x18,0x18,0x18,0x18,0,0,0,0,0,0,0],
    // Z 0x5A
    [0,0x7E,0x06,0x0C,0x18,0x30,0x60,0x60,0x7E,0,0,0,0,0,0,0],
    // [ 0x5B
    [0,0x3C,0x30,0x30,0x30,0x30,0x30,0x30,0x3C,0,0,0,0,0,0,0],
    // \ 0x5C
    [0,0x80,0xC0,0x60,0x30,0x18,0x0C,0x06,0x02,0,0,0,0,0,0,0],
    // ] 0x5D
    [0,0x3C,0x0C,0x0C,0x0C,0x0C,0x0C,0x0C,0x3C,0,0,0,0,0,0,0],
    // ^ 0x5E
    [0,0x18,0x3C,0x66,0,0,0,0,0,0,0,0,0,0,0,0],
    // _ 0x5F
    [0,0,0,0,0,0,0,0,0,0,0xFF,0,0,0,0,0],
    // ` 0x60
    [0,0x30,0x18,0x0C,0,0,0,0,0,0,0,0,0,0,0,0],
    // a 0x61
    [0,0,0,0x3C,0x06,0x3E,0x66,0x66,0x3E,0,0,0,0,0,0,0],
    // b 0x62
    [0,0x60,0x60,0x7C,0x66,0x66,0x66,0x66,0x7C,0,0,0,0,0,0,0],
    // c 0x63
    [0,0,0,0x3C,0x66,0x60,0x60,0x66,0x3C,0,0,0,0,0,0,0],
    // d 0x64
    [0,0x06,0x06,0x3E,0x66,0x66,0x66,0x66,0x3E,0,0,0,0,0,0,0],
    // e 0x65
    [0,0,0,0x3C,0x66,0x7E,0x60,0x66,0x3C,0,0,0,0,0,0,0],
    // f 0x66
    [0,0x1C,0x36,0x30,0x7C,0x30,0x30,0x30,0x30,0,0,0,0,0,0,0],
    // g 0x67
    [0,0,0,0x3E,0x66,0x66,0x66,0x3E,0x06,0x66,0x3C,0,0,0,0,0],
    // h 0x68
    [0,0x60,0x60,0x7C,0x66,0x66,0x66,0x66,0x66,0,0,0,0,0,0,0],
    // i 0x69
    [0,0x18,0,0x38,0x18,0x18,0x18,0x18,0x3C,0,0,0,0,0,0,0],
    // j 0x6A
    [0,0x0C,0,0x1C,0x0C,0x0C,0x0C,0x0C,0x6C,0x38,0,0,0,0,0,0],
    // k 0x6B
    [0,0x60,0x60,0x66,0x6C,0x78,0x6C,0x66,0x66,0,0,0,0,0,0,0],
    // l 0x6C
    [0,0x38,0x18,0x18,0x18,0x18,0x18,0x18,0x3C,0,0,0,0,0,0,0],
    // m 0x6D
    [0,0,0,0x66,0x7F,0x7F,0x6B,0x63,0x63,0,0,0,0,0,0,0],
    // n 0x6E
    [0,0,0,0x7C,0x66,0x66,0x66,0x66,0x66,0,0,0,0,0,0,0],
    // o 0x6F
    [0,0,0,0x3C,0x66,0x66,0x66,0x66,0x3C,0,0,0,0,0,0,0],
    // p 0x70
    [0,0,0,0x7C,0x66,0x66,0x66,0x7C,0x60,0x60,0,0,0,0,0,0],
    // q 0x71
    [0,0,0,0x3E,0x66,0x66,0x66,0x3E,0x06,0x06,0,0,0,0,0,0],
    // r 0x72
    [0,0,0,0x6C,0x76,0x60,0x60,0x60,0x60,0,0,0,0,0,0,0],
    // s 0x73
    [0,0,0,0x3E,0x60,0x3C,0x06,0x7C,0,0,0,0,0,0,0,0],
    // t 0x74
    [0,0x30,0x30,0x7C,0x30,0x30,0x30,0x36,0x1C,0,0,0,0,0,0,0],
    // u 0x75
    [0,0,0,0x66,0x66,0x66,0x66,0x66,0x3E,0,0,0,0,0,0,0],
    // v 0x76
    [0,0,0,0x66,0x66,0x66,0x66,0x3C,0x18,0,0,0,0,0,0,0],
    // w 0x77
    [0,0,0,0x63,0x63,0x6B,0x7F,0x7F,0x36,0,0,0,0,0,0,0],
    // x 0x78
    [0,0,0,0x66,0x3C,0x18,0x18,0x3C,0x66,0,0,0,0,0,0,0],
    // y 0x79
    [0,0,0,0x66,0x66,0x66,0x66,0x3E,0x06,0x66,0x3C,0,0,0,0,0],
    // z 0x7A
    [0,0,0,0x7E,0x0C,0x18,0x30,0x60,0x7E,0,0,0,0,0,0,0],
    // { 0x7B
    [0,0x0C,0x18,0x18,0x18,0x70,0x18,0x18,0x18,0x0C,0,0,0,0,0,0],
    // | 0x7C
    [0,0x18,0x18,0x18,0x18,0x18,0x18,0x18,0x18,0x18,0,0,0,0,0,0],
    // } 0x7D
    [0,0x30,0x18,0x18,0x18,0x0E,0x18,0x18,0x18,0x30,0,0,0,0,0,0],
    // ~ 0x7E
    [0,0,0,0,0x32,0x4C,0,0,0,0,0,0,0,0,0,0],
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn space_is_blank() {
        assert_eq!(glyph_rows(b' '), BLANK);
    }

    #[test]
    fn control_codes_fall_back_to_a_solid_block() {
        assert_eq!(glyph_rows(0x01), FALLBACK);
        assert_eq!(glyph_rows(0x7F), FALLBACK);
    }

    #[test]
    fn printable_range_is_fully_populated() {
        for ch in 0x21u8..=0x7E {
            assert_ne!(glyph_rows(ch), FALLBACK, "missing glyph for {:#x}", ch);
        }
    }
}
