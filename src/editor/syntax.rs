//! C/H syntax highlighting (spec §3.8/§4.7): block-comment state vector and
//! the per-line tokeniser.

use alloc::vec;
use alloc::vec::Vec;

use crate::color::Color;
use crate::editor::document::Document;

/// The 24 ISO-C reserved words that are not type specifiers (spec §4.7).
const KEYWORDS: &[&str] = &[
    "auto", "break", "case", "const", "continue", "default", "do", "else", "enum", "extern",
    "for", "goto", "if", "inline", "register", "return", "sizeof", "static", "struct", "switch",
    "typedef", "union", "volatile", "while",
];

/// Standard C types, fixed-width integer aliases, platform status/handle
/// types, and the boolean/null constants (spec §4.7).
const TYPES: &[&str] = &[
    "void", "char", "short", "int", "long", "float", "double", "signed", "unsigned",
    "int8_t", "int16_t", "int32_t", "int64_t", "uint8_t", "uint16_t", "uint32_t", "uint64_t",
    "size_t", "EFI_STATUS", "EFI_HANDLE", "NULL", "TRUE", "FALSE",
];

fn in_table(table: &[&str], word: &str) -> bool {
    // Linear scan with an early length-mismatch bail-out, no hashing
    // (spec §4.7) — the tables are small enough that this beats building
    // and maintaining a hash set.
    for &candidate in table {
        if candidate.len() != word.len() {
            continue;
        }
        if candidate == word {
            return true;
        }
    }
    false
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    Default,
    Keyword,
    Type,
    String,
    Comment,
    Number,
    Preprocessor,
}

impl TokenKind {
    pub fn color(self) -> Color {
        match self {
            TokenKind::Default => Color::new(220, 220, 220),
            TokenKind::Keyword => Color::new(86, 156, 214),
            TokenKind::Type => Color::new(78, 201, 176),
            TokenKind::String => Color::new(206, 145, 120),
            TokenKind::Comment => Color::new(106, 153, 85),
            TokenKind::Number => Color::new(181, 206, 168),
            TokenKind::Preprocessor => Color::new(197, 134, 192),
        }
    }
}

/// One byte per line: whether the line starts inside a block comment
/// (spec §3.8). Recomputed from scratch before every full redraw.
pub fn recompute_comment_state(doc: &Document) -> Vec<bool> {
    let mut state = vec![false; doc.line_count()];
    let mut in_comment = false;
    for y in 0..doc.line_count() {
        state[y] = in_comment;
        let line = doc.line(y);
        let mut i = 0;
        while i < line.len() {
            if in_comment {
                if line[i] == b'*' && i + 1 < line.len() && line[i + 1] == b'/' {
                    in_comment = false;
                    i += 2;
                    continue;
                }
            } else if line[i] == b'/' && i + 1 < line.len() && line[i + 1] == b'*' {
                in_comment = true;
                i += 2;
                continue;
            } else if line[i] == b'/' && i + 1 < line.len() && line[i + 1] == b'/' {
                break; // rest of line is a line comment, irrelevant to block state
            } else if line[i] == b'"' || line[i] == b'\'' {
                let quote = line[i];
                i += 1;
                while i < line.len() && line[i] != quote {
                    if line[i] == b'\\' && i + 1 < line.len() {
                        i += 1;
                    }
                    i += 1;
                }
            }
            i += 1;
        }
    }
    state
}

fn is_ident_start(b: u8) -> bool {
    b.is_ascii_alphabetic() || b == b'_'
}

fn is_ident_continue(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_'
}

/// Tokenises one line into `(start_col, end_col, kind)` spans covering the
/// whole line, following the priority order in spec §4.7. `starts_in_comment`
/// is this line's entry from [`recompute_comment_state`].
pub fn highlight_line(line: &[u8], starts_in_comment: bool) -> Vec<(usize, usize, TokenKind)> {
    let mut spans = Vec::new();
    let mut i = 0usize;
    let mut in_comment = starts_in_comment;

    if in_comment {
        let start = i;
        while i < line.len() {
            if line[i] == b'*' && i + 1 < line.len() && line[i + 1] == b'/' {
                i += 2;
                in_comment = false;
                break;
            }
            i += 1;
        }
        spans.push((start, i, TokenKind::Comment));
    }

    if !in_comment && i < line.len() {
        let first_non_ws = line[i..].iter().position(|&b| b != b' ' && b != b'\t');
        if let Some(off) = first_non_ws {
            if line[i + off] == b'#' {
                spans.push((i, line.len(), TokenKind::Preprocessor));
                i = line.len();
            }
        }
    }

    while i < line.len() {
        let b = line[i];

        if b == b'/' && i + 1 < line.len() && line[i + 1] == b'/' {
            spans.push((i, line.len(), TokenKind::Comment));
            i = line.len();
            break;
        }

        if b == b'/' && i + 1 < line.len() && line[i + 1] == b'*' {
            let start = i;
            i += 2;
            while i < line.len() {
                if line[i] == b'*' && i + 1 < line.len() && line[i + 1] == b'/' {
                    i += 2;
                    break;
                }
                i += 1;
            }
            spans.push((start, i, TokenKind::Comment));
            continue;
        }

        if b == b'"' || b == b'\'' {
            let start = i;
            let quote = b;
            i += 1;
            while i < line.len() && line[i] != quote {
                if line[i] == b'\\' && i + 1 < line.len() {
                    i += 1;
                }
                i += 1;
            }
            if i < line.len() {
                i += 1; // consume the closing quote
            }
            spans.push((start, i, TokenKind::String));
            continue;
        }

        let prev_is_ident = start_of_prev_ident(line, i);
        if (b.is_ascii_digit() || (b == b'.' && i + 1 < line.len() && line[i + 1].is_ascii_digit())) && !prev_is_ident {
            let start = i;
            while i < line.len() && (line[i].is_ascii_hexdigit() || matches!(line[i], b'x' | b'X' | b'.' | b'u' | b'U' | b'l' | b'L')) {
                i += 1;
            }
            spans.push((start, i, TokenKind::Number));
            continue;
        }

        if is_ident_start(b) {
            let start = i;
            while i < line.len() && is_ident_continue(line[i]) {
                i += 1;
            }
            let word = core::str::from_utf8(&line[start..i]).unwrap_or("");
            let kind = if in_table(KEYWORDS, word) {
                TokenKind::Keyword
            } else if in_table(TYPES, word) {
                TokenKind::Type
            } else {
                TokenKind::Default
            };
            spans.push((start, i, kind));
            continue;
        }

        let start = i;
        i += 1;
        spans.push((start, i, TokenKind::Default));
    }

    spans
}

fn start_of_prev_ident(line: &[u8], i: usize) -> bool {
    i > 0 && is_ident_continue(line[i - 1]) && is_ident_start(line[i - 1])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::editor::document::Document;

    #[test]
    fn comment_state_tracks_across_lines() {
        let doc = Document::from_bytes(b"int a; /* start\nstill going\nend */ int b;");
        let state = recompute_comment_state(&doc);
        assert_eq!(state, [false, true, true]);
    }

    #[test]
    fn string_literal_absorbs_escaped_quote() {
        let spans = highlight_line(br#"char *s = "a\"b";"#, false);
        let string_span = spans.iter().find(|(_, _, k)| *k == TokenKind::String).unwrap();
        let (s, e, _) = *string_span;
        assert_eq!(&br#"char *s = "a\"b";"#[s..e], br#""a\"b""#);
    }

    #[test]
    fn keyword_and_type_are_distinguished() {
        let spans = highlight_line(b"static int x;", false);
        assert!(spans.iter().any(|&(s, e, k)| k == TokenKind::Keyword && &b"static int x;"[s..e] == b"static"));
        assert!(spans.iter().any(|&(s, e, k)| k == TokenKind::Type && &b"static int x;"[s..e] == b"int"));
    }

    #[test]
    fn preprocessor_line_is_whole_line() {
        let spans = highlight_line(b"  #include <stdio.h>", false);
        assert_eq!(spans, vec![(0, 20, TokenKind::Preprocessor)]);
    }

    #[test]
    fn number_does_not_start_mid_identifier() {
        let spans = highlight_line(b"a1b2", false);
        assert!(spans.iter().all(|&(_, _, k)| k != TokenKind::Number));
    }

    #[test]
    fn hex_and_suffix_characters_stay_in_the_number_token() {
        let spans = highlight_line(b"0xFFu + 3.14f", false);
        let (s, e, k) = spans[0];
        assert_eq!(k, TokenKind::Number);
        assert_eq!(&b"0xFFu + 3.14f"[s..e], b"0xFFu");
    }
}
