//! Display glyph encoding
//!
//! The sign predates Unicode. Plain ASCII passes through; Czech letters and
//! a handful of pictograms are sent as two-byte `0x0E xx` escapes (two
//! uppercase letters have single-byte codes). Unknown non-ASCII characters
//! become a space.
//!
//! A *glyph* is one displayed cell: either a single byte or an escape pair.
//! Truncation and the transition wipe work in glyphs so an escape is never
//! split.

use heapless::Vec;

/// Escape byte introducing a two-byte display glyph
pub const ESCAPE: u8 = 0x0E;

/// Emoji presentation selector, dropped from the input
const VARIATION_SELECTOR: char = '\u{FE0F}';

/// Map a character to its display bytes
///
/// Returns `None` for characters without a table entry.
fn lookup(c: char) -> Option<&'static [u8]> {
    let bytes: &'static [u8] = match c {
        // Czech lowercase
        'á' => &[ESCAPE, 0x20],
        'í' => &[ESCAPE, 0x21],
        'ó' => &[ESCAPE, 0x22],
        'ú' => &[ESCAPE, 0x23],
        'ň' => &[ESCAPE, 0x24],
        'š' => &[ESCAPE, 0x28],
        'ř' => &[ESCAPE, 0x29],
        'é' => &[ESCAPE, 0x82],
        'ď' => &[ESCAPE, 0x83],
        'č' => &[ESCAPE, 0x87],
        'ě' => &[ESCAPE, 0x88],
        'ž' => &[ESCAPE, 0x91],
        'ů' => &[ESCAPE, 0x96],
        'ý' => &[ESCAPE, 0x98],
        'ť' => &[ESCAPE, 0x9F],

        // Czech uppercase (Ů and Í have single-byte codes)
        'Ů' => &[0x96],
        'Í' => &[0x7F],
        'Č' => &[ESCAPE, 0x80],
        'Ď' => &[ESCAPE, 0x85],
        'Ť' => &[ESCAPE, 0x86],
        'Ě' => &[ESCAPE, 0x89],
        'Á' => &[ESCAPE, 0x8F],
        'É' => &[ESCAPE, 0x90],
        'Ň' => &[ESCAPE, 0xA5],
        'Ž' => &[ESCAPE, 0x92],
        'Ó' => &[ESCAPE, 0x95],
        'Ú' => &[ESCAPE, 0x97],
        'Ý' => &[ESCAPE, 0x9D],
        'Š' => &[ESCAPE, 0x9B],
        'Ř' => &[ESCAPE, 0x9E],

        // Transport
        '🚌' => &[ESCAPE, 0x72],
        '🚊' | '🚋' => &[ESCAPE, 0x73],
        '🚎' => &[ESCAPE, 0xF4],
        '🚂' => &[ESCAPE, 0x76],
        '🚆' | '🚇' => &[ESCAPE, 0x74],
        '\u{2708}' | '\u{1F6E9}' => &[ESCAPE, 0xF7],
        '\u{2693}' | '\u{1F6F3}' | '⛵' | '🚢' => &[ESCAPE, 0x75],

        // Medical
        '🏥' | '\u{2695}' | '🚑' | '\u{2764}' | '💊' | '🩺' => &[ESCAPE, 0x7A],

        // Culture
        '🎭' | '🎪' | '🎨' | '🎬' | '🎵' | '🎶' => &[ESCAPE, 0x2C],

        // Accessibility
        '♿' | '🦽' | '🦼' => &[ESCAPE, 0x2F],

        // Arrows
        '\u{27A1}' | '→' => &[ESCAPE, 0x2A],
        '\u{2194}' | '⏩' => &[ESCAPE, 0xF0],
        '\u{2B05}' | '←' => &[ESCAPE, 0x7C],
        '\u{2B06}' | '↑' => &[ESCAPE, 0x7D],

        // Terminal stop
        '🛑' | '🚏' | '🚥' | '🔚' => &[ESCAPE, 0x71],

        // Misc
        '\u{1F6E1}' => &[ESCAPE, 0xFF],
        '🦌' => &[ESCAPE, 0xF8],

        // Typography folded to ASCII
        '…' => b"...",
        '\u{2018}' | '\u{2019}' => b"'",
        '\u{2013}' | '\u{2014}' => b"-",

        _ => return None,
    };
    Some(bytes)
}

/// Display bytes for one character
///
/// Printable ASCII passes through unchanged. Control characters and
/// unmapped characters become a space: a CR would end the command early and
/// a stray 0x0E would swallow the next byte as a glyph.
fn char_bytes(c: char, scratch: &mut [u8; 1]) -> &[u8] {
    if c.is_ascii_control() {
        return b" ";
    }
    if c.is_ascii() {
        scratch[0] = c as u8;
        return &scratch[..];
    }
    match lookup(c) {
        Some(bytes) => bytes,
        None => b" ",
    }
}

/// Encode UTF-8 text for the display into `out`
///
/// Stops before the first glyph that does not fit, so the output never ends
/// inside an escape. Returns `true` if the whole text was encoded.
pub fn encode_text<const N: usize>(text: &str, out: &mut Vec<u8, N>) -> bool {
    let mut scratch = [0u8; 1];
    for c in text.chars() {
        if c == VARIATION_SELECTOR {
            continue;
        }
        let bytes = char_bytes(c, &mut scratch);
        if out.extend_from_slice(bytes).is_err() {
            return false;
        }
    }
    true
}

/// Length of `text` once display-encoded
pub fn encoded_len(text: &str) -> usize {
    let mut scratch = [0u8; 1];
    text.chars()
        .filter(|&c| c != VARIATION_SELECTOR)
        .map(|c| char_bytes(c, &mut scratch).len())
        .sum()
}

/// Iterator over the glyphs of display-encoded bytes
#[derive(Debug, Clone)]
pub struct Glyphs<'a> {
    rest: &'a [u8],
}

impl<'a> Iterator for Glyphs<'a> {
    type Item = &'a [u8];

    fn next(&mut self) -> Option<Self::Item> {
        if self.rest.is_empty() {
            return None;
        }
        // A trailing lone escape is yielded on its own
        let len = if self.rest[0] == ESCAPE && self.rest.len() >= 2 {
            2
        } else {
            1
        };
        let (glyph, rest) = self.rest.split_at(len);
        self.rest = rest;
        Some(glyph)
    }
}

/// Split display-encoded bytes into glyphs
pub fn glyphs(bytes: &[u8]) -> Glyphs<'_> {
    Glyphs { rest: bytes }
}

/// Longest prefix of at most `max` bytes that does not split an escape
pub fn safe_truncate(bytes: &[u8], max: usize) -> &[u8] {
    if bytes.len() <= max {
        return bytes;
    }
    let mut end = 0;
    for glyph in glyphs(bytes) {
        if end + glyph.len() > max {
            break;
        }
        end += glyph.len();
    }
    &bytes[..end]
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn encode(text: &str) -> Vec<u8, 64> {
        let mut out = Vec::new();
        assert!(encode_text(text, &mut out));
        out
    }

    #[test]
    fn test_ascii_passthrough() {
        assert_eq!(encode("Line 48 -> Base").as_slice(), b"Line 48 -> Base");
    }

    #[test]
    fn test_czech_lowercase() {
        assert_eq!(encode("č").as_slice(), &[0x0E, 0x87]);
        assert_eq!(encode("Příští").as_slice(), &[
            b'P', 0x0E, 0x29, 0x0E, 0x21, 0x0E, 0x28, b't', 0x0E, 0x21
        ]);
    }

    #[test]
    fn test_single_byte_uppercase() {
        assert_eq!(encode("Ů").as_slice(), &[0x96]);
        assert_eq!(encode("Í").as_slice(), &[0x7F]);
    }

    #[test]
    fn test_pictograms_with_variation_selector() {
        assert_eq!(encode("🚌").as_slice(), &[0x0E, 0x72]);
        assert_eq!(encode("✈️").as_slice(), &[0x0E, 0xF7]);
        assert_eq!(encode("❤️").as_slice(), &[0x0E, 0x7A]);
        assert_eq!(encoded_len("✈️ go"), 5);
    }

    #[test]
    fn test_unmapped_becomes_space() {
        assert_eq!(encode("a€b").as_slice(), b"a b");
    }

    #[test]
    fn test_control_characters_become_spaces() {
        assert_eq!(encode("Stop\rl999").as_slice(), b"Stop l999");
        assert_eq!(encode("a\u{0E}b\n\tc\u{7F}").as_slice(), b"a b  c ");
        assert_eq!(encoded_len("x\r\n"), 3);
    }

    #[test]
    fn test_typography_folded() {
        assert_eq!(encode("wait…").as_slice(), b"wait...");
        assert_eq!(encode("A–B").as_slice(), b"A-B");
    }

    #[test]
    fn test_encode_stops_on_glyph_boundary() {
        let mut out: Vec<u8, 3> = Vec::new();
        assert!(!encode_text("ačb", &mut out));
        assert_eq!(out.as_slice(), &[b'a', 0x0E, 0x87]);

        let mut out: Vec<u8, 2> = Vec::new();
        assert!(!encode_text("ač", &mut out));
        assert_eq!(out.as_slice(), b"a");
    }

    #[test]
    fn test_safe_truncate_keeps_escape_whole() {
        let bytes = [b'a', b'b', 0x0E, 0x87, b'c'];
        assert_eq!(safe_truncate(&bytes, 3), b"ab");
        assert_eq!(safe_truncate(&bytes, 4), &bytes[..4]);
        assert_eq!(safe_truncate(&bytes, 10), &bytes[..]);
        assert_eq!(safe_truncate(&bytes, 0), b"");
    }

    #[test]
    fn test_glyph_iteration() {
        let bytes = [0x0E, 0x20, b'x', 0x96, 0x0E];
        let mut it = glyphs(&bytes);
        assert_eq!(it.next(), Some(&[0x0E, 0x20][..]));
        assert_eq!(it.next(), Some(&b"x"[..]));
        assert_eq!(it.next(), Some(&[0x96][..]));
        assert_eq!(it.next(), Some(&[0x0E][..]));
        assert_eq!(it.next(), None);
    }

    proptest! {
        #[test]
        fn prop_truncate_never_splits_escape(text in "[a-zčřšžýáíéůú ]{0,40}", max in 0usize..60) {
            let mut out: Vec<u8, 128> = Vec::new();
            encode_text(&text, &mut out);
            let cut = safe_truncate(&out, max);
            prop_assert!(cut.len() <= max);
            prop_assert!(cut.last() != Some(&ESCAPE));
            let n = glyphs(cut).count();
            prop_assert!(glyphs(&out).take(n).eq(glyphs(cut)));
        }

        #[test]
        fn prop_encoded_len_matches(text in "\\PC{0,30}") {
            let mut out: Vec<u8, 256> = Vec::new();
            prop_assert!(encode_text(&text, &mut out));
            prop_assert_eq!(out.len(), encoded_len(&text));
        }
    }
}
