//! BUSE120 display commands
//!
//! Each command is an ASCII payload followed by CR and a checksum byte:
//! `checksum = 0x7F ^ xor(payload) ^ CR`. Text-bearing commands carry bytes
//! that were already passed through [`crate::charmap`]; they are truncated
//! here to the field width the sign accepts.

use heapless::Vec;

use crate::charmap::safe_truncate;

/// Command terminator
pub const CR: u8 = 0x0D;

/// Seed of the command checksum
pub const CHECKSUM_SEED: u8 = 0x7F;

/// Widest static intro the sign shows
pub const MAX_INTRO_LEN: usize = 15;

/// Widest next-stop hint the sign shows
pub const MAX_HINT_LEN: usize = 15;

/// Longest scrolling text the sign buffers
pub const MAX_TEXT_LEN: usize = 511;

/// Largest line or zone number the sign renders
pub const MAX_NUMBER: u16 = 999;

/// Largest encoded command (`zM ` + text + CR + checksum)
pub const MAX_COMMAND_SIZE: usize = 3 + MAX_TEXT_LEN + 2;

/// Errors while encoding a command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum BuseError {
    /// A numeric field is outside what the sign can show
    OutOfRange,
    /// A raw payload does not fit in one command
    TooLong,
}

impl core::fmt::Display for BuseError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            BuseError::OutOfRange => f.write_str("numeric field out of range"),
            BuseError::TooLong => f.write_str("payload too long"),
        }
    }
}

/// A single command for the sign
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum BuseCommand<'a> {
    /// `lNNN` route number
    LineNumber(u16),
    /// `eNNN000` fare zone
    TarifZone(u16),
    /// `zI <text>` static intro, at most 15 bytes shown
    StaticIntro(&'a [u8]),
    /// `zM <text>` scrolling message, at most 511 bytes
    ScrollingText(&'a [u8]),
    /// `v <text>` next-stop hint, at most 15 bytes shown
    NextHint(&'a [u8]),
    /// `uHHMM` wall clock
    Time { hour: u8, minute: u8 },
    /// `xC<n>` switch display cycle
    CycleSwitch(u8),
    /// `i` invert the panel
    Invert,
    /// Verbatim payload
    Raw(&'a [u8]),
}

/// Checksum of a command payload
pub fn checksum(payload: &[u8]) -> u8 {
    payload.iter().fold(CHECKSUM_SEED, |acc, &b| acc ^ b) ^ CR
}

type Command = Vec<u8, MAX_COMMAND_SIZE>;

fn push(out: &mut Command, bytes: &[u8]) -> Result<(), BuseError> {
    out.extend_from_slice(bytes).map_err(|_| BuseError::TooLong)
}

/// Append `value` as zero-padded decimal of exactly `width` digits
fn push_decimal(out: &mut Command, value: u16, width: usize) -> Result<(), BuseError> {
    let mut digits = [b'0'; 5];
    let mut v = value;
    for slot in digits.iter_mut().rev() {
        *slot = b'0' + (v % 10) as u8;
        v /= 10;
    }
    if v != 0 || width > digits.len() || digits[..digits.len() - width].iter().any(|&d| d != b'0')
    {
        return Err(BuseError::OutOfRange);
    }
    push(out, &digits[digits.len() - width..])
}

impl<'a> BuseCommand<'a> {
    /// Encode the command as it goes on the wire
    pub fn encode(&self) -> Result<Command, BuseError> {
        let mut out = Command::new();
        match *self {
            BuseCommand::LineNumber(line) => {
                if line > MAX_NUMBER {
                    return Err(BuseError::OutOfRange);
                }
                push(&mut out, b"l")?;
                push_decimal(&mut out, line, 3)?;
            }
            BuseCommand::TarifZone(zone) => {
                if zone > MAX_NUMBER {
                    return Err(BuseError::OutOfRange);
                }
                push(&mut out, b"e")?;
                push_decimal(&mut out, zone, 3)?;
                push(&mut out, b"000")?;
            }
            BuseCommand::StaticIntro(text) => {
                push(&mut out, b"zI ")?;
                push(&mut out, safe_truncate(text, MAX_INTRO_LEN))?;
            }
            BuseCommand::ScrollingText(text) => {
                push(&mut out, b"zM ")?;
                push(&mut out, safe_truncate(text, MAX_TEXT_LEN))?;
            }
            BuseCommand::NextHint(text) => {
                push(&mut out, b"v ")?;
                push(&mut out, safe_truncate(text, MAX_HINT_LEN))?;
            }
            BuseCommand::Time { hour, minute } => {
                if hour > 23 || minute > 59 {
                    return Err(BuseError::OutOfRange);
                }
                push(&mut out, b"u")?;
                push_decimal(&mut out, hour as u16, 2)?;
                push_decimal(&mut out, minute as u16, 2)?;
            }
            BuseCommand::CycleSwitch(cycle) => {
                if cycle > 9 {
                    return Err(BuseError::OutOfRange);
                }
                push(&mut out, b"xC")?;
                push_decimal(&mut out, cycle as u16, 1)?;
            }
            BuseCommand::Invert => push(&mut out, b"i")?,
            BuseCommand::Raw(payload) => {
                if payload.len() + 2 > MAX_COMMAND_SIZE {
                    return Err(BuseError::TooLong);
                }
                push(&mut out, payload)?;
            }
        }

        let sum = checksum(&out);
        push(&mut out, &[CR, sum])?;
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn split(encoded: &[u8]) -> (&[u8], u8, u8) {
        let n = encoded.len();
        (&encoded[..n - 2], encoded[n - 2], encoded[n - 1])
    }

    #[test]
    fn test_checksum_known_vector() {
        // 0x7F ^ 'l' ^ '0' ^ '4' ^ '8' ^ CR
        assert_eq!(checksum(b"l048"), 0x7F ^ 0x6C ^ 0x30 ^ 0x34 ^ 0x38 ^ 0x0D);
        assert_eq!(checksum(b""), 0x72);
    }

    #[test]
    fn test_line_number() {
        let cmd = BuseCommand::LineNumber(48).encode().unwrap();
        let (payload, cr, sum) = split(&cmd);
        assert_eq!(payload, b"l048");
        assert_eq!(cr, CR);
        assert_eq!(sum, checksum(b"l048"));
    }

    #[test]
    fn test_tarif_zone() {
        let cmd = BuseCommand::TarifZone(101).encode().unwrap();
        assert_eq!(split(&cmd).0, b"e101000");
    }

    #[test]
    fn test_numbers_out_of_range() {
        assert_eq!(BuseCommand::LineNumber(1000).encode(), Err(BuseError::OutOfRange));
        assert_eq!(BuseCommand::TarifZone(1000).encode(), Err(BuseError::OutOfRange));
        assert_eq!(
            BuseCommand::Time { hour: 24, minute: 0 }.encode(),
            Err(BuseError::OutOfRange)
        );
        assert_eq!(BuseCommand::CycleSwitch(10).encode(), Err(BuseError::OutOfRange));
    }

    #[test]
    fn test_time_update() {
        let cmd = BuseCommand::Time { hour: 7, minute: 5 }.encode().unwrap();
        assert_eq!(split(&cmd).0, b"u0705");
    }

    #[test]
    fn test_cycle_and_invert() {
        assert_eq!(split(&BuseCommand::CycleSwitch(0).encode().unwrap()).0, b"xC0");
        assert_eq!(split(&BuseCommand::Invert.encode().unwrap()).0, b"i");
    }

    #[test]
    fn test_intro_truncated_on_glyph_boundary() {
        // 14 ASCII bytes then an escape pair would make 16
        let mut text = [b'a'; 16];
        text[14] = 0x0E;
        text[15] = 0x87;
        let cmd = BuseCommand::StaticIntro(&text).encode().unwrap();
        let (payload, _, _) = split(&cmd);
        assert_eq!(&payload[..3], b"zI ");
        assert_eq!(payload.len(), 3 + 14);
    }

    #[test]
    fn test_hint_and_text_prefixes() {
        let hint = BuseCommand::NextHint(b"Idle").encode().unwrap();
        assert_eq!(split(&hint).0, b"v Idle");

        let text = BuseCommand::ScrollingText(b"--.-").encode().unwrap();
        assert_eq!(split(&text).0, b"zM --.-");
    }

    #[test]
    fn test_scrolling_text_fills_buffer() {
        let long = [b'x'; 600];
        let cmd = BuseCommand::ScrollingText(&long).encode().unwrap();
        assert_eq!(cmd.len(), MAX_COMMAND_SIZE);
    }

    #[test]
    fn test_raw_payload() {
        let cmd = BuseCommand::Raw(b"zA test").encode().unwrap();
        assert_eq!(split(&cmd).0, b"zA test");

        let too_long = [b'r'; MAX_COMMAND_SIZE];
        assert_eq!(BuseCommand::Raw(&too_long).encode(), Err(BuseError::TooLong));
    }
}
