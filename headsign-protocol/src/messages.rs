//! Message types for the host link
//!
//! Message types are divided into two categories:
//! - Host → Controller: message management and clock updates
//! - Controller → Host: replies, each echoing the request's SEQ

use crate::frame::{Frame, FrameError, MAX_PAYLOAD_SIZE};
use heapless::Vec;

// Message type IDs: Host → Controller
pub const MSG_PING: u8 = 0x01;
pub const MSG_INSERT: u8 = 0x02;
pub const MSG_UPDATE: u8 = 0x03;
pub const MSG_REMOVE: u8 = 0x04;
pub const MSG_SET_TIME: u8 = 0x05;
pub const MSG_PAUSE: u8 = 0x06;
pub const MSG_RESUME: u8 = 0x07;
pub const MSG_RAW: u8 = 0x08;
pub const MSG_EPHEMERAL: u8 = 0x09;
pub const MSG_CLEAR_EPHEMERAL: u8 = 0x0A;
pub const MSG_SET_ENABLED: u8 = 0x0B;

// Message type IDs: Controller → Host
pub const MSG_PONG: u8 = 0x81;
pub const MSG_ACK: u8 = 0x82;
pub const MSG_INSERTED: u8 = 0x83;
pub const MSG_NACK: u8 = 0x84;

/// Insert flag: reject if an active message has identical text
pub const FLAG_UNIQUE: u8 = 0x01;

/// Insert flag: store the message disabled
pub const FLAG_DISABLED: u8 = 0x02;

/// Message content submitted by the host
///
/// Payload layout:
/// ```text
/// [flags][prio][line u16][zone u16][ttl u32]
/// [intro_len][intro][hint_len][hint][source_len][source][text_len u16][text]
/// ```
/// Multi-byte integers are little-endian. A TTL of zero means no expiry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct InsertRequest<'a> {
    pub unique: bool,
    /// Kept in the store but never selected
    pub disabled: bool,
    pub priority: u8,
    pub line_number: u16,
    pub tarif_zone: u16,
    pub ttl_s: u32,
    pub intro: &'a str,
    pub hint: &'a str,
    pub source: &'a str,
    pub text: &'a str,
}

/// Commands parsed from host-originated frames
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum HostCommand<'a> {
    /// Heartbeat request
    Ping,
    /// Add a message
    Insert(InsertRequest<'a>),
    /// Replace the content of an existing message
    Update { id: u32, request: InsertRequest<'a> },
    /// Delete a message
    Remove { id: u32 },
    /// Authoritative wall-clock time in Unix seconds
    SetTime { unix_time: u64 },
    /// Stop rotating messages
    Pause,
    /// Resume rotating messages
    Resume,
    /// Send a verbatim BUSE payload to the sign
    Raw(&'a [u8]),
    /// Add a RAM-only message shown at most `display_count` times
    /// (`[count u16][insert payload]`, zero meaning until its TTL)
    Ephemeral {
        display_count: u16,
        request: InsertRequest<'a>,
    },
    /// Drop every ephemeral message
    ClearEphemeral,
    /// Enable or disable a stored message (`[id u32][0|1]`)
    SetEnabled { id: u32, enabled: bool },
}

/// Why a request was refused
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum NackReason {
    /// Frame decoded but the payload did not
    Malformed = 1,
    /// Message content failed validation
    Invalid = 2,
    /// An active message already has this text
    Duplicate = 3,
    /// No message with this id
    NotFound = 4,
    /// Storage failed to commit
    Storage = 5,
    /// Store is at capacity
    Full = 6,
    /// Controller could not take the request
    Busy = 7,
}

impl NackReason {
    pub fn from_byte(byte: u8) -> Option<Self> {
        Some(match byte {
            1 => NackReason::Malformed,
            2 => NackReason::Invalid,
            3 => NackReason::Duplicate,
            4 => NackReason::NotFound,
            5 => NackReason::Storage,
            6 => NackReason::Full,
            7 => NackReason::Busy,
            _ => return None,
        })
    }
}

/// Replies sent back to the host
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum HostReply {
    /// Heartbeat response
    Pong,
    /// Request applied
    Ack,
    /// Message stored under `id`
    Inserted { id: u32 },
    /// Request refused
    Nack(NackReason),
}

/// Cursor over a payload
struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn bytes(&mut self, n: usize) -> Result<&'a [u8], FrameError> {
        let out = self
            .buf
            .get(self.pos..self.pos + n)
            .ok_or(FrameError::InvalidFrame)?;
        self.pos += n;
        Ok(out)
    }

    fn u8(&mut self) -> Result<u8, FrameError> {
        Ok(self.bytes(1)?[0])
    }

    fn u16(&mut self) -> Result<u16, FrameError> {
        let b = self.bytes(2)?;
        Ok(u16::from_le_bytes([b[0], b[1]]))
    }

    fn u32(&mut self) -> Result<u32, FrameError> {
        let b = self.bytes(4)?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    fn u64(&mut self) -> Result<u64, FrameError> {
        let mut raw = [0u8; 8];
        raw.copy_from_slice(self.bytes(8)?);
        Ok(u64::from_le_bytes(raw))
    }

    fn str(&mut self, n: usize) -> Result<&'a str, FrameError> {
        core::str::from_utf8(self.bytes(n)?).map_err(|_| FrameError::InvalidFrame)
    }

    fn finish(self) -> Result<(), FrameError> {
        if self.pos == self.buf.len() {
            Ok(())
        } else {
            Err(FrameError::InvalidFrame)
        }
    }
}

type Payload = Vec<u8, MAX_PAYLOAD_SIZE>;

fn put(out: &mut Payload, bytes: &[u8]) -> Result<(), FrameError> {
    out.extend_from_slice(bytes)
        .map_err(|_| FrameError::PayloadTooLarge)
}

fn put_short_str(out: &mut Payload, s: &str) -> Result<(), FrameError> {
    let len = u8::try_from(s.len()).map_err(|_| FrameError::PayloadTooLarge)?;
    put(out, &[len])?;
    put(out, s.as_bytes())
}

impl<'a> InsertRequest<'a> {
    fn read(r: &mut Reader<'a>) -> Result<Self, FrameError> {
        let flags = r.u8()?;
        let priority = r.u8()?;
        let line_number = r.u16()?;
        let tarif_zone = r.u16()?;
        let ttl_s = r.u32()?;
        let intro_len = r.u8()? as usize;
        let intro = r.str(intro_len)?;
        let hint_len = r.u8()? as usize;
        let hint = r.str(hint_len)?;
        let source_len = r.u8()? as usize;
        let source = r.str(source_len)?;
        let text_len = r.u16()? as usize;
        let text = r.str(text_len)?;

        Ok(Self {
            unique: flags & FLAG_UNIQUE != 0,
            disabled: flags & FLAG_DISABLED != 0,
            priority,
            line_number,
            tarif_zone,
            ttl_s,
            intro,
            hint,
            source,
            text,
        })
    }

    fn write(&self, out: &mut Payload) -> Result<(), FrameError> {
        let mut flags = 0;
        if self.unique {
            flags |= FLAG_UNIQUE;
        }
        if self.disabled {
            flags |= FLAG_DISABLED;
        }
        put(out, &[flags, self.priority])?;
        put(out, &self.line_number.to_le_bytes())?;
        put(out, &self.tarif_zone.to_le_bytes())?;
        put(out, &self.ttl_s.to_le_bytes())?;
        put_short_str(out, self.intro)?;
        put_short_str(out, self.hint)?;
        put_short_str(out, self.source)?;
        let text_len =
            u16::try_from(self.text.len()).map_err(|_| FrameError::PayloadTooLarge)?;
        put(out, &text_len.to_le_bytes())?;
        put(out, self.text.as_bytes())
    }
}

impl<'a> HostCommand<'a> {
    /// Parse a command from a frame
    pub fn from_frame(frame: &'a Frame) -> Result<Self, FrameError> {
        let mut r = Reader::new(&frame.payload);
        let cmd = match frame.msg_type {
            MSG_PING => HostCommand::Ping,
            MSG_INSERT => HostCommand::Insert(InsertRequest::read(&mut r)?),
            MSG_UPDATE => {
                let id = r.u32()?;
                HostCommand::Update {
                    id,
                    request: InsertRequest::read(&mut r)?,
                }
            }
            MSG_REMOVE => HostCommand::Remove { id: r.u32()? },
            MSG_SET_TIME => HostCommand::SetTime {
                unix_time: r.u64()?,
            },
            MSG_PAUSE => HostCommand::Pause,
            MSG_RESUME => HostCommand::Resume,
            MSG_RAW => {
                if frame.payload.is_empty() {
                    return Err(FrameError::InvalidFrame);
                }
                let raw = r.bytes(frame.payload.len())?;
                HostCommand::Raw(raw)
            }
            MSG_EPHEMERAL => {
                let display_count = r.u16()?;
                HostCommand::Ephemeral {
                    display_count,
                    request: InsertRequest::read(&mut r)?,
                }
            }
            MSG_CLEAR_EPHEMERAL => HostCommand::ClearEphemeral,
            MSG_SET_ENABLED => {
                let id = r.u32()?;
                let enabled = match r.u8()? {
                    0 => false,
                    1 => true,
                    _ => return Err(FrameError::InvalidFrame),
                };
                HostCommand::SetEnabled { id, enabled }
            }
            _ => return Err(FrameError::InvalidFrame),
        };
        r.finish()?;
        Ok(cmd)
    }

    /// Encode this command into a frame (host tools and tests)
    pub fn to_frame(&self, seq: u8) -> Result<Frame, FrameError> {
        let mut payload = Payload::new();
        let msg_type = match self {
            HostCommand::Ping => MSG_PING,
            HostCommand::Insert(request) => {
                request.write(&mut payload)?;
                MSG_INSERT
            }
            HostCommand::Update { id, request } => {
                put(&mut payload, &id.to_le_bytes())?;
                request.write(&mut payload)?;
                MSG_UPDATE
            }
            HostCommand::Remove { id } => {
                put(&mut payload, &id.to_le_bytes())?;
                MSG_REMOVE
            }
            HostCommand::SetTime { unix_time } => {
                put(&mut payload, &unix_time.to_le_bytes())?;
                MSG_SET_TIME
            }
            HostCommand::Pause => MSG_PAUSE,
            HostCommand::Resume => MSG_RESUME,
            HostCommand::Raw(raw) => {
                put(&mut payload, raw)?;
                MSG_RAW
            }
            HostCommand::Ephemeral {
                display_count,
                request,
            } => {
                put(&mut payload, &display_count.to_le_bytes())?;
                request.write(&mut payload)?;
                MSG_EPHEMERAL
            }
            HostCommand::ClearEphemeral => MSG_CLEAR_EPHEMERAL,
            HostCommand::SetEnabled { id, enabled } => {
                put(&mut payload, &id.to_le_bytes())?;
                put(&mut payload, &[*enabled as u8])?;
                MSG_SET_ENABLED
            }
        };
        Frame::new(msg_type, seq, &payload)
    }
}

impl HostReply {
    /// Encode this reply, echoing the request's sequence number
    pub fn to_frame(&self, seq: u8) -> Result<Frame, FrameError> {
        match self {
            HostReply::Pong => Ok(Frame::empty(MSG_PONG, seq)),
            HostReply::Ack => Ok(Frame::empty(MSG_ACK, seq)),
            HostReply::Inserted { id } => Frame::new(MSG_INSERTED, seq, &id.to_le_bytes()),
            HostReply::Nack(reason) => Frame::new(MSG_NACK, seq, &[*reason as u8]),
        }
    }

    /// Parse a reply from a frame (host tools and tests)
    pub fn from_frame(frame: &Frame) -> Result<Self, FrameError> {
        let mut r = Reader::new(&frame.payload);
        let reply = match frame.msg_type {
            MSG_PONG => HostReply::Pong,
            MSG_ACK => HostReply::Ack,
            MSG_INSERTED => HostReply::Inserted { id: r.u32()? },
            MSG_NACK => {
                HostReply::Nack(NackReason::from_byte(r.u8()?).ok_or(FrameError::InvalidFrame)?)
            }
            _ => return Err(FrameError::InvalidFrame),
        };
        r.finish()?;
        Ok(reply)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> InsertRequest<'static> {
        InsertRequest {
            unique: true,
            disabled: false,
            priority: 60,
            line_number: 48,
            tarif_zone: 101,
            ttl_s: 3600,
            intro: "Base48",
            hint: "Vítejte",
            source: "tests",
            text: "Zítra otevřeno od 18:00",
        }
    }

    #[test]
    fn test_insert_layout() {
        let frame = HostCommand::Insert(request()).to_frame(9).unwrap();
        assert_eq!(frame.msg_type, MSG_INSERT);
        assert_eq!(frame.seq, 9);
        assert_eq!(frame.payload[0], FLAG_UNIQUE);
        assert_eq!(frame.payload[1], 60);
        assert_eq!(&frame.payload[2..4], &48u16.to_le_bytes());
        assert_eq!(&frame.payload[4..6], &101u16.to_le_bytes());
        assert_eq!(&frame.payload[6..10], &3600u32.to_le_bytes());
        assert_eq!(frame.payload[10], 6); // intro length
        assert_eq!(&frame.payload[11..17], b"Base48");
    }

    #[test]
    fn test_insert_parses_back() {
        let frame = HostCommand::Insert(request()).to_frame(1).unwrap();
        let cmd = HostCommand::from_frame(&frame).unwrap();
        assert_eq!(cmd, HostCommand::Insert(request()));
    }

    #[test]
    fn test_update_carries_id() {
        let frame = HostCommand::Update {
            id: 77,
            request: request(),
        }
        .to_frame(2)
        .unwrap();
        match HostCommand::from_frame(&frame).unwrap() {
            HostCommand::Update { id, request: r } => {
                assert_eq!(id, 77);
                assert_eq!(r.text, request().text);
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_disabled_flag() {
        let disabled = InsertRequest {
            unique: false,
            disabled: true,
            ..request()
        };
        let frame = HostCommand::Insert(disabled).to_frame(3).unwrap();
        assert_eq!(frame.payload[0], FLAG_DISABLED);
        assert_eq!(
            HostCommand::from_frame(&frame).unwrap(),
            HostCommand::Insert(disabled)
        );
    }

    #[test]
    fn test_ephemeral_carries_display_count() {
        let frame = HostCommand::Ephemeral {
            display_count: 3,
            request: request(),
        }
        .to_frame(6)
        .unwrap();
        assert_eq!(frame.msg_type, MSG_EPHEMERAL);
        assert_eq!(&frame.payload[..2], &3u16.to_le_bytes());
        assert_eq!(frame.payload[2], FLAG_UNIQUE);
        assert_eq!(
            HostCommand::from_frame(&frame).unwrap(),
            HostCommand::Ephemeral {
                display_count: 3,
                request: request(),
            }
        );

        let clear = Frame::empty(MSG_CLEAR_EPHEMERAL, 7);
        assert_eq!(
            HostCommand::from_frame(&clear).unwrap(),
            HostCommand::ClearEphemeral
        );
    }

    #[test]
    fn test_set_enabled() {
        let frame = Frame::new(MSG_SET_ENABLED, 8, &[9, 0, 0, 0, 0]).unwrap();
        assert_eq!(
            HostCommand::from_frame(&frame).unwrap(),
            HostCommand::SetEnabled {
                id: 9,
                enabled: false
            }
        );
        let frame = HostCommand::SetEnabled { id: 9, enabled: true }.to_frame(8).unwrap();
        assert_eq!(frame.payload.as_slice(), &[9, 0, 0, 0, 1]);

        let bad = Frame::new(MSG_SET_ENABLED, 8, &[9, 0, 0, 0, 2]).unwrap();
        assert_eq!(HostCommand::from_frame(&bad), Err(FrameError::InvalidFrame));
    }

    #[test]
    fn test_truncated_insert_rejected() {
        let full = HostCommand::Insert(request()).to_frame(1).unwrap();
        let cut = Frame::new(MSG_INSERT, 1, &full.payload[..full.payload.len() - 3]).unwrap();
        assert_eq!(HostCommand::from_frame(&cut), Err(FrameError::InvalidFrame));
    }

    #[test]
    fn test_trailing_bytes_rejected() {
        let frame = Frame::new(MSG_REMOVE, 1, &[1, 0, 0, 0, 0xFF]).unwrap();
        assert_eq!(HostCommand::from_frame(&frame), Err(FrameError::InvalidFrame));
    }

    #[test]
    fn test_invalid_utf8_rejected() {
        let mut payload = Payload::new();
        request().write(&mut payload).unwrap();
        // First intro byte
        payload[11] = 0xFF;
        let frame = Frame::new(MSG_INSERT, 1, &payload).unwrap();
        assert_eq!(HostCommand::from_frame(&frame), Err(FrameError::InvalidFrame));
    }

    #[test]
    fn test_set_time_and_remove() {
        let frame = Frame::new(MSG_SET_TIME, 4, &1_700_000_000u64.to_le_bytes()).unwrap();
        assert_eq!(
            HostCommand::from_frame(&frame).unwrap(),
            HostCommand::SetTime {
                unix_time: 1_700_000_000
            }
        );

        let frame = Frame::new(MSG_REMOVE, 5, &12u32.to_le_bytes()).unwrap();
        assert_eq!(
            HostCommand::from_frame(&frame).unwrap(),
            HostCommand::Remove { id: 12 }
        );
    }

    #[test]
    fn test_empty_raw_rejected() {
        let frame = Frame::empty(MSG_RAW, 1);
        assert_eq!(HostCommand::from_frame(&frame), Err(FrameError::InvalidFrame));
    }

    #[test]
    fn test_unknown_type_rejected() {
        let frame = Frame::empty(0x7E, 1);
        assert_eq!(HostCommand::from_frame(&frame), Err(FrameError::InvalidFrame));
    }

    #[test]
    fn test_replies_echo_seq() {
        let frame = HostReply::Inserted { id: 5 }.to_frame(33).unwrap();
        assert_eq!(frame.seq, 33);
        assert_eq!(
            HostReply::from_frame(&frame).unwrap(),
            HostReply::Inserted { id: 5 }
        );

        let frame = HostReply::Nack(NackReason::Duplicate).to_frame(34).unwrap();
        assert_eq!(frame.payload.as_slice(), &[3]);
        assert_eq!(
            HostReply::from_frame(&frame).unwrap(),
            HostReply::Nack(NackReason::Duplicate)
        );
    }
}
