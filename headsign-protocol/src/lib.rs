//! Headsign wire formats
//!
//! Two protocols live here:
//!
//! - **BUSE120** ([`buse`]): the text command set understood by the
//!   destination sign. Every command is sent as
//!   ```text
//!   ┌──────────────┬────┬──────────┐
//!   │ PAYLOAD      │ CR │ CHECKSUM │
//!   │ ASCII + 0x0E │ 1B │ 1B       │
//!   └──────────────┴────┴──────────┘
//!   ```
//!   with text first passed through the display glyph map ([`charmap`]).
//!
//! - **Host link** ([`frame`], [`messages`]): a binary framed protocol used
//!   by a companion host to submit and manage messages.
//!   ```text
//!   ┌───────┬────────┬──────┬─────┬─────────────┬──────────┐
//!   │ START │ LENGTH │ TYPE │ SEQ │ PAYLOAD     │ CHECKSUM │
//!   │ 1B    │ 2B LE  │ 1B   │ 1B  │ 0–640B      │ 1B       │
//!   └───────┴────────┴──────┴─────┴─────────────┴──────────┘
//!   ```

#![cfg_attr(not(test), no_std)]
#![deny(unsafe_code)]

pub mod buse;
pub mod charmap;
pub mod frame;
pub mod messages;

pub use buse::{BuseCommand, BuseError, MAX_COMMAND_SIZE};
pub use charmap::{encode_text, encoded_len, glyphs, safe_truncate};
pub use frame::{Frame, FrameError, FrameParser, FRAME_START, MAX_PAYLOAD_SIZE};
pub use messages::{HostCommand, HostReply, InsertRequest, NackReason};
