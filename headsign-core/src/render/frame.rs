//! Display frames
//!
//! A frame is the full visible state of the sign, already display-encoded
//! and cut to the widths the sign accepts.

use heapless::Vec;

use headsign_protocol::buse::{BuseCommand, MAX_HINT_LEN, MAX_INTRO_LEN, MAX_TEXT_LEN};
use headsign_protocol::charmap::encode_text;

use crate::store::Message;

/// Everything shown on the sign at one moment
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct DisplayFrame {
    pub line_number: u16,
    pub tarif_zone: u16,
    pub intro: Vec<u8, MAX_INTRO_LEN>,
    pub text: Vec<u8, MAX_TEXT_LEN>,
    pub hint: Vec<u8, MAX_HINT_LEN>,
}

impl DisplayFrame {
    /// Encode the given fields, truncating each to its width
    pub fn compose(line_number: u16, tarif_zone: u16, intro: &str, text: &str, hint: &str) -> Self {
        let mut frame = Self {
            line_number,
            tarif_zone,
            intro: Vec::new(),
            text: Vec::new(),
            hint: Vec::new(),
        };
        encode_text(intro, &mut frame.intro);
        encode_text(text, &mut frame.text);
        encode_text(hint, &mut frame.hint);
        frame
    }

    /// Frame for a stored message
    pub fn from_message(message: &Message) -> Self {
        Self::compose(
            message.line_number,
            message.tarif_zone,
            &message.static_intro,
            &message.text,
            &message.next_hint,
        )
    }

    /// Idle frame shown when nothing is scheduled
    pub fn fallback() -> Self {
        Self::compose(48, 0, "Base48", "--.-", "Idle")
    }

    /// Frame shown while the controller starts
    pub fn splash() -> Self {
        Self::compose(
            48,
            101,
            "Loading",
            "System initialization in progress...",
            "Please wait",
        )
    }

    /// Commands that draw this frame, in send order
    pub fn commands(&self) -> [BuseCommand<'_>; 5] {
        [
            BuseCommand::LineNumber(self.line_number),
            BuseCommand::TarifZone(self.tarif_zone),
            BuseCommand::StaticIntro(&self.intro),
            BuseCommand::ScrollingText(&self.text),
            BuseCommand::NextHint(&self.hint),
        ]
    }

    /// Commands for the fields that differ from `previous`
    pub fn changed_commands<'a>(
        &'a self,
        previous: &DisplayFrame,
    ) -> impl Iterator<Item = BuseCommand<'a>> + 'a {
        let changed = [
            self.line_number != previous.line_number,
            self.tarif_zone != previous.tarif_zone,
            self.intro != previous.intro,
            self.text != previous.text,
            self.hint != previous.hint,
        ];
        self.commands()
            .into_iter()
            .zip(changed)
            .filter_map(|(cmd, differs)| differs.then_some(cmd))
    }
}
