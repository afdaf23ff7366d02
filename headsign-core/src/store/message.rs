//! Message model
//!
//! A message is everything the sign needs for one rotation slot: route
//! number, fare zone, intro, scrolling text, and next-stop hint, plus the
//! bookkeeping the scheduler uses to rank it.

use heapless::String;
use serde::{Deserialize, Serialize};

use headsign_protocol::buse::{MAX_NUMBER, MAX_TEXT_LEN};
use headsign_protocol::charmap::encoded_len;

/// Stable message identifier, never reused within a store lifetime
pub type MessageId = u32;

/// Unix time in seconds
pub type Timestamp = u64;

/// Maximum stored messages
pub const MAX_MESSAGES: usize = 32;

/// Maximum UTF-8 bytes of stored message text
///
/// Display encoding is checked separately against [`MAX_TEXT_LEN`].
pub const MAX_TEXT_BYTES: usize = 1024;

/// Maximum UTF-8 bytes of intro, hint, and source labels
pub const MAX_LABEL_LEN: usize = 32;

/// Highest accepted priority
pub const MAX_PRIORITY: u8 = 100;

/// Dwell bounds in seconds
const MIN_DWELL_S: u32 = 5;
const MAX_DWELL_S: u32 = 20;

/// Why a draft was refused
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ValidationError {
    /// Priority above 100
    Priority,
    /// Empty scrolling text
    EmptyText,
    /// Text longer than the sign buffer once encoded
    TextTooLong,
    /// Intro, hint, or source longer than 32 bytes
    LabelTooLong,
    /// Line number above 999
    LineNumber,
    /// Tarif zone above 999
    TarifZone,
    /// Time-to-live of zero seconds
    Ttl,
    /// An active message already has this text
    Duplicate,
    /// Store holds the maximum number of messages
    Full,
}

impl core::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let msg = match self {
            ValidationError::Priority => "priority above 100",
            ValidationError::EmptyText => "text is empty",
            ValidationError::TextTooLong => "text too long",
            ValidationError::LabelTooLong => "label too long",
            ValidationError::LineNumber => "line number above 999",
            ValidationError::TarifZone => "tarif zone above 999",
            ValidationError::Ttl => "zero time-to-live",
            ValidationError::Duplicate => "duplicate text",
            ValidationError::Full => "message store full",
        };
        f.write_str(msg)
    }
}

/// Message content submitted by a producer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct NewMessage<'a> {
    pub text: &'a str,
    pub priority: u8,
    pub line_number: u16,
    pub tarif_zone: u16,
    pub static_intro: &'a str,
    pub next_hint: &'a str,
    pub source: &'a str,
    /// Seconds until expiry, `None` for a persistent message
    pub ttl_s: Option<u32>,
    /// Disabled messages stay stored but are never selected
    pub enabled: bool,
}

impl<'a> NewMessage<'a> {
    /// Draft with only text and priority set
    pub fn new(text: &'a str, priority: u8) -> Self {
        Self {
            text,
            priority,
            line_number: 0,
            tarif_zone: 0,
            static_intro: "",
            next_hint: "",
            source: "",
            ttl_s: None,
            enabled: true,
        }
    }

    pub fn with_line(mut self, line_number: u16) -> Self {
        self.line_number = line_number;
        self
    }

    pub fn with_zone(mut self, tarif_zone: u16) -> Self {
        self.tarif_zone = tarif_zone;
        self
    }

    pub fn with_intro(mut self, intro: &'a str) -> Self {
        self.static_intro = intro;
        self
    }

    pub fn with_hint(mut self, hint: &'a str) -> Self {
        self.next_hint = hint;
        self
    }

    pub fn with_source(mut self, source: &'a str) -> Self {
        self.source = source;
        self
    }

    pub fn with_ttl(mut self, ttl_s: u32) -> Self {
        self.ttl_s = Some(ttl_s);
        self
    }

    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Check every field against the limits the store and sign accept
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.priority > MAX_PRIORITY {
            return Err(ValidationError::Priority);
        }
        if self.text.trim().is_empty() {
            return Err(ValidationError::EmptyText);
        }
        if self.text.len() > MAX_TEXT_BYTES || encoded_len(self.text) > MAX_TEXT_LEN {
            return Err(ValidationError::TextTooLong);
        }
        if [self.static_intro, self.next_hint, self.source]
            .iter()
            .any(|label| label.len() > MAX_LABEL_LEN)
        {
            return Err(ValidationError::LabelTooLong);
        }
        if self.line_number > MAX_NUMBER {
            return Err(ValidationError::LineNumber);
        }
        if self.tarif_zone > MAX_NUMBER {
            return Err(ValidationError::TarifZone);
        }
        if self.ttl_s == Some(0) {
            return Err(ValidationError::Ttl);
        }
        Ok(())
    }
}

/// A stored message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub id: MessageId,
    pub text: String<MAX_TEXT_BYTES>,
    pub priority: u8,
    pub enabled: bool,
    pub line_number: u16,
    pub tarif_zone: u16,
    pub static_intro: String<MAX_LABEL_LEN>,
    pub next_hint: String<MAX_LABEL_LEN>,
    pub source: String<MAX_LABEL_LEN>,
    pub created_at: Timestamp,
    pub last_shown_at: Option<Timestamp>,
    pub show_count: u32,
    pub expires_at: Option<Timestamp>,
}

fn copy_str<const N: usize>(s: &str) -> Result<String<N>, ValidationError> {
    let mut out = String::new();
    out.push_str(s).map_err(|_| ValidationError::LabelTooLong)?;
    Ok(out)
}

impl Message {
    /// Build a message from a validated draft
    pub(crate) fn from_draft(
        id: MessageId,
        draft: &NewMessage<'_>,
        now: Timestamp,
    ) -> Result<Self, ValidationError> {
        draft.validate()?;
        let text = copy_str(draft.text).map_err(|_| ValidationError::TextTooLong)?;
        Ok(Self {
            id,
            text,
            priority: draft.priority,
            enabled: draft.enabled,
            line_number: draft.line_number,
            tarif_zone: draft.tarif_zone,
            static_intro: copy_str(draft.static_intro)?,
            next_hint: copy_str(draft.next_hint)?,
            source: copy_str(draft.source)?,
            created_at: now,
            last_shown_at: None,
            show_count: 0,
            expires_at: draft.ttl_s.map(|ttl| now.saturating_add(ttl as u64)),
        })
    }

    /// Whether this message counts as an emergency under `threshold`
    pub fn is_emergency(&self, threshold: u8) -> bool {
        self.priority >= threshold
    }

    /// Whether the message has expired at `now`
    pub fn is_expired(&self, now: Timestamp) -> bool {
        matches!(self.expires_at, Some(at) if at <= now)
    }

    /// Whether the message may be selected at `now`
    pub fn is_live(&self, now: Timestamp) -> bool {
        self.enabled && !self.is_expired(now)
    }

    /// Whether the message was shown less than `window_s` seconds ago
    pub fn shown_within(&self, now: Timestamp, window_s: u32) -> bool {
        match self.last_shown_at {
            Some(at) => now.saturating_sub(at) < window_s as u64,
            None => false,
        }
    }

    /// Minimum seconds on screen before a non-emergency replacement
    pub fn dwell_s(&self) -> u32 {
        (self.text.len() as u32 / 5).clamp(MIN_DWELL_S, MAX_DWELL_S)
    }

    /// Newest timestamp recorded on this message
    pub fn latest_timestamp(&self) -> Timestamp {
        self.last_shown_at.map_or(self.created_at, |at| at.max(self.created_at))
    }
}
