//! Simple TOML parser for headsign.toml
//!
//! Handles only the subset the firmware configuration needs:
//! - `[section]` headers
//! - `key = value` pairs (string, integer, boolean)
//! - Comments (`# ...`), including trailing ones
//!
//! Unknown sections and keys are skipped and reported as warnings so that a
//! newer configuration file still boots an older firmware.

use alloc::vec::Vec;
use heapless::String as HString;

use headsign_core::config::MAX_PATH_LEN;

use super::FirmwareConfig;

/// Parse error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ParseError {
    /// Malformed section header
    InvalidSection { line: usize },
    /// Value of the wrong type or out of range
    InvalidValue { line: usize },
    /// String longer than its field allows
    TooLong { line: usize },
}

/// Parsed configuration plus the lines that were ignored
#[derive(Debug)]
pub struct ParsedConfig<'a> {
    pub config: FirmwareConfig,
    /// Unknown `section.key` pairs, skipped
    pub ignored: Vec<&'a str>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Section {
    Root,
    Controller,
    Display,
    Host,
    Unknown,
}

/// Parse `headsign.toml` text
///
/// Missing keys keep their defaults. The result is not range-checked;
/// callers validate the controller section before use.
pub fn parse_config(input: &str) -> Result<ParsedConfig<'_>, ParseError> {
    let mut config = FirmwareConfig::default();
    let mut ignored = Vec::new();
    let mut section = Section::Root;

    for (index, raw) in input.lines().enumerate() {
        let line_no = index + 1;
        let line = raw.trim();

        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        if line.starts_with('[') {
            section = parse_section_header(line)
                .ok_or(ParseError::InvalidSection { line: line_no })?;
            if section == Section::Unknown {
                ignored.push(line);
            }
            continue;
        }

        let Some((key, value)) = parse_key_value(line) else {
            return Err(ParseError::InvalidValue { line: line_no });
        };

        let known = apply_value(section, key, value, &mut config, line_no)?;
        if !known && section != Section::Unknown {
            ignored.push(line);
        }
    }

    Ok(ParsedConfig { config, ignored })
}

fn parse_section_header(line: &str) -> Option<Section> {
    let name = line.strip_prefix('[')?.strip_suffix(']')?.trim();
    if name.is_empty() {
        return None;
    }
    Some(match name {
        "controller" => Section::Controller,
        "display" => Section::Display,
        "host" => Section::Host,
        _ => Section::Unknown,
    })
}

/// Split `key = value`, dropping a trailing comment outside quotes
fn parse_key_value(line: &str) -> Option<(&str, &str)> {
    let eq_pos = line.find('=')?;
    let key = line[..eq_pos].trim();
    let value = line[eq_pos + 1..].trim();

    let value = match value.find('#') {
        Some(hash_pos) if value[..hash_pos].matches('"').count() % 2 == 0 => {
            value[..hash_pos].trim()
        }
        _ => value,
    };

    if key.is_empty() || value.is_empty() {
        return None;
    }
    Some((key, value))
}

/// Apply one value; returns whether the key was recognised
fn apply_value(
    section: Section,
    key: &str,
    value: &str,
    config: &mut FirmwareConfig,
    line: usize,
) -> Result<bool, ParseError> {
    let invalid = ParseError::InvalidValue { line };

    match (section, key) {
        (Section::Controller, "database_path") => {
            let path = parse_string(value).ok_or(invalid)?;
            if path.len() > MAX_PATH_LEN {
                return Err(ParseError::TooLong { line });
            }
            config.controller.database_path.clear();
            config
                .controller
                .database_path
                .push_str(path)
                .map_err(|_| ParseError::TooLong { line })?;
        }
        (Section::Controller, "transition_duration_s") => {
            config.controller.transition_duration_s = parse_int(value).ok_or(invalid)?;
        }
        (Section::Controller, "time_sync_interval_s") => {
            config.controller.time_sync_interval_s = parse_int(value).ok_or(invalid)?;
        }
        (Section::Controller, "emergency_priority_threshold") => {
            config.controller.emergency_priority_threshold = parse_int(value).ok_or(invalid)?;
        }
        (Section::Controller, "min_seconds_between_repeats") => {
            config.controller.min_seconds_between_repeats = parse_int(value).ok_or(invalid)?;
        }
        (Section::Controller, "run_tests_on_startup") => {
            config.controller.run_tests_on_startup = parse_bool(value).ok_or(invalid)?;
        }
        (Section::Controller, "wipe_database_on_boot") => {
            config.controller.wipe_database_on_boot = parse_bool(value).ok_or(invalid)?;
        }
        (Section::Controller, "utc_offset_minutes") => {
            config.controller.utc_offset_minutes = parse_int(value).ok_or(invalid)?;
        }
        (Section::Controller, "tick_budget_ms") => {
            config.controller.tick_budget_ms = parse_int(value).ok_or(invalid)?;
        }
        (Section::Display, "baudrate") => {
            config.display.baudrate = parse_int(value).ok_or(invalid)?;
        }
        (Section::Display, "ack_window_ms") => {
            config.display.ack_window_ms = parse_int(value).ok_or(invalid)?;
        }
        (Section::Host, "baudrate") => {
            config.host.baudrate = parse_int(value).ok_or(invalid)?;
        }
        (Section::Host, "time_max_age_s") => {
            config.host.time_max_age_s = parse_int(value).ok_or(invalid)?;
        }
        _ => return Ok(false),
    }
    Ok(true)
}

/// Quoted string contents
fn parse_string(value: &str) -> Option<&str> {
    value.strip_prefix('"')?.strip_suffix('"')
}

/// Integer, allowing `_` digit separators
fn parse_int<T: core::str::FromStr>(value: &str) -> Option<T> {
    let mut digits: HString<24> = HString::new();
    for c in value.chars().filter(|&c| c != '_') {
        digits.push(c).ok()?;
    }
    digits.parse().ok()
}

fn parse_bool(value: &str) -> Option<bool> {
    match value {
        "true" => Some(true),
        "false" => Some(false),
        _ => None,
    }
}
