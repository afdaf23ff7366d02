//! Configuration type definitions

use heapless::String;
use serde::{Deserialize, Serialize};

use crate::scheduler::SchedulerConfig;
use crate::store::MAX_PRIORITY;

/// Maximum database path length
pub const MAX_PATH_LEN: usize = 64;

/// Default database location
pub const DEFAULT_DATABASE_PATH: &str = "/littlefs/headsign.db";

/// Configuration rejected at construction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ConfigError {
    /// Database path is empty
    DatabasePath,
    /// Transition duration is zero
    TransitionDuration,
    /// Sync interval is zero
    SyncInterval,
    /// Emergency threshold above 100
    EmergencyThreshold,
    /// Repeat window is zero
    RepeatWindow,
    /// UTC offset outside ±14 hours
    UtcOffset,
    /// Tick budget is zero
    TickBudget,
}

impl core::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let msg = match self {
            ConfigError::DatabasePath => "database_path is empty",
            ConfigError::TransitionDuration => "transition_duration_s must be positive",
            ConfigError::SyncInterval => "time_sync_interval_s must be positive",
            ConfigError::EmergencyThreshold => "emergency_priority_threshold above 100",
            ConfigError::RepeatWindow => "min_seconds_between_repeats must be positive",
            ConfigError::UtcOffset => "utc_offset_minutes outside +/-840",
            ConfigError::TickBudget => "tick_budget_ms must be positive",
        };
        f.write_str(msg)
    }
}

/// Controller parameters
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[serde(default)]
pub struct ControllerConfig {
    /// Backing store location
    pub database_path: String<MAX_PATH_LEN>,
    /// Length of a message transition (seconds)
    pub transition_duration_s: u16,
    /// Time between clock sync attempts (seconds)
    pub time_sync_interval_s: u32,
    /// Priority at or above which a message is an emergency
    pub emergency_priority_threshold: u8,
    /// Repeat-suppression window (seconds)
    pub min_seconds_between_repeats: u32,
    /// Run the self-check before the first tick
    pub run_tests_on_startup: bool,
    /// Wipe the store at boot; also allows recovering a corrupt store
    pub wipe_database_on_boot: bool,
    /// Offset applied to the clock shown on the sign (minutes)
    pub utc_offset_minutes: i16,
    /// Scheduler step time above which a stall is logged (ms)
    pub tick_budget_ms: u32,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        let mut database_path = String::new();
        // Fits: the default is shorter than MAX_PATH_LEN
        let _ = database_path.push_str(DEFAULT_DATABASE_PATH);
        Self {
            database_path,
            transition_duration_s: 4,
            time_sync_interval_s: 10,
            emergency_priority_threshold: 95,
            min_seconds_between_repeats: 30,
            run_tests_on_startup: false,
            wipe_database_on_boot: false,
            utc_offset_minutes: 0,
            tick_budget_ms: 100,
        }
    }
}

impl ControllerConfig {
    /// Check every field against its allowed range
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.database_path.is_empty() {
            return Err(ConfigError::DatabasePath);
        }
        if self.transition_duration_s == 0 {
            return Err(ConfigError::TransitionDuration);
        }
        if self.time_sync_interval_s == 0 {
            return Err(ConfigError::SyncInterval);
        }
        if self.emergency_priority_threshold > MAX_PRIORITY {
            return Err(ConfigError::EmergencyThreshold);
        }
        if self.min_seconds_between_repeats == 0 {
            return Err(ConfigError::RepeatWindow);
        }
        if !(-840..=840).contains(&self.utc_offset_minutes) {
            return Err(ConfigError::UtcOffset);
        }
        if self.tick_budget_ms == 0 {
            return Err(ConfigError::TickBudget);
        }
        Ok(())
    }

    pub fn transition_ms(&self) -> u64 {
        self.transition_duration_s as u64 * 1000
    }

    /// Scheduler tuning derived from this configuration
    pub fn scheduler(&self) -> SchedulerConfig {
        SchedulerConfig {
            repeat_window_s: self.min_seconds_between_repeats,
            transition_ms: self.transition_ms(),
        }
    }
}
