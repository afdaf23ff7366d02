//! Controller
//!
//! Composition root. Owns the store, scheduler, renderer, display link, and
//! clock, and runs them in a fixed order on every tick:
//!
//! ```text
//! Settle ──▶ Scheduler ──▶ Renderer step ──▶ Clock sync ──▶ Link flush ──▶ Telemetry
//! ```
//!
//! The settle pass draws a transition whose time is up before the scheduler
//! looks at it, so a showing is only committed once its final frame is on
//! the link. A transition begun in the same tick starts from that frame, so
//! the flush still carries it.

pub mod selfcheck;
pub mod telemetry;

use headsign_hal::{Monotonic, RecordStorage, SerialTransport, TimeSource};
use headsign_protocol::BuseCommand;

use crate::clock::{local_hh_mm, ClockSync, SyncError};
use crate::config::{ConfigError, ControllerConfig};
use crate::link::{DisplayLink, LinkError};
use crate::render::{DisplayFrame, Renderer};
use crate::scheduler::{Scheduler, SchedulerTick};
use crate::store::{MessageId, MessageStore, NewMessage, StoreError, Timestamp};

pub use selfcheck::SelfCheckReport;
pub use telemetry::{NoTelemetry, Telemetry, TelemetryError, TelemetrySink};

/// Why the controller could not start
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum StartError {
    /// The store is unreadable and wiping it was not allowed
    StoreCorrupt,
    /// The store could not be read or reset
    Storage(StoreError),
    /// The configuration was rejected
    Config(ConfigError),
}

impl From<StoreError> for StartError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::Corrupt => StartError::StoreCorrupt,
            other => StartError::Storage(other),
        }
    }
}

impl From<ConfigError> for StartError {
    fn from(e: ConfigError) -> Self {
        StartError::Config(e)
    }
}

impl core::fmt::Display for StartError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            StartError::StoreCorrupt => {
                f.write_str("message store corrupt; set wipe_database_on_boot to recover")
            }
            StartError::Storage(e) => write!(f, "{}", e),
            StartError::Config(e) => write!(f, "invalid configuration: {}", e),
        }
    }
}

/// What `start` did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct StartReport {
    /// Messages loaded (zero after a wipe)
    pub messages: usize,
    /// A corrupt store was erased
    pub recovered: bool,
    /// The store was wiped on request
    pub wiped: bool,
    /// Self-check results, when enabled
    pub self_check: Option<SelfCheckReport>,
}

/// What one tick did
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct TickReport {
    /// Best-known Unix time at the start of the tick
    pub now: Timestamp,
    pub scheduler: Option<SchedulerTick>,
    /// Store failure, retried next tick
    pub store_error: Option<StoreError>,
    /// A frame went to the link queue
    pub frame_queued: bool,
    pub link_error: Option<LinkError>,
    /// Outcome of a clock sync attempt, if one was due
    pub sync: Option<Result<Timestamp, SyncError>>,
    /// The scheduler step exceeded the tick budget
    pub stalled: bool,
}

/// The headsign controller
pub struct Controller<S, T, C, M, K = NoTelemetry> {
    config: ControllerConfig,
    store: MessageStore<S>,
    scheduler: Scheduler,
    renderer: Renderer,
    link: DisplayLink<T>,
    clock: ClockSync<C>,
    monotonic: M,
    telemetry: Option<K>,
    started: bool,
}

impl<S, T, C, M, K> Controller<S, T, C, M, K>
where
    S: RecordStorage,
    T: SerialTransport,
    C: TimeSource,
    M: Monotonic,
    K: TelemetrySink,
{
    /// Build a controller; nothing touches storage until [`Controller::start`]
    pub fn new(
        config: ControllerConfig,
        storage: S,
        transport: T,
        time_source: C,
        monotonic: M,
        telemetry: Option<K>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        let now_ms = monotonic.now_ms();
        Ok(Self {
            store: MessageStore::new(storage, config.emergency_priority_threshold),
            scheduler: Scheduler::new(config.scheduler()),
            renderer: Renderer::new(DisplayFrame::splash()),
            link: DisplayLink::new(transport),
            clock: ClockSync::new(time_source, config.time_sync_interval_s, now_ms),
            monotonic,
            telemetry,
            started: false,
            config,
        })
    }

    /// Load the store and put the splash frame on the sign
    ///
    /// A corrupt store halts startup unless `wipe_database_on_boot` is set,
    /// in which case it is erased and the controller starts empty.
    pub fn start(&mut self) -> Result<StartReport, StartError> {
        info!(
            "controller: starting, database {}",
            self.config.database_path.as_str()
        );

        let mut recovered = false;
        match self.store.load() {
            Ok(()) => {}
            Err(StoreError::Corrupt) if self.config.wipe_database_on_boot => {
                warn!("controller: store corrupt, wiping");
                self.store.recover_corrupt()?;
                recovered = true;
            }
            Err(StoreError::Corrupt) => {
                error!("controller: store corrupt, refusing to start");
                return Err(StartError::StoreCorrupt);
            }
            Err(e) => return Err(e.into()),
        }

        let wiped = self.config.wipe_database_on_boot && !recovered;
        if wiped {
            self.store.wipe_all()?;
        }

        let now_ms = self.monotonic.now_ms();
        if let Some(latest) = self.store.latest_timestamp() {
            self.clock.seed(latest, now_ms);
        }
        // Try for real time before anything gets timestamped
        if let Some(Err(e)) = self.clock.tick(now_ms) {
            warn!("controller: starting unsynced: {}", e);
        }

        let self_check = if self.config.run_tests_on_startup {
            Some(selfcheck::run(self.store.storage_mut()))
        } else {
            None
        };

        self.renderer.show(DisplayFrame::splash());
        self.link.queue(self.renderer.current());
        if let Err(e) = self.link.flush() {
            // The first tick re-queues it
            warn!("controller: splash not delivered: {}", e);
        }

        self.started = true;
        info!("controller: started with {} messages", self.store.len());
        Ok(StartReport {
            messages: self.store.len(),
            recovered,
            wiped,
            self_check,
        })
    }

    /// Run one cooperative tick
    ///
    /// Never fails: store and link errors are reported and retried on the
    /// next tick.
    pub fn tick(&mut self) -> TickReport {
        let mut report = TickReport::default();
        if !self.started {
            warn!("controller: tick before start");
            return report;
        }

        let now_ms = self.monotonic.now_ms();
        let now = self.clock.now(now_ms);
        report.now = now;

        if self.renderer.is_due(now_ms) {
            if let Some(frame) = self.renderer.step(now_ms) {
                self.link.queue(frame);
                report.frame_queued = true;
            }
        }

        let step = self
            .scheduler
            .tick(&mut self.store, &mut self.renderer, now, now_ms);
        let step_ms = self.monotonic.now_ms().saturating_sub(now_ms);
        if step_ms > self.config.tick_budget_ms as u64 {
            warn!("controller: scheduler step took {} ms", step_ms);
            report.stalled = true;
        }
        match step {
            Ok(tick) => report.scheduler = Some(tick),
            Err(e) => {
                warn!("controller: store error, retrying next tick: {}", e);
                report.store_error = Some(e);
            }
        }

        let refresh = self.link.take_refresh();
        match self.renderer.step(now_ms) {
            Some(frame) => {
                self.link.queue(frame);
                report.frame_queued = true;
            }
            None if refresh => {
                self.link.queue(self.renderer.current());
                report.frame_queued = true;
            }
            None => {}
        }

        if let Some(outcome) = self.clock.tick(now_ms) {
            if self.clock.is_synced() {
                let (hour, minute) =
                    local_hh_mm(self.clock.now(now_ms), self.config.utc_offset_minutes);
                self.link.queue_time(hour, minute);
            }
            report.sync = Some(outcome);
        }

        if let Err(e) = self.link.flush() {
            report.link_error = Some(e);
        }

        self.publish_telemetry(now);
        report
    }

    fn publish_telemetry(&mut self, now: Timestamp) {
        let snapshot = self.snapshot(now);
        if let Some(sink) = self.telemetry.as_mut() {
            if sink.publish(&snapshot).is_err() {
                debug!("controller: telemetry sink unavailable");
            }
        }
    }

    /// Snapshot of the controller state at `now`
    pub fn snapshot(&self, now: Timestamp) -> Telemetry {
        Telemetry {
            now,
            queue_depth: self.store.active_count(now) as u8,
            ephemeral_depth: self.store.ephemeral().live_count(now) as u8,
            last_shown: self.scheduler.currently_displayed(),
            state: self.scheduler.state(),
            paused: self.scheduler.is_paused(),
            link_degraded: self.link.is_degraded(),
            frames_dropped: self.link.health().frames_dropped,
            clock_synced: self.clock.is_synced(),
        }
    }

    /// Best-known Unix time
    pub fn now(&self) -> Timestamp {
        self.clock.now(self.monotonic.now_ms())
    }

    /// Store a new message, timestamped now
    pub fn insert(&mut self, draft: &NewMessage<'_>) -> Result<MessageId, StoreError> {
        let now = self.now();
        self.store.insert(draft, now)
    }

    /// Store a new message unless an active one has the same text
    pub fn insert_unique(&mut self, draft: &NewMessage<'_>) -> Result<MessageId, StoreError> {
        let now = self.now();
        self.store.insert_unique(draft, now)
    }

    pub fn update(&mut self, id: MessageId, draft: &NewMessage<'_>) -> Result<(), StoreError> {
        let now = self.now();
        self.store.update(id, draft, now)
    }

    pub fn remove(&mut self, id: MessageId) -> Result<(), StoreError> {
        self.store.remove(id)
    }

    /// Keep a message stored but take it out of (or back into) rotation
    pub fn set_enabled(&mut self, id: MessageId, enabled: bool) -> Result<(), StoreError> {
        self.store.set_enabled(id, enabled)
    }

    /// Queue a RAM-only message for `display_count` showings
    ///
    /// Zero keeps it up until its TTL. Lost on restart.
    pub fn insert_ephemeral(
        &mut self,
        draft: &NewMessage<'_>,
        display_count: u16,
    ) -> Result<MessageId, StoreError> {
        let now = self.now();
        self.store.insert_ephemeral(draft, display_count, now)
    }

    /// Drop every queued ephemeral message
    pub fn clear_ephemeral(&mut self) {
        self.store.ephemeral_mut().clear();
    }

    pub fn pause(&mut self) {
        self.scheduler.pause();
    }

    pub fn resume(&mut self) {
        self.scheduler.resume();
    }

    /// Send a verbatim BUSE payload to the sign
    pub fn send_raw(&mut self, payload: &[u8]) -> Result<(), LinkError> {
        self.link.send_command(BuseCommand::Raw(payload))
    }

    pub fn config(&self) -> &ControllerConfig {
        &self.config
    }

    pub fn store(&self) -> &MessageStore<S> {
        &self.store
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    pub fn renderer(&self) -> &Renderer {
        &self.renderer
    }

    pub fn link(&self) -> &DisplayLink<T> {
        &self.link
    }

    pub fn link_mut(&mut self) -> &mut DisplayLink<T> {
        &mut self.link
    }

    pub fn clock(&self) -> &ClockSync<C> {
        &self.clock
    }

    pub fn clock_mut(&mut self) -> &mut ClockSync<C> {
        &mut self.clock
    }

    pub fn is_started(&self) -> bool {
        self.started
    }
}
