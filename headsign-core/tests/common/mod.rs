//! Shared fakes for controller tests

#![allow(dead_code)]

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use headsign_core::controller::{Telemetry, TelemetryError, TelemetrySink};
use headsign_core::{Controller, ControllerConfig};
use headsign_hal::{
    Monotonic, RecordStorage, SerialTransport, TimeSource, TimeSourceError, TransportError,
};

/// Unix time at monotonic zero
pub const EPOCH: u64 = 1_700_000_000;

/// Manually advanced monotonic clock; clones share the same time
#[derive(Clone, Default)]
pub struct TestClock {
    ms: Rc<Cell<u64>>,
}

impl TestClock {
    pub fn set_s(&self, s: u64) {
        self.ms.set(s * 1000);
    }

    pub fn set_ms(&self, ms: u64) {
        self.ms.set(ms);
    }
}

impl Monotonic for TestClock {
    fn now_ms(&self) -> u64 {
        self.ms.get()
    }
}

/// Time authority that tracks the test clock from [`EPOCH`]
#[derive(Clone)]
pub struct TestTimeSource {
    clock: TestClock,
    available: Rc<Cell<bool>>,
}

impl TestTimeSource {
    pub fn new(clock: &TestClock) -> Self {
        Self {
            clock: clock.clone(),
            available: Rc::new(Cell::new(true)),
        }
    }

    pub fn set_available(&self, available: bool) {
        self.available.set(available);
    }
}

impl TimeSource for TestTimeSource {
    fn fetch_unix_time(&mut self) -> Result<u64, TimeSourceError> {
        if !self.available.get() {
            return Err(TimeSourceError::Unavailable);
        }
        Ok(EPOCH + self.clock.now_ms() / 1000)
    }
}

#[derive(Default)]
struct Wire {
    writes: Vec<Vec<u8>>,
    fail: usize,
}

/// Transport recording every acknowledged command
#[derive(Clone, Default)]
pub struct TestTransport {
    wire: Rc<RefCell<Wire>>,
}

impl TestTransport {
    /// Time out the next `count` writes
    pub fn fail_next(&self, count: usize) {
        self.wire.borrow_mut().fail = count;
    }

    pub fn clear(&self) {
        self.wire.borrow_mut().writes.clear();
    }

    /// Acknowledged commands starting with `prefix`, checksum stripped
    pub fn sent_with(&self, prefix: &[u8]) -> Vec<Vec<u8>> {
        self.wire
            .borrow()
            .writes
            .iter()
            .filter(|w| w.starts_with(prefix))
            .map(|w| w[..w.len() - 2].to_vec())
            .collect()
    }

    /// Every scrolling text sent, decoded as ASCII
    pub fn texts(&self) -> Vec<String> {
        self.sent_with(b"zM ")
            .into_iter()
            .map(|w| String::from_utf8_lossy(&w[3..]).into_owned())
            .collect()
    }

    pub fn write_count(&self) -> usize {
        self.wire.borrow().writes.len()
    }
}

impl SerialTransport for TestTransport {
    fn write(&mut self, bytes: &[u8]) -> Result<(), TransportError> {
        let mut wire = self.wire.borrow_mut();
        if wire.fail > 0 {
            wire.fail -= 1;
            return Err(TransportError::Timeout);
        }
        wire.writes.push(bytes.to_vec());
        Ok(())
    }
}

/// Sink keeping every snapshot
#[derive(Clone, Default)]
pub struct TestSink {
    pub snapshots: Rc<RefCell<Vec<Telemetry>>>,
}

impl TelemetrySink for TestSink {
    fn publish(&mut self, telemetry: &Telemetry) -> Result<(), TelemetryError> {
        self.snapshots.borrow_mut().push(*telemetry);
        Ok(())
    }
}

pub type TestController<S> = Controller<S, TestTransport, TestTimeSource, TestClock, TestSink>;

pub struct Harness<S> {
    pub controller: TestController<S>,
    pub clock: TestClock,
    pub transport: TestTransport,
    pub time: TestTimeSource,
    pub sink: TestSink,
}

impl<S: RecordStorage> Harness<S> {
    pub fn new(config: ControllerConfig, storage: S) -> Self {
        let clock = TestClock::default();
        let transport = TestTransport::default();
        let time = TestTimeSource::new(&clock);
        let sink = TestSink::default();
        let controller = Controller::new(
            config,
            storage,
            transport.clone(),
            time.clone(),
            clock.clone(),
            Some(sink.clone()),
        )
        .unwrap();
        Self {
            controller,
            clock,
            transport,
            time,
            sink,
        }
    }

    /// Advance to `t` seconds after boot and tick
    pub fn tick_at(&mut self, t: u64) -> headsign_core::TickReport {
        self.clock.set_s(t);
        self.controller.tick()
    }

    /// Advance to `t` seconds after boot
    pub fn at(&mut self, t: u64) -> &mut TestController<S> {
        self.clock.set_s(t);
        &mut self.controller
    }
}
