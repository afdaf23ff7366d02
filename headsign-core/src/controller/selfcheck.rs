//! Startup self-check
//!
//! A handful of known-answer checks run before the first tick when
//! `run_tests_on_startup` is set. Results are logged and counted; a failure
//! does not stop the controller.

use headsign_hal::{RecordKey, RecordStorage};
use headsign_protocol::{encode_text, BuseCommand};

use crate::render::{DisplayFrame, Renderer};

/// Pass/fail counts of one self-check run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SelfCheckReport {
    pub passed: u8,
    pub failed: u8,
}

impl SelfCheckReport {
    pub fn all_passed(&self) -> bool {
        self.failed == 0
    }

    fn record(&mut self, name: &str, ok: bool) {
        if ok {
            self.passed += 1;
            info!("selfcheck: {} ok", name);
        } else {
            self.failed += 1;
            error!("selfcheck: {} FAILED", name);
        }
    }
}

const SCRATCH_PATTERN: [u8; 8] = [0x48, 0x53, 0x00, 0xFF, 0x0E, 0x87, 0x0D, 0x22];

/// Run every check against `storage`
pub fn run<S: RecordStorage>(storage: &mut S) -> SelfCheckReport {
    let mut report = SelfCheckReport::default();
    report.record("storage", storage_roundtrip(storage));
    report.record("checksum", checksum_vector());
    report.record("glyphs", glyph_vector());
    report.record("renderer", renderer_settles());
    info!(
        "selfcheck: {} passed, {} failed",
        report.passed, report.failed
    );
    report
}

/// Write, read back, and remove the scratch record
fn storage_roundtrip<S: RecordStorage>(storage: &mut S) -> bool {
    if storage.write(RecordKey::Scratch, &SCRATCH_PATTERN).is_err() {
        return false;
    }
    let mut buf = [0u8; SCRATCH_PATTERN.len()];
    let matches = matches!(
        storage.read(RecordKey::Scratch, &mut buf),
        Ok(len) if buf[..len] == SCRATCH_PATTERN
    );
    storage.remove(RecordKey::Scratch).is_ok() && matches
}

fn checksum_vector() -> bool {
    matches!(
        BuseCommand::LineNumber(48).encode(),
        Ok(bytes) if bytes.as_slice() == [b'l', b'0', b'4', b'8', 0x0D, 0x22]
    )
}

fn glyph_vector() -> bool {
    let mut out: heapless::Vec<u8, 4> = heapless::Vec::new();
    encode_text("č", &mut out) && out.as_slice() == [0x0E, 0x87]
}

/// A one-second transition settles on its target
fn renderer_settles() -> bool {
    let target = DisplayFrame::fallback();
    let mut renderer = Renderer::new(DisplayFrame::splash());
    let handle = renderer.begin(target.clone(), 1000, 0);
    let midway_differs = renderer.step(500).is_some_and(|f| *f != target);
    let settled = renderer.step(1000).is_some_and(|f| *f == target);
    midway_differs && settled && renderer.is_complete(&handle)
}
