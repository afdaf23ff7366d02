//! Controller task
//!
//! Owns the [`Controller`] and is the only code that touches it. Ticks on
//! [`TICK_SIGNAL`] and applies host requests between ticks, so a request
//! never lands in the middle of a scheduler step.

use defmt::*;
use embassy_futures::select::{select, Either};
use embassy_rp::uart::BufferedUartTx;

use headsign_core::controller::{Telemetry, TelemetryError, TelemetrySink};
use headsign_core::{Controller, LinkError, NewMessage, StoreError, ValidationError};
use headsign_hal::StorageError;
use headsign_hal_rp2040::flash::Rp2040RecordStorage;
use headsign_hal_rp2040::time::{EmbassyMonotonic, HostClock, HostTimeSource};
use headsign_hal_rp2040::uart::BuseUart;
use headsign_protocol::{Frame, HostCommand, HostReply, InsertRequest, NackReason};

use crate::channels::{HOST_REPLIES, HOST_REQUESTS};
use crate::tasks::tick::TICK_SIGNAL;

/// Ticks between telemetry log lines (one minute at 100 ms)
const TELEMETRY_LOG_EVERY: u32 = 600;

/// The controller as wired on this board
pub type SignController = Controller<
    Rp2040RecordStorage<'static>,
    BuseUart<BufferedUartTx>,
    HostTimeSource,
    EmbassyMonotonic,
    LogTelemetry,
>;

/// Telemetry sink that logs a periodic summary and every state change
#[derive(Default)]
pub struct LogTelemetry {
    ticks: u32,
    last: Option<Telemetry>,
}

impl TelemetrySink for LogTelemetry {
    fn publish(&mut self, t: &Telemetry) -> Result<(), TelemetryError> {
        self.ticks = self.ticks.wrapping_add(1);

        let changed = match &self.last {
            Some(prev) => {
                prev.last_shown != t.last_shown
                    || prev.link_degraded != t.link_degraded
                    || prev.paused != t.paused
                    || prev.clock_synced != t.clock_synced
            }
            None => true,
        };

        if changed || self.ticks % TELEMETRY_LOG_EVERY == 0 {
            info!(
                "Telemetry: t={} queue={} ephemeral={} shown={:?} state={:?} paused={} degraded={} dropped={} synced={}",
                t.now,
                t.queue_depth,
                t.ephemeral_depth,
                t.last_shown,
                t.state,
                t.paused,
                t.link_degraded,
                t.frames_dropped,
                t.clock_synced
            );
        }
        self.last = Some(*t);
        Ok(())
    }
}

/// Controller task - start, then tick and serve host requests forever
#[embassy_executor::task]
pub async fn controller_task(mut controller: SignController, host_clock: &'static HostClock) {
    info!("Controller task started");

    match controller.start() {
        Ok(report) => {
            info!(
                "Controller started: {} messages, recovered={}, wiped={}",
                report.messages, report.recovered, report.wiped
            );
            if let Some(check) = report.self_check {
                if check.all_passed() {
                    info!("Self-check passed ({} checks)", check.passed);
                } else {
                    warn!(
                        "Self-check: {} passed, {} failed",
                        check.passed, check.failed
                    );
                }
            }
        }
        Err(e) => {
            error!("Startup halted: {}", e);
            refuse_requests().await;
        }
    }

    loop {
        match select(TICK_SIGNAL.wait(), HOST_REQUESTS.receive()).await {
            Either::First(_now_ms) => {
                let report = controller.tick();
                if let Some(e) = report.store_error {
                    trace!("Tick store error: {:?}", e);
                }
                if let Some(e) = report.link_error {
                    trace!("Tick link error: {:?}", e);
                }
            }
            Either::Second(frame) => {
                let reply = handle_request(&mut controller, host_clock, &frame);
                send_reply(frame.seq, reply).await;
            }
        }
    }
}

/// After a failed start: answer every request with `Busy`
async fn refuse_requests() -> ! {
    loop {
        let frame = HOST_REQUESTS.receive().await;
        send_reply(frame.seq, HostReply::Nack(NackReason::Busy)).await;
    }
}

async fn send_reply(seq: u8, reply: HostReply) {
    match reply.to_frame(seq) {
        Ok(frame) => HOST_REPLIES.send(frame).await,
        Err(e) => error!("Reply frame failed: {:?}", e),
    }
}

/// Apply one host request
fn handle_request(
    controller: &mut SignController,
    host_clock: &'static HostClock,
    frame: &Frame,
) -> HostReply {
    let command = match HostCommand::from_frame(frame) {
        Ok(command) => command,
        Err(e) => {
            warn!("Malformed host request: {:?}", e);
            return HostReply::Nack(NackReason::Malformed);
        }
    };
    debug!("Host request: {:?}", command);

    match command {
        HostCommand::Ping => HostReply::Pong,
        HostCommand::Insert(request) => {
            let draft = draft_from(&request);
            let result = if request.unique {
                controller.insert_unique(&draft)
            } else {
                controller.insert(&draft)
            };
            match result {
                Ok(id) => HostReply::Inserted { id },
                Err(e) => store_nack(e),
            }
        }
        HostCommand::Update { id, request } => {
            let draft = draft_from(&request);
            ack_or(controller.update(id, &draft).map_err(store_nack))
        }
        HostCommand::Remove { id } => ack_or(controller.remove(id).map_err(store_nack)),
        HostCommand::SetEnabled { id, enabled } => {
            ack_or(controller.set_enabled(id, enabled).map_err(store_nack))
        }
        HostCommand::Ephemeral {
            display_count,
            request,
        } => match controller.insert_ephemeral(&draft_from(&request), display_count) {
            Ok(id) => HostReply::Inserted { id },
            Err(e) => store_nack(e),
        },
        HostCommand::ClearEphemeral => {
            controller.clear_ephemeral();
            HostReply::Ack
        }
        HostCommand::SetTime { unix_time } => match host_clock.set(unix_time) {
            Ok(()) => {
                controller.clock_mut().request_sync();
                HostReply::Ack
            }
            Err(e) => {
                warn!("Host time {} rejected: {:?}", unix_time, e);
                HostReply::Nack(NackReason::Invalid)
            }
        },
        HostCommand::Pause => {
            controller.pause();
            HostReply::Ack
        }
        HostCommand::Resume => {
            controller.resume();
            HostReply::Ack
        }
        HostCommand::Raw(payload) => ack_or(controller.send_raw(payload).map_err(|e| match e {
            LinkError::Encode => HostReply::Nack(NackReason::Invalid),
            LinkError::Timeout | LinkError::Bus => HostReply::Nack(NackReason::Busy),
        })),
    }
}

fn ack_or(result: Result<(), HostReply>) -> HostReply {
    match result {
        Ok(()) => HostReply::Ack,
        Err(nack) => nack,
    }
}

fn draft_from<'a>(request: &InsertRequest<'a>) -> NewMessage<'a> {
    let draft = NewMessage::new(request.text, request.priority)
        .with_line(request.line_number)
        .with_zone(request.tarif_zone)
        .with_intro(request.intro)
        .with_hint(request.hint)
        .with_source(request.source)
        .with_enabled(!request.disabled);
    // Zero on the wire means no expiry
    match request.ttl_s {
        0 => draft,
        ttl_s => draft.with_ttl(ttl_s),
    }
}

fn store_nack(e: StoreError) -> HostReply {
    let reason = match e {
        StoreError::Validation(ValidationError::Duplicate) => NackReason::Duplicate,
        StoreError::Validation(ValidationError::Full) => NackReason::Full,
        StoreError::Validation(_) => NackReason::Invalid,
        StoreError::NotFound => NackReason::NotFound,
        StoreError::Storage(StorageError::Full) => NackReason::Full,
        StoreError::Corrupt | StoreError::Storage(_) => NackReason::Storage,
    };
    HostReply::Nack(reason)
}
