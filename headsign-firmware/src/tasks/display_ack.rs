//! Display acknowledgment task
//!
//! Runs on the interrupt-priority executor so acks are recorded while the
//! controller task spins inside a display write.

use defmt::*;
use embassy_rp::uart::BufferedUartRx;

use headsign_hal::AckFlag;
use headsign_hal_rp2040::uart::listen_for_acks;

#[embassy_executor::task]
pub async fn display_ack_task(rx: BufferedUartRx, ack: &'static AckFlag) {
    info!("Display ack task started");
    listen_for_acks(rx, ack).await
}
