//! Host link UART tasks
//!
//! The receive task reassembles frames and hands them to the controller;
//! the transmit task writes replies back.

use defmt::*;
use embassy_rp::uart::{BufferedUartRx, BufferedUartTx};
use embedded_io_async::{Read, Write};

use headsign_protocol::FrameParser;

use crate::channels::{HOST_REPLIES, HOST_REQUESTS};

/// Buffer size for UART receive
const RX_BUF_SIZE: usize = 64;

/// Host RX task - parses frames and queues them for the controller
#[embassy_executor::task]
pub async fn host_rx_task(mut rx: BufferedUartRx) {
    info!("Host RX task started");

    let mut parser = FrameParser::new();
    let mut buf = [0u8; RX_BUF_SIZE];

    loop {
        match rx.read(&mut buf).await {
            Ok(n) if n > 0 => {
                trace!("Host RX: {} bytes", n);
                for &byte in &buf[..n] {
                    match parser.feed(byte) {
                        Ok(Some(frame)) => {
                            // Backpressure: the host waits for replies anyway
                            HOST_REQUESTS.send(frame).await;
                        }
                        Ok(None) => {}
                        Err(e) => {
                            warn!("Host frame error: {:?}", e);
                            parser.reset();
                        }
                    }
                }
            }
            Ok(_) => {}
            Err(e) => {
                warn!("Host UART read error: {:?}", e);
            }
        }
    }
}

/// Host TX task - writes reply frames
#[embassy_executor::task]
pub async fn host_tx_task(mut tx: BufferedUartTx) {
    info!("Host TX task started");

    loop {
        let frame = HOST_REPLIES.receive().await;
        let bytes = match frame.encode_to_vec() {
            Ok(bytes) => bytes,
            Err(e) => {
                error!("Reply encoding failed: {:?}", e);
                continue;
            }
        };
        if let Err(e) = tx.write_all(&bytes).await {
            warn!("Host UART write error: {:?}", e);
        }
    }
}
