//! BUSE display UART
//!
//! Writes each command on the display UART and, when the sign is known to
//! acknowledge, waits for the ack byte within a bounded window. The ack
//! itself is observed by a receive task through a shared [`AckFlag`].

use embassy_time::{Duration, Instant};
use embedded_io::Write;
use embedded_io_async::Read;

use headsign_hal::{AckFlag, SerialTransport, TransportError};

/// Byte the sign sends to acknowledge a command
pub const ACK_BYTE: u8 = 0x06;

/// Display transport over any blocking UART writer
pub struct BuseUart<W> {
    tx: W,
    ack: &'static AckFlag,
    /// `None` for signs that never acknowledge
    ack_window: Option<Duration>,
}

impl<W: Write> BuseUart<W> {
    pub fn new(tx: W, ack: &'static AckFlag, ack_window: Option<Duration>) -> Self {
        Self {
            tx,
            ack,
            ack_window,
        }
    }
}

impl<W: Write> SerialTransport for BuseUart<W> {
    fn write(&mut self, bytes: &[u8]) -> Result<(), TransportError> {
        let snapshot = self.ack.snapshot();
        self.tx.write_all(bytes).map_err(|_| TransportError::Bus)?;
        self.tx.flush().map_err(|_| TransportError::Bus)?;

        let Some(window) = self.ack_window else {
            return Ok(());
        };
        let deadline = Instant::now() + window;
        while !self.ack.acknowledged_since(snapshot) {
            if Instant::now() >= deadline {
                return Err(TransportError::Timeout);
            }
            core::hint::spin_loop();
        }
        Ok(())
    }
}

/// Watch the display's receive line and record every ack
pub async fn listen_for_acks<R: Read>(mut rx: R, ack: &AckFlag) -> ! {
    let mut buf = [0u8; 16];
    loop {
        match rx.read(&mut buf).await {
            Ok(n) => {
                for _ in buf[..n].iter().filter(|&&b| b == ACK_BYTE) {
                    ack.notify();
                }
            }
            Err(_) => {
                #[cfg(feature = "defmt")]
                defmt::warn!("display rx error");
            }
        }
    }
}
