//! Headsign - Transit Headsign Controller Firmware
//!
//! Drives a BUSE120-style destination sign from an RP2040. Messages arrive
//! over a framed host link, persist in the last 64K of flash, and are
//! rotated onto the sign by the controller task.
//!
//! ```text
//! host UART ──▶ host_rx ──▶ HOST_REQUESTS ──▶ controller ──▶ BUSE UART ──▶ sign
//!          ◀── host_tx ◀── HOST_REPLIES  ◀──┘     ▲                      │
//!                                     TICK_SIGNAL ┘    display_ack ◀─────┘
//! ```

#![no_std]
#![no_main]

extern crate alloc;

use defmt::*;
use embassy_executor::{InterruptExecutor, Spawner};
use embassy_rp::bind_interrupts;
use embassy_rp::interrupt;
use embassy_rp::interrupt::{InterruptExt, Priority};
use embassy_rp::peripherals::{UART0, UART1};
use embassy_rp::uart::{BufferedInterruptHandler, Config as UartConfig, Uart};
use embassy_time::Duration;
use embedded_alloc::LlffHeap as Heap;
use static_cell::StaticCell;
use {defmt_rtt as _, panic_probe as _};

use headsign_core::Controller;
use headsign_hal::AckFlag;
use headsign_hal_rp2040::flash::Rp2040RecordStorage;
use headsign_hal_rp2040::time::{EmbassyMonotonic, HostClock, HostTimeSource};
use headsign_hal_rp2040::uart::BuseUart;

use crate::config::{parse_config, FirmwareConfig};
use crate::tasks::controller::LogTelemetry;

mod channels;
mod config;
mod tasks;

// Heap allocator for configuration parsing
#[global_allocator]
static HEAP: Heap = Heap::empty();

// Heap size: 8KB
const HEAP_SIZE: usize = 8 * 1024;

/// Embedded configuration (compiled into firmware)
/// Edit headsign.toml and rebuild to customize
const EMBEDDED_CONFIG: &str = include_str!("../headsign.toml");

bind_interrupts!(struct Irqs {
    UART0_IRQ => BufferedInterruptHandler<UART0>;
    UART1_IRQ => BufferedInterruptHandler<UART1>;
});

// Display acks are recorded here while the controller spins in a write
static DISPLAY_ACK: AckFlag = AckFlag::new();

// Last wall-clock time received from the host
static HOST_CLOCK: HostClock = HostClock::new();

// Runs the display ack task above thread mode
static EXECUTOR_HIGH: InterruptExecutor = InterruptExecutor::new();

#[interrupt]
unsafe fn SWI_IRQ_1() {
    EXECUTOR_HIGH.on_interrupt()
}

// Static cells for UART buffers (must live forever)
static DISPLAY_TX_BUF: StaticCell<[u8; 256]> = StaticCell::new();
static DISPLAY_RX_BUF: StaticCell<[u8; 64]> = StaticCell::new();
static HOST_TX_BUF: StaticCell<[u8; 256]> = StaticCell::new();
static HOST_RX_BUF: StaticCell<[u8; 1024]> = StaticCell::new();

/// Main entry point
#[embassy_executor::main]
async fn main(spawner: Spawner) {
    info!("Headsign firmware starting...");

    init_heap();

    let p = embassy_rp::init(Default::default());
    info!("Peripherals initialized");

    let config = load_config();
    info!(
        "Configuration loaded: display {} baud, host {} baud",
        config.display.baudrate, config.host.baudrate
    );

    // Display UART (BUSE120): GPIO0 TX, GPIO1 RX
    let mut display_uart_config = UartConfig::default();
    display_uart_config.baudrate = config.display.baudrate;
    let display_uart = Uart::new_blocking(p.UART0, p.PIN_0, p.PIN_1, display_uart_config)
        .into_buffered(
            Irqs,
            DISPLAY_TX_BUF.init([0u8; 256]),
            DISPLAY_RX_BUF.init([0u8; 64]),
        );
    let (display_tx, display_rx) = display_uart.split();

    // Host UART: GPIO4 TX, GPIO5 RX
    let mut host_uart_config = UartConfig::default();
    host_uart_config.baudrate = config.host.baudrate;
    let host_uart = Uart::new_blocking(p.UART1, p.PIN_4, p.PIN_5, host_uart_config)
        .into_buffered(
            Irqs,
            HOST_TX_BUF.init([0u8; 256]),
            HOST_RX_BUF.init([0u8; 1024]),
        );
    let (host_tx, host_rx) = host_uart.split();
    info!("UARTs initialized");

    let ack_window = match config.display.ack_window_ms {
        0 => None,
        ms => Some(Duration::from_millis(ms as u64)),
    };
    let transport = BuseUart::new(display_tx, &DISPLAY_ACK, ack_window);
    let storage = Rp2040RecordStorage::new(p.FLASH, p.DMA_CH0);
    let time_source = HostTimeSource::new(&HOST_CLOCK, config.host.time_max_age_s as u64 * 1000);

    let controller = match Controller::new(
        config.controller,
        storage,
        transport,
        time_source,
        EmbassyMonotonic,
        Some(LogTelemetry::default()),
    ) {
        Ok(controller) => controller,
        Err(e) => defmt::panic!("Controller configuration rejected: {}", e),
    };

    // High-priority executor for the ack listener
    interrupt::SWI_IRQ_1.set_priority(Priority::P2);
    let spawner_high = EXECUTOR_HIGH.start(interrupt::SWI_IRQ_1);
    spawner_high
        .spawn(tasks::display_ack_task(display_rx, &DISPLAY_ACK))
        .unwrap();

    spawner.spawn(tasks::tick_task()).unwrap();
    spawner.spawn(tasks::host_rx_task(host_rx)).unwrap();
    spawner.spawn(tasks::host_tx_task(host_tx)).unwrap();
    spawner
        .spawn(tasks::controller_task(controller, &HOST_CLOCK))
        .unwrap();

    info!("All tasks spawned, firmware running");

    loop {
        embassy_time::Timer::after_secs(60).await;
        trace!("Main loop heartbeat");
    }
}

/// Initialize the heap allocator
fn init_heap() {
    use core::mem::MaybeUninit;
    static mut HEAP_MEM: [MaybeUninit<u8>; HEAP_SIZE] = [MaybeUninit::uninit(); HEAP_SIZE];
    #[allow(static_mut_refs)]
    unsafe {
        HEAP.init(HEAP_MEM.as_ptr() as usize, HEAP_SIZE)
    }
}

/// Parse the embedded configuration
///
/// Falls back to defaults if the file does not parse or the controller
/// section is out of range. build.rs rejects both, so this only matters
/// during development.
fn load_config() -> FirmwareConfig {
    let parsed = match parse_config(EMBEDDED_CONFIG) {
        Ok(parsed) => parsed,
        Err(e) => {
            error!("Failed to parse embedded config: {:?}", e);
            error!("Using default configuration");
            return FirmwareConfig::default();
        }
    };

    for line in parsed.ignored.iter() {
        warn!("Config: ignored '{}'", line);
    }

    if let Err(e) = parsed.config.controller.validate() {
        error!("Embedded controller config invalid: {}", e);
        error!("Using default configuration");
        return FirmwareConfig::default();
    }
    parsed.config
}
