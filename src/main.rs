#![no_std]
#![no_main]

extern crate alloc;

// Required for ESP-IDF bootloader compatibility
esp_bootloader_esp_idf::esp_app_desc!(
    env!("CARGO_PKG_VERSION"),  // version
    env!("CARGO_PKG_NAME"),     // project_name
    "00:00:00",                 // build_time
    "2025-01-01",               // build_date
    "0.0.0",                    // idf_ver (not using IDF)
    0x10000,                    // mmu_page_size (64KB)
    0,                          // min_efuse_blk_rev_full (accept all)
    u16::MAX                    // max_efuse_blk_rev_full (accept all)
);

use embassy_sync::once_lock::OnceLock;
use esp_backtrace as _;
use esp_hal::handler;
use esp_hal::timer::timg::TimerGroup;
use esp_hal::uart::{Config as UartConfig, Uart};
use esp_storage::FlashStorage;
use static_cell::StaticCell;

use ble_uart_bridge_firmware::app::{ChannelNotifier, APP_CHANNEL};
use ble_uart_bridge_firmware::bridge::{static_random_address, CharacteristicBridge, PairingGuard};
use ble_uart_bridge_firmware::config::app::MESSAGE_QUEUE_SIZE;
use ble_uart_bridge_firmware::config::uart::RX_BUFFER_SIZE;
use ble_uart_bridge_firmware::storage::FlashBaudStore;
use ble_uart_bridge_firmware::tasks::ble_task;
use ble_uart_bridge_firmware::uart::esp::EspUart;
use ble_uart_bridge_firmware::uart::UartDriver;

/// UART driver shared between the interrupt handler and the BLE task
type BridgeUart = UartDriver<EspUart, ChannelNotifier<'static, MESSAGE_QUEUE_SIZE>, RX_BUFFER_SIZE>;

/// Characteristic bridge owned by the BLE task
type Bridge = CharacteristicBridge<
    'static,
    EspUart,
    ChannelNotifier<'static, MESSAGE_QUEUE_SIZE>,
    FlashBaudStore<FlashStorage<'static>>,
    RX_BUFFER_SIZE,
>;

/// Type alias for the BLE controller
type BleController = trouble_host::prelude::ExternalController<
    esp_radio::ble::controller::BleConnector<'static>,
    10,
>;

/// Static executor for embassy
static EXECUTOR: StaticCell<esp_rtos::embassy::Executor> = StaticCell::new();

/// Static cell for esp-radio controller (needed for 'static lifetime)
static RADIO_CONTROLLER: StaticCell<esp_radio::Controller<'static>> = StaticCell::new();

/// Storage for the UART driver
static UART: StaticCell<BridgeUart> = StaticCell::new();

/// UART driver as seen by the interrupt handler
static UART_ISR: OnceLock<&'static BridgeUart> = OnceLock::new();

#[handler]
fn uart_interrupt() {
    if let Some(uart) = UART_ISR.try_get() {
        uart.on_interrupt();
    }
}

#[esp_hal::main]
fn main() -> ! {
    esp_println::logger::init_logger(log::LevelFilter::Info);

    // Heap for the BLE controller
    esp_alloc::heap_allocator!(size: 64 * 1024);

    let peripherals = esp_hal::init(esp_hal::Config::default());

    // Initialise the RTOS scheduler with timer - MUST be done before any async operations
    let timg0 = TimerGroup::new(peripherals.TIMG0);
    esp_rtos::start(timg0.timer0);

    // Bridged UART; the real baud rate is programmed by the bridge at start
    let mut uart = Uart::new(peripherals.UART1, UartConfig::default())
        .expect("Failed to initialise UART1")
        .with_tx(peripherals.GPIO17)
        .with_rx(peripherals.GPIO18);
    uart.set_interrupt_handler(uart_interrupt);

    let driver: &'static BridgeUart = UART.init(UartDriver::new(
        EspUart::new(uart),
        ChannelNotifier::new(APP_CHANNEL.sender()),
    ));
    let _ = UART_ISR.init(driver);

    let store = FlashBaudStore::new(FlashStorage::new(peripherals.FLASH));
    let mut bridge: Bridge = CharacteristicBridge::new(driver, store);
    if let Err(e) = bridge.start() {
        log::error!("UART: failed to start: {:?}", e);
    }

    let pairing = PairingGuard::from_config();

    // Device id from the eFuse MAC address (last 3 bytes)
    let mac = esp_hal::efuse::Efuse::read_base_mac_address();
    let address = static_random_address(&[mac[3], mac[4], mac[5]]);

    // Initialise esp-radio for BLE support (must be after esp_rtos::start)
    let radio_controller = RADIO_CONTROLLER.init(
        esp_radio::init().expect("Failed to initialize esp-radio")
    );

    let ble_connector = esp_radio::ble::controller::BleConnector::new(
        radio_controller,
        peripherals.BT,
        esp_radio::ble::Config::default(),
    ).expect("Failed to initialize BLE connector");

    let controller: BleController = trouble_host::prelude::ExternalController::new(ble_connector);

    let executor = EXECUTOR.init(esp_rtos::embassy::Executor::new());
    executor.run(|spawner| {
        spawner.must_spawn(ble_host_task(controller, address, bridge, pairing));
    })
}

/// Task that runs the GATT server and forwards UART data
#[embassy_executor::task]
async fn ble_host_task(
    controller: BleController,
    address: [u8; 6],
    bridge: Bridge,
    pairing: PairingGuard,
) {
    ble_task(controller, address, bridge, pairing, APP_CHANNEL.receiver()).await;
}
