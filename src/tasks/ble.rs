//! BLE task for the UART bridge
//!
//! Runs the GATT server and doubles as the application task: it consumes
//! [`AppMessage`]s from the UART interrupt and forwards the receive buffer as
//! notifications, and routes characteristic writes to the bridge.

use embassy_futures::select::{select, Either};
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_time::{Duration, Timer};
use heapless::Vec;
use trouble_host::prelude::*;

use crate::app::{AppMessage, AppReceiver, IoMessageSubtype, IoMessageType, RxNotifier};
use crate::ble::service::UartBridgeService;
use crate::bridge::{format_device_name, CharacteristicBridge, PairingError, PairingGuard};
use crate::config::gatt::{DEVICE_NAME_LEN, NOTIFY_CHUNK_SIZE};
use crate::storage::BaudStore;
use crate::uart::UartHardware;

/// Number of maximum concurrent connections
const CONNECTIONS_MAX: usize = 1;
/// Number of L2CAP channels
const L2CAP_CHANNELS_MAX: usize = 3;
/// Pause before advertising again after an error
const ADVERTISE_RETRY_MS: u64 = 500;

/// BLE GATT server with the UART bridge service
#[gatt_server(mutex_type = CriticalSectionRawMutex)]
struct Server {
    uart: UartBridgeService,
}

/// Main BLE task
///
/// 1. Starts advertising as "RTL-UART-XXXXXX" derived from `address`
/// 2. Accepts one central at a time
/// 3. Applies baud writes and forwards data writes to the UART
/// 4. Notifies received UART bytes when the interrupt signals data ready
pub async fn ble_task<C, H, T, S, const N: usize>(
    controller: C,
    address: [u8; 6],
    mut bridge: CharacteristicBridge<'static, H, T, S, N>,
    mut pairing: PairingGuard,
    receiver: AppReceiver,
) where
    C: Controller,
    H: UartHardware,
    T: RxNotifier,
    S: BaudStore,
{
    let mut name_buf = [0u8; DEVICE_NAME_LEN];
    let device_name = format_device_name(&mut name_buf, &address);

    log::info!("BLE: starting as '{}'", device_name);

    let mut resources: HostResources<DefaultPacketPool, CONNECTIONS_MAX, L2CAP_CHANNELS_MAX> =
        HostResources::new();

    let stack = trouble_host::new(controller, &mut resources).set_random_address(Address::random(address));

    let Host {
        mut peripheral,
        mut runner,
        ..
    } = stack.build();

    let gap = GapConfig::Peripheral(PeripheralConfig {
        name: device_name,
        appearance: &appearance::UNKNOWN,
    });
    let server: Server = match Server::new_with_config(gap) {
        Ok(s) => s,
        Err(e) => {
            log::error!("BLE: failed to create GATT server: {:?}", e);
            return;
        }
    };

    let runner_task = runner.run();

    let peripheral_task = async {
        let mut adv_data = [0u8; 31];
        let len = match AdStructure::encode_slice(
            &[
                AdStructure::Flags(LE_GENERAL_DISCOVERABLE | BR_EDR_NOT_SUPPORTED),
                AdStructure::CompleteLocalName(device_name.as_bytes()),
            ],
            &mut adv_data,
        ) {
            Ok(l) => l,
            Err(_) => return,
        };

        loop {
            if pairing.is_locked_out() {
                log::warn!("BLE: pairing locked out, no longer advertising");
                core::future::pending::<()>().await;
            }

            log::debug!("BLE: advertising");
            let advertiser = match peripheral
                .advertise(
                    &Default::default(),
                    Advertisement::ConnectableScannableUndirected {
                        adv_data: &adv_data[..len],
                        scan_data: &[],
                    },
                )
                .await
            {
                Ok(a) => a,
                Err(e) => {
                    log::warn!("BLE: advertising failed: {:?}", e);
                    Timer::after(Duration::from_millis(ADVERTISE_RETRY_MS)).await;
                    continue;
                }
            };

            let conn = match advertiser.accept().await {
                Ok(acceptor) => match acceptor.with_attribute_server(&*server) {
                    Ok(c) => c,
                    Err(_) => continue,
                },
                Err(_) => continue,
            };
            log::info!("BLE: connected");

            // Drop anything received while nobody was listening
            while receiver.try_receive().is_ok() {}
            bridge.discard_received();

            if server.set(&server.uart.baud, &u32::from_le_bytes(bridge.baud_value())).is_err() {
                log::warn!("BLE: failed to publish baud rate");
            }

            loop {
                match select(conn.next(), receiver.receive()).await {
                    Either::First(GattConnectionEvent::Disconnected { reason }) => {
                        log::info!("BLE: disconnected ({:?})", reason);
                        break;
                    }
                    Either::First(GattConnectionEvent::PairingFailed(e)) => {
                        log::warn!("BLE: pairing failed: {:?}", e);
                        match pairing.record_failure() {
                            Err(PairingError::LockedOut) => conn.raw().disconnect(),
                            Err(PairingError::Failed { remaining }) => {
                                log::info!("BLE: {} pairing attempts left", remaining)
                            }
                            Ok(()) => {}
                        }
                    }
                    Either::First(GattConnectionEvent::Gatt { event }) => match event {
                        GattEvent::Write(write_event) => {
                            let handle = write_event.handle();
                            if handle == server.uart.baud.handle {
                                match bridge.set_baud(write_event.data()) {
                                    Ok(config) => log::info!("BLE: baud set to {}", config.target),
                                    Err(e) => log::warn!("BLE: baud write rejected: {:?}", e),
                                }
                            } else if handle == server.uart.write.handle {
                                if let Err(e) = bridge.write_data(write_event.data()) {
                                    log::warn!("BLE: dropped {} bytes: {:?}", write_event.data().len(), e);
                                }
                            }
                            let _ = write_event.accept();
                            if handle == server.uart.baud.handle {
                                let _ = server.set(&server.uart.baud, &u32::from_le_bytes(bridge.baud_value()));
                            }
                        }
                        GattEvent::Read(read_event) => {
                            let _ = read_event.accept();
                        }
                        GattEvent::Other(other_event) => {
                            let _ = other_event.accept();
                        }
                    },
                    Either::First(_) => {}
                    Either::Second(AppMessage {
                        msg_type: IoMessageType::Uart,
                        subtype: IoMessageSubtype::UartRx,
                    }) => {
                        let mut chunk = [0u8; NOTIFY_CHUNK_SIZE];
                        while let Some(count) = bridge.next_chunk(&mut chunk) {
                            let mut value: Vec<u8, NOTIFY_CHUNK_SIZE> = Vec::new();
                            let _ = value.extend_from_slice(&chunk[..count]);
                            if server.uart.read.notify(&conn, &value).await.is_err() {
                                log::warn!("BLE: notification failed, dropping {} bytes", count);
                            }
                        }
                    }
                }
            }
        }
    };

    select(runner_task, peripheral_task).await;
}
