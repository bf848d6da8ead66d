//! btleplug implementation of [`GattTransport`]
//!
//! Operations are queued to a single worker task so they reach the radio in
//! the order the adapter issued them. Results, notifications and disconnects
//! come back on an unbounded channel of [`LinkEvent`]s.

use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use btleplug::api::{
    BDAddr, Central, CentralEvent, Characteristic, Manager as _, Peripheral as _, ScanFilter,
    WriteType,
};
use btleplug::platform::{Adapter, Manager, Peripheral, PeripheralId};
use futures::{Stream, StreamExt};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

use super::{GattTransport, TransportError};
use crate::config::{BAUD_CHAR_UUID, READ_CHAR_UUID, SERVICE_UUID, WRITE_CHAR_UUID};
use crate::link::LinkEvent;
use crate::serial::device_name;

/// Link events carrying btleplug characteristics
pub type BtleEvent = LinkEvent<Characteristic>;

/// Receiving end of the transport's event channel
pub type EventReceiver = UnboundedReceiver<BtleEvent>;

/// Work for the GATT worker
#[derive(Debug)]
enum Op {
    Connect,
    DiscoverServices,
    ResolveCharacteristics,
    EnableNotifications(Characteristic),
    WriteBaud(Characteristic, [u8; 4]),
    ReadBaud(Characteristic),
    Write(Characteristic, Vec<u8>),
    TearDown,
}

/// BLE transport talking to one bridge by address
pub struct BtleplugTransport {
    ops: UnboundedSender<Op>,
    events: UnboundedSender<BtleEvent>,
}

impl BtleplugTransport {
    /// Open the first Bluetooth adapter and start the worker tasks
    pub async fn start(
        address: BDAddr,
        scan_timeout: Duration,
    ) -> Result<(Self, EventReceiver), TransportError> {
        let manager = Manager::new().await?;
        let adapter = manager
            .adapters()
            .await?
            .into_iter()
            .next()
            .ok_or(TransportError::NoAdapter)?;

        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let (op_tx, op_rx) = mpsc::unbounded_channel();
        let current = Arc::new(Mutex::new(None));

        let central_events = adapter.events().await?;
        tokio::spawn(watch_disconnects(central_events, current.clone(), event_tx.clone()));

        let worker = Worker {
            adapter,
            address,
            name: device_name(address.into_inner()),
            scan_timeout,
            peripheral: None,
            notifications: None,
            current,
            events: event_tx.clone(),
        };
        tokio::spawn(worker.run(op_rx));

        Ok((
            Self {
                ops: op_tx,
                events: event_tx,
            },
            event_rx,
        ))
    }

    fn submit(&self, op: Op) {
        if self.ops.send(op).is_err() {
            log::error!("TRANSPORT: worker stopped, operation dropped");
        }
    }
}

impl GattTransport for BtleplugTransport {
    type Handle = Characteristic;

    fn connect(&mut self) {
        self.submit(Op::Connect);
    }

    fn discover_services(&mut self) {
        self.submit(Op::DiscoverServices);
    }

    fn resolve_characteristics(&mut self) {
        self.submit(Op::ResolveCharacteristics);
    }

    fn enable_notifications(&mut self, read: &Characteristic) {
        self.submit(Op::EnableNotifications(read.clone()));
    }

    fn write_baud(&mut self, baud: &Characteristic, value: [u8; 4]) {
        self.submit(Op::WriteBaud(baud.clone(), value));
    }

    fn read_baud(&mut self, baud: &Characteristic) {
        self.submit(Op::ReadBaud(baud.clone()));
    }

    fn write_without_response(&mut self, write: &Characteristic, data: &[u8]) {
        self.submit(Op::Write(write.clone(), data.to_vec()));
    }

    fn tear_down(&mut self) {
        self.submit(Op::TearDown);
    }

    fn schedule_retry(&mut self, delay: Duration) {
        let events = self.events.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = events.send(LinkEvent::RetryTimerFired);
        });
    }
}

/// Post `LinkClosed` when the current peripheral disconnects
async fn watch_disconnects(
    mut central_events: Pin<Box<dyn Stream<Item = CentralEvent> + Send>>,
    current: Arc<Mutex<Option<PeripheralId>>>,
    events: UnboundedSender<BtleEvent>,
) {
    while let Some(event) = central_events.next().await {
        if let CentralEvent::DeviceDisconnected(id) = event {
            if current.lock().await.as_ref() == Some(&id) {
                log::info!("TRANSPORT: peripheral disconnected");
                let _ = events.send(LinkEvent::LinkClosed);
            }
        }
    }
}

/// Owner of the peripheral; runs queued operations one at a time
struct Worker {
    adapter: Adapter,
    address: BDAddr,
    name: String,
    scan_timeout: Duration,
    peripheral: Option<Peripheral>,
    notifications: Option<JoinHandle<()>>,
    current: Arc<Mutex<Option<PeripheralId>>>,
    events: UnboundedSender<BtleEvent>,
}

impl Worker {
    async fn run(mut self, mut ops: UnboundedReceiver<Op>) {
        while let Some(op) = ops.recv().await {
            self.execute(op).await;
        }
        self.tear_down().await;
    }

    fn post(&self, event: BtleEvent) {
        let _ = self.events.send(event);
    }

    async fn execute(&mut self, op: Op) {
        match op {
            Op::Connect => match self.connect().await {
                Ok(()) => self.post(LinkEvent::LinkEstablished),
                Err(btleplug::Error::PermissionDenied) => {
                    self.post(LinkEvent::AuthenticationRejected)
                }
                Err(e) => {
                    log::warn!("TRANSPORT: connect failed: {}", e);
                    self.post(LinkEvent::LinkFailed);
                }
            },
            Op::DiscoverServices => {
                match self.discover_services().await {
                    Ok(services) => {
                        for uuid in services {
                            self.post(LinkEvent::ServiceFound(uuid));
                        }
                    }
                    Err(e) => log::warn!("TRANSPORT: service discovery failed: {}", e),
                }
                self.post(LinkEvent::ServiceDiscoveryFinished);
            }
            Op::ResolveCharacteristics => {
                let event = self.resolve_characteristics();
                self.post(event);
            }
            Op::EnableNotifications(read) => match self.enable_notifications(&read).await {
                Ok(()) => self.post(LinkEvent::NotificationsEnabled),
                Err(btleplug::Error::PermissionDenied) => {
                    self.post(LinkEvent::AuthenticationRejected)
                }
                Err(e) => {
                    log::warn!("TRANSPORT: enabling notifications failed: {}", e);
                    self.post(LinkEvent::NotificationsFailed);
                }
            },
            Op::WriteBaud(baud, value) => {
                if let Some(peripheral) = &self.peripheral {
                    if let Err(e) = peripheral.write(&baud, &value, WriteType::WithResponse).await {
                        log::warn!("TRANSPORT: baud write failed: {}", e);
                    }
                }
            }
            Op::ReadBaud(baud) => {
                if let Some(peripheral) = &self.peripheral {
                    match peripheral.read(&baud).await {
                        Ok(value) => match <[u8; 4]>::try_from(value.as_slice()) {
                            Ok(bytes) => self.post(LinkEvent::BaudRead(u32::from_le_bytes(bytes))),
                            Err(_) => log::warn!("TRANSPORT: baud value has {} bytes", value.len()),
                        },
                        Err(e) => log::warn!("TRANSPORT: baud read failed: {}", e),
                    }
                }
            }
            Op::Write(write, data) => {
                let result = match &self.peripheral {
                    Some(peripheral) => peripheral
                        .write(&write, &data, WriteType::WithoutResponse)
                        .await,
                    None => Err(btleplug::Error::NotConnected),
                };
                if let Err(e) = result {
                    log::debug!("TRANSPORT: write failed: {}", e);
                    self.post(LinkEvent::WriteFailed(data.len()));
                }
            }
            Op::TearDown => self.tear_down().await,
        }
    }

    async fn connect(&mut self) -> btleplug::Result<()> {
        let peripheral = self.find_peripheral().await?;
        peripheral.connect().await?;
        *self.current.lock().await = Some(peripheral.id());
        self.peripheral = Some(peripheral);
        Ok(())
    }

    /// Scan until the bridge shows up by address or advertised name
    async fn find_peripheral(&self) -> btleplug::Result<Peripheral> {
        self.adapter.start_scan(ScanFilter::default()).await?;
        let start = std::time::Instant::now();
        let mut found = None;

        'scan: while start.elapsed() < self.scan_timeout {
            for peripheral in self.adapter.peripherals().await? {
                if peripheral.address() == self.address {
                    found = Some(peripheral);
                    break 'scan;
                }
                if let Ok(Some(props)) = peripheral.properties().await {
                    if props.local_name.as_deref() == Some(self.name.as_str()) {
                        found = Some(peripheral);
                        break 'scan;
                    }
                }
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
        }

        let _ = self.adapter.stop_scan().await;
        found.ok_or(btleplug::Error::DeviceNotFound)
    }

    async fn discover_services(&self) -> btleplug::Result<Vec<uuid::Uuid>> {
        let peripheral = self.peripheral.as_ref().ok_or(btleplug::Error::NotConnected)?;
        peripheral.discover_services().await?;
        Ok(peripheral.services().iter().map(|s| s.uuid).collect())
    }

    fn resolve_characteristics(&self) -> BtleEvent {
        let service = self
            .peripheral
            .as_ref()
            .and_then(|p| p.services().into_iter().find(|s| s.uuid == SERVICE_UUID));
        let find = |uuid| {
            service
                .as_ref()
                .and_then(|s| s.characteristics.iter().find(|c| c.uuid == uuid).cloned())
        };
        LinkEvent::CharacteristicsResolved {
            baud: find(BAUD_CHAR_UUID),
            read: find(READ_CHAR_UUID),
            write: find(WRITE_CHAR_UUID),
        }
    }

    async fn enable_notifications(&mut self, read: &Characteristic) -> btleplug::Result<()> {
        let peripheral = self.peripheral.as_ref().ok_or(btleplug::Error::NotConnected)?;
        let mut stream = peripheral.notifications().await?;
        peripheral.subscribe(read).await?;

        if let Some(previous) = self.notifications.take() {
            previous.abort();
        }
        let events = self.events.clone();
        self.notifications = Some(tokio::spawn(async move {
            while let Some(notification) = stream.next().await {
                let event = LinkEvent::Notification {
                    characteristic: notification.uuid,
                    value: notification.value,
                };
                if events.send(event).is_err() {
                    break;
                }
            }
        }));
        Ok(())
    }

    /// Disconnect and report the close ourselves
    async fn tear_down(&mut self) {
        // Forget the id first so the watcher does not report this close twice
        *self.current.lock().await = None;
        if let Some(task) = self.notifications.take() {
            task.abort();
        }
        if let Some(peripheral) = self.peripheral.take() {
            if let Err(e) = peripheral.disconnect().await {
                log::debug!("TRANSPORT: disconnect failed: {}", e);
            }
        }
        self.post(LinkEvent::LinkClosed);
    }
}
