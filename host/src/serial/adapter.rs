//! Byte-stream adapter
//!
//! [`BleSerial`] makes a bridge look like a serial port: reads drain the
//! notification queue, writes go out as single write-without-response
//! operations, and the connection keeps itself alive by reconnecting after
//! every failure.

use std::collections::VecDeque;

use thiserror::Error;

use super::queue::ReceiveQueue;
use crate::config::{HostConfig, BAUD_TOLERANCE_PERCENT, READ_CHAR_UUID};
use crate::link::{Action, ConnectionMachine, ConnectionState, LinkEvent, LinkStatus};
use crate::transport::GattTransport;

/// Errors returned to the caller of the adapter
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum AdapterError {
    #[error("not connected to the bridge")]
    NotConnected,
    #[error("invalid baud rate {0}")]
    InvalidBaudRate(u32),
}

/// Events for the user of the serial port
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SerialEvent {
    Connected,
    Disconnected,
    /// An attempt that got past link establishment did not reach ready
    ConnectionFailed,
    /// The device refused authentication; call `reconnect` to try again
    Rejected,
    /// This many bytes were appended to the receive queue
    DataArrived(usize),
    /// Baud rate read back from the device
    BaudRateReported(u32),
    /// A write of this many bytes was lost in the transport
    WriteFailed(usize),
}

impl From<LinkStatus> for SerialEvent {
    fn from(status: LinkStatus) -> Self {
        match status {
            LinkStatus::Connected => SerialEvent::Connected,
            LinkStatus::Disconnected => SerialEvent::Disconnected,
            LinkStatus::ConnectionFailed => SerialEvent::ConnectionFailed,
            LinkStatus::Rejected => SerialEvent::Rejected,
        }
    }
}

/// Whether a reported baud rate is close enough to the requested one
///
/// Compares bit periods rather than rates; the periods may differ by at most
/// 5 %.
pub fn baud_acceptable(actual: u32, expected: u32) -> bool {
    if actual == 0 || expected == 0 {
        return false;
    }
    // |1/a - 1/e| <= tol * 1/e  <=>  |e - a| <= tol * a
    (expected.abs_diff(actual) as u64) * 100 <= BAUD_TOLERANCE_PERCENT * actual as u64
}

/// Serial port backed by a BLE bridge
pub struct BleSerial<T: GattTransport> {
    transport: T,
    machine: ConnectionMachine<T::Handle>,
    config: HostConfig,
    queue: ReceiveQueue,
    events: VecDeque<SerialEvent>,
    desired_baud: u32,
    reported_baud: Option<u32>,
}

impl<T: GattTransport> BleSerial<T> {
    /// Create the adapter and start connecting immediately
    pub fn new(transport: T, config: HostConfig) -> Self {
        let mut serial = Self {
            transport,
            machine: ConnectionMachine::new(),
            queue: ReceiveQueue::new(config.queue_capacity),
            events: VecDeque::new(),
            desired_baud: config.baud_rate,
            reported_baud: None,
            config,
        };
        serial.handle(LinkEvent::ConnectRequested);
        serial
    }

    pub fn state(&self) -> ConnectionState {
        self.machine.state()
    }

    pub fn is_connected(&self) -> bool {
        self.machine.is_ready()
    }

    pub fn bytes_available(&self) -> usize {
        self.queue.len()
    }

    /// Baud rate last reported by the device on this or a previous connection
    pub fn baud_rate(&self) -> Option<u32> {
        self.reported_baud
    }

    /// Baud rate that will be applied on the next connection
    pub fn desired_baud_rate(&self) -> u32 {
        self.desired_baud
    }

    pub fn next_event(&mut self) -> Option<SerialEvent> {
        self.events.pop_front()
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Read up to `buf.len()` received bytes; returns 0 when none are queued
    pub fn read(&mut self, buf: &mut [u8]) -> usize {
        self.queue.read(buf)
    }

    /// Send `data` to the device's UART
    ///
    /// The bytes go out as one write-without-response. `Ok` means the write
    /// was handed to the BLE stack, not that it reached the device; there is
    /// no acknowledgement and no retry. A transport failure shows up later as
    /// [`SerialEvent::WriteFailed`].
    pub fn write(&mut self, data: &[u8]) -> Result<usize, AdapterError> {
        let handle = match (self.machine.is_ready(), self.machine.handles()) {
            (true, Some(handles)) => handles.write.clone(),
            _ => return Err(AdapterError::NotConnected),
        };
        if data.is_empty() {
            return Ok(0);
        }
        self.transport.write_without_response(&handle, data);
        Ok(data.len())
    }

    /// Request a new UART baud rate on the device
    ///
    /// While connected the rate is pushed at once; otherwise the last value
    /// requested is pushed on the way to ready.
    pub fn set_baud_rate(&mut self, baud: u32) -> Result<(), AdapterError> {
        if baud == 0 {
            return Err(AdapterError::InvalidBaudRate(baud));
        }
        self.desired_baud = baud;
        if self.machine.is_ready() {
            if let Some(handle) = self.machine.handles().map(|h| h.baud.clone()) {
                self.push_baud(&handle);
            }
        }
        Ok(())
    }

    /// Start a new connection attempt, also after a rejection
    pub fn reconnect(&mut self) {
        self.handle(LinkEvent::ConnectRequested);
    }

    /// Feed one event from the transport or a timer
    pub fn handle(&mut self, event: LinkEvent<T::Handle>) {
        match &event {
            LinkEvent::Notification {
                characteristic,
                value,
            } if *characteristic == READ_CHAR_UUID => {
                let dropped = self.queue.push(value);
                if dropped > 0 {
                    log::warn!(
                        "SERIAL: receive queue full, dropped {} bytes ({} total)",
                        dropped,
                        self.queue.dropped()
                    );
                }
                self.events.push_back(SerialEvent::DataArrived(value.len()));
            }
            LinkEvent::BaudRead(actual) => {
                if !baud_acceptable(*actual, self.desired_baud) {
                    log::warn!(
                        "SERIAL: device reports {} baud, requested {}",
                        actual,
                        self.desired_baud
                    );
                }
                self.reported_baud = Some(*actual);
                self.events.push_back(SerialEvent::BaudRateReported(*actual));
            }
            LinkEvent::WriteFailed(len) => {
                log::warn!("SERIAL: write of {} bytes failed", len);
                self.events.push_back(SerialEvent::WriteFailed(*len));
            }
            _ => {}
        }

        for action in self.machine.handle(&event) {
            self.perform(action);
        }
    }

    fn perform(&mut self, action: Action<T::Handle>) {
        match action {
            Action::Connect => self.transport.connect(),
            Action::DiscoverServices => self.transport.discover_services(),
            Action::ResolveCharacteristics => self.transport.resolve_characteristics(),
            Action::PushBaud(handle) => self.push_baud(&handle),
            Action::EnableNotifications(handle) => self.transport.enable_notifications(&handle),
            Action::TearDown => self.transport.tear_down(),
            Action::ScheduleRetry => self.transport.schedule_retry(self.config.retry_delay),
            Action::Report(status) => {
                log::info!("SERIAL: {:?}", status);
                self.events.push_back(status.into());
            }
        }
    }

    fn push_baud(&mut self, handle: &T::Handle) {
        self.transport.write_baud(handle, self.desired_baud.to_le_bytes());
        self.transport.read_baud(handle);
    }
}
