//! GATT transport abstraction
//!
//! The adapter asks the transport to start operations; the transport reports
//! their outcome later as [`LinkEvent`]s. No method waits for the radio.

pub mod btle;

use std::time::Duration;

use thiserror::Error;

pub use btle::BtleplugTransport;

/// Errors raised while setting up a transport
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("no Bluetooth adapter found")]
    NoAdapter,
    #[error("Bluetooth error: {0}")]
    Ble(#[from] btleplug::Error),
}

/// Operations the adapter needs from a BLE stack
pub trait GattTransport {
    /// Characteristic reference valid for one connection
    type Handle: Clone + PartialEq + std::fmt::Debug;

    /// Connect to the configured peripheral
    fn connect(&mut self);

    /// Discover services; report each found service, then completion
    fn discover_services(&mut self);

    /// Look up the bridge characteristics in the discovered service
    fn resolve_characteristics(&mut self);

    /// Write the notification enable value to the read characteristic's CCCD
    fn enable_notifications(&mut self, read: &Self::Handle);

    /// Write with response to the baud characteristic
    fn write_baud(&mut self, baud: &Self::Handle, value: [u8; 4]);

    /// Read the baud characteristic back
    fn read_baud(&mut self, baud: &Self::Handle);

    /// Single write-without-response
    fn write_without_response(&mut self, write: &Self::Handle, data: &[u8]);

    /// Drop the link and any per-connection state
    ///
    /// Reports [`LinkClosed`](crate::link::LinkEvent::LinkClosed) once the
    /// link is down, whether or not one was open.
    fn tear_down(&mut self);

    /// Post a retry timer event after `delay`
    fn schedule_retry(&mut self, delay: Duration);
}
