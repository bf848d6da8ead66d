//! Host side of the BLE UART bridge
//!
//! Presents a bridge device as a byte-stream serial port. The connection
//! life-cycle lives in [`link`], the serial-port facade in [`serial`], and the
//! BLE plumbing behind the [`transport::GattTransport`] trait.

pub mod config;
pub mod link;
pub mod serial;
pub mod transport;

pub use config::HostConfig;
pub use link::{ConnectionMachine, ConnectionState, LinkEvent};
pub use serial::{baud_acceptable, device_name, AdapterError, BleSerial, SerialEvent};
pub use transport::GattTransport;
