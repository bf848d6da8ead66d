//! Serial-port facade over the BLE link

pub mod adapter;
pub mod naming;
pub mod queue;

pub use adapter::{baud_acceptable, AdapterError, BleSerial, SerialEvent};
pub use naming::device_name;
pub use queue::ReceiveQueue;
