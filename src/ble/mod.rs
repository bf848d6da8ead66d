//! Bluetooth Low Energy module
//!
//! GATT definition of the UART bridge service.

pub mod service;

pub use service::UartBridgeService;
