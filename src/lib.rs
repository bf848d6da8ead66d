#![cfg_attr(not(test), no_std)]

pub mod app;
pub mod baud;
pub mod bridge;
pub mod config;
pub mod storage;
pub mod uart;

// These modules depend on the ESP32 radio stack only available with the embedded feature
#[cfg(feature = "embedded")]
pub mod ble;
#[cfg(feature = "embedded")]
pub mod tasks;
