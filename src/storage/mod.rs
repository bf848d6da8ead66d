//! Persistent settings
//!
//! Only the UART baud rate survives a reboot. It lives in a small
//! CRC-protected record at a fixed offset in the settings flash region.

pub mod baud_store;

pub use baud_store::{load_baud_or_default, BaudStore, FlashBaudStore, StorageError};
