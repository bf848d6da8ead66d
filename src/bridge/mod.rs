//! Device side of the BLE link
//!
//! Characteristic handlers, advertised naming and the pairing policy. The
//! GATT server itself lives in the embedded-only `ble` module.

pub mod characteristic;
pub mod naming;
pub mod pairing;

pub use characteristic::{BridgeError, CharacteristicBridge};
pub use naming::{format_device_name, static_random_address};
pub use pairing::{PairingError, PairingGuard};
