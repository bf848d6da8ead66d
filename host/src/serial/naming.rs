//! Advertised bridge names

use std::fmt::Write;

use crate::config::DEVICE_NAME_PREFIX;

/// Name a bridge with address `address` advertises
///
/// `address` is in display order (most significant byte first), as returned
/// by `BDAddr::into_inner`. The device names itself after the three most
/// significant bytes, least significant of them first, so
/// `AA:BB:CC:DD:EE:FF` advertises as `RTL-UART-CCBBAA`.
pub fn device_name(address: [u8; 6]) -> String {
    let mut name = String::from(DEVICE_NAME_PREFIX);
    for byte in [address[2], address[1], address[0]] {
        let _ = write!(name, "{:02X}", byte);
    }
    name
}
