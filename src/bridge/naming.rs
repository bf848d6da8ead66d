//! Advertised device name

use crate::config::gatt::{DEVICE_NAME_LEN, DEVICE_NAME_PREFIX};

/// Format the advertised name from a BLE address
///
/// `address` is in controller byte order (least significant byte first). The
/// name is the prefix followed by the three most significant address bytes in
/// that same order, as uppercase hex: `RTL-UART-CCBBAA` for `AA:BB:CC:DD:EE:FF`.
pub fn format_device_name<'a>(buf: &'a mut [u8; DEVICE_NAME_LEN], address: &[u8; 6]) -> &'a str {
    const HEX_CHARS: &[u8; 16] = b"0123456789ABCDEF";
    let prefix = DEVICE_NAME_PREFIX.as_bytes();

    buf[..prefix.len()].copy_from_slice(prefix);

    let mut pos = prefix.len();
    for &byte in &address[3..6] {
        buf[pos] = HEX_CHARS[(byte >> 4) as usize];
        buf[pos + 1] = HEX_CHARS[(byte & 0x0F) as usize];
        pos += 2;
    }

    // All bytes are ASCII
    core::str::from_utf8(&buf[..pos]).unwrap_or(DEVICE_NAME_PREFIX)
}

/// Static random BLE address carrying a three-byte device id
///
/// The id lands in the three most significant bytes so it shows up in the
/// advertised name. The top two bits are forced on as required for static
/// random addresses.
pub fn static_random_address(device_id: &[u8; 3]) -> [u8; 6] {
    [0x0A, 0xA0, 0x55, device_id[0], device_id[1], device_id[2] | 0xC0]
}
