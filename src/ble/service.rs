//! UART bridge GATT service
//!
//! - Service UUID: 0xA00A
//! - Baud characteristic 0xB001 (read, write): u32 little-endian
//! - Write characteristic 0xB002 (write without response): host to UART
//! - Read characteristic 0xB003 (notify): UART to host

use heapless::Vec;
use trouble_host::prelude::*;

use crate::config::gatt::{MAX_WRITE_SIZE, NOTIFY_CHUNK_SIZE};

/// UART bridge service
#[gatt_service(uuid = "a00a")]
pub struct UartBridgeService {
    /// Current baud rate; writing it reprograms the UART
    #[characteristic(uuid = "b001", read, write, value = 0u32)]
    pub baud: u32,

    /// Bytes written here are sent out on the UART
    #[characteristic(uuid = "b002", write_without_response, value = [0u8; MAX_WRITE_SIZE])]
    pub write: [u8; MAX_WRITE_SIZE],

    /// Bytes received on the UART, one notification per chunk
    #[characteristic(uuid = "b003", notify)]
    pub read: Vec<u8, NOTIFY_CHUNK_SIZE>,
}
