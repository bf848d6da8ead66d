//! Host configuration

use std::time::Duration;

use btleplug::api::bleuuid::uuid_from_u16;
use uuid::Uuid;

/// Bridge service
pub const SERVICE_UUID: Uuid = uuid_from_u16(0xA00A);

/// Baud rate characteristic (read, write; u32 little-endian)
pub const BAUD_CHAR_UUID: Uuid = uuid_from_u16(0xB001);

/// Host to device data (write without response)
pub const WRITE_CHAR_UUID: Uuid = uuid_from_u16(0xB002);

/// Device to host data (notify)
pub const READ_CHAR_UUID: Uuid = uuid_from_u16(0xB003);

/// Delay before reconnecting after any failure
pub const RETRY_DELAY: Duration = Duration::from_secs(5);

/// Default receive queue bound in bytes
pub const DEFAULT_QUEUE_CAPACITY: usize = 64 * 1024;

/// How long to scan for the device before reporting a failed connect
pub const SCAN_TIMEOUT: Duration = Duration::from_secs(10);

/// Baud rate pushed to the device when none has been requested
pub const DEFAULT_BAUD_RATE: u32 = 9600;

/// Accepted deviation between requested and reported bit periods, in percent
pub const BAUD_TOLERANCE_PERCENT: u64 = 5;

/// Largest payload the bridge accepts in one write
pub const MAX_WRITE_SIZE: usize = 128;

/// Advertised name prefix
pub const DEVICE_NAME_PREFIX: &str = "RTL-UART-";

/// Runtime settings for one bridge connection
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostConfig {
    pub retry_delay: Duration,
    pub queue_capacity: usize,
    pub scan_timeout: Duration,
    pub baud_rate: u32,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            retry_delay: RETRY_DELAY,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            scan_timeout: SCAN_TIMEOUT,
            baud_rate: DEFAULT_BAUD_RATE,
        }
    }
}
