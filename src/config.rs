//! Hardware and protocol configuration constants for the BLE UART bridge

/// UART pins on the bridge board
pub mod uart_pins {
    pub const TX: u8 = 17;
    pub const RX: u8 = 18;
}

/// UART peripheral configuration
pub mod uart {
    /// Receive buffer capacity in bytes
    pub const RX_BUFFER_SIZE: usize = 4096;

    /// Hardware transmit FIFO depth
    pub const TX_FIFO_SIZE: usize = 16;

    /// RX FIFO level that raises the "data available" interrupt (1-29)
    pub const RX_TRIGGER_LEVEL: u8 = 16;

    /// Line idle time before the idle interrupt fires, in byte times
    pub const RX_IDLE_BYTES: u8 = 2;
}

/// Baud rate negotiation
pub mod baud {
    /// UART source clock
    pub const SOURCE_CLOCK_HZ: u32 = 40_000_000;

    /// Rate used on first boot or when the stored rate cannot be loaded
    pub const DEFAULT_BAUD_RATE: u32 = 9600;

    /// Lowest supported rate
    pub const MIN_BAUD_RATE: u32 = 300;

    /// Highest supported rate
    pub const MAX_BAUD_RATE: u32 = 3_000_000;

    /// Maximum deviation of the actual rate from the target, in permille
    pub const TOLERANCE_PERMILLE: u32 = 10;

    /// Largest value of the 16-bit divisor field
    pub const MAX_DIVISOR: u32 = 0xFFFF;

    /// Oversample rate field range (total oversampling is field + 5)
    pub const OVERSAMPLE_MIN: u8 = 5;
    pub const OVERSAMPLE_MAX: u8 = 15;

    /// Width of the oversample adjust mask in bits
    pub const OVERSAMPLE_ADJUST_BITS: u32 = 11;
}

/// GATT service layout (16-bit UUIDs)
pub mod gatt {
    /// Bridge service
    pub const SERVICE_UUID: u16 = 0xA00A;

    /// Baud rate characteristic (read, write; u32 little-endian)
    pub const BAUD_CHAR_UUID: u16 = 0xB001;

    /// Host to device data (write without response)
    pub const WRITE_CHAR_UUID: u16 = 0xB002;

    /// Device to host data (notify)
    pub const READ_CHAR_UUID: u16 = 0xB003;

    /// Largest payload pushed in a single notification
    pub const NOTIFY_CHUNK_SIZE: usize = 128;

    /// Largest payload accepted in a single write
    pub const MAX_WRITE_SIZE: usize = 128;

    /// Advertised name prefix, followed by six hex digits of the address
    pub const DEVICE_NAME_PREFIX: &str = "RTL-UART-";

    /// Length of the full advertised name
    pub const DEVICE_NAME_LEN: usize = 15;
}

/// Persistent storage layout
pub mod storage {
    /// Start of the `bridge` data partition (see `partitions.csv`)
    pub const SETTINGS_PARTITION_OFFSET: u32 = 0x3F_0000;

    /// Size of the `bridge` data partition
    pub const SETTINGS_PARTITION_SIZE: u32 = 0x1_0000;

    /// Offset of the baud rate record within the settings region
    pub const BAUD_RECORD_OFFSET: u32 = 16;

    /// Size of the baud record: [baud: u32 LE][crc16: u16 LE][padding: 2]
    pub const BAUD_RECORD_SIZE: usize = 8;
}

/// Pairing policy
pub mod pairing {
    /// Failed attempts before pairing is refused permanently
    pub const MAX_PAIRING_ATTEMPTS: u8 = 5;
}

/// Application task
pub mod app {
    /// Capacity of the application message queue
    pub const MESSAGE_QUEUE_SIZE: usize = 8;
}
