//! UART hardware trait for abstraction and testability
//!
//! This trait exposes the register-level operations the buffer manager needs,
//! allowing the real peripheral to be swapped with a mock for testing.

use core::ops::BitOr;

use crate::baud::BaudConfig;

/// Errors that can occur during UART operations
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UartError {
    /// Requested baud rate cannot be produced by the clock generator
    InvalidBaudRate(u32),
    /// Driver used before a successful `init`
    NotInitialised,
    /// Another transmit or reconfiguration holds the transmit path
    Busy,
    /// Peripheral rejected the configuration
    Hardware,
}

/// Set of UART interrupt sources
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Interrupts(u8);

impl Interrupts {
    pub const NONE: Self = Self(0);
    /// RX FIFO reached its trigger level, or timed out with data pending
    pub const RX_DATA_AVAILABLE: Self = Self(1 << 0);
    /// Receive line status (overrun, parity, framing)
    pub const LINE_STATUS: Self = Self(1 << 1);
    /// Receive line idle for the configured number of byte times
    pub const RX_IDLE: Self = Self(1 << 2);

    pub const fn union(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }

    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn insert(&mut self, other: Self) {
        self.0 |= other.0;
    }

    pub fn remove(&mut self, other: Self) {
        self.0 &= !other.0;
    }
}

impl BitOr for Interrupts {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        self.union(rhs)
    }
}

/// Pending receive interrupt causes, as read from the interrupt ID register
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct InterruptStatus {
    /// RX FIFO at or above the trigger level
    pub rx_level_reached: bool,
    /// Data left in the RX FIFO below the trigger level after a timeout
    pub rx_timeout: bool,
}

/// Abstract UART peripheral
///
/// Every method is called with the driver's critical section held, so
/// implementations must not block. The only exception to "no waiting" is the
/// caller's own busy-wait on [`UartHardware::tx_holding_empty`].
pub trait UartHardware {
    /// Program the clock generator and frame format (8N1)
    fn configure(&mut self, config: &BaudConfig) -> Result<(), UartError>;

    /// Enable the given interrupt sources
    fn enable_interrupts(&mut self, sources: Interrupts);

    /// Disable the given interrupt sources
    ///
    /// Disabling [`Interrupts::RX_IDLE`] also clears a pending idle flag.
    fn disable_interrupts(&mut self, sources: Interrupts);

    /// Read and acknowledge the pending receive interrupt causes
    fn pending(&mut self) -> InterruptStatus;

    /// Whether the line idle flag is set
    fn rx_idle(&self) -> bool;

    /// Number of bytes waiting in the RX FIFO
    fn rx_fifo_len(&self) -> usize;

    /// Pop one byte from the RX FIFO
    fn read_byte(&mut self) -> u8;

    /// Discard everything in the RX FIFO
    fn clear_rx_fifo(&mut self);

    /// Whether the transmit holding register and FIFO are empty
    fn tx_holding_empty(&mut self) -> bool;

    /// Push one byte into the TX FIFO
    fn write_byte(&mut self, byte: u8);
}
