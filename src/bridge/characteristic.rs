//! Glue between the GATT characteristics and the UART driver
//!
//! The BLE task owns one [`CharacteristicBridge`] and calls into it for the
//! three characteristic operations: baud writes reprogram the UART and
//! persist the rate, data writes go straight out on the line, and received
//! bytes are handed back in notification-sized chunks.

use crate::app::RxNotifier;
use crate::baud::BaudConfig;
use crate::config::baud::DEFAULT_BAUD_RATE;
use crate::storage::{load_baud_or_default, BaudStore};
use crate::uart::{UartDriver, UartError, UartHardware};

/// Errors surfaced to the GATT layer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BridgeError {
    /// Baud characteristic value was not four bytes
    InvalidLength(usize),
    Uart(UartError),
}

impl From<UartError> for BridgeError {
    fn from(e: UartError) -> Self {
        BridgeError::Uart(e)
    }
}

/// Characteristic operations on top of a shared UART driver
pub struct CharacteristicBridge<'d, H, T, S, const N: usize> {
    uart: &'d UartDriver<H, T, N>,
    store: S,
    forward_offset: usize,
}

impl<'d, H, T, S, const N: usize> CharacteristicBridge<'d, H, T, S, N>
where
    H: UartHardware,
    T: RxNotifier,
    S: BaudStore,
{
    pub fn new(uart: &'d UartDriver<H, T, N>, store: S) -> Self {
        Self {
            uart,
            store,
            forward_offset: 0,
        }
    }

    /// Bring the UART up at the persisted rate
    ///
    /// A stored rate the negotiator rejects is replaced by the default.
    pub fn start(&mut self) -> Result<BaudConfig, BridgeError> {
        let baud = load_baud_or_default(&mut self.store);
        match self.uart.init(baud) {
            Err(UartError::InvalidBaudRate(_)) if baud != DEFAULT_BAUD_RATE => {
                log::warn!("BRIDGE: stored baud {} unusable, reverting", baud);
                let config = self.uart.init(DEFAULT_BAUD_RATE)?;
                self.persist(DEFAULT_BAUD_RATE);
                Ok(config)
            }
            result => result.map_err(BridgeError::from),
        }
    }

    /// Write to the baud characteristic: u32 little-endian
    pub fn set_baud(&mut self, value: &[u8]) -> Result<BaudConfig, BridgeError> {
        let bytes: [u8; 4] = value
            .try_into()
            .map_err(|_| BridgeError::InvalidLength(value.len()))?;
        let baud = u32::from_le_bytes(bytes);
        let config = self.uart.init(baud)?;
        self.persist(baud);
        Ok(config)
    }

    fn persist(&mut self, baud: u32) {
        if let Err(e) = self.store.save(baud) {
            log::warn!("BRIDGE: baud {} applied but not saved: {:?}", baud, e);
        }
    }

    /// Value of the baud characteristic: the rate actually produced
    pub fn baud_value(&self) -> [u8; 4] {
        self.uart
            .baud_config()
            .map_or(0, |config| config.actual)
            .to_le_bytes()
    }

    /// Write to the data characteristic
    pub fn write_data(&self, data: &[u8]) -> Result<(), BridgeError> {
        self.uart.transmit(data)?;
        Ok(())
    }

    /// Copy the next chunk of received bytes into `out`
    ///
    /// Returns `None` once everything has been handed out, at which point the
    /// receive buffer is cleared and reception re-armed. Bytes that arrive
    /// while chunks are being taken are included in the same cycle.
    pub fn next_chunk(&mut self, out: &mut [u8]) -> Option<usize> {
        let count = self.uart.take_received(self.forward_offset, out);
        if count == 0 {
            self.forward_offset = 0;
            return None;
        }
        self.forward_offset += count;
        Some(count)
    }

    /// Drop everything buffered, e.g. when no central is subscribed
    pub fn discard_received(&mut self) {
        self.uart.clear_receive_buffer();
        self.forward_offset = 0;
    }
}
