//! UART buffer manager
//!
//! Owns the peripheral and the receive buffer. Reception is interrupt driven:
//! [`UartDriver::on_interrupt`] drains the hardware FIFO into the buffer and
//! signals the application once per fill cycle, either when the line goes
//! idle or when the buffer fills up. Transmission is blocking and chunked to
//! the hardware FIFO depth.

use core::cell::RefCell;

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::blocking_mutex::Mutex;
use embassy_sync::mutex::Mutex as AsyncMutex;

use super::buffer::ReceiveBuffer;
use super::traits::{Interrupts, UartError, UartHardware};
use crate::app::RxNotifier;
use crate::baud::{negotiate, BaudConfig};
use crate::config::uart::{RX_BUFFER_SIZE, TX_FIFO_SIZE};

/// Interrupt sources armed while the receive buffer has room
const RX_SOURCES: Interrupts = Interrupts::RX_DATA_AVAILABLE.union(Interrupts::RX_IDLE);

/// State shared between the interrupt handler and the application
struct UartState<H, const N: usize> {
    hw: H,
    rx: ReceiveBuffer<N>,
    config: Option<BaudConfig>,
}

/// Interrupt-driven UART with a fixed receive buffer
///
/// All register access and buffer bookkeeping happens inside short critical
/// sections. The transmit guard serialises `transmit` and `init` against each
/// other; a second caller gets [`UartError::Busy`] instead of waiting.
pub struct UartDriver<H, T, const N: usize = RX_BUFFER_SIZE> {
    state: Mutex<CriticalSectionRawMutex, RefCell<UartState<H, N>>>,
    tx_guard: AsyncMutex<CriticalSectionRawMutex, ()>,
    notifier: T,
}

impl<H: UartHardware, T: RxNotifier, const N: usize> UartDriver<H, T, N> {
    /// Wrap a peripheral; nothing is programmed until [`init`](Self::init)
    pub const fn new(hw: H, notifier: T) -> Self {
        Self {
            state: Mutex::new(RefCell::new(UartState {
                hw,
                rx: ReceiveBuffer::new(),
                config: None,
            })),
            tx_guard: AsyncMutex::new(()),
            notifier,
        }
    }

    /// Program the peripheral for `baud` and arm the receive interrupts
    ///
    /// May be called again to change the rate. The receive buffer keeps its
    /// contents across a rate change.
    pub fn init(&self, baud: u32) -> Result<BaudConfig, UartError> {
        let config = negotiate(baud);
        if !config.is_valid() {
            log::warn!("UART: unsupported baud rate {}", baud);
            return Err(UartError::InvalidBaudRate(baud));
        }

        let _guard = self.tx_guard.try_lock().map_err(|_| UartError::Busy)?;

        self.state.lock(|cell| {
            let mut state = cell.borrow_mut();
            state.hw.configure(&config)?;
            state.hw.enable_interrupts(RX_SOURCES);
            state.config = Some(config);
            Ok::<(), UartError>(())
        })?;

        log::info!(
            "UART: {} baud (actual {}, div {}, ovsr {}, adj {:#05x})",
            config.target,
            config.actual,
            config.divisor,
            config.oversample_rate,
            config.oversample_adjust
        );
        Ok(config)
    }

    /// Write `data` to the line, blocking until the last chunk has left
    ///
    /// Empty input is a no-op.
    pub fn transmit(&self, data: &[u8]) -> Result<(), UartError> {
        if data.is_empty() {
            return Ok(());
        }
        if self.baud_config().is_none() {
            return Err(UartError::NotInitialised);
        }

        let _guard = self.tx_guard.try_lock().map_err(|_| UartError::Busy)?;

        for chunk in data.chunks(TX_FIFO_SIZE) {
            self.wait_tx_empty();
            self.state.lock(|cell| {
                let mut state = cell.borrow_mut();
                for &byte in chunk {
                    state.hw.write_byte(byte);
                }
            });
        }
        self.wait_tx_empty();
        Ok(())
    }

    fn wait_tx_empty(&self) {
        while !self.state.lock(|cell| cell.borrow_mut().hw.tx_holding_empty()) {
            core::hint::spin_loop();
        }
    }

    /// UART interrupt handler body
    pub fn on_interrupt(&self) {
        let signal = self.state.lock(|cell| {
            let mut state = cell.borrow_mut();
            let UartState { hw, rx, .. } = &mut *state;

            let status = hw.pending();
            hw.disable_interrupts(Interrupts::RX_DATA_AVAILABLE | Interrupts::LINE_STATUS);

            let mut signal = false;

            if hw.rx_idle() {
                hw.disable_interrupts(Interrupts::RX_IDLE);
                signal |= rx.mark_ready();
            }

            if status.rx_level_reached || status.rx_timeout {
                let count = hw.rx_fifo_len().min(rx.remaining());
                for _ in 0..count {
                    let byte = hw.read_byte();
                    rx.push(byte);
                }
            }

            if rx.is_full() {
                // Anything still in the FIFO is lost until the buffer is cleared
                hw.clear_rx_fifo();
                if rx.mark_ready() {
                    log::warn!("UART: receive buffer full ({} bytes)", N);
                    signal = true;
                }
            } else {
                hw.enable_interrupts(Interrupts::RX_DATA_AVAILABLE);
            }

            signal
        });

        if signal {
            self.notifier.notify();
        }
    }

    /// Empty the receive buffer and re-arm reception
    pub fn clear_receive_buffer(&self) {
        self.state.lock(|cell| {
            let mut state = cell.borrow_mut();
            state.rx.clear();
            state.hw.enable_interrupts(RX_SOURCES);
        });
    }

    /// Bytes currently held in the receive buffer
    pub fn received_len(&self) -> usize {
        self.state.lock(|cell| cell.borrow().rx.len())
    }

    /// Copy buffered bytes starting at `offset` into `out`
    ///
    /// Returns the number of bytes copied, zero once `offset` reaches the end.
    pub fn copy_received(&self, offset: usize, out: &mut [u8]) -> usize {
        self.state.lock(|cell| {
            let state = cell.borrow();
            let data = state.rx.as_slice();
            if offset >= data.len() {
                return 0;
            }
            let count = out.len().min(data.len() - offset);
            out[..count].copy_from_slice(&data[offset..offset + count]);
            count
        })
    }

    /// Copy buffered bytes starting at `offset` into `out`, clearing at the end
    ///
    /// Once `offset` reaches the end of the buffer, the buffer is emptied and
    /// reception re-armed within the same critical section, so bytes the
    /// interrupt appends after the last copy are never cleared unseen.
    /// Returns the number of bytes copied; zero means the buffer was cleared.
    pub fn take_received(&self, offset: usize, out: &mut [u8]) -> usize {
        self.state.lock(|cell| {
            let mut state = cell.borrow_mut();
            let len = state.rx.len();
            if offset >= len {
                state.rx.clear();
                state.hw.enable_interrupts(RX_SOURCES);
                return 0;
            }
            let count = out.len().min(len - offset);
            out[..count].copy_from_slice(&state.rx.as_slice()[offset..offset + count]);
            count
        })
    }

    pub fn is_data_ready(&self) -> bool {
        self.state.lock(|cell| cell.borrow().rx.is_data_ready())
    }

    /// Active clock configuration, `None` before the first successful `init`
    pub fn baud_config(&self) -> Option<BaudConfig> {
        self.state.lock(|cell| cell.borrow().config)
    }

    #[cfg(test)]
    pub(crate) fn with_hardware<R>(&self, f: impl FnOnce(&mut H) -> R) -> R {
        self.state.lock(|cell| f(&mut cell.borrow_mut().hw))
    }

    #[cfg(test)]
    pub(crate) fn notifier(&self) -> &T {
        &self.notifier
    }
}
