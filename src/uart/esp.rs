//! ESP32-S3 UART behind [`UartHardware`]
//!
//! The ESP32 UART has no separate idle interrupt; its RX timeout fires after
//! the line has been quiet for `RX_IDLE_BYTES` symbol times with data pending.
//! Timeouts therefore both drain the FIFO and, while idle is armed, raise the
//! idle flag. The hardware FIFO level is not exposed, so pending bytes are
//! moved into a small staging queue when the interrupt is acknowledged.

use esp_hal::uart::{Config, RxConfig, Uart, UartInterrupt};
use esp_hal::Blocking;
use heapless::{Deque, Vec};

use super::traits::{InterruptStatus, Interrupts, UartError, UartHardware};
use crate::baud::BaudConfig;
use crate::config::uart::{RX_IDLE_BYTES, RX_TRIGGER_LEVEL, TX_FIFO_SIZE};

/// ESP32-S3 hardware RX FIFO depth
const HW_FIFO_DEPTH: usize = 128;

pub struct EspUart {
    uart: Uart<'static, Blocking>,
    staged: Deque<u8, HW_FIFO_DEPTH>,
    tx_pending: Vec<u8, TX_FIFO_SIZE>,
    data_armed: bool,
    idle_armed: bool,
    idle: bool,
}

impl EspUart {
    pub fn new(uart: Uart<'static, Blocking>) -> Self {
        Self {
            uart,
            staged: Deque::new(),
            tx_pending: Vec::new(),
            data_armed: false,
            idle_armed: false,
            idle: false,
        }
    }

    fn apply_listen(&mut self) {
        self.uart.unlisten(UartInterrupt::RxFifoFull | UartInterrupt::RxTimeout);
        if self.data_armed {
            self.uart.listen(UartInterrupt::RxFifoFull | UartInterrupt::RxTimeout);
        } else if self.idle_armed {
            self.uart.listen(UartInterrupt::RxTimeout);
        }
    }

    fn stage_fifo(&mut self) {
        let mut buf = [0u8; HW_FIFO_DEPTH];
        let room = HW_FIFO_DEPTH - self.staged.len();
        if room == 0 {
            return;
        }
        if let Ok(count) = self.uart.read_buffered(&mut buf[..room]) {
            for &byte in &buf[..count] {
                let _ = self.staged.push_back(byte);
            }
        }
    }
}

impl UartHardware for EspUart {
    fn configure(&mut self, config: &BaudConfig) -> Result<(), UartError> {
        let uart_config = Config::default().with_baudrate(config.target).with_rx(
            RxConfig::default()
                .with_fifo_full_threshold(RX_TRIGGER_LEVEL as u16)
                .with_timeout(RX_IDLE_BYTES),
        );
        self.uart
            .apply_config(&uart_config)
            .map_err(|_| UartError::Hardware)
    }

    fn enable_interrupts(&mut self, sources: Interrupts) {
        if sources.contains(Interrupts::RX_DATA_AVAILABLE) {
            self.data_armed = true;
        }
        if sources.contains(Interrupts::RX_IDLE) {
            self.idle_armed = true;
        }
        self.apply_listen();
    }

    fn disable_interrupts(&mut self, sources: Interrupts) {
        if sources.contains(Interrupts::RX_DATA_AVAILABLE) {
            self.data_armed = false;
        }
        if sources.contains(Interrupts::RX_IDLE) {
            self.idle_armed = false;
            self.idle = false;
        }
        self.apply_listen();
    }

    fn pending(&mut self) -> InterruptStatus {
        let raised = self.uart.interrupts();
        self.uart.clear_interrupts(raised);

        let timeout = raised.contains(UartInterrupt::RxTimeout);
        if timeout && self.idle_armed {
            self.idle = true;
        }

        self.stage_fifo();
        InterruptStatus {
            rx_level_reached: raised.contains(UartInterrupt::RxFifoFull),
            rx_timeout: timeout || !self.staged.is_empty(),
        }
    }

    fn rx_idle(&self) -> bool {
        self.idle
    }

    fn rx_fifo_len(&self) -> usize {
        self.staged.len()
    }

    fn read_byte(&mut self) -> u8 {
        self.staged.pop_front().unwrap_or(0)
    }

    fn clear_rx_fifo(&mut self) {
        self.staged.clear();
        let mut sink = [0u8; HW_FIFO_DEPTH];
        while matches!(self.uart.read_buffered(&mut sink), Ok(n) if n > 0) {}
    }

    fn tx_holding_empty(&mut self) -> bool {
        if !self.tx_pending.is_empty() {
            let mut sent = 0;
            while sent < self.tx_pending.len() {
                match self.uart.write(&self.tx_pending[sent..]) {
                    Ok(n) => sent += n,
                    Err(_) => break,
                }
            }
            self.tx_pending.clear();
            return false;
        }
        self.uart.write_ready()
    }

    fn write_byte(&mut self, byte: u8) {
        let _ = self.tx_pending.push(byte);
    }
}
