//! Messages posted to the application task

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::{Channel, Receiver, Sender};

use crate::config::app::MESSAGE_QUEUE_SIZE;

/// Peripheral that produced a message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IoMessageType {
    Uart,
}

/// What happened on the peripheral
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IoMessageSubtype {
    /// The receive buffer holds bytes ready to forward
    UartRx,
}

/// Message consumed by the application task
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AppMessage {
    pub msg_type: IoMessageType,
    pub subtype: IoMessageSubtype,
}

impl AppMessage {
    /// Receive buffer ready for forwarding
    pub const fn uart_rx() -> Self {
        Self {
            msg_type: IoMessageType::Uart,
            subtype: IoMessageSubtype::UartRx,
        }
    }
}

/// Channel from interrupt context to the application task
pub static APP_CHANNEL: Channel<CriticalSectionRawMutex, AppMessage, MESSAGE_QUEUE_SIZE> =
    Channel::new();

/// Type alias for the application message sender
pub type AppSender = Sender<'static, CriticalSectionRawMutex, AppMessage, MESSAGE_QUEUE_SIZE>;

/// Type alias for the application message receiver
pub type AppReceiver = Receiver<'static, CriticalSectionRawMutex, AppMessage, MESSAGE_QUEUE_SIZE>;
