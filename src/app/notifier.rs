//! "Data ready" signalling from the UART driver

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::Sender;

use super::message::AppMessage;

/// Receiver of "data ready" signals from the UART driver
///
/// Called from interrupt context with no lock held. Implementations must not
/// block.
pub trait RxNotifier {
    fn notify(&self);
}

/// Notifier that posts [`AppMessage::uart_rx`] to a channel
pub struct ChannelNotifier<'a, const CAP: usize> {
    sender: Sender<'a, CriticalSectionRawMutex, AppMessage, CAP>,
}

impl<'a, const CAP: usize> ChannelNotifier<'a, CAP> {
    pub const fn new(sender: Sender<'a, CriticalSectionRawMutex, AppMessage, CAP>) -> Self {
        Self { sender }
    }
}

impl<const CAP: usize> RxNotifier for ChannelNotifier<'_, CAP> {
    fn notify(&self) {
        if self.sender.try_send(AppMessage::uart_rx()).is_err() {
            log::warn!("APP: message queue full, rx notification dropped");
        }
    }
}
