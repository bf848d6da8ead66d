//! Application messaging
//!
//! The UART interrupt never touches BLE. It posts an [`AppMessage`] to
//! [`APP_CHANNEL`] and the BLE task forwards the buffered bytes.

pub mod message;
pub mod notifier;

pub use message::{AppMessage, AppReceiver, AppSender, IoMessageSubtype, IoMessageType, APP_CHANNEL};
pub use notifier::{ChannelNotifier, RxNotifier};
