//! Interrupt-driven UART with a fixed receive buffer

pub mod buffer;
pub mod driver;
#[cfg(feature = "embedded")]
pub mod esp;
pub mod traits;

pub use buffer::ReceiveBuffer;
pub use driver::UartDriver;
pub use traits::{InterruptStatus, Interrupts, UartError, UartHardware};
