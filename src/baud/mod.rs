//! Baud rate negotiation
//!
//! Translates a requested baud rate into the divisor and oversampling fields
//! of the UART clock generator.

pub mod negotiator;

pub use negotiator::{negotiate, BaudConfig};
