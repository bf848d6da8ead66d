//! BLE link life-cycle

pub mod state;

pub use state::{Action, CharacteristicHandles, ConnectionMachine, ConnectionState, LinkEvent, LinkStatus};
