//! Pairing lockout policy
//!
//! Pairing itself is run by the BLE stack's security manager. The guard only
//! counts the failures it reports and refuses further centrals once too many
//! have failed.

use crate::config::pairing::MAX_PAIRING_ATTEMPTS;

/// Outcome of a failed pairing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PairingError {
    /// The central may try again this many times
    Failed { remaining: u8 },
    /// Too many failures; pairing refused until reboot
    LockedOut,
}

/// Counts failed pairings against a fixed limit
#[derive(Debug)]
pub struct PairingGuard {
    max_attempts: u8,
    failures: u8,
}

impl PairingGuard {
    pub const fn new(max_attempts: u8) -> Self {
        Self {
            max_attempts,
            failures: 0,
        }
    }

    /// Guard using the build-time pairing configuration
    pub const fn from_config() -> Self {
        Self::new(MAX_PAIRING_ATTEMPTS)
    }

    pub fn is_locked_out(&self) -> bool {
        self.failures >= self.max_attempts
    }

    /// Attempts left before lockout
    pub fn remaining(&self) -> u8 {
        self.max_attempts.saturating_sub(self.failures)
    }

    /// Count a failure reported by the security manager
    ///
    /// Always returns an error describing the state after the failure.
    pub fn record_failure(&mut self) -> Result<(), PairingError> {
        if !self.is_locked_out() {
            self.failures += 1;
        }
        if self.is_locked_out() {
            log::warn!("PAIR: {} failed attempts, pairing locked", self.failures);
            return Err(PairingError::LockedOut);
        }
        Err(PairingError::Failed {
            remaining: self.remaining(),
        })
    }
}
