//! Fixed-capacity receive buffer filled from the UART interrupt

use heapless::Vec;

/// Receive buffer with a one-shot "data ready" flag
///
/// Bytes are appended in arrival order until the buffer is full. The ready
/// flag is raised once per fill cycle and only cleared by [`clear`], so the
/// application is signalled at most once between two clears.
///
/// [`clear`]: ReceiveBuffer::clear
pub struct ReceiveBuffer<const N: usize> {
    data: Vec<u8, N>,
    data_ready: bool,
}

impl<const N: usize> ReceiveBuffer<N> {
    pub const fn new() -> Self {
        Self {
            data: Vec::new(),
            data_ready: false,
        }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn remaining(&self) -> usize {
        N - self.data.len()
    }

    pub fn is_full(&self) -> bool {
        self.data.is_full()
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }

    pub fn is_data_ready(&self) -> bool {
        self.data_ready
    }

    /// Append one byte, returns false if the buffer is full
    pub fn push(&mut self, byte: u8) -> bool {
        self.data.push(byte).is_ok()
    }

    /// Raise the ready flag
    ///
    /// Returns true only when the flag was previously clear, i.e. when the
    /// application should be signalled.
    pub fn mark_ready(&mut self) -> bool {
        !core::mem::replace(&mut self.data_ready, true)
    }

    /// Drop all bytes and lower the ready flag
    pub fn clear(&mut self) {
        self.data.clear();
        self.data_ready = false;
    }
}

impl<const N: usize> Default for ReceiveBuffer<N> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_until_full() {
        let mut buffer: ReceiveBuffer<4> = ReceiveBuffer::new();
        for byte in 1..=4 {
            assert!(buffer.push(byte));
        }
        assert!(buffer.is_full());
        assert_eq!(buffer.remaining(), 0);
        assert!(!buffer.push(5));
        assert_eq!(buffer.as_slice(), &[1, 2, 3, 4]);
    }

    #[test]
    fn test_mark_ready_signals_once() {
        let mut buffer: ReceiveBuffer<4> = ReceiveBuffer::new();
        assert!(buffer.mark_ready());
        assert!(!buffer.mark_ready());
        assert!(buffer.is_data_ready());

        buffer.clear();
        assert!(!buffer.is_data_ready());
        assert!(buffer.mark_ready());
    }

    #[test]
    fn test_clear_resets_contents() {
        let mut buffer: ReceiveBuffer<8> = ReceiveBuffer::new();
        buffer.push(0x55);
        buffer.mark_ready();
        buffer.clear();
        assert!(buffer.is_empty());
        assert_eq!(buffer.remaining(), 8);
    }
}
