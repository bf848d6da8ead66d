//! Bounded receive queue

use std::collections::VecDeque;

/// Bytes received from the device, oldest first
///
/// When full, the oldest bytes are dropped to make room for new ones.
#[derive(Debug)]
pub struct ReceiveQueue {
    bytes: VecDeque<u8>,
    capacity: usize,
    dropped: usize,
}

impl ReceiveQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            bytes: VecDeque::with_capacity(capacity.min(4096)),
            capacity,
            dropped: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Total bytes dropped to overflow since creation
    pub fn dropped(&self) -> usize {
        self.dropped
    }

    /// Append `data`, returning how many bytes were dropped to fit it
    pub fn push(&mut self, data: &[u8]) -> usize {
        let skipped = data.len().saturating_sub(self.capacity);
        let data = &data[skipped..];
        let overflow = (self.bytes.len() + data.len()).saturating_sub(self.capacity);
        self.bytes.drain(..overflow);
        self.bytes.extend(data);

        let dropped = skipped + overflow;
        self.dropped += dropped;
        dropped
    }

    /// Move up to `buf.len()` bytes from the front into `buf`
    pub fn read(&mut self, buf: &mut [u8]) -> usize {
        let count = buf.len().min(self.bytes.len());
        for (slot, byte) in buf.iter_mut().zip(self.bytes.drain(..count)) {
            *slot = byte;
        }
        count
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fifo_order() {
        let mut queue = ReceiveQueue::new(16);
        queue.push(b"abc");
        queue.push(b"def");
        let mut buf = [0u8; 4];
        assert_eq!(queue.read(&mut buf), 4);
        assert_eq!(&buf, b"abcd");
        assert_eq!(queue.read(&mut buf), 2);
        assert_eq!(&buf[..2], b"ef");
        assert_eq!(queue.read(&mut buf), 0);
    }

    #[test]
    fn test_overflow_drops_oldest() {
        let mut queue = ReceiveQueue::new(4);
        assert_eq!(queue.push(b"abc"), 0);
        assert_eq!(queue.push(b"de"), 1);
        let mut buf = [0u8; 8];
        assert_eq!(queue.read(&mut buf), 4);
        assert_eq!(&buf[..4], b"bcde");
        assert_eq!(queue.dropped(), 1);
    }

    #[test]
    fn test_oversized_push_keeps_tail() {
        let mut queue = ReceiveQueue::new(3);
        queue.push(b"x");
        assert_eq!(queue.push(b"abcdef"), 4);
        let mut buf = [0u8; 8];
        assert_eq!(queue.read(&mut buf), 3);
        assert_eq!(&buf[..3], b"def");
        assert_eq!(queue.dropped(), 4);
    }
}
