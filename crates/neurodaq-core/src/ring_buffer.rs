//! Fixed-capacity scalar history buffer
//!
//! Keeps the most recent N values for bounded retrospective display,
//! overwriting the oldest value on wraparound. Distinct from the ingress
//! buffer, which drops the newest item when full.

/// Circular history buffer with overwrite-oldest semantics
#[derive(Debug, Clone)]
pub struct RingBuffer<T: Copy> {
    slots: Vec<T>,
    capacity: usize,
    cursor: usize,
    wrapped: bool,
}

impl<T: Copy + Default> RingBuffer<T> {
    /// Create a buffer holding at most `capacity` values
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "ring buffer capacity must be at least 1");
        RingBuffer {
            slots: vec![T::default(); capacity],
            capacity,
            cursor: 0,
            wrapped: false,
        }
    }

    /// Append one value, overwriting the oldest once full
    pub fn push(&mut self, value: T) {
        self.slots[self.cursor] = value;
        self.cursor += 1;
        if self.cursor == self.capacity {
            self.cursor = 0;
            self.wrapped = true;
        }
    }

    /// Number of values currently held
    pub fn fill(&self) -> usize {
        if self.wrapped {
            self.capacity
        } else {
            self.cursor
        }
    }

    /// Maximum number of values the buffer holds
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn is_empty(&self) -> bool {
        self.fill() == 0
    }

    /// Whether the write cursor has wrapped at least once
    pub fn has_wrapped(&self) -> bool {
        self.wrapped
    }

    /// Values in arrival order, oldest first
    pub fn ordered(&self) -> Vec<T> {
        let mut out = Vec::with_capacity(self.fill());
        if self.wrapped {
            out.extend_from_slice(&self.slots[self.cursor..]);
        }
        out.extend_from_slice(&self.slots[..self.cursor]);
        out
    }

    /// The most recently pushed value, if any
    pub fn latest(&self) -> Option<T> {
        if self.is_empty() {
            return None;
        }
        let idx = if self.cursor == 0 {
            self.capacity - 1
        } else {
            self.cursor - 1
        };
        Some(self.slots[idx])
    }

    /// Forget all values without releasing storage
    pub fn clear(&mut self) {
        self.cursor = 0;
        self.wrapped = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_fill() {
        let mut buf = RingBuffer::new(4);
        buf.push(1.0);
        buf.push(2.0);

        assert_eq!(buf.fill(), 2);
        assert!(!buf.has_wrapped());
        assert_eq!(buf.ordered(), vec![1.0, 2.0]);
        assert_eq!(buf.latest(), Some(2.0));
    }

    #[test]
    fn test_overwrite_oldest() {
        let mut buf = RingBuffer::new(3);
        for v in 1..=5 {
            buf.push(v as f64);
        }

        assert_eq!(buf.fill(), 3);
        assert!(buf.has_wrapped());
        // 1.0 and 2.0 were evicted
        assert_eq!(buf.ordered(), vec![3.0, 4.0, 5.0]);
        assert_eq!(buf.latest(), Some(5.0));
    }

    #[test]
    fn test_exact_fill_boundary() {
        let mut buf = RingBuffer::new(3);
        buf.push(1.0);
        buf.push(2.0);
        buf.push(3.0);

        assert_eq!(buf.fill(), 3);
        assert!(buf.has_wrapped());
        assert_eq!(buf.ordered(), vec![1.0, 2.0, 3.0]);
    }

    #[test]
    fn test_clear() {
        let mut buf = RingBuffer::new(2);
        buf.push(1.0);
        buf.push(2.0);
        buf.clear();

        assert!(buf.is_empty());
        assert_eq!(buf.latest(), None);
        buf.push(9.0);
        assert_eq!(buf.ordered(), vec![9.0]);
    }
}
