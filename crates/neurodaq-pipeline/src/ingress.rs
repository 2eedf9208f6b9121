//! Bounded circular queue between the producing source and the run loop
//!
//! Single producer, single consumer, one lock. Overflow drops the
//! incoming package (drop-newest) and counts it; the run loop summarizes
//! the count periodically, keeping the producer path free of I/O.

use neurodaq_core::SamplePackage;
use parking_lot::Mutex;

struct Inner {
    slots: Vec<Option<SamplePackage>>,
    head: usize,
    len: usize,
    discarded: u64,
}

/// Fixed-capacity FIFO hand-off buffer with drop-newest overflow
pub struct SampleIngressBuffer {
    inner: Mutex<Inner>,
    capacity: usize,
}

impl SampleIngressBuffer {
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "ingress buffer capacity must be at least 1");
        SampleIngressBuffer {
            inner: Mutex::new(Inner {
                slots: (0..capacity).map(|_| None).collect(),
                head: 0,
                len: 0,
                discarded: 0,
            }),
            capacity,
        }
    }

    /// Enqueue a package. Returns false when the buffer is full; the
    /// incoming package is then discarded and counted.
    pub fn push(&self, package: SamplePackage) -> bool {
        let mut inner = self.inner.lock();
        if inner.len == self.capacity {
            inner.discarded += 1;
            return false;
        }
        let tail = (inner.head + inner.len) % self.capacity;
        inner.slots[tail] = Some(package);
        inner.len += 1;
        true
    }

    /// Dequeue the oldest package, if any
    pub fn pop(&self) -> Option<SamplePackage> {
        let mut inner = self.inner.lock();
        if inner.len == 0 {
            return None;
        }
        let head = inner.head;
        let package = inner.slots[head].take();
        inner.head = (head + 1) % self.capacity;
        inner.len -= 1;
        package
    }

    pub fn len(&self) -> usize {
        self.inner.lock().len
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of packages dropped since the last reset
    pub fn discarded(&self) -> u64 {
        self.inner.lock().discarded
    }

    /// Return the discard count and reset it to zero
    pub fn take_discarded(&self) -> u64 {
        let mut inner = self.inner.lock();
        std::mem::take(&mut inner.discarded)
    }

    /// Drop all queued packages and reset the discard counter
    pub fn clear(&self) {
        let mut inner = self.inner.lock();
        for slot in &mut inner.slots {
            *slot = None;
        }
        inner.head = 0;
        inner.len = 0;
        inner.discarded = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use neurodaq_core::{PackageFormat, ValueOrder};

    fn package(tag: f64) -> SamplePackage {
        let format = PackageFormat::new(1, 1, 100.0, ValueOrder::SampleMajor);
        SamplePackage::new(vec![tag], format).unwrap()
    }

    #[test]
    fn test_fifo_order() {
        let buf = SampleIngressBuffer::new(8);
        for i in 0..5 {
            assert!(buf.push(package(i as f64)));
        }
        assert_eq!(buf.len(), 5);
        for i in 0..5 {
            assert_eq!(buf.pop().unwrap().values[0], i as f64);
        }
        assert!(buf.pop().is_none());
    }

    #[test]
    fn test_drop_newest_on_overflow() {
        let buf = SampleIngressBuffer::new(3);
        for i in 0..7 {
            buf.push(package(i as f64));
        }

        // The first three arrivals survive; the newest four were dropped
        assert_eq!(buf.len(), 3);
        assert_eq!(buf.discarded(), 4);
        for i in 0..3 {
            assert_eq!(buf.pop().unwrap().values[0], i as f64);
        }
    }

    #[test]
    fn test_take_discarded_resets() {
        let buf = SampleIngressBuffer::new(1);
        buf.push(package(0.0));
        buf.push(package(1.0));
        buf.push(package(2.0));

        assert_eq!(buf.take_discarded(), 2);
        assert_eq!(buf.take_discarded(), 0);
    }

    #[test]
    fn test_wraparound_reuse() {
        let buf = SampleIngressBuffer::new(2);
        buf.push(package(0.0));
        buf.push(package(1.0));
        assert_eq!(buf.pop().unwrap().values[0], 0.0);
        assert!(buf.push(package(2.0)));
        assert_eq!(buf.pop().unwrap().values[0], 1.0);
        assert_eq!(buf.pop().unwrap().values[0], 2.0);
    }

    #[test]
    fn test_clear() {
        let buf = SampleIngressBuffer::new(2);
        buf.push(package(0.0));
        buf.push(package(1.0));
        buf.push(package(2.0));
        buf.clear();

        assert!(buf.is_empty());
        assert_eq!(buf.discarded(), 0);
    }
}
