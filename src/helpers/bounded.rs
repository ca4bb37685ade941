//! Bounded deque for pending work and log history
//!
//! Provides a fixed-capacity deque that automatically evicts the oldest item
//! when capacity is reached (FIFO eviction). The evicted item is handed back
//! so callers can report what was dropped.

use std::collections::VecDeque;

/// A bounded deque with FIFO eviction policy
///
/// When the deque reaches its capacity, the oldest item is automatically
/// removed when a new item is pushed.
#[derive(Clone, Debug)]
pub struct BoundedDeque<T> {
    cap: usize,
    buf: VecDeque<T>,
}

impl<T> BoundedDeque<T> {
    /// Create a new bounded deque with the specified capacity
    ///
    /// # Arguments
    /// * `cap` - Maximum number of items to store. If 0, nothing is stored.
    pub fn new(cap: usize) -> Self {
        Self {
            cap,
            buf: VecDeque::with_capacity(cap.min(1024)),
        }
    }

    /// Push a new value, returning the oldest one if it had to be evicted
    ///
    /// With zero capacity nothing is stored and the value itself comes back.
    pub fn push(&mut self, value: T) -> Option<T> {
        if self.cap == 0 {
            return Some(value);
        }
        let evicted = if self.buf.len() >= self.cap {
            self.buf.pop_front() // FIFO eviction
        } else {
            None
        };
        self.buf.push_back(value);
        evicted
    }

    /// Take the oldest item
    pub fn pop_front(&mut self) -> Option<T> {
        self.buf.pop_front()
    }

    /// Get the number of items currently stored
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    /// Check if the deque is empty
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Clear all items
    pub fn clear(&mut self) {
        self.buf.clear();
    }

    /// Convert to a Vec (clones all items)
    pub fn to_vec(&self) -> Vec<T>
    where
        T: Clone,
    {
        self.buf.iter().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bounded_deque_basic() {
        let mut deque = BoundedDeque::new(3);
        deque.push(1);
        deque.push(2);
        deque.push(3);
        assert_eq!(deque.len(), 3);
        assert_eq!(deque.to_vec(), vec![1, 2, 3]);
    }

    #[test]
    fn test_bounded_deque_eviction() {
        let mut deque = BoundedDeque::new(3);
        deque.push(1);
        deque.push(2);
        deque.push(3);
        assert_eq!(deque.push(4), Some(1));
        assert_eq!(deque.len(), 3);
        assert_eq!(deque.to_vec(), vec![2, 3, 4]);
    }

    #[test]
    fn test_bounded_deque_zero_capacity() {
        let mut deque = BoundedDeque::new(0);
        assert_eq!(deque.push(1), Some(1));
        assert!(deque.is_empty());
    }

    #[test]
    fn test_bounded_deque_pop_front() {
        let mut deque = BoundedDeque::new(2);
        assert_eq!(deque.push("a"), None);
        assert_eq!(deque.push("b"), None);
        assert_eq!(deque.pop_front(), Some("a"));
        deque.clear();
        assert_eq!(deque.pop_front(), None);
    }
}
