//! # Feather Primes
//!
//! Producer/consumer pipeline over a bounded buffer whose blocking operations
//! yield to the other threads of the group.
//!
//! The producer emits every prime below a limit followed by [`SENTINEL`]; the
//! consumer drains the buffer until it sees the sentinel.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

use feather_execution::{entry, ExecResult, Feather, GroupConfig, ThreadGroup};

/// Value the producer sends after its last prime
pub const SENTINEL: i32 = -1;

/// Fixed-capacity FIFO shared by the threads of one group
///
/// `put` on a full buffer and `get` on an empty one yield until the other side
/// makes progress.
#[derive(Debug)]
pub struct BoundedBuffer {
    items: RefCell<VecDeque<i32>>,
    capacity: usize,
}

impl BoundedBuffer {
    /// Create an empty buffer
    ///
    /// Panics if `capacity` is zero: a put could never complete.
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "buffer capacity must be positive");
        Self {
            items: RefCell::new(VecDeque::with_capacity(capacity)),
            capacity,
        }
    }

    /// Maximum number of buffered values
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of buffered values
    pub fn len(&self) -> usize {
        self.items.borrow().len()
    }

    /// Check if the buffer is empty
    pub fn is_empty(&self) -> bool {
        self.items.borrow().is_empty()
    }

    /// Append `value`, yielding while the buffer is full
    pub fn put(&self, group: &ThreadGroup, value: i32) {
        while self.len() == self.capacity {
            group.yield_now();
        }
        self.items.borrow_mut().push_back(value);
    }

    /// Remove the oldest value, yielding while the buffer is empty
    pub fn get(&self, group: &ThreadGroup) -> i32 {
        loop {
            let next = self.items.borrow_mut().pop_front();
            match next {
                Some(value) => return value,
                None => group.yield_now(),
            }
        }
    }
}

/// Primes below `limit`, by trial division
pub fn primes_below(limit: i32) -> impl Iterator<Item = i32> {
    (2..limit).filter(|&n| (2..n).take_while(|d| d * d <= n).all(|d| n % d != 0))
}

/// Run one producer and one consumer to completion
///
/// Returns the values the consumer received, in order, sentinel excluded.
pub fn run_pipeline(config: GroupConfig, capacity: usize, limit: i32) -> ExecResult<Vec<i32>> {
    let buffer = Rc::new(BoundedBuffer::new(capacity));
    let received = Rc::new(RefCell::new(Vec::new()));

    let producer = {
        let buffer = Rc::clone(&buffer);
        entry(move |group: &ThreadGroup, own_id: usize| {
            for prime in primes_below(limit) {
                log::trace!("slot {} puts {}", own_id, prime);
                buffer.put(group, prime);
            }
            buffer.put(group, SENTINEL);
            0
        })
    };

    let consumer = {
        let buffer = Rc::clone(&buffer);
        let received = Rc::clone(&received);
        entry(move |group: &ThreadGroup, own_id: usize| {
            loop {
                let value = buffer.get(group);
                if value == SENTINEL {
                    break;
                }
                log::debug!("slot {} got {}", own_id, value);
                received.borrow_mut().push(value);
            }
            0
        })
    };

    let feather = Feather::init_with(config, [producer, consumer])?;
    let codes = feather.run_collect();
    log::debug!("producer exited with {}, consumer with {}", codes[0], codes[1]);

    Ok(received.take())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_primes_below() {
        assert_eq!(
            primes_below(30).collect::<Vec<_>>(),
            [2, 3, 5, 7, 11, 13, 17, 19, 23, 29]
        );
        assert_eq!(primes_below(2).count(), 0);
    }

    #[test]
    fn test_pipeline_delivers_in_order() {
        let received = run_pipeline(GroupConfig::roomy(), 10, 10).unwrap();
        assert_eq!(received, [2, 3, 5, 7]);
    }

    #[test]
    fn test_pipeline_with_single_slot_buffer() {
        let received = run_pipeline(GroupConfig::roomy(), 1, 30).unwrap();
        assert_eq!(received, primes_below(30).collect::<Vec<_>>());
    }

    #[test]
    fn test_buffer_never_exceeds_capacity() {
        let buffer = Rc::new(BoundedBuffer::new(3));
        let peak = Rc::new(RefCell::new(0));

        let producer = {
            let buffer = Rc::clone(&buffer);
            let peak = Rc::clone(&peak);
            entry(move |group: &ThreadGroup, _own_id: usize| {
                for value in 0..20 {
                    buffer.put(group, value);
                    let len = buffer.len();
                    let mut peak = peak.borrow_mut();
                    *peak = (*peak).max(len);
                }
                buffer.put(group, SENTINEL);
                0
            })
        };
        let consumer = {
            let buffer = Rc::clone(&buffer);
            entry(move |group: &ThreadGroup, _own_id: usize| {
                let mut sum = 0;
                loop {
                    match buffer.get(group) {
                        SENTINEL => break,
                        value => sum += value,
                    }
                }
                sum as i16
            })
        };

        let feather = Feather::init_with(GroupConfig::roomy(), [producer, consumer]).unwrap();
        assert_eq!(feather.run_collect(), [0, 190]);
        assert_eq!(*peak.borrow(), 3);
        assert!(buffer.is_empty());
    }

    #[test]
    #[should_panic(expected = "capacity must be positive")]
    fn test_zero_capacity_rejected() {
        BoundedBuffer::new(0);
    }
}
