//! Admission control for long-poll requests.
//!
//! A fixed number of slots bounds how many requests may be pending at
//! once. A slot is held by an RAII permit and returned when it drops.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Counting gate over pending long-poll requests.
#[derive(Debug)]
pub struct AdmissionQueue {
    admitted: Arc<AtomicUsize>,
    capacity: usize,
}

impl AdmissionQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            admitted: Arc::new(AtomicUsize::new(0)),
            capacity,
        }
    }

    /// Reserve a slot. Returns `None` when every slot is taken.
    pub fn try_admit(&self) -> Option<AdmissionPermit> {
        loop {
            let current = self.admitted.load(Ordering::Acquire);
            if current >= self.capacity {
                return None;
            }

            if self
                .admitted
                .compare_exchange(current, current + 1, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
            {
                return Some(AdmissionPermit { admitted: Arc::clone(&self.admitted) });
            }
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn in_use(&self) -> usize {
        self.admitted.load(Ordering::Acquire)
    }

    pub fn remaining_capacity(&self) -> usize {
        self.capacity.saturating_sub(self.in_use())
    }
}

/// RAII guard for one admission slot.
#[derive(Debug)]
pub struct AdmissionPermit {
    admitted: Arc<AtomicUsize>,
}

impl Drop for AdmissionPermit {
    fn drop(&mut self) {
        self.admitted.fetch_sub(1, Ordering::AcqRel);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn rejects_when_full() {
        let queue = AdmissionQueue::new(2);
        let a = queue.try_admit();
        let b = queue.try_admit();
        assert!(a.is_some() && b.is_some());
        assert!(queue.try_admit().is_none());
        assert_eq!(queue.remaining_capacity(), 0);
    }

    #[test]
    fn dropping_permit_releases_slot() {
        let queue = AdmissionQueue::new(1);
        let permit = queue.try_admit().unwrap();
        assert_eq!(queue.in_use(), 1);
        drop(permit);
        assert_eq!(queue.in_use(), 0);
        assert!(queue.try_admit().is_some());
    }

    #[test]
    fn concurrent_admission_respects_capacity() {
        let queue = Arc::new(AdmissionQueue::new(8));
        let handles: Vec<_> = (0..32)
            .map(|_| {
                let queue = Arc::clone(&queue);
                thread::spawn(move || queue.try_admit())
            })
            .collect();

        let permits: Vec<_> = handles
            .into_iter()
            .filter_map(|h| h.join().unwrap())
            .collect();
        assert_eq!(permits.len(), 8);
        assert_eq!(queue.remaining_capacity(), 0);

        drop(permits);
        assert_eq!(queue.remaining_capacity(), 8);
    }
}
