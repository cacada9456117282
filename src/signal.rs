//! Single-consumer wake primitive.
//!
//! Exactly one thread (the consumer) may wait; any thread may signal.
//! A signal raised while the consumer is not waiting is remembered, so
//! the next wait returns immediately. Repeated signals collapse into one.

use std::thread::{self, Thread, ThreadId};
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SignalError {
    #[error("Consumer thread cannot be absent")]
    NoConsumer,
}

/// Condition usable by one designated consumer and many producers.
#[derive(Debug)]
pub struct SingleConsumerSignal {
    consumer: ThreadId,
    pending: Mutex<bool>,
    wake: Condvar,
}

impl SingleConsumerSignal {
    pub fn new(consumer: ThreadId) -> Self {
        Self {
            consumer,
            pending: Mutex::new(false),
            wake: Condvar::new(),
        }
    }

    /// Bind to a thread handle that may not exist yet.
    pub fn bind(consumer: Option<&Thread>) -> Result<Self, SignalError> {
        consumer
            .map(|t| Self::new(t.id()))
            .ok_or(SignalError::NoConsumer)
    }

    /// Bind to the calling thread.
    pub fn for_current_thread() -> Self {
        Self::new(thread::current().id())
    }

    pub fn consumer(&self) -> ThreadId {
        self.consumer
    }

    /// Raise the signal, waking the consumer if it is parked.
    pub fn signal(&self) {
        let mut pending = self.pending.lock();
        *pending = true;
        self.wake.notify_one();
    }

    /// Whether a signal is waiting to be consumed.
    pub fn is_pending(&self) -> bool {
        *self.pending.lock()
    }

    /// Park until signalled or `timeout` elapses, then clear the signal.
    ///
    /// A timeout too large to represent as a deadline waits until signalled.
    ///
    /// # Panics
    ///
    /// Panics when called from any thread other than the bound consumer.
    pub fn wait_timeout(&self, timeout: Duration) {
        assert!(
            thread::current().id() == self.consumer,
            "Wrong usage of SingleConsumerSignal: can only wait in consumer thread"
        );

        let mut pending = self.pending.lock();
        let deadline = Instant::now().checked_add(timeout);
        while !*pending {
            match deadline {
                Some(deadline) => {
                    if self.wake.wait_until(&mut pending, deadline).timed_out() {
                        break;
                    }
                }
                None => self.wake.wait(&mut pending),
            }
        }
        *pending = false;
    }
}
