//! Dispatcher lifecycle state machine.
//!
//! `Created -> Running -> Stopped`. A dispatcher that was never started
//! can still be stopped. Stopped is terminal.

use std::sync::atomic::{AtomicU8, Ordering};

use serde::Serialize;

use crate::error::DispatchError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum LifecycleState {
    Created = 0,
    Running = 1,
    Stopped = 2,
}

impl LifecycleState {
    fn from_u8(raw: u8) -> Self {
        match raw {
            0 => Self::Created,
            1 => Self::Running,
            _ => Self::Stopped,
        }
    }
}

/// Lock-free lifecycle flag shared by producers and the dispatch thread.
#[derive(Debug)]
pub struct Lifecycle {
    state: AtomicU8,
}

impl Lifecycle {
    pub fn new() -> Self {
        Self { state: AtomicU8::new(LifecycleState::Created as u8) }
    }

    pub fn state(&self) -> LifecycleState {
        LifecycleState::from_u8(self.state.load(Ordering::SeqCst))
    }

    /// Move to `Running`. Returns `Ok(false)` if already running.
    pub fn start(&self) -> Result<bool, DispatchError> {
        match self.state.compare_exchange(
            LifecycleState::Created as u8,
            LifecycleState::Running as u8,
            Ordering::SeqCst,
            Ordering::SeqCst,
        ) {
            Ok(_) => Ok(true),
            Err(raw) => match LifecycleState::from_u8(raw) {
                LifecycleState::Running => Ok(false),
                _ => Err(DispatchError::Stopped),
            },
        }
    }

    /// Move to `Stopped`. Returns `true` only for the call that made the
    /// transition.
    pub fn stop(&self) -> bool {
        self.state.swap(LifecycleState::Stopped as u8, Ordering::SeqCst)
            != LifecycleState::Stopped as u8
    }

    pub fn is_running(&self) -> bool {
        self.state() == LifecycleState::Running
    }

    /// New requests are taken until the dispatcher stops.
    pub fn is_accepting(&self) -> bool {
        self.state() != LifecycleState::Stopped
    }
}

impl Default for Lifecycle {
    fn default() -> Self {
        Self::new()
    }
}
