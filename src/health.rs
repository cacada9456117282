//! Health reporting for the dispatcher.
//!
//! Liveness, readiness and a serializable report for probes and the CLI.

use std::time::Instant;

use serde::{Deserialize, Serialize};

use crate::lifecycle::LifecycleState;

/// Overall health status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HealthState {
    Healthy,
    Degraded,
    Unhealthy,
}

/// Detailed health report.
#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    pub state: HealthState,
    pub lifecycle: LifecycleState,
    pub ready: bool,
    pub accepting_requests: bool,
    pub pending_requests: usize,
    pub remaining_capacity: usize,
    pub uptime_secs: u64,
}

/// Health check configuration.
#[derive(Debug, Clone)]
pub struct HealthConfig {
    /// Fraction of admission capacity in use at which the dispatcher
    /// reports itself degraded.
    pub saturation_threshold: f64,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self { saturation_threshold: 0.9 }
    }
}

pub struct HealthChecker {
    config: HealthConfig,
    start_time: Instant,
}

impl HealthChecker {
    pub fn new(config: HealthConfig) -> Self {
        Self {
            config,
            start_time: Instant::now(),
        }
    }

    /// Ready when the dispatch loop runs and an admission slot is free.
    pub fn is_ready(&self, lifecycle: LifecycleState, remaining_capacity: usize) -> bool {
        lifecycle == LifecycleState::Running && remaining_capacity > 0
    }

    /// `remaining_capacity` is the admission counter, which also covers
    /// permits held by requests not yet in the registry.
    pub fn report(
        &self,
        lifecycle: LifecycleState,
        pending: usize,
        remaining_capacity: usize,
        capacity: usize,
    ) -> HealthReport {
        HealthReport {
            state: self.compute_state(lifecycle, remaining_capacity, capacity),
            lifecycle,
            ready: self.is_ready(lifecycle, remaining_capacity),
            accepting_requests: lifecycle != LifecycleState::Stopped,
            pending_requests: pending,
            remaining_capacity,
            uptime_secs: self.start_time.elapsed().as_secs(),
        }
    }

    fn compute_state(&self, lifecycle: LifecycleState, remaining: usize, capacity: usize) -> HealthState {
        if lifecycle != LifecycleState::Running {
            return HealthState::Unhealthy;
        }
        let in_use = capacity.saturating_sub(remaining);
        if capacity == 0 || in_use as f64 >= capacity as f64 * self.config.saturation_threshold {
            return HealthState::Degraded;
        }
        HealthState::Healthy
    }
}

impl Default for HealthChecker {
    fn default() -> Self {
        Self::new(HealthConfig::default())
    }
}
