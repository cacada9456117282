//! Long-poll dispatch loop.
//!
//! Producer threads hand requests to [`Dispatcher::add_pending_request`].
//! A request that cannot be answered right away is admitted into the
//! pending registry and the dispatch thread is signalled. The dispatch
//! thread repeatedly runs [`Dispatcher::acquire`]: it asks the lock
//! service for tasks on behalf of every pending request, resolves what it
//! can, and sleeps until the nearest deadline, the fetch interval, or the
//! next signal, whichever comes first.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use super::admission::AdmissionQueue;
use super::registry::{Insertion, PendingRegistry, PendingRequest, PendingView, RequestId, Resolution};
use super::timing::{BackOff, FAILED_CYCLE_BACK_OFF};
use crate::clock::{Clock, SystemClock};
use crate::config::DispatchConfig;
use crate::error::{DispatchError, FetchError, LockServiceError};
use crate::health::{HealthChecker, HealthReport};
use crate::lifecycle::{Lifecycle, LifecycleState};
use crate::lock::LockService;
use crate::request::{FetchRequest, LockedTask};
use crate::response::{AsyncResponse, ChannelResponse, OutcomeRx};
use crate::signal::SingleConsumerSignal;
use crate::telemetry::{self, FetchSpan, SpanExt};

/// Name of the background dispatch thread.
pub const DISPATCH_THREAD_NAME: &str = "taskpoll-dispatch";

/// State shared between producers and the dispatch thread.
struct Shared {
    config: DispatchConfig,
    registry: PendingRegistry,
    admission: AdmissionQueue,
    lock_service: Arc<dyn LockService>,
    clock: Arc<dyn Clock>,
    signal: OnceLock<SingleConsumerSignal>,
    lifecycle: Lifecycle,
    health: HealthChecker,
    next_id: AtomicU64,
}

/// Coordinates long-poll fetch-and-lock requests.
pub struct Dispatcher {
    shared: Arc<Shared>,
    thread: Mutex<Option<JoinHandle<()>>>,
}

impl Dispatcher {
    pub fn new(config: DispatchConfig, lock_service: Arc<dyn LockService>) -> Self {
        Self::with_clock(config, lock_service, Arc::new(SystemClock))
    }

    pub fn with_clock(
        config: DispatchConfig,
        lock_service: Arc<dyn LockService>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let shared = Shared {
            registry: PendingRegistry::new(config.unique_worker_request),
            admission: AdmissionQueue::new(config.queue_capacity),
            config,
            lock_service,
            clock,
            signal: OnceLock::new(),
            lifecycle: Lifecycle::new(),
            health: HealthChecker::default(),
            next_id: AtomicU64::new(1),
        };
        Self { shared: Arc::new(shared), thread: Mutex::new(None) }
    }

    pub fn config(&self) -> &DispatchConfig {
        &self.shared.config
    }

    /// Spawn the dispatch thread. Calling again while running is a no-op.
    ///
    /// Capacity, timeout limit, fetch interval and worker dedup come from
    /// the [`DispatchConfig`] given at construction and are not re-read
    /// here.
    pub fn start(&self) -> Result<(), DispatchError> {
        if !self.shared.lifecycle.start()? {
            return Ok(());
        }

        let shared = Arc::clone(&self.shared);
        let spawned = thread::Builder::new()
            .name(DISPATCH_THREAD_NAME.to_string())
            .spawn(move || run_loop(&shared));

        match spawned {
            Ok(handle) => {
                *self.thread.lock() = Some(handle);
                Ok(())
            }
            Err(e) => {
                self.shared.lifecycle.stop();
                Err(DispatchError::Spawn(e))
            }
        }
    }

    /// Stop the dispatch thread and reject everything still pending.
    ///
    /// Idempotent. Requests arriving afterwards are rejected with
    /// [`FetchError::Shutdown`].
    pub fn shutdown(&self) {
        if !self.shared.lifecycle.stop() {
            return;
        }
        tracing::info!(pending = self.shared.registry.len(), "dispatcher shutting down");

        self.shared.wake();
        let rejected = self.reject_pending_requests();

        let handle = self.thread.lock().take();
        if let Some(handle) = handle {
            if handle.thread().id() == thread::current().id() {
                tracing::warn!("shutdown called from dispatch thread; not joining");
            } else if handle.join().is_err() {
                tracing::error!("dispatch thread terminated abnormally");
            }
        }
        tracing::info!(rejected, "dispatcher stopped");
    }

    /// Close the registry and resolve every pending request with a
    /// shutdown rejection. Returns how many were rejected.
    pub fn reject_pending_requests(&self) -> usize {
        let pending = self.shared.registry.close();
        let count = pending.len();
        for entry in pending {
            entry.resolve(Resolution::Rejected);
        }
        count
    }

    /// Entry point for a worker request arriving on a producer thread.
    pub fn add_pending_request(&self, request: FetchRequest, response: Box<dyn AsyncResponse>) {
        self.shared.add_pending_request(request, response);
    }

    /// [`Self::add_pending_request`] with a channel-backed response.
    pub fn submit(&self, request: FetchRequest) -> OutcomeRx {
        let (response, rx) = ChannelResponse::boxed();
        self.add_pending_request(request, response);
        rx
    }

    /// Run one dispatch cycle and return how long to wait before the next.
    pub fn acquire(&self) -> Duration {
        self.shared.acquire()
    }

    pub fn validate_timeout(&self, timeout_ms: Option<u64>) -> Result<(), FetchError> {
        self.shared.validate_timeout(timeout_ms)
    }

    pub fn pending_requests(&self) -> Vec<PendingView> {
        self.shared.registry.snapshot()
    }

    pub fn pending_count(&self) -> usize {
        self.shared.registry.len()
    }

    pub fn remaining_capacity(&self) -> usize {
        self.shared.admission.remaining_capacity()
    }

    pub fn state(&self) -> LifecycleState {
        self.shared.lifecycle.state()
    }

    pub fn health(&self) -> HealthReport {
        self.shared.health.report(
            self.state(),
            self.pending_count(),
            self.remaining_capacity(),
            self.shared.admission.capacity(),
        )
    }
}

impl Drop for Dispatcher {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl Shared {
    fn validate_timeout(&self, timeout_ms: Option<u64>) -> Result<(), FetchError> {
        let max_ms = self.config.max_request_timeout_ms;
        match timeout_ms {
            Some(ms) if ms > max_ms => Err(FetchError::TimeoutTooLarge { max_ms }),
            _ => Ok(()),
        }
    }

    fn next_request_id(&self) -> RequestId {
        RequestId(self.next_id.fetch_add(1, Ordering::Relaxed))
    }

    fn wake(&self) {
        if let Some(signal) = self.signal.get() {
            signal.signal();
        }
    }

    fn add_pending_request(&self, request: FetchRequest, response: Box<dyn AsyncResponse>) {
        let arrival_time = self.clock.now();
        let span = FetchSpan::new(&request.worker_id, request.engine.name());
        let _entered = span.enter();

        if let Err(error) = self.validate_timeout(request.async_response_timeout) {
            tracing::debug!(%error, "rejecting request");
            telemetry::record_resolution("rejected_validation");
            response.resume_with_error(error);
            return;
        }
        if !self.lifecycle.is_accepting() {
            telemetry::record_resolution("shutdown");
            response.resume_with_error(FetchError::Shutdown);
            return;
        }

        let result = self.try_fetch_and_lock(&request);
        span.record_result(&result);
        let tasks = match result {
            Ok(tasks) => tasks,
            Err(error) => {
                tracing::warn!(%error, "fetch and lock failed on arrival");
                telemetry::record_resolution("error");
                response.resume_with_error(error.into());
                return;
            }
        };

        let timeout_ms = match request.async_response_timeout {
            Some(ms) if tasks.is_empty() => ms,
            _ => {
                tracing::debug!(tasks = tasks.len(), "answering request immediately");
                telemetry::record_resolution("locked");
                response.resume_with_tasks(tasks);
                return;
            }
        };

        let Some(permit) = self.admission.try_admit() else {
            tracing::warn!(
                capacity = self.admission.capacity(),
                "too many pending requests; rejecting"
            );
            telemetry::record_resolution("rejected_capacity");
            response.resume_with_error(FetchError::TooManyRequests);
            return;
        };

        let entry = PendingRequest::new(
            self.next_request_id(),
            Arc::new(request),
            arrival_time,
            timeout_ms,
            response,
            permit,
        );
        let id = entry.id();
        span.record("request_id", id.0);
        if let Insertion::Closed(entry) = self.registry.insert(entry) {
            entry.resolve(Resolution::Rejected);
            return;
        }
        tracing::debug!(request_id = %id, timeout_ms, "deferred request");
        self.wake();
    }

    /// Call the lock service, turning a panic into an error for this
    /// request alone.
    fn try_fetch_and_lock(&self, request: &FetchRequest) -> Result<Vec<LockedTask>, LockServiceError> {
        panic::catch_unwind(AssertUnwindSafe(|| self.lock_service.fetch_and_lock(request)))
            .unwrap_or_else(|payload| Err(LockServiceError::Panicked(panic_message(payload.as_ref()))))
    }

    fn acquire(&self) -> Duration {
        let started = Instant::now();
        for stale in self.registry.take_superseded() {
            tracing::debug!(superseded = %stale.id(), "cancelling older request of worker");
            stale.resolve(Resolution::Superseded);
        }

        let pending = self.registry.snapshot();
        let mut back_off = BackOff::new();

        for view in pending {
            match self.try_fetch_and_lock(&view.request) {
                Ok(tasks) if !tasks.is_empty() => self.resolve(view.id, Resolution::Locked(tasks)),
                Ok(_) => {
                    let remaining = view.remaining_ms(self.clock.now());
                    if remaining <= 0 {
                        self.resolve(view.id, Resolution::TimedOut);
                    } else {
                        back_off.observe(remaining);
                    }
                }
                Err(error) => {
                    tracing::warn!(request_id = %view.id, %error, "fetch and lock failed");
                    self.resolve(view.id, Resolution::Failed(error.into()));
                }
            }
        }

        let wait = back_off.next_wait(!self.registry.is_empty(), self.config.fetch_interval);
        telemetry::record_cycle(started.elapsed());
        tracing::trace!(
            wait_ms = u64::try_from(wait.as_millis()).unwrap_or(u64::MAX),
            "dispatch cycle complete"
        );
        wait
    }

    /// Resolve an entry this cycle looked at. It may already be gone when
    /// shutdown drained the registry during the lock call; tasks locked for
    /// it then have no recipient and stay locked until their lock expires.
    fn resolve(&self, id: RequestId, resolution: Resolution) {
        let Some(entry) = self.registry.remove(id) else {
            match resolution {
                Resolution::Locked(tasks) => {
                    let task_ids: Vec<&str> = tasks.iter().map(|t| t.id.as_str()).collect();
                    tracing::warn!(
                        request_id = %id,
                        ?task_ids,
                        "request resolved elsewhere; locked tasks not delivered"
                    );
                    telemetry::record_resolution("orphaned");
                }
                _ => tracing::debug!(request_id = %id, "request already resolved elsewhere"),
            }
            return;
        };
        entry.resolve(resolution);
    }
}

fn run_loop(shared: &Shared) {
    let signal = shared.signal.get_or_init(SingleConsumerSignal::for_current_thread);
    tracing::info!(
        capacity = shared.config.queue_capacity,
        fetch_interval_ms = u64::try_from(shared.config.fetch_interval.as_millis()).unwrap_or(u64::MAX),
        unique_worker = shared.config.unique_worker_request,
        "dispatch loop started"
    );

    while shared.lifecycle.is_running() {
        let wait = match panic::catch_unwind(AssertUnwindSafe(|| shared.acquire())) {
            Ok(wait) => wait,
            Err(payload) => {
                tracing::error!(
                    error = %panic_message(payload.as_ref()),
                    "dispatch cycle failed; continuing"
                );
                telemetry::record_cycle_failure();
                FAILED_CYCLE_BACK_OFF.min(shared.config.fetch_interval)
            }
        };
        if !shared.lifecycle.is_running() {
            break;
        }
        signal.wait_timeout(wait);
    }

    tracing::info!("dispatch loop stopped");
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
#[path = "dispatch_tests.rs"]
mod tests;
