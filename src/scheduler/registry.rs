//! Pending long-poll request registry.
//!
//! Entries are kept in arrival order. The mutex is held only for a single
//! insert, remove or snapshot; the dispatch thread never holds it while
//! talking to the lock service, so producers do not wait on a cycle.
//!
//! An entry owns its response handle. Whoever removes an entry is the
//! only party able to resolve it, which makes double resolution
//! impossible even when producers and the dispatch thread race.
//!
//! Producers only insert. Older requests of a worker are displaced by
//! [`PendingRegistry::take_superseded`], which the dispatch thread calls
//! between lock calls, so a request is never cancelled while a lock call
//! on its behalf is in flight.

use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;

use super::admission::AdmissionPermit;
use crate::error::FetchError;
use crate::request::{FetchRequest, LockedTask};
use crate::response::AsyncResponse;
use crate::telemetry;

/// Arrival-ordered identifier of a pending request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RequestId(pub u64);

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// How a pending request ends.
#[derive(Debug)]
pub enum Resolution {
    /// Lock service returned at least one task.
    Locked(Vec<LockedTask>),
    /// Deadline passed with nothing to hand out.
    TimedOut,
    /// Lock service failed for this request.
    Failed(FetchError),
    /// Superseded by a newer request from the same worker.
    Superseded,
    /// Dispatcher shut down.
    Rejected,
}

impl Resolution {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Locked(_) => "locked",
            Self::TimedOut => "timeout",
            Self::Failed(_) => "error",
            Self::Superseded => "cancelled",
            Self::Rejected => "shutdown",
        }
    }
}

/// An admitted request waiting for tasks.
pub struct PendingRequest {
    id: RequestId,
    request: Arc<FetchRequest>,
    arrival_time: DateTime<Utc>,
    response_timeout_ms: u64,
    response: Box<dyn AsyncResponse>,
    _permit: AdmissionPermit,
}

impl fmt::Debug for PendingRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PendingRequest")
            .field("id", &self.id)
            .field("worker_id", &self.request.worker_id)
            .field("engine", &self.request.engine)
            .field("arrival_time", &self.arrival_time)
            .field("response_timeout_ms", &self.response_timeout_ms)
            .finish()
    }
}

impl PendingRequest {
    pub fn new(
        id: RequestId,
        request: Arc<FetchRequest>,
        arrival_time: DateTime<Utc>,
        response_timeout_ms: u64,
        response: Box<dyn AsyncResponse>,
        permit: AdmissionPermit,
    ) -> Self {
        Self { id, request, arrival_time, response_timeout_ms, response, _permit: permit }
    }

    pub fn id(&self) -> RequestId {
        self.id
    }

    pub fn worker_id(&self) -> &str {
        &self.request.worker_id
    }

    pub fn view(&self) -> PendingView {
        PendingView {
            id: self.id,
            request: Arc::clone(&self.request),
            arrival_time: self.arrival_time,
            response_timeout_ms: self.response_timeout_ms,
        }
    }

    /// Deliver the outcome and release the admission slot.
    pub fn resolve(self, resolution: Resolution) {
        tracing::debug!(
            request_id = %self.id,
            worker_id = %self.request.worker_id,
            outcome = resolution.label(),
            "resolving pending request"
        );
        telemetry::record_resolution(resolution.label());

        let Self { response, _permit, .. } = self;
        match resolution {
            Resolution::Locked(tasks) => response.resume_with_tasks(tasks),
            Resolution::TimedOut => response.resume_with_tasks(Vec::new()),
            Resolution::Failed(error) => response.resume_with_error(error),
            Resolution::Superseded => response.cancel(),
            Resolution::Rejected => response.resume_with_error(FetchError::Shutdown),
        }
    }
}

/// Read-only copy of an entry taken for one dispatch cycle.
#[derive(Debug, Clone)]
pub struct PendingView {
    pub id: RequestId,
    pub request: Arc<FetchRequest>,
    pub arrival_time: DateTime<Utc>,
    pub response_timeout_ms: u64,
}

impl PendingView {
    /// Milliseconds until the deadline; zero or negative once it passed.
    pub fn remaining_ms(&self, now: DateTime<Utc>) -> i64 {
        let elapsed = (now - self.arrival_time).num_milliseconds();
        i64::try_from(self.response_timeout_ms)
            .unwrap_or(i64::MAX)
            .saturating_sub(elapsed)
    }
}

/// Result of [`PendingRegistry::insert`].
#[derive(Debug)]
pub enum Insertion {
    Inserted,
    /// Registry closed for shutdown; the entry is handed back.
    Closed(PendingRequest),
}

#[derive(Debug, Default)]
struct RegistryState {
    entries: BTreeMap<RequestId, PendingRequest>,
    closed: bool,
}

/// Thread-safe, arrival-ordered set of pending requests.
#[derive(Debug)]
pub struct PendingRegistry {
    state: Mutex<RegistryState>,
    unique_worker: bool,
}

impl PendingRegistry {
    pub fn new(unique_worker: bool) -> Self {
        Self { state: Mutex::new(RegistryState::default()), unique_worker }
    }

    pub fn insert(&self, entry: PendingRequest) -> Insertion {
        let mut state = self.state.lock();
        if state.closed {
            return Insertion::Closed(entry);
        }
        state.entries.insert(entry.id(), entry);
        telemetry::record_pending(state.entries.len());
        Insertion::Inserted
    }

    /// In unique-worker mode, remove every entry that has a newer entry
    /// from the same worker. The caller cancels what is returned.
    pub fn take_superseded(&self) -> Vec<PendingRequest> {
        if !self.unique_worker {
            return Vec::new();
        }
        let mut state = self.state.lock();
        let mut seen = HashSet::new();
        let stale: Vec<RequestId> = state
            .entries
            .values()
            .rev()
            .filter(|e| !seen.insert(e.worker_id().to_string()))
            .map(PendingRequest::id)
            .collect();
        if stale.is_empty() {
            return Vec::new();
        }
        let superseded: Vec<PendingRequest> = stale
            .into_iter()
            .filter_map(|id| state.entries.remove(&id))
            .collect();
        telemetry::record_pending(state.entries.len());
        superseded
    }

    pub fn remove(&self, id: RequestId) -> Option<PendingRequest> {
        let mut state = self.state.lock();
        let removed = state.entries.remove(&id);
        telemetry::record_pending(state.entries.len());
        removed
    }

    pub fn snapshot(&self) -> Vec<PendingView> {
        self.state.lock().entries.values().map(PendingRequest::view).collect()
    }

    /// Refuse further inserts and hand back everything still pending.
    pub fn close(&self) -> Vec<PendingRequest> {
        let mut state = self.state.lock();
        state.closed = true;
        telemetry::record_pending(0);
        std::mem::take(&mut state.entries).into_values().collect()
    }

    pub fn len(&self) -> usize {
        self.state.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::response::{ChannelResponse, FetchOutcome, OutcomeRx};
    use crate::scheduler::AdmissionQueue;

    fn worker_ids(registry: &PendingRegistry) -> Vec<String> {
        registry.snapshot().iter().map(|v| v.request.worker_id.clone()).collect()
    }

    fn entry(queue: &AdmissionQueue, id: u64, worker: &str) -> (PendingRequest, OutcomeRx) {
        let (response, rx) = ChannelResponse::boxed();
        let request = Arc::new(FetchRequest::new(worker, 1).response_timeout(5000));
        let entry = PendingRequest::new(
            RequestId(id),
            request,
            Utc::now(),
            5000,
            response,
            queue.try_admit().unwrap(),
        );
        (entry, rx)
    }

    #[test]
    fn snapshot_keeps_arrival_order() {
        let queue = AdmissionQueue::new(4);
        let registry = PendingRegistry::new(false);
        for (id, worker) in [(3, "c"), (1, "a"), (2, "b")] {
            let (e, _rx) = entry(&queue, id, worker);
            registry.insert(e);
        }
        let ids: Vec<u64> = registry.snapshot().iter().map(|v| v.id.0).collect();
        assert_eq!(ids, [1, 2, 3]);
    }

    #[test]
    fn unique_worker_displaces_older_entries() {
        let queue = AdmissionQueue::new(4);
        let registry = PendingRegistry::new(true);
        let (first, mut first_rx) = entry(&queue, 1, "w1");
        let (other, _other) = entry(&queue, 2, "w2");
        let (second, _rx) = entry(&queue, 3, "w1");
        let (third, _rx3) = entry(&queue, 4, "w1");

        for e in [first, other, second, third] {
            assert!(matches!(registry.insert(e), Insertion::Inserted));
        }
        assert_eq!(registry.len(), 4);

        let superseded = registry.take_superseded();
        let ids: Vec<u64> = superseded.iter().map(|e| e.id().0).collect();
        assert_eq!(ids, [3, 1]);
        for e in superseded {
            e.resolve(Resolution::Superseded);
        }
        assert_eq!(first_rx.try_recv().unwrap(), FetchOutcome::Cancelled);
        assert_eq!(worker_ids(&registry), ["w2", "w1"]);
        assert_eq!(queue.in_use(), 2);
        assert!(registry.take_superseded().is_empty());
    }

    #[test]
    fn duplicate_workers_kept_without_unique_mode() {
        let queue = AdmissionQueue::new(4);
        let registry = PendingRegistry::new(false);
        let (a, _a) = entry(&queue, 1, "w1");
        let (b, _b) = entry(&queue, 2, "w1");
        registry.insert(a);
        registry.insert(b);
        assert!(registry.take_superseded().is_empty());
        assert_eq!(worker_ids(&registry), ["w1", "w1"]);
    }

    #[test]
    fn closed_registry_hands_entry_back() {
        let queue = AdmissionQueue::new(4);
        let registry = PendingRegistry::new(false);
        let (a, _a) = entry(&queue, 1, "w1");
        registry.insert(a);

        let drained = registry.close();
        assert_eq!(drained.len(), 1);

        let (b, _b) = entry(&queue, 2, "w2");
        assert!(matches!(registry.insert(b), Insertion::Closed(_)));
        assert!(registry.is_empty());
    }

    #[test]
    fn remove_is_exclusive() {
        let queue = AdmissionQueue::new(1);
        let registry = PendingRegistry::new(false);
        let (a, _a) = entry(&queue, 1, "w1");
        registry.insert(a);

        assert!(registry.remove(RequestId(1)).is_some());
        assert!(registry.remove(RequestId(1)).is_none());
        assert_eq!(queue.in_use(), 0);
    }

    #[test]
    fn remaining_time_counts_down() {
        let arrival = Utc::now();
        let view = PendingView {
            id: RequestId(1),
            request: Arc::new(FetchRequest::new("w", 1)),
            arrival_time: arrival,
            response_timeout_ms: 5000,
        };
        assert_eq!(view.remaining_ms(arrival + chrono::Duration::milliseconds(1000)), 4000);
        assert_eq!(view.remaining_ms(arrival + chrono::Duration::milliseconds(6000)), -1000);
    }
}
