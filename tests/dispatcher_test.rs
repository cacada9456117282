//! Tests for the dispatcher running on its own thread.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use taskpoll_core::{
    AsyncResponse, DispatchConfig, DispatchError, Dispatcher, EngineRef, FetchError,
    FetchOutcome, FetchRequest, InMemoryTaskStore, LifecycleState, LockServiceError, LockedTask,
    NewTask, OutcomeRx, SystemClock, TopicFilter,
};

const WAIT: Duration = Duration::from_secs(5);

fn fast_config() -> DispatchConfig {
    DispatchConfig {
        fetch_interval: Duration::from_millis(20),
        ..DispatchConfig::default()
    }
}

fn started(config: DispatchConfig) -> (Arc<InMemoryTaskStore>, Dispatcher) {
    let store = Arc::new(InMemoryTaskStore::new(EngineRef::default(), Arc::new(SystemClock)));
    let dispatcher = Dispatcher::new(config, store.clone());
    dispatcher.start().unwrap();
    (store, dispatcher)
}

fn long_poll(worker_id: &str, timeout_ms: u64) -> FetchRequest {
    FetchRequest::new(worker_id, 1)
        .topic(TopicFilter::new("invoice", 60_000))
        .response_timeout(timeout_ms)
}

async fn outcome(rx: OutcomeRx) -> FetchOutcome {
    tokio::time::timeout(WAIT, rx)
        .await
        .expect("request was not resolved in time")
        .expect("response dropped")
}

/// Response whose delivery panics, to fail a whole dispatch cycle.
struct PanickingResponse;

impl AsyncResponse for PanickingResponse {
    fn resume_with_tasks(self: Box<Self>, _tasks: Vec<LockedTask>) {
        panic!("client connection reset");
    }

    fn resume_with_error(self: Box<Self>, _error: FetchError) {
        panic!("client connection reset");
    }

    fn cancel(self: Box<Self>) {
        panic!("client connection reset");
    }
}

#[tokio::test]
async fn test_task_added_later_reaches_waiting_worker() {
    let (store, dispatcher) = started(fast_config());
    let rx = dispatcher.submit(long_poll("w1", 5_000));

    tokio::time::sleep(Duration::from_millis(50)).await;
    let id = store.add_task(NewTask::new("invoice"));

    let tasks = outcome(rx).await;
    let tasks = tasks.tasks().unwrap();
    assert_eq!(tasks.len(), 1);
    assert_eq!(tasks[0].id, id);
    assert_eq!(tasks[0].worker_id, "w1");
    assert_eq!(store.locked_count(), 1);
}

#[tokio::test]
async fn test_times_out_with_empty_list() {
    let (_store, dispatcher) = started(DispatchConfig::default());
    let start = Instant::now();

    let result = outcome(dispatcher.submit(long_poll("w1", 150))).await;

    assert_eq!(result, FetchOutcome::Tasks(Vec::new()));
    assert!(start.elapsed() >= Duration::from_millis(140));
    assert_eq!(dispatcher.pending_count(), 0);
}

#[tokio::test]
async fn test_loop_survives_failed_cycle() {
    let (store, dispatcher) = started(fast_config());

    dispatcher.add_pending_request(long_poll("flaky", 30), Box::new(PanickingResponse));
    tokio::time::sleep(Duration::from_millis(150)).await;
    assert_eq!(dispatcher.pending_count(), 0);

    let rx = dispatcher.submit(long_poll("w1", 5_000));
    tokio::time::sleep(Duration::from_millis(30)).await;
    store.add_task(NewTask::new("invoice"));

    assert_eq!(outcome(rx).await.tasks().map(<[_]>::len), Some(1));
    assert_eq!(dispatcher.state(), LifecycleState::Running);
}

#[tokio::test]
async fn test_panicking_lock_service_is_isolated() {
    let locks = |request: &FetchRequest| -> Result<Vec<LockedTask>, LockServiceError> {
        if request.worker_id == "bad" {
            panic!("index out of bounds");
        }
        Ok(Vec::new())
    };
    let dispatcher = Dispatcher::new(fast_config(), Arc::new(locks));
    dispatcher.start().unwrap();

    let bad = dispatcher.submit(long_poll("bad", 5_000));
    let good = dispatcher.submit(long_poll("good", 100));

    assert!(matches!(
        outcome(bad).await.error(),
        Some(FetchError::LockService(LockServiceError::Panicked(_)))
    ));
    assert_eq!(outcome(good).await, FetchOutcome::Tasks(Vec::new()));
}

#[tokio::test]
async fn test_shutdown_rejects_waiting_request() {
    let (_store, dispatcher) = started(DispatchConfig::default());
    let rx = dispatcher.submit(long_poll("w1", 60_000));
    let dispatcher = Arc::new(dispatcher);

    let handle = Arc::clone(&dispatcher);
    tokio::task::spawn_blocking(move || handle.shutdown()).await.unwrap();

    assert_eq!(outcome(rx).await.error(), Some(&FetchError::Shutdown));
    assert_eq!(dispatcher.state(), LifecycleState::Stopped);
    assert_eq!(dispatcher.remaining_capacity(), 200);
}

#[test]
fn test_start_is_idempotent_and_final_after_shutdown() {
    let (_store, dispatcher) = started(DispatchConfig::default());
    assert!(dispatcher.start().is_ok());
    assert_eq!(dispatcher.state(), LifecycleState::Running);

    dispatcher.shutdown();
    dispatcher.shutdown();
    assert!(matches!(dispatcher.start(), Err(DispatchError::Stopped)));
}

#[test]
fn test_concurrent_producers_respect_capacity() {
    const CAPACITY: usize = 16;
    const PRODUCERS: usize = 8;
    const PER_PRODUCER: usize = 10;

    let (_store, dispatcher) = started(DispatchConfig {
        queue_capacity: CAPACITY,
        ..fast_config()
    });
    let dispatcher = Arc::new(dispatcher);
    let over_capacity = Arc::new(AtomicUsize::new(0));

    let producers: Vec<_> = (0..PRODUCERS)
        .map(|p| {
            let dispatcher = Arc::clone(&dispatcher);
            let over_capacity = Arc::clone(&over_capacity);
            thread::spawn(move || {
                let receivers: Vec<_> = (0..PER_PRODUCER)
                    .map(|i| {
                        let rx = dispatcher.submit(long_poll(&format!("w{p}-{i}"), 100));
                        if dispatcher.pending_count() > CAPACITY {
                            over_capacity.fetch_add(1, Ordering::SeqCst);
                        }
                        rx
                    })
                    .collect();
                receivers
                    .into_iter()
                    .map(|rx| rx.blocking_recv().expect("response dropped"))
                    .collect::<Vec<_>>()
            })
        })
        .collect();

    let outcomes: Vec<FetchOutcome> = producers
        .into_iter()
        .flat_map(|h| h.join().unwrap())
        .collect();

    assert_eq!(outcomes.len(), PRODUCERS * PER_PRODUCER);
    assert_eq!(over_capacity.load(Ordering::SeqCst), 0);

    let timed_out = outcomes.iter().filter(|o| o.tasks().is_some()).count();
    let rejected = outcomes
        .iter()
        .filter(|o| o.error() == Some(&FetchError::TooManyRequests))
        .count();
    assert_eq!(timed_out + rejected, outcomes.len());
    assert!(timed_out >= CAPACITY);
    assert_eq!(dispatcher.remaining_capacity(), CAPACITY);
}
