//! Health reporting through the dispatcher.

use std::sync::Arc;

use taskpoll_core::{
    DispatchConfig, Dispatcher, EngineRef, FetchRequest, HealthState, InMemoryTaskStore,
    LifecycleState, SystemClock, TopicFilter,
};

fn dispatcher(capacity: usize) -> Dispatcher {
    let store = Arc::new(InMemoryTaskStore::new(EngineRef::default(), Arc::new(SystemClock)));
    Dispatcher::new(
        DispatchConfig { queue_capacity: capacity, ..DispatchConfig::default() },
        store,
    )
}

fn park(dispatcher: &Dispatcher, worker: &str) {
    let _ = dispatcher.submit(
        FetchRequest::new(worker, 1)
            .topic(TopicFilter::new("idle", 1000))
            .response_timeout(60_000),
    );
}

#[test]
fn test_running_dispatcher_is_healthy_and_ready() {
    let d = dispatcher(10);
    d.start().unwrap();

    let report = d.health();
    assert_eq!(report.state, HealthState::Healthy);
    assert_eq!(report.lifecycle, LifecycleState::Running);
    assert!(report.ready);
    assert!(report.accepting_requests);
}

#[test]
fn test_saturated_dispatcher_is_degraded() {
    let d = dispatcher(2);
    d.start().unwrap();
    park(&d, "w1");
    park(&d, "w2");

    let report = d.health();
    assert_eq!(report.state, HealthState::Degraded);
    assert_eq!(report.pending_requests, 2);
    assert_eq!(report.remaining_capacity, 0);
    assert!(!report.ready);
}

#[test]
fn test_stopped_dispatcher_is_unhealthy() {
    let d = dispatcher(10);
    d.start().unwrap();
    d.shutdown();

    let report = d.health();
    assert_eq!(report.state, HealthState::Unhealthy);
    assert!(!report.accepting_requests);
}

#[test]
fn test_report_serializes_snake_case_lifecycle() {
    let d = dispatcher(10);
    let json = serde_json::to_value(d.health()).unwrap();
    assert_eq!(json["lifecycle"], "created");
    assert_eq!(json["state"], "Unhealthy");
    assert_eq!(json["pending_requests"], 0);
}
