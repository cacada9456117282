//! Cross-thread tests for the single-consumer signal.

use std::sync::mpsc;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use taskpoll_core::{SignalError, SingleConsumerSignal, MAX_BACK_OFF};

#[test]
fn test_signal_from_producer_wakes_consumer() {
    let (ready_tx, ready_rx) = mpsc::channel();
    let (signal_tx, signal_rx) = mpsc::channel::<Arc<SingleConsumerSignal>>();

    let consumer = thread::spawn(move || {
        let signal = Arc::new(SingleConsumerSignal::for_current_thread());
        signal_tx.send(Arc::clone(&signal)).unwrap();
        ready_rx.recv().unwrap();
        let start = Instant::now();
        signal.wait_timeout(MAX_BACK_OFF);
        start.elapsed()
    });

    let signal = signal_rx.recv().unwrap();
    ready_tx.send(()).unwrap();
    thread::sleep(Duration::from_millis(20));
    signal.signal();

    let waited = consumer.join().unwrap();
    assert!(waited < Duration::from_secs(5));
}

#[test]
fn test_many_producers_collapse_into_one_wakeup() {
    let signal = Arc::new(SingleConsumerSignal::for_current_thread());
    let producers: Vec<_> = (0..8)
        .map(|_| {
            let signal = Arc::clone(&signal);
            thread::spawn(move || signal.signal())
        })
        .collect();
    for p in producers {
        p.join().unwrap();
    }

    signal.wait_timeout(Duration::from_secs(5));
    assert!(!signal.is_pending());

    let start = Instant::now();
    signal.wait_timeout(Duration::from_millis(30));
    assert!(start.elapsed() >= Duration::from_millis(30));
}

#[test]
fn test_non_consumer_wait_panics() {
    let signal = Arc::new(SingleConsumerSignal::for_current_thread());
    let foreign = Arc::clone(&signal);

    let result = thread::spawn(move || foreign.wait_timeout(Duration::from_millis(1))).join();
    assert!(result.is_err());

    signal.signal();
    signal.wait_timeout(Duration::from_millis(1));
}

#[test]
fn test_bind_requires_consumer() {
    assert!(matches!(SingleConsumerSignal::bind(None), Err(SignalError::NoConsumer)));
}
