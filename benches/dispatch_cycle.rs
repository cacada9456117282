//! Dispatch cycle benchmarks.
//!
//! Measures one `acquire` pass over a populated registry and the arrival
//! paths that never park a request.

use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

use taskpoll_core::{
    DispatchConfig, Dispatcher, EngineRef, FetchRequest, InMemoryTaskStore, ManualClock,
    TopicFilter,
};

fn long_poll(worker: usize) -> FetchRequest {
    FetchRequest::new(format!("worker-{worker}"), 10)
        .topic(TopicFilter::new("bench", 60_000))
        .response_timeout(1_800_000)
}

fn parked_dispatcher(pending: usize) -> Dispatcher {
    let clock = Arc::new(ManualClock::fixed());
    let store = Arc::new(InMemoryTaskStore::new(EngineRef::default(), clock.clone()));
    let dispatcher = Dispatcher::with_clock(
        DispatchConfig { queue_capacity: pending.max(1), ..DispatchConfig::default() },
        store,
        clock,
    );
    for worker in 0..pending {
        let _ = dispatcher.submit(long_poll(worker));
    }
    dispatcher
}

fn bench_acquire(c: &mut Criterion) {
    let mut group = c.benchmark_group("acquire");

    for pending in [1usize, 50, 200] {
        let dispatcher = parked_dispatcher(pending);
        group.throughput(Throughput::Elements(pending as u64));
        group.bench_function(BenchmarkId::new("empty_store", pending), |b| {
            b.iter(|| black_box(dispatcher.acquire()))
        });
    }

    group.finish();
}

fn bench_arrival(c: &mut Criterion) {
    let mut group = c.benchmark_group("arrival");

    let dispatcher = parked_dispatcher(0);
    group.bench_function("answered_immediately", |b| {
        b.iter(|| black_box(dispatcher.submit(FetchRequest::new("worker", 10))))
    });

    let full = parked_dispatcher(1);
    group.bench_function("rejected_at_capacity", |b| {
        b.iter(|| black_box(full.submit(long_poll(1))))
    });

    group.finish();
}

criterion_group!(benches, bench_acquire, bench_arrival);
criterion_main!(benches);
