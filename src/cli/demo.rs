// Copyright 2024-2026 taskpoll Contributors
// SPDX-License-Identifier: Apache-2.0

//! `demo` subcommand.
//!
//! Starts a dispatcher over an in-memory store, lets a few workers
//! long-poll it while a producer trickles tasks in, then prints what each
//! worker received together with a health report.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;

use super::flag_value;
use crate::clock::SystemClock;
use crate::config::DispatchConfig;
use crate::health::HealthReport;
use crate::lock::EngineRouter;
use crate::request::{EngineRef, FetchRequest, TopicFilter};
use crate::response::FetchOutcome;
use crate::scheduler::Dispatcher;
use crate::store::{InMemoryTaskStore, NewTask};

const DEMO_TOPIC: &str = "demo";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DemoOptions {
    pub workers: usize,
    pub tasks: usize,
    pub response_timeout_ms: u64,
    pub task_delay_ms: u64,
}

impl Default for DemoOptions {
    fn default() -> Self {
        Self {
            workers: 3,
            tasks: 6,
            response_timeout_ms: 2_000,
            task_delay_ms: 250,
        }
    }
}

impl DemoOptions {
    /// `--workers N --tasks N --timeout MS --delay MS`; bad values keep
    /// their default.
    pub fn from_args(args: &[String]) -> Self {
        let defaults = Self::default();
        let parse = |name: &str| flag_value(args, name).and_then(|v| v.parse::<u64>().ok());
        Self {
            workers: parse("--workers")
                .and_then(|v| usize::try_from(v).ok())
                .filter(|v| *v > 0)
                .unwrap_or(defaults.workers),
            tasks: parse("--tasks")
                .and_then(|v| usize::try_from(v).ok())
                .unwrap_or(defaults.tasks),
            response_timeout_ms: parse("--timeout").unwrap_or(defaults.response_timeout_ms),
            task_delay_ms: parse("--delay").unwrap_or(defaults.task_delay_ms),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct WorkerSummary {
    pub worker_id: String,
    pub polls: usize,
    pub completed: Vec<String>,
    pub errors: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct DemoReport {
    pub workers: Vec<WorkerSummary>,
    pub remaining_tasks: usize,
    pub health: HealthReport,
}

/// Run the demo and print the report as JSON. Returns the exit code.
pub async fn run_demo(options: DemoOptions, config: DispatchConfig) -> i32 {
    match demo(options, config).await {
        Ok(report) => match serde_json::to_string_pretty(&report) {
            Ok(json) => {
                println!("{json}");
                0
            }
            Err(e) => {
                eprintln!("Failed to render report: {e}");
                1
            }
        },
        Err(e) => {
            eprintln!("Demo failed: {e}");
            1
        }
    }
}

async fn demo(
    options: DemoOptions,
    config: DispatchConfig,
) -> Result<DemoReport, Box<dyn std::error::Error>> {
    let engine = EngineRef::default();
    let store = Arc::new(InMemoryTaskStore::new(engine.clone(), Arc::new(SystemClock)));
    let router = EngineRouter::new().with_engine(engine, store.clone());
    let dispatcher = Arc::new(Dispatcher::new(config, Arc::new(router)));
    dispatcher.start()?;
    tracing::info!(workers = options.workers, tasks = options.tasks, "demo started");

    let workers: Vec<_> = (0..options.workers)
        .map(|i| {
            let dispatcher = Arc::clone(&dispatcher);
            let store = Arc::clone(&store);
            let timeout = options.response_timeout_ms;
            tokio::spawn(run_worker(format!("worker-{i}"), dispatcher, store, timeout))
        })
        .collect();

    let producer = {
        let store = Arc::clone(&store);
        let delay = Duration::from_millis(options.task_delay_ms);
        let count = options.tasks;
        tokio::spawn(async move {
            for n in 0..count {
                tokio::time::sleep(delay).await;
                let priority = i64::try_from(n % 3).unwrap_or_default();
                let id = store.add_task(
                    NewTask::new(DEMO_TOPIC)
                        .priority(priority)
                        .business_key(format!("order-{n}")),
                );
                tracing::debug!(task_id = %id, "produced task");
            }
        })
    };

    producer.await?;
    let mut summaries = Vec::with_capacity(workers.len());
    for worker in workers {
        summaries.push(worker.await?);
    }

    let health = dispatcher.health();
    let remaining_tasks = store.len();
    tokio::task::spawn_blocking(move || dispatcher.shutdown()).await?;

    Ok(DemoReport { workers: summaries, remaining_tasks, health })
}

/// Long-poll until a poll comes back empty or fails.
async fn run_worker(
    worker_id: String,
    dispatcher: Arc<Dispatcher>,
    store: Arc<InMemoryTaskStore>,
    response_timeout_ms: u64,
) -> WorkerSummary {
    let mut summary = WorkerSummary {
        worker_id: worker_id.clone(),
        polls: 0,
        completed: Vec::new(),
        errors: Vec::new(),
    };

    loop {
        let request = FetchRequest::new(worker_id.as_str(), 2)
            .use_priority(true)
            .topic(TopicFilter::new(DEMO_TOPIC, 30_000))
            .response_timeout(response_timeout_ms);
        summary.polls += 1;

        match dispatcher.submit(request).await {
            Ok(FetchOutcome::Tasks(tasks)) if tasks.is_empty() => break,
            Ok(FetchOutcome::Tasks(tasks)) => {
                for task in tasks {
                    match store.complete(&task.id, &worker_id) {
                        Ok(()) => summary.completed.push(task.id),
                        Err(e) => summary.errors.push(e.to_string()),
                    }
                }
            }
            Ok(FetchOutcome::Error(e)) => {
                summary.errors.push(e.to_string());
                break;
            }
            Ok(FetchOutcome::Cancelled) => break,
            Err(_) => {
                summary.errors.push("response dropped".to_string());
                break;
            }
        }
    }
    summary
}
