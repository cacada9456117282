//! taskpoll core
//!
//! Long-poll coordinator for external task workers. A worker asks for up
//! to N tasks on some topics and is willing to wait. If nothing can be
//! locked right away the request is parked; a single dispatch thread keeps
//! retrying on behalf of every parked request and answers each one exactly
//! once: with the tasks it locked, with an empty list once the worker's
//! timeout passes, or with an error.
//!
//! # Design Principles
//!
//! - **Bounded**: a fixed admission capacity caps parked requests
//! - **Single consumer**: one dispatch thread, woken by producers
//! - **Isolated failures**: a lock-service error resolves only its request
//! - **Deterministic time**: all deadlines go through an injected [`Clock`]
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use taskpoll_core::{
//!     DispatchConfig, Dispatcher, EngineRef, FetchRequest, InMemoryTaskStore, NewTask,
//!     SystemClock, TopicFilter,
//! };
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let store = Arc::new(InMemoryTaskStore::new(EngineRef::default(), Arc::new(SystemClock)));
//! let dispatcher = Dispatcher::new(DispatchConfig::default(), store.clone());
//! dispatcher.start()?;
//!
//! let rx = dispatcher.submit(
//!     FetchRequest::new("worker-1", 5)
//!         .topic(TopicFilter::new("invoice", 60_000))
//!         .response_timeout(20_000),
//! );
//! store.add_task(NewTask::new("invoice"));
//! let outcome = rx.await?;
//! println!("{outcome:?}");
//! # Ok(())
//! # }
//! ```

pub mod cli;
pub mod clock;
pub mod config;
pub mod error;
pub mod health;
pub mod lifecycle;
pub mod lock;
pub mod request;
pub mod response;
pub mod scheduler;
pub mod signal;
pub mod store;
pub mod telemetry;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{ConfigSource, DispatchConfig, EnvConfig, EnvSource, TomlSource};
pub use error::{DispatchError, ErrorStatus, FetchError, LockServiceError};
pub use health::{HealthChecker, HealthReport, HealthState};
pub use lifecycle::LifecycleState;
pub use lock::{EngineRouter, LockService};
pub use request::{EngineRef, FetchRequest, LockedTask, TopicFilter};
pub use response::{AsyncResponse, ChannelResponse, FetchOutcome, OutcomeRx};
pub use scheduler::{Dispatcher, MAX_BACK_OFF};
pub use signal::{SignalError, SingleConsumerSignal};
pub use store::{InMemoryTaskStore, NewTask, StoreError};
