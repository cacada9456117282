//! In-memory lock service.
//!
//! Holds tasks for a single engine and implements fetch-and-lock with the
//! same selection rules a persistent engine would use. All selection and
//! locking happens under one mutex, so a task can never be handed to two
//! workers at the same time.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use serde_json::Value;
use thiserror::Error;
use uuid::Uuid;

use crate::clock::Clock;
use crate::error::LockServiceError;
use crate::lock::LockService;
use crate::request::{EngineRef, FetchRequest, LockedTask, TopicFilter};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("Task {0} not found")]
    NotFound(String),

    #[error("Task {task_id} is not locked by worker {worker_id}")]
    NotLockedBy { task_id: String, worker_id: String },
}

/// A task to publish into the store.
#[derive(Debug, Clone, Default)]
pub struct NewTask {
    pub topic_name: String,
    pub priority: i64,
    pub business_key: Option<String>,
    pub process_definition_id: Option<String>,
    pub process_definition_key: Option<String>,
    pub process_instance_id: Option<String>,
    pub tenant_id: Option<String>,
    pub retries: Option<u32>,
    pub variables: BTreeMap<String, Value>,
}

impl NewTask {
    pub fn new(topic_name: impl Into<String>) -> Self {
        Self { topic_name: topic_name.into(), ..Self::default() }
    }

    pub fn priority(mut self, priority: i64) -> Self {
        self.priority = priority;
        self
    }

    pub fn business_key(mut self, key: impl Into<String>) -> Self {
        self.business_key = Some(key.into());
        self
    }

    pub fn tenant(mut self, tenant_id: impl Into<String>) -> Self {
        self.tenant_id = Some(tenant_id.into());
        self
    }

    pub fn process_definition_key(mut self, key: impl Into<String>) -> Self {
        self.process_definition_key = Some(key.into());
        self
    }

    pub fn variable(mut self, name: impl Into<String>, value: Value) -> Self {
        self.variables.insert(name.into(), value);
        self
    }
}

#[derive(Debug)]
struct Lock {
    worker_id: String,
    expires_at: DateTime<Utc>,
}

#[derive(Debug)]
struct StoredTask {
    id: String,
    sequence: u64,
    task: NewTask,
    lock: Option<Lock>,
}

impl StoredTask {
    fn is_available(&self, now: DateTime<Utc>) -> bool {
        self.lock.as_ref().map_or(true, |l| l.expires_at <= now)
    }

    fn matches(&self, filter: &TopicFilter) -> bool {
        let task = &self.task;
        if task.topic_name != filter.topic_name {
            return false;
        }
        if let Some(key) = &filter.business_key {
            if task.business_key.as_ref() != Some(key) {
                return false;
            }
        }
        if let Some(id) = &filter.process_definition_id {
            if task.process_definition_id.as_ref() != Some(id) {
                return false;
            }
        }
        if let Some(key) = &filter.process_definition_key {
            if task.process_definition_key.as_ref() != Some(key) {
                return false;
            }
        }
        if !self.matches_tenant(filter) {
            return false;
        }
        filter
            .process_variables
            .iter()
            .all(|(name, value)| task.variables.get(name) == Some(value))
    }

    fn matches_tenant(&self, filter: &TopicFilter) -> bool {
        match (&self.task.tenant_id, &filter.tenant_ids) {
            (None, _) if filter.without_tenant_id => true,
            (Some(tenant), Some(allowed)) => allowed.contains(tenant),
            (_, None) => !filter.without_tenant_id,
            (None, Some(_)) => false,
        }
    }

    fn lock_to(&mut self, worker_id: &str, filter: &TopicFilter, now: DateTime<Utc>) -> LockedTask {
        let lock_ms = i64::try_from(filter.lock_duration).unwrap_or(i64::MAX);
        let expires_at = now
            .checked_add_signed(Duration::milliseconds(lock_ms))
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        self.lock = Some(Lock { worker_id: worker_id.to_string(), expires_at });

        let variables = match &filter.variables {
            Some(names) => self
                .task
                .variables
                .iter()
                .filter(|(name, _)| names.contains(name))
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
            None => self.task.variables.clone(),
        };

        LockedTask {
            id: self.id.clone(),
            topic_name: self.task.topic_name.clone(),
            worker_id: worker_id.to_string(),
            lock_expiration_time: expires_at,
            priority: self.task.priority,
            retries: self.task.retries,
            business_key: self.task.business_key.clone(),
            process_instance_id: self.task.process_instance_id.clone(),
            process_definition_key: self.task.process_definition_key.clone(),
            tenant_id: self.task.tenant_id.clone(),
            variables,
        }
    }
}

#[derive(Debug, Default)]
struct StoreState {
    tasks: Vec<StoredTask>,
    next_sequence: u64,
}

/// Task store serving one engine.
pub struct InMemoryTaskStore {
    engine: EngineRef,
    clock: Arc<dyn Clock>,
    state: Mutex<StoreState>,
}

impl InMemoryTaskStore {
    pub fn new(engine: EngineRef, clock: Arc<dyn Clock>) -> Self {
        Self { engine, clock, state: Mutex::new(StoreState::default()) }
    }

    pub fn engine(&self) -> &EngineRef {
        &self.engine
    }

    /// Publish a task and return its id.
    pub fn add_task(&self, task: NewTask) -> String {
        let id = Uuid::new_v4().to_string();
        let mut state = self.state.lock();
        let sequence = state.next_sequence;
        state.next_sequence += 1;
        state.tasks.push(StoredTask { id: id.clone(), sequence, task, lock: None });
        id
    }

    /// Remove a task locked by `worker_id`.
    pub fn complete(&self, task_id: &str, worker_id: &str) -> Result<(), StoreError> {
        let now = self.clock.now();
        let mut state = self.state.lock();
        let index = state
            .tasks
            .iter()
            .position(|t| t.id == task_id)
            .ok_or_else(|| StoreError::NotFound(task_id.to_string()))?;
        let held = state.tasks[index]
            .lock
            .as_ref()
            .is_some_and(|l| l.worker_id == worker_id && l.expires_at > now);
        if !held {
            return Err(StoreError::NotLockedBy {
                task_id: task_id.to_string(),
                worker_id: worker_id.to_string(),
            });
        }
        state.tasks.remove(index);
        Ok(())
    }

    /// Release a lock so the task can be fetched again.
    pub fn unlock(&self, task_id: &str) -> Result<(), StoreError> {
        let mut state = self.state.lock();
        let task = state
            .tasks
            .iter_mut()
            .find(|t| t.id == task_id)
            .ok_or_else(|| StoreError::NotFound(task_id.to_string()))?;
        task.lock = None;
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.state.lock().tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Tasks currently holding an unexpired lock.
    pub fn locked_count(&self) -> usize {
        let now = self.clock.now();
        self.state.lock().tasks.iter().filter(|t| !t.is_available(now)).count()
    }
}

impl LockService for InMemoryTaskStore {
    fn fetch_and_lock(&self, request: &FetchRequest) -> Result<Vec<LockedTask>, LockServiceError> {
        if request.engine != self.engine {
            return Err(LockServiceError::UnknownEngine(request.engine.name().to_string()));
        }
        if request.max_tasks == 0 || request.topics.is_empty() {
            return Ok(Vec::new());
        }

        let now = self.clock.now();
        let mut state = self.state.lock();

        // (task index, matching filter index)
        let mut candidates: Vec<(usize, usize)> = state
            .tasks
            .iter()
            .enumerate()
            .filter(|(_, t)| t.is_available(now))
            .filter_map(|(i, t)| {
                request.topics.iter().position(|f| t.matches(f)).map(|f| (i, f))
            })
            .collect();

        if request.use_priority {
            candidates.sort_by(|(a, _), (b, _)| {
                let (a, b) = (&state.tasks[*a], &state.tasks[*b]);
                b.task.priority.cmp(&a.task.priority).then(a.sequence.cmp(&b.sequence))
            });
        } else {
            candidates.sort_by_key(|(i, _)| state.tasks[*i].sequence);
        }
        candidates.truncate(request.max_tasks);

        let locked = candidates
            .into_iter()
            .map(|(i, f)| state.tasks[i].lock_to(&request.worker_id, &request.topics[f], now))
            .collect();
        Ok(locked)
    }
}
