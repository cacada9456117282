//! Fetch-and-lock wire types.
//!
//! A [`FetchRequest`] is what a worker posts; a [`LockedTask`] is what it
//! gets back. Both serialize as camelCase JSON.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Name of the process engine a request targets.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EngineRef(String);

impl EngineRef {
    pub const DEFAULT_NAME: &'static str = "default";

    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn name(&self) -> &str {
        &self.0
    }
}

impl Default for EngineRef {
    fn default() -> Self {
        Self::new(Self::DEFAULT_NAME)
    }
}

impl fmt::Display for EngineRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Per-topic fetch instruction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TopicFilter {
    pub topic_name: String,
    /// Lock duration in milliseconds.
    pub lock_duration: u64,
    /// Variable names to return; `None` returns all.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variables: Option<Vec<String>>,
    #[serde(default)]
    pub local_variables: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub business_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub process_definition_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub process_definition_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tenant_ids: Option<Vec<String>>,
    #[serde(default)]
    pub without_tenant_id: bool,
    /// Equality filter on process variables.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub process_variables: BTreeMap<String, Value>,
    #[serde(default)]
    pub deserialize_values: bool,
}

impl TopicFilter {
    pub fn new(topic_name: impl Into<String>, lock_duration: u64) -> Self {
        Self {
            topic_name: topic_name.into(),
            lock_duration,
            variables: None,
            local_variables: false,
            business_key: None,
            process_definition_id: None,
            process_definition_key: None,
            tenant_ids: None,
            without_tenant_id: false,
            process_variables: BTreeMap::new(),
            deserialize_values: false,
        }
    }

    pub fn variables<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.variables = Some(names.into_iter().map(Into::into).collect());
        self
    }

    pub fn business_key(mut self, key: impl Into<String>) -> Self {
        self.business_key = Some(key.into());
        self
    }

    pub fn process_definition_key(mut self, key: impl Into<String>) -> Self {
        self.process_definition_key = Some(key.into());
        self
    }

    pub fn tenant_ids<I, S>(mut self, tenants: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tenant_ids = Some(tenants.into_iter().map(Into::into).collect());
        self
    }

    pub fn without_tenant_id(mut self) -> Self {
        self.without_tenant_id = true;
        self
    }

    pub fn process_variable(mut self, name: impl Into<String>, value: Value) -> Self {
        self.process_variables.insert(name.into(), value);
        self
    }
}

/// A worker's fetch-and-lock request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FetchRequest {
    pub worker_id: String,
    pub max_tasks: usize,
    #[serde(default)]
    pub use_priority: bool,
    /// Long-poll timeout in milliseconds. Absent means answer immediately.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub async_response_timeout: Option<u64>,
    #[serde(default)]
    pub topics: Vec<TopicFilter>,
    #[serde(default)]
    pub engine: EngineRef,
}

impl FetchRequest {
    pub fn new(worker_id: impl Into<String>, max_tasks: usize) -> Self {
        Self {
            worker_id: worker_id.into(),
            max_tasks,
            use_priority: false,
            async_response_timeout: None,
            topics: Vec::new(),
            engine: EngineRef::default(),
        }
    }

    pub fn topic(mut self, filter: TopicFilter) -> Self {
        self.topics.push(filter);
        self
    }

    pub fn use_priority(mut self, use_priority: bool) -> Self {
        self.use_priority = use_priority;
        self
    }

    pub fn response_timeout(mut self, millis: u64) -> Self {
        self.async_response_timeout = Some(millis);
        self
    }

    pub fn engine(mut self, engine: EngineRef) -> Self {
        self.engine = engine;
        self
    }

    pub fn topic_names(&self) -> impl Iterator<Item = &str> {
        self.topics.iter().map(|t| t.topic_name.as_str())
    }
}

/// A task locked to a worker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LockedTask {
    pub id: String,
    pub topic_name: String,
    pub worker_id: String,
    pub lock_expiration_time: DateTime<Utc>,
    pub priority: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retries: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub business_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub process_instance_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub process_definition_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tenant_id: Option<String>,
    #[serde(default)]
    pub variables: BTreeMap<String, Value>,
}
