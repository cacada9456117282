//! Lock service seam.
//!
//! The dispatcher never looks for tasks itself. It asks a [`LockService`]
//! to select and exclusively lock matching tasks on behalf of a worker.

use std::collections::HashMap;
use std::sync::Arc;

use crate::error::LockServiceError;
use crate::request::{EngineRef, FetchRequest, LockedTask};

/// Selects and locks up to `request.max_tasks` matching tasks for
/// `request.worker_id` on `request.engine`.
///
/// Implementations must never lock one task to two workers at once, and
/// must order by priority then creation when `request.use_priority` is set.
pub trait LockService: Send + Sync {
    fn fetch_and_lock(&self, request: &FetchRequest) -> Result<Vec<LockedTask>, LockServiceError>;
}

impl<F> LockService for F
where
    F: Fn(&FetchRequest) -> Result<Vec<LockedTask>, LockServiceError> + Send + Sync,
{
    fn fetch_and_lock(&self, request: &FetchRequest) -> Result<Vec<LockedTask>, LockServiceError> {
        self(request)
    }
}

/// Routes each request to the lock service of the engine it names.
#[derive(Default, Clone)]
pub struct EngineRouter {
    engines: HashMap<EngineRef, Arc<dyn LockService>>,
}

impl EngineRouter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, engine: EngineRef, service: Arc<dyn LockService>) -> &mut Self {
        self.engines.insert(engine, service);
        self
    }

    pub fn with_engine(mut self, engine: EngineRef, service: Arc<dyn LockService>) -> Self {
        self.register(engine, service);
        self
    }
}

impl LockService for EngineRouter {
    fn fetch_and_lock(&self, request: &FetchRequest) -> Result<Vec<LockedTask>, LockServiceError> {
        let service = self
            .engines
            .get(&request.engine)
            .ok_or_else(|| LockServiceError::UnknownEngine(request.engine.name().to_string()))?;
        service.fetch_and_lock(request)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn failing(engine: &'static str) -> Arc<dyn LockService> {
        Arc::new(move |_: &FetchRequest| -> Result<Vec<LockedTask>, LockServiceError> {
            Err(LockServiceError::engine(engine, "boom"))
        })
    }

    #[test]
    fn routes_by_engine_name() {
        let router = EngineRouter::new()
            .with_engine(EngineRef::new("a"), failing("a"))
            .with_engine(EngineRef::new("b"), failing("b"));

        let req = FetchRequest::new("w", 1).engine(EngineRef::new("b"));
        let err = router.fetch_and_lock(&req).unwrap_err();
        assert_eq!(err, LockServiceError::engine("b", "boom"));
    }

    #[test]
    fn unknown_engine_is_an_error() {
        let router = EngineRouter::new();
        let err = router.fetch_and_lock(&FetchRequest::new("w", 1)).unwrap_err();
        assert_eq!(err, LockServiceError::UnknownEngine("default".into()));
    }
}
