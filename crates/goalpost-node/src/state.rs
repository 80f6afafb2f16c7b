//! Application state.

use std::sync::Arc;

use goalpost_core::Result;
use goalpost_engine::{EngineConfig, GoalCompletionListener, GoalEngine, TracingListener};
use goalpost_store::InMemoryGoalStore;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    /// The goal engine, backed by the in-memory store.
    pub engine: Arc<GoalEngine>,
}

impl AppState {
    /// Create the state with a fresh store and the tracing listener.
    pub fn new(config: EngineConfig) -> Result<Self> {
        let listeners: Vec<Arc<dyn GoalCompletionListener>> = vec![Arc::new(TracingListener)];
        let engine = GoalEngine::new(config, Arc::new(InMemoryGoalStore::new()), listeners)?;
        Ok(Self {
            engine: Arc::new(engine),
        })
    }
}
