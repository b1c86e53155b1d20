//! Shared daemon state.
//!
//! Engine calls are blocking, so every one of them runs on tokio's blocking
//! pool. The accumulation path (daily run, sync, settings) and the
//! rebalance path each hold their own lock: a manual trigger waits for a
//! scheduled run of the same path instead of interleaving with it.

use execution_engine::Engine;
use std::sync::{Arc, Mutex};
use thiserror::Error;
use trading::EngineError;

#[derive(Error, Debug)]
pub enum TaskError {
    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error("Engine task aborted: {0}")]
    Join(String),
}

#[derive(Clone)]
pub struct AppState {
    engine: Arc<Engine>,
    accumulation: Arc<Mutex<()>>,
    rebalance: Arc<Mutex<()>>,
}

impl AppState {
    pub fn new(engine: Arc<Engine>) -> Self {
        Self {
            engine,
            accumulation: Arc::new(Mutex::new(())),
            rebalance: Arc::new(Mutex::new(())),
        }
    }

    /// Runs `f` under the accumulation lock.
    pub async fn accumulation<T, F>(&self, f: F) -> Result<T, TaskError>
    where
        T: Send + 'static,
        F: FnOnce(&Engine) -> Result<T, EngineError> + Send + 'static,
    {
        run_locked(self.engine.clone(), Some(self.accumulation.clone()), f).await
    }

    /// Runs `f` under the rebalance lock.
    pub async fn rebalance<T, F>(&self, f: F) -> Result<T, TaskError>
    where
        T: Send + 'static,
        F: FnOnce(&Engine) -> Result<T, EngineError> + Send + 'static,
    {
        run_locked(self.engine.clone(), Some(self.rebalance.clone()), f).await
    }

    /// Runs a read-only call without taking either lock.
    pub async fn read<T, F>(&self, f: F) -> Result<T, TaskError>
    where
        T: Send + 'static,
        F: FnOnce(&Engine) -> Result<T, EngineError> + Send + 'static,
    {
        run_locked(self.engine.clone(), None, f).await
    }
}

async fn run_locked<T, F>(
    engine: Arc<Engine>,
    lock: Option<Arc<Mutex<()>>>,
    f: F,
) -> Result<T, TaskError>
where
    T: Send + 'static,
    F: FnOnce(&Engine) -> Result<T, EngineError> + Send + 'static,
{
    let task = tokio::task::spawn_blocking(move || {
        // The guarded value is `()`; a poisoned lock carries no broken state.
        let _guard = lock
            .as_ref()
            .map(|l| l.lock().unwrap_or_else(|poisoned| poisoned.into_inner()));
        f(&engine)
    });
    match task.await {
        Ok(result) => Ok(result?),
        Err(err) => Err(TaskError::Join(err.to_string())),
    }
}
