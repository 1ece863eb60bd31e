//! Bounded worker pool for store traffic.
//!
//! Archive fetches, proposed-record fetches and sign-and-store tasks run as
//! tokio tasks, at most `size` at a time. The pool is cheap to clone and is
//! meant to be shared by every execution in the process.

use crate::EngineError;
use futures_util::future::join_all;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::Semaphore;

#[derive(Clone)]
pub struct WorkerPool {
    permits: Arc<Semaphore>,
    size: usize,
}

impl WorkerPool {
    pub fn new(size: usize) -> Self {
        let size = size.max(1);
        Self {
            permits: Arc::new(Semaphore::new(size)),
            size,
        }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Permits not currently held by a task.
    pub fn available(&self) -> usize {
        self.permits.available_permits()
    }

    /// Run every task on the pool and wait for all of them.
    ///
    /// Results come back in submission order. The first error in that order
    /// is returned, after all tasks have finished.
    pub async fn run_all<T, F>(&self, tasks: impl IntoIterator<Item = F>) -> Result<Vec<T>, EngineError>
    where
        F: Future<Output = Result<T, EngineError>> + Send + 'static,
        T: Send + 'static,
    {
        let handles: Vec<_> = tasks
            .into_iter()
            .map(|task| {
                let permits = self.permits.clone();
                tokio::spawn(async move {
                    let _permit = permits
                        .acquire_owned()
                        .await
                        .map_err(|e| EngineError::Pool(e.to_string()))?;
                    task.await
                })
            })
            .collect();

        let mut results = Vec::with_capacity(handles.len());
        let mut first_error = None;
        for joined in join_all(handles).await {
            match joined {
                Ok(Ok(value)) => results.push(value),
                Ok(Err(e)) => {
                    first_error.get_or_insert(e);
                }
                Err(e) => {
                    first_error.get_or_insert(EngineError::Pool(e.to_string()));
                }
            }
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(results),
        }
    }
}
