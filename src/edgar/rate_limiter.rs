use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use crate::core::{EngineError, Result};

/// Caps how many filings are in flight at once.
///
/// Clones share the same permits. Closing the pool makes every pending and
/// future `acquire` fail with [`EngineError::Cancelled`].
#[derive(Clone, Debug)]
pub struct WorkerPool {
    semaphore: Arc<Semaphore>,
}

impl WorkerPool {
    pub fn new(max_workers: usize) -> Self {
        WorkerPool {
            semaphore: Arc::new(Semaphore::new(max_workers.max(1))),
        }
    }

    pub async fn acquire(&self) -> Result<OwnedSemaphorePermit> {
        self.semaphore
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| EngineError::Cancelled)
    }

    pub fn available(&self) -> usize {
        self.semaphore.available_permits()
    }

    pub fn close(&self) {
        self.semaphore.close();
    }
}

impl Default for WorkerPool {
    fn default() -> Self {
        Self::new(4)
    }
}
