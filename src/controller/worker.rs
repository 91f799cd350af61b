//! Single background worker admission

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use crate::errors::{Result, WizardError};

/// Capacity-1 worker. A job holds the permit for its whole lifetime.
#[derive(Clone)]
pub struct StageWorker {
    permits: Arc<Semaphore>,
    idle_wait: Duration,
}

impl StageWorker {
    pub fn new(idle_wait: Duration) -> Self {
        Self {
            permits: Arc::new(Semaphore::new(1)),
            idle_wait,
        }
    }

    pub fn is_idle(&self) -> bool {
        self.permits.available_permits() > 0
    }

    /// Wait for the worker to go idle, at most `idle_wait`
    pub async fn admit(&self, what: &str) -> Result<OwnedSemaphorePermit> {
        if !self.is_idle() {
            log::debug!("Waiting for worker before {}", what);
        }
        match tokio::time::timeout(self.idle_wait, self.permits.clone().acquire_owned()).await {
            Ok(Ok(permit)) => Ok(permit),
            Ok(Err(_closed)) => Err(WizardError::WorkerStalled(format!(
                "worker shut down before {}",
                what
            ))),
            Err(_elapsed) => {
                log::error!(
                    "Worker still busy after {:?}, refusing to start {}",
                    self.idle_wait,
                    what
                );
                Err(WizardError::WorkerStalled(format!(
                    "worker not idle after {:?} (requested {})",
                    self.idle_wait, what
                )))
            }
        }
    }
}
