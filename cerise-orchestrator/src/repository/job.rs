//! Job registry contract and per-job locking

use async_trait::async_trait;
use cerise_core::domain::job::Job;
use std::collections::HashMap;
use std::ops::{Deref, DerefMut};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;

pub type RegistryResult<T> = std::result::Result<T, RegistryError>;

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("job not found: {0}")]
    NotFound(Uuid),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("corrupt record for job {id}: {message}")]
    Corrupt { id: String, message: String },
}

/// Exclusive access to one job
///
/// Holds the job's lock for as long as it lives, together with a working
/// copy of the record. Changes become visible to others only through
/// [`JobRegistry::commit`]; dropping the lease without committing discards
/// them.
pub struct JobLease {
    job: Job,
    _guard: OwnedMutexGuard<()>,
}

impl JobLease {
    pub(crate) fn new(job: Job, guard: OwnedMutexGuard<()>) -> Self {
        Self { job, _guard: guard }
    }

    pub fn job(&self) -> &Job {
        &self.job
    }
}

impl Deref for JobLease {
    type Target = Job;

    fn deref(&self) -> &Job {
        &self.job
    }
}

impl DerefMut for JobLease {
    fn deref_mut(&mut self) -> &mut Job {
        &mut self.job
    }
}

/// Table of per-job locks
#[derive(Default)]
pub(crate) struct JobLocks {
    locks: Mutex<HashMap<Uuid, Arc<Mutex<()>>>>,
}

impl JobLocks {
    /// Waits until the lock of job `id` is free and takes it
    pub(crate) async fn lock(&self, id: Uuid) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().await;
            Arc::clone(locks.entry(id).or_default())
        };
        lock.lock_owned().await
    }

    pub(crate) async fn forget(&self, id: Uuid) {
        self.locks.lock().await.remove(&id);
    }
}

/// Storage of job records
#[async_trait]
pub trait JobRegistry: Send + Sync {
    /// Stores a new job in state SUBMITTED and returns it
    async fn create_job(&self, name: &str, workflow: &str, local_input: &str)
    -> RegistryResult<Job>;

    /// Returns a snapshot of the job
    async fn get_job(&self, id: Uuid) -> RegistryResult<Job>;

    /// Returns snapshots of all jobs, oldest first
    async fn list_jobs(&self) -> RegistryResult<Vec<Job>>;

    /// Takes the job's lock, waiting for other holders to finish
    async fn acquire(&self, id: Uuid) -> RegistryResult<JobLease>;

    /// Writes the lease's working copy back to the registry
    async fn commit(&self, lease: &JobLease) -> RegistryResult<()>;

    /// Deletes the job record for good
    async fn remove(&self, lease: JobLease) -> RegistryResult<()>;
}
