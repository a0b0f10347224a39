//! In-memory job registry

use async_trait::async_trait;
use cerise_core::domain::job::Job;
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::job::{JobLease, JobLocks, JobRegistry, RegistryError, RegistryResult};

/// Job registry that keeps everything in memory
#[derive(Default)]
pub struct MemoryJobRegistry {
    jobs: RwLock<HashMap<Uuid, Job>>,
    locks: JobLocks,
}

impl MemoryJobRegistry {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl JobRegistry for MemoryJobRegistry {
    async fn create_job(
        &self,
        name: &str,
        workflow: &str,
        local_input: &str,
    ) -> RegistryResult<Job> {
        let job = Job::new(name.to_string(), workflow.to_string(), local_input.to_string());
        self.jobs.write().await.insert(job.id, job.clone());
        Ok(job)
    }

    async fn get_job(&self, id: Uuid) -> RegistryResult<Job> {
        self.jobs
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or(RegistryError::NotFound(id))
    }

    async fn list_jobs(&self) -> RegistryResult<Vec<Job>> {
        let mut jobs: Vec<Job> = self.jobs.read().await.values().cloned().collect();
        jobs.sort_by_key(|job| job.created_at);
        Ok(jobs)
    }

    async fn acquire(&self, id: Uuid) -> RegistryResult<JobLease> {
        // fail fast on unknown ids so they never get a lock entry
        self.get_job(id).await?;

        let guard = self.locks.lock(id).await;
        let job = self.get_job(id).await?;
        Ok(JobLease::new(job, guard))
    }

    async fn commit(&self, lease: &JobLease) -> RegistryResult<()> {
        let mut jobs = self.jobs.write().await;
        let stored = jobs
            .get_mut(&lease.id)
            .ok_or(RegistryError::NotFound(lease.id))?;
        *stored = lease.job().clone();
        Ok(())
    }

    async fn remove(&self, lease: JobLease) -> RegistryResult<()> {
        let id = lease.id;
        self.jobs
            .write()
            .await
            .remove(&id)
            .ok_or(RegistryError::NotFound(id))?;
        drop(lease);
        self.locks.forget(id).await;
        Ok(())
    }
}
