//! Job poller
//!
//! Lists the registry every cycle and hands each job that is not yet done
//! to the runner in its own task. A job whose task from an earlier cycle is
//! still going is skipped, so a job is never processed by two tasks at once,
//! and a slow job never holds up the others. When there are more jobs than
//! permits, the jobs visited least recently go first.

use anyhow::{Context, Result};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::task::JoinHandle;
use tokio::time::{self, Duration};
use tracing::{debug, error, info};
use uuid::Uuid;

use crate::repository::JobRegistry;
use crate::service::{JobRunner, needs_attention};

type InFlightSet = Arc<Mutex<HashSet<Uuid>>>;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Marks a job as being processed until dropped
struct InFlight {
    job_id: Uuid,
    jobs: InFlightSet,
}

impl InFlight {
    /// Returns `None` if the job is already being processed
    fn enter(jobs: &InFlightSet, job_id: Uuid) -> Option<Self> {
        if !lock(jobs).insert(job_id) {
            return None;
        }
        Some(Self {
            job_id,
            jobs: Arc::clone(jobs),
        })
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        lock(&self.jobs).remove(&self.job_id);
    }
}

/// Cycle in which each job was last handed to the runner
#[derive(Default)]
struct Visits {
    cycle: u64,
    last: HashMap<Uuid, u64>,
}

pub struct JobPoller {
    refresh: Duration,
    registry: Arc<dyn JobRegistry>,
    runner: Arc<JobRunner>,
    semaphore: Arc<Semaphore>,
    in_flight: InFlightSet,
    visits: Mutex<Visits>,
}

impl JobPoller {
    pub fn new(
        refresh: Duration,
        max_parallel_jobs: usize,
        registry: Arc<dyn JobRegistry>,
        runner: Arc<JobRunner>,
    ) -> Self {
        Self {
            refresh,
            registry,
            runner,
            semaphore: Arc::new(Semaphore::new(max_parallel_jobs)),
            in_flight: InFlightSet::default(),
            visits: Mutex::new(Visits::default()),
        }
    }

    /// Starts the polling loop
    pub async fn run(&self) -> Result<()> {
        info!("Starting job poller (interval: {:?})", self.refresh);

        let mut interval = time::interval(self.refresh);
        interval.set_missed_tick_behavior(time::MissedTickBehavior::Delay);

        loop {
            interval.tick().await;

            debug!("Polling jobs");

            match self.poll_once().await {
                Ok(handles) => {
                    if !handles.is_empty() {
                        debug!("Dispatched {} job(s) this cycle", handles.len());
                    }
                }
                Err(e) => {
                    error!("Error during poll cycle: {:#}", e);
                }
            }
        }
    }

    /// Performs a single poll cycle.
    ///
    /// Returns the handles of the tasks started; they run on whether or not
    /// the caller waits for them.
    pub async fn poll_once(&self) -> Result<Vec<JoinHandle<()>>> {
        let jobs = self
            .registry
            .list_jobs()
            .await
            .context("Failed to list jobs")?;

        let (cycle, order) = self.visiting_order(
            jobs.iter()
                .filter(|job| needs_attention(job))
                .map(|job| job.id)
                .collect(),
        );

        let mut handles = Vec::new();

        for job_id in order {
            let Some(in_flight) = InFlight::enter(&self.in_flight, job_id) else {
                debug!("Job {} is still being processed", job_id);
                continue;
            };

            // at capacity, the rest are picked up first next cycle
            let Ok(permit) = self.semaphore.clone().try_acquire_owned() else {
                debug!("Max parallel jobs reached, deferring remaining jobs");
                break;
            };

            lock(&self.visits).last.insert(job_id, cycle);
            handles.push(self.spawn_job_task(job_id, permit, in_flight));
        }

        Ok(handles)
    }

    /// Sorts `candidates` so that the jobs visited least recently come
    /// first, keeping registry order among equals
    fn visiting_order(&self, mut candidates: Vec<Uuid>) -> (u64, Vec<Uuid>) {
        let mut visits = lock(&self.visits);
        visits.cycle += 1;

        let live: HashSet<Uuid> = candidates.iter().copied().collect();
        visits.last.retain(|job_id, _| live.contains(job_id));

        candidates.sort_by_key(|job_id| visits.last.get(job_id).copied().unwrap_or(0));
        (visits.cycle, candidates)
    }

    fn spawn_job_task(
        &self,
        job_id: Uuid,
        permit: OwnedSemaphorePermit,
        in_flight: InFlight,
    ) -> JoinHandle<()> {
        let runner = Arc::clone(&self.runner);

        tokio::spawn(async move {
            let _permit = permit;
            let _in_flight = in_flight;
            if let Err(e) = runner.process(job_id).await {
                error!("Failed to process job {}: {}", job_id, e);
            }
        })
    }
}
