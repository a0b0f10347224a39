//! Job runner
//!
//! Moves one job one step further through its lifecycle per call. All
//! decisions are made on a fresh snapshot of the job, and every change is
//! written under the job's lease, so cancellation requests coming in from
//! the REST API are never lost.

use cerise_core::cwl::{get_cwltool_result, get_required_num_cores};
use cerise_core::domain::job::Job;
use cerise_core::domain::state::{Intent, JobState, Outcome};
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::error::{BackendError, BackendResult};
use super::job_files::RemoteJobFiles;
use super::local_files::LocalFiles;
use super::remote_api::RemoteApi;
use crate::config::Config;
use crate::remote::{JobDescription, JobHandle, Scheduler, SchedulerError, SchedulerStatus};
use crate::repository::{JobRegistry, RegistryError};

pub struct JobRunner {
    registry: Arc<dyn JobRegistry>,
    scheduler: Arc<dyn Scheduler>,
    remote_api: Arc<RemoteApi>,
    job_files: Arc<RemoteJobFiles>,
    local_files: Arc<LocalFiles>,
    cwl_runner: String,
    queue_name: Option<String>,
    cores_per_node: u64,
    slots_per_node: u64,
}

/// Whether the poller should hand this job to the runner at all
pub fn needs_attention(job: &Job) -> bool {
    !job.state.is_terminal() || job.please_delete
}

/// Number of nodes to ask for so that `cores` cores are available
fn nodes_for(cores: u64, cores_per_node: u64) -> u64 {
    if cores == 0 {
        1
    } else {
        cores.div_ceil(cores_per_node)
    }
}

impl JobRunner {
    pub fn new(
        config: &Config,
        registry: Arc<dyn JobRegistry>,
        scheduler: Arc<dyn Scheduler>,
        remote_api: Arc<RemoteApi>,
        job_files: Arc<RemoteJobFiles>,
        local_files: Arc<LocalFiles>,
    ) -> Self {
        let cwl_runner = remote_api.translate_runner_location(&config.cwl_runner);
        info!("Using CWL runner {}", cwl_runner);
        Self {
            registry,
            scheduler,
            remote_api,
            job_files,
            local_files,
            cwl_runner,
            queue_name: config.queue_name.clone(),
            cores_per_node: config.cores_per_node,
            slots_per_node: config.slots_per_node,
        }
    }

    /// Performs the next step for job `id`
    pub async fn process(&self, id: Uuid) -> BackendResult<()> {
        let job = match self.registry.get_job(id).await {
            Ok(job) => job,
            Err(RegistryError::NotFound(_)) => return Ok(()),
            Err(e) => return Err(e.into()),
        };

        match job.state {
            state if state.is_cancel_requested() => self.halt(id).await,
            JobState::Submitted => {
                if self.start_staging(id).await? {
                    self.stage_and_submit(id).await?;
                }
                Ok(())
            }
            JobState::StagingIn => self.stage_and_submit(id).await,
            JobState::Waiting | JobState::Running => self.poll(id).await,
            JobState::Finished | JobState::StagingOut => self.finish(id).await,
            state if state.is_terminal() && job.please_delete => self.reap(id).await,
            _ => Ok(()),
        }
    }

    /// Applies `change` under the job's lease, committing if it returns true
    async fn update<F>(&self, id: Uuid, change: F) -> BackendResult<bool>
    where
        F: FnOnce(&mut Job) -> bool + Send,
    {
        let mut lease = self.registry.acquire(id).await?;
        let changed = change(&mut *lease);
        if changed {
            self.registry.commit(&lease).await?;
        }
        Ok(changed)
    }

    /// Transition for `intent`, logging `message` to the job if it fires
    async fn transition(&self, id: Uuid, intent: Intent, message: String) -> BackendResult<bool> {
        self.update(id, move |job| {
            let fired = job.apply(intent);
            if fired {
                job.info(message);
            }
            fired
        })
        .await
    }

    async fn start_staging(&self, id: Uuid) -> BackendResult<bool> {
        self.transition(id, Intent::StartStaging, "Staging job".to_string())
            .await
    }

    async fn stage_and_submit(&self, id: Uuid) -> BackendResult<()> {
        match self.try_stage_and_submit(id).await {
            Ok(()) => Ok(()),
            Err(e) if e.is_not_found() => Ok(()),
            Err(e) => self.abort(id, &e).await,
        }
    }

    async fn try_stage_and_submit(&self, id: Uuid) -> BackendResult<()> {
        let job = self.registry.get_job(id).await?;

        let workflow = self.local_files.resolve_workflow(&job.workflow).await?;
        let translated = self.remote_api.translate_workflow(&workflow)?;
        let num_cores = get_required_num_cores(&workflow)?;
        let input_files = self.local_files.resolve_input(&job.local_input).await?;

        self.job_files
            .stage_job(id, &input_files, &translated)
            .await?;

        // a cancellation may have come in while staging
        let job = self.registry.get_job(id).await?;
        if job.state != JobState::StagingIn {
            debug!("Job {} left staging as {}, not submitting", id, job.state);
            return Ok(());
        }

        let description = self.runner_description(&job, num_cores);
        let handle = self.scheduler.submit(&description).await?;
        info!("Submitted job {} as {}", id, handle.as_str());

        // the handle is recorded even if the job was cancelled meanwhile,
        // so the cancellation can stop it
        self.update(id, move |job| {
            job.info(format!("Submitted to scheduler as {}", handle.as_str()));
            job.remote_job_id = Some(handle.0);
            job.apply(Intent::Enqueued);
            true
        })
        .await?;
        Ok(())
    }

    fn runner_description(&self, job: &Job, num_cores: u64) -> JobDescription {
        JobDescription {
            name: format!("cerise-{}", job.id),
            command: self.cwl_runner.clone(),
            arguments: vec![
                job.remote_workflow_path.clone(),
                job.remote_input_path.clone(),
            ],
            working_directory: job.remote_workdir_path.clone(),
            stdout_file: Some(job.remote_stdout_path.clone()),
            stderr_file: Some(job.remote_stderr_path.clone()),
            system_out_file: Some(job.remote_system_out_path.clone()),
            system_err_file: Some(job.remote_system_err_path.clone()),
            queue_name: self.queue_name.clone(),
            num_nodes: nodes_for(num_cores, self.cores_per_node),
            processes_per_node: self.slots_per_node,
            ..Default::default()
        }
    }

    async fn poll(&self, id: Uuid) -> BackendResult<()> {
        let job = self.registry.get_job(id).await?;
        let Some(handle) = job.remote_job_id.clone().map(JobHandle) else {
            let err = BackendError::Configuration(format!("job {} has no scheduler handle", id));
            return self.abort(id, &err).await;
        };

        let status = match self.scheduler.status(&handle).await {
            Ok(status) => status,
            Err(SchedulerError::UnknownJob(_)) => {
                // the scheduler forgot about it; whatever it left behind decides
                warn!("Scheduler no longer knows {}, assuming it finished", handle.as_str());
                SchedulerStatus::Done { exit_code: None }
            }
            Err(e) => return Err(e.into()),
        };

        self.job_files.update_job(id).await?;

        match status {
            SchedulerStatus::Queued => Ok(()),
            SchedulerStatus::Running => {
                self.transition(id, Intent::Started, "Job started".to_string())
                    .await?;
                Ok(())
            }
            SchedulerStatus::Done { exit_code } => {
                let message = match exit_code {
                    Some(code) => format!("Job finished with exit code {}", code),
                    None => "Job finished".to_string(),
                };
                if self.transition(id, Intent::Completed, message).await? {
                    self.finish(id).await?;
                }
                Ok(())
            }
        }
    }

    /// Classifies the run, retrieves its output and concludes the job
    async fn finish(&self, id: Uuid) -> BackendResult<()> {
        let job = self.registry.get_job(id).await?;
        let outcome = get_cwltool_result(&job.remote_error);

        let destaging = self
            .update(id, |job| {
                if job.state == JobState::StagingOut {
                    return true;
                }
                let fired = job.apply(Intent::StartDestaging);
                if fired {
                    job.info("Retrieving output");
                }
                fired
            })
            .await?;
        if !destaging {
            return Ok(());
        }

        match self.collect_output(id).await {
            Ok(local_output) => {
                // a cancellation that came in meanwhile wins
                self.update(id, move |job| {
                    if !job.apply(Intent::Conclude(outcome)) {
                        return false;
                    }
                    job.local_output = local_output;
                    job.info(format!("Job done: {}", job.state));
                    true
                })
                .await?;
                Ok(())
            }
            Err(e) if e.is_not_found() => Ok(()),
            Err(e) if outcome != Outcome::Success => {
                // the run failed anyway; missing output is a consequence
                let message = format!("Could not retrieve output: {}", e);
                self.update(id, move |job| {
                    job.warn(message);
                    job.apply(Intent::Conclude(outcome));
                    true
                })
                .await?;
                Ok(())
            }
            Err(e) => self.abort(id, &e).await,
        }
    }

    async fn collect_output(&self, id: Uuid) -> BackendResult<String> {
        let files = self.job_files.destage_job_output(id).await?;
        let job = self.registry.get_job(id).await?;
        if job.remote_output.trim().is_empty() {
            return Ok(String::new());
        }
        self.local_files
            .publish_job_output(id, &job.remote_output, &files)
            .await
    }

    /// Stops whatever is running for a cancel-requested job
    async fn halt(&self, id: Uuid) -> BackendResult<()> {
        let job = self.registry.get_job(id).await?;

        if let Some(handle) = job.remote_job_id.clone().map(JobHandle) {
            match self.scheduler.cancel(&handle).await {
                Ok(()) | Err(SchedulerError::UnknownJob(_)) => {}
                Err(e) => warn!("Failed to cancel {} for job {}: {}", handle.as_str(), id, e),
            }
        }

        if self
            .transition(id, Intent::Halted, "Job cancelled".to_string())
            .await?
        {
            info!("Job {} cancelled", id);
        }
        Ok(())
    }

    /// Removes every trace of a job that is done and marked for deletion
    async fn reap(&self, id: Uuid) -> BackendResult<()> {
        self.job_files.delete_job(id).await?;
        self.local_files.delete_output_dir(id).await?;

        let lease = self.registry.acquire(id).await?;
        if lease.state.is_terminal() && lease.please_delete {
            self.registry.remove(lease).await?;
            info!("Job {} deleted", id);
        }
        Ok(())
    }

    /// Ends a job that ran into `err` during a busy step
    async fn abort(&self, id: Uuid, err: &BackendError) -> BackendResult<()> {
        let outcome = err.outcome();
        error!("Job {} failed: {}", id, err);

        let message = err.to_string();
        self.update(id, move |job| {
            job.error(message);
            job.apply(Intent::Abort(outcome));
            true
        })
        .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::{CopyOptions, FsResult, LocalFileSystem, LocalScheduler, RemoteFileSystem};
    use crate::repository::MemoryJobRegistry;
    use async_trait::async_trait;
    use serde_json::{Value, json};
    use std::os::unix::fs::PermissionsExt;
    use std::path::{Path, PathBuf};
    use std::time::Duration;

    /// Stand-in for a CWL runner: copies the first input to the work
    /// directory, prints an output binding and reports success.
    const FAKE_RUNNER: &str = r#"#!/bin/sh
workflow="$1"
input="$2"
src=$(sed -n 's/.*"location":"\([^"]*\)".*/\1/p' "$input")
cp "$src" result.txt
echo "{\"result\": {\"class\": \"File\", \"location\": \"file://$PWD/result.txt\"}}"
echo "Final process status is success" >&2
"#;

    const FAILING_RUNNER: &str = r#"#!/bin/sh
echo "Final process status is permanentFail" >&2
exit 1
"#;

    const SLOW_RUNNER: &str = "#!/bin/sh\nsleep 30\n";

    const WORKFLOW: &str = "cwlVersion: v1.0\nclass: Workflow\nsteps:\n  copy:\n    run: test/copy.cwl\n";

    struct Fixture {
        _dirs: Vec<tempfile::TempDir>,
        local: PathBuf,
        store: PathBuf,
        remote: PathBuf,
        registry: Arc<MemoryJobRegistry>,
        scheduler: Arc<LocalScheduler>,
        runner: JobRunner,
    }

    /// Local file system that requests cancellation of every job as soon
    /// as output is retrieved
    struct CancelOnDownload {
        inner: LocalFileSystem,
        registry: Arc<MemoryJobRegistry>,
    }

    #[async_trait]
    impl RemoteFileSystem for CancelOnDownload {
        async fn create_dir(&self, path: &str) -> FsResult<()> {
            self.inner.create_dir(path).await
        }

        async fn create_dir_all(&self, path: &str) -> FsResult<()> {
            self.inner.create_dir_all(path).await
        }

        async fn upload(&self, local: &Path, remote: &str, options: CopyOptions) -> FsResult<()> {
            self.inner.upload(local, remote, options).await
        }

        async fn download(&self, remote: &str, local: &Path, options: CopyOptions) -> FsResult<()> {
            for job in self.registry.list_jobs().await.unwrap() {
                let mut lease = self.registry.acquire(job.id).await.unwrap();
                if lease.request_cancel() {
                    self.registry.commit(&lease).await.unwrap();
                }
            }
            self.inner.download(remote, local, options).await
        }

        async fn read_bytes(&self, path: &str) -> FsResult<Vec<u8>> {
            self.inner.read_bytes(path).await
        }

        async fn write_bytes(&self, path: &str, data: &[u8]) -> FsResult<()> {
            self.inner.write_bytes(path, data).await
        }

        async fn exists(&self, path: &str) -> FsResult<bool> {
            self.inner.exists(path).await
        }

        async fn is_dir(&self, path: &str) -> FsResult<bool> {
            self.inner.is_dir(path).await
        }

        async fn chmod(&self, path: &str, mode: u32) -> FsResult<()> {
            self.inner.chmod(path, mode).await
        }

        async fn remove_dir_all(&self, path: &str) -> FsResult<()> {
            self.inner.remove_dir_all(path).await
        }
    }

    async fn fixture(runner_script: &str) -> Fixture {
        fixture_with_fs(runner_script, |_| Arc::new(LocalFileSystem::new())).await
    }

    async fn fixture_with_fs(
        runner_script: &str,
        make_fs: impl FnOnce(Arc<MemoryJobRegistry>) -> Arc<dyn RemoteFileSystem>,
    ) -> Fixture {
        let local = tempfile::tempdir().unwrap();
        let store = tempfile::tempdir().unwrap();
        let remote = tempfile::tempdir().unwrap();

        let runner_path = local.path().join("runner.sh");
        std::fs::write(&runner_path, runner_script).unwrap();
        std::fs::set_permissions(&runner_path, std::fs::Permissions::from_mode(0o755)).unwrap();

        let mut config = Config::new(remote.path().to_str().unwrap().to_string());
        config.cwl_runner = runner_path.to_str().unwrap().to_string();
        config.store_service = store.path().to_path_buf();
        config.store_client = format!("file://{}", store.path().display());

        let registry = Arc::new(MemoryJobRegistry::new());
        let fs = make_fs(registry.clone());
        let scheduler = Arc::new(LocalScheduler::new());
        let remote_api = RemoteApi::new(&config, fs.clone(), scheduler.clone())
            .await
            .unwrap();
        let job_files = RemoteJobFiles::new(
            registry.clone(),
            fs.clone(),
            &config.remote_base_dir(),
        )
        .await
        .unwrap();
        let local_files = LocalFiles::new(&config, fs);

        let runner = JobRunner::new(
            &config,
            registry.clone(),
            scheduler.clone(),
            Arc::new(remote_api),
            Arc::new(job_files),
            Arc::new(local_files),
        );

        Fixture {
            local: local.path().to_path_buf(),
            store: store.path().to_path_buf(),
            remote: remote.path().to_path_buf(),
            _dirs: vec![local, store, remote],
            registry,
            scheduler,
            runner,
        }
    }

    impl Fixture {
        async fn submit(&self, workflow: &str) -> Uuid {
            let workflow_path = self.local.join("workflow.cwl");
            std::fs::write(&workflow_path, workflow).unwrap();
            let input_path = self.local.join("input.txt");
            std::fs::write(&input_path, "some data\n").unwrap();

            let input = json!({
                "file": {"class": "File", "location": format!("file://{}", input_path.display())}
            });
            let workflow_uri = format!("file://{}", workflow_path.display());
            self.registry
                .create_job("job", &workflow_uri, &input.to_string())
                .await
                .unwrap()
                .id
        }

        async fn state(&self, id: Uuid) -> JobState {
            self.registry.get_job(id).await.unwrap().state
        }

        /// Applies `change` to the stored job
        async fn modify(&self, id: Uuid, change: impl FnOnce(&mut Job)) {
            let mut lease = self.registry.acquire(id).await.unwrap();
            change(&mut *lease);
            self.registry.commit(&lease).await.unwrap();
        }

        /// Starts a process that only ends when killed
        async fn sleeper(&self) -> JobHandle {
            let description = JobDescription {
                command: "sleep".to_string(),
                arguments: vec!["30".to_string()],
                ..Default::default()
            };
            self.scheduler.submit(&description).await.unwrap()
        }

        /// Processes the job until it reaches a terminal state
        async fn run_to_end(&self, id: Uuid) -> Job {
            for _ in 0..200 {
                self.runner.process(id).await.unwrap();
                let job = self.registry.get_job(id).await.unwrap();
                if job.state.is_terminal() {
                    return job;
                }
                tokio::time::sleep(Duration::from_millis(50)).await;
            }
            panic!("job {} did not finish", id);
        }

        fn job_dir(&self, id: Uuid) -> PathBuf {
            self.remote.join("jobs").join(id.to_string())
        }
    }

    fn read(path: &Path) -> String {
        std::fs::read_to_string(path).unwrap()
    }

    #[test]
    fn test_nodes_for() {
        assert_eq!(nodes_for(0, 32), 1);
        assert_eq!(nodes_for(1, 32), 1);
        assert_eq!(nodes_for(32, 32), 1);
        assert_eq!(nodes_for(33, 32), 2);
        assert_eq!(nodes_for(64, 16), 4);
    }

    #[test]
    fn test_needs_attention() {
        let mut job = Job::new("a".into(), "wf".into(), "{}".into());
        assert!(needs_attention(&job));
        job.state = JobState::Success;
        assert!(!needs_attention(&job));
        job.please_delete = true;
        assert!(needs_attention(&job));
    }

    #[tokio::test]
    async fn test_successful_job() {
        let fx = fixture(FAKE_RUNNER).await;
        let id = fx.submit(WORKFLOW).await;

        fx.runner.process(id).await.unwrap();
        assert!(matches!(
            fx.state(id).await,
            JobState::Waiting | JobState::Running | JobState::Finished | JobState::Success
        ));

        let job = fx.run_to_end(id).await;
        assert_eq!(job.state, JobState::Success, "log: {}", job.log);

        let workflow: Value =
            serde_json::from_slice(&std::fs::read(fx.job_dir(id).join("workflow.cwl")).unwrap())
                .unwrap();
        let expected_run = format!("{}/api/test/steps/test/copy.cwl", fx.remote.display());
        assert_eq!(workflow["steps"]["copy"]["run"], json!(expected_run));

        let output: Value = serde_json::from_str(&job.local_output).unwrap();
        let published = fx.store.join("output").join(id.to_string()).join("result.txt");
        assert_eq!(
            output["result"]["location"],
            json!(format!("file://{}", published.display()))
        );
        assert_eq!(read(&published), "some data\n");
        assert!(job.log.contains("Final process status is success"));
    }

    #[tokio::test]
    async fn test_failing_job() {
        let fx = fixture(FAILING_RUNNER).await;
        let id = fx.submit(WORKFLOW).await;

        let job = fx.run_to_end(id).await;
        assert_eq!(job.state, JobState::PermanentFailure);
        assert!(job.local_output.is_empty());
    }

    #[tokio::test]
    async fn test_invalid_workflow_is_permanent_failure() {
        let fx = fixture(FAKE_RUNNER).await;
        let id = fx.submit("class: Workflow\ninputs: []\n").await;

        fx.runner.process(id).await.unwrap();
        let job = fx.registry.get_job(id).await.unwrap();
        assert_eq!(job.state, JobState::PermanentFailure);
        assert!(job.log.contains("no steps"));
    }

    #[tokio::test]
    async fn test_missing_workflow_is_system_error() {
        let fx = fixture(FAKE_RUNNER).await;
        let id = fx
            .registry
            .create_job("job", "file:///nonexistent/wf.cwl", "{}")
            .await
            .unwrap()
            .id;

        fx.runner.process(id).await.unwrap();
        assert_eq!(fx.state(id).await, JobState::SystemError);
    }

    #[tokio::test]
    async fn test_cancel_running_job() {
        let fx = fixture(SLOW_RUNNER).await;
        let id = fx.submit(WORKFLOW).await;

        fx.runner.process(id).await.unwrap();
        assert_eq!(fx.state(id).await, JobState::Waiting);
        fx.runner.process(id).await.unwrap();
        assert_eq!(fx.state(id).await, JobState::Running);

        let mut lease = fx.registry.acquire(id).await.unwrap();
        assert!(lease.request_cancel());
        fx.registry.commit(&lease).await.unwrap();
        drop(lease);
        assert_eq!(fx.state(id).await, JobState::RunningCr);

        fx.runner.process(id).await.unwrap();
        assert_eq!(fx.state(id).await, JobState::Cancelled);
    }

    #[tokio::test]
    async fn test_cancel_before_staging() {
        let fx = fixture(FAKE_RUNNER).await;
        let id = fx.submit(WORKFLOW).await;

        let mut lease = fx.registry.acquire(id).await.unwrap();
        lease.request_cancel();
        fx.registry.commit(&lease).await.unwrap();
        drop(lease);

        fx.runner.process(id).await.unwrap();
        assert_eq!(fx.state(id).await, JobState::Cancelled);
        assert!(!fx.job_dir(id).exists());
    }

    #[tokio::test]
    async fn test_deleted_job_is_reaped() {
        let fx = fixture(FAKE_RUNNER).await;
        let id = fx.submit(WORKFLOW).await;
        fx.run_to_end(id).await;
        assert!(fx.job_dir(id).exists());

        let mut lease = fx.registry.acquire(id).await.unwrap();
        lease.please_delete = true;
        fx.registry.commit(&lease).await.unwrap();
        drop(lease);

        fx.runner.process(id).await.unwrap();
        assert!(fx.registry.get_job(id).await.is_err());
        assert!(!fx.job_dir(id).exists());
        assert!(!fx.store.join("output").join(id.to_string()).exists());

        // processing a job that is gone is a no-op
        fx.runner.process(id).await.unwrap();
    }

    #[tokio::test]
    async fn test_cancel_during_staging_skips_submission() {
        let fx = fixture(FAKE_RUNNER).await;
        let id = fx.submit(WORKFLOW).await;
        fx.modify(id, |job| {
            assert!(job.apply(Intent::StartStaging));
            assert!(job.request_cancel());
        })
        .await;

        // the cancellation lands while inputs are being copied
        fx.runner.try_stage_and_submit(id).await.unwrap();
        let job = fx.registry.get_job(id).await.unwrap();
        assert_eq!(job.state, JobState::StagingInCr);
        assert!(job.remote_job_id.is_none());
        assert!(fx.job_dir(id).join("workflow.cwl").exists());

        fx.runner.process(id).await.unwrap();
        assert_eq!(fx.state(id).await, JobState::Cancelled);
    }

    #[tokio::test]
    async fn test_cancel_waiting_job_kills_process() {
        let fx = fixture(SLOW_RUNNER).await;
        let id = fx.submit(WORKFLOW).await;

        fx.runner.process(id).await.unwrap();
        let job = fx.registry.get_job(id).await.unwrap();
        assert_eq!(job.state, JobState::Waiting);
        let handle = JobHandle(job.remote_job_id.unwrap());
        assert_eq!(
            fx.scheduler.status(&handle).await.unwrap(),
            SchedulerStatus::Running
        );

        fx.modify(id, |job| assert!(job.request_cancel())).await;
        assert_eq!(fx.state(id).await, JobState::WaitingCr);

        fx.runner.process(id).await.unwrap();
        assert_eq!(fx.state(id).await, JobState::Cancelled);
        assert!(matches!(
            fx.scheduler.status(&handle).await,
            Err(SchedulerError::UnknownJob(_))
        ));
    }

    #[tokio::test]
    async fn test_cancel_submitted_while_staging() {
        let fx = fixture(SLOW_RUNNER).await;
        let id = fx.submit(WORKFLOW).await;
        let handle = fx.sleeper().await;

        // submitted, but the cancellation beat the switch to waiting
        let recorded = handle.clone();
        fx.modify(id, move |job| {
            job.state = JobState::StagingInCr;
            job.remote_job_id = Some(recorded.0);
        })
        .await;

        fx.runner.process(id).await.unwrap();
        assert_eq!(fx.state(id).await, JobState::Cancelled);
        assert!(matches!(
            fx.scheduler.status(&handle).await,
            Err(SchedulerError::UnknownJob(_))
        ));
    }

    #[tokio::test]
    async fn test_cancel_during_destaging_wins() {
        let fx = fixture_with_fs(FAKE_RUNNER, |registry| {
            Arc::new(CancelOnDownload {
                inner: LocalFileSystem::new(),
                registry,
            })
        })
        .await;
        let id = fx.submit(WORKFLOW).await;

        let job = fx.run_to_end(id).await;
        assert_eq!(job.state, JobState::Cancelled, "log: {}", job.log);
        assert!(job.local_output.is_empty());
        assert!(job.log.contains("Retrieving output"));
    }

    #[tokio::test]
    async fn test_abort_while_cancel_requested() {
        let fx = fixture(FAKE_RUNNER).await;
        let id = fx.submit(WORKFLOW).await;
        fx.modify(id, |job| job.state = JobState::WaitingCr).await;

        let err = BackendError::Configuration("scheduler went away".to_string());
        fx.runner.abort(id, &err).await.unwrap();
        let job = fx.registry.get_job(id).await.unwrap();
        assert_eq!(job.state, JobState::WaitingCr);
        assert!(job.log.contains("scheduler went away"));

        // the next visit still honours the cancellation
        fx.runner.process(id).await.unwrap();
        assert_eq!(fx.state(id).await, JobState::Cancelled);
    }
}
