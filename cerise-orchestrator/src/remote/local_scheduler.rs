//! Scheduler running jobs as local processes

use async_trait::async_trait;
use std::collections::HashMap;
use std::fs::File;
use std::process::Stdio;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::process::{Child, Command};
use tokio::sync::Mutex;
use tracing::{debug, info};

use super::scheduler::{
    JobDescription, JobHandle, Scheduler, SchedulerError, SchedulerResult, SchedulerStatus,
};

/// Runs every submitted job immediately as a child process
///
/// Queue names and node counts are ignored. A process is forgotten once
/// its end has been reported or it has been cancelled, and all of them
/// are forgotten when the service restarts.
#[derive(Default)]
pub struct LocalScheduler {
    processes: Mutex<HashMap<String, Child>>,
    next_id: AtomicU64,
}

impl LocalScheduler {
    pub fn new() -> Self {
        Self::default()
    }
}

fn redirect(path: Option<&str>) -> SchedulerResult<Stdio> {
    match path {
        Some(path) => Ok(Stdio::from(File::create(path)?)),
        None => Ok(Stdio::null()),
    }
}

#[async_trait]
impl Scheduler for LocalScheduler {
    async fn submit(&self, description: &JobDescription) -> SchedulerResult<JobHandle> {
        let stdout = redirect(description.stdout_file.as_deref())?;
        let stderr = redirect(description.stderr_file.as_deref())?;
        // nothing reports through these locally, but they are expected to exist
        for file in [&description.system_out_file, &description.system_err_file]
            .into_iter()
            .flatten()
        {
            File::create(file)?;
        }

        let mut command = Command::new(&description.command);
        command
            .args(&description.arguments)
            .envs(&description.environment)
            .stdin(Stdio::null())
            .stdout(stdout)
            .stderr(stderr);
        if !description.working_directory.is_empty() {
            command.current_dir(&description.working_directory);
        }

        let child = command.spawn().map_err(|source| SchedulerError::Spawn {
            command: description.command.clone(),
            source,
        })?;

        let id = format!("local-{}", self.next_id.fetch_add(1, Ordering::SeqCst) + 1);
        info!(
            "Started {} as {} (pid {:?})",
            description.command,
            id,
            child.id()
        );
        self.processes.lock().await.insert(id.clone(), child);

        Ok(JobHandle(id))
    }

    async fn status(&self, handle: &JobHandle) -> SchedulerResult<SchedulerStatus> {
        let mut processes = self.processes.lock().await;
        let child = processes
            .get_mut(handle.as_str())
            .ok_or_else(|| SchedulerError::UnknownJob(handle.0.clone()))?;

        match child.try_wait()? {
            Some(status) => {
                debug!("{} exited with {}", handle.as_str(), status);
                processes.remove(handle.as_str());
                Ok(SchedulerStatus::Done {
                    exit_code: status.code(),
                })
            }
            None => Ok(SchedulerStatus::Running),
        }
    }

    async fn cancel(&self, handle: &JobHandle) -> SchedulerResult<()> {
        let mut child = self
            .processes
            .lock()
            .await
            .remove(handle.as_str())
            .ok_or_else(|| SchedulerError::UnknownJob(handle.0.clone()))?;

        if child.try_wait()?.is_none() {
            info!("Killing {}", handle.as_str());
            child.kill().await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn shell(dir: &std::path::Path, script: &str) -> JobDescription {
        JobDescription {
            name: "test".to_string(),
            command: "sh".to_string(),
            arguments: vec!["-c".to_string(), script.to_string()],
            working_directory: dir.to_str().unwrap().to_string(),
            stdout_file: Some(dir.join("stdout.txt").to_str().unwrap().to_string()),
            stderr_file: Some(dir.join("stderr.txt").to_str().unwrap().to_string()),
            system_out_file: Some(dir.join("sysout.txt").to_str().unwrap().to_string()),
            num_nodes: 1,
            processes_per_node: 1,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_run_to_completion() {
        let dir = tempfile::tempdir().unwrap();
        let scheduler = LocalScheduler::new();
        let mut description = shell(dir.path(), "echo out; echo err >&2; echo $GREETING > env.txt");
        description
            .environment
            .insert("GREETING".to_string(), "hello".to_string());

        let handle = scheduler.submit(&description).await.unwrap();
        let exit_code = tokio::time::timeout(Duration::from_secs(10), scheduler.wait(&handle))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(exit_code, Some(0));

        let read = |name: &str| std::fs::read_to_string(dir.path().join(name)).unwrap();
        assert_eq!(read("stdout.txt"), "out\n");
        assert_eq!(read("stderr.txt"), "err\n");
        assert_eq!(read("env.txt"), "hello\n");
        assert_eq!(read("sysout.txt"), "");
    }

    #[tokio::test]
    async fn test_exit_code_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let scheduler = LocalScheduler::new();
        let handle = scheduler.submit(&shell(dir.path(), "exit 3")).await.unwrap();
        let exit_code = tokio::time::timeout(Duration::from_secs(10), scheduler.wait(&handle))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(exit_code, Some(3));
    }

    #[tokio::test]
    async fn test_finished_process_is_forgotten() {
        let dir = tempfile::tempdir().unwrap();
        let scheduler = LocalScheduler::new();
        let handle = scheduler.submit(&shell(dir.path(), "exit 0")).await.unwrap();
        tokio::time::timeout(Duration::from_secs(10), scheduler.wait(&handle))
            .await
            .unwrap()
            .unwrap();

        assert!(scheduler.processes.lock().await.is_empty());
        assert!(matches!(
            scheduler.status(&handle).await,
            Err(SchedulerError::UnknownJob(_))
        ));
    }

    #[tokio::test]
    async fn test_cancel() {
        let dir = tempfile::tempdir().unwrap();
        let scheduler = LocalScheduler::new();
        let handle = scheduler.submit(&shell(dir.path(), "sleep 30")).await.unwrap();
        assert_eq!(
            scheduler.status(&handle).await.unwrap(),
            SchedulerStatus::Running
        );

        scheduler.cancel(&handle).await.unwrap();
        assert!(scheduler.processes.lock().await.is_empty());
        assert!(matches!(
            scheduler.status(&handle).await,
            Err(SchedulerError::UnknownJob(_))
        ));
        assert!(matches!(
            scheduler.cancel(&handle).await,
            Err(SchedulerError::UnknownJob(_))
        ));
    }

    #[tokio::test]
    async fn test_unknown_handle() {
        let scheduler = LocalScheduler::new();
        let handle = JobHandle("local-99".to_string());
        assert!(matches!(
            scheduler.status(&handle).await,
            Err(SchedulerError::UnknownJob(_))
        ));
    }

    #[tokio::test]
    async fn test_missing_command() {
        let dir = tempfile::tempdir().unwrap();
        let scheduler = LocalScheduler::new();
        let mut description = shell(dir.path(), "");
        description.command = "/nonexistent/runner".to_string();
        assert!(matches!(
            scheduler.submit(&description).await,
            Err(SchedulerError::Spawn { .. })
        ));
    }
}
