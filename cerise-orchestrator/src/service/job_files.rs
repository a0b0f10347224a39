//! Job directories on the compute resource
//!
//! Every job gets its own directory under `<base>/jobs`:
//!
//! - `name.txt` holds the name the user gave the job
//! - `workflow.cwl` is the translated workflow
//! - `input.json` is the input binding, pointing at the staged inputs
//! - `work/` holds the staged inputs and the outputs, and is the working
//!   directory of the runner
//! - `stdout.txt` and `stderr.txt` capture the runner
//! - `sysout.txt` and `syserr.txt` capture the scheduler

use cerise_core::cwl::{CwlError, get_files_from_binding, json_pointers};
use cerise_core::domain::input_file::InputFiles;
use cerise_core::naming::{create_input_filename, staging_prefix};
use serde_json::Value;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, error};
use uuid::Uuid;

use super::error::{BackendError, BackendResult};
use crate::remote::{CopyOptions, FsError, RemoteFileSystem};
use crate::repository::JobRegistry;

const JOB_DIR_MODE: u32 = 0o700;

pub struct RemoteJobFiles {
    registry: Arc<dyn JobRegistry>,
    fs: Arc<dyn RemoteFileSystem>,
    jobs_dir: String,
}

impl RemoteJobFiles {
    /// Creates `<base>/jobs` if needed. The base directory must exist.
    pub async fn new(
        registry: Arc<dyn JobRegistry>,
        fs: Arc<dyn RemoteFileSystem>,
        base_dir: &str,
    ) -> BackendResult<Self> {
        let jobs_dir = format!("{}/jobs", base_dir.trim_end_matches('/'));
        debug!("Job directories live in {}", jobs_dir);
        fs.create_dir(&jobs_dir).await?;

        Ok(Self {
            registry,
            fs,
            jobs_dir,
        })
    }

    fn job_path(&self, job_id: Uuid, relative: &str) -> String {
        if relative.is_empty() {
            format!("{}/{}", self.jobs_dir, job_id)
        } else {
            format!("{}/{}/{}", self.jobs_dir, job_id, relative)
        }
    }

    /// Copies everything the job needs to the compute resource.
    ///
    /// `input_files` must have been extracted from the job's input binding.
    /// Each file gets a unique name in `work/`, numbered depth-first across
    /// the whole job, and its entry in the binding is pointed at the copy.
    /// The locations of the output streams are recorded as well, so the job
    /// is ready for submission afterwards.
    pub async fn stage_job(
        &self,
        job_id: Uuid,
        input_files: &InputFiles,
        workflow_content: &[u8],
    ) -> BackendResult<()> {
        debug!("Staging job {}", job_id);
        let mut job = self.registry.acquire(job_id).await?;

        let job_dir = self.job_path(job_id, "");
        let work_dir = self.job_path(job_id, "work");
        for dir in [&job_dir, &work_dir] {
            self.fs.create_dir(dir).await?;
            self.fs.chmod(dir, JOB_DIR_MODE).await?;
        }
        job.remote_workdir_path = work_dir.clone();

        self.fs
            .write_bytes(&self.job_path(job_id, "name.txt"), job.name.as_bytes())
            .await?;

        let workflow_path = self.job_path(job_id, "workflow.cwl");
        self.fs.write_bytes(&workflow_path, workflow_content).await?;
        job.remote_workflow_path = workflow_path;

        let mut inputs: Value = serde_json::from_str(&job.local_input).map_err(CwlError::from)?;
        for (count, (file_id, pointer)) in json_pointers(input_files)?.into_iter().enumerate() {
            let file = input_files.get(file_id);
            let staged_name = create_input_filename(&staging_prefix(count + 1), &file.location);
            let target = format!("{}/{}", work_dir, staged_name);

            job.info(format!("Staging input file {}", file.location));
            match (&file.content, &file.source) {
                (Some(content), _) => self.fs.write_bytes(&target, content).await?,
                (None, Some(source)) => {
                    let options = CopyOptions {
                        overwrite: true,
                        preserve_permissions: false,
                    };
                    self.fs.upload(Path::new(source), &target, options).await?
                }
                (None, None) => {
                    return Err(CwlError::validation(format!(
                        "input file {} cannot be read",
                        file.location
                    ))
                    .into());
                }
            }

            let entry = inputs
                .pointer_mut(&pointer)
                .and_then(Value::as_object_mut)
                .ok_or_else(|| {
                    CwlError::validation(format!("input binding has no File at {}", pointer))
                })?;
            entry.insert("location".to_string(), Value::String(target));
        }

        let input_path = self.job_path(job_id, "input.json");
        let inputs_json = serde_json::to_vec(&inputs).map_err(CwlError::from)?;
        self.fs.write_bytes(&input_path, &inputs_json).await?;
        job.remote_input_path = input_path;

        job.remote_stdout_path = self.job_path(job_id, "stdout.txt");
        job.remote_stderr_path = self.job_path(job_id, "stderr.txt");
        job.remote_system_out_path = self.job_path(job_id, "sysout.txt");
        job.remote_system_err_path = self.job_path(job_id, "syserr.txt");

        self.registry.commit(&job).await?;
        Ok(())
    }

    /// Finds the output files of a finished job.
    ///
    /// Every output must lie inside the job's `work/` directory; otherwise
    /// nothing is returned at all. Locations come back relative to `work/`,
    /// with `source` holding the absolute remote path.
    pub async fn destage_job_output(&self, job_id: Uuid) -> BackendResult<InputFiles> {
        debug!("Destaging job {}", job_id);
        let work_dir = self.job_path(job_id, "work");

        let remote_output = {
            let mut job = self.registry.acquire(job_id).await?;
            if job.remote_output.trim().is_empty() {
                error!("CWL runner did not produce any output for job {}", job_id);
                job.error("CWL runner did not produce any output");
                self.registry.commit(&job).await?;
                return Ok(InputFiles::new());
            }
            job.remote_output.clone()
        };

        let outputs: Value = serde_json::from_str(&remote_output)
            .map_err(|e| BackendError::InvalidRunnerOutput(e.into()))?;
        let mut files =
            get_files_from_binding(&outputs).map_err(BackendError::InvalidRunnerOutput)?;

        let prefix = format!("file://{}/", work_dir);
        let all: Vec<_> = files
            .roots()
            .iter()
            .flat_map(|root| files.depth_first(*root))
            .collect();

        if let Some(outside) = all
            .iter()
            .map(|id| &files.get(*id).location)
            .find(|location| !is_inside(location, &prefix))
        {
            return Err(BackendError::UnexpectedOutputLocation {
                location: outside.clone(),
                prefix,
            });
        }

        for id in all {
            let file = files.get_mut(id);
            let relative = file.location[prefix.len()..].to_string();
            file.source = Some(format!("{}/{}", work_dir, relative));
            file.location = relative;
        }

        Ok(files)
    }

    /// Removes the job's directory and everything in it, if it exists
    pub async fn delete_job(&self, job_id: Uuid) -> BackendResult<()> {
        let job_dir = self.job_path(job_id, "");
        if self.fs.exists(&job_dir).await? {
            self.fs.remove_dir_all(&job_dir).await?;
        }
        Ok(())
    }

    /// Picks up what the runner wrote so far.
    ///
    /// Standard output becomes the job's remote output. Lines of standard
    /// error that were not seen on an earlier call are copied to the job log.
    pub async fn update_job(&self, job_id: Uuid) -> BackendResult<()> {
        debug!("Updating {} from remote files", job_id);
        let output = self.read_remote_file(job_id, "stdout.txt").await?;
        let log = self.read_remote_file(job_id, "stderr.txt").await?;

        let mut job = self.registry.acquire(job_id).await?;

        if !output.is_empty() {
            job.remote_output = output;
        }

        if !log.is_empty() {
            let seen = job.remote_error.lines().count();
            for line in log.lines().skip(seen) {
                job.debug(line);
            }
            job.remote_error = log;
        }

        self.registry.commit(&job).await?;
        Ok(())
    }

    /// Reads a file in the job's directory; a missing file reads as empty
    async fn read_remote_file(&self, job_id: Uuid, relative: &str) -> BackendResult<String> {
        match self.fs.read_text(&self.job_path(job_id, relative)).await {
            Ok(text) => Ok(text),
            Err(FsError::NotFound(_)) => Ok(String::new()),
            Err(e) => Err(e.into()),
        }
    }
}

/// Whether `location` names a file below `prefix` without leaving it
/// through `..`, `.` or empty path segments
fn is_inside(location: &str, prefix: &str) -> bool {
    match location.strip_prefix(prefix) {
        Some(relative) => relative
            .split('/')
            .all(|segment| !matches!(segment, "" | "." | "..")),
        None => false,
    }
}
