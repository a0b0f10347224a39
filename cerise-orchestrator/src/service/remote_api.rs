//! Installation of the CWL API on the compute resource
//!
//! The remote API lives under `<base>/api`, one directory per project:
//!
//! ```text
//! <base>/api/<project>/steps/...
//! <base>/api/<project>/files/...
//! <base>/api/<project>/install.sh
//! ```

use cerise_core::cwl::{self, API_FILES_MACRO};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};
use walkdir::WalkDir;

use super::error::{BackendError, BackendResult};
use crate::config::{Config, USERNAME_MACRO};
use crate::remote::{CopyOptions, FsError, JobDescription, RemoteFileSystem, Scheduler};

/// Macro replaced by the remote API directory in the runner location
pub const API_MACRO: &str = "$CERISE_API";

const API_DIR_MODE: u32 = 0o750;
const PROJECT_DIR_MODE: u32 = 0o700;
const INSTALL_SCRIPT_MODE: u32 = 0o700;

pub struct RemoteApi {
    fs: Arc<dyn RemoteFileSystem>,
    scheduler: Arc<dyn Scheduler>,
    username: Option<String>,
    api_dir: String,
}

impl RemoteApi {
    /// Sets up `<base>/api`. The base directory itself must already exist;
    /// it is never created, so a misconfigured path fails here.
    pub async fn new(
        config: &Config,
        fs: Arc<dyn RemoteFileSystem>,
        scheduler: Arc<dyn Scheduler>,
    ) -> BackendResult<Self> {
        let base_dir = config.remote_base_dir();
        if !fs.is_dir(&base_dir).await? {
            return Err(BackendError::Configuration(format!(
                "remote base directory {} does not exist",
                base_dir
            )));
        }

        let api_dir = format!("{}/api", base_dir.trim_end_matches('/'));
        fs.create_dir(&api_dir).await?;
        fs.chmod(&api_dir, API_DIR_MODE).await?;

        Ok(Self {
            fs,
            scheduler,
            username: config.username.clone(),
            api_dir,
        })
    }

    /// Installs every project found in `local_api_dir`.
    ///
    /// Per project the `files/` tree is copied, the steps are rewritten and
    /// copied, and `install.sh` is copied and run. A failing install script
    /// aborts the installation.
    pub async fn install(&self, local_api_dir: &Path) -> BackendResult<()> {
        info!(
            "Staging API from {} to {}",
            local_api_dir.display(),
            self.api_dir
        );

        for project in local_projects(local_api_dir).await? {
            let local_project_dir = local_api_dir.join(&project);
            let remote_project_dir = self.make_remote_project(&project).await?;
            self.stage_api_files(&local_project_dir, &remote_project_dir)
                .await?;
            self.stage_api_steps(&local_project_dir, &remote_project_dir)
                .await?;
            self.stage_install_script(&local_project_dir, &remote_project_dir)
                .await?;
            self.run_install_script(&project, &remote_project_dir)
                .await?;
        }

        Ok(())
    }

    /// Resolves `$CERISE_API`, and `$CERISE_USERNAME` if a user name is
    /// configured, in the location of the CWL runner
    pub fn translate_runner_location(&self, runner_location: &str) -> String {
        let location = runner_location.replace(API_MACRO, &self.api_dir);
        match &self.username {
            Some(username) => location.replace(USERNAME_MACRO, username),
            None => location,
        }
    }

    /// Points the steps of a workflow at this installation, as JSON
    pub fn translate_workflow(&self, workflow_content: &[u8]) -> BackendResult<Vec<u8>> {
        Ok(cwl::translate_workflow(workflow_content, &self.api_dir)?)
    }

    async fn make_remote_project(&self, name: &str) -> BackendResult<String> {
        let remote_project_dir = format!("{}/{}", self.api_dir, name);
        self.fs.create_dir(&remote_project_dir).await?;
        self.fs.chmod(&remote_project_dir, PROJECT_DIR_MODE).await?;
        Ok(remote_project_dir)
    }

    async fn stage_api_files(
        &self,
        local_project_dir: &Path,
        remote_project_dir: &str,
    ) -> BackendResult<()> {
        let local_dir = local_project_dir.join("files");
        if !local_dir.is_dir() {
            debug!(
                "API files at {} not found, not staging",
                local_dir.display()
            );
            return Ok(());
        }

        let remote_dir = format!("{}/files", remote_project_dir);
        debug!(
            "Staging API files to {} from {}",
            remote_dir,
            local_dir.display()
        );
        let options = CopyOptions {
            overwrite: true,
            preserve_permissions: true,
        };
        self.fs.upload(&local_dir, &remote_dir, options).await?;
        Ok(())
    }

    async fn stage_api_steps(
        &self,
        local_project_dir: &Path,
        remote_project_dir: &str,
    ) -> BackendResult<()> {
        let local_steps_dir = local_project_dir.join("steps");
        let remote_steps_dir = format!("{}/steps", remote_project_dir);
        let files_dir = format!("{}/files", remote_project_dir);

        for relative in step_documents(&local_steps_dir).await? {
            let local_path = local_steps_dir.join(&relative);
            let content = tokio::fs::read(&local_path)
                .await
                .map_err(|e| FsError::io(&local_path, e))?;
            let step = cwl::translate_api_step(&content, &files_dir)?;

            let relative = relative.to_string_lossy();
            let remote_path = format!("{}/{}", remote_steps_dir, relative);
            if let Some((parent, _)) = remote_path.rsplit_once('/') {
                self.fs.create_dir_all(parent).await?;
            }

            debug!("Staging step to {} from {}", remote_path, local_path.display());
            let json = serde_json::to_vec(&step).map_err(cwl::CwlError::from)?;
            self.fs.write_bytes(&remote_path, &json).await?;
        }

        Ok(())
    }

    async fn stage_install_script(
        &self,
        local_project_dir: &Path,
        remote_project_dir: &str,
    ) -> BackendResult<()> {
        let local_path = local_project_dir.join("install.sh");
        if !local_path.is_file() {
            debug!(
                "API install script not found at {}, not staging",
                local_path.display()
            );
            return Ok(());
        }

        let remote_path = format!("{}/install.sh", remote_project_dir);
        debug!(
            "Staging API install script to {} from {}",
            remote_path,
            local_path.display()
        );
        let options = CopyOptions {
            overwrite: true,
            preserve_permissions: false,
        };
        self.fs.upload(&local_path, &remote_path, options).await?;
        self.fs.chmod(&remote_path, INSTALL_SCRIPT_MODE).await?;
        Ok(())
    }

    async fn run_install_script(
        &self,
        project: &str,
        remote_project_dir: &str,
    ) -> BackendResult<()> {
        let install_script = format!("{}/install.sh", remote_project_dir);
        if !self.fs.exists(&install_script).await? {
            return Ok(());
        }

        let files_dir = format!("{}/files", remote_project_dir);
        let description = JobDescription {
            name: format!("install-{}", project),
            command: install_script,
            arguments: vec![files_dir.clone()],
            environment: BTreeMap::from([(
                API_FILES_MACRO.trim_start_matches('$').to_string(),
                files_dir,
            )]),
            working_directory: remote_project_dir.to_string(),
            num_nodes: 1,
            processes_per_node: 1,
            ..Default::default()
        };

        debug!("Starting API install script {}", description.command);
        let handle = self.scheduler.submit(&description).await?;
        let exit_code = self.scheduler.wait(&handle).await?;
        if exit_code != Some(0) {
            return Err(BackendError::InstallScriptFailed {
                project: project.to_string(),
                exit_code,
            });
        }
        debug!("API install script of {} done", project);
        Ok(())
    }
}

/// Names of the project directories in the local API tree, sorted
async fn local_projects(local_api_dir: &Path) -> BackendResult<Vec<String>> {
    let mut entries = tokio::fs::read_dir(local_api_dir)
        .await
        .map_err(|e| FsError::io(local_api_dir, e))?;

    let mut projects = Vec::new();
    while let Some(entry) = entries
        .next_entry()
        .await
        .map_err(|e| FsError::io(local_api_dir, e))?
    {
        let file_type = entry
            .file_type()
            .await
            .map_err(|e| FsError::io(entry.path(), e))?;
        if file_type.is_dir() {
            projects.push(entry.file_name().to_string_lossy().into_owned());
        }
    }
    projects.sort();
    Ok(projects)
}

/// Paths of all `.cwl` documents below `steps_dir`, relative to it
async fn step_documents(steps_dir: &Path) -> BackendResult<Vec<PathBuf>> {
    if !steps_dir.is_dir() {
        debug!("API steps at {} not found, not staging", steps_dir.display());
        return Ok(Vec::new());
    }

    let root = steps_dir.to_path_buf();
    let walk = tokio::task::spawn_blocking(move || -> Result<Vec<PathBuf>, FsError> {
        let mut documents = Vec::new();
        for entry in WalkDir::new(&root).sort_by_file_name() {
            let entry = entry.map_err(|e| FsError::io(&root, e.into()))?;
            let is_step = entry.file_type().is_file()
                && entry.path().extension().is_some_and(|ext| ext == "cwl");
            if !is_step {
                continue;
            }
            if let Ok(relative) = entry.path().strip_prefix(&root) {
                documents.push(relative.to_path_buf());
            }
        }
        Ok(documents)
    });

    let documents = walk
        .await
        .map_err(|e| FsError::io(steps_dir, std::io::Error::other(e)))??;
    Ok(documents)
}
