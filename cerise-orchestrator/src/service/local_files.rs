//! File exchange with clients
//!
//! Clients refer to workflows and inputs by URI: local files, files in the
//! service's exchange store, or HTTP resources. Outputs are published into
//! the store under `output/<job id>/`, where clients can pick them up.

use cerise_core::cwl::{CwlError, get_files_from_binding, json_pointers};
use cerise_core::domain::input_file::InputFiles;
use serde_json::Value;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

use super::error::{BackendError, BackendResult};
use crate::config::Config;
use crate::remote::{CopyOptions, FsError, RemoteFileSystem};

pub struct LocalFiles {
    client: reqwest::Client,
    fs: Arc<dyn RemoteFileSystem>,
    store_dir: PathBuf,
    store_client: String,
}

fn is_http(uri: &str) -> bool {
    uri.starts_with("http://") || uri.starts_with("https://")
}

impl LocalFiles {
    pub fn new(config: &Config, fs: Arc<dyn RemoteFileSystem>) -> Self {
        Self {
            client: reqwest::Client::new(),
            fs,
            store_dir: config.store_service.clone(),
            store_client: config.store_client.trim_end_matches('/').to_string(),
        }
    }

    /// Whether `uri` has to be downloaded rather than read from disk.
    /// Store URIs are read locally whatever their scheme.
    fn is_remote(&self, uri: &str) -> bool {
        is_http(uri) && !uri.starts_with(&self.store_client)
    }

    /// Maps a client URI that is not fetched onto a local path
    fn local_path(&self, uri: &str) -> PathBuf {
        if let Some(rest) = uri.strip_prefix(&self.store_client) {
            return self.store_dir.join(rest.trim_start_matches('/'));
        }
        PathBuf::from(uri.strip_prefix("file://").unwrap_or(uri))
    }

    async fn fetch(&self, url: &str) -> BackendResult<Vec<u8>> {
        debug!("Fetching {}", url);
        let fetch_error = |source| BackendError::Fetch {
            url: url.to_string(),
            source,
        };
        let response = self
            .client
            .get(url)
            .send()
            .await
            .and_then(|response| response.error_for_status())
            .map_err(fetch_error)?;
        let body = response.bytes().await.map_err(fetch_error)?;
        Ok(body.to_vec())
    }

    /// Reads the workflow a job refers to
    pub async fn resolve_workflow(&self, uri: &str) -> BackendResult<Vec<u8>> {
        if self.is_remote(uri) {
            return self.fetch(uri).await;
        }
        let path = self.local_path(uri);
        let content = tokio::fs::read(&path)
            .await
            .map_err(|e| FsError::io(&path, e))?;
        Ok(content)
    }

    /// Extracts the input files of a binding and makes them readable:
    /// HTTP resources outside the store are fetched into `content`, anything
    /// else gets its local path as `source`.
    pub async fn resolve_input(&self, local_input: &str) -> BackendResult<InputFiles> {
        let binding: Value = serde_json::from_str(local_input).map_err(CwlError::from)?;
        let mut files = get_files_from_binding(&binding)?;

        let all: Vec<_> = files
            .roots()
            .iter()
            .flat_map(|root| files.depth_first(*root))
            .collect();
        for id in all {
            let location = files.get(id).location.clone();
            if self.is_remote(&location) {
                let content = self.fetch(&location).await?;
                files.get_mut(id).content = Some(content);
            } else {
                let source = self.local_path(&location);
                files.get_mut(id).source = Some(source.to_string_lossy().into_owned());
            }
        }

        Ok(files)
    }

    fn output_dir(&self, job_id: Uuid) -> PathBuf {
        self.store_dir.join("output").join(job_id.to_string())
    }

    /// Copies destaged outputs into the store.
    ///
    /// `files` must come from `remote_output` with locations relative to the
    /// job's work directory. Returns the output binding with every file
    /// pointing at its published copy.
    pub async fn publish_job_output(
        &self,
        job_id: Uuid,
        remote_output: &str,
        files: &InputFiles,
    ) -> BackendResult<String> {
        let mut outputs: Value = serde_json::from_str(remote_output).map_err(CwlError::from)?;
        let output_dir = self.output_dir(job_id);

        for (id, pointer) in json_pointers(files)? {
            let file = files.get(id);
            let source = file.source.as_deref().ok_or_else(|| {
                CwlError::validation(format!("output {} has no remote source", file.location))
            })?;

            let relative = Path::new(&file.location);
            if !relative
                .components()
                .all(|component| matches!(component, Component::Normal(_)))
            {
                return Err(BackendError::UnexpectedOutputLocation {
                    location: file.location.clone(),
                    prefix: output_dir.display().to_string(),
                });
            }

            let target = output_dir.join(relative);
            if let Some(parent) = target.parent() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .map_err(|e| FsError::io(parent, e))?;
            }
            debug!("Retrieving {} to {}", source, target.display());
            let options = CopyOptions {
                overwrite: true,
                preserve_permissions: false,
            };
            self.fs.download(source, &target, options).await?;

            let entry = outputs
                .pointer_mut(&pointer)
                .and_then(Value::as_object_mut)
                .ok_or_else(|| {
                    CwlError::validation(format!("output binding has no File at {}", pointer))
                })?;
            entry.insert(
                "location".to_string(),
                Value::String(format!(
                    "{}/output/{}/{}",
                    self.store_client, job_id, file.location
                )),
            );
            // the runner's absolute remote path means nothing to clients
            entry.remove("path");
        }

        Ok(serde_json::to_string(&outputs).map_err(CwlError::from)?)
    }

    /// Removes the published outputs of a job, if any
    pub async fn delete_output_dir(&self, job_id: Uuid) -> BackendResult<()> {
        let output_dir = self.output_dir(job_id);
        if is_dir(&output_dir).await {
            tokio::fs::remove_dir_all(&output_dir)
                .await
                .map_err(|e| FsError::io(&output_dir, e))?;
        }
        Ok(())
    }
}

async fn is_dir(path: &Path) -> bool {
    tokio::fs::metadata(path)
        .await
        .map(|meta| meta.is_dir())
        .unwrap_or(false)
}
