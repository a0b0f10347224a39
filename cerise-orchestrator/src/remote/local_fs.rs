//! File system of the machine the service runs on

use async_trait::async_trait;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use super::filesystem::{CopyOptions, FsError, FsResult, RemoteFileSystem};

/// Permission bits of copied files when permissions are not preserved
const DEFAULT_FILE_MODE: u32 = 0o644;

#[derive(Debug, Clone, Default)]
pub struct LocalFileSystem;

impl LocalFileSystem {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl RemoteFileSystem for LocalFileSystem {
    async fn create_dir(&self, path: &str) -> FsResult<()> {
        match tokio::fs::create_dir(path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists && Path::new(path).is_dir() => {
                Ok(())
            }
            Err(e) => Err(FsError::io(path, e)),
        }
    }

    async fn create_dir_all(&self, path: &str) -> FsResult<()> {
        tokio::fs::create_dir_all(path)
            .await
            .map_err(|e| FsError::io(path, e))
    }

    async fn upload(&self, local: &Path, remote: &str, options: CopyOptions) -> FsResult<()> {
        copy_in_background(local.to_path_buf(), PathBuf::from(remote), options).await
    }

    async fn download(&self, remote: &str, local: &Path, options: CopyOptions) -> FsResult<()> {
        copy_in_background(PathBuf::from(remote), local.to_path_buf(), options).await
    }

    async fn read_bytes(&self, path: &str) -> FsResult<Vec<u8>> {
        tokio::fs::read(path).await.map_err(|e| FsError::io(path, e))
    }

    async fn write_bytes(&self, path: &str, data: &[u8]) -> FsResult<()> {
        tokio::fs::write(path, data)
            .await
            .map_err(|e| FsError::io(path, e))
    }

    async fn exists(&self, path: &str) -> FsResult<bool> {
        tokio::fs::try_exists(path)
            .await
            .map_err(|e| FsError::io(path, e))
    }

    async fn is_dir(&self, path: &str) -> FsResult<bool> {
        match tokio::fs::metadata(path).await {
            Ok(meta) => Ok(meta.is_dir()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(FsError::io(path, e)),
        }
    }

    async fn chmod(&self, path: &str, mode: u32) -> FsResult<()> {
        tokio::fs::set_permissions(path, std::fs::Permissions::from_mode(mode))
            .await
            .map_err(|e| FsError::io(path, e))
    }

    async fn remove_dir_all(&self, path: &str) -> FsResult<()> {
        tokio::fs::remove_dir_all(path)
            .await
            .map_err(|e| FsError::io(path, e))
    }
}

async fn copy_in_background(from: PathBuf, to: PathBuf, options: CopyOptions) -> FsResult<()> {
    let target = to.clone();
    tokio::task::spawn_blocking(move || copy_tree(&from, &to, options))
        .await
        .map_err(|e| FsError::io(&target, std::io::Error::other(e)))?
}

/// Copies a file, or a directory and everything below it
fn copy_tree(from: &Path, to: &Path, options: CopyOptions) -> FsResult<()> {
    let meta = std::fs::metadata(from).map_err(|e| FsError::io(from, e))?;

    if !meta.is_dir() {
        if let Some(parent) = to.parent() {
            std::fs::create_dir_all(parent).map_err(|e| FsError::io(parent, e))?;
        }
        return copy_file(from, to, options);
    }

    for entry in WalkDir::new(from).sort_by_file_name() {
        let entry = entry.map_err(|e| FsError::io(from, e.into()))?;
        let Ok(relative) = entry.path().strip_prefix(from) else {
            continue;
        };
        let target = to.join(relative);

        if entry.file_type().is_dir() {
            std::fs::create_dir_all(&target).map_err(|e| FsError::io(&target, e))?;
            if options.preserve_permissions {
                let permissions = entry
                    .metadata()
                    .map_err(|e| FsError::io(entry.path(), e.into()))?
                    .permissions();
                std::fs::set_permissions(&target, permissions)
                    .map_err(|e| FsError::io(&target, e))?;
            }
        } else if entry.file_type().is_file() {
            copy_file(entry.path(), &target, options)?;
        }
    }

    Ok(())
}

fn copy_file(from: &Path, to: &Path, options: CopyOptions) -> FsResult<()> {
    if !options.overwrite && to.exists() {
        return Err(FsError::AlreadyExists(to.display().to_string()));
    }

    std::fs::copy(from, to).map_err(|e| FsError::io(from, e))?;

    if !options.preserve_permissions {
        std::fs::set_permissions(to, std::fs::Permissions::from_mode(DEFAULT_FILE_MODE))
            .map_err(|e| FsError::io(to, e))?;
    }
    Ok(())
}
