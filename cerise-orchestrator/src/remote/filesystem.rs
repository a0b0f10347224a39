use async_trait::async_trait;
use std::path::Path;
use thiserror::Error;

pub type FsResult<T> = std::result::Result<T, FsError>;

#[derive(Debug, Error)]
pub enum FsError {
    #[error("no such file or directory: {0}")]
    NotFound(String),

    #[error("already exists: {0}")]
    AlreadyExists(String),

    #[error("I/O error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

impl FsError {
    pub fn io(path: impl AsRef<Path>, source: std::io::Error) -> Self {
        let path = path.as_ref().display().to_string();
        match source.kind() {
            std::io::ErrorKind::NotFound => FsError::NotFound(path),
            std::io::ErrorKind::AlreadyExists => FsError::AlreadyExists(path),
            _ => FsError::Io { path, source },
        }
    }
}

/// How files and trees are copied between the service and the resource
#[derive(Debug, Clone, Copy, Default)]
pub struct CopyOptions {
    /// Replace existing files instead of failing
    pub overwrite: bool,
    /// Carry permission bits over to the copy
    pub preserve_permissions: bool,
}

/// File system of the compute resource, addressed by absolute path
#[async_trait]
pub trait RemoteFileSystem: Send + Sync {
    /// Creates a single directory; succeeds if it already exists
    async fn create_dir(&self, path: &str) -> FsResult<()>;

    /// Creates a directory and all missing parents
    async fn create_dir_all(&self, path: &str) -> FsResult<()>;

    /// Copies a local file or directory tree to `remote`
    async fn upload(&self, local: &Path, remote: &str, options: CopyOptions) -> FsResult<()>;

    /// Copies a remote file or directory tree to `local`
    async fn download(&self, remote: &str, local: &Path, options: CopyOptions) -> FsResult<()>;

    async fn read_bytes(&self, path: &str) -> FsResult<Vec<u8>>;

    async fn read_text(&self, path: &str) -> FsResult<String> {
        let bytes = self.read_bytes(path).await?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    async fn write_bytes(&self, path: &str, data: &[u8]) -> FsResult<()>;

    async fn exists(&self, path: &str) -> FsResult<bool>;

    async fn is_dir(&self, path: &str) -> FsResult<bool>;

    async fn chmod(&self, path: &str, mode: u32) -> FsResult<()>;

    /// Removes a directory with everything in it
    async fn remove_dir_all(&self, path: &str) -> FsResult<()>;
}
