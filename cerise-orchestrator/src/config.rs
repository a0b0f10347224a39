//! Service configuration
//!
//! Defines every tunable of the service: where things live on the compute
//! resource, where the local file exchange is, the polling cadence and the
//! REST endpoint.

use std::path::PathBuf;
use std::time::Duration;

/// Macro replaced by the remote user name in configured paths
pub const USERNAME_MACRO: &str = "$CERISE_USERNAME";

/// Service configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Remote directory holding `api/` and `jobs/`; must already exist
    pub base_dir: String,

    /// Remote user name, substituted for `$CERISE_USERNAME`
    pub username: Option<String>,

    /// Local directory containing the API projects to install
    pub api_dir: PathBuf,

    /// Location of the CWL runner; may use `$CERISE_API` and `$CERISE_USERNAME`
    pub cwl_runner: String,

    /// How often every job is polled
    pub refresh: Duration,

    /// Maximum number of jobs processed concurrently in one poll cycle
    pub max_parallel_jobs: usize,

    pub database_url: String,

    /// Address the REST API binds to
    pub bind_addr: String,

    /// Externally visible base URL of the REST API
    pub base_url: String,

    /// Local directory of the file exchange store
    pub store_service: PathBuf,

    /// URL prefix under which clients see the file exchange store
    pub store_client: String,

    pub queue_name: Option<String>,
    pub cores_per_node: u64,
    pub slots_per_node: u64,

    /// Default log level for the service's own target
    pub log_level: String,
}

impl Config {
    /// Creates a configuration with defaults for everything
    pub fn new(base_dir: String) -> Self {
        let store_service = PathBuf::from("/tmp/cerise_files");
        Self {
            base_dir,
            username: None,
            api_dir: PathBuf::from("api"),
            cwl_runner: "$CERISE_API/cerise/files/cwltiny.py".to_string(),
            refresh: Duration::from_secs(60),
            max_parallel_jobs: 8,
            database_url: "sqlite://cerise.db".to_string(),
            bind_addr: "127.0.0.1:29593".to_string(),
            base_url: "http://localhost:29593".to_string(),
            store_client: format!("file://{}", store_service.display()),
            store_service,
            queue_name: None,
            cores_per_node: 32,
            slots_per_node: 1,
            log_level: "info".to_string(),
        }
    }

    /// Creates configuration from environment variables
    ///
    /// Recognized environment variables (all optional):
    /// - CERISE_BASE_DIR (default: /home/$CERISE_USERNAME/.cerise)
    /// - CERISE_USERNAME
    /// - CERISE_API_DIR (default: api)
    /// - CERISE_CWL_RUNNER (default: $CERISE_API/cerise/files/cwltiny.py)
    /// - CERISE_REFRESH (seconds, default: 60)
    /// - CERISE_MAX_PARALLEL_JOBS (default: 8)
    /// - CERISE_DATABASE_URL (default: sqlite://cerise.db)
    /// - CERISE_BIND_ADDR (default: 127.0.0.1:29593)
    /// - CERISE_BASE_URL (default: http://<bind addr>)
    /// - CERISE_STORE_SERVICE (default: /tmp/cerise_files)
    /// - CERISE_STORE_CLIENT (default: file://<store service>)
    /// - CERISE_QUEUE_NAME
    /// - CERISE_CORES_PER_NODE (default: 32)
    /// - CERISE_SLOTS_PER_NODE (default: 1)
    /// - CERISE_LOG_LEVEL (default: info)
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the configuration from an arbitrary variable source
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let username = lookup("CERISE_USERNAME").filter(|s| !s.is_empty());
        let base_dir = lookup("CERISE_BASE_DIR")
            .unwrap_or_else(|| format!("/home/{}/.cerise", USERNAME_MACRO));

        let mut config = Self::new(base_dir);
        config.username = username;

        if let Some(dir) = lookup("CERISE_API_DIR") {
            config.api_dir = PathBuf::from(dir);
        }
        if let Some(runner) = lookup("CERISE_CWL_RUNNER") {
            config.cwl_runner = runner;
        }
        if let Some(refresh) = lookup("CERISE_REFRESH") {
            let seconds: f64 = refresh
                .parse()
                .map_err(|_| anyhow::anyhow!("CERISE_REFRESH must be a number, got {}", refresh))?;
            config.refresh = Duration::try_from_secs_f64(seconds)
                .map_err(|_| anyhow::anyhow!("CERISE_REFRESH out of range: {}", refresh))?;
        }
        if let Some(max) = lookup("CERISE_MAX_PARALLEL_JOBS") {
            config.max_parallel_jobs = max.parse()?;
        }
        if let Some(url) = lookup("CERISE_DATABASE_URL") {
            config.database_url = url;
        }
        if let Some(addr) = lookup("CERISE_BIND_ADDR") {
            config.base_url = format!("http://{}", addr);
            config.bind_addr = addr;
        }
        if let Some(url) = lookup("CERISE_BASE_URL") {
            config.base_url = url;
        }
        if let Some(store) = lookup("CERISE_STORE_SERVICE") {
            config.store_service = PathBuf::from(&store);
            config.store_client = format!("file://{}", store);
        }
        if let Some(store) = lookup("CERISE_STORE_CLIENT") {
            config.store_client = store;
        }
        config.queue_name = lookup("CERISE_QUEUE_NAME").filter(|s| !s.is_empty());
        if let Some(cores) = lookup("CERISE_CORES_PER_NODE") {
            config.cores_per_node = cores.parse()?;
        }
        if let Some(slots) = lookup("CERISE_SLOTS_PER_NODE") {
            config.slots_per_node = slots.parse()?;
        }
        if let Some(level) = lookup("CERISE_LOG_LEVEL") {
            config.log_level = level.to_lowercase();
        }

        Ok(config)
    }

    /// The remote base directory with the user name filled in
    pub fn remote_base_dir(&self) -> String {
        match &self.username {
            Some(username) => self.base_dir.replace(USERNAME_MACRO, username),
            None => self.base_dir.clone(),
        }
    }

    /// Validates the configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if !self.remote_base_dir().starts_with('/') {
            anyhow::bail!("base directory must be an absolute path");
        }

        if self.refresh.is_zero() {
            anyhow::bail!("refresh interval must be greater than 0");
        }

        if self.max_parallel_jobs == 0 {
            anyhow::bail!("max_parallel_jobs must be greater than 0");
        }

        if self.cores_per_node == 0 || self.slots_per_node == 0 {
            anyhow::bail!("cores and slots per node must be greater than 0");
        }

        if self.cwl_runner.is_empty() {
            anyhow::bail!("cwl_runner cannot be empty");
        }

        Ok(())
    }
}
