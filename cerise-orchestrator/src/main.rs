use std::sync::Arc;

use anyhow::Context;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod api;
mod config;
mod db;
mod polling;
mod remote;
mod repository;
mod service;

use config::Config;
use polling::JobPoller;
use remote::{LocalFileSystem, LocalScheduler, RemoteFileSystem, Scheduler};
use repository::{JobRegistry, SqliteJobRegistry};
use service::{JobRunner, LocalFiles, RemoteApi, RemoteJobFiles};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_env()?;

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                format!("cerise_orchestrator={},tower_http=debug", config.log_level).into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    config.validate()?;

    tracing::info!("Starting Cerise Orchestrator...");
    tracing::info!("Connecting to database...");

    let pool = db::create_pool(&config.database_url)
        .await
        .context("Failed to create database pool")?;

    db::run_migrations(&pool)
        .await
        .context("Failed to run database migrations")?;

    let registry: Arc<dyn JobRegistry> = Arc::new(SqliteJobRegistry::new(pool));
    let fs: Arc<dyn RemoteFileSystem> = Arc::new(LocalFileSystem::new());
    let scheduler: Arc<dyn Scheduler> = Arc::new(LocalScheduler::new());

    let remote_api = RemoteApi::new(&config, fs.clone(), scheduler.clone())
        .await
        .context("Failed to set up the remote API directory")?;
    remote_api
        .install(&config.api_dir)
        .await
        .context("Failed to install the API")?;

    let job_files =
        RemoteJobFiles::new(registry.clone(), fs.clone(), &config.remote_base_dir()).await?;
    let local_files = LocalFiles::new(&config, fs.clone());

    let runner = Arc::new(JobRunner::new(
        &config,
        registry.clone(),
        scheduler,
        Arc::new(remote_api),
        Arc::new(job_files),
        Arc::new(local_files),
    ));

    let poller = JobPoller::new(
        config.refresh,
        config.max_parallel_jobs,
        registry.clone(),
        runner,
    );
    let poller_handle = tokio::spawn(async move {
        if let Err(e) = poller.run().await {
            tracing::error!("Job poller stopped: {:#}", e);
        }
    });

    let addr = config.bind_addr.clone();
    let app = api::create_router(api::AppState {
        registry,
        config: Arc::new(config),
    });

    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("Shutting down");
        })
        .await
        .context("Failed to start server")?;

    poller_handle.abort();
    Ok(())
}
