use sqlx::SqlitePool;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use std::str::FromStr;
use std::time::Duration;

pub async fn create_pool(database_url: &str) -> Result<SqlitePool, sqlx::Error> {
    let options = SqliteConnectOptions::from_str(database_url)?.create_if_missing(true);

    SqlitePoolOptions::new()
        .max_connections(5)
        .acquire_timeout(Duration::from_secs(5))
        .connect_with(options)
        .await
}

pub async fn run_migrations(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS jobs (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            workflow TEXT NOT NULL,
            local_input TEXT NOT NULL,
            local_output TEXT NOT NULL DEFAULT '',
            state TEXT NOT NULL,
            please_delete BOOLEAN NOT NULL DEFAULT 0,
            log TEXT NOT NULL DEFAULT '',
            created_at TEXT NOT NULL,
            remote_job_id TEXT,
            remote_output TEXT NOT NULL DEFAULT '',
            remote_error TEXT NOT NULL DEFAULT '',
            remote_workdir_path TEXT NOT NULL DEFAULT '',
            remote_workflow_path TEXT NOT NULL DEFAULT '',
            remote_input_path TEXT NOT NULL DEFAULT '',
            remote_stdout_path TEXT NOT NULL DEFAULT '',
            remote_stderr_path TEXT NOT NULL DEFAULT '',
            remote_system_out_path TEXT NOT NULL DEFAULT '',
            remote_system_err_path TEXT NOT NULL DEFAULT ''
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_jobs_state ON jobs(state)")
        .execute(pool)
        .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_jobs_created_at ON jobs(created_at)")
        .execute(pool)
        .await?;

    tracing::info!("Database migrations completed successfully");
    Ok(())
}
