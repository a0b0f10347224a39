//! SQLite job registry

use async_trait::async_trait;
use cerise_core::domain::job::Job;
use cerise_core::domain::state::JobState;
use sqlx::SqlitePool;
use uuid::Uuid;

use super::job::{JobLease, JobLocks, JobRegistry, RegistryError, RegistryResult};

const JOB_COLUMNS: &str = r#"
    id, name, workflow, local_input, local_output, state, please_delete, log,
    created_at, remote_job_id, remote_output, remote_error, remote_workdir_path,
    remote_workflow_path, remote_input_path, remote_stdout_path, remote_stderr_path,
    remote_system_out_path, remote_system_err_path
"#;

/// Job registry persisted in an SQLite database
pub struct SqliteJobRegistry {
    pool: SqlitePool,
    locks: JobLocks,
}

impl SqliteJobRegistry {
    pub fn new(pool: SqlitePool) -> Self {
        Self {
            pool,
            locks: JobLocks::default(),
        }
    }

    async fn find_by_id(&self, id: Uuid) -> RegistryResult<Option<Job>> {
        let row = sqlx::query_as::<_, JobRow>(&format!(
            "SELECT {} FROM jobs WHERE id = ?",
            JOB_COLUMNS
        ))
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await?;

        row.map(Job::try_from).transpose()
    }
}

#[async_trait]
impl JobRegistry for SqliteJobRegistry {
    async fn create_job(
        &self,
        name: &str,
        workflow: &str,
        local_input: &str,
    ) -> RegistryResult<Job> {
        let job = Job::new(name.to_string(), workflow.to_string(), local_input.to_string());

        sqlx::query(
            r#"
            INSERT INTO jobs (id, name, workflow, local_input, state, created_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(job.id.to_string())
        .bind(&job.name)
        .bind(&job.workflow)
        .bind(&job.local_input)
        .bind(job.state.as_str())
        .bind(job.created_at)
        .execute(&self.pool)
        .await?;

        Ok(job)
    }

    async fn get_job(&self, id: Uuid) -> RegistryResult<Job> {
        self.find_by_id(id).await?.ok_or(RegistryError::NotFound(id))
    }

    async fn list_jobs(&self) -> RegistryResult<Vec<Job>> {
        let rows = sqlx::query_as::<_, JobRow>(&format!(
            "SELECT {} FROM jobs ORDER BY created_at ASC",
            JOB_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Job::try_from).collect()
    }

    async fn acquire(&self, id: Uuid) -> RegistryResult<JobLease> {
        self.get_job(id).await?;

        let guard = self.locks.lock(id).await;
        let job = self.get_job(id).await?;
        Ok(JobLease::new(job, guard))
    }

    async fn commit(&self, lease: &JobLease) -> RegistryResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE jobs
            SET name = ?, workflow = ?, local_input = ?, local_output = ?, state = ?,
                please_delete = ?, log = ?, remote_job_id = ?, remote_output = ?,
                remote_error = ?, remote_workdir_path = ?, remote_workflow_path = ?,
                remote_input_path = ?, remote_stdout_path = ?, remote_stderr_path = ?,
                remote_system_out_path = ?, remote_system_err_path = ?
            WHERE id = ?
            "#,
        )
        .bind(&lease.name)
        .bind(&lease.workflow)
        .bind(&lease.local_input)
        .bind(&lease.local_output)
        .bind(lease.state.as_str())
        .bind(lease.please_delete)
        .bind(&lease.log)
        .bind(&lease.remote_job_id)
        .bind(&lease.remote_output)
        .bind(&lease.remote_error)
        .bind(&lease.remote_workdir_path)
        .bind(&lease.remote_workflow_path)
        .bind(&lease.remote_input_path)
        .bind(&lease.remote_stdout_path)
        .bind(&lease.remote_stderr_path)
        .bind(&lease.remote_system_out_path)
        .bind(&lease.remote_system_err_path)
        .bind(lease.id.to_string())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(RegistryError::NotFound(lease.id));
        }
        Ok(())
    }

    async fn remove(&self, lease: JobLease) -> RegistryResult<()> {
        let id = lease.id;
        let result = sqlx::query("DELETE FROM jobs WHERE id = ?")
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;

        drop(lease);
        self.locks.forget(id).await;

        if result.rows_affected() == 0 {
            return Err(RegistryError::NotFound(id));
        }
        Ok(())
    }
}

// =============================================================================
// Database Row Types
// =============================================================================

#[derive(sqlx::FromRow)]
struct JobRow {
    id: String,
    name: String,
    workflow: String,
    local_input: String,
    local_output: String,
    state: String,
    please_delete: bool,
    log: String,
    created_at: chrono::DateTime<chrono::Utc>,
    remote_job_id: Option<String>,
    remote_output: String,
    remote_error: String,
    remote_workdir_path: String,
    remote_workflow_path: String,
    remote_input_path: String,
    remote_stdout_path: String,
    remote_stderr_path: String,
    remote_system_out_path: String,
    remote_system_err_path: String,
}

impl TryFrom<JobRow> for Job {
    type Error = RegistryError;

    fn try_from(row: JobRow) -> Result<Self, Self::Error> {
        let id = Uuid::parse_str(&row.id).map_err(|e| RegistryError::Corrupt {
            id: row.id.clone(),
            message: e.to_string(),
        })?;
        let state: JobState = row.state.parse().map_err(|e| RegistryError::Corrupt {
            id: row.id.clone(),
            message: format!("{}", e),
        })?;

        Ok(Job {
            id,
            name: row.name,
            workflow: row.workflow,
            local_input: row.local_input,
            local_output: row.local_output,
            state,
            please_delete: row.please_delete,
            log: row.log,
            created_at: row.created_at,
            remote_job_id: row.remote_job_id,
            remote_output: row.remote_output,
            remote_error: row.remote_error,
            remote_workdir_path: row.remote_workdir_path,
            remote_workflow_path: row.remote_workflow_path,
            remote_input_path: row.remote_input_path,
            remote_stdout_path: row.remote_stdout_path,
            remote_stderr_path: row.remote_stderr_path,
            remote_system_out_path: row.remote_system_out_path,
            remote_system_err_path: row.remote_system_err_path,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;
    use sqlx::sqlite::SqlitePoolOptions;

    async fn registry() -> SqliteJobRegistry {
        // one connection, since every in-memory connection is its own database
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        db::run_migrations(&pool).await.unwrap();
        SqliteJobRegistry::new(pool)
    }

    #[tokio::test]
    async fn test_round_trip_through_database() {
        let registry = registry().await;
        let job = registry
            .create_job("wc", "http://example.com/wc.cwl", r#"{"f": 1}"#)
            .await
            .unwrap();

        let mut lease = registry.acquire(job.id).await.unwrap();
        lease.state = JobState::WaitingCr;
        lease.remote_job_id = Some("local-1".to_string());
        lease.remote_workdir_path = "/base/jobs/x/work".to_string();
        lease.please_delete = true;
        lease.info("staged");
        registry.commit(&lease).await.unwrap();
        let expected = lease.job().clone();
        drop(lease);

        let stored = registry.get_job(job.id).await.unwrap();
        assert_eq!(stored.id, expected.id);
        assert_eq!(stored.state, JobState::WaitingCr);
        assert_eq!(stored.remote_job_id.as_deref(), Some("local-1"));
        assert_eq!(stored.remote_workdir_path, "/base/jobs/x/work");
        assert!(stored.please_delete);
        assert_eq!(stored.log, expected.log);
        assert_eq!(stored.local_input, r#"{"f": 1}"#);
    }

    #[tokio::test]
    async fn test_list_and_remove() {
        let registry = registry().await;
        let a = registry.create_job("a", "wf", "{}").await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        let b = registry.create_job("b", "wf", "{}").await.unwrap();

        let names: Vec<String> = registry
            .list_jobs()
            .await
            .unwrap()
            .into_iter()
            .map(|job| job.name)
            .collect();
        assert_eq!(names, vec!["a", "b"]);

        let lease = registry.acquire(a.id).await.unwrap();
        registry.remove(lease).await.unwrap();
        assert!(matches!(
            registry.get_job(a.id).await,
            Err(RegistryError::NotFound(_))
        ));
        assert!(registry.get_job(b.id).await.is_ok());
    }

    #[tokio::test]
    async fn test_corrupt_state_is_reported() {
        let registry = registry().await;
        let job = registry.create_job("a", "wf", "{}").await.unwrap();
        sqlx::query("UPDATE jobs SET state = 'BOGUS' WHERE id = ?")
            .bind(job.id.to_string())
            .execute(&registry.pool)
            .await
            .unwrap();

        assert!(matches!(
            registry.get_job(job.id).await,
            Err(RegistryError::Corrupt { .. })
        ));
    }
}
