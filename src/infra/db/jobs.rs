use async_trait::async_trait;
use time::OffsetDateTime;
use tracing::warn;

use crate::{
    application::repos::{Job, JobQueue, NewJob, RepoError},
    domain::types::JobState,
};

use super::{PostgresRepositories, map_sqlx_error};

/// Running jobs whose lock is older than this are handed out again, or killed
/// when they have no attempts left.
const STALE_LOCK_SECONDS: i64 = 3600;

/// Upper bound for the retry delay after a failure.
const MAX_BACKOFF_SECONDS: i32 = 3600;

#[derive(sqlx::FromRow)]
struct ClaimedJobRow {
    id: String,
    job_type: String,
    payload: serde_json::Value,
    attempts: i32,
    created_at: OffsetDateTime,
}

impl From<ClaimedJobRow> for Job {
    fn from(row: ClaimedJobRow) -> Self {
        Self {
            id: row.id,
            queue: row.job_type,
            payload: row.payload,
            enqueued_at: row.created_at,
            attempts: row.attempts,
        }
    }
}

#[async_trait]
impl JobQueue for PostgresRepositories {
    async fn enqueue(&self, job: NewJob) -> Result<String, RepoError> {
        let id = uuid::Uuid::new_v4().to_string();

        sqlx::query(
            r#"
            INSERT INTO jobs (id, job_type, payload, status, max_attempts, run_at, priority)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(&id)
        .bind(&job.queue)
        .bind(&job.payload)
        .bind(JobState::Pending.as_str())
        .bind(job.max_attempts)
        .bind(job.run_at)
        .bind(job.priority)
        .execute(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(id)
    }

    async fn claim_next(&self, queue: &str) -> Result<Option<Job>, RepoError> {
        self.kill_exhausted_stale_jobs(queue).await?;

        let row = sqlx::query_as::<_, ClaimedJobRow>(
            r#"
            WITH next_job AS (
                SELECT id
                  FROM jobs
                 WHERE job_type = $1
                   AND (
                        (status = 'Pending' AND run_at <= now())
                     OR (
                            status = 'Running'
                        AND lock_at < now() - make_interval(secs => $3)
                        AND attempts < max_attempts
                     )
                   )
                 ORDER BY priority DESC, run_at ASC
                 LIMIT 1
                 FOR UPDATE SKIP LOCKED
            )
            UPDATE jobs
               SET status = 'Running',
                   attempts = attempts + 1,
                   lock_at = now(),
                   lock_by = $2
             WHERE id IN (SELECT id FROM next_job)
            RETURNING id, job_type, payload, attempts, created_at
            "#,
        )
        .bind(queue)
        .bind(self.worker_id())
        .bind(STALE_LOCK_SECONDS as f64)
        .fetch_optional(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(row.map(Job::from))
    }

    async fn complete(&self, job_id: &str) -> Result<(), RepoError> {
        let result = sqlx::query(
            r#"
            UPDATE jobs
               SET status = 'Done',
                   done_at = now(),
                   last_error = NULL,
                   lock_at = NULL,
                   lock_by = NULL
             WHERE id = $1
            "#,
        )
        .bind(job_id)
        .execute(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        if result.rows_affected() == 0 {
            return Err(RepoError::NotFound);
        }
        Ok(())
    }

    /// Retry with exponential backoff, or kill the job once its attempts are spent.
    async fn fail(&self, job_id: &str, error: &str) -> Result<(), RepoError> {
        let result = sqlx::query(
            r#"
            UPDATE jobs
               SET status = CASE WHEN attempts >= max_attempts THEN 'Killed' ELSE 'Pending' END,
                   last_error = $2,
                   run_at = CASE
                       WHEN attempts >= max_attempts THEN run_at
                       ELSE now() + make_interval(secs => LEAST(power(2, attempts), $3))
                   END,
                   done_at = CASE WHEN attempts >= max_attempts THEN now() ELSE NULL END,
                   lock_at = NULL,
                   lock_by = NULL
             WHERE id = $1
            "#,
        )
        .bind(job_id)
        .bind(error)
        .bind(f64::from(MAX_BACKOFF_SECONDS))
        .execute(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        if result.rows_affected() == 0 {
            return Err(RepoError::NotFound);
        }
        Ok(())
    }
}

impl PostgresRepositories {
    /// Kill jobs whose worker vanished while running their final attempt.
    async fn kill_exhausted_stale_jobs(&self, queue: &str) -> Result<(), RepoError> {
        let result = sqlx::query(
            r#"
            UPDATE jobs
               SET status = 'Killed',
                   last_error = COALESCE(last_error, 'lock expired during the final attempt'),
                   done_at = now(),
                   lock_at = NULL,
                   lock_by = NULL
             WHERE job_type = $1
               AND status = 'Running'
               AND lock_at < now() - make_interval(secs => $2)
               AND attempts >= max_attempts
            "#,
        )
        .bind(queue)
        .bind(STALE_LOCK_SECONDS as f64)
        .execute(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        if result.rows_affected() > 0 {
            warn!(
                target = "infra::db::jobs",
                queue,
                killed = result.rows_affected(),
                "killed stale jobs with no attempts left"
            );
        }
        Ok(())
    }
}
