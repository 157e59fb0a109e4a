use time::OffsetDateTime;
use tracing::info;

use crate::{
    application::repos::{ArticlesRepo, JobQueue, NewJob, RepoError},
    domain::entities::ArticleId,
};

use super::payload::{ArticleJobData, JobPayload, Pipeline};

/// Priority for jobs pushed by operators or the scheduler.
const DEFAULT_PRIORITY: i32 = 10;

/// Enqueue an article job on the stage's namespaced queue, returning the job id.
pub async fn enqueue_article_job<Q>(
    queue: &Q,
    pipeline: Pipeline,
    environment: &str,
    article_id: ArticleId,
    run_at: Option<OffsetDateTime>,
    max_attempts: i32,
) -> Result<String, RepoError>
where
    Q: JobQueue + ?Sized,
{
    let job = NewJob {
        queue: pipeline.queue_name(environment),
        payload: JobPayload::encode(ArticleJobData { article_id }),
        run_at: run_at.unwrap_or_else(OffsetDateTime::now_utc),
        max_attempts,
        priority: DEFAULT_PRIORITY,
    };

    queue.enqueue(job).await
}

/// Enqueue and record the job id on the article so the UI can follow it.
pub async fn enqueue_and_attach<Q, A>(
    queue: &Q,
    articles: &A,
    pipeline: Pipeline,
    environment: &str,
    article_id: ArticleId,
    max_attempts: i32,
) -> Result<String, RepoError>
where
    Q: JobQueue + ?Sized,
    A: ArticlesRepo + ?Sized,
{
    let job_id =
        enqueue_article_job(queue, pipeline, environment, article_id, None, max_attempts).await?;
    articles.attach_job(article_id, &job_id).await?;

    info!(
        target = "application::jobs::enqueue",
        pipeline = pipeline.as_str(),
        article_id = %article_id,
        job_id = job_id.as_str(),
        "article job enqueued"
    );

    Ok(job_id)
}
