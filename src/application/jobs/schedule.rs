use std::time::Duration;

use metrics::gauge;
use time::OffsetDateTime;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::application::repos::RepoError;

use super::{context::JobWorkerContext, payload::Pipeline, queue::enqueue_and_attach};

/// Articles enqueued per sweep at most.
const SWEEP_BATCH: u32 = 100;

/// Enqueue a publish job for every article whose schedule has passed.
///
/// Returns the number of jobs enqueued. A failure for one article is logged
/// and the sweep moves on.
pub async fn sweep_due_articles(
    context: &JobWorkerContext,
    now: OffsetDateTime,
) -> Result<usize, RepoError> {
    let due = context.articles.due_for_publish(now, SWEEP_BATCH).await?;
    gauge!("pressroom_scheduler_due_articles").set(due.len() as f64);

    let mut enqueued = 0;
    for article_id in due {
        match enqueue_and_attach(
            context.queue.as_ref(),
            context.articles.as_ref(),
            Pipeline::PublishArticle,
            &context.environment,
            article_id,
            context.max_attempts,
        )
        .await
        {
            Ok(_) => enqueued += 1,
            Err(err) => warn!(
                target = "application::jobs::schedule",
                article_id = %article_id,
                error = %err,
                "failed to enqueue scheduled publish"
            ),
        }
    }

    Ok(enqueued)
}

/// Run [`sweep_due_articles`] every `cadence` until `shutdown` fires.
pub fn spawn_scheduler(
    context: JobWorkerContext,
    cadence: Duration,
    shutdown: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        info!(
            target = "application::jobs::schedule",
            cadence_secs = cadence.as_secs(),
            "publish scheduler started"
        );

        let mut interval = tokio::time::interval(cadence);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = interval.tick() => {}
            }

            match sweep_due_articles(&context, OffsetDateTime::now_utc()).await {
                Ok(0) => debug!(
                    target = "application::jobs::schedule",
                    "no articles due"
                ),
                Ok(count) => info!(
                    target = "application::jobs::schedule",
                    count,
                    "scheduled publish jobs enqueued"
                ),
                Err(err) => error!(
                    target = "application::jobs::schedule",
                    error = %err,
                    "scheduler sweep failed"
                ),
            }
        }

        info!(
            target = "application::jobs::schedule",
            "publish scheduler stopped"
        );
    })
}
