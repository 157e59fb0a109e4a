use std::{future::Future, num::NonZeroU32, sync::Arc, time::Duration};

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::application::repos::{Job, JobQueue};

use super::{context::JobError, tracker};

/// Back-off applied after the queue itself returns an error.
const QUEUE_ERROR_BACKOFF: Duration = Duration::from_secs(1);

#[derive(Debug, Clone)]
pub struct ConsumerOptions {
    pub queue: String,
    pub concurrency: NonZeroU32,
    pub poll_interval: Duration,
}

/// Bounded-concurrency consumer for one named queue.
///
/// `concurrency` worker loops share the queue. Each loop runs its jobs one at a
/// time, so at most `concurrency` jobs from this queue are in flight.
pub struct QueueConsumer;

impl QueueConsumer {
    pub fn start<H, Fut>(
        queue: Arc<dyn JobQueue>,
        options: ConsumerOptions,
        handler: H,
    ) -> ConsumerHandle
    where
        H: Fn(Job) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), JobError>> + Send + 'static,
    {
        let handler = Arc::new(handler);
        let shutdown = CancellationToken::new();
        let worker_count = options.concurrency.get();

        info!(
            target = "application::jobs::consumer",
            queue = %options.queue,
            concurrency = worker_count,
            poll_interval_ms = options.poll_interval.as_millis() as u64,
            "starting queue consumer"
        );

        let workers = (0..worker_count)
            .map(|worker| {
                let worker = Worker {
                    index: worker,
                    queue: Arc::clone(&queue),
                    name: options.queue.clone(),
                    poll_interval: options.poll_interval,
                    shutdown: shutdown.clone(),
                };
                let handler = Arc::clone(&handler);
                tokio::spawn(async move { worker.run(handler).await })
            })
            .collect();

        ConsumerHandle {
            queue: options.queue,
            shutdown,
            workers,
        }
    }
}

/// Running consumer. Dropping it leaves the workers running.
pub struct ConsumerHandle {
    queue: String,
    shutdown: CancellationToken,
    workers: Vec<JoinHandle<()>>,
}

impl ConsumerHandle {
    pub fn queue(&self) -> &str {
        &self.queue
    }

    /// Stop polling and wait for every worker to finish its current job.
    pub async fn shutdown(self) {
        self.shutdown.cancel();
        for worker in self.workers {
            if let Err(err) = worker.await {
                error!(
                    target = "application::jobs::consumer",
                    queue = %self.queue,
                    error = %err,
                    "queue worker terminated abnormally"
                );
            }
        }
        info!(
            target = "application::jobs::consumer",
            queue = %self.queue,
            "queue consumer stopped"
        );
    }
}

struct Worker {
    index: u32,
    queue: Arc<dyn JobQueue>,
    name: String,
    poll_interval: Duration,
    shutdown: CancellationToken,
}

impl Worker {
    async fn run<H, Fut>(self, handler: Arc<H>)
    where
        H: Fn(Job) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), JobError>> + Send + 'static,
    {
        loop {
            if self.shutdown.is_cancelled() {
                break;
            }

            let job = match self.queue.claim_next(&self.name).await {
                Ok(Some(job)) => job,
                Ok(None) => {
                    if self.idle(self.poll_interval).await {
                        break;
                    }
                    continue;
                }
                Err(err) => {
                    warn!(
                        target = "application::jobs::consumer",
                        queue = %self.name,
                        worker = self.index,
                        error = %err,
                        "failed to claim job"
                    );
                    if self.idle(QUEUE_ERROR_BACKOFF).await {
                        break;
                    }
                    continue;
                }
            };

            let job_id = job.id.clone();
            // Handler panics come back as a `JoinError` and fail the job.
            let task = tokio::spawn(handler(job));
            let outcome = tracker::track(&self.name, &job_id, async move {
                task.await.unwrap_or_else(|err| Err(JobError::from_join(err)))
            })
            .await;

            let acknowledged = match outcome {
                Ok(()) => self.queue.complete(&job_id).await,
                Err(err) => self.queue.fail(&job_id, &err.to_string()).await,
            };
            if let Err(err) = acknowledged {
                error!(
                    target = "application::jobs::consumer",
                    queue = %self.name,
                    job_id = %job_id,
                    error = %err,
                    "failed to report job outcome to queue"
                );
            }
        }
    }

    /// Sleep for `duration`; returns `true` when shutdown was requested meanwhile.
    async fn idle(&self, duration: Duration) -> bool {
        tokio::select! {
            _ = self.shutdown.cancelled() => true,
            _ = tokio::time::sleep(duration) => false,
        }
    }
}
