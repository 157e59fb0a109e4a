mod consumer;
mod context;
mod generate;
mod payload;
mod publish;
mod queue;
mod schedule;
pub mod tracker;

use std::{num::NonZeroU32, sync::Arc, time::Duration};

use crate::application::repos::Job;

pub use consumer::{ConsumerHandle, ConsumerOptions, QueueConsumer};
pub use context::{JobError, JobWorkerContext};
pub use generate::process_generate_article_job;
pub use payload::{ArticleJobData, JobPayload, PayloadError, Pipeline};
pub use publish::process_publish_article_job;
pub use queue::{enqueue_and_attach, enqueue_article_job};
pub use schedule::{spawn_scheduler, sweep_due_articles};

/// Route a job from `pipeline`'s queue to its handler.
pub async fn dispatch(
    pipeline: Pipeline,
    job: Job,
    context: &JobWorkerContext,
) -> Result<(), JobError> {
    match pipeline {
        Pipeline::GenerateArticle => process_generate_article_job(job, context).await,
        Pipeline::PublishArticle => process_publish_article_job(job, context).await,
    }
}

/// Start a consumer for `pipeline` on its environment-scoped queue.
pub fn start_pipeline(
    pipeline: Pipeline,
    context: JobWorkerContext,
    concurrency: NonZeroU32,
    poll_interval: Duration,
) -> ConsumerHandle {
    let options = ConsumerOptions {
        queue: pipeline.queue_name(&context.environment),
        concurrency,
        poll_interval,
    };
    let queue = Arc::clone(&context.queue);
    let context = Arc::new(context);

    QueueConsumer::start(queue, options, move |job| {
        let context = Arc::clone(&context);
        async move { dispatch(pipeline, job, &context).await }
    })
}
