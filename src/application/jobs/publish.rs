use time::OffsetDateTime;
use tracing::{info, warn};

use crate::{application::repos::Job, domain::error::DomainError};

use super::{
    context::{JobError, JobWorkerContext},
    payload::{JobPayload, Pipeline},
};

/// Publish a generated article to every destination its website configures.
pub async fn process_publish_article_job(
    job: Job,
    context: &JobWorkerContext,
) -> Result<(), JobError> {
    let payload = JobPayload::decode(Pipeline::PublishArticle, &job)?;
    let article_id = payload.article_id();

    let article = context
        .articles
        .find_article(article_id)
        .await?
        .ok_or_else(|| DomainError::article_not_found(article_id))?;
    if article.markdown_body.is_none() {
        return Err(DomainError::missing_body(article_id).into());
    }

    let targets = context.articles.publish_targets(article.website_id).await?;
    if targets.is_empty() {
        warn!(
            target = "application::jobs::process_publish_article_job",
            article_id = %article_id,
            website_id = %article.website_id,
            "website has no publish targets configured"
        );
    }

    let report = context.orchestrator.publish(&article, &targets).await?;

    if !report.satisfies(context.policy) {
        return Err(JobError::PolicyNotSatisfied {
            policy: context.policy,
            details: format!(
                "{} of {} targets failed: {}",
                report.failed(),
                report.outcomes.len(),
                report.failure_summary()
            ),
        });
    }

    context
        .articles
        .mark_published(article_id, OffsetDateTime::now_utc())
        .await?;

    info!(
        target = "application::jobs::process_publish_article_job",
        article_id = %article_id,
        succeeded = report.succeeded(),
        failed = report.failed(),
        policy = context.policy.as_str(),
        "article marked published"
    );

    Ok(())
}
