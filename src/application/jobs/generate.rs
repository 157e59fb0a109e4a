use tracing::{debug, info};

use crate::{
    application::{document, generation::article_prompt, repos::Job},
    domain::error::DomainError,
};

use super::{
    context::{JobError, JobWorkerContext},
    payload::{JobPayload, Pipeline},
};

/// Turn an article's topic into a body with resolved images.
pub async fn process_generate_article_job(
    job: Job,
    context: &JobWorkerContext,
) -> Result<(), JobError> {
    let payload = JobPayload::decode(Pipeline::GenerateArticle, &job)?;
    let article_id = payload.article_id();

    let article = context
        .articles
        .find_article(article_id)
        .await?
        .ok_or_else(|| DomainError::article_not_found(article_id))?;

    debug!(
        target = "application::jobs::process_generate_article_job",
        article_id = %article_id,
        state = article.state().as_str(),
        "generating article"
    );

    let prompt = article_prompt(&article);
    let draft = context.generator.generate_text(&prompt).await?;

    let title = document::outline(&draft)
        .leading_heading
        .filter(|heading| !heading.is_empty())
        .unwrap_or_else(|| article.topic.clone());

    let markdown = context.transformer.resolve_images(&draft).await?;
    context
        .articles
        .save_generated(article_id, &title, &markdown)
        .await?;

    info!(
        target = "application::jobs::process_generate_article_job",
        article_id = %article_id,
        title = title.as_str(),
        "article generated"
    );

    Ok(())
}
