//! Text and image generation collaborator.

use async_trait::async_trait;
use thiserror::Error;
use tracing::warn;

use crate::domain::entities::{Article, Backlink};

#[derive(Debug, Error)]
pub enum GeneratorError {
    #[error("generator request failed: {message}")]
    Request { message: String },
    #[error("generator returned status {status}: {body}")]
    Status { status: u16, body: String },
    #[error("generator returned no usable output")]
    EmptyResponse,
}

/// Opaque text/image generator. Failures are errors, never empty strings.
#[async_trait]
pub trait Generator: Send + Sync {
    async fn generate_text(&self, prompt: &str) -> Result<String, GeneratorError>;

    /// Produce an image for `description` and return where it is hosted.
    async fn generate_image(&self, description: &str) -> Result<String, GeneratorError>;
}

/// Prompt for a full article on `article.topic`.
///
/// Malformed backlink entries are skipped with a warning.
pub fn article_prompt(article: &Article) -> String {
    let backlinks: Vec<Backlink> = article
        .backlinks
        .iter()
        .filter_map(|raw| {
            let parsed = Backlink::parse(raw);
            if parsed.is_none() {
                warn!(
                    target = "application::generation::article_prompt",
                    article_id = %article.id,
                    backlink = raw.as_str(),
                    "skipping malformed backlink"
                );
            }
            parsed
        })
        .collect();

    build_prompt(&article.topic, &backlinks)
}

pub fn build_prompt(topic: &str, backlinks: &[Backlink]) -> String {
    let mut prompt = format!(
        "Write a well-structured blog article in Markdown about \"{}\".\n\
         Start with a single level-1 heading containing the article title.\n\
         Use level-2 headings for sections.\n\
         Where an illustration would help, insert an image as ![short visual description]() \
         with an empty URL; the description will be used to generate the picture.\n",
        topic.trim()
    );

    if !backlinks.is_empty() {
        prompt.push_str(
            "Naturally include each of the following links exactly as written somewhere in the body:\n",
        );
        for link in backlinks {
            prompt.push_str("- ");
            prompt.push_str(&link.to_markdown());
            prompt.push('\n');
        }
    }

    prompt
}
