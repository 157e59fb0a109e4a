use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;
use futures::{StreamExt, stream};
use thiserror::Error;
use tracing::{debug, info};

use crate::{
    application::{
        document::{self, DocumentEdits, DocumentError},
        images::{ImageHost, ImageResolver},
    },
    domain::entities::Article,
};

use super::publish_title;

/// Rehosts in flight at once for one post.
const REHOST_CONCURRENCY: usize = 4;

#[derive(Debug, Error)]
pub enum CmsError {
    #[error("cms endpoint unreachable: {message}")]
    Unreachable { message: String },
    #[error("cms rejected credentials: {message}")]
    Unauthorized { message: String },
    #[error("cms responded with status {status}: {body}")]
    Rejected { status: u16, body: String },
    #[error("invalid cms credentials: {message}")]
    Credentials { message: String },
    #[error("unexpected cms response: {message}")]
    Decode { message: String },
    #[error(transparent)]
    Document(#[from] DocumentError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CmsPost {
    pub title: String,
    pub html: String,
    pub feature_image: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CmsPostReceipt {
    pub id: String,
    pub url: Option<String>,
}

/// A CMS session for one website. The same session stores rehosted images.
#[async_trait]
pub trait CmsClient: ImageHost {
    async fn create_post(&self, post: CmsPost) -> Result<CmsPostReceipt, CmsError>;

    fn as_image_host(&self) -> &dyn ImageHost;
}

pub struct CmsPublisher {
    images: Arc<dyn ImageResolver>,
}

impl CmsPublisher {
    pub fn new(images: Arc<dyn ImageResolver>) -> Self {
        Self { images }
    }

    /// Strip the title heading, move external images onto the CMS, and submit
    /// the post. Image failures keep the original URL and never abort the post.
    pub async fn publish(
        &self,
        article: &Article,
        markdown: &str,
        client: &dyn CmsClient,
    ) -> Result<CmsPostReceipt, CmsError> {
        let outline = document::outline(markdown);
        let title = publish_title(article, &outline);

        let sources = outline
            .images
            .iter()
            .filter(|node| node.has_http_url())
            .map(|node| node.url.as_str());
        let rehosted = rehost_unique(self.images.as_ref(), client.as_image_host(), sources).await;

        let feature_image = rehosted.iter().find_map(|(_, hosted)| hosted.clone());
        let replacements: HashMap<&str, &str> = rehosted
            .iter()
            .filter_map(|(source, hosted)| Some((source.as_str(), hosted.as_deref()?)))
            .collect();

        let mut edits = DocumentEdits {
            strip_leading_heading: outline.leading_heading.is_some(),
            ..DocumentEdits::default()
        };
        for node in &outline.images {
            if let Some(hosted) = replacements.get(node.url.as_str()) {
                edits.image_urls.insert(node.index, (*hosted).to_string());
            }
        }

        let rendered = document::rewrite_html(markdown, &edits)?;
        debug!(
            target = "application::publish::cms",
            article_id = %article.id,
            images = outline.images.len(),
            rehosted = replacements.len(),
            "cms post prepared"
        );

        let receipt = client
            .create_post(CmsPost {
                title,
                html: rendered.html,
                feature_image,
            })
            .await?;

        info!(
            target = "application::publish::cms",
            article_id = %article.id,
            post_id = receipt.id.as_str(),
            "cms post created"
        );
        Ok(receipt)
    }
}

/// Rehost each distinct source URL once.
///
/// Returns one entry per distinct URL in first-seen order, paired with the
/// hosted URL when the rehost succeeded.
pub async fn rehost_unique<'s>(
    resolver: &dyn ImageResolver,
    host: &dyn ImageHost,
    sources: impl IntoIterator<Item = &'s str>,
) -> Vec<(String, Option<String>)> {
    let mut unique: Vec<String> = Vec::new();
    for source in sources {
        if !unique.iter().any(|seen| seen == source) {
            unique.push(source.to_string());
        }
    }

    stream::iter(unique)
        .map(|source| async move {
            let hosted = resolver.rehost(&source, host).await;
            (source, hosted)
        })
        .buffered(REHOST_CONCURRENCY)
        .collect()
        .await
}
