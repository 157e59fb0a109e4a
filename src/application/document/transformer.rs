use std::sync::Arc;

use futures::future::join_all;
use tracing::{debug, warn};

use crate::application::images::ImageResolver;

use super::{DocumentEdits, DocumentError, outline, rewrite};

/// Fills in images the author only described.
pub struct DocumentTransformer {
    images: Arc<dyn ImageResolver>,
}

impl DocumentTransformer {
    pub fn new(images: Arc<dyn ImageResolver>) -> Self {
        Self { images }
    }

    /// Generate a hosted image for every image node that has a description but
    /// no `http(s)` URL.
    ///
    /// Resolutions run concurrently; the document is serialized only after all
    /// of them settled, so node order in the output matches the input. A node
    /// whose resolution fails is left as it was.
    pub async fn resolve_images(&self, markdown: &str) -> Result<String, DocumentError> {
        let document = outline(markdown);
        let pending: Vec<_> = document
            .images
            .iter()
            .filter(|node| node.needs_resolution())
            .collect();

        if pending.is_empty() {
            return Ok(markdown.to_string());
        }

        let resolutions = join_all(pending.iter().map(|node| async move {
            let outcome = self.images.generate(&node.alt_text).await;
            (*node, outcome)
        }))
        .await;

        let mut edits = DocumentEdits::default();
        for (node, outcome) in resolutions {
            match outcome {
                Ok(url) => {
                    debug!(
                        target = "application::document::resolve_images",
                        index = node.index,
                        alt_text = node.alt_text.as_str(),
                        url = url.as_str(),
                        "image resolved"
                    );
                    edits.image_urls.insert(node.index, url);
                }
                Err(err) => {
                    warn!(
                        target = "application::document::resolve_images",
                        index = node.index,
                        alt_text = node.alt_text.as_str(),
                        error = %err,
                        "image resolution failed; leaving node unresolved"
                    );
                }
            }
        }

        rewrite(markdown, &edits)
    }
}
