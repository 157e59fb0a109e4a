use thiserror::Error;

use crate::domain::{entities::ArticleId, slug::SlugError};

#[derive(Debug, Error)]
pub enum DomainError {
    #[error("article {id} not found")]
    ArticleNotFound { id: ArticleId },
    #[error("article {id} has no generated body")]
    MissingBody { id: ArticleId },
    #[error("repository `{value}` must look like `owner/name`")]
    InvalidRepository { value: String },
    #[error(transparent)]
    Slug(#[from] SlugError),
}

impl DomainError {
    pub fn article_not_found(id: ArticleId) -> Self {
        Self::ArticleNotFound { id }
    }

    pub fn missing_body(id: ArticleId) -> Self {
        Self::MissingBody { id }
    }
}
