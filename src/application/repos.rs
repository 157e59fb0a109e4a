//! Repository traits describing persistence adapters.

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;
use time::OffsetDateTime;

use crate::domain::{
    entities::{Article, ArticleId, WebsiteId},
    targets::PublishTargets,
};

#[derive(Debug, Error)]
pub enum RepoError {
    #[error("persistence error: {0}")]
    Persistence(String),
    #[error("duplicate record violates unique constraint `{constraint}`")]
    Duplicate { constraint: String },
    #[error("resource not found")]
    NotFound,
    #[error("invalid input: {message}")]
    InvalidInput { message: String },
    #[error("integrity error: {message}")]
    Integrity { message: String },
    #[error("database timeout")]
    Timeout,
}

impl RepoError {
    pub fn from_persistence(err: impl std::fmt::Display) -> Self {
        Self::Persistence(err.to_string())
    }
}

/// Read/write access to the article aggregate and its website's integrations.
///
/// Each stage reads the article once at job start and writes once at job end.
#[async_trait]
pub trait ArticlesRepo: Send + Sync {
    async fn find_article(&self, id: ArticleId) -> Result<Option<Article>, RepoError>;

    async fn save_generated(
        &self,
        id: ArticleId,
        title: &str,
        markdown_body: &str,
    ) -> Result<(), RepoError>;

    async fn mark_published(
        &self,
        id: ArticleId,
        published_at: OffsetDateTime,
    ) -> Result<(), RepoError>;

    async fn attach_job(&self, id: ArticleId, job_id: &str) -> Result<(), RepoError>;

    async fn publish_targets(&self, website_id: WebsiteId) -> Result<PublishTargets, RepoError>;

    /// Articles whose schedule has passed, that have a body, are unpublished, and
    /// have no pending or running job attached.
    async fn due_for_publish(
        &self,
        now: OffsetDateTime,
        limit: u32,
    ) -> Result<Vec<ArticleId>, RepoError>;
}

/// A job as delivered by the queue. The pipeline only reads it.
#[derive(Debug, Clone, PartialEq)]
pub struct Job {
    pub id: String,
    pub queue: String,
    pub payload: Value,
    pub enqueued_at: OffsetDateTime,
    pub attempts: i32,
}

#[derive(Debug, Clone)]
pub struct NewJob {
    pub queue: String,
    pub payload: Value,
    pub run_at: OffsetDateTime,
    pub max_attempts: i32,
    pub priority: i32,
}

/// Durable queue collaborator. Storage, acknowledgement bookkeeping and the
/// retry policy live behind this trait.
#[async_trait]
pub trait JobQueue: Send + Sync {
    async fn enqueue(&self, job: NewJob) -> Result<String, RepoError>;

    /// Claim the next runnable job on `queue`, if any.
    async fn claim_next(&self, queue: &str) -> Result<Option<Job>, RepoError>;

    async fn complete(&self, job_id: &str) -> Result<(), RepoError>;

    async fn fail(&self, job_id: &str, error: &str) -> Result<(), RepoError>;
}
