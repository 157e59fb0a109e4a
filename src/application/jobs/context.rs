use std::sync::Arc;

use thiserror::Error;

use crate::{
    application::{
        document::{DocumentError, DocumentTransformer},
        generation::{Generator, GeneratorError},
        publish::PublishOrchestrator,
        repos::{ArticlesRepo, JobQueue, RepoError},
    },
    domain::{error::DomainError, types::PublishPolicy},
};

use super::payload::PayloadError;

/// Shared context passed to job handlers. Built once at process start.
#[derive(Clone)]
pub struct JobWorkerContext {
    pub articles: Arc<dyn ArticlesRepo>,
    pub queue: Arc<dyn JobQueue>,
    pub generator: Arc<dyn Generator>,
    pub transformer: Arc<DocumentTransformer>,
    pub orchestrator: Arc<PublishOrchestrator>,
    pub policy: PublishPolicy,
    pub environment: String,
    pub max_attempts: i32,
}

#[derive(Debug, Error)]
pub enum JobError {
    #[error(transparent)]
    Payload(#[from] PayloadError),
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error(transparent)]
    Repo(#[from] RepoError),
    #[error(transparent)]
    Generator(#[from] GeneratorError),
    #[error(transparent)]
    Document(#[from] DocumentError),
    #[error("publish policy `{policy}` not satisfied: {details}")]
    PolicyNotSatisfied {
        policy: PublishPolicy,
        details: String,
    },
    #[error("job handler panicked: {message}")]
    Panicked { message: String },
}

impl JobError {
    /// Convert a handler task that did not return normally into a job failure.
    pub fn from_join(err: tokio::task::JoinError) -> Self {
        let message = if err.is_panic() {
            let payload = err.into_panic();
            payload
                .downcast_ref::<&str>()
                .map(|text| (*text).to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "non-string panic payload".to_string())
        } else {
            err.to_string()
        };
        JobError::Panicked { message }
    }
}
