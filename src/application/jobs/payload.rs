use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{application::repos::Job, domain::entities::ArticleId};

/// Pipeline stages, each served by its own queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Pipeline {
    GenerateArticle,
    PublishArticle,
}

impl Pipeline {
    pub fn as_str(self) -> &'static str {
        match self {
            Pipeline::GenerateArticle => "generate-article",
            Pipeline::PublishArticle => "publish-article",
        }
    }

    /// Queue name for this stage in `environment`, so deployments sharing one
    /// database never take each other's jobs.
    pub fn queue_name(self, environment: &str) -> String {
        format!("{}-{}", self.as_str(), environment)
    }
}

impl fmt::Display for Pipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Message body shared by the article stages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArticleJobData {
    pub article_id: ArticleId,
}

/// A dequeued job payload, validated against the queue it came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobPayload {
    GenerateArticle(ArticleJobData),
    PublishArticle(ArticleJobData),
}

#[derive(Debug, Error)]
pub enum PayloadError {
    #[error("job `{job_id}` carries an invalid {pipeline} payload: {source}")]
    Invalid {
        job_id: String,
        pipeline: Pipeline,
        #[source]
        source: serde_json::Error,
    },
}

impl JobPayload {
    pub fn decode(pipeline: Pipeline, job: &Job) -> Result<Self, PayloadError> {
        let data = ArticleJobData::deserialize(&job.payload).map_err(|source| {
            PayloadError::Invalid {
                job_id: job.id.clone(),
                pipeline,
                source,
            }
        })?;

        Ok(match pipeline {
            Pipeline::GenerateArticle => JobPayload::GenerateArticle(data),
            Pipeline::PublishArticle => JobPayload::PublishArticle(data),
        })
    }

    pub fn encode(data: ArticleJobData) -> serde_json::Value {
        serde_json::json!({ "articleId": data.article_id })
    }

    pub fn article_id(&self) -> ArticleId {
        match self {
            JobPayload::GenerateArticle(data) | JobPayload::PublishArticle(data) => data.article_id,
        }
    }
}
