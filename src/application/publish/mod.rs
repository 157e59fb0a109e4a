//! Fan-out of one article to every configured destination.

mod cms;
mod git;

use std::sync::Arc;

use metrics::counter;
use thiserror::Error;
use tracing::{info, warn};

use crate::{
    application::{document::DocumentOutline, images::ImageResolver},
    domain::{
        entities::Article,
        error::DomainError,
        targets::{CmsTarget, GitTarget, PublishTargets},
        types::{BranchNaming, PublishPolicy},
    },
};

pub use cms::{CmsClient, CmsError, CmsPost, CmsPostReceipt, CmsPublisher, rehost_unique};
pub use git::{
    FileContent, FileWrite, GitHost, GitHostError, GitPublishError, GitPublishReceipt,
    GitPublisher, GitStep, NewPullRequest, PullRequest, RepositoryInfo, branch_name, file_path,
};

#[derive(Debug, Error)]
pub enum PublishError {
    #[error(transparent)]
    Cms(#[from] CmsError),
    #[error(transparent)]
    Git(#[from] GitPublishError),
}

/// Builds API sessions for configured targets.
pub trait Integrations: Send + Sync {
    fn cms_client(&self, target: &CmsTarget) -> Result<Arc<dyn CmsClient>, CmsError>;

    fn git_host(&self, target: &GitTarget) -> Arc<dyn GitHost>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetKind {
    Cms,
    Git,
}

impl TargetKind {
    pub fn as_str(self) -> &'static str {
        match self {
            TargetKind::Cms => "cms",
            TargetKind::Git => "git",
        }
    }
}

#[derive(Debug)]
pub struct TargetOutcome {
    pub kind: TargetKind,
    /// CMS URL or repository name.
    pub target: String,
    /// Post id or pull request URL on success.
    pub result: Result<String, PublishError>,
}

impl TargetOutcome {
    pub fn succeeded(&self) -> bool {
        self.result.is_ok()
    }
}

#[derive(Debug, Default)]
pub struct PublishReport {
    pub outcomes: Vec<TargetOutcome>,
}

impl PublishReport {
    pub fn succeeded(&self) -> usize {
        self.outcomes.iter().filter(|o| o.succeeded()).count()
    }

    pub fn failed(&self) -> usize {
        self.outcomes.len() - self.succeeded()
    }

    /// Whether the article counts as published under `policy`.
    ///
    /// With no targets at all, `AnyMustSucceed` is not satisfied.
    pub fn satisfies(&self, policy: PublishPolicy) -> bool {
        match policy {
            PublishPolicy::BestEffort => true,
            PublishPolicy::AnyMustSucceed => self.succeeded() > 0,
            PublishPolicy::AllMustSucceed => self.failed() == 0,
        }
    }

    pub fn failure_summary(&self) -> String {
        self.outcomes
            .iter()
            .filter_map(|outcome| {
                let err = outcome.result.as_ref().err()?;
                Some(format!("{} {}: {err}", outcome.kind.as_str(), outcome.target))
            })
            .collect::<Vec<_>>()
            .join("; ")
    }
}

pub struct PublishOrchestrator {
    integrations: Arc<dyn Integrations>,
    cms: CmsPublisher,
    git: GitPublisher,
}

impl PublishOrchestrator {
    pub fn new(
        integrations: Arc<dyn Integrations>,
        images: Arc<dyn ImageResolver>,
        branch_naming: BranchNaming,
    ) -> Self {
        Self {
            integrations,
            cms: CmsPublisher::new(images),
            git: GitPublisher::new(branch_naming),
        }
    }

    /// Attempt every target. One target failing never stops the others; the
    /// report carries each outcome.
    pub async fn publish(
        &self,
        article: &Article,
        targets: &PublishTargets,
    ) -> Result<PublishReport, DomainError> {
        let markdown = article
            .markdown_body
            .as_deref()
            .ok_or_else(|| DomainError::missing_body(article.id))?;

        let mut report = PublishReport::default();

        if let Some(target) = &targets.cms {
            let result = self.publish_cms(article, markdown, target).await;
            report.outcomes.push(record(
                article,
                TargetKind::Cms,
                target.api_url.clone(),
                result,
            ));
        }

        for target in &targets.git {
            let host = self.integrations.git_host(target);
            let result = self
                .git
                .publish(article, markdown, target, host.as_ref())
                .await
                .map(|receipt| receipt.pull_request.url)
                .map_err(PublishError::from);
            report.outcomes.push(record(
                article,
                TargetKind::Git,
                target.repo_name.clone(),
                result,
            ));
        }

        Ok(report)
    }

    async fn publish_cms(
        &self,
        article: &Article,
        markdown: &str,
        target: &CmsTarget,
    ) -> Result<String, PublishError> {
        let client = self.integrations.cms_client(target)?;
        let receipt = self.cms.publish(article, markdown, client.as_ref()).await?;
        Ok(receipt.url.unwrap_or(receipt.id))
    }
}

fn record(
    article: &Article,
    kind: TargetKind,
    target: String,
    result: Result<String, PublishError>,
) -> TargetOutcome {
    match &result {
        Ok(location) => {
            info!(
                target = "application::publish::orchestrator",
                article_id = %article.id,
                kind = kind.as_str(),
                destination = target.as_str(),
                location = location.as_str(),
                "publish target succeeded"
            );
            counter!(
                "pressroom_publish_targets_total",
                "kind" => kind.as_str(),
                "outcome" => "succeeded"
            )
            .increment(1);
        }
        Err(err) => {
            warn!(
                target = "application::publish::orchestrator",
                article_id = %article.id,
                kind = kind.as_str(),
                destination = target.as_str(),
                configuration = matches!(err, PublishError::Git(git) if git.is_configuration()),
                error = %err,
                "publish target failed"
            );
            counter!(
                "pressroom_publish_targets_total",
                "kind" => kind.as_str(),
                "outcome" => "failed"
            )
            .increment(1);
        }
    }

    TargetOutcome {
        kind,
        target,
        result,
    }
}

/// Title sent to destinations: the stored title, else the leading heading,
/// else the topic.
pub(crate) fn publish_title(article: &Article, outline: &DocumentOutline) -> String {
    article
        .title
        .as_deref()
        .map(str::trim)
        .filter(|title| !title.is_empty())
        .or_else(|| {
            outline
                .leading_heading
                .as_deref()
                .filter(|heading| !heading.is_empty())
        })
        .unwrap_or(article.topic.as_str())
        .to_string()
}
