use std::fmt;

use async_trait::async_trait;
use base64::Engine;
use thiserror::Error;
use time::{OffsetDateTime, macros::format_description};
use tracing::{debug, info};

use crate::{
    application::document,
    domain::{
        entities::Article,
        error::DomainError,
        slug::article_slug,
        targets::{GitTarget, RepoRef},
        types::BranchNaming,
    },
};

use super::publish_title;

/// Front matter descriptions are cut to this many characters.
pub const MAX_DESCRIPTION_CHARS: usize = 160;

const BRANCH_PREFIX: &str = "feat/add-article-";

#[derive(Debug, Error)]
pub enum GitHostError {
    #[error("resource not found")]
    NotFound,
    #[error("credentials rejected: {message}")]
    Unauthorized { message: String },
    #[error("conflict: {message}")]
    Conflict { message: String },
    #[error("git host responded with status {status}: {message}")]
    Status { status: u16, message: String },
    #[error("git host request failed: {message}")]
    Http { message: String },
    #[error("unexpected git host response: {message}")]
    Decode { message: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepositoryInfo {
    pub default_branch: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileContent {
    pub sha: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileWrite {
    pub path: String,
    pub branch: String,
    pub message: String,
    /// Base64 (standard alphabet) file content.
    pub content: String,
    /// Blob SHA of the file being replaced; `None` creates the file.
    pub sha: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewPullRequest {
    pub title: String,
    pub body: String,
    pub head: String,
    pub base: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PullRequest {
    pub number: u64,
    pub url: String,
}

/// Git hosting API for one credential.
#[async_trait]
pub trait GitHost: Send + Sync {
    async fn get_repo(&self, repo: &RepoRef) -> Result<RepositoryInfo, GitHostError>;

    /// Head commit SHA of `branch`, or `None` when the branch does not exist.
    async fn get_ref(&self, repo: &RepoRef, branch: &str) -> Result<Option<String>, GitHostError>;

    async fn create_ref(
        &self,
        repo: &RepoRef,
        branch: &str,
        sha: &str,
    ) -> Result<(), GitHostError>;

    /// File metadata at `path` on `branch`, or `None` when it does not exist.
    async fn get_content(
        &self,
        repo: &RepoRef,
        path: &str,
        branch: &str,
    ) -> Result<Option<FileContent>, GitHostError>;

    async fn put_content(&self, repo: &RepoRef, write: FileWrite) -> Result<(), GitHostError>;

    async fn create_pull_request(
        &self,
        repo: &RepoRef,
        request: NewPullRequest,
    ) -> Result<PullRequest, GitHostError>;

    async fn find_open_pull_request(
        &self,
        repo: &RepoRef,
        head: &str,
    ) -> Result<Option<PullRequest>, GitHostError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GitStep {
    CheckAccess,
    ResolveBaseBranch,
    CreateBranch,
    WriteFile,
    OpenPullRequest,
}

impl GitStep {
    pub fn as_str(self) -> &'static str {
        match self {
            GitStep::CheckAccess => "check_access",
            GitStep::ResolveBaseBranch => "resolve_base_branch",
            GitStep::CreateBranch => "create_branch",
            GitStep::WriteFile => "write_file",
            GitStep::OpenPullRequest => "open_pull_request",
        }
    }
}

impl fmt::Display for GitStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
pub enum GitPublishError {
    #[error(
        "repository `{repo}` not found; check the repository name and that the token can access it"
    )]
    RepositoryNotFound { repo: String },
    #[error("cannot access repository `{repo}`: {source}")]
    Access {
        repo: String,
        #[source]
        source: GitHostError,
    },
    #[error("git publish failed at {step}: {source}")]
    Step {
        step: GitStep,
        #[source]
        source: GitHostError,
    },
    #[error(transparent)]
    InvalidTarget(#[from] DomainError),
}

impl GitPublishError {
    /// Configuration problems an operator has to fix before a retry can succeed.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            GitPublishError::RepositoryNotFound { .. } | GitPublishError::InvalidTarget(_)
        )
    }

    fn step(step: GitStep) -> impl FnOnce(GitHostError) -> Self {
        move |source| GitPublishError::Step { step, source }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GitPublishReceipt {
    pub branch: String,
    pub path: String,
    pub updated_existing_file: bool,
    pub pull_request: PullRequest,
}

pub struct GitPublisher {
    naming: BranchNaming,
}

impl GitPublisher {
    pub fn new(naming: BranchNaming) -> Self {
        Self { naming }
    }

    /// Propose the article as a new file on a fresh branch.
    ///
    /// Steps run in order and the first failure ends the attempt. A branch
    /// created before a later failure is left behind.
    pub async fn publish(
        &self,
        article: &Article,
        markdown: &str,
        target: &GitTarget,
        host: &dyn GitHost,
    ) -> Result<GitPublishReceipt, GitPublishError> {
        let repo = target.repository()?;
        let outline = document::outline(markdown);
        let title = publish_title(article, &outline);
        let slug = article_slug(&title).map_err(DomainError::from)?;
        let now = OffsetDateTime::now_utc();

        let repository = host.get_repo(&repo).await.map_err(|source| match source {
            GitHostError::NotFound => GitPublishError::RepositoryNotFound {
                repo: repo.to_string(),
            },
            source => GitPublishError::Access {
                repo: repo.to_string(),
                source,
            },
        })?;
        let base = repository.default_branch;

        let base_sha = host
            .get_ref(&repo, &base)
            .await
            .map_err(GitPublishError::step(GitStep::ResolveBaseBranch))?
            .ok_or(GitPublishError::Step {
                step: GitStep::ResolveBaseBranch,
                source: GitHostError::NotFound,
            })?;

        let branch = branch_name(&slug, self.naming, now);
        self.ensure_branch(host, &repo, &branch, &base_sha).await?;
        debug!(
            target = "application::publish::git",
            repo = %repo,
            branch = branch.as_str(),
            base = base.as_str(),
            "branch ready"
        );

        let path = file_path(target.directory(), &slug);
        let existing = host
            .get_content(&repo, &path, &branch)
            .await
            .map_err(GitPublishError::step(GitStep::WriteFile))?;
        let updated_existing_file = existing.is_some();

        let description = outline
            .first_paragraph
            .as_deref()
            .map(truncate_description)
            .unwrap_or_default();
        let file = render_file(&title, &description, now, markdown);

        host.put_content(
            &repo,
            FileWrite {
                path: path.clone(),
                branch: branch.clone(),
                message: format!("Add article: {title}"),
                content: base64::engine::general_purpose::STANDARD.encode(file),
                sha: existing.map(|content| content.sha),
            },
        )
        .await
        .map_err(GitPublishError::step(GitStep::WriteFile))?;

        let pull_request = self
            .open_pull_request(host, &repo, &title, &path, &branch, &base)
            .await?;

        info!(
            target = "application::publish::git",
            article_id = %article.id,
            repo = %repo,
            branch = branch.as_str(),
            path = path.as_str(),
            pull_request = pull_request.number,
            updated_existing_file,
            "git pull request ready"
        );

        Ok(GitPublishReceipt {
            branch,
            path,
            updated_existing_file,
            pull_request,
        })
    }

    async fn ensure_branch(
        &self,
        host: &dyn GitHost,
        repo: &RepoRef,
        branch: &str,
        base_sha: &str,
    ) -> Result<(), GitPublishError> {
        if self.naming == BranchNaming::Stable
            && host
                .get_ref(repo, branch)
                .await
                .map_err(GitPublishError::step(GitStep::CreateBranch))?
                .is_some()
        {
            return Ok(());
        }

        host.create_ref(repo, branch, base_sha)
            .await
            .map_err(GitPublishError::step(GitStep::CreateBranch))
    }

    async fn open_pull_request(
        &self,
        host: &dyn GitHost,
        repo: &RepoRef,
        title: &str,
        path: &str,
        branch: &str,
        base: &str,
    ) -> Result<PullRequest, GitPublishError> {
        if self.naming == BranchNaming::Stable {
            let head = format!("{}:{branch}", repo.owner);
            if let Some(existing) = host
                .find_open_pull_request(repo, &head)
                .await
                .map_err(GitPublishError::step(GitStep::OpenPullRequest))?
            {
                return Ok(existing);
            }
        }

        host.create_pull_request(
            repo,
            NewPullRequest {
                title: format!("Add article: {title}"),
                body: format!("Adds `{path}`."),
                head: branch.to_string(),
                base: base.to_string(),
            },
        )
        .await
        .map_err(GitPublishError::step(GitStep::OpenPullRequest))
    }
}

pub fn branch_name(slug: &str, naming: BranchNaming, now: OffsetDateTime) -> String {
    match naming {
        BranchNaming::Timestamped => {
            let millis = now.unix_timestamp_nanos() / 1_000_000;
            format!("{BRANCH_PREFIX}{slug}-{millis}")
        }
        BranchNaming::Stable => format!("{BRANCH_PREFIX}{slug}"),
    }
}

pub fn file_path(directory: Option<&str>, slug: &str) -> String {
    match directory {
        Some(dir) => format!("{dir}/{slug}.mdx"),
        None => format!("{slug}.mdx"),
    }
}

fn truncate_description(text: &str) -> String {
    if text.chars().count() <= MAX_DESCRIPTION_CHARS {
        return text.to_string();
    }
    let cut: String = text.chars().take(MAX_DESCRIPTION_CHARS).collect();
    match cut.rfind(' ') {
        Some(idx) if idx > 0 => cut[..idx].trim_end().to_string(),
        _ => cut,
    }
}

fn render_file(title: &str, description: &str, now: OffsetDateTime, body: &str) -> String {
    let date = now
        .date()
        .format(format_description!("[year]-[month]-[day]"))
        .unwrap_or_default();

    format!(
        "---\ntitle: {}\ndescription: {}\ndate: {}\n---\n\n{}",
        yaml_string(title),
        yaml_string(description),
        yaml_string(&date),
        body.trim_start()
    )
}

/// JSON string literals are valid YAML double-quoted scalars.
fn yaml_string(value: &str) -> String {
    serde_json::Value::String(value.to_string()).to_string()
}
