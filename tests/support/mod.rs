//! In-memory collaborators for pipeline tests.

#![allow(dead_code)]

use std::{
    collections::{BTreeMap, HashMap},
    sync::{
        Arc, Mutex,
        atomic::{AtomicUsize, Ordering},
    },
};

use async_trait::async_trait;
use base64::Engine;
use pressroom::{
    application::{
        document::DocumentTransformer,
        generation::{Generator, GeneratorError},
        images::{ImageError, ImageHost, ImageResolver, ImageUpload},
        jobs::JobWorkerContext,
        publish::{
            CmsClient, CmsError, CmsPost, CmsPostReceipt, FileContent, FileWrite, GitHost,
            GitHostError, Integrations, NewPullRequest, PublishOrchestrator, PullRequest,
            RepositoryInfo,
        },
        repos::{ArticlesRepo, Job, JobQueue, NewJob, RepoError},
    },
    domain::{
        entities::{Article, ArticleId, WebsiteId},
        targets::{CmsTarget, GitTarget, PublishTargets, RepoRef},
        types::{BranchNaming, JobState, PublishPolicy},
    },
};
use time::{Duration, OffsetDateTime};

pub const ENVIRONMENT: &str = "test";

/// Running jobs locked for longer than this are reclaimed or killed.
pub const STALE_LOCK: Duration = Duration::hours(1);

#[derive(Debug, Clone)]
pub struct StoredJob {
    pub job: Job,
    pub status: JobState,
    pub run_at: OffsetDateTime,
    pub max_attempts: i32,
    pub priority: i32,
    pub last_error: Option<String>,
    pub locked_at: Option<OffsetDateTime>,
}

impl StoredJob {
    fn is_stale(&self, now: OffsetDateTime) -> bool {
        self.status == JobState::Running
            && self
                .locked_at
                .is_some_and(|locked_at| locked_at < now - STALE_LOCK)
    }
}

/// Queue with the same claim order and retry rules as the Postgres queue.
#[derive(Default)]
pub struct MemoryJobQueue {
    jobs: Mutex<Vec<StoredJob>>,
    sequence: AtomicUsize,
}

impl MemoryJobQueue {
    pub fn job(&self, id: &str) -> Option<StoredJob> {
        let jobs = self.jobs.lock().expect("jobs");
        jobs.iter().find(|stored| stored.job.id == id).cloned()
    }

    pub fn status(&self, id: &str) -> Option<JobState> {
        self.job(id).map(|stored| stored.status)
    }

    pub fn jobs_on(&self, queue: &str) -> Vec<StoredJob> {
        let jobs = self.jobs.lock().expect("jobs");
        jobs.iter()
            .filter(|stored| stored.job.queue == queue)
            .cloned()
            .collect()
    }

    /// Pretend the worker holding `id` disappeared long ago.
    pub fn expire_lock(&self, id: &str) {
        let mut jobs = self.jobs.lock().expect("jobs");
        if let Some(stored) = jobs.iter_mut().find(|stored| stored.job.id == id) {
            stored.locked_at = Some(OffsetDateTime::now_utc() - STALE_LOCK - Duration::minutes(1));
        }
    }

    pub fn count_in(&self, status: JobState) -> usize {
        let jobs = self.jobs.lock().expect("jobs");
        jobs.iter().filter(|stored| stored.status == status).count()
    }
}

#[async_trait]
impl JobQueue for MemoryJobQueue {
    async fn enqueue(&self, job: NewJob) -> Result<String, RepoError> {
        let id = format!("job-{}", self.sequence.fetch_add(1, Ordering::SeqCst) + 1);
        self.jobs.lock().expect("jobs").push(StoredJob {
            job: Job {
                id: id.clone(),
                queue: job.queue,
                payload: job.payload,
                enqueued_at: OffsetDateTime::now_utc(),
                attempts: 0,
            },
            status: JobState::Pending,
            run_at: job.run_at,
            max_attempts: job.max_attempts,
            priority: job.priority,
            last_error: None,
            locked_at: None,
        });
        Ok(id)
    }

    async fn claim_next(&self, queue: &str) -> Result<Option<Job>, RepoError> {
        let now = OffsetDateTime::now_utc();
        let mut jobs = self.jobs.lock().expect("jobs");
        for stored in jobs.iter_mut() {
            if stored.job.queue == queue
                && stored.is_stale(now)
                && stored.job.attempts >= stored.max_attempts
            {
                stored.status = JobState::Killed;
                stored.locked_at = None;
                stored
                    .last_error
                    .get_or_insert_with(|| "lock expired during the final attempt".to_string());
            }
        }

        let next = jobs
            .iter_mut()
            .filter(|stored| {
                stored.job.queue == queue
                    && ((stored.status == JobState::Pending && stored.run_at <= now)
                        || (stored.is_stale(now) && stored.job.attempts < stored.max_attempts))
            })
            .min_by_key(|stored| (-stored.priority, stored.run_at));

        Ok(next.map(|stored| {
            stored.status = JobState::Running;
            stored.job.attempts += 1;
            stored.locked_at = Some(now);
            stored.job.clone()
        }))
    }

    async fn complete(&self, job_id: &str) -> Result<(), RepoError> {
        let mut jobs = self.jobs.lock().expect("jobs");
        let stored = jobs
            .iter_mut()
            .find(|stored| stored.job.id == job_id)
            .ok_or(RepoError::NotFound)?;
        stored.status = JobState::Done;
        stored.locked_at = None;
        Ok(())
    }

    async fn fail(&self, job_id: &str, error: &str) -> Result<(), RepoError> {
        let mut jobs = self.jobs.lock().expect("jobs");
        let stored = jobs
            .iter_mut()
            .find(|stored| stored.job.id == job_id)
            .ok_or(RepoError::NotFound)?;
        stored.last_error = Some(error.to_string());
        stored.locked_at = None;
        if stored.job.attempts >= stored.max_attempts {
            stored.status = JobState::Killed;
        } else {
            let backoff = 2_i64.pow(stored.job.attempts.clamp(0, 12) as u32).min(3600);
            stored.status = JobState::Pending;
            stored.run_at = OffsetDateTime::now_utc() + Duration::seconds(backoff);
        }
        Ok(())
    }
}

/// Articles and website integrations. Consults the queue so due articles with
/// an open or killed job are skipped, as the Postgres query does.
pub struct MemoryArticles {
    articles: Mutex<HashMap<ArticleId, Article>>,
    targets: Mutex<HashMap<WebsiteId, PublishTargets>>,
    queue: Arc<MemoryJobQueue>,
}

impl MemoryArticles {
    pub fn new(queue: Arc<MemoryJobQueue>) -> Self {
        Self {
            articles: Mutex::new(HashMap::new()),
            targets: Mutex::new(HashMap::new()),
            queue,
        }
    }

    pub fn insert(&self, article: Article) {
        self.articles
            .lock()
            .expect("articles")
            .insert(article.id, article);
    }

    pub fn set_targets(&self, website_id: WebsiteId, targets: PublishTargets) {
        self.targets
            .lock()
            .expect("targets")
            .insert(website_id, targets);
    }

    pub fn get(&self, id: ArticleId) -> Article {
        self.articles
            .lock()
            .expect("articles")
            .get(&id)
            .cloned()
            .expect("article exists")
    }

    fn update(&self, id: ArticleId, apply: impl FnOnce(&mut Article)) -> Result<(), RepoError> {
        let mut articles = self.articles.lock().expect("articles");
        let article = articles.get_mut(&id).ok_or(RepoError::NotFound)?;
        apply(article);
        Ok(())
    }
}

#[async_trait]
impl ArticlesRepo for MemoryArticles {
    async fn find_article(&self, id: ArticleId) -> Result<Option<Article>, RepoError> {
        Ok(self.articles.lock().expect("articles").get(&id).cloned())
    }

    async fn save_generated(
        &self,
        id: ArticleId,
        title: &str,
        markdown_body: &str,
    ) -> Result<(), RepoError> {
        self.update(id, |article| {
            article.title = Some(title.to_string());
            article.markdown_body = Some(markdown_body.to_string());
        })
    }

    async fn mark_published(
        &self,
        id: ArticleId,
        published_at: OffsetDateTime,
    ) -> Result<(), RepoError> {
        self.update(id, |article| article.published_at = Some(published_at))
    }

    async fn attach_job(&self, id: ArticleId, job_id: &str) -> Result<(), RepoError> {
        self.update(id, |article| article.job_id = Some(job_id.to_string()))
    }

    async fn publish_targets(&self, website_id: WebsiteId) -> Result<PublishTargets, RepoError> {
        Ok(self
            .targets
            .lock()
            .expect("targets")
            .get(&website_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn due_for_publish(
        &self,
        now: OffsetDateTime,
        limit: u32,
    ) -> Result<Vec<ArticleId>, RepoError> {
        let articles = self.articles.lock().expect("articles");
        let mut due: Vec<_> = articles
            .values()
            .filter(|article| {
                article.scheduled_at.is_some_and(|at| at <= now)
                    && article.published_at.is_none()
                    && article.markdown_body.is_some()
            })
            .filter(|article| {
                let blocking = article
                    .job_id
                    .as_deref()
                    .and_then(|id| self.queue.status(id))
                    .is_some_and(|status| {
                        matches!(
                            status,
                            JobState::Pending | JobState::Running | JobState::Killed
                        )
                    });
                !blocking
            })
            .map(|article| (article.scheduled_at, article.id))
            .collect();
        due.sort();
        Ok(due
            .into_iter()
            .take(limit as usize)
            .map(|(_, id)| id)
            .collect())
    }
}

/// Returns a fixed draft and numbered image URLs.
pub struct FakeGenerator {
    draft: Mutex<Result<String, String>>,
    pub prompts: Mutex<Vec<String>>,
}

impl FakeGenerator {
    pub fn returning(draft: &str) -> Self {
        Self {
            draft: Mutex::new(Ok(draft.to_string())),
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn failing(message: &str) -> Self {
        Self {
            draft: Mutex::new(Err(message.to_string())),
            prompts: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl Generator for FakeGenerator {
    async fn generate_text(&self, prompt: &str) -> Result<String, GeneratorError> {
        self.prompts
            .lock()
            .expect("prompts")
            .push(prompt.to_string());
        self.draft
            .lock()
            .expect("draft")
            .clone()
            .map_err(|message| GeneratorError::Request { message })
    }

    async fn generate_image(&self, description: &str) -> Result<String, GeneratorError> {
        Ok(format!(
            "https://images.example/{}.png",
            description.replace(' ', "-")
        ))
    }
}

/// Generates URLs from alt text and rehosts by uploading a placeholder.
#[derive(Default)]
pub struct FakeResolver {
    pub generated: Mutex<Vec<String>>,
}

#[async_trait]
impl ImageResolver for FakeResolver {
    async fn generate(&self, alt_text: &str) -> Result<String, ImageError> {
        self.generated
            .lock()
            .expect("generated")
            .push(alt_text.to_string());
        Ok(format!(
            "https://images.example/{}.png",
            alt_text.replace(' ', "-")
        ))
    }

    async fn rehost(&self, source_url: &str, host: &dyn ImageHost) -> Option<String> {
        let file_name = source_url.rsplit('/').next().unwrap_or("image").to_string();
        host.upload_image(ImageUpload {
            file_name,
            content_type: "image/png".to_string(),
            bytes: bytes::Bytes::from_static(b"PNGDATA"),
        })
        .await
        .ok()
    }
}

/// Records posts and uploads; can be told to reject posts.
#[derive(Default)]
pub struct FakeCms {
    pub posts: Mutex<Vec<CmsPost>>,
    pub uploads: Mutex<Vec<String>>,
    pub reject_posts: bool,
}

impl FakeCms {
    pub fn rejecting() -> Self {
        Self {
            reject_posts: true,
            ..Self::default()
        }
    }
}

#[async_trait]
impl ImageHost for FakeCms {
    async fn upload_image(&self, upload: ImageUpload) -> Result<String, ImageError> {
        let url = format!("https://cms.example/content/images/{}", upload.file_name);
        self.uploads.lock().expect("uploads").push(url.clone());
        Ok(url)
    }
}

#[async_trait]
impl CmsClient for FakeCms {
    async fn create_post(&self, post: CmsPost) -> Result<CmsPostReceipt, CmsError> {
        if self.reject_posts {
            return Err(CmsError::Rejected {
                status: 500,
                body: "internal error".to_string(),
            });
        }
        let mut posts = self.posts.lock().expect("posts");
        posts.push(post);
        Ok(CmsPostReceipt {
            id: format!("post-{}", posts.len()),
            url: None,
        })
    }

    fn as_image_host(&self) -> &dyn ImageHost {
        self
    }
}

#[derive(Debug, Clone)]
pub struct StoredFile {
    pub sha: String,
    pub content: String,
}

#[derive(Debug, Clone)]
pub struct OpenPull {
    pub number: u64,
    pub head: String,
    pub base: String,
    pub title: String,
}

#[derive(Default)]
struct GitState {
    heads: HashMap<String, String>,
    files: HashMap<String, BTreeMap<String, StoredFile>>,
    pulls: Vec<OpenPull>,
    writes: Vec<FileWrite>,
    sequence: u64,
}

/// One repository (`acme/site`, default branch `main`) held in memory.
pub struct FakeGitHost {
    state: Mutex<GitState>,
}

impl Default for FakeGitHost {
    fn default() -> Self {
        let mut state = GitState::default();
        state.heads.insert("main".to_string(), "commit-0".to_string());
        state.files.insert("main".to_string(), BTreeMap::new());
        Self {
            state: Mutex::new(state),
        }
    }
}

impl FakeGitHost {
    pub const REPO: &'static str = "acme/site";

    pub fn branches(&self) -> Vec<String> {
        let state = self.state.lock().expect("git state");
        let mut branches: Vec<_> = state.heads.keys().cloned().collect();
        branches.sort();
        branches
    }

    pub fn pulls(&self) -> Vec<OpenPull> {
        self.state.lock().expect("git state").pulls.clone()
    }

    pub fn writes(&self) -> Vec<FileWrite> {
        self.state.lock().expect("git state").writes.clone()
    }

    /// Decoded file text at `path` on `branch`.
    pub fn file(&self, branch: &str, path: &str) -> Option<String> {
        let state = self.state.lock().expect("git state");
        let stored = state.files.get(branch)?.get(path)?;
        let bytes = base64::engine::general_purpose::STANDARD
            .decode(&stored.content)
            .expect("base64 content");
        Some(String::from_utf8(bytes).expect("utf-8 content"))
    }

    /// Seed a file directly on `branch`, creating the branch from `main` if needed.
    pub fn seed_file(&self, branch: &str, path: &str, text: &str) {
        let mut state = self.state.lock().expect("git state");
        state.sequence += 1;
        let sequence = state.sequence;
        if !state.heads.contains_key(branch) {
            let files = state.files.get("main").cloned().unwrap_or_default();
            state.files.insert(branch.to_string(), files);
        }
        state
            .heads
            .insert(branch.to_string(), format!("commit-{sequence}"));
        state.files.entry(branch.to_string()).or_default().insert(
            path.to_string(),
            StoredFile {
                sha: format!("blob-{sequence}"),
                content: base64::engine::general_purpose::STANDARD.encode(text),
            },
        );
    }

    fn check_repo(repo: &RepoRef) -> Result<(), GitHostError> {
        if repo.to_string() == Self::REPO {
            Ok(())
        } else {
            Err(GitHostError::NotFound)
        }
    }
}

#[async_trait]
impl GitHost for FakeGitHost {
    async fn get_repo(&self, repo: &RepoRef) -> Result<RepositoryInfo, GitHostError> {
        Self::check_repo(repo)?;
        Ok(RepositoryInfo {
            default_branch: "main".to_string(),
        })
    }

    async fn get_ref(&self, repo: &RepoRef, branch: &str) -> Result<Option<String>, GitHostError> {
        Self::check_repo(repo)?;
        Ok(self
            .state
            .lock()
            .expect("git state")
            .heads
            .get(branch)
            .cloned())
    }

    async fn create_ref(
        &self,
        repo: &RepoRef,
        branch: &str,
        sha: &str,
    ) -> Result<(), GitHostError> {
        Self::check_repo(repo)?;
        let mut state = self.state.lock().expect("git state");
        if state.heads.contains_key(branch) {
            return Err(GitHostError::Conflict {
                message: "Reference already exists".to_string(),
            });
        }
        let source = state
            .heads
            .iter()
            .find(|(_, head)| head.as_str() == sha)
            .map(|(name, _)| name.clone())
            .ok_or(GitHostError::Conflict {
                message: "Object does not exist".to_string(),
            })?;
        let files = state.files.get(&source).cloned().unwrap_or_default();
        state.files.insert(branch.to_string(), files);
        state.heads.insert(branch.to_string(), sha.to_string());
        Ok(())
    }

    async fn get_content(
        &self,
        repo: &RepoRef,
        path: &str,
        branch: &str,
    ) -> Result<Option<FileContent>, GitHostError> {
        Self::check_repo(repo)?;
        let state = self.state.lock().expect("git state");
        Ok(state
            .files
            .get(branch)
            .and_then(|files| files.get(path))
            .map(|file| FileContent {
                sha: file.sha.clone(),
            }))
    }

    async fn put_content(&self, repo: &RepoRef, write: FileWrite) -> Result<(), GitHostError> {
        Self::check_repo(repo)?;
        let mut state = self.state.lock().expect("git state");
        let existing = state
            .files
            .get(&write.branch)
            .ok_or(GitHostError::NotFound)?
            .get(&write.path)
            .map(|file| file.sha.clone());
        if existing != write.sha {
            return Err(GitHostError::Conflict {
                message: "sha does not match".to_string(),
            });
        }

        state.sequence += 1;
        let sequence = state.sequence;
        state
            .heads
            .insert(write.branch.clone(), format!("commit-{sequence}"));
        state.files.entry(write.branch.clone()).or_default().insert(
            write.path.clone(),
            StoredFile {
                sha: format!("blob-{sequence}"),
                content: write.content.clone(),
            },
        );
        state.writes.push(write);
        Ok(())
    }

    async fn create_pull_request(
        &self,
        repo: &RepoRef,
        request: NewPullRequest,
    ) -> Result<PullRequest, GitHostError> {
        Self::check_repo(repo)?;
        let mut state = self.state.lock().expect("git state");
        let number = state.pulls.len() as u64 + 1;
        state.pulls.push(OpenPull {
            number,
            head: request.head,
            base: request.base,
            title: request.title,
        });
        Ok(PullRequest {
            number,
            url: format!("https://github.com/{}/pull/{number}", Self::REPO),
        })
    }

    async fn find_open_pull_request(
        &self,
        repo: &RepoRef,
        head: &str,
    ) -> Result<Option<PullRequest>, GitHostError> {
        Self::check_repo(repo)?;
        let branch = head.split_once(':').map_or(head, |(_, branch)| branch);
        let state = self.state.lock().expect("git state");
        Ok(state
            .pulls
            .iter()
            .find(|pull| pull.head == branch)
            .map(|pull| PullRequest {
                number: pull.number,
                url: format!("https://github.com/{}/pull/{}", Self::REPO, pull.number),
            }))
    }
}

pub struct FakeIntegrations {
    pub cms: Arc<FakeCms>,
    pub git: Arc<FakeGitHost>,
}

impl Integrations for FakeIntegrations {
    fn cms_client(&self, _target: &CmsTarget) -> Result<Arc<dyn CmsClient>, CmsError> {
        Ok(self.cms.clone())
    }

    fn git_host(&self, _target: &GitTarget) -> Arc<dyn GitHost> {
        self.git.clone()
    }
}

/// Everything a test needs to drive both pipelines against fakes.
pub struct Harness {
    pub queue: Arc<MemoryJobQueue>,
    pub articles: Arc<MemoryArticles>,
    pub generator: Arc<FakeGenerator>,
    pub resolver: Arc<FakeResolver>,
    pub cms: Arc<FakeCms>,
    pub git: Arc<FakeGitHost>,
    pub context: JobWorkerContext,
}

pub struct HarnessOptions {
    pub draft: Result<String, String>,
    pub cms: FakeCms,
    pub policy: PublishPolicy,
    pub branch_naming: BranchNaming,
    pub max_attempts: i32,
}

impl Default for HarnessOptions {
    fn default() -> Self {
        Self {
            draft: Ok("# Title\n\nBody.".to_string()),
            cms: FakeCms::default(),
            policy: PublishPolicy::BestEffort,
            branch_naming: BranchNaming::Timestamped,
            max_attempts: 3,
        }
    }
}

impl Harness {
    pub fn new(options: HarnessOptions) -> Self {
        let queue = Arc::new(MemoryJobQueue::default());
        let articles = Arc::new(MemoryArticles::new(queue.clone()));
        let generator = Arc::new(match &options.draft {
            Ok(draft) => FakeGenerator::returning(draft),
            Err(message) => FakeGenerator::failing(message),
        });
        let resolver = Arc::new(FakeResolver::default());
        let cms = Arc::new(options.cms);
        let git = Arc::new(FakeGitHost::default());

        let integrations = Arc::new(FakeIntegrations {
            cms: cms.clone(),
            git: git.clone(),
        });

        let context = JobWorkerContext {
            articles: articles.clone(),
            queue: queue.clone(),
            generator: generator.clone(),
            transformer: Arc::new(DocumentTransformer::new(resolver.clone())),
            orchestrator: Arc::new(PublishOrchestrator::new(
                integrations,
                resolver.clone(),
                options.branch_naming,
            )),
            policy: options.policy,
            environment: ENVIRONMENT.to_string(),
            max_attempts: options.max_attempts,
        };

        Self {
            queue,
            articles,
            generator,
            resolver,
            cms,
            git,
            context,
        }
    }
}

pub const WEBSITE: WebsiteId = WebsiteId(7);

pub fn article(id: i64, topic: &str) -> Article {
    Article {
        id: ArticleId(id),
        website_id: WEBSITE,
        topic: topic.to_string(),
        title: None,
        markdown_body: None,
        scheduled_at: None,
        published_at: None,
        backlinks: Vec::new(),
        job_id: None,
    }
}

pub fn cms_target() -> CmsTarget {
    CmsTarget {
        api_url: "https://cms.example".to_string(),
        api_key: "key-id:00ff".to_string(),
    }
}

pub fn git_target(repo_name: &str) -> GitTarget {
    GitTarget {
        repo_name: repo_name.to_string(),
        api_key: "ghp_test".to_string(),
        dir_path: Some("content/blog".to_string()),
    }
}
