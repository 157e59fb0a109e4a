//! GitHub REST client for the Git publisher.

use async_trait::async_trait;
use reqwest::{
    Client, Method, RequestBuilder, Response, StatusCode, Url,
    header::{ACCEPT, AUTHORIZATION},
};
use serde::{Deserialize, de::DeserializeOwned};
use serde_json::json;

use crate::{
    application::publish::{
        FileContent, FileWrite, GitHost, GitHostError, NewPullRequest, PullRequest,
        RepositoryInfo,
    },
    domain::targets::RepoRef,
};

const API_VERSION: &str = "2022-11-28";

#[derive(Deserialize)]
struct RepositoryRecord {
    default_branch: String,
}

#[derive(Deserialize)]
struct RefRecord {
    object: RefObject,
}

#[derive(Deserialize)]
struct RefObject {
    sha: String,
}

#[derive(Deserialize)]
struct ContentRecord {
    sha: String,
}

#[derive(Deserialize)]
struct PullRecord {
    number: u64,
    html_url: String,
}

impl From<PullRecord> for PullRequest {
    fn from(record: PullRecord) -> Self {
        Self {
            number: record.number,
            url: record.html_url,
        }
    }
}

pub struct GitHubClient {
    client: Client,
    base: Url,
    token: String,
}

impl GitHubClient {
    pub fn new(client: Client, base: Url, token: impl Into<String>) -> Self {
        Self {
            client,
            base,
            token: token.into(),
        }
    }

    /// `/repos/{owner}/{name}/...`, each piece percent-encoded as a path segment.
    fn repo_url(&self, repo: &RepoRef, tail: &[&str]) -> Result<Url, GitHostError> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|()| GitHostError::Http {
                message: "github api url cannot be a base".to_string(),
            })?
            .pop_if_empty()
            .extend(["repos", repo.owner.as_str(), repo.name.as_str()])
            .extend(
                tail.iter()
                    .flat_map(|piece| piece.split('/'))
                    .filter(|segment| !segment.is_empty()),
            );
        Ok(url)
    }

    fn request(&self, method: Method, url: Url) -> RequestBuilder {
        self.client
            .request(method, url)
            .header(AUTHORIZATION, format!("Bearer {}", self.token))
            .header(ACCEPT, "application/vnd.github+json")
            .header("X-GitHub-Api-Version", API_VERSION)
    }

    async fn send<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, GitHostError> {
        let response = request.send().await.map_err(|err| GitHostError::Http {
            message: err.to_string(),
        })?;
        handle(response).await
    }

    /// Like [`send`](Self::send) but maps 404 to `None`.
    async fn send_optional<T: DeserializeOwned>(
        &self,
        request: RequestBuilder,
    ) -> Result<Option<T>, GitHostError> {
        match self.send(request).await {
            Ok(value) => Ok(Some(value)),
            Err(GitHostError::NotFound) => Ok(None),
            Err(err) => Err(err),
        }
    }
}

async fn handle<T: DeserializeOwned>(response: Response) -> Result<T, GitHostError> {
    let status = response.status();
    let bytes = response.bytes().await.map_err(|err| GitHostError::Http {
        message: err.to_string(),
    })?;
    let message = || String::from_utf8_lossy(&bytes).into_owned();

    match status {
        StatusCode::NOT_FOUND => Err(GitHostError::NotFound),
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(GitHostError::Unauthorized {
            message: message(),
        }),
        StatusCode::CONFLICT | StatusCode::UNPROCESSABLE_ENTITY => Err(GitHostError::Conflict {
            message: message(),
        }),
        status if !status.is_success() => Err(GitHostError::Status {
            status: status.as_u16(),
            message: message(),
        }),
        _ => serde_json::from_slice(&bytes).map_err(|err| GitHostError::Decode {
            message: err.to_string(),
        }),
    }
}

#[async_trait]
impl GitHost for GitHubClient {
    async fn get_repo(&self, repo: &RepoRef) -> Result<RepositoryInfo, GitHostError> {
        let url = self.repo_url(repo, &[])?;
        let record: RepositoryRecord = self.send(self.request(Method::GET, url)).await?;
        Ok(RepositoryInfo {
            default_branch: record.default_branch,
        })
    }

    async fn get_ref(&self, repo: &RepoRef, branch: &str) -> Result<Option<String>, GitHostError> {
        let url = self.repo_url(repo, &["git/ref/heads", branch])?;
        let record: Option<RefRecord> = self.send_optional(self.request(Method::GET, url)).await?;
        Ok(record.map(|record| record.object.sha))
    }

    async fn create_ref(
        &self,
        repo: &RepoRef,
        branch: &str,
        sha: &str,
    ) -> Result<(), GitHostError> {
        let url = self.repo_url(repo, &["git/refs"])?;
        let body = json!({ "ref": format!("refs/heads/{branch}"), "sha": sha });
        let _: serde_json::Value = self.send(self.request(Method::POST, url).json(&body)).await?;
        Ok(())
    }

    async fn get_content(
        &self,
        repo: &RepoRef,
        path: &str,
        branch: &str,
    ) -> Result<Option<FileContent>, GitHostError> {
        let mut url = self.repo_url(repo, &["contents", path])?;
        url.query_pairs_mut().append_pair("ref", branch);
        let record: Option<ContentRecord> =
            self.send_optional(self.request(Method::GET, url)).await?;
        Ok(record.map(|record| FileContent { sha: record.sha }))
    }

    async fn put_content(&self, repo: &RepoRef, write: FileWrite) -> Result<(), GitHostError> {
        let url = self.repo_url(repo, &["contents", write.path.as_str()])?;
        let mut body = json!({
            "message": write.message,
            "content": write.content,
            "branch": write.branch,
        });
        if let Some(sha) = write.sha {
            body["sha"] = json!(sha);
        }
        let _: serde_json::Value = self.send(self.request(Method::PUT, url).json(&body)).await?;
        Ok(())
    }

    async fn create_pull_request(
        &self,
        repo: &RepoRef,
        request: NewPullRequest,
    ) -> Result<PullRequest, GitHostError> {
        let url = self.repo_url(repo, &["pulls"])?;
        let body = json!({
            "title": request.title,
            "body": request.body,
            "head": request.head,
            "base": request.base,
        });
        let record: PullRecord = self.send(self.request(Method::POST, url).json(&body)).await?;
        Ok(record.into())
    }

    async fn find_open_pull_request(
        &self,
        repo: &RepoRef,
        head: &str,
    ) -> Result<Option<PullRequest>, GitHostError> {
        let mut url = self.repo_url(repo, &["pulls"])?;
        url.query_pairs_mut()
            .append_pair("head", head)
            .append_pair("state", "open");
        let records: Vec<PullRecord> = self.send(self.request(Method::GET, url)).await?;
        Ok(records.into_iter().next().map(PullRequest::from))
    }
}

#[cfg(test)]
mod tests {
    use httpmock::MockServer;
    use serde_json::json;

    use super::*;

    fn client(server: &MockServer) -> GitHubClient {
        let base = Url::parse(&server.base_url()).expect("base url");
        GitHubClient::new(Client::new(), base, "ghp_test")
    }

    fn repo() -> RepoRef {
        RepoRef::parse("acme/site").expect("repo")
    }

    #[tokio::test]
    async fn get_repo_reads_default_branch() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method("GET")
                .path("/repos/acme/site")
                .header("authorization", "Bearer ghp_test");
            then.status(200)
                .json_body(json!({ "default_branch": "main", "full_name": "acme/site" }));
        });

        let info = client(&server).get_repo(&repo()).await.expect("repo");

        mock.assert();
        assert_eq!(info.default_branch, "main");
    }

    #[tokio::test]
    async fn missing_repository_is_not_found() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method("GET").path("/repos/acme/site");
            then.status(404).json_body(json!({ "message": "Not Found" }));
        });

        let err = client(&server).get_repo(&repo()).await.expect_err("404");
        assert!(matches!(err, GitHostError::NotFound));
    }

    #[tokio::test]
    async fn get_ref_handles_branch_with_slashes() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method("GET")
                .path("/repos/acme/site/git/ref/heads/feat/add-article-x");
            then.status(200)
                .json_body(json!({ "ref": "refs/heads/feat/add-article-x", "object": { "sha": "abc123" } }));
        });

        let sha = client(&server)
            .get_ref(&repo(), "feat/add-article-x")
            .await
            .expect("ref");
        assert_eq!(sha.as_deref(), Some("abc123"));
    }

    #[tokio::test]
    async fn absent_file_yields_none() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method("GET")
                .path("/repos/acme/site/contents/content/blog/x.mdx")
                .query_param("ref", "feat/add-article-x");
            then.status(404).json_body(json!({ "message": "Not Found" }));
        });

        let content = client(&server)
            .get_content(&repo(), "content/blog/x.mdx", "feat/add-article-x")
            .await
            .expect("lookup");
        assert_eq!(content, None);
    }

    #[tokio::test]
    async fn put_content_sends_sha_for_updates() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method("PUT")
                .path("/repos/acme/site/contents/x.mdx")
                .json_body(json!({
                    "message": "Add article: X",
                    "content": "aGk=",
                    "branch": "feat/add-article-x",
                    "sha": "old-sha",
                }));
            then.status(200).json_body(json!({ "content": { "sha": "new-sha" } }));
        });

        client(&server)
            .put_content(
                &repo(),
                FileWrite {
                    path: "x.mdx".to_string(),
                    branch: "feat/add-article-x".to_string(),
                    message: "Add article: X".to_string(),
                    content: "aGk=".to_string(),
                    sha: Some("old-sha".to_string()),
                },
            )
            .await
            .expect("write");

        mock.assert();
    }

    #[tokio::test]
    async fn create_pull_request_returns_number_and_url() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method("POST").path("/repos/acme/site/pulls");
            then.status(201).json_body(json!({
                "number": 7,
                "html_url": "https://github.com/acme/site/pull/7"
            }));
        });

        let pr = client(&server)
            .create_pull_request(
                &repo(),
                NewPullRequest {
                    title: "Add article: X".to_string(),
                    body: "Adds `x.mdx`.".to_string(),
                    head: "feat/add-article-x".to_string(),
                    base: "main".to_string(),
                },
            )
            .await
            .expect("pr");
        assert_eq!(pr.number, 7);
        assert_eq!(pr.url, "https://github.com/acme/site/pull/7");
    }

    #[tokio::test]
    async fn validation_failure_is_conflict() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method("POST").path("/repos/acme/site/git/refs");
            then.status(422)
                .json_body(json!({ "message": "Reference already exists" }));
        });

        let err = client(&server)
            .create_ref(&repo(), "feat/add-article-x", "abc")
            .await
            .expect_err("exists");
        assert!(matches!(err, GitHostError::Conflict { .. }));
    }
}
