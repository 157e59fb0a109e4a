use async_trait::async_trait;
use time::OffsetDateTime;

use crate::{
    application::repos::{ArticlesRepo, RepoError},
    domain::{
        entities::{Article, ArticleId, WebsiteId},
        targets::{CmsTarget, GitTarget, PublishTargets},
    },
};

use super::{PostgresRepositories, map_sqlx_error};

#[derive(sqlx::FromRow)]
struct ArticleRow {
    id: i64,
    website_id: i64,
    topic: String,
    title: Option<String>,
    markdown_body: Option<String>,
    scheduled_at: Option<OffsetDateTime>,
    published_at: Option<OffsetDateTime>,
    backlinks: Vec<String>,
    job_id: Option<String>,
}

impl From<ArticleRow> for Article {
    fn from(row: ArticleRow) -> Self {
        Self {
            id: ArticleId(row.id),
            website_id: WebsiteId(row.website_id),
            topic: row.topic,
            title: row.title,
            markdown_body: row.markdown_body,
            scheduled_at: row.scheduled_at,
            published_at: row.published_at,
            backlinks: row.backlinks,
            job_id: row.job_id,
        }
    }
}

#[derive(sqlx::FromRow)]
struct IntegrationRow {
    id: i64,
    kind: String,
    api_url: Option<String>,
    api_key: String,
    repo_name: Option<String>,
    dir_path: Option<String>,
}

fn collect_targets(rows: Vec<IntegrationRow>) -> Result<PublishTargets, RepoError> {
    let mut targets = PublishTargets::default();

    for row in rows {
        match row.kind.as_str() {
            "cms" => {
                let api_url = row.api_url.ok_or_else(|| RepoError::Integrity {
                    message: format!("cms integration {} has no api_url", row.id),
                })?;
                targets.cms = Some(CmsTarget {
                    api_url,
                    api_key: row.api_key,
                });
            }
            "git" => {
                let repo_name = row.repo_name.ok_or_else(|| RepoError::Integrity {
                    message: format!("git integration {} has no repo_name", row.id),
                })?;
                targets.git.push(GitTarget {
                    repo_name,
                    api_key: row.api_key,
                    dir_path: row.dir_path,
                });
            }
            other => {
                return Err(RepoError::Integrity {
                    message: format!("integration {} has unknown kind `{other}`", row.id),
                });
            }
        }
    }

    Ok(targets)
}

#[async_trait]
impl ArticlesRepo for PostgresRepositories {
    async fn find_article(&self, id: ArticleId) -> Result<Option<Article>, RepoError> {
        let row = sqlx::query_as::<_, ArticleRow>(
            r#"
            SELECT id,
                   website_id,
                   topic,
                   title,
                   markdown_body,
                   scheduled_at,
                   published_at,
                   backlinks,
                   job_id
              FROM articles
             WHERE id = $1
            "#,
        )
        .bind(id.0)
        .fetch_optional(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(row.map(Article::from))
    }

    async fn save_generated(
        &self,
        id: ArticleId,
        title: &str,
        markdown_body: &str,
    ) -> Result<(), RepoError> {
        let result = sqlx::query(
            r#"
            UPDATE articles
               SET title = $2,
                   markdown_body = $3,
                   updated_at = now()
             WHERE id = $1
            "#,
        )
        .bind(id.0)
        .bind(title)
        .bind(markdown_body)
        .execute(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        if result.rows_affected() == 0 {
            return Err(RepoError::NotFound);
        }
        Ok(())
    }

    async fn mark_published(
        &self,
        id: ArticleId,
        published_at: OffsetDateTime,
    ) -> Result<(), RepoError> {
        let result = sqlx::query(
            r#"
            UPDATE articles
               SET published_at = $2,
                   updated_at = now()
             WHERE id = $1
            "#,
        )
        .bind(id.0)
        .bind(published_at)
        .execute(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        if result.rows_affected() == 0 {
            return Err(RepoError::NotFound);
        }
        Ok(())
    }

    async fn attach_job(&self, id: ArticleId, job_id: &str) -> Result<(), RepoError> {
        let result = sqlx::query(
            r#"
            UPDATE articles
               SET job_id = $2,
                   updated_at = now()
             WHERE id = $1
            "#,
        )
        .bind(id.0)
        .bind(job_id)
        .execute(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        if result.rows_affected() == 0 {
            return Err(RepoError::NotFound);
        }
        Ok(())
    }

    async fn publish_targets(&self, website_id: WebsiteId) -> Result<PublishTargets, RepoError> {
        let rows = sqlx::query_as::<_, IntegrationRow>(
            r#"
            SELECT id, kind, api_url, api_key, repo_name, dir_path
              FROM website_integrations
             WHERE website_id = $1
             ORDER BY position, id
            "#,
        )
        .bind(website_id.0)
        .fetch_all(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        collect_targets(rows)
    }

    /// Articles whose attached job was killed are skipped until an operator
    /// enqueues them again.
    async fn due_for_publish(
        &self,
        now: OffsetDateTime,
        limit: u32,
    ) -> Result<Vec<ArticleId>, RepoError> {
        let ids: Vec<i64> = sqlx::query_scalar(
            r#"
            SELECT a.id
              FROM articles a
             WHERE a.scheduled_at <= $1
               AND a.published_at IS NULL
               AND a.markdown_body IS NOT NULL
               AND NOT EXISTS (
                   SELECT 1
                     FROM jobs j
                    WHERE j.id = a.job_id
                      AND j.status IN ('Pending', 'Running', 'Killed')
               )
             ORDER BY a.scheduled_at ASC, a.id ASC
             LIMIT $2
            "#,
        )
        .bind(now)
        .bind(i64::from(limit))
        .fetch_all(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(ids.into_iter().map(ArticleId).collect())
    }
}
