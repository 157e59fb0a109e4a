//! Domain entities mirrored from persistent storage.

use std::fmt;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use url::Url;

use crate::domain::types::ArticleState;

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, sqlx::Type,
)]
#[serde(transparent)]
#[sqlx(transparent)]
pub struct ArticleId(pub i64);

impl fmt::Display for ArticleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, sqlx::Type,
)]
#[serde(transparent)]
#[sqlx(transparent)]
pub struct WebsiteId(pub i64);

impl fmt::Display for WebsiteId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Article aggregate as the pipeline sees it.
///
/// Rows are created in the topic-only state by the CRUD layer; generation fills
/// `title` and `markdown_body`, publishing sets `published_at`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Article {
    pub id: ArticleId,
    pub website_id: WebsiteId,
    pub topic: String,
    pub title: Option<String>,
    pub markdown_body: Option<String>,
    pub scheduled_at: Option<OffsetDateTime>,
    pub published_at: Option<OffsetDateTime>,
    pub backlinks: Vec<String>,
    pub job_id: Option<String>,
}

impl Article {
    pub fn state(&self) -> ArticleState {
        if self.published_at.is_some() {
            ArticleState::Published
        } else if self.markdown_body.is_some() {
            ArticleState::Generated
        } else {
            ArticleState::Pending
        }
    }
}

/// A link the generated article must include, stored as `"<url> - <anchor>"`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Backlink {
    pub url: Url,
    pub anchor: String,
}

impl Backlink {
    /// Parse the stored representation. Entries without an anchor use the URL as
    /// anchor text; entries that are not absolute `http(s)` URLs are rejected.
    pub fn parse(raw: &str) -> Option<Self> {
        let raw = raw.trim();
        let (url_part, anchor_part) = match raw.split_once(" - ") {
            Some((url, anchor)) => (url.trim(), anchor.trim()),
            None => (raw, ""),
        };

        let url = Url::parse(url_part).ok()?;
        if !matches!(url.scheme(), "http" | "https") {
            return None;
        }

        let anchor = if anchor_part.is_empty() {
            url_part.to_string()
        } else {
            anchor_part.to_string()
        };

        Some(Self { url, anchor })
    }

    pub fn to_markdown(&self) -> String {
        format!("[{}]({})", self.anchor, self.url)
    }
}
