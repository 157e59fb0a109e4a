//! Publish destinations configured per website.

use std::fmt;

use crate::domain::error::DomainError;

/// Ghost-style CMS destination.
#[derive(Clone, PartialEq, Eq)]
pub struct CmsTarget {
    pub api_url: String,
    pub api_key: String,
}

impl fmt::Debug for CmsTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CmsTarget")
            .field("api_url", &self.api_url)
            .field("api_key", &"<redacted>")
            .finish()
    }
}

/// Git-hosted static site destination.
#[derive(Clone, PartialEq, Eq)]
pub struct GitTarget {
    pub repo_name: String,
    pub api_key: String,
    pub dir_path: Option<String>,
}

impl GitTarget {
    pub fn repository(&self) -> Result<RepoRef, DomainError> {
        RepoRef::parse(&self.repo_name)
    }

    /// Directory inside the repository, without leading or trailing slashes.
    pub fn directory(&self) -> Option<&str> {
        self.dir_path
            .as_deref()
            .map(|dir| dir.trim().trim_matches('/'))
            .filter(|dir| !dir.is_empty())
    }
}

impl fmt::Debug for GitTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GitTarget")
            .field("repo_name", &self.repo_name)
            .field("api_key", &"<redacted>")
            .field("dir_path", &self.dir_path)
            .finish()
    }
}

/// Zero or one CMS target and zero or more Git targets.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PublishTargets {
    pub cms: Option<CmsTarget>,
    pub git: Vec<GitTarget>,
}

impl PublishTargets {
    pub fn len(&self) -> usize {
        usize::from(self.cms.is_some()) + self.git.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RepoRef {
    pub owner: String,
    pub name: String,
}

impl RepoRef {
    pub fn parse(value: &str) -> Result<Self, DomainError> {
        let trimmed = value.trim().trim_matches('/');
        let invalid = || DomainError::InvalidRepository {
            value: value.to_string(),
        };

        let (owner, name) = trimmed.split_once('/').ok_or_else(invalid)?;
        if owner.is_empty() || name.is_empty() || name.contains('/') {
            return Err(invalid());
        }

        Ok(Self {
            owner: owner.to_string(),
            name: name.to_string(),
        })
    }
}

impl fmt::Display for RepoRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.owner, self.name)
    }
}
