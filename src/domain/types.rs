//! Shared domain enumerations.

use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArticleState {
    Pending,
    Generated,
    Published,
}

impl ArticleState {
    pub fn as_str(self) -> &'static str {
        match self {
            ArticleState::Pending => "pending",
            ArticleState::Generated => "generated",
            ArticleState::Published => "published",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    Pending,
    Running,
    Done,
    Killed,
}

impl JobState {
    pub fn as_str(self) -> &'static str {
        match self {
            JobState::Pending => "Pending",
            JobState::Running => "Running",
            JobState::Done => "Done",
            JobState::Killed => "Killed",
        }
    }
}

/// When an article counts as published after its targets have been attempted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PublishPolicy {
    /// Mark published once every target was attempted, regardless of outcome.
    #[default]
    BestEffort,
    /// Mark published when at least one target succeeded.
    AnyMustSucceed,
    /// Mark published only when no target failed.
    AllMustSucceed,
}

impl PublishPolicy {
    pub fn as_str(self) -> &'static str {
        match self {
            PublishPolicy::BestEffort => "best_effort",
            PublishPolicy::AnyMustSucceed => "any_must_succeed",
            PublishPolicy::AllMustSucceed => "all_must_succeed",
        }
    }
}

impl fmt::Display for PublishPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<&str> for PublishPolicy {
    type Error = ();

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value {
            "best_effort" => Ok(PublishPolicy::BestEffort),
            "any_must_succeed" => Ok(PublishPolicy::AnyMustSucceed),
            "all_must_succeed" => Ok(PublishPolicy::AllMustSucceed),
            _ => Err(()),
        }
    }
}

/// How Git publish branches are named across retries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BranchNaming {
    /// Every attempt proposes a fresh branch and pull request.
    #[default]
    Timestamped,
    /// Retries converge on one branch and its open pull request.
    Stable,
}

impl BranchNaming {
    pub fn as_str(self) -> &'static str {
        match self {
            BranchNaming::Timestamped => "timestamped",
            BranchNaming::Stable => "stable",
        }
    }
}

impl TryFrom<&str> for BranchNaming {
    type Error = ();

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value {
            "timestamped" => Ok(BranchNaming::Timestamped),
            "stable" => Ok(BranchNaming::Stable),
            _ => Err(()),
        }
    }
}
