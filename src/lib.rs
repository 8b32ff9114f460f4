pub mod app;
pub mod bitbucket;
pub mod changes;
pub mod cli;
pub mod config;
pub mod git;
pub mod ignores;
pub mod scheduler;
pub mod state;
pub mod tui;
pub mod view;

use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Stable identity of a pull request: `"<repo>/<id>"`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PrUid(String);

impl PrUid {
    pub fn new(repo: &str, id: u64) -> Self {
        Self(format!("{}/{}", repo, id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for PrUid {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl fmt::Display for PrUid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The current user's own review on a pull request.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Review {
    #[default]
    None,
    Approved,
    ChangesRequested,
}

/// One fetched pull request at one point in time.
///
/// Snapshots are never mutated after a fetch; every refresh produces a new
/// generation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PullRequest {
    pub id: u64,
    pub repo: String,
    pub title: String,
    pub author: String,
    pub last_commit: String,
    pub source_branch: String,
    pub target_branch: String,
    pub comments_count: u32,
    pub reviewers_count: u32,
    pub approved_count: u32,
    pub changes_requested_count: u32,
    pub my_review: Review,
    pub updated_on: DateTime<FixedOffset>,
    pub url: String,
    pub is_mine: bool,
    pub am_i_participating: bool,
}

impl PullRequest {
    pub fn uid(&self) -> PrUid {
        PrUid::new(&self.repo, self.id)
    }
}

/// A semantic "what changed" marker produced by diffing two snapshots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChangeTag {
    Committed,
    Commented,
    Approved,
    ChangesRequested,
    MyReviewChanged,
}

impl ChangeTag {
    pub fn as_str(self) -> &'static str {
        match self {
            ChangeTag::Committed => "committed",
            ChangeTag::Commented => "commented",
            ChangeTag::Approved => "approved",
            ChangeTag::ChangesRequested => "changes-requested",
            ChangeTag::MyReviewChanged => "my-review-changed",
        }
    }
}

impl fmt::Display for ChangeTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
