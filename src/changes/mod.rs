use crate::{ChangeTag, PrUid, PullRequest};
use std::collections::HashMap;

/// Compare two snapshots of the same pull request.
///
/// Every field check runs; tags come out in a fixed order. Both snapshots must
/// share the same identity.
pub fn diff(previous: &PullRequest, current: &PullRequest) -> Vec<ChangeTag> {
    debug_assert_eq!(
        previous.uid(),
        current.uid(),
        "diff called on different pull requests"
    );

    let mut tags = Vec::new();

    if current.last_commit != previous.last_commit {
        tags.push(ChangeTag::Committed);
    }
    if current.comments_count != previous.comments_count {
        tags.push(ChangeTag::Commented);
    }
    if current.approved_count != previous.approved_count {
        tags.push(ChangeTag::Approved);
    }
    if current.changes_requested_count != previous.changes_requested_count {
        tags.push(ChangeTag::ChangesRequested);
    }
    if current.my_review != previous.my_review {
        tags.push(ChangeTag::MyReviewChanged);
    }

    tags
}

/// Baselines the user has acknowledged, keyed by pull request identity.
///
/// A baseline only moves forward on [`ChangeTracker::dismiss`]; fetching a new
/// batch never advances an existing one, so change tags stick until dismissed.
#[derive(Debug, Clone, Default)]
pub struct ChangeTracker {
    baselines: HashMap<PrUid, PullRequest>,
}

impl ChangeTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Restore from persisted baselines.
    pub fn with_baselines(baselines: HashMap<PrUid, PullRequest>) -> Self {
        Self { baselines }
    }

    /// Changes of `pr` relative to its baseline. Unknown pull requests have none.
    pub fn what_changed(&self, pr: &PullRequest) -> Vec<ChangeTag> {
        match self.baselines.get(&pr.uid()) {
            Some(baseline) => diff(baseline, pr),
            None => Vec::new(),
        }
    }

    /// Seed baselines for pull requests seen for the first time.
    ///
    /// Returns the number of new baselines.
    pub fn record_batch(&mut self, prs: &[PullRequest]) -> usize {
        let mut added = 0;
        for pr in prs {
            self.baselines.entry(pr.uid()).or_insert_with(|| {
                added += 1;
                pr.clone()
            });
        }
        added
    }

    /// Acknowledge the current state of `pr`.
    pub fn dismiss(&mut self, pr: &PullRequest) {
        self.baselines.insert(pr.uid(), pr.clone());
    }

    pub fn baselines(&self) -> &HashMap<PrUid, PullRequest> {
        &self.baselines
    }
}
