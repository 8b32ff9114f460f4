use crate::{PrUid, PullRequest};
use chrono::{DateTime, FixedOffset};
use std::collections::HashMap;

/// Per pull request "ignored as of" markers.
///
/// An ignore lapses on its own once the pull request is updated after the
/// stored timestamp.
#[derive(Debug, Clone, Default)]
pub struct IgnoreRegistry {
    ignored: HashMap<PrUid, DateTime<FixedOffset>>,
    show_ignored: bool,
}

impl IgnoreRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Restore from persisted state.
    pub fn from_parts(ignored: HashMap<PrUid, DateTime<FixedOffset>>, show_ignored: bool) -> Self {
        Self {
            ignored,
            show_ignored,
        }
    }

    /// Ignore `pr` as of its current update time, or drop an existing entry.
    ///
    /// Returns `true` when the pull request is now ignored.
    pub fn toggle_ignore(&mut self, pr: &PullRequest) -> bool {
        let uid = pr.uid();
        if self.ignored.remove(&uid).is_some() {
            false
        } else {
            self.ignored.insert(uid, pr.updated_on);
            true
        }
    }

    pub fn is_ignored(&self, pr: &PullRequest) -> bool {
        self.ignored
            .get(&pr.uid())
            .is_some_and(|until| pr.updated_on <= *until)
    }

    pub fn is_hidden(&self, pr: &PullRequest) -> bool {
        self.is_ignored(pr) && !self.show_ignored
    }

    pub fn toggle_show_ignored(&mut self) -> bool {
        self.show_ignored = !self.show_ignored;
        self.show_ignored
    }

    pub fn show_ignored(&self) -> bool {
        self.show_ignored
    }

    pub fn entries(&self) -> &HashMap<PrUid, DateTime<FixedOffset>> {
        &self.ignored
    }
}
