use crate::changes::ChangeTracker;
use crate::ignores::IgnoreRegistry;
use crate::{ChangeTag, PullRequest};
use chrono::{DateTime, TimeZone};

/// Quick filters toggled from the keyboard.
#[derive(Debug, Clone, Copy, Default)]
pub struct QuickFilters {
    mine_only: bool,
}

impl QuickFilters {
    pub fn is_hidden(&self, pr: &PullRequest) -> bool {
        self.mine_only && !pr.is_mine
    }

    pub fn toggle_mine_only(&mut self) -> bool {
        self.mine_only = !self.mine_only;
        self.mine_only
    }

    pub fn mine_only(&self) -> bool {
        self.mine_only
    }
}

/// One row of the dashboard.
#[derive(Debug, Clone, PartialEq)]
pub struct ViewEntry {
    pub pr: PullRequest,
    pub changes: Vec<ChangeTag>,
    pub ignored: bool,
}

impl ViewEntry {
    pub fn has_changes(&self) -> bool {
        !self.changes.is_empty()
    }
}

/// Build the visible list from the current batch.
///
/// Entries hidden by the ignore registry go first, then those hidden by quick
/// filters. Batch order is preserved.
pub fn project(
    prs: &[PullRequest],
    changes: &ChangeTracker,
    ignores: &IgnoreRegistry,
    filters: &QuickFilters,
) -> Vec<ViewEntry> {
    prs.iter()
        .filter(|pr| !ignores.is_hidden(pr))
        .filter(|pr| !filters.is_hidden(pr))
        .map(|pr| ViewEntry {
            pr: pr.clone(),
            changes: changes.what_changed(pr),
            ignored: ignores.is_ignored(pr),
        })
        .collect()
}

/// Keep a selection index inside a list of `len` entries.
pub fn clamp_selection(selected: Option<usize>, len: usize) -> Option<usize> {
    if len == 0 {
        return None;
    }
    Some(selected.unwrap_or(0).min(len - 1))
}

/// Short relative age such as "5m ago" or "3d ago".
pub fn time_ago<A: TimeZone, B: TimeZone>(then: &DateTime<A>, now: &DateTime<B>) -> String {
    let elapsed = now.clone().signed_duration_since(then.clone());
    let minutes = elapsed.num_minutes();
    let hours = elapsed.num_hours();
    let days = elapsed.num_days();

    if minutes < 1 {
        "just now".to_string()
    } else if hours < 1 {
        format!("{}m ago", minutes)
    } else if days < 1 {
        format!("{}h ago", hours)
    } else if days < 30 {
        format!("{}d ago", days)
    } else if days < 365 {
        format!("{}mo ago", days / 30)
    } else {
        format!("{}y ago", days / 365)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::pr;

    fn batch() -> Vec<PullRequest> {
        let mut theirs = pr("a/b", 2, "2024-03-02T10:00:00+00:00");
        theirs.is_mine = false;
        theirs.am_i_participating = true;
        vec![
            pr("a/b", 3, "2024-03-03T10:00:00+00:00"),
            theirs,
            pr("a/b", 1, "2024-03-01T10:00:00+00:00"),
        ]
    }

    fn ids(entries: &[ViewEntry]) -> Vec<u64> {
        entries.iter().map(|e| e.pr.id).collect()
    }

    #[test]
    fn test_projects_everything_by_default() {
        let prs = batch();
        let entries = project(
            &prs,
            &ChangeTracker::new(),
            &IgnoreRegistry::new(),
            &QuickFilters::default(),
        );
        assert_eq!(ids(&entries), vec![3, 2, 1]);
        assert!(entries.iter().all(|e| !e.ignored && !e.has_changes()));
    }

    #[test]
    fn test_ignored_entries_are_dropped_unless_revealed() {
        let prs = batch();
        let mut ignores = IgnoreRegistry::new();
        ignores.toggle_ignore(&prs[1]);

        let entries = project(&prs, &ChangeTracker::new(), &ignores, &QuickFilters::default());
        assert_eq!(ids(&entries), vec![3, 1]);

        ignores.toggle_show_ignored();
        let entries = project(&prs, &ChangeTracker::new(), &ignores, &QuickFilters::default());
        assert_eq!(ids(&entries), vec![3, 2, 1]);
        assert!(entries[1].ignored);
    }

    #[test]
    fn test_mine_only_drops_other_authors() {
        let prs = batch();
        let mut filters = QuickFilters::default();
        assert!(filters.toggle_mine_only());

        let entries = project(&prs, &ChangeTracker::new(), &IgnoreRegistry::new(), &filters);
        assert_eq!(ids(&entries), vec![3, 1]);
    }

    #[test]
    fn test_entries_carry_change_tags() {
        let prs = batch();
        let mut tracker = ChangeTracker::new();
        tracker.record_batch(&prs);

        let mut next = prs.clone();
        next[0].approved_count = 1;
        let entries = project(&next, &tracker, &IgnoreRegistry::new(), &QuickFilters::default());
        assert_eq!(entries[0].changes, vec![ChangeTag::Approved]);
        assert!(!entries[1].has_changes());
    }

    #[test]
    fn test_selection_is_clamped() {
        assert_eq!(clamp_selection(Some(3), 2), Some(1));
        assert_eq!(clamp_selection(Some(1), 2), Some(1));
        assert_eq!(clamp_selection(Some(0), 0), None);
        assert_eq!(clamp_selection(None, 4), Some(0));
    }

    #[test]
    fn test_time_ago_buckets() {
        let now = DateTime::parse_from_rfc3339("2024-06-01T12:00:00+00:00").unwrap();
        let at = |s: &str| DateTime::parse_from_rfc3339(s).unwrap();

        assert_eq!(time_ago(&at("2024-06-01T11:59:30+00:00"), &now), "just now");
        assert_eq!(time_ago(&at("2024-06-01T11:15:00+00:00"), &now), "45m ago");
        assert_eq!(time_ago(&at("2024-06-01T07:00:00+00:00"), &now), "5h ago");
        assert_eq!(time_ago(&at("2024-05-29T12:00:00+00:00"), &now), "3d ago");
        assert_eq!(time_ago(&at("2024-03-01T12:00:00+00:00"), &now), "3mo ago");
        assert_eq!(time_ago(&at("2022-05-01T12:00:00+00:00"), &now), "2y ago");
    }
}
