use chrono::DateTime;
use pr_dash::app::{Action, Dashboard, Effect, Event};
use pr_dash::changes::{ChangeTracker, diff};
use pr_dash::ignores::IgnoreRegistry;
use pr_dash::state::{PersistedState, StateStore, StateWriter};
use pr_dash::{ChangeTag, PullRequest, Review};
use std::time::{Duration, Instant};

const INTERVAL: Duration = Duration::from_secs(300);

fn pr(repo: &str, id: u64, comments: u32, updated_on: &str) -> PullRequest {
    PullRequest {
        id,
        repo: repo.to_string(),
        title: format!("PR {}", id),
        author: "Someone".to_string(),
        last_commit: "c0ffee".to_string(),
        source_branch: "feature".to_string(),
        target_branch: "main".to_string(),
        comments_count: comments,
        reviewers_count: 1,
        approved_count: 0,
        changes_requested_count: 0,
        my_review: Review::None,
        updated_on: DateTime::parse_from_rfc3339(updated_on).unwrap(),
        url: format!("https://bitbucket.org/{}/pull-requests/{}", repo, id),
        is_mine: false,
        am_i_participating: true,
    }
}

/// Run one scheduled refresh delivering `pr`, then advance the clock.
fn load(dashboard: &mut Dashboard, now: &mut Instant, pr: PullRequest) {
    assert_eq!(dashboard.handle(Event::Tick, *now), vec![Effect::Fetch]);
    dashboard.handle(Event::BatchLoaded(Ok(vec![pr])), *now);
    *now += INTERVAL;
}

#[test]
fn ignored_pull_request_resurfaces_with_its_changes() {
    let t1 = "2024-05-01T09:00:00.000000+00:00";
    let mut tracker = ChangeTracker::new();
    let mut ignores = IgnoreRegistry::new();

    // First fetch: comments = 2, then the user ignores it.
    let first = pr("a/b", 5, 2, t1);
    tracker.record_batch(std::slice::from_ref(&first));
    ignores.toggle_ignore(&first);
    assert!(ignores.is_ignored(&first));

    // Next fetch, nothing changed.
    let second = pr("a/b", 5, 2, t1);
    tracker.record_batch(std::slice::from_ref(&second));
    assert!(ignores.is_ignored(&second));
    assert!(tracker.what_changed(&second).is_empty());

    // Next fetch, a new comment.
    let third = pr("a/b", 5, 3, "2024-05-01T09:30:00.000000+00:00");
    tracker.record_batch(std::slice::from_ref(&third));
    assert!(!ignores.is_ignored(&third));
    assert_eq!(tracker.what_changed(&third), vec![ChangeTag::Commented]);
}

#[test]
fn first_sighting_is_never_flagged() {
    let mut tracker = ChangeTracker::new();
    let q = pr("c/d", 9, 7, "2024-05-01T09:00:00+00:00");
    tracker.record_batch(std::slice::from_ref(&q));
    assert!(tracker.what_changed(&q).is_empty());
}

#[test]
fn changes_persist_until_dismissed() {
    let start = Instant::now();
    let mut dashboard = Dashboard::new(PersistedState::default(), INTERVAL, start);

    let mut now = start;

    load(&mut dashboard, &mut now, pr("a/b", 1, 0, "2024-05-01T09:00:00+00:00"));
    for _ in 0..3 {
        load(&mut dashboard, &mut now, pr("a/b", 1, 4, "2024-05-01T10:00:00+00:00"));
        assert_eq!(dashboard.entries()[0].changes, vec![ChangeTag::Commented]);
    }

    dashboard.handle(Event::Action(Action::DismissChanges), now);
    assert!(dashboard.entries()[0].changes.is_empty());

    load(&mut dashboard, &mut now, pr("a/b", 1, 4, "2024-05-01T10:00:00+00:00"));
    assert!(dashboard.entries()[0].changes.is_empty());
}

#[test]
fn diff_of_equal_snapshots_is_empty() {
    let a = pr("a/b", 1, 3, "2024-05-01T09:00:00+00:00");
    let mut b = a.clone();
    b.title = "Retitled".to_string();
    b.updated_on = DateTime::parse_from_rfc3339("2024-06-01T09:00:00+00:00").unwrap();
    assert!(diff(&a, &b).is_empty());
}

#[test]
fn ignores_and_baselines_survive_restart() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("state.db");
    let start = Instant::now();

    let mut dashboard = Dashboard::new(PersistedState::default(), INTERVAL, start);
    dashboard.handle(Event::Tick, start);
    dashboard.handle(
        Event::BatchLoaded(Ok(vec![
            pr("a/b", 1, 0, "2024-05-02T09:00:00+00:00"),
            pr("a/b", 2, 0, "2024-05-01T09:00:00+00:00"),
        ])),
        start,
    );
    let effects = dashboard.handle(Event::Action(Action::ToggleIgnore), start);
    let Some(Effect::Persist(state)) = effects.into_iter().next() else {
        panic!("ignore should request a save");
    };

    let mut store = StateStore::open(&db_path).unwrap();
    store.save(&state).unwrap();
    drop(store);

    let restored = StateStore::open(&db_path).unwrap().load().unwrap();
    let mut restarted = Dashboard::new(restored, INTERVAL, start);
    restarted.handle(Event::Tick, start);
    restarted.handle(
        Event::BatchLoaded(Ok(vec![
            pr("a/b", 1, 1, "2024-05-02T09:00:00+00:00"),
            pr("a/b", 2, 0, "2024-05-01T09:00:00+00:00"),
        ])),
        start,
    );

    // #1 is still ignored (not updated), #2 is visible and unchanged.
    let ids: Vec<u64> = restarted.entries().iter().map(|e| e.pr.id).collect();
    assert_eq!(ids, vec![2]);

    restarted.handle(Event::Action(Action::ToggleShowIgnored), start);
    let first = &restarted.entries()[0];
    assert!(first.ignored);
    assert_eq!(first.changes, vec![ChangeTag::Commented]);
}

#[test]
fn corrupt_state_file_is_replaced_and_persists_again() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("state.db");
    std::fs::write(&db_path, "this is not a database, just some text padding it out").unwrap();
    assert!(StateStore::open(&db_path).is_err());

    let start = Instant::now();
    let store = StateStore::open_or_reset(&db_path).unwrap();
    let mut dashboard = Dashboard::new(store.load().unwrap(), INTERVAL, start);
    let writer = StateWriter::spawn(store);

    dashboard.handle(Event::Tick, start);
    for effect in dashboard.handle(
        Event::BatchLoaded(Ok(vec![pr("a/b", 1, 0, "2024-05-02T09:00:00+00:00")])),
        start,
    ) {
        if let Effect::Persist(state) = effect {
            writer.save(state);
        }
    }
    writer.shutdown();

    let restored = StateStore::open(&db_path).unwrap().load().unwrap();
    assert_eq!(restored.baselines.len(), 1);
    assert!(dir.path().join("state.db.corrupt").exists());
}
