use crate::PullRequest;
use crate::bitbucket::FetchError;
use crate::changes::ChangeTracker;
use crate::git::GitRequest;
use crate::ignores::IgnoreRegistry;
use crate::scheduler::{RefreshScheduler, Trigger, sort_by_recency};
use crate::state::PersistedState;
use crate::view::{QuickFilters, ViewEntry, clamp_selection, project};
use chrono::{DateTime, Local};
use std::time::{Duration, Instant};
use tracing::{info, warn};

/// How long a status message stays on screen.
pub const STATUS_TTL: Duration = Duration::from_secs(3);

/// A user intent, already decoded from the keyboard.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Refresh,
    ToggleIgnore,
    ToggleShowIgnored,
    ToggleMineOnly,
    DismissChanges,
    CopyUrl,
    CopyBranch,
    Checkout,
    PullAndSync,
    OpenInBrowser,
    SelectNext,
    SelectPrev,
    ToggleHelp,
    Quit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusKind {
    Info,
    Success,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusMessage {
    pub text: String,
    pub kind: StatusKind,
}

impl StatusMessage {
    pub fn info(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            kind: StatusKind::Info,
        }
    }

    pub fn success(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            kind: StatusKind::Success,
        }
    }

    pub fn error(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            kind: StatusKind::Error,
        }
    }
}

/// Everything that can happen to the dashboard.
#[derive(Debug)]
pub enum Event {
    /// Periodic wake-up from the event loop.
    Tick,
    Action(Action),
    /// A fetch dispatched through [`Effect::Fetch`] finished.
    BatchLoaded(Result<Vec<PullRequest>, FetchError>),
    /// Output of background work (git, clipboard, browser).
    Status(StatusMessage),
}

/// Side effects requested by a state transition, executed by the shell.
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    Fetch,
    Persist(PersistedState),
    CopyToClipboard(String),
    OpenBrowser(String),
    Git(GitRequest),
}

/// The single owner of all dashboard state.
///
/// Every input goes through [`Dashboard::handle`], which mutates state and
/// returns the effects to run. Nothing else touches the state.
pub struct Dashboard {
    prs: Vec<PullRequest>,
    changes: ChangeTracker,
    ignores: IgnoreRegistry,
    filters: QuickFilters,
    scheduler: RefreshScheduler,
    entries: Vec<ViewEntry>,
    selected: Option<usize>,
    status: Option<(StatusMessage, Instant)>,
    last_loaded: Option<DateTime<Local>>,
    show_help: bool,
    should_quit: bool,
}

impl Dashboard {
    pub fn new(restored: PersistedState, interval: Duration, now: Instant) -> Self {
        Self {
            prs: Vec::new(),
            changes: ChangeTracker::with_baselines(restored.baselines),
            ignores: IgnoreRegistry::from_parts(restored.ignored, restored.show_ignored),
            filters: QuickFilters::default(),
            scheduler: RefreshScheduler::new(interval, now),
            entries: Vec::new(),
            selected: None,
            status: None,
            last_loaded: None,
            show_help: false,
            should_quit: false,
        }
    }

    /// The single state-transition function.
    pub fn handle(&mut self, event: Event, now: Instant) -> Vec<Effect> {
        match event {
            Event::Tick => {
                self.expire_status(now);
                if self.scheduler.poll(now) {
                    vec![Effect::Fetch]
                } else {
                    Vec::new()
                }
            }
            Event::Action(action) => self.apply(action, now),
            Event::BatchLoaded(result) => self.on_batch_loaded(result, now),
            Event::Status(message) => {
                self.status = Some((message, now));
                Vec::new()
            }
        }
    }

    fn apply(&mut self, action: Action, now: Instant) -> Vec<Effect> {
        match action {
            Action::Refresh => {
                return if self.scheduler.request(Trigger::Manual, now) {
                    vec![Effect::Fetch]
                } else {
                    Vec::new()
                };
            }
            Action::ToggleShowIgnored => {
                self.ignores.toggle_show_ignored();
                self.reproject();
                return vec![self.persist()];
            }
            Action::ToggleMineOnly => {
                self.filters.toggle_mine_only();
                self.reproject();
                return Vec::new();
            }
            Action::SelectNext => {
                if let Some(selected) = self.selected
                    && selected + 1 < self.entries.len()
                {
                    self.selected = Some(selected + 1);
                }
                return Vec::new();
            }
            Action::SelectPrev => {
                self.selected = self.selected.map(|s| s.saturating_sub(1));
                return Vec::new();
            }
            Action::ToggleHelp => {
                self.show_help = !self.show_help;
                return Vec::new();
            }
            Action::Quit => {
                self.should_quit = true;
                return Vec::new();
            }
            _ => {}
        }

        // Everything below acts on the selected pull request.
        let Some(pr) = self.selected_entry().map(|entry| entry.pr.clone()) else {
            return Vec::new();
        };

        match action {
            Action::ToggleIgnore => {
                let ignored = self.ignores.toggle_ignore(&pr);
                info!(uid = %pr.uid(), ignored, "toggled ignore");
                self.reproject();
                vec![self.persist()]
            }
            Action::DismissChanges => {
                self.changes.dismiss(&pr);
                self.reproject();
                vec![self.persist()]
            }
            Action::OpenInBrowser => {
                self.changes.dismiss(&pr);
                self.reproject();
                vec![Effect::OpenBrowser(pr.url), self.persist()]
            }
            Action::CopyUrl => vec![Effect::CopyToClipboard(pr.url)],
            Action::CopyBranch => vec![Effect::CopyToClipboard(pr.source_branch)],
            Action::Checkout => vec![Effect::Git(GitRequest::Checkout {
                repo: pr.repo,
                branch: pr.source_branch,
            })],
            Action::PullAndSync => vec![Effect::Git(GitRequest::PullAndSync {
                repo: pr.repo,
                source_branch: pr.source_branch,
                target_branch: pr.target_branch,
            })],
            _ => Vec::new(),
        }
    }

    fn on_batch_loaded(
        &mut self,
        result: Result<Vec<PullRequest>, FetchError>,
        now: Instant,
    ) -> Vec<Effect> {
        self.scheduler.complete(now);

        let mut prs = match result {
            Ok(prs) => prs,
            Err(e) => {
                warn!(error = %e, "refresh failed, keeping previous pull requests");
                return Vec::new();
            }
        };

        sort_by_recency(&mut prs);
        let new_baselines = self.changes.record_batch(&prs);
        info!(count = prs.len(), new_baselines, "loaded pull requests");

        self.prs = prs;
        self.last_loaded = Some(Local::now());
        self.reproject();

        if new_baselines > 0 {
            vec![self.persist()]
        } else {
            Vec::new()
        }
    }

    fn reproject(&mut self) {
        self.entries = project(&self.prs, &self.changes, &self.ignores, &self.filters);
        self.selected = clamp_selection(self.selected, self.entries.len());
    }

    fn persist(&self) -> Effect {
        Effect::Persist(self.persisted_state())
    }

    fn expire_status(&mut self, now: Instant) {
        if self
            .status
            .as_ref()
            .is_some_and(|(_, at)| now.duration_since(*at) >= STATUS_TTL)
        {
            self.status = None;
        }
    }

    pub fn persisted_state(&self) -> PersistedState {
        PersistedState {
            ignored: self.ignores.entries().clone(),
            show_ignored: self.ignores.show_ignored(),
            baselines: self.changes.baselines().clone(),
        }
    }

    pub fn entries(&self) -> &[ViewEntry] {
        &self.entries
    }

    pub fn selected(&self) -> Option<usize> {
        self.selected
    }

    pub fn select(&mut self, index: usize) {
        self.selected = clamp_selection(Some(index), self.entries.len());
    }

    pub fn selected_entry(&self) -> Option<&ViewEntry> {
        self.selected.and_then(|i| self.entries.get(i))
    }

    pub fn status(&self) -> Option<&StatusMessage> {
        self.status.as_ref().map(|(message, _)| message)
    }

    pub fn is_loading(&self) -> bool {
        self.scheduler.is_loading()
    }

    pub fn last_loaded(&self) -> Option<DateTime<Local>> {
        self.last_loaded
    }

    pub fn mine_only(&self) -> bool {
        self.filters.mine_only()
    }

    pub fn show_ignored(&self) -> bool {
        self.ignores.show_ignored()
    }

    pub fn show_help(&self) -> bool {
        self.show_help
    }

    pub fn should_quit(&self) -> bool {
        self.should_quit
    }
}
