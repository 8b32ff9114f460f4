use crate::PullRequest;
use std::time::{Duration, Instant};
use tracing::debug;

/// Order a batch most recently updated first. Stable, so re-sorting is a no-op.
pub fn sort_by_recency(prs: &mut [PullRequest]) {
    prs.sort_by(|a, b| b.updated_on.cmp(&a.updated_on));
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadState {
    Idle,
    Loading,
}

/// What asked for a refresh.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    Timer,
    Manual,
}

/// Drives periodic reloads: `Idle -> Loading -> Idle`.
///
/// The next automatic reload is measured from the moment the previous load
/// completed, so a slow fetch never stacks up ticks.
#[derive(Debug, Clone)]
pub struct RefreshScheduler {
    interval: Duration,
    state: LoadState,
    next_due: Instant,
}

impl RefreshScheduler {
    /// A scheduler whose first automatic load is due immediately.
    pub fn new(interval: Duration, now: Instant) -> Self {
        Self {
            interval,
            state: LoadState::Idle,
            next_due: now,
        }
    }

    /// Ask for a load. Returns `true` when the caller should start fetching.
    ///
    /// Requests made while a load is in flight are dropped.
    pub fn request(&mut self, trigger: Trigger, now: Instant) -> bool {
        if self.state == LoadState::Loading {
            debug!(?trigger, "refresh already in flight, coalescing");
            return false;
        }
        if trigger == Trigger::Timer && now < self.next_due {
            return false;
        }
        debug!(?trigger, "starting refresh");
        self.state = LoadState::Loading;
        true
    }

    /// Timer check; equivalent to a timer-triggered request.
    pub fn poll(&mut self, now: Instant) -> bool {
        self.request(Trigger::Timer, now)
    }

    /// A load finished (successfully or not); restart the timer from `now`.
    pub fn complete(&mut self, now: Instant) {
        self.state = LoadState::Idle;
        self.next_due = now + self.interval;
    }

    pub fn state(&self) -> LoadState {
        self.state
    }

    pub fn is_loading(&self) -> bool {
        self.state == LoadState::Loading
    }

    pub fn next_due(&self) -> Instant {
        self.next_due
    }
}
