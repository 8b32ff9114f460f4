use crate::{PrUid, PullRequest};
use chrono::{DateTime, FixedOffset};
use rusqlite::{Connection, OptionalExtension, params};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::thread::{self, JoinHandle};
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// Errors that can occur during state operations.
#[derive(Debug, Error)]
pub enum StateError {
    #[error("database error: {0}")]
    Db(#[from] rusqlite::Error),
    #[error("snapshot encoding error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, StateError>;

/// Everything that survives a restart.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PersistedState {
    pub ignored: HashMap<PrUid, DateTime<FixedOffset>>,
    pub show_ignored: bool,
    pub baselines: HashMap<PrUid, PullRequest>,
}

/// SQLite-backed store for the ignore registry and change baselines.
pub struct StateStore {
    conn: Connection,
}

impl StateStore {
    /// Open or create the state database at the given path.
    ///
    /// Creates the necessary tables if they don't exist.
    pub fn open(path: &Path) -> Result<Self> {
        Self::init(Connection::open(path)?)
    }

    /// Open the database at `path`, setting an unreadable file aside.
    ///
    /// A file that SQLite cannot use is renamed to `<name>.corrupt` and a
    /// fresh database takes its place.
    pub fn open_or_reset(path: &Path) -> Result<Self> {
        match Self::open(path) {
            Ok(store) => Ok(store),
            Err(e) if path.is_file() => {
                let aside = corrupt_path(path);
                warn!(
                    error = %e,
                    path = %path.display(),
                    moved_to = %aside.display(),
                    "state database unreadable, starting fresh"
                );
                fs::rename(path, &aside)?;
                Self::open(path)
            }
            Err(e) => Err(e),
        }
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS ignores (
                uid TEXT PRIMARY KEY,
                ignored_until TEXT NOT NULL
            );
            CREATE TABLE IF NOT EXISTS baselines (
                uid TEXT PRIMARY KEY,
                snapshot TEXT NOT NULL
            );
            CREATE TABLE IF NOT EXISTS settings (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            );",
        )?;
        Ok(Self { conn })
    }

    /// Load the persisted state.
    ///
    /// Rows that cannot be decoded are skipped.
    pub fn load(&self) -> Result<PersistedState> {
        let mut state = PersistedState::default();

        let mut stmt = self
            .conn
            .prepare("SELECT uid, ignored_until FROM ignores")?;
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?;
        for row in rows {
            let (uid, until) = row?;
            match DateTime::parse_from_rfc3339(&until) {
                Ok(until) => {
                    state.ignored.insert(PrUid::from(uid), until);
                }
                Err(e) => warn!(%uid, error = %e, "skipping unreadable ignore entry"),
            }
        }

        let mut stmt = self.conn.prepare("SELECT uid, snapshot FROM baselines")?;
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?;
        for row in rows {
            let (uid, snapshot) = row?;
            match serde_json::from_str::<PullRequest>(&snapshot) {
                Ok(pr) => {
                    state.baselines.insert(PrUid::from(uid), pr);
                }
                Err(e) => warn!(%uid, error = %e, "skipping unreadable baseline"),
            }
        }

        let show_ignored: Option<String> = self
            .conn
            .query_row(
                "SELECT value FROM settings WHERE key = 'show_ignored'",
                [],
                |row| row.get(0),
            )
            .optional()?;
        state.show_ignored = show_ignored.as_deref() == Some("true");

        debug!(
            ignored = state.ignored.len(),
            baselines = state.baselines.len(),
            "loaded persisted state"
        );
        Ok(state)
    }

    /// Replace the stored state with `state` in one transaction.
    pub fn save(&mut self, state: &PersistedState) -> Result<()> {
        let tx = self.conn.transaction()?;
        tx.execute("DELETE FROM ignores", [])?;
        tx.execute("DELETE FROM baselines", [])?;

        {
            let mut insert_ignore =
                tx.prepare("INSERT INTO ignores (uid, ignored_until) VALUES (?1, ?2)")?;
            for (uid, until) in &state.ignored {
                insert_ignore.execute(params![uid.as_str(), until.to_rfc3339()])?;
            }

            let mut insert_baseline =
                tx.prepare("INSERT INTO baselines (uid, snapshot) VALUES (?1, ?2)")?;
            for (uid, pr) in &state.baselines {
                insert_baseline.execute(params![uid.as_str(), serde_json::to_string(pr)?])?;
            }
        }

        tx.execute(
            "INSERT INTO settings (key, value) VALUES ('show_ignored', ?1)
             ON CONFLICT(key) DO UPDATE SET value = ?1",
            params![if state.show_ignored { "true" } else { "false" }],
        )?;
        tx.commit()?;
        Ok(())
    }
}

/// Where an unreadable database at `path` is moved.
pub fn corrupt_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".corrupt");
    path.with_file_name(name)
}

/// Handle to the background writer thread.
///
/// Saves are best-effort: a failed write is logged and the in-memory state is
/// left untouched.
pub struct StateWriter {
    tx: mpsc::UnboundedSender<PersistedState>,
    handle: JoinHandle<()>,
}

impl StateWriter {
    pub fn spawn(mut store: StateStore) -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel::<PersistedState>();
        let handle = thread::spawn(move || {
            while let Some(mut latest) = rx.blocking_recv() {
                // Only the newest queued snapshot matters.
                while let Ok(newer) = rx.try_recv() {
                    latest = newer;
                }
                match store.save(&latest) {
                    Ok(()) => debug!("persisted state"),
                    Err(e) => warn!(error = %e, "failed to persist state"),
                }
            }
        });
        Self { tx, handle }
    }

    pub fn save(&self, state: PersistedState) {
        if self.tx.send(state).is_err() {
            warn!("state writer is gone, dropping save");
        }
    }

    /// Flush pending writes and stop the writer.
    pub fn shutdown(self) {
        drop(self.tx);
        if self.handle.join().is_err() {
            warn!("state writer panicked");
        }
    }
}
