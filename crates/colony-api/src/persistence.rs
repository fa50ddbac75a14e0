use std::fmt;
use std::path::Path;

use contracts::{Event, RunConfig, RunStatus, Snapshot};
use rusqlite::{params, Connection, OptionalExtension};

#[derive(Debug, Clone)]
pub struct PersistedRunSummary {
    pub run_id: String,
    pub status: RunStatus,
    pub updated_tick: u64,
}

/// A stored run sliced at a tick: the latest snapshot at or before the
/// tick, plus the events that follow it up to the tick.
#[derive(Debug, Clone)]
pub struct ReplaySlice {
    pub snapshot: Option<Snapshot>,
    pub events: Vec<Event>,
}

#[derive(Debug)]
pub enum PersistenceError {
    Sqlite(rusqlite::Error),
    Serde(serde_json::Error),
    NotAttached,
    RunAlreadyExists(String),
}

impl fmt::Display for PersistenceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Sqlite(err) => write!(f, "sqlite error: {err}"),
            Self::Serde(err) => write!(f, "serde error: {err}"),
            Self::NotAttached => write!(f, "sqlite store is not attached"),
            Self::RunAlreadyExists(run_id) => write!(f, "run {run_id} already exists"),
        }
    }
}

impl std::error::Error for PersistenceError {}

impl From<rusqlite::Error> for PersistenceError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Sqlite(value)
    }
}

impl From<serde_json::Error> for PersistenceError {
    fn from(value: serde_json::Error) -> Self {
        Self::Serde(value)
    }
}

#[derive(Debug)]
pub struct SqliteColonyStore {
    conn: Connection,
}

impl SqliteColonyStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, PersistenceError> {
        let conn = Connection::open(path)?;
        let store = Self { conn };
        store.configure()?;
        store.migrate()?;
        Ok(store)
    }

    pub fn open_in_memory() -> Result<Self, PersistenceError> {
        let conn = Connection::open_in_memory()?;
        let store = Self { conn };
        store.configure()?;
        store.migrate()?;
        Ok(store)
    }

    fn configure(&self) -> Result<(), PersistenceError> {
        self.conn.pragma_update(None, "journal_mode", "WAL")?;
        self.conn.pragma_update(None, "synchronous", "NORMAL")?;
        Ok(())
    }

    fn migrate(&self) -> Result<(), PersistenceError> {
        self.conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS runs (
                run_id TEXT PRIMARY KEY,
                config_json TEXT NOT NULL,
                status_json TEXT NOT NULL,
                updated_tick INTEGER NOT NULL
            );
            CREATE TABLE IF NOT EXISTS events (
                run_id TEXT NOT NULL,
                event_id TEXT NOT NULL,
                tick INTEGER NOT NULL,
                sequence_in_tick INTEGER NOT NULL,
                event_type TEXT NOT NULL,
                payload_json TEXT NOT NULL,
                PRIMARY KEY (run_id, event_id)
            );
            CREATE INDEX IF NOT EXISTS idx_events_run_tick
                ON events (run_id, tick, sequence_in_tick);
            CREATE TABLE IF NOT EXISTS snapshots (
                run_id TEXT NOT NULL,
                tick INTEGER NOT NULL,
                snapshot_json TEXT NOT NULL,
                PRIMARY KEY (run_id, tick)
            );",
        )?;
        Ok(())
    }

    pub fn run_exists(&self, run_id: &str) -> Result<bool, PersistenceError> {
        let found: Option<String> = self
            .conn
            .query_row(
                "SELECT run_id FROM runs WHERE run_id = ?1",
                params![run_id],
                |row| row.get(0),
            )
            .optional()?;
        Ok(found.is_some())
    }

    pub fn delete_run(&self, run_id: &str) -> Result<(), PersistenceError> {
        self.conn
            .execute("DELETE FROM events WHERE run_id = ?1", params![run_id])?;
        self.conn
            .execute("DELETE FROM snapshots WHERE run_id = ?1", params![run_id])?;
        self.conn
            .execute("DELETE FROM runs WHERE run_id = ?1", params![run_id])?;
        Ok(())
    }

    /// Persist a delta: upsert run status, append new events, and store
    /// the snapshot when one is due.
    pub fn persist_delta(
        &mut self,
        config: &RunConfig,
        status: &RunStatus,
        events: &[Event],
        snapshot: Option<&Snapshot>,
    ) -> Result<(), PersistenceError> {
        let tx = self.conn.transaction()?;

        let config_json = serde_json::to_string(config)?;
        let status_json = serde_json::to_string(status)?;
        tx.execute(
            "INSERT INTO runs (run_id, config_json, status_json, updated_tick)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT (run_id) DO UPDATE SET
                config_json = excluded.config_json,
                status_json = excluded.status_json,
                updated_tick = excluded.updated_tick",
            params![
                config.run_id.as_str(),
                config_json,
                status_json,
                i64::try_from(status.current_tick).unwrap_or(i64::MAX),
            ],
        )?;

        for event in events {
            let payload_json = serde_json::to_string(event)?;
            tx.execute(
                "INSERT OR IGNORE INTO events (
                    run_id, event_id, tick, sequence_in_tick, event_type, payload_json
                 ) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    event.run_id.as_str(),
                    event.event_id.as_str(),
                    i64::try_from(event.tick).unwrap_or(i64::MAX),
                    i64::try_from(event.sequence_in_tick).unwrap_or(i64::MAX),
                    format!("{:?}", event.event_type),
                    payload_json,
                ],
            )?;
        }

        if let Some(snapshot) = snapshot {
            let snapshot_json = serde_json::to_string(snapshot)?;
            tx.execute(
                "INSERT OR REPLACE INTO snapshots (run_id, tick, snapshot_json)
                 VALUES (?1, ?2, ?3)",
                params![
                    snapshot.run_id.as_str(),
                    i64::try_from(snapshot.tick).unwrap_or(i64::MAX),
                    snapshot_json,
                ],
            )?;
        }

        tx.commit()?;
        Ok(())
    }

    pub fn list_runs(&self, limit: usize) -> Result<Vec<PersistedRunSummary>, PersistenceError> {
        let mut statement = self.conn.prepare(
            "SELECT run_id, status_json, updated_tick FROM runs
             ORDER BY updated_tick DESC LIMIT ?1",
        )?;
        let rows = statement.query_map(params![limit as i64], |row| {
            let run_id: String = row.get(0)?;
            let status_json: String = row.get(1)?;
            let updated_tick: i64 = row.get(2)?;
            Ok((run_id, status_json, updated_tick))
        })?;

        let mut summaries = Vec::new();
        for row in rows {
            let (run_id, status_json, updated_tick) = row?;
            let status: RunStatus = serde_json::from_str(&status_json)?;
            summaries.push(PersistedRunSummary {
                run_id,
                status,
                updated_tick: updated_tick.max(0) as u64,
            });
        }
        Ok(summaries)
    }

    pub fn load_events(
        &self,
        run_id: &str,
        after_tick: u64,
        up_to_tick: u64,
    ) -> Result<Vec<Event>, PersistenceError> {
        let mut statement = self.conn.prepare(
            "SELECT payload_json FROM events
             WHERE run_id = ?1 AND tick > ?2 AND tick <= ?3
             ORDER BY tick ASC, sequence_in_tick ASC",
        )?;
        let rows = statement.query_map(
            params![
                run_id,
                i64::try_from(after_tick).unwrap_or(i64::MAX),
                i64::try_from(up_to_tick).unwrap_or(i64::MAX),
            ],
            |row| row.get::<_, String>(0),
        )?;

        let mut events = Vec::new();
        for row in rows {
            events.push(serde_json::from_str(&row?)?);
        }
        Ok(events)
    }

    pub fn load_replay_at_tick(
        &self,
        run_id: &str,
        tick: u64,
    ) -> Result<ReplaySlice, PersistenceError> {
        let snapshot_row: Option<String> = self
            .conn
            .query_row(
                "SELECT snapshot_json FROM snapshots
                 WHERE run_id = ?1 AND tick <= ?2
                 ORDER BY tick DESC LIMIT 1",
                params![run_id, i64::try_from(tick).unwrap_or(i64::MAX)],
                |row| row.get(0),
            )
            .optional()?;

        let snapshot: Option<Snapshot> = match snapshot_row {
            Some(raw) => Some(serde_json::from_str(&raw)?),
            None => None,
        };
        let after_tick = snapshot.as_ref().map(|s| s.tick).unwrap_or(0);
        let events = self.load_events(run_id, after_tick, tick)?;

        Ok(ReplaySlice { snapshot, events })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use colony_core::world::ColonyWorld;

    fn sample_world() -> ColonyWorld {
        let config = RunConfig {
            run_id: "run_persist".to_string(),
            seed: 7,
            max_ticks: 50,
            territory_count: 2,
            ..RunConfig::default()
        };
        ColonyWorld::new(config)
    }

    #[test]
    fn delta_round_trips_through_sqlite() {
        let mut world = sample_world();
        world.step_n(5).expect("run");

        let mut store = SqliteColonyStore::open_in_memory().expect("open");
        let snapshot = world.snapshot();
        store
            .persist_delta(world.config(), world.status(), world.events(), Some(&snapshot))
            .expect("persist");

        assert!(store.run_exists("run_persist").expect("exists"));
        let runs = store.list_runs(10).expect("list");
        assert_eq!(runs.len(), 1);
        assert_eq!(runs[0].status.current_tick, 5);

        let slice = store.load_replay_at_tick("run_persist", 5).expect("replay");
        let restored = slice.snapshot.expect("snapshot stored");
        assert_eq!(restored.tick, 5);
        assert_eq!(restored.memory, *world.memory());
        // Snapshot is at the requested tick, so no trailing events.
        assert!(slice.events.is_empty());
    }

    #[test]
    fn replay_returns_events_after_the_snapshot() {
        let mut world = sample_world();
        world.step_n(2).expect("run");
        let early_snapshot = world.snapshot();

        let mut store = SqliteColonyStore::open_in_memory().expect("open");
        store
            .persist_delta(
                world.config(),
                world.status(),
                world.events(),
                Some(&early_snapshot),
            )
            .expect("persist");

        world.step_n(3).expect("run");
        store
            .persist_delta(world.config(), world.status(), world.events(), None)
            .expect("persist");

        let slice = store.load_replay_at_tick("run_persist", 5).expect("replay");
        assert_eq!(slice.snapshot.expect("snapshot").tick, 2);
        assert!(slice.events.iter().all(|e| e.tick > 2 && e.tick <= 5));
        assert!(!slice.events.is_empty());
    }

    #[test]
    fn delete_run_removes_all_rows() {
        let mut world = sample_world();
        world.step_n(1).expect("run");

        let mut store = SqliteColonyStore::open_in_memory().expect("open");
        let snapshot = world.snapshot();
        store
            .persist_delta(world.config(), world.status(), world.events(), Some(&snapshot))
            .expect("persist");
        store.delete_run("run_persist").expect("delete");

        assert!(!store.run_exists("run_persist").expect("exists"));
        assert!(store.list_runs(10).expect("list").is_empty());
    }
}
