//! In-process API facade over the colony world, with an HTTP control
//! surface and SQLite persistence for runs, events, and snapshots.

mod persistence;
mod server;

use std::path::Path;

use colony_core::world::{ColonyWorld, TickError};
use contracts::{ColonyCommand, Event, RunConfig, RunStatus, Snapshot};
use persistence::SqliteColonyStore;
use serde_json::Value;

pub use persistence::{PersistedRunSummary, PersistenceError, ReplaySlice};
pub use server::{serve, ServerError};

#[derive(Debug)]
struct PersistenceState {
    store: SqliteColonyStore,
    persisted_event_count: usize,
    last_snapshot_tick: Option<u64>,
}

#[derive(Debug)]
pub struct EngineApi {
    engine: ColonyWorld,
    persistence: Option<PersistenceState>,
    last_persistence_error: Option<String>,
}

impl EngineApi {
    pub fn from_config(config: RunConfig) -> Self {
        Self {
            engine: ColonyWorld::new(config),
            persistence: None,
            last_persistence_error: None,
        }
    }

    pub fn run_id(&self) -> &str {
        self.engine.run_id()
    }

    pub fn status(&self) -> RunStatus {
        self.engine.status().clone()
    }

    pub fn events(&self) -> &[Event] {
        self.engine.events()
    }

    pub fn snapshot(&self) -> Snapshot {
        self.engine.snapshot()
    }

    pub fn world_summary(&self) -> Value {
        self.engine.world_summary()
    }

    pub fn territory_inspector(&self, territory_id: &str) -> Option<Value> {
        self.engine.territory_inspector(territory_id)
    }

    pub fn apply_command(&mut self, command: ColonyCommand) {
        self.engine.apply_command(command);
        self.flush_persistence_best_effort();
    }

    pub fn start(&mut self) -> RunStatus {
        self.engine.start();
        self.status()
    }

    pub fn pause(&mut self) -> RunStatus {
        self.engine.pause();
        self.status()
    }

    /// Advance up to `ticks` ticks. A fatal tick fault stops the run
    /// immediately and is returned after the event log has been flushed
    /// so the fault event is never lost.
    pub fn step(&mut self, ticks: u64) -> Result<(RunStatus, u64), TickError> {
        let result = self.engine.step_n(ticks);
        self.flush_persistence_best_effort();
        result.map(|committed| (self.status(), committed))
    }

    pub fn run_to_tick(&mut self, tick: u64) -> Result<(RunStatus, u64), TickError> {
        let result = self.engine.run_to_tick(tick);
        self.flush_persistence_best_effort();
        result.map(|committed| (self.status(), committed))
    }

    // --- Persistence ---

    pub fn attach_sqlite_store(&mut self, path: impl AsRef<Path>) -> Result<(), PersistenceError> {
        let store = SqliteColonyStore::open(path)?;
        self.persistence = Some(PersistenceState {
            store,
            persisted_event_count: 0,
            last_snapshot_tick: None,
        });
        Ok(())
    }

    pub fn initialize_run_storage(
        &mut self,
        replace_existing_run: bool,
    ) -> Result<(), PersistenceError> {
        let Some(state) = self.persistence.as_mut() else {
            return Err(PersistenceError::NotAttached);
        };

        let run_id = self.engine.run_id().to_string();
        if state.store.run_exists(&run_id)? {
            if replace_existing_run {
                state.store.delete_run(&run_id)?;
                state.persisted_event_count = 0;
                state.last_snapshot_tick = None;
            } else {
                return Err(PersistenceError::RunAlreadyExists(run_id));
            }
        }

        let bootstrap = self.engine.snapshot();
        state.store.persist_delta(
            self.engine.config(),
            self.engine.status(),
            &[],
            Some(&bootstrap),
        )?;
        state.last_snapshot_tick = Some(bootstrap.tick);
        self.last_persistence_error = None;
        Ok(())
    }

    pub fn flush_persistence_checked(&mut self) -> Result<(), PersistenceError> {
        let Some(state) = self.persistence.as_mut() else {
            return Err(PersistenceError::NotAttached);
        };

        let new_events = &self.engine.events()[state.persisted_event_count..];
        let current_tick = self.engine.status().current_tick;
        let cadence = self.engine.config().snapshot_every_ticks.max(1);
        let snapshot_due = (current_tick % cadence == 0 || self.engine.status().is_complete())
            && state.last_snapshot_tick != Some(current_tick);
        let snapshot = if snapshot_due {
            Some(self.engine.snapshot())
        } else {
            None
        };

        state.store.persist_delta(
            self.engine.config(),
            self.engine.status(),
            new_events,
            snapshot.as_ref(),
        )?;

        state.persisted_event_count = self.engine.events().len();
        if let Some(snapshot) = snapshot {
            state.last_snapshot_tick = Some(snapshot.tick);
        }
        self.last_persistence_error = None;
        Ok(())
    }

    pub fn replay_at_tick(&self, run_id: &str, tick: u64) -> Result<ReplaySlice, PersistenceError> {
        let Some(state) = self.persistence.as_ref() else {
            return Err(PersistenceError::NotAttached);
        };
        state.store.load_replay_at_tick(run_id, tick)
    }

    pub fn last_persistence_error(&self) -> Option<&str> {
        self.last_persistence_error.as_deref()
    }

    fn flush_persistence_best_effort(&mut self) {
        if self.persistence.is_none() {
            return;
        }
        if let Err(err) = self.flush_persistence_checked() {
            self.last_persistence_error = Some(err.to_string());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> RunConfig {
        RunConfig {
            run_id: "run_api".to_string(),
            seed: 11,
            max_ticks: 48,
            snapshot_every_ticks: 4,
            territory_count: 2,
            ..RunConfig::default()
        }
    }

    #[test]
    fn step_advances_and_reports_committed_ticks() {
        let mut api = EngineApi::from_config(test_config());
        let (status, committed) = api.step(3).expect("ticks run");
        assert_eq!(committed, 3);
        assert_eq!(status.current_tick, 3);
    }

    #[test]
    fn commands_reach_the_durable_memory() {
        let mut api = EngineApi::from_config(test_config());
        api.apply_command(ColonyCommand::AddScoutOperation(contracts::ScoutOperation {
            territory_id: "sector02".to_string(),
        }));
        assert_eq!(api.snapshot().memory.scout_operations.len(), 1);
    }

    #[test]
    fn flush_without_store_reports_not_attached() {
        let mut api = EngineApi::from_config(test_config());
        let err = api.flush_persistence_checked().expect_err("no store");
        assert!(matches!(err, PersistenceError::NotAttached));
    }
}
