//! The colony world: durable memory, live world state, event log, and
//! the per-tick control flow that wires the scheduling triad together.

use std::collections::BTreeSet;
use std::fmt;

use contracts::{
    ColonyCommand, ColonyMemory, Event, EventType, RunConfig, RunMode, RunStatus,
    SCHEMA_VERSION_V1,
};
use serde_json::Value;

use crate::ledger::LedgerError;
use crate::respawn::RespawnError;
use crate::snapshot::WorldSnapshot;

mod init;
mod inspect;
mod snapshot;
mod step;

/// Fatal tick-level failures. These are logic defects — they propagate
/// out of `step` without any mid-tick recovery attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickError {
    Ledger(LedgerError),
    Respawn(RespawnError),
}

impl fmt::Display for TickError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TickError::Ledger(err) => write!(f, "ledger fault: {err}"),
            TickError::Respawn(err) => write!(f, "respawn fault: {err}"),
        }
    }
}

impl std::error::Error for TickError {}

impl From<LedgerError> for TickError {
    fn from(value: LedgerError) -> Self {
        Self::Ledger(value)
    }
}

impl From<RespawnError> for TickError {
    fn from(value: RespawnError) -> Self {
        Self::Respawn(value)
    }
}

#[derive(Debug)]
pub struct ColonyWorld {
    config: RunConfig,
    status: RunStatus,
    state: WorldSnapshot,
    memory: ColonyMemory,
    event_log: Vec<Event>,
}

impl ColonyWorld {
    pub fn run_id(&self) -> &str {
        &self.status.run_id
    }

    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    pub fn status(&self) -> &RunStatus {
        &self.status
    }

    pub fn state(&self) -> &WorldSnapshot {
        &self.state
    }

    pub fn memory(&self) -> &ColonyMemory {
        &self.memory
    }

    pub fn events(&self) -> &[Event] {
        &self.event_log
    }

    pub fn start(&mut self) {
        if !self.status.is_complete() {
            self.status.mode = RunMode::Running;
        }
    }

    pub fn pause(&mut self) {
        self.status.mode = RunMode::Paused;
    }

    /// Apply an operator mutation to the durable memory. Operation lists
    /// are deduplicated by their target key; goals and limits overwrite.
    pub fn apply_command(&mut self, command: ColonyCommand) {
        match command {
            ColonyCommand::AddMiningOperation(operation) => {
                let exists = self
                    .memory
                    .mining_operations
                    .iter()
                    .any(|op| op.source_id == operation.source_id);
                if !exists {
                    self.memory.mining_operations.push(operation);
                }
            }
            ColonyCommand::AddBuildingOperation(operation) => {
                let exists = self
                    .memory
                    .building_operations
                    .iter()
                    .any(|op| op.territory_id == operation.territory_id);
                if !exists {
                    self.memory.building_operations.push(operation);
                }
            }
            ColonyCommand::AddRaidOperation(operation) => {
                let exists = self
                    .memory
                    .raid_operations
                    .iter()
                    .any(|op| op.territory_id == operation.territory_id);
                if !exists {
                    self.memory.raid_operations.push(operation);
                }
            }
            ColonyCommand::AddScoutOperation(operation) => {
                let exists = self
                    .memory
                    .scout_operations
                    .iter()
                    .any(|op| op.territory_id == operation.territory_id);
                if !exists {
                    self.memory.scout_operations.push(operation);
                }
            }
            ColonyCommand::SetOwnershipGoal { territory_id, goal } => {
                self.memory.territory_mut(&territory_id).ownership_goal = goal;
            }
            ColonyCommand::SetLimits {
                territory_id,
                limits,
            } => {
                self.memory.territory_mut(&territory_id).limits = limits;
            }
        }
    }

    pub(super) fn emit(
        &mut self,
        tick: u64,
        sequence_in_tick: &mut u64,
        event_type: EventType,
        actor_id: Option<String>,
        territory_id: Option<String>,
        details: Option<Value>,
    ) {
        *sequence_in_tick += 1;
        self.event_log.push(Event {
            event_id: format!("evt:{tick}:{sequence_in_tick}"),
            run_id: self.config.run_id.clone(),
            tick,
            sequence_in_tick: *sequence_in_tick,
            event_type,
            actor_id,
            territory_id,
            details,
        });
    }

    /// Drop assignment records whose agent is no longer live. The check
    /// is check-then-set: a record written earlier this tick for a
    /// freshly spawned agent survives because spawning agents are live.
    pub(super) fn prune_assignments(&mut self) {
        let live: BTreeSet<String> = self
            .state
            .agents()
            .filter(|agent| agent.is_live())
            .map(|agent| agent.name.clone())
            .collect();
        for record in self.memory.territories.values_mut() {
            if let Some(name) = &record.scout {
                if !live.contains(name) {
                    record.scout = None;
                }
            }
            if let Some(name) = &record.claimer {
                if !live.contains(name) {
                    record.claimer = None;
                }
            }
            record.drills.retain(|_, name| live.contains(name));
        }
    }
}

#[cfg(test)]
mod tests;
