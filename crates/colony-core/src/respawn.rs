//! Population manager: decides once per tick which agents to request and
//! from which spawn point, respecting capacity, distance, and failure
//! backoff.
//!
//! Spawn-point state within a tick: `Available → Busy` after any
//! successful or resource-insufficient attempt, with an orthogonal
//! territory-wide `Locked` transition after an insufficient-energy or
//! name-collision failure. Both are terminal for the tick; the next tick
//! starts from a fresh manager.

use std::collections::BTreeSet;
use std::fmt;

use contracts::{
    AgentAssignment, AgentRole, BodyPart, ColonyMemory, OwnershipGoal, SpawnOutcome, SpawnRequest,
};

use crate::snapshot::WorldSnapshot;

/// Cap on drill work parts regardless of available energy.
pub const MAX_DRILL_WORK_PARTS: i64 = 5;

/// Cap on repeated body segments for dynamically sized roles.
pub const MAX_BODY_SEGMENTS: i64 = 5;

/// Scouts are not sent further than this many route hops.
pub const MAX_SCOUT_ROUTE_HOPS: u32 = 4;

/// Remote operations (mining, building, raids, claims) skip targets
/// further than this many route hops from the nearest eligible spawn.
pub const MAX_REMOTE_ROUTE_HOPS: u32 = 3;

// ---------------------------------------------------------------------------
// Body blueprints
// ---------------------------------------------------------------------------

/// Drill blueprint: as many work parts as the territory's energy
/// capacity affords after one move part, capped.
pub fn drill_body(energy_capacity: i64) -> Vec<BodyPart> {
    let works = ((energy_capacity - BodyPart::Move.cost()) / BodyPart::Work.cost())
        .clamp(1, MAX_DRILL_WORK_PARTS);
    let mut body = vec![BodyPart::Work; works as usize];
    body.push(BodyPart::Move);
    body
}

/// General worker blueprint: repeated work/carry/move segments.
pub fn worker_body(energy_capacity: i64) -> Vec<BodyPart> {
    let segment_cost = BodyPart::Work.cost() + BodyPart::Carry.cost() + BodyPart::Move.cost();
    let segments = (energy_capacity / segment_cost).clamp(1, MAX_BODY_SEGMENTS);
    let mut body = Vec::new();
    for _ in 0..segments {
        body.extend([BodyPart::Work, BodyPart::Carry, BodyPart::Move]);
    }
    body
}

/// Remote miner blueprint: extra move parts for the commute.
pub fn remote_miner_body(energy_capacity: i64) -> Vec<BodyPart> {
    let segment_cost =
        BodyPart::Work.cost() + BodyPart::Carry.cost() + 2 * BodyPart::Move.cost();
    let segments = (energy_capacity / segment_cost).clamp(1, MAX_BODY_SEGMENTS);
    let mut body = Vec::new();
    for _ in 0..segments {
        body.extend([
            BodyPart::Work,
            BodyPart::Carry,
            BodyPart::Move,
            BodyPart::Move,
        ]);
    }
    body
}

/// Fighter blueprint for raid operations.
pub fn fighter_body(energy_capacity: i64) -> Vec<BodyPart> {
    let segment_cost = BodyPart::Tough.cost() + BodyPart::Attack.cost() + 2 * BodyPart::Move.cost();
    let segments = (energy_capacity / segment_cost).clamp(1, MAX_BODY_SEGMENTS);
    let mut body = Vec::new();
    for _ in 0..segments {
        body.extend([
            BodyPart::Tough,
            BodyPart::Attack,
            BodyPart::Move,
            BodyPart::Move,
        ]);
    }
    body
}

/// Scouts only ever need to move.
pub fn scout_body() -> Vec<BodyPart> {
    vec![BodyPart::Move]
}

/// Claimer blueprint: a full ownership claim needs a single claim part;
/// holding a reservation against contest needs sustained pressure.
pub fn claimer_body(goal: OwnershipGoal) -> Vec<BodyPart> {
    match goal {
        OwnershipGoal::Owned => vec![BodyPart::Claim, BodyPart::Move],
        OwnershipGoal::Reserved => vec![
            BodyPart::Claim,
            BodyPart::Claim,
            BodyPart::Move,
            BodyPart::Move,
        ],
    }
}

// ---------------------------------------------------------------------------
// Errors and attempt records
// ---------------------------------------------------------------------------

/// A structurally invalid spawn request is a configuration bug in the
/// caller, never retried — it propagates to the tick boundary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RespawnError {
    InvalidSpawnRequest {
        spawn_id: String,
        role: AgentRole,
        reason: String,
    },
}

impl fmt::Display for RespawnError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RespawnError::InvalidSpawnRequest {
                spawn_id,
                role,
                reason,
            } => write!(
                f,
                "invalid spawn request for {} at {spawn_id}: {reason}",
                role.as_str()
            ),
        }
    }
}

impl std::error::Error for RespawnError {}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttemptDisposition {
    Spawned { name: String },
    /// The spawn point was busy; only that point is ruled out.
    Deferred,
    /// Insufficient energy or a name collision: the whole territory is
    /// locked for the rest of the tick.
    Lockdown,
    /// No eligible spawn point within the hop threshold; the operation
    /// is skipped this tick and re-evaluated next tick.
    NoEligibleSpawn,
}

/// One decision the manager took, for the event log and for tests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpawnAttempt {
    pub role: AgentRole,
    pub target_territory: String,
    pub spawn_id: Option<String>,
    pub spawn_territory: Option<String>,
    pub disposition: AttemptDisposition,
}

// ---------------------------------------------------------------------------
// RespawnManager
// ---------------------------------------------------------------------------

/// Per-tick spawn scheduler. The busy/locked sets are shared across all
/// territories: a remote operation may consume a spawn point another
/// territory would have used later this tick, resolved purely by
/// iteration order.
#[derive(Debug)]
pub struct RespawnManager {
    tick: u64,
    busy_spawns: BTreeSet<String>,
    locked_territories: BTreeSet<String>,
    attempts: Vec<SpawnAttempt>,
    serial: u64,
}

impl RespawnManager {
    pub fn new(tick: u64) -> Self {
        Self {
            tick,
            busy_spawns: BTreeSet::new(),
            locked_territories: BTreeSet::new(),
            attempts: Vec::new(),
            serial: 0,
        }
    }

    /// Evaluate the decision procedure in order: per-source drills,
    /// territory worker quotas, scout operations, ownership operations,
    /// then remote mining/building/raid operations.
    pub fn run(
        &mut self,
        world: &mut WorldSnapshot,
        memory: &mut ColonyMemory,
    ) -> Result<(), RespawnError> {
        self.request_drills(world, memory)?;
        self.request_workers(world, memory)?;
        self.request_scouts(world, memory)?;
        self.request_claimers(world, memory)?;
        self.request_remote_miners(world, memory)?;
        self.request_remote_builders(world, memory)?;
        self.request_raiders(world, memory)?;
        Ok(())
    }

    pub fn attempts(&self) -> &[SpawnAttempt] {
        &self.attempts
    }

    pub fn is_locked(&self, territory_id: &str) -> bool {
        self.locked_territories.contains(territory_id)
    }

    pub fn is_busy(&self, spawn_id: &str) -> bool {
        self.busy_spawns.contains(spawn_id)
    }

    // --- Step 1: per-source drills ---

    fn request_drills(
        &mut self,
        world: &mut WorldSnapshot,
        memory: &mut ColonyMemory,
    ) -> Result<(), RespawnError> {
        let territory_ids: Vec<String> = world.territories().map(|t| t.id.clone()).collect();
        for territory_id in territory_ids {
            if self.is_locked(&territory_id) {
                continue;
            }
            let known_sources = match memory.territory(&territory_id) {
                Some(record) => record.known_sources.clone(),
                None => continue,
            };
            let unassigned = known_sources.into_iter().find(|source_id| {
                let assigned = memory
                    .territory(&territory_id)
                    .and_then(|record| record.drills.get(source_id));
                match assigned {
                    Some(name) => !world.is_live_agent(name),
                    None => true,
                }
            });
            let Some(source_id) = unassigned else {
                continue;
            };
            let Some(spawn_id) = self.local_spawn(world, &territory_id) else {
                continue;
            };
            let Some(territory) = world.territory(&territory_id) else {
                continue;
            };
            let body = drill_body(territory.energy_capacity);
            let request = SpawnRequest {
                role: AgentRole::Drill,
                name: self.next_name(AgentRole::Drill),
                body,
                assignment: AgentAssignment {
                    home_territory: territory_id.clone(),
                    source_id: Some(source_id.clone()),
                    target_territory: None,
                },
            };
            let spawned = self.attempt(world, &spawn_id, &territory_id, &territory_id, request)?;
            if let Some(name) = spawned {
                memory
                    .territory_mut(&territory_id)
                    .drills
                    .insert(source_id, name);
            }
            // One drill request per territory per tick; the next
            // unassigned node waits for the next re-evaluation.
        }
        Ok(())
    }

    // --- Step 2: territory worker quotas ---

    fn request_workers(
        &mut self,
        world: &mut WorldSnapshot,
        memory: &mut ColonyMemory,
    ) -> Result<(), RespawnError> {
        let territory_ids: Vec<String> = world.territories().map(|t| t.id.clone()).collect();
        for territory_id in territory_ids {
            if self.is_locked(&territory_id) {
                continue;
            }
            let minimum = memory
                .territory(&territory_id)
                .map(|record| record.limits.worker_minimum())
                .unwrap_or(0);
            let live = world
                .live_agents_with_role(AgentRole::Worker)
                .filter(|agent| agent.assignment.home_territory == territory_id)
                .count() as u32;
            if live >= minimum {
                continue;
            }
            let Some(spawn_id) = self.local_spawn(world, &territory_id) else {
                continue;
            };
            let Some(territory) = world.territory(&territory_id) else {
                continue;
            };
            let request = SpawnRequest {
                role: AgentRole::Worker,
                name: self.next_name(AgentRole::Worker),
                body: worker_body(territory.energy_capacity),
                assignment: AgentAssignment {
                    home_territory: territory_id.clone(),
                    source_id: None,
                    target_territory: None,
                },
            };
            self.attempt(world, &spawn_id, &territory_id, &territory_id, request)?;
        }
        Ok(())
    }

    // --- Step 3: scout operations ---

    fn request_scouts(
        &mut self,
        world: &mut WorldSnapshot,
        memory: &mut ColonyMemory,
    ) -> Result<(), RespawnError> {
        let operations = memory.scout_operations.clone();
        for operation in operations {
            let target = operation.territory_id;
            let scout_live = memory
                .territory(&target)
                .and_then(|record| record.scout.as_ref())
                .map_or(false, |name| world.is_live_agent(name));
            if scout_live {
                continue;
            }
            let Some((spawn_id, spawn_territory)) =
                self.nearest_eligible_spawn(world, &target, MAX_SCOUT_ROUTE_HOPS, false)
            else {
                self.record_unreachable(AgentRole::Scout, &target);
                continue;
            };
            let request = SpawnRequest {
                role: AgentRole::Scout,
                name: self.next_name(AgentRole::Scout),
                body: scout_body(),
                assignment: AgentAssignment {
                    home_territory: spawn_territory.clone(),
                    source_id: None,
                    target_territory: Some(target.clone()),
                },
            };
            let spawned = self.attempt(world, &spawn_id, &spawn_territory, &target, request)?;
            if let Some(name) = spawned {
                memory.territory_mut(&target).scout = Some(name);
            }
        }
        Ok(())
    }

    // --- Step 4: ownership operations ---

    fn request_claimers(
        &mut self,
        world: &mut WorldSnapshot,
        memory: &mut ColonyMemory,
    ) -> Result<(), RespawnError> {
        let goals: Vec<(String, OwnershipGoal)> = memory
            .territories
            .iter()
            .filter_map(|(id, record)| record.ownership_goal.map(|goal| (id.clone(), goal)))
            .collect();
        for (target, goal) in goals {
            let already_met = world
                .territory(&target)
                .and_then(|territory| territory.controller.as_ref())
                .map_or(false, |controller| match goal {
                    OwnershipGoal::Owned => controller.owned,
                    OwnershipGoal::Reserved => controller.reserved || controller.owned,
                });
            if already_met {
                continue;
            }
            let claimer_live = memory
                .territory(&target)
                .and_then(|record| record.claimer.as_ref())
                .map_or(false, |name| world.is_live_agent(name));
            if claimer_live {
                continue;
            }
            let Some((spawn_id, spawn_territory)) =
                self.nearest_eligible_spawn(world, &target, MAX_REMOTE_ROUTE_HOPS, false)
            else {
                self.record_unreachable(AgentRole::Claimer, &target);
                continue;
            };
            let request = SpawnRequest {
                role: AgentRole::Claimer,
                name: self.next_name(AgentRole::Claimer),
                body: claimer_body(goal),
                assignment: AgentAssignment {
                    home_territory: spawn_territory.clone(),
                    source_id: None,
                    target_territory: Some(target.clone()),
                },
            };
            let spawned = self.attempt(world, &spawn_id, &spawn_territory, &target, request)?;
            if let Some(name) = spawned {
                memory.territory_mut(&target).claimer = Some(name);
            }
        }
        Ok(())
    }

    // --- Step 5: remote mining, building, and raid operations ---

    fn request_remote_miners(
        &mut self,
        world: &mut WorldSnapshot,
        memory: &mut ColonyMemory,
    ) -> Result<(), RespawnError> {
        let operations = memory.mining_operations.clone();
        for operation in operations {
            let live = world
                .live_agents_with_role(AgentRole::RemoteMiner)
                .filter(|agent| agent.assignment.source_id.as_deref() == Some(&operation.source_id))
                .count() as u32;
            if live >= operation.min_agents {
                continue;
            }
            let Some((spawn_id, spawn_territory)) = self.nearest_eligible_spawn(
                world,
                &operation.territory_id,
                MAX_REMOTE_ROUTE_HOPS,
                true,
            ) else {
                self.record_unreachable(AgentRole::RemoteMiner, &operation.territory_id);
                continue;
            };
            let capacity = world
                .territory(&spawn_territory)
                .map(|territory| territory.energy_capacity)
                .unwrap_or(0);
            let request = SpawnRequest {
                role: AgentRole::RemoteMiner,
                name: self.next_name(AgentRole::RemoteMiner),
                body: remote_miner_body(capacity),
                assignment: AgentAssignment {
                    home_territory: spawn_territory.clone(),
                    source_id: Some(operation.source_id.clone()),
                    target_territory: Some(operation.territory_id.clone()),
                },
            };
            self.attempt(
                world,
                &spawn_id,
                &spawn_territory,
                &operation.territory_id,
                request,
            )?;
        }
        Ok(())
    }

    fn request_remote_builders(
        &mut self,
        world: &mut WorldSnapshot,
        memory: &mut ColonyMemory,
    ) -> Result<(), RespawnError> {
        let operations = memory.building_operations.clone();
        for operation in operations {
            let live = world
                .live_agents_with_role(AgentRole::RemoteBuilder)
                .filter(|agent| {
                    agent.assignment.target_territory.as_deref() == Some(&operation.territory_id)
                })
                .count() as u32;
            if live >= operation.min_agents {
                continue;
            }
            let Some((spawn_id, spawn_territory)) = self.nearest_eligible_spawn(
                world,
                &operation.territory_id,
                MAX_REMOTE_ROUTE_HOPS,
                false,
            ) else {
                self.record_unreachable(AgentRole::RemoteBuilder, &operation.territory_id);
                continue;
            };
            let capacity = world
                .territory(&spawn_territory)
                .map(|territory| territory.energy_capacity)
                .unwrap_or(0);
            let request = SpawnRequest {
                role: AgentRole::RemoteBuilder,
                name: self.next_name(AgentRole::RemoteBuilder),
                body: worker_body(capacity),
                assignment: AgentAssignment {
                    home_territory: spawn_territory.clone(),
                    source_id: None,
                    target_territory: Some(operation.territory_id.clone()),
                },
            };
            self.attempt(
                world,
                &spawn_id,
                &spawn_territory,
                &operation.territory_id,
                request,
            )?;
        }
        Ok(())
    }

    fn request_raiders(
        &mut self,
        world: &mut WorldSnapshot,
        memory: &mut ColonyMemory,
    ) -> Result<(), RespawnError> {
        let operations = memory.raid_operations.clone();
        for operation in operations {
            let live = world
                .live_agents_with_role(AgentRole::Fighter)
                .filter(|agent| {
                    agent.assignment.target_territory.as_deref() == Some(&operation.territory_id)
                })
                .count() as u32;
            if live >= operation.min_agents {
                continue;
            }
            let Some((spawn_id, spawn_territory)) = self.nearest_eligible_spawn(
                world,
                &operation.territory_id,
                MAX_REMOTE_ROUTE_HOPS,
                false,
            ) else {
                self.record_unreachable(AgentRole::Fighter, &operation.territory_id);
                continue;
            };
            let capacity = world
                .territory(&spawn_territory)
                .map(|territory| territory.energy_capacity)
                .unwrap_or(0);
            let request = SpawnRequest {
                role: AgentRole::Fighter,
                name: self.next_name(AgentRole::Fighter),
                body: fighter_body(capacity),
                assignment: AgentAssignment {
                    home_territory: spawn_territory.clone(),
                    source_id: None,
                    target_territory: Some(operation.territory_id.clone()),
                },
            };
            self.attempt(
                world,
                &spawn_id,
                &spawn_territory,
                &operation.territory_id,
                request,
            )?;
        }
        Ok(())
    }

    // --- Shared machinery ---

    /// First non-busy spawn point in the territory itself.
    fn local_spawn(&self, world: &WorldSnapshot, territory_id: &str) -> Option<String> {
        world
            .spawn_points_in(territory_id)
            .find(|spawn| !self.is_busy(&spawn.id))
            .map(|spawn| spawn.id.clone())
    }

    /// Nearest eligible spawn point for a remote target: never in the
    /// target territory itself, not busy or locked, territory must have
    /// a controller (and a storage when required), route must resolve.
    /// Fewest hops wins; a minimum above `max_hops` means no selection.
    fn nearest_eligible_spawn(
        &self,
        world: &WorldSnapshot,
        target_territory: &str,
        max_hops: u32,
        require_storage: bool,
    ) -> Option<(String, String)> {
        let mut best: Option<(u32, String, String)> = None;
        for spawn in world.spawn_points() {
            if spawn.territory_id == target_territory {
                continue;
            }
            if self.is_busy(&spawn.id) || self.is_locked(&spawn.territory_id) {
                continue;
            }
            let Some(territory) = world.territory(&spawn.territory_id) else {
                continue;
            };
            if territory.controller.is_none() {
                continue;
            }
            if require_storage
                && !world
                    .structures_in(&spawn.territory_id)
                    .any(|s| s.kind == crate::snapshot::StructureKind::Storage)
            {
                continue;
            }
            let Some(hops) = world.route_hops(&spawn.territory_id, target_territory) else {
                continue;
            };
            let candidate = (hops, spawn.id.clone(), spawn.territory_id.clone());
            match &best {
                Some(current) if *current <= candidate => {}
                _ => best = Some(candidate),
            }
        }
        match best {
            Some((hops, spawn_id, territory_id)) if hops <= max_hops => {
                Some((spawn_id, territory_id))
            }
            _ => None,
        }
    }

    fn attempt(
        &mut self,
        world: &mut WorldSnapshot,
        spawn_id: &str,
        spawn_territory: &str,
        target_territory: &str,
        request: SpawnRequest,
    ) -> Result<Option<String>, RespawnError> {
        let role = request.role;
        let outcome = world.try_spawn(spawn_id, &request);
        let (disposition, spawned) = match outcome {
            SpawnOutcome::Spawned { name } => {
                self.busy_spawns.insert(spawn_id.to_string());
                (
                    AttemptDisposition::Spawned { name: name.clone() },
                    Some(name),
                )
            }
            SpawnOutcome::Busy => {
                self.busy_spawns.insert(spawn_id.to_string());
                (AttemptDisposition::Deferred, None)
            }
            SpawnOutcome::InsufficientEnergy | SpawnOutcome::NameTaken => {
                self.busy_spawns.insert(spawn_id.to_string());
                self.locked_territories.insert(spawn_territory.to_string());
                (AttemptDisposition::Lockdown, None)
            }
            SpawnOutcome::InvalidRequest { reason } => {
                return Err(RespawnError::InvalidSpawnRequest {
                    spawn_id: spawn_id.to_string(),
                    role,
                    reason,
                });
            }
        };
        self.attempts.push(SpawnAttempt {
            role,
            target_territory: target_territory.to_string(),
            spawn_id: Some(spawn_id.to_string()),
            spawn_territory: Some(spawn_territory.to_string()),
            disposition,
        });
        Ok(spawned)
    }

    fn record_unreachable(&mut self, role: AgentRole, target_territory: &str) {
        self.attempts.push(SpawnAttempt {
            role,
            target_territory: target_territory.to_string(),
            spawn_id: None,
            spawn_territory: None,
            disposition: AttemptDisposition::NoEligibleSpawn,
        });
    }

    fn next_name(&mut self, role: AgentRole) -> String {
        self.serial += 1;
        format!("{}-{}-{}", role.as_str(), self.tick, self.serial)
    }
}
