//! Cross-boundary contracts for the colony scheduling kernel, API,
//! persistence, and CLI.
//!
//! Everything here is plain serde data: run configuration and status,
//! agent/job/provider vocabulary, the durable colony memory document,
//! kernel events, and the API error envelope. Logic lives in
//! `colony-core`; this crate only fixes the shapes that cross crate
//! boundaries.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

pub mod serde_u64_string;

pub const SCHEMA_VERSION_V1: &str = "1.0";

// ---------------------------------------------------------------------------
// Run configuration and status
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RunConfig {
    pub schema_version: String,
    pub run_id: String,
    #[serde(with = "serde_u64_string")]
    pub seed: u64,
    pub max_ticks: u64,
    pub snapshot_every_ticks: u64,
    /// Number of territories generated at world init.
    pub territory_count: u32,
    pub notes: Option<String>,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            schema_version: SCHEMA_VERSION_V1.to_string(),
            run_id: "colony_local_001".to_string(),
            seed: 1337,
            max_ticks: 720,
            snapshot_every_ticks: 24,
            territory_count: 2,
            notes: None,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RunMode {
    Running,
    Paused,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RunStatus {
    pub schema_version: String,
    pub run_id: String,
    pub current_tick: u64,
    pub max_ticks: u64,
    pub mode: RunMode,
    pub agent_count: usize,
}

impl RunStatus {
    pub fn is_complete(&self) -> bool {
        self.current_tick >= self.max_ticks
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "run_id={} tick={}/{} mode={:?} agents={}",
            self.run_id, self.current_tick, self.max_ticks, self.mode, self.agent_count
        )
    }
}

// ---------------------------------------------------------------------------
// Agent vocabulary: roles and body blueprints
// ---------------------------------------------------------------------------

/// The fixed set of agent roles the population manager spawns.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum AgentRole {
    Drill,
    Worker,
    Scout,
    Claimer,
    RemoteMiner,
    RemoteBuilder,
    Fighter,
}

impl AgentRole {
    pub fn as_str(self) -> &'static str {
        match self {
            AgentRole::Drill => "drill",
            AgentRole::Worker => "worker",
            AgentRole::Scout => "scout",
            AgentRole::Claimer => "claimer",
            AgentRole::RemoteMiner => "remote_miner",
            AgentRole::RemoteBuilder => "remote_builder",
            AgentRole::Fighter => "fighter",
        }
    }
}

/// A body segment of an agent blueprint. Costs are fixed by the engine.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum BodyPart {
    Work,
    Carry,
    Move,
    Claim,
    Attack,
    Tough,
}

impl BodyPart {
    pub fn cost(self) -> i64 {
        match self {
            BodyPart::Work => 100,
            BodyPart::Carry => 50,
            BodyPart::Move => 50,
            BodyPart::Claim => 600,
            BodyPart::Attack => 80,
            BodyPart::Tough => 10,
        }
    }
}

/// Total energy cost of a body blueprint.
pub fn body_cost(body: &[BodyPart]) -> i64 {
    body.iter().map(|part| part.cost()).sum()
}

// ---------------------------------------------------------------------------
// Jobs
// ---------------------------------------------------------------------------

/// Closed set of job kinds handed out by the job scheduler.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum JobKind {
    Refill,
    Build,
    Repair,
    Upgrade,
    Sweep,
    Deposit,
    Noop,
}

impl JobKind {
    pub fn as_str(self) -> &'static str {
        match self {
            JobKind::Refill => "refill",
            JobKind::Build => "build",
            JobKind::Repair => "repair",
            JobKind::Upgrade => "upgrade",
            JobKind::Sweep => "sweep",
            JobKind::Deposit => "deposit",
            JobKind::Noop => "noop",
        }
    }
}

/// A typed unit of demand bound to a target entity.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Job {
    pub kind: JobKind,
    pub target_id: Option<String>,
}

impl Job {
    pub fn new(kind: JobKind, target_id: impl Into<String>) -> Self {
        Self {
            kind,
            target_id: Some(target_id.into()),
        }
    }

    pub fn noop() -> Self {
        Self {
            kind: JobKind::Noop,
            target_id: None,
        }
    }
}

// ---------------------------------------------------------------------------
// Resource providers
// ---------------------------------------------------------------------------

/// A claimed resource provider, resolved once at claim time.
/// `Stationary` is a container or storage structure; `Ground` is an
/// ephemeral drop. Downstream code matches on the tag instead of
/// re-probing the target.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case", tag = "kind", content = "id")]
pub enum ProviderRef {
    Stationary(String),
    Ground(String),
}

impl ProviderRef {
    pub fn id(&self) -> &str {
        match self {
            ProviderRef::Stationary(id) | ProviderRef::Ground(id) => id,
        }
    }
}

// ---------------------------------------------------------------------------
// Spawning
// ---------------------------------------------------------------------------

/// Role-specific data fixed at agent creation.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct AgentAssignment {
    pub home_territory: String,
    pub source_id: Option<String>,
    pub target_territory: Option<String>,
}

/// A request submitted to a spawn point.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SpawnRequest {
    pub role: AgentRole,
    pub name: String,
    pub body: Vec<BodyPart>,
    pub assignment: AgentAssignment,
}

/// Discriminated outcome of a spawn attempt.
///
/// `InvalidRequest` signals a structurally broken request (a caller
/// bug); everything else is an environmental condition the population
/// manager handles with busy/lock bookkeeping.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case", tag = "outcome")]
pub enum SpawnOutcome {
    Spawned { name: String },
    Busy,
    InsufficientEnergy,
    NameTaken,
    InvalidRequest { reason: String },
}

// ---------------------------------------------------------------------------
// Durable colony memory
// ---------------------------------------------------------------------------

/// Desired controller status for an ownership operation.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum OwnershipGoal {
    Reserved,
    Owned,
}

/// Per-territory queue capacities and population minimums.
///
/// Fields are optional on disk; `apply_defaults` fills only absent
/// fields, so re-running it is idempotent and operator overrides are
/// never clobbered.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct TerritoryLimits {
    pub workers: Option<u32>,
    pub jobs_refill: Option<u32>,
    pub jobs_build: Option<u32>,
    pub jobs_repair: Option<u32>,
    pub jobs_upgrade: Option<u32>,
    pub jobs_sweep: Option<u32>,
}

pub const DEFAULT_WORKER_MINIMUM: u32 = 4;
pub const DEFAULT_JOBS_REFILL: u32 = 2;
pub const DEFAULT_JOBS_BUILD: u32 = 2;
pub const DEFAULT_JOBS_REPAIR: u32 = 2;
pub const DEFAULT_JOBS_UPGRADE: u32 = 4;
pub const DEFAULT_JOBS_SWEEP: u32 = 4;

impl TerritoryLimits {
    pub fn apply_defaults(&mut self) {
        self.workers.get_or_insert(DEFAULT_WORKER_MINIMUM);
        self.jobs_refill.get_or_insert(DEFAULT_JOBS_REFILL);
        self.jobs_build.get_or_insert(DEFAULT_JOBS_BUILD);
        self.jobs_repair.get_or_insert(DEFAULT_JOBS_REPAIR);
        self.jobs_upgrade.get_or_insert(DEFAULT_JOBS_UPGRADE);
        self.jobs_sweep.get_or_insert(DEFAULT_JOBS_SWEEP);
    }

    pub fn worker_minimum(&self) -> u32 {
        self.workers.unwrap_or(DEFAULT_WORKER_MINIMUM)
    }

    /// Queue capacity for a claimable job kind. `Deposit` and `Noop` are
    /// fallback jobs and never queue.
    pub fn job_capacity(&self, kind: JobKind) -> usize {
        let capacity = match kind {
            JobKind::Refill => self.jobs_refill.unwrap_or(DEFAULT_JOBS_REFILL),
            JobKind::Build => self.jobs_build.unwrap_or(DEFAULT_JOBS_BUILD),
            JobKind::Repair => self.jobs_repair.unwrap_or(DEFAULT_JOBS_REPAIR),
            JobKind::Upgrade => self.jobs_upgrade.unwrap_or(DEFAULT_JOBS_UPGRADE),
            JobKind::Sweep => self.jobs_sweep.unwrap_or(DEFAULT_JOBS_SWEEP),
            JobKind::Deposit | JobKind::Noop => 0,
        };
        capacity as usize
    }
}

/// Durable records for one territory: configuration plus the assignment
/// index (source id / role → agent name) the population manager and the
/// behavior modules both consult.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct TerritoryMemory {
    #[serde(default)]
    pub limits: TerritoryLimits,
    pub ownership_goal: Option<OwnershipGoal>,
    pub scout: Option<String>,
    pub claimer: Option<String>,
    #[serde(default)]
    pub drills: BTreeMap<String, String>,
    #[serde(default)]
    pub known_sources: Vec<String>,
}

/// A durable remote-mining demand: keep `min_agents` live miners on a
/// specific resource node in a foreign territory.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MiningOperation {
    pub source_id: String,
    pub territory_id: String,
    pub min_agents: u32,
}

/// A durable remote-building demand keyed by territory.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BuildingOperation {
    pub territory_id: String,
    pub min_agents: u32,
}

/// A durable raid demand keyed by territory.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RaidOperation {
    pub territory_id: String,
    pub min_agents: u32,
}

/// A durable reconnaissance demand: keep one live scout in a territory.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ScoutOperation {
    pub territory_id: String,
}

/// What a scout reported about a territory, cached across ticks.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TerritoryIntel {
    pub observed_tick: u64,
    pub controller_level: Option<u32>,
    pub owned: bool,
    pub reserved: bool,
    pub hostile: bool,
}

/// The whole durable cross-tick document: one global record plus one
/// record per known territory. Everything else the kernel computes is
/// rebuilt from scratch each tick.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ColonyMemory {
    #[serde(default)]
    pub territories: BTreeMap<String, TerritoryMemory>,
    #[serde(default)]
    pub mining_operations: Vec<MiningOperation>,
    #[serde(default)]
    pub building_operations: Vec<BuildingOperation>,
    #[serde(default)]
    pub raid_operations: Vec<RaidOperation>,
    #[serde(default)]
    pub scout_operations: Vec<ScoutOperation>,
    #[serde(default)]
    pub intel: BTreeMap<String, TerritoryIntel>,
}

impl ColonyMemory {
    /// Fetch-or-create the record for a territory. Creation is cheap and
    /// the defaulting pass fills configuration afterwards.
    pub fn territory_mut(&mut self, territory_id: &str) -> &mut TerritoryMemory {
        self.territories
            .entry(territory_id.to_string())
            .or_default()
    }

    pub fn territory(&self, territory_id: &str) -> Option<&TerritoryMemory> {
        self.territories.get(territory_id)
    }
}

// ---------------------------------------------------------------------------
// Kernel events
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    TerritoryObserved,
    AgentSpawned,
    SpawnDeferred,
    SpawnLockdown,
    OperationSkipped,
    JobClaimed,
    ResourceClaimed,
    ClaimUnfilled,
    AgentExpired,
    TickFault,
}

/// One structured kernel event. Events are the kernel's observability
/// surface; the API persists and serves them, the CLI summarizes them.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Event {
    pub event_id: String,
    pub run_id: String,
    pub tick: u64,
    pub sequence_in_tick: u64,
    pub event_type: EventType,
    pub actor_id: Option<String>,
    pub territory_id: Option<String>,
    pub details: Option<Value>,
}

// ---------------------------------------------------------------------------
// Snapshot document (persistence)
// ---------------------------------------------------------------------------

/// Periodic persistence document: status plus the durable memory and a
/// world summary. Enough to resume inspection of a stored run; derived
/// scheduler state is never persisted (it is rebuilt every tick).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Snapshot {
    pub schema_version: String,
    pub run_id: String,
    pub tick: u64,
    pub status: RunStatus,
    pub memory: ColonyMemory,
    pub world: Value,
}

// ---------------------------------------------------------------------------
// Colony commands (API mutation entry points)
// ---------------------------------------------------------------------------

/// Mutations an operator can apply to the durable memory between ticks.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case", tag = "command")]
pub enum ColonyCommand {
    AddMiningOperation(MiningOperation),
    AddBuildingOperation(BuildingOperation),
    AddRaidOperation(RaidOperation),
    AddScoutOperation(ScoutOperation),
    SetOwnershipGoal {
        territory_id: String,
        goal: Option<OwnershipGoal>,
    },
    SetLimits {
        territory_id: String,
        limits: TerritoryLimits,
    },
}

// ---------------------------------------------------------------------------
// API error envelope
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    RunNotFound,
    InvalidCommand,
    InvalidQuery,
    RunStateConflict,
    TickFault,
    InternalError,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ApiError {
    pub schema_version: String,
    pub error_code: ErrorCode,
    pub message: String,
    pub details: Option<String>,
}

impl ApiError {
    pub fn new(error_code: ErrorCode, message: impl Into<String>, details: Option<String>) -> Self {
        Self {
            schema_version: SCHEMA_VERSION_V1.to_string(),
            error_code,
            message: message.into(),
            details,
        }
    }
}
