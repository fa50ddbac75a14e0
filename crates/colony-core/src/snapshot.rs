//! World snapshot model: the queryable collections of territories,
//! structures, resources, and agents that the schedulers consume, plus
//! route queries and the spawn-request primitive.
//!
//! In a deployment this state is fed by the game engine each tick; here
//! it doubles as the deterministic test world. The schedulers only ever
//! see this model, never the engine — liveness and existence are
//! explicit queries (`exists`, `is_live_agent`), not "lookup returned
//! nothing" idioms.

use std::collections::{BTreeMap, BTreeSet, VecDeque};

use contracts::{body_cost, AgentAssignment, AgentRole, BodyPart, SpawnOutcome, SpawnRequest};

/// Agents at or below this remaining lifetime no longer count as live
/// for population decisions; a replacement should already be on its way.
pub const MIN_LIVE_TICKS: u64 = 100;

/// Engine cap on blueprint length.
pub const MAX_BODY_PARTS: usize = 50;

/// Spawn energy regenerated per tick (stands in for refill logistics,
/// which are external behavior).
pub const SPAWN_ENERGY_REGEN: i64 = 20;

/// Container trickle per tick (stands in for drill output).
pub const CONTAINER_REGEN: i64 = 10;

// ---------------------------------------------------------------------------
// Core types
// ---------------------------------------------------------------------------

/// A grid position inside a territory.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Position {
    pub x: i32,
    pub y: i32,
}

impl Position {
    pub fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    /// Chebyshev distance, the path-cost approximation used for
    /// nearest-provider ordering.
    pub fn travel_cost(&self, other: Position) -> i64 {
        let dx = (self.x - other.x).abs() as i64;
        let dy = (self.y - other.y).abs() as i64;
        dx.max(dy)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum StructureKind {
    Spawn,
    Extension,
    Tower,
    Container,
    Storage,
    Wall,
    Rampart,
    Road,
}

impl StructureKind {
    /// Energy sinks are refill targets when they have free capacity.
    pub fn is_energy_sink(self) -> bool {
        matches!(
            self,
            StructureKind::Spawn | StructureKind::Extension | StructureKind::Tower
        )
    }

    /// Stationary resource providers the ledger draws from.
    pub fn is_resource_provider(self) -> bool {
        matches!(self, StructureKind::Container | StructureKind::Storage)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Structure {
    pub id: String,
    pub territory_id: String,
    pub kind: StructureKind,
    pub pos: Position,
    pub hits: i64,
    pub hits_max: i64,
    pub energy: i64,
    pub energy_capacity: i64,
}

impl Structure {
    pub fn free_energy_capacity(&self) -> i64 {
        (self.energy_capacity - self.energy).max(0)
    }
}

/// A resource node agents drill. Nodes are permanent territory features.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceNode {
    pub id: String,
    pub territory_id: String,
    pub pos: Position,
}

/// An ephemeral ground drop of energy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceDrop {
    pub id: String,
    pub territory_id: String,
    pub pos: Position,
    pub amount: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConstructionSite {
    pub id: String,
    pub territory_id: String,
    pub pos: Position,
}

/// Controller state as observed this tick. `owned`/`reserved` are from
/// the colony's perspective.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControllerState {
    pub id: String,
    pub level: u32,
    pub owned: bool,
    pub reserved: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Territory {
    pub id: String,
    pub controller: Option<ControllerState>,
    /// Energy currently available to spawn points in this territory.
    pub energy_available: i64,
    /// Maximum spawn energy; blueprint sizing scales with this.
    pub energy_capacity: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpawnPoint {
    pub id: String,
    pub territory_id: String,
    pub pos: Position,
    /// Name of the agent currently being assembled, if any.
    pub spawning: Option<String>,
}

/// Snapshot view of one agent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentState {
    pub name: String,
    pub role: AgentRole,
    pub territory_id: String,
    pub pos: Position,
    pub body: Vec<BodyPart>,
    pub carry: i64,
    pub carry_capacity: i64,
    pub ticks_to_live: u64,
    pub spawning: bool,
    pub assignment: AgentAssignment,
}

impl AgentState {
    pub fn free_capacity(&self) -> i64 {
        (self.carry_capacity - self.carry).max(0)
    }

    /// Live for population purposes: enough lifetime left to be worth
    /// counting, or still being assembled.
    pub fn is_live(&self) -> bool {
        self.spawning || self.ticks_to_live > MIN_LIVE_TICKS
    }
}

// ---------------------------------------------------------------------------
// WorldSnapshot
// ---------------------------------------------------------------------------

/// The live view of the world for the current tick.
#[derive(Debug, Clone, Default)]
pub struct WorldSnapshot {
    territories: BTreeMap<String, Territory>,
    structures: BTreeMap<String, Structure>,
    sources: BTreeMap<String, SourceNode>,
    drops: BTreeMap<String, ResourceDrop>,
    sites: BTreeMap<String, ConstructionSite>,
    spawn_points: BTreeMap<String, SpawnPoint>,
    agents: BTreeMap<String, AgentState>,
    adjacency: BTreeMap<String, BTreeSet<String>>,
}

impl WorldSnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    // --- Population (world construction) ---

    pub fn add_territory(&mut self, territory: Territory) {
        self.territories.insert(territory.id.clone(), territory);
    }

    pub fn add_structure(&mut self, structure: Structure) {
        self.structures.insert(structure.id.clone(), structure);
    }

    pub fn add_source(&mut self, source: SourceNode) {
        self.sources.insert(source.id.clone(), source);
    }

    pub fn add_drop(&mut self, drop: ResourceDrop) {
        self.drops.insert(drop.id.clone(), drop);
    }

    pub fn add_site(&mut self, site: ConstructionSite) {
        self.sites.insert(site.id.clone(), site);
    }

    pub fn add_spawn_point(&mut self, spawn: SpawnPoint) {
        self.spawn_points.insert(spawn.id.clone(), spawn);
    }

    pub fn add_agent(&mut self, agent: AgentState) {
        self.agents.insert(agent.name.clone(), agent);
    }

    pub fn connect(&mut self, a: &str, b: &str) {
        self.adjacency
            .entry(a.to_string())
            .or_default()
            .insert(b.to_string());
        self.adjacency
            .entry(b.to_string())
            .or_default()
            .insert(a.to_string());
    }

    // --- Enumeration ---

    pub fn territories(&self) -> impl Iterator<Item = &Territory> {
        self.territories.values()
    }

    pub fn territory(&self, id: &str) -> Option<&Territory> {
        self.territories.get(id)
    }

    pub fn territory_mut(&mut self, id: &str) -> Option<&mut Territory> {
        self.territories.get_mut(id)
    }

    pub fn structures_in<'a>(&'a self, territory_id: &'a str) -> impl Iterator<Item = &'a Structure> {
        self.structures
            .values()
            .filter(move |s| s.territory_id == territory_id)
    }

    pub fn structure(&self, id: &str) -> Option<&Structure> {
        self.structures.get(id)
    }

    pub fn structure_mut(&mut self, id: &str) -> Option<&mut Structure> {
        self.structures.get_mut(id)
    }

    pub fn sources_in<'a>(&'a self, territory_id: &'a str) -> impl Iterator<Item = &'a SourceNode> {
        self.sources
            .values()
            .filter(move |s| s.territory_id == territory_id)
    }

    pub fn drops_in<'a>(&'a self, territory_id: &'a str) -> impl Iterator<Item = &'a ResourceDrop> {
        self.drops
            .values()
            .filter(move |d| d.territory_id == territory_id)
    }

    pub fn drop_mut(&mut self, id: &str) -> Option<&mut ResourceDrop> {
        self.drops.get_mut(id)
    }

    pub fn sites_in<'a>(&'a self, territory_id: &'a str) -> impl Iterator<Item = &'a ConstructionSite> {
        self.sites
            .values()
            .filter(move |s| s.territory_id == territory_id)
    }

    pub fn spawn_points(&self) -> impl Iterator<Item = &SpawnPoint> {
        self.spawn_points.values()
    }

    pub fn spawn_points_in<'a>(
        &'a self,
        territory_id: &'a str,
    ) -> impl Iterator<Item = &'a SpawnPoint> {
        self.spawn_points
            .values()
            .filter(move |s| s.territory_id == territory_id)
    }

    pub fn agents(&self) -> impl Iterator<Item = &AgentState> {
        self.agents.values()
    }

    pub fn agent(&self, name: &str) -> Option<&AgentState> {
        self.agents.get(name)
    }

    pub fn agent_mut(&mut self, name: &str) -> Option<&mut AgentState> {
        self.agents.get_mut(name)
    }

    pub fn agent_names(&self) -> Vec<String> {
        self.agents.keys().cloned().collect()
    }

    pub fn remove_agent(&mut self, name: &str) -> Option<AgentState> {
        self.agents.remove(name)
    }

    // --- Existence and liveness queries ---

    /// Whether any entity with this id exists in the snapshot, across
    /// all id namespaces.
    pub fn exists(&self, id: &str) -> bool {
        self.structures.contains_key(id)
            || self.drops.contains_key(id)
            || self.sources.contains_key(id)
            || self.sites.contains_key(id)
            || self.spawn_points.contains_key(id)
            || self.territories.contains_key(id)
            || self.agents.contains_key(id)
    }

    /// Whether an assignment-record name refers to a live agent.
    pub fn is_live_agent(&self, name: &str) -> bool {
        self.agents.get(name).map_or(false, AgentState::is_live)
    }

    pub fn live_agents_with_role<'a>(
        &'a self,
        role: AgentRole,
    ) -> impl Iterator<Item = &'a AgentState> {
        self.agents
            .values()
            .filter(move |a| a.role == role && a.is_live())
    }

    // --- Route queries ---

    /// Minimum number of territory transitions between two territories,
    /// by breadth-first search over the adjacency graph. `Some(0)` when
    /// origin equals destination, `None` when unreachable.
    pub fn route_hops(&self, from: &str, to: &str) -> Option<u32> {
        if from == to {
            return Some(0);
        }
        let mut visited = BTreeSet::new();
        let mut queue = VecDeque::new();
        visited.insert(from.to_string());
        queue.push_back((from.to_string(), 0_u32));
        while let Some((current, hops)) = queue.pop_front() {
            if let Some(neighbors) = self.adjacency.get(&current) {
                for next in neighbors {
                    if next == to {
                        return Some(hops + 1);
                    }
                    if visited.insert(next.clone()) {
                        queue.push_back((next.clone(), hops + 1));
                    }
                }
            }
        }
        None
    }

    // --- Spawn primitive ---

    /// Submit a spawn request to a spawn point. Structural problems
    /// (unknown spawn point, empty or oversized blueprint) come back as
    /// `InvalidRequest`; everything else is an environmental outcome.
    pub fn try_spawn(&mut self, spawn_id: &str, request: &SpawnRequest) -> SpawnOutcome {
        let Some(spawn) = self.spawn_points.get(spawn_id) else {
            return SpawnOutcome::InvalidRequest {
                reason: format!("unknown spawn point {spawn_id}"),
            };
        };
        if request.body.is_empty() {
            return SpawnOutcome::InvalidRequest {
                reason: "empty body blueprint".to_string(),
            };
        }
        if request.body.len() > MAX_BODY_PARTS {
            return SpawnOutcome::InvalidRequest {
                reason: format!("blueprint exceeds {MAX_BODY_PARTS} parts"),
            };
        }
        if spawn.spawning.is_some() {
            return SpawnOutcome::Busy;
        }
        if self.agents.contains_key(&request.name) {
            return SpawnOutcome::NameTaken;
        }

        let territory_id = spawn.territory_id.clone();
        let cost = body_cost(&request.body);
        let Some(territory) = self.territories.get_mut(&territory_id) else {
            return SpawnOutcome::InvalidRequest {
                reason: format!("spawn point {spawn_id} has no territory"),
            };
        };
        if cost > territory.energy_available {
            return SpawnOutcome::InsufficientEnergy;
        }
        territory.energy_available -= cost;

        let carry_capacity = request
            .body
            .iter()
            .filter(|part| **part == BodyPart::Carry)
            .count() as i64
            * 50;
        let pos = self.spawn_points[spawn_id].pos;
        let agent = AgentState {
            name: request.name.clone(),
            role: request.role,
            territory_id: territory_id.clone(),
            pos,
            body: request.body.clone(),
            carry: 0,
            carry_capacity,
            ticks_to_live: lifetime_for(request.role),
            spawning: true,
            assignment: request.assignment.clone(),
        };
        self.agents.insert(agent.name.clone(), agent);
        if let Some(spawn) = self.spawn_points.get_mut(spawn_id) {
            spawn.spawning = Some(request.name.clone());
        }
        SpawnOutcome::Spawned {
            name: request.name.clone(),
        }
    }

    // --- Engine upkeep between ticks ---

    /// Finish assembly of agents that were spawning: they become active
    /// and their spawn points free up. Returns the activated names.
    pub fn finish_spawning(&mut self) -> Vec<String> {
        let mut activated = Vec::new();
        for spawn in self.spawn_points.values_mut() {
            if let Some(name) = spawn.spawning.take() {
                if let Some(agent) = self.agents.get_mut(&name) {
                    agent.spawning = false;
                    activated.push(name);
                }
            }
        }
        activated
    }

    /// Decrement lifetimes of active agents and remove the expired.
    /// Returns the removed names.
    pub fn decay_lifetimes(&mut self) -> Vec<String> {
        let mut expired = Vec::new();
        for agent in self.agents.values_mut() {
            if agent.spawning {
                continue;
            }
            agent.ticks_to_live = agent.ticks_to_live.saturating_sub(1);
            if agent.ticks_to_live == 0 {
                expired.push(agent.name.clone());
            }
        }
        for name in &expired {
            self.agents.remove(name);
        }
        expired
    }

    /// Per-tick regeneration: spawn energy climbs toward capacity,
    /// containers trickle (drill output happens off-model), depleted
    /// drops evaporate.
    pub fn upkeep(&mut self) {
        for territory in self.territories.values_mut() {
            territory.energy_available =
                (territory.energy_available + SPAWN_ENERGY_REGEN).min(territory.energy_capacity);
        }
        for structure in self.structures.values_mut() {
            if structure.kind == StructureKind::Container {
                structure.energy = (structure.energy + CONTAINER_REGEN).min(structure.energy_capacity);
            }
        }
        self.drops.retain(|_, drop| drop.amount > 0);
    }
}

fn lifetime_for(role: AgentRole) -> u64 {
    match role {
        AgentRole::Claimer => 600,
        _ => 1500,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spawn_world() -> WorldSnapshot {
        let mut world = WorldSnapshot::new();
        world.add_territory(Territory {
            id: "sector01".to_string(),
            controller: Some(ControllerState {
                id: "controller:sector01".to_string(),
                level: 3,
                owned: true,
                reserved: false,
            }),
            energy_available: 300,
            energy_capacity: 300,
        });
        world.add_spawn_point(SpawnPoint {
            id: "spawn:sector01:1".to_string(),
            territory_id: "sector01".to_string(),
            pos: Position::new(25, 25),
            spawning: None,
        });
        world
    }

    fn worker_request(name: &str) -> SpawnRequest {
        SpawnRequest {
            role: AgentRole::Worker,
            name: name.to_string(),
            body: vec![BodyPart::Work, BodyPart::Carry, BodyPart::Move],
            assignment: AgentAssignment {
                home_territory: "sector01".to_string(),
                ..AgentAssignment::default()
            },
        }
    }

    #[test]
    fn spawn_deducts_energy_and_registers_agent() {
        let mut world = spawn_world();
        let outcome = world.try_spawn("spawn:sector01:1", &worker_request("w1"));
        assert!(matches!(outcome, SpawnOutcome::Spawned { .. }));
        assert_eq!(world.territory("sector01").unwrap().energy_available, 100);
        let agent = world.agent("w1").expect("agent registered");
        assert!(agent.spawning);
        assert_eq!(agent.carry_capacity, 50);
    }

    #[test]
    fn spawn_point_reports_busy_while_assembling() {
        let mut world = spawn_world();
        world.try_spawn("spawn:sector01:1", &worker_request("w1"));
        let outcome = world.try_spawn("spawn:sector01:1", &worker_request("w2"));
        assert_eq!(outcome, SpawnOutcome::Busy);
    }

    #[test]
    fn duplicate_name_is_rejected() {
        let mut world = spawn_world();
        world.try_spawn("spawn:sector01:1", &worker_request("w1"));
        world.finish_spawning();
        let outcome = world.try_spawn("spawn:sector01:1", &worker_request("w1"));
        assert_eq!(outcome, SpawnOutcome::NameTaken);
    }

    #[test]
    fn insufficient_energy_is_reported() {
        let mut world = spawn_world();
        world.territory_mut("sector01").unwrap().energy_available = 100;
        let outcome = world.try_spawn("spawn:sector01:1", &worker_request("w1"));
        assert_eq!(outcome, SpawnOutcome::InsufficientEnergy);
    }

    #[test]
    fn empty_body_is_structurally_invalid() {
        let mut world = spawn_world();
        let mut request = worker_request("w1");
        request.body.clear();
        let outcome = world.try_spawn("spawn:sector01:1", &request);
        assert!(matches!(outcome, SpawnOutcome::InvalidRequest { .. }));
    }

    #[test]
    fn route_hops_follow_adjacency() {
        let mut world = WorldSnapshot::new();
        world.connect("a", "b");
        world.connect("b", "c");
        assert_eq!(world.route_hops("a", "a"), Some(0));
        assert_eq!(world.route_hops("a", "b"), Some(1));
        assert_eq!(world.route_hops("a", "c"), Some(2));
        assert_eq!(world.route_hops("c", "a"), Some(2));
        assert_eq!(world.route_hops("a", "nowhere"), None);
    }

    #[test]
    fn finish_spawning_activates_agent_and_frees_spawn() {
        let mut world = spawn_world();
        world.try_spawn("spawn:sector01:1", &worker_request("w1"));
        let activated = world.finish_spawning();
        assert_eq!(activated, vec!["w1".to_string()]);
        assert!(!world.agent("w1").unwrap().spawning);
        assert!(world
            .spawn_points_in("sector01")
            .all(|s| s.spawning.is_none()));
    }

    #[test]
    fn decay_removes_expired_agents() {
        let mut world = spawn_world();
        world.try_spawn("spawn:sector01:1", &worker_request("w1"));
        world.finish_spawning();
        world.agent_mut("w1").unwrap().ticks_to_live = 1;
        let expired = world.decay_lifetimes();
        assert_eq!(expired, vec!["w1".to_string()]);
        assert!(world.agent("w1").is_none());
    }

    #[test]
    fn liveness_threshold_excludes_short_lifetimes() {
        let mut world = spawn_world();
        world.try_spawn("spawn:sector01:1", &worker_request("w1"));
        world.finish_spawning();
        world.agent_mut("w1").unwrap().ticks_to_live = MIN_LIVE_TICKS;
        assert!(!world.is_live_agent("w1"));
        world.agent_mut("w1").unwrap().ticks_to_live = MIN_LIVE_TICKS + 1;
        assert!(world.is_live_agent("w1"));
    }
}
