use super::*;

use std::collections::BTreeMap;

use contracts::AgentRole;
use serde_json::json;

impl ColonyWorld {
    /// Compact world overview for snapshots and the API.
    pub fn world_summary(&self) -> Value {
        let mut agents_by_role: BTreeMap<&'static str, usize> = BTreeMap::new();
        for agent in self.state.agents() {
            *agents_by_role.entry(agent.role.as_str()).or_insert(0) += 1;
        }
        let territories: Vec<Value> = self
            .state
            .territories()
            .map(|territory| {
                json!({
                    "id": territory.id,
                    "energy_available": territory.energy_available,
                    "energy_capacity": territory.energy_capacity,
                    "controller": territory.controller.as_ref().map(|c| json!({
                        "level": c.level,
                        "owned": c.owned,
                        "reserved": c.reserved,
                    })),
                })
            })
            .collect();
        json!({
            "tick": self.status.current_tick,
            "territories": territories,
            "agents_by_role": agents_by_role,
        })
    }

    /// Detailed view of one territory: live counts, memory record, and
    /// cached intel. Returns `None` for unknown territory ids.
    pub fn territory_inspector(&self, territory_id: &str) -> Option<Value> {
        let territory = self.state.territory(territory_id)?;

        let mut structures_by_kind: BTreeMap<String, usize> = BTreeMap::new();
        for structure in self.state.structures_in(territory_id) {
            *structures_by_kind
                .entry(format!("{:?}", structure.kind).to_lowercase())
                .or_insert(0) += 1;
        }

        let agents: Vec<Value> = self
            .state
            .agents()
            .filter(|agent| agent.territory_id == territory_id)
            .map(|agent| {
                json!({
                    "name": agent.name,
                    "role": agent.role.as_str(),
                    "ticks_to_live": agent.ticks_to_live,
                    "spawning": agent.spawning,
                })
            })
            .collect();

        let workers_live = self
            .state
            .live_agents_with_role(AgentRole::Worker)
            .filter(|agent| agent.assignment.home_territory == territory_id)
            .count();

        Some(json!({
            "id": territory.id,
            "controller": territory.controller.as_ref().map(|c| json!({
                "id": c.id,
                "level": c.level,
                "owned": c.owned,
                "reserved": c.reserved,
            })),
            "energy_available": territory.energy_available,
            "energy_capacity": territory.energy_capacity,
            "structures": structures_by_kind,
            "sources": self.state.sources_in(territory_id).count(),
            "drops": self.state.drops_in(territory_id).count(),
            "construction_sites": self.state.sites_in(territory_id).count(),
            "spawn_points": self.state.spawn_points_in(territory_id).count(),
            "workers_live": workers_live,
            "agents": agents,
            "memory": self.memory.territory(territory_id).map(|record| json!({
                "limits": record.limits,
                "ownership_goal": record.ownership_goal,
                "scout": record.scout,
                "claimer": record.claimer,
                "drills": record.drills,
                "known_sources": record.known_sources,
            })),
            "intel": self.memory.intel.get(territory_id),
        }))
    }
}
