//! Resource ledger: tick-scoped claim allocator over a territory's
//! energy providers.
//!
//! Built once per territory per tick from the snapshot; each entry is a
//! decrementing cache of the provider's snapshot quantity. Claims are
//! valid only for the tick that produced them — the ledger dies at tick
//! end and an unexecuted claim simply vanishes.

use std::collections::BTreeMap;
use std::fmt;

use contracts::ProviderRef;

use crate::snapshot::{AgentState, Position, WorldSnapshot};

/// Ground drops below this snapshot amount are not worth a trip.
pub const GROUND_PICKUP_MIN: i64 = 50;

/// Cache/world mismatch: a cached provider id no longer resolves to a
/// live object. This is a tick-ordering bug, not a runtime condition,
/// and must propagate to the tick boundary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LedgerError {
    CacheMismatch { provider_id: String },
}

impl fmt::Display for LedgerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LedgerError::CacheMismatch { provider_id } => write!(
                f,
                "ledger cache mismatch: provider {provider_id} is cached but not in the snapshot"
            ),
        }
    }
}

impl std::error::Error for LedgerError {}

#[derive(Debug, Clone)]
struct ProviderSite {
    id: String,
    pos: Position,
}

/// Claim-based allocator for one territory and one tick.
#[derive(Debug, Clone)]
pub struct ResourceLedger {
    territory_id: String,
    stationary: Vec<ProviderSite>,
    drops: Vec<ProviderSite>,
    remaining: BTreeMap<String, i64>,
}

impl ResourceLedger {
    /// Scan the territory for containers, storage, and ground drops and
    /// seed the cache from the snapshot quantities.
    pub fn build(world: &WorldSnapshot, territory_id: &str) -> Self {
        let mut stationary = Vec::new();
        let mut drops = Vec::new();
        let mut remaining = BTreeMap::new();

        for structure in world.structures_in(territory_id) {
            if structure.kind.is_resource_provider() {
                stationary.push(ProviderSite {
                    id: structure.id.clone(),
                    pos: structure.pos,
                });
                remaining.insert(structure.id.clone(), structure.energy);
            }
        }
        for drop in world.drops_in(territory_id) {
            if drop.amount >= GROUND_PICKUP_MIN {
                drops.push(ProviderSite {
                    id: drop.id.clone(),
                    pos: drop.pos,
                });
                remaining.insert(drop.id.clone(), drop.amount);
            }
        }

        Self {
            territory_id: territory_id.to_string(),
            stationary,
            drops,
            remaining,
        }
    }

    pub fn territory_id(&self) -> &str {
        &self.territory_id
    }

    /// Cached remaining quantity for a provider, if tracked.
    pub fn remaining(&self, provider_id: &str) -> Option<i64> {
        self.remaining.get(provider_id).copied()
    }

    pub fn provider_count(&self) -> usize {
        self.stationary.len() + self.drops.len()
    }

    /// Reserve energy for this agent for the current tick.
    ///
    /// Ground drops are preferred: nearest drop with cached quantity
    /// still positive. A drop is granted whole — a pickup takes the
    /// entire pile in one action, so its cache goes to zero regardless
    /// of `amount`. Stationary providers are the fallback: nearest with
    /// cached quantity covering the full amount, decremented by
    /// `amount` (partial withdrawal). Both use travel cost from the
    /// agent's position, ties broken by id. Returns `Ok(None)` when
    /// nothing qualifies — a soft failure the caller logs and skips.
    pub fn claim(
        &mut self,
        world: &WorldSnapshot,
        agent: &AgentState,
        amount: i64,
    ) -> Result<Option<ProviderRef>, LedgerError> {
        let selected = match self.nearest(&self.drops, agent.pos, |cached| cached > 0) {
            Some(id) => Some((id, true)),
            None => self
                .nearest(&self.stationary, agent.pos, |cached| cached >= amount)
                .map(|id| (id, false)),
        };

        let Some((provider_id, is_ground)) = selected else {
            return Ok(None);
        };

        // The cache was built from this tick's snapshot; an id that no
        // longer resolves means someone mutated the world mid-tick.
        if !world.exists(&provider_id) {
            return Err(LedgerError::CacheMismatch { provider_id });
        }

        let cached = self
            .remaining
            .get_mut(&provider_id)
            .ok_or(LedgerError::CacheMismatch {
                provider_id: provider_id.clone(),
            })?;
        if is_ground {
            *cached = 0;
        } else {
            *cached -= amount;
        }

        Ok(Some(if is_ground {
            ProviderRef::Ground(provider_id)
        } else {
            ProviderRef::Stationary(provider_id)
        }))
    }

    fn nearest<F>(&self, sites: &[ProviderSite], from: Position, qualifies: F) -> Option<String>
    where
        F: Fn(i64) -> bool,
    {
        let mut best: Option<(i64, &str)> = None;
        for site in sites {
            let cached = match self.remaining.get(&site.id) {
                Some(value) => *value,
                None => continue,
            };
            if !qualifies(cached) {
                continue;
            }
            let cost = from.travel_cost(site.pos);
            match best {
                Some((best_cost, best_id)) if (cost, site.id.as_str()) >= (best_cost, best_id) => {}
                _ => best = Some((cost, site.id.as_str())),
            }
        }
        best.map(|(_, id)| id.to_string())
    }
}
