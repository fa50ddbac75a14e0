//! Per-tick scheduler registry: one resource ledger and one job
//! scheduler per operated territory, constructed at the start of the
//! tick and passed by reference to every consumer.
//!
//! This replaces the static lookup-map pattern: the registry's lifetime
//! is the tick's lifetime, so there is no hidden global state and no
//! stale claim can survive a tick boundary.

use std::collections::BTreeMap;

use contracts::ColonyMemory;

use crate::jobs::JobScheduler;
use crate::ledger::ResourceLedger;
use crate::snapshot::WorldSnapshot;

#[derive(Debug)]
pub struct SchedulerRegistry {
    ledgers: BTreeMap<String, ResourceLedger>,
    jobs: BTreeMap<String, JobScheduler>,
}

impl SchedulerRegistry {
    /// Build schedulers for every territory that hosts a spawn point —
    /// the territories the colony actually operates.
    pub fn build(world: &WorldSnapshot, memory: &ColonyMemory) -> Self {
        let mut ledgers = BTreeMap::new();
        let mut jobs = BTreeMap::new();
        let operated: Vec<String> = world
            .spawn_points()
            .map(|spawn| spawn.territory_id.clone())
            .collect();
        for territory_id in operated {
            if ledgers.contains_key(&territory_id) {
                continue;
            }
            let limits = memory
                .territory(&territory_id)
                .map(|record| record.limits.clone())
                .unwrap_or_default();
            ledgers.insert(
                territory_id.clone(),
                ResourceLedger::build(world, &territory_id),
            );
            jobs.insert(
                territory_id.clone(),
                JobScheduler::build(world, &territory_id, &limits),
            );
        }
        Self { ledgers, jobs }
    }

    pub fn ledger_mut(&mut self, territory_id: &str) -> Option<&mut ResourceLedger> {
        self.ledgers.get_mut(territory_id)
    }

    pub fn jobs_mut(&mut self, territory_id: &str) -> Option<&mut JobScheduler> {
        self.jobs.get_mut(territory_id)
    }

    pub fn territory_ids(&self) -> impl Iterator<Item = &str> {
        self.ledgers.keys().map(String::as_str)
    }
}
