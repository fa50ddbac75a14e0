//! Job scheduler: capacity-bounded per-kind job queues for one
//! territory, handed out in fixed priority order.
//!
//! Queues are rebuilt from the snapshot every tick and never persisted;
//! claiming a job removes it for the remainder of the tick, which is the
//! whole at-most-one-claimant story — no locks, no bookkeeping across
//! ticks.

use contracts::{Job, JobKind, TerritoryLimits};

use crate::snapshot::{StructureKind, WorldSnapshot};

/// Structures missing more health than this are repair candidates.
pub const REPAIR_MARGIN: i64 = 500;

/// Ground drops below this amount are not worth a sweep trip.
pub const SWEEP_MIN_AMOUNT: i64 = 50;

/// Per-territory, per-tick job queues.
#[derive(Debug, Clone)]
pub struct JobScheduler {
    territory_id: String,
    refill: Vec<Job>,
    build: Vec<Job>,
    repair: Vec<Job>,
    upgrade: Vec<Job>,
    sweep: Vec<Job>,
    /// Deposit fallback target, set when the territory has exactly one
    /// storage structure.
    fallback_storage: Option<String>,
}

impl JobScheduler {
    /// Classify the territory's structures, sites, and drops into job
    /// queues. Each queue truncates at its configured capacity as
    /// candidates are discovered: first discovered wins, not best match.
    pub fn build(world: &WorldSnapshot, territory_id: &str, limits: &TerritoryLimits) -> Self {
        let refill_cap = limits.job_capacity(JobKind::Refill);
        let build_cap = limits.job_capacity(JobKind::Build);
        let repair_cap = limits.job_capacity(JobKind::Repair);
        let upgrade_cap = limits.job_capacity(JobKind::Upgrade);
        let sweep_cap = limits.job_capacity(JobKind::Sweep);

        let mut refill = Vec::new();
        let mut repair = Vec::new();
        let mut storages = Vec::new();

        for structure in world.structures_in(territory_id) {
            if structure.kind.is_energy_sink()
                && structure.free_energy_capacity() > 0
                && refill.len() < refill_cap
            {
                refill.push(Job::new(JobKind::Refill, structure.id.clone()));
            }
            if structure.kind != StructureKind::Wall
                && structure.hits_max - structure.hits > REPAIR_MARGIN
                && repair.len() < repair_cap
            {
                repair.push(Job::new(JobKind::Repair, structure.id.clone()));
            }
            if structure.kind == StructureKind::Storage {
                storages.push(structure.id.clone());
            }
        }

        // Controllers are singular per territory, but upgrade demand is
        // multiplied: one queue entry per configured slot.
        let mut upgrade = Vec::new();
        if let Some(controller) = world.territory(territory_id).and_then(|t| t.controller.as_ref()) {
            for _ in 0..upgrade_cap {
                upgrade.push(Job::new(JobKind::Upgrade, controller.id.clone()));
            }
        }

        let mut build = Vec::new();
        for site in world.sites_in(territory_id) {
            if build.len() < build_cap {
                build.push(Job::new(JobKind::Build, site.id.clone()));
            }
        }

        let mut sweep = Vec::new();
        for drop in world.drops_in(territory_id) {
            if drop.amount >= SWEEP_MIN_AMOUNT && sweep.len() < sweep_cap {
                sweep.push(Job::new(JobKind::Sweep, drop.id.clone()));
            }
        }

        let fallback_storage = if storages.len() == 1 {
            storages.pop()
        } else {
            None
        };

        Self {
            territory_id: territory_id.to_string(),
            refill,
            build,
            repair,
            upgrade,
            sweep,
            fallback_storage,
        }
    }

    pub fn territory_id(&self) -> &str {
        &self.territory_id
    }

    pub fn queue_len(&self, kind: JobKind) -> usize {
        match kind {
            JobKind::Refill => self.refill.len(),
            JobKind::Build => self.build.len(),
            JobKind::Repair => self.repair.len(),
            JobKind::Upgrade => self.upgrade.len(),
            JobKind::Sweep => self.sweep.len(),
            JobKind::Deposit | JobKind::Noop => 0,
        }
    }

    /// Pop the highest-priority available job: refill, then build, then
    /// repair, then upgrade. Sweep jobs are built but excluded from the
    /// priority chain by current policy. When every queue is empty the
    /// fallback is a deposit into the sole storage, or a no-op.
    pub fn claim(&mut self) -> Job {
        if let Some(job) = self.refill.pop() {
            return job;
        }
        if let Some(job) = self.build.pop() {
            return job;
        }
        if let Some(job) = self.repair.pop() {
            return job;
        }
        if let Some(job) = self.upgrade.pop() {
            return job;
        }
        match &self.fallback_storage {
            Some(storage_id) => Job::new(JobKind::Deposit, storage_id.clone()),
            None => Job::noop(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snapshot::{
        ConstructionSite, ControllerState, Position, ResourceDrop, Structure, Territory,
    };
    use contracts::TerritoryLimits;

    fn sink(id: &str, energy: i64, capacity: i64) -> Structure {
        Structure {
            id: id.to_string(),
            territory_id: "sector01".to_string(),
            kind: StructureKind::Extension,
            pos: Position::new(10, 10),
            hits: 1_000,
            hits_max: 1_000,
            energy,
            energy_capacity: capacity,
        }
    }

    fn damaged(id: &str, kind: StructureKind, missing: i64) -> Structure {
        Structure {
            id: id.to_string(),
            territory_id: "sector01".to_string(),
            kind,
            pos: Position::new(12, 12),
            hits: 10_000 - missing,
            hits_max: 10_000,
            energy: 0,
            energy_capacity: 0,
        }
    }

    fn world_with_controller() -> WorldSnapshot {
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
        world
    }

    fn limits() -> TerritoryLimits {
        let mut limits = TerritoryLimits::default();
        limits.apply_defaults();
        limits
    }

    #[test]
    fn refill_queue_truncates_at_capacity_keeping_discovery_order() {
        let mut world = world_with_controller();
        world.add_structure(sink("ext:a", 0, 50));
        world.add_structure(sink("ext:b", 0, 50));
        world.add_structure(sink("ext:c", 0, 50));
        let mut limits = limits();
        limits.jobs_refill = Some(2);

        let mut scheduler = JobScheduler::build(&world, "sector01", &limits);
        assert_eq!(scheduler.queue_len(JobKind::Refill), 2);

        // Pop-from-end: the most recently queued of {a, b} comes first.
        let first = scheduler.claim();
        assert_eq!(first, Job::new(JobKind::Refill, "ext:b"));
        let second = scheduler.claim();
        assert_eq!(second, Job::new(JobKind::Refill, "ext:a"));
    }

    #[test]
    fn full_sinks_are_not_refill_candidates() {
        let mut world = world_with_controller();
        world.add_structure(sink("ext:a", 50, 50));
        let scheduler = JobScheduler::build(&world, "sector01", &limits());
        assert_eq!(scheduler.queue_len(JobKind::Refill), 0);
    }

    #[test]
    fn walls_are_excluded_from_repair() {
        let mut world = world_with_controller();
        world.add_structure(damaged("wall:a", StructureKind::Wall, 5_000));
        world.add_structure(damaged("road:a", StructureKind::Road, 5_000));
        let scheduler = JobScheduler::build(&world, "sector01", &limits());
        assert_eq!(scheduler.queue_len(JobKind::Repair), 1);
    }

    #[test]
    fn repair_margin_filters_minor_damage() {
        let mut world = world_with_controller();
        world.add_structure(damaged("road:a", StructureKind::Road, REPAIR_MARGIN));
        let scheduler = JobScheduler::build(&world, "sector01", &limits());
        assert_eq!(scheduler.queue_len(JobKind::Repair), 0);
    }

    #[test]
    fn upgrade_demand_is_one_entry_per_slot() {
        let world = world_with_controller();
        let mut limits = limits();
        limits.jobs_upgrade = Some(3);
        let scheduler = JobScheduler::build(&world, "sector01", &limits);
        assert_eq!(scheduler.queue_len(JobKind::Upgrade), 3);
    }

    #[test]
    fn priority_order_is_refill_build_repair_upgrade() {
        let mut world = world_with_controller();
        world.add_structure(sink("ext:a", 0, 50));
        world.add_structure(damaged("road:a", StructureKind::Road, 5_000));
        world.add_site(ConstructionSite {
            id: "site:a".to_string(),
            territory_id: "sector01".to_string(),
            pos: Position::new(15, 15),
        });

        let mut scheduler = JobScheduler::build(&world, "sector01", &limits());
        assert_eq!(scheduler.claim().kind, JobKind::Refill);
        assert_eq!(scheduler.claim().kind, JobKind::Build);
        assert_eq!(scheduler.claim().kind, JobKind::Repair);
        assert_eq!(scheduler.claim().kind, JobKind::Upgrade);
    }

    #[test]
    fn claimed_jobs_are_gone_for_the_tick() {
        let mut world = world_with_controller();
        world.add_structure(sink("ext:a", 0, 50));
        world.add_structure(sink("ext:b", 0, 50));
        let mut scheduler = JobScheduler::build(&world, "sector01", &limits());

        let first = scheduler.claim();
        let second = scheduler.claim();
        assert_ne!(first.target_id, second.target_id);
    }

    #[test]
    fn sweep_jobs_queue_but_are_not_claimable() {
        let mut world = WorldSnapshot::new();
        world.add_territory(Territory {
            id: "sector01".to_string(),
            controller: None,
            energy_available: 300,
            energy_capacity: 300,
        });
        world.add_drop(ResourceDrop {
            id: "drop:a".to_string(),
            territory_id: "sector01".to_string(),
            pos: Position::new(20, 20),
            amount: 80,
        });
        let mut scheduler = JobScheduler::build(&world, "sector01", &limits());
        assert_eq!(scheduler.queue_len(JobKind::Sweep), 1);
        assert_eq!(scheduler.claim().kind, JobKind::Noop);
    }

    #[test]
    fn fallback_deposits_only_with_a_single_storage() {
        let mut world = WorldSnapshot::new();
        world.add_territory(Territory {
            id: "sector01".to_string(),
            controller: None,
            energy_available: 300,
            energy_capacity: 300,
        });
        world.add_structure(Structure {
            id: "storage:1".to_string(),
            territory_id: "sector01".to_string(),
            kind: StructureKind::Storage,
            pos: Position::new(25, 25),
            hits: 10_000,
            hits_max: 10_000,
            energy: 0,
            energy_capacity: 100_000,
        });
        let mut scheduler = JobScheduler::build(&world, "sector01", &limits());
        assert_eq!(
            scheduler.claim(),
            Job::new(JobKind::Deposit, "storage:1")
        );

        world.add_structure(Structure {
            id: "storage:2".to_string(),
            territory_id: "sector01".to_string(),
            kind: StructureKind::Storage,
            pos: Position::new(30, 30),
            hits: 10_000,
            hits_max: 10_000,
            energy: 0,
            energy_capacity: 100_000,
        });
        let mut scheduler = JobScheduler::build(&world, "sector01", &limits());
        assert_eq!(scheduler.claim().kind, JobKind::Noop);
    }
}
