use super::*;

use contracts::{AgentRole, Job, JobKind, OwnershipGoal, ProviderRef, TerritoryIntel};
use serde_json::json;

use crate::registry::SchedulerRegistry;
use crate::respawn::{AttemptDisposition, RespawnManager};

impl ColonyWorld {
    /// Run one full tick: observe territories, rebuild the scheduler
    /// registry, evaluate the population manager, let each live agent
    /// consult its scheduler exactly once, then age the population.
    /// All derived state is dropped on return — an unexecuted claim
    /// simply vanishes at the tick boundary.
    pub fn step(&mut self) -> Result<bool, TickError> {
        if self.status.is_complete() {
            self.status.mode = RunMode::Paused;
            return Ok(false);
        }
        self.status.mode = RunMode::Running;
        let tick = self.status.current_tick + 1;
        self.status.current_tick = tick;
        let mut sequence_in_tick = 0_u64;

        self.observe_territories(tick, &mut sequence_in_tick);
        self.state.finish_spawning();
        self.state.upkeep();

        let mut registry = SchedulerRegistry::build(&self.state, &self.memory);

        let mut manager = RespawnManager::new(tick);
        if let Err(err) = manager.run(&mut self.state, &mut self.memory) {
            let fault = TickError::from(err);
            self.emit_fault(tick, &mut sequence_in_tick, &fault);
            return Err(fault);
        }
        self.record_spawn_attempts(&manager, tick, &mut sequence_in_tick);

        if let Err(fault) = self.drive_agents(&mut registry, tick, &mut sequence_in_tick) {
            self.emit_fault(tick, &mut sequence_in_tick, &fault);
            return Err(fault);
        }

        for name in self.state.decay_lifetimes() {
            self.emit(
                tick,
                &mut sequence_in_tick,
                EventType::AgentExpired,
                Some(name),
                None,
                None,
            );
        }
        self.prune_assignments();

        self.status.agent_count = self.state.agents().count();
        if self.status.current_tick >= self.status.max_ticks {
            self.status.mode = RunMode::Paused;
        }
        Ok(true)
    }

    pub fn step_n(&mut self, n: u64) -> Result<u64, TickError> {
        let mut committed = 0_u64;
        for _ in 0..n {
            if !self.step()? {
                break;
            }
            committed += 1;
        }
        Ok(committed)
    }

    pub fn run_to_tick(&mut self, tick: u64) -> Result<u64, TickError> {
        let mut committed = 0_u64;
        while self.status.current_tick < tick {
            if !self.step()? {
                break;
            }
            committed += 1;
        }
        Ok(committed)
    }

    /// Defaulting is idempotent: present limit fields are never
    /// overwritten, and known sources only ever accumulate.
    fn observe_territories(&mut self, tick: u64, sequence_in_tick: &mut u64) {
        let ids: Vec<String> = self.state.territories().map(|t| t.id.clone()).collect();
        let mut discovered = Vec::new();
        for territory_id in ids {
            let newly_seen = self.memory.territory(&territory_id).is_none();
            let sources: Vec<String> = self
                .state
                .sources_in(&territory_id)
                .map(|source| source.id.clone())
                .collect();
            let record = self.memory.territory_mut(&territory_id);
            record.limits.apply_defaults();
            for source_id in sources {
                if !record.known_sources.contains(&source_id) {
                    record.known_sources.push(source_id);
                }
            }
            if newly_seen {
                discovered.push(territory_id);
            }
        }
        for territory_id in discovered {
            self.emit(
                tick,
                sequence_in_tick,
                EventType::TerritoryObserved,
                None,
                Some(territory_id),
                None,
            );
        }
    }

    fn record_spawn_attempts(
        &mut self,
        manager: &RespawnManager,
        tick: u64,
        sequence_in_tick: &mut u64,
    ) {
        for attempt in manager.attempts() {
            match &attempt.disposition {
                AttemptDisposition::Spawned { name } => self.emit(
                    tick,
                    sequence_in_tick,
                    EventType::AgentSpawned,
                    Some(name.clone()),
                    attempt.spawn_territory.clone(),
                    Some(json!({
                        "role": attempt.role.as_str(),
                        "target": attempt.target_territory,
                    })),
                ),
                AttemptDisposition::Deferred => self.emit(
                    tick,
                    sequence_in_tick,
                    EventType::SpawnDeferred,
                    None,
                    attempt.spawn_territory.clone(),
                    Some(json!({
                        "role": attempt.role.as_str(),
                        "spawn": attempt.spawn_id,
                    })),
                ),
                AttemptDisposition::Lockdown => self.emit(
                    tick,
                    sequence_in_tick,
                    EventType::SpawnLockdown,
                    None,
                    attempt.spawn_territory.clone(),
                    Some(json!({ "role": attempt.role.as_str() })),
                ),
                AttemptDisposition::NoEligibleSpawn => self.emit(
                    tick,
                    sequence_in_tick,
                    EventType::OperationSkipped,
                    None,
                    Some(attempt.target_territory.clone()),
                    Some(json!({ "role": attempt.role.as_str() })),
                ),
            }
        }
    }

    /// Each live agent consults the appropriate scheduler exactly once.
    /// Transit is not modeled: a remote assignment simply takes effect
    /// (the accepted approximation — see the purpose notes).
    fn drive_agents(
        &mut self,
        registry: &mut SchedulerRegistry,
        tick: u64,
        sequence_in_tick: &mut u64,
    ) -> Result<(), TickError> {
        for name in self.state.agent_names() {
            let Some(agent) = self.state.agent(&name).cloned() else {
                continue;
            };
            if agent.spawning {
                continue;
            }
            if let Some(target) = agent.assignment.target_territory.clone() {
                if agent.territory_id != target {
                    if let Some(live) = self.state.agent_mut(&name) {
                        live.territory_id = target;
                    }
                }
            }
            match agent.role {
                AgentRole::Worker => {
                    self.drive_worker(registry, &name, tick, sequence_in_tick)?
                }
                AgentRole::Scout => self.record_scout_intel(&name, tick),
                AgentRole::Claimer => self.press_ownership(&name),
                _ => {}
            }
        }
        Ok(())
    }

    /// Worker contact point: empty workers claim a resource provider,
    /// loaded workers claim a job. Execution is abstracted to its
    /// resource effect so the queues see realistic demand next tick.
    fn drive_worker(
        &mut self,
        registry: &mut SchedulerRegistry,
        name: &str,
        tick: u64,
        sequence_in_tick: &mut u64,
    ) -> Result<(), TickError> {
        let Some(agent) = self.state.agent(name).cloned() else {
            return Ok(());
        };
        if agent.carry == 0 {
            let amount = agent.carry_capacity.max(50);
            let claim = match registry.ledger_mut(&agent.territory_id) {
                Some(ledger) => ledger.claim(&self.state, &agent, amount)?,
                None => None,
            };
            match claim {
                Some(provider) => {
                    let granted = self.withdraw(&provider, amount);
                    if let Some(live) = self.state.agent_mut(name) {
                        live.carry = (live.carry + granted).min(live.carry_capacity);
                    }
                    self.emit(
                        tick,
                        sequence_in_tick,
                        EventType::ResourceClaimed,
                        Some(name.to_string()),
                        Some(agent.territory_id.clone()),
                        Some(json!({ "provider": provider.id(), "amount": granted })),
                    );
                }
                None => {
                    self.emit(
                        tick,
                        sequence_in_tick,
                        EventType::ClaimUnfilled,
                        Some(name.to_string()),
                        Some(agent.territory_id.clone()),
                        None,
                    );
                }
            }
        } else {
            let job = match registry.jobs_mut(&agent.territory_id) {
                Some(jobs) => jobs.claim(),
                None => Job::noop(),
            };
            self.execute_job(name, &job);
            self.emit(
                tick,
                sequence_in_tick,
                EventType::JobClaimed,
                Some(name.to_string()),
                Some(agent.territory_id.clone()),
                Some(json!({ "job": job.kind.as_str(), "target": job.target_id })),
            );
        }
        Ok(())
    }

    fn withdraw(&mut self, provider: &ProviderRef, amount: i64) -> i64 {
        match provider {
            ProviderRef::Ground(id) => match self.state.drop_mut(id) {
                Some(drop) => {
                    let granted = drop.amount;
                    drop.amount = 0;
                    granted
                }
                None => 0,
            },
            ProviderRef::Stationary(id) => match self.state.structure_mut(id) {
                Some(structure) => {
                    let granted = amount.min(structure.energy);
                    structure.energy -= granted;
                    granted
                }
                None => 0,
            },
        }
    }

    fn execute_job(&mut self, name: &str, job: &Job) {
        let carry = self.state.agent(name).map(|a| a.carry).unwrap_or(0);
        match (&job.kind, &job.target_id) {
            (JobKind::Refill | JobKind::Deposit, Some(target)) => {
                if let Some(structure) = self.state.structure_mut(target) {
                    let accepted = carry.min(structure.free_energy_capacity());
                    structure.energy += accepted;
                }
            }
            (JobKind::Repair, Some(target)) => {
                if let Some(structure) = self.state.structure_mut(target) {
                    structure.hits = (structure.hits + carry).min(structure.hits_max);
                }
            }
            _ => {}
        }
        if job.kind != JobKind::Noop {
            if let Some(agent) = self.state.agent_mut(name) {
                agent.carry = 0;
            }
        }
    }

    fn record_scout_intel(&mut self, name: &str, tick: u64) {
        let Some(agent) = self.state.agent(name) else {
            return;
        };
        let Some(target) = agent.assignment.target_territory.clone() else {
            return;
        };
        if agent.territory_id != target {
            return;
        }
        let Some(territory) = self.state.territory(&target) else {
            return;
        };
        let intel = TerritoryIntel {
            observed_tick: tick,
            controller_level: territory.controller.as_ref().map(|c| c.level),
            owned: territory.controller.as_ref().map_or(false, |c| c.owned),
            reserved: territory.controller.as_ref().map_or(false, |c| c.reserved),
            hostile: false,
        };
        self.memory.intel.insert(target, intel);
    }

    fn press_ownership(&mut self, name: &str) {
        let Some(agent) = self.state.agent(name) else {
            return;
        };
        let Some(target) = agent.assignment.target_territory.clone() else {
            return;
        };
        if agent.territory_id != target {
            return;
        }
        let Some(goal) = self
            .memory
            .territory(&target)
            .and_then(|record| record.ownership_goal)
        else {
            return;
        };
        if let Some(controller) = self
            .state
            .territory_mut(&target)
            .and_then(|territory| territory.controller.as_mut())
        {
            match goal {
                OwnershipGoal::Reserved => controller.reserved = true,
                OwnershipGoal::Owned => {
                    controller.owned = true;
                    controller.level = controller.level.max(1);
                }
            }
        }
    }

    fn emit_fault(&mut self, tick: u64, sequence_in_tick: &mut u64, fault: &TickError) {
        self.emit(
            tick,
            sequence_in_tick,
            EventType::TickFault,
            None,
            None,
            Some(json!({ "fault": fault.to_string() })),
        );
    }
}
