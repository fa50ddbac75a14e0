use super::*;

use contracts::Snapshot;

impl ColonyWorld {
    /// Periodic persistence document: status, durable memory, world
    /// summary. Derived scheduler state never appears here — it is
    /// rebuilt from scratch on every tick.
    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            schema_version: SCHEMA_VERSION_V1.to_string(),
            run_id: self.config.run_id.clone(),
            tick: self.status.current_tick,
            status: self.status.clone(),
            memory: self.memory.clone(),
            world: self.world_summary(),
        }
    }
}
