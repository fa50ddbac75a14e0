use super::*;

use crate::snapshot::{
    ConstructionSite, ControllerState, Position, ResourceDrop, SourceNode, SpawnPoint, Structure,
    StructureKind, Territory,
};

impl ColonyWorld {
    /// Build a world from configuration. Generation is fully seeded:
    /// the same config always yields the same territories, structures,
    /// and starting energy.
    pub fn new(config: RunConfig) -> Self {
        let status = RunStatus {
            schema_version: SCHEMA_VERSION_V1.to_string(),
            run_id: config.run_id.clone(),
            current_tick: 0,
            max_ticks: config.max_ticks,
            mode: RunMode::Paused,
            agent_count: 0,
        };
        let state = generate_world(&config);
        Self {
            config,
            status,
            state,
            memory: ColonyMemory::default(),
            event_log: Vec::new(),
        }
    }
}

fn generate_world(config: &RunConfig) -> WorldSnapshot {
    let mut world = WorldSnapshot::new();
    let count = config.territory_count.max(1);

    for index in 0..count {
        let territory_id = format!("sector{:02}", index + 1);
        let stream = u64::from(index) * 100;
        if index == 0 {
            seed_home_territory(&mut world, &territory_id, config.seed, stream);
        } else {
            seed_frontier_territory(&mut world, &territory_id, config.seed, stream);
        }
        if index > 0 {
            let previous = format!("sector{:02}", index);
            world.connect(&previous, &territory_id);
        }
    }

    world
}

/// The starting territory: owned controller, one spawn point, storage,
/// extensions, a tower, containers, two resource nodes, and whatever
/// mess (drops, a construction site, worn roads) the seed produces.
fn seed_home_territory(world: &mut WorldSnapshot, territory_id: &str, seed: u64, stream: u64) {
    let extensions = 5_i64;
    let capacity = 300 + extensions * 50;
    world.add_territory(Territory {
        id: territory_id.to_string(),
        controller: Some(ControllerState {
            id: format!("controller:{territory_id}"),
            level: 3,
            owned: true,
            reserved: false,
        }),
        energy_available: capacity,
        energy_capacity: capacity,
    });
    world.add_spawn_point(SpawnPoint {
        id: format!("spawn:{territory_id}:1"),
        territory_id: territory_id.to_string(),
        pos: Position::new(25, 25),
        spawning: None,
    });
    world.add_structure(Structure {
        id: format!("storage:{territory_id}:1"),
        territory_id: territory_id.to_string(),
        kind: StructureKind::Storage,
        pos: Position::new(27, 25),
        hits: 10_000,
        hits_max: 10_000,
        energy: sample_range_i64(seed, stream + 1, 2_000, 10_000),
        energy_capacity: 100_000,
    });
    for n in 0..extensions {
        world.add_structure(Structure {
            id: format!("extension:{territory_id}:{}", n + 1),
            territory_id: territory_id.to_string(),
            kind: StructureKind::Extension,
            pos: Position::new(22 + n as i32, 27),
            hits: 1_000,
            hits_max: 1_000,
            energy: sample_range_i64(seed, stream + 10 + n as u64, 0, 50),
            energy_capacity: 50,
        });
    }
    world.add_structure(Structure {
        id: format!("tower:{territory_id}:1"),
        territory_id: territory_id.to_string(),
        kind: StructureKind::Tower,
        pos: Position::new(25, 20),
        hits: 3_000,
        hits_max: 3_000,
        energy: sample_range_i64(seed, stream + 2, 0, 1_000),
        energy_capacity: 1_000,
    });
    for n in 0..2_i64 {
        world.add_structure(Structure {
            id: format!("container:{territory_id}:{}", n + 1),
            territory_id: territory_id.to_string(),
            kind: StructureKind::Container,
            pos: Position::new(10 + n as i32 * 30, 10),
            hits: 250_000 - sample_range_i64(seed, stream + 20 + n as u64, 0, 2_000),
            hits_max: 250_000,
            energy: sample_range_i64(seed, stream + 30 + n as u64, 200, 2_000),
            energy_capacity: 2_000,
        });
        world.add_source(SourceNode {
            id: format!("source:{territory_id}:{}", n + 1),
            territory_id: territory_id.to_string(),
            pos: Position::new(9 + n as i32 * 30, 9),
        });
    }
    // A worn road so the repair queue has something to chew on.
    world.add_structure(Structure {
        id: format!("road:{territory_id}:1"),
        territory_id: territory_id.to_string(),
        kind: StructureKind::Road,
        pos: Position::new(25, 30),
        hits: 5_000 - sample_range_i64(seed, stream + 3, 600, 3_000),
        hits_max: 5_000,
        energy: 0,
        energy_capacity: 0,
    });
    world.add_site(ConstructionSite {
        id: format!("site:{territory_id}:1"),
        territory_id: territory_id.to_string(),
        pos: Position::new(30, 30),
    });
    world.add_drop(ResourceDrop {
        id: format!("drop:{territory_id}:1"),
        territory_id: territory_id.to_string(),
        pos: Position::new(12, 12),
        amount: sample_range_i64(seed, stream + 4, 40, 160),
    });
}

/// Frontier territories: resource nodes and a neutral controller, no
/// infrastructure. Remote operations point here.
fn seed_frontier_territory(world: &mut WorldSnapshot, territory_id: &str, seed: u64, stream: u64) {
    world.add_territory(Territory {
        id: territory_id.to_string(),
        controller: Some(ControllerState {
            id: format!("controller:{territory_id}"),
            level: 0,
            owned: false,
            reserved: false,
        }),
        energy_available: 0,
        energy_capacity: 0,
    });
    let nodes = sample_range_i64(seed, stream + 1, 1, 3);
    for n in 0..nodes {
        world.add_source(SourceNode {
            id: format!("source:{territory_id}:{}", n + 1),
            territory_id: territory_id.to_string(),
            pos: Position::new(
                sample_range_i64(seed, stream + 10 + n as u64, 5, 45) as i32,
                sample_range_i64(seed, stream + 20 + n as u64, 5, 45) as i32,
            ),
        });
    }
}

fn mix_seed(seed: u64, salt: u64) -> u64 {
    let mut value = seed ^ salt.wrapping_mul(0x9E37_79B9_7F4A_7C15);
    value ^= value.rotate_left(29);
    value = value.wrapping_mul(0x517C_C1B7_2722_0A95);
    value ^ (value >> 31)
}

fn sample_range_i64(seed: u64, stream: u64, min: i64, max: i64) -> i64 {
    if max <= min {
        return min;
    }
    let span = (max - min + 1) as u64;
    min + (mix_seed(seed, stream) % span) as i64
}
