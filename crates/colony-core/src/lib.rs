//! Colony scheduling kernel: a deterministic, tick-scoped scheduling
//! triad — resource ledger, job scheduler, and population manager — over
//! a queryable world snapshot.
//!
//! Every tick rebuilds all derived state (ledgers, job queues, spawn
//! busy/locked sets) from the snapshot and discards it at the tick
//! boundary; only the colony memory document survives across ticks.

pub mod jobs;
pub mod ledger;
pub mod registry;
pub mod respawn;
pub mod snapshot;
pub mod world;
