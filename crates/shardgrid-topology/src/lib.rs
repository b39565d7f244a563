//! shardgrid-topology — the partition model.
//!
//! A stream's hash key space is carved into shards. Splitting a shard closes
//! it and opens two children; merging two adjacent shards closes both and
//! opens one. The service keeps reporting closed shards, so every refresh
//! sees the whole lineage tree.
//!
//! # Invariants
//!
//! ```text
//! leaf      = shard with no children
//! leaves    sorted by starting_hash tile [space.min, space.max]
//!           leaf[i].ending_hash + 1 == leaf[i + 1].starting_hash
//! split(s)  = s.starting_hash + s.hash_range / 2 + 1
//! ```
//!
//! Shards live in an arena keyed by id; children are id sets, rebuilt from
//! the parent links on every refresh.

pub mod error;
pub mod shard;
pub mod topology;

pub use error::{TopologyError, TopologyResult};
pub use shard::{compare_by_range, HashSpace, Shard};
pub use topology::{adjacent_pair, Topology};
