//! Topology — every known shard of one stream, keyed by id.
//!
//! Built fresh from a full `describe` on every tick. Lineage is rebuilt
//! from the `parent_id`/`adjacent_parent_id` fields each time, so there is
//! no state carried between refreshes.

use std::collections::btree_map::Entry;
use std::collections::BTreeMap;

use shard_core::{ShardDescriptor, ShardId};
use tracing::debug;

use crate::error::{TopologyError, TopologyResult};
use crate::shard::{compare_by_range, HashSpace, Shard};

/// Arena of shards indexed by id.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Topology {
    shards: BTreeMap<ShardId, Shard>,
}

impl Topology {
    /// Validate raw descriptors and index them by id.
    ///
    /// Lineage is not linked yet; call [`Topology::link_lineage`] next.
    pub fn build(descriptors: &[ShardDescriptor]) -> TopologyResult<Self> {
        let mut shards = BTreeMap::new();
        for desc in descriptors {
            let shard = Shard::from_descriptor(desc)?;
            match shards.entry(shard.id.clone()) {
                Entry::Occupied(_) => {
                    return Err(TopologyError::MalformedShard {
                        id: shard.id,
                        reason: "duplicate shard id".to_string(),
                    });
                }
                Entry::Vacant(slot) => {
                    slot.insert(shard);
                }
            }
        }
        debug!(shards = shards.len(), "topology built");
        Ok(Self { shards })
    }

    /// Record every shard as a child of the parent(s) it names.
    pub fn link_lineage(&mut self) -> TopologyResult<()> {
        for shard in self.shards.values_mut() {
            shard.children.clear();
        }

        let mut links = Vec::new();
        for shard in self.shards.values() {
            for parent in shard.parents() {
                if !self.shards.contains_key(parent) {
                    return Err(TopologyError::Lineage {
                        shard: shard.id.clone(),
                        parent: parent.clone(),
                    });
                }
                links.push((parent.clone(), shard.id.clone()));
            }
        }

        let linked = links.len();
        for (parent, child) in links {
            if let Some(p) = self.shards.get_mut(&parent) {
                p.children.insert(child);
            }
        }

        debug!(links = linked, "lineage linked");
        Ok(())
    }

    pub fn get(&self, id: &str) -> Option<&Shard> {
        self.shards.get(id)
    }

    pub fn len(&self) -> usize {
        self.shards.len()
    }

    pub fn is_empty(&self) -> bool {
        self.shards.is_empty()
    }

    /// All shards, open and closed, in id order.
    pub fn shards(&self) -> impl Iterator<Item = &Shard> {
        self.shards.values()
    }

    pub fn is_leaf(&self, id: &str) -> bool {
        self.shards.get(id).is_some_and(Shard::is_leaf)
    }

    /// Open shards sorted ascending by starting hash.
    pub fn leaves(&self) -> Vec<&Shard> {
        let mut leaves: Vec<&Shard> = self.shards.values().filter(|s| s.is_leaf()).collect();
        leaves.sort_by(|a, b| {
            a.starting_hash
                .cmp(&b.starting_hash)
                .then_with(|| a.id.cmp(&b.id))
        });
        leaves
    }

    pub fn leaf_count(&self) -> usize {
        self.shards.values().filter(|s| s.is_leaf()).count()
    }

    /// Leaf with the widest hash range; ties go to the smaller starting hash.
    pub fn biggest_leaf(&self) -> Option<&Shard> {
        self.leaves().into_iter().min_by(|a, b| {
            b.hash_range()
                .cmp(&a.hash_range())
                .then_with(|| a.starting_hash.cmp(&b.starting_hash))
        })
    }

    /// Leaf with the narrowest hash range; ties go to the smaller starting hash.
    pub fn smallest_leaf(&self) -> Option<&Shard> {
        self.leaves().into_iter().min_by(|a, b| compare_by_range(a, b))
    }

    /// The smallest leaf paired with its preferred neighbor, if any.
    pub fn merge_candidate(&self) -> Option<(&Shard, &Shard)> {
        let smallest = self.smallest_leaf()?;
        adjacent_pair(smallest, &self.leaves())
    }

    /// Check that the leaves exactly tile `space`.
    pub fn check_coverage(&self, space: HashSpace) -> TopologyResult<()> {
        let leaves = self.leaves();
        let (first, last) = match (leaves.first(), leaves.last()) {
            (Some(first), Some(last)) => (*first, *last),
            _ => return Err(TopologyError::Coverage("no open shards".to_string())),
        };

        if first.starting_hash != space.min {
            return Err(TopologyError::Coverage(format!(
                "first open shard {} starts at {}, expected {}",
                first.id, first.starting_hash, space.min
            )));
        }

        for pair in leaves.windows(2) {
            let (lower, upper) = (pair[0], pair[1]);
            if lower.precedes(upper) {
                continue;
            }
            let fault = if upper.starting_hash <= lower.ending_hash {
                "overlap"
            } else {
                "gap"
            };
            return Err(TopologyError::Coverage(format!(
                "{fault} between {} (ends {}) and {} (starts {})",
                lower.id, lower.ending_hash, upper.id, upper.starting_hash
            )));
        }

        if last.ending_hash != space.max {
            return Err(TopologyError::Coverage(format!(
                "last open shard {} ends at {}, expected {}",
                last.id, last.ending_hash, space.max
            )));
        }

        Ok(())
    }
}

/// Find the open neighbor of `shard` and return the pair ordered by
/// starting hash.
///
/// When neighbors exist on both sides, the narrower one is chosen so the
/// merged shard stays as small as possible; an exact tie goes to the lower
/// neighbor. Closed shards in `leaves` are ignored.
pub fn adjacent_pair<'a>(shard: &'a Shard, leaves: &[&'a Shard]) -> Option<(&'a Shard, &'a Shard)> {
    if shard.is_closed() {
        return None;
    }

    let mut lower = None;
    let mut upper = None;
    for &candidate in leaves {
        if candidate.id == shard.id || candidate.is_closed() {
            continue;
        }
        if candidate.precedes(shard) {
            lower = Some(candidate);
        } else if shard.precedes(candidate) {
            upper = Some(candidate);
        }
    }

    match (lower, upper) {
        (Some(l), Some(u)) if u.hash_range() < l.hash_range() => Some((shard, u)),
        (Some(l), _) => Some((l, shard)),
        (None, Some(u)) => Some((shard, u)),
        (None, None) => None,
    }
}
