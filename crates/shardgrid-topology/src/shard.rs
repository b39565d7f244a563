//! A single shard: one contiguous slice of the hash key space.

use std::cmp::Ordering;
use std::collections::BTreeSet;

use shard_core::{ShardDescriptor, ShardId};

use crate::error::{TopologyError, TopologyResult};

/// Inclusive bounds of the addressable hash key space.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HashSpace {
    pub min: u128,
    pub max: u128,
}

impl HashSpace {
    pub fn new(min: u128, max: u128) -> Self {
        Self { min, max }
    }
}

impl Default for HashSpace {
    /// The full 128-bit key space.
    fn default() -> Self {
        Self {
            min: 0,
            max: u128::MAX,
        }
    }
}

/// A shard with parsed bounds and lineage links.
///
/// `children` is filled in by [`crate::Topology::link_lineage`]; a shard
/// with any children is closed and never counted or acted on again.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Shard {
    pub id: ShardId,
    pub starting_hash: u128,
    pub ending_hash: u128,
    pub parent_id: Option<ShardId>,
    pub adjacent_parent_id: Option<ShardId>,
    pub children: BTreeSet<ShardId>,
}

impl Shard {
    /// Parse and validate a raw descriptor.
    pub fn from_descriptor(desc: &ShardDescriptor) -> TopologyResult<Self> {
        if desc.id.trim().is_empty() {
            return Err(TopologyError::MalformedShard {
                id: desc.id.clone(),
                reason: "empty shard id".to_string(),
            });
        }

        let starting_hash = parse_hash(&desc.id, "starting", &desc.starting_hash)?;
        let ending_hash = parse_hash(&desc.id, "ending", &desc.ending_hash)?;

        if ending_hash < starting_hash {
            return Err(TopologyError::MalformedShard {
                id: desc.id.clone(),
                reason: format!("negative hash range {starting_hash}..={ending_hash}"),
            });
        }

        Ok(Self {
            id: desc.id.clone(),
            starting_hash,
            ending_hash,
            parent_id: desc.parent_id.clone(),
            adjacent_parent_id: desc.adjacent_parent_id.clone(),
            children: BTreeSet::new(),
        })
    }

    /// `ending_hash - starting_hash`; zero for a single-key shard.
    pub fn hash_range(&self) -> u128 {
        self.ending_hash - self.starting_hash
    }

    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }

    pub fn is_closed(&self) -> bool {
        !self.children.is_empty()
    }

    /// Parent ids recorded on this shard, split parent first.
    pub fn parents(&self) -> impl Iterator<Item = &ShardId> {
        self.parent_id.iter().chain(self.adjacent_parent_id.iter())
    }

    /// Starting hash of the upper half when this shard is bisected.
    ///
    /// Always satisfies `starting_hash < mid <= ending_hash`.
    pub fn split_point(&self) -> TopologyResult<u128> {
        let range = self.hash_range();
        if range == 0 {
            return Err(TopologyError::Unsplittable(self.id.clone()));
        }
        Ok(self.starting_hash + range / 2 + 1)
    }

    /// True when `other` begins on the key immediately after this shard ends.
    pub fn precedes(&self, other: &Shard) -> bool {
        self.ending_hash.checked_add(1) == Some(other.starting_hash)
    }

    pub fn is_contiguous_with(&self, other: &Shard) -> bool {
        self.precedes(other) || other.precedes(self)
    }
}

/// Order by hash range, then by starting hash.
///
/// Used for biggest/smallest leaf selection: the smaller starting hash wins
/// a tie in both directions, so callers pick the max with the tie-break
/// inverted (see [`crate::Topology::biggest_leaf`]).
pub fn compare_by_range(a: &Shard, b: &Shard) -> Ordering {
    a.hash_range()
        .cmp(&b.hash_range())
        .then_with(|| a.starting_hash.cmp(&b.starting_hash))
}

fn parse_hash(id: &str, which: &str, raw: &str) -> TopologyResult<u128> {
    raw.trim()
        .parse::<u128>()
        .map_err(|e| TopologyError::MalformedShard {
            id: id.to_string(),
            reason: format!("invalid {which} hash {raw:?}: {e}"),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn shard(id: &str, start: u128, end: u128) -> Shard {
        Shard::from_descriptor(&ShardDescriptor::new(id, start, end)).unwrap()
    }

    #[test]
    fn rejects_negative_range() {
        let err = Shard::from_descriptor(&ShardDescriptor::new("s", 10, 9)).unwrap_err();
        assert!(matches!(err, TopologyError::MalformedShard { ref id, .. } if id == "s"));
    }

    #[test]
    fn rejects_unparsable_and_negative_keys() {
        let mut desc = ShardDescriptor::new("s", 0, 10);
        desc.starting_hash = "-1".to_string();
        assert!(Shard::from_descriptor(&desc).is_err());

        desc.starting_hash = "0x10".to_string();
        assert!(Shard::from_descriptor(&desc).is_err());

        desc.starting_hash = String::new();
        assert!(Shard::from_descriptor(&desc).is_err());
    }

    #[test]
    fn parses_full_width_keys() {
        let s = shard("s", 0, u128::MAX);
        assert_eq!(s.hash_range(), u128::MAX);
        assert!(s.is_leaf());
    }

    #[test]
    fn split_point_bisects() {
        assert_eq!(shard("a", 0, 99).split_point(), Ok(50));
        assert_eq!(shard("b", 100, 199).split_point(), Ok(150));
        assert_eq!(shard("c", 7, 8).split_point(), Ok(8));
    }

    #[test]
    fn split_point_stays_inside_range() {
        let cases = [
            (0u128, 1u128),
            (0, 2),
            (5, 6),
            (1, u128::MAX),
            (0, u128::MAX),
            (u128::MAX - 1, u128::MAX),
            (1 << 64, (1 << 65) + 17),
        ];
        for (start, end) in cases {
            let mid = shard("s", start, end).split_point().unwrap();
            assert!(start < mid && mid <= end, "{start}..={end} split at {mid}");
        }
    }

    #[test]
    fn single_key_shard_is_unsplittable() {
        let s = shard("tiny", 42, 42);
        assert_eq!(s.split_point(), Err(TopologyError::Unsplittable("tiny".into())));
    }

    #[test]
    fn contiguity() {
        let a = shard("a", 0, 49);
        let b = shard("b", 50, 99);
        let c = shard("c", 101, 199);
        assert!(a.precedes(&b));
        assert!(!b.precedes(&a));
        assert!(b.is_contiguous_with(&a));
        assert!(!b.is_contiguous_with(&c));

        let top = shard("top", 10, u128::MAX);
        assert!(!top.precedes(&a));
    }

    #[test]
    fn comparator_breaks_ties_on_start() {
        let a = shard("a", 0, 99);
        let b = shard("b", 100, 199);
        let c = shard("c", 200, 209);
        assert_eq!(compare_by_range(&a, &b), Ordering::Less);
        assert_eq!(compare_by_range(&c, &a), Ordering::Less);
        assert_eq!(compare_by_range(&a, &a), Ordering::Equal);
    }
}
