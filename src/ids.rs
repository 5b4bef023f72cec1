//! Entity identifiers: rank-local ids and cross-rank global ids.
//!
//! Within a zone, nodes and cells are addressed by a dense, 1-based
//! [`LocalId`]. Across ranks the only valid identifier is the [`GlobalId`]
//! pair `(owning rank, owner-local id)`; local ids are meaningless outside
//! the rank that assigned them.
//!
//! Global ids travel on the wire in a configurable number of integer slots
//! ([`GidWidth`]); see [`GlobalId::encode`] for the packing rule.

use crate::error::{ErrorKind, Result};
use crate::udm_error;
use serde::{Deserialize, Serialize};

/// An MPI-style rank number within the communicator.
pub type RankNo = u32;

/// Dense, 1-based identifier for a node or cell within one zone.
///
/// Local ids are assigned contiguously per entity kind and reassigned only by
/// a rebuild; they are `Copy`, ordered, and hashable so they can serve as map
/// keys and be sorted deterministically.
#[derive(
    Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Serialize, Deserialize,
)]
pub struct LocalId(u64);

impl LocalId {
    /// Create a local id from a 1-based value.
    pub fn new(v: u64) -> Self {
        debug_assert!(v > 0, "local ids are 1-based");
        Self(v)
    }

    /// Create a local id from a 0-based array index.
    pub fn from_index(i: usize) -> Self {
        Self(i as u64 + 1)
    }

    /// The underlying 1-based value.
    pub fn get(self) -> u64 {
        self.0
    }

    /// The 0-based array index this id addresses.
    pub fn index(self) -> usize {
        (self.0 - 1) as usize
    }
}

impl std::fmt::Display for LocalId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Cross-rank entity identifier: `(owning rank, owner-local id)`.
///
/// Ordering is by rank first, then local id, which is the tie-break order
/// used whenever entities from several ranks are merged deterministically.
#[derive(
    Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Serialize, Deserialize,
)]
pub struct GlobalId {
    /// Rank that owns the entity.
    pub rank: RankNo,
    /// The entity's local id on the owning rank.
    pub id: LocalId,
}

impl GlobalId {
    /// Create a global id.
    pub fn new(rank: RankNo, id: LocalId) -> Self {
        Self { rank, id }
    }

    /// Encode into `width.slots()` integer slots, appended to `out`.
    ///
    /// Packing rule:
    /// - 1 slot: local id only (single-rank debug mode, rank implicit),
    /// - 2 slots: `(local-id, rank)`,
    /// - 3 slots: `(high32(local-id), low32(local-id), rank)`.
    pub fn encode(self, width: GidWidth, out: &mut Vec<u64>) {
        match width {
            GidWidth::Single => out.push(self.id.get()),
            GidWidth::Pair => {
                out.push(self.id.get());
                out.push(self.rank as u64);
            }
            GidWidth::Wide => {
                out.push(self.id.get() >> 32);
                out.push(self.id.get() & 0xFFFF_FFFF);
                out.push(self.rank as u64);
            }
        }
    }

    /// Decode one global id from `slots`, which must hold `width.slots()`
    /// values. With [`GidWidth::Single`] the rank is taken from
    /// `implicit_rank`.
    pub fn decode(width: GidWidth, slots: &[u64], implicit_rank: RankNo) -> Result<Self> {
        if slots.len() != width.slots() {
            return Err(udm_error!(
                ErrorKind::TransportFailed,
                "global-id slot count {} does not match width {}",
                slots.len(),
                width.slots()
            ));
        }
        Ok(match width {
            GidWidth::Single => GlobalId::new(implicit_rank, LocalId::new(slots[0])),
            GidWidth::Pair => GlobalId::new(slots[1] as RankNo, LocalId::new(slots[0])),
            GidWidth::Wide => GlobalId::new(
                slots[2] as RankNo,
                LocalId::new((slots[0] << 32) | slots[1]),
            ),
        })
    }
}

impl std::fmt::Display for GlobalId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.rank, self.id)
    }
}

/// Number of integer slots a global id occupies on the wire.
///
/// All ranks must agree on the width at startup; [`GidWidth::Wide`] is
/// required once local ids exceed 32 bits.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Serialize, Deserialize)]
pub enum GidWidth {
    /// Local id only; rank implicit (single-rank debug mode).
    Single,
    /// `(local-id, rank)`.
    Pair,
    /// `(high32(local-id), low32(local-id), rank)`.
    Wide,
}

impl GidWidth {
    /// Slot count for this width.
    pub fn slots(self) -> usize {
        match self {
            GidWidth::Single => 1,
            GidWidth::Pair => 2,
            GidWidth::Wide => 3,
        }
    }
}

impl Default for GidWidth {
    fn default() -> Self {
        GidWidth::Pair
    }
}
