//! Rank-connectivity index: boundary-node twins across rank boundaries.
//!
//! For every node that lies on an inter-partition boundary, the index keeps
//! the ordered set of `(peer-rank, peer-local-id)` pairs naming its twins on
//! other ranks. The index is bidirectional by contract: if this rank says
//! node `n` pairs with `(p, m)`, rank `p` must say node `m` pairs with
//! `(this-rank, n)`. [`validate_rank_connectivity`] checks the contract
//! pairwise with every peer and is meant for tests and debug paths.
//!
//! Canonicalization (sorting each pair set by `(rank, id)` and deduplicating)
//! runs at the end of every rebuild, after which the per-peer ghost exchange
//! plans ([`HaloPlans`]) derived during halo construction stay valid until
//! the next structural change.

use crate::error::{ErrorKind, Result};
use crate::ids::{LocalId, RankNo};
use crate::transport::{Transport, all_to_all};
use crate::udm_error;
use crate::wire::{ByteReader, ByteWriter};
use crate::zone::Zone;
use serde::Serialize;
use std::collections::BTreeMap;

const NO_PAIRS: &[(RankNo, LocalId)] = &[];

/// Boundary-node twin index for one zone.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RankConnectivity {
    pairs: BTreeMap<LocalId, Vec<(RankNo, LocalId)>>,
}

impl RankConnectivity {
    /// Create an empty index.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that `node` has a twin `(peer, peer_id)`.
    pub fn insert(&mut self, node: LocalId, peer: RankNo, peer_id: LocalId) {
        self.pairs.entry(node).or_default().push((peer, peer_id));
    }

    /// Twin pairs of `node`, empty for interior nodes.
    pub fn pairs_for(&self, node: LocalId) -> &[(RankNo, LocalId)] {
        self.pairs.get(&node).map_or(NO_PAIRS, |v| v.as_slice())
    }

    /// True when `node` has at least one twin.
    pub fn is_boundary(&self, node: LocalId) -> bool {
        self.pairs.get(&node).is_some_and(|v| !v.is_empty())
    }

    /// True when `node` has a twin on `peer`.
    pub fn known_to(&self, node: LocalId, peer: RankNo) -> bool {
        self.pairs_for(node).iter().any(|&(r, _)| r == peer)
    }

    /// Boundary nodes in ascending local-id order.
    pub fn boundary_nodes(&self) -> impl Iterator<Item = LocalId> + '_ {
        self.pairs.keys().copied()
    }

    /// All `(node, twin pairs)` entries in ascending local-id order.
    pub fn iter(&self) -> impl Iterator<Item = (LocalId, &[(RankNo, LocalId)])> {
        self.pairs.iter().map(|(&n, v)| (n, v.as_slice()))
    }

    /// Ranks that share at least one node with this rank, ascending.
    pub fn peers(&self) -> Vec<RankNo> {
        let mut out: Vec<RankNo> = self
            .pairs
            .values()
            .flat_map(|v| v.iter().map(|&(r, _)| r))
            .collect();
        out.sort_unstable();
        out.dedup();
        out
    }

    /// `(my node, peer node)` twin pairs with `peer`, sorted by my local id.
    pub fn twins_on(&self, peer: RankNo) -> Vec<(LocalId, LocalId)> {
        let mut out = Vec::new();
        for (&node, pairs) in &self.pairs {
            for &(r, peer_id) in pairs {
                if r == peer {
                    out.push((node, peer_id));
                }
            }
        }
        out
    }

    /// Number of boundary nodes.
    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    /// True when no node is paired.
    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    /// Sort every pair set by `(rank, id)` and drop duplicates and empty
    /// entries.
    pub fn canonicalize(&mut self) {
        for v in self.pairs.values_mut() {
            v.sort_unstable();
            v.dedup();
        }
        self.pairs.retain(|_, v| !v.is_empty());
    }

    /// Re-key every entry through `map`; entries mapping to `None` are
    /// dropped. Used when local ids are compacted.
    pub fn remap(&mut self, map: impl Fn(LocalId) -> Option<LocalId>) {
        let old = std::mem::take(&mut self.pairs);
        for (node, v) in old {
            if let Some(new) = map(node) {
                self.pairs.insert(new, v);
            }
        }
    }

    /// Drop every entry.
    pub fn clear(&mut self) {
        self.pairs.clear();
    }

    /// Replace the whole index.
    pub fn replace(&mut self, pairs: BTreeMap<LocalId, Vec<(RankNo, LocalId)>>) {
        self.pairs = pairs;
        self.canonicalize();
    }

    /// Serializable `(local-id, peer-rank, peer-local-id)` triplets, the
    /// layout of the container's rank-connectivity array.
    pub fn report(&self) -> RankConnectivityReport {
        let mut triplets = Vec::new();
        for (&node, pairs) in &self.pairs {
            for &(rank, peer_id) in pairs {
                triplets.push((node.get(), rank, peer_id.get()));
            }
        }
        RankConnectivityReport { triplets }
    }
}

/// Debug-dump form of the index.
#[derive(Clone, Debug, Serialize)]
pub struct RankConnectivityReport {
    /// `(local-id, peer-rank, peer-local-id)` per pair.
    pub triplets: Vec<(u64, RankNo, u64)>,
}

// |----------------------|
// | Ghost exchange plans |
// |----------------------|

/// Per-peer ghost exchange plan.
///
/// `send_*` lists this rank's real entities that the peer holds as virtual;
/// `recv_*` lists this rank's virtual entities owned by the peer. Matching
/// is positional: entry `i` of a send list on the owner corresponds to entry
/// `i` of the peer's receive list. Both sides derive their order from the
/// same packed halo payload, so the correspondence holds by construction.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PeerPlan {
    /// The peer rank.
    pub peer: RankNo,
    /// My real nodes the peer ghosts, in halo pack order.
    pub send_nodes: Vec<LocalId>,
    /// My real cells the peer ghosts, in halo pack order.
    pub send_cells: Vec<LocalId>,
    /// My virtual nodes owned by the peer, in halo unpack order.
    pub recv_nodes: Vec<LocalId>,
    /// My virtual cells owned by the peer, in halo unpack order.
    pub recv_cells: Vec<LocalId>,
}

/// All per-peer plans for one zone, valid for exactly one generation.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct HaloPlans {
    /// Topology generation these plans were computed for.
    pub generation: u64,
    /// Plans in ascending peer order.
    pub peers: Vec<PeerPlan>,
}

impl HaloPlans {
    /// The plan for `rank`, if that rank is a peer.
    pub fn peer(&self, rank: RankNo) -> Option<&PeerPlan> {
        self.peers.iter().find(|p| p.peer == rank)
    }

    /// The plan for `rank`, creating an empty one if absent.
    pub(crate) fn peer_mut(&mut self, rank: RankNo) -> &mut PeerPlan {
        if let Some(i) = self.peers.iter().position(|p| p.peer == rank) {
            return &mut self.peers[i];
        }
        self.peers.push(PeerPlan {
            peer: rank,
            ..Default::default()
        });
        self.peers.sort_by_key(|p| p.peer);
        let i = self
            .peers
            .iter()
            .position(|p| p.peer == rank)
            .expect("just inserted");
        &mut self.peers[i]
    }
}

// |-----------|
// | Validator |
// |-----------|

/// Check the bidirectional pair contract against every peer.
///
/// Collective: every rank in the communicator must call this together. Each
/// rank sends its `(my-local-id, peer-local-id)` claims to the named peer,
/// and verifies every incoming claim against its own index. Any mismatch
/// fails with *rank-connectivity-mismatch*.
pub fn validate_rank_connectivity(zone: &Zone, transport: &dyn Transport) -> Result<()> {
    let world = transport.world_size() as usize;
    let me = transport.rank();

    let mut sends: Vec<ByteWriter> = (0..world).map(|_| ByteWriter::new()).collect();
    let mut counts = vec![0u32; world];
    for (node, pairs) in zone.rank_connectivity().iter() {
        for &(peer, peer_id) in pairs {
            if peer == me || (peer as usize) >= world {
                return Err(udm_error!(
                    ErrorKind::RankConnectivityMismatch,
                    "node {node} pairs with invalid rank {peer}"
                ));
            }
            counts[peer as usize] += 1;
            let w = &mut sends[peer as usize];
            w.put_u64(node.get());
            w.put_u64(peer_id.get());
        }
    }
    let payloads: Vec<Vec<u8>> = sends
        .into_iter()
        .zip(&counts)
        .map(|(w, &c)| {
            let mut framed = ByteWriter::new();
            framed.put_u32(c);
            framed.put_bytes(&w.into_inner());
            framed.into_inner()
        })
        .collect();

    let received = all_to_all(transport, payloads)?;

    let mut mismatches = 0usize;
    let mut first: Option<String> = None;
    for (src, buf) in received.iter().enumerate() {
        let src = src as RankNo;
        if src == me {
            continue;
        }
        let mut r = ByteReader::new(buf);
        let n = r.get_u32()?;
        for _ in 0..n {
            let their_node = LocalId::new(r.get_u64()?);
            let my_node = LocalId::new(r.get_u64()?);
            let ok = zone.node_exists(my_node)
                && zone
                    .rank_connectivity()
                    .pairs_for(my_node)
                    .iter()
                    .any(|&(p, id)| p == src && id == their_node);
            if !ok {
                mismatches += 1;
                first.get_or_insert_with(|| {
                    format!(
                        "rank {src} claims its node {their_node} twins my node {my_node}, \
                         which holds no inverse pair"
                    )
                });
            }
        }
    }

    if mismatches > 0 {
        return Err(udm_error!(
            ErrorKind::RankConnectivityMismatch,
            "{mismatches} asymmetric pair(s); first: {}",
            first.unwrap_or_default()
        ));
    }
    tracing::debug!(rank = me, "rank connectivity validated");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lid(v: u64) -> LocalId {
        LocalId::new(v)
    }

    #[test]
    fn canonicalize_sorts_and_dedupes() {
        let mut index = RankConnectivity::new();
        index.insert(lid(4), 2, lid(7));
        index.insert(lid(4), 1, lid(9));
        index.insert(lid(4), 2, lid(7));
        index.canonicalize();
        assert_eq!(index.pairs_for(lid(4)), &[(1, lid(9)), (2, lid(7))]);
    }

    #[test]
    fn peers_are_sorted_unique() {
        let mut index = RankConnectivity::new();
        index.insert(lid(1), 3, lid(1));
        index.insert(lid(2), 1, lid(2));
        index.insert(lid(3), 3, lid(3));
        assert_eq!(index.peers(), vec![1, 3]);
    }

    #[test]
    fn remap_drops_unmapped_nodes() {
        let mut index = RankConnectivity::new();
        index.insert(lid(1), 1, lid(5));
        index.insert(lid(2), 1, lid(6));
        index.remap(|n| if n == lid(2) { Some(lid(1)) } else { None });
        assert!(!index.is_boundary(lid(2)));
        assert_eq!(index.pairs_for(lid(1)), &[(1, lid(6))]);
    }

    #[test]
    fn report_lists_triplets() {
        let mut index = RankConnectivity::new();
        index.insert(lid(3), 1, lid(8));
        let report = index.report();
        assert_eq!(report.triplets, vec![(3, 1, 8)]);
    }
}
