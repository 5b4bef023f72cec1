//! Graph-partitioner seam and the built-in coordinate bisector.
//!
//! Repartitioning is driven through the [`Partitioner`] trait: the engine
//! exposes the local mesh through the [`MeshView`] callback surface
//! (object list, adjacency, geometry) and receives a migration plan of
//! imports and exports. The core carries no partitioner-specific types, so
//! an adapter around Zoltan or any equivalent hypergraph/graph partitioner
//! plugs in by implementing the trait.
//!
//! [`RcbPartitioner`] is the built-in implementation: a deterministic,
//! weight-balanced recursive coordinate bisection over cell centroids. Every
//! rank gathers the full `(gid, weight, centroid)` object table and computes
//! the same assignment, so import and export lists are consistent without a
//! further exchange. It reads the same parameter surface a heavyweight
//! adapter would ([`PartitionParams`]), though as a geometric method it cuts
//! identically under the `Hypergraph` and `Graph` settings.

use crate::error::Result;
use crate::ids::{GlobalId, LocalId, RankNo};
use crate::topology;
use crate::transport::{Transport, all_to_all};
use crate::wire::{ByteReader, ByteWriter, WireOptions};
use crate::zone::Zone;
use std::collections::BTreeMap;

/// Partitioning model requested from the partitioner.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum PartitionMethod {
    /// Hypergraph cut model.
    Hypergraph,
    /// Plain graph cut model.
    Graph,
}

/// Whether the partitioner starts fresh or refines the current ownership.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum PartitionApproach {
    /// Partition from scratch.
    Partition,
    /// Incremental repartition biased toward the current placement.
    Repartition,
}

/// Parameter surface for a partition call.
#[derive(Clone, Debug)]
pub struct PartitionParams {
    /// Cut model.
    pub method: PartitionMethod,
    /// Fresh partition or repartition.
    pub approach: PartitionApproach,
    /// Partitioner verbosity (0 = silent).
    pub debug_level: u32,
    /// String key/value overrides forwarded to the partitioner backend.
    pub overrides: BTreeMap<String, String>,
    /// Wire knobs used by the migration that follows the plan.
    pub wire: WireOptions,
}

impl Default for PartitionParams {
    fn default() -> Self {
        Self {
            method: PartitionMethod::Hypergraph,
            approach: PartitionApproach::Partition,
            debug_level: 0,
            overrides: BTreeMap::new(),
            wire: WireOptions::default(),
        }
    }
}

impl PartitionParams {
    /// Select the hypergraph model with the given approach.
    pub fn set_hypergraph(&mut self, approach: PartitionApproach) {
        self.method = PartitionMethod::Hypergraph;
        self.approach = approach;
    }

    /// Select the graph model with the given approach.
    pub fn set_graph(&mut self, approach: PartitionApproach) {
        self.method = PartitionMethod::Graph;
        self.approach = approach;
    }

    /// Store a backend-specific override.
    pub fn set_parameter<K: Into<String>, V: Into<String>>(&mut self, key: K, value: V) {
        self.overrides.insert(key.into(), value.into());
    }

    /// Remove a backend-specific override.
    pub fn remove_parameter(&mut self, key: &str) -> bool {
        self.overrides.remove(key).is_some()
    }

    /// Set partitioner verbosity.
    pub fn set_debug_level(&mut self, level: u32) {
        self.debug_level = level;
    }
}

/// Callback surface the engine offers to a partitioner.
pub trait MeshView {
    /// Number of partitionable objects (real cells) on this rank.
    fn object_count(&self) -> usize;

    /// `(global id, weight)` per real cell, in ascending local-id order.
    /// After a rebuild a real cell's `gid.id` equals its local id.
    fn object_list(&self) -> Vec<(GlobalId, f32)>;

    /// Cells sharing at least one node with `object`, ghosts included, as
    /// `(neighbour gid, shared-node count)`.
    fn edge_list(&self, object: LocalId) -> Result<Vec<(GlobalId, u32)>>;

    /// Centroid of `object`, for geometric methods.
    fn geometry(&self, object: LocalId) -> Result<[f64; 3]>;
}

impl MeshView for Zone {
    fn object_count(&self) -> usize {
        self.real_cell_count()
    }

    fn object_list(&self) -> Vec<(GlobalId, f32)> {
        self.iter_real_cells()
            .map(|c| (c.global_id(), c.weight()))
            .collect()
    }

    fn edge_list(&self, object: LocalId) -> Result<Vec<(GlobalId, u32)>> {
        let mut out = Vec::new();
        for (cell, shared) in topology::cell_adjacency(self, object)? {
            out.push((self.cell(cell)?.global_id(), shared));
        }
        Ok(out)
    }

    fn geometry(&self, object: LocalId) -> Result<[f64; 3]> {
        self.centroid(object)
    }
}

/// A cell arriving from another rank.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Import {
    /// The cell's global id on its current owner.
    pub gid: GlobalId,
    /// The rank it arrives from.
    pub source: RankNo,
}

/// A cell leaving this rank.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Export {
    /// The cell's global id on this rank.
    pub gid: GlobalId,
    /// The rank it moves to.
    pub dest: RankNo,
}

/// Migration plan returned by a partitioner.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PartitionPlan {
    /// Cells arriving from other ranks.
    pub imports: Vec<Import>,
    /// Cells leaving this rank.
    pub exports: Vec<Export>,
}

impl PartitionPlan {
    /// True when nothing moves anywhere on this rank.
    pub fn is_empty(&self) -> bool {
        self.imports.is_empty() && self.exports.is_empty()
    }
}

/// A graph/hypergraph partitioner backend.
pub trait Partitioner: Send + Sync {
    /// Backend name, for logs.
    fn name(&self) -> &str;

    /// Compute a migration plan. Collective: every rank calls together with
    /// the same parameters.
    fn partition(
        &self,
        view: &dyn MeshView,
        params: &PartitionParams,
        transport: &dyn Transport,
    ) -> Result<PartitionPlan>;
}

/// Built-in weight-balanced recursive coordinate bisection.
#[derive(Clone, Copy, Debug, Default)]
pub struct RcbPartitioner;

struct RcbObject {
    gid: GlobalId,
    weight: f32,
    centroid: [f64; 3],
}

impl Partitioner for RcbPartitioner {
    fn name(&self) -> &str {
        "rcb"
    }

    fn partition(
        &self,
        view: &dyn MeshView,
        params: &PartitionParams,
        transport: &dyn Transport,
    ) -> Result<PartitionPlan> {
        let me = transport.rank();
        let world = transport.world_size();

        // Gather every rank's (gid, weight, centroid) table; each rank then
        // computes the identical global assignment.
        let mut w = ByteWriter::new();
        let objects = view.object_list();
        w.put_u32(objects.len() as u32);
        for &(gid, weight) in &objects {
            let c = view.geometry(gid.id)?;
            w.put_u32(gid.rank);
            w.put_u64(gid.id.get());
            w.put_f32(weight);
            w.put_f64(c[0]);
            w.put_f64(c[1]);
            w.put_f64(c[2]);
        }
        let mine = w.into_inner();
        let received = all_to_all(transport, vec![mine; world as usize])?;

        let mut all: Vec<RcbObject> = Vec::new();
        for buf in &received {
            let mut r = ByteReader::new(buf);
            let n = r.get_u32()?;
            for _ in 0..n {
                let rank = r.get_u32()?;
                let id = r.get_u64()?;
                let weight = r.get_f32()?;
                let centroid = [r.get_f64()?, r.get_f64()?, r.get_f64()?];
                all.push(RcbObject {
                    gid: GlobalId::new(rank, LocalId::new(id)),
                    weight,
                    centroid,
                });
            }
        }

        if params.debug_level > 0 {
            tracing::debug!(
                rank = me,
                objects = all.len(),
                method = ?params.method,
                approach = ?params.approach,
                "rcb: gathered global object table"
            );
        }

        let mut assignment: BTreeMap<GlobalId, RankNo> = BTreeMap::new();
        bisect(&mut all, 0, world, &mut assignment);

        let mut plan = PartitionPlan::default();
        for (&gid, &part) in &assignment {
            if gid.rank == me && part != me {
                plan.exports.push(Export { gid, dest: part });
            } else if gid.rank != me && part == me {
                plan.imports.push(Import {
                    gid,
                    source: gid.rank,
                });
            }
        }
        if params.debug_level > 0 {
            tracing::debug!(
                rank = me,
                imports = plan.imports.len(),
                exports = plan.exports.len(),
                "rcb: plan computed"
            );
        }
        Ok(plan)
    }
}

/// Assign `items` to parts `[first, first + parts)`, splitting by cumulative
/// weight along the widest centroid axis.
fn bisect(
    items: &mut [RcbObject],
    first: RankNo,
    parts: u32,
    assignment: &mut BTreeMap<GlobalId, RankNo>,
) {
    if parts <= 1 || items.len() <= 1 {
        for item in items.iter() {
            assignment.insert(item.gid, first);
        }
        return;
    }

    let mut lo = [f64::INFINITY; 3];
    let mut hi = [f64::NEG_INFINITY; 3];
    for item in items.iter() {
        for a in 0..3 {
            lo[a] = lo[a].min(item.centroid[a]);
            hi[a] = hi[a].max(item.centroid[a]);
        }
    }
    let axis = (0..3)
        .max_by(|&a, &b| (hi[a] - lo[a]).total_cmp(&(hi[b] - lo[b])))
        .unwrap_or(0);

    items.sort_by(|a, b| {
        a.centroid[axis]
            .total_cmp(&b.centroid[axis])
            .then_with(|| a.gid.cmp(&b.gid))
    });

    let left_parts = parts / 2;
    let right_parts = parts - left_parts;
    let total: f64 = items.iter().map(|i| i.weight as f64).sum();
    let target = total * left_parts as f64 / parts as f64;

    let mut acc = 0.0;
    let mut split = items.len();
    for (i, item) in items.iter().enumerate() {
        acc += item.weight as f64;
        if acc >= target {
            split = i + 1;
            break;
        }
    }
    // keep both sides populated when possible
    split = split.clamp(1, items.len().saturating_sub(1).max(1));

    let (left, right) = items.split_at_mut(split);
    bisect(left, first, left_parts, assignment);
    bisect(right, first + left_parts, right_parts, assignment);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn obj(rank: RankNo, id: u64, weight: f32, x: f64) -> RcbObject {
        RcbObject {
            gid: GlobalId::new(rank, LocalId::new(id)),
            weight,
            centroid: [x, 0.0, 0.0],
        }
    }

    #[test]
    fn bisection_balances_weight() {
        // heavy cells on the left: the cut shifts left of the midpoint
        let mut items = vec![
            obj(0, 1, 10.0, 0.0),
            obj(0, 2, 10.0, 1.0),
            obj(0, 3, 1.0, 2.0),
            obj(0, 4, 1.0, 3.0),
            obj(1, 1, 1.0, 4.0),
            obj(1, 2, 1.0, 5.0),
        ];
        let mut assignment = BTreeMap::new();
        bisect(&mut items, 0, 2, &mut assignment);
        let left: f32 = assignment
            .iter()
            .filter(|&(_, &p)| p == 0)
            .map(|(g, _)| items.iter().find(|i| i.gid == *g).unwrap().weight)
            .sum();
        // the cut falls right after the second heavy cell (cumulative 20 of
        // 24), not at the positional midpoint (21 of 24)
        assert_eq!(left, 20.0);
        assert_eq!(
            assignment[&GlobalId::new(0, LocalId::new(1))],
            assignment[&GlobalId::new(0, LocalId::new(2))]
        );
    }

    #[test]
    fn assignment_is_deterministic() {
        let build = || {
            vec![
                obj(0, 1, 1.0, 0.0),
                obj(0, 2, 1.0, 1.0),
                obj(1, 1, 1.0, 2.0),
                obj(1, 2, 1.0, 3.0),
            ]
        };
        let mut a = BTreeMap::new();
        let mut b = BTreeMap::new();
        bisect(&mut build(), 0, 2, &mut a);
        bisect(&mut build(), 0, 2, &mut b);
        assert_eq!(a, b);
    }

    #[test]
    fn single_part_takes_everything() {
        let mut items = vec![obj(0, 1, 1.0, 0.0), obj(0, 2, 1.0, 9.0)];
        let mut assignment = BTreeMap::new();
        bisect(&mut items, 3, 1, &mut assignment);
        assert!(assignment.values().all(|&p| p == 3));
    }
}
