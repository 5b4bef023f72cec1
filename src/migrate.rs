//! Repartitioning driver: plan, pack, exchange, merge, rebuild.
//!
//! [`partition_zone`] runs one load-balance round against the communicator:
//!
//! 1. ask the [`Partitioner`] for a migration plan (imports and exports);
//! 2. serialize each export (cell, its node closure, all solution values)
//!    into a per-destination chunk stream;
//! 3. exchange buffer sizes, then buffers, with every rank;
//! 4. merge arrivals -- cells this rank already ghosts are promoted to real,
//!    unseen cells and nodes are inserted, duplicates collapse on identity;
//! 5. drop exported cells (their unreferenced nodes go at the next sweep)
//!    and rebuild, which renumbers ids, re-derives rank connectivity and
//!    recomputes the ghost layer for the new ownership.
//!
//! When the plan is globally empty the zone is left untouched and the call
//! reports [`PartitionOutcome::NoChange`]. A partitioner or transport
//! failure marks the zone suspect.

use crate::error::{ErrorKind, Result};
use crate::ids::{GlobalId, LocalId, RankNo};
use crate::partitioner::{PartitionParams, Partitioner};
use crate::rebuild::rebuild_zone;
use crate::solution::GridLocation;
use crate::transport::{Transport, all_to_all};
use crate::udm_error;
use crate::wire::{WireCell, WireNode, decode_stream, encode_stream};
use crate::zone::{Reality, Zone};
use std::collections::{BTreeMap, HashMap};

/// Result of a partition call.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PartitionOutcome {
    /// Ownership moved; the zone was rebuilt for the new layout.
    Changed {
        /// Cells that arrived on this rank.
        imported: usize,
        /// Cells that left this rank.
        exported: usize,
    },
    /// The plan was empty everywhere; the zone is untouched.
    NoChange,
}

/// Run one repartition round on `zone`.
///
/// Collective: every rank must call together with the same parameters, and
/// a rank with no cells still participates in every exchange.
pub fn partition_zone(
    zone: &mut Zone,
    transport: &dyn Transport,
    partitioner: &dyn Partitioner,
    params: &PartitionParams,
) -> Result<PartitionOutcome> {
    zone.ensure_usable()?;
    let me = transport.rank();
    let world = transport.world_size() as usize;

    // Globally empty zones skip the partitioner entirely.
    let local_cells = zone.real_cell_count() as u64;
    let totals = transport.exchange_counts(&vec![local_cells; world])?;
    if totals.iter().sum::<u64>() == 0 {
        tracing::warn!(rank = me, zone = zone.id(), "partition: no real cells anywhere");
        return Ok(PartitionOutcome::NoChange);
    }

    let plan = partitioner
        .partition(zone, params, transport)
        .map_err(|e| {
            zone.suspect = true;
            udm_error!(
                ErrorKind::PartitionFailed,
                "{} failed: {e}",
                partitioner.name()
            )
        })?;

    // A no-change outcome must be agreed globally, since migration and the
    // rebuild that follows are collective.
    let moves = (plan.imports.len() + plan.exports.len()) as u64;
    let all_moves = transport.exchange_counts(&vec![moves; world])?;
    if all_moves.iter().sum::<u64>() == 0 {
        tracing::warn!(rank = me, zone = zone.id(), "partition: plan is empty, no change");
        return Ok(PartitionOutcome::NoChange);
    }

    // pack exports per destination
    let node_cfgs: Vec<_> = zone
        .registry
        .iter_location(GridLocation::Vertex)
        .cloned()
        .collect();
    let cell_cfgs: Vec<_> = zone
        .registry
        .iter_location(GridLocation::CellCenter)
        .cloned()
        .collect();
    let node_cfg_refs: Vec<&_> = node_cfgs.iter().collect();
    let cell_cfg_refs: Vec<&_> = cell_cfgs.iter().collect();

    let mut by_dest: BTreeMap<RankNo, Vec<LocalId>> = BTreeMap::new();
    for export in &plan.exports {
        if export.gid.rank != me || export.dest as usize >= world || export.dest == me {
            zone.suspect = true;
            return Err(udm_error!(
                ErrorKind::PartitionFailed,
                "export plan names cell {} with destination {}",
                export.gid,
                export.dest
            ));
        }
        if let Err(e) = zone.cell(export.gid.id).map(|_| ()) {
            zone.suspect = true;
            return Err(e);
        }
        by_dest.entry(export.dest).or_default().push(export.gid.id);
    }

    let mut sends: Vec<Vec<u8>> = vec![Vec::new(); world];
    for (&dest, cell_ids) in by_dest.iter_mut() {
        cell_ids.sort_unstable();
        cell_ids.dedup();
        let mut wire_cells = Vec::with_capacity(cell_ids.len());
        let mut wire_nodes: BTreeMap<GlobalId, WireNode> = BTreeMap::new();
        for &c in cell_ids.iter() {
            let cell = zone.cell(c)?;
            let mut refs = Vec::with_capacity(cell.node_ids().len());
            for &n in cell.node_ids() {
                let node = zone.node(n)?;
                refs.push(node.global_id());
                wire_nodes.entry(node.global_id()).or_insert_with(|| WireNode {
                    gid: node.global_id(),
                    coords: node.coordinates(),
                    values: node_cfgs
                        .iter()
                        .map(|cfg| zone.node_store.get_components(cfg, n.index()))
                        .collect(),
                });
            }
            wire_cells.push(WireCell {
                kind: cell.kind(),
                gid: cell.global_id(),
                weight: cell.weight(),
                nodes: refs,
                values: cell_cfgs
                    .iter()
                    .map(|cfg| zone.cell_store.get_components(cfg, c.index()))
                    .collect(),
            });
        }
        sends[dest as usize] = encode_stream(
            &params.wire,
            &cell_cfg_refs,
            &node_cfg_refs,
            &wire_cells,
            &wire_nodes,
        )?;
    }

    let received = all_to_all(transport, sends).inspect_err(|_| {
        zone.suspect = true;
    })?;

    // merge arrivals; identity tokens collapse nodes this rank already
    // holds (as ghosts or as boundary twins)
    let mut node_by_token: HashMap<GlobalId, LocalId> = HashMap::new();
    for node in zone.iter_nodes() {
        for &t in &node.tokens {
            node_by_token.insert(t, node.id());
        }
    }
    let mut cell_by_gid: HashMap<GlobalId, LocalId> = HashMap::new();
    for cell in zone.iter_cells() {
        cell_by_gid.insert(cell.global_id(), cell.id());
    }

    let mut imported = 0usize;
    for (source, buf) in received.iter().enumerate() {
        let source = source as RankNo;
        if source == me || buf.is_empty() {
            continue;
        }
        let chunks = decode_stream(&params.wire, &cell_cfg_refs, &node_cfg_refs, buf, source)
            .inspect_err(|_| {
                zone.suspect = true;
            })?;
        for chunk in &chunks {
            for wn in &chunk.nodes {
                match node_by_token.get(&wn.gid).copied() {
                    Some(existing) => {
                        let promoted = {
                            let node = zone.node_mut(existing)?;
                            if node.reality == Reality::Virtual {
                                node.reality = Reality::Real;
                                node.coords = wn.coords;
                                true
                            } else {
                                false
                            }
                        };
                        if promoted {
                            for (cfg, values) in node_cfgs.iter().zip(&wn.values) {
                                zone.node_store
                                    .set_components(cfg, existing.index(), values)?;
                            }
                        }
                    }
                    None => {
                        let id = zone.insert_migrated_node(wn.gid, wn.coords);
                        for (cfg, values) in node_cfgs.iter().zip(&wn.values) {
                            zone.node_store.set_components(cfg, id.index(), values)?;
                        }
                        node_by_token.insert(wn.gid, id);
                    }
                }
            }
            for wc in &chunk.cells {
                let mut refs = Vec::with_capacity(wc.nodes.len());
                for gid in &wc.nodes {
                    let local = node_by_token.get(gid).copied().ok_or_else(|| {
                        zone.suspect = true;
                        udm_error!(
                            ErrorKind::TransportFailed,
                            "migrated cell {} references unresolvable node {gid}",
                            wc.gid
                        )
                    })?;
                    refs.push(local);
                }
                match cell_by_gid.get(&wc.gid).copied() {
                    Some(existing) => {
                        // a ghost copy is promoted to owned
                        let promoted = {
                            let cell = zone.cell_mut(existing)?;
                            if cell.reality == Reality::Virtual {
                                cell.reality = Reality::Real;
                                cell.nodes = refs;
                                cell.weight = Some(wc.weight);
                                true
                            } else {
                                false
                            }
                        };
                        if promoted {
                            zone.adopt_promoted_cell(existing);
                            for (cfg, values) in cell_cfgs.iter().zip(&wc.values) {
                                zone.cell_store
                                    .set_components(cfg, existing.index(), values)?;
                            }
                            imported += 1;
                        }
                    }
                    None => {
                        let id =
                            zone.insert_migrated_cell(wc.gid, wc.kind, refs, Some(wc.weight));
                        for (cfg, values) in cell_cfgs.iter().zip(&wc.values) {
                            zone.cell_store.set_components(cfg, id.index(), values)?;
                        }
                        cell_by_gid.insert(wc.gid, id);
                        imported += 1;
                    }
                }
            }
        }
    }

    // drop exported cells; orphaned nodes fall at the rebuild sweep
    let exported = plan.exports.len();
    for export in &plan.exports {
        let id = export.gid.id;
        if let Ok(cell) = zone.cell_mut(id) {
            cell.removed = true;
        }
        for section in zone.sections.iter_mut() {
            section.cells.retain(|&c| c != id);
        }
    }

    zone.dirty = true;
    zone.connectivity_stale = true;
    zone.orphan_sweep = true;

    rebuild_zone(zone, transport, &params.wire)?;

    tracing::info!(
        rank = me,
        zone = zone.id(),
        imported,
        exported,
        "partition applied"
    );
    Ok(PartitionOutcome::Changed { imported, exported })
}
