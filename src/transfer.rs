//! Per-step ghost-field synchronization.
//!
//! Between migrations, field values on virtual entities go stale as owning
//! ranks advance their solutions. [`transfer_virtual_cells`] refreshes them:
//! for every peer, this rank gathers the values of the real entities that
//! peer ghosts (the inverse of the peer's receive plan), exchanges buffers,
//! and writes arriving values into its own ghost slots positionally.
//!
//! Only field values move; no topology changes, no ids are reassigned, and
//! constant solutions are skipped. The plans come from the last rebuild and
//! are valid for exactly one generation; a count mismatch between two ranks
//! means a rebuild was skipped somewhere and fails the transfer fatally.

use crate::error::{ErrorKind, Result};
use crate::ids::RankNo;
use crate::solution::GridLocation;
use crate::transport::{Transport, all_to_all};
use crate::udm_error;
use crate::wire::{ByteReader, ByteWriter, decode_components, encode_components};
use crate::zone::Zone;

/// Counters reported by a transfer.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TransferStats {
    /// Peers exchanged with.
    pub peers: usize,
    /// Ghost nodes whose values were refreshed.
    pub nodes_updated: usize,
    /// Ghost cells whose values were refreshed.
    pub cells_updated: usize,
}

/// Synchronize ghost-entity field values with every peer.
///
/// Collective: every rank in the communicator must call this together, on a
/// zone in the rebuilt state.
pub fn transfer_virtual_cells(zone: &mut Zone, transport: &dyn Transport) -> Result<TransferStats> {
    zone.ensure_usable()?;
    let me = transport.rank();
    let world = transport.world_size() as usize;

    let plans = zone
        .plans
        .clone()
        .filter(|p| p.generation == zone.generation)
        .ok_or_else(|| {
            udm_error!(
                ErrorKind::TransferPlanMismatch,
                "zone {} has no exchange plans for generation {}; rebuild first",
                zone.id(),
                zone.generation()
            )
        })?;

    let node_cfgs: Vec<_> = zone
        .registry
        .iter_location(GridLocation::Vertex)
        .filter(|c| !c.constant)
        .cloned()
        .collect();
    let cell_cfgs: Vec<_> = zone
        .registry
        .iter_location(GridLocation::CellCenter)
        .filter(|c| !c.constant)
        .cloned()
        .collect();

    // gather: one buffer per peer, counts first so the receiver can verify
    // its plan agrees
    let mut sends: Vec<Vec<u8>> = vec![Vec::new(); world];
    for plan in &plans.peers {
        if plan.peer as usize >= world || plan.peer == me {
            continue;
        }
        let mut w = ByteWriter::new();
        w.put_u32(plan.send_nodes.len() as u32);
        w.put_u32(plan.send_cells.len() as u32);
        for cfg in &node_cfgs {
            for &n in &plan.send_nodes {
                let values = zone.node_store.get_components(cfg, n.index());
                encode_components(&mut w, cfg, &values)?;
            }
        }
        for cfg in &cell_cfgs {
            for &c in &plan.send_cells {
                let values = zone.cell_store.get_components(cfg, c.index());
                encode_components(&mut w, cfg, &values)?;
            }
        }
        sends[plan.peer as usize] = w.into_inner();
    }

    let received = all_to_all(transport, sends).inspect_err(|_| {
        zone.suspect = true;
    })?;

    // scatter: write arrivals into ghost slots, matched by plan position
    let mut stats = TransferStats::default();
    for plan in &plans.peers {
        let peer = plan.peer;
        if peer as usize >= world || peer == me {
            continue;
        }
        let buf = &received[peer as usize];
        if buf.is_empty() && plan.recv_nodes.is_empty() && plan.recv_cells.is_empty() {
            continue;
        }
        let mut r = ByteReader::new(buf);
        let announced_nodes = r.get_u32().map_err(|e| mismatch(zone, peer, e))? as usize;
        let announced_cells = r.get_u32().map_err(|e| mismatch(zone, peer, e))? as usize;
        if announced_nodes != plan.recv_nodes.len() || announced_cells != plan.recv_cells.len() {
            zone.suspect = true;
            return Err(udm_error!(
                ErrorKind::TransferPlanMismatch,
                "rank {peer} sent {announced_nodes} node and {announced_cells} cell records, \
                 local plan expects {} and {}; rebuild was not run on all ranks",
                plan.recv_nodes.len(),
                plan.recv_cells.len()
            ));
        }
        for cfg in &node_cfgs {
            for &n in &plan.recv_nodes {
                let values =
                    decode_components(&mut r, cfg).map_err(|e| mismatch(zone, peer, e))?;
                zone.node_store.set_components(cfg, n.index(), &values)?;
            }
        }
        for cfg in &cell_cfgs {
            for &c in &plan.recv_cells {
                let values =
                    decode_components(&mut r, cfg).map_err(|e| mismatch(zone, peer, e))?;
                zone.cell_store.set_components(cfg, c.index(), &values)?;
            }
        }
        if r.remaining() != 0 {
            zone.suspect = true;
            return Err(udm_error!(
                ErrorKind::TransferPlanMismatch,
                "rank {peer} sent {} unexpected trailing bytes",
                r.remaining()
            ));
        }
        stats.peers += 1;
        stats.nodes_updated += plan.recv_nodes.len();
        stats.cells_updated += plan.recv_cells.len();
    }

    tracing::debug!(
        rank = me,
        zone = zone.id(),
        peers = stats.peers,
        nodes = stats.nodes_updated,
        cells = stats.cells_updated,
        "ghost fields transferred"
    );
    Ok(stats)
}

fn mismatch(zone: &mut Zone, peer: RankNo, e: crate::error::UdmError) -> crate::error::UdmError {
    zone.suspect = true;
    udm_error!(
        ErrorKind::TransferPlanMismatch,
        "malformed transfer payload from rank {peer}: {e}"
    )
}
