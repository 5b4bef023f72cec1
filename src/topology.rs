//! Incidence derivation: node-to-cell and node-to-node tables.
//!
//! Rebuild calls [`build_incidence`] after the id space is frozen. One pass
//! over the cell table populates each node's incident-cell list; neighbour
//! nodes are then derived as the union of the incident cells' node lists
//! minus the node itself, deduplicated and sorted by local id so the result
//! is deterministic.

use crate::error::Result;
use crate::ids::LocalId;
use crate::zone::Zone;
use std::collections::BTreeMap;

/// Rebuild the node-to-cell and node-to-node incidence tables of `zone`,
/// covering real and virtual entities alike.
pub(crate) fn build_incidence(zone: &mut Zone) {
    let nodes = &mut zone.nodes;
    let cells = &zone.cells;

    for node in nodes.iter_mut() {
        node.cells.clear();
        node.neighbours.clear();
    }
    for cell in cells.iter().filter(|c| !c.removed) {
        for &n in &cell.nodes {
            let list = &mut nodes[n.index()].cells;
            if list.last() != Some(&cell.id) {
                list.push(cell.id);
            }
        }
    }
    for node in nodes.iter_mut() {
        let mut nb: Vec<LocalId> = node
            .cells
            .iter()
            .flat_map(|&c| cells[c.index()].nodes.iter().copied())
            .filter(|&m| m != node.id)
            .collect();
        nb.sort_unstable();
        nb.dedup();
        node.neighbours = nb;
    }
}

/// Cells adjacent to `cell` (sharing at least one node, ghosts included),
/// with the shared-node count per neighbour, sorted by neighbour local id.
///
/// Valid only after incidence has been built.
pub(crate) fn cell_adjacency(zone: &Zone, cell: LocalId) -> Result<Vec<(LocalId, u32)>> {
    let c = zone.cell(cell)?;
    let mut shared: BTreeMap<LocalId, u32> = BTreeMap::new();
    for &n in &c.nodes {
        for &other in zone.node(n)?.incident_cells() {
            if other != cell {
                *shared.entry(other).or_insert(0) += 1;
            }
        }
    }
    Ok(shared.into_iter().collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::element::ElementKind;

    fn quad_strip() -> Zone {
        // 1--2--3
        // |  |  |
        // 4--5--6
        let mut zone = Zone::new(1, 0);
        for (x, y) in [(0.0, 1.0), (1.0, 1.0), (2.0, 1.0), (0.0, 0.0), (1.0, 0.0), (2.0, 0.0)] {
            zone.insert_node(x, y, 0.0);
        }
        let n = |v: u64| LocalId::new(v);
        zone.insert_cell(ElementKind::Quad4, &[n(4), n(5), n(2), n(1)])
            .unwrap();
        zone.insert_cell(ElementKind::Quad4, &[n(5), n(6), n(3), n(2)])
            .unwrap();
        zone
    }

    #[test]
    fn node_cell_incidence_is_symmetric() {
        let mut zone = quad_strip();
        build_incidence(&mut zone);
        for cell in zone.iter_cells() {
            for &n in cell.node_ids() {
                assert!(zone.node(n).unwrap().incident_cells().contains(&cell.id()));
            }
        }
        // the shared edge nodes see both cells
        assert_eq!(zone.node(LocalId::new(5)).unwrap().incident_cells().len(), 2);
        assert_eq!(zone.node(LocalId::new(4)).unwrap().incident_cells().len(), 1);
    }

    #[test]
    fn neighbours_are_sorted_and_deduplicated() {
        let mut zone = quad_strip();
        build_incidence(&mut zone);
        let nb = zone.node(LocalId::new(5)).unwrap().neighbour_nodes().to_vec();
        let expected: Vec<LocalId> = [1u64, 2, 3, 4, 6].iter().map(|&v| LocalId::new(v)).collect();
        assert_eq!(nb, expected);
    }

    #[test]
    fn adjacency_counts_shared_nodes() {
        let mut zone = quad_strip();
        build_incidence(&mut zone);
        let adj = cell_adjacency(&zone, LocalId::new(1)).unwrap();
        assert_eq!(adj, vec![(LocalId::new(2), 2)]);
    }
}
