//! Testing utilities: mesh builders, a multi-rank harness, and assertions.
//!
//! This module backs the crate's own integration tests and is equally
//! usable from downstream solvers:
//!
//! - **Builders**: deterministic structured hex-grid factories
//!   ([`build_hex_zone`]) and a two-rank split-grid fixture
//!   ([`overlapping_hex_pair`]) with its boundary pairing prewired.
//! - **Harness**: [`run_ranks`] runs one closure per simulated rank on
//!   scoped threads over an in-process [`LocalExchange`] communicator, so
//!   collective protocols can be exercised in a plain `#[test]`.
//! - **Assertions**: structural invariants a rebuilt zone must satisfy
//!   ([`assert_dense_ids`], [`assert_incidence_symmetric`], ...).
//!
//! # Example
//!
//! ```
//! use udmesh::testing::*;
//! use udmesh::zone::Zone;
//!
//! let mut zone = Zone::new(1, 0);
//! build_hex_zone(&mut zone, [3, 3, 3], [0.0; 3], [1.0; 3]);
//! assert_eq!(zone.real_node_count(), 27);
//! assert_eq!(zone.real_cell_count(), 8);
//! ```

use crate::element::ElementKind;
use crate::ids::{LocalId, RankNo};
use crate::transport::LocalExchange;
use crate::zone::{Reality, Zone};

// |----------|
// | Builders |
// |----------|

/// Local id of the structured-grid node at 0-based `(i, j, k)`, for a grid
/// with `dims` nodes per axis filled by [`build_hex_zone`].
pub fn hex_node_id(dims: [usize; 3], i: usize, j: usize, k: usize) -> LocalId {
    debug_assert!(i < dims[0] && j < dims[1] && k < dims[2]);
    LocalId::from_index(i + j * dims[0] + k * dims[0] * dims[1])
}

/// Fill `zone` with a structured grid of `dims` nodes per axis and the
/// hexahedral cells connecting them. Returns the cell ids in creation
/// order (`i` fastest, then `j`, then `k`).
pub fn build_hex_zone(
    zone: &mut Zone,
    dims: [usize; 3],
    origin: [f64; 3],
    spacing: [f64; 3],
) -> Vec<LocalId> {
    for k in 0..dims[2] {
        for j in 0..dims[1] {
            for i in 0..dims[0] {
                zone.insert_node(
                    origin[0] + i as f64 * spacing[0],
                    origin[1] + j as f64 * spacing[1],
                    origin[2] + k as f64 * spacing[2],
                );
            }
        }
    }
    let mut cells = Vec::new();
    for k in 0..dims[2].saturating_sub(1) {
        for j in 0..dims[1].saturating_sub(1) {
            for i in 0..dims[0].saturating_sub(1) {
                let n =
                    |di: usize, dj: usize, dk: usize| hex_node_id(dims, i + di, j + dj, k + dk);
                let cell = zone
                    .insert_cell(
                        ElementKind::Hexa8,
                        &[
                            n(0, 0, 0),
                            n(1, 0, 0),
                            n(1, 1, 0),
                            n(0, 1, 0),
                            n(0, 0, 1),
                            n(1, 0, 1),
                            n(1, 1, 1),
                            n(0, 1, 1),
                        ],
                    )
                    .expect("structured grid connectivity is valid");
                cells.push(cell);
            }
        }
    }
    cells
}

/// Two-rank fixture: each rank holds a 3x3x3-node hex grid, offset so the
/// grids overlap by one cell layer in `x`, with the twin pairs of both
/// overlap planes prewired mutually.
///
/// Rank 0 spans `x` in `[0, 2]`, rank 1 spans `[1, 3]`; rank 0's planes
/// `i=1, i=2` coincide with rank 1's planes `i=0, i=1`. After a rebuild
/// each rank ghosts the peer's far node plane (9 nodes) and the peer's
/// full cell layer (8 cells).
pub fn overlapping_hex_pair(rank: RankNo) -> Zone {
    assert!(rank < 2, "the fixture is a two-rank split");
    let dims = [3, 3, 3];
    let mut zone = Zone::new(1, rank);
    build_hex_zone(&mut zone, dims, [rank as f64, 0.0, 0.0], [1.0, 1.0, 1.0]);
    let peer = 1 - rank;
    for k in 0..3 {
        for j in 0..3 {
            // the two overlap planes, seen from each side
            let mine: [usize; 2] = if rank == 0 { [1, 2] } else { [0, 1] };
            let theirs: [usize; 2] = if rank == 0 { [0, 1] } else { [1, 2] };
            for p in 0..2 {
                zone.insert_rank_connectivity(
                    hex_node_id(dims, mine[p], j, k),
                    peer,
                    hex_node_id(dims, theirs[p], j, k),
                )
                .expect("pairing a real boundary node");
            }
        }
    }
    zone
}

/// Two-rank fixture: each rank holds a 3x3x3-node hex grid and the grids
/// touch at a single face plane (rank 0 spans `x` in `[0, 2]`, rank 1 in
/// `[2, 4]`), with the 9 face-node twin pairs prewired mutually.
///
/// Unlike [`overlapping_hex_pair`] no cell exists on both ranks, which is
/// the shape of a genuinely partitioned mesh; use this fixture when cells
/// migrate. After a rebuild each rank ghosts the peer's face-adjacent cell
/// layer (4 cells) and its second node plane (9 nodes).
pub fn face_hex_pair(rank: RankNo) -> Zone {
    assert!(rank < 2, "the fixture is a two-rank split");
    let dims = [3, 3, 3];
    let mut zone = Zone::new(1, rank);
    build_hex_zone(
        &mut zone,
        dims,
        [rank as f64 * 2.0, 0.0, 0.0],
        [1.0, 1.0, 1.0],
    );
    let peer = 1 - rank;
    let (mine, theirs) = if rank == 0 { (2, 0) } else { (0, 2) };
    for k in 0..3 {
        for j in 0..3 {
            zone.insert_rank_connectivity(
                hex_node_id(dims, mine, j, k),
                peer,
                hex_node_id(dims, theirs, j, k),
            )
            .expect("pairing a real boundary node");
        }
    }
    zone
}

/// Materialize a minimal DFI case in a fresh temporary directory: an index
/// file, the process file it references, and two time-slice field files
/// (steps 0 and 10). Returns the directory guard and the index path.
pub fn temp_dfi_case() -> (tempfile::TempDir, std::path::PathBuf) {
    let dir = tempfile::tempdir().expect("temporary directory");
    let index = dir.path().join("index.dfi");
    std::fs::write(
        &index,
        "FileInfo {\n\
         \x20 DFIType       = \"Uns\"\n\
         \x20 DirectoryPath = \"field\"\n\
         \x20 Prefix        = \"duct\"\n\
         }\n\
         FilePath {\n\
         \x20 Process = \"proc.dfi\"\n\
         }\n",
    )
    .expect("index file");
    std::fs::write(
        dir.path().join("proc.dfi"),
        "Domain {\n\
         \x20 CellDimension = 3\n\
         \x20 VertexSize    = 27\n\
         \x20 CellSize      = 8\n\
         }\n\
         MPI {\n\
         \x20 NumberOfRank = 2\n\
         }\n",
    )
    .expect("process file");
    let field = dir.path().join("field");
    std::fs::create_dir_all(&field).expect("field directory");
    std::fs::write(field.join("duct_0000000000_0.cgns"), b"step0").expect("field file");
    std::fs::write(field.join("duct_0000000010_0.cgns"), b"step10").expect("field file");
    (dir, index)
}

// |---------|
// | Harness |
// |---------|

/// Run `f` once per simulated rank over a shared in-process communicator
/// and collect the results in rank order. A panic in any rank propagates.
pub fn run_ranks<T, F>(world: u32, f: F) -> Vec<T>
where
    T: Send,
    F: Fn(RankNo, LocalExchange) -> T + Sync,
{
    use crate::transport::Transport;

    let transports = LocalExchange::world(world);
    let mut results: Vec<Option<T>> = (0..world).map(|_| None).collect();
    std::thread::scope(|scope| {
        for (slot, transport) in results.iter_mut().zip(transports) {
            let f = &f;
            scope.spawn(move || {
                let rank = transport.rank();
                *slot = Some(f(rank, transport));
            });
        }
    });
    results
        .into_iter()
        .map(|r| r.expect("every rank produces a result"))
        .collect()
}

// |------------|
// | Assertions |
// |------------|

/// Assert local ids form a contiguous 1-based range for nodes and cells.
pub fn assert_dense_ids(zone: &Zone) {
    for (index, node) in zone.iter_nodes().enumerate() {
        assert_eq!(node.id().index(), index, "node ids must be dense, 1-based");
    }
    for (index, cell) in zone.iter_cells().enumerate() {
        assert_eq!(cell.id().index(), index, "cell ids must be dense, 1-based");
    }
}

/// Assert every real entity precedes every virtual one.
pub fn assert_real_prefix(zone: &Zone) {
    let mut seen_virtual = false;
    for node in zone.iter_nodes() {
        match node.reality() {
            Reality::Virtual => seen_virtual = true,
            Reality::Real => assert!(!seen_virtual, "real node after a virtual one"),
        }
    }
    let mut seen_virtual = false;
    for cell in zone.iter_cells() {
        match cell.reality() {
            Reality::Virtual => seen_virtual = true,
            Reality::Real => assert!(!seen_virtual, "real cell after a virtual one"),
        }
    }
}

/// Assert node-to-cell incidence is symmetric in both directions.
pub fn assert_incidence_symmetric(zone: &Zone) {
    for cell in zone.iter_cells() {
        for &n in cell.node_ids() {
            let node = zone.node(n).expect("cell references an existing node");
            assert!(
                node.incident_cells().contains(&cell.id()),
                "cell {} lists node {n}, which does not list it back",
                cell.id()
            );
        }
    }
    for node in zone.iter_nodes() {
        for &c in node.incident_cells() {
            let cell = zone.cell(c).expect("node references an existing cell");
            assert!(
                cell.node_ids().contains(&node.id()),
                "node {} lists cell {c}, which does not contain it",
                node.id()
            );
        }
    }
}

/// Assert every ghost entity names a foreign owner and every real entity
/// names this rank.
pub fn assert_ghost_ownership(zone: &Zone) {
    for node in zone.iter_nodes() {
        match node.reality() {
            Reality::Real => assert_eq!(node.global_id().rank, zone.rank()),
            Reality::Virtual => assert_ne!(node.global_id().rank, zone.rank()),
        }
    }
    for cell in zone.iter_cells() {
        match cell.reality() {
            Reality::Real => assert_eq!(cell.global_id().rank, zone.rank()),
            Reality::Virtual => assert_ne!(cell.global_id().rank, zone.rank()),
        }
    }
}

/// Assert every real cell carries a defined partition weight (1.0 unless
/// set explicitly).
pub fn assert_weights_defined(zone: &Zone) {
    for cell in zone.iter_real_cells() {
        assert!(cell.weight().is_finite() && cell.weight() > 0.0);
    }
}

/// Assert two zones hold identical state (entities, fields, pairing,
/// plans).
pub fn assert_zones_equal(a: &Zone, b: &Zone) {
    assert_eq!(a, b, "zones differ");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hex_grid_has_expected_shape() {
        let mut zone = Zone::new(1, 0);
        let cells = build_hex_zone(&mut zone, [3, 3, 3], [0.0; 3], [1.0; 3]);
        assert_eq!(zone.real_node_count(), 27);
        assert_eq!(cells.len(), 8);
        let far = zone.node(hex_node_id([3, 3, 3], 2, 2, 2)).unwrap();
        assert_eq!(far.coordinates(), [2.0, 2.0, 2.0]);
    }

    #[test]
    fn harness_runs_every_rank() {
        let ranks = run_ranks(3, |rank, _transport| rank);
        assert_eq!(ranks, vec![0, 1, 2]);
    }

    #[test]
    fn fixture_pairs_are_mutual() {
        let a = overlapping_hex_pair(0);
        let b = overlapping_hex_pair(1);
        for (node, pairs) in a.rank_connectivity().iter() {
            for &(peer, theirs) in pairs {
                assert_eq!(peer, 1);
                assert!(
                    b.rank_connectivity().pairs_for(theirs).contains(&(0, node)),
                    "pair {node} <-> {theirs} is one-sided"
                );
            }
        }
        assert_eq!(a.rank_connectivity().len(), 18);
        assert_eq!(b.rank_connectivity().len(), 18);
    }
}
