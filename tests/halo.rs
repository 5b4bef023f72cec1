//! Two-rank ghost layer: halo construction, plans, and the pair validator.

use std::sync::Arc;
use udmesh::testing::*;
use udmesh::*;

fn rebuilt_pair_model(rank: RankNo, transport: LocalExchange) -> Model {
    let mut model = Model::new(Arc::new(transport));
    let zone_id = model.create_zone().unwrap();
    *model.zone_mut(zone_id).unwrap() = overlapping_hex_pair(rank);
    model.rebuild().unwrap();
    model
}

#[test]
fn split_grid_builds_the_documented_halo() {
    let results = run_ranks(2, |rank, transport| {
        let model = rebuilt_pair_model(rank, transport);
        let zone = model.zone(1).unwrap();

        assert_eq!(zone.real_node_count(), 27);
        assert_eq!(zone.real_cell_count(), 8);
        // the peer's far node plane and its full cell layer
        assert_eq!(zone.virtual_node_count(), 9);
        assert_eq!(zone.virtual_cell_count(), 8);

        assert_dense_ids(zone);
        assert_real_prefix(zone);
        assert_incidence_symmetric(zone);
        assert_ghost_ownership(zone);
        zone.debug_validate().unwrap();

        // ghosts sit on the far side of the overlap
        let ghost_x: Vec<f64> = zone
            .iter_virtual_nodes()
            .map(|n| n.coordinates()[0])
            .collect();
        let expected = if rank == 0 { 3.0 } else { 0.0 };
        assert!(ghost_x.iter().all(|&x| x == expected));

        model.debug_validate().unwrap();

        // the debug reports mirror the ghost layer and the pair index
        let ghosts = zone.virtual_cells_report();
        assert_eq!(ghosts.cells.len(), 8);
        assert!(ghosts.cells.iter().all(|c| c.owner_rank == 1 - rank));
        assert_eq!(zone.rank_connectivity().report().triplets.len(), 18);

        zone.summary()
    });
    assert_eq!(results[0].virtual_nodes, 9);
    assert_eq!(results[1].virtual_cells, 8);
}

#[test]
fn halo_plans_are_positionally_symmetric() {
    let results = run_ranks(2, |rank, transport| {
        let model = rebuilt_pair_model(rank, transport);
        let zone = model.zone(1).unwrap();
        let plans = zone.halo_plans().expect("rebuild caches plans");
        assert_eq!(plans.generation, zone.generation());
        let peer = plans.peer(1 - rank).expect("the peer has a plan");
        (
            peer.send_nodes.len(),
            peer.send_cells.len(),
            peer.recv_nodes.len(),
            peer.recv_cells.len(),
        )
    });
    let (send_n0, send_c0, recv_n0, recv_c0) = results[0];
    let (send_n1, send_c1, recv_n1, recv_c1) = results[1];
    assert_eq!(send_n0, recv_n1);
    assert_eq!(send_c0, recv_c1);
    assert_eq!(send_n1, recv_n0);
    assert_eq!(send_c1, recv_c0);
    assert_eq!(recv_n0, 9);
    assert_eq!(recv_c0, 8);
}

#[test]
fn validator_accepts_mutual_pairs_and_rejects_one_sided_ones() {
    // mutual pairing passes on both ranks
    let ok = run_ranks(2, |rank, transport| {
        let zone = overlapping_hex_pair(rank);
        validate_rank_connectivity(&zone, &transport).is_ok()
    });
    assert!(ok.iter().all(|&v| v));

    // a claim with no inverse fails on the rank that receives it
    let results = run_ranks(2, |rank, transport| {
        let mut zone = Zone::new(1, rank);
        build_hex_zone(&mut zone, [2, 2, 2], [rank as f64, 0.0, 0.0], [1.0; 3]);
        if rank == 0 {
            zone.insert_rank_connectivity(LocalId::new(2), 1, LocalId::new(1))
                .unwrap();
        }
        validate_rank_connectivity(&zone, &transport)
    });
    assert!(results.iter().any(|r| r.is_err()));
    let err = results
        .iter()
        .find_map(|r| r.as_ref().err())
        .expect("one rank sees the asymmetry");
    assert_eq!(err.kind(), ErrorKind::RankConnectivityMismatch);
}
