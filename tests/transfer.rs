//! Ghost-field transfer: fidelity, constants, and plan staleness.

use std::sync::Arc;
use udmesh::testing::*;
use udmesh::*;

fn pair_model_with_pressure(rank: RankNo, transport: LocalExchange) -> Model {
    let mut model = Model::new(Arc::new(transport));
    let zone_id = model.create_zone().unwrap();
    *model.zone_mut(zone_id).unwrap() = overlapping_hex_pair(rank);
    model
        .zone_mut(zone_id)
        .unwrap()
        .register_solution(SolutionConfig::scalar(
            "Pressure",
            GridLocation::Vertex,
            DataType::RealSingle,
        ));
    model
}

#[test]
fn transfer_writes_owner_values_into_exactly_the_ghost_slots() {
    let results = run_ranks(2, |rank, transport| {
        let mut model = pair_model_with_pressure(rank, transport);
        model.rebuild().unwrap();

        // the owner stamps every real node; ghosts stay at the default
        if rank == 0 {
            let zone = model.zone_mut(1).unwrap();
            let real: Vec<LocalId> = zone.iter_real_nodes().map(|n| n.id()).collect();
            for n in real {
                zone.set_node_solution(n, "Pressure", 1.0f64).unwrap();
            }
        }

        let stats = model.transfer_virtual_cells().unwrap();
        let zone = model.zone(1).unwrap();
        let ghost_values: Vec<f32> = zone
            .iter_virtual_nodes()
            .map(|n| zone.get_node_solution::<f32>(n.id(), "Pressure").unwrap())
            .collect();
        let real_values: Vec<f32> = zone
            .iter_real_nodes()
            .map(|n| zone.get_node_solution::<f32>(n.id(), "Pressure").unwrap())
            .collect();
        (stats[0], ghost_values, real_values)
    });

    let (stats0, ghosts0, reals0) = &results[0];
    let (stats1, ghosts1, reals1) = &results[1];

    // rank 1 sees 1.0 on exactly its nine ghosts, its own nodes untouched
    assert_eq!(ghosts1.len(), 9);
    assert!(ghosts1.iter().all(|&v| v == 1.0));
    assert!(reals1.iter().all(|&v| v == 0.0));
    assert_eq!(stats1.nodes_updated, 9);
    assert_eq!(stats1.cells_updated, 8);

    // rank 0 keeps its own values and receives rank 1's defaults
    assert!(reals0.iter().all(|&v| v == 1.0));
    assert!(ghosts0.iter().all(|&v| v == 0.0));
    assert_eq!(stats0.peers, 1);
}

#[test]
fn vector_and_cell_fields_travel_and_constants_do_not() {
    let results = run_ranks(2, |rank, transport| {
        let mut model = pair_model_with_pressure(rank, transport);
        {
            let zone = model.zone_mut(1).unwrap();
            zone.register_solution(SolutionConfig::vector(
                "Velocity",
                GridLocation::Vertex,
                DataType::RealDouble,
                3,
            ));
            zone.register_solution(SolutionConfig::scalar(
                "Density",
                GridLocation::CellCenter,
                DataType::RealDouble,
            ));
            zone.register_solution(
                SolutionConfig::scalar("CellId", GridLocation::CellCenter, DataType::LongInteger)
                    .constant(),
            );
        }
        model.rebuild().unwrap();

        {
            let zone = model.zone_mut(1).unwrap();
            let nodes: Vec<LocalId> = zone.iter_real_nodes().map(|n| n.id()).collect();
            for n in nodes {
                let stamp = rank as f64 + 1.0;
                zone.set_node_solutions(n, "Velocity", &[stamp, 2.0 * stamp, 3.0 * stamp])
                    .unwrap();
            }
            let cells: Vec<LocalId> = zone.iter_real_cells().map(|c| c.id()).collect();
            for c in cells {
                zone.set_cell_solution(c, "Density", 10.0 * (rank as f64 + 1.0))
                    .unwrap();
                zone.set_cell_solution(c, "CellId", c.get() as i64).unwrap();
            }
        }

        model.transfer_virtual_cells().unwrap();
        let zone = model.zone(1).unwrap();
        let peer_stamp = (1 - rank) as f64 + 1.0;
        for node in zone.iter_virtual_nodes() {
            assert_eq!(
                zone.get_node_solutions::<f64>(node.id(), "Velocity").unwrap(),
                vec![peer_stamp, 2.0 * peer_stamp, 3.0 * peer_stamp]
            );
        }
        for cell in zone.iter_virtual_cells() {
            assert_eq!(
                zone.get_cell_solution::<f64>(cell.id(), "Density").unwrap(),
                10.0 * peer_stamp
            );
            // the constant field is skipped by transfers: the owner stamped
            // it after the halo was built, so the ghost still reads the
            // default
            assert_eq!(
                zone.get_cell_solution::<i64>(cell.id(), "CellId").unwrap(),
                0
            );
        }
        zone.virtual_cell_count()
    });
    assert!(results.iter().all(|&c| c == 8));
}

#[test]
fn transfer_without_a_rebuild_fails_with_a_plan_mismatch() {
    let transport = LocalExchange::world(1).remove(0);
    let mut zone = Zone::new(1, 0);
    build_hex_zone(&mut zone, [2, 2, 2], [0.0; 3], [1.0; 3]);
    let err = udmesh::transfer::transfer_virtual_cells(&mut zone, &transport).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::TransferPlanMismatch);
}

#[test]
fn structural_writes_invalidate_the_transfer_state() {
    let results = run_ranks(2, |rank, transport| {
        let mut model = pair_model_with_pressure(rank, transport);
        model.rebuild().unwrap();
        model.zone_mut(1).unwrap().insert_node(9.0, 9.0, 9.0);
        model.transfer_virtual_cells().unwrap_err().kind()
    });
    assert!(results.iter().all(|&k| k == ErrorKind::InvalidState));
}
