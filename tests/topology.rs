//! Single-rank topology: structured ingest, incidence, fields, sections.

use std::sync::Arc;
use udmesh::testing::*;
use udmesh::*;

fn single_rank_model() -> Model {
    Model::new(Arc::new(LocalExchange::world(1).remove(0)))
}

#[test]
fn hex_grid_ingest_and_incidence() -> udmesh::Result<()> {
    let dims = [3, 3, 3];
    let mut model = single_rank_model();
    let zone_id = model.create_zone()?;
    build_hex_zone(model.zone_mut(zone_id)?, dims, [0.0; 3], [1.0; 3]);
    model.rebuild()?;

    let zone = model.zone(zone_id)?;
    assert_eq!(zone.real_node_count(), 27);
    assert_eq!(zone.real_cell_count(), 8);
    assert_eq!(zone.virtual_node_count(), 0);

    // the center node touches every cell, a corner exactly one
    let center = hex_node_id(dims, 1, 1, 1);
    assert_eq!(zone.node(center)?.incident_cells().len(), 8);
    let corner = hex_node_id(dims, 0, 0, 0);
    assert_eq!(zone.node(corner)?.incident_cells().len(), 1);

    // the center node neighbours every other node of its cells
    assert_eq!(zone.node(center)?.neighbour_nodes().len(), 26);

    assert_dense_ids(zone);
    assert_incidence_symmetric(zone);
    assert_ghost_ownership(zone);
    assert_weights_defined(zone);
    zone.debug_validate()?;
    Ok(())
}

#[test]
fn rebuild_twice_reaches_the_same_canonical_state() -> udmesh::Result<()> {
    let mut model = single_rank_model();
    let zone_id = model.create_zone()?;
    build_hex_zone(model.zone_mut(zone_id)?, [3, 3, 3], [0.0; 3], [1.0; 3]);
    model.rebuild()?;
    let first = model.zone(zone_id)?.clone();
    let first_generation = first.generation();
    model.rebuild()?;
    let second = model.zone(zone_id)?;

    assert_eq!(second.generation(), first_generation + 1);
    assert_eq!(first.node_count(), second.node_count());
    assert_eq!(first.cell_count(), second.cell_count());
    for (a, b) in first.iter_nodes().zip(second.iter_nodes()) {
        assert_eq!(a.global_id(), b.global_id());
        assert_eq!(a.incident_cells(), b.incident_cells());
        assert_eq!(a.neighbour_nodes(), b.neighbour_nodes());
    }
    for (a, b) in first.iter_cells().zip(second.iter_cells()) {
        assert_eq!(a.global_id(), b.global_id());
        assert_eq!(a.node_ids(), b.node_ids());
    }
    Ok(())
}

#[test]
fn field_defaults_arities_and_errors() -> udmesh::Result<()> {
    let mut model = single_rank_model();
    let zone_id = model.create_zone()?;
    build_hex_zone(model.zone_mut(zone_id)?, [2, 2, 2], [0.0; 3], [1.0; 3]);
    let zone = model.zone_mut(zone_id)?;

    zone.register_solution(SolutionConfig::scalar(
        "Pressure",
        GridLocation::Vertex,
        DataType::RealSingle,
    ));
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

    let node = LocalId::new(1);
    let cell = LocalId::new(1);

    // defaults before any write
    assert_eq!(zone.get_node_solution::<f64>(node, "Pressure")?, 0.0);
    assert_eq!(zone.get_cell_solution::<f64>(cell, "Density")?, 0.0);

    zone.set_node_solution(node, "Pressure", 3.25f64)?;
    zone.set_node_solutions(node, "Velocity", &[1.0f64, 2.0, 3.0])?;
    zone.set_cell_solution(cell, "Density", 1.2f64)?;
    assert_eq!(zone.get_node_solution::<f32>(node, "Pressure")?, 3.25);
    assert_eq!(
        zone.get_node_solutions::<f64>(node, "Velocity")?,
        vec![1.0, 2.0, 3.0]
    );

    // arity and registry errors
    let err = zone
        .set_node_solutions(node, "Velocity", &[1.0f64, 2.0])
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ArityMismatch);
    let err = zone.set_node_solution(node, "Velocity", 0.0f64).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ArityMismatch);
    let err = zone.set_node_solution(node, "Entropy", 0.0f64).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::UnknownSolution);
    // a vertex solution is not addressable through cells
    let err = zone.set_cell_solution(cell, "Pressure", 0.0f64).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::UnknownSolution);

    // out-of-range entities
    let err = zone
        .get_node_solution::<f64>(LocalId::new(99), "Pressure")
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidEntity);
    Ok(())
}

#[test]
fn mixed_section_with_one_kind_matches_a_pure_section() -> udmesh::Result<()> {
    let build = |mixed: bool| -> udmesh::Result<Model> {
        let mut model = single_rank_model();
        let zone_id = model.create_zone()?;
        let zone = model.zone_mut(zone_id)?;
        let dims = [2, 2, 2];
        let mut nodes = Vec::new();
        for k in 0..2 {
            for j in 0..2 {
                for i in 0..2 {
                    nodes.push(zone.insert_node(i as f64, j as f64, k as f64));
                }
            }
        }
        let hexa: Vec<LocalId> = (0..8)
            .map(|i| {
                let (di, dj, dk) = [
                    (0, 0, 0),
                    (1, 0, 0),
                    (1, 1, 0),
                    (0, 1, 0),
                    (0, 0, 1),
                    (1, 0, 1),
                    (1, 1, 1),
                    (0, 1, 1),
                ][i];
                hex_node_id(dims, di, dj, dk)
            })
            .collect();
        if mixed {
            let section = zone.create_mixed_section();
            zone.insert_cell_in_section(section, ElementKind::Hexa8, &hexa)?;
        } else {
            zone.insert_cell(ElementKind::Hexa8, &hexa)?;
        }
        model.rebuild()?;
        Ok(model)
    };

    let pure = build(false)?;
    let mixed = build(true)?;
    let a = pure.zone(1)?;
    let b = mixed.zone(1)?;

    assert_eq!(a.real_cell_count(), b.real_cell_count());
    let ca = a.cell(LocalId::new(1))?;
    let cb = b.cell(LocalId::new(1))?;
    assert_eq!(ca.kind(), cb.kind());
    assert_eq!(ca.node_ids(), cb.node_ids());
    for (na, nb) in a.iter_nodes().zip(b.iter_nodes()) {
        assert_eq!(na.incident_cells(), nb.incident_cells());
        assert_eq!(na.neighbour_nodes(), nb.neighbour_nodes());
    }
    // only the section tag differs
    assert_eq!(a.sections()[0].kind(), ElementKind::Hexa8);
    assert_eq!(b.sections()[0].kind(), ElementKind::Mixed);
    Ok(())
}

#[test]
fn virtual_entities_refuse_direct_writes() -> udmesh::Result<()> {
    // build a two-rank halo, then poke at a ghost
    let results = run_ranks(2, |rank, transport| {
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
        model.rebuild().unwrap();
        let zone = model.zone_mut(zone_id).unwrap();
        let ghost = zone
            .iter_virtual_nodes()
            .next()
            .map(|n| n.id())
            .expect("the halo holds ghosts");
        let write = zone.set_node_solution(ghost, "Pressure", 1.0f64);
        let shift = zone.set_node_coordinates(ghost, 0.0, 0.0, 0.0);
        (
            write.unwrap_err().kind(),
            shift.unwrap_err().kind(),
        )
    });
    for (write, shift) in results {
        assert_eq!(write, ErrorKind::InvalidEntity);
        assert_eq!(shift, ErrorKind::InvalidEntity);
    }
    Ok(())
}
