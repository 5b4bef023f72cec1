//! Repartitioning: weighted migration, no-change detection, empty ranks.

use std::sync::Arc;
use udmesh::testing::*;
use udmesh::*;

fn pair_model(rank: RankNo, transport: LocalExchange) -> Model {
    let mut model = Model::new(Arc::new(transport));
    let zone_id = model.create_zone().unwrap();
    *model.zone_mut(zone_id).unwrap() = face_hex_pair(rank);
    model
}

/// Weight the rank-0 cells that touch the y=0 plane, as a skewed load.
fn weight_bottom_cells(zone: &mut Zone, weight: f32) -> usize {
    let heavy: Vec<LocalId> = zone
        .iter_real_cells()
        .filter(|c| {
            c.node_ids()
                .iter()
                .any(|&n| zone.node(n).unwrap().coordinates()[1] == 0.0)
        })
        .map(|c| c.id())
        .collect();
    for &c in &heavy {
        zone.set_partition_weight(c, weight).unwrap();
    }
    heavy.len()
}

#[test]
fn weighted_partition_moves_cells_toward_balance() {
    let results = run_ranks(2, |rank, transport| {
        let mut model = pair_model(rank, transport);
        model.rebuild().unwrap();
        if rank == 0 {
            let heavy = weight_bottom_cells(model.zone_mut(1).unwrap(), 10.0);
            assert!(heavy > 0);
        }
        model
            .partition_params_mut()
            .set_hypergraph(PartitionApproach::Partition);

        let outcome = model.partition(1).unwrap();
        let zone = model.zone(1).unwrap();

        assert_dense_ids(zone);
        assert_real_prefix(zone);
        assert_incidence_symmetric(zone);
        assert_ghost_ownership(zone);
        assert_weights_defined(zone);
        zone.debug_validate().unwrap();
        model.debug_validate().unwrap();

        let weight_sum: f32 = zone.iter_real_cells().map(|c| c.weight()).sum();
        (outcome, zone.real_cell_count(), weight_sum)
    });

    let (outcome0, cells0, weight0) = results[0];
    let (outcome1, cells1, weight1) = results[1];

    // the overloaded rank exports, the light rank imports
    match outcome0 {
        PartitionOutcome::Changed { exported, imported } => {
            assert!(exported > 0);
            assert_eq!(imported, 0);
        }
        PartitionOutcome::NoChange => panic!("the skewed load must move cells"),
    }
    match outcome1 {
        PartitionOutcome::Changed { imported, .. } => assert!(imported > 0),
        PartitionOutcome::NoChange => panic!("the peer must receive cells"),
    }

    // nothing lost, ownership shifted toward weight balance
    assert_eq!(cells0 + cells1, 16);
    assert!(cells0 < 8, "the heavy rank sheds cells (kept {cells0})");
    assert!(cells1 > 8, "the light rank gains cells (kept {cells1})");
    let total = weight0 + weight1;
    assert!((total - 52.0).abs() < 1e-3, "weights survive migration");
    assert!(
        (weight0 - weight1).abs() < 44.0 - 8.0,
        "the imbalance shrinks: {weight0} vs {weight1}"
    );
}

#[test]
fn repeating_a_partition_reports_no_change_and_preserves_state() {
    let results = run_ranks(2, |rank, transport| {
        let mut model = pair_model(rank, transport);
        model.rebuild().unwrap();
        if rank == 0 {
            weight_bottom_cells(model.zone_mut(1).unwrap(), 10.0);
        }

        let first = model.partition(1).unwrap();
        let snapshot = model.zone(1).unwrap().clone();

        let second = model.partition(1).unwrap();
        assert_zones_equal(&snapshot, model.zone(1).unwrap());
        assert_eq!(model.state(), ModelState::Rebuilt);
        (first, second)
    });
    for (first, second) in results {
        assert!(matches!(first, PartitionOutcome::Changed { .. }));
        assert_eq!(second, PartitionOutcome::NoChange);
    }
}

#[test]
fn balanced_load_partitions_to_no_change() {
    let results = run_ranks(2, |rank, transport| {
        let mut model = pair_model(rank, transport);
        model.rebuild().unwrap();
        let before = model.zone(1).unwrap().clone();
        let outcome = model.partition(1).unwrap();
        assert_zones_equal(&before, model.zone(1).unwrap());
        outcome
    });
    assert!(results.iter().all(|&o| o == PartitionOutcome::NoChange));
}

#[test]
fn a_rank_with_no_cells_participates_and_receives_work() {
    let results = run_ranks(2, |rank, transport| {
        let mut model = Model::new(Arc::new(transport));
        let zone_id = model.create_zone().unwrap();
        if rank == 0 {
            build_hex_zone(
                model.zone_mut(zone_id).unwrap(),
                [3, 3, 3],
                [0.0; 3],
                [1.0; 3],
            );
        }
        model.rebuild().unwrap();
        let outcome = model.partition(zone_id).unwrap();
        let zone = model.zone(zone_id).unwrap();
        assert_dense_ids(zone);
        assert_ghost_ownership(zone);
        (outcome, zone.real_cell_count())
    });

    let (outcome0, cells0) = results[0];
    let (outcome1, cells1) = results[1];
    assert!(matches!(outcome0, PartitionOutcome::Changed { .. }));
    assert!(matches!(outcome1, PartitionOutcome::Changed { .. }));
    assert_eq!(cells0 + cells1, 8);
    assert!(cells0 > 0 && cells1 > 0, "both ranks own cells afterwards");
}

#[test]
fn a_globally_empty_zone_partitions_to_no_change() {
    let results = run_ranks(2, |_rank, transport| {
        let mut model = Model::new(Arc::new(transport));
        let zone_id = model.create_zone().unwrap();
        model.rebuild().unwrap();
        model.partition(zone_id).unwrap()
    });
    assert!(results.iter().all(|&o| o == PartitionOutcome::NoChange));
}
