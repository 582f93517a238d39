//! Property tests for the contractual postconditions of every stage.

mod support;

use raybin::validation::check_session;
use raybin::{
    prepare, prepare_with_queries, CellOrdering, Point3, PrepConfig, QuerySet, SearchMode,
    SortSession, UNCLASSIFIED,
};
use support::points::{bimodal_points, jittered_queries, uniform_cube_points};

#[test]
fn test_all_orderings_produce_valid_sessions() {
    let points = uniform_cube_points(1000, 6.0, 101);
    let queries = jittered_queries(&points[..500], 0.4, 102);

    for ordering in [
        CellOrdering::Morton,
        CellOrdering::Raster,
        CellOrdering::OneDimensional,
        CellOrdering::None,
    ] {
        let grid_ordering = matches!(ordering, CellOrdering::Morton | CellOrdering::Raster);
        for partition in [true, false] {
            if partition && !grid_ordering {
                continue;
            }
            let config = PrepConfig {
                radius: 1.0,
                cell_ratio: 3.0,
                k: 8,
                ordering,
                partition,
                ..PrepConfig::default()
            };

            let aliased = prepare(&points, &config).unwrap();
            let report = check_session(&aliased);
            assert!(
                report.is_valid(),
                "aliased {:?} partition={}: {:?}",
                ordering,
                partition,
                report
            );

            let distinct = prepare_with_queries(&points, &queries, &config).unwrap();
            let report = check_session(&distinct);
            assert!(
                report.is_valid(),
                "distinct {:?} partition={}: {:?}",
                ordering,
                partition,
                report
            );
        }
    }
}

#[test]
fn test_counts_offsets_and_permutation() {
    let points = uniform_cube_points(2000, 7.0, 111);
    let config = PrepConfig {
        radius: 1.0,
        cell_ratio: 3.0,
        k: 8,
        ..PrepConfig::default()
    };
    let session = prepare(&points, &config).unwrap();

    let counts = session.cell_counts();
    let offsets = session.cell_offsets();
    assert_eq!(counts.iter().sum::<u32>() as usize, 2000);
    assert_eq!(counts.len(), offsets.len());

    let mut running = 0u32;
    for (i, (&offset, &count)) in offsets.iter().zip(counts.iter()).enumerate() {
        assert_eq!(offset, running, "offset mismatch at cell {}", i);
        running += count;
        if i + 1 < offsets.len() {
            assert_eq!(offset + count, offsets[i + 1]);
        }
    }

    let perm = session.point_permutation();
    let mut seen = vec![false; perm.len()];
    for &p in perm {
        assert!(!seen[p as usize], "permutation repeats {}", p);
        seen[p as usize] = true;
    }
    assert!(seen.iter().all(|&s| s));
}

#[test]
fn test_masks_bounded_by_sentinel() {
    let points = bimodal_points(1500, 8.0, 0.4, 121);
    let config = PrepConfig {
        radius: 1.0,
        cell_ratio: 4.0,
        k: 16,
        ..PrepConfig::default()
    };
    let session = prepare(&points, &config).unwrap();
    let class = session.classification().unwrap();

    let sentinel = class.sentinel();
    for &mask in &class.cell_masks {
        assert!(mask == UNCLASSIFIED || (0..=sentinel).contains(&mask));
    }
    // The dense cluster gives at least one cell a cheap class, the sparse
    // background pushes others toward the fallback.
    assert!(class.cell_masks.iter().any(|&m| m == 0));
}

#[test]
fn test_sentinel_only_when_threshold_unreachable() {
    // Far-apart single points with a large threshold: no shell expansion
    // can ever collect enough candidates, so every occupied cell must
    // fall back to the full search class, and batching degenerates to one
    // full-radius batch.
    let points: Vec<Point3> = (0..20)
        .map(|i| Point3::new(i as f32 * 5.0, 0.5, 0.5))
        .collect();
    let config = PrepConfig {
        radius: 1.0,
        cell_ratio: 4.0,
        k: 64,
        ..PrepConfig::default()
    };
    let session = prepare(&points, &config).unwrap();
    let class = session.classification().unwrap();

    for &mask in &class.cell_masks {
        assert!(mask == UNCLASSIFIED || mask == class.sentinel());
    }
    assert_eq!(session.batches().len(), 1);
    assert_eq!(session.batches()[0].launch_radius, 1.0);
    assert_eq!(session.batches()[0].len(), 20);
}

#[test]
fn test_knn_radii_dominate_radius_mode() {
    let points = bimodal_points(1500, 8.0, 0.4, 131);
    let base = PrepConfig {
        radius: 1.0,
        cell_ratio: 4.0,
        k: 8,
        ..PrepConfig::default()
    };
    let radius_session = prepare(&points, &base).unwrap();
    let knn_config = PrepConfig {
        mode: SearchMode::Knn,
        ..base
    };
    let knn_session = prepare(&points, &knn_config).unwrap();

    // Same data, same masks: batch boundaries agree, and the k-NN launch
    // radius carries the sqrt(2) inflation on every non-final batch.
    assert_eq!(radius_session.batches().len(), knn_session.batches().len());
    let n = radius_session.batches().len();
    for (i, (rb, kb)) in radius_session
        .batches()
        .iter()
        .zip(knn_session.batches().iter())
        .enumerate()
    {
        assert_eq!(rb.mask_upper, kb.mask_upper);
        assert_eq!(rb.len(), kb.len());
        if i + 1 < n {
            let inflated = rb.launch_radius * std::f32::consts::SQRT_2;
            assert!((kb.launch_radius - inflated).abs() < 1e-6);
        } else {
            assert_eq!(rb.launch_radius, 1.0);
            assert_eq!(kb.launch_radius, 1.0);
        }
    }
}

#[test]
fn test_session_value_api_matches_convenience_entry() {
    let points = uniform_cube_points(300, 5.0, 141);
    let config = PrepConfig {
        radius: 1.0,
        cell_ratio: 2.0,
        k: 4,
        ..PrepConfig::default()
    };

    let via_fn = prepare(&points, &config).unwrap();

    let owned: Vec<Point3> = points.clone();
    let mut via_session = SortSession::new(owned, QuerySet::SamePoints, config).unwrap();
    via_session.prepare().unwrap();
    // prepare() is one run per session; a second call must not re-sort.
    via_session.prepare().unwrap();

    assert_eq!(via_fn.points(), via_session.points());
    assert_eq!(via_fn.batches().len(), via_session.batches().len());
    assert_eq!(
        via_fn.point_permutation(),
        via_session.point_permutation()
    );
}
