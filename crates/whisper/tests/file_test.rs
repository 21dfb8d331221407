//! Integration tests for the whisper database engine.

use std::io::Cursor;
use tempfile::TempDir;
use whisper::{
    AggregationMethod, CreateOptions, Retention, UpdateArg, WhisperError, WhisperFile,
};

/// A fixed "wall clock" aligned to both archive steps used below.
const NOW: u32 = 1_234_567_800;

/// One hour at minute resolution, two hours at 5-minute resolution.
fn classic_archives() -> Vec<Retention> {
    vec![Retention::new(60, 60), Retention::new(300, 24)]
}

fn memory_db(archives: &[Retention], options: &CreateOptions) -> WhisperFile<Cursor<Vec<u8>>> {
    WhisperFile::create_in(Cursor::new(Vec::new()), archives, options).unwrap()
}

#[test]
fn test_create_then_open_header_stability() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("stability.wsp");

    let archives = [Retention::new(10, 100), Retention::new(60, 600)];
    let options = CreateOptions {
        x_files_factor: 0.25,
        aggregation: AggregationMethod::Max,
        ..CreateOptions::default()
    };

    // Create and record the layout.
    {
        let db = WhisperFile::create(&path, &archives, &options).unwrap();
        assert_eq!(db.max_retention(), 36_000);
        assert_eq!(db.archive_count(), 2);
    }

    // Reopen and verify every header value survived.
    {
        let mut db = WhisperFile::open(&path).unwrap();
        assert_eq!(db.max_retention(), 36_000);
        assert_eq!(db.x_files_factor(), 0.25);
        assert_eq!(db.aggregation().unwrap(), AggregationMethod::Max);

        // Offsets follow the cumulative formula.
        let infos = db.archives();
        assert_eq!(infos[0].offset, 16 + 2 * 12);
        assert_eq!(infos[0].seconds_per_point, 10);
        assert_eq!(infos[0].points, 100);
        assert_eq!(infos[1].offset, 40 + 100 * 12);
        assert_eq!(infos[1].retention(), 36_000);
        assert_eq!(infos[1].size(), 600 * 12);
        db.close().unwrap();
    }

    let file_len = std::fs::metadata(&path).unwrap().len();
    assert_eq!(file_len, 40 + 100 * 12 + 600 * 12);
}

#[test]
fn test_single_updates_fetch_and_propagate() {
    let mut db = memory_db(&classic_archives(), &CreateOptions::default());
    let t0 = NOW - 300;

    db.update_at(10.0, t0, NOW).unwrap();
    db.update_at(20.0, t0 + 60, NOW).unwrap();
    db.update_at(30.0, t0 + 120, NOW).unwrap();

    // The fine archive serves the window at minute resolution.
    let result = db.fetch_at(t0 - 1, Some(t0 + 179), NOW).unwrap();
    assert_eq!(result.time_info.step, 60);
    assert_eq!(result.time_info.from_interval, t0);
    assert_eq!(result.time_info.until_interval, t0 + 180);
    assert_eq!(result.values, vec![Some(10.0), Some(20.0), Some(30.0)]);

    // 3 of 5 fine slots are known, clearing the 0.5 factor: the coarse
    // window holds their average.
    let coarse = db.archive(1).unwrap().fetch(t0 - 1, t0 + 1).unwrap();
    assert_eq!(coarse.time_info.step, 300);
    assert_eq!(coarse.values, vec![Some(20.0)]);

    // A zero-length window widens to the next slot.
    let degenerate = db.archive(0).unwrap().fetch(t0 + 5, t0 + 5).unwrap();
    assert_eq!(degenerate.values.len(), 1);
    assert_eq!(degenerate.values[0], Some(20.0));
}

#[test]
fn test_high_x_files_factor_blocks_propagation() {
    let options = CreateOptions {
        x_files_factor: 0.9,
        ..CreateOptions::default()
    };
    let mut db = memory_db(&classic_archives(), &options);
    let t0 = NOW - 300;

    db.update_at(10.0, t0, NOW).unwrap();
    db.update_at(20.0, t0 + 60, NOW).unwrap();
    db.update_at(30.0, t0 + 120, NOW).unwrap();

    // 3 of 5 known slots stay below 0.9: the coarse slot is unwritten.
    let coarse = db.archive(1).unwrap().fetch(t0 - 1, t0 + 1).unwrap();
    assert_eq!(coarse.values, vec![None]);
}

#[test]
fn test_aggregation_methods_consolidate_known_values() {
    let cases = [
        (AggregationMethod::Average, 20.0),
        (AggregationMethod::Sum, 60.0),
        (AggregationMethod::Last, 30.0),
        (AggregationMethod::Max, 30.0),
        (AggregationMethod::Min, 10.0),
    ];
    let t0 = NOW - 300;

    for (method, expected) in cases {
        let options = CreateOptions {
            aggregation: method,
            ..CreateOptions::default()
        };
        let mut db = memory_db(&classic_archives(), &options);
        db.update_many_at(&[(t0, 10.0), (t0 + 60, 20.0), (t0 + 120, 30.0)], NOW)
            .unwrap();

        let coarse = db.archive(1).unwrap().fetch(t0 - 1, t0 + 1).unwrap();
        assert_eq!(coarse.values, vec![Some(expected)], "method {method}");
    }
}

#[test]
fn test_idempotent_write_produces_identical_bytes() {
    let t0 = NOW - 600;

    let mut once = memory_db(&classic_archives(), &CreateOptions::default());
    once.update_at(42.0, t0, NOW).unwrap();

    let mut twice = memory_db(&classic_archives(), &CreateOptions::default());
    twice.update_at(42.0, t0, NOW).unwrap();
    twice.update_at(42.0, t0, NOW).unwrap();

    let once_bytes = once.into_inner().unwrap().into_inner();
    let twice_bytes = twice.into_inner().unwrap().into_inner();
    assert_eq!(once_bytes, twice_bytes);
}

#[test]
fn test_overwrite_same_interval_keeps_latest_value() {
    let mut db = memory_db(&classic_archives(), &CreateOptions::default());
    let t0 = NOW - 600;

    db.update_at(1.0, t0, NOW).unwrap();
    // A timestamp in the same minute quantizes to the same slot.
    db.update_at(2.0, t0 + 30, NOW).unwrap();

    let result = db.fetch_at(t0 - 1, Some(t0 + 1), NOW).unwrap();
    assert_eq!(result.values, vec![Some(2.0)]);
}

#[test]
fn test_ring_wraparound_reclaims_oldest_slot() {
    let mut db = memory_db(&[Retention::new(1, 5)], &CreateOptions::default());
    let t1 = NOW - 2;

    db.update_at(1.0, t1, NOW).unwrap();
    {
        let points = db.archive(0).unwrap().points().unwrap();
        assert_eq!(points[0].interval, t1);
        assert_eq!(points[0].value, 1.0);
    }

    // One full revolution later the same physical slot is reused.
    db.update_at(2.0, t1 + 5, NOW + 5).unwrap();
    let points = db.archive(0).unwrap().points().unwrap();
    assert_eq!(points[0].interval, t1 + 5);
    assert_eq!(points[0].value, 2.0);
    let written: Vec<_> = points.iter().filter(|p| p.interval != 0).collect();
    assert_eq!(written.len(), 1);
}

#[test]
fn test_batch_write_splits_across_ring_seam() {
    let mut db = memory_db(&[Retention::new(1, 5)], &CreateOptions::default());

    // Anchor the base interval at the first slot.
    db.update_at(0.5, NOW - 4, NOW).unwrap();

    // Five consecutive seconds starting three slots past the base: the
    // packed span wraps around the end of the archive.
    let points: Vec<(u32, f64)> = (0..5).map(|i| (NOW - 1 + i, i as f64)).collect();
    db.update_many_at(&points, NOW + 3).unwrap();

    let slots = db.archive(0).unwrap().points().unwrap();
    let intervals: Vec<u32> = slots.iter().map(|p| p.interval).collect();
    assert_eq!(intervals, vec![NOW + 1, NOW + 2, NOW + 3, NOW - 1, NOW]);
    assert_eq!(slots[3].value, 0.0);
    assert_eq!(slots[0].value, 2.0);
}

#[test]
fn test_batch_distributes_points_over_archives() {
    let mut db = memory_db(&classic_archives(), &CreateOptions::default());

    let fresh = NOW - 100;
    let old = NOW - 7000; // covered only by the coarse archive
    let stale = NOW - 8000; // older than the coarsest archive
    db.update_many_at(&[(fresh, 1.0), (old, 2.0), (stale, 3.0)], NOW)
        .unwrap();

    let fine = db.archive(0).unwrap().points().unwrap();
    assert!(fine
        .iter()
        .any(|p| p.interval == fresh - fresh % 60 && p.value == 1.0));

    let coarse = db.archive(1).unwrap().points().unwrap();
    assert!(coarse
        .iter()
        .any(|p| p.interval == old - old % 300 && p.value == 2.0));

    // The stale point was dropped everywhere.
    let stale_interval_fine = stale - stale % 60;
    let stale_interval_coarse = stale - stale % 300;
    assert!(fine.iter().all(|p| p.interval != stale_interval_fine));
    assert!(coarse.iter().all(|p| p.interval != stale_interval_coarse));
}

#[test]
fn test_fetch_clamps_to_retention_horizon() {
    let mut db = memory_db(&[Retention::new(60, 60)], &CreateOptions::default());

    // A window reaching far beyond the horizon clamps instead of failing.
    let result = db.fetch_at(NOW - 100_000, None, NOW).unwrap();
    assert_eq!(result.time_info.from_interval, NOW - 3600 + 60);
    assert_eq!(result.time_info.until_interval, NOW + 60);
    assert_eq!(result.values.len(), 60);
    assert!(result.values.iter().all(Option::is_none));
}

#[test]
fn test_empty_archive_fetches_unknowns() {
    let mut db = memory_db(&classic_archives(), &CreateOptions::default());
    let result = db.fetch_at(NOW - 600, Some(NOW - 300), NOW).unwrap();
    assert_eq!(result.values.len(), 5);
    assert!(result.values.iter().all(Option::is_none));
}

#[test]
fn test_create_refuses_existing_file_without_overwrite() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("existing.wsp");
    let archives = classic_archives();

    {
        let mut db = WhisperFile::create(&path, &archives, &CreateOptions::default()).unwrap();
        db.update_at(1.0, NOW - 60, NOW).unwrap();
    }

    let result = WhisperFile::create(&path, &archives, &CreateOptions::default());
    assert!(matches!(
        result,
        Err(WhisperError::InvalidConfiguration(_))
    ));

    // Overwriting reproduces the initial empty state.
    let options = CreateOptions {
        overwrite: true,
        ..CreateOptions::default()
    };
    let mut db = WhisperFile::create(&path, &archives, &options).unwrap();
    let result = db.fetch_at(NOW - 600, Some(NOW), NOW).unwrap();
    assert!(result.values.iter().all(Option::is_none));
}

#[test]
fn test_sparse_create_matches_dense_layout() {
    let temp_dir = TempDir::new().unwrap();
    let dense_path = temp_dir.path().join("dense.wsp");
    let sparse_path = temp_dir.path().join("sparse.wsp");
    let archives = classic_archives();

    WhisperFile::create(&dense_path, &archives, &CreateOptions::default()).unwrap();
    let sparse_options = CreateOptions {
        sparse: true,
        ..CreateOptions::default()
    };
    WhisperFile::create(&sparse_path, &archives, &sparse_options).unwrap();

    let dense_len = std::fs::metadata(&dense_path).unwrap().len();
    let sparse_len = std::fs::metadata(&sparse_path).unwrap().len();
    assert_eq!(dense_len, sparse_len);

    // A sparse file reads and updates like a dense one.
    let mut db = WhisperFile::open(&sparse_path).unwrap();
    db.update_at(7.0, NOW - 60, NOW).unwrap();
    let result = db.fetch_at(NOW - 61, Some(NOW - 59), NOW).unwrap();
    assert_eq!(result.values, vec![Some(7.0)]);
}

#[test]
fn test_open_rejects_corrupt_and_missing_files() {
    let temp_dir = TempDir::new().unwrap();

    let truncated = temp_dir.path().join("truncated.wsp");
    std::fs::write(&truncated, [0u8; 10]).unwrap();
    assert!(matches!(
        WhisperFile::open(&truncated),
        Err(WhisperError::CorruptFile(_))
    ));

    let missing = temp_dir.path().join("missing.wsp");
    assert!(matches!(
        WhisperFile::open(&missing),
        Err(WhisperError::Io(_))
    ));
}

#[test]
fn test_memory_container_reopens() {
    let mut db = memory_db(&classic_archives(), &CreateOptions::default());
    let t0 = NOW - 120;
    db.update_at(3.25, t0, NOW).unwrap();
    let header = db.header().clone();

    let container = db.into_inner().unwrap();
    let mut reopened = WhisperFile::from_container(container, true).unwrap();
    assert!(reopened.auto_flush());
    assert_eq!(reopened.header(), &header);

    let result = reopened.fetch_at(t0 - 1, Some(t0 + 1), NOW).unwrap();
    assert_eq!(result.values, vec![Some(3.25)]);
}

#[test]
fn test_update_args_on_disk() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("args.wsp");
    let mut db =
        WhisperFile::create(&path, &classic_archives(), &CreateOptions::default()).unwrap();

    // The adapter accepts mixed scalars and nested lists.
    let now = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap()
        .as_secs() as u32;
    let t0 = now - now % 60 - 600;
    db.update_args(&[
        UpdateArg::Num(t0 as f64),
        UpdateArg::Num(1.0),
        UpdateArg::List(vec![(t0 + 60) as f64, 2.0]),
    ])
    .unwrap();

    let result = db.fetch(t0 - 1, Some(t0 + 119)).unwrap();
    assert_eq!(result.values, vec![Some(1.0), Some(2.0)]);
}
