use std::sync::Arc;

use crate::cache::CacheRequest;
use crate::constants::SPHEROID_RADIUS;
use crate::data_manager::DataManager;
use crate::frame::FrameClock;
use crate::polyhedron::Polyhedron;
use crate::test_utils::{build_toy_dataset, stage};
use crate::tree_index::TreeIndex;

use super::{fetch_one, FetchOutcome};

#[test]
fn test_fetch_one_materializes_child() {
  let dataset = build_toy_dataset([true; 4], 0.0, 500.0);
  let mut staged = stage(&dataset, 64, &[]);
  let root = TreeIndex::root(0);

  let outcome = fetch_one(
    &staged.cache,
    &staged.clock,
    &mut staged.store,
    &CacheRequest::new(2.0, root, 1),
  );
  assert_eq!(outcome, FetchOutcome::Loaded(root.down(1)));

  let node = staged.cache.lookup(root.down(1)).expect("child not cached");
  assert_eq!(node.elevation_range, (500.0, 500.0));
  assert_eq!(node.index, root.down(1));
  // Child scope nests inside the parent scope.
  let parent = staged.cache.lookup(root).unwrap();
  assert!(parent.scope.contains(node.scope.centroid(), 1e-9));
}

#[test]
fn test_fetch_one_without_disk_tile_fails() {
  let dataset = build_toy_dataset([true, false, true, true], 0.0, 500.0);
  let mut staged = stage(&dataset, 64, &[]);
  let root = TreeIndex::root(0);

  let outcome = fetch_one(
    &staged.cache,
    &staged.clock,
    &mut staged.store,
    &CacheRequest::new(2.0, root, 1),
  );
  assert_eq!(outcome, FetchOutcome::Failed(root.down(1)));
  assert!(staged.cache.find_cached(root.down(1)).is_none());
}

#[test]
fn test_fetch_one_is_idempotent() {
  let dataset = build_toy_dataset([true; 4], 0.0, 500.0);
  let mut staged = stage(&dataset, 64, &[0]);
  let root = TreeIndex::root(0);
  let before = staged.cache.len();

  let outcome = fetch_one(
    &staged.cache,
    &staged.clock,
    &mut staged.store,
    &CacheRequest::new(1.0, root, 0),
  );
  assert_eq!(outcome, FetchOutcome::Loaded(root.down(0)));
  assert_eq!(staged.cache.len(), before);
}

#[test]
fn test_saturated_cache_fails_request() {
  // Exactly room for the roots, nothing else; every root was touched this
  // frame, so no stream buffer qualifies.
  let dataset = build_toy_dataset([true; 4], 0.0, 500.0);
  let mut staged = stage(&dataset, 30, &[]);
  let root = TreeIndex::root(0);

  let outcome = fetch_one(
    &staged.cache,
    &staged.clock,
    &mut staged.store,
    &CacheRequest::new(9.0, root, 0),
  );
  assert_eq!(outcome, FetchOutcome::Failed(root.down(0)));
  // Every root survived.
  for patch in 0..30u8 {
    assert!(staged.cache.find_cached(TreeIndex::root(patch)).is_some());
  }
}

#[test]
fn test_background_worker_round_trip() {
  let dataset = build_toy_dataset([true; 4], 0.0, 500.0);
  let polyhedron = Arc::new(Polyhedron::triacontahedron(SPHEROID_RADIUS));
  let cache = Arc::new(crate::cache::TileCache::new(64));
  let clock = FrameClock::new();

  let mut manager = DataManager::open(
    &dataset.dem.path,
    Some(dataset.color.path.as_path()),
    polyhedron,
  )
  .unwrap();
  manager.load_roots(&cache, &clock).unwrap();
  let fetcher = manager.start_fetcher(cache.clone(), clock.clone());

  let root = TreeIndex::root(0);
  let frame = clock.advance();
  fetcher.submit(
    frame,
    vec![
      CacheRequest::new(2.0, root, 0),
      CacheRequest::new(4.0, root, 3),
      // Duplicate at lower priority must be merged away, not double-fetched.
      CacheRequest::new(1.0, root, 3),
    ],
  );

  let mut loaded = std::collections::HashSet::new();
  for _ in 0..2000 {
    for outcome in fetcher.drain_completed() {
      if let FetchOutcome::Loaded(index) = outcome {
        loaded.insert(index);
      }
    }
    if loaded.len() >= 2 {
      break;
    }
    std::thread::sleep(std::time::Duration::from_millis(1));
  }

  assert!(loaded.contains(&root.down(0)));
  assert!(loaded.contains(&root.down(3)));
  assert!(cache.lookup(root.down(0)).is_some());
  assert!(cache.lookup(root.down(3)).is_some());
  assert!(cache.lookup(root.down(1)).is_none());
}

#[test]
fn test_newer_batch_purges_stale_requests() {
  let dataset = build_toy_dataset([true; 4], 0.0, 500.0);
  let polyhedron = Arc::new(Polyhedron::triacontahedron(SPHEROID_RADIUS));
  let cache = Arc::new(crate::cache::TileCache::new(64));
  let clock = FrameClock::new();

  let mut manager = DataManager::open(
    &dataset.dem.path,
    Some(dataset.color.path.as_path()),
    polyhedron,
  )
  .unwrap();
  manager.load_roots(&cache, &clock).unwrap();
  let fetcher = manager.start_fetcher(cache.clone(), clock.clone());

  let root = TreeIndex::root(0);
  // Old frame requests child 1, a newer frame only re-issues child 2. The
  // worker may or may not have started child 1 already (in-flight reads
  // complete), but child 2 must arrive.
  fetcher.submit(3, vec![CacheRequest::new(1.0, root, 1)]);
  fetcher.submit(4, vec![CacheRequest::new(1.0, root, 2)]);

  let mut done = false;
  for _ in 0..2000 {
    fetcher.drain_completed();
    if cache.lookup(root.down(2)).is_some() {
      done = true;
      break;
    }
    std::thread::sleep(std::time::Duration::from_millis(1));
  }
  assert!(done, "request from the newer frame never completed");
}
