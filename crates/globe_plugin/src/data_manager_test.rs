use std::sync::Arc;

use crate::cache::TileCache;
use crate::constants::SPHEROID_RADIUS;
use crate::error::GlobeError;
use crate::frame::FrameClock;
use crate::polyhedron::Polyhedron;
use crate::test_utils::{build_toy_dataset, stage};
use crate::tree_index::TreeIndex;

use super::DataManager;

#[test]
fn test_roots_resident_after_load() {
  let dataset = build_toy_dataset([false; 4], 100.0, 0.0);
  let staged = stage(&dataset, 64, &[]);

  assert_eq!(staged.roots.len(), 30);
  for patch in 0..30u8 {
    let id = staged
      .cache
      .find_cached(TreeIndex::root(patch))
      .expect("root missing");
    assert!(staged.cache.is_valid(id));
    let node = staged.cache.data(id).unwrap();
    assert_eq!(node.elevation_range, (100.0, 100.0));
  }
}

#[test]
fn test_computed_range_is_union_of_roots() {
  let dataset = build_toy_dataset([false; 4], -250.0, 0.0);
  let polyhedron = Arc::new(Polyhedron::triacontahedron(SPHEROID_RADIUS));
  let cache = TileCache::new(64);
  let clock = FrameClock::new();

  let mut manager =
    DataManager::open(&dataset.dem.path, Some(dataset.color.path.as_path()), polyhedron).unwrap();
  let summary = manager.load_roots(&cache, &clock).unwrap();
  assert_eq!(summary.computed_elevation_range, (-250.0, -250.0));
}

#[test]
fn test_undersized_cache_fails_loudly() {
  // 30 roots cannot fit a 5-buffer cache: the load must fail with cache
  // saturation instead of silently evicting an earlier root.
  let dataset = build_toy_dataset([false; 4], 0.0, 0.0);
  let polyhedron = Arc::new(Polyhedron::triacontahedron(SPHEROID_RADIUS));
  let cache = TileCache::new(5);
  let clock = FrameClock::new();

  let mut manager =
    DataManager::open(&dataset.dem.path, Some(dataset.color.path.as_path()), polyhedron).unwrap();
  match manager.load_roots(&cache, &clock) {
    Err(GlobeError::RootLoad { patch, reason }) => {
      assert_eq!(patch, 5);
      assert!(reason.contains("saturated"), "unexpected reason: {reason}");
    }
    other => panic!("expected RootLoad failure, got {:?}", other.map(|_| ())),
  }
  // The first five roots are still resident and untouched.
  for patch in 0..5u8 {
    assert!(cache.find_cached(TreeIndex::root(patch)).is_some());
  }
}

#[test]
fn test_open_without_color_layer() {
  let dataset = build_toy_dataset([false; 4], 10.0, 0.0);
  let polyhedron = Arc::new(Polyhedron::triacontahedron(SPHEROID_RADIUS));
  let cache = TileCache::new(64);
  let clock = FrameClock::new();

  let mut manager = DataManager::open(&dataset.dem.path, None, polyhedron).unwrap();
  let summary = manager.load_roots(&cache, &clock).unwrap();
  assert_eq!(summary.buffers.len(), 30);

  let node = cache.lookup(TreeIndex::root(3)).unwrap();
  assert!(node.colors.iter().all(|&c| c == [0, 0, 0]));
}

#[test]
fn test_open_rejects_missing_file() {
  let polyhedron = Arc::new(Polyhedron::triacontahedron(SPHEROID_RADIUS));
  let missing = std::env::temp_dir().join("globe_test_does_not_exist.qtf");
  assert!(DataManager::open(&missing, None, polyhedron).is_err());
}
