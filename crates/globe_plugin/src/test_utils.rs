//! Shared scaffolding for tests: throwaway dataset files on disk and
//! pre-staged cache states.

use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::cache::{BufferId, TileCache};
use crate::constants::{SPHEROID_RADIUS, TILE_SAMPLES};
use crate::data_manager::{DataManager, TileStore};
use crate::fetcher::fetch_child_for_test;
use crate::frame::FrameClock;
use crate::node::Node;
use crate::polyhedron::Polyhedron;
use crate::quadtree_file::{
  ColorLayer, DemLayer, ElevationRange, QuadtreeFile, TileIndex, TileRecord,
};
use crate::tree_index::TreeIndex;

/// Uniquely named file under the system temp directory, removed on drop.
pub struct TempFile {
  pub path: PathBuf,
}

impl TempFile {
  pub fn new(tag: &str) -> Self {
    static COUNTER: AtomicU64 = AtomicU64::new(0);
    let n = COUNTER.fetch_add(1, Ordering::Relaxed);
    let path = std::env::temp_dir().join(format!(
      "globe_test_{}_{}_{}.qtf",
      std::process::id(),
      tag,
      n
    ));
    Self { path }
  }
}

impl Drop for TempFile {
  fn drop(&mut self) {
    let _ = std::fs::remove_file(&self.path);
  }
}

pub fn uniform_dem(height: f32) -> TileRecord<DemLayer> {
  TileRecord {
    header: ElevationRange {
      min: height,
      max: height,
    },
    samples: vec![height; TILE_SAMPLES],
    children: [TileIndex::INVALID; 4],
  }
}

pub fn uniform_color(rgb: [u8; 3]) -> TileRecord<ColorLayer> {
  TileRecord {
    header: (),
    samples: vec![rgb; TILE_SAMPLES],
    children: [TileIndex::INVALID; 4],
  }
}

/// A 30-patch dataset where every patch has a root tile at `root_height`,
/// and patch 0 additionally has the children selected by `children`, at
/// `child_height`.
pub struct ToyDataset {
  pub dem: TempFile,
  pub color: TempFile,
  pub root_height: f32,
  pub child_height: f32,
}

pub fn build_toy_dataset(children: [bool; 4], root_height: f32, child_height: f32) -> ToyDataset {
  let dem_file = TempFile::new("dem");
  let color_file = TempFile::new("color");

  let mut dem = QuadtreeFile::<DemLayer>::create(&dem_file.path, 30).unwrap();
  let mut color = QuadtreeFile::<ColorLayer>::create(&color_file.path, 30).unwrap();

  // Children of patch 0 first, so the root record can point at them.
  let mut dem_children = [TileIndex::INVALID; 4];
  let mut color_children = [TileIndex::INVALID; 4];
  for (i, &present) in children.iter().enumerate() {
    if present {
      dem_children[i] = dem.append_tile(&uniform_dem(child_height)).unwrap();
      color_children[i] = color.append_tile(&uniform_color([200, 50, 50])).unwrap();
    }
  }

  for patch in 0..30u8 {
    let mut dem_root = uniform_dem(root_height);
    let mut color_root = uniform_color([128, 128, 128]);
    if patch == 0 {
      dem_root.children = dem_children;
      color_root.children = color_children;
    }
    let dem_index = dem.append_tile(&dem_root).unwrap();
    dem.set_root(patch, dem_index).unwrap();
    let color_index = color.append_tile(&color_root).unwrap();
    color.set_root(patch, color_index).unwrap();
  }

  ToyDataset {
    dem: dem_file,
    color: color_file,
    root_height,
    child_height,
  }
}

/// A staged engine state: polyhedron, cache with roots resident, clock, and
/// the still-local tile store for synchronous fetches.
pub struct Staged {
  pub polyhedron: Arc<Polyhedron>,
  pub cache: Arc<TileCache<Node>>,
  pub clock: FrameClock,
  pub store: TileStore,
  pub roots: Vec<BufferId>,
}

/// Open the dataset, load all roots, and synchronously fetch the given
/// children of patch 0.
pub fn stage(dataset: &ToyDataset, capacity: usize, children: &[u8]) -> Staged {
  let polyhedron = Arc::new(Polyhedron::triacontahedron(SPHEROID_RADIUS));
  let cache = Arc::new(TileCache::new(capacity));
  let clock = FrameClock::new();

  let mut manager = DataManager::open(
    &dataset.dem.path,
    Some(dataset.color.path.as_path()),
    polyhedron.clone(),
  )
  .unwrap();
  let summary = manager.load_roots(&cache, &clock).unwrap();
  let mut store = manager.into_store();

  for &child in children {
    fetch_child_for_test(&cache, &clock, &mut store, TreeIndex::root(0), child);
  }

  Staged {
    polyhedron,
    cache,
    clock,
    store,
    roots: summary.buffers,
  }
}
