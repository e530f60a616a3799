//! DataManager - owns the per-layer quadtree files, loads the patch roots
//! synchronously at startup, then hands file ownership to the fetcher
//! thread. The system refuses to start unless every patch root is resident.

use std::path::Path;
use std::sync::Arc;

use log::info;

use crate::cache::{BufferId, TileCache};
use crate::error::{GlobeError, Result};
use crate::fetcher::Fetcher;
use crate::frame::{FrameClock, FrameContext};
use crate::node::Node;
use crate::polyhedron::Polyhedron;
use crate::quadtree_file::{ColorLayer, DemLayer, QuadtreeFile, TileIndex};
use crate::scope::Scope;
use crate::tree_index::TreeIndex;

/// The open quadtree files of one dataset. Accessed only from the thread
/// that owns it: the render thread during root loading, the fetcher
/// afterwards.
pub struct TileStore {
  dem: QuadtreeFile<DemLayer>,
  color: Option<QuadtreeFile<ColorLayer>>,
}

impl TileStore {
  /// Read both layers of a tile and materialize the node. Invalid tile
  /// offsets are simply absent layers.
  pub(crate) fn load_node(
    &mut self,
    index: TreeIndex,
    scope: Scope,
    dem_tile: TileIndex,
    color_tile: TileIndex,
    ctx: &FrameContext,
  ) -> Result<Node> {
    let dem = if dem_tile.is_valid() {
      Some(self.dem.read_tile(dem_tile)?)
    } else {
      None
    };
    let color = match (&mut self.color, color_tile.is_valid()) {
      (Some(file), true) => Some(file.read_tile(color_tile)?),
      _ => None,
    };
    Ok(Node::from_tiles(
      index,
      scope,
      dem_tile,
      dem.as_ref(),
      color_tile,
      color.as_ref(),
      ctx,
    ))
  }
}

/// Result of the startup root loads.
pub struct RootLoadSummary {
  pub buffers: Vec<BufferId>,
  /// Union of the root tiles' elevation ranges, as computed from the data.
  pub computed_elevation_range: (f64, f64),
}

pub struct DataManager {
  store: TileStore,
  polyhedron: Arc<Polyhedron>,
}

impl DataManager {
  /// Open the dataset. The color layer is optional; the elevation layer is
  /// not. Headers are validated against the process constants and the
  /// polyhedron.
  pub fn open(
    dem_path: &Path,
    color_path: Option<&Path>,
    polyhedron: Arc<Polyhedron>,
  ) -> Result<Self> {
    let dem = QuadtreeFile::<DemLayer>::open(dem_path)?;
    if dem.num_patches() as usize != polyhedron.num_patches() {
      return Err(GlobeError::format(format!(
        "elevation file has {} patches, polyhedron has {}",
        dem.num_patches(),
        polyhedron.num_patches()
      )));
    }
    let color = match color_path {
      Some(path) => {
        let file = QuadtreeFile::<ColorLayer>::open(path)?;
        if file.num_patches() != dem.num_patches() {
          return Err(GlobeError::format(
            "color and elevation files disagree on patch count",
          ));
        }
        Some(file)
      }
      None => None,
    };
    info!(
      "opened dataset: {} elevation tiles, {} color tiles",
      dem.num_tiles(),
      color.as_ref().map_or(0, |f| f.num_tiles()),
    );
    Ok(Self {
      store: TileStore { dem, color },
      polyhedron,
    })
  }

  /// Load every patch root into the cache, blocking. Fails - rather than
  /// evicting anything - when the cache cannot hold all roots, and when a
  /// patch has no elevation root on disk.
  pub fn load_roots(
    &mut self,
    cache: &TileCache<Node>,
    clock: &FrameClock,
  ) -> Result<RootLoadSummary> {
    let frame = clock.frame();
    let ctx = clock.snapshot();
    let mut buffers = Vec::with_capacity(self.polyhedron.num_patches());
    let mut range = (f64::MAX, f64::MIN);

    for patch in 0..self.polyhedron.num_patches() as u8 {
      let index = TreeIndex::root(patch);
      let dem_tile = self.store.dem.root(patch);
      if !dem_tile.is_valid() {
        return Err(GlobeError::root_load(patch, "no elevation root tile"));
      }
      let color_tile = self
        .store
        .color
        .as_ref()
        .map_or(TileIndex::INVALID, |f| f.root(patch));

      let (id, existed) = cache
        .get_buffer(index, frame)
        .map_err(|err| GlobeError::root_load(patch, err))?;
      if !existed || !cache.is_valid(id) {
        let scope = *self.polyhedron.scope(patch);
        let node = self
          .store
          .load_node(index, scope, dem_tile, color_tile, &ctx)
          .map_err(|err| {
            cache.abort(id);
            GlobeError::root_load(patch, err)
          })?;
        range.0 = range.0.min(node.elevation_range.0 as f64);
        range.1 = range.1.max(node.elevation_range.1 as f64);
        cache.complete(id, node);
      }
      // Roots belong to every frame's working set.
      cache.touch(id, frame);
      buffers.push(id);
    }

    info!(
      "loaded {} patch roots, computed elevation range [{:.1}, {:.1}]",
      buffers.len(),
      range.0,
      range.1
    );
    Ok(RootLoadSummary {
      buffers,
      computed_elevation_range: range,
    })
  }

  /// Move the tile store onto the fetcher thread. Call after `load_roots`.
  pub fn start_fetcher(self, cache: Arc<TileCache<Node>>, clock: FrameClock) -> Fetcher {
    Fetcher::spawn(cache, clock, self.store)
  }

  /// Split off the store without spawning a worker. Test scaffolding for
  /// synchronous fetches.
  #[cfg(test)]
  pub(crate) fn into_store(self) -> TileStore {
    self.store
  }
}

#[cfg(test)]
#[path = "data_manager_test.rs"]
mod data_manager_test;
