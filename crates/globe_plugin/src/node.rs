//! Node - the materialized, in-memory form of one tile.
//!
//! Positions are stored as f32 offsets from the node centroid so that
//! single-precision math stays well conditioned far from the origin; the
//! centroid itself is double precision. The bounding sphere depends on the
//! vertical scale and carries the frame at which it was last computed.

use std::sync::Mutex;

use glam::{DVec3, Vec3};

use crate::constants::{TILE_RESOLUTION, TILE_SAMPLES};
use crate::frame::FrameContext;
use crate::quadtree_file::{ColorLayer, DemLayer, TileIndex, TileRecord};
use crate::scope::Scope;
use crate::tree_index::TreeIndex;

/// Bounding sphere stamped with the vertical-scale epoch it was computed at.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BoundingSphere {
  pub center: DVec3,
  pub radius: f64,
  /// Frame at which this sphere was computed; compare against the clock's
  /// `last_scale_frame` to detect staleness.
  pub scale_frame: u64,
}

/// Runtime tile state.
pub struct Node {
  pub index: TreeIndex,
  pub scope: Scope,
  /// Centroid of the tile geometry on the spheroid surface.
  pub centroid: DVec3,
  /// `R*R` positions relative to the centroid, row-major, lower row first.
  pub offsets: Vec<Vec3>,
  /// `R*R` elevation samples in meters.
  pub heights: Vec<f32>,
  /// `R*R` RGB samples.
  pub colors: Vec<[u8; 3]>,
  /// Elevation value range of this tile.
  pub elevation_range: (f32, f32),
  /// On-disk address of this tile in the elevation file.
  pub dem_tile: TileIndex,
  /// On-disk address of this tile in the color file.
  pub color_tile: TileIndex,
  /// On-disk addresses of the four elevation children.
  pub child_dem_tiles: [TileIndex; 4],
  /// On-disk addresses of the four color children.
  pub child_color_tiles: [TileIndex; 4],
  /// Largest offset magnitude; makes bounding recomputation O(1).
  max_offset: f64,
  bounding: Mutex<BoundingSphere>,
}

impl Node {
  /// Build a node from its scope and the tile records of the two layers.
  /// Either layer may be absent; absent elevation is flat zero, absent
  /// color is black.
  pub fn from_tiles(
    index: TreeIndex,
    scope: Scope,
    dem_tile: TileIndex,
    dem: Option<&TileRecord<DemLayer>>,
    color_tile: TileIndex,
    color: Option<&TileRecord<ColorLayer>>,
    ctx: &FrameContext,
  ) -> Self {
    let centroid = scope.centroid();

    let mut offsets = Vec::with_capacity(TILE_SAMPLES);
    let mut max_offset = 0.0_f64;
    let denom = (TILE_RESOLUTION - 1) as f64;
    for y in 0..TILE_RESOLUTION {
      for x in 0..TILE_RESOLUTION {
        let p = scope.grid_point(x as f64 / denom, y as f64 / denom);
        let offset = p - centroid;
        max_offset = max_offset.max(offset.length());
        offsets.push(offset.as_vec3());
      }
    }

    let heights = match dem {
      Some(record) => record.samples.clone(),
      None => vec![0.0; TILE_SAMPLES],
    };
    let elevation_range = match dem {
      Some(record) => (record.header.min, record.header.max),
      None => (0.0, 0.0),
    };
    let colors = match color {
      Some(record) => record.samples.clone(),
      None => vec![[0, 0, 0]; TILE_SAMPLES],
    };

    let node = Self {
      index,
      scope,
      centroid,
      offsets,
      heights,
      colors,
      elevation_range,
      dem_tile,
      color_tile,
      child_dem_tiles: dem.map(|r| r.children).unwrap_or([TileIndex::INVALID; 4]),
      child_color_tiles: color.map(|r| r.children).unwrap_or([TileIndex::INVALID; 4]),
      max_offset,
      bounding: Mutex::new(BoundingSphere {
        center: centroid,
        radius: 0.0,
        scale_frame: 0,
      }),
    };
    node.update_bounding(ctx.vertical_scale, ctx.frame);
    node
  }

  /// True if child `i` has a tile on disk in at least one layer.
  pub fn has_child_tiles(&self, i: usize) -> bool {
    self.child_dem_tiles[i].is_valid() || self.child_color_tiles[i].is_valid()
  }

  pub fn has_any_child_tiles(&self) -> bool {
    (0..4).any(|i| self.has_child_tiles(i))
  }

  /// True if every child has a tile on disk in at least one layer.
  pub fn all_children_on_disk(&self) -> bool {
    (0..4).all(|i| self.has_child_tiles(i))
  }

  /// World position of grid sample `(x, y)` on the spheroid surface.
  pub fn grid_position(&self, x: usize, y: usize) -> DVec3 {
    self.centroid + self.offsets[y * TILE_RESOLUTION + x].as_dvec3()
  }

  /// Elevation sample at `(x, y)`.
  pub fn height_at(&self, x: usize, y: usize) -> f32 {
    self.heights[y * TILE_RESOLUTION + x]
  }

  /// Corners of grid cell `(x, y)`, extruded along the outward normal by
  /// the stored elevations times `vertical_scale`. Order:
  /// `(x,y)`, `(x+1,y)`, `(x,y+1)`, `(x+1,y+1)`.
  pub fn cell_corners(&self, x: usize, y: usize, vertical_scale: f64) -> [DVec3; 4] {
    debug_assert!(x + 1 < TILE_RESOLUTION && y + 1 < TILE_RESOLUTION);
    let at = |cx: usize, cy: usize| {
      let p = self.grid_position(cx, cy);
      let h = self.height_at(cx, cy) as f64;
      p + p.normalize() * (h * vertical_scale)
    };
    [at(x, y), at(x + 1, y), at(x, y + 1), at(x + 1, y + 1)]
  }

  /// Current bounding sphere.
  pub fn bounding(&self) -> BoundingSphere {
    *self.bounding.lock().unwrap()
  }

  /// Frame the bounding sphere was last computed at.
  pub fn bounding_scale_frame(&self) -> u64 {
    self.bounding.lock().unwrap().scale_frame
  }

  /// Recompute the bounding sphere for the given vertical scale and stamp
  /// it with `frame`.
  pub fn update_bounding(&self, vertical_scale: f64, frame: u64) {
    let (min, max) = self.elevation_range;
    let vertical = (min.abs().max(max.abs()) as f64) * vertical_scale.abs();
    let mut bounding = self.bounding.lock().unwrap();
    bounding.center = self.centroid;
    bounding.radius = self.max_offset + vertical;
    bounding.scale_frame = frame;
  }
}

#[cfg(test)]
#[path = "node_test.rs"]
mod node_test;
