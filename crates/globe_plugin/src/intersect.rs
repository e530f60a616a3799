//! Intersector - closest positive ray/terrain hit against the current cut.
//!
//! The walker brackets the ray between the two spherical shells bounding
//! the world elevation range, locates the entry patch, then walks the
//! quadtree of whatever is currently cached: at each node it determines the
//! exit side among the four great-circle edges (skipping the entry side),
//! dispatches into the child containing the entry point via two mid-plane
//! sign tests, and advances across siblings and patch seams with fixed
//! transition tables. Inside a leaf the ray marches the cell grid,
//! testing two elevation-extruded triangles per cell.
//!
//! Strictly read-only: a cache miss falls back to intersecting the present
//! ancestor as a leaf, and no loads are ever requested from this path.

use glam::DVec3;

use crate::cache::TileCache;
use crate::constants::{SPHEROID_RADIUS, TILE_RESOLUTION};
use crate::math::{Ray, Section, Sphere, Triangle};
use crate::node::Node;
use crate::polyhedron::Polyhedron;
use crate::scope::Scope;
use crate::tree_index::TreeIndex;

#[cfg(feature = "debug-intersect")]
use log::trace;

/// Sibling transition: `NEXT_SIBLING[child][exit_side]` gives the adjacent
/// child and the side it is entered through, or `(-1, -1)` when the exit
/// leaves the parent.
const NEXT_SIBLING: [[(i8, i8); 4]; 4] = [
  [(2, 2), (-1, -1), (-1, -1), (1, 1)],
  [(3, 2), (0, 3), (-1, -1), (-1, -1)],
  [(-1, -1), (-1, -1), (0, 0), (3, 1)],
  [(-1, -1), (2, 3), (1, 0), (-1, -1)],
];

/// Cell transition: `NEXT_CELL[exit_side]` gives `(dx, dy, entry_side)`.
const NEXT_CELL: [(i32, i32, usize); 4] = [(0, 1, 2), (-1, 0, 3), (0, -1, 0), (1, 0, 1)];

/// Entry-edge corner pairs per side, oriented for the along-edge parameter.
const ENTRY_EDGE: [[usize; 2]; 4] = [[2, 3], [0, 2], [0, 1], [1, 3]];

/// Patch-seam crossings tolerated before giving up; a ray grazing a shared
/// corner must not loop forever.
const MAX_PATCH_CROSSINGS: usize = 64;

struct NodeStep {
  hit: Option<f64>,
  t_out: f64,
  side_out: Option<usize>,
}

/// Read-only ray walker over the currently cached cut.
pub struct Intersector<'a> {
  cache: &'a TileCache<Node>,
  polyhedron: &'a Polyhedron,
  /// Global elevation range override bounding the world shells.
  elevation_range: (f64, f64),
  vertical_scale: f64,
}

impl<'a> Intersector<'a> {
  pub fn new(
    cache: &'a TileCache<Node>,
    polyhedron: &'a Polyhedron,
    elevation_range: (f64, f64),
    vertical_scale: f64,
  ) -> Self {
    Self {
      cache,
      polyhedron,
      elevation_range,
      vertical_scale,
    }
  }

  /// Closest positive hit parameter, or `None`.
  pub fn intersect(&self, ray: &Ray) -> Option<f64> {
    let outer = Sphere::new(SPHEROID_RADIUS + self.vertical_scale * self.elevation_range.1);
    let (gin, mut gout) = outer.intersect_ray(ray)?;
    if gout < 0.0 {
      return None;
    }
    let inner = Sphere::new(SPHEROID_RADIUS + self.vertical_scale * self.elevation_range.0);
    if let Some(t) = inner.first_hit(ray) {
      gout = t;
    }

    let mut tin = gin.max(0.0);
    if tin > gout {
      return None;
    }

    let mut patch = self.polyhedron.locate(entry_point(ray, tin), 1e-9)?;
    let mut side_in: Option<usize> = None;

    for _ in 0..MAX_PATCH_CROSSINGS {
      let root = self.cache.lookup(TreeIndex::root(patch))?;
      #[cfg(feature = "debug-intersect")]
      trace!("patch {patch} tin {tin:.3} side {side_in:?}");

      let step = self.intersect_node(&root, ray, tin, side_in, gout);
      if step.hit.is_some() {
        return step.hit;
      }

      let side_out = step.side_out?;
      tin = step.t_out;
      if tin > gout {
        return None;
      }
      let link = self.polyhedron.connectivity(patch)[side_out];
      patch = link.patch;
      side_in = Some(link.side as usize);
    }
    None
  }

  fn intersect_node(
    &self,
    node: &Node,
    ray: &Ray,
    tin: f64,
    side_in: Option<usize>,
    gout: f64,
  ) -> NodeStep {
    // Exit: smallest side crossing past the entry parameter.
    let mut t_out = f64::MAX;
    let mut side_out = None;
    for side in 0..4 {
      if Some(side) == side_in {
        continue;
      }
      let [i, j] = Scope::SIDE_CORNERS[side];
      let section = Section::new(node.scope.corners[i], node.scope.corners[j]);
      if let Some(t) = section.intersect_ray(ray) {
        if t > tin && t <= t_out {
          t_out = t;
          side_out = Some(side);
        }
      }
    }
    let miss = |hit: Option<f64>| NodeStep {
      hit,
      t_out,
      side_out,
    };

    // Reject against this node's own elevation shell.
    let shell = Sphere::new(
      SPHEROID_RADIUS + self.vertical_scale * node.elevation_range.1 as f64,
    );
    match shell.intersect_ray(ray) {
      Some((t0, t1)) => {
        if t0 > t_out || t1 < tin {
          return miss(None);
        }
      }
      None => return miss(None),
    }

    if !node.has_any_child_tiles() {
      return miss(self.intersect_leaf(node, ray, tin, side_in, gout));
    }

    // Descend into the child containing the entry point, then march
    // siblings along the ray.
    let mut child = containing_child(&node.scope, entry_point(ray, tin), side_in);
    let mut ctin = tin;
    let mut csin = side_in;
    loop {
      let Some(child_node) = self.cache.lookup(node.index.down(child as u8)) else {
        // Not resident: intersect the present node as a leaf instead.
        // Loads are never requested from here.
        return miss(self.intersect_leaf(node, ray, tin, side_in, gout));
      };

      let step = self.intersect_node(&child_node, ray, ctin, csin, gout);
      if step.hit.is_some() {
        return miss(step.hit);
      }
      let Some(csout) = step.side_out else {
        return miss(None);
      };
      ctin = step.t_out;
      if ctin > gout {
        return miss(None);
      }

      let (next_child, next_side) = NEXT_SIBLING[child][csout];
      if next_child < 0 {
        return miss(None);
      }
      child = next_child as usize;
      csin = Some(next_side as usize);
    }
  }

  fn intersect_leaf(
    &self,
    leaf: &Node,
    ray: &Ray,
    mut param: f64,
    side: Option<usize>,
    gout: f64,
  ) -> Option<f64> {
    let res = TILE_RESOLUTION;
    let mut side = side;

    #[cfg(feature = "debug-intersect")]
    trace!("leaf {} param {param:.3} side {side:?}", leaf.index);

    let (mut cell_x, mut cell_y) = match side {
      None => {
        let (x, y) = locate_cell(leaf, entry_point(ray, param))?;
        (x as i32, y as i32)
      }
      Some(s) => {
        let edge = ENTRY_EDGE[s];
        let section =
          Section::new(leaf.scope.corners[edge[0]], leaf.scope.corners[edge[1]]);
        let along = section.segment_parameter(ray.at(param))?;
        if !(0.0..=1.0).contains(&along) {
          // Entry point off the edge; numeric trouble near a corner.
          // Degrade gracefully.
          return None;
        }
        let edge_index = ((along * (res - 1) as f64) as i32).min(res as i32 - 2);
        match s {
          0 => (edge_index, res as i32 - 2),
          1 => (0, edge_index),
          2 => (edge_index, 0),
          _ => (res as i32 - 2, edge_index),
        }
      }
    };

    loop {
      let corners = leaf.cell_corners(cell_x as usize, cell_y as usize, self.vertical_scale);

      let t0 = Triangle::new(corners[0], corners[3], corners[2]);
      if let Some(t) = t0.intersect_ray(ray) {
        return Some(t);
      }
      let t1 = Triangle::new(corners[0], corners[1], corners[3]);
      if let Some(t) = t1.intersect_ray(ray) {
        return Some(t);
      }

      // Exit side among the four cell fences.
      let old_side = side;
      let old_param = param;
      let mut best = f64::MAX;
      let mut best_side = None;
      for (i, pair) in Scope::SIDE_CORNERS.iter().enumerate() {
        if Some(i) == old_side {
          continue;
        }
        let section = Section::new(corners[pair[0]], corners[pair[1]]);
        if let Some(t) = section.intersect_ray(ray) {
          if t >= old_param && t <= best {
            best = t;
            best_side = Some(i);
          }
        }
      }
      let exit_side = best_side?;
      param = best;
      if param > gout {
        return None;
      }

      let (dx, dy, entry_side) = NEXT_CELL[exit_side];
      cell_x += dx;
      cell_y += dy;
      if cell_x < 0 || cell_y < 0 || cell_x > res as i32 - 2 || cell_y > res as i32 - 2 {
        return None;
      }
      side = Some(entry_side);
    }
  }
}

/// Representative point for containment tests at parameter `t`; a ray
/// through the sphere center degenerates to its direction.
fn entry_point(ray: &Ray, t: f64) -> DVec3 {
  let p = ray.at(t);
  if p.length_squared() < 1.0 {
    ray.dir
  } else {
    p
  }
}

/// Child of `scope` containing `p`, honoring a known entry side: entering
/// through the bottom restricts to the lower children and so on, leaving a
/// single mid-plane sign test.
pub(crate) fn containing_child(scope: &Scope, p: DVec3, side_in: Option<usize>) -> usize {
  let c = &scope.corners;
  let mid = |i: usize, j: usize| (c[i] + c[j]) * 0.5;

  let left_right = match side_in {
    Some(1) => 0,
    Some(3) => 1,
    _ => {
      let normal = mid(0, 1).cross(mid(2, 3));
      if normal.dot(p) > 0.0 {
        0
      } else {
        1
      }
    }
  };
  let lower_upper = match side_in {
    Some(2) => 0,
    Some(0) => 2,
    _ => {
      let normal = mid(1, 3).cross(mid(0, 2));
      if normal.dot(p) > 0.0 {
        0
      } else {
        2
      }
    }
  };
  left_right | lower_upper
}

/// Locate the grid cell of `leaf` whose spherical quad contains `p`, by
/// bisection over the node's own geometry. `None` when containment fails
/// at some level (point effectively outside the leaf).
pub(crate) fn locate_cell(leaf: &Node, p: DVec3) -> Option<(usize, usize)> {
  let mut x0 = 0usize;
  let mut y0 = 0usize;
  let mut span = TILE_RESOLUTION - 1;

  while span > 1 {
    let half = span / 2;
    let mut found = false;
    for i in 0..4usize {
      let nx = x0 + if i & 1 != 0 { half } else { 0 };
      let ny = y0 + if i & 2 != 0 { half } else { 0 };
      let quad = Scope::new([
        leaf.grid_position(nx, ny),
        leaf.grid_position(nx + half, ny),
        leaf.grid_position(nx, ny + half),
        leaf.grid_position(nx + half, ny + half),
      ]);
      if quad.contains(p, 1e-9) {
        x0 = nx;
        y0 = ny;
        span = half;
        found = true;
        break;
      }
    }
    if !found {
      return None;
    }
  }
  Some((x0, y0))
}

#[cfg(test)]
#[path = "intersect_test.rs"]
mod intersect_test;
