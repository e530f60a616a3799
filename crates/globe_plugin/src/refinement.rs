//! Refinement - decide which tiles form the current cut.
//!
//! Recursive descent per patch with two oracles: a conservative visibility
//! test of the node's bounding sphere against the view frustum, and an LOD
//! metric where values above 1 mean "too coarse for its screen footprint".
//!
//! A node descends only when all four children are on disk, resident, valid
//! and current for the vertical-scale epoch; anything less renders the node
//! itself and requests what is missing. A node never renders a mixture of
//! own-resolution and child-resolution surface, and a missing tile costs at
//! most one frame of latency per refinement step.

use glam::{DMat4, DVec3, DVec4};
use log::debug;
use smallvec::SmallVec;

use crate::cache::{BufferId, CacheRequest, TileCache};
use crate::constants::TILE_RESOLUTION;
use crate::frame::FrameContext;
use crate::node::Node;
use crate::tree_index::TreeIndex;

/// Visibility oracle: `0` means culled, positive values are visible.
pub trait VisibilityEvaluator {
  fn evaluate(&self, node: &Node) -> f32;
}

/// LOD oracle: values `> 1` trigger descent.
pub trait LodEvaluator {
  fn evaluate(&self, node: &Node) -> f32;
}

/// Six-plane view frustum with the scalars the evaluators need.
#[derive(Clone, Debug)]
pub struct Frustum {
  planes: [DVec4; 6],
  pub eye: DVec3,
  /// Pixels per unit of (radius / distance):
  /// `viewport_height / (2 * tan(fov_y / 2))`.
  pub pixel_factor: f64,
}

impl Frustum {
  /// Extract the clip planes from a combined view-projection matrix
  /// (Gribb/Hartmann). Assumes the `[0, w]` clip depth convention the
  /// renderer uses.
  pub fn from_view_proj(m: &DMat4, eye: DVec3, pixel_factor: f64) -> Self {
    let row = |i: usize| DVec4::new(m.x_axis[i], m.y_axis[i], m.z_axis[i], m.w_axis[i]);
    let r0 = row(0);
    let r1 = row(1);
    let r2 = row(2);
    let r3 = row(3);
    let mut planes = [
      r3 + r0, // left
      r3 - r0, // right
      r3 + r1, // bottom
      r3 - r1, // top
      r2,      // near (z >= 0 in clip space)
      r3 - r2, // far
    ];
    for plane in &mut planes {
      let len = plane.truncate().length();
      if len > 0.0 {
        *plane /= len;
      }
    }
    Self {
      planes,
      eye,
      pixel_factor,
    }
  }

  /// Conservative sphere test: 0.0 iff the sphere is entirely outside some
  /// frustum plane.
  pub fn sphere_visibility(&self, center: DVec3, radius: f64) -> f32 {
    for plane in &self.planes {
      if plane.truncate().dot(center) + plane.w < -radius {
        return 0.0;
      }
    }
    1.0
  }
}

/// Frustum-based conservative visibility.
#[derive(Clone)]
pub struct FrustumVisibility {
  pub frustum: Frustum,
}

impl VisibilityEvaluator for FrustumVisibility {
  fn evaluate(&self, node: &Node) -> f32 {
    let b = node.bounding();
    self.frustum.sphere_visibility(b.center, b.radius)
  }
}

/// LOD from the projected screen footprint, relaxed with distance from the
/// focus point.
#[derive(Clone)]
pub struct FocusViewEvaluator {
  pub frustum: Frustum,
  /// World-space point of interest; detail concentrates around it.
  pub focus: DVec3,
}

impl LodEvaluator for FocusViewEvaluator {
  fn evaluate(&self, node: &Node) -> f32 {
    let b = node.bounding();
    let distance = ((b.center - self.frustum.eye).length() - b.radius).max(1.0);
    let projected = 2.0 * b.radius * self.frustum.pixel_factor / distance;
    let mut lod = projected / TILE_RESOLUTION as f64;

    let focus_distance = ((b.center - self.focus).length() - b.radius).max(0.0);
    lod /= 1.0 + focus_distance / (4.0 * b.radius.max(1.0));
    lod as f32
  }
}

/// Result of walking one patch tree.
#[derive(Default)]
pub struct RefinementOutput {
  /// Nodes to render this frame; an antichain of the tree.
  pub cut: Vec<BufferId>,
  /// Every buffer the walk considered; pinned by the driver afterwards.
  pub actives: Vec<BufferId>,
  /// Loads for children that kept this walk from descending.
  pub requests: Vec<CacheRequest>,
}

/// Walk one patch quadtree from its root.
pub fn refine_patch<V: VisibilityEvaluator, L: LodEvaluator>(
  cache: &TileCache<Node>,
  ctx: &FrameContext,
  root: TreeIndex,
  visibility: &V,
  lod: &L,
) -> RefinementOutput {
  let mut out = RefinementOutput::default();
  match cache.find_cached(root) {
    Some(id) if cache.is_valid(id) => {
      descend(cache, ctx, id, visibility, lod, &mut out);
    }
    _ => debug!("patch root {root} not resident, skipping walk"),
  }
  out
}

fn descend<V: VisibilityEvaluator, L: LodEvaluator>(
  cache: &TileCache<Node>,
  ctx: &FrameContext,
  id: BufferId,
  visibility: &V,
  lod: &L,
  out: &mut RefinementOutput,
) {
  out.actives.push(id);
  cache.touch(id, ctx.frame);

  let Some(node) = cache.data(id) else {
    return;
  };

  if visibility.evaluate(&node) <= 0.0 {
    // Culled: stays active so it is not evicted mid-frame, but is neither
    // rendered nor refined.
    return;
  }

  let lod_value = lod.evaluate(&node);
  if lod_value <= 1.0 {
    out.cut.push(id);
    return;
  }

  // Too coarse. Descend only if every child can be and is materialized; a
  // child with no tile in either layer can never load, so such nodes stay
  // leaves of the displayed approximation forever.
  if !node.all_children_on_disk() {
    out.cut.push(id);
    return;
  }

  let mut children: SmallVec<[BufferId; 4]> = SmallVec::new();
  let mut allgood = true;
  for child in 0..4u8 {
    let child_index = node.index.down(child);
    match cache.find_cached(child_index) {
      None => {
        out
          .requests
          .push(CacheRequest::new(lod_value, node.index, child));
        allgood = false;
      }
      Some(child_id) => {
        if !cache.is_valid(child_id) {
          // Mid-stream; the pending fetch already owns the key.
          allgood = false;
        } else if stale_scale(cache, child_id, ctx) {
          // Keep it alive so the driver refreshes its bounding sphere at
          // the next frame start; render ourselves meanwhile.
          out.actives.push(child_id);
          cache.touch(child_id, ctx.frame);
          allgood = false;
        } else {
          children.push(child_id);
        }
      }
    }
  }

  if allgood {
    for child_id in children {
      descend(cache, ctx, child_id, visibility, lod, out);
    }
  } else {
    out.cut.push(id);
  }
}

fn stale_scale(cache: &TileCache<Node>, id: BufferId, ctx: &FrameContext) -> bool {
  cache
    .data(id)
    .map(|node| node.bounding_scale_frame() < ctx.last_scale_frame)
    .unwrap_or(true)
}

#[cfg(test)]
#[path = "refinement_test.rs"]
mod refinement_test;
