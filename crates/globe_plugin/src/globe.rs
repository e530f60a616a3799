//! Globe - the frame driver tying the subsystems together.
//!
//! Per frame, in load-bearing order: apply a staged vertical-scale change,
//! advance the frame counter, refresh and re-touch last frame's actives,
//! walk every patch tree collecting the cut and the requests, pin the new
//! active set, submit the requests, and hand the cut to the renderer.
//! Pinning precedes request submission so a stream-buffer grab triggered by
//! a fetch can never claim something the current frame displays.

use std::path::Path;
use std::sync::{Arc, Mutex};

use glam::DVec3;
use log::{debug, info};

use crate::cache::{BufferId, TileCache};
use crate::constants::{DEFAULT_ELEVATION_RANGE, SPHEROID_RADIUS};
use crate::data_manager::DataManager;
use crate::error::Result;
use crate::fetcher::{probe_requests, FetchOutcome, Fetcher};
use crate::frame::{FrameClock, FrameContext};
use crate::intersect::{containing_child, locate_cell, Intersector};
use crate::math::{Ray, Triangle};
use crate::node::Node;
use crate::polyhedron::Polyhedron;
use crate::refinement::{refine_patch, FocusViewEvaluator, Frustum, FrustumVisibility};
use crate::tree_index::TreeIndex;

/// Engine configuration fixed at startup, except for the vertical scale
/// which is staged per frame.
#[derive(Clone, Debug)]
pub struct GlobeSettings {
  /// Main cache capacity in buffers. Must at least hold every patch root.
  pub cache_capacity: usize,
  /// Global elevation range override `(min, max)` in meters; bounds the
  /// intersector's world shells regardless of what the dataset reports.
  pub elevation_range: (f64, f64),
  /// Whether the renderer should sample the color layer.
  pub use_texture_color: bool,
}

impl Default for GlobeSettings {
  fn default() -> Self {
    Self {
      cache_capacity: 4096,
      elevation_range: DEFAULT_ELEVATION_RANGE,
      use_texture_color: true,
    }
  }
}

/// Per-frame view description provided by the frontend.
pub struct ViewSpec {
  pub frustum: Frustum,
  /// Focus point pulling detail towards it.
  pub focus: DVec3,
}

/// What the driver hands to the renderer.
pub struct FrameOutput {
  pub frame: u64,
  /// Renderable nodes, one draw each.
  pub cut: Vec<(BufferId, Arc<Node>)>,
  pub requests_submitted: usize,
}

pub struct Globe {
  settings: GlobeSettings,
  polyhedron: Arc<Polyhedron>,
  cache: Arc<TileCache<Node>>,
  clock: FrameClock,
  fetcher: Fetcher,
  actives: Mutex<Vec<BufferId>>,
  pending_scale: f64,
  computed_elevation_range: (f64, f64),
}

impl Globe {
  /// Open a dataset and make all patch roots resident; refuses to start
  /// otherwise.
  pub fn open(dem: &Path, color: Option<&Path>, settings: GlobeSettings) -> Result<Self> {
    let polyhedron = Arc::new(Polyhedron::triacontahedron(SPHEROID_RADIUS));
    let cache = Arc::new(TileCache::new(settings.cache_capacity));
    let clock = FrameClock::new();

    let mut manager = DataManager::open(dem, color, polyhedron.clone())?;
    let summary = manager.load_roots(&cache, &clock)?;
    info!(
      "elevation range: computed [{:.0}, {:.0}], override [{:.0}, {:.0}]",
      summary.computed_elevation_range.0,
      summary.computed_elevation_range.1,
      settings.elevation_range.0,
      settings.elevation_range.1,
    );
    let fetcher = manager.start_fetcher(cache.clone(), clock.clone());

    Ok(Self {
      settings,
      polyhedron,
      cache,
      clock,
      fetcher,
      // Seed with the roots so the first frame refreshes them like any
      // other active set.
      actives: Mutex::new(summary.buffers),
      pending_scale: 1.0,
      computed_elevation_range: summary.computed_elevation_range,
    })
  }

  pub fn settings(&self) -> &GlobeSettings {
    &self.settings
  }

  pub fn cache(&self) -> &TileCache<Node> {
    &self.cache
  }

  pub fn polyhedron(&self) -> &Polyhedron {
    &self.polyhedron
  }

  pub fn frame_context(&self) -> FrameContext {
    self.clock.snapshot()
  }

  pub fn computed_elevation_range(&self) -> (f64, f64) {
    self.computed_elevation_range
  }

  /// Stage a vertical-scale change; applied at the next frame boundary.
  pub fn set_vertical_scale(&mut self, scale: f64) {
    self.pending_scale = scale;
  }

  pub fn vertical_scale(&self) -> f64 {
    self.clock.vertical_scale()
  }

  pub fn use_texture_color(&mut self, textured: bool) {
    self.settings.use_texture_color = textured;
  }

  /// Advance one frame; see module docs for the sequence.
  pub fn frame(&mut self, view: &ViewSpec) -> FrameOutput {
    if self.pending_scale != self.clock.vertical_scale() {
      self.clock.set_vertical_scale(self.pending_scale);
    }
    let frame = self.clock.advance();

    for outcome in self.fetcher.drain_completed() {
      if let FetchOutcome::Failed(index) = outcome {
        debug!("fetch failed for {index}");
      }
    }

    self.confirm_actives();

    let ctx = self.clock.snapshot();
    let visibility = FrustumVisibility {
      frustum: view.frustum.clone(),
    };
    let lod = FocusViewEvaluator {
      frustum: view.frustum.clone(),
      focus: view.focus,
    };

    let mut cut_ids = Vec::new();
    let mut requests = Vec::new();
    for patch in 0..self.polyhedron.num_patches() as u8 {
      let out = refine_patch(&self.cache, &ctx, TreeIndex::root(patch), &visibility, &lod);
      cut_ids.extend(out.cut);
      requests.extend(out.requests);
      self.submit_actives(out.actives);
    }

    {
      let actives = self.actives.lock().unwrap();
      for &id in actives.iter() {
        self.cache.pin(id, frame);
      }
    }

    let requests_submitted = requests.len();
    self.fetcher.submit(frame, requests);

    let cut = cut_ids
      .into_iter()
      .filter_map(|id| self.cache.data(id).map(|node| (id, node)))
      .collect();
    FrameOutput {
      frame,
      cut,
      requests_submitted,
    }
  }

  /// Append a walker's active buffers; one critical section per batch.
  pub fn submit_actives(&self, batch: Vec<BufferId>) {
    if batch.is_empty() {
      return;
    }
    let mut actives = self.actives.lock().unwrap();
    actives.extend(batch);
  }

  /// Bring last frame's actives into the current frame: recompute bounding
  /// spheres not computed this frame (this is where a vertical-scale change
  /// propagates) and stamp them as used.
  fn confirm_actives(&self) {
    let frame = self.clock.frame();
    let scale = self.clock.vertical_scale();
    let mut actives = self.actives.lock().unwrap();
    for &id in actives.iter() {
      if !self.cache.is_current(id, frame) {
        if let Some(node) = self.cache.data(id) {
          node.update_bounding(scale, frame);
        }
        self.cache.touch(id, frame);
      }
    }
    actives.clear();
  }

  /// Closest positive ray/terrain hit against the current cut. Read-only.
  pub fn intersect(&self, ray: &Ray) -> Option<f64> {
    Intersector::new(
      &self.cache,
      &self.polyhedron,
      self.settings.elevation_range,
      self.clock.vertical_scale(),
    )
    .intersect(ray)
  }

  /// Finest cached elevation sample under the world point `p`, requesting
  /// (at neutral priority) whatever finer data exists but is not resident.
  pub fn height_at(&self, p: DVec3) -> Option<f64> {
    let patch = self.polyhedron.locate(p, 1e-9)?;
    let mut node = self.cache.lookup(TreeIndex::root(patch))?;

    loop {
      if !node.has_any_child_tiles() {
        break;
      }
      let mut missing = Vec::new();
      let mut next = None;
      for child in 0..4u8 {
        let child_index = node.index.down(child);
        match self.cache.lookup(child_index) {
          None => missing.push(child),
          Some(child_node) => {
            if child_node.scope.contains(p, 1e-9) {
              next = Some(child_node);
              break;
            }
          }
        }
      }
      match next {
        Some(child_node) => node = child_node,
        None => {
          if !missing.is_empty() {
            self
              .fetcher
              .submit(self.clock.frame(), probe_requests(node.index, &missing));
          }
          break;
        }
      }
    }

    let (x, y) = locate_cell(&node, p)?;
    Some(node.height_at(x, y) as f64)
  }

  /// Project a world point onto the current terrain approximation, in
  /// unscaled globe space, displaced by `elevation_offset` meters.
  pub fn snap_to_surface(&self, p: DVec3, elevation_offset: f64) -> DVec3 {
    let fallback = |node: &Node, x: usize, y: usize| {
      let radius = SPHEROID_RADIUS + node.height_at(x, y) as f64 + elevation_offset;
      p.normalize() * radius
    };

    let Some(patch) = self.polyhedron.locate(p, 1e-9) else {
      return p;
    };
    let Some(mut node) = self.cache.lookup(TreeIndex::root(patch)) else {
      return p;
    };

    // Descend through cached children containing the point; the child is
    // picked with the two mid-plane sign tests.
    loop {
      let child = containing_child(&node.scope, p, None);
      if !node.has_child_tiles(child) {
        break;
      }
      let child_index = node.index.down(child as u8);
      match self.cache.lookup(child_index) {
        Some(child_node) => node = child_node,
        None => {
          self
            .fetcher
            .submit(self.clock.frame(), probe_requests(node.index, &[child as u8]));
          break;
        }
      }
    }

    let Some((x, y)) = locate_cell(&node, p) else {
      let radius = SPHEROID_RADIUS + elevation_offset;
      return p.normalize() * radius;
    };

    // Intersect the two cell triangles with the radial ray through `p`.
    let corners = node.cell_corners(x, y, 1.0);
    let ray = Ray::new(p, -p);
    let hit = Triangle::new(corners[0], corners[3], corners[2])
      .intersect_ray(&ray)
      .or_else(|| Triangle::new(corners[0], corners[1], corners[3]).intersect_ray(&ray));
    match hit {
      Some(t) => ray.at(t),
      None => fallback(&node, x, y),
    }
  }

  /// Map a point from true globe space into vertically exaggerated space.
  pub fn map_to_scaled_globe(&self, p: DVec3) -> DVec3 {
    let on_surface = p.normalize() * SPHEROID_RADIUS;
    (p - on_surface) * self.clock.vertical_scale() + on_surface
  }

  /// Inverse of [`Globe::map_to_scaled_globe`].
  pub fn map_to_unscaled_globe(&self, p: DVec3) -> DVec3 {
    let scale = self.clock.vertical_scale();
    let on_surface = p.normalize() * SPHEROID_RADIUS;
    if scale == 0.0 {
      return on_surface;
    }
    (p - on_surface) / scale + on_surface
  }
}

#[cfg(test)]
#[path = "globe_test.rs"]
mod globe_test;
