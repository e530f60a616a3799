//! globe_plugin - engine-independent adaptive planetary tile engine.
//!
//! Renders-side logic for a planetary-scale, multi-resolution terrain
//! (elevation plus color imagery) pre-tiled into quadtrees rooted at the 30
//! faces of a triacontahedron. Each frame the engine walks the patch trees,
//! decides which resolution to use where from the view frustum and a focus
//! point, streams missing tiles from disk through a background fetcher into
//! a bounded cache, and produces the list of nodes to draw. A ray/terrain
//! intersector walks the same cut without scheduling side effects.
//!
//! # Features
//!
//! - **Bounded two-tier caching**: age-stamped LRU with per-frame pins;
//!   nothing displayed by the current frame is ever evicted
//! - **Asynchronous fetching**: prioritized, deduplicated tile requests
//!   served off-thread; the render thread never blocks on I/O
//! - **All-or-nothing refinement**: a node renders itself until all four
//!   children are resident and current, bounding work per frame
//! - **Frozen on-disk format**: little-endian quadtree files shared with
//!   the offline tile builder
//!
//! The GPU side (texture upload, draw calls, windowing) lives in the
//! frontend crate; this crate has no graphics dependencies.

pub mod cache;
pub mod constants;
pub mod data_manager;
pub mod error;
pub mod fetcher;
pub mod frame;
pub mod globe;
pub mod intersect;
pub mod math;
pub mod node;
pub mod polyhedron;
pub mod quadtree_file;
pub mod refinement;
pub mod scope;
pub mod tree_index;

#[cfg(test)]
pub mod test_utils;

// Re-exports
pub use cache::{BufferId, CacheRequest, TileCache};
pub use constants::{NUM_GEOMETRY_INDICES, SPHEROID_RADIUS, TILE_RESOLUTION, TILE_SAMPLES};
pub use data_manager::{DataManager, RootLoadSummary};
pub use error::{GlobeError, Result};
pub use fetcher::{FetchOutcome, Fetcher};
pub use frame::{FrameClock, FrameContext};
pub use globe::{FrameOutput, Globe, GlobeSettings, ViewSpec};
pub use intersect::Intersector;
pub use math::Ray;
pub use node::{BoundingSphere, Node};
pub use polyhedron::{Connectivity, Polyhedron};
pub use quadtree_file::{
  ColorLayer, DemLayer, ElevationRange, QuadtreeFile, TileIndex, TileLayer, TileRecord,
};
pub use refinement::{
  refine_patch, FocusViewEvaluator, Frustum, FrustumVisibility, LodEvaluator, RefinementOutput,
  VisibilityEvaluator,
};
pub use scope::Scope;
pub use tree_index::TreeIndex;
