//! Prioritized tile load requests handed from the refinement walker to the
//! fetcher.

use crate::tree_index::TreeIndex;

/// Request to load one child tile of a cached parent node.
///
/// The priority is the LOD value that triggered the request; higher means
/// more urgent. Duplicate requests for the same target are merged by the
/// fetcher, higher priority winning.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CacheRequest {
  pub priority: f32,
  /// Parent node; its cached record carries the child tile offsets.
  pub parent: TreeIndex,
  /// Child slot (0..4).
  pub child: u8,
}

impl CacheRequest {
  pub fn new(priority: f32, parent: TreeIndex, child: u8) -> Self {
    debug_assert!(child < 4);
    Self {
      priority,
      parent,
      child,
    }
  }

  /// Index of the tile this request would materialize.
  pub fn target(&self) -> TreeIndex {
    self.parent.down(self.child)
  }
}
