//! Process-wide constants shared with the offline tile builder.
//!
//! These values are baked into every on-disk dataset; changing them breaks
//! compatibility with existing quadtree files.

/// Samples per tile edge. Every tile, elevation or color, is a
/// `TILE_RESOLUTION x TILE_RESOLUTION` grid.
pub const TILE_RESOLUTION: usize = 33;

/// Samples per tile (`TILE_RESOLUTION` squared).
pub const TILE_SAMPLES: usize = TILE_RESOLUTION * TILE_RESOLUTION;

/// Radius of the reference spheroid in meters.
pub const SPHEROID_RADIUS: f64 = 6_371_000.0;

/// Default global elevation range override in meters, `(min, max)`.
///
/// The per-dataset computed range is logged at startup, but the bounding
/// shells used by the ray intersector come from this setting unless the
/// application overrides it.
pub const DEFAULT_ELEVATION_RANGE: (f64, f64) = (-8000.0, 11000.0);

/// Index count of the shared triangle-strip template that zigzags through a
/// `TILE_RESOLUTION` grid one row at a time, with two degenerate indices
/// between rows.
pub const NUM_GEOMETRY_INDICES: usize =
  (TILE_RESOLUTION - 1) * (TILE_RESOLUTION * 2 + 2) - 2;

/// Step between adjacent texel centers of a tile texture.
pub const TILE_TEXTURE_COORD_STEP: f32 = 1.0 / TILE_RESOLUTION as f32;

/// First live frame number. Stamps in cache buffers are zero-initialized, so
/// the clock starts late enough that a fresh buffer is already older than
/// "current or previous frame" and can be handed out as a stream buffer.
pub const STARTING_FRAME: u64 = 2;

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_index_template_count() {
    // 32 rows of 66 strip indices plus 31 row joints of 2.
    assert_eq!(NUM_GEOMETRY_INDICES, 32 * 66 + 31 * 2);
  }
}
