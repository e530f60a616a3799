use glam::{DMat4, DVec3};

use crate::constants::SPHEROID_RADIUS;
use crate::math::Ray;
use crate::refinement::Frustum;
use crate::test_utils::build_toy_dataset;
use crate::tree_index::TreeIndex;

use super::{Globe, GlobeSettings, ViewSpec};

fn open_globe(dataset: &crate::test_utils::ToyDataset, capacity: usize) -> Globe {
  Globe::open(
    &dataset.dem.path,
    Some(dataset.color.path.as_path()),
    GlobeSettings {
      cache_capacity: capacity,
      ..Default::default()
    },
  )
  .unwrap()
}

/// A whole-globe view from far away: everything visible, nothing worth
/// subdividing.
fn far_view(eye: DVec3) -> ViewSpec {
  let proj = DMat4::perspective_rh(1.0, 1.0, 1000.0, SPHEROID_RADIUS * 20.0);
  let view = DMat4::look_at_rh(eye, DVec3::ZERO, DVec3::Y);
  ViewSpec {
    frustum: Frustum::from_view_proj(&(proj * view), eye, 50.0),
    focus: eye.normalize() * SPHEROID_RADIUS,
  }
}

#[test]
fn test_frame_advances_and_renders_roots() {
  let dataset = build_toy_dataset([false; 4], 100.0, 0.0);
  let mut globe = open_globe(&dataset, 64);

  let eye = DVec3::new(0.0, 0.0, 4.0 * SPHEROID_RADIUS);
  let out = globe.frame(&far_view(eye));
  assert_eq!(out.frame, 3);

  // From far out roughly half the globe is visible; the cut is made of
  // roots only and nothing needs loading.
  assert!(!out.cut.is_empty());
  assert!(out.cut.len() <= 30);
  assert!(out.cut.iter().all(|(_, node)| node.index.is_root()));
  assert_eq!(out.requests_submitted, 0);
}

#[test]
fn test_identical_frames_yield_identical_cuts() {
  let dataset = build_toy_dataset([false; 4], 100.0, 0.0);
  let mut globe = open_globe(&dataset, 64);

  let eye = DVec3::new(0.0, 0.0, 4.0 * SPHEROID_RADIUS);
  let a = globe.frame(&far_view(eye));
  let b = globe.frame(&far_view(eye));

  let cut_a: Vec<_> = a.cut.iter().map(|(_, n)| n.index).collect();
  let cut_b: Vec<_> = b.cut.iter().map(|(_, n)| n.index).collect();
  assert_eq!(cut_a, cut_b);
  assert_eq!(a.requests_submitted, b.requests_submitted);
}

#[test]
fn test_scale_change_refreshes_actives_next_frame() {
  let dataset = build_toy_dataset([false; 4], 1000.0, 0.0);
  let mut globe = open_globe(&dataset, 64);
  let eye = DVec3::new(0.0, 0.0, 4.0 * SPHEROID_RADIUS);

  globe.frame(&far_view(eye));
  let before: Vec<f64> = (0..30u8)
    .map(|p| {
      globe
        .cache()
        .lookup(TreeIndex::root(p))
        .unwrap()
        .bounding()
        .radius
    })
    .collect();

  globe.set_vertical_scale(2.0);
  globe.frame(&far_view(eye));

  // Every active node's sphere reflects the new scale within one frame:
  // flat 1000 m terrain adds exactly 1000 m of radius at scale 2.
  for (patch, &old) in before.iter().enumerate() {
    let new = globe
      .cache()
      .lookup(TreeIndex::root(patch as u8))
      .unwrap()
      .bounding()
      .radius;
    assert!((new - old - 1000.0).abs() < 1e-6, "patch {patch}");
  }
  assert_eq!(globe.vertical_scale(), 2.0);
}

#[test]
fn test_intersect_through_driver() {
  let dataset = build_toy_dataset([false; 4], 1000.0, 0.0);
  let mut globe = open_globe(&dataset, 64);
  let eye = DVec3::new(0.0, 0.0, 4.0 * SPHEROID_RADIUS);
  globe.frame(&far_view(eye));

  let centroid = globe.cache().lookup(TreeIndex::root(0)).unwrap().centroid;
  let t = globe
    .intersect(&Ray::new(DVec3::ZERO, centroid.normalize()))
    .expect("hit expected");
  assert!((t - (SPHEROID_RADIUS + 1000.0)).abs() < 1.0);
}

#[test]
fn test_height_at_flat_terrain() {
  let dataset = build_toy_dataset([false; 4], 123.0, 0.0);
  let globe = open_globe(&dataset, 64);

  let p = globe.cache().lookup(TreeIndex::root(4)).unwrap().centroid;
  assert_eq!(globe.height_at(p), Some(123.0));
}

#[test]
fn test_snap_to_surface_lands_on_terrain() {
  let dataset = build_toy_dataset([false; 4], 1000.0, 0.0);
  let globe = open_globe(&dataset, 64);

  let node = globe.cache().lookup(TreeIndex::root(2)).unwrap();
  // A point between two grid vertices, hoisted far above the surface.
  let above = (node.grid_position(10, 10) + node.grid_position(11, 10)) * 0.5 * 1.2;
  let snapped = globe.snap_to_surface(above, 0.0);
  // Between grid vertices the faceted surface sags below the analytic
  // shell by the chord error of one cell.
  let radius = snapped.length();
  assert!(
    (radius - (SPHEROID_RADIUS + 1000.0)).abs() < 500.0,
    "snapped radius {radius}"
  );
  // The snap is radial.
  assert!(snapped.normalize().dot(above.normalize()) > 1.0 - 1e-9);
}

#[test]
fn test_scaled_globe_mapping_round_trip() {
  let dataset = build_toy_dataset([false; 4], 0.0, 0.0);
  let mut globe = open_globe(&dataset, 64);
  globe.set_vertical_scale(2.0);
  let eye = DVec3::new(0.0, 0.0, 4.0 * SPHEROID_RADIUS);
  globe.frame(&far_view(eye));

  let p = DVec3::new(0.2, -0.3, 0.93).normalize() * (SPHEROID_RADIUS + 500.0);
  let scaled = globe.map_to_scaled_globe(p);
  assert!((scaled.length() - (SPHEROID_RADIUS + 1000.0)).abs() < 1e-6);
  let back = globe.map_to_unscaled_globe(scaled);
  assert!((back - p).length() < 1e-6);
}

#[test]
fn test_children_stream_in_under_a_close_view() {
  // Close view over patch 0 with a generous pixel factor: the root is too
  // coarse, children get requested, and a few frames later the cut under
  // that patch is the four children.
  let dataset = build_toy_dataset([true; 4], 0.0, 0.0);
  let mut globe = open_globe(&dataset, 256);

  let root_centroid = globe.cache().lookup(TreeIndex::root(0)).unwrap().centroid;
  let eye = root_centroid * 1.3;
  let up = root_centroid.any_orthonormal_vector();
  let view = || {
    let proj = DMat4::perspective_rh(1.0, 1.0, 1000.0, SPHEROID_RADIUS * 20.0);
    let view = DMat4::look_at_rh(eye, DVec3::ZERO, up);
    ViewSpec {
      frustum: Frustum::from_view_proj(&(proj * view), eye, 2000.0),
      focus: root_centroid,
    }
  };

  let first = globe.frame(&view());
  assert!(first.requests_submitted > 0);

  let mut descended = false;
  for _ in 0..500 {
    std::thread::sleep(std::time::Duration::from_millis(2));
    let out = globe.frame(&view());
    let children_in_cut = out
      .cut
      .iter()
      .filter(|(_, node)| node.index.level == 1 && node.index.patch == 0)
      .count();
    if children_in_cut == 4 {
      descended = true;
      break;
    }
  }
  assert!(descended, "children never entered the cut");
}
