use glam::DVec3;

use super::Scope;

const EPS: f64 = 1e-9;

/// A quad around the +Z pole of the unit sphere.
fn polar_scope() -> Scope {
  let d = 0.35;
  Scope::new([
    DVec3::new(-d, -d, 1.0).normalize(),
    DVec3::new(d, -d, 1.0).normalize(),
    DVec3::new(-d, d, 1.0).normalize(),
    DVec3::new(d, d, 1.0).normalize(),
  ])
}

#[test]
fn test_contains_center_and_rejects_antipode() {
  let scope = polar_scope();
  assert!(scope.contains(DVec3::Z, EPS));
  assert!(!scope.contains(-DVec3::Z, EPS));
  assert!(!scope.contains(DVec3::X, EPS));
}

#[test]
fn test_split_covers_parent_exactly_once() {
  let scope = polar_scope();
  let children = scope.split(true);

  // Sample the parent interior; every point must fall in exactly one child
  // (up to boundary epsilon, where two children may both claim it).
  for iy in 0..20 {
    for ix in 0..20 {
      let u = (ix as f64 + 0.5) / 20.0;
      let v = (iy as f64 + 0.5) / 20.0;
      let p = scope.grid_point(u, v);
      assert!(scope.contains(p, EPS));

      let hits = children
        .iter()
        .filter(|c| c.contains(p, -EPS))
        .count();
      let loose_hits = children.iter().filter(|c| c.contains(p, EPS)).count();
      assert!(hits <= 1, "interior point claimed strictly by {hits} children");
      assert!(loose_hits >= 1, "point not covered by any child");
    }
  }
}

#[test]
fn test_split_children_keep_winding() {
  let scope = polar_scope();
  for child in scope.split(true) {
    // Each child must contain its own centroid; a broken winding would
    // reject it.
    assert!(child.contains(child.centroid(), EPS));
  }
}

#[test]
fn test_split_child_order() {
  let scope = polar_scope();
  let children = scope.split(true);
  // bit 0 = right, bit 1 = upper
  let probe = |u: f64, v: f64| scope.grid_point(u, v);
  assert!(children[0].contains(probe(0.25, 0.25), EPS));
  assert!(children[1].contains(probe(0.75, 0.25), EPS));
  assert!(children[2].contains(probe(0.25, 0.75), EPS));
  assert!(children[3].contains(probe(0.75, 0.75), EPS));
}

#[test]
fn test_affine_split_is_affine() {
  let scope = polar_scope();
  let children = scope.split(false);
  let [ll, lr, ul, ur] = scope.corners;
  let center = (ll + lr + ul + ur) * 0.25;
  // The shared center corner is the plain average, not re-projected.
  assert!((children[0].corners[3] - center).length() < 1e-12);
  assert!((children[3].corners[0] - center).length() < 1e-12);
}

#[test]
fn test_sphere_split_projects_midpoints() {
  let scope = polar_scope();
  let children = scope.split(true);
  for child in &children {
    for corner in child.corners {
      assert!((corner.length() - 1.0).abs() < 1e-12);
    }
  }
}

#[test]
fn test_centroid_and_radius() {
  let scope = polar_scope();
  let c = scope.centroid();
  assert!((c.length() - 1.0).abs() < 1e-12);
  let r = scope.radius();
  for corner in scope.corners {
    assert!((corner - c).length() <= r + 1e-12);
  }
}
