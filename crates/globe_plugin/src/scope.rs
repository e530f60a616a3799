//! Scope - the spherical quad covered by one tile.
//!
//! Four corner points in a fixed winding: lower-left, lower-right,
//! upper-left, upper-right. The boundary loop LL -> LR -> UR -> UL is
//! counter-clockwise seen from outside the sphere; the mid-plane sign tests
//! in the intersector rely on this orientation.

use glam::DVec3;

/// Spherical quad with corners in (LL, LR, UL, UR) order.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Scope {
  pub corners: [DVec3; 4],
}

impl Scope {
  pub const LOWER_LEFT: usize = 0;
  pub const LOWER_RIGHT: usize = 1;
  pub const UPPER_LEFT: usize = 2;
  pub const UPPER_RIGHT: usize = 3;

  /// Corner pairs of the four sides, in boundary loop direction:
  /// side 0 = top (UR, UL), 1 = left (UL, LL), 2 = bottom (LL, LR),
  /// 3 = right (LR, UR).
  pub const SIDE_CORNERS: [[usize; 2]; 4] = [[3, 2], [2, 0], [0, 1], [1, 3]];

  pub fn new(corners: [DVec3; 4]) -> Self {
    Self { corners }
  }

  /// Split into four child scopes by bisecting the edges and the quad
  /// center. With `on_sphere` the five new points are re-projected onto the
  /// sphere of the parent corners; otherwise the split is affine.
  ///
  /// Children are ordered bit 0 = right half, bit 1 = upper half, each in
  /// the parent's winding; together they tile the parent exactly.
  pub fn split(&self, on_sphere: bool) -> [Scope; 4] {
    let [ll, lr, ul, ur] = self.corners;

    let bottom = self.mid(ll, lr, on_sphere);
    let right = self.mid(lr, ur, on_sphere);
    let top = self.mid(ul, ur, on_sphere);
    let left = self.mid(ll, ul, on_sphere);

    let mut center = (ll + lr + ul + ur) * 0.25;
    if on_sphere {
      center = center.normalize() * self.corner_radius();
    }

    [
      Scope::new([ll, bottom, left, center]),
      Scope::new([bottom, lr, center, right]),
      Scope::new([left, center, ul, top]),
      Scope::new([center, right, top, ur]),
    ]
  }

  fn mid(&self, a: DVec3, b: DVec3, on_sphere: bool) -> DVec3 {
    let m = (a + b) * 0.5;
    if on_sphere {
      m.normalize() * ((a.length() + b.length()) * 0.5)
    } else {
      m
    }
  }

  fn corner_radius(&self) -> f64 {
    self.corners.iter().map(|c| c.length()).sum::<f64>() * 0.25
  }

  /// True iff `p` lies on the inward side of all four great-circle planes,
  /// within `eps` (in units of the plane test, scaled by the operand
  /// magnitudes; callers pick the tolerance).
  pub fn contains(&self, p: DVec3, eps: f64) -> bool {
    for side in Self::SIDE_CORNERS {
      let a = self.corners[side[0]].normalize();
      let b = self.corners[side[1]].normalize();
      // Boundary loop is CCW from outside, so inside means the cross points
      // with the position vector.
      if a.cross(b).dot(p.normalize_or_zero()) < -eps {
        return false;
      }
    }
    true
  }

  /// Centroid of the corners, projected back to the corner shell.
  pub fn centroid(&self) -> DVec3 {
    let sum = self.corners[0] + self.corners[1] + self.corners[2] + self.corners[3];
    sum.normalize() * self.corner_radius()
  }

  /// Radius of a sphere around [`Scope::centroid`] containing all corners.
  pub fn radius(&self) -> f64 {
    let c = self.centroid();
    self
      .corners
      .iter()
      .map(|corner| (*corner - c).length())
      .fold(0.0, f64::max)
  }

  /// Bilinear grid point of the scope at parameters `u` (left to right) and
  /// `v` (bottom to top), projected onto the corner shell.
  pub fn grid_point(&self, u: f64, v: f64) -> DVec3 {
    let [ll, lr, ul, ur] = self.corners;
    let bottom = ll.lerp(lr, u);
    let top = ul.lerp(ur, u);
    bottom.lerp(top, v).normalize() * self.corner_radius()
  }
}

#[cfg(test)]
#[path = "scope_test.rs"]
mod scope_test;
