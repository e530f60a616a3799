//! Ray geometry against the primitives of the globe: origin-centered
//! spheres, radial great-circle fences, and elevation-extruded triangles.

use glam::DVec3;

/// World-space ray. The direction need not be normalized; parameters are in
/// units of the direction length.
#[derive(Clone, Copy, Debug)]
pub struct Ray {
  pub origin: DVec3,
  pub dir: DVec3,
}

impl Ray {
  pub fn new(origin: DVec3, dir: DVec3) -> Self {
    Self { origin, dir }
  }

  pub fn at(&self, t: f64) -> DVec3 {
    self.origin + self.dir * t
  }
}

/// Sphere centered at the world origin.
#[derive(Clone, Copy, Debug)]
pub struct Sphere {
  pub radius: f64,
}

impl Sphere {
  pub fn new(radius: f64) -> Self {
    Self { radius }
  }

  /// Both intersection parameters, ordered, or `None`. Parameters may be
  /// negative when the ray origin is inside or past the sphere.
  pub fn intersect_ray(&self, ray: &Ray) -> Option<(f64, f64)> {
    let a = ray.dir.length_squared();
    if a == 0.0 {
      return None;
    }
    let b = 2.0 * ray.origin.dot(ray.dir);
    let c = ray.origin.length_squared() - self.radius * self.radius;
    let disc = b * b - 4.0 * a * c;
    if disc < 0.0 {
      return None;
    }
    let sq = disc.sqrt();
    Some(((-b - sq) / (2.0 * a), (-b + sq) / (2.0 * a)))
  }

  /// Smallest non-negative intersection parameter, if any.
  pub fn first_hit(&self, ray: &Ray) -> Option<f64> {
    let (t0, t1) = self.intersect_ray(ray)?;
    if t0 >= 0.0 {
      Some(t0)
    } else if t1 >= 0.0 {
      Some(t1)
    } else {
      None
    }
  }
}

/// Radial fence: the surface swept by rays from the world origin through the
/// segment `a`-`b`. Patch and cell boundaries are fences, so crossing them
/// is a plane intersection plus a wedge test.
#[derive(Clone, Copy, Debug)]
pub struct Section {
  na: DVec3,
  nb: DVec3,
  /// Unit normal of the plane through the origin, `a` and `b`.
  normal: DVec3,
}

impl Section {
  pub fn new(a: DVec3, b: DVec3) -> Self {
    let na = a.normalize();
    let nb = b.normalize();
    Self {
      na,
      nb,
      normal: na.cross(nb).normalize_or_zero(),
    }
  }

  /// Parameter at which the ray crosses the fence, any sign, or `None` when
  /// the ray is parallel to the plane, degenerate at the origin, or crosses
  /// the plane outside the wedge of the segment.
  pub fn intersect_ray(&self, ray: &Ray) -> Option<f64> {
    let denom = self.normal.dot(ray.dir);
    if denom.abs() < 1e-15 {
      return None;
    }
    let t = -self.normal.dot(ray.origin) / denom;
    let p = ray.at(t);
    if p.length_squared() < 1e-12 {
      // Crossing at the sphere center; no meaningful side.
      return None;
    }
    let p = p.normalize();
    const WEDGE_EPS: f64 = -1e-12;
    if self.na.cross(p).dot(self.normal) < WEDGE_EPS {
      return None;
    }
    if p.cross(self.nb).dot(self.normal) < WEDGE_EPS {
      return None;
    }
    Some(t)
  }

  /// Chord parameter of `p` along `a`-`b`: 0 at `a`, 1 at `b`. `None` for a
  /// degenerate segment.
  pub fn segment_parameter(&self, p: DVec3) -> Option<f64> {
    let ab = self.nb - self.na;
    let len_sq = ab.length_squared();
    if len_sq < 1e-24 {
      return None;
    }
    let pn = p.normalize_or_zero();
    Some((pn - self.na).dot(ab) / len_sq)
  }
}

/// Triangle for leaf-cell surface tests.
#[derive(Clone, Copy, Debug)]
pub struct Triangle {
  pub a: DVec3,
  pub b: DVec3,
  pub c: DVec3,
}

impl Triangle {
  pub fn new(a: DVec3, b: DVec3, c: DVec3) -> Self {
    Self { a, b, c }
  }

  /// Moeller-Trumbore, both-sided. Only forward hits count. The
  /// barycentric bounds carry a small slack so rays through shared cell
  /// edges and vertices register on one of the adjacent triangles.
  pub fn intersect_ray(&self, ray: &Ray) -> Option<f64> {
    const DET_EPS: f64 = 1e-14;
    const BARY_EPS: f64 = 1e-9;
    let e1 = self.b - self.a;
    let e2 = self.c - self.a;
    let pvec = ray.dir.cross(e2);
    let det = e1.dot(pvec);
    if det.abs() < DET_EPS * e1.length() * e2.length() * ray.dir.length() {
      return None;
    }
    let inv_det = 1.0 / det;
    let tvec = ray.origin - self.a;
    let u = tvec.dot(pvec) * inv_det;
    if !(-BARY_EPS..=1.0 + BARY_EPS).contains(&u) {
      return None;
    }
    let qvec = tvec.cross(e1);
    let v = ray.dir.dot(qvec) * inv_det;
    if v < -BARY_EPS || u + v > 1.0 + BARY_EPS {
      return None;
    }
    let t = e2.dot(qvec) * inv_det;
    if t <= 1e-12 {
      return None;
    }
    Some(t)
  }
}

#[cfg(test)]
#[path = "math_test.rs"]
mod math_test;
