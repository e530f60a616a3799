//! Polyhedron - the static table of patch root scopes covering the sphere.
//!
//! The default globe is the rhombic triacontahedron: one rhombic face per
//! icosahedron edge, with corners at the two edge vertices and the two
//! adjacent face centers, all projected to the sphere. 30 faces cover the
//! sphere without gaps or overlaps, and every face has exactly four
//! neighbors, one per side.

use glam::DVec3;

use crate::scope::Scope;

/// One side's link to the neighboring patch.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Connectivity {
  /// Neighbor patch ordinal.
  pub patch: u8,
  /// The neighbor's side that is geometrically this same edge. Crossing
  /// side `s` of patch `p` into `(p', s')` and crossing `s'` of `p'` leads
  /// back to `(p, s)`.
  pub side: u8,
}

/// Static sphere covering: P root scopes plus 4-way adjacency.
pub struct Polyhedron {
  scopes: Vec<Scope>,
  connectivity: Vec<[Connectivity; 4]>,
}

impl Polyhedron {
  /// Build the 30-face triacontahedron at the given sphere radius.
  pub fn triacontahedron(radius: f64) -> Self {
    let phi = (1.0 + 5.0_f64.sqrt()) * 0.5;

    // Icosahedron vertices; raw edge length is 2.
    let mut raw = Vec::with_capacity(12);
    for &a in &[-1.0, 1.0] {
      for &b in &[-phi, phi] {
        raw.push(DVec3::new(0.0, a, b));
        raw.push(DVec3::new(a, b, 0.0));
        raw.push(DVec3::new(b, 0.0, a));
      }
    }

    let mut edges = Vec::new();
    for i in 0..12 {
      for j in (i + 1)..12 {
        if ((raw[i] - raw[j]).length() - 2.0).abs() < 1e-9 {
          edges.push((i, j));
        }
      }
    }
    debug_assert_eq!(edges.len(), 30);

    let adjacent = |a: usize, b: usize| {
      edges.contains(&(a.min(b), a.max(b)))
    };
    let mut faces = Vec::new();
    for i in 0..12 {
      for j in (i + 1)..12 {
        for k in (j + 1)..12 {
          if adjacent(i, j) && adjacent(j, k) && adjacent(i, k) {
            faces.push([i, j, k]);
          }
        }
      }
    }
    debug_assert_eq!(faces.len(), 20);

    // Point table: 12 sphere-projected vertices followed by 20 projected
    // face centers.
    let mut points: Vec<DVec3> = raw.iter().map(|v| v.normalize() * radius).collect();
    for face in &faces {
      let c = raw[face[0]] + raw[face[1]] + raw[face[2]];
      points.push(c.normalize() * radius);
    }

    // One rhombus per icosahedron edge.
    let mut corner_ids: Vec<[usize; 4]> = Vec::with_capacity(30);
    let mut scopes = Vec::with_capacity(30);
    for &(a, b) in &edges {
      let mut centers = faces
        .iter()
        .enumerate()
        .filter(|(_, f)| f.contains(&a) && f.contains(&b))
        .map(|(fi, _)| 12 + fi);
      let mut c1 = centers.next().expect("edge with no adjacent face");
      let mut c2 = centers.next().expect("edge with one adjacent face");

      // Orient the loop a -> c1 -> b -> c2 counter-clockwise from outside.
      let n = (points[b] - points[a]).cross(points[c2] - points[c1]);
      if n.dot(points[a] + points[b] + points[c1] + points[c2]) < 0.0 {
        std::mem::swap(&mut c1, &mut c2);
      }

      // (LL, LR, UL, UR) with the loop LL -> LR -> UR -> UL.
      let ids = [a, c1, c2, b];
      corner_ids.push(ids);
      scopes.push(Scope::new([
        points[ids[0]],
        points[ids[1]],
        points[ids[2]],
        points[ids[3]],
      ]));
    }

    // Pair up sides sharing the same corner pair.
    let mut by_edge: std::collections::HashMap<(usize, usize), Vec<(u8, u8)>> =
      std::collections::HashMap::new();
    for (patch, ids) in corner_ids.iter().enumerate() {
      for (side, pair) in Scope::SIDE_CORNERS.iter().enumerate() {
        let a = ids[pair[0]];
        let b = ids[pair[1]];
        by_edge
          .entry((a.min(b), a.max(b)))
          .or_default()
          .push((patch as u8, side as u8));
      }
    }

    let placeholder = Connectivity { patch: 0, side: 0 };
    let mut connectivity = vec![[placeholder; 4]; scopes.len()];
    for shared in by_edge.values() {
      debug_assert_eq!(shared.len(), 2, "side not shared by exactly two patches");
      let (pa, sa) = shared[0];
      let (pb, sb) = shared[1];
      connectivity[pa as usize][sa as usize] = Connectivity { patch: pb, side: sb };
      connectivity[pb as usize][sb as usize] = Connectivity { patch: pa, side: sa };
    }

    Self {
      scopes,
      connectivity,
    }
  }

  pub fn num_patches(&self) -> usize {
    self.scopes.len()
  }

  pub fn scope(&self, patch: u8) -> &Scope {
    &self.scopes[patch as usize]
  }

  /// Neighbors of a patch, indexed by side.
  pub fn connectivity(&self, patch: u8) -> &[Connectivity; 4] {
    &self.connectivity[patch as usize]
  }

  /// Patch whose root scope contains `p`, if any. Linear scan; P is small.
  pub fn locate(&self, p: DVec3, eps: f64) -> Option<u8> {
    (0..self.scopes.len() as u8).find(|&patch| self.scopes[patch as usize].contains(p, eps))
  }
}

#[cfg(test)]
#[path = "polyhedron_test.rs"]
mod polyhedron_test;
