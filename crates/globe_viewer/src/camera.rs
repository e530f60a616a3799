//! Orbit camera around the globe center, with frustum extraction and
//! cursor-ray unprojection for surface picking.

use glam::{DMat4, DVec3, DVec4};

use globe_plugin::{Frustum, Ray, SPHEROID_RADIUS};

pub struct OrbitCamera {
  /// Longitude-like angle, radians.
  pub yaw: f64,
  /// Latitude-like angle, radians, clamped short of the poles.
  pub pitch: f64,
  /// Distance from the globe center.
  pub distance: f64,
  pub fov_y: f64,
}

impl OrbitCamera {
  pub fn new() -> Self {
    Self {
      yaw: 0.6,
      pitch: 0.45,
      distance: 3.2 * SPHEROID_RADIUS,
      fov_y: 50_f64.to_radians(),
    }
  }

  pub fn orbit(&mut self, dx: f64, dy: f64) {
    self.yaw -= dx * 0.005;
    self.pitch = (self.pitch + dy * 0.005).clamp(-1.5, 1.5);
  }

  /// Exponential zoom toward the surface; never goes below 1 km altitude.
  pub fn zoom(&mut self, steps: f64) {
    let altitude = self.distance - SPHEROID_RADIUS;
    let altitude = (altitude * 0.9_f64.powf(steps)).max(1_000.0);
    self.distance = SPHEROID_RADIUS + altitude;
  }

  pub fn eye(&self) -> DVec3 {
    let (sy, cy) = self.yaw.sin_cos();
    let (sp, cp) = self.pitch.sin_cos();
    DVec3::new(cp * cy, sp, cp * sy) * self.distance
  }

  /// Surface point straight under the camera; the refinement focus.
  pub fn focus(&self) -> DVec3 {
    self.eye().normalize() * SPHEROID_RADIUS
  }

  pub fn view(&self) -> DMat4 {
    DMat4::look_at_rh(self.eye(), DVec3::ZERO, DVec3::Y)
  }

  pub fn proj(&self, aspect: f64) -> DMat4 {
    let altitude = self.distance - SPHEROID_RADIUS;
    let near = (altitude * 0.05).clamp(100.0, 50_000.0);
    let far = self.distance + 4.0 * SPHEROID_RADIUS;
    DMat4::perspective_rh(self.fov_y, aspect, near, far)
  }

  pub fn view_proj(&self, aspect: f64) -> DMat4 {
    self.proj(aspect) * self.view()
  }

  pub fn frustum(&self, width: u32, height: u32) -> Frustum {
    let aspect = width.max(1) as f64 / height.max(1) as f64;
    let pixel_factor = height as f64 / (2.0 * (self.fov_y * 0.5).tan());
    Frustum::from_view_proj(&self.view_proj(aspect), self.eye(), pixel_factor)
  }

  /// World-space ray through a window pixel.
  pub fn ray_through(&self, px: f64, py: f64, width: u32, height: u32) -> Ray {
    let aspect = width.max(1) as f64 / height.max(1) as f64;
    let ndc_x = 2.0 * px / width.max(1) as f64 - 1.0;
    let ndc_y = 1.0 - 2.0 * py / height.max(1) as f64;
    let inv = self.view_proj(aspect).inverse();

    let near = inv * DVec4::new(ndc_x, ndc_y, 0.1, 1.0);
    let far = inv * DVec4::new(ndc_x, ndc_y, 0.9, 1.0);
    let near = near.truncate() / near.w;
    let far = far.truncate() / far.w;
    Ray::new(self.eye(), (far - near).normalize())
  }
}

impl Default for OrbitCamera {
  fn default() -> Self {
    Self::new()
  }
}
