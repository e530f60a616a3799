//! Frame clock - the process-wide frame counter and vertical-scale epoch.
//!
//! Only the frame driver writes the clock; the fetcher thread reads it to
//! pick stream-buffer victims and to stamp freshly built nodes. Everything
//! else receives an immutable [`FrameContext`] snapshot for the duration of
//! one call.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::constants::STARTING_FRAME;

/// Immutable snapshot of the clock, passed into cache and refinement calls.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FrameContext {
  /// Current frame number.
  pub frame: u64,
  /// Frame at which the vertical scale last changed. A node whose bounding
  /// sphere was computed before this frame is stale.
  pub last_scale_frame: u64,
  /// Current vertical exaggeration factor.
  pub vertical_scale: f64,
}

/// Shared frame clock. Cloning shares the underlying state.
#[derive(Clone)]
pub struct FrameClock {
  inner: Arc<ClockState>,
}

struct ClockState {
  frame: AtomicU64,
  scale_bits: AtomicU64,
  last_scale_frame: AtomicU64,
}

impl FrameClock {
  pub fn new() -> Self {
    Self {
      inner: Arc::new(ClockState {
        frame: AtomicU64::new(STARTING_FRAME),
        scale_bits: AtomicU64::new(1.0_f64.to_bits()),
        last_scale_frame: AtomicU64::new(STARTING_FRAME),
      }),
    }
  }

  pub fn frame(&self) -> u64 {
    self.inner.frame.load(Ordering::Acquire)
  }

  /// Advance to the next frame and return it. Driver only.
  pub fn advance(&self) -> u64 {
    self.inner.frame.fetch_add(1, Ordering::AcqRel) + 1
  }

  pub fn vertical_scale(&self) -> f64 {
    f64::from_bits(self.inner.scale_bits.load(Ordering::Acquire))
  }

  /// Install a new vertical scale and record the current frame as the scale
  /// epoch. Driver only; call before advancing the frame so that the epoch
  /// reads as `current_frame - 1` during the frame that follows.
  pub fn set_vertical_scale(&self, scale: f64) {
    self
      .inner
      .scale_bits
      .store(scale.to_bits(), Ordering::Release);
    self
      .inner
      .last_scale_frame
      .store(self.frame(), Ordering::Release);
  }

  pub fn last_scale_frame(&self) -> u64 {
    self.inner.last_scale_frame.load(Ordering::Acquire)
  }

  pub fn snapshot(&self) -> FrameContext {
    FrameContext {
      frame: self.frame(),
      last_scale_frame: self.last_scale_frame(),
      vertical_scale: self.vertical_scale(),
    }
  }
}

impl Default for FrameClock {
  fn default() -> Self {
    Self::new()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_starts_past_zero_stamps() {
    let clock = FrameClock::new();
    assert_eq!(clock.frame(), STARTING_FRAME);
    assert!(clock.frame() >= 2);
  }

  #[test]
  fn test_scale_epoch_precedes_next_frame() {
    let clock = FrameClock::new();
    clock.advance();
    clock.advance();
    let before = clock.frame();
    clock.set_vertical_scale(2.0);
    let frame = clock.advance();
    assert_eq!(clock.vertical_scale(), 2.0);
    assert_eq!(clock.last_scale_frame(), before);
    assert_eq!(clock.last_scale_frame(), frame - 1);
  }

  #[test]
  fn test_clone_shares_state() {
    let clock = FrameClock::new();
    let other = clock.clone();
    clock.advance();
    assert_eq!(other.frame(), clock.frame());
  }
}
