//! Generic bounded tile cache with age-stamped pins.
//!
//! Capacity is fixed at construction; buffers cycle through
//! `free -> streaming -> cached` and back. A buffer can be handed out as a
//! stream buffer (its key reassigned) only when it was neither touched this
//! frame nor the previous one, and is not pinned for the current frame. If
//! no buffer qualifies the request fails; it is never acceptable to evict
//! something the current frame still needs.
//!
//! All operations are O(1)-ish hash work under a single mutex; payloads are
//! built outside the lock and installed whole, so no I/O ever happens in a
//! critical section.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::error::{GlobeError, Result};
use crate::tree_index::TreeIndex;

/// Handle to a buffer slot of one cache. Only meaningful together with the
/// cache that issued it; holders must follow the pinning discipline, since
/// an evicted slot is reassigned to a different key.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct BufferId(u32);

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
enum SlotState {
  Free,
  Streaming,
  Cached,
}

struct Slot<T> {
  key: Option<TreeIndex>,
  state: SlotState,
  last_touched: u64,
  pinned: u64,
  data: Option<Arc<T>>,
}

struct Inner<T> {
  slots: Vec<Slot<T>>,
  index: HashMap<TreeIndex, u32>,
}

/// Bounded set of keyed buffers; see module docs.
pub struct TileCache<T> {
  inner: Mutex<Inner<T>>,
  capacity: usize,
}

impl<T> TileCache<T> {
  pub fn new(capacity: usize) -> Self {
    assert!(capacity > 0);
    let slots = (0..capacity)
      .map(|_| Slot {
        key: None,
        state: SlotState::Free,
        last_touched: 0,
        pinned: 0,
        data: None,
      })
      .collect();
    Self {
      inner: Mutex::new(Inner {
        slots,
        index: HashMap::with_capacity(capacity),
      }),
      capacity,
    }
  }

  pub fn capacity(&self) -> usize {
    self.capacity
  }

  /// Number of keyed buffers (streaming or cached).
  pub fn len(&self) -> usize {
    self.inner.lock().unwrap().index.len()
  }

  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }

  /// Look up a buffer without touching it. Read-only probes (the
  /// intersector, surface snapping) use this.
  pub fn find_cached(&self, key: TreeIndex) -> Option<BufferId> {
    let inner = self.inner.lock().unwrap();
    inner.index.get(&key).map(|&slot| BufferId(slot))
  }

  /// Return the buffer for `key`, reserving a stream buffer when absent.
  ///
  /// On success `(id, existed)`: `existed` tells whether the key was
  /// already present. A newly reserved buffer is in the streaming state;
  /// reserving the key up front is what makes concurrent fetches of the
  /// same tile impossible.
  pub fn get_buffer(&self, key: TreeIndex, frame: u64) -> Result<(BufferId, bool)> {
    let mut inner = self.inner.lock().unwrap();
    if let Some(&slot) = inner.index.get(&key) {
      return Ok((BufferId(slot), true));
    }

    let victim = Self::pick_stream_buffer(&inner, frame).ok_or(GlobeError::CacheSaturated)?;
    if let Some(old) = inner.slots[victim as usize].key.take() {
      inner.index.remove(&old);
    }
    // The old payload is deliberately kept: stream buffers recycle their
    // allocation (node grids, GPU texture bundles) under the new key.
    let slot = &mut inner.slots[victim as usize];
    slot.key = Some(key);
    slot.state = SlotState::Streaming;
    slot.last_touched = frame;
    inner.index.insert(key, victim);
    Ok((BufferId(victim), false))
  }

  /// Victim selection: smallest `last_touched` among buffers that are not
  /// mid-stream, were last touched before the previous frame, and are not
  /// pinned for the current frame.
  fn pick_stream_buffer(inner: &Inner<T>, frame: u64) -> Option<u32> {
    let mut best: Option<(u64, u32)> = None;
    for (i, slot) in inner.slots.iter().enumerate() {
      if slot.state == SlotState::Streaming {
        continue;
      }
      if slot.last_touched + 1 >= frame || slot.pinned >= frame {
        continue;
      }
      if best.map_or(true, |(age, _)| slot.last_touched < age) {
        best = Some((slot.last_touched, i as u32));
      }
    }
    best.map(|(_, i)| i)
  }

  /// Install a payload and mark the buffer valid.
  pub fn complete(&self, id: BufferId, data: T) {
    let mut inner = self.inner.lock().unwrap();
    let slot = &mut inner.slots[id.0 as usize];
    slot.data = Some(Arc::new(data));
    slot.state = SlotState::Cached;
  }

  /// Mark a buffer valid without replacing its payload. The GPU tier uses
  /// this after refreshing a recycled texture bundle in place.
  pub fn mark_valid(&self, id: BufferId) {
    let mut inner = self.inner.lock().unwrap();
    let slot = &mut inner.slots[id.0 as usize];
    debug_assert!(slot.data.is_some());
    slot.state = SlotState::Cached;
  }

  /// Abandon a streaming buffer after a failed load; the slot returns to
  /// the free pool and the key is released.
  pub fn abort(&self, id: BufferId) {
    let mut inner = self.inner.lock().unwrap();
    if let Some(old) = inner.slots[id.0 as usize].key.take() {
      inner.index.remove(&old);
    }
    let slot = &mut inner.slots[id.0 as usize];
    slot.state = SlotState::Free;
    slot.data = None;
    slot.last_touched = 0;
    slot.pinned = 0;
  }

  /// Stamp the buffer as used this frame. Idempotent within a frame.
  pub fn touch(&self, id: BufferId, frame: u64) {
    let mut inner = self.inner.lock().unwrap();
    let slot = &mut inner.slots[id.0 as usize];
    slot.last_touched = slot.last_touched.max(frame);
  }

  /// Forbid eviction of the buffer through the given frame.
  pub fn pin(&self, id: BufferId, frame: u64) {
    let mut inner = self.inner.lock().unwrap();
    let slot = &mut inner.slots[id.0 as usize];
    slot.pinned = slot.pinned.max(frame);
  }

  /// "Payload fully populated, not mid-stream."
  pub fn is_valid(&self, id: BufferId) -> bool {
    self.inner.lock().unwrap().slots[id.0 as usize].state == SlotState::Cached
  }

  /// "Touched this frame."
  pub fn is_current(&self, id: BufferId, frame: u64) -> bool {
    self.inner.lock().unwrap().slots[id.0 as usize].last_touched == frame
  }

  /// Payload of a valid buffer.
  pub fn data(&self, id: BufferId) -> Option<Arc<T>> {
    let inner = self.inner.lock().unwrap();
    let slot = &inner.slots[id.0 as usize];
    if slot.state == SlotState::Cached {
      slot.data.clone()
    } else {
      None
    }
  }

  /// Payload regardless of validity; the GPU tier recycles the texture
  /// bundle of a reassigned slot through this.
  pub fn data_raw(&self, id: BufferId) -> Option<Arc<T>> {
    self.inner.lock().unwrap().slots[id.0 as usize].data.clone()
  }

  /// Key currently assigned to a buffer.
  pub fn key_of(&self, id: BufferId) -> Option<TreeIndex> {
    self.inner.lock().unwrap().slots[id.0 as usize].key
  }

  /// Convenience: payload for a key, if cached and valid.
  pub fn lookup(&self, key: TreeIndex) -> Option<Arc<T>> {
    let inner = self.inner.lock().unwrap();
    let &slot = inner.index.get(&key)?;
    let slot = &inner.slots[slot as usize];
    if slot.state == SlotState::Cached {
      slot.data.clone()
    } else {
      None
    }
  }
}

#[cfg(test)]
#[path = "tile_cache_test.rs"]
mod tile_cache_test;
