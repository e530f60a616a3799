use crate::error::GlobeError;
use crate::tree_index::TreeIndex;

use super::TileCache;

fn key(n: u8) -> TreeIndex {
  TreeIndex::root(n)
}

#[test]
fn test_get_buffer_reserves_key() {
  let cache: TileCache<u32> = TileCache::new(4);
  let frame = 2;

  let (id, existed) = cache.get_buffer(key(0), frame).unwrap();
  assert!(!existed);
  assert!(!cache.is_valid(id));
  assert_eq!(cache.key_of(id), Some(key(0)));

  // Same key returns the same buffer; no second fetch can start.
  let (again, existed) = cache.get_buffer(key(0), frame).unwrap();
  assert!(existed);
  assert_eq!(again, id);
  assert_eq!(cache.len(), 1);
}

#[test]
fn test_complete_makes_valid() {
  let cache: TileCache<u32> = TileCache::new(2);
  let (id, _) = cache.get_buffer(key(1), 2).unwrap();
  assert!(cache.data(id).is_none());
  cache.complete(id, 42);
  assert!(cache.is_valid(id));
  assert_eq!(*cache.data(id).unwrap(), 42);
  assert_eq!(*cache.lookup(key(1)).unwrap(), 42);
}

#[test]
fn test_find_cached_does_not_touch() {
  let cache: TileCache<u32> = TileCache::new(2);
  let (id, _) = cache.get_buffer(key(1), 2).unwrap();
  cache.complete(id, 1);
  assert_eq!(cache.find_cached(key(1)), Some(id));
  assert!(!cache.is_current(id, 50));
  assert_eq!(cache.find_cached(key(9)), None);
}

#[test]
fn test_touch_is_idempotent_within_a_frame() {
  let cache: TileCache<u32> = TileCache::new(2);
  let (id, _) = cache.get_buffer(key(1), 2).unwrap();
  cache.touch(id, 5);
  assert!(cache.is_current(id, 5));
  cache.touch(id, 5);
  assert!(cache.is_current(id, 5));
  // Touching never moves the stamp backwards.
  cache.touch(id, 3);
  assert!(cache.is_current(id, 5));
}

#[test]
fn test_eviction_prefers_oldest() {
  let cache: TileCache<u32> = TileCache::new(2);
  let (a, _) = cache.get_buffer(key(0), 2).unwrap();
  cache.complete(a, 0);
  let (b, _) = cache.get_buffer(key(1), 2).unwrap();
  cache.complete(b, 1);
  cache.touch(a, 3);
  cache.touch(b, 4);

  // At frame 6, both are evictable; the older one (a) must be chosen.
  let (c, existed) = cache.get_buffer(key(2), 6).unwrap();
  assert!(!existed);
  assert_eq!(c, a);
  assert_eq!(cache.find_cached(key(0)), None);
  assert_eq!(cache.find_cached(key(1)), Some(b));
}

#[test]
fn test_recently_touched_is_protected() {
  let cache: TileCache<u32> = TileCache::new(1);
  let (a, _) = cache.get_buffer(key(0), 2).unwrap();
  cache.complete(a, 0);
  cache.touch(a, 4);

  // Frame 4 (touched this frame) and frame 5 (touched previous frame) must
  // both refuse to reassign the buffer.
  for frame in [4, 5] {
    match cache.get_buffer(key(1), frame) {
      Err(GlobeError::CacheSaturated) => {}
      other => panic!("expected saturation, got {other:?}"),
    }
  }

  // Frame 6: the buffer has aged out.
  let (b, _) = cache.get_buffer(key(1), 6).unwrap();
  assert_eq!(b, a);
}

#[test]
fn test_pin_blocks_eviction() {
  let cache: TileCache<u32> = TileCache::new(1);
  let (a, _) = cache.get_buffer(key(0), 2).unwrap();
  cache.complete(a, 0);
  cache.pin(a, 10);

  for frame in [6, 9, 10] {
    assert!(matches!(
      cache.get_buffer(key(1), frame),
      Err(GlobeError::CacheSaturated)
    ));
  }
  // One frame past the pin the buffer is reclaimable.
  assert!(cache.get_buffer(key(1), 11).is_ok());
}

#[test]
fn test_streaming_buffer_is_never_stolen() {
  let cache: TileCache<u32> = TileCache::new(1);
  let (_a, _) = cache.get_buffer(key(0), 2).unwrap();
  // Not completed: still streaming. Even far in the future it cannot be
  // reassigned.
  assert!(matches!(
    cache.get_buffer(key(1), 100),
    Err(GlobeError::CacheSaturated)
  ));
}

#[test]
fn test_abort_releases_slot_and_key() {
  let cache: TileCache<u32> = TileCache::new(1);
  let (a, _) = cache.get_buffer(key(0), 2).unwrap();
  cache.abort(a);
  assert_eq!(cache.find_cached(key(0)), None);
  let (b, existed) = cache.get_buffer(key(1), 2).unwrap();
  assert!(!existed);
  assert_eq!(b, a);
}

#[test]
fn test_one_buffer_per_key() {
  let cache: TileCache<u32> = TileCache::new(8);
  for frame in 2..6 {
    let (_, _) = cache.get_buffer(key(3), frame).unwrap();
  }
  assert_eq!(cache.len(), 1);
}

#[test]
fn test_mark_valid_keeps_payload() {
  let cache: TileCache<u32> = TileCache::new(2);
  let (a, _) = cache.get_buffer(key(0), 2).unwrap();
  cache.complete(a, 7);
  // Reassign the slot at a later frame; payload survives for recycling.
  let (b, _) = cache.get_buffer(key(1), 9).unwrap();
  assert_eq!(b, a);
  assert!(!cache.is_valid(b));
  assert_eq!(*cache.data_raw(b).unwrap(), 7);
  cache.mark_valid(b);
  assert!(cache.is_valid(b));
  assert_eq!(*cache.lookup(key(1)).unwrap(), 7);
}
