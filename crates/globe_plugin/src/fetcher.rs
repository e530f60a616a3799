//! Fetcher - background worker satisfying ranked tile requests.
//!
//! The render thread pushes request batches through a bounded channel and
//! never blocks on I/O; the worker keeps a priority queue (dedup by target,
//! higher priority wins), loads tiles from the quadtree files it owns, and
//! installs finished nodes into the main cache. Completion notices flow
//! back through a second channel that the driver drains at frame start.
//!
//! A batch stamped with a newer frame purges everything still queued from
//! older frames; a request not re-issued by the new frame's refinement pass
//! is stale by definition.

use std::collections::{BinaryHeap, HashMap};
use std::sync::Arc;
use std::thread::JoinHandle;

use crossbeam_channel::{bounded, Receiver, Sender, TryRecvError};
use log::{debug, warn};

use crate::cache::{CacheRequest, TileCache};
use crate::data_manager::TileStore;
use crate::error::GlobeError;
use crate::frame::FrameClock;
use crate::node::Node;
use crate::tree_index::TreeIndex;

/// Completion notice for one request.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FetchOutcome {
  Loaded(TreeIndex),
  Failed(TreeIndex),
}

struct RequestBatch {
  frame: u64,
  requests: Vec<CacheRequest>,
}

/// Handle to the background worker. Dropping it shuts the worker down.
pub struct Fetcher {
  requests_tx: Option<Sender<RequestBatch>>,
  completed_rx: Receiver<FetchOutcome>,
  handle: Option<JoinHandle<()>>,
}

impl Fetcher {
  /// Spawn the worker thread, transferring ownership of the tile store.
  pub fn spawn(cache: Arc<TileCache<Node>>, clock: FrameClock, store: TileStore) -> Self {
    let (requests_tx, requests_rx) = bounded::<RequestBatch>(16);
    let (completed_tx, completed_rx) = bounded::<FetchOutcome>(1024);

    let handle = std::thread::Builder::new()
      .name("tile-fetcher".into())
      .spawn(move || worker(cache, clock, store, requests_rx, completed_tx))
      .expect("failed to spawn fetcher thread");

    Self {
      requests_tx: Some(requests_tx),
      completed_rx,
      handle: Some(handle),
    }
  }

  /// Hand a batch of prioritized requests to the worker (non-blocking).
  /// A full queue drops the batch; the next frame re-issues what still
  /// matters.
  pub fn submit(&self, frame: u64, requests: Vec<CacheRequest>) {
    if requests.is_empty() {
      return;
    }
    let Some(tx) = &self.requests_tx else {
      return;
    };
    if tx.try_send(RequestBatch { frame, requests }).is_err() {
      debug!("fetcher queue full, dropping request batch for frame {frame}");
    }
  }

  /// Drain completion notices accumulated since the last call.
  pub fn drain_completed(&self) -> Vec<FetchOutcome> {
    let mut out = Vec::new();
    while let Ok(outcome) = self.completed_rx.try_recv() {
      out.push(outcome);
    }
    out
  }
}

impl Drop for Fetcher {
  fn drop(&mut self) {
    self.requests_tx.take();
    if let Some(handle) = self.handle.take() {
      let _ = handle.join();
    }
  }
}

/// Heap entry ordered by priority; lazily invalidated through the dedup map.
struct Pending {
  priority: f32,
  request: CacheRequest,
}

impl PartialEq for Pending {
  fn eq(&self, other: &Self) -> bool {
    self.priority == other.priority
  }
}
impl Eq for Pending {}
impl PartialOrd for Pending {
  fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
    Some(self.cmp(other))
  }
}
impl Ord for Pending {
  fn cmp(&self, other: &Self) -> std::cmp::Ordering {
    self.priority.total_cmp(&other.priority)
  }
}

fn worker(
  cache: Arc<TileCache<Node>>,
  clock: FrameClock,
  mut store: TileStore,
  requests_rx: Receiver<RequestBatch>,
  completed_tx: Sender<FetchOutcome>,
) {
  let mut queue: BinaryHeap<Pending> = BinaryHeap::new();
  let mut queued: HashMap<TreeIndex, f32> = HashMap::new();
  let mut batch_frame = 0u64;

  loop {
    // Block when idle, otherwise just drain whatever arrived.
    if queue.is_empty() {
      match requests_rx.recv() {
        Ok(batch) => merge(&mut queue, &mut queued, &mut batch_frame, batch),
        Err(_) => return,
      }
    }
    loop {
      match requests_rx.try_recv() {
        Ok(batch) => merge(&mut queue, &mut queued, &mut batch_frame, batch),
        Err(TryRecvError::Empty) => break,
        Err(TryRecvError::Disconnected) => return,
      }
    }

    let Some(pending) = queue.pop() else {
      continue;
    };
    let target = pending.request.target();
    // Skip entries superseded by a higher-priority duplicate or a purge.
    if queued.get(&target) != Some(&pending.priority) {
      continue;
    }
    queued.remove(&target);

    let outcome = fetch_one(&cache, &clock, &mut store, &pending.request);
    let _ = completed_tx.try_send(outcome);
  }
}

fn merge(
  queue: &mut BinaryHeap<Pending>,
  queued: &mut HashMap<TreeIndex, f32>,
  batch_frame: &mut u64,
  batch: RequestBatch,
) {
  if batch.frame > *batch_frame {
    // Everything not re-issued by the new frame is stale.
    queue.clear();
    queued.clear();
    *batch_frame = batch.frame;
  }
  for request in batch.requests {
    let target = request.target();
    let priority = request.priority;
    let keep = queued.get(&target).map_or(true, |&old| priority > old);
    if keep {
      queued.insert(target, priority);
      queue.push(Pending { priority, request });
    }
  }
}

/// Satisfy a single request against the cache. Also used directly by the
/// synchronous probes' tests.
pub(crate) fn fetch_one(
  cache: &TileCache<Node>,
  clock: &FrameClock,
  store: &mut TileStore,
  request: &CacheRequest,
) -> FetchOutcome {
  let target = request.target();

  // Already satisfied; drop silently.
  if let Some(id) = cache.find_cached(target) {
    if cache.is_valid(id) {
      return FetchOutcome::Loaded(target);
    }
  }

  let Some(parent) = cache.lookup(request.parent) else {
    debug!("parent {} evicted before fetch of {}", request.parent, target);
    return FetchOutcome::Failed(target);
  };

  let child = request.child as usize;
  let dem_tile = parent.child_dem_tiles[child];
  let color_tile = parent.child_color_tiles[child];
  if !dem_tile.is_valid() && !color_tile.is_valid() {
    debug!("no tile on disk for {target}");
    return FetchOutcome::Failed(target);
  }

  let frame = clock.frame();
  let (id, existed) = match cache.get_buffer(target, frame) {
    Ok(pair) => pair,
    Err(GlobeError::CacheSaturated) => {
      debug!("cache saturated, dropping request for {target}");
      return FetchOutcome::Failed(target);
    }
    Err(err) => {
      warn!("cache admission failed for {target}: {err}");
      return FetchOutcome::Failed(target);
    }
  };
  if existed && cache.is_valid(id) {
    return FetchOutcome::Loaded(target);
  }

  let scope = parent.scope.split(true)[child];
  match store.load_node(target, scope, dem_tile, color_tile, &clock.snapshot()) {
    Ok(node) => {
      cache.complete(id, node);
      FetchOutcome::Loaded(target)
    }
    Err(err) => {
      warn!("tile load failed for {target}: {err}");
      cache.abort(id);
      FetchOutcome::Failed(target)
    }
  }
}

/// Test-only synchronous fetch used to stage toy cache states.
#[cfg(test)]
pub(crate) fn fetch_child_for_test(
  cache: &TileCache<Node>,
  clock: &FrameClock,
  store: &mut TileStore,
  parent: TreeIndex,
  child: u8,
) -> FetchOutcome {
  fetch_one(cache, clock, store, &CacheRequest::new(0.0, parent, child))
}

/// Request helper shared by the synchronous probes (`height_at`,
/// `snap_to_surface`): forward missing-children requests at neutral
/// priority.
pub(crate) fn probe_requests(parent: TreeIndex, children: &[u8]) -> Vec<CacheRequest> {
  children
    .iter()
    .map(|&child| CacheRequest::new(0.0, parent, child))
    .collect()
}

#[cfg(test)]
#[path = "fetcher_test.rs"]
mod fetcher_test;
