/* crates/herald-server/src/cache.rs */

//! Per-path page cache implementing block-and-cache fallback and
//! stale-while-revalidate regeneration.
//!
//! ```text
//! Unbuilt --request (Blocking)--> Building --done--> Built
//! Built --ttl expires / mark_stale--> Stale --background render--> Built
//! ```
//!
//! At most one render is in flight per path. Requests arriving while a path
//! is Building share that render; requests arriving while it is Stale get
//! the previous result immediately.
//!
//! Paths built on demand are bounded by a capacity. Misses are dropped first
//! and expire after [`NOT_FOUND_TTL`] at most. Prerendered pages are never
//! evicted.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use futures_util::FutureExt;
use futures_util::future::{BoxFuture, Shared};
use tokio::time::Instant;

use crate::page::{PageResult, Props};
use crate::route::{FallbackMode, Revalidate, RouteTemplate};

pub const DEFAULT_CAPACITY: usize = 10_000;
/// Longest a cached `NotFound` is served before it is rendered again.
pub const NOT_FOUND_TTL: Duration = Duration::from_secs(60);

type SharedRender = Shared<BoxFuture<'static, Arc<PageResult>>>;

enum Slot {
  Building {
    render: SharedRender,
    generation: u64,
    /// Invalidated while the first render was running.
    stale_on_arrival: bool,
  },
  Built {
    result: Arc<PageResult>,
    built_at: Instant,
    ttl: Option<Duration>,
    stale: bool,
    revalidating: bool,
    /// Bumped on every invalidation, so a regeneration that started before
    /// an invalidation does not clear it.
    epoch: u64,
    /// Built on demand rather than prerendered.
    evictable: bool,
  },
}

/// Observable state of one cached path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryState {
  Unbuilt,
  Building,
  Built { ttl_remaining: Option<Duration> },
  Stale { revalidating: bool },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StaleOutcome {
  MarkedStale,
  /// Nothing cached under this key; the next request builds it anyway.
  NotCached,
}

#[derive(Clone)]
pub struct PageCache {
  entries: Arc<Mutex<HashMap<String, Slot>>>,
  generations: Arc<std::sync::atomic::AtomicU64>,
  capacity: usize,
}

impl Default for PageCache {
  fn default() -> Self {
    Self::with_capacity(DEFAULT_CAPACITY)
  }
}

impl PageCache {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn with_capacity(capacity: usize) -> Self {
    Self {
      entries: Arc::default(),
      generations: Arc::default(),
      capacity: capacity.max(1),
    }
  }

  fn lock(&self) -> MutexGuard<'_, HashMap<String, Slot>> {
    self.entries.lock().unwrap_or_else(PoisonError::into_inner)
  }

  /// Serve `key` under `template`'s policy. `render` is only invoked when a
  /// new render has to start.
  pub async fn serve<F>(&self, key: &str, template: &RouteTemplate, render: F) -> Arc<PageResult>
  where
    F: FnOnce() -> BoxFuture<'static, PageResult>,
  {
    if template.revalidate.is_dynamic() {
      return Arc::new(render().await);
    }

    let (shared, generation) = {
      let mut entries = self.lock();
      match entries.get_mut(key) {
        Some(Slot::Built { result, built_at, ttl, stale, revalidating, epoch, .. }) => {
          let expired = ttl.is_some_and(|ttl| built_at.elapsed() >= ttl);
          if (expired || *stale) && !*revalidating {
            *revalidating = true;
            self.spawn_regeneration(key, *epoch, template.revalidate, render());
          }
          return result.clone();
        }
        Some(Slot::Building { render: pending, generation, .. }) => (pending.clone(), *generation),
        None => {
          if template.fallback == FallbackMode::NotFound {
            return Arc::new(PageResult::NotFound);
          }
          self.make_room(&mut entries);
          let generation = self.generations.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
          let shared = spawn_shared(render());
          entries.insert(
            key.to_string(),
            Slot::Building { render: shared.clone(), generation, stale_on_arrival: false },
          );
          tracing::debug!(key, "building page on demand");
          (shared, generation)
        }
      }
    };

    let result = shared.await;
    self.finish_build(key, generation, &result, template.revalidate);
    result
  }

  fn finish_build(
    &self,
    key: &str,
    generation: u64,
    result: &Arc<PageResult>,
    revalidate: Revalidate,
  ) {
    let mut entries = self.lock();
    let stale_on_arrival = match entries.get(key) {
      Some(Slot::Building { generation: g, stale_on_arrival, .. }) if *g == generation => {
        *stale_on_arrival
      }
      // Another waiter already stored it.
      _ => return,
    };
    if matches!(**result, PageResult::ServerError { .. }) {
      entries.remove(key);
      return;
    }
    entries.insert(
      key.to_string(),
      Slot::Built {
        result: result.clone(),
        built_at: Instant::now(),
        ttl: ttl_for(result, revalidate),
        stale: stale_on_arrival,
        revalidating: false,
        epoch: 0,
        evictable: true,
      },
    );
  }

  /// Evict on-demand entries until one more fits: misses first, then the
  /// oldest build. In-flight renders and prerendered pages stay.
  fn make_room(&self, entries: &mut HashMap<String, Slot>) {
    while entries.len() >= self.capacity {
      let victim = entries
        .iter()
        .filter_map(|(key, slot)| match slot {
          Slot::Built { result, built_at, evictable: true, .. } => {
            Some((!matches!(**result, PageResult::NotFound), *built_at, key))
          }
          _ => None,
        })
        .min_by_key(|(found, built_at, _)| (*found, *built_at))
        .map(|(_, _, key)| key.clone());
      let Some(key) = victim else {
        return;
      };
      tracing::debug!(key = %key, "evicting cached page");
      entries.remove(&key);
    }
  }

  fn spawn_regeneration(
    &self,
    key: &str,
    epoch: u64,
    revalidate: Revalidate,
    render: BoxFuture<'static, PageResult>,
  ) {
    let cache = self.clone();
    let key = key.to_string();
    tracing::info!(key = %key, "regenerating stale page in background");
    tokio::spawn(async move {
      let outcome = tokio::spawn(render).await;
      let mut entries = cache.lock();
      let Some(Slot::Built { result, built_at, ttl, stale, revalidating, epoch: current, .. }) =
        entries.get_mut(&key)
      else {
        return;
      };
      *revalidating = false;
      match outcome {
        Ok(PageResult::ServerError { .. }) => {
          tracing::warn!(key = %key, "regeneration failed; keeping previous page");
        }
        Ok(fresh) => {
          *ttl = ttl_for(&fresh, revalidate);
          *result = Arc::new(fresh);
          *built_at = Instant::now();
          *stale = *current != epoch;
        }
        Err(e) => {
          tracing::error!(key = %key, error = %e, "regeneration panicked; keeping previous page");
        }
      }
    });
  }

  /// Store a prerendered page as freshly built. Dynamic templates are never cached.
  pub fn insert_built(&self, key: &str, result: PageResult, revalidate: Revalidate) {
    if revalidate.is_dynamic() || matches!(result, PageResult::ServerError { .. }) {
      return;
    }
    self.lock().insert(
      key.to_string(),
      Slot::Built {
        ttl: ttl_for(&result, revalidate),
        result: Arc::new(result),
        built_at: Instant::now(),
        stale: false,
        revalidating: false,
        epoch: 0,
        evictable: false,
      },
    );
  }

  /// Force `key` stale regardless of its remaining TTL.
  pub fn mark_stale(&self, key: &str) -> StaleOutcome {
    match self.lock().get_mut(key) {
      Some(Slot::Built { stale, epoch, .. }) => {
        *stale = true;
        *epoch += 1;
        StaleOutcome::MarkedStale
      }
      Some(Slot::Building { stale_on_arrival, .. }) => {
        *stale_on_arrival = true;
        StaleOutcome::MarkedStale
      }
      None => StaleOutcome::NotCached,
    }
  }

  pub fn state(&self, key: &str) -> EntryState {
    match self.lock().get(key) {
      None => EntryState::Unbuilt,
      Some(Slot::Building { .. }) => EntryState::Building,
      Some(Slot::Built { built_at, ttl, stale, revalidating, .. }) => {
        let elapsed = built_at.elapsed();
        let expired = ttl.is_some_and(|ttl| elapsed >= ttl);
        if *stale || expired {
          EntryState::Stale { revalidating: *revalidating }
        } else {
          EntryState::Built { ttl_remaining: ttl.map(|ttl| ttl - elapsed) }
        }
      }
    }
  }

  /// The cached result, without triggering anything.
  pub fn peek(&self, key: &str) -> Option<Arc<PageResult>> {
    match self.lock().get(key) {
      Some(Slot::Built { result, .. }) => Some(result.clone()),
      _ => None,
    }
  }

  pub fn len(&self) -> usize {
    self.lock().len()
  }

  pub fn is_empty(&self) -> bool {
    self.lock().is_empty()
  }
}

fn ttl_for(result: &PageResult, revalidate: Revalidate) -> Option<Duration> {
  let ttl = revalidate.effective(false);
  if matches!(result, PageResult::NotFound) {
    Some(ttl.map_or(NOT_FOUND_TTL, |ttl| ttl.min(NOT_FOUND_TTL)))
  } else {
    ttl
  }
}

/// Run a render on its own task so it completes even if every requester
/// goes away, and let any number of requesters await it.
fn spawn_shared(render: BoxFuture<'static, PageResult>) -> SharedRender {
  let handle = tokio::spawn(render);
  async move {
    match handle.await {
      Ok(result) => Arc::new(result),
      Err(e) => {
        tracing::error!(error = %e, "page render panicked");
        Arc::new(PageResult::ServerError { fallback_props: Props::new() })
      }
    }
  }
  .boxed()
  .shared()
}
