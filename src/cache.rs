//! In-memory render cache with dependency-driven invalidation.
//!
//! Rendering a page can be expensive (templating, includes, layouts), so the
//! dev server keeps each rendered body until something it was built from
//! changes. "Built from" is exactly what the renderer declared: the source
//! file plus the dependency set returned with that render.
//!
//! # Design
//!
//! ## Keys and entries
//!
//! Entries are keyed by the absolute source path. Each holds the body, its
//! content type, the declared dependencies and a generation number that
//! increases with every stored render. A fresh render *replaces* the
//! dependency set; sets are never merged.
//!
//! ## Invalidation
//!
//! A [`ChangeEvent`] for path `P` drops every entry whose source is `P` or
//! whose dependencies contain `P`. A `Removed` event also drops entries under
//! `P` when `P` was a directory. There is no transitive walk: renderers
//! declare nested dependencies themselves.
//!
//! ## Single-flight
//!
//! Concurrent misses for one path share a single render. The first caller
//! renders; later callers block on the same flight and receive its result,
//! error included.
//!
//! ## Races with invalidation
//!
//! Any change event detaches every flight still rendering: its callers get
//! the result, but it is not stored, and the next `render` starts over. An
//! event observed before a call therefore always forces that call to miss
//! any render that began before the event.
//!
//! ## Locking
//!
//! One mutex guards the whole map. It is never held while a renderer runs.

use crate::event::{ChangeEvent, ChangeKind};
use crate::render::{RenderError, Rendered, Renderer};
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::mpsc::Receiver;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::JoinHandle;

/// A rendered body handed out by the cache.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page {
    pub body: Arc<[u8]>,
    pub content_type: String,
    /// Generation of the render that produced this body.
    pub generation: u64,
}

#[derive(Debug)]
struct CacheEntry {
    source_path: PathBuf,
    body: Arc<[u8]>,
    content_type: String,
    dependencies: BTreeSet<PathBuf>,
    generation: u64,
}

impl CacheEntry {
    fn page(&self) -> Page {
        Page {
            body: Arc::clone(&self.body),
            content_type: self.content_type.clone(),
            generation: self.generation,
        }
    }

    fn is_stale(&self, event: &ChangeEvent) -> bool {
        let affected = |path: &Path| match event.kind {
            ChangeKind::Modified => path == event.path,
            ChangeKind::Removed => path.starts_with(&event.path),
        };
        affected(&self.source_path) || self.dependencies.iter().any(|dep| affected(dep))
    }
}

enum Slot {
    Ready(CacheEntry),
    Rendering(Arc<Flight>),
}

/// A render in progress that other callers can wait on.
#[derive(Default)]
struct Flight {
    outcome: Mutex<Option<Result<Page, RenderError>>>,
    done: Condvar,
}

impl Flight {
    fn wait(&self) -> Result<Page, RenderError> {
        let mut outcome = lock(&self.outcome);
        loop {
            if let Some(result) = outcome.as_ref() {
                return result.clone();
            }
            outcome = self
                .done
                .wait(outcome)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    fn finish(&self, result: Result<Page, RenderError>) {
        *lock(&self.outcome) = Some(result);
        self.done.notify_all();
    }
}

#[derive(Default)]
struct CacheState {
    slots: HashMap<PathBuf, Slot>,
    generation: u64,
    stats: CacheStats,
}

/// Memoizes renders per source path. Shared between request handlers and
/// the invalidation listener behind an [`Arc`].
pub struct RenderCache {
    renderer: Arc<dyn Renderer>,
    state: Mutex<CacheState>,
}

impl RenderCache {
    pub fn new(renderer: Arc<dyn Renderer>) -> Self {
        Self {
            renderer,
            state: Mutex::new(CacheState::default()),
        }
    }

    /// Return the cached page for `source`, rendering it on a miss.
    ///
    /// Failed renders are not cached.
    pub fn render(&self, source: &Path) -> Result<Page, RenderError> {
        let flight = {
            let mut guard = lock(&self.state);
            let state = &mut *guard;
            match state.slots.get(source) {
                Some(Slot::Ready(entry)) => {
                    state.stats.hit();
                    tracing::trace!(source = %source.display(), "render cache hit");
                    return Ok(entry.page());
                }
                Some(Slot::Rendering(flight)) => {
                    let flight = Arc::clone(flight);
                    state.stats.coalesce();
                    drop(guard);
                    return flight.wait();
                }
                None => {
                    let flight = Arc::new(Flight::default());
                    state
                        .slots
                        .insert(source.to_path_buf(), Slot::Rendering(Arc::clone(&flight)));
                    state.stats.render();
                    flight
                }
            }
        };

        let in_flight = InFlight {
            cache: self,
            source,
            flight,
            finished: false,
        };
        let result = self.renderer.render(source);
        in_flight.complete(result)
    }

    /// Apply one change event. Returns the number of slots dropped.
    pub fn invalidate(&self, event: &ChangeEvent) -> usize {
        let mut guard = lock(&self.state);
        let state = &mut *guard;
        let before = state.slots.len();
        state.slots.retain(|_, slot| match slot {
            Slot::Ready(entry) => !entry.is_stale(event),
            Slot::Rendering(_) => false,
        });
        let dropped = before - state.slots.len();
        state.stats.invalidate(dropped);
        if dropped > 0 {
            tracing::debug!(path = %event.path.display(), dropped, "render cache invalidated");
        }
        dropped
    }

    /// Apply events from `events` on a background thread until every sender
    /// is dropped.
    pub fn listen(self: &Arc<Self>, events: Receiver<ChangeEvent>) -> io::Result<JoinHandle<()>> {
        let cache = Arc::clone(self);
        std::thread::Builder::new()
            .name("render-cache-invalidation".into())
            .spawn(move || {
                for event in events {
                    cache.invalidate(&event);
                }
                tracing::debug!("change channel closed");
            })
    }

    pub fn clear(&self) {
        lock(&self.state).slots.clear();
    }

    /// Number of cached or in-flight entries.
    pub fn len(&self) -> usize {
        lock(&self.state).slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// True when a finished render for `source` is cached.
    pub fn contains(&self, source: &Path) -> bool {
        matches!(lock(&self.state).slots.get(source), Some(Slot::Ready(_)))
    }

    pub fn stats(&self) -> CacheStats {
        lock(&self.state).stats
    }

    /// Record a finished render and produce the page for its callers.
    fn store(
        &self,
        source: &Path,
        flight: &Arc<Flight>,
        result: Result<Rendered, RenderError>,
    ) -> Result<Page, RenderError> {
        let mut guard = lock(&self.state);
        let state = &mut *guard;
        let current = matches!(
            state.slots.get(source),
            Some(Slot::Rendering(f)) if Arc::ptr_eq(f, flight)
        );

        match result {
            Ok(rendered) => {
                state.generation += 1;
                let entry = CacheEntry {
                    source_path: source.to_path_buf(),
                    body: rendered.body.into(),
                    content_type: rendered.content_type,
                    dependencies: rendered.dependencies,
                    generation: state.generation,
                };
                let page = entry.page();
                if current {
                    state.slots.insert(source.to_path_buf(), Slot::Ready(entry));
                } else {
                    tracing::debug!(
                        source = %source.display(),
                        "render finished after invalidation; not cached"
                    );
                }
                Ok(page)
            }
            Err(err) => {
                if current {
                    state.slots.remove(source);
                }
                Err(err)
            }
        }
    }
}

/// Completes a flight exactly once, even if the renderer panics.
struct InFlight<'a> {
    cache: &'a RenderCache,
    source: &'a Path,
    flight: Arc<Flight>,
    finished: bool,
}

impl InFlight<'_> {
    fn complete(mut self, result: Result<Rendered, RenderError>) -> Result<Page, RenderError> {
        self.finished = true;
        let outcome = self.cache.store(self.source, &self.flight, result);
        self.flight.finish(outcome.clone());
        outcome
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        if !self.finished {
            let err = RenderError::failed(self.source, "renderer panicked");
            let outcome = self.cache.store(self.source, &self.flight, Err(err));
            self.flight.finish(outcome);
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Counters describing how the cache has been used. They saturate instead of
/// wrapping on a long-running server.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub renders: u64,
    pub coalesced: u64,
    pub invalidations: u64,
}

impl CacheStats {
    pub fn hit(&mut self) {
        self.hits = self.hits.saturating_add(1);
    }

    pub fn render(&mut self) {
        self.renders = self.renders.saturating_add(1);
    }

    pub fn coalesce(&mut self) {
        self.coalesced = self.coalesced.saturating_add(1);
    }

    pub fn invalidate(&mut self, count: usize) {
        let count = u64::try_from(count).unwrap_or(u64::MAX);
        self.invalidations = self.invalidations.saturating_add(count);
    }

    /// Requests served, whether from cache, a fresh render, or a shared one.
    pub fn total(&self) -> u64 {
        self.hits
            .saturating_add(self.renders)
            .saturating_add(self.coalesced)
    }
}

impl fmt::Display for CacheStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.hits > 0 || self.coalesced > 0 {
            if self.coalesced > 0 {
                write!(
                    f,
                    "{} cached, {} shared, {} rendered ({} total)",
                    self.hits,
                    self.coalesced,
                    self.renders,
                    self.total()
                )?;
            } else {
                write!(
                    f,
                    "{} cached, {} rendered ({} total)",
                    self.hits,
                    self.renders,
                    self.total()
                )?;
            }
        } else {
            write!(f, "{} rendered", self.renders)?;
        }
        if self.invalidations > 0 {
            write!(f, ", {} invalidated", self.invalidations)?;
        }
        Ok(())
    }
}
