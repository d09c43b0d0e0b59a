//! Memoization of `(name, value)` producers as insertion-ordered maps.
//!
//! ```no_run
//! use std::path::PathBuf;
//! use poetry_licenses::{cache_packageinfo, get_packages, CachedProducer, PackageOptions};
//!
//! # fn main() -> poetry_licenses::Result<()> {
//! let cached = cache_packageinfo(1)?.wrap(|manifest: &PathBuf| {
//!     get_packages(manifest, &PackageOptions::default())
//! });
//!
//! let packages = cached.call(PathBuf::from("pyproject.toml"))?;
//! let again = cached.call(PathBuf::from("pyproject.toml"))?;
//! assert_eq!(cached.cache_info().hits, 1);
//! # Ok(())
//! # }
//! ```

use std::hash::Hash;
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use indexmap::IndexMap;
use lru::LruCache;

use crate::error::{Error, Result};
use crate::models::PackageInfo;

/// Materialized producer output: canonical name to value, in production order.
pub type PackageMap<V = PackageInfo> = IndexMap<String, V>;

/// Statistics of a [`CachedProducer`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheInfo {
    pub hits: u64,
    pub misses: u64,
    /// `None` when unbounded.
    pub maxsize: Option<usize>,
    pub currsize: usize,
}

/// A producer whose materialized results are memoized per argument value.
pub trait CachedProducer<A> {
    type Value;

    /// The map produced for `args`, from the cache when present.
    fn call(&self, args: A) -> Result<Arc<PackageMap<Self::Value>>>;

    fn cache_info(&self) -> CacheInfo;

    /// Drop every entry and reset the statistics.
    fn cache_clear(&self);
}

/// Capacity settings for [`PackageInfoCache`]; obtained from [`cache_packageinfo`].
#[derive(Debug, Clone, Copy)]
pub struct CacheBuilder {
    maxsize: Option<NonZeroUsize>,
}

/// Cache producer results in an LRU of `maxsize` entries, `0` meaning unbounded.
///
/// Negative sizes are rejected before anything is wrapped.
pub fn cache_packageinfo(maxsize: i64) -> Result<CacheBuilder> {
    if maxsize < 0 {
        return Err(Error::InvalidArgument(format!(
            "cache maxsize must not be negative, got {maxsize}"
        )));
    }

    let maxsize = usize::try_from(maxsize)
        .map_err(|_| Error::InvalidArgument(format!("cache maxsize {maxsize} is too large")))?;

    Ok(CacheBuilder {
        maxsize: NonZeroUsize::new(maxsize),
    })
}

impl CacheBuilder {
    /// Wrap `producer`; its `(name, value)` items are collected into a [`PackageMap`].
    pub fn wrap<A, V, I, F>(self, producer: F) -> PackageInfoCache<A, V, F>
    where
        A: Hash + Eq + Clone,
        F: Fn(&A) -> Result<I>,
        I: IntoIterator<Item = Result<(String, V)>>,
    {
        let entries = match self.maxsize {
            Some(cap) => LruCache::new(cap),
            None => LruCache::unbounded(),
        };

        PackageInfoCache {
            producer,
            maxsize: self.maxsize,
            state: Mutex::new(CacheState {
                entries,
                hits: 0,
                misses: 0,
            }),
        }
    }
}

struct CacheState<A: Hash + Eq, V> {
    entries: LruCache<A, Arc<PackageMap<V>>>,
    hits: u64,
    misses: u64,
}

/// LRU-memoized producer; see [`CachedProducer`].
///
/// The lock is released while the producer runs, so concurrent first calls with the
/// same arguments may both produce; the last one stored wins.
pub struct PackageInfoCache<A: Hash + Eq, V, F> {
    producer: F,
    maxsize: Option<NonZeroUsize>,
    state: Mutex<CacheState<A, V>>,
}

impl<A: Hash + Eq, V, F> PackageInfoCache<A, V, F> {
    fn state(&self) -> MutexGuard<'_, CacheState<A, V>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<A, V, I, F> CachedProducer<A> for PackageInfoCache<A, V, F>
where
    A: Hash + Eq + Clone,
    F: Fn(&A) -> Result<I>,
    I: IntoIterator<Item = Result<(String, V)>>,
{
    type Value = V;

    fn call(&self, args: A) -> Result<Arc<PackageMap<V>>> {
        {
            let mut state = self.state();
            if let Some(map) = state.entries.get(&args).cloned() {
                state.hits += 1;
                tracing::debug!(entries = map.len(), "package cache hit");
                return Ok(map);
            }
            state.misses += 1;
        }

        let mut map = PackageMap::new();
        for item in (self.producer)(&args)? {
            let (name, value) = item?;
            map.insert(name, value);
        }
        let map = Arc::new(map);
        tracing::debug!(entries = map.len(), "package cache miss");

        self.state().entries.put(args, Arc::clone(&map));
        Ok(map)
    }

    fn cache_info(&self) -> CacheInfo {
        let state = self.state();
        CacheInfo {
            hits: state.hits,
            misses: state.misses,
            maxsize: self.maxsize.map(NonZeroUsize::get),
            currsize: state.entries.len(),
        }
    }

    fn cache_clear(&self) {
        let mut state = self.state();
        state.entries.clear();
        state.hits = 0;
        state.misses = 0;
    }
}

impl<A: Hash + Eq, V, F> std::fmt::Debug for PackageInfoCache<A, V, F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state();
        f.debug_struct("PackageInfoCache")
            .field("maxsize", &self.maxsize)
            .field("hits", &state.hits)
            .field("misses", &state.misses)
            .field("currsize", &state.entries.len())
            .finish()
    }
}
