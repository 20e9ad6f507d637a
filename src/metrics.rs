//! Cache performance metrics.

use std::sync::atomic::{AtomicU64, Ordering};

/// Snapshot of cache activity.
///
/// # Example
///
/// ```
/// use construct_cache::ConstructionCache;
///
/// let cache: ConstructionCache<String> = ConstructionCache::new();
/// // ... perform cache operations ...
///
/// let metrics = cache.metrics();
/// println!("Hit rate: {:.2}%", metrics.hit_rate() * 100.0);
/// println!("Constructions: {}", metrics.constructions);
/// ```
#[non_exhaustive]
#[derive(Debug, Clone, Default)]
pub struct CacheMetrics {
	/// Lookups answered from the fast path.
	pub hits: u64,
	/// Lookups that found no entry on the fast path.
	pub misses: u64,
	/// Factory invocations that succeeded and were stored.
	pub constructions: u64,
	/// Factory invocations that returned an error or panicked.
	pub failures: u64,
	/// Misses that found the value already stored after waiting on the key lock.
	pub races_lost: u64,
	/// Current number of stored values.
	pub entry_count: usize,
	/// Current number of per-key construction locks.
	pub lock_count: usize,
}

impl CacheMetrics {
	/// Fast-path hit rate between 0.0 and 1.0.
	///
	/// Returns 0.0 if there have been no lookups.
	pub fn hit_rate(&self) -> f64 {
		let total = self.hits + self.misses;
		if total == 0 {
			0.0
		} else {
			self.hits as f64 / total as f64
		}
	}

	/// Total number of lookups (hits + misses).
	pub fn total_accesses(&self) -> u64 {
		self.hits + self.misses
	}
}

/// Relaxed counters shared by both cache flavours.
#[derive(Default)]
pub(crate) struct Counters {
	hits: AtomicU64,
	misses: AtomicU64,
	constructions: AtomicU64,
	failures: AtomicU64,
	races_lost: AtomicU64,
}

impl Counters {
	pub fn hit(&self) {
		self.hits.fetch_add(1, Ordering::Relaxed);
	}

	pub fn miss(&self) {
		self.misses.fetch_add(1, Ordering::Relaxed);
	}

	pub fn constructed(&self) {
		self.constructions.fetch_add(1, Ordering::Relaxed);
	}

	pub fn failed(&self) {
		self.failures.fetch_add(1, Ordering::Relaxed);
	}

	pub fn race_lost(&self) {
		self.races_lost.fetch_add(1, Ordering::Relaxed);
	}

	pub fn snapshot(&self, entry_count: usize, lock_count: usize) -> CacheMetrics {
		CacheMetrics {
			hits: self.hits.load(Ordering::Relaxed),
			misses: self.misses.load(Ordering::Relaxed),
			constructions: self.constructions.load(Ordering::Relaxed),
			failures: self.failures.load(Ordering::Relaxed),
			races_lost: self.races_lost.load(Ordering::Relaxed),
			entry_count,
			lock_count,
		}
	}
}
