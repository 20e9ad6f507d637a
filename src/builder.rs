#[cfg(feature = "async")]
use crate::async_cache::AsyncConstructionCache;
use crate::cache::ConstructionCache;

const DEFAULT_SHARD_COUNT: usize = 16;
const MAX_SHARD_COUNT: usize = 1024;
const DEFAULT_NAME: &str = "construct-cache";

/// Builder for configuring a [`ConstructionCache`].
///
/// # Example
///
/// ```
/// use construct_cache::{CacheBuilder, ConstructionCache};
///
/// let cache: ConstructionCache<String> = CacheBuilder::new()
///     .name("schema-contexts")
///     .shards(32)
///     .reclaim_locks(true)
///     .build();
/// assert_eq!(cache.shard_count(), 32);
/// ```
#[derive(Clone, Debug)]
pub struct CacheBuilder {
	shard_count: Option<usize>,
	initial_capacity: usize,
	reclaim_locks: bool,
	name: &'static str,
}

/// Resolved settings shared by both cache flavours.
#[derive(Clone, Debug)]
pub(crate) struct CacheConfig {
	pub shard_count: usize,
	pub initial_capacity: usize,
	pub reclaim_locks: bool,
	pub name: &'static str,
}

impl CacheBuilder {
	pub fn new() -> Self {
		Self {
			shard_count: None,
			initial_capacity: 0,
			reclaim_locks: false,
			name: DEFAULT_NAME,
		}
	}

	/// Set the number of shards.
	///
	/// More shards reduce contention on misses. Will be rounded up to the next
	/// power of 2 and capped at 1024.
	///
	/// Default: 16 shards
	pub fn shards(mut self, count: usize) -> Self {
		self.shard_count = Some(count);
		self
	}

	/// Pre-size the entry maps for roughly `capacity` values in total.
	pub fn initial_capacity(mut self, capacity: usize) -> Self {
		self.initial_capacity = capacity;
		self
	}

	/// Drop a key's construction lock once its value is stored.
	///
	/// Off by default: the lock then lives as long as the cache, one small
	/// allocation per key. Failed constructions always keep their lock.
	pub fn reclaim_locks(mut self, reclaim: bool) -> Self {
		self.reclaim_locks = reclaim;
		self
	}

	/// Label attached to every log event the cache emits.
	pub fn name(mut self, name: &'static str) -> Self {
		self.name = name;
		self
	}

	fn config(&self) -> CacheConfig {
		let desired = self.shard_count.unwrap_or(DEFAULT_SHARD_COUNT);
		CacheConfig {
			shard_count: desired.clamp(1, MAX_SHARD_COUNT).next_power_of_two(),
			initial_capacity: self.initial_capacity,
			reclaim_locks: self.reclaim_locks,
			name: self.name,
		}
	}

	/// Build a blocking cache with the configured settings.
	pub fn build<V>(self) -> ConstructionCache<V> {
		ConstructionCache::from_config(&self.config())
	}

	/// Build an async cache with the configured settings.
	#[cfg(feature = "async")]
	pub fn build_async<V>(self) -> AsyncConstructionCache<V> {
		AsyncConstructionCache::from_config(&self.config())
	}
}

impl Default for CacheBuilder {
	fn default() -> Self {
		Self::new()
	}
}
