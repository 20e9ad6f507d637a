use std::convert::Infallible;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Instant;

use parking_lot::{Mutex, RwLock};
use tracing::{debug, trace, warn};

use crate::builder::{CacheBuilder, CacheConfig};
use crate::error::{KeyDerivationError, ObtainError};
use crate::key::{ConstructionKey, KeyArgs};
#[cfg(feature = "metrics")]
use crate::metrics::{CacheMetrics, Counters};
use crate::shard::{Shard, shard_index};
use crate::traits::Factory;

/// Thread-safe construct-once cache.
///
/// Values are built by a caller-supplied factory the first time their
/// argument tuple is seen and shared as `Arc<V>` from then on. Equal argument
/// tuples always return the same `Arc`.
///
/// # Locking
///
/// The key space is split across shards, each behind an `RwLock` that is only
/// held for a single map operation. A miss takes the construction lock for
/// that one key, re-checks the map and only then runs the factory, with no
/// shard lock held. Slow construction of one key therefore never blocks
/// lookups or construction of another; callers for the same key wait for the
/// first one and reuse its result.
///
/// # Failures
///
/// A factory error (or panic) stores nothing. The next caller for the key
/// runs the factory again.
///
/// # Deadlocks
///
/// A factory must not call back into the cache for its own key.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use construct_cache::ConstructionCache;
///
/// let cache = ConstructionCache::new();
///
/// let first = cache
///     .obtain(("com.example.model",), |(path,)| {
///         Ok::<_, std::io::Error>(format!("context for {path}"))
///     })
///     .unwrap();
/// let again = cache
///     .obtain(("com.example.model",), |_| -> Result<String, std::io::Error> { unreachable!() })
///     .unwrap();
///
/// assert!(Arc::ptr_eq(&first, &again));
/// ```
pub struct ConstructionCache<V> {
	/// Sharded entries and construction locks
	shards: Box<[RwLock<Shard<V, Mutex<()>>>]>,
	/// Drop a key's construction lock once its value is stored
	reclaim_locks: bool,
	/// Label attached to log events
	name: &'static str,
	#[cfg(feature = "metrics")]
	counters: Counters,
}

impl<V> ConstructionCache<V> {
	/// Create a cache with default configuration.
	pub fn new() -> Self {
		CacheBuilder::new().build()
	}

	/// Create with custom shard count (rounded up to a power of two).
	pub fn with_shards(shard_count: usize) -> Self {
		CacheBuilder::new().shards(shard_count).build()
	}

	pub(crate) fn from_config(config: &CacheConfig) -> Self {
		let per_shard = config.initial_capacity.div_ceil(config.shard_count);
		let shards = (0..config.shard_count)
			.map(|_| RwLock::new(Shard::with_capacity(per_shard)))
			.collect();

		Self {
			shards,
			reclaim_locks: config.reclaim_locks,
			name: config.name,
			#[cfg(feature = "metrics")]
			counters: Counters::default(),
		}
	}

	/// Return the value for `args`, constructing it with `factory` on first use.
	///
	/// The factory receives `args` by value and runs at most once per key
	/// at a time; once it succeeds it never runs for that key again.
	pub fn obtain<A, F, E>(&self, args: A, factory: F) -> Result<Arc<V>, ObtainError<E>>
	where
		A: KeyArgs,
		F: FnOnce(A) -> Result<V, E>,
	{
		self.obtain_with(args, factory)
	}

	/// Like [`obtain`](Self::obtain), for any [`Factory`] implementation.
	pub fn obtain_with<A, F>(&self, args: A, factory: F) -> Result<Arc<V>, ObtainError<F::Error>>
	where
		A: KeyArgs,
		F: Factory<A, V>,
	{
		let key = args.derive_key()?;
		self.obtain_keyed(key, args, factory)
	}

	/// Like [`obtain_with`](Self::obtain_with), with a key derived beforehand.
	///
	/// `key` must be the key of `args`; the cache does not re-derive it.
	pub fn obtain_keyed<A, F>(
		&self,
		key: ConstructionKey,
		args: A,
		factory: F,
	) -> Result<Arc<V>, ObtainError<F::Error>>
	where
		F: Factory<A, V>,
	{
		let shard_lock = self.get_shard(key.hash_value());

		// Fast path: shared read, no contention with other keys' construction
		let cached = shard_lock.read().get(&key).cloned();
		if let Some(value) = cached {
			#[cfg(feature = "metrics")]
			self.counters.hit();
			return Ok(value);
		}

		#[cfg(feature = "metrics")]
		self.counters.miss();
		trace!(cache = self.name, key_hash = key.hash_value(), "cache miss");

		let key_lock = {
			let mut shard = shard_lock.write();
			if let Some(value) = shard.get(&key) {
				// stored between the read above and this write lock
				#[cfg(feature = "metrics")]
				self.counters.race_lost();
				debug!(
					cache = self.name,
					key_hash = key.hash_value(),
					"value stored by concurrent caller"
				);
				return Ok(Arc::clone(value));
			}
			shard.key_lock(&key).0
		};

		let _construction = key_lock.lock();

		// Another caller may have finished construction while we waited
		let stored = shard_lock.read().get(&key).cloned();
		if let Some(value) = stored {
			#[cfg(feature = "metrics")]
			self.counters.race_lost();
			debug!(
				cache = self.name,
				key_hash = key.hash_value(),
				"reusing value built by concurrent caller"
			);
			return Ok(value);
		}

		debug!(
			cache = self.name,
			key_hash = key.hash_value(),
			arity = key.arity(),
			"constructing"
		);
		let started = Instant::now();

		let value = match panic::catch_unwind(AssertUnwindSafe(|| factory.construct(args))) {
			Ok(Ok(value)) => Arc::new(value),
			Ok(Err(err)) => {
				#[cfg(feature = "metrics")]
				self.counters.failed();
				debug!(
					cache = self.name,
					key_hash = key.hash_value(),
					"construction failed, nothing cached"
				);
				return Err(ObtainError::Construction(err));
			}
			Err(payload) => {
				#[cfg(feature = "metrics")]
				self.counters.failed();
				warn!(
					cache = self.name,
					key_hash = key.hash_value(),
					"factory panicked, nothing cached"
				);
				panic::resume_unwind(payload);
			}
		};

		let stored = {
			let mut shard = shard_lock.write();
			let (stored, inserted) = shard.insert_if_absent(key.clone(), value);
			debug_assert!(inserted, "value stored without holding the construction lock");
			if self.reclaim_locks && shard.release_lock(&key) {
				debug!(
					cache = self.name,
					key_hash = key.hash_value(),
					"construction lock reclaimed"
				);
			}
			stored
		};

		#[cfg(feature = "metrics")]
		self.counters.constructed();
		debug!(
			cache = self.name,
			key_hash = key.hash_value(),
			elapsed_us = started.elapsed().as_micros() as u64,
			"constructed"
		);

		Ok(stored)
	}

	/// Store `value` for `args` unless a value is already present.
	///
	/// Returns whichever value the cache holds afterwards. An existing value is
	/// never replaced.
	pub fn prime<A: KeyArgs>(&self, args: A, value: V) -> Result<Arc<V>, KeyDerivationError> {
		let key = args.derive_key()?;
		match self.obtain_keyed(key, args, |_: A| Ok::<V, Infallible>(value)) {
			Ok(stored) => Ok(stored),
			Err(ObtainError::Key(err)) => Err(err),
			Err(ObtainError::Construction(never)) => match never {},
		}
	}

	/// Look up the value for `args` without constructing it.
	pub fn get<A: KeyArgs + ?Sized>(&self, args: &A) -> Result<Option<Arc<V>>, KeyDerivationError> {
		Ok(self.get_by_key(&args.derive_key()?))
	}

	/// Look up the value for an already derived key.
	pub fn get_by_key(&self, key: &ConstructionKey) -> Option<Arc<V>> {
		self.get_shard(key.hash_value()).read().get(key).cloned()
	}

	/// Check whether a value exists for `args`.
	pub fn contains<A: KeyArgs + ?Sized>(&self, args: &A) -> Result<bool, KeyDerivationError> {
		Ok(self.contains_key(&args.derive_key()?))
	}

	pub fn contains_key(&self, key: &ConstructionKey) -> bool {
		self.get_shard(key.hash_value()).read().contains(key)
	}

	/// Number of stored values.
	pub fn len(&self) -> usize {
		self.shards.iter().map(|shard| shard.read().len()).sum()
	}

	/// Check if cache is empty.
	pub fn is_empty(&self) -> bool {
		self.shards.iter().all(|shard| shard.read().len() == 0)
	}

	/// Number of per-key construction locks currently registered.
	pub fn lock_count(&self) -> usize {
		self.shards.iter().map(|shard| shard.read().lock_count()).sum()
	}

	pub fn shard_count(&self) -> usize {
		self.shards.len()
	}

	pub fn name(&self) -> &'static str {
		self.name
	}

	/// Get a snapshot of the cache counters.
	#[cfg(feature = "metrics")]
	pub fn metrics(&self) -> CacheMetrics {
		self.counters.snapshot(self.len(), self.lock_count())
	}

	/// Get the shard for a given hash.
	fn get_shard(&self, hash: u64) -> &RwLock<Shard<V, Mutex<()>>> {
		&self.shards[shard_index(hash, self.shards.len())]
	}
}

impl<V> Default for ConstructionCache<V> {
	fn default() -> Self {
		Self::new()
	}
}

impl<V> fmt::Debug for ConstructionCache<V> {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("ConstructionCache")
			.field("name", &self.name)
			.field("shards", &self.shards.len())
			.field("entries", &self.len())
			.field("locks", &self.lock_count())
			.finish()
	}
}
