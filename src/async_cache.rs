//! Async flavour of the construction cache.
//!
//! Lookups are identical to [`ConstructionCache`](crate::ConstructionCache):
//! the shard maps sit behind short-lived blocking `RwLock`s that are never
//! held across an `.await`. Only the per-key construction lock is async, so a
//! task waiting for another task's construction yields instead of blocking
//! its worker thread.

use std::convert::Infallible;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use parking_lot::RwLock;
use tokio::sync::Mutex;
use tracing::{debug, trace, warn};

use crate::builder::{CacheBuilder, CacheConfig};
use crate::error::{KeyDerivationError, ObtainError};
use crate::key::{ConstructionKey, KeyArgs};
#[cfg(feature = "metrics")]
use crate::metrics::{CacheMetrics, Counters};
use crate::shard::{Shard, shard_index};
use crate::traits::AsyncFactory;

/// Construct-once cache with async factories.
///
/// A factory that fails, panics, or whose `obtain` future is dropped before
/// completion stores nothing; the next caller constructs again.
///
/// ```
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// use std::sync::Arc;
/// use construct_cache::AsyncConstructionCache;
///
/// let cache = AsyncConstructionCache::new();
/// let first = cache
///     .obtain(("com.example.model",), |(path,)| async move {
///         Ok::<_, std::io::Error>(path.len())
///     })
///     .await
///     .unwrap();
/// let again = cache.get(&("com.example.model",)).unwrap().unwrap();
/// assert!(Arc::ptr_eq(&first, &again));
/// # }
/// ```
pub struct AsyncConstructionCache<V> {
	shards: Box<[RwLock<Shard<V, Mutex<()>>>]>,
	reclaim_locks: bool,
	name: &'static str,
	#[cfg(feature = "metrics")]
	counters: Counters,
}

/// Marks a construction in flight; reports it as failed if dropped unfinished.
struct PendingConstruction<'a, V> {
	cache: &'a AsyncConstructionCache<V>,
	key_hash: u64,
	finished: bool,
}

impl<V> Drop for PendingConstruction<'_, V> {
	fn drop(&mut self) {
		if self.finished {
			return;
		}
		#[cfg(feature = "metrics")]
		self.cache.counters.failed();
		if std::thread::panicking() {
			warn!(
				cache = self.cache.name,
				key_hash = self.key_hash,
				"factory panicked, nothing cached"
			);
		} else {
			debug!(
				cache = self.cache.name,
				key_hash = self.key_hash,
				"construction abandoned, nothing cached"
			);
		}
	}
}

impl<V> AsyncConstructionCache<V> {
	pub fn new() -> Self {
		CacheBuilder::new().build_async()
	}

	pub fn with_shards(shard_count: usize) -> Self {
		CacheBuilder::new().shards(shard_count).build_async()
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

	/// Return the value for `args`, awaiting `factory` on first use.
	pub async fn obtain<A, F, Fut, E>(&self, args: A, factory: F) -> Result<Arc<V>, ObtainError<E>>
	where
		A: KeyArgs,
		F: FnOnce(A) -> Fut,
		Fut: Future<Output = Result<V, E>> + Send,
	{
		self.obtain_with(args, factory).await
	}

	/// Like [`obtain`](Self::obtain), for any [`AsyncFactory`] implementation.
	pub async fn obtain_with<A, F>(
		&self,
		args: A,
		factory: F,
	) -> Result<Arc<V>, ObtainError<F::Error>>
	where
		A: KeyArgs,
		F: AsyncFactory<A, V>,
	{
		let key = args.derive_key()?;
		self.obtain_keyed(key, args, factory).await
	}

	/// Like [`obtain_with`](Self::obtain_with), with a key derived beforehand.
	pub async fn obtain_keyed<A, F>(
		&self,
		key: ConstructionKey,
		args: A,
		factory: F,
	) -> Result<Arc<V>, ObtainError<F::Error>>
	where
		F: AsyncFactory<A, V>,
	{
		let shard_lock = self.get_shard(key.hash_value());

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
				#[cfg(feature = "metrics")]
				self.counters.race_lost();
				debug!(
					cache = self.name,
					key_hash = key.hash_value(),
					"value stored by concurrent task"
				);
				return Ok(Arc::clone(value));
			}
			shard.key_lock(&key).0
		};

		let _construction = key_lock.lock().await;

		let stored = shard_lock.read().get(&key).cloned();
		if let Some(value) = stored {
			#[cfg(feature = "metrics")]
			self.counters.race_lost();
			debug!(
				cache = self.name,
				key_hash = key.hash_value(),
				"reusing value built by concurrent task"
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
		let mut pending = PendingConstruction {
			cache: self,
			key_hash: key.hash_value(),
			finished: false,
		};

		let value = match factory.construct(args).await {
			Ok(value) => Arc::new(value),
			Err(err) => {
				pending.finished = true;
				#[cfg(feature = "metrics")]
				self.counters.failed();
				debug!(
					cache = self.name,
					key_hash = key.hash_value(),
					"construction failed, nothing cached"
				);
				return Err(ObtainError::Construction(err));
			}
		};
		pending.finished = true;

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
	pub async fn prime<A: KeyArgs>(&self, args: A, value: V) -> Result<Arc<V>, KeyDerivationError>
	where
		V: Send,
	{
		let key = args.derive_key()?;
		let factory = |_: A| std::future::ready(Ok::<V, Infallible>(value));
		match self.obtain_keyed(key, args, factory).await {
			Ok(stored) => Ok(stored),
			Err(ObtainError::Key(err)) => Err(err),
			Err(ObtainError::Construction(never)) => match never {},
		}
	}

	pub fn get<A: KeyArgs + ?Sized>(&self, args: &A) -> Result<Option<Arc<V>>, KeyDerivationError> {
		Ok(self.get_by_key(&args.derive_key()?))
	}

	pub fn get_by_key(&self, key: &ConstructionKey) -> Option<Arc<V>> {
		self.get_shard(key.hash_value()).read().get(key).cloned()
	}

	pub fn contains<A: KeyArgs + ?Sized>(&self, args: &A) -> Result<bool, KeyDerivationError> {
		Ok(self.contains_key(&args.derive_key()?))
	}

	pub fn contains_key(&self, key: &ConstructionKey) -> bool {
		self.get_shard(key.hash_value()).read().contains(key)
	}

	pub fn len(&self) -> usize {
		self.shards.iter().map(|shard| shard.read().len()).sum()
	}

	pub fn is_empty(&self) -> bool {
		self.shards.iter().all(|shard| shard.read().len() == 0)
	}

	pub fn lock_count(&self) -> usize {
		self.shards.iter().map(|shard| shard.read().lock_count()).sum()
	}

	pub fn shard_count(&self) -> usize {
		self.shards.len()
	}

	pub fn name(&self) -> &'static str {
		self.name
	}

	#[cfg(feature = "metrics")]
	pub fn metrics(&self) -> CacheMetrics {
		self.counters.snapshot(self.len(), self.lock_count())
	}

	fn get_shard(&self, hash: u64) -> &RwLock<Shard<V, Mutex<()>>> {
		&self.shards[shard_index(hash, self.shards.len())]
	}
}

impl<V> Default for AsyncConstructionCache<V> {
	fn default() -> Self {
		Self::new()
	}
}

impl<V> fmt::Debug for AsyncConstructionCache<V> {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("AsyncConstructionCache")
			.field("name", &self.name)
			.field("shards", &self.shards.len())
			.field("entries", &self.len())
			.field("locks", &self.lock_count())
			.finish()
	}
}

#[cfg(test)]
mod tests {
	use std::sync::atomic::{AtomicUsize, Ordering};
	use std::time::Duration;

	use super::*;

	#[tokio::test]
	async fn test_obtain_constructs_once() {
		let cache = AsyncConstructionCache::new();
		let calls = AtomicUsize::new(0);

		let first = cache
			.obtain(("pkg.a",), |(path,)| {
				calls.fetch_add(1, Ordering::SeqCst);
				async move { Ok::<_, String>(path.to_uppercase()) }
			})
			.await
			.unwrap();
		let second = cache
			.obtain(("pkg.a",), |(path,)| {
				calls.fetch_add(1, Ordering::SeqCst);
				async move { Ok::<_, String>(path.to_uppercase()) }
			})
			.await
			.unwrap();

		assert!(Arc::ptr_eq(&first, &second));
		assert_eq!(*first, "PKG.A");
		assert_eq!(calls.load(Ordering::SeqCst), 1);
	}

	#[tokio::test]
	async fn test_failure_is_retried() {
		let cache: AsyncConstructionCache<String> = AsyncConstructionCache::new();

		let err = cache
			.obtain(("pkg.a",), |_| async { Err::<String, _>("offline") })
			.await
			.unwrap_err();
		assert!(err.is_construction());
		assert!(cache.is_empty());

		let value = cache
			.obtain(("pkg.a",), |(path,)| async move { Ok::<_, &str>(path.to_string()) })
			.await
			.unwrap();
		assert_eq!(*value, "pkg.a");
	}

	#[tokio::test]
	async fn test_dropped_obtain_stores_nothing() {
		let cache: AsyncConstructionCache<String> = AsyncConstructionCache::new();

		let slow = cache.obtain(("pkg.a",), |(path,)| async move {
			tokio::time::sleep(Duration::from_secs(60)).await;
			Ok::<_, String>(path.to_string())
		});
		let timed_out = tokio::time::timeout(Duration::from_millis(10), slow).await;
		assert!(timed_out.is_err());
		assert!(cache.is_empty());

		let value = cache
			.obtain(("pkg.a",), |_| async { Ok::<_, String>("fresh".to_string()) })
			.await
			.unwrap();
		assert_eq!(*value, "fresh");
	}

	#[tokio::test]
	async fn test_prime_and_reclaim() {
		let cache: AsyncConstructionCache<String> =
			CacheBuilder::new().reclaim_locks(true).build_async();

		let primed = cache.prime(("pkg.a",), "primed".to_string()).await.unwrap();
		let again = cache.prime(("pkg.a",), "ignored".to_string()).await.unwrap();

		assert!(Arc::ptr_eq(&primed, &again));
		assert_eq!(cache.lock_count(), 0);
		assert!(cache.contains(&("pkg.a",)).unwrap());
	}

	#[test]
	fn test_cache_is_send_sync() {
		fn assert_send<T: Send>() {}
		fn assert_sync<T: Sync>() {}

		assert_send::<AsyncConstructionCache<String>>();
		assert_sync::<AsyncConstructionCache<String>>();
	}
}
