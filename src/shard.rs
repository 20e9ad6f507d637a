//! Shard implementation for partitioned cache storage.
//!
//! A `Shard` owns the constructed entries and the per-key construction locks
//! for the keys that hash into it. The cache wraps each shard in an `RwLock`
//! that is only ever held for single map operations; construction itself
//! happens under the per-key lock with no shard lock held.
//!
//! Both maps are append-only from the cache's point of view. The only removal
//! is the optional reclamation of a key's lock once its value is stored.

use std::hash::{BuildHasher, Hasher};
use std::sync::Arc;

use hashbrown::HashMap;
use hashbrown::hash_map::Entry as HashMapEntry;

use crate::key::ConstructionKey;

/// Passthrough hasher for ConstructionKey (which already has pre-computed hash).
#[derive(Default)]
pub(crate) struct PassthroughHasher(u64);

impl Hasher for PassthroughHasher {
	fn finish(&self) -> u64 {
		self.0
	}

	fn write(&mut self, _bytes: &[u8]) {
		panic!("PassthroughHasher only works with u64 hash values");
	}

	fn write_u64(&mut self, i: u64) {
		self.0 = i;
	}
}

/// Build hasher for passthrough (just returns the hash as-is).
#[derive(Clone, Default)]
pub(crate) struct PassthroughBuildHasher;

impl BuildHasher for PassthroughBuildHasher {
	type Hasher = PassthroughHasher;

	fn build_hasher(&self) -> Self::Hasher {
		PassthroughHasher::default()
	}
}

/// Pick a shard from the upper hash bits; the low bits belong to the shard maps.
pub(crate) fn shard_index(hash: u64, shard_count: usize) -> usize {
	debug_assert!(shard_count.is_power_of_two());
	(hash >> 32) as usize & (shard_count - 1)
}

/// Entries and per-key locks for one partition of the key space.
///
/// `L` is the per-key lock type: a blocking mutex for the synchronous cache,
/// an async mutex for the async one.
pub(crate) struct Shard<V, L> {
	entries: HashMap<ConstructionKey, Arc<V>, PassthroughBuildHasher>,
	locks: HashMap<ConstructionKey, Arc<L>, PassthroughBuildHasher>,
}

impl<V, L: Default> Shard<V, L> {
	pub fn with_capacity(capacity: usize) -> Self {
		Self {
			entries: HashMap::with_capacity_and_hasher(capacity, PassthroughBuildHasher),
			locks: HashMap::with_hasher(PassthroughBuildHasher),
		}
	}

	pub fn get(&self, key: &ConstructionKey) -> Option<&Arc<V>> {
		self.entries.get(key)
	}

	pub fn contains(&self, key: &ConstructionKey) -> bool {
		self.entries.contains_key(key)
	}

	/// Find or create the construction lock for `key`.
	///
	/// Runs under the shard write lock, so two first-time callers for the same
	/// key always come away with the same lock. Returns `true` alongside the
	/// lock when it was created by this call.
	pub fn key_lock(&mut self, key: &ConstructionKey) -> (Arc<L>, bool) {
		match self.locks.entry(key.clone()) {
			HashMapEntry::Occupied(occupied) => (Arc::clone(occupied.get()), false),
			HashMapEntry::Vacant(vacant) => {
				(Arc::clone(vacant.insert(Arc::new(L::default()))), true)
			}
		}
	}

	/// Store `value` unless the key already has one.
	///
	/// Returns the value that is in the map afterwards and whether it is the one
	/// passed in. An existing entry is never replaced.
	pub fn insert_if_absent(&mut self, key: ConstructionKey, value: Arc<V>) -> (Arc<V>, bool) {
		match self.entries.entry(key) {
			HashMapEntry::Occupied(occupied) => (Arc::clone(occupied.get()), false),
			HashMapEntry::Vacant(vacant) => (Arc::clone(vacant.insert(value)), true),
		}
	}

	/// Drop the construction lock for a key whose value is stored.
	///
	/// Callers still waiting on the lock keep their own `Arc` to it and will
	/// find the entry on their re-check.
	pub fn release_lock(&mut self, key: &ConstructionKey) -> bool {
		debug_assert!(self.entries.contains_key(key), "lock released before value was stored");
		self.locks.remove(key).is_some()
	}

	pub fn len(&self) -> usize {
		self.entries.len()
	}

	pub fn lock_count(&self) -> usize {
		self.locks.len()
	}
}
