//! Tests for async usage patterns.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use construct_cache::{AsyncConstructionCache, AsyncFactory, CacheBuilder, ObtainError, TypeArg};
use tokio::sync::{Barrier, oneshot};

#[derive(Debug)]
struct Schema {
	path: String,
}

#[derive(Debug, PartialEq, thiserror::Error)]
enum LoadError {
	#[error("schema source unavailable")]
	Unavailable,
}

struct Loader {
	delay: Duration,
	calls: Arc<AtomicUsize>,
}

impl AsyncFactory<(String,), Schema> for Loader {
	type Error = LoadError;

	async fn construct(self, (path,): (String,)) -> Result<Schema, LoadError> {
		self.calls.fetch_add(1, Ordering::SeqCst);
		tokio::time::sleep(self.delay).await;
		Ok(Schema {
			path,
		})
	}
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_tasks_construct_once() {
	const TASKS: usize = 16;

	let cache: Arc<AsyncConstructionCache<Schema>> = Arc::new(AsyncConstructionCache::new());
	let calls = Arc::new(AtomicUsize::new(0));
	let barrier = Arc::new(Barrier::new(TASKS));

	let handles: Vec<_> = (0..TASKS)
		.map(|_| {
			let cache = cache.clone();
			let calls = calls.clone();
			let barrier = barrier.clone();
			tokio::spawn(async move {
				barrier.wait().await;
				let loader = Loader {
					delay: Duration::from_millis(20),
					calls,
				};
				cache.obtain_with(("com.example.model".to_string(),), loader).await.unwrap()
			})
		})
		.collect();

	let mut results = Vec::new();
	for handle in handles {
		results.push(handle.await.unwrap());
	}

	assert_eq!(calls.load(Ordering::SeqCst), 1);
	assert_eq!(results[0].path, "com.example.model");
	assert!(results.iter().all(|schema| Arc::ptr_eq(schema, &results[0])));
}

#[tokio::test]
async fn test_slow_construction_does_not_block_other_keys() {
	let cache: Arc<AsyncConstructionCache<Schema>> =
		Arc::new(AsyncConstructionCache::with_shards(1));
	let (release_tx, release_rx) = oneshot::channel::<()>();

	let slow = {
		let cache = cache.clone();
		tokio::spawn(async move {
			cache
				.obtain(("pkg.slow".to_string(),), |(path,)| async move {
					let _ = release_rx.await;
					Ok::<_, LoadError>(Schema {
						path,
					})
				})
				.await
		})
	};
	tokio::task::yield_now().await;

	let fast = tokio::time::timeout(
		Duration::from_secs(5),
		cache.obtain(("pkg.fast",), |(path,)| async move {
			Ok::<_, LoadError>(Schema {
				path: path.to_string(),
			})
		}),
	)
	.await
	.expect("other keys must not wait for pkg.slow")
	.unwrap();
	assert_eq!(fast.path, "pkg.fast");

	release_tx.send(()).unwrap();
	let slow = slow.await.unwrap().unwrap();
	assert_eq!(slow.path, "pkg.slow");
}

#[tokio::test]
async fn test_failure_is_not_cached() {
	let cache: AsyncConstructionCache<Schema> = AsyncConstructionCache::new();
	let calls = AtomicUsize::new(0);

	let err = cache
		.obtain((TypeArg::of::<Schema>(),), |_| {
			calls.fetch_add(1, Ordering::SeqCst);
			async { Err(LoadError::Unavailable) }
		})
		.await
		.unwrap_err();
	assert!(matches!(err, ObtainError::Construction(LoadError::Unavailable)));

	let schema = cache
		.obtain((TypeArg::of::<Schema>(),), |(ty,)| {
			calls.fetch_add(1, Ordering::SeqCst);
			async move {
				Ok::<_, LoadError>(Schema {
					path: ty.name().to_string(),
				})
			}
		})
		.await
		.unwrap();

	assert!(schema.path.ends_with("Schema"));
	assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_cancelled_construction_lets_waiter_retry() {
	let cache: Arc<AsyncConstructionCache<Schema>> = Arc::new(AsyncConstructionCache::new());

	let abandoned = {
		let cache = cache.clone();
		tokio::spawn(async move {
			cache
				.obtain(("pkg.a".to_string(),), |_| async {
					tokio::time::sleep(Duration::from_secs(60)).await;
					Ok::<_, LoadError>(Schema {
						path: "never".into(),
					})
				})
				.await
		})
	};
	tokio::time::sleep(Duration::from_millis(10)).await;
	abandoned.abort();
	assert!(abandoned.await.unwrap_err().is_cancelled());

	let schema = cache
		.obtain(("pkg.a",), |(path,)| async move {
			Ok::<_, LoadError>(Schema {
				path: path.to_string(),
			})
		})
		.await
		.unwrap();
	assert_eq!(schema.path, "pkg.a");
}

#[tokio::test]
async fn test_reclaim_locks() {
	let cache: AsyncConstructionCache<usize> =
		CacheBuilder::new().reclaim_locks(true).build_async();

	for key in 0..10usize {
		cache.obtain((key,), |(key,)| async move { Ok::<_, LoadError>(key) }).await.unwrap();
	}

	assert_eq!(cache.len(), 10);
	assert_eq!(cache.lock_count(), 0);
}
