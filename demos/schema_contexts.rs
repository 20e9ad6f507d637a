//! Share expensive "schema contexts" across worker threads.
//!
//! Run with `RUST_LOG=construct_cache=debug cargo run --example schema_contexts`
//! to watch constructions, lock reuse and failures.

use std::collections::HashMap;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use construct_cache::{CacheBuilder, ConstructionCache, KeyArgs, TypeArg};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

struct Order;
struct Invoice;

#[derive(Debug)]
struct SchemaContext {
	description: String,
}

#[derive(Debug, thiserror::Error)]
#[error("no schema registered for {0}")]
struct UnknownPackage(String);

#[derive(KeyArgs)]
#[key_args(signature = "context_path")]
struct ContextPath {
	package: String,
}

fn compile(description: String) -> Result<SchemaContext, UnknownPackage> {
	// stands in for reflection-heavy setup
	thread::sleep(Duration::from_millis(50));
	Ok(SchemaContext {
		description,
	})
}

fn main() {
	let filter = EnvFilter::try_from_default_env()
		.unwrap_or_else(|_| EnvFilter::new("construct_cache=debug,info"));
	tracing_subscriber::fmt().with_env_filter(filter).with_target(false).init();

	let cache: Arc<ConstructionCache<SchemaContext>> =
		Arc::new(CacheBuilder::new().name("schema-contexts").shards(8).build());

	let handles: Vec<_> = (0..4)
		.map(|worker| {
			let cache = cache.clone();
			thread::spawn(move || {
				let mut properties = HashMap::new();
				properties.insert("retainReferenceToInfo", false);

				let classes = [TypeArg::of::<Order>(), TypeArg::of::<Invoice>()];
				let context = cache
					.obtain((classes, properties), |(classes, properties)| {
						let description =
							format!("{} classes, {} properties", classes.len(), properties.len());
						compile(description)
					})
					.map_err(|e| e.to_string());
				info!(worker, ?context, "obtained context for classes");
				context
			})
		})
		.collect();

	for handle in handles {
		match handle.join() {
			Ok(Ok(context)) => info!(description = %context.description, "worker finished"),
			Ok(Err(err)) => warn!(error = %err, "worker construction failed"),
			Err(_) => warn!("worker panicked"),
		}
	}

	let by_path = cache.obtain(
		ContextPath {
			package: "com.example.model".into(),
		},
		|args| Err(UnknownPackage(args.package)),
	);
	if let Err(err) = &by_path {
		info!(error = %err, "failed constructions are not cached");
	}

	// same key again: the factory runs a second time
	let by_path = cache.obtain(
		ContextPath {
			package: "com.example.model".into(),
		},
		|args| compile(format!("package {}", args.package)),
	);
	info!(?by_path, entries = cache.len(), locks = cache.lock_count(), "done");
}
