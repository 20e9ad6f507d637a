//! # Construct Cache
//!
//! A concurrent, construct-once cache for expensive objects:
//! - **Keyed by argument tuples** compared by content, not by reference
//! - **Exactly-once construction** per distinct key under concurrency
//! - **Per-key locking**, so slow construction of one key never blocks another
//! - **Failures are not cached**: an error or panic leaves the key retryable
//! - **Stable identity**: equal arguments always get the same `Arc<V>`
//!
//! ## Quick Start
//!
//! ```rust
//! use std::collections::HashMap;
//! use std::sync::Arc;
//! use construct_cache::{ConstructionCache, TypeArg};
//!
//! struct Order;
//! struct Invoice;
//!
//! #[derive(Debug)]
//! struct Context {
//!     classes: usize,
//! }
//!
//! let cache: ConstructionCache<Context> = ConstructionCache::new();
//!
//! let mut properties = HashMap::new();
//! properties.insert("retainReferenceToInfo", false);
//!
//! let classes = [TypeArg::of::<Order>(), TypeArg::of::<Invoice>()];
//! let first = cache
//!     .obtain((classes, properties.clone()), |(classes, _)| {
//!         Ok::<_, std::io::Error>(Context { classes: classes.len() })
//!     })
//!     .unwrap();
//!
//! // A different but equal map finds the same context
//! let second = cache
//!     .obtain((classes, properties), |_| -> Result<Context, std::io::Error> { unreachable!() })
//!     .unwrap();
//!
//! assert!(Arc::ptr_eq(&first, &second));
//! assert_eq!(first.classes, 2);
//! ```
//!
//! ## Keys
//!
//! Any tuple of [`ToArg`] values up to arity 8 is a key. Sequences compare
//! element-wise (arrays, slices, `Vec` and `VecDeque` are interchangeable),
//! maps compare by entries regardless of insertion order, and floats compare
//! by value with NaN rejected. Types are keyed by [`TypeArg`] and shared
//! objects by identity through [`Identity`].
//!
//! Argument structs can derive the trait:
//!
//! ```rust
//! use construct_cache::{ConstructionCache, KeyArgs};
//!
//! #[derive(KeyArgs)]
//! #[key_args(signature = "context_path")]
//! struct ContextPath {
//!     path: String,
//!     #[key_args(skip)]
//!     verbose: bool,
//! }
//!
//! let cache = ConstructionCache::new();
//! let ctx = cache
//!     .obtain(ContextPath { path: "com.example".into(), verbose: true }, |args| {
//!         Ok::<_, std::io::Error>(args.path.len())
//!     })
//!     .unwrap();
//! assert_eq!(*ctx, 11);
//! ```
//!
//! ## Async Usage
//!
//! With the `async` feature (on by default), [`AsyncConstructionCache`]
//! accepts async factories. Waiting callers yield on an async per-key lock;
//! the shard locks are never held across an await point.
//!
//! ## Thread Safety
//!
//! Both caches are `Send + Sync` and are shared across threads via `Arc`.
//! Lookups of stored values only take a shard read lock.

extern crate self as construct_cache;

mod args;
#[cfg(feature = "async")]
mod async_cache;
mod builder;
mod cache;
mod error;
mod key;
#[cfg(feature = "metrics")]
mod metrics;
mod shard;
mod traits;

pub use args::{ArgValue, FloatBits, Identity, InstanceArg, ToArg, TypeArg};
#[cfg(feature = "async")]
pub use async_cache::AsyncConstructionCache;
pub use builder::CacheBuilder;
pub use cache::ConstructionCache;
pub use construct_cache_derive::KeyArgs;
pub use error::{KeyDerivationError, ObtainError};
pub use key::{Args, ConstructionKey, KeyArgs};
#[cfg(feature = "metrics")]
pub use metrics::CacheMetrics;
#[cfg(feature = "async")]
pub use traits::AsyncFactory;
pub use traits::Factory;
