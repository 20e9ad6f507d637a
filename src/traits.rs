/// Construction routine invoked by the cache on a miss.
///
/// Any `FnOnce(A) -> Result<V, E>` closure is a factory. Implement the trait
/// directly when the construction logic lives in a named type.
///
/// # Example
///
/// ```
/// use construct_cache::{ConstructionCache, Factory};
///
/// struct Compiler {
///     strict: bool,
/// }
///
/// impl Factory<(&'static str,), String> for Compiler {
///     type Error = std::convert::Infallible;
///
///     fn construct(self, (path,): (&'static str,)) -> Result<String, Self::Error> {
///         Ok(format!("{path} (strict: {})", self.strict))
///     }
/// }
///
/// let cache = ConstructionCache::new();
/// let schema = cache.obtain_with(("com.example.model",), Compiler { strict: true }).unwrap();
/// assert_eq!(*schema, "com.example.model (strict: true)");
/// ```
pub trait Factory<A, V> {
	/// Error returned when construction fails. Never cached.
	type Error;

	/// Build the value from the arguments that produced the cache key.
	fn construct(self, args: A) -> Result<V, Self::Error>;
}

impl<A, V, E, F> Factory<A, V> for F
where
	F: FnOnce(A) -> Result<V, E>,
{
	type Error = E;

	fn construct(self, args: A) -> Result<V, E> {
		self(args)
	}
}

/// Asynchronous counterpart of [`Factory`].
#[cfg(feature = "async")]
pub trait AsyncFactory<A, V> {
	type Error;

	fn construct(self, args: A) -> impl Future<Output = Result<V, Self::Error>> + Send;
}

#[cfg(feature = "async")]
impl<A, V, E, F, Fut> AsyncFactory<A, V> for F
where
	F: FnOnce(A) -> Fut,
	Fut: Future<Output = Result<V, E>> + Send,
{
	type Error = E;

	fn construct(self, args: A) -> impl Future<Output = Result<V, E>> + Send {
		self(args)
	}
}
