use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use crate::args::{ArgValue, ToArg};
use crate::error::KeyDerivationError;

/// Canonical identity of an argument tuple, with a pre-computed hash.
///
/// Cloning is cheap: the normalized arguments are shared behind an `Arc`.
#[derive(Clone)]
pub struct ConstructionKey {
	/// Pre-computed hash of (signature, args)
	hash: u64,
	/// Optional name distinguishing argument tuples of different call shapes
	signature: Option<&'static str>,
	/// Normalized arguments, in call order
	args: Arc<[ArgValue]>,
}

impl ConstructionKey {
	/// Build a key from already normalized arguments.
	pub fn new(signature: Option<&'static str>, args: Vec<ArgValue>) -> Self {
		let args: Arc<[ArgValue]> = args.into();
		let hash = Self::compute_hash(signature, &args);
		Self {
			hash,
			signature,
			args,
		}
	}

	fn compute_hash(signature: Option<&'static str>, args: &[ArgValue]) -> u64 {
		let mut hasher = ahash::AHasher::default();
		signature.hash(&mut hasher);
		args.hash(&mut hasher);
		hasher.finish()
	}

	pub fn signature(&self) -> Option<&'static str> {
		self.signature
	}

	pub fn args(&self) -> &[ArgValue] {
		&self.args
	}

	/// Number of top-level arguments.
	pub fn arity(&self) -> usize {
		self.args.len()
	}

	pub fn hash_value(&self) -> u64 {
		self.hash
	}
}

impl Hash for ConstructionKey {
	fn hash<H: Hasher>(&self, state: &mut H) {
		// Use pre-computed hash to avoid re-hashing on every lookup
		state.write_u64(self.hash);
	}
}

impl PartialEq for ConstructionKey {
	fn eq(&self, other: &Self) -> bool {
		if self.hash != other.hash || self.signature != other.signature {
			return false;
		}
		if Arc::ptr_eq(&self.args, &other.args) {
			return true;
		}
		self.args == other.args
	}
}

impl Eq for ConstructionKey {}

impl fmt::Debug for ConstructionKey {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("ConstructionKey")
			.field("hash", &format_args!("{:#018x}", self.hash))
			.field("signature", &self.signature)
			.field("args", &self.args)
			.finish()
	}
}

/// An argument tuple that can be turned into a [`ConstructionKey`].
///
/// Implemented for tuples of [`ToArg`] values up to arity 8, for [`Args`],
/// and for structs using `#[derive(KeyArgs)]`.
///
/// # Example
///
/// ```
/// use construct_cache::KeyArgs;
///
/// let a = ("com.example.model", vec!["Order", "Invoice"]).derive_key().unwrap();
/// let b = ("com.example.model", ["Order", "Invoice"]).derive_key().unwrap();
/// assert_eq!(a, b);
/// ```
pub trait KeyArgs {
	/// Name of the call shape. Tuples with the same values but different
	/// signatures never share a key.
	fn signature(&self) -> Option<&'static str> {
		None
	}

	/// Append the normalized arguments, in order.
	fn push_args(&self, out: &mut Vec<ArgValue>) -> Result<(), KeyDerivationError>;

	/// Derive the canonical key for these arguments.
	fn derive_key(&self) -> Result<ConstructionKey, KeyDerivationError> {
		let mut args = Vec::new();
		self.push_args(&mut args)?;
		Ok(ConstructionKey::new(self.signature(), args))
	}
}

impl<T: KeyArgs + ?Sized> KeyArgs for &T {
	fn signature(&self) -> Option<&'static str> {
		(**self).signature()
	}

	fn push_args(&self, out: &mut Vec<ArgValue>) -> Result<(), KeyDerivationError> {
		(**self).push_args(out)
	}
}

impl KeyArgs for () {
	fn push_args(&self, _out: &mut Vec<ArgValue>) -> Result<(), KeyDerivationError> {
		Ok(())
	}
}

macro_rules! impl_key_args_for_tuple {
	($($idx:tt $name:ident),+) => {
		impl<$($name: ToArg),+> KeyArgs for ($($name,)+) {
			fn push_args(&self, out: &mut Vec<ArgValue>) -> Result<(), KeyDerivationError> {
				$(out.push(self.$idx.to_arg().map_err(|e| e.at($idx))?);)+
				Ok(())
			}
		}
	};
}

impl_key_args_for_tuple!(0 A);
impl_key_args_for_tuple!(0 A, 1 B);
impl_key_args_for_tuple!(0 A, 1 B, 2 C);
impl_key_args_for_tuple!(0 A, 1 B, 2 C, 3 D);
impl_key_args_for_tuple!(0 A, 1 B, 2 C, 3 D, 4 E);
impl_key_args_for_tuple!(0 A, 1 B, 2 C, 3 D, 4 E, 5 F);
impl_key_args_for_tuple!(0 A, 1 B, 2 C, 3 D, 4 E, 5 F, 6 G);
impl_key_args_for_tuple!(0 A, 1 B, 2 C, 3 D, 4 E, 5 F, 6 G, 7 H);

/// Dynamically assembled argument tuple.
///
/// Arguments are normalized as they are added. The first conversion error
/// is kept and reported when the key is derived, so a chain of `arg` calls
/// never has to be interrupted.
///
/// ```
/// use std::collections::HashMap;
/// use construct_cache::{Args, KeyArgs};
///
/// let mut props = HashMap::new();
/// props.insert("retain", false);
///
/// let key = Args::named("classes_with_properties")
///     .arg(&["Order", "Invoice"])
///     .arg(&props)
///     .derive_key()
///     .unwrap();
/// assert_eq!(key.arity(), 2);
/// ```
#[derive(Clone, Debug, Default)]
pub struct Args {
	signature: Option<&'static str>,
	values: Vec<ArgValue>,
	error: Option<KeyDerivationError>,
}

impl Args {
	pub fn new() -> Self {
		Self::default()
	}

	/// Start an argument tuple for the named call shape.
	pub fn named(name: &'static str) -> Self {
		Self {
			signature: Some(name),
			..Self::default()
		}
	}

	/// Append one argument.
	pub fn arg<T: ToArg + ?Sized>(mut self, value: &T) -> Self {
		let index = self.values.len();
		match value.to_arg() {
			Ok(value) => self.values.push(value),
			Err(e) => {
				// keep positions stable for later arguments
				self.values.push(ArgValue::Null);
				if self.error.is_none() {
					self.error = Some(e.at(index));
				}
			}
		}
		self
	}

	/// The normalized arguments added so far.
	pub fn values(&self) -> &[ArgValue] {
		&self.values
	}

	pub fn len(&self) -> usize {
		self.values.len()
	}

	pub fn is_empty(&self) -> bool {
		self.values.is_empty()
	}
}

impl KeyArgs for Args {
	fn signature(&self) -> Option<&'static str> {
		self.signature
	}

	fn push_args(&self, out: &mut Vec<ArgValue>) -> Result<(), KeyDerivationError> {
		if let Some(err) = &self.error {
			return Err(err.clone());
		}
		out.extend(self.values.iter().cloned());
		Ok(())
	}
}
