//! Normalized argument values.
//!
//! Every argument that takes part in a cache key is converted into an
//! [`ArgValue`] first. The conversion is where container differences are
//! erased: arrays, slices, `Vec` and `VecDeque` all become [`ArgValue::Seq`],
//! and every map type becomes an ordered [`ArgValue::Map`], so two arguments
//! that hold the same data compare and hash the same no matter how they were
//! passed.

use std::any::{Any, TypeId, type_name};
use std::borrow::Cow;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::fmt;
use std::hash::{BuildHasher, Hash, Hasher};
use std::sync::Arc;

use crate::error::KeyDerivationError;

/// A single normalized argument.
///
/// Equality is structural: sequences compare element by element in order and
/// maps compare by their explicit entries, irrespective of insertion order.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum ArgValue {
	Null,
	/// A present `Option`, kept apart from `Null` so nested options stay distinct.
	Some(Box<ArgValue>),
	Bool(bool),
	Int(i64),
	UInt(u64),
	Float(FloatBits),
	Char(char),
	Str(String),
	Type(TypeArg),
	Instance(InstanceArg),
	Seq(Vec<ArgValue>),
	Map(BTreeMap<String, ArgValue>),
}

impl ArgValue {
	/// Build a float argument, rejecting NaN.
	pub fn float(value: f64) -> Result<Self, KeyDerivationError> {
		FloatBits::new(value).map(Self::Float)
	}

	/// Build a sequence argument from already normalized values.
	pub fn seq(values: impl IntoIterator<Item = ArgValue>) -> Self {
		Self::Seq(values.into_iter().collect())
	}

	/// Build a map argument from already normalized entries.
	pub fn map<K: Into<String>>(entries: impl IntoIterator<Item = (K, ArgValue)>) -> Self {
		Self::Map(entries.into_iter().map(|(k, v)| (k.into(), v)).collect())
	}
}

/// Bit pattern of a non-NaN float, with `-0.0` folded into `0.0`.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct FloatBits(u64);

impl FloatBits {
	pub fn new(value: f64) -> Result<Self, KeyDerivationError> {
		if value.is_nan() {
			return Err(KeyDerivationError::NonComparableFloat {
				value,
			});
		}
		// -0.0 == 0.0 but their bits differ
		let value = if value == 0.0 { 0.0 } else { value };
		Ok(Self(value.to_bits()))
	}

	pub fn get(self) -> f64 {
		f64::from_bits(self.0)
	}
}

impl fmt::Debug for FloatBits {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		fmt::Debug::fmt(&self.get(), f)
	}
}

/// A type identifier argument, compared by `TypeId`.
#[derive(Clone, Copy)]
pub struct TypeArg {
	id: TypeId,
	name: &'static str,
}

impl TypeArg {
	pub fn of<T: ?Sized + 'static>() -> Self {
		Self {
			id: TypeId::of::<T>(),
			name: type_name::<T>(),
		}
	}

	pub fn id(&self) -> TypeId {
		self.id
	}

	pub fn name(&self) -> &'static str {
		self.name
	}
}

impl PartialEq for TypeArg {
	fn eq(&self, other: &Self) -> bool {
		self.id == other.id
	}
}

impl Eq for TypeArg {}

impl Hash for TypeArg {
	fn hash<H: Hasher>(&self, state: &mut H) {
		self.id.hash(state);
	}
}

impl fmt::Debug for TypeArg {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "TypeArg({})", self.name)
	}
}

/// An argument compared by object identity rather than by value.
///
/// Holds a strong reference to the object, so its address cannot be reused by
/// another allocation for as long as any key containing it is alive.
#[derive(Clone)]
pub struct InstanceArg {
	object: Arc<dyn Any + Send + Sync>,
	type_name: &'static str,
}

impl InstanceArg {
	pub fn of<T: Any + Send + Sync>(object: &Arc<T>) -> Self {
		Self {
			object: Arc::clone(object) as Arc<dyn Any + Send + Sync>,
			type_name: type_name::<T>(),
		}
	}

	fn addr(&self) -> usize {
		Arc::as_ptr(&self.object) as *const () as usize
	}

	pub fn type_name(&self) -> &'static str {
		self.type_name
	}
}

impl PartialEq for InstanceArg {
	fn eq(&self, other: &Self) -> bool {
		self.addr() == other.addr()
	}
}

impl Eq for InstanceArg {}

impl Hash for InstanceArg {
	fn hash<H: Hasher>(&self, state: &mut H) {
		self.addr().hash(state);
	}
}

impl fmt::Debug for InstanceArg {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "InstanceArg({}@{:#x})", self.type_name, self.addr())
	}
}

/// Wraps a shared object so it keys by identity.
///
/// Two `Identity` arguments are equal only when they point at the same
/// allocation, even if the objects themselves would compare equal.
pub struct Identity<T>(pub Arc<T>);

impl<T> Identity<T> {
	pub fn new(object: Arc<T>) -> Self {
		Self(object)
	}

	pub fn into_inner(self) -> Arc<T> {
		self.0
	}
}

impl<T> Clone for Identity<T> {
	fn clone(&self) -> Self {
		Self(Arc::clone(&self.0))
	}
}

impl<T> std::ops::Deref for Identity<T> {
	type Target = T;

	fn deref(&self) -> &T {
		&self.0
	}
}

impl<T: fmt::Debug> fmt::Debug for Identity<T> {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_tuple("Identity").field(&self.0).finish()
	}
}

/// Conversion of a single argument into its normalized form.
///
/// Implement this for domain types that should take part in cache keys.
/// Return [`KeyDerivationError::custom`] for values that have no stable
/// equality.
pub trait ToArg {
	fn to_arg(&self) -> Result<ArgValue, KeyDerivationError>;
}

impl ToArg for ArgValue {
	fn to_arg(&self) -> Result<ArgValue, KeyDerivationError> {
		Ok(self.clone())
	}
}

impl ToArg for TypeArg {
	fn to_arg(&self) -> Result<ArgValue, KeyDerivationError> {
		Ok(ArgValue::Type(*self))
	}
}

impl ToArg for InstanceArg {
	fn to_arg(&self) -> Result<ArgValue, KeyDerivationError> {
		Ok(ArgValue::Instance(self.clone()))
	}
}

impl<T: Any + Send + Sync> ToArg for Identity<T> {
	fn to_arg(&self) -> Result<ArgValue, KeyDerivationError> {
		Ok(ArgValue::Instance(InstanceArg::of(&self.0)))
	}
}

impl ToArg for () {
	fn to_arg(&self) -> Result<ArgValue, KeyDerivationError> {
		Ok(ArgValue::Null)
	}
}

impl ToArg for bool {
	fn to_arg(&self) -> Result<ArgValue, KeyDerivationError> {
		Ok(ArgValue::Bool(*self))
	}
}

impl ToArg for char {
	fn to_arg(&self) -> Result<ArgValue, KeyDerivationError> {
		Ok(ArgValue::Char(*self))
	}
}

macro_rules! impl_to_arg_signed {
	($($ty:ty),*) => {
		$(
			impl ToArg for $ty {
				fn to_arg(&self) -> Result<ArgValue, KeyDerivationError> {
					Ok(ArgValue::Int(*self as i64))
				}
			}
		)*
	};
}

macro_rules! impl_to_arg_unsigned {
	($($ty:ty),*) => {
		$(
			impl ToArg for $ty {
				fn to_arg(&self) -> Result<ArgValue, KeyDerivationError> {
					Ok(ArgValue::UInt(*self as u64))
				}
			}
		)*
	};
}

impl_to_arg_signed!(i8, i16, i32, i64, isize);
impl_to_arg_unsigned!(u8, u16, u32, u64, usize);

impl ToArg for f32 {
	fn to_arg(&self) -> Result<ArgValue, KeyDerivationError> {
		ArgValue::float(f64::from(*self))
	}
}

impl ToArg for f64 {
	fn to_arg(&self) -> Result<ArgValue, KeyDerivationError> {
		ArgValue::float(*self)
	}
}

impl ToArg for str {
	fn to_arg(&self) -> Result<ArgValue, KeyDerivationError> {
		Ok(ArgValue::Str(self.to_owned()))
	}
}

impl ToArg for String {
	fn to_arg(&self) -> Result<ArgValue, KeyDerivationError> {
		Ok(ArgValue::Str(self.clone()))
	}
}

impl<T: ToArg + ?Sized> ToArg for &T {
	fn to_arg(&self) -> Result<ArgValue, KeyDerivationError> {
		(**self).to_arg()
	}
}

impl<T: ToArg + ?Sized> ToArg for Box<T> {
	fn to_arg(&self) -> Result<ArgValue, KeyDerivationError> {
		(**self).to_arg()
	}
}

/// Keys by the pointee's value. Use [`Identity`] to key by allocation.
impl<T: ToArg + ?Sized> ToArg for Arc<T> {
	fn to_arg(&self) -> Result<ArgValue, KeyDerivationError> {
		(**self).to_arg()
	}
}

impl<T: ToArg + ToOwned + ?Sized> ToArg for Cow<'_, T> {
	fn to_arg(&self) -> Result<ArgValue, KeyDerivationError> {
		(**self).to_arg()
	}
}

impl<T: ToArg> ToArg for Option<T> {
	fn to_arg(&self) -> Result<ArgValue, KeyDerivationError> {
		match self {
			Some(value) => value.to_arg().map(|v| ArgValue::Some(Box::new(v))),
			None => Ok(ArgValue::Null),
		}
	}
}

fn seq_from<'a, T: ToArg + 'a>(
	items: impl IntoIterator<Item = &'a T>,
) -> Result<ArgValue, KeyDerivationError> {
	items
		.into_iter()
		.enumerate()
		.map(|(index, item)| item.to_arg().map_err(|e| e.in_element(index)))
		.collect::<Result<Vec<_>, _>>()
		.map(ArgValue::Seq)
}

fn map_from<'a, K, V>(
	entries: impl IntoIterator<Item = (&'a K, &'a V)>,
) -> Result<ArgValue, KeyDerivationError>
where
	K: AsRef<str> + 'a,
	V: ToArg + 'a,
{
	let mut map = BTreeMap::new();
	for (key, value) in entries {
		let key = key.as_ref();
		let value = value.to_arg().map_err(|e| e.in_entry(key))?;
		map.insert(key.to_owned(), value);
	}
	Ok(ArgValue::Map(map))
}

impl<T: ToArg> ToArg for [T] {
	fn to_arg(&self) -> Result<ArgValue, KeyDerivationError> {
		seq_from(self)
	}
}

impl<T: ToArg, const N: usize> ToArg for [T; N] {
	fn to_arg(&self) -> Result<ArgValue, KeyDerivationError> {
		seq_from(self)
	}
}

impl<T: ToArg> ToArg for Vec<T> {
	fn to_arg(&self) -> Result<ArgValue, KeyDerivationError> {
		seq_from(self)
	}
}

impl<T: ToArg> ToArg for VecDeque<T> {
	fn to_arg(&self) -> Result<ArgValue, KeyDerivationError> {
		seq_from(self)
	}
}

impl<K, V, S> ToArg for HashMap<K, V, S>
where
	K: AsRef<str>,
	V: ToArg,
	S: BuildHasher,
{
	fn to_arg(&self) -> Result<ArgValue, KeyDerivationError> {
		map_from(self)
	}
}

impl<K, V> ToArg for BTreeMap<K, V>
where
	K: AsRef<str>,
	V: ToArg,
{
	fn to_arg(&self) -> Result<ArgValue, KeyDerivationError> {
		map_from(self)
	}
}

#[cfg(feature = "json")]
impl ToArg for serde_json::Value {
	fn to_arg(&self) -> Result<ArgValue, KeyDerivationError> {
		use serde_json::Value;

		match self {
			Value::Null => Ok(ArgValue::Null),
			Value::Bool(b) => Ok(ArgValue::Bool(*b)),
			Value::Number(n) => {
				if let Some(i) = n.as_i64() {
					Ok(ArgValue::Int(i))
				} else if let Some(u) = n.as_u64() {
					Ok(ArgValue::UInt(u))
				} else {
					ArgValue::float(n.as_f64().unwrap_or(f64::NAN))
				}
			}
			Value::String(s) => Ok(ArgValue::Str(s.clone())),
			Value::Array(items) => seq_from(items),
			Value::Object(entries) => map_from(entries),
		}
	}
}
