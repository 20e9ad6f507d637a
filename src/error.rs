//! Error types for key derivation and construction.

use thiserror::Error;

/// An argument could not be normalized into a comparable key component.
///
/// Path variants wrap the leaf error so the message points at the offending
/// argument, e.g. `argument 1: entry "timeout": floating-point value NaN ...`.
#[derive(Error, Debug, Clone)]
pub enum KeyDerivationError {
	/// Failure inside the top-level argument at `index`.
	#[error("argument {index}: {source}")]
	Argument {
		index: usize,
		source: Box<KeyDerivationError>,
	},

	/// Failure inside element `index` of a sequence argument.
	#[error("element {index}: {source}")]
	Element {
		index: usize,
		source: Box<KeyDerivationError>,
	},

	/// Failure inside the value stored under `key` of a map argument.
	#[error("entry {key:?}: {source}")]
	MapEntry {
		key: String,
		source: Box<KeyDerivationError>,
	},

	/// NaN has no reflexive equality and cannot take part in a key.
	#[error("floating-point value {value} has no stable equality")]
	NonComparableFloat { value: f64 },

	/// Raised by user `ToArg` implementations.
	#[error("{0}")]
	Custom(String),
}

impl KeyDerivationError {
	/// Build a [`KeyDerivationError::Custom`] from any message.
	pub fn custom(message: impl Into<String>) -> Self {
		Self::Custom(message.into())
	}

	/// Attribute this error to the top-level argument at `index`.
	pub fn at(self, index: usize) -> Self {
		Self::Argument {
			index,
			source: Box::new(self),
		}
	}

	pub(crate) fn in_element(self, index: usize) -> Self {
		Self::Element {
			index,
			source: Box::new(self),
		}
	}

	pub(crate) fn in_entry(self, key: &str) -> Self {
		Self::MapEntry {
			key: key.to_owned(),
			source: Box::new(self),
		}
	}

	/// The innermost error, with all path information stripped.
	pub fn root_cause(&self) -> &KeyDerivationError {
		match self {
			Self::Argument {
				source,
				..
			}
			| Self::Element {
				source,
				..
			}
			| Self::MapEntry {
				source,
				..
			} => source.root_cause(),
			leaf => leaf,
		}
	}
}

/// Failure of an `obtain` call.
///
/// Construction errors are the factory's own error, passed through verbatim.
/// Neither variant is ever stored in the cache.
#[derive(Error, Debug)]
pub enum ObtainError<E> {
	#[error("failed to derive cache key: {0}")]
	Key(#[from] KeyDerivationError),

	#[error("construction failed: {0}")]
	Construction(#[source] E),
}

impl<E> ObtainError<E> {
	/// Returns `true` if the factory ran and failed.
	pub fn is_construction(&self) -> bool {
		matches!(self, Self::Construction(_))
	}

	/// The factory error, if that is what this is.
	pub fn into_construction(self) -> Option<E> {
		match self {
			Self::Construction(err) => Some(err),
			Self::Key(_) => None,
		}
	}

	/// The key derivation error, if that is what this is.
	pub fn key_error(&self) -> Option<&KeyDerivationError> {
		match self {
			Self::Key(err) => Some(err),
			Self::Construction(_) => None,
		}
	}
}
