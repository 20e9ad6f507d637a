use std::collections::BTreeMap;
use std::sync::Arc;

use construct_cache::{ArgValue, ConstructionCache, KeyArgs, KeyDerivationError, ToArg};

#[derive(KeyArgs)]
struct ContextPath {
	path: String,
	strict: bool,
}

#[derive(KeyArgs)]
#[key_args(signature = "context_path")]
struct RenamedContextPath {
	path: String,
	#[key_args(skip)]
	#[allow(dead_code)]
	trace_label: &'static str,
	strict: bool,
}

#[derive(KeyArgs)]
struct Classes(Vec<&'static str>, BTreeMap<String, bool>);

#[derive(KeyArgs)]
struct Global;

#[derive(KeyArgs)]
struct Wrapped<T> {
	inner: T,
}

mod orders {
	use construct_cache::KeyArgs;

	#[derive(KeyArgs)]
	pub struct Lookup {
		pub id: u32,
	}
}

mod invoices {
	use construct_cache::KeyArgs;

	#[derive(KeyArgs)]
	pub struct Lookup {
		pub id: u32,
	}
}

#[test]
fn test_named_fields_in_order() {
	let key = ContextPath {
		path: "pkg.a".into(),
		strict: true,
	}
	.derive_key()
	.unwrap();

	assert_eq!(key.signature(), Some(concat!(module_path!(), "::ContextPath")));
	assert_eq!(key.args(), &[ArgValue::Str("pkg.a".into()), ArgValue::Bool(true)]);
}

#[test]
fn test_signature_override_and_skip() {
	let a = RenamedContextPath {
		path: "pkg.a".into(),
		trace_label: "first",
		strict: false,
	}
	.derive_key()
	.unwrap();
	let b = RenamedContextPath {
		path: "pkg.a".into(),
		trace_label: "second",
		strict: false,
	}
	.derive_key()
	.unwrap();

	assert_eq!(a, b);
	assert_eq!(a.signature(), Some("context_path"));
	assert_eq!(a.arity(), 2);
}

#[test]
fn test_signature_separates_structs_with_equal_fields() {
	let plain = ContextPath {
		path: "pkg.a".into(),
		strict: false,
	}
	.derive_key()
	.unwrap();
	let renamed = RenamedContextPath {
		path: "pkg.a".into(),
		trace_label: "",
		strict: false,
	}
	.derive_key()
	.unwrap();

	assert_eq!(plain.args(), renamed.args());
	assert_ne!(plain, renamed);
}

#[test]
fn test_tuple_and_unit_structs() {
	let mut props = BTreeMap::new();
	props.insert("retain".to_string(), false);

	let key = Classes(vec!["Order"], props).derive_key().unwrap();
	assert_eq!(key.arity(), 2);
	assert_eq!(key.signature(), Some("derive_tests::Classes"));

	let unit = Global.derive_key().unwrap();
	assert_eq!(unit.arity(), 0);
	assert_eq!(unit.signature(), Some("derive_tests::Global"));
}

#[test]
fn test_generic_struct_error_position() {
	let err = Wrapped {
		inner: f64::NAN,
	}
	.derive_key()
	.unwrap_err();
	assert!(matches!(err, KeyDerivationError::Argument { index: 0, .. }));

	let key = Wrapped {
		inner: 2.5f64,
	}
	.derive_key()
	.unwrap();
	assert_eq!(key.args(), &[2.5f64.to_arg().unwrap()]);
}

#[test]
fn test_derived_args_drive_the_cache() {
	let cache = ConstructionCache::new();

	let first = cache
		.obtain(
			ContextPath {
				path: "pkg.a".into(),
				strict: true,
			},
			|args| Ok::<_, std::io::Error>(format!("{}:{}", args.path, args.strict)),
		)
		.unwrap();
	let second = cache
		.obtain(
			ContextPath {
				path: "pkg.a".into(),
				strict: true,
			},
			|_| -> Result<String, std::io::Error> { unreachable!() },
		)
		.unwrap();

	assert!(Arc::ptr_eq(&first, &second));
	assert_eq!(*first, "pkg.a:true");
}

#[test]
fn test_same_named_structs_in_different_modules_stay_distinct() {
	let cache = ConstructionCache::new();

	let order = cache
		.obtain(orders::Lookup { id: 1 }, |_| Ok::<_, std::io::Error>("order"))
		.unwrap();
	let invoice = cache
		.obtain(invoices::Lookup { id: 1 }, |_| Ok::<_, std::io::Error>("invoice"))
		.unwrap();

	assert_eq!(*order, "order");
	assert_eq!(*invoice, "invoice");
	assert!(!Arc::ptr_eq(&order, &invoice));
	assert_eq!(
		invoices::Lookup { id: 1 }.derive_key().unwrap().signature(),
		Some("derive_tests::invoices::Lookup")
	);
}
