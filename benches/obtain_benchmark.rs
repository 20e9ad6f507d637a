use std::collections::HashMap;
use std::convert::Infallible;
use std::hint::black_box;
use std::sync::Arc;

use construct_cache::{ConstructionCache, KeyArgs, TypeArg};
use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};

struct Order;
struct Invoice;

#[derive(Debug)]
struct BenchValue {
	data: Vec<u8>,
}

fn construct(_: impl Sized) -> Result<BenchValue, Infallible> {
	Ok(BenchValue {
		data: vec![0u8; 64],
	})
}

fn bench_construct(c: &mut Criterion) {
	let mut group = c.benchmark_group("construct");

	for size in [100u64, 1000, 10000] {
		group.throughput(Throughput::Elements(size));
		group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, &size| {
			b.iter(|| {
				let cache = ConstructionCache::new();
				for i in 0..size {
					let _ = cache.obtain((black_box(i),), construct);
				}
			});
		});
	}

	group.finish();
}

fn bench_obtain_hit(c: &mut Criterion) {
	let cache = ConstructionCache::new();
	for i in 0..1000u64 {
		let _ = cache.obtain((i, "pkg.bench"), construct);
	}

	c.bench_function("obtain_hit", |b| {
		b.iter(|| {
			for i in 0..1000u64 {
				let _ = cache.obtain((black_box(i), "pkg.bench"), construct);
			}
		});
	});
}

fn bench_key_derivation(c: &mut Criterion) {
	let mut props = HashMap::new();
	props.insert("retainReferenceToInfo", false);
	props.insert("supressAccessorWarnings", false);
	props.insert("improvedXsiTypeHandling", true);
	let classes = [TypeArg::of::<Order>(), TypeArg::of::<Invoice>()];

	let mut group = c.benchmark_group("derive_key");

	group.bench_function("path", |b| {
		b.iter(|| black_box(("com.example.model",)).derive_key());
	});

	group.bench_function("classes_with_properties", |b| {
		b.iter(|| black_box((&classes, &props)).derive_key());
	});

	group.finish();
}

fn bench_prederived_vs_derived(c: &mut Criterion) {
	let cache = ConstructionCache::new();
	let args = ("com.example.model", vec!["Order", "Invoice"]);
	let _ = cache.obtain(args.clone(), construct);
	let key = args.derive_key().unwrap();

	let mut group = c.benchmark_group("lookup");

	group.bench_function("get", |b| {
		b.iter(|| cache.get(black_box(&args)));
	});

	group.bench_function("get_by_key", |b| {
		b.iter(|| cache.get_by_key(black_box(&key)));
	});

	group.finish();
}

fn bench_concurrent_obtain(c: &mut Criterion) {
	use std::thread;

	let cache = Arc::new(ConstructionCache::new());
	for i in 0..1000u64 {
		let _ = cache.obtain((i,), construct);
	}

	c.bench_function("concurrent_obtain_4_threads", |b| {
		b.iter(|| {
			let mut handles = vec![];

			for t in 0..4u64 {
				let cache = cache.clone();
				handles.push(thread::spawn(move || {
					for i in 0..250u64 {
						let _ = cache.obtain((t * 250 + i,), construct);
					}
				}));
			}

			for handle in handles {
				handle.join().unwrap();
			}
		});
	});
}

fn bench_contended_first_construction(c: &mut Criterion) {
	use std::sync::Barrier;
	use std::thread;

	c.bench_function("contended_first_construction", |b| {
		b.iter(|| {
			let cache = Arc::new(ConstructionCache::new());
			let barrier = Arc::new(Barrier::new(8));
			let handles: Vec<_> = (0..8)
				.map(|_| {
					let cache = cache.clone();
					let barrier = barrier.clone();
					thread::spawn(move || {
						barrier.wait();
						cache.obtain(("shared",), |_| {
							Ok::<_, Infallible>(BenchValue {
								data: vec![0u8; 4096],
							})
						})
					})
				})
				.collect();

			for handle in handles {
				let value = handle.join().unwrap().unwrap();
				black_box(value.data.len());
			}
		});
	});
}

criterion_group!(
	benches,
	bench_construct,
	bench_obtain_hit,
	bench_key_derivation,
	bench_prederived_vs_derived,
	bench_concurrent_obtain,
	bench_contended_first_construction
);

criterion_main!(benches);
