use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};
use geoquery::compute::{bits_for_bounding_box, distance, queries_at_location};
use geoquery::prelude::*;
use std::sync::Arc;

fn benchmark_geohash(c: &mut Criterion) {
    let mut group = c.benchmark_group("geohash");

    let location = Location::new(37.7853074, -122.4054274).unwrap();
    for precision in [5, 10, 22] {
        group.bench_with_input(
            BenchmarkId::new("encode", precision),
            &precision,
            |b, &precision| b.iter(|| GeoHash::encode(black_box(&location), precision).unwrap()),
        );
    }

    let other = Location::new(40.7128, -74.0060).unwrap();
    group.bench_function("distance", |b| {
        b.iter(|| distance(black_box(&location), black_box(&other)))
    });

    group.finish();
}

fn benchmark_decomposition(c: &mut Criterion) {
    let mut group = c.benchmark_group("decomposition");

    let center = Location::new(51.5074, -0.1278).unwrap();
    for radius in [10.0, 500.0, 10_000.0, 1_000_000.0] {
        group.bench_with_input(
            BenchmarkId::new("bits_for_bounding_box", radius as u64),
            &radius,
            |b, &radius| b.iter(|| bits_for_bounding_box(black_box(&center), radius)),
        );
        group.bench_with_input(
            BenchmarkId::new("queries_at_location", radius as u64),
            &radius,
            |b, &radius| b.iter(|| queries_at_location(black_box(&center), radius).unwrap()),
        );
    }

    // Near the antimeridian the neighbours wrap and fewer ranges join.
    let dateline = Location::new(-16.5, 179.99).unwrap();
    group.bench_function("queries_at_location_dateline", |b| {
        b.iter(|| queries_at_location(black_box(&dateline), 5_000.0).unwrap())
    });

    group.finish();
}

fn benchmark_live_query(c: &mut Criterion) {
    let mut group = c.benchmark_group("live_query");
    group.sample_size(20);

    for count in [100, 1_000] {
        let store = Arc::new(MemoryStore::new());
        let dispatcher = Arc::new(ManualDispatcher::new());
        let index = GeoIndex::new(store.clone(), dispatcher.clone());
        for i in 0..count {
            let lat = 48.8566 + ((i % 100) as f64 * 0.0001);
            let lon = 2.3522 + ((i / 100) as f64 * 0.0001);
            index
                .set_location(&format!("bike:{}", i), Location::new(lat, lon).unwrap())
                .unwrap();
        }
        let center = Location::new(48.8566, 2.3522).unwrap();

        group.bench_with_input(BenchmarkId::new("initial_load", count), &count, |b, _| {
            b.iter(|| {
                let query = index.query_at_location(center, 2.0).unwrap();
                let (tx, rx) = crossbeam_channel::unbounded();
                query.add_data_listener(Arc::new(EventSender::new(tx))).unwrap();
                store.flush();
                dispatcher.run_pending();
                black_box(rx.try_iter().count())
            })
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    benchmark_geohash,
    benchmark_decomposition,
    benchmark_live_query
);

criterion_main!(benches);
