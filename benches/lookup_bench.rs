use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use geoatlas::{resolve, GeoDatabase, GeoIndexBuilder, GeoRecord, Ipv4Network};
use std::hint::black_box;
use std::net::Ipv4Addr;

fn record_for(i: u32) -> GeoRecord {
    let mut record = GeoRecord::fallback();
    // 20 distinct countries so records dedup like real data
    record.country.iso_code = format!("C{}", i % 20);
    record.country.en = format!("Country {}", i % 20);
    record.country.ar = format!("دولة {}", i % 20);
    record.city.en = format!("City {}", i);
    record.location.latitude = Some(f64::from(i % 90));
    record.location.longitude = Some(f64::from(i % 180));
    record
}

fn build(count: u32) -> GeoIndexBuilder {
    let mut builder = GeoIndexBuilder::new();
    for i in 0..count {
        let network = Ipv4Network::new(Ipv4Addr::from(0x0A00_0000 | (i << 8)), 24).unwrap();
        builder.insert(&network, &record_for(i)).unwrap();
    }
    builder
}

// Benchmark: building and serializing indexes of increasing size
fn bench_build(c: &mut Criterion) {
    let mut group = c.benchmark_group("index_build");
    group.sample_size(20);

    for count in [1_000u32, 10_000, 50_000] {
        group.throughput(Throughput::Elements(u64::from(count)));
        group.bench_with_input(BenchmarkId::new("slash24", count), &count, |b, &count| {
            b.iter(|| {
                let bytes = build(count).serialize().unwrap();
                black_box(bytes);
            });
        });
    }
    group.finish();
}

// Benchmark: longest-prefix lookups against a built index
fn bench_lookup(c: &mut Criterion) {
    let mut group = c.benchmark_group("lookup");
    let count = 50_000u32;
    let db = GeoDatabase::from_bytes(build(count).serialize().unwrap()).unwrap();

    let hits: Vec<Ipv4Addr> = (0..1000u32)
        .map(|i| Ipv4Addr::from(0x0A00_0000 | ((i * 37 % count) << 8) | 7))
        .collect();
    let misses: Vec<Ipv4Addr> = (0..1000u32)
        .map(|i| Ipv4Addr::from(0xC000_0000 | i))
        .collect();

    group.throughput(Throughput::Elements(hits.len() as u64));
    group.bench_function("hit", |b| {
        b.iter(|| {
            for addr in &hits {
                black_box(db.lookup(black_box(*addr)).unwrap());
            }
        });
    });
    group.bench_function("miss", |b| {
        b.iter(|| {
            for addr in &misses {
                black_box(db.lookup(black_box(*addr)).unwrap());
            }
        });
    });

    let text: Vec<String> = hits.iter().map(ToString::to_string).collect();
    group.bench_function("resolve_json", |b| {
        b.iter(|| {
            for address in &text {
                let resolution = resolve(black_box(address), Some(&db));
                black_box(serde_json::to_string(&resolution).unwrap());
            }
        });
    });
    group.finish();
}

criterion_group!(benches, bench_build, bench_lookup);
criterion_main!(benches);
