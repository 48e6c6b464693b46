use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use mmap_assets_core::bundle::checksum16;
use mmap_assets_core::prelude::*;
use std::hint::black_box;

fn generate_assets(count: usize, min_len: usize, max_len: usize) -> Vec<Asset> {
    use rand::{Rng, SeedableRng};
    let mut rng = rand::rngs::StdRng::seed_from_u64(1);
    (0..count)
        .map(|i| {
            let len = rng.gen_range(min_len..=max_len);
            Asset {
                name: format!("asset_{i:04}.bin"),
                bytes: (0..len).map(|_| rng.r#gen()).collect(),
            }
        })
        .collect()
}

fn bench_bundle_build(c: &mut Criterion) {
    let mut group = c.benchmark_group("bundle_build");

    for count in [16, 128, 512] {
        let assets = generate_assets(count, 1024, 16 * 1024);
        let bytes: usize = assets.iter().map(|a| a.bytes.len()).sum();
        group.throughput(Throughput::Bytes(bytes as u64));

        group.bench_with_input(BenchmarkId::new("from_assets", count), &assets, |b, assets| {
            b.iter(|| {
                let bundle = BundleBuilder::new(32)
                    .build_from_assets(assets.clone())
                    .expect("bundle");
                black_box(bundle.to_bytes())
            });
        });
    }

    group.finish();
}

fn bench_checksum(c: &mut Criterion) {
    let mut group = c.benchmark_group("checksum16");
    for size in [64 * 1024, 1024 * 1024] {
        let data = vec![0xA5u8; size];
        group.throughput(Throughput::Bytes(size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &data, |b, data| {
            b.iter(|| black_box(checksum16(&[data.as_slice()])));
        });
    }
    group.finish();
}

criterion_group!(benches, bench_bundle_build, bench_checksum);
criterion_main!(benches);
