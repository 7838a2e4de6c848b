/// Buffer pool and pattern fill benchmarks
///
/// Compares pooled chunk buffers against fresh allocations and measures
/// how fast each fill pattern can produce data.
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use freewipe::algorithms::{FillPattern, PatternFiller};
use freewipe::io::BufferPool;
use std::sync::Arc;
use std::thread;

const SIZES: &[(&str, usize)] = &[
    ("64KB", 64 * 1024),
    ("2MB", 2 * 1024 * 1024),
    ("4MB", 4 * 1024 * 1024),
    ("16MB", 16 * 1024 * 1024),
];

fn bench_acquire(c: &mut Criterion) {
    let mut group = c.benchmark_group("buffer_acquire");

    for &(name, size) in SIZES {
        group.throughput(Throughput::Bytes(size as u64));

        group.bench_with_input(BenchmarkId::new("fresh_vec", name), &size, |b, &size| {
            b.iter(|| {
                let buffer = vec![0u8; size];
                black_box(buffer);
            });
        });

        let pool = BufferPool::new();
        group.bench_with_input(BenchmarkId::new("pooled", name), &size, |b, &size| {
            b.iter(|| {
                let buffer = pool.acquire(size);
                black_box(&buffer);
                pool.release(buffer);
            });
        });
    }

    group.finish();
}

fn bench_contended_pool(c: &mut Criterion) {
    let mut group = c.benchmark_group("buffer_pool_contention");
    let size = 2 * 1024 * 1024;

    for threads in [1usize, 2, 4, 8] {
        group.bench_with_input(BenchmarkId::from_parameter(threads), &threads, |b, &threads| {
            let pool = Arc::new(BufferPool::new());
            b.iter(|| {
                let handles: Vec<_> = (0..threads)
                    .map(|_| {
                        let pool = pool.clone();
                        thread::spawn(move || {
                            for _ in 0..16 {
                                let buffer = pool.acquire(size);
                                black_box(&buffer);
                            }
                        })
                    })
                    .collect();
                for handle in handles {
                    handle.join().unwrap();
                }
            });
        });
    }

    group.finish();
}

fn bench_pattern_fill(c: &mut Criterion) {
    let mut group = c.benchmark_group("pattern_fill");
    let size = 4 * 1024 * 1024;
    group.throughput(Throughput::Bytes(size as u64));

    for pattern in [FillPattern::Zero, FillPattern::Ones, FillPattern::Random] {
        let pool = BufferPool::new();
        let mut buffer = pool.acquire(size);
        let mut filler = PatternFiller::new(pattern).unwrap();

        group.bench_function(BenchmarkId::from_parameter(pattern), |b| {
            b.iter(|| {
                filler.fill(&mut buffer).unwrap();
                black_box(&buffer);
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_acquire, bench_contended_pool, bench_pattern_fill);
criterion_main!(benches);
