use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use data_sampling::{
    InMemoryDataset, InterleavedConfig, InterleavedLoader, InterleavedSampler, LoaderConfig,
    RandomSampler, Sample, SequentialSampler, StopCondition, Trigger,
};
use tch::Tensor;

/// Benchmarks for interleaved scheduling and loading.
///
/// This measures:
/// 1. Scheduling overhead: producing index batches without touching data
/// 2. Loading: schedule + fetch + collate, single-threaded vs. with workers
///
/// To run these, use:
/// ```bash
/// cargo bench --bench interleaved_bench
/// ```
const SIZES: [usize; 3] = [1_000, 10_000, 100_000];

const BATCH_SIZE: usize = 32;

fn make_sampler(main_size: usize) -> InterleavedSampler {
    InterleavedSampler::builder(
        RandomSampler::new(main_size, false, None, 0).unwrap(),
        BATCH_SIZE,
    )
    .interleave(InterleavedConfig::new(
        SequentialSampler::new(main_size / 10),
        Trigger::EveryNUpdates(50),
    ))
    .stop(StopCondition::Epochs(1))
    .build()
    .unwrap()
}

fn make_dataset(size: usize) -> InMemoryDataset<Sample> {
    InMemoryDataset::new(
        (0..size)
            .map(|i| Sample::from_single("input_ids", Tensor::from_slice(&[i as i64; 16])))
            .collect(),
    )
}

/// Measure pure scheduling overhead
fn bench_scheduling(c: &mut Criterion) {
    let mut group = c.benchmark_group("Scheduling");
    for &size in &SIZES {
        let sampler = make_sampler(size);
        group.throughput(Throughput::Elements(size as u64));
        group.bench_with_input(BenchmarkId::new("batches", size), &sampler, |b, sampler| {
            b.iter(|| {
                let count = sampler.batches().iter().map(|batch| batch.unwrap().len()).sum::<usize>();
                black_box(count);
            })
        });
    }
    group.finish();
}

/// Measure schedule + fetch + collate
fn bench_loading(c: &mut Criterion) {
    let mut group = c.benchmark_group("Loading");
    let size = 10_000;
    group.throughput(Throughput::Elements(size as u64));

    for workers in [0, 2, 4] {
        let loader = InterleavedLoader::builder(make_sampler(size), make_dataset(size))
            .interleaved_dataset(make_dataset(size / 10))
            .config(LoaderConfig::builder().num_workers(workers).seed(0).build())
            .build()
            .unwrap();

        group.bench_with_input(BenchmarkId::new("workers", workers), &loader, |b, loader| {
            b.iter(|| {
                let count = loader.iter().unwrap().map(|batch| batch.unwrap().origin).count();
                black_box(count);
            })
        });
    }
    group.finish();
}

criterion_group!(benches, bench_scheduling, bench_loading);
criterion_main!(benches);
