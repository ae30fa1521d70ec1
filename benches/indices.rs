// Index benchmarks: insertion and search scaling for the trigram and
// postings indexes.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use lci_core::{FileId, IndexConfig, PostingsIndex, TrigramIndex};

fn sample_content(i: usize) -> String {
    format!("fn handler_{i}(request: Request) -> Response {{ process_request(request) }}\n")
}

fn bench_trigram_insertion(c: &mut Criterion) {
    let mut group = c.benchmark_group("trigram_insertion");

    for size in [100, 1000, 10000].iter() {
        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, &size| {
            let contents: Vec<String> = (0..size).map(sample_content).collect();

            b.iter(|| {
                let index = TrigramIndex::new(&IndexConfig::default());
                for (i, content) in contents.iter().enumerate() {
                    index.index_file(FileId::from_raw((i + 1) as u32), content.as_bytes());
                }
                black_box(index)
            });
        });
    }

    group.finish();
}

fn bench_trigram_search(c: &mut Criterion) {
    let mut group = c.benchmark_group("trigram_search");

    for size in [100, 1000, 10000].iter() {
        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, &size| {
            let index = TrigramIndex::new(&IndexConfig::default());
            for i in 0..size {
                index.index_file(FileId::from_raw((i + 1) as u32), sample_content(i).as_bytes());
            }

            b.iter(|| {
                black_box(index.find_candidates("handler_", false));
            });
        });
    }

    group.finish();
}

fn bench_postings_insertion(c: &mut Criterion) {
    let mut group = c.benchmark_group("postings_insertion");

    for size in [100, 1000, 10000].iter() {
        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, &size| {
            let contents: Vec<String> = (0..size).map(sample_content).collect();

            b.iter(|| {
                let index = PostingsIndex::new(&IndexConfig::default());
                for (i, content) in contents.iter().enumerate() {
                    index.index_file(FileId::from_raw((i + 1) as u32), content.as_bytes());
                }
                black_box(index)
            });
        });
    }

    group.finish();
}

fn bench_postings_search(c: &mut Criterion) {
    let mut group = c.benchmark_group("postings_search");

    for size in [100, 1000, 10000].iter() {
        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, &size| {
            let index = PostingsIndex::new(&IndexConfig::default());
            for i in 0..size {
                index.index_file(FileId::from_raw((i + 1) as u32), sample_content(i).as_bytes());
            }

            b.iter(|| {
                black_box(index.find("process_request", false));
            });
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_trigram_insertion,
    bench_trigram_search,
    bench_postings_insertion,
    bench_postings_search
);
criterion_main!(benches);
