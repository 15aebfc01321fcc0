//! Benchmarks for request coalescing.

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use futures::future::join_all;
use requester::coalescing::Coalescer;
use std::sync::Arc;
use tokio::runtime::Runtime;

fn runtime() -> Runtime {
    tokio::runtime::Builder::new_multi_thread()
        .worker_threads(4)
        .enable_all()
        .build()
        .unwrap()
}

fn coalescing_benchmark(c: &mut Criterion) {
    let rt = runtime();

    c.bench_function("dispatch_single", |b| {
        let coalescer: Coalescer<u64, u64> = Coalescer::new();
        b.iter(|| rt.block_on(coalescer.dispatch(black_box(1), |key, _| {
            let key = *key;
            async move { key * 2 }
        })));
    });

    c.bench_function("dispatch_shared_64", |b| {
        let coalescer: Arc<Coalescer<u64, u64>> = Arc::new(Coalescer::new());
        b.iter(|| {
            rt.block_on(async {
                let waiters = (0..64).map(|_| {
                    coalescer.dispatch(7, |key, _| {
                        let key = *key;
                        async move {
                            tokio::task::yield_now().await;
                            key
                        }
                    })
                });
                black_box(join_all(waiters).await)
            })
        });
    });

    c.bench_function("dispatch_distinct_64", |b| {
        let coalescer: Arc<Coalescer<u64, u64>> = Arc::new(Coalescer::new());
        b.iter(|| {
            rt.block_on(async {
                let waiters = (0..64u64).map(|key| {
                    coalescer.dispatch(key, |key, _| {
                        let key = *key;
                        async move { key }
                    })
                });
                black_box(join_all(waiters).await)
            })
        });
    });
}

criterion_group!(benches, coalescing_benchmark);
criterion_main!(benches);
