#![deny(warnings)]

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use futures::stream::{self, StreamExt, TryStreamExt};
use tokio::runtime::Runtime;

use breakwater::{CircuitBreaker, Config, Error};

fn single_threaded(c: &mut Criterion) {
    let runtime = Runtime::new().unwrap();
    let circuit_breaker = new_circuit_breaker();
    let mut n = 0;

    c.bench_function("single_threaded", |b| {
        b.iter(|| {
            let res = runtime.block_on(circuit_breaker.fire(|| dangerous_call(n)));
            match res {
                Ok(_) | Err(Error::Inner(_)) => {}
                Err(err) => unreachable!("{:?}", err),
            }
            n += 1;
        })
    });
}

fn multi_threaded_in_batch(c: &mut Criterion) {
    let runtime = Runtime::new().unwrap();
    let circuit_breaker = new_circuit_breaker();
    let batch_size = 10;

    c.bench_function("multi_threaded_in_batch", |b| {
        b.iter(|| {
            let batch = (0..batch_size).map(|n| {
                let circuit_breaker = circuit_breaker.clone();
                async move {
                    match circuit_breaker.fire(|| dangerous_call(n)).await {
                        Ok(n) | Err(Error::Inner(n)) => Ok(n),
                        Err(_) => Err(0usize),
                    }
                }
            });

            let batch = stream::iter(batch)
                .buffer_unordered(batch_size)
                .try_collect();

            let res: Vec<_> = runtime.block_on(batch).unwrap();
            assert_eq!(45usize, res.iter().sum::<usize>());
        })
    });
}

/// Never trips, so every call reaches `dangerous_call`.
fn new_circuit_breaker() -> CircuitBreaker {
    CircuitBreaker::new(
        "bench",
        Config {
            failure_threshold_percent: 100.0,
            failure_threshold: u32::MAX,
            ..Default::default()
        },
    )
    .unwrap()
}

async fn dangerous_call(n: usize) -> Result<usize, usize> {
    if n % 5 == 0 {
        black_box(Err(n))
    } else {
        black_box(Ok(n))
    }
}

criterion_group!(benches, single_threaded, multi_threaded_in_batch);
criterion_main!(benches);
