#![deny(warnings)]

use std::time::Duration;

use criterion::{black_box, criterion_group, criterion_main, Criterion};

use breakwater::{Outcome, RollingWindow};

fn record_and_count(c: &mut Criterion) {
    let mut window = RollingWindow::new(Duration::from_millis(1000), 10);
    let mut n = 0u64;

    c.bench_function("record_and_count", |b| {
        b.iter(|| {
            let outcome = if n % 3 == 0 {
                Outcome::Failure
            } else {
                Outcome::Success
            };
            window.record(outcome);
            black_box(window.counts());
            n += 1;
        })
    });
}

criterion_group!(benches, record_and_count);
criterion_main!(benches);
