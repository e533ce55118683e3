//! Benchmarks for view operations
//!
//! - Bucket assignment and slice arithmetic
//! - Enqueue into the in-memory store
//! - Browsing queues of growing size and bucket count
//! - Browsing after a long idle period (cursor advancement)
#![allow(clippy::expect_used, clippy::unwrap_used)]

use std::{
    hint::black_box,
    sync::Arc,
    time::{Duration, Instant, SystemTime},
};

use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use mailqueue_view::{
    BrowseReport, Mail, MailKey, MailQueueName, MailQueueView, MailQueueViewConfig, ManualClock,
    MemoryStore, PayloadRef, bucket_of, slices_between,
};

const HOUR: Duration = Duration::from_secs(3600);

fn view(bucket_count: u32, clock: &ManualClock) -> MailQueueView {
    MailQueueView::builder(
        MailQueueViewConfig {
            bucket_count,
            ..MailQueueViewConfig::default()
        },
        Arc::new(MemoryStore::new()),
    )
    .clock(Arc::new(clock.clone()))
    .build()
    .expect("Valid configuration")
}

fn mail() -> Mail {
    Mail::new(MailKey::generate(), PayloadRef::new("blob"))
        .with_sender("sender@example.com")
        .with_recipient("recipient@example.com")
}

// ============================================================================
// Partitioning Benchmarks
// ============================================================================

fn bench_partitioning(c: &mut Criterion) {
    let mut group = c.benchmark_group("partitioning");

    let key = MailKey::generate();
    group.bench_function("bucket_of", |b| {
        b.iter(|| bucket_of(black_box(&key), black_box(16)));
    });

    let start = SystemTime::UNIX_EPOCH;
    group.bench_function("slices_between_one_day", |b| {
        b.iter(|| slices_between(black_box(start), black_box(start + HOUR * 24), HOUR).count());
    });

    group.finish();
}

// ============================================================================
// Enqueue Benchmarks
// ============================================================================

fn bench_enqueue(c: &mut Criterion) {
    let mut group = c.benchmark_group("enqueue");

    let runtime = tokio::runtime::Runtime::new().expect("Failed to create runtime");

    for bucket_count in [1, 4, 16] {
        let clock = ManualClock::at_secs(0);
        let view = view(bucket_count, &clock);
        let queue = MailQueueName::from("spool");

        group.throughput(Throughput::Elements(1));
        group.bench_with_input(
            BenchmarkId::from_parameter(format!("{bucket_count}_buckets")),
            &bucket_count,
            |b, &_count| {
                b.to_async(&runtime).iter(|| {
                    let (view, queue) = (view.clone(), queue.clone());
                    async move { view.enqueue(&queue, &mail()).await.expect("Enqueue succeeds") }
                });
            },
        );
    }

    group.finish();
}

// ============================================================================
// Browse Benchmarks
// ============================================================================

fn bench_browse(c: &mut Criterion) {
    let mut group = c.benchmark_group("browse");

    let runtime = tokio::runtime::Runtime::new().expect("Failed to create runtime");

    for (bucket_count, mails) in [(1, 100), (4, 100), (4, 1000), (16, 1000)] {
        let clock = ManualClock::at_secs(0);
        let view = view(bucket_count, &clock);
        let queue = MailQueueName::from("spool");

        runtime.block_on(async {
            for _ in 0..mails {
                view.enqueue(&queue, &mail()).await.expect("Enqueue succeeds");
            }
        });

        group.throughput(Throughput::Elements(mails));
        group.bench_with_input(
            BenchmarkId::from_parameter(format!("{mails}_mails_{bucket_count}_buckets")),
            &mails,
            |b, &_mails| {
                b.to_async(&runtime).iter(|| {
                    let (view, queue) = (view.clone(), queue.clone());
                    async move {
                        let stream = view.browse(&queue).await.expect("Browse succeeds");
                        black_box(BrowseReport::collect(stream).await)
                    }
                });
            },
        );
    }

    group.finish();
}

fn bench_browse_after_idle(c: &mut Criterion) {
    let mut group = c.benchmark_group("browse_after_idle");

    let runtime = tokio::runtime::Runtime::new().expect("Failed to create runtime");

    for idle_hours in [24u32, 24 * 7] {
        group.bench_with_input(
            BenchmarkId::from_parameter(format!("{idle_hours}h")),
            &idle_hours,
            |b, &idle_hours| {
                // Setup per iteration is excluded from the measurement
                b.to_async(&runtime).iter_custom(|iters| async move {
                    let mut elapsed = Duration::ZERO;

                    for _ in 0..iters {
                        let clock = ManualClock::at_secs(0);
                        let view = view(4, &clock);
                        let queue = MailQueueName::from("spool");
                        let mail = mail();
                        view.enqueue(&queue, &mail).await.expect("Enqueue succeeds");
                        view.delete(&queue, &mail.key).await.expect("Delete succeeds");
                        clock.advance(HOUR * idle_hours);

                        let start = Instant::now();
                        black_box(view.size(&queue).await.expect("Size succeeds"));
                        elapsed += start.elapsed();
                    }

                    elapsed
                });
            },
        );
    }

    group.finish();
}

// ============================================================================
// Criterion Configuration
// ============================================================================

criterion_group!(
    benches,
    bench_partitioning,
    bench_enqueue,
    bench_browse,
    bench_browse_after_idle,
);

criterion_main!(benches);
