//! Scheduler throughput benchmarks.
//!
//! Measures priority queue and job queue operations on the submission path.

use std::path::PathBuf;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use tokio::runtime::Runtime;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use img2img_core::jobs::{JobId, JobInput, JobParams};
use img2img_core::scheduler::{JobQueue, JobQueueConfig, Priority, PriorityQueue, QueuedJob};

fn create_job(priority: Priority) -> QueuedJob {
    let input = JobInput {
        request_id: Uuid::new_v4(),
        image_path: PathBuf::from("data/inputs/room.png"),
        params: JobParams::PopulatedRedesign {
            style: "modern".to_string(),
            room_type: "living room".to_string(),
            color_palette: None,
        },
    };
    QueuedJob::new(JobId::new(), input, priority, CancellationToken::new())
}

fn priority_for(i: usize) -> Priority {
    match i % 3 {
        0 => Priority::Low,
        1 => Priority::Normal,
        _ => Priority::High,
    }
}

fn bench_priority_queue_push(c: &mut Criterion) {
    let mut group = c.benchmark_group("priority_queue_push");

    for (name, queue_size) in [("empty", 0), ("half_full", 32), ("near_full", 60)] {
        let mut queue: PriorityQueue<QueuedJob> = PriorityQueue::new();
        for i in 0..queue_size {
            queue.push(create_job(priority_for(i)), priority_for(i));
        }

        group.throughput(Throughput::Elements(1));
        group.bench_function(BenchmarkId::new("push", name), |b| {
            b.iter(|| {
                queue.push(black_box(create_job(Priority::Normal)), Priority::Normal);
                let _ = queue.pop();
            })
        });
    }

    group.finish();
}

fn bench_mixed_priority_drain(c: &mut Criterion) {
    let mut group = c.benchmark_group("priority_ordering");

    group.throughput(Throughput::Elements(64));
    group.bench_function("mixed_priority_64", |b| {
        b.iter(|| {
            let mut queue = PriorityQueue::new();
            for i in 0..64 {
                queue.push(create_job(priority_for(i)), priority_for(i));
            }
            while let Some(job) = queue.pop() {
                black_box(job);
            }
        })
    });

    group.finish();
}

fn bench_job_queue_roundtrip(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let mut group = c.benchmark_group("job_queue");

    for batch in [1usize, 8, 32] {
        group.throughput(Throughput::Elements(batch as u64));
        group.bench_function(BenchmarkId::new("enqueue_dequeue", batch), |b| {
            let queue = JobQueue::new(JobQueueConfig { max_pending: 64 });
            b.iter(|| {
                rt.block_on(async {
                    for i in 0..batch {
                        queue.enqueue(create_job(priority_for(i))).await.unwrap();
                    }
                    for _ in 0..batch {
                        black_box(queue.dequeue().await);
                    }
                })
            })
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_priority_queue_push,
    bench_mixed_priority_drain,
    bench_job_queue_roundtrip
);
criterion_main!(benches);
