
use std::env;
use std::sync::Barrier;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;
use std::thread;
use std::time::Duration;
use std::time::Instant;

use criterion::Criterion;
use criterion::criterion_group;
use criterion::criterion_main;
use criterion::Throughput;
use criterion::SamplingMode;
use criterion::BenchmarkId;

use deferq::EventQueue;
use deferq::Error;

// small on purpose, producers regularly find the queue full and have to
// wait on the dispatcher
const CAPACITY: usize = 256;

// the dispatcher is the bottleneck, back off while the queue is full
fn retry<T>(mut post: impl FnMut() -> Result<T, Error>) -> T {
    loop {
        match post() {
            Ok(v) => return v,
            Err(Error::CapacityExceeded) => thread::yield_now(),
            Err(err) => panic!("post failed: {}", err),
        }
    }
}

// Time until `count` events posted from `producers` threads are all either
// run or cancelled. Every `cancel_every`th post is a far-off event that is
// cancelled right away, costing the dispatcher a reclaim instead of a run.
fn run(producers: u64, count: u64, cancel_every: u64) -> Duration {
    let runs = AtomicU64::new(0);
    let q = EventQueue::with_capacity(CAPACITY).unwrap();
    let barrier = Barrier::new(producers as usize + 1);
    let per_producer = count / producers;

    thread::scope(|s| {
        let worker = s.spawn(|| q.dispatch_forever());

        let threads = (0..producers)
            .map(|_| {
                let poster = q.poster();
                let runs = &runs;
                let barrier = &barrier;
                s.spawn(move || {
                    barrier.wait();
                    let mut cancelled = 0;
                    for i in 0..per_producer {
                        if cancel_every > 0 && i % cancel_every == 0 {
                            let id = retry(|| poster.call_in(Duration::from_secs(60), || {}));
                            cancelled += poster.cancel(id) as u64;
                        } else {
                            retry(|| poster.call(move || {
                                runs.fetch_add(1, Ordering::Relaxed);
                            }));
                        }
                    }
                    cancelled
                })
            })
            .collect::<Vec<_>>();

        barrier.wait();
        let start = Instant::now();
        let cancelled = threads.into_iter()
            .map(|thread| thread.join().unwrap())
            .sum::<u64>();
        while runs.load(Ordering::Relaxed) + cancelled < per_producer*producers {
            thread::yield_now();
        }
        let elapsed = start.elapsed();

        q.break_dispatch();
        worker.join().unwrap().unwrap();
        elapsed
    })
}

fn bench(c: &mut Criterion) {
    #[allow(non_snake_case)]
    let DEFERQ_THROUGHPUT_COUNT = env::var("DEFERQ_THROUGHPUT_COUNT")
        .map(|throughput_count| throughput_count.parse().unwrap())
        .unwrap_or(100000);

    let cores = thread::available_parallelism()
        .map(|cores| cores.get() as u64)
        .unwrap_or(4);

    let mut group = c.benchmark_group("throughput");
    group.sample_size(10);
    group.sampling_mode(SamplingMode::Flat);
    group.throughput(Throughput::Elements(DEFERQ_THROUGHPUT_COUNT));

    // one producer, then doubling past the core count
    let mut producers = 1;
    while producers <= 2*cores {
        group.bench_function(BenchmarkId::new("call", producers), |b| {
            b.iter_custom(|iters| {
                (0..iters).map(|_| run(producers, DEFERQ_THROUGHPUT_COUNT, 0)).sum()
            })
        });

        group.bench_function(BenchmarkId::new("call_cancel", producers), |b| {
            b.iter_custom(|iters| {
                (0..iters).map(|_| run(producers, DEFERQ_THROUGHPUT_COUNT, 4)).sum()
            })
        });

        producers *= 2;
    }

    group.finish();
}

criterion_group!(benches, bench);
criterion_main!(benches);
