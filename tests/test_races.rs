#![cfg(not(feature="loom"))]

use deferq::EventQueue;
use deferq::Error;
use deferq::Exit;

use std::sync::Mutex;
use std::sync::atomic::AtomicU32;
use std::sync::atomic::Ordering;
use std::thread;
use std::time::Duration;
use std::time::Instant;

const PRODUCERS: usize = 8;
const POSTS: usize = 1000;

// wait for some condition with a generous deadline, so a bug fails the test
// instead of hanging it
fn wait_until(mut f: impl FnMut() -> bool) {
    let start = Instant::now();
    while !f() {
        assert!(start.elapsed() < Duration::from_secs(30), "timed out");
        thread::sleep(Duration::from_millis(1));
    }
}

#[test]
fn test_race_post() {
    let log = Mutex::new(Vec::new());
    let q = EventQueue::with_capacity(64).unwrap();

    thread::scope(|s| {
        let worker = s.spawn(|| q.dispatch_forever());

        for p in 0..PRODUCERS {
            let (q, log) = (&q, &log);
            s.spawn(move || {
                for i in 0..POSTS {
                    // full queues are expected here, just try again
                    loop {
                        match q.call(move || log.lock().unwrap().push((p, i))) {
                            Ok(_) => break,
                            Err(Error::CapacityExceeded) => thread::yield_now(),
                            Err(err) => panic!("unexpected {:?}", err),
                        }
                    }
                }
            });
        }

        wait_until(|| log.lock().unwrap().len() == PRODUCERS*POSTS);
        q.break_dispatch();
        assert_eq!(worker.join().unwrap(), Ok(Exit::Break));
    });

    // every producer's events run exactly once, in the order posted
    let log = log.lock().unwrap().clone();
    for p in 0..PRODUCERS {
        let mine = log.iter()
            .filter(|(p_, _)| *p_ == p)
            .map(|&(_, i)| i)
            .collect::<Vec<_>>();
        assert_eq!(mine, (0..POSTS).collect::<Vec<_>>());
    }
    println!("usage: {:?}", q.usage());
}

#[test]
fn test_race_cancel() {
    let count = AtomicU32::new(0);
    let cancelled = AtomicU32::new(0);
    let q = EventQueue::with_capacity(POSTS*PRODUCERS).unwrap();

    thread::scope(|s| {
        let worker = s.spawn(|| q.dispatch_forever());

        for p in 0..PRODUCERS {
            let (q, count, cancelled) = (&q, &count, &cancelled);
            s.spawn(move || {
                for i in 0..POSTS {
                    // small delays so cancels race with dispatch
                    let id = q.call_in(Duration::from_micros((i % 50) as u64), move || {
                        count.fetch_add(1, Ordering::SeqCst);
                    }).unwrap();

                    if (i + p) % 2 == 0 && q.cancel(id) {
                        cancelled.fetch_add(1, Ordering::SeqCst);
                    }
                }
            });
        }

        // a successful cancel means the event never runs, everything else
        // runs exactly once
        let total = (PRODUCERS*POSTS) as u32;
        wait_until(|| {
            count.load(Ordering::SeqCst) + cancelled.load(Ordering::SeqCst) == total
        });
        q.break_dispatch();
        assert_eq!(worker.join().unwrap(), Ok(Exit::Break));

        assert_eq!(
            count.load(Ordering::SeqCst) + cancelled.load(Ordering::SeqCst),
            total
        );
    });

    let usage = q.usage();
    assert_eq!(usage.pending, 0);
    assert_eq!(usage.running, 0);
    println!("usage: {:?}", usage);
}

#[test]
fn test_race_periodic_cancel() {
    let count = AtomicU32::new(0);
    let q = EventQueue::with_capacity(8).unwrap();

    thread::scope(|s| {
        let worker = s.spawn(|| q.dispatch_forever());

        let id = q.call_every(Duration::from_micros(100), || {
            count.fetch_add(1, Ordering::SeqCst);
        }).unwrap();
        wait_until(|| count.load(Ordering::SeqCst) >= 10);

        // whether pending or mid-run, a cancelled periodic event stops
        assert!(q.cancel(id));
        thread::sleep(Duration::from_millis(10));
        let after = count.load(Ordering::SeqCst);
        thread::sleep(Duration::from_millis(50));
        assert_eq!(count.load(Ordering::SeqCst), after);

        q.break_dispatch();
        assert_eq!(worker.join().unwrap(), Ok(Exit::Break));
    });

    assert_eq!(q.usage().free, 8);
}

#[test]
fn test_race_break() {
    let count = AtomicU32::new(0);
    let q = EventQueue::with_capacity(8).unwrap();

    q.call_every(Duration::from_millis(1), || {
        count.fetch_add(1, Ordering::SeqCst);
    }).unwrap();

    // break from another thread, repeatedly
    for _ in 0..10 {
        let before = count.load(Ordering::SeqCst);
        thread::scope(|s| {
            s.spawn(|| {
                thread::sleep(Duration::from_millis(10));
                q.break_dispatch();
            });
            assert_eq!(q.dispatch_forever(), Ok(Exit::Break));
        });
        assert!(count.load(Ordering::SeqCst) >= before);
    }
}
