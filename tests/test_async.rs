
use deferq::EventQueue;
use deferq::Error;
use deferq::Exit;

use std::sync::atomic::AtomicBool;
use std::sync::atomic::AtomicU32;
use std::sync::atomic::Ordering;
use std::thread;
use std::time::Duration;
use std::time::Instant;

use async_io::block_on;

#[test]
fn test_async() {
    let count = AtomicU32::new(0);
    let q = EventQueue::with_capacity(8).unwrap();

    q.call(|| {
        count.fetch_add(1, Ordering::SeqCst);
    }).unwrap();
    assert_eq!(block_on(q.dispatch_async(Duration::ZERO)), Ok(Exit::Timeout));

    assert_eq!(count.load(Ordering::SeqCst), 1);
    println!("usage: {:?}", q.usage());
}

#[test]
fn test_async_delay() {
    let count = AtomicU32::new(0);
    let q = EventQueue::with_capacity(16).unwrap();

    for i in 0..10 {
        q.call_in(Duration::from_millis(i*10), || {
            count.fetch_add(1, Ordering::SeqCst);
        }).unwrap();
    }

    let start = Instant::now();
    assert_eq!(
        block_on(q.dispatch_async(Duration::from_millis(200))),
        Ok(Exit::Timeout)
    );
    assert!(start.elapsed() >= Duration::from_millis(150));
    assert_eq!(count.load(Ordering::SeqCst), 10);
}

#[test]
fn test_async_periodic() {
    let count = AtomicU32::new(0);
    let q = EventQueue::with_capacity(8).unwrap();

    q.call_every(Duration::from_millis(10), || {
        count.fetch_add(1, Ordering::SeqCst);
    }).unwrap();
    block_on(q.dispatch_async(Duration::from_millis(100))).unwrap();

    let count = count.load(Ordering::SeqCst);
    assert!(count >= 1 && count <= 10, "count = {}", count);
}

#[test]
fn test_async_break() {
    let count = AtomicU32::new(0);
    let q = EventQueue::with_capacity(8).unwrap();

    thread::scope(|s| {
        s.spawn(|| {
            q.call(|| {
                count.fetch_add(1, Ordering::SeqCst);
            }).unwrap();
            thread::sleep(Duration::from_millis(50));
            q.break_dispatch();
        });

        assert_eq!(block_on(q.dispatch_forever_async()), Ok(Exit::Break));
    });

    assert_eq!(count.load(Ordering::SeqCst), 1);
}

#[test]
fn test_async_already_dispatching() {
    let started = AtomicBool::new(false);
    let q = EventQueue::with_capacity(8).unwrap();

    q.call(|| started.store(true, Ordering::SeqCst)).unwrap();
    thread::scope(|s| {
        let worker = s.spawn(|| q.dispatch_forever());
        while !started.load(Ordering::SeqCst) {
            thread::yield_now();
        }

        // sync and async dispatch share the same guard
        assert_eq!(
            block_on(q.dispatch_async(Duration::ZERO)),
            Err(Error::AlreadyDispatching)
        );

        q.break_dispatch();
        assert_eq!(worker.join().unwrap(), Ok(Exit::Break));
    });
}

#[test]
fn test_async_unbounded_timeout() {
    let q = EventQueue::with_capacity(8).unwrap();

    q.break_dispatch();
    assert_eq!(block_on(q.dispatch_async(Duration::MAX)), Ok(Exit::Break));
}
