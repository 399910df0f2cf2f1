
use deferq::EventQueue;
use deferq::Error;

use std::thread;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::AtomicU32;
use std::sync::atomic::Ordering;
use std::time::Duration;
use std::time::Instant;

use structopt;
use structopt::StructOpt;


#[derive(Debug, StructOpt, Clone)]
#[structopt(rename_all="kebab")]
struct Opt {
    /// Toggle from a ticker thread that defers to the queue, instead of a
    /// periodic event
    #[structopt(short, long)]
    ticker: bool,

    /// Blink period in milliseconds
    #[structopt(short, long, default_value="500")]
    period: u64,

    /// Number of toggles before stopping
    #[structopt(short, long, default_value="10")]
    count: u32,
}

struct Led {
    on: AtomicBool,
    toggles: AtomicU32,
    start: Instant,
}

impl Led {
    fn toggle(&self) {
        let on = !self.on.fetch_xor(true, Ordering::SeqCst);
        let toggles = self.toggles.fetch_add(1, Ordering::SeqCst) + 1;
        println!("{:>8.3?}  led {}  ({})",
            self.start.elapsed(),
            if on { "on " } else { "off" },
            toggles);
    }
}

fn main() {
    let opt = Opt::from_args();
    let period = Duration::from_millis(opt.period);

    let led = Arc::new(Led {
        on: AtomicBool::new(false),
        toggles: AtomicU32::new(0),
        start: Instant::now(),
    });
    let q: Arc<EventQueue<'static>> = Arc::new(EventQueue::with_capacity(16).unwrap());

    // one dispatch thread, the only place toggles (and printing) happen
    let dispatch_thread = thread::spawn({
        let q = q.clone();
        move || q.dispatch_forever()
    });

    let done = Arc::new(AtomicBool::new(false));
    let ticker_thread = if opt.ticker {
        // pretend this thread is a timer interrupt, it can't print or block,
        // so it only hands the toggle off to the queue
        let q = q.clone();
        let led = led.clone();
        let done = done.clone();
        Some(thread::spawn(move || {
            let poster = q.poster();
            while !done.load(Ordering::SeqCst) {
                thread::sleep(period);
                let led = led.clone();
                match poster.call(move || led.toggle()) {
                    Ok(_) => {}
                    Err(Error::CapacityExceeded) => eprintln!("queue full, dropped a toggle"),
                    Err(err) => panic!("{}", err),
                }
            }
        }))
    } else {
        let led = led.clone();
        q.call_every(period, move || led.toggle()).unwrap();
        None
    };

    while led.toggles.load(Ordering::SeqCst) < opt.count {
        thread::sleep(period / 4);
    }

    done.store(true, Ordering::SeqCst);
    if let Some(ticker_thread) = ticker_thread {
        ticker_thread.join().unwrap();
    }

    q.break_dispatch();
    println!("dispatch exited with {:?}", dispatch_thread.join().unwrap());
    println!("usage: {:?}", q.usage());
}
