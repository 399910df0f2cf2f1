
use deferq::EventQueue;

use std::thread;
use std::sync::Arc;
use std::time::Duration;

use rand;
use rand::Rng;
use structopt;
use structopt::StructOpt;


#[derive(Debug, StructOpt, Clone)]
#[structopt(rename_all="kebab")]
struct Opt {
    /// Width of rendering (excluding fields)
    #[structopt(short, long, default_value="48")]
    width: usize,

    /// Number of posting threads
    #[structopt(short, long, default_value="100")]
    threads: usize,

    /// Memory budget of the queue in bytes
    #[structopt(short, long, default_value="65536")]
    size: usize,
}

fn main() {
    let opt = Opt::from_args();

    let q: Arc<EventQueue<'static>> = Arc::new(EventQueue::with_size(opt.size).unwrap());

    let mut threads = vec![];

    // one dispatch thread
    {
        let q = q.clone();
        threads.push(thread::spawn(move || {
            q.dispatch_forever().unwrap();
        }));
    }

    // some busywork, n threads, each posting and cancelling at random
    for _ in 0..opt.threads {
        let q = q.clone();
        threads.push(thread::spawn(move || {
            let mut rng = rand::thread_rng();
            loop {
                let delay = Duration::from_nanos(rng.gen_range(0..2000_000_000));
                let work = Duration::from_nanos(rng.gen_range(0..1000_000));
                let id = match q.call_in(delay, move || thread::sleep(work)) {
                    Ok(id) => id,
                    // full, back off for a bit
                    Err(_) => {
                        thread::sleep(Duration::from_nanos(rng.gen_range(0..2000_000_000)));
                        continue;
                    }
                };

                thread::sleep(Duration::from_nanos(rng.gen_range(0..2000_000_000)));
                if rng.gen_bool(0.25) {
                    q.cancel(id);
                }
            }
        }));
    }

    // and now, in our main thread, lets render something nice looking
    println!();
    let mut pending_max = 1;
    loop {
        let usage = q.usage();
        if usage.pending > pending_max {
            pending_max = usage.pending;
        }

        // render this thing
        let width = opt.width;

        print!("\x1b[K  q ");
        for _ in 0 .. (width-2)*usage.pending / pending_max {
            print!("'");
        }
        for _ in (width-2)*usage.pending / pending_max .. width-2 {
            print!(" ");
        }
        println!("  pending: {}", usage.pending);

        print!("\x1b[K  [");
        let used_bars = (width-2) * (usage.capacity - usage.free - usage.reclaiming)
            / usage.capacity;
        let reclaiming_bars = (width-2) * (usage.capacity - usage.free)
            / usage.capacity;
        for _ in 0 .. used_bars {
            print!("|");
        }
        for _ in 0 .. reclaiming_bars - used_bars {
            print!(":");
        }
        for _ in 0 .. width-2 - reclaiming_bars {
            print!(" ");
        }
        print!("]");
        println!("  free: {}/{}", usage.free, usage.capacity);

        println!("\x1b[K    running: {}, reclaiming: {}, slab: {} bytes",
            usage.running, usage.reclaiming, usage.slab_bytes);

        thread::sleep(Duration::from_millis(10));

        print!("\x1b[3F");
    }
}
