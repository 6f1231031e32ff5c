//! Throughput and latency of one lock under contention.
//!
//! ```text
//! cargo run --release --example stress_test -- --lock mcs --threads 8 --duration 1000
//! ```
//!
//! Set `RUST_LOG=slock=debug` to see the lock lifecycle events.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::Duration;

use clap::{arg, value_parser};
use tracing::info;
use tracing_subscriber::EnvFilter;

use slock::atomic::ticks;
use slock::{Config, LockKind, LockVisitor, Mutex, RawLock, Topology};

/// Words per cache line of critical-section work.
const LINE_WORDS: usize = 8;

struct Params {
    config: Config,
    threads: usize,
    duration: Duration,
    cs_work: usize,
}

/// Operations and accumulated acquisition latency of one thread.
#[derive(Debug, Default, Clone, Copy)]
struct Stats {
    ops: u64,
    ticks: u64,
}

impl Stats {
    fn avg_latency(self) -> u64 {
        self.ticks.checked_div(self.ops).unwrap_or(0)
    }
}

struct Run(Params);

impl LockVisitor for Run {
    type Output = Result<Vec<Stats>, slock::Error>;

    fn visit<L: RawLock + 'static>(self) -> Self::Output {
        let Params { config, threads, duration, cs_work } = self.0;
        let config = Arc::new(config);
        let lines = vec![0_u64; cs_work.max(1) * LINE_WORDS];
        let mutex = Arc::new(Mutex::<Vec<u64>, L>::new(lines, &config));
        let barrier = Arc::new(Barrier::new(threads + 1));
        let stop = Arc::new(AtomicBool::new(false));

        let handles: Vec<_> = (0..threads)
            .map(|thread| {
                let (config, mutex) = (Arc::clone(&config), Arc::clone(&mutex));
                let (barrier, stop) = (Arc::clone(&barrier), Arc::clone(&stop));
                thread::spawn(move || -> Result<Stats, slock::Error> {
                    let core = config.topology().core_for(thread);
                    let local = slock::init_lock_local(core, mutex.raw(), &config);
                    // Everybody passes the barrier, even on failure.
                    barrier.wait();
                    let mut local = local?;
                    let mut stats = Stats::default();
                    while !stop.load(Ordering::Relaxed) {
                        let start = ticks();
                        let mut lines = mutex.lock(&mut local);
                        stats.ticks += ticks().wrapping_sub(start);
                        for word in lines.iter_mut().step_by(LINE_WORDS).take(cs_work) {
                            *word = word.wrapping_add(1);
                        }
                        drop(lines);
                        stats.ops += 1;
                    }
                    slock::free_lock_local(mutex.raw(), local);
                    Ok(stats)
                })
            })
            .collect();

        barrier.wait();
        thread::sleep(duration);
        stop.store(true, Ordering::Relaxed);

        let stats = handles
            .into_iter()
            .map(|handle| handle.join().unwrap_or_else(|panic| std::panic::resume_unwind(panic)))
            .collect::<Result<Vec<_>, _>>()?;
        info!(lock = L::NAME, threads, "run finished");
        Ok(stats)
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt().with_env_filter(EnvFilter::from_default_env()).init();

    let matches = clap::Command::new("stress_test")
        .about("Hammers one lock from many threads")
        .args(&[
            arg!(--lock [lock] "Lock algorithm").value_parser(value_parser!(LockKind)),
            arg!(--threads [threads] "Number of threads").value_parser(value_parser!(usize)),
            arg!(--duration [ms] "Run time in milliseconds").value_parser(value_parser!(u64)),
            arg!(--"cs-work" [lines] "Cache lines written inside the critical section")
                .value_parser(value_parser!(usize)),
            arg!(--clusters [clusters] "Clusters the threads are spread over")
                .value_parser(value_parser!(usize)),
            arg!(--batch [batch] "HTLock batch size").value_parser(value_parser!(u32)),
            arg!(--pin "Pin every thread to its core"),
        ])
        .get_matches();

    let kind = matches.get_one::<LockKind>("lock").copied().unwrap_or_default();
    let threads = matches.get_one::<usize>("threads").copied().unwrap_or(4).max(1);
    let duration = Duration::from_millis(matches.get_one::<u64>("duration").copied().unwrap_or(1000));
    let cs_work = matches.get_one::<usize>("cs-work").copied().unwrap_or(0);
    let clusters = matches.get_one::<usize>("clusters").copied().unwrap_or(1).max(1);
    let batch = matches.get_one::<u32>("batch").copied().unwrap_or(Config::DEFAULT_BATCH_SIZE);

    let topology = Topology::uniform(clusters, (threads + clusters - 1) / clusters);
    let config = Config::builder()
        .topology(topology)
        .max_threads(threads)
        .batch_size(batch)
        .pin_threads(matches.get_flag("pin"))
        .build()?;

    info!(lock = %kind, threads, clusters, ?duration, cs_work, "starting");
    let stats = kind.visit(Run(Params { config, threads, duration, cs_work }))?;

    for (thread, stats) in stats.iter().enumerate() {
        println!("thread {thread:3}: {:10} ops, {:8} ticks/acquire", stats.ops, stats.avg_latency());
    }
    let ops: u64 = stats.iter().map(|stats| stats.ops).sum();
    let total_ticks = stats.iter().map(|stats| stats.ticks).sum();
    let total = Stats { ops, ticks: total_ticks };
    let secs = duration.as_secs_f64();
    println!("{kind}: {ops} ops, {:.0} ops/s, {} ticks/acquire", ops as f64 / secs, total.avg_latency());
    Ok(())
}
