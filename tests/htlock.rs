use std::sync::{Arc, Barrier};
use std::thread;

use slock::relax::Yield;
use slock::{Config, HtLock, Mutex, Topology};

const CLUSTERS: usize = 2;
const THREADS_PER_CLUSTER: usize = 4;
const ITERS: u64 = 2000;
const BATCH: u32 = 8;

#[test]
fn clusters_share_batches() {
    let topology = Topology::uniform(CLUSTERS, THREADS_PER_CLUSTER);
    let builder = Config::builder().topology(topology).batch_size(BATCH);
    let config = builder.pin_threads(false).build().unwrap();
    let threads = config.max_threads();
    let mutex = Arc::new(Mutex::<u64, HtLock<Yield>>::new(0, &config));
    let barrier = Arc::new(Barrier::new(threads));

    let handles: Vec<_> = (0..threads)
        .map(|thread| {
            let core = config.topology().core_for(thread);
            let mut local = slock::init_lock_local(core, mutex.raw(), &config).unwrap();
            assert_eq!(local.cluster(), config.topology().cluster_for(core));
            let mutex = Arc::clone(&mutex);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                for _ in 0..ITERS {
                    *mutex.lock(&mut local) += 1;
                }
                (local.acquires(), local.global_acquires(), local.early_closes())
            })
        })
        .collect();

    let (mut acquires, mut global_acquires, mut early_closes) = (0, 0, 0);
    for handle in handles {
        let (local, global, early) = handle.join().unwrap();
        acquires += local;
        global_acquires += global;
        early_closes += early;
    }

    let total = ITERS * threads as u64;
    assert_eq!(acquires, total);
    // One global acquisition serves at most one batch plus its opener, and
    // exactly that many unless the batch was closed early.
    let per_batch = u64::from(BATCH) + 1;
    assert!(global_acquires >= total / per_batch);
    assert!(early_closes <= global_acquires);
    assert!(global_acquires <= total / per_batch + early_closes);
    assert!(!mutex.is_locked());
    let mut local = mutex.local(&config, 0).unwrap();
    assert_eq!(*mutex.lock(&mut local), total);
}
