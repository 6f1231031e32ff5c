use std::sync::{Arc, Barrier, Mutex};
use std::thread;

use slock::relax::Yield;
use slock::{ArrayLock, Config, RawLock, Topology};

const THREADS: usize = 8;
const ITERS: usize = 100;

#[test]
fn tickets_are_served_in_order() {
    let topology = Topology::uniform(1, THREADS);
    let config = Config::builder().topology(topology).pin_threads(false).build().unwrap();
    let lock: Arc<ArrayLock<Yield>> = Arc::new(slock::init_lock_global(&config));
    assert_eq!(lock.capacity(), THREADS);

    // Written only while holding the lock, in acquisition order.
    let grants = Arc::new(Mutex::new(Vec::with_capacity(THREADS * ITERS)));
    let barrier = Arc::new(Barrier::new(THREADS));
    let handles: Vec<_> = (0..THREADS)
        .map(|core| {
            let mut local = slock::init_lock_local(core, &*lock, &config).unwrap();
            let lock = Arc::clone(&lock);
            let grants = Arc::clone(&grants);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                let mut tickets = Vec::with_capacity(ITERS);
                barrier.wait();
                for _ in 0..ITERS {
                    slock::acquire_lock(&mut local, &*lock);
                    grants.lock().unwrap().push((local.ticket(), local.slot()));
                    slock::release_lock(&mut local, &*lock);
                    tickets.push(local.ticket());
                }
                lock.free_local(local);
                tickets
            })
        })
        .collect();
    let mut drawn = Vec::with_capacity(THREADS * ITERS);
    for handle in handles {
        let tickets = handle.join().unwrap();
        assert!(tickets.windows(2).all(|pair| pair[0] < pair[1]));
        drawn.extend(tickets);
    }
    // No ticket is skipped or handed out twice.
    drawn.sort_unstable();
    assert!(drawn.iter().copied().eq(0..THREADS * ITERS));

    let grants = grants.lock().unwrap();
    assert_eq!(grants.len(), THREADS * ITERS);
    assert!(grants.windows(2).all(|pair| pair[0].0 < pair[1].0));
    assert!(grants.iter().all(|&(ticket, slot)| slot == ticket % THREADS));
    assert!(lock.is_free());
}
