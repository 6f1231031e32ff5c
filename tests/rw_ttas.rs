use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;

use slock::relax::Yield;
use slock::{Config, RwTtasLock, Topology};

const READERS: usize = 4;
const WRITERS: usize = 2;
const ITERS: usize = 500;

#[test]
fn writers_exclude_readers() {
    let threads = READERS + WRITERS;
    let topology = Topology::uniform(1, threads);
    let config = Config::builder().topology(topology).pin_threads(false).build().unwrap();
    let lock: Arc<RwTtasLock<Yield>> = Arc::new(slock::init_lock_global(&config));
    // Readers inside, or `usize::MAX` while a writer is inside.
    let inside = Arc::new(AtomicUsize::new(0));
    let max_readers = Arc::new(AtomicUsize::new(0));
    let barrier = Arc::new(Barrier::new(threads));

    let handles: Vec<_> = (0..threads)
        .map(|core| {
            let mut local = slock::init_lock_local(core, &*lock, &config).unwrap();
            let lock = Arc::clone(&lock);
            let inside = Arc::clone(&inside);
            let max_readers = Arc::clone(&max_readers);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                for _ in 0..ITERS {
                    if core < WRITERS {
                        slock::acquire_write(&mut local, &*lock);
                        assert_eq!(inside.swap(usize::MAX, Ordering::SeqCst), 0);
                        assert!(lock.word().is_write_locked());
                        inside.store(0, Ordering::SeqCst);
                        slock::release_write(&mut local, &*lock);
                    } else {
                        slock::acquire_read(&mut local, &*lock);
                        let readers = inside.fetch_add(1, Ordering::SeqCst) + 1;
                        assert!(readers <= READERS);
                        max_readers.fetch_max(readers, Ordering::SeqCst);
                        inside.fetch_sub(1, Ordering::SeqCst);
                        slock::release_read(&mut local, &*lock);
                    }
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    assert!(slock::is_free(&*lock));
    assert!(max_readers.load(Ordering::SeqCst) >= 1);
}

#[test]
fn shared_acquisitions_overlap() {
    let lock = RwTtasLock::<Yield>::free();
    assert!(lock.try_acquire_read());
    assert!(lock.try_acquire_read());
    assert_eq!(lock.word().readers(), 2);
    let config = Config::builder().topology(Topology::uniform(1, 1)).pin_threads(false).build().unwrap();
    let mut local = slock::init_lock_local(0, &lock, &config).unwrap();
    assert_eq!(slock::acquire_trylock(&mut local, &lock), Ok(false));
    slock::release_read(&mut local, &lock);
    slock::release_read(&mut local, &lock);
    assert_eq!(slock::acquire_trylock(&mut local, &lock), Ok(true));
    assert!(!lock.try_acquire_read());
    slock::release_write(&mut local, &lock);
    assert!(lock.word().is_free());
}
