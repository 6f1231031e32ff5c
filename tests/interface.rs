use std::sync::{Arc, Barrier};
use std::thread;

use slock::{Config, LockKind, LockVisitor, RawLock, Topology};

const THREADS: usize = 4;
const ITERS: usize = 500;
const LOCKS: usize = 3;

fn config() -> Config {
    Config::builder().topology(Topology::uniform(2, THREADS / 2)).pin_threads(false).build().unwrap()
}

/// Every thread increments one counter per lock of an array, through the
/// free functions of the uniform interface.
struct Counters;

impl LockVisitor for Counters {
    type Output = Vec<usize>;

    fn visit<L: RawLock + 'static>(self) -> Vec<usize> {
        let config = Arc::new(config());
        let array = Arc::new(slock::init_lock_array_global::<L>(LOCKS, &config));
        let counts: Arc<[_]> = (0..LOCKS).map(|_| std::sync::Mutex::new(0)).collect();
        let barrier = Arc::new(Barrier::new(THREADS));
        let handles: Vec<_> = (0..THREADS)
            .map(|thread| {
                let config = Arc::clone(&config);
                let array = Arc::clone(&array);
                let counts = Arc::clone(&counts);
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    let core = config.topology().core_for(thread);
                    let mut locals = slock::init_lock_array_local(core, &array, &config).unwrap();
                    barrier.wait();
                    for iter in 0..ITERS {
                        let index = (iter + thread) % LOCKS;
                        slock::acquire_lock(&mut locals[index], &array[index]);
                        // Contention on the inner mutex means two holders.
                        let mut count = counts[index].try_lock().unwrap();
                        *count += 1;
                        drop(count);
                        slock::release_lock(&mut locals[index], &array[index]);
                    }
                    slock::free_lock_array_local(&array, locals);
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert!(array.iter().all(slock::is_free));
        let array = Arc::try_unwrap(array).unwrap();
        slock::free_lock_array_global(array);
        counts.iter().map(|count| *count.lock().unwrap()).collect()
    }
}

#[test]
fn every_algorithm_excludes() {
    for kind in LockKind::ALL {
        let counts = kind.visit(Counters);
        assert_eq!(counts.iter().sum::<usize>(), THREADS * ITERS, "{kind}");
    }
}

/// Single lock lifecycle with try-lock, when supported.
struct TryLock;

impl LockVisitor for TryLock {
    type Output = Result<bool, slock::Error>;

    fn visit<L: RawLock + 'static>(self) -> Self::Output {
        let config = config();
        let lock: L = slock::init_lock_global(&config);
        let mut first = slock::init_lock_local(0, &lock, &config)?;
        let mut second = slock::init_lock_local(1, &lock, &config)?;
        let acquired = slock::acquire_trylock(&mut first, &lock);
        if acquired == Ok(true) {
            assert_eq!(slock::acquire_trylock(&mut second, &lock), Ok(false));
            slock::release_lock(&mut first, &lock);
        }
        assert!(slock::is_free(&lock));
        slock::free_lock_local(&lock, first);
        slock::free_lock_local(&lock, second);
        slock::free_lock_global(lock);
        acquired
    }
}

#[test]
fn try_lock_matches_kind() {
    for kind in LockKind::ALL {
        let result = kind.visit(TryLock);
        if kind.supports_try_lock() {
            assert_eq!(result, Ok(true), "{kind}");
        } else {
            assert!(matches!(result, Err(slock::Error::Unsupported { .. })), "{kind}");
        }
    }
}
