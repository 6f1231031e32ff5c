use crate::lock::RawLock;
use crate::{Error, Mutex};

/// An arbitrary unsigned integer type.
pub type Int = u32;

/// A single cluster configuration for `threads` participants, with pinning
/// disabled.
#[cfg(not(loom))]
pub fn config(threads: usize) -> crate::Config {
    let topology = crate::Topology::uniform(1, threads);
    crate::Config::builder().topology(topology).pin_threads(false).build().unwrap()
}

/// Locks whose queue tail can be observed, so tests can tell when a thread
/// has enqueued itself.
#[cfg(not(loom))]
pub trait QueueTail {
    /// A value that changes every time a thread joins the queue.
    fn tail_token(&self) -> u64;
}

/// Get a copy of the shared integer.
pub fn get<L: RawLock>(mutex: &Mutex<Int, L>, local: &mut L::Local) -> Int {
    mutex.lock_with_then(local, |guard| guard.with(|data| *data))
}

/// Increments a shared integer.
pub fn inc<L: RawLock>(mutex: &Mutex<Int, L>, local: &mut L::Local) {
    mutex.lock_with_then(local, |mut guard| guard.with_mut(|data| *data += 1));
}

/// Tries to increment a shared integer.
pub fn try_inc<L: RawLock>(mutex: &Mutex<Int, L>, local: &mut L::Local) -> Result<(), Error> {
    mutex.try_lock_with_then(local, |guard| {
        if let Some(mut guard) = guard {
            guard.with_mut(|data| *data += 1);
        }
    })
}

/// Reads the shared integer in shared mode.
pub fn read<L: RawLock>(mutex: &Mutex<Int, L>, local: &mut L::Local) -> Int {
    mutex.read_with_then(local, |data| *data)
}

#[cfg(all(not(loom), test))]
pub mod tests {
    // Modified test suite from the Rust's Mutex implementation, reworked for
    // locks that need per-thread state, and some new tests as well.
    //
    // Copyright 2014 The Rust Project Developers.
    //
    // Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
    // http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
    // <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
    // option. This file may not be copied, modified, or distributed
    // except according to those terms.

    use core::ops::RangeInclusive;
    use std::sync::mpsc::channel;
    use std::sync::Arc;
    use std::thread;

    use super::{config, get, inc, read, try_inc, Int, QueueTail};
    use crate::lock::RawLock;
    use crate::{Config, Error, Mutex};

    const ITERS: Int = 1000;
    const THREADS: usize = 4;
    const EXPECTED_VALUE: Int = ITERS * THREADS as Int;
    const EXPECTED_RANGE: RangeInclusive<Int> = 1..=EXPECTED_VALUE;

    type Step<L> = fn(&Mutex<Int, L>, &mut <L as RawLock>::Local, Int);

    /// Runs `step` `ITERS` times on `THREADS` threads, each with its own
    /// local state, and returns the final value of the shared integer.
    fn lots_and_lots<L>(config: &Config, step: Step<L>) -> Int
    where
        L: RawLock + 'static,
    {
        let mutex = Arc::new(Mutex::<Int, L>::new(0, config));
        let (tx, rx) = channel();
        for core in 0..THREADS {
            let c_mutex = Arc::clone(&mutex);
            let mut local = mutex.local(config, core).unwrap();
            let c_tx = tx.clone();
            thread::spawn(move || {
                for r in 0..ITERS {
                    step(&c_mutex, &mut local, r);
                }
                c_mutex.raw().free_local(local);
                c_tx.send(()).unwrap();
            });
        }
        drop(tx);
        for _ in 0..THREADS {
            rx.recv().unwrap();
        }
        let mut local = mutex.local(config, 0).unwrap();
        get(&mutex, &mut local)
    }

    pub fn lots_and_lots_lock<L: RawLock + 'static>() {
        lots_and_lots_lock_with::<L>(&config(THREADS));
    }

    pub fn lots_and_lots_lock_with<L: RawLock + 'static>(config: &Config) {
        let value = lots_and_lots::<L>(config, |mutex, local, _| inc(mutex, local));
        assert_eq!(value, EXPECTED_VALUE);
    }

    pub fn lots_and_lots_try_lock<L: RawLock + 'static>() {
        let step: Step<L> = |mutex, local, _| try_inc(mutex, local).unwrap();
        let value = lots_and_lots::<L>(&config(THREADS), step);
        assert!(EXPECTED_RANGE.contains(&value));
    }

    pub fn lots_and_lots_mixed_lock<L: RawLock + 'static>() {
        let step: Step<L> = |mutex, local, r| {
            if r % 2 == 0 {
                inc(mutex, local);
            } else {
                try_inc(mutex, local).unwrap();
            }
        };
        let value = lots_and_lots::<L>(&config(THREADS), step);
        assert!(EXPECTED_RANGE.contains(&value));
    }

    /// Every thread alternates between incrementing and reading in shared
    /// mode, and a reader must never see a value writers cannot reach.
    pub fn lots_and_lots_read_write<L: RawLock + 'static>() {
        let writes = ITERS * (THREADS / 2) as Int;
        let step: Step<L> = |mutex, local, r| {
            if r % 2 == 0 {
                inc(mutex, local);
            } else {
                assert!(read(mutex, local) <= EXPECTED_VALUE);
            }
        };
        let value = lots_and_lots::<L>(&config(THREADS), step);
        assert_eq!(value, writes);
    }

    pub fn test_try_lock<L: RawLock>() {
        let config = config(2);
        let mutex = Mutex::<Int, L>::new(0, &config);
        let mut first = mutex.local(&config, 0).unwrap();
        let mut second = mutex.local(&config, 1).unwrap();
        {
            let guard = mutex.try_lock(&mut first).unwrap();
            assert!(guard.is_some());
            assert!(mutex.is_locked());
            assert!(mutex.try_lock(&mut second).unwrap().is_none());
        }
        assert!(!mutex.is_locked());
        try_inc(&mutex, &mut second).unwrap();
        assert_eq!(get(&mutex, &mut first), 1);
    }

    pub fn test_try_lock_unsupported<L: RawLock>() {
        let config = config(1);
        let mutex = Mutex::<Int, L>::new(0, &config);
        let mut local = mutex.local(&config, 0).unwrap();
        let err = Error::Unsupported { lock: L::NAME, operation: "try_acquire" };
        assert_eq!(try_inc(&mutex, &mut local), Err(err));
        assert!(!mutex.is_locked());
        inc(&mutex, &mut local);
        assert_eq!(get(&mutex, &mut local), 1);
    }

    /// Global init, local init, every acquisition kind, then teardown.
    pub fn test_lifecycle<L: RawLock>() {
        let config = config(2);
        let lock = L::new(&config);
        assert!(lock.is_free());
        let mut local = lock.local(&config, 0).unwrap();
        lock.acquire(&mut local);
        assert!(!lock.is_free());
        lock.release(&mut local);
        assert!(lock.is_free());
        lock.acquire_write(&mut local);
        assert!(!lock.is_free());
        lock.release_write(&mut local);
        lock.acquire_read(&mut local);
        assert!(!lock.is_free());
        lock.release_read(&mut local);
        assert!(lock.is_free());
        lock.free_local(local);
        drop(lock);
    }

    /// Enqueues waiters one at a time behind the holder and checks that
    /// they are granted the lock in the same order.
    pub fn fifo_order<L: RawLock + QueueTail + 'static>() {
        const WAITERS: usize = 3;
        let config = config(WAITERS + 1);
        let mutex = Arc::new(Mutex::<Vec<usize>, L>::new(Vec::new(), &config));
        let mut local = mutex.local(&config, 0).unwrap();
        let guard = mutex.lock(&mut local);
        let handles: Vec<_> = (0..WAITERS)
            .map(|waiter| {
                let tail = mutex.raw().tail_token();
                let c_mutex = Arc::clone(&mutex);
                let mut c_local = mutex.local(&config, waiter + 1).unwrap();
                let handle = thread::spawn(move || {
                    c_mutex.lock_with_then(&mut c_local, |mut order| order.push(waiter));
                });
                while mutex.raw().tail_token() == tail {
                    thread::yield_now();
                }
                handle
            })
            .collect();
        drop(guard);
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(*mutex.lock(&mut local), [0, 1, 2]);
    }
}
