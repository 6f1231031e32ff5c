//! Anderson's array-based queue lock.
//!
//! Waiters take a ticket from a shared tail counter and spin on their own
//! cache-padded slot of a flag array, indexed by the ticket modulo the array
//! size. Releasing clears the holder's slot and sets the next one, so the
//! lock is handed over in strict ticket order with each waiter spinning on
//! a separate cache line.
//!
//! The array is sized for the maximum number of participants given at
//! creation. [`RawLock::local`] refuses to serve more threads than that,
//! since two waiters sharing a slot would both be granted the lock.

use core::marker::PhantomData;
use core::sync::atomic::Ordering::{Acquire, Relaxed, Release};

use crossbeam_utils::CachePadded;

use crate::atomic::AtomicCounter;
use crate::cfg::atomic::{AtomicBool, AtomicUsize};
use crate::lock::RawLock;
use crate::relax::{DefaultRelax, Relax};
use crate::{Config, Error};

/// Per-thread state of an [`ArrayLock`]: the ticket and slot of the last
/// acquisition.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ArrayLocal {
    ticket: usize,
    slot: usize,
}

impl ArrayLocal {
    /// Ticket taken by the last acquisition.
    #[must_use]
    pub const fn ticket(&self) -> usize {
        self.ticket
    }

    /// Slot the last acquisition waited on.
    #[must_use]
    pub const fn slot(&self) -> usize {
        self.slot
    }
}

/// An array-based queue lock with one flag slot per participant.
pub struct ArrayLock<R = DefaultRelax> {
    tail: CachePadded<AtomicUsize>,
    flags: Box<[CachePadded<AtomicBool>]>,
    capacity: usize,
    participants: AtomicUsize,
    marker: PhantomData<fn() -> R>,
}

impl<R> ArrayLock<R> {
    /// Maximum number of threads this lock serves.
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    fn slot_of(&self, ticket: usize) -> usize {
        ticket % self.flags.len()
    }
}

impl<R: Relax> RawLock for ArrayLock<R> {
    type Local = ArrayLocal;

    const NAME: &'static str = "array";

    fn new(config: &Config) -> Self {
        let capacity = config.max_threads();
        // A single slot cannot tell a held lock from a free one.
        let slots = capacity.max(2);
        let flags = (0..slots).map(|slot| CachePadded::new(AtomicBool::new(slot == 0))).collect();
        let tail = CachePadded::new(AtomicUsize::new(0));
        let participants = AtomicUsize::new(0);
        Self { tail, flags, capacity, participants, marker: PhantomData }
    }

    fn local(&self, _config: &Config, _core: usize) -> Result<ArrayLocal, Error> {
        let capacity = self.capacity;
        self.participants
            .fetch_update(Relaxed, Relaxed, |n| (n < capacity).then_some(n + 1))
            .map(|_| ArrayLocal::default())
            .map_err(|_| Error::Capacity { lock: Self::NAME, capacity })
    }

    fn free_local(&self, _local: ArrayLocal) {
        self.participants.fetch_sub(1, Relaxed);
    }

    fn acquire(&self, local: &mut ArrayLocal) {
        let ticket = self.tail.fai();
        let slot = self.slot_of(ticket);
        *local = ArrayLocal { ticket, slot };
        let mut relax = R::new();
        while !self.flags[slot].load(Acquire) {
            relax.relax();
        }
    }

    fn release(&self, local: &mut ArrayLocal) {
        let slot = local.slot;
        self.flags[slot].store(false, Relaxed);
        let next = self.slot_of(slot + 1);
        self.flags[next].store(true, Release);
    }

    fn try_acquire(&self, local: &mut ArrayLocal) -> Result<bool, Error> {
        let ticket = self.tail.load(Relaxed);
        let slot = self.slot_of(ticket);
        // The slot of the next ticket is only granted while nobody holds
        // the lock.
        if !self.flags[slot].load(Acquire) {
            return Ok(false);
        }
        let next = ticket.wrapping_add(1);
        let acquired = self.tail.compare_exchange(ticket, next, Acquire, Relaxed).is_ok();
        if acquired {
            *local = ArrayLocal { ticket, slot };
        }
        Ok(acquired)
    }

    fn is_free(&self) -> bool {
        let ticket = self.tail.load(Relaxed);
        self.flags[self.slot_of(ticket)].load(Relaxed)
    }
}

#[cfg(all(not(loom), test))]
mod test {
    use core::sync::atomic::Ordering::Relaxed;
    use std::sync::Arc;
    use std::thread;

    use crate::lock::RawLock;
    use crate::test::{config, tests, QueueTail};
    use crate::Error;

    type ArrayLock = super::ArrayLock<crate::relax::Yield>;

    impl QueueTail for ArrayLock {
        fn tail_token(&self) -> u64 {
            self.tail.load(Relaxed) as u64
        }
    }

    #[test]
    fn lots_and_lots_lock() {
        tests::lots_and_lots_lock::<ArrayLock>();
    }

    #[test]
    fn lots_and_lots_try_lock() {
        tests::lots_and_lots_try_lock::<ArrayLock>();
    }

    #[test]
    fn lots_and_lots_mixed_lock() {
        tests::lots_and_lots_mixed_lock::<ArrayLock>();
    }

    #[test]
    fn test_try_lock() {
        tests::test_try_lock::<ArrayLock>();
    }

    #[test]
    fn test_lifecycle() {
        tests::test_lifecycle::<ArrayLock>();
    }

    #[test]
    fn fifo_order() {
        tests::fifo_order::<ArrayLock>();
    }

    #[test]
    fn capacity_is_enforced() {
        let config = config(2);
        let lock = ArrayLock::new(&config);
        let first = lock.local(&config, 0).unwrap();
        let _second = lock.local(&config, 1).unwrap();
        let err = lock.local(&config, 2).unwrap_err();
        assert_eq!(err, Error::Capacity { lock: "array", capacity: 2 });
        lock.free_local(first);
        assert!(lock.local(&config, 2).is_ok());
    }

    #[test]
    fn slots_wrap_around() {
        let config = config(3);
        let lock = ArrayLock::new(&config);
        let mut local = lock.local(&config, 0).unwrap();
        let slots: Vec<_> = (0..7)
            .map(|_| {
                lock.acquire(&mut local);
                lock.release(&mut local);
                local.slot()
            })
            .collect();
        assert_eq!(slots, [0, 1, 2, 0, 1, 2, 0]);
        assert_eq!(local.ticket(), 6);
        assert!(lock.is_free());
    }

    #[test]
    fn full_contention_advances_tickets_by_participants() {
        const THREADS: usize = 4;
        const ITERS: usize = 50;
        let config = config(THREADS);
        let lock = Arc::new(ArrayLock::new(&config));
        let handles: Vec<_> = (0..THREADS)
            .map(|core| {
                let mut local = lock.local(&config, core).unwrap();
                let lock = Arc::clone(&lock);
                thread::spawn(move || {
                    let mut tickets = Vec::with_capacity(ITERS);
                    for _ in 0..ITERS {
                        // Draw again only once every other thread is queued.
                        if let Some(&prev) = tickets.last() {
                            while lock.tail_token() < (prev + THREADS) as u64 {
                                thread::yield_now();
                            }
                        }
                        lock.acquire(&mut local);
                        tickets.push(local.ticket());
                        lock.release(&mut local);
                    }
                    tickets
                })
            })
            .collect();
        for handle in handles {
            let tickets = handle.join().unwrap();
            assert_eq!(tickets.len(), ITERS);
            assert!(tickets.windows(2).all(|pair| pair[1] - pair[0] == THREADS));
        }
        assert!(lock.is_free());
    }

    #[test]
    fn single_participant() {
        let config = config(1);
        let lock = ArrayLock::new(&config);
        let mut local = lock.local(&config, 0).unwrap();
        assert!(lock.try_acquire(&mut local).unwrap());
        assert!(!lock.is_free());
        lock.release(&mut local);
        assert!(lock.is_free());
    }
}

#[cfg(all(loom, test))]
mod model {
    use crate::loom::models;
    use crate::relax::Yield;

    type ArrayLock = super::ArrayLock<Yield>;

    #[test]
    fn lock_join() {
        models::lock_join::<ArrayLock>();
    }

    #[test]
    fn try_lock_join() {
        models::try_lock_join::<ArrayLock>();
    }

    #[test]
    fn mixed_lock_join() {
        models::mixed_lock_join::<ArrayLock>();
    }
}
