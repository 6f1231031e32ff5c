//! A ticket lock with proportional backoff.
//!
//! Waiters draw consecutive tickets from the tail counter and wait for the
//! head counter, advanced by each release, to reach their ticket. The lock
//! is granted in strict ticket order.
//!
//! Both counters share one 64-bit word, see [`TicketWord`], which lets
//! `try_acquire` check that the lock is free and take a ticket in a single
//! compare-and-swap. Waiters back off proportionally to their distance from
//! the head, and yield the processor when they are far back in the queue.

use core::marker::PhantomData;
use core::sync::atomic::Ordering::{Acquire, Relaxed, Release};

use crossbeam_utils::CachePadded;

use crate::atomic;
use crate::cfg::atomic::AtomicU64;
use crate::cfg::thread;
use crate::lock::RawLock;
use crate::relax::{DefaultRelax, Relax};
use crate::{Config, Error};

/// Busy-wait iterations per ticket of distance from the head.
const BASE_WAIT: u32 = 512;

/// Busy-wait iterations of the next waiter in line.
const WAIT_NEXT: u32 = 128;

/// Waiters further than this from the head yield their time slice.
const YIELD_DISTANCE: u32 = 20;

/// The head and tail counters of a ticket lock, packed in one word.
///
/// The tail, the next ticket to hand out, lives in the high half and the
/// head, the ticket being served, in the low half. The lock is free when
/// both are equal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TicketWord(u64);

impl TicketWord {
    /// Value to add to the word to take a ticket.
    pub const TAIL_ONE: u64 = 1 << 32;

    /// Value to add to the word to serve the next ticket.
    pub const HEAD_ONE: u64 = 1;

    /// Packs a head and a tail counter.
    #[must_use]
    pub const fn new(head: u32, tail: u32) -> Self {
        Self(((tail as u64) << 32) | head as u64)
    }

    /// The ticket being served.
    #[must_use]
    pub const fn head(self) -> u32 {
        self.0 as u32
    }

    /// The next ticket to hand out.
    #[must_use]
    pub const fn tail(self) -> u32 {
        (self.0 >> 32) as u32
    }

    /// Number of tickets handed out and not yet served.
    #[must_use]
    pub const fn queued(self) -> u32 {
        self.tail().wrapping_sub(self.head())
    }

    /// Returns `true` if no ticket is outstanding.
    #[must_use]
    pub const fn is_free(self) -> bool {
        self.head() == self.tail()
    }

    /// The raw word.
    #[must_use]
    pub const fn into_raw(self) -> u64 {
        self.0
    }
}

/// Per-thread state of a [`TicketLock`]: the ticket of the last acquisition
/// and contention statistics.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct TicketLocal {
    ticket: u32,
    queued_total: u64,
    acquires: u64,
}

impl TicketLocal {
    /// Ticket of the last acquisition.
    #[must_use]
    pub const fn ticket(&self) -> u32 {
        self.ticket
    }

    /// Number of blocking acquisitions.
    #[must_use]
    pub const fn acquires(&self) -> u64 {
        self.acquires
    }

    /// Sum of the distances to the head first observed by every blocking
    /// acquisition that had to wait.
    #[must_use]
    pub const fn queued_total(&self) -> u64 {
        self.queued_total
    }

    /// Average number of waiters ahead of this thread per acquisition.
    #[must_use]
    pub fn avg_queue(&self) -> f64 {
        if self.acquires == 0 {
            return 0.0;
        }
        self.queued_total as f64 / self.acquires as f64
    }
}

/// A ticket lock.
pub struct TicketLock<R = DefaultRelax> {
    word: CachePadded<AtomicU64>,
    marker: PhantomData<fn() -> R>,
}

impl<R> TicketLock<R> {
    /// Creates a free lock (const).
    #[cfg(not(all(loom, test)))]
    #[must_use]
    pub const fn free() -> Self {
        Self { word: CachePadded::new(AtomicU64::new(0)), marker: PhantomData }
    }

    /// Creates a free Loom based lock (non-const).
    #[cfg(all(loom, test))]
    pub fn free() -> Self {
        Self { word: CachePadded::new(AtomicU64::new(0)), marker: PhantomData }
    }

    /// Snapshot of the counters.
    pub fn word(&self) -> TicketWord {
        TicketWord(self.word.load(Relaxed))
    }
}

impl<R: Relax> TicketLock<R> {
    /// Takes a ticket and waits for it to be served.
    pub(crate) fn lock(&self, local: &mut TicketLocal) {
        let ticket = TicketWord(self.word.fetch_add(TicketWord::TAIL_ONE, Relaxed)).tail();
        local.ticket = ticket;
        local.acquires += 1;
        let mut first = true;
        let mut relax = R::new();
        loop {
            let head = TicketWord(self.word.load(Acquire)).head();
            if head == ticket {
                return;
            }
            let distance = ticket.wrapping_sub(head);
            if first {
                local.queued_total += u64::from(distance);
                first = false;
            }
            if distance > 1 {
                atomic::nop_rep(distance.min(YIELD_DISTANCE) * BASE_WAIT);
            } else {
                atomic::nop_rep(WAIT_NEXT);
            }
            if distance > YIELD_DISTANCE {
                thread::yield_now();
            }
            relax.relax();
        }
    }

    /// Takes the ticket being served if nobody holds it.
    pub(crate) fn try_lock(&self, local: &mut TicketLocal) -> bool {
        let tail = TicketWord(self.word.load(Relaxed)).tail();
        let free = TicketWord::new(tail, tail);
        let taken = TicketWord::new(tail, tail.wrapping_add(1));
        let acquired =
            self.word.compare_exchange(free.0, taken.0, Acquire, Relaxed).is_ok();
        if acquired {
            local.ticket = tail;
        }
        acquired
    }

    /// Serves the next ticket.
    pub(crate) fn unlock(&self) {
        // Only the holder moves the head. Wrapping the head must not carry
        // into the tail.
        if self.word().head() == u32::MAX {
            self.word.fetch_sub(u64::from(u32::MAX), Release);
        } else {
            self.word.fetch_add(TicketWord::HEAD_ONE, Release);
        }
    }
}

impl<R: Relax> RawLock for TicketLock<R> {
    type Local = TicketLocal;

    const NAME: &'static str = "ticket";

    fn new(_config: &Config) -> Self {
        Self::free()
    }

    fn local(&self, _config: &Config, _core: usize) -> Result<TicketLocal, Error> {
        Ok(TicketLocal::default())
    }

    fn acquire(&self, local: &mut TicketLocal) {
        self.lock(local);
    }

    fn release(&self, _local: &mut TicketLocal) {
        self.unlock();
    }

    fn try_acquire(&self, local: &mut TicketLocal) -> Result<bool, Error> {
        Ok(self.try_lock(local))
    }

    fn is_free(&self) -> bool {
        self.word().is_free()
    }
}

#[cfg(all(not(loom), test))]
mod test {
    use core::sync::atomic::Ordering::Relaxed;

    use super::{TicketLocal, TicketWord};
    use crate::lock::RawLock;
    use crate::test::{config, tests, QueueTail};

    type TicketLock = super::TicketLock<crate::relax::Yield>;

    impl QueueTail for TicketLock {
        fn tail_token(&self) -> u64 {
            u64::from(self.word().tail())
        }
    }

    #[test]
    fn lots_and_lots_lock() {
        tests::lots_and_lots_lock::<TicketLock>();
    }

    #[test]
    fn lots_and_lots_try_lock() {
        tests::lots_and_lots_try_lock::<TicketLock>();
    }

    #[test]
    fn lots_and_lots_mixed_lock() {
        tests::lots_and_lots_mixed_lock::<TicketLock>();
    }

    #[test]
    fn test_try_lock() {
        tests::test_try_lock::<TicketLock>();
    }

    #[test]
    fn test_lifecycle() {
        tests::test_lifecycle::<TicketLock>();
    }

    #[test]
    fn fifo_order() {
        tests::fifo_order::<TicketLock>();
    }

    #[test]
    fn word_accessors() {
        let word = TicketWord::new(3, 5);
        assert_eq!(word.head(), 3);
        assert_eq!(word.tail(), 5);
        assert_eq!(word.queued(), 2);
        assert!(!word.is_free());
        assert!(TicketWord::new(7, 7).is_free());
        assert_eq!(TicketWord::new(u32::MAX, 1).queued(), 2);
    }

    #[test]
    fn head_wraps_without_carry() {
        let config = config(1);
        let lock = TicketLock::new(&config);
        let start = TicketWord::new(u32::MAX, u32::MAX).into_raw();
        lock.word.store(start, Relaxed);
        let mut local = lock.local(&config, 0).unwrap();
        lock.acquire(&mut local);
        assert_eq!(local.ticket(), u32::MAX);
        assert_eq!(lock.word(), TicketWord::new(u32::MAX, 0));
        lock.release(&mut local);
        assert_eq!(lock.word(), TicketWord::new(0, 0));
        assert!(lock.try_acquire(&mut local).unwrap());
        assert_eq!(lock.word(), TicketWord::new(0, 1));
        lock.release(&mut local);
        assert!(lock.is_free());
    }

    #[test]
    fn contention_statistics() {
        let config = config(1);
        let lock = TicketLock::new(&config);
        let mut local = lock.local(&config, 0).unwrap();
        assert_eq!(local.avg_queue(), 0.0);
        for _ in 0..3 {
            lock.acquire(&mut local);
            lock.release(&mut local);
        }
        // Uncontended acquisitions never queue.
        assert_eq!(local.acquires(), 3);
        assert_eq!(local.queued_total(), 0);

        let stats = TicketLocal { ticket: 0, queued_total: 6, acquires: 4 };
        assert_eq!(stats.avg_queue(), 1.5);
    }
}

#[cfg(all(loom, test))]
mod model {
    use crate::loom::models;
    use crate::relax::Yield;

    type TicketLock = super::TicketLock<Yield>;

    #[test]
    fn lock_join() {
        models::lock_join::<TicketLock>();
    }

    #[test]
    fn try_lock_join() {
        models::try_lock_join::<TicketLock>();
    }

    #[test]
    fn mixed_lock_join() {
        models::mixed_lock_join::<TicketLock>();
    }
}
