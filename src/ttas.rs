//! A test-and-test-and-set spin-lock with randomized exponential backoff.
//!
//! Waiters spin on plain loads of the lock byte, which stay in their own
//! cache while the lock is held, and only issue the atomic exchange once
//! the byte reads free. A waiter that loses that race backs off for a
//! random delay whose window doubles on every loss, see [`RandomBackoff`].

use core::marker::PhantomData;
use core::sync::atomic::Ordering::{Relaxed, Release};

use crossbeam_utils::CachePadded;

use crate::atomic::AtomicTas;
use crate::cfg::atomic::AtomicU8;
use crate::lock::RawLock;
use crate::relax::{DefaultRelax, RandomBackoff, Relax};
use crate::{Config, Error};

const UNLOCKED: u8 = 0;

/// A test-and-test-and-set lock with randomized exponential backoff.
///
/// The thread local state is the backoff window of the thread for this lock,
/// which keeps growing across acquisitions.
pub struct TtasLock<R = DefaultRelax> {
    word: CachePadded<AtomicU8>,
    marker: PhantomData<fn() -> R>,
}

impl<R> TtasLock<R> {
    /// Creates a free lock (const).
    #[cfg(not(all(loom, test)))]
    #[must_use]
    pub const fn free() -> Self {
        Self { word: CachePadded::new(AtomicU8::new(UNLOCKED)), marker: PhantomData }
    }

    /// Creates a free Loom based lock (non-const).
    #[cfg(all(loom, test))]
    pub fn free() -> Self {
        Self { word: CachePadded::new(AtomicU8::new(UNLOCKED)), marker: PhantomData }
    }
}

impl<R: Relax> TtasLock<R> {
    /// Spins with plain loads until the lock byte reads free.
    fn wait_unlocked(&self) {
        let mut relax = R::new();
        while self.word.load(Relaxed) != UNLOCKED {
            relax.relax();
        }
    }
}

impl<R: Relax> RawLock for TtasLock<R> {
    type Local = RandomBackoff;

    const NAME: &'static str = "ttas";

    fn new(_config: &Config) -> Self {
        Self::free()
    }

    fn local(&self, _config: &Config, core: usize) -> Result<RandomBackoff, Error> {
        Ok(RandomBackoff::with_seed(fastrand::u64(..) ^ core as u64))
    }

    fn acquire(&self, backoff: &mut RandomBackoff) {
        loop {
            self.wait_unlocked();
            if !self.word.tas() {
                return;
            }
            backoff.backoff();
        }
    }

    fn release(&self, _backoff: &mut RandomBackoff) {
        self.word.store(UNLOCKED, Release);
    }

    fn try_acquire(&self, _backoff: &mut RandomBackoff) -> Result<bool, Error> {
        Ok(!self.word.tas())
    }

    fn is_free(&self) -> bool {
        self.word.load(Relaxed) == UNLOCKED
    }
}

#[cfg(all(not(loom), test))]
mod test {
    use crate::lock::RawLock;
    use crate::test::{config, tests};

    type TtasLock = super::TtasLock<crate::relax::Yield>;

    #[test]
    fn lots_and_lots_lock() {
        tests::lots_and_lots_lock::<TtasLock>();
    }

    #[test]
    fn lots_and_lots_try_lock() {
        tests::lots_and_lots_try_lock::<TtasLock>();
    }

    #[test]
    fn lots_and_lots_mixed_lock() {
        tests::lots_and_lots_mixed_lock::<TtasLock>();
    }

    #[test]
    fn test_try_lock() {
        tests::test_try_lock::<TtasLock>();
    }

    #[test]
    fn test_lifecycle() {
        tests::test_lifecycle::<TtasLock>();
    }

    #[test]
    fn backoff_starts_at_one() {
        let config = config(1);
        let lock = TtasLock::new(&config);
        let local = lock.local(&config, 0).unwrap();
        assert_eq!(local.limit(), 1);
    }
}

#[cfg(all(loom, test))]
mod model {
    use crate::loom::models;
    use crate::relax::Yield;

    type TtasLock = super::TtasLock<Yield>;

    #[test]
    fn lock_join() {
        models::lock_join::<TtasLock>();
    }

    #[test]
    fn try_lock_join() {
        models::try_lock_join::<TtasLock>();
    }

    #[test]
    fn mixed_lock_join() {
        models::mixed_lock_join::<TtasLock>();
    }
}
