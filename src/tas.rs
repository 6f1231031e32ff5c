//! A test-and-set spin-lock.
//!
//! Every waiter retries the test-and-set as soon as the lock byte reads
//! free, with no backoff, which makes this the simplest and, under
//! contention, the noisiest lock in the crate. There is no ordering among
//! waiters.

use core::marker::PhantomData;
use core::sync::atomic::Ordering::{Relaxed, Release};

use crossbeam_utils::CachePadded;

use crate::atomic::AtomicTas;
use crate::cfg::atomic::AtomicU8;
use crate::lock::RawLock;
use crate::relax::{DefaultRelax, Relax};
use crate::{Config, Error};

const UNLOCKED: u8 = 0;

/// A test-and-set lock.
///
/// # Examples
///
/// ```
/// use slock::{Config, RawLock, TasLock, Topology};
///
/// let config = Config::builder().topology(Topology::uniform(1, 1)).build()?;
/// let lock = TasLock::<slock::relax::Spin>::new(&config);
/// let mut local = lock.local(&config, 0)?;
///
/// lock.acquire(&mut local);
/// assert!(!lock.is_free());
/// assert!(!lock.try_acquire(&mut local)?);
/// lock.release(&mut local);
/// assert!(lock.is_free());
/// # Ok::<(), slock::Error>(())
/// ```
pub struct TasLock<R = DefaultRelax> {
    word: CachePadded<AtomicU8>,
    marker: PhantomData<fn() -> R>,
}

impl<R> TasLock<R> {
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

impl<R: Relax> RawLock for TasLock<R> {
    type Local = ();

    const NAME: &'static str = "tas";

    fn new(_config: &Config) -> Self {
        Self::free()
    }

    fn local(&self, _config: &Config, _core: usize) -> Result<(), Error> {
        Ok(())
    }

    fn acquire(&self, _local: &mut ()) {
        let mut relax = R::new();
        while self.word.tas() {
            while self.word.load(Relaxed) != UNLOCKED {
                relax.relax();
            }
        }
    }

    fn release(&self, _local: &mut ()) {
        self.word.store(UNLOCKED, Release);
    }

    fn try_acquire(&self, _local: &mut ()) -> Result<bool, Error> {
        Ok(!self.word.tas())
    }

    fn is_free(&self) -> bool {
        self.word.load(Relaxed) == UNLOCKED
    }
}

#[cfg(all(not(loom), test))]
mod test {
    use crate::test::tests;

    type TasLock = super::TasLock<crate::relax::Yield>;

    #[test]
    fn lots_and_lots_lock() {
        tests::lots_and_lots_lock::<TasLock>();
    }

    #[test]
    fn lots_and_lots_try_lock() {
        tests::lots_and_lots_try_lock::<TasLock>();
    }

    #[test]
    fn lots_and_lots_mixed_lock() {
        tests::lots_and_lots_mixed_lock::<TasLock>();
    }

    #[test]
    fn test_try_lock() {
        tests::test_try_lock::<TasLock>();
    }

    #[test]
    fn test_lifecycle() {
        tests::test_lifecycle::<TasLock>();
    }
}

#[cfg(all(loom, test))]
mod model {
    use crate::loom::models;
    use crate::relax::Yield;

    type TasLock = super::TasLock<Yield>;

    #[test]
    fn lock_join() {
        models::lock_join::<TasLock>();
    }

    #[test]
    fn try_lock_join() {
        models::try_lock_join::<TasLock>();
    }

    #[test]
    fn mixed_lock_join() {
        models::mixed_lock_join::<TasLock>();
    }
}
