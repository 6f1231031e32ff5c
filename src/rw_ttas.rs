//! A reader-writer test-and-test-and-set lock.
//!
//! Readers and the writer share one 16-bit word, see [`RwWord`]. Readers wait
//! with plain loads while a writer holds the lock and then increment the
//! reader count, writers wait for the whole word to read zero and then set
//! the writer bit. Both back off randomly after a failed compare-and-swap.
//!
//! There is no fairness between readers and writers: a steady stream of
//! readers starves writers.

use core::marker::PhantomData;
use core::sync::atomic::Ordering::{Acquire, Relaxed, Release};

use crossbeam_utils::CachePadded;

use crate::cfg::atomic::AtomicU16;
use crate::lock::RawLock;
use crate::relax::{DefaultRelax, RandomBackoff, Relax};
use crate::{Config, Error};

/// The reader count and writer flag of a [`RwTtasLock`].
///
/// The low byte counts readers, bit 8 is the writer flag. All zero means
/// free.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RwWord(u16);

impl RwWord {
    /// Maximum number of concurrent readers.
    pub const MAX_READERS: u16 = 0xff;

    /// The writer flag.
    pub const WRITER: u16 = 0x100;

    /// The free word.
    pub const FREE: Self = Self(0);

    /// Number of readers holding the lock.
    #[must_use]
    pub const fn readers(self) -> u16 {
        self.0 & Self::MAX_READERS
    }

    /// Returns `true` if a writer holds the lock.
    #[must_use]
    pub const fn is_write_locked(self) -> bool {
        self.0 & Self::WRITER != 0
    }

    /// Returns `true` if a reader may join.
    #[must_use]
    pub const fn admits_reader(self) -> bool {
        !self.is_write_locked() && self.readers() < Self::MAX_READERS
    }

    /// Returns `true` if nobody holds the lock.
    #[must_use]
    pub const fn is_free(self) -> bool {
        self.0 == 0
    }

    /// The raw word.
    #[must_use]
    pub const fn into_raw(self) -> u16 {
        self.0
    }
}

/// A reader-writer test-and-test-and-set lock.
///
/// The exclusive operations of [`RawLock`] are the writer operations.
pub struct RwTtasLock<R = DefaultRelax> {
    word: CachePadded<AtomicU16>,
    marker: PhantomData<fn() -> R>,
}

impl<R> RwTtasLock<R> {
    /// Creates a free lock (const).
    #[cfg(not(all(loom, test)))]
    #[must_use]
    pub const fn free() -> Self {
        Self { word: CachePadded::new(AtomicU16::new(0)), marker: PhantomData }
    }

    /// Creates a free Loom based lock (non-const).
    #[cfg(all(loom, test))]
    pub fn free() -> Self {
        Self { word: CachePadded::new(AtomicU16::new(0)), marker: PhantomData }
    }

    /// Snapshot of the lock word.
    pub fn word(&self) -> RwWord {
        RwWord(self.word.load(Relaxed))
    }

    /// Attempts to join the readers without waiting.
    pub fn try_acquire_read(&self) -> bool {
        let word = self.word();
        word.admits_reader()
            && self.word.compare_exchange(word.0, word.0 + 1, Acquire, Relaxed).is_ok()
    }

    fn try_acquire_write(&self) -> bool {
        self.word.compare_exchange(0, RwWord::WRITER, Acquire, Relaxed).is_ok()
    }
}

impl<R: Relax> RwTtasLock<R> {
    /// Spins with plain loads until `ready` holds for the lock word.
    fn wait_for(&self, ready: impl Fn(RwWord) -> bool) -> RwWord {
        let mut relax = R::new();
        loop {
            let word = self.word();
            if ready(word) {
                return word;
            }
            relax.relax();
        }
    }
}

impl<R: Relax> RawLock for RwTtasLock<R> {
    type Local = RandomBackoff;

    const NAME: &'static str = "rw_ttas";

    fn new(_config: &Config) -> Self {
        Self::free()
    }

    fn local(&self, _config: &Config, core: usize) -> Result<RandomBackoff, Error> {
        Ok(RandomBackoff::with_seed(fastrand::u64(..) ^ core as u64))
    }

    fn acquire(&self, backoff: &mut RandomBackoff) {
        self.acquire_write(backoff);
    }

    fn release(&self, backoff: &mut RandomBackoff) {
        self.release_write(backoff);
    }

    fn try_acquire(&self, _backoff: &mut RandomBackoff) -> Result<bool, Error> {
        Ok(self.try_acquire_write())
    }

    fn acquire_read(&self, backoff: &mut RandomBackoff) {
        loop {
            let word = self.wait_for(RwWord::admits_reader);
            if self.word.compare_exchange(word.0, word.0 + 1, Acquire, Relaxed).is_ok() {
                return;
            }
            backoff.backoff();
        }
    }

    fn release_read(&self, _backoff: &mut RandomBackoff) {
        self.word.fetch_sub(1, Release);
    }

    fn acquire_write(&self, backoff: &mut RandomBackoff) {
        loop {
            self.wait_for(RwWord::is_free);
            if self.try_acquire_write() {
                return;
            }
            backoff.backoff();
        }
    }

    fn release_write(&self, _backoff: &mut RandomBackoff) {
        self.word.store(RwWord::FREE.0, Release);
    }

    fn is_free(&self) -> bool {
        self.word().is_free()
    }
}

#[cfg(all(not(loom), test))]
mod test {
    use super::RwWord;
    use crate::lock::RawLock;
    use crate::test::{config, tests};

    type RwTtasLock = super::RwTtasLock<crate::relax::Yield>;

    #[test]
    fn lots_and_lots_lock() {
        tests::lots_and_lots_lock::<RwTtasLock>();
    }

    #[test]
    fn lots_and_lots_try_lock() {
        tests::lots_and_lots_try_lock::<RwTtasLock>();
    }

    #[test]
    fn lots_and_lots_mixed_lock() {
        tests::lots_and_lots_mixed_lock::<RwTtasLock>();
    }

    #[test]
    fn lots_and_lots_read_write() {
        tests::lots_and_lots_read_write::<RwTtasLock>();
    }

    #[test]
    fn test_try_lock() {
        tests::test_try_lock::<RwTtasLock>();
    }

    #[test]
    fn test_lifecycle() {
        tests::test_lifecycle::<RwTtasLock>();
    }

    #[test]
    fn readers_share_writers_exclude() {
        let config = config(2);
        let lock = RwTtasLock::new(&config);
        let mut first = lock.local(&config, 0).unwrap();
        let mut second = lock.local(&config, 1).unwrap();

        lock.acquire_read(&mut first);
        lock.acquire_read(&mut second);
        assert_eq!(lock.word().readers(), 2);
        assert!(!lock.is_free());
        assert!(!lock.try_acquire(&mut first).unwrap());

        lock.release_read(&mut first);
        lock.release_read(&mut second);
        assert!(lock.is_free());

        lock.acquire_write(&mut first);
        assert!(lock.word().is_write_locked());
        assert!(!lock.try_acquire_read());
        lock.release_write(&mut first);
        assert_eq!(lock.word(), RwWord::FREE);
    }

    #[test]
    fn reader_count_saturates() {
        let config = config(1);
        let lock = RwTtasLock::new(&config);
        let mut local = lock.local(&config, 0).unwrap();
        for _ in 0..RwWord::MAX_READERS {
            lock.acquire_read(&mut local);
        }
        assert_eq!(lock.word().readers(), RwWord::MAX_READERS);
        assert!(!lock.word().is_write_locked());
        assert!(!lock.try_acquire_read());
        lock.release_read(&mut local);
        assert!(lock.try_acquire_read());
        for _ in 0..RwWord::MAX_READERS {
            lock.release_read(&mut local);
        }
        assert!(lock.is_free());
    }
}

#[cfg(all(loom, test))]
mod model {
    use crate::loom::models;
    use crate::relax::Yield;

    type RwTtasLock = super::RwTtasLock<Yield>;

    #[test]
    fn lock_join() {
        models::lock_join::<RwTtasLock>();
    }

    #[test]
    fn try_lock_join() {
        models::try_lock_join::<RwTtasLock>();
    }

    #[test]
    fn read_write_join() {
        models::read_write_join::<RwTtasLock>();
    }
}
