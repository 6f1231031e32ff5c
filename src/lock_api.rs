//! Locking interfaces that are compatible with [lock_api].
//!
//! [`lock_api::RawMutex`] needs a lock that can be created in a constant
//! context and operated without per-thread state kept between calls. That
//! rules out the queue locks, whose nodes live in an arena sized at run
//! time, and the hierarchical locks, which need the machine topology. The
//! remaining locks create a fresh local state on every call: [`TasLock`] has
//! none, [`TtasLock`] and [`RwTtasLock`] start a new backoff window and
//! [`TicketLock`] drops its statistics.
//!
//! [`RwTtasLock`] also implements [`lock_api::RawRwLock`].
//!
//! [lock_api]: https://crates.io/crates/lock_api
//! [`lock_api::RawMutex`]: https://docs.rs/lock_api/latest/lock_api/trait.RawMutex.html
//! [`lock_api::RawRwLock`]: https://docs.rs/lock_api/latest/lock_api/trait.RawRwLock.html

use lock_api::{GuardSend, RawMutex, RawRwLock};

use crate::lock::RawLock;
use crate::relax::{DefaultRelax, RandomBackoff, Relax};
use crate::{RwTtasLock, TasLock, TicketLock, TtasLock};

/// A [`lock_api::Mutex`] backed by a lock of this crate.
///
/// [`lock_api::Mutex`]: https://docs.rs/lock_api/latest/lock_api/struct.Mutex.html
pub type Mutex<T, L = TicketLock<DefaultRelax>> = lock_api::Mutex<L, T>;

/// A [`lock_api::MutexGuard`] of a [`Mutex`].
///
/// [`lock_api::MutexGuard`]: https://docs.rs/lock_api/latest/lock_api/struct.MutexGuard.html
pub type MutexGuard<'a, T, L = TicketLock<DefaultRelax>> = lock_api::MutexGuard<'a, L, T>;

/// A [`lock_api::RwLock`] backed by a [`RwTtasLock`].
///
/// # Example
///
/// ```
/// use slock::lock_api::RwLock;
///
/// let lock: RwLock<i32> = RwLock::new(5);
/// {
///     let first = lock.read();
///     let second = lock.read();
///     assert_eq!(*first + *second, 10);
/// }
/// *lock.write() += 1;
/// assert_eq!(*lock.read(), 6);
/// ```
///
/// [`lock_api::RwLock`]: https://docs.rs/lock_api/latest/lock_api/struct.RwLock.html
pub type RwLock<T, R = DefaultRelax> = lock_api::RwLock<RwTtasLock<R>, T>;

/// A [`lock_api::RwLockReadGuard`] of a [`RwLock`].
///
/// [`lock_api::RwLockReadGuard`]: https://docs.rs/lock_api/latest/lock_api/struct.RwLockReadGuard.html
pub type RwLockReadGuard<'a, T, R = DefaultRelax> =
    lock_api::RwLockReadGuard<'a, RwTtasLock<R>, T>;

/// A [`lock_api::RwLockWriteGuard`] of a [`RwLock`].
///
/// [`lock_api::RwLockWriteGuard`]: https://docs.rs/lock_api/latest/lock_api/struct.RwLockWriteGuard.html
pub type RwLockWriteGuard<'a, T, R = DefaultRelax> =
    lock_api::RwLockWriteGuard<'a, RwTtasLock<R>, T>;

/// Mutex aliases that signal the processor that they are running a
/// busy-wait spin-loop during lock contention.
pub mod spins {
    use crate::relax::Spin;

    /// A ticket lock based mutex.
    ///
    /// # Example
    ///
    /// ```
    /// use slock::lock_api::spins::Mutex;
    ///
    /// let mutex = Mutex::new(0);
    /// *mutex.lock() += 1;
    /// assert_eq!(*mutex.lock(), 1);
    /// ```
    pub type Mutex<T> = super::Mutex<T, crate::TicketLock<Spin>>;

    /// A test-and-set lock based mutex.
    pub type TasMutex<T> = super::Mutex<T, crate::TasLock<Spin>>;

    /// A test-and-test-and-set lock based mutex.
    pub type TtasMutex<T> = super::Mutex<T, crate::TtasLock<Spin>>;
}

/// Mutex aliases that yield the current time slice to the OS scheduler
/// during lock contention.
pub mod yields {
    use crate::relax::Yield;

    /// A ticket lock based mutex.
    ///
    /// # Example
    ///
    /// ```
    /// use slock::lock_api::yields::Mutex;
    ///
    /// let mutex = Mutex::new(0);
    /// let data = *mutex.lock();
    /// assert_eq!(data, 0);
    /// ```
    pub type Mutex<T> = super::Mutex<T, crate::TicketLock<Yield>>;

    /// A test-and-set lock based mutex.
    pub type TasMutex<T> = super::Mutex<T, crate::TasLock<Yield>>;

    /// A test-and-test-and-set lock based mutex.
    pub type TtasMutex<T> = super::Mutex<T, crate::TtasLock<Yield>>;
}

unsafe impl<R: Relax> RawMutex for TasLock<R> {
    #[allow(clippy::declare_interior_mutable_const)]
    const INIT: Self = Self::free();

    type GuardMarker = GuardSend;

    fn lock(&self) {
        self.acquire(&mut ());
    }

    fn try_lock(&self) -> bool {
        self.try_acquire(&mut ()).unwrap_or(false)
    }

    unsafe fn unlock(&self) {
        self.release(&mut ());
    }

    fn is_locked(&self) -> bool {
        !self.is_free()
    }
}

unsafe impl<R: Relax> RawMutex for TtasLock<R> {
    #[allow(clippy::declare_interior_mutable_const)]
    const INIT: Self = Self::free();

    type GuardMarker = GuardSend;

    fn lock(&self) {
        self.acquire(&mut RandomBackoff::default());
    }

    fn try_lock(&self) -> bool {
        self.try_acquire(&mut RandomBackoff::default()).unwrap_or(false)
    }

    unsafe fn unlock(&self) {
        self.release(&mut RandomBackoff::default());
    }

    fn is_locked(&self) -> bool {
        !self.is_free()
    }
}

unsafe impl<R: Relax> RawMutex for TicketLock<R> {
    #[allow(clippy::declare_interior_mutable_const)]
    const INIT: Self = Self::free();

    type GuardMarker = GuardSend;

    fn lock(&self) {
        self.acquire(&mut Default::default());
    }

    fn try_lock(&self) -> bool {
        self.try_acquire(&mut Default::default()).unwrap_or(false)
    }

    unsafe fn unlock(&self) {
        self.release(&mut Default::default());
    }

    fn is_locked(&self) -> bool {
        !self.is_free()
    }
}

unsafe impl<R: Relax> RawRwLock for RwTtasLock<R> {
    #[allow(clippy::declare_interior_mutable_const)]
    const INIT: Self = Self::free();

    type GuardMarker = GuardSend;

    fn lock_shared(&self) {
        self.acquire_read(&mut RandomBackoff::default());
    }

    fn try_lock_shared(&self) -> bool {
        self.try_acquire_read()
    }

    unsafe fn unlock_shared(&self) {
        self.release_read(&mut RandomBackoff::default());
    }

    fn lock_exclusive(&self) {
        self.acquire_write(&mut RandomBackoff::default());
    }

    fn try_lock_exclusive(&self) -> bool {
        self.try_acquire(&mut RandomBackoff::default()).unwrap_or(false)
    }

    unsafe fn unlock_exclusive(&self) {
        self.release_write(&mut RandomBackoff::default());
    }

    fn is_locked(&self) -> bool {
        !self.is_free()
    }

    fn is_locked_exclusive(&self) -> bool {
        self.word().is_write_locked()
    }
}

#[cfg(test)]
mod test {
    use super::{spins, yields, RwLock};

    #[test]
    fn tas_and_ttas_mutexes() {
        let tas = spins::TasMutex::new(1);
        let ttas = yields::TtasMutex::new(2);
        *tas.lock() += *ttas.lock();
        assert_eq!(tas.into_inner(), 3);
        assert!(!ttas.is_locked());
        let guard = ttas.try_lock();
        assert!(guard.is_some());
        assert!(ttas.try_lock().is_none());
    }

    #[test]
    fn rw_lock_readers_and_writer() {
        let lock = RwLock::<u32>::new(0);
        {
            let _first = lock.read();
            let _second = lock.try_read().unwrap();
            assert!(lock.try_write().is_none());
            assert!(lock.is_locked());
            assert!(!lock.is_locked_exclusive());
        }
        {
            let mut guard = lock.write();
            *guard = 7;
            assert!(lock.is_locked_exclusive());
            assert!(lock.try_read().is_none());
        }
        assert_eq!(*lock.read(), 7);
    }
}
