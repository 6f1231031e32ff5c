use core::fmt;

#[cfg(not(all(loom, test)))]
use core::ops::{Deref, DerefMut};

use crate::cfg::cell::{UnsafeCell, WithUnchecked};
use crate::lock::RawLock;
use crate::{Config, Error};

/// A mutual exclusion primitive useful for protecting shared data, backed by
/// any [`RawLock`] algorithm.
///
/// The data can only be accessed through the RAII guards returned from
/// [`lock`] and [`try_lock`], or from within the closures given to
/// [`lock_with_then`] and [`try_lock_with_then`], which guarantees that the
/// data is only ever accessed when the lock is held. Every acquisition
/// borrows the calling thread's [`RawLock::Local`] state for as long as the
/// guard lives.
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
/// use std::thread;
///
/// use slock::{Config, Mutex, TicketLock, Topology};
/// use slock::relax::Spin;
///
/// const N: usize = 4;
///
/// let config = Config::builder()
///     .topology(Topology::uniform(1, N))
///     .pin_threads(false)
///     .build()?;
/// let data = Arc::new(Mutex::<_, TicketLock<Spin>>::new(0, &config));
///
/// let handles: Vec<_> = (0..N)
///     .map(|core| {
///         let data = Arc::clone(&data);
///         let mut local = data.local(&config, core).unwrap();
///         thread::spawn(move || {
///             // The shared state can only be accessed once the lock is held.
///             data.lock_with_then(&mut local, |mut guard| *guard += 1);
///         })
///     })
///     .collect();
///
/// for handle in handles {
///     handle.join().unwrap();
/// }
/// let mut local = data.local(&config, 0)?;
/// assert_eq!(*data.lock(&mut local), N);
/// # Ok::<(), slock::Error>(())
/// ```
///
/// [`lock`]: Mutex::lock
/// [`try_lock`]: Mutex::try_lock
/// [`lock_with_then`]: Mutex::lock_with_then
/// [`try_lock_with_then`]: Mutex::try_lock_with_then
pub struct Mutex<T: ?Sized, L> {
    lock: L,
    data: UnsafeCell<T>,
}

// Same unsafe impls as `std::sync::Mutex`.
unsafe impl<T: ?Sized + Send, L: Send> Send for Mutex<T, L> {}
unsafe impl<T: ?Sized + Send, L: Sync> Sync for Mutex<T, L> {}

impl<T, L: RawLock> Mutex<T, L> {
    /// Creates a new mutex in an unlocked state ready for use.
    pub fn new(value: T, config: &Config) -> Self {
        Self::from_raw(L::new(config), value)
    }

    /// Creates a new mutex around an existing free lock.
    pub fn from_raw(lock: L, value: T) -> Self {
        let data = UnsafeCell::new(value);
        Self { lock, data }
    }

    /// Consumes this mutex, returning the underlying data.
    pub fn into_inner(self) -> T {
        self.data.into_inner()
    }
}

impl<T: ?Sized, L: RawLock> Mutex<T, L> {
    /// Returns the lock backing this mutex.
    pub const fn raw(&self) -> &L {
        &self.lock
    }

    /// Creates the private state a thread running on `core` needs to
    /// acquire this mutex.
    pub fn local(&self, config: &Config, core: usize) -> Result<L::Local, Error> {
        self.lock.local(config, core)
    }

    /// Acquires this mutex, blocking the current thread until it is able to
    /// do so.
    ///
    /// The mutex is unlocked when the returned guard is dropped.
    pub fn lock<'a>(&'a self, local: &'a mut L::Local) -> MutexGuard<'a, T, L> {
        self.lock.acquire(local);
        MutexGuard::new(self, local)
    }

    /// Attempts to acquire this mutex without blocking.
    ///
    /// Returns `Ok(None)` if the mutex is held elsewhere.
    pub fn try_lock<'a>(
        &'a self,
        local: &'a mut L::Local,
    ) -> Result<Option<MutexGuard<'a, T, L>>, Error> {
        if self.lock.try_acquire(local)? {
            Ok(Some(MutexGuard::new(self, local)))
        } else {
            Ok(None)
        }
    }

    /// Acquires this mutex and then runs the closure against its guard.
    ///
    /// Borrows of the guard or its data cannot escape the given closure.
    ///
    /// ```compile_fail,E0515
    /// use slock::{Config, Mutex, TasLock, Topology};
    ///
    /// let config = Config::builder().topology(Topology::uniform(1, 1)).build().unwrap();
    /// let mutex = Mutex::<_, TasLock>::new(1, &config);
    /// let mut local = mutex.local(&config, 0).unwrap();
    /// let data = mutex.lock_with_then(&mut local, |guard| &*guard);
    /// ```
    pub fn lock_with_then<F, Ret>(&self, local: &mut L::Local, f: F) -> Ret
    where
        F: FnOnce(MutexGuard<'_, T, L>) -> Ret,
    {
        f(self.lock(local))
    }

    /// Attempts to acquire this mutex and then runs the closure against its
    /// guard, or against `None` if the mutex is held elsewhere.
    pub fn try_lock_with_then<F, Ret>(&self, local: &mut L::Local, f: F) -> Result<Ret, Error>
    where
        F: FnOnce(Option<MutexGuard<'_, T, L>>) -> Ret,
    {
        self.try_lock(local).map(f)
    }

    /// Acquires this mutex in shared mode and runs the closure against the
    /// protected data.
    ///
    /// Only reader-writer locks let several readers in at once, the others
    /// grant exclusive access.
    pub fn read_with_then<F, Ret>(&self, local: &mut L::Local, f: F) -> Ret
    where
        T: Sync,
        F: FnOnce(&T) -> Ret,
    {
        self.lock.acquire_read(local);
        // SAFETY: The lock is held in shared mode, writers are excluded.
        let ret = unsafe { self.data.with_unchecked(f) };
        self.lock.release_read(local);
        ret
    }

    /// Returns `true` if the mutex is currently held.
    ///
    /// This function does not guarantee strong ordering, only atomicity.
    pub fn is_locked(&self) -> bool {
        !self.lock.is_free()
    }

    /// Returns a mutable reference to the underlying data.
    #[cfg(not(all(loom, test)))]
    pub fn get_mut(&mut self) -> &mut T {
        self.data.get_mut()
    }
}

impl<T: ?Sized, L: RawLock> fmt::Debug for Mutex<T, L> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Mutex")
            .field("lock", &L::NAME)
            .field("locked", &self.is_locked())
            .finish_non_exhaustive()
    }
}

/// An RAII implementation of a "scoped lock" of a mutex.
///
/// When this structure is dropped (falls out of scope), the lock will be
/// released with the thread local state it was acquired with.
#[must_use = "if unused the Mutex will immediately unlock"]
pub struct MutexGuard<'a, T: ?Sized, L: RawLock> {
    lock: &'a Mutex<T, L>,
    local: &'a mut L::Local,
}

impl<'a, T: ?Sized, L: RawLock> MutexGuard<'a, T, L> {
    fn new(lock: &'a Mutex<T, L>, local: &'a mut L::Local) -> Self {
        Self { lock, local }
    }

    /// Runs `f` with a shared reference to the protected data.
    pub fn with<F, Ret>(&self, f: F) -> Ret
    where
        F: FnOnce(&T) -> Ret,
    {
        // SAFETY: A guard instance holds the lock locked.
        unsafe { self.lock.data.with_unchecked(f) }
    }

    /// Runs `f` with a exclusive reference to the protected data.
    pub fn with_mut<F, Ret>(&mut self, f: F) -> Ret
    where
        F: FnOnce(&mut T) -> Ret,
    {
        // SAFETY: A guard instance holds the lock locked, and the guard is
        // exclusively borrowed.
        unsafe { self.lock.data.with_mut_unchecked(f) }
    }
}

impl<T: ?Sized, L: RawLock> Drop for MutexGuard<'_, T, L> {
    fn drop(&mut self) {
        self.lock.lock.release(self.local);
    }
}

#[cfg(not(all(loom, test)))]
impl<T: ?Sized, L: RawLock> Deref for MutexGuard<'_, T, L> {
    type Target = T;

    /// Dereferences the guard to access the underlying data.
    fn deref(&self) -> &T {
        // SAFETY: A guard instance holds the lock locked.
        unsafe { &*self.lock.data.get() }
    }
}

#[cfg(not(all(loom, test)))]
impl<T: ?Sized, L: RawLock> DerefMut for MutexGuard<'_, T, L> {
    /// Mutably dereferences the guard to access the underlying data.
    fn deref_mut(&mut self) -> &mut T {
        // SAFETY: A guard instance holds the lock locked.
        unsafe { &mut *self.lock.data.get() }
    }
}

impl<T: ?Sized + fmt::Debug, L: RawLock> fmt::Debug for MutexGuard<'_, T, L> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.with(|data| fmt::Debug::fmt(data, f))
    }
}

impl<T: ?Sized + fmt::Display, L: RawLock> fmt::Display for MutexGuard<'_, T, L> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.with(|data| fmt::Display::fmt(data, f))
    }
}

#[cfg(all(not(loom), test))]
mod test {
    use crate::test::config;
    use crate::{Mutex, TasLock};

    type SpinMutex<T> = Mutex<T, TasLock<crate::relax::Spin>>;

    #[derive(Eq, PartialEq, Debug)]
    struct NonCopy(i32);

    #[test]
    fn smoke() {
        let config = config(1);
        let m = SpinMutex::new((), &config);
        let mut local = m.local(&config, 0).unwrap();
        drop(m.lock(&mut local));
        drop(m.lock(&mut local));
    }

    #[test]
    fn test_into_inner() {
        let config = config(1);
        let m = SpinMutex::new(NonCopy(10), &config);
        assert_eq!(m.into_inner(), NonCopy(10));
    }

    #[test]
    fn test_get_mut() {
        let config = config(1);
        let mut m = SpinMutex::new(NonCopy(10), &config);
        *m.get_mut() = NonCopy(20);
        assert_eq!(m.into_inner(), NonCopy(20));
    }

    #[test]
    fn test_guard_debug_display() {
        let config = config(1);
        let m = SpinMutex::new(42, &config);
        let mut local = m.local(&config, 0).unwrap();
        let guard = m.lock(&mut local);
        assert_eq!(format!("{guard:?}"), "42");
        assert_eq!(format!("{guard}"), "42");
    }

    #[test]
    fn test_mutex_debug() {
        let config = config(1);
        let m = SpinMutex::new(42, &config);
        assert_eq!(format!("{m:?}"), "Mutex { lock: \"tas\", locked: false, .. }");
    }

    #[test]
    fn test_read_with_then() {
        let config = config(1);
        let m = SpinMutex::new(vec![1, 2, 3], &config);
        let mut local = m.local(&config, 0).unwrap();
        let sum: i32 = m.read_with_then(&mut local, |data| data.iter().sum());
        assert_eq!(sum, 6);
        assert!(!m.is_locked());
    }
}
