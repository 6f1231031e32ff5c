//! The uniform lock interface.
//!
//! Free functions that drive any [`RawLock`] through the same lifecycle:
//! global initialization once before worker threads are spawned, local
//! initialization once per worker (pinning it to its core), the lock
//! operations, then local and global teardown after the workers joined.

use core::fmt;
use core::ops::{Index, IndexMut};

use tracing::{debug, error, warn};

use crate::lock::RawLock;
use crate::{Config, Error, Topology};

/// The shared view of an array of independent locks.
pub struct LockArray<L> {
    locks: Box<[L]>,
}

impl<L> LockArray<L> {
    /// Number of locks.
    #[must_use]
    pub fn len(&self) -> usize {
        self.locks.len()
    }

    /// Returns `true` if the array holds no lock.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }

    /// Returns the lock at `index`, if any.
    #[must_use]
    pub fn get(&self, index: usize) -> Option<&L> {
        self.locks.get(index)
    }

    /// Iterates over the locks.
    pub fn iter(&self) -> impl Iterator<Item = &L> {
        self.locks.iter()
    }
}

impl<L> Index<usize> for LockArray<L> {
    type Output = L;

    fn index(&self, index: usize) -> &L {
        &self.locks[index]
    }
}

impl<L: RawLock> fmt::Debug for LockArray<L> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LockArray").field("lock", &L::NAME).field("len", &self.len()).finish()
    }
}

/// The per-thread view of a [`LockArray`]: one local state per lock.
pub struct LocalArray<L: RawLock> {
    core: usize,
    locals: Vec<L::Local>,
}

impl<L: RawLock> LocalArray<L> {
    /// Core the owning thread was initialized for.
    #[must_use]
    pub const fn core(&self) -> usize {
        self.core
    }

    /// Number of local states, one per lock of the array.
    #[must_use]
    pub fn len(&self) -> usize {
        self.locals.len()
    }

    /// Returns `true` if the array holds no local state.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.locals.is_empty()
    }

    /// Returns the local state for the lock at `index`, if any.
    pub fn get_mut(&mut self, index: usize) -> Option<&mut L::Local> {
        self.locals.get_mut(index)
    }
}

impl<L: RawLock> Index<usize> for LocalArray<L> {
    type Output = L::Local;

    fn index(&self, index: usize) -> &L::Local {
        &self.locals[index]
    }
}

impl<L: RawLock> IndexMut<usize> for LocalArray<L> {
    fn index_mut(&mut self, index: usize) -> &mut L::Local {
        &mut self.locals[index]
    }
}

impl<L: RawLock> fmt::Debug for LocalArray<L> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocalArray")
            .field("lock", &L::NAME)
            .field("core", &self.core)
            .field("len", &self.len())
            .finish()
    }
}

/// Pins the calling thread to `core` if the configuration asks for it.
///
/// A failure is not fatal, the thread keeps running unpinned.
fn pin(config: &Config, core: usize) {
    if !config.pin_threads() {
        return;
    }
    if let Err(err) = Topology::pin(core) {
        warn!(core, %err, "running unpinned");
    }
}

fn local<L: RawLock>(lock: &L, config: &Config, core: usize) -> Result<L::Local, Error> {
    lock.local(config, core).map_err(|err| {
        error!(lock = L::NAME, core, %err, "local initialization failed");
        err
    })
}

/// Creates the shared state of one lock.
pub fn init_lock_global<L: RawLock>(config: &Config) -> L {
    debug!(lock = L::NAME, max_threads = config.max_threads(), "initializing lock");
    L::new(config)
}

/// Pins the calling thread to `core` and creates its private state for
/// `lock`.
///
/// # Examples
///
/// ```
/// use slock::{Config, TicketLock, Topology};
///
/// let config = Config::builder()
///     .topology(Topology::uniform(1, 2))
///     .pin_threads(false)
///     .build()?;
/// let lock: TicketLock = slock::init_lock_global(&config);
/// let mut local = slock::init_lock_local(0, &lock, &config)?;
///
/// slock::acquire_lock(&mut local, &lock);
/// assert!(!slock::is_free(&lock));
/// slock::release_lock(&mut local, &lock);
///
/// slock::free_lock_local(&lock, local);
/// slock::free_lock_global(lock);
/// # Ok::<(), slock::Error>(())
/// ```
pub fn init_lock_local<L: RawLock>(
    core: usize,
    lock: &L,
    config: &Config,
) -> Result<L::Local, Error> {
    pin(config, core);
    let local = local(lock, config, core)?;
    let cluster = config.topology().cluster_for(core);
    debug!(lock = L::NAME, core, cluster, "initialized local state");
    Ok(local)
}

/// Returns the private state of a thread to `lock`.
pub fn free_lock_local<L: RawLock>(lock: &L, local: L::Local) {
    lock.free_local(local);
    debug!(lock = L::NAME, "freed local state");
}

/// Destroys the shared state of one lock.
///
/// Every thread must have released it and freed its local state.
pub fn free_lock_global<L: RawLock>(lock: L) {
    drop(lock);
    debug!(lock = L::NAME, "freed lock");
}

/// Creates `num_locks` independent locks.
pub fn init_lock_array_global<L: RawLock>(num_locks: usize, config: &Config) -> LockArray<L> {
    debug!(lock = L::NAME, num_locks, max_threads = config.max_threads(), "initializing lock array");
    let locks = (0..num_locks).map(|_| L::new(config)).collect();
    LockArray { locks }
}

/// Pins the calling thread to `core` and creates its private state for
/// every lock of `array`.
///
/// On failure the local states created so far are returned to their locks.
pub fn init_lock_array_local<L: RawLock>(
    core: usize,
    array: &LockArray<L>,
    config: &Config,
) -> Result<LocalArray<L>, Error> {
    pin(config, core);
    let mut locals = Vec::with_capacity(array.len());
    for lock in array.iter() {
        match local(lock, config, core) {
            Ok(local) => locals.push(local),
            Err(err) => {
                array.iter().zip(locals).for_each(|(lock, local)| lock.free_local(local));
                return Err(err);
            }
        }
    }
    let cluster = config.topology().cluster_for(core);
    debug!(lock = L::NAME, core, cluster, num_locks = array.len(), "initialized local array");
    Ok(LocalArray { core, locals })
}

/// Returns the private states of a thread to the locks of `array`.
pub fn free_lock_array_local<L: RawLock>(array: &LockArray<L>, local: LocalArray<L>) {
    let core = local.core;
    array.iter().zip(local.locals).for_each(|(lock, local)| lock.free_local(local));
    debug!(lock = L::NAME, core, "freed local array");
}

/// Destroys an array of locks.
pub fn free_lock_array_global<L: RawLock>(array: LockArray<L>) {
    let num_locks = array.len();
    drop(array);
    debug!(lock = L::NAME, num_locks, "freed lock array");
}

/// Acquires `lock` exclusively.
#[inline]
pub fn acquire_lock<L: RawLock>(local: &mut L::Local, lock: &L) {
    lock.acquire(local);
}

/// Releases an exclusive acquisition of `lock`.
#[inline]
pub fn release_lock<L: RawLock>(local: &mut L::Local, lock: &L) {
    lock.release(local);
}

/// Acquires `lock` in shared mode, exclusively for non reader-writer locks.
#[inline]
pub fn acquire_read<L: RawLock>(local: &mut L::Local, lock: &L) {
    lock.acquire_read(local);
}

/// Acquires `lock` in exclusive mode.
#[inline]
pub fn acquire_write<L: RawLock>(local: &mut L::Local, lock: &L) {
    lock.acquire_write(local);
}

/// Releases a shared acquisition of `lock`.
#[inline]
pub fn release_read<L: RawLock>(local: &mut L::Local, lock: &L) {
    lock.release_read(local);
}

/// Releases an exclusive acquisition made with [`acquire_write`].
#[inline]
pub fn release_write<L: RawLock>(local: &mut L::Local, lock: &L) {
    lock.release_write(local);
}

/// Attempts to acquire `lock` without waiting.
///
/// Fails with [`Error::Unsupported`] for locks with no single-attempt
/// acquisition.
#[inline]
pub fn acquire_trylock<L: RawLock>(local: &mut L::Local, lock: &L) -> Result<bool, Error> {
    lock.try_acquire(local)
}

/// Returns `true` if nobody holds `lock`. The answer may already be stale.
#[inline]
pub fn is_free<L: RawLock>(lock: &L) -> bool {
    lock.is_free()
}

#[cfg(all(not(loom), test))]
mod test {
    use super::*;
    use crate::test::config;
    use crate::{ClhLock, McsLock, TasLock};

    #[test]
    fn array_lifecycle() {
        let config = config(2);
        let array = init_lock_array_global::<McsLock>(3, &config);
        assert_eq!(array.len(), 3);
        let mut locals = init_lock_array_local(1, &array, &config).unwrap();
        assert_eq!(locals.core(), 1);
        assert_eq!(locals.len(), 3);
        for index in 0..array.len() {
            acquire_lock(&mut locals[index], &array[index]);
            assert!(!is_free(&array[index]));
            release_lock(&mut locals[index], &array[index]);
        }
        assert!(array.iter().all(is_free));
        free_lock_array_local(&array, locals);
        free_lock_array_global(array);
    }

    #[test]
    fn failed_array_local_init_frees_claimed_nodes() {
        let config = config(1);
        let array = init_lock_array_global::<ClhLock>(2, &config);
        let held = init_lock_local(0, &array[1], &config).unwrap();
        let err = init_lock_array_local(1, &array, &config).unwrap_err();
        assert_eq!(err, Error::Capacity { lock: "clh", capacity: 1 });
        // The node claimed on the first lock went back to it.
        assert!(init_lock_local(1, &array[0], &config).is_ok());
        free_lock_local(&array[1], held);
    }

    #[test]
    fn read_write_on_exclusive_lock() {
        let config = config(1);
        let lock: TasLock = init_lock_global(&config);
        let mut local = init_lock_local(0, &lock, &config).unwrap();
        acquire_read(&mut local, &lock);
        assert_eq!(acquire_trylock(&mut local, &lock), Ok(false));
        release_read(&mut local, &lock);
        acquire_write(&mut local, &lock);
        assert!(!is_free(&lock));
        release_write(&mut local, &lock);
        assert_eq!(acquire_trylock(&mut local, &lock), Ok(true));
        release_lock(&mut local, &lock);
        free_lock_global(lock);
    }

    #[test]
    fn try_lock_reports_unsupported() {
        let config = config(1);
        let lock: ClhLock = init_lock_global(&config);
        let mut local = init_lock_local(0, &lock, &config).unwrap();
        let err = Error::Unsupported { lock: "clh", operation: "try_acquire" };
        assert_eq!(acquire_trylock(&mut local, &lock), Err(err));
        assert!(is_free(&lock));
    }
}
