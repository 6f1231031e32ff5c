use crate::{Config, Error};

/// The uniform contract shared by every lock algorithm of this crate.
///
/// A `RawLock` value is the shared state of one lock: it is created once,
/// shared by all participating threads and dropped after every thread has
/// finished with it. Each participating thread additionally owns a
/// [`Local`] value with its private state (queue node index, backoff seed,
/// statistics, ...), created by [`local`] and passed by exclusive reference
/// to every operation.
///
/// A thread must use its own `Local` value with the lock instance that
/// created it, and must pair every successful acquisition with exactly one
/// release of the same kind. Implementations may misbehave (spin forever,
/// grant the lock to two threads) when those rules are broken, but never
/// cause undefined behavior in safe code.
///
/// [`Local`]: RawLock::Local
/// [`local`]: RawLock::local
pub trait RawLock: Sized + Send + Sync {
    /// Per-thread state used to operate on this lock.
    type Local: Send;

    /// Short lowercase name of the algorithm.
    const NAME: &'static str;

    /// Creates the shared state of a free lock.
    fn new(config: &Config) -> Self;

    /// Creates the private state of a thread running on `core`.
    ///
    /// Fails with [`Error::Capacity`] if the lock already serves as many
    /// participants as it was created for.
    fn local(&self, config: &Config, core: usize) -> Result<Self::Local, Error>;

    /// Returns the private state of a thread to the lock.
    ///
    /// Must not be called while the thread holds the lock.
    fn free_local(&self, local: Self::Local) {
        drop(local);
    }

    /// Acquires the lock, busy-waiting until it is granted.
    fn acquire(&self, local: &mut Self::Local);

    /// Releases the lock.
    fn release(&self, local: &mut Self::Local);

    /// Attempts to acquire the lock without waiting.
    ///
    /// Returns `Ok(false)` if the lock is held, leaving its state untouched.
    /// Algorithms with no native single-attempt acquisition return
    /// [`Error::Unsupported`].
    fn try_acquire(&self, local: &mut Self::Local) -> Result<bool, Error>;

    /// Acquires the lock in shared mode.
    ///
    /// Exclusive locks treat it as [`acquire`](RawLock::acquire).
    fn acquire_read(&self, local: &mut Self::Local) {
        self.acquire(local);
    }

    /// Releases a shared acquisition.
    fn release_read(&self, local: &mut Self::Local) {
        self.release(local);
    }

    /// Acquires the lock in exclusive mode.
    fn acquire_write(&self, local: &mut Self::Local) {
        self.acquire(local);
    }

    /// Releases an exclusive acquisition.
    fn release_write(&self, local: &mut Self::Local) {
        self.release(local);
    }

    /// Returns `true` if nobody holds the lock.
    ///
    /// The answer may be stale by the time it is returned.
    fn is_free(&self) -> bool;
}

/// Builds the error returned by locks that cannot `try_acquire`.
pub(crate) const fn unsupported<L: RawLock>(operation: &'static str) -> Error {
    Error::Unsupported { lock: L::NAME, operation }
}
