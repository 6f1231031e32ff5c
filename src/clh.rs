//! Craig, Landin and Hagersten queue lock.
//!
//! The queue is implicit: each waiter swaps its node into the tail and spins
//! on the node it got back, which belongs to its predecessor. Releasing
//! clears the holder's own node, and the holder then adopts its predecessor's
//! node for its next acquisition, so nodes migrate backwards through the
//! queue and no allocation ever happens after setup.
//!
//! Nodes live in an [`Arena`] owned by the lock and are handed from thread
//! to thread by index. There is no single-attempt acquisition: a thread that
//! swapped itself into the tail is committed to wait.

use core::marker::PhantomData;
use core::sync::atomic::Ordering::{AcqRel, Acquire, Relaxed, Release};

use crossbeam_utils::CachePadded;

use crate::arena::Arena;
use crate::cfg::atomic::{AtomicBool, AtomicU32};
use crate::lock::{self, RawLock};
use crate::relax::{DefaultRelax, Relax};
use crate::{Config, Error};

/// Index of the node the tail initially points to.
const SENTINEL: u32 = 0;

/// Per-thread state of a [`ClhLock`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClhLocal {
    node: u32,
    pred: u32,
}

/// A CLH queue lock.
pub struct ClhLock<R = DefaultRelax> {
    tail: CachePadded<AtomicU32>,
    nodes: Arena<AtomicBool>,
    marker: PhantomData<fn() -> R>,
}

impl<R: Relax> RawLock for ClhLock<R> {
    type Local = ClhLocal;

    const NAME: &'static str = "clh";

    fn new(config: &Config) -> Self {
        let nodes = Arena::new(config.max_threads() + 1, |_| AtomicBool::new(false));
        nodes.reserve(SENTINEL);
        let tail = CachePadded::new(AtomicU32::new(SENTINEL));
        Self { tail, nodes, marker: PhantomData }
    }

    fn local(&self, _config: &Config, _core: usize) -> Result<ClhLocal, Error> {
        let capacity = self.nodes.len() - 1;
        let node = self.nodes.claim().ok_or(Error::Capacity { lock: Self::NAME, capacity })?;
        Ok(ClhLocal { node, pred: Arena::<AtomicBool>::NIL })
    }

    fn free_local(&self, local: ClhLocal) {
        self.nodes.unclaim(local.node);
    }

    fn acquire(&self, local: &mut ClhLocal) {
        self.nodes.get(local.node).store(true, Relaxed);
        let pred = self.tail.swap(local.node, AcqRel);
        local.pred = pred;
        let mut relax = R::new();
        while self.nodes.get(pred).load(Acquire) {
            relax.relax();
        }
    }

    fn release(&self, local: &mut ClhLocal) {
        self.nodes.get(local.node).store(false, Release);
        // Our node now belongs to the successor, if any. The predecessor's
        // node is no longer referenced by anyone else.
        local.node = local.pred;
    }

    fn try_acquire(&self, _local: &mut ClhLocal) -> Result<bool, Error> {
        Err(lock::unsupported::<Self>("try_acquire"))
    }

    fn is_free(&self) -> bool {
        let tail = self.tail.load(Acquire);
        !self.nodes.get(tail).load(Relaxed)
    }
}

#[cfg(all(not(loom), test))]
mod test {
    use core::sync::atomic::Ordering::Relaxed;

    use super::SENTINEL;
    use crate::lock::RawLock;
    use crate::test::{config, tests, QueueTail};

    type ClhLock = super::ClhLock<crate::relax::Yield>;

    impl QueueTail for ClhLock {
        fn tail_token(&self) -> u64 {
            u64::from(self.tail.load(Relaxed))
        }
    }

    #[test]
    fn lots_and_lots_lock() {
        tests::lots_and_lots_lock::<ClhLock>();
    }

    #[test]
    fn test_try_lock_unsupported() {
        tests::test_try_lock_unsupported::<ClhLock>();
    }

    #[test]
    fn test_lifecycle() {
        tests::test_lifecycle::<ClhLock>();
    }

    #[test]
    fn fifo_order() {
        tests::fifo_order::<ClhLock>();
    }

    #[test]
    fn nodes_migrate_backwards() {
        let config = config(2);
        let lock = ClhLock::new(&config);
        let mut local = lock.local(&config, 0).unwrap();
        let first = local.node;
        lock.acquire(&mut local);
        assert_eq!(local.pred, SENTINEL);
        assert!(!lock.is_free());
        lock.release(&mut local);
        assert_eq!(local.node, SENTINEL);
        assert!(lock.is_free());
        lock.acquire(&mut local);
        assert_eq!(local.pred, first);
        lock.release(&mut local);
        assert_eq!(local.node, first);
    }

    #[test]
    fn capacity_is_enforced() {
        let config = config(1);
        let lock = ClhLock::new(&config);
        let local = lock.local(&config, 0).unwrap();
        assert!(lock.local(&config, 1).is_err());
        lock.free_local(local);
        assert!(lock.local(&config, 1).is_ok());
    }
}

#[cfg(all(loom, test))]
mod model {
    use crate::loom::models;
    use crate::relax::Yield;

    type ClhLock = super::ClhLock<Yield>;

    #[test]
    fn lock_join() {
        models::lock_join::<ClhLock>();
    }
}
