//! Mellor-Crummey and Scott queue lock.
//!
//! The queue is an explicit linked list of per-thread nodes. A waiter swaps
//! its node into the tail, links itself behind its predecessor and spins on
//! its own `waiting` flag, which the predecessor clears on release. Unlike
//! CLH, a thread keeps the same node for its whole lifetime.

use core::marker::PhantomData;
use core::sync::atomic::Ordering::{AcqRel, Acquire, Relaxed, Release};

use crossbeam_utils::CachePadded;

use crate::arena::Arena;
use crate::atomic::AtomicSwap;
use crate::cfg::atomic::{AtomicBool, AtomicU32};
use crate::lock::RawLock;
use crate::relax::{DefaultRelax, Relax};
use crate::{Config, Error};

const NIL: u32 = Arena::<McsNode>::NIL;

/// A queue record owned by one thread.
#[derive(Debug)]
struct McsNode {
    next: AtomicU32,
    waiting: AtomicBool,
}

impl McsNode {
    fn new() -> Self {
        Self { next: AtomicU32::new(NIL), waiting: AtomicBool::new(false) }
    }

    /// Prepares this node to be appended to the queue.
    fn reset(&self) {
        self.next.store(NIL, Relaxed);
        self.waiting.store(true, Relaxed);
    }
}

/// Per-thread state of a [`McsLock`]: the index of the thread's node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct McsLocal {
    node: u32,
}

/// A MCS queue lock.
pub struct McsLock<R = DefaultRelax> {
    tail: CachePadded<AtomicU32>,
    nodes: Arena<McsNode>,
    marker: PhantomData<fn() -> R>,
}

impl<R: Relax> McsLock<R> {
    /// Dequeues `node` if it is the last one, returning `true` on success.
    fn try_unlock(&self, node: u32) -> bool {
        self.tail.compare_exchange(node, NIL, Release, Relaxed).is_ok()
    }
}

impl<R: Relax> RawLock for McsLock<R> {
    type Local = McsLocal;

    const NAME: &'static str = "mcs";

    fn new(config: &Config) -> Self {
        let nodes = Arena::new(config.max_threads(), |_| McsNode::new());
        let tail = CachePadded::new(AtomicU32::new(NIL));
        Self { tail, nodes, marker: PhantomData }
    }

    fn local(&self, _config: &Config, _core: usize) -> Result<McsLocal, Error> {
        let capacity = self.nodes.len();
        let node = self.nodes.claim().ok_or(Error::Capacity { lock: Self::NAME, capacity })?;
        Ok(McsLocal { node })
    }

    fn free_local(&self, local: McsLocal) {
        self.nodes.unclaim(local.node);
    }

    fn acquire(&self, local: &mut McsLocal) {
        let node = self.nodes.get(local.node);
        node.reset();
        let pred = self.tail.swap_value(local.node);
        // If we have a predecessor, complete the link so it will notify us.
        if pred != NIL {
            self.nodes.get(pred).next.store(local.node, Release);
            let mut relax = R::new();
            while node.waiting.load(Acquire) {
                relax.relax();
            }
        }
    }

    fn release(&self, local: &mut McsLocal) {
        let node = self.nodes.get(local.node);
        let mut next = node.next.load(Acquire);
        // If we don't have a known successor currently,
        if next == NIL {
            // and we are the tail, then dequeue and free the lock.
            if self.try_unlock(local.node) {
                return;
            }
            // But if we are not the tail, then we have a pending successor. We
            // must wait for them to finish linking with us.
            let mut relax = R::new();
            loop {
                next = node.next.load(Acquire);
                if next != NIL {
                    break;
                }
                relax.relax();
            }
        }
        self.nodes.get(next).waiting.store(false, Release);
    }

    fn try_acquire(&self, local: &mut McsLocal) -> Result<bool, Error> {
        self.nodes.get(local.node).reset();
        // Publishes the reset to the successor that links behind this node.
        let acquired = self.tail.compare_exchange(NIL, local.node, AcqRel, Relaxed).is_ok();
        Ok(acquired)
    }

    fn is_free(&self) -> bool {
        self.tail.load(Relaxed) == NIL
    }
}

#[cfg(all(not(loom), test))]
mod test {
    use core::sync::atomic::Ordering::Relaxed;
    use std::sync::Arc;
    use std::thread;

    use crate::lock::RawLock;
    use crate::test::{config, tests, QueueTail};
    use crate::Mutex;

    type McsLock = super::McsLock<crate::relax::Yield>;

    impl QueueTail for McsLock {
        fn tail_token(&self) -> u64 {
            u64::from(self.tail.load(Relaxed))
        }
    }

    #[test]
    fn lots_and_lots_lock() {
        tests::lots_and_lots_lock::<McsLock>();
    }

    #[test]
    fn lots_and_lots_try_lock() {
        tests::lots_and_lots_try_lock::<McsLock>();
    }

    #[test]
    fn lots_and_lots_mixed_lock() {
        tests::lots_and_lots_mixed_lock::<McsLock>();
    }

    #[test]
    fn test_try_lock() {
        tests::test_try_lock::<McsLock>();
    }

    #[test]
    fn test_lifecycle() {
        tests::test_lifecycle::<McsLock>();
    }

    #[test]
    fn fifo_order() {
        tests::fifo_order::<McsLock>();
    }

    #[test]
    fn try_acquired_lock_hands_over_to_waiter() {
        let config = config(2);
        let mutex = Arc::new(Mutex::<Vec<usize>, McsLock>::new(Vec::new(), &config));
        let mut local = mutex.local(&config, 0).unwrap();
        let mut guard = mutex.try_lock(&mut local).unwrap().unwrap();
        guard.push(0);
        let tail = mutex.raw().tail_token();
        let c_mutex = Arc::clone(&mutex);
        let mut c_local = mutex.local(&config, 1).unwrap();
        let handle = thread::spawn(move || {
            c_mutex.lock_with_then(&mut c_local, |mut order| order.push(1));
        });
        while mutex.raw().tail_token() == tail {
            thread::yield_now();
        }
        drop(guard);
        handle.join().unwrap();
        assert_eq!(*mutex.lock(&mut local), [0, 1]);
        assert!(mutex.raw().is_free());
    }
}

#[cfg(all(loom, test))]
mod model {
    use crate::loom::models;
    use crate::relax::Yield;

    type McsLock = super::McsLock<Yield>;

    #[test]
    fn lock_join() {
        models::lock_join::<McsLock>();
    }

    #[test]
    fn try_lock_join() {
        models::try_lock_join::<McsLock>();
    }

    #[test]
    fn mixed_lock_join() {
        models::mixed_lock_join::<McsLock>();
    }
}
