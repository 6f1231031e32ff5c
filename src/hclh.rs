//! Hierarchical CLH queue lock.
//!
//! Every cluster has its own CLH style queue, and one global queue orders
//! clusters. A thread enqueues on its cluster's queue. If its predecessor
//! belongs to the same cluster and has not been spliced into the global
//! queue yet, the thread simply waits for that predecessor, as in CLH.
//! Otherwise it becomes the cluster master: it splices the whole local queue
//! into the global queue in one compare-and-swap, marks the local tail as
//! spliced, and waits on its global predecessor.
//!
//! Threads of one cluster therefore overtake waiters of other clusters for as
//! long as they keep joining the local queue before it is spliced, trading
//! global FIFO order for fewer cross-socket cache transfers.
//!
//! Each node is a single atomic word, see [`QNodeState`]. A node moves
//! through these states:
//!
//! 1. owned: `successor_must_wait` set, stamped with the owner's cluster;
//! 2. enqueued on the local queue, then possibly `tail_when_spliced` once a
//!    master splices the local queue up to it;
//! 3. released: `successor_must_wait` cleared, `tail_when_spliced` kept so a
//!    local successor knows it must splice;
//! 4. adopted by the successor on release, which stamps it back to state 1
//!    with its own cluster.
//!
//! The cluster stamp is what lets a thread that finds a recycled node of
//! another cluster at the tail of its local queue detect that it must become
//! master.

use core::marker::PhantomData;
use core::sync::atomic::Ordering::{AcqRel, Acquire, Relaxed, Release};

use crossbeam_utils::CachePadded;

use crate::arena::Arena;
use crate::cfg::atomic::AtomicU32;
use crate::lock::{self, RawLock};
use crate::relax::{DefaultRelax, Relax};
use crate::{Config, Error};

const NIL: u32 = Arena::<AtomicU32>::NIL;

/// Index of the node the global queue initially points to.
const SENTINEL: u32 = 0;

/// The state word of a HCLH queue node.
///
/// Byte 0 holds `successor_must_wait`, byte 1 `tail_when_spliced` and byte 2
/// the cluster identifier, so every transition is a single atomic update of
/// one `u32`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QNodeState(u32);

impl QNodeState {
    const MUST_WAIT: u32 = 1;
    const SPLICED: u32 = 1 << 8;
    const CLUSTER_SHIFT: u32 = 16;

    /// Packs the node fields.
    #[must_use]
    pub const fn new(cluster: u8, must_wait: bool, spliced: bool) -> Self {
        let mut word = (cluster as u32) << Self::CLUSTER_SHIFT;
        if must_wait {
            word |= Self::MUST_WAIT;
        }
        if spliced {
            word |= Self::SPLICED;
        }
        Self(word)
    }

    /// Whether the thread queued behind this node must keep waiting.
    #[must_use]
    pub const fn successor_must_wait(self) -> bool {
        self.0 & Self::MUST_WAIT != 0
    }

    /// Whether this node was the local tail when its queue got spliced.
    #[must_use]
    pub const fn tail_when_spliced(self) -> bool {
        self.0 & Self::SPLICED != 0
    }

    /// Cluster of the thread that last owned this node.
    #[must_use]
    pub const fn cluster(self) -> u8 {
        (self.0 >> Self::CLUSTER_SHIFT) as u8
    }

    /// The raw word.
    #[must_use]
    pub const fn into_raw(self) -> u32 {
        self.0
    }
}

/// Per-thread state of a [`HclhLock`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HclhLocal {
    node: u32,
    pred: u32,
    cluster: u8,
}

impl HclhLocal {
    /// Cluster the thread queues in.
    #[must_use]
    pub const fn cluster(&self) -> u8 {
        self.cluster
    }
}

/// A hierarchical CLH queue lock.
pub struct HclhLock<R = DefaultRelax> {
    global: CachePadded<AtomicU32>,
    local_queues: Box<[CachePadded<AtomicU32>]>,
    nodes: Arena<AtomicU32>,
    marker: PhantomData<fn() -> R>,
}

impl<R: Relax> HclhLock<R> {
    fn state(&self, node: u32) -> QNodeState {
        QNodeState(self.nodes.get(node).load(Acquire))
    }

    /// Waits on a local predecessor until either the lock is passed within
    /// the cluster, returning `true`, or this thread must splice the local
    /// queue, returning `false`.
    fn wait_for_grant_or_cluster_master(&self, pred: u32, cluster: u8) -> bool {
        let mut relax = R::new();
        loop {
            let state = self.state(pred);
            if state.tail_when_spliced() || state.cluster() != cluster {
                return false;
            }
            if !state.successor_must_wait() {
                return true;
            }
            relax.relax();
        }
    }

    /// Appends the local queue up to its current tail to the global queue,
    /// returning the global predecessor.
    fn splice(&self, queue: &AtomicU32) -> u32 {
        let mut relax = R::new();
        let (pred, local_tail) = loop {
            let pred = self.global.load(Acquire);
            let local_tail = queue.load(Acquire);
            if self.global.compare_exchange(pred, local_tail, AcqRel, Relaxed).is_ok() {
                break (pred, local_tail);
            }
            relax.relax();
        };
        self.nodes.get(local_tail).fetch_or(QNodeState::SPLICED, Release);
        pred
    }
}

impl<R: Relax> RawLock for HclhLock<R> {
    type Local = HclhLocal;

    const NAME: &'static str = "hclh";

    fn new(config: &Config) -> Self {
        let clusters = config.topology().clusters();
        // The sentinel belongs to no cluster.
        let sentinel_cluster = u8::try_from(clusters + 1).unwrap_or(u8::MAX);
        let sentinel = QNodeState::new(sentinel_cluster, false, false).into_raw();
        let nodes = Arena::new(config.max_threads() + 1, |_| AtomicU32::new(sentinel));
        nodes.reserve(SENTINEL);
        let local_queues = (0..clusters).map(|_| CachePadded::new(AtomicU32::new(NIL))).collect();
        let global = CachePadded::new(AtomicU32::new(SENTINEL));
        Self { global, local_queues, nodes, marker: PhantomData }
    }

    fn local(&self, config: &Config, core: usize) -> Result<HclhLocal, Error> {
        let cluster = config.topology().cluster_for(core) % self.local_queues.len();
        let cluster = u8::try_from(cluster).map_err(|_| Error::InvalidConfig("too many clusters"))?;
        let capacity = self.nodes.len() - 1;
        let node = self.nodes.claim().ok_or(Error::Capacity { lock: Self::NAME, capacity })?;
        self.nodes.get(node).store(QNodeState::new(cluster, true, false).into_raw(), Relaxed);
        Ok(HclhLocal { node, pred: NIL, cluster })
    }

    fn free_local(&self, local: HclhLocal) {
        self.nodes.unclaim(local.node);
    }

    fn acquire(&self, local: &mut HclhLocal) {
        let queue = &self.local_queues[usize::from(local.cluster)];
        let pred = queue.swap(local.node, AcqRel);
        if pred != NIL && self.wait_for_grant_or_cluster_master(pred, local.cluster) {
            local.pred = pred;
            return;
        }
        let pred = self.splice(queue);
        let mut relax = R::new();
        while self.state(pred).successor_must_wait() {
            relax.relax();
        }
        local.pred = pred;
    }

    fn release(&self, local: &mut HclhLocal) {
        // Keep `tail_when_spliced`, our local successor must see it.
        self.nodes.get(local.node).fetch_and(!QNodeState::MUST_WAIT, Release);
        let fresh = QNodeState::new(local.cluster, true, false).into_raw();
        self.nodes.get(local.pred).store(fresh, Release);
        local.node = local.pred;
    }

    fn try_acquire(&self, _local: &mut HclhLocal) -> Result<bool, Error> {
        Err(lock::unsupported::<Self>("try_acquire"))
    }

    fn is_free(&self) -> bool {
        let tail = self.global.load(Acquire);
        !self.state(tail).successor_must_wait()
    }
}

#[cfg(all(not(loom), test))]
mod test {
    use core::sync::atomic::Ordering::Relaxed;
    use std::sync::Arc;
    use std::thread;

    use super::{QNodeState, SENTINEL};
    use crate::lock::RawLock;
    use crate::test::tests;
    use crate::{Config, Mutex, Topology};

    type HclhLock = super::HclhLock<crate::relax::Yield>;

    fn two_clusters() -> Config {
        let topology = Topology::uniform(2, 2);
        Config::builder().topology(topology).pin_threads(false).build().unwrap()
    }

    #[test]
    fn lots_and_lots_lock() {
        tests::lots_and_lots_lock::<HclhLock>();
    }

    #[test]
    fn lots_and_lots_lock_clusters() {
        tests::lots_and_lots_lock_with::<HclhLock>(&two_clusters());
    }

    #[test]
    fn test_try_lock_unsupported() {
        tests::test_try_lock_unsupported::<HclhLock>();
    }

    #[test]
    fn test_lifecycle() {
        tests::test_lifecycle::<HclhLock>();
    }

    #[test]
    fn state_accessors() {
        let state = QNodeState::new(3, true, false);
        assert!(state.successor_must_wait());
        assert!(!state.tail_when_spliced());
        assert_eq!(state.cluster(), 3);
        let state = QNodeState::new(255, false, true);
        assert!(!state.successor_must_wait());
        assert!(state.tail_when_spliced());
        assert_eq!(state.cluster(), 255);
    }

    #[test]
    fn first_acquire_splices_into_global_queue() {
        let config = two_clusters();
        let lock = HclhLock::new(&config);
        assert!(lock.is_free());
        let mut local = lock.local(&config, 2).unwrap();
        assert_eq!(local.cluster(), 1);
        lock.acquire(&mut local);
        assert_eq!(local.pred, SENTINEL);
        assert!(lock.state(local.node).tail_when_spliced());
        assert!(!lock.is_free());
        lock.release(&mut local);
        assert!(lock.is_free());
        assert_eq!(local.node, SENTINEL);
        assert_eq!(lock.state(SENTINEL), QNodeState::new(1, true, false));
    }

    #[test]
    fn same_cluster_successor_takes_local_grant() {
        let config = two_clusters();
        let lock = HclhLock::new(&config);
        let mut first = lock.local(&config, 0).unwrap();
        let mut second = lock.local(&config, 1).unwrap();
        // Reacquiring after a splice needs a new splice, the predecessor
        // node was the spliced tail.
        lock.acquire(&mut first);
        lock.release(&mut first);
        lock.acquire(&mut second);
        assert!(lock.state(second.node).tail_when_spliced());
        lock.release(&mut second);
        assert!(lock.is_free());
    }

    /// Spawns a thread on `core` that records `tag` once it gets the lock,
    /// and waits until it has spliced itself into the global queue.
    fn spawn_spliced_waiter(
        mutex: &Arc<Mutex<Vec<usize>, HclhLock>>,
        config: &Config,
        core: usize,
        tag: usize,
    ) -> thread::JoinHandle<()> {
        let global = mutex.raw().global.load(Relaxed);
        let c_mutex = Arc::clone(mutex);
        let mut local = mutex.local(config, core).unwrap();
        let handle = thread::spawn(move || {
            c_mutex.lock_with_then(&mut local, |mut order| order.push(tag));
        });
        while mutex.raw().global.load(Relaxed) == global {
            thread::yield_now();
        }
        handle
    }

    #[test]
    fn spliced_foreign_waiter_is_not_overtaken() {
        let config = Config::builder()
            .topology(Topology::uniform(2, 4))
            .pin_threads(false)
            .build()
            .unwrap();
        let mutex = Arc::new(Mutex::<Vec<usize>, HclhLock>::new(Vec::new(), &config));
        let mut local = mutex.local(&config, 0).unwrap();
        let mut guard = mutex.lock(&mut local);
        guard.push(0);

        // Every waiter finds a spliced predecessor, so each one splices
        // behind whoever is already in the global queue.
        let mut handles = Vec::new();
        handles.push(spawn_spliced_waiter(&mutex, &config, 1, 0));
        handles.push(spawn_spliced_waiter(&mutex, &config, 2, 0));
        handles.push(spawn_spliced_waiter(&mutex, &config, 4, 1));
        handles.push(spawn_spliced_waiter(&mutex, &config, 3, 0));
        drop(guard);

        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(*mutex.lock(&mut local), [0, 0, 0, 1, 0]);
        assert!(mutex.raw().is_free());
    }
}

#[cfg(all(loom, test))]
mod model {
    use crate::loom::models;
    use crate::relax::Yield;

    type HclhLock = super::HclhLock<Yield>;

    #[test]
    fn lock_join() {
        models::lock_join::<HclhLock>();
    }

    #[test]
    fn lock_join_clusters() {
        models::lock_join_clusters::<HclhLock>();
    }
}
