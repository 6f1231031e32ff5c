//! Hierarchical ticket lock.
//!
//! One global [`TicketLock`] orders clusters, and every cluster has a local
//! ticket counter pair. The first thread of a cluster to find no local
//! ticket left acquires the global lock and then donates a batch of local
//! tickets to its cluster. While the cluster holds the global lock, its
//! threads pass the lock among themselves by local ticket, without touching
//! the global lock. The batch is returned, and the global lock released,
//! once it is used up or no local thread is waiting.
//!
//! Local counters count down. `nxt` is the next local ticket to hand out and
//! `cur` the ticket being served, `batch` meaning "the thread that took the
//! global lock" and `batch + 1` meaning "no batch open". A thread drawing
//! `-1` is the one that must go global: it waits for the previous batch to
//! close, opens a new one and takes the global lock. Threads drawing lower
//! values back off, wait on plain loads until the batch is open and draw
//! again.

use core::sync::atomic::Ordering::{Acquire, Relaxed, Release};

use crossbeam_utils::CachePadded;

use crate::atomic::{self, AtomicCounter, AtomicSwap};
use crate::cfg::atomic::AtomicI32;
use crate::lock::RawLock;
use crate::relax::{DefaultRelax, Relax};
use crate::ticket::{TicketLocal, TicketLock};
use crate::{Config, Error};

/// Cycles to wait per position behind the thread going global.
const RETRY_CYCLES: u64 = 120;

/// Local ticket counters of one cluster.
#[derive(Debug)]
struct ClusterTickets {
    nxt: AtomicI32,
    cur: AtomicI32,
}

/// Per-thread state of a [`HtLock`].
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct HtLocal {
    cluster: usize,
    global: TicketLocal,
    acquires: u64,
    global_acquires: u64,
    early_closes: u64,
    via_try: bool,
}

impl HtLocal {
    /// Cluster the thread draws local tickets from.
    #[must_use]
    pub const fn cluster(&self) -> usize {
        self.cluster
    }

    /// Number of acquisitions, blocking or not.
    #[must_use]
    pub const fn acquires(&self) -> u64 {
        self.acquires
    }

    /// Number of acquisitions that took the global lock.
    #[must_use]
    pub const fn global_acquires(&self) -> u64 {
        self.global_acquires
    }

    /// Number of batches this thread closed before they were used up,
    /// because no other thread of the cluster had drawn a local ticket.
    #[must_use]
    pub const fn early_closes(&self) -> u64 {
        self.early_closes
    }
}

/// A hierarchical ticket lock.
pub struct HtLock<R = DefaultRelax> {
    global: TicketLock<R>,
    clusters: Box<[CachePadded<ClusterTickets>]>,
    batch: i32,
}

impl<R> HtLock<R> {
    /// Number of local tickets donated per global acquisition.
    pub const fn batch_size(&self) -> i32 {
        self.batch
    }

    /// Value of `cur` while the cluster has no open batch.
    const fn idle(&self) -> i32 {
        self.batch + 1
    }
}

impl<R: Relax> HtLock<R> {
    /// Waits for the previous batch of the cluster to close, opens a new
    /// one and takes the global lock on behalf of the cluster.
    fn acquire_global(&self, tickets: &ClusterTickets, local: &mut HtLocal) {
        let mut relax = R::new();
        while tickets.cur.load(Acquire) != self.idle() {
            relax.relax();
        }
        tickets.cur.store(self.batch, Relaxed);
        tickets.nxt.store(self.batch, Release);
        self.global.lock(&mut local.global);
        local.global_acquires += 1;
    }
}

impl<R: Relax> RawLock for HtLock<R> {
    type Local = HtLocal;

    const NAME: &'static str = "htlock";

    fn new(config: &Config) -> Self {
        let batch = i32::try_from(config.batch_size()).unwrap_or(i32::MAX - 1);
        let clusters = (0..config.topology().clusters())
            .map(|_| {
                let nxt = AtomicI32::new(0);
                let cur = AtomicI32::new(batch + 1);
                CachePadded::new(ClusterTickets { nxt, cur })
            })
            .collect();
        Self { global: TicketLock::free(), clusters, batch }
    }

    fn local(&self, config: &Config, core: usize) -> Result<HtLocal, Error> {
        let cluster = config.topology().cluster_for(core) % self.clusters.len();
        Ok(HtLocal { cluster, ..HtLocal::default() })
    }

    fn acquire(&self, local: &mut HtLocal) {
        let tickets = &self.clusters[local.cluster];
        local.acquires += 1;
        let mut relax = R::new();
        loop {
            let ticket = tickets.nxt.daf();
            if ticket >= 0 {
                while tickets.cur.load(Acquire) != ticket {
                    relax.relax();
                }
                return;
            }
            if ticket == -1 {
                self.acquire_global(tickets, local);
                return;
            }
            // Someone else is going global, retry once it opened a batch.
            atomic::wait_cycles(u64::from(ticket.unsigned_abs()) * RETRY_CYCLES);
            while tickets.nxt.load(Relaxed) < 0 {
                relax.relax();
            }
        }
    }

    fn release(&self, local: &mut HtLocal) {
        if local.via_try {
            local.via_try = false;
            self.global.unlock();
            return;
        }
        let tickets = &self.clusters[local.cluster];
        let cur = tickets.cur.load(Relaxed);
        // Closes the batch if nobody drew the next local ticket.
        let nxt = tickets.nxt.cas(cur, 0);
        if cur == 0 || cur == nxt {
            if cur != 0 {
                local.early_closes += 1;
            }
            tickets.cur.store(self.idle(), Release);
            self.global.unlock();
        } else {
            tickets.cur.store(cur - 1, Release);
        }
    }

    fn try_acquire(&self, local: &mut HtLocal) -> Result<bool, Error> {
        let acquired = self.global.try_lock(&mut local.global);
        if acquired {
            local.via_try = true;
            local.acquires += 1;
            local.global_acquires += 1;
        }
        Ok(acquired)
    }

    fn is_free(&self) -> bool {
        self.global.is_free()
    }
}

#[cfg(all(not(loom), test))]
mod test {
    use core::sync::atomic::Ordering::Relaxed;
    use std::sync::Arc;
    use std::thread;

    use super::HtLocal;
    use crate::lock::RawLock;
    use crate::test::tests;
    use crate::{Config, Mutex, Topology};

    type HtLock = super::HtLock<crate::relax::Yield>;

    fn two_clusters(batch_size: u32) -> Config {
        let topology = Topology::uniform(2, 4);
        let builder = Config::builder().topology(topology).batch_size(batch_size);
        builder.pin_threads(false).build().unwrap()
    }

    #[test]
    fn lots_and_lots_lock() {
        tests::lots_and_lots_lock::<HtLock>();
    }

    #[test]
    fn lots_and_lots_lock_clusters() {
        tests::lots_and_lots_lock_with::<HtLock>(&two_clusters(4));
    }

    #[test]
    fn lots_and_lots_try_lock() {
        tests::lots_and_lots_try_lock::<HtLock>();
    }

    #[test]
    fn lots_and_lots_mixed_lock() {
        tests::lots_and_lots_mixed_lock::<HtLock>();
    }

    #[test]
    fn test_try_lock() {
        tests::test_try_lock::<HtLock>();
    }

    #[test]
    fn test_lifecycle() {
        tests::test_lifecycle::<HtLock>();
    }

    #[test]
    fn uncontended_acquisitions_go_global() {
        let config = two_clusters(8);
        let lock = HtLock::new(&config);
        let mut local = lock.local(&config, 5).unwrap();
        assert_eq!(local.cluster(), 1);
        for _ in 0..3 {
            lock.acquire(&mut local);
            assert!(!lock.is_free());
            lock.release(&mut local);
        }
        assert!(lock.is_free());
        assert_eq!(local.acquires(), 3);
        assert_eq!(local.global_acquires(), 3);
        assert_eq!(local.early_closes(), 3);
    }

    /// Spawns a thread on `core` that records `tag` once it gets the lock.
    fn spawn_waiter(
        mutex: &Arc<Mutex<Vec<usize>, HtLock>>,
        config: &Config,
        core: usize,
        tag: usize,
    ) -> thread::JoinHandle<HtLocal> {
        let mutex = Arc::clone(mutex);
        let mut local = mutex.local(config, core).unwrap();
        thread::spawn(move || {
            mutex.lock_with_then(&mut local, |mut order| order.push(tag));
            local
        })
    }

    fn wait_until(f: impl Fn() -> bool) {
        while !f() {
            thread::yield_now();
        }
    }

    #[test]
    fn local_waiters_overtake_foreign_waiter() {
        let config = two_clusters(8);
        let mutex = Arc::new(Mutex::<Vec<usize>, HtLock>::new(Vec::new(), &config));
        let lock = mutex.raw();
        let nxt = |cluster: usize| lock.clusters[cluster].nxt.load(Relaxed);

        let mut local = mutex.local(&config, 0).unwrap();
        let guard = mutex.lock(&mut local);
        let mut handles = Vec::new();
        for core in 1..4 {
            handles.push(spawn_waiter(&mutex, &config, core, 0));
            wait_until(|| nxt(0) == 8 - core as i32);
        }
        handles.push(spawn_waiter(&mutex, &config, 4, 1));
        wait_until(|| lock.global.word().tail() == 2);
        drop(guard);

        let locals: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        let global: u64 = locals.iter().map(HtLocal::global_acquires).sum();
        assert_eq!(global, 1);
        assert_eq!(local.global_acquires(), 1);
        let mut local = mutex.local(&config, 0).unwrap();
        assert_eq!(*mutex.lock(&mut local), [0, 0, 0, 1]);
    }

    #[test]
    fn overtaking_is_bounded_by_batch_size() {
        let config = two_clusters(2);
        let mutex = Arc::new(Mutex::<Vec<usize>, HtLock>::new(Vec::new(), &config));
        let lock = mutex.raw();
        let nxt = |cluster: usize| lock.clusters[cluster].nxt.load(Relaxed);

        let mut local = mutex.local(&config, 0).unwrap();
        let guard = mutex.lock(&mut local);
        let mut handles = Vec::new();
        handles.push(spawn_waiter(&mutex, &config, 1, 0));
        wait_until(|| nxt(0) == 1);
        handles.push(spawn_waiter(&mutex, &config, 2, 0));
        wait_until(|| nxt(0) == 0);
        handles.push(spawn_waiter(&mutex, &config, 4, 1));
        wait_until(|| lock.global.word().tail() == 2);
        // The batch of cluster 0 is exhausted, this one has to go global
        // after the waiter of cluster 1.
        handles.push(spawn_waiter(&mutex, &config, 3, 0));
        wait_until(|| nxt(0) == -1);
        drop(guard);

        let locals: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        let global: u64 = locals.iter().map(HtLocal::global_acquires).sum();
        assert_eq!(global, 2);
        // Cluster 0 used up its first batch, the other two had nobody left
        // to serve.
        assert_eq!(local.early_closes(), 0);
        let early: u64 = locals.iter().map(HtLocal::early_closes).sum();
        assert_eq!(early, 2);
        let mut local = mutex.local(&config, 0).unwrap();
        assert_eq!(*mutex.lock(&mut local), [0, 0, 1, 0]);
    }

    #[test]
    fn try_acquire_bypasses_local_tickets() {
        let config = two_clusters(8);
        let lock = HtLock::new(&config);
        let mut first = lock.local(&config, 0).unwrap();
        let mut second = lock.local(&config, 1).unwrap();
        assert!(lock.try_acquire(&mut first).unwrap());
        assert!(!lock.try_acquire(&mut second).unwrap());
        assert_eq!(lock.clusters[0].nxt.load(Relaxed), 0);
        lock.release(&mut first);
        assert!(lock.is_free());
        lock.acquire(&mut second);
        lock.release(&mut second);
        assert!(lock.is_free());
        assert_eq!(second.global_acquires(), 1);
    }
}

#[cfg(all(loom, test))]
mod model {
    use crate::loom::models;
    use crate::relax::Yield;

    type HtLock = super::HtLock<Yield>;

    #[test]
    fn lock_join() {
        models::lock_join::<HtLock>();
    }

    #[test]
    fn lock_join_clusters() {
        models::lock_join_clusters::<HtLock>();
    }

    #[test]
    fn mixed_lock_join() {
        models::mixed_lock_join::<HtLock>();
    }
}
