//! Spin-based and queue-based mutual exclusion locks for multicore and
//! multi-socket machines, behind one uniform interface.
//!
//! The crate implements nine busy-waiting lock algorithms:
//!
//! - [`TasLock`]: test-and-set;
//! - [`TtasLock`]: test-and-test-and-set with randomized exponential backoff;
//! - [`ArrayLock`]: Anderson's array-based queue lock;
//! - [`ClhLock`]: Craig, Landin and Hagersten queue lock;
//! - [`McsLock`]: Mellor-Crummey and Scott queue lock;
//! - [`TicketLock`]: ticket lock with proportional backoff;
//! - [`HclhLock`]: hierarchical CLH lock;
//! - [`HtLock`]: hierarchical ticket lock;
//! - [`RwTtasLock`]: reader-writer test-and-test-and-set lock.
//!
//! The hierarchical locks let threads of one NUMA cluster pass the lock among
//! themselves before handing it to another cluster, trading global FIFO
//! order for fewer cross-socket cache transfers.
//!
//! ## Use cases
//!
//! [Spinlocks are usually not what you want]. The majority of use cases are well
//! covered by OS-based mutexes like [`std::sync::Mutex`] or [`parking_lot::Mutex`].
//! These locks are meant for threads pinned to their own cores, holding the
//! lock for very short periods, where busy waiting beats rescheduling. That is
//! the setting of lock benchmarks, and of the `stress_test` demo shipped with
//! this crate.
//!
//! ## API
//!
//! Every algorithm implements [`RawLock`]. A lock is shared by all
//! participating threads, and each thread additionally owns the lock's
//! [`RawLock::Local`] state (its queue node, backoff seed or statistics),
//! which every operation borrows mutably. Both are created against a
//! [`Config`], which describes the machine [`Topology`].
//!
//! The lifecycle is driven either directly through [`RawLock`], through the
//! free functions of the uniform interface ([`init_lock_global`],
//! [`init_lock_local`], [`acquire_lock`], [`release_lock`] and friends,
//! including arrays of locks), or through the data-protecting [`Mutex`].
//!
//! ```
//! use std::sync::Arc;
//! use std::thread;
//!
//! use slock::{Config, Mutex, Topology, DefaultLock};
//!
//! let config = Config::builder()
//!     .topology(Topology::uniform(1, 4))
//!     .max_threads(5)
//!     .pin_threads(false)
//!     .build()?;
//! let counter = Arc::new(Mutex::<u64, DefaultLock>::new(0, &config));
//!
//! let handles: Vec<_> = (0..4)
//!     .map(|thread| {
//!         let core = config.topology().core_for(thread);
//!         let mut local = counter.local(&config, core).unwrap();
//!         let counter = Arc::clone(&counter);
//!         thread::spawn(move || {
//!             for _ in 0..100 {
//!                 *counter.lock(&mut local) += 1;
//!             }
//!         })
//!     })
//!     .collect();
//! for handle in handles {
//!     handle.join().unwrap();
//! }
//!
//! let mut local = counter.local(&config, 0)?;
//! assert_eq!(*counter.lock(&mut local), 400);
//! # Ok::<(), slock::Error>(())
//! ```
//!
//! Algorithms can also be picked at run time with [`LockKind`], whose
//! [`visit`](LockKind::visit) method monomorphizes a generic routine for the
//! selected lock.
//!
//! ## Features
//!
//! This crate does not provide any default features. Features that can be enabled
//! are:
//!
//! ### yield
//!
//! By enabling the `yield` feature, instead of busy-waiting during lock
//! acquisitions, locks will call [`std::thread::yield_now`], which
//! cooperatively gives up a timeslice to the OS scheduler. The default
//! strategy calls [`core::hint::spin_loop`]. See the [`relax`] module for the
//! strategies a lock can be instantiated with explicitly.
//!
//! ### tas, ttas, array, clh, mcs, ticket, hclh, htlock, rw_ttas
//!
//! Select the algorithm behind [`DefaultLock`]. When several are enabled, the
//! first one in this list wins. Without any of them, [`DefaultLock`] is
//! [`TicketLock`].
//!
//! ### lock_api
//!
//! This feature implements the [`RawMutex`] trait from the [lock_api] crate
//! for the locks that need no per-thread state between calls, and
//! [`RawRwLock`] for [`RwTtasLock`]. See the [`lock_api`] module.
//!
//! [`std::sync::Mutex`]: https://doc.rust-lang.org/std/sync/struct.Mutex.html
//! [`parking_lot::Mutex`]: https://docs.rs/parking_lot/latest/parking_lot/type.Mutex.html
//! [`RawMutex`]: https://docs.rs/lock_api/latest/lock_api/trait.RawMutex.html
//! [`RawRwLock`]: https://docs.rs/lock_api/latest/lock_api/trait.RawRwLock.html
//! [lock_api]: https://docs.rs/lock_api/latest/lock_api
//! [Spinlocks are usually not what you want]: https://matklad.github.io/2020/01/02/spinlocks-considered-harmful.html

#![warn(missing_docs)]
#![cfg_attr(docsrs, feature(doc_cfg))]

mod arena;
mod array;
mod cfg;
mod clh;
mod config;
mod error;
mod hclh;
mod htlock;
mod interface;
mod kind;
mod lock;
mod mcs;
mod mutex;
mod rw_ttas;
mod tas;
mod ticket;
mod topology;
mod ttas;

pub mod atomic;
pub mod relax;

#[cfg(all(feature = "lock_api", not(loom)))]
#[cfg_attr(docsrs, doc(cfg(feature = "lock_api")))]
pub mod lock_api;

pub use array::{ArrayLocal, ArrayLock};
pub use clh::{ClhLocal, ClhLock};
pub use config::{Config, ConfigBuilder};
pub use error::Error;
pub use hclh::{HclhLocal, HclhLock, QNodeState};
pub use htlock::{HtLocal, HtLock};
pub use interface::{acquire_lock, acquire_read, acquire_trylock, acquire_write, is_free};
pub use interface::{free_lock_array_global, free_lock_array_local};
pub use interface::{free_lock_global, free_lock_local};
pub use interface::{init_lock_array_global, init_lock_array_local};
pub use interface::{init_lock_global, init_lock_local};
pub use interface::{release_lock, release_read, release_write};
pub use interface::{LocalArray, LockArray};
pub use kind::{LockKind, LockVisitor};
pub use lock::RawLock;
pub use mcs::{McsLocal, McsLock};
pub use mutex::{Mutex, MutexGuard};
pub use rw_ttas::{RwTtasLock, RwWord};
pub use tas::TasLock;
pub use ticket::{TicketLocal, TicketLock, TicketWord};
pub use topology::Topology;
pub use ttas::TtasLock;

/// The lock algorithm selected at build time, see the crate features.
#[cfg(feature = "tas")]
pub type DefaultLock = TasLock;

/// The lock algorithm selected at build time, see the crate features.
#[cfg(all(feature = "ttas", not(feature = "tas")))]
pub type DefaultLock = TtasLock;

/// The lock algorithm selected at build time, see the crate features.
#[cfg(all(feature = "array", not(any(feature = "tas", feature = "ttas"))))]
pub type DefaultLock = ArrayLock;

/// The lock algorithm selected at build time, see the crate features.
#[cfg(all(feature = "clh", not(any(feature = "tas", feature = "ttas", feature = "array"))))]
pub type DefaultLock = ClhLock;

/// The lock algorithm selected at build time, see the crate features.
#[cfg(all(
    feature = "mcs",
    not(any(feature = "tas", feature = "ttas", feature = "array", feature = "clh"))
))]
pub type DefaultLock = McsLock;

/// The lock algorithm selected at build time, see the crate features.
#[cfg(all(
    not(any(
        feature = "tas",
        feature = "ttas",
        feature = "array",
        feature = "clh",
        feature = "mcs"
    )),
    any(feature = "ticket", not(any(feature = "hclh", feature = "htlock", feature = "rw_ttas")))
))]
pub type DefaultLock = TicketLock;

/// The lock algorithm selected at build time, see the crate features.
#[cfg(all(
    feature = "hclh",
    not(any(
        feature = "tas",
        feature = "ttas",
        feature = "array",
        feature = "clh",
        feature = "mcs",
        feature = "ticket"
    ))
))]
pub type DefaultLock = HclhLock;

/// The lock algorithm selected at build time, see the crate features.
#[cfg(all(
    feature = "htlock",
    not(any(
        feature = "tas",
        feature = "ttas",
        feature = "array",
        feature = "clh",
        feature = "mcs",
        feature = "ticket",
        feature = "hclh"
    ))
))]
pub type DefaultLock = HtLock;

/// The lock algorithm selected at build time, see the crate features.
#[cfg(all(
    feature = "rw_ttas",
    not(any(
        feature = "tas",
        feature = "ttas",
        feature = "array",
        feature = "clh",
        feature = "mcs",
        feature = "ticket",
        feature = "hclh",
        feature = "htlock"
    ))
))]
pub type DefaultLock = RwTtasLock;

#[cfg(test)]
pub(crate) mod test;

#[cfg(all(loom, test))]
#[cfg(not(tarpaulin))]
pub(crate) mod loom;
