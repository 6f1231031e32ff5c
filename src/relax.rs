// Modified version of relax.rs from spin-rs to support Loom yielding and
// exponential backoff.
//
// Original file at its most recent change (at the time of writing):
// https://github.com/mvdnes/spin-rs/blob/5860ee114094cf200b97348ff332155fbd7159b4/src/relax.rs
//
// Copyright (c) 2014 Mathijs van de Nes
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Strategies that determine the behaviour of locks when encountering contention.
//!
//! Every lock in this crate is generic over a [`Relax`] strategy, run once
//! per iteration of its busy-wait loops. [`DefaultRelax`] is [`Spin`], or
//! [`Yield`] when the `yield` feature is enabled.
//!
//! [`RandomBackoff`] is different: it is per-thread state owned by the
//! backoff based locks, run after a failed atomic attempt rather than while
//! waiting for the lock word to change.

use crate::atomic;
use crate::cfg::{hint, thread};

/// The relax strategy used by the lock type aliases of this crate.
#[cfg(not(feature = "yield"))]
pub type DefaultRelax = Spin;

/// The relax strategy used by the lock type aliases of this crate.
#[cfg(feature = "yield")]
pub type DefaultRelax = Yield;

/// A trait implemented by spinning relax strategies.
pub trait Relax {
    /// Initialize the state for the relaxing operation, if any.
    fn new() -> Self;

    /// Perform the relaxing operation during a period of contention.
    fn relax(&mut self);
}

/// Spins with [`core::hint::spin_loop`] between two reads of the lock word.
///
/// Busy-waiting keeps the waiter on its core, which is what pinned benchmark
/// threads want. On an oversubscribed machine it can starve the holder of
/// CPU time, see [priority inversion], and [`Yield`] is the better choice.
///
/// [priority inversion]: https://matklad.github.io/2020/01/02/spinlocks-considered-harmful.html
#[derive(Debug)]
pub struct Spin;

impl Relax for Spin {
    #[inline(always)]
    fn new() -> Self {
        Self
    }

    #[inline(always)]
    fn relax(&mut self) {
        hint::spin_loop();
    }
}

/// Gives the rest of the time slice back to the OS scheduler.
///
/// Under Loom this is Loom's `yield_now`, which lets the model run another
/// thread. Every model in this crate waits with it.
#[derive(Debug)]
pub struct Yield;

impl Relax for Yield {
    #[inline(always)]
    fn new() -> Self {
        Self
    }

    #[inline]
    fn relax(&mut self) {
        thread::yield_now();
    }
}

/// Re-reads the lock word immediately, with no spin hint.
///
/// A fallback for targets where the spin hint misbehaves. Prefer [`Spin`].
#[derive(Debug)]
pub struct Loop;

impl Relax for Loop {
    #[inline(always)]
    fn new() -> Self {
        Self
    }

    #[inline(always)]
    fn relax(&mut self) {}
}

// Exponential backoff is based on the crossbeam-utils implementation.
// link to most recent change (as the time of writing):
// https://github.com/crossbeam-rs/crossbeam/blob/371de8c2d304db07662450995848f3dc9598ac99/crossbeam-utils/src/backoff.rs
//
// Copyright (c) 2019 The Crossbeam Project Developers
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

/// Pauses `2^step` times per wait, `step` growing by one per wait up to 6.
///
/// Spreads out the re-reads of a contended lock word. Like [`Spin`], it
/// never leaves the core.
#[derive(Debug)]
pub struct SpinBackoff {
    step: Step,
}

impl SpinBackoff {
    const SPIN_LIMIT: u32 = 6;
}

impl Relax for SpinBackoff {
    #[inline(always)]
    fn new() -> Self {
        Self { step: Step(0) }
    }

    #[inline(always)]
    fn relax(&mut self) {
        self.step.spin_to(Self::SPIN_LIMIT);
        self.step.step_to(Self::SPIN_LIMIT);
    }
}

/// Backs off like [`SpinBackoff`] for the first waits, then yields like
/// [`Yield`] once the spin limit is passed.
#[derive(Debug)]
pub struct YieldBackoff {
    step: Step,
}

impl YieldBackoff {
    const SPIN_LIMIT: u32 = SpinBackoff::SPIN_LIMIT;
    const YIELD_LIMIT: u32 = 10;
}

impl Relax for YieldBackoff {
    #[inline(always)]
    fn new() -> Self {
        Self { step: Step(0) }
    }

    #[inline(always)]
    fn relax(&mut self) {
        if self.step.0 <= Self::SPIN_LIMIT {
            self.step.spin();
        } else {
            thread::yield_now();
        }
        self.step.step_to(Self::YIELD_LIMIT);
    }
}

/// Keeps count of the number of steps taken.
#[derive(Debug)]
struct Step(u32);

impl Step {
    /// Unbounded backoff spinning.
    fn spin(&self) {
        atomic::pause_rep(1 << self.0);
    }

    /// Bounded backoff spinning.
    fn spin_to(&self, max: u32) {
        atomic::pause_rep(1 << self.0.min(max));
    }

    /// Bounded step increment.
    fn step_to(&mut self, end: u32) {
        if self.0 <= end {
            self.0 += 1;
        }
    }
}

/// Randomized exponential backoff, applied after a failed test-and-set or
/// compare-and-swap.
///
/// Each call to [`backoff`] waits a uniformly random number of cycles in
/// `[0, limit)`, then doubles `limit` up to [`MAX_DELAY`]. The limit starts at
/// one and is never reset, so a thread that keeps losing races on a lock
/// keeps backing off longer. The generator is seeded per thread, which keeps
/// waiters that collided once from colliding again in lockstep.
///
/// [`backoff`]: RandomBackoff::backoff
/// [`MAX_DELAY`]: RandomBackoff::MAX_DELAY
#[derive(Debug, Clone)]
pub struct RandomBackoff {
    rng: fastrand::Rng,
    limit: u32,
}

impl RandomBackoff {
    /// Upper bound for the backoff window, in cycles.
    pub const MAX_DELAY: u32 = 1000;

    /// Creates a new backoff state from a generator seed.
    #[must_use]
    pub fn with_seed(seed: u64) -> Self {
        Self { rng: fastrand::Rng::with_seed(seed), limit: 1 }
    }

    /// Current size of the backoff window, in cycles.
    #[must_use]
    pub const fn limit(&self) -> u32 {
        self.limit
    }

    /// Waits a random amount of cycles and widens the window.
    pub fn backoff(&mut self) {
        let delay = self.rng.u32(0..self.limit);
        self.limit = Self::MAX_DELAY.min(self.limit.saturating_mul(2));
        atomic::cdelay(u64::from(delay));
    }
}

impl Default for RandomBackoff {
    fn default() -> Self {
        Self::with_seed(fastrand::u64(..))
    }
}

#[cfg(all(not(loom), test))]
mod test {
    use super::{Loop, RandomBackoff, SpinBackoff, YieldBackoff};
    use crate::test::tests;
    use crate::{McsLock, TicketLock, TtasLock};

    #[test]
    fn backoff_strategies_exclude() {
        tests::lots_and_lots_lock::<McsLock<SpinBackoff>>();
        tests::lots_and_lots_lock::<TicketLock<YieldBackoff>>();
        tests::lots_and_lots_mixed_lock::<TtasLock<Loop>>();
    }

    #[test]
    fn backoff_window_doubles_up_to_cap() {
        let mut backoff = RandomBackoff::with_seed(42);
        assert_eq!(backoff.limit(), 1);
        let limits: Vec<u32> = (0..12)
            .map(|_| {
                backoff.backoff();
                backoff.limit()
            })
            .collect();
        assert_eq!(&limits[..4], &[2, 4, 8, 16]);
        assert!(limits.windows(2).all(|w| w[0] <= w[1]));
        assert_eq!(*limits.last().unwrap(), RandomBackoff::MAX_DELAY);
    }
}
