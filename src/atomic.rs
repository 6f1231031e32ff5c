//! Atomic primitives shared by every lock in this crate.
//!
//! The read-modify-write helpers here are full-barrier operations: every one
//! of them is sequentially consistent, matching the semantics lock algorithms
//! are usually written against (`CAS`, `FAI`, `SWAP` and `TAS` acting as both
//! an acquire and a release fence). Locks that can get away with weaker
//! orderings call the underlying atomic methods directly.
//!
//! The delay helpers ([`pause_rep`], [`nop_rep`], [`cdelay`], [`wait_cycles`])
//! busy-wait for a number of iterations or processor cycles. Under Loom the
//! iteration counters compile to no-ops, where any delay only inflates the
//! model state space, and the cycle waits yield to the model scheduler.

use core::sync::atomic::Ordering::SeqCst;

use crate::cfg::atomic::{AtomicBool, AtomicI32, AtomicU16, AtomicU32, AtomicU64, AtomicU8};
use crate::cfg::atomic::AtomicUsize;
use crate::cfg::hint;

/// Compare-and-swap and unconditional swap over an atomic integer.
pub trait AtomicSwap {
    /// The primitive integer type stored by this atomic.
    type Value: Copy + Eq;

    /// Stores `new` if the current value is `expected`.
    ///
    /// Always returns the value observed before the operation, so the caller
    /// tests success with `cas(expected, new) == expected`.
    fn cas(&self, expected: Self::Value, new: Self::Value) -> Self::Value;

    /// Stores `new`, returning the previous value.
    fn swap_value(&self, new: Self::Value) -> Self::Value;
}

/// Counter style read-modify-write operations.
///
/// Naming follows the usual shorthand: `fai` is fetch-and-increment (returns
/// the old value), `iaf` is increment-and-fetch (returns the new value), and
/// so on. All arithmetic wraps.
pub trait AtomicCounter: AtomicSwap {
    /// Fetch-and-increment.
    fn fai(&self) -> Self::Value;

    /// Fetch-and-decrement.
    fn fad(&self) -> Self::Value;

    /// Increment-and-fetch.
    fn iaf(&self) -> Self::Value;

    /// Decrement-and-fetch.
    fn daf(&self) -> Self::Value;

    /// Fetch-and-add of an arbitrary amount.
    fn faa(&self, value: Self::Value) -> Self::Value;
}

/// Test-and-set.
pub trait AtomicTas {
    /// Atomically sets the word, returning `true` if it was already set.
    fn tas(&self) -> bool;
}

macro_rules! impl_atomic_int {
    ($($atomic:ty => $int:ty),* $(,)?) => {
        $(
            impl AtomicSwap for $atomic {
                type Value = $int;

                #[inline]
                fn cas(&self, expected: $int, new: $int) -> $int {
                    match self.compare_exchange(expected, new, SeqCst, SeqCst) {
                        Ok(prev) | Err(prev) => prev,
                    }
                }

                #[inline]
                fn swap_value(&self, new: $int) -> $int {
                    self.swap(new, SeqCst)
                }
            }

            impl AtomicCounter for $atomic {
                #[inline]
                fn fai(&self) -> $int {
                    self.fetch_add(1, SeqCst)
                }

                #[inline]
                fn fad(&self) -> $int {
                    self.fetch_sub(1, SeqCst)
                }

                #[inline]
                fn iaf(&self) -> $int {
                    self.fetch_add(1, SeqCst).wrapping_add(1)
                }

                #[inline]
                fn daf(&self) -> $int {
                    self.fetch_sub(1, SeqCst).wrapping_sub(1)
                }

                #[inline]
                fn faa(&self, value: $int) -> $int {
                    self.fetch_add(value, SeqCst)
                }
            }
        )*
    };
}

impl_atomic_int! {
    AtomicU8 => u8,
    AtomicU16 => u16,
    AtomicU32 => u32,
    AtomicU64 => u64,
    AtomicUsize => usize,
    AtomicI32 => i32,
}

// A word that is already set is not written to.
impl AtomicTas for AtomicU8 {
    #[inline]
    fn tas(&self) -> bool {
        self.compare_exchange(0, 1, SeqCst, SeqCst).is_err()
    }
}

impl AtomicTas for AtomicBool {
    #[inline]
    fn tas(&self) -> bool {
        self.compare_exchange(false, true, SeqCst, SeqCst).is_err()
    }
}

/// Signals the processor that it is inside a busy-wait loop.
#[inline(always)]
pub fn pause() {
    hint::spin_loop();
}

/// Runs [`pause`] `count` times.
#[cfg(not(all(loom, test)))]
#[inline]
pub fn pause_rep(count: u32) {
    for _ in 0..count {
        pause();
    }
}

#[cfg(all(loom, test))]
#[inline]
pub fn pause_rep(_count: u32) {}

/// Burns `count` loop iterations without any pause hint.
#[cfg(not(all(loom, test)))]
#[inline]
pub fn nop_rep(count: u32) {
    for i in 0..count {
        core::hint::black_box(i);
    }
}

#[cfg(all(loom, test))]
#[inline]
pub fn nop_rep(_count: u32) {}

/// Reads a monotonic cycle counter.
///
/// On `x86_64` this is the time stamp counter. Elsewhere it is the number of
/// nanoseconds elapsed since the first call, which is close enough to cycles
/// for delay and latency accounting.
#[cfg(target_arch = "x86_64")]
#[inline]
pub fn ticks() -> u64 {
    // SAFETY: `rdtsc` is available on every x86_64 processor.
    unsafe { core::arch::x86_64::_rdtsc() }
}

#[cfg(not(target_arch = "x86_64"))]
pub fn ticks() -> u64 {
    use std::sync::OnceLock;
    use std::time::Instant;

    static START: OnceLock<Instant> = OnceLock::new();
    let start = START.get_or_init(Instant::now);
    u64::try_from(start.elapsed().as_nanos()).unwrap_or(u64::MAX)
}

/// Busy-waits until `cycles` processor cycles have elapsed.
#[cfg(not(all(loom, test)))]
pub fn cdelay(cycles: u64) {
    let end = ticks().saturating_add(cycles);
    while ticks() < end {
        pause();
    }
}

#[cfg(all(loom, test))]
pub fn cdelay(_cycles: u64) {
    crate::cfg::thread::yield_now();
}

/// Busy-waits for roughly `cycles` processor cycles.
///
/// Short waits are served with pause instructions, each accounting for about
/// six cycles. Longer waits poll the cycle counter, discounting the overhead
/// of reading it.
#[cfg(not(all(loom, test)))]
pub fn wait_cycles(cycles: u64) {
    const SHORT_WAIT: u64 = 256;
    const PAUSE_CYCLES: u64 = 6;
    const TICKS_OVERHEAD: u64 = 130;

    if cycles < SHORT_WAIT {
        for _ in 0..cycles / PAUSE_CYCLES {
            pause();
        }
    } else {
        let end = ticks().saturating_add(cycles - TICKS_OVERHEAD);
        while ticks() < end {}
    }
}

#[cfg(all(loom, test))]
pub fn wait_cycles(_cycles: u64) {
    crate::cfg::thread::yield_now();
}

#[cfg(all(not(loom), test))]
mod test {
    use super::*;

    #[test]
    fn cas_returns_observed_value() {
        let word = AtomicU32::new(7);
        assert_eq!(word.cas(7, 9), 7);
        assert_eq!(word.cas(7, 11), 9);
        assert_eq!(word.swap_value(3), 9);
    }

    #[test]
    fn counters_wrap() {
        let word = AtomicU8::new(u8::MAX);
        assert_eq!(word.fai(), u8::MAX);
        assert_eq!(word.daf(), u8::MAX);
        assert_eq!(word.iaf(), 0);
        assert_eq!(word.fad(), 0);
        assert_eq!(word.faa(2), u8::MAX);
        assert_eq!(word.cas(1, 1), 1);
    }

    #[test]
    fn signed_counter() {
        let word = AtomicI32::new(0);
        assert_eq!(word.fad(), 0);
        assert_eq!(word.daf(), -2);
        assert_eq!(word.faa(-3), -2);
        assert_eq!(word.iaf(), -4);
    }

    #[test]
    fn tas_reports_prior_state() {
        let byte = AtomicU8::new(0);
        assert!(!byte.tas());
        assert!(byte.tas());
        let flag = AtomicBool::new(false);
        assert!(!flag.tas());
        assert!(flag.tas());
    }

    #[test]
    fn tas_leaves_set_word_alone() {
        let byte = AtomicU8::new(2);
        assert!(byte.tas());
        assert_eq!(byte.load(core::sync::atomic::Ordering::Relaxed), 2);
    }

    #[test]
    fn ticks_are_monotonic() {
        let start = ticks();
        cdelay(1000);
        wait_cycles(100);
        wait_cycles(1000);
        assert!(ticks() >= start);
    }
}
