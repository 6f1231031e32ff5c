use core::sync::atomic::Ordering::{Acquire, Relaxed, Release};

use crossbeam_utils::CachePadded;

use crate::cfg::atomic::AtomicBool;

/// A fixed set of cache-padded queue nodes addressed by `u32` index.
///
/// Queue locks link nodes by index instead of by pointer. Every node is
/// either claimed (owned by some thread's local state, or parked inside the
/// lock queue) or free. Claims happen at local initialization only, so the
/// linear scan in [`claim`](Arena::claim) never runs on a hot path.
pub struct Arena<N> {
    nodes: Box<[CachePadded<N>]>,
    claimed: Box<[AtomicBool]>,
}

impl<N> Arena<N> {
    /// Index never handed out by an arena.
    pub const NIL: u32 = u32::MAX;

    /// Creates `len` nodes, calling `init` with each index.
    pub fn new<F>(len: usize, mut init: F) -> Self
    where
        F: FnMut(u32) -> N,
    {
        let len = u32::try_from(len).map_or(Self::NIL, |len| len.min(Self::NIL));
        let nodes = (0..len).map(|i| CachePadded::new(init(i))).collect();
        let claimed = (0..len).map(|_| AtomicBool::new(false)).collect();
        Self { nodes, claimed }
    }

    /// Number of nodes.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Returns the node at `index`.
    ///
    /// Panics if `index` was not handed out by this arena.
    #[inline]
    pub fn get(&self, index: u32) -> &N {
        &self.nodes[index as usize]
    }

    /// Marks `index` as claimed, whoever holds it.
    pub fn reserve(&self, index: u32) {
        self.claimed[index as usize].store(true, Relaxed);
    }

    /// Claims the first free node.
    pub fn claim(&self) -> Option<u32> {
        let index = self.claimed.iter().position(|claimed| {
            !claimed.load(Relaxed) && claimed.compare_exchange(false, true, Acquire, Relaxed).is_ok()
        })?;
        u32::try_from(index).ok()
    }

    /// Returns a claimed node to the free set.
    pub fn unclaim(&self, index: u32) {
        self.claimed[index as usize].store(false, Release);
    }
}

#[cfg(all(not(loom), test))]
mod test {
    use super::Arena;

    #[test]
    fn claims_each_node_once() {
        let arena = Arena::new(3, |i| i * 10);
        arena.reserve(0);
        assert_eq!(arena.claim(), Some(1));
        assert_eq!(arena.claim(), Some(2));
        assert_eq!(arena.claim(), None);
        arena.unclaim(1);
        assert_eq!(arena.claim(), Some(1));
        assert_eq!(*arena.get(2), 20);
        assert_eq!(arena.len(), 3);
    }
}
