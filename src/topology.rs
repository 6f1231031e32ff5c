//! Mapping of thread indices to cores and of cores to NUMA clusters.

use crate::Error;

/// The machine layout locks are set up against.
///
/// A topology holds two tables: the core each logical thread index runs on,
/// and the cluster (socket, NUMA node) each core belongs to. Hierarchical
/// locks use the cluster table to tell local waiters from foreign ones, and
/// [`init_lock_local`] pins threads according to the core table.
///
/// Lookups never fail: thread indices wrap around the core table and unknown
/// cores wrap around the cluster table.
///
/// [`init_lock_local`]: crate::init_lock_local
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Topology {
    cores: Vec<usize>,
    clusters: Vec<usize>,
    num_clusters: usize,
}

impl Topology {
    /// A machine with `clusters` sockets of `cores_per_cluster` cores each,
    /// with cores numbered socket by socket.
    ///
    /// Thread `n` runs on core `n` and core `c` belongs to cluster
    /// `c / cores_per_cluster`.
    ///
    /// # Examples
    ///
    /// ```
    /// use slock::Topology;
    ///
    /// let topology = Topology::uniform(2, 4);
    /// assert_eq!(topology.cluster_for(topology.core_for(5)), 1);
    /// assert_eq!(topology.clusters(), 2);
    /// ```
    #[must_use]
    pub fn uniform(clusters: usize, cores_per_cluster: usize) -> Self {
        let clusters = clusters.max(1);
        let cores_per_cluster = cores_per_cluster.max(1);
        let total = clusters * cores_per_cluster;
        let cores = (0..total).collect();
        let cluster_table = (0..total).map(|core| core / cores_per_cluster).collect();
        Self { cores, clusters: cluster_table, num_clusters: clusters }
    }

    /// A topology from explicit tables.
    ///
    /// `cores[n]` is the core of thread `n`, `clusters[c]` the cluster of core
    /// `c`. Every core in `cores` must have an entry in `clusters`.
    pub fn from_tables(cores: Vec<usize>, clusters: Vec<usize>) -> Result<Self, Error> {
        if cores.is_empty() || clusters.is_empty() {
            return Err(Error::InvalidConfig("topology tables must not be empty"));
        }
        if cores.iter().any(|&core| core >= clusters.len()) {
            return Err(Error::InvalidConfig("core without a cluster"));
        }
        let num_clusters = clusters.iter().max().map_or(1, |max| max + 1);
        Ok(Self { cores, clusters, num_clusters })
    }

    /// The cores this process may run on, all in one cluster.
    ///
    /// Falls back to the available parallelism of the process when the
    /// affinity set cannot be queried.
    #[must_use]
    pub fn detect() -> Self {
        let cores: Vec<usize> = core_affinity::get_core_ids()
            .map(|ids| ids.into_iter().map(|id| id.id).collect())
            .unwrap_or_default();
        if cores.is_empty() {
            let count = std::thread::available_parallelism().map_or(1, |n| n.get());
            return Self::uniform(1, count);
        }
        let max = cores.iter().copied().max().unwrap_or(0);
        let clusters = vec![0; max + 1];
        Self { cores, clusters, num_clusters: 1 }
    }

    /// Core that thread index `thread` is assigned to.
    #[must_use]
    pub fn core_for(&self, thread: usize) -> usize {
        self.cores[thread % self.cores.len()]
    }

    /// Cluster that `core` belongs to.
    #[must_use]
    pub fn cluster_for(&self, core: usize) -> usize {
        self.clusters[core % self.clusters.len()]
    }

    /// Number of clusters.
    #[must_use]
    pub const fn clusters(&self) -> usize {
        self.num_clusters
    }

    /// Number of entries in the thread to core table.
    #[must_use]
    pub fn cores(&self) -> usize {
        self.cores.len()
    }

    /// Pins the calling thread to `core`.
    pub fn pin(core: usize) -> Result<(), Error> {
        let id = core_affinity::CoreId { id: core };
        if core_affinity::set_for_current(id) {
            Ok(())
        } else {
            Err(Error::Pinning { core })
        }
    }
}

impl Default for Topology {
    fn default() -> Self {
        Self::detect()
    }
}

#[cfg(all(not(loom), test))]
mod test {
    use super::Topology;
    use crate::Error;

    #[test]
    fn uniform_layout() {
        let topology = Topology::uniform(2, 4);
        assert_eq!(topology.cores(), 8);
        assert_eq!(topology.clusters(), 2);
        let clusters: Vec<_> = (0..8).map(|t| topology.cluster_for(topology.core_for(t))).collect();
        assert_eq!(clusters, [0, 0, 0, 0, 1, 1, 1, 1]);
        assert_eq!(topology.core_for(9), 1);
    }

    #[test]
    fn tables_are_validated() {
        let err = Topology::from_tables(vec![0, 5], vec![0, 1]);
        assert_eq!(err, Err(Error::InvalidConfig("core without a cluster")));
        let topology = Topology::from_tables(vec![3, 2, 1, 0], vec![0, 0, 1, 1]).unwrap();
        assert_eq!(topology.clusters(), 2);
        assert_eq!(topology.core_for(0), 3);
        assert_eq!(topology.cluster_for(3), 1);
    }

    #[test]
    fn detect_is_never_empty() {
        let topology = Topology::detect();
        assert!(topology.cores() >= 1);
        assert_eq!(topology.clusters(), 1);
        assert_eq!(topology.cluster_for(topology.core_for(0)), 0);
    }
}
