pub mod models {
    use core::array;

    use loom::sync::Arc;
    use loom::{model, thread};

    use crate::lock::RawLock;
    use crate::test::{get, inc, read, try_inc, Int};
    use crate::{Config, Mutex, Topology};

    // TODO: Three or more threads make blocking lock models run for too long.
    // A three thread model would cover a queue with head, tail and one more
    // node instead of just head and tail.
    const LOCKS: usize = 2;
    const TRY_LOCKS: usize = 3;

    type Step<L> = fn(&Mutex<Int, L>, &mut <L as RawLock>::Local, usize);

    /// One cluster, with room for the spawned threads and the main thread.
    fn config(threads: usize) -> Config {
        let topology = Topology::uniform(1, threads + 1);
        Config::builder().topology(topology).pin_threads(false).build().unwrap()
    }

    /// One core per cluster, so that every spawned thread runs on its own
    /// cluster.
    fn clusters_config(threads: usize) -> Config {
        let topology = Topology::uniform(threads, 1);
        let builder = Config::builder().topology(topology).max_threads(threads + 1);
        builder.batch_size(1).pin_threads(false).build().unwrap()
    }

    /// Runs `step` once on `RUNS` threads and returns the shared integer,
    /// converted to usize.
    ///
    /// Panics if the cast fails.
    fn join_all<L, const RUNS: usize>(config: &Config, step: Step<L>) -> usize
    where
        L: RawLock + 'static,
    {
        let mutex = Arc::new(Mutex::<Int, L>::new(0, config));
        let handles: [_; RUNS] = array::from_fn(|run| {
            let mutex = Arc::clone(&mutex);
            let mut local = mutex.local(config, run).unwrap();
            thread::spawn(move || step(&mutex, &mut local, run))
        });
        for handle in handles {
            handle.join().unwrap();
        }
        let mut local = mutex.local(config, 0).unwrap();
        get(&mutex, &mut local).try_into().unwrap()
    }

    /// Evaluates that concurrent `try_lock` calls will serialize all mutations
    /// against the shared data, therefore no data races.
    pub fn try_lock_join<L: RawLock + 'static>() {
        model(|| {
            const RUNS: usize = TRY_LOCKS;
            let step: Step<L> = |mutex, local, _| try_inc(mutex, local).unwrap();
            let value = join_all::<L, RUNS>(&config(RUNS), step);
            assert!((1..=RUNS).contains(&value));
        });
    }

    /// Evaluates that concurrent `lock` calls will serialize all mutations
    /// against the shared data, therefore no data races.
    pub fn lock_join<L: RawLock + 'static>() {
        model(|| {
            const RUNS: usize = LOCKS;
            let step: Step<L> = |mutex, local, _| inc(mutex, local);
            let value = join_all::<L, RUNS>(&config(RUNS), step);
            assert_eq!(RUNS, value);
        });
    }

    /// Same as [`lock_join`], with every thread on a different cluster.
    pub fn lock_join_clusters<L: RawLock + 'static>() {
        model(|| {
            const RUNS: usize = LOCKS;
            let step: Step<L> = |mutex, local, _| inc(mutex, local);
            let value = join_all::<L, RUNS>(&clusters_config(RUNS), step);
            assert_eq!(RUNS, value);
        });
    }

    /// Evaluates that concurrent `lock` and `try_lock` calls will serialize
    /// all mutations against the shared data, therefore no data races.
    pub fn mixed_lock_join<L: RawLock + 'static>() {
        model(|| {
            const RUNS: usize = LOCKS;
            let step: Step<L> = |mutex, local, run| {
                if run % 2 == 0 {
                    inc(mutex, local);
                } else {
                    try_inc(mutex, local).unwrap();
                }
            };
            let value = join_all::<L, RUNS>(&config(RUNS), step);
            assert!((1..=RUNS).contains(&value));
        });
    }

    /// Evaluates that a shared mode reader never races with a writer.
    pub fn read_write_join<L: RawLock + 'static>() {
        model(|| {
            const RUNS: usize = LOCKS;
            let step: Step<L> = |mutex, local, run| {
                if run % 2 == 0 {
                    inc(mutex, local);
                } else {
                    assert!(read(mutex, local) <= 1);
                }
            };
            let value = join_all::<L, RUNS>(&config(RUNS), step);
            assert_eq!(value, 1);
        });
    }
}
