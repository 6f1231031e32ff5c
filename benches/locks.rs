use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

use criterion::{black_box, criterion_group, criterion_main, Bencher, Criterion};
use slock::{Config, LockKind, LockVisitor, Mutex, RawLock, Topology};

fn config() -> Config {
    let topology = Topology::uniform(1, 2);
    Config::builder().topology(topology).pin_threads(false).build().unwrap()
}

fn gen_create<L: RawLock>(bencher: &mut Bencher) {
    let config = config();
    bencher.iter(|| {
        let value = black_box(0);
        Mutex::<u32, L>::new(value, &config)
    });
}

fn gen_lock_unlock<L: RawLock>(bencher: &mut Bencher) {
    let config = config();
    let mutex = Mutex::<u32, L>::new(0, &config);
    let mut local = mutex.local(&config, 0).unwrap();

    bencher.iter(|| {
        let mut guard = mutex.lock(&mut local);
        *guard = guard.wrapping_add(1);
        drop(guard);
    })
}

fn gen_lock_unlock_read_contention<L: RawLock + 'static>(bencher: &mut Bencher) {
    let config = config();
    let data = Arc::new(Mutex::<u32, L>::new(0, &config));
    let done = Arc::new(AtomicBool::new(false));

    let thread = thread::spawn({
        let data = Arc::clone(&data);
        let done = Arc::clone(&done);
        let mut local = data.local(&config, 1).unwrap();

        move || {
            while !done.load(Ordering::Relaxed) {
                for _ in 0..1000 {
                    black_box(data.read_with_then(&mut local, |data| *data));
                }
            }
        }
    });

    let mut local = data.local(&config, 0).unwrap();
    bencher.iter(|| {
        let mut data = data.lock(&mut local);
        *data = data.wrapping_add(1);
        drop(data);
    });

    done.store(true, Ordering::Relaxed);
    thread.join().unwrap();
}

fn gen_lock_unlock_write_contention<L: RawLock + 'static>(bencher: &mut Bencher) {
    let config = config();
    let data = Arc::new(Mutex::<u32, L>::new(0, &config));
    let done = Arc::new(AtomicBool::new(false));

    let thread = thread::spawn({
        let data = Arc::clone(&data);
        let done = Arc::clone(&done);
        let mut local = data.local(&config, 1).unwrap();

        move || {
            while !done.load(Ordering::Relaxed) {
                for _ in 0..1000 {
                    let mut m = data.lock(&mut local);
                    *m = m.wrapping_add(1);
                    drop(m);
                }
            }
        }
    });

    let mut local = data.local(&config, 0).unwrap();
    bencher.iter(|| {
        let mut m = data.lock(&mut local);
        *m = m.wrapping_add(1);
        drop(m);
    });

    done.store(true, Ordering::Relaxed);
    thread.join().unwrap();
}

/// Registers the benchmarks of one lock algorithm.
struct Register<'a>(&'a mut Criterion);

impl LockVisitor for Register<'_> {
    type Output = ();

    fn visit<L: RawLock + 'static>(self) {
        let mut group = self.0.benchmark_group(L::NAME);
        group.bench_function("create", gen_create::<L>);
        group.bench_function("lock_unlock", gen_lock_unlock::<L>);
        group.bench_function("lock_unlock_read_contention", gen_lock_unlock_read_contention::<L>);
        group.bench_function("lock_unlock_write_contention", gen_lock_unlock_write_contention::<L>);
        group.finish();
    }
}

fn locks(criterion: &mut Criterion) {
    for kind in LockKind::ALL {
        kind.visit(Register(criterion));
    }
}

criterion_group!(benches, locks);
criterion_main!(benches);
