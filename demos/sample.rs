use std::sync::Arc;
use std::thread;

use slock::{Config, DefaultLock, RawLock, Topology};

fn main() -> Result<(), slock::Error> {
    const N: usize = 4;

    let config = Config::builder().topology(Topology::uniform(1, N)).pin_threads(false).build()?;

    // The shared state of the lock is created once, before the threads.
    let lock: Arc<DefaultLock> = Arc::new(slock::init_lock_global(&config));
    println!("lock: {}", DefaultLock::NAME);

    let handles: Vec<_> = (0..N)
        .map(|thread| {
            let (lock, config) = (Arc::clone(&lock), config.clone());
            thread::spawn(move || -> Result<(), slock::Error> {
                // Every thread owns its local state, created on its own core.
                let core = config.topology().core_for(thread);
                let mut local = slock::init_lock_local(core, &*lock, &config)?;

                slock::acquire_lock(&mut local, &*lock);
                println!("thread {thread} on core {core} holds the lock");
                slock::release_lock(&mut local, &*lock);

                slock::free_lock_local(&*lock, local);
                Ok(())
            })
        })
        .collect();
    for handle in handles {
        handle.join().expect("thread panicked")?;
    }

    let lock = Arc::try_unwrap(lock).ok().expect("threads are joined");
    slock::free_lock_global(lock);
    Ok(())
}
