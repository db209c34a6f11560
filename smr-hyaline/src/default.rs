//! The default garbage collector.
//!
//! For each thread, a handle is lazily initialized on its first use, when
//! the current thread is registered in the default collector. The handle
//! is destructed on thread exit, which flushes the thread's pending batch.

use std::sync::OnceLock;

use crate::collector::{Collector, LocalHandle};

fn collector() -> &'static Collector {
    /// The global data for the default garbage collector.
    static COLLECTOR: OnceLock<Collector> = OnceLock::new();
    COLLECTOR.get_or_init(Collector::new)
}

thread_local! {
    /// The per-thread handle for the default garbage collector.
    static HANDLE: LocalHandle = collector().register();
}

/// Returns the default global collector.
pub fn default_collector() -> &'static Collector {
    collector()
}

/// Runs `f` with the current thread's handle to the default collector.
///
/// Falls back to a freshly registered handle if the thread-local has
/// already been destructed (a pin during thread teardown must not panic).
pub fn with_handle<F, R>(mut f: F) -> R
where
    F: FnMut(&LocalHandle) -> R,
{
    HANDLE
        .try_with(|h| f(h))
        .unwrap_or_else(|_| f(&collector().register()))
}

#[cfg(test)]
mod tests {
    use crossbeam_utils::thread;

    #[test]
    fn slots_follow_thread_indexes() {
        let collector = super::default_collector();
        let slots = collector.global.config.slots;
        thread::scope(|scope| {
            for _ in 0..4 {
                scope.spawn(move |_| {
                    super::with_handle(|handle| {
                        assert!(handle.slot() < slots);
                        drop(handle.pin());
                    });
                });
            }
        })
        .unwrap();
    }
}
