//! The collector and its per-thread handles.
//!
//! # Examples
//!
//! ```
//! use smr_hyaline::Collector;
//!
//! let collector = Collector::new();
//!
//! let handle = collector.register();
//! drop(collector); // `handle` still works after dropping `collector`
//!
//! drop(handle.pin());
//! ```

use std::fmt;
use std::sync::Arc;

use smr_core::Smr;

use crate::config::Config;
use crate::guard::Guard;
use crate::internal::{Global, Local};

/// A Hyaline garbage collector.
pub struct Collector {
    pub(crate) global: Arc<Global>,
}

impl Collector {
    /// Creates a new collector with the environment-derived configuration.
    pub fn new() -> Self {
        Self::with_config(Config::from_env())
    }

    /// Creates a new collector with an explicit configuration.
    pub fn with_config(config: Config) -> Self {
        Collector {
            global: Arc::new(Global::new(config)),
        }
    }

    /// Registers a new handle for the collector.
    pub fn register(&self) -> LocalHandle {
        Local::register(self)
    }

    /// The shutdown drain.
    ///
    /// In Hyaline the last thread out of each slot already freed the
    /// slot's list, and handles flush their pending batches when dropped,
    /// so a clean shutdown leaves nothing for this call to walk. What it
    /// cannot reclaim — nodes credited to a thread that never left — is
    /// reported by [`leaked`](Collector::leaked) and
    /// [`stuck_slots`](Collector::stuck_slots).
    ///
    /// Returns the number of blocks freed.
    ///
    /// # Safety
    ///
    /// Every thread must have ended its operations on this collector:
    /// no guard may be alive, and none may be created concurrently.
    pub unsafe fn drain_all(&self) -> usize {
        0
    }

    /// Retired blocks that have not been reclaimed yet.
    pub fn leaked(&self) -> usize {
        self.global.leaked()
    }

    /// Indices of slots whose reference count never returned to zero —
    /// each names a thread that entered and never left.
    pub fn stuck_slots(&self) -> Vec<usize> {
        self.global.stuck_slots()
    }
}

impl Default for Collector {
    fn default() -> Self {
        Self::new()
    }
}

impl Clone for Collector {
    /// Creates another reference to the same garbage collector.
    fn clone(&self) -> Self {
        Collector {
            global: Arc::clone(&self.global),
        }
    }
}

impl fmt::Debug for Collector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad("Collector { .. }")
    }
}

impl PartialEq for Collector {
    /// Checks if both handles point to the same collector.
    fn eq(&self, rhs: &Collector) -> bool {
        Arc::ptr_eq(&self.global, &rhs.global)
    }
}
impl Eq for Collector {}

/// A per-thread handle to a collector.
pub struct LocalHandle {
    pub(crate) local: Local,
}

impl LocalHandle {
    /// Pins the handle, entering the thread's slot.
    #[inline]
    pub fn pin(&self) -> Guard<'_> {
        self.local.pin()
    }

    /// Returns `true` if the handle is pinned.
    #[inline]
    pub fn is_pinned(&self) -> bool {
        self.local.is_pinned()
    }

    /// The slot this handle parks its retirements on.
    #[inline]
    pub fn slot(&self) -> usize {
        self.local.slot_index()
    }

    /// Returns the `Collector` associated with this handle.
    #[inline]
    pub fn collector(&self) -> &Collector {
        self.local.collector()
    }
}

impl Smr for LocalHandle {
    type Guard<'g> = Guard<'g> where Self: 'g;

    fn pin(&self) -> Guard<'_> {
        LocalHandle::pin(self)
    }
}

impl fmt::Debug for LocalHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad("LocalHandle { .. }")
    }
}
