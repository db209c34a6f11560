//! The collector and its per-thread handles.
//!
//! # Examples
//!
//! ```
//! use smr_ibr::Collector;
//!
//! let collector = Collector::new();
//!
//! let handle = collector.register();
//! drop(collector); // `handle` still works after dropping `collector`
//!
//! handle.pin().flush();
//! ```

use std::fmt;
use std::sync::Arc;

use smr_core::Smr;

use crate::config::Config;
use crate::guard::Guard;
use crate::internal::{Global, Local};

/// An interval-based garbage collector.
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

    /// Frees everything the collector still holds, unconditionally.
    ///
    /// Returns the number of blocks freed. Records still owned by live
    /// handles are not touched; drop the handles first.
    ///
    /// # Safety
    ///
    /// Every thread must have ended its operations on this collector:
    /// no guard may be alive, and none may be created concurrently.
    pub unsafe fn drain_all(&self) -> usize {
        self.global.drain_all()
    }

    /// Retired blocks that have not been reclaimed yet.
    pub fn leaked(&self) -> usize {
        self.global.leaked()
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
    /// Pins the handle, beginning an operation.
    #[inline]
    pub fn pin(&self) -> Guard<'_> {
        self.local.pin()
    }

    /// Returns `true` if the handle is pinned.
    #[inline]
    pub fn is_pinned(&self) -> bool {
        self.local.is_pinned()
    }

    /// The stable thread index assigned to this handle.
    #[inline]
    pub fn index(&self) -> usize {
        self.local.index()
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
