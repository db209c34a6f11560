//! The surface the reference clients program against.
//!
//! Both engines hand out per-thread handles and RAII guards; a client
//! written against [`Smr`] and [`SmrGuard`] runs unchanged on either.

use core::fmt;
use core::ops::Deref;

use crate::epoch::Epoch;

/// A reclaimable allocation: the engine-owned header plus the client
/// payload.
///
/// The header records the timestamp the allocation was born at (the epoch
/// clock for the interval-based engine, the global era for Hyaline). The
/// payload is opaque to the engine and reachable through `Deref`.
pub struct Tracked<T> {
    birth: Epoch,
    value: T,
}

impl<T> Tracked<T> {
    /// Wraps `value` with a header stamped at `birth`.
    ///
    /// Called by the engines' `alloc`; clients receive the allocation
    /// already stamped.
    pub fn new(birth: Epoch, value: T) -> Self {
        Tracked { birth, value }
    }

    /// The timestamp this allocation was born at.
    #[inline]
    pub fn birth(&self) -> Epoch {
        self.birth
    }
}

impl<T> Deref for Tracked<T> {
    type Target = T;

    #[inline]
    fn deref(&self) -> &T {
        &self.value
    }
}

impl<T: fmt::Debug> fmt::Debug for Tracked<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tracked")
            .field("birth", &self.birth)
            .field("value", &self.value)
            .finish()
    }
}

/// A per-thread engine handle.
///
/// Obtained from an engine's `Collector::register`; every data-structure
/// operation is framed by one [`pin`](Smr::pin).
pub trait Smr {
    /// The guard type returned by `pin`.
    type Guard<'g>: SmrGuard
    where
        Self: 'g;

    /// Begins an operation. The operation ends when the guard drops.
    fn pin(&self) -> Self::Guard<'_>;
}

/// An active operation.
///
/// While a guard is live, nothing retired after it was created will be
/// reclaimed out from under the holding thread.
pub trait SmrGuard {
    /// Allocates a tracked object, stamping its birth timestamp.
    fn alloc<T: Send + 'static>(&self, value: T) -> *mut Tracked<T>;

    /// Hands an unlinked allocation to the engine for deferred
    /// destruction.
    ///
    /// # Safety
    ///
    /// The caller must guarantee that
    ///
    /// * `ptr` came from [`alloc`](SmrGuard::alloc) on the same engine
    ///   and has been removed from every shared pointer before this call,
    /// * it is retired at most once,
    /// * no thread reads through it afterwards except via a pointer it
    ///   captured under a guard that is still alive, and
    /// * the payload's destructor does not call back into this handle.
    unsafe fn retire<T: Send + 'static>(&self, ptr: *mut Tracked<T>);
}
