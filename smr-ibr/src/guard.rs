use core::fmt;

use smr_core::{SmrGuard, Tracked};

use crate::internal::Local;

/// A witness that the current thread's announcement is in place.
///
/// Allocation and retirement go through the guard; dropping the last
/// nested guard retracts the announcement and may drain the thread's
/// retired list.
#[must_use]
pub struct Guard<'g> {
    pub(crate) local: &'g Local,
}

impl Guard<'_> {
    /// Allocates a tracked object stamped with the current epoch.
    pub fn alloc<T: Send + 'static>(&self, value: T) -> *mut Tracked<T> {
        self.local.alloc(value)
    }

    /// Retires an unlinked allocation.
    ///
    /// # Safety
    ///
    /// See [`SmrGuard::retire`].
    pub unsafe fn retire<T: Send + 'static>(&self, ptr: *mut Tracked<T>) {
        self.local.retire(ptr);
    }

    /// Drains the thread's retired list against the current minimum
    /// announcement, without waiting for the periodic trigger.
    pub fn flush(&self) {
        self.local.drain();
    }
}

impl SmrGuard for Guard<'_> {
    fn alloc<T: Send + 'static>(&self, value: T) -> *mut Tracked<T> {
        Guard::alloc(self, value)
    }

    unsafe fn retire<T: Send + 'static>(&self, ptr: *mut Tracked<T>) {
        Guard::retire(self, ptr);
    }
}

impl Drop for Guard<'_> {
    #[inline]
    fn drop(&mut self) {
        self.local.unpin();
    }
}

impl fmt::Debug for Guard<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad("Guard { .. }")
    }
}
