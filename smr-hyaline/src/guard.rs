use core::fmt;

use smr_core::{SmrGuard, Tracked};

use crate::internal::Local;

/// A witness that the current thread is inside its slot.
///
/// While the guard is alive the slot's reference count includes this
/// thread, so nothing retired from now on can be freed before this
/// thread leaves. Dropping the last nested guard leaves the slot; if it
/// was the last thread out, it detaches and drains the slot's retired
/// list.
#[must_use]
pub struct Guard<'g> {
    pub(crate) local: &'g Local,
}

impl Guard<'_> {
    /// Allocates a tracked object stamped with the current era.
    pub fn alloc<T: Send + 'static>(&self, value: T) -> *mut Tracked<T> {
        self.local.alloc(value)
    }

    /// Retires an unlinked allocation into the thread's pending batch.
    ///
    /// # Safety
    ///
    /// See [`SmrGuard::retire`].
    pub unsafe fn retire<T: Send + 'static>(&self, ptr: *mut Tracked<T>) {
        self.local.retire(ptr);
    }

    /// The era gate of Hyaline-S.
    ///
    /// Admits the pointer only when the slot's observed reference count
    /// is at least the era the allocation was recorded at; otherwise the
    /// caller is expected to re-read the pointer and try again.
    ///
    /// # Safety
    ///
    /// `ptr` must point to an allocation of this engine that was live at
    /// some point during this guard.
    pub unsafe fn deref<'g, T>(&'g self, ptr: *mut Tracked<T>) -> Option<&'g Tracked<T>> {
        let refs = self
            .local
            .global()
            .slot(self.local.slot_index())
            .refs();
        if refs >= (*ptr).birth() {
            Some(&*ptr)
        } else {
            None
        }
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
