//! The thread reservation table.
//!
//! # Registration
//!
//! In order to scan all participants in one place, threads register here
//! on first use. Entries live in an intrusive lock-free list; an entry
//! released by an exiting thread is recycled by the next registering
//! thread, so the table never grows past the peak thread count and the
//! stable thread index attached to each entry stays dense.
//!
//! # Announcements
//!
//! While a thread is inside an operation its entry carries the epoch it
//! announced on entry; outside an operation it carries [`IDLE`]. The
//! engines reclaim a retired node only once [`min_announced`] has moved
//! past its retirement epoch.
//!
//! [`min_announced`]: ReservationTable::min_announced

use core::fmt;
use core::ptr;
use core::sync::atomic::{fence, AtomicBool, AtomicPtr, AtomicU64, AtomicUsize, Ordering};

use crossbeam_utils::CachePadded;

use crate::epoch::{Epoch, IDLE};

/// One thread's slot in the reservation table.
pub struct Reservation {
    /// The epoch this thread has announced, or `IDLE`.
    announced: CachePadded<AtomicU64>,
    /// Whether a live thread currently owns this entry.
    active: AtomicBool,
    /// Stable thread index. Survives entry recycling.
    index: usize,
    /// Next entry in the table. Immutable once the entry is linked.
    next: *const Reservation,
}

// The raw `next` pointer is written once before the entry is published and
// never changes afterwards.
unsafe impl Send for Reservation {}
unsafe impl Sync for Reservation {}

impl Reservation {
    /// The stable index assigned to this entry at creation.
    #[inline]
    pub fn index(&self) -> usize {
        self.index
    }

    /// Announces `epoch` as the oldest timestamp this thread may touch.
    ///
    /// The store must be ordered before any shared loads the operation
    /// performs afterwards, and must be visible to a concurrent
    /// `min_announced` scan; `SeqCst` provides both.
    #[inline]
    pub fn announce(&self, epoch: Epoch) {
        self.announced.store(epoch, Ordering::SeqCst);
    }

    /// The currently announced epoch, or [`IDLE`].
    #[inline]
    pub fn announced(&self) -> Epoch {
        self.announced.load(Ordering::Acquire)
    }

    /// Marks this thread as being outside any operation.
    #[inline]
    pub fn retract(&self) {
        self.announced.store(IDLE, Ordering::Release);
    }

    /// Retracts and gives the entry up for reuse by a later thread.
    pub fn release(&self) {
        self.retract();
        self.active.store(false, Ordering::Release);
    }
}

impl fmt::Debug for Reservation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Reservation")
            .field("index", &self.index)
            .field("announced", &self.announced())
            .finish()
    }
}

/// The set of threads participating in an engine.
pub struct ReservationTable {
    head: AtomicPtr<Reservation>,
    next_index: AtomicUsize,
}

unsafe impl Send for ReservationTable {}
unsafe impl Sync for ReservationTable {}

impl ReservationTable {
    /// Creates an empty table.
    pub fn new() -> Self {
        ReservationTable {
            head: AtomicPtr::new(ptr::null_mut()),
            next_index: AtomicUsize::new(0),
        }
    }

    /// Registers the calling thread and returns its entry.
    ///
    /// A released entry is adopted when one exists, otherwise a fresh
    /// entry is pushed at the head of the list.
    pub fn register(&self) -> &Reservation {
        let mut cur = self.head.load(Ordering::Acquire);
        while let Some(entry) = unsafe { cur.as_ref() } {
            if !entry.active.load(Ordering::Relaxed)
                && entry
                    .active
                    .compare_exchange(false, true, Ordering::AcqRel, Ordering::Relaxed)
                    .is_ok()
            {
                return entry;
            }
            cur = entry.next as *mut Reservation;
        }

        let entry = Box::into_raw(Box::new(Reservation {
            announced: CachePadded::new(AtomicU64::new(IDLE)),
            active: AtomicBool::new(true),
            index: self.next_index.fetch_add(1, Ordering::Relaxed),
            next: ptr::null(),
        }));
        let mut head = self.head.load(Ordering::Relaxed);
        loop {
            unsafe { (*entry).next = head };
            match self
                .head
                .compare_exchange_weak(head, entry, Ordering::Release, Ordering::Relaxed)
            {
                Ok(_) => return unsafe { &*entry },
                Err(h) => head = h,
            }
        }
    }

    /// A lower bound on the minimum epoch announced by any active thread.
    ///
    /// Returns [`IDLE`] when every registered thread is idle. The scan is
    /// not an atomic snapshot; it may lag behind announcements that race
    /// with it, which only makes the bound lower and reclamation later.
    pub fn min_announced(&self) -> Epoch {
        // Pairs with the `SeqCst` announcement stores: an announcement
        // ordered before this fence is seen by the scan below.
        fence(Ordering::SeqCst);
        let mut min = IDLE;
        let mut cur = self.head.load(Ordering::Acquire);
        while let Some(entry) = unsafe { cur.as_ref() } {
            if entry.active.load(Ordering::Relaxed) {
                min = min.min(entry.announced.load(Ordering::Acquire));
            }
            cur = entry.next as *mut Reservation;
        }
        min
    }
}

impl Default for ReservationTable {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for ReservationTable {
    fn drop(&mut self) {
        let mut cur = *self.head.get_mut();
        while !cur.is_null() {
            let entry = unsafe { Box::from_raw(cur) };
            cur = entry.next as *mut Reservation;
        }
    }
}

impl fmt::Debug for ReservationTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad("ReservationTable { .. }")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossbeam_utils::thread;

    #[test]
    fn idle_table_has_no_minimum() {
        let table = ReservationTable::new();
        let a = table.register();
        let b = table.register();
        assert_eq!(table.min_announced(), IDLE);
        assert_ne!(a.index(), b.index());
    }

    #[test]
    fn minimum_tracks_the_oldest_announcement() {
        let table = ReservationTable::new();
        let a = table.register();
        let b = table.register();

        a.announce(7);
        b.announce(3);
        assert_eq!(table.min_announced(), 3);

        b.retract();
        assert_eq!(table.min_announced(), 7);

        a.retract();
        assert_eq!(table.min_announced(), IDLE);
    }

    #[test]
    fn released_entries_are_recycled() {
        let table = ReservationTable::new();
        let index = {
            let entry = table.register();
            let index = entry.index();
            entry.release();
            index
        };
        let entry = table.register();
        assert_eq!(entry.index(), index);
    }

    #[test]
    fn released_entries_do_not_stall_the_scan() {
        let table = ReservationTable::new();
        let stale = table.register();
        stale.announce(1);
        stale.release();
        assert_eq!(table.min_announced(), IDLE);
    }

    #[test]
    fn concurrent_registration_yields_distinct_entries() {
        const THREADS: usize = 8;

        let table = ReservationTable::new();
        thread::scope(|scope| {
            for _ in 0..THREADS {
                scope.spawn(|_| {
                    let entry = table.register();
                    entry.announce(entry.index() as Epoch);
                    assert!(table.min_announced() <= entry.index() as Epoch);
                    entry.release();
                });
            }
        })
        .unwrap();
        assert_eq!(table.min_announced(), IDLE);
    }
}
