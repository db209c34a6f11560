//! The global and per-thread state of the interval-based engine.

use core::cell::{Cell, UnsafeCell};
use core::mem;
use core::ptr;
use core::sync::atomic::{AtomicPtr, AtomicUsize, Ordering};
use std::sync::Arc;

use smr_core::{Deferred, Epoch, EpochClock, Reservation, ReservationTable, Ticker, Tracked};

use crate::collector::{Collector, LocalHandle};
use crate::config::Config;
use crate::guard::Guard;

/// A node some thread has retired, waiting for the epochs to pass it by.
pub(crate) struct Retired {
    /// Epoch the allocation was born at.
    birth: Epoch,
    /// Epoch the allocation was unlinked at. Always at least `birth`.
    retire: Epoch,
    deferred: Deferred,
}

impl Retired {
    fn free(mut self) {
        self.deferred.call();
    }
}

/// A retired list abandoned by an exiting thread.
struct Orphan {
    retired: Vec<Retired>,
    next: *mut Orphan,
}

/// The global data of one engine instance.
pub(crate) struct Global {
    /// The epoch clock. Shared with the ticker thread, if any.
    pub(crate) clock: Arc<EpochClock>,
    /// Announced epochs of all participating threads.
    pub(crate) reservations: ReservationTable,
    /// Retired lists migrated from exited threads; freed by the shutdown
    /// drain.
    orphans: AtomicPtr<Orphan>,
    retired_count: AtomicUsize,
    freed_count: AtomicUsize,
    pub(crate) config: Config,
    _ticker: Option<Ticker>,
}

impl Global {
    pub(crate) fn new(config: Config) -> Self {
        config.validate();
        let clock = Arc::new(EpochClock::starting_at(config.first_epoch));
        let ticker = config
            .tick_interval
            .map(|interval| Ticker::spawn(Arc::clone(&clock), interval));
        Global {
            clock,
            reservations: ReservationTable::new(),
            orphans: AtomicPtr::new(ptr::null_mut()),
            retired_count: AtomicUsize::new(0),
            freed_count: AtomicUsize::new(0),
            config,
            _ticker: ticker,
        }
    }

    pub(crate) fn note_retired(&self) {
        self.retired_count.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn note_freed(&self, n: usize) {
        if n > 0 {
            self.freed_count.fetch_add(n, Ordering::Relaxed);
        }
    }

    /// Retired blocks that have not been reclaimed yet.
    pub(crate) fn leaked(&self) -> usize {
        let retired = self.retired_count.load(Ordering::Relaxed);
        let freed = self.freed_count.load(Ordering::Relaxed);
        // The two relaxed reads may interleave with a racing retire+free.
        retired.saturating_sub(freed)
    }

    /// Abandons a retired list to the shutdown drain.
    pub(crate) fn migrate(&self, retired: Vec<Retired>) {
        if retired.is_empty() {
            return;
        }
        let orphan = Box::into_raw(Box::new(Orphan {
            retired,
            next: ptr::null_mut(),
        }));
        let mut head = self.orphans.load(Ordering::Relaxed);
        loop {
            unsafe { (*orphan).next = head };
            match self.orphans.compare_exchange_weak(
                head,
                orphan,
                Ordering::Release,
                Ordering::Relaxed,
            ) {
                Ok(_) => return,
                Err(h) => head = h,
            }
        }
    }

    /// Frees every orphaned record unconditionally.
    ///
    /// # Safety
    ///
    /// No thread may be inside an operation on this engine.
    pub(crate) unsafe fn drain_all(&self) -> usize {
        let mut freed = 0;
        let mut cur = self.orphans.swap(ptr::null_mut(), Ordering::Acquire);
        while !cur.is_null() {
            let orphan = Box::from_raw(cur);
            let next = orphan.next;
            for record in orphan.retired {
                record.free();
                freed += 1;
            }
            cur = next;
        }
        self.note_freed(freed);
        freed
    }
}

impl Drop for Global {
    fn drop(&mut self) {
        // Nothing can be mid-operation once the last collector reference
        // is gone.
        unsafe {
            self.drain_all();
        }
    }
}

/// Participant state for one thread.
pub(crate) struct Local {
    /// This thread's slot in the reservation table. The table owns the
    /// entry; the collector reference below keeps the table alive.
    reservation: *const Reservation,
    collector: Collector,
    /// Number of nested guards currently pinning this participant.
    guard_count: Cell<usize>,
    /// Records retired by this thread, newest last.
    retired: UnsafeCell<Vec<Retired>>,
    /// Total retirements, drives the periodic tick and drain triggers.
    retire_count: Cell<usize>,
}

impl Local {
    pub(crate) fn register(collector: &Collector) -> LocalHandle {
        let reservation = collector.global.reservations.register() as *const Reservation;
        LocalHandle {
            local: Local {
                reservation,
                collector: collector.clone(),
                guard_count: Cell::new(0),
                retired: UnsafeCell::new(Vec::new()),
                retire_count: Cell::new(0),
            },
        }
    }

    #[inline]
    fn reservation(&self) -> &Reservation {
        unsafe { &*self.reservation }
    }

    #[inline]
    pub(crate) fn global(&self) -> &Global {
        &self.collector.global
    }

    #[inline]
    pub(crate) fn collector(&self) -> &Collector {
        &self.collector
    }

    /// The stable index of this participant.
    pub(crate) fn index(&self) -> usize {
        self.reservation().index()
    }

    #[inline]
    pub(crate) fn is_pinned(&self) -> bool {
        self.guard_count.get() > 0
    }

    pub(crate) fn pin(&self) -> Guard<'_> {
        let count = self.guard_count.get();
        self.guard_count.set(count.checked_add(1).unwrap());
        if count == 0 {
            self.reservation().announce(self.global().clock.now());
        }
        Guard { local: self }
    }

    pub(crate) fn unpin(&self) {
        let count = self.guard_count.get();
        self.guard_count.set(count - 1);
        if count == 1 {
            self.reservation().retract();
            // The end-of-operation drain trigger: a long-lived list left
            // behind by a busy operation gets cut back here.
            if unsafe { (*self.retired.get()).len() } >= self.global().config.high_watermark {
                self.drain();
            }
        }
    }

    pub(crate) fn alloc<T: Send + 'static>(&self, value: T) -> *mut Tracked<T> {
        Box::into_raw(Box::new(Tracked::new(self.global().clock.now(), value)))
    }

    /// # Safety
    ///
    /// See [`SmrGuard::retire`](smr_core::SmrGuard::retire).
    pub(crate) unsafe fn retire<T: Send + 'static>(&self, ptr: *mut Tracked<T>) {
        let birth = (*ptr).birth();
        let retire = self.global().clock.now();
        debug_assert!(birth <= retire, "retired before the epoch it was born at");

        let deferred = Deferred::new(move || drop(Box::from_raw(ptr)));
        (*self.retired.get()).push(Retired {
            birth,
            retire,
            deferred,
        });
        self.global().note_retired();

        let count = self.retire_count.get().wrapping_add(1);
        self.retire_count.set(count);
        if count % self.global().config.epoch_freq == 0 {
            self.global().clock.tick();
        }
        if count % self.global().config.retire_batch == 0 {
            self.drain();
        }
    }

    /// Frees every record retired strictly before the oldest announced
    /// epoch.
    pub(crate) fn drain(&self) {
        let records = {
            let retired = unsafe { &mut *self.retired.get() };
            if retired.is_empty() {
                return;
            }
            mem::take(retired)
        };

        let min = self.global().reservations.min_announced();
        let mut kept = Vec::with_capacity(records.len());
        let mut freed = 0;
        for record in records {
            debug_assert!(record.birth <= record.retire);
            if record.retire < min {
                record.free();
                freed += 1;
            } else {
                kept.push(record);
            }
        }
        self.global().note_freed(freed);

        // Destructors may themselves pin and retire, so the list stayed
        // usable while we walked the snapshot; fold the survivors back in.
        let retired = unsafe { &mut *self.retired.get() };
        retired.extend(kept);
    }
}

impl Drop for Local {
    fn drop(&mut self) {
        // A handle dropped while a guard is still alive (leaked
        // mid-operation) keeps its announcement standing so other threads
        // stay safe; the stuck records show up in the leak metric.
        let retired = mem::take(unsafe { &mut *self.retired.get() });
        self.global().migrate(retired);
        if self.guard_count.get() == 0 {
            self.reservation().release();
        }
    }
}
