//! The slots, retired batches, and per-thread state of the Hyaline
//! engine.
//!
//! # The slot word
//!
//! Each slot's state is one `AtomicU64` packing the retired-list head
//! pointer (shifted left) with the count of threads inside the slot (the
//! low 16 bits). Keeping both in one word is what makes the protocol
//! exact: a publication CAS observes the reader count in the same
//! instant it swings the head, and the leave that takes the count to
//! zero detaches the whole list in the same CAS that resets it, so a
//! publication can never slip between the two.
//!
//! Heap addresses on the 64-bit userspace targets this crate supports fit
//! in 48 bits, which leaves the low 16 for the count.
//!
//! # Batches span every slot
//!
//! A reader may be pinned in any slot while holding pointers into the
//! client structure, so a published batch must wait for all of them: it
//! links one link record into every slot that has readers and takes one
//! credit per link placed. A link stays chained until its slot quiesces;
//! the last thread out detaches the slot's list and debits every link in
//! it. The operation that returns a batch's balance to zero frees the
//! batch — by then every slot the batch was announced in has emptied at
//! least once, so nobody who was inside when the batch was retired is
//! still around.
//!
//! The balance is signed on purpose. A slot may quiesce and debit a
//! batch's link before the publisher has applied the credit for the
//! remaining links, taking the balance below zero; the credit then
//! restores it, and the zero crossing still happens exactly once, after
//! every debt is settled.

use core::cell::{Cell, UnsafeCell};
use core::mem;
use core::ptr;
use core::sync::atomic::{AtomicI32, AtomicU64, AtomicUsize, Ordering};

use crossbeam_utils::{Backoff, CachePadded};

use smr_core::{Deferred, EpochClock, Reservation, ReservationTable, Tracked};

use crate::collector::{Collector, LocalHandle};
use crate::config::Config;
use crate::guard::Guard;

const COUNT_BITS: u32 = 16;
const COUNT_MASK: u64 = (1 << COUNT_BITS) - 1;

/// A slot word split into its parts.
#[derive(Copy, Clone)]
struct SlotState {
    head: *mut Link,
    refs: u64,
}

#[inline]
fn pack(state: SlotState) -> u64 {
    let addr = state.head as u64;
    debug_assert_eq!(addr >> (64 - COUNT_BITS), 0, "link address exceeds 48 bits");
    debug_assert!(state.refs <= COUNT_MASK);
    (addr << COUNT_BITS) | state.refs
}

#[inline]
fn unpack(word: u64) -> SlotState {
    SlotState {
        head: (word >> COUNT_BITS) as *mut Link,
        refs: word & COUNT_MASK,
    }
}

/// One partition of the retired lists.
pub(crate) struct Slot {
    word: CachePadded<AtomicU64>,
}

impl Slot {
    fn new() -> Self {
        Slot {
            word: CachePadded::new(AtomicU64::new(0)),
        }
    }

    /// The number of threads currently inside this slot.
    pub(crate) fn refs(&self) -> u64 {
        unpack(self.word.load(Ordering::Acquire)).refs
    }

    /// Marks a thread present.
    fn enter(&self) {
        let prev = unpack(self.word.fetch_add(1, Ordering::AcqRel));
        assert!(
            prev.refs < COUNT_MASK,
            "slot reference count overflow: too many threads in one slot"
        );
    }

    /// Marks a thread absent. The last thread out detaches the retired
    /// list in the same CAS that resets the count, and returns it for
    /// draining.
    fn leave(&self) -> Option<*mut Link> {
        let backoff = Backoff::new();
        let mut word = self.word.load(Ordering::Acquire);
        loop {
            let state = unpack(word);
            debug_assert!(state.refs >= 1, "leave without a matching enter");
            let next = if state.refs == 1 {
                SlotState {
                    head: ptr::null_mut(),
                    refs: 0,
                }
            } else {
                SlotState {
                    head: state.head,
                    refs: state.refs - 1,
                }
            };
            // This decrement may hand the calling thread the reclamation
            // walk, so it must be a full acquire-release edge.
            match self.word.compare_exchange_weak(
                word,
                pack(next),
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => {
                    return if state.refs == 1 {
                        Some(state.head)
                    } else {
                        None
                    };
                }
                Err(current) => {
                    word = current;
                    backoff.spin();
                }
            }
        }
    }

    /// Links `link` at the head of this slot's list.
    ///
    /// Returns whether the link was placed; a slot with no readers takes
    /// nothing, and the link stays the caller's.
    ///
    /// # Safety
    ///
    /// `link` must be unreachable by any other thread.
    unsafe fn push(&self, link: *mut Link) -> bool {
        let backoff = Backoff::new();
        let mut word = self.word.load(Ordering::Acquire);
        loop {
            let state = unpack(word);
            if state.refs == 0 {
                return false;
            }
            (*link).next = state.head;
            let next = SlotState {
                head: link,
                refs: state.refs,
            };
            match self.word.compare_exchange_weak(
                word,
                pack(next),
                Ordering::Release,
                Ordering::Acquire,
            ) {
                Ok(_) => return true,
                Err(current) => {
                    word = current;
                    backoff.spin();
                }
            }
        }
    }
}

/// A batch's presence in one slot's retired list.
pub(crate) struct Link {
    /// Next link in the slot's list. Written before publication.
    next: *mut Link,
    /// The balance shared by the batch this link announces.
    ctrl: *mut BatchCtrl,
}

/// One published batch: its balance, its payload, and the links that
/// announce it.
struct BatchCtrl {
    /// One credit per link placed, minus one debit per link drained.
    /// Signed: a drain may debit before the publisher's credit lands.
    balance: AtomicI32,
    /// Destructors of the batch's retired allocations.
    payload: Vec<Deferred>,
    /// The links pushed into slots, freed with the batch.
    links: Vec<*mut Link>,
}

/// The global data of one engine instance.
pub(crate) struct Global {
    slots: Box<[Slot]>,
    /// The global era; stamps allocations, advanced on publication.
    pub(crate) era: EpochClock,
    /// Thread registration, used here for stable slot assignment.
    reservations: ReservationTable,
    retired_count: AtomicUsize,
    freed_count: AtomicUsize,
    pub(crate) config: Config,
}

impl Global {
    pub(crate) fn new(config: Config) -> Self {
        config.validate();
        Global {
            slots: (0..config.slots).map(|_| Slot::new()).collect(),
            era: EpochClock::new(),
            reservations: ReservationTable::new(),
            retired_count: AtomicUsize::new(0),
            freed_count: AtomicUsize::new(0),
            config,
        }
    }

    pub(crate) fn slot(&self, index: usize) -> &Slot {
        &self.slots[index]
    }

    fn note_retired(&self) {
        self.retired_count.fetch_add(1, Ordering::Relaxed);
    }

    fn note_freed(&self, n: usize) {
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

    /// Slots whose thread count never returned to zero.
    pub(crate) fn stuck_slots(&self) -> Vec<usize> {
        self.slots
            .iter()
            .enumerate()
            .filter(|(_, slot)| slot.refs() != 0)
            .map(|(index, _)| index)
            .collect()
    }

    /// Publishes a batch: one link into every slot with readers, one
    /// credit per link placed. With no readers anywhere the batch is
    /// destroyed on the spot.
    fn publish(&self, payload: Vec<Deferred>) {
        let ctrl = Box::into_raw(Box::new(BatchCtrl {
            balance: AtomicI32::new(0),
            payload,
            links: Vec::new(),
        }));

        let mut credit = 0;
        for slot in self.slots.iter() {
            let link = Box::into_raw(Box::new(Link {
                next: ptr::null_mut(),
                ctrl,
            }));
            unsafe {
                if slot.push(link) {
                    (*ctrl).links.push(link);
                    credit += 1;
                } else {
                    drop(Box::from_raw(link));
                }
            }
        }

        unsafe {
            if credit == 0 {
                self.free_batch(ctrl);
            } else {
                self.credit(ctrl, credit);
            }
        }

        self.era.tick();
    }

    /// Drains a detached list, debiting every link in it.
    pub(crate) unsafe fn drain_detached(&self, head: *mut Link) {
        let mut cur = head;
        while !cur.is_null() {
            let next = (*cur).next;
            self.debit((*cur).ctrl);
            cur = next;
        }
    }

    unsafe fn debit(&self, ctrl: *mut BatchCtrl) {
        // The operation that zeroes the balance frees the batch, so it
        // must synchronize with every other debit and the credit.
        if (*ctrl).balance.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.free_batch(ctrl);
        }
    }

    unsafe fn credit(&self, ctrl: *mut BatchCtrl, amount: i32) {
        // Every debit already arrived: the credit is the zero crossing.
        if (*ctrl).balance.fetch_add(amount, Ordering::AcqRel) == -amount {
            self.free_batch(ctrl);
        }
    }

    /// Destroys a batch whose balance has settled: every slot it was
    /// announced in has quiesced, so no walk can reach its links.
    unsafe fn free_batch(&self, ctrl: *mut BatchCtrl) {
        let mut ctrl = Box::from_raw(ctrl);
        let freed = ctrl.payload.len();
        for deferred in ctrl.payload.iter_mut() {
            deferred.call();
        }
        for link in ctrl.links.drain(..) {
            drop(Box::from_raw(link));
        }
        self.note_freed(freed);
    }
}

/// Participant state for one thread.
pub(crate) struct Local {
    /// Registration entry; provides the stable index behind the slot
    /// assignment. The collector reference keeps the table alive.
    reservation: *const Reservation,
    collector: Collector,
    slot_index: usize,
    /// Number of nested guards currently pinning this participant.
    guard_count: Cell<usize>,
    /// Retirements accumulated but not yet published.
    pending: UnsafeCell<Vec<Deferred>>,
}

impl Local {
    pub(crate) fn register(collector: &Collector) -> LocalHandle {
        let reservation = collector.global.reservations.register() as *const Reservation;
        let slot_index = unsafe { (*reservation).index() } % collector.global.config.slots;
        LocalHandle {
            local: Local {
                reservation,
                collector: collector.clone(),
                slot_index,
                guard_count: Cell::new(0),
                pending: UnsafeCell::new(Vec::new()),
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

    /// The slot this thread enters and leaves.
    #[inline]
    pub(crate) fn slot_index(&self) -> usize {
        self.slot_index
    }

    #[inline]
    pub(crate) fn is_pinned(&self) -> bool {
        self.guard_count.get() > 0
    }

    pub(crate) fn pin(&self) -> Guard<'_> {
        let count = self.guard_count.get();
        self.guard_count.set(count.checked_add(1).unwrap());
        if count == 0 {
            self.global().slot(self.slot_index).enter();
        }
        Guard { local: self }
    }

    pub(crate) fn unpin(&self) {
        let count = self.guard_count.get();
        self.guard_count.set(count - 1);
        if count == 1 {
            if let Some(head) = self.global().slot(self.slot_index).leave() {
                unsafe {
                    self.global().drain_detached(head);
                }
            }
        }
    }

    pub(crate) fn alloc<T: Send + 'static>(&self, value: T) -> *mut Tracked<T> {
        Box::into_raw(Box::new(Tracked::new(self.global().era.now(), value)))
    }

    /// # Safety
    ///
    /// See [`SmrGuard::retire`](smr_core::SmrGuard::retire). Must be
    /// called with a guard alive.
    pub(crate) unsafe fn retire<T: Send + 'static>(&self, ptr: *mut Tracked<T>) {
        debug_assert!(self.is_pinned(), "retire outside an operation");
        let pending = &mut *self.pending.get();
        pending.push(Deferred::new(move || drop(Box::from_raw(ptr))));
        self.global().note_retired();

        if pending.len() >= self.global().config.batch_size {
            self.flush();
        }
    }

    /// Publishes the pending batch.
    pub(crate) fn flush(&self) {
        let payload = {
            let pending = unsafe { &mut *self.pending.get() };
            if pending.is_empty() {
                return;
            }
            mem::take(pending)
        };
        self.global().publish(payload);
    }
}

impl Drop for Local {
    fn drop(&mut self) {
        // A handle dropped while a guard is still alive (leaked
        // mid-operation) keeps the slot's count elevated; the stuck slot
        // and its unreclaimed nodes show up in the shutdown diagnostics.
        if self.guard_count.get() == 0 {
            self.flush();
            self.reservation().release();
        }
    }
}
