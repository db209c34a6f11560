//! Hyaline memory reclamation.
//!
//! Retired batches are parked on a fixed number of *slots*, each a
//! lock-free list headed by a single word that packs the list head
//! together with the number of threads currently inside the slot. A
//! thread [`pin`](LocalHandle::pin)s by incrementing that count; while
//! the count is up, nothing announced to the slot afterwards can be
//! freed.
//!
//! A reader may be pinned in any slot while it holds pointers into the
//! client structure, so retirement publishes a batch by linking one link
//! record into *every* slot that has readers, taking one credit per link
//! placed. Links stay chained until their slot quiesces: the leave that
//! takes a slot's count to zero detaches the whole list in the same CAS
//! and debits every link in it. Whichever operation returns a batch's
//! balance to zero frees the batch — at that point every slot the batch
//! was announced in has emptied at least once, so every thread that was
//! inside at retirement has left. Draining on the last leave is the
//! spec's sanctioned "last-out" responsibility scheme; because the count
//! and the head share one word, publication and detachment can never
//! slip past each other.
//!
//! The balance is signed on purpose. A quiescing slot may debit a batch
//! before the retiring thread has applied its credit, taking the balance
//! below zero; the credit then restores it and the zero crossing still
//! happens exactly once, after every debt is settled.
//!
//! # Hyaline-S
//!
//! With a batch size above one, retirements accumulate thread-locally and
//! publish as one unit sharing a single balance, which amortizes the
//! per-slot publication over many retirements. Allocations are stamped with the
//! global *era*; [`Guard::deref`] implements the era gate that refuses a
//! pointer whose slot cannot vouch for it, in which case the caller
//! retries its read.
//!
//! # Collectors
//!
//! As with the sibling engine, all state hangs off an explicitly created
//! [`Collector`]; a process-wide default is available through
//! [`default_collector`] and [`with_handle`].

#![warn(
    missing_docs,
    missing_debug_implementations,
    rust_2018_idioms,
    unreachable_pub
)]

mod collector;
mod config;
mod default;
mod guard;
mod internal;

pub use self::collector::{Collector, LocalHandle};
pub use self::config::Config;
pub use self::default::{default_collector, with_handle};
pub use self::guard::Guard;

pub use smr_core::{Epoch, Smr, SmrGuard, Tracked};
