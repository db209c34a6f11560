//! Interval-based memory reclamation.
//!
//! Every allocation is stamped with the epoch it was born at, and every
//! retirement with the epoch it was unlinked at. A thread entering an
//! operation announces the current epoch; while the announcement stands,
//! the thread may hold pointers to anything retired at or after it. A
//! retired node is therefore freed only once the minimum announcement
//! across all threads has moved strictly past its retirement epoch.
//!
//! # Pinning
//!
//! Before touching a shared structure, a thread [`pin`](LocalHandle::pin)s
//! its handle and receives a [`Guard`]. The guard is a witness that the
//! thread's announcement is in place; allocation and retirement go
//! through it, and dropping it retracts the announcement.
//!
//! # Thread-local retired lists
//!
//! Retirements are pushed onto a per-thread list and drained periodically
//! against the minimum announced epoch, so the common path never touches
//! shared state beyond the epoch clock. A thread that exits with nodes
//! still on its list abandons them to the collector, which frees them in
//! the shutdown drain.
//!
//! # Collectors
//!
//! All state hangs off a [`Collector`] created explicitly, so several
//! independent engines can coexist in one process and tests stay
//! deterministic. A process-wide default is available through
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

pub use smr_core::{Epoch, Smr, SmrGuard, Tracked, IDLE};
