//! Shared building blocks for the reclamation engines.
//!
//! Concurrent data structures that unlink nodes cannot free them right
//! away: another thread may still be reading the node it just lost the
//! race for. A reclamation engine bridges that gap by having every thread
//! announce when it is inside an operation and by holding retired nodes
//! until no announcement can still cover them.
//!
//! This crate carries the pieces both engines in this workspace share:
//!
//! * [`EpochClock`], a process-wide monotone counter used to timestamp
//!   allocations and retirements.
//! * [`ReservationTable`], the per-thread announcement slots and the
//!   minimum-announcement scan that gates reclamation.
//! * [`Deferred`], a destructor closure captured at retirement time.
//! * [`Tracked`] and the [`Smr`]/[`SmrGuard`] traits, the surface the
//!   reference clients program against so they can run unchanged on
//!   either engine.

#![warn(
    missing_docs,
    missing_debug_implementations,
    rust_2018_idioms,
    unreachable_pub
)]

mod config;
mod deferred;
mod epoch;
mod reservation;
mod retire;

pub use self::config::env_param;
pub use self::deferred::Deferred;
pub use self::epoch::{Epoch, EpochClock, Ticker, IDLE};
pub use self::reservation::{Reservation, ReservationTable};
pub use self::retire::{Smr, SmrGuard, Tracked};
