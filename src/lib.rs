//! A workbench for safe memory reclamation.
//!
//! Two reclamation engines with the same client-facing contract:
//!
//! * [`ibr`] — interval-based reclamation. Allocations and retirements
//!   are stamped from an epoch clock; a retired node is freed once the
//!   oldest announced epoch has moved past its retirement.
//! * [`hyaline`] — slot-partitioned retired lists with reference-counted
//!   deferred frees, including the batched Hyaline-S variant.
//!
//! Two reference clients drive them:
//!
//! * [`tree`] — a concurrent leaf-oriented binary search tree.
//! * [`map`] — a hash map under a single global lock.
//!
//! The clients are generic over the [`Smr`] handle trait, so either
//! engine slots in unchanged. The `benchmark` binary runs the full
//! scheme-by-client matrix and reports throughput and leaked blocks.

#![warn(missing_docs, rust_2018_idioms)]

pub use smr_core::{Deferred, Epoch, EpochClock, Smr, SmrGuard, Ticker, Tracked, IDLE};

pub use smr_hyaline as hyaline;
pub use smr_ibr as ibr;
pub use smr_map as map;
pub use smr_tree as tree;
