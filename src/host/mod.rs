//! Execution Host
//!
//! Gives the game book the environment it expects: one transaction at a
//! time, a clock sampled per transaction, an append-only event log.
//!
//! - `executor`: synchronous `Host` over a ledger, verifier and clock
//! - `handle`: async single-writer actor around a `Host`

pub mod executor;
pub mod handle;

pub use executor::{Host, Receipt, Transaction};
pub use handle::{HostError, HostHandle};
