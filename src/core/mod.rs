//! Core primitives.
//!
//! Hashing, identifiers and the host clock. Everything above this layer is
//! deterministic given the same inputs and the same `now`.

pub mod clock;
pub mod hash;
pub mod ids;

// Re-export core types
pub use clock::{Clock, ManualClock, SystemClock, Timestamp};
pub use hash::{Hash32, DomainHasher, hash_bytes, hash_with_domain};
pub use ids::{Address, GameId, ADDRESS_LEN};
