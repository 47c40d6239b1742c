//! # RPS Wager Server
//!
//! Commit-reveal Rock-Paper-Scissors with escrowed stakes and proof-gated
//! settlement.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                    RPS WAGER SERVER                          │
//! ├──────────────────────────────────────────────────────────────┤
//! │  core/           - Primitives                                │
//! │  ├── hash.rs     - SHA-256 with domain separation            │
//! │  ├── ids.rs      - Addresses and game ids                    │
//! │  └── clock.rs    - Host clock (system and manual)            │
//! │                                                              │
//! │  game/           - Protocol logic (deterministic)            │
//! │  ├── moves.rs    - Canonical move bytes                      │
//! │  ├── outcome.rs  - Winner resolution                         │
//! │  ├── timeout.rs  - Reveal window and deadlines               │
//! │  ├── state.rs    - Game record and lifecycle                 │
//! │  ├── machine.rs  - The five transitions                      │
//! │  └── events.rs   - Emitted events                            │
//! │                                                              │
//! │  proof/          - Commitments and reveal proofs             │
//! │  ledger/         - Escrow-capable token ledger               │
//! │  host/           - Transaction executor and async actor      │
//! │                                                              │
//! │  network/        - Gateway (non-deterministic)               │
//! │  ├── server.rs   - WebSocket server                          │
//! │  ├── protocol.rs - Message types                             │
//! │  └── auth.rs     - JWT validation                            │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Determinism
//!
//! `core/`, `game/`, `proof/` and `ledger/` never read the wall clock or
//! an RNG on their own (salt generation aside). Time enters as a `now`
//! argument sampled once per transaction by the host, and maps are
//! `BTreeMap`s for stable iteration.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod core;
pub mod error;
pub mod game;
pub mod host;
pub mod ledger;
pub mod network;
pub mod proof;

// Re-export commonly used types
pub use crate::core::ids::{Address, GameId};
pub use crate::core::clock::{Clock, ManualClock, SystemClock, Timestamp};
pub use error::{ErrorKind, GameError};
pub use game::{Game, GameBook, GameState, Move, Outcome, ProtocolConfig, Winner};
pub use host::{Host, HostHandle, Transaction};
pub use ledger::{InMemoryLedger, TokenLedger};
pub use proof::{Commitment, Reveal, Salt, SettlementCoordinator};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
