//! Game Logic Module
//!
//! Move encoding, resolution, the game record and its state machine.
//! Nothing here reads a clock or touches the network.
//!
//! ## Module Structure
//!
//! - `moves`: Canonical move encoding
//! - `outcome`: Winner resolution
//! - `timeout`: Reveal window bounds and deadline arithmetic
//! - `state`: Game record, lifecycle state, positional encoding
//! - `machine`: `GameBook` and the five transitions
//! - `events`: Events emitted per committed transition

pub mod moves;
pub mod outcome;
pub mod timeout;
pub mod state;
pub mod machine;
pub mod events;

// Re-export key types
pub use moves::Move;
pub use outcome::{resolve, Outcome};
pub use timeout::TimeoutPolicy;
pub use state::{Game, GameRecord, GameState, RecordError, Side, Winner};
pub use machine::{CreateGame, GameBook, ProtocolConfig};
pub use events::{GameEvent, GameEventData};
