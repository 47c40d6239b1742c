//! Network Layer
//!
//! WebSocket gateway in front of the execution host. Nothing here decides
//! protocol outcomes; every request becomes a host transaction.

pub mod auth;
pub mod protocol;
pub mod server;

pub use auth::{AuthConfig, AuthError, Authenticator, Identity, TokenClaims};
pub use protocol::{ClientMessage, ErrorCode, EventNotice, EventView, GameView, ServerMessage, SubmitFrame};
pub use server::{ClientSession, Dispatcher, Gateway, GatewayError, ServerConfig};
