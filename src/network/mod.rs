//! Network Layer
//!
//! WebSocket server, wire protocol and the timer tasks that drive each
//! session. All game rules live in `game/`; this layer only schedules and
//! routes.

pub mod auth;
pub mod protocol;
pub mod scheduler;
pub mod session;
pub mod server;

pub use auth::{AuthConfig, TokenClaims, AuthError, validate_token};
pub use protocol::{ClientMessage, ServerMessage, ServerError, ErrorCode, CatchResult};
pub use scheduler::SessionHandle;
pub use session::SessionManager;
pub use server::{GameServer, GameServerError};
