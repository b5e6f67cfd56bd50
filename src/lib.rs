//! # Angler Game Server
//!
//! Real-time fishing minigame: casting, bite detection, hook setting and the
//! fight against a hooked fish, served to one player per connection.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      ANGLER SERVER                           │
//! ├─────────────────────────────────────────────────────────────┤
//! │  core/           - Primitives                                │
//! │  └── rng.rs      - Seedable Xorshift128+ PRNG                │
//! │                                                              │
//! │  game/           - Game logic (no I/O)                       │
//! │  ├── catalog.rs  - Species, locations, tackle                │
//! │  ├── services.rs - Player profile collaborator               │
//! │  ├── input.rs    - Input clamping                            │
//! │  ├── bite.rs     - Bite probability and fish selection       │
//! │  ├── fish_ai.rs  - Hooked fish behavior                      │
//! │  ├── fight.rs    - Line physics and fight outcomes           │
//! │  ├── session.rs  - Session state machine                     │
//! │  └── events.rs   - Session events                            │
//! │                                                              │
//! │  network/        - Networking and timers                     │
//! │  ├── server.rs   - WebSocket server                          │
//! │  ├── protocol.rs - Message types                             │
//! │  ├── auth.rs     - JWT validation                            │
//! │  ├── session.rs  - Player to session map                     │
//! │  └── scheduler.rs- Bite checks, bite window, fight ticks     │
//! │                                                              │
//! │  config.rs       - Server and engine settings                │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Reproducibility
//!
//! Every random draw in `game/` comes from the session's own
//! `DeterministicRng`, and every timer reads `tokio::time::Instant`. Given a
//! seed and a paused clock, a session replays identically.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod config;
pub mod core;
pub mod game;
pub mod network;

// Re-export commonly used types
pub use config::{EngineConfig, ServerConfig};
pub use core::rng::DeterministicRng;
pub use game::{FishingSession, SessionState, SessionError, SessionEvent, PlayerId};
pub use network::{GameServer, GameServerError};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
