//! Protocol Messages
//!
//! Wire format for client-server communication over WebSocket.
//! Every message is a JSON object tagged by its `type` field.

use serde::{Serialize, Deserialize};

use crate::game::catalog::LocationId;
use crate::game::events::{CatchSummary, SessionEvent};
use crate::game::fight::FightView;
use crate::game::input::{CastInput, FightAction};
use crate::game::session::{CastResult, SessionError, SessionState};
use crate::network::auth::AuthError;

// =============================================================================
// CLIENT -> SERVER MESSAGES
// =============================================================================

fn default_power() -> f64 {
    0.5
}

fn default_angle() -> f64 {
    45.0
}

fn default_level() -> f64 {
    0.5
}

/// Messages sent from client to server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Open a session at a location.
    Join {
        /// Location to fish.
        location_id: LocationId,
    },

    /// Cast the line.
    Cast {
        /// Cast power (0-1).
        #[serde(default = "default_power")]
        power: f64,
        /// Cast angle (degrees, 0-90).
        #[serde(default = "default_angle")]
        angle: f64,
    },

    /// Set the hook on a biting fish.
    Hook {},

    /// Reel in.
    Reel {
        /// Reel speed (0-1).
        #[serde(default = "default_level")]
        speed: f64,
    },

    /// Give line.
    Release {},

    /// Change the drag.
    SetDrag {
        /// Drag level (0.1-1).
        #[serde(default = "default_level")]
        level: f64,
    },

    /// Hold the line.
    Hold {},
}

impl ClientMessage {
    /// Message type name for logs.
    pub fn name(&self) -> &'static str {
        match self {
            ClientMessage::Join { .. } => "join",
            ClientMessage::Cast { .. } => "cast",
            ClientMessage::Hook {} => "hook",
            ClientMessage::Reel { .. } => "reel",
            ClientMessage::Release {} => "release",
            ClientMessage::SetDrag { .. } => "set_drag",
            ClientMessage::Hold {} => "hold",
        }
    }

    /// Fight action carried by this message, if any.
    pub fn fight_action(&self) -> Option<FightAction> {
        match *self {
            ClientMessage::Reel { speed } => Some(FightAction::Reel { speed }),
            ClientMessage::Release {} => Some(FightAction::Release),
            ClientMessage::SetDrag { level } => Some(FightAction::SetDrag { level }),
            ClientMessage::Hold {} => Some(FightAction::Hold),
            _ => None,
        }
    }

    /// Cast input carried by this message, if any.
    pub fn cast_input(&self) -> Option<CastInput> {
        match *self {
            ClientMessage::Cast { power, angle } => Some(CastInput::new(power, angle)),
            _ => None,
        }
    }
}

// =============================================================================
// SERVER -> CLIENT MESSAGES
// =============================================================================

/// Messages sent from server to client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Greeting after the handshake.
    Connected {
        /// Welcome text.
        message: String,
    },

    /// Session opened.
    Joined {
        /// Location fished.
        location_id: LocationId,
        /// Location name.
        location_name: String,
        /// Session state.
        state: SessionState,
    },

    /// Line is in the water.
    CastResult {
        /// Cast distance (m).
        distance: f64,
        /// Bait depth (m).
        depth: f64,
    },

    /// A fish took the bait.
    Bite {
        /// Species name.
        fish_name: String,
        /// Bite strength.
        intensity: f64,
    },

    /// The bite window closed.
    BiteTimeout {
        /// Notice text.
        message: String,
    },

    /// Hook set.
    FightStarted {
        /// Species name.
        fish_name: String,
        /// Weight (kg).
        weight: f64,
    },

    /// Fight tick.
    FightUpdate(FightView),

    /// Fight finished.
    Catch {
        /// Outcome.
        result: CatchResult,
    },

    /// Error response.
    Error(ServerError),
}

/// Fight outcome as sent to the client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CatchResult {
    /// Fish landed.
    Success(CatchSuccess),
    /// Fish lost.
    Failure(CatchFailure),
}

/// Landed fish.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatchSuccess {
    /// Always true.
    pub success: bool,
    /// Species name.
    pub fish_name: String,
    /// Weight (kg).
    pub weight: f64,
    /// Money earned.
    pub price: u32,
    /// Experience earned.
    pub experience: u32,
    /// Player levelled up.
    pub leveled_up: bool,
    /// New level, only when levelled up.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub new_level: Option<u32>,
    /// Newly unlocked achievements.
    pub achievements: Vec<String>,
    /// Fight length in whole seconds.
    pub fight_duration: u64,
}

/// Lost fish.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatchFailure {
    /// Always false.
    pub success: bool,
    /// `line_break`, `line_worn` or `fish_escaped`.
    pub reason: String,
}

impl From<CatchSummary> for CatchSuccess {
    fn from(summary: CatchSummary) -> Self {
        Self {
            success: true,
            fish_name: summary.fish_name,
            weight: summary.weight,
            price: summary.price,
            experience: summary.experience,
            leveled_up: summary.leveled_up,
            new_level: summary.leveled_up.then_some(summary.new_level),
            achievements: summary.achievements,
            fight_duration: summary.fight_duration.as_secs(),
        }
    }
}

/// Error response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerError {
    /// Error code.
    pub code: ErrorCode,
    /// Human-readable message.
    pub message: String,
}

impl ServerError {
    /// Create an error response.
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self { code, message: message.into() }
    }
}

/// Error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    /// Message could not be parsed.
    InvalidMessage,
    /// No session; join first.
    NotJoined,
    /// Unknown location.
    LocationNotFound,
    /// Location closed or above the player's level.
    LocationLocked,
    /// A tackle slot is empty.
    EquipmentIncomplete,
    /// Bait ran out.
    NoBait,
    /// Action not legal in the current state.
    InvalidState,
    /// Hook set too late.
    BiteExpired,
    /// Session was reset after an inconsistency.
    SessionReset,
    /// Authentication failed.
    AuthFailed,
    /// Token expired.
    TokenExpired,
    /// Token could not be verified.
    InvalidToken,
    /// Server at capacity.
    ServerFull,
}

impl From<&SessionError> for ErrorCode {
    fn from(err: &SessionError) -> Self {
        match err {
            SessionError::LocationNotFound(_) => ErrorCode::LocationNotFound,
            SessionError::LocationLocked(_) => ErrorCode::LocationLocked,
            SessionError::MissingEquipment(_) => ErrorCode::EquipmentIncomplete,
            SessionError::NoBait => ErrorCode::NoBait,
            SessionError::InvalidState { .. } => ErrorCode::InvalidState,
            SessionError::BiteExpired => ErrorCode::BiteExpired,
            SessionError::Inconsistent(_) => ErrorCode::SessionReset,
        }
    }
}

impl From<&AuthError> for ErrorCode {
    fn from(err: &AuthError) -> Self {
        match err {
            AuthError::Expired => ErrorCode::TokenExpired,
            AuthError::InvalidFormat
            | AuthError::InvalidSignature
            | AuthError::InvalidIssuer
            | AuthError::InvalidAudience
            | AuthError::DecodeError(_) => ErrorCode::InvalidToken,
            AuthError::NotConfigured | AuthError::MissingToken | AuthError::MissingClaim(_) => {
                ErrorCode::AuthFailed
            }
        }
    }
}

impl From<&SessionError> for ServerError {
    fn from(err: &SessionError) -> Self {
        ServerError::new(err.into(), err.to_string())
    }
}

// =============================================================================
// CONVERSIONS
// =============================================================================

const BITE_TIMEOUT_MESSAGE: &str = "The fish got away before you set the hook";

fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}

impl From<SessionEvent> for ServerMessage {
    fn from(event: SessionEvent) -> Self {
        match event {
            SessionEvent::Bite { fish_name, intensity } => ServerMessage::Bite {
                fish_name,
                intensity: round_to(intensity, 2),
            },
            SessionEvent::BiteTimeout => ServerMessage::bite_timeout(),
            SessionEvent::FightStarted { fish_name, weight } => ServerMessage::FightStarted { fish_name, weight },
            SessionEvent::FightUpdate(view) => ServerMessage::FightUpdate(view),
            SessionEvent::Caught(summary) => ServerMessage::Catch {
                result: CatchResult::Success(summary.into()),
            },
            SessionEvent::Lost { reason } => ServerMessage::Catch {
                result: CatchResult::Failure(CatchFailure {
                    success: false,
                    reason: reason.as_str().to_string(),
                }),
            },
            SessionEvent::Reset { message } => ServerMessage::error(ErrorCode::SessionReset, message),
        }
    }
}

impl From<CastResult> for ServerMessage {
    fn from(cast: CastResult) -> Self {
        ServerMessage::CastResult {
            distance: round_to(cast.distance, 1),
            depth: round_to(cast.depth, 1),
        }
    }
}

impl From<&SessionError> for ServerMessage {
    fn from(err: &SessionError) -> Self {
        ServerMessage::Error(err.into())
    }
}

impl ServerMessage {
    /// Build an error message.
    pub fn error(code: ErrorCode, message: impl Into<String>) -> Self {
        ServerMessage::Error(ServerError::new(code, message))
    }

    /// Bite window closed.
    pub fn bite_timeout() -> Self {
        ServerMessage::BiteTimeout { message: BITE_TIMEOUT_MESSAGE.to_string() }
    }

    /// Message type name for logs.
    pub fn name(&self) -> &'static str {
        match self {
            ServerMessage::Connected { .. } => "connected",
            ServerMessage::Joined { .. } => "joined",
            ServerMessage::CastResult { .. } => "cast_result",
            ServerMessage::Bite { .. } => "bite",
            ServerMessage::BiteTimeout { .. } => "bite_timeout",
            ServerMessage::FightStarted { .. } => "fight_started",
            ServerMessage::FightUpdate(_) => "fight_update",
            ServerMessage::Catch { .. } => "catch",
            ServerMessage::Error(_) => "error",
        }
    }
}

// =============================================================================
// SERIALIZATION HELPERS
// =============================================================================

impl ClientMessage {
    /// Serialize to JSON string.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Deserialize from JSON string.
    pub fn from_json(s: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }
}

impl ServerMessage {
    /// Serialize to JSON string.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Deserialize from JSON string.
    pub fn from_json(s: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use serde_json::{json, Value};

    use crate::game::catalog::EquipmentSlot;
    use crate::game::fight::{FailureReason, FightState};

    fn to_value(msg: &ServerMessage) -> Value {
        serde_json::from_str(&msg.to_json().unwrap()).unwrap()
    }

    #[test]
    fn test_client_messages_parse() {
        assert_eq!(
            ClientMessage::from_json(r#"{"type":"join","location_id":3}"#).unwrap(),
            ClientMessage::Join { location_id: 3 }
        );
        assert_eq!(
            ClientMessage::from_json(r#"{"type":"cast","power":0.8,"angle":30}"#).unwrap(),
            ClientMessage::Cast { power: 0.8, angle: 30.0 }
        );
        assert_eq!(ClientMessage::from_json(r#"{"type":"hook"}"#).unwrap(), ClientMessage::Hook {});
        assert_eq!(
            ClientMessage::from_json(r#"{"type":"set_drag","level":0.9}"#).unwrap(),
            ClientMessage::SetDrag { level: 0.9 }
        );
    }

    #[test]
    fn test_client_message_defaults() {
        assert_eq!(
            ClientMessage::from_json(r#"{"type":"cast"}"#).unwrap(),
            ClientMessage::Cast { power: 0.5, angle: 45.0 }
        );
        assert_eq!(
            ClientMessage::from_json(r#"{"type":"reel"}"#).unwrap(),
            ClientMessage::Reel { speed: 0.5 }
        );
    }

    #[test]
    fn test_unknown_and_malformed_rejected() {
        assert!(ClientMessage::from_json(r#"{"type":"teleport"}"#).is_err());
        assert!(ClientMessage::from_json(r#"{"type":"join"}"#).is_err());
        assert!(ClientMessage::from_json("not json").is_err());
    }

    #[test]
    fn test_fight_action_mapping() {
        assert_eq!(
            ClientMessage::Reel { speed: 0.7 }.fight_action(),
            Some(FightAction::Reel { speed: 0.7 })
        );
        assert_eq!(ClientMessage::Hold {}.fight_action(), Some(FightAction::Hold));
        assert_eq!(ClientMessage::Hook {}.fight_action(), None);
        assert!(ClientMessage::Cast { power: 1.0, angle: 0.0 }.cast_input().is_some());
    }

    #[test]
    fn test_fight_update_is_flat() {
        let msg = ServerMessage::from(SessionEvent::FightUpdate(FightState::hooked(50.0).view()));
        let value = to_value(&msg);

        assert_eq!(value["type"], "fight_update");
        assert_eq!(value["behavior_state"], "active");
        assert_eq!(value["distance"], 40.0);
        assert_eq!(value["tension"], 30.0);
        assert_eq!(value["is_critical"], false);
    }

    #[test]
    fn test_catch_success_shape() {
        let summary = CatchSummary {
            fish_name: "Pike".into(),
            weight: 4.25,
            price: 180,
            experience: 95,
            leveled_up: false,
            new_level: 2,
            achievements: vec!["First Catch".into()],
            fight_duration: Duration::from_millis(12_900),
        };
        let value = to_value(&SessionEvent::Caught(summary).into());

        assert_eq!(value["type"], "catch");
        assert_eq!(value["result"]["success"], true);
        assert_eq!(value["result"]["fight_duration"], 12);
        assert!(value["result"].get("new_level").is_none());
        assert_eq!(value["result"]["achievements"], json!(["First Catch"]));
    }

    #[test]
    fn test_catch_failure_shape() {
        let msg: ServerMessage = SessionEvent::Lost { reason: FailureReason::LineBreak }.into();
        assert_eq!(
            to_value(&msg),
            json!({"type": "catch", "result": {"success": false, "reason": "line_break"}})
        );

        let parsed = ServerMessage::from_json(&msg.to_json().unwrap()).unwrap();
        assert_eq!(parsed, msg);
    }

    #[test]
    fn test_cast_result_rounded() {
        let msg: ServerMessage = CastResult { distance: 43.04, depth: 7.96 }.into();
        assert_eq!(msg, ServerMessage::CastResult { distance: 43.0, depth: 8.0 });
    }

    #[test]
    fn test_error_codes() {
        let err = SessionError::MissingEquipment(EquipmentSlot::Reel);
        let value = to_value(&ServerMessage::from(&err));
        assert_eq!(value["type"], "error");
        assert_eq!(value["code"], "equipment_incomplete");
        assert_eq!(value["message"], "equipment incomplete: no reel equipped");

        assert_eq!(ErrorCode::from(&SessionError::BiteExpired), ErrorCode::BiteExpired);
        assert_eq!(ErrorCode::from(&AuthError::Expired), ErrorCode::TokenExpired);
        assert_eq!(ErrorCode::from(&AuthError::InvalidSignature), ErrorCode::InvalidToken);
    }

    #[test]
    fn test_reset_becomes_error() {
        let msg: ServerMessage = SessionEvent::Reset { message: "bad state".into() }.into();
        assert_eq!(msg, ServerMessage::error(ErrorCode::SessionReset, "bad state"));
    }
}
