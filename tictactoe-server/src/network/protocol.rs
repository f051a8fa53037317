//! Protocol Messages
//!
//! Wire format for client-server communication over WebSocket.
//! Every frame is a JSON text message: the client sends a [`Request`], the
//! server answers with exactly one [`Response`] carrying the same id.
//! Optional fields are always present on the wire as explicit `null`.

use chrono::{DateTime, Utc};
use serde::{Serialize, Deserialize};
use serde::de::DeserializeOwned;
use serde_json::{json, Value};

use crate::game::board::Move;

/// Server-assigned event identifier (monotonic).
pub type EventId = u64;

// =============================================================================
// CLIENT -> SERVER
// =============================================================================

/// Operation requested by the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RequestType {
    /// Log in with credentials.
    Login,
    /// Create an account.
    Register,
    /// End the logged-in session on this connection.
    Logout,
    /// Pull available users, invitation responses and new invitations.
    UpdatePairing,
    /// Invite another user.
    SendInvitation,
    /// Accept an invitation addressed to us.
    AcceptInvitation,
    /// Decline an invitation addressed to us.
    DeclineInvitation,
    /// Inviter acknowledges the recipient's answer.
    AcknowledgeResponse,
    /// Long-poll for the opponent's next move.
    RequestMove,
    /// Submit our own move.
    SendMove,
    /// Leave a game before it is decided.
    AbortGame,
    /// Leave after the round is decided.
    CompleteGame,
}

/// A client request.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Request {
    /// Correlation id, assigned by the transport and echoed in the response.
    #[serde(default)]
    pub id: u64,
    /// Operation.
    #[serde(rename = "type")]
    pub request_type: RequestType,
    /// JSON text of the operation's payload.
    pub data: Option<String>,
}

impl std::fmt::Debug for Request {
    // data may hold a password
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Request")
            .field("id", &self.id)
            .field("request_type", &self.request_type)
            .finish_non_exhaustive()
    }
}

/// LOGIN payload.
#[derive(Clone, Serialize, Deserialize)]
pub struct Credentials {
    /// Account name.
    pub username: String,
    /// Plain password (hashed by the server).
    pub password: String,
}

/// REGISTER payload.
#[derive(Clone, Serialize, Deserialize)]
pub struct Registration {
    /// Account name (unique).
    pub username: String,
    /// Name shown to other players.
    pub display_name: String,
    /// Plain password (hashed by the server).
    pub password: String,
}

impl Request {
    /// Request without payload.
    pub fn new(request_type: RequestType) -> Self {
        Self { id: 0, request_type, data: None }
    }

    /// Request carrying a JSON payload.
    pub fn with_data(request_type: RequestType, data: Value) -> Self {
        Self { id: 0, request_type, data: Some(data.to_string()) }
    }

    /// LOGIN request.
    pub fn login(credentials: &Credentials) -> Self {
        Self::with_data(RequestType::Login, json!({
            "username": credentials.username,
            "password": credentials.password,
        }))
    }

    /// REGISTER request.
    pub fn register(registration: &Registration) -> Self {
        Self::with_data(RequestType::Register, json!({
            "username": registration.username,
            "display_name": registration.display_name,
            "password": registration.password,
        }))
    }

    /// LOGOUT request.
    pub fn logout() -> Self {
        Self::new(RequestType::Logout)
    }

    /// UPDATE_PAIRING request.
    pub fn update_pairing() -> Self {
        Self::new(RequestType::UpdatePairing)
    }

    /// SEND_INVITATION request.
    pub fn send_invitation(opponent: &str) -> Self {
        Self::with_data(RequestType::SendInvitation, Value::from(opponent))
    }

    /// ACCEPT_INVITATION request.
    pub fn accept_invitation(event_id: EventId) -> Self {
        Self::with_data(RequestType::AcceptInvitation, Value::from(event_id))
    }

    /// DECLINE_INVITATION request.
    pub fn decline_invitation(event_id: EventId) -> Self {
        Self::with_data(RequestType::DeclineInvitation, Value::from(event_id))
    }

    /// ACKNOWLEDGE_RESPONSE request.
    pub fn acknowledge_response(event_id: EventId) -> Self {
        Self::with_data(RequestType::AcknowledgeResponse, Value::from(event_id))
    }

    /// REQUEST_MOVE request.
    pub fn request_move() -> Self {
        Self::new(RequestType::RequestMove)
    }

    /// SEND_MOVE request.
    pub fn send_move(mv: Move) -> Self {
        Self::with_data(RequestType::SendMove, json!({ "row": mv.row, "col": mv.col }))
    }

    /// ABORT_GAME request.
    pub fn abort_game() -> Self {
        Self::new(RequestType::AbortGame)
    }

    /// COMPLETE_GAME request.
    pub fn complete_game() -> Self {
        Self::new(RequestType::CompleteGame)
    }

    /// Decode the payload as `T`. A missing payload decodes as JSON `null`.
    pub fn decode_data<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_str(self.data.as_deref().unwrap_or("null"))
    }
}

// =============================================================================
// SERVER -> CLIENT
// =============================================================================

/// Outcome of processing a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ResponseStatus {
    /// Request processed.
    Success,
    /// Request rejected; `message` says why.
    Failure,
}

/// A server response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Response {
    /// Id of the request this answers.
    pub request_id: u64,
    /// Success or failure.
    pub status: ResponseStatus,
    /// Human-readable message (always set on failure).
    pub message: Option<String>,
    /// Typed payload.
    pub payload: ResponsePayload,
}

/// Payload of a response, keyed by the originating request type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "data", rename_all = "snake_case")]
pub enum ResponsePayload {
    /// No data (failures, SEND_MOVE, LOGOUT, ABORT/COMPLETE_GAME).
    None,
    /// LOGIN / REGISTER.
    User(User),
    /// UPDATE_PAIRING.
    Pairing(PairingSnapshot),
    /// SEND / ACCEPT / DECLINE_INVITATION, ACKNOWLEDGE_RESPONSE.
    Event(Event),
    /// REQUEST_MOVE.
    Move(MoveUpdate),
}

impl Response {
    /// Successful response.
    pub fn success(request_id: u64, payload: ResponsePayload) -> Self {
        Self {
            request_id,
            status: ResponseStatus::Success,
            message: None,
            payload,
        }
    }

    /// Failed response with a message shown to the user verbatim.
    pub fn failure(request_id: u64, message: impl Into<String>) -> Self {
        Self {
            request_id,
            status: ResponseStatus::Failure,
            message: Some(message.into()),
            payload: ResponsePayload::None,
        }
    }

    /// Whether the request succeeded.
    pub fn is_success(&self) -> bool {
        self.status == ResponseStatus::Success
    }
}

/// A user as seen by other clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    /// Unique account name.
    pub username: String,
    /// Name shown in lists.
    pub display_name: String,
    /// Never disclosed by the server; `null` on the wire.
    pub password_hash: Option<String>,
    /// Online and not engaged in another pairing.
    pub is_available: bool,
}

/// Status of an invitation event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventStatus {
    /// Sent, awaiting the recipient's answer.
    Pending,
    /// Recipient declined. Terminal.
    Declined,
    /// Recipient accepted, awaiting the inviter's acknowledgement.
    Accepted,
    /// Acknowledged; game in progress.
    Playing,
    /// Game finished normally. Terminal.
    Completed,
    /// Game or invitation cancelled. Terminal.
    Aborted,
}

impl EventStatus {
    /// Whether `self -> next` is a legal lifecycle step.
    pub fn can_transition_to(self, next: EventStatus) -> bool {
        use EventStatus::*;
        matches!(
            (self, next),
            (Pending, Declined)
                | (Pending, Accepted)
                | (Pending, Aborted)
                | (Accepted, Playing)
                | (Accepted, Aborted)
                | (Playing, Completed)
                | (Playing, Aborted)
        )
    }

    /// No further transitions possible.
    pub fn is_terminal(self) -> bool {
        matches!(self, EventStatus::Declined | EventStatus::Completed | EventStatus::Aborted)
    }
}

/// An invitation and the pairing that may follow it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    /// Server-assigned id.
    pub event_id: EventId,
    /// Inviter (player 1).
    pub sender: String,
    /// Invitee (player 2).
    pub recipient: String,
    /// Lifecycle status.
    pub status: EventStatus,
    /// Side length of the board for this pairing.
    pub board_side: usize,
    /// Creation time.
    pub created_at: DateTime<Utc>,
}

impl Event {
    /// Whether `username` is one of the two parties.
    pub fn involves(&self, username: &str) -> bool {
        self.sender == username || self.recipient == username
    }

    /// The other party, if `username` is one of them.
    pub fn opponent_of(&self, username: &str) -> Option<&str> {
        if self.sender == username {
            Some(&self.recipient)
        } else if self.recipient == username {
            Some(&self.sender)
        } else {
            None
        }
    }
}

/// Result of an UPDATE_PAIRING pull.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PairingSnapshot {
    /// Users that can be invited right now.
    pub available_users: Vec<User>,
    /// An invitation we sent whose status just changed.
    pub invitation_response: Option<Event>,
    /// A new invitation addressed to us.
    pub invitation: Option<Event>,
}

/// Result of a REQUEST_MOVE long-poll.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MoveUpdate {
    /// The opponent's move, `null` if none arrived within the wait.
    #[serde(rename = "move")]
    pub mv: Option<Move>,
    /// False once the game was completed, aborted or the opponent left.
    pub active: bool,
}

// =============================================================================
// SERIALIZATION HELPERS
// =============================================================================

impl Request {
    /// Serialize to JSON string.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Deserialize from JSON string.
    pub fn from_json(s: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }
}

impl Response {
    /// Serialize to JSON string.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Deserialize from JSON string.
    pub fn from_json(s: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }
}
