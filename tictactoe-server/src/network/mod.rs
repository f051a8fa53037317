//! Network Layer
//!
//! WebSocket server, wire protocol and the pairing lobby.
//! Game rules stay in `game/`; this layer only routes and validates.

pub mod auth;
pub mod protocol;
pub mod lobby;
pub mod server;

pub use auth::{Account, AuthError, UserDirectory};
pub use protocol::{
    Credentials, Event, EventId, EventStatus, MoveUpdate, PairingSnapshot, Registration,
    Request, RequestType, Response, ResponsePayload, ResponseStatus, User,
};
pub use lobby::{Lobby, LobbyError, MoveTake};
pub use server::{GameServer, ServerConfig, GameServerError};
