//! Client error taxonomy.

use thiserror::Error;
use tictactoe::game::engine::MoveError;

use crate::network::transport::TransportError;

/// Input rejected locally, before any request is sent.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// A required field was blank.
    #[error("{0} must not be empty")]
    EmptyField(&'static str),
    /// Password and confirmation differ.
    #[error("Passwords do not match")]
    PasswordMismatch,
    /// Tried to invite ourselves.
    #[error("You cannot invite yourself")]
    SelfInvitation,
    /// An invitation is already open or being sent.
    #[error("An invitation is already in progress")]
    InvitationInProgress,
    /// Accept/decline without an incoming invitation.
    #[error("There is no invitation to answer")]
    NoInvitation,
    /// Not in a game.
    #[error("No game in progress")]
    NoSession,
    /// Replay before the round is decided.
    #[error("The round is not over yet")]
    RoundNotOver,
    /// Pairing announced a board side we cannot play.
    #[error("Unsupported board size {0}")]
    BoardSize(usize),
    /// Tap on a cell the engine rejects.
    #[error("Illegal move: {0}")]
    IllegalMove(#[from] MoveError),
}

/// Client errors.
#[derive(Debug, Error)]
pub enum ClientError {
    /// Rejected before reaching the network.
    #[error(transparent)]
    Validation(#[from] ValidationError),
    /// Channel-level failure.
    #[error(transparent)]
    Transport(#[from] TransportError),
    /// Server answered FAILURE (message verbatim) or sent an unexpected payload.
    #[error("{0}")]
    Protocol(String),
    /// Invalid or out-of-order move received from the network.
    #[error("Invalid move from network: {0}")]
    Logic(String),
}

impl ClientError {
    /// The channel to the server is gone for good.
    pub fn is_connection_lost(&self) -> bool {
        matches!(self, ClientError::Transport(e) if e.is_connection_lost())
    }
}
