//! Commands queued by the coordinator and the session.
//!
//! Neither component owns a channel or the hooks; each keeps a command list
//! that the app drains after every step and executes in order.

use tictactoe::game::board::{Board, Move, Player};
use tictactoe::game::engine::Outcome;
use tictactoe::network::protocol::{Event, Request, User};

use crate::session::SessionEndReason;

/// Identifies one game session on this client; results tagged with an old
/// id are discarded.
pub type SessionId = u64;

/// What a network result belongs to.
#[derive(Debug, Clone, PartialEq)]
pub enum PendingCall {
    /// UPDATE_PAIRING pull.
    UpdatePairing,
    /// SEND_INVITATION to `opponent`.
    SendInvitation {
        /// Invited username.
        opponent: String,
    },
    /// ACKNOWLEDGE_RESPONSE for an answered invitation.
    Acknowledge {
        /// The answer being acknowledged.
        event: Event,
    },
    /// ACCEPT_INVITATION.
    Accept {
        /// Invitation being accepted.
        event: Event,
    },
    /// DECLINE_INVITATION.
    Decline {
        /// Invitation being declined.
        event: Event,
    },
    /// REQUEST_MOVE long-poll.
    RequestMove {
        /// Session that asked.
        session: SessionId,
    },
    /// SEND_MOVE of a local move.
    SendMove {
        /// Session that asked.
        session: SessionId,
        /// Move awaiting confirmation.
        mv: Move,
    },
    /// ABORT_GAME or COMPLETE_GAME.
    EndGame {
        /// Session being torn down.
        session: SessionId,
    },
    /// LOGOUT.
    Logout,
}

/// Something the presentation layer should hear about.
#[derive(Debug, Clone, PartialEq)]
pub enum Notice {
    /// The list of invitable users changed.
    AvailableUsers(Vec<User>),
    /// Someone invited us.
    IncomingInvitation(Event),
    /// Our invitation was created.
    InvitationSent(Event),
    /// Our invitation was accepted or declined.
    InvitationOutcome(Event),
    /// A move was applied to the local board.
    MoveApplied {
        /// Who moved.
        player: Player,
        /// Where.
        mv: Move,
        /// Board after the move.
        board: Board,
    },
    /// A fresh round began.
    RoundStarted {
        /// Round number, from 0.
        round: u32,
        /// Who opens it.
        starting_player: Player,
    },
    /// The round was decided.
    GameOver {
        /// Result.
        outcome: Outcome,
        /// Final board.
        board: Board,
    },
    /// Transient or protocol error to show.
    Error(String),
}

/// A step for the app to carry out.
#[derive(Debug, Clone, PartialEq)]
pub enum ClientCommand {
    /// Queue a request on the network worker.
    Send {
        /// Request to send.
        request: Request,
        /// Continuation tag.
        call: PendingCall,
    },
    /// Tell the presentation layer.
    Notify(Notice),
    /// Pairing done: start a session.
    BeginSession {
        /// The PLAYING (or ACCEPTED) event.
        event: Event,
        /// Our side.
        player: Player,
    },
    /// Tear the current session down and return to polling.
    LeaveSession {
        /// Why.
        reason: SessionEndReason,
    },
}
