//! Presentation hooks.

use tictactoe::game::board::{Board, Move, Player};
use tictactoe::game::engine::Outcome;
use tictactoe::network::protocol::{Event, User};

use crate::session::SessionEndReason;

/// Callbacks into the presentation shell. Every method defaults to a no-op.
pub trait PresentationHooks: Send {
    /// New list of invitable users.
    fn on_available_users_changed(&mut self, _users: &[User]) {}
    /// An invitation needs an accept/decline answer.
    fn on_incoming_invitation(&mut self, _invitation: &Event) {}
    /// Our invitation is waiting for the opponent.
    fn on_invitation_sent(&mut self, _invitation: &Event) {}
    /// Our invitation was accepted or declined.
    fn on_invitation_outcome(&mut self, _event: &Event) {}
    /// A game session began.
    fn on_session_started(&mut self, _event: &Event, _local_player: Player) {}
    /// A move landed on the board.
    fn on_move_applied(&mut self, _player: Player, _mv: Move, _board: &Board) {}
    /// A new round began.
    fn on_round_started(&mut self, _round: u32, _starting_player: Player) {}
    /// The round is decided; replay or exit.
    fn on_game_over(&mut self, _outcome: Outcome, _board: &Board) {}
    /// The session is over.
    fn on_session_ended(&mut self, _reason: &SessionEndReason) {}
    /// Transient or protocol error.
    fn on_error(&mut self, _message: &str) {}
    /// The connection is gone; the app is stopping.
    fn on_disconnected(&mut self) {}
}
