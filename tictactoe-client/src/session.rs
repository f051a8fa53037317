//! Session Controller
//!
//! One paired game. The local board is a [`TicTacToe`] engine; every move,
//! local or remote, goes through its legality check before it is applied.
//! While the opponent is to move the session keeps one REQUEST_MOVE
//! long-poll outstanding.

use tracing::{debug, info, warn};

use tictactoe::game::board::{Move, Player, MAX_SIDE};
use tictactoe::game::engine::{starting_player_for_round, TicTacToe};
use tictactoe::network::protocol::{Event, MoveUpdate, Request};

use crate::command::{ClientCommand, Notice, PendingCall, SessionId};
use crate::error::{ClientError, ValidationError};

/// Why a session ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEndReason {
    /// The local user chose to leave.
    LocalExit,
    /// The server reported the game inactive.
    OpponentLeft,
    /// A request failed; the game was abandoned.
    Failed(String),
}

impl std::fmt::Display for SessionEndReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionEndReason::LocalExit => write!(f, "you left the game"),
            SessionEndReason::OpponentLeft => write!(f, "your opponent left the game"),
            SessionEndReason::Failed(reason) => write!(f, "the game was abandoned: {}", reason),
        }
    }
}

/// A running game against one opponent.
#[derive(Debug)]
pub struct GameSession {
    id: SessionId,
    event: Event,
    local_player: Player,
    engine: TicTacToe,
    round: u32,
    poll_in_flight: bool,
    move_in_flight: Option<Move>,
    ended: bool,
    commands: Vec<ClientCommand>,
}

impl GameSession {
    /// Session for a pairing. Call [`start`](Self::start) to begin round 0.
    ///
    /// The board side comes off the wire and must lie in `1..=MAX_SIDE`.
    pub fn new(id: SessionId, event: Event, local_player: Player) -> Result<Self, ValidationError> {
        if !(1..=MAX_SIDE).contains(&event.board_side) {
            return Err(ValidationError::BoardSize(event.board_side));
        }
        let engine = TicTacToe::new(event.board_side, starting_player_for_round(0));
        Ok(Self {
            id,
            event,
            local_player,
            engine,
            round: 0,
            poll_in_flight: false,
            move_in_flight: None,
            ended: false,
            commands: Vec::new(),
        })
    }

    /// Announce round 0 and start waiting if the opponent opens.
    pub fn start(&mut self) {
        info!(
            "Session {} started as {} against {}",
            self.id,
            self.local_player,
            self.opponent()
        );
        self.notify(Notice::RoundStarted { round: 0, starting_player: self.engine.starting_player() });
        self.poll_if_waiting();
    }

    fn opponent(&self) -> &str {
        match self.local_player {
            Player::One => &self.event.recipient,
            Player::Two => &self.event.sender,
        }
    }

    /// Our turn in an undecided round.
    pub fn is_local_turn(&self) -> bool {
        !self.engine.is_game_over() && self.engine.current_player() == self.local_player
    }

    fn poll_if_waiting(&mut self) {
        if self.ended || self.poll_in_flight || self.engine.is_game_over() || self.is_local_turn() {
            return;
        }
        self.poll_in_flight = true;
        self.send(Request::request_move(), PendingCall::RequestMove { session: self.id });
    }

    // =========================================================================
    // LOCAL MOVES
    // =========================================================================

    /// The user tapped a cell.
    ///
    /// No-op when it is not our turn, a move is already on its way or the
    /// round is over. An illegal cell is rejected without touching the network.
    pub fn tap(&mut self, row: usize, col: usize) -> Result<(), ValidationError> {
        if self.ended || !self.is_local_turn() || self.move_in_flight.is_some() {
            debug!("Tap on ({}, {}) ignored", row, col);
            return Ok(());
        }

        let mv = Move::new(row, col);
        self.engine.check(mv)?;
        self.move_in_flight = Some(mv);
        self.send(Request::send_move(mv), PendingCall::SendMove { session: self.id, mv });
        Ok(())
    }

    /// Result of SEND_MOVE for `mv`.
    pub fn handle_send_move_result(&mut self, mv: Move, result: Result<(), ClientError>) {
        self.move_in_flight = None;
        if self.ended {
            return;
        }
        match result {
            Ok(()) => self.apply(mv, self.local_player),
            Err(ClientError::Protocol(message)) => {
                // server refused; board unchanged, user may try again
                warn!("Move {} rejected: {}", mv, message);
                self.notify(Notice::Error(message));
            }
            Err(e) => self.fail(e),
        }
    }

    // =========================================================================
    // REMOTE MOVES
    // =========================================================================

    /// Result of a REQUEST_MOVE long-poll.
    pub fn handle_request_move_result(&mut self, result: Result<MoveUpdate, ClientError>) {
        self.poll_in_flight = false;
        if self.ended {
            return;
        }

        let update = match result {
            Ok(update) => update,
            Err(e) => return self.fail(e),
        };
        if !update.active {
            info!("Session {}: opponent left", self.id);
            self.finish(SessionEndReason::OpponentLeft, false);
            return;
        }

        match update.mv {
            Some(mv) => match self.validate_remote(mv) {
                Ok(()) => self.apply(mv, self.local_player.other()),
                Err(e) => {
                    warn!("Session {}: discarding {}", self.id, e);
                    self.poll_if_waiting();
                }
            },
            None => self.poll_if_waiting(),
        }
    }

    fn validate_remote(&self, mv: Move) -> Result<(), ClientError> {
        if self.is_local_turn() || self.engine.is_game_over() {
            return Err(ClientError::Logic(format!("move {} arrived out of turn", mv)));
        }
        self.engine.check(mv).map_err(|e| ClientError::Logic(e.to_string()))
    }

    fn apply(&mut self, mv: Move, player: Player) {
        match self.engine.apply(mv) {
            Ok(mover) => {
                debug!("Session {}: {} played {}", self.id, mover, mv);
                if mover != player {
                    warn!("Session {}: expected {} to move, board says {}", self.id, player, mover);
                }
                self.notify(Notice::MoveApplied { player: mover, mv, board: self.engine.board().clone() });
            }
            Err(e) => {
                warn!("Session {}: could not apply {}: {}", self.id, mv, e);
                return;
            }
        }

        if self.engine.is_game_over() {
            info!("Session {} round {}: {}", self.id, self.round, self.engine.result());
            self.notify(Notice::GameOver {
                outcome: self.engine.outcome(),
                board: self.engine.board().clone(),
            });
        } else {
            self.poll_if_waiting();
        }
    }

    // =========================================================================
    // ROUNDS
    // =========================================================================

    /// Start the next round with the same opponent; the opener alternates.
    pub fn replay(&mut self) -> Result<(), ValidationError> {
        if self.ended || !self.engine.is_game_over() {
            return Err(ValidationError::RoundNotOver);
        }
        self.round += 1;
        self.engine.set_starting_player(starting_player_for_round(self.round));
        self.engine.reset();

        self.notify(Notice::RoundStarted { round: self.round, starting_player: self.engine.starting_player() });
        self.poll_if_waiting();
        Ok(())
    }

    /// Leave the game: COMPLETE_GAME after a decided round, ABORT_GAME otherwise.
    pub fn exit(&mut self) {
        if self.ended {
            return;
        }
        let request = if self.engine.is_game_over() { Request::complete_game() } else { Request::abort_game() };
        self.ended = true;
        self.send(request, PendingCall::EndGame { session: self.id });
        self.commands.push(ClientCommand::LeaveSession { reason: SessionEndReason::LocalExit });
    }

    fn fail(&mut self, error: ClientError) {
        warn!("Session {} failed: {}", self.id, error);
        self.notify(Notice::Error(error.to_string()));
        self.finish(SessionEndReason::Failed(error.to_string()), true);
    }

    fn finish(&mut self, reason: SessionEndReason, abort: bool) {
        self.ended = true;
        if abort {
            self.send(Request::abort_game(), PendingCall::EndGame { session: self.id });
        }
        self.commands.push(ClientCommand::LeaveSession { reason });
    }

    fn send(&mut self, request: Request, call: PendingCall) {
        self.commands.push(ClientCommand::Send { request, call });
    }

    fn notify(&mut self, notice: Notice) {
        self.commands.push(ClientCommand::Notify(notice));
    }

    /// Take queued commands.
    pub fn drain_commands(&mut self) -> Vec<ClientCommand> {
        std::mem::take(&mut self.commands)
    }

    /// Session id.
    pub fn id(&self) -> SessionId {
        self.id
    }

    /// The pairing.
    pub fn event(&self) -> &Event {
        &self.event
    }

    /// Our side.
    pub fn local_player(&self) -> Player {
        self.local_player
    }

    /// Local board state.
    pub fn engine(&self) -> &TicTacToe {
        &self.engine
    }

    /// Current round, from 0.
    pub fn round(&self) -> u32 {
        self.round
    }

    /// Whether the session was torn down.
    pub fn is_ended(&self) -> bool {
        self.ended
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use tictactoe::game::board::Cell;
    use tictactoe::game::engine::Outcome;
    use tictactoe::network::protocol::{EventStatus, RequestType};
    use crate::network::transport::TransportError;

    fn session(player: Player) -> GameSession {
        let event = Event {
            event_id: 1,
            sender: "alice".to_string(),
            recipient: "bob".to_string(),
            status: EventStatus::Playing,
            board_side: 3,
            created_at: Utc::now(),
        };
        let mut s = GameSession::new(7, event, player).unwrap();
        s.start();
        s
    }

    fn sent_types(commands: &[ClientCommand]) -> Vec<RequestType> {
        commands
            .iter()
            .filter_map(|c| match c {
                ClientCommand::Send { request, .. } => Some(request.request_type),
                _ => None,
            })
            .collect()
    }

    fn remote(mv: Option<Move>) -> Result<MoveUpdate, ClientError> {
        Ok(MoveUpdate { mv, active: true })
    }

    #[test]
    fn test_oversized_board_rejected() {
        let event = Event {
            event_id: 1,
            sender: "alice".to_string(),
            recipient: "bob".to_string(),
            status: EventStatus::Playing,
            board_side: usize::MAX,
            created_at: Utc::now(),
        };
        assert_eq!(
            GameSession::new(7, event.clone(), Player::One).err(),
            Some(ValidationError::BoardSize(usize::MAX))
        );
        let zero = Event { board_side: 0, ..event };
        assert!(GameSession::new(7, zero, Player::One).is_err());
    }

    #[test]
    fn test_player_two_polls_at_start() {
        let mut s = session(Player::Two);
        assert_eq!(sent_types(&s.drain_commands()), vec![RequestType::RequestMove]);

        let mut s = session(Player::One);
        assert!(sent_types(&s.drain_commands()).is_empty());
    }

    #[test]
    fn test_local_move_applied_after_confirmation() {
        let mut s = session(Player::One);
        s.drain_commands();

        s.tap(0, 0).unwrap();
        assert_eq!(sent_types(&s.drain_commands()), vec![RequestType::SendMove]);
        assert_eq!(s.engine().board().get(0, 0), Some(Cell::Empty));

        // second tap while in flight is a no-op
        s.tap(1, 1).unwrap();
        assert!(s.drain_commands().is_empty());

        s.handle_send_move_result(Move::new(0, 0), Ok(()));
        assert_eq!(s.engine().board().get(0, 0), Some(Cell::Player1));
        let commands = s.drain_commands();
        assert!(commands.iter().any(|c| matches!(c, ClientCommand::Notify(Notice::MoveApplied { player: Player::One, .. }))));
        assert_eq!(sent_types(&commands), vec![RequestType::RequestMove]);
    }

    #[test]
    fn test_tap_out_of_turn_is_noop() {
        let mut s = session(Player::Two);
        s.drain_commands();
        assert_eq!(s.tap(0, 0), Ok(()));
        assert!(s.drain_commands().is_empty());
    }

    #[test]
    fn test_illegal_tap_never_sent() {
        let mut s = session(Player::One);
        s.drain_commands();
        assert!(matches!(s.tap(4, 0), Err(ValidationError::IllegalMove(_))));
        assert!(s.drain_commands().is_empty());
    }

    #[test]
    fn test_scenario_invalid_remote_move_discarded() {
        let mut s = session(Player::Two);
        s.drain_commands();

        s.handle_request_move_result(remote(Some(Move::new(5, 5))));
        assert_eq!(s.engine().board().occupied(), 0);
        assert!(!s.is_ended());
        // still waiting for a real move
        assert_eq!(sent_types(&s.drain_commands()), vec![RequestType::RequestMove]);

        s.handle_request_move_result(remote(Some(Move::new(1, 1))));
        assert_eq!(s.engine().board().get(1, 1), Some(Cell::Player1));
        assert!(s.is_local_turn());
    }

    #[test]
    fn test_empty_poll_repolls() {
        let mut s = session(Player::Two);
        s.drain_commands();
        s.handle_request_move_result(remote(None));
        assert_eq!(sent_types(&s.drain_commands()), vec![RequestType::RequestMove]);
    }

    #[test]
    fn test_inactive_ends_session() {
        let mut s = session(Player::Two);
        s.drain_commands();
        s.handle_request_move_result(Ok(MoveUpdate { mv: None, active: false }));
        assert!(s.is_ended());
        let commands = s.drain_commands();
        assert!(sent_types(&commands).is_empty());
        assert!(commands.contains(&ClientCommand::LeaveSession { reason: SessionEndReason::OpponentLeft }));

        // late results are ignored
        s.handle_request_move_result(remote(Some(Move::new(0, 0))));
        assert!(s.drain_commands().is_empty());
    }

    #[test]
    fn test_transport_failure_aborts_session() {
        let mut s = session(Player::Two);
        s.drain_commands();
        s.handle_request_move_result(Err(TransportError::Timeout(std::time::Duration::from_secs(1)).into()));
        assert!(s.is_ended());
        let commands = s.drain_commands();
        assert_eq!(sent_types(&commands), vec![RequestType::AbortGame]);
        assert!(commands.iter().any(|c| matches!(c, ClientCommand::LeaveSession { reason: SessionEndReason::Failed(_) })));
    }

    #[test]
    fn test_rejected_move_keeps_board() {
        let mut s = session(Player::One);
        s.tap(0, 0).unwrap();
        s.drain_commands();
        s.handle_send_move_result(Move::new(0, 0), Err(ClientError::Protocol("It is not your turn".into())));
        assert_eq!(s.engine().board().occupied(), 0);
        assert!(!s.is_ended());
        assert!(s.is_local_turn());
    }

    fn play_win_for_one(s: &mut GameSession) {
        // local player one: (0,0) (0,1) (0,2), opponent (1,0) (1,1)
        for (local, opp) in [((0, 0), Some((1, 0))), ((0, 1), Some((1, 1))), ((0, 2), None)] {
            s.tap(local.0, local.1).unwrap();
            s.handle_send_move_result(Move::new(local.0, local.1), Ok(()));
            if let Some((r, c)) = opp {
                s.handle_request_move_result(remote(Some(Move::new(r, c))));
            }
        }
    }

    #[test]
    fn test_game_over_then_replay_alternates() {
        let mut s = session(Player::One);
        play_win_for_one(&mut s);
        assert!(s.engine().is_game_over());
        let commands = s.drain_commands();
        assert!(commands.iter().any(|c| matches!(
            c,
            ClientCommand::Notify(Notice::GameOver { outcome: Outcome::Won(Player::One), .. })
        )));

        // taps after game over do nothing
        s.tap(2, 2).unwrap();
        assert!(s.drain_commands().is_empty());

        s.replay().unwrap();
        assert_eq!(s.round(), 1);
        assert_eq!(s.engine().current_player(), Player::Two);
        let commands = s.drain_commands();
        assert!(commands.contains(&ClientCommand::Notify(Notice::RoundStarted { round: 1, starting_player: Player::Two })));
        assert_eq!(sent_types(&commands), vec![RequestType::RequestMove]);
    }

    #[test]
    fn test_replay_needs_decided_round() {
        let mut s = session(Player::One);
        assert_eq!(s.replay(), Err(ValidationError::RoundNotOver));
    }

    #[test]
    fn test_exit_sends_abort_or_complete() {
        let mut s = session(Player::One);
        s.drain_commands();
        s.exit();
        assert_eq!(sent_types(&s.drain_commands()), vec![RequestType::AbortGame]);

        let mut s = session(Player::One);
        play_win_for_one(&mut s);
        s.drain_commands();
        s.exit();
        s.exit();
        let commands = s.drain_commands();
        assert_eq!(sent_types(&commands), vec![RequestType::CompleteGame]);
        assert!(commands.contains(&ClientCommand::LeaveSession { reason: SessionEndReason::LocalExit }));
    }
}
