//! Pairing Lobby
//!
//! Authoritative store of online users and invitation events.
//! Owns the event lifecycle (PENDING → ACCEPTED → PLAYING → COMPLETED, with
//! DECLINED and ABORTED exits), the availability rule, and per-game move
//! inboxes validated against the game engine.
//!
//! All methods are synchronous; the server wraps the lobby in a `RwLock`
//! and only awaits on the [`Notify`] handed out by [`Lobby::take_move`].

use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::sync::Arc;
use chrono::{DateTime, Utc};
use thiserror::Error;
use tokio::sync::Notify;
use tracing::{debug, info};

use crate::game::board::{Move, Player, MAX_SIDE};
use crate::game::engine::{MoveError, TicTacToe, starting_player_for_round};
use crate::network::auth::{AuthError, UserDirectory};
use crate::network::protocol::{
    Credentials, Event, EventId, EventStatus, PairingSnapshot, Registration, User,
};

/// Lobby errors. Display strings are sent to the client verbatim.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum LobbyError {
    /// Registration or login failed.
    #[error(transparent)]
    Auth(#[from] AuthError),
    /// Request needs a logged-in connection.
    #[error("You are not logged in")]
    NotLoggedIn,
    /// Connection already carries a login.
    #[error("This connection is already logged in")]
    ConnectionInUse,
    /// Account is logged in elsewhere.
    #[error("User {0} is already logged in")]
    AlreadyOnline(String),
    /// No such account.
    #[error("User {0} does not exist")]
    UnknownUser(String),
    /// Invitee offline or busy.
    #[error("User {0} is not available")]
    UserUnavailable(String),
    /// Sender and recipient are the same.
    #[error("You cannot invite yourself")]
    SelfInvitation,
    /// Sender already has a pending invitation or a game.
    #[error("You already have an open invitation or game")]
    AlreadyPairing,
    /// No such event.
    #[error("Invitation {0} does not exist")]
    EventNotFound(EventId),
    /// Only the recipient may answer.
    #[error("Invitation {0} is not addressed to you")]
    NotRecipient(EventId),
    /// Only the sender may acknowledge.
    #[error("Invitation {0} was not sent by you")]
    NotSender(EventId),
    /// Event already finished.
    #[error("Invitation {0} is no longer active")]
    NoLongerActive(EventId),
    /// Response already acknowledged.
    #[error("Invitation {0} was already acknowledged")]
    AlreadyAcknowledged(EventId),
    /// Step not allowed by the lifecycle.
    #[error("Invitation {id} cannot change from {from:?} to {to:?}")]
    InvalidTransition {
        /// Event id.
        id: EventId,
        /// Current status.
        from: EventStatus,
        /// Requested status.
        to: EventStatus,
    },
    /// No game in progress for this user.
    #[error("You are not in a game")]
    NotInGame,
    /// Move sent out of turn.
    #[error("It is not your turn")]
    NotYourTurn,
    /// Move rejected by the engine.
    #[error("Illegal move: {0}")]
    IllegalMove(#[from] MoveError),
    /// COMPLETE_GAME before the round is decided.
    #[error("The game is still in progress")]
    GameInProgress,
}

/// Result of looking for the opponent's next move.
#[derive(Debug)]
pub enum MoveTake {
    /// A move is waiting.
    Ready(Move),
    /// Nothing yet; wait on this until the game changes.
    Waiting(Arc<Notify>),
    /// The game is over or gone.
    Inactive,
}

/// Server-side game attached to a PLAYING event.
#[derive(Debug)]
struct ServerGame {
    engine: TicTacToe,
    round: u32,
    /// Moves not yet delivered, keyed by the player who must receive them.
    inbox: BTreeMap<Player, VecDeque<Move>>,
}

impl ServerGame {
    fn new(side: usize) -> Self {
        Self {
            engine: TicTacToe::new(side, starting_player_for_round(0)),
            round: 0,
            inbox: BTreeMap::new(),
        }
    }

    fn submit(&mut self, player: Player, mv: Move) -> Result<(), LobbyError> {
        if self.engine.is_game_over() {
            // first move after a decided round opens the replay
            self.round += 1;
            self.engine.set_starting_player(starting_player_for_round(self.round));
            self.engine.reset();
        }
        if self.engine.current_player() != player {
            return Err(LobbyError::NotYourTurn);
        }
        self.engine.apply(mv)?;
        self.inbox.entry(player.other()).or_default().push_back(mv);
        Ok(())
    }

    fn take(&mut self, player: Player) -> Option<Move> {
        self.inbox.get_mut(&player).and_then(VecDeque::pop_front)
    }
}

/// An event plus the server's bookkeeping for it.
#[derive(Debug)]
struct EventRecord {
    event: Event,
    /// Inviter has seen the ACCEPTED, DECLINED or ABORTED answer.
    acknowledged: bool,
    game: Option<ServerGame>,
    updated_at: DateTime<Utc>,
    notify: Arc<Notify>,
}

impl EventRecord {
    fn player_of(&self, username: &str) -> Option<Player> {
        if self.event.sender == username {
            Some(Player::One)
        } else if self.event.recipient == username {
            Some(Player::Two)
        } else {
            None
        }
    }

    fn is_live_game(&self, username: &str) -> bool {
        self.event.involves(username)
            && matches!(self.event.status, EventStatus::Accepted | EventStatus::Playing)
    }

    /// Whether this event keeps `username` from another pairing.
    fn blocks(&self, username: &str) -> bool {
        match self.event.status {
            EventStatus::Pending => self.event.sender == username,
            EventStatus::Accepted | EventStatus::Playing => self.event.involves(username),
            _ => false,
        }
    }

    fn transition(&mut self, to: EventStatus) -> Result<(), LobbyError> {
        let from = self.event.status;
        if from.is_terminal() {
            return Err(LobbyError::NoLongerActive(self.event.event_id));
        }
        if !from.can_transition_to(to) {
            return Err(LobbyError::InvalidTransition { id: self.event.event_id, from, to });
        }
        self.event.status = to;
        self.updated_at = Utc::now();
        self.notify.notify_waiters();
        debug!("Event {} {:?} -> {:?}", self.event.event_id, from, to);
        Ok(())
    }
}

/// Online users and invitation events.
pub struct Lobby {
    directory: UserDirectory,
    online: BTreeSet<String>,
    events: BTreeMap<EventId, EventRecord>,
    next_event_id: EventId,
    board_side: usize,
}

impl Lobby {
    /// Create an empty lobby whose games use `board_side`×`board_side` boards.
    pub fn new(board_side: usize) -> Self {
        Self {
            directory: UserDirectory::new(),
            online: BTreeSet::new(),
            events: BTreeMap::new(),
            next_event_id: 1,
            board_side: board_side.clamp(1, MAX_SIDE),
        }
    }

    // =========================================================================
    // ACCOUNTS
    // =========================================================================

    /// Register an account.
    pub fn register(&mut self, registration: &Registration) -> Result<User, LobbyError> {
        let account = self.directory.register(registration)?;
        info!("Registered user {}", account.username);
        Ok(account.to_user(false))
    }

    /// Log a user in. One login per account at a time.
    pub fn login(&mut self, credentials: &Credentials) -> Result<User, LobbyError> {
        let user = self.directory.verify(credentials)?.to_user(true);
        if !self.online.insert(user.username.clone()) {
            return Err(LobbyError::AlreadyOnline(user.username));
        }
        info!("User {} logged in", user.username);
        Ok(User { is_available: self.is_available(&user.username), ..user })
    }

    /// Log a user out, aborting every live event they are part of.
    /// The other party of each aborted invitation still gets an answer.
    /// Returns the ids of the aborted events.
    pub fn logout(&mut self, username: &str) -> Vec<EventId> {
        self.online.remove(username);

        let mut aborted = Vec::new();
        for (id, record) in self.events.iter_mut() {
            if record.event.involves(username)
                && !record.event.status.is_terminal()
                && record.transition(EventStatus::Aborted).is_ok()
            {
                aborted.push(*id);
            }
            // no answer owed to the one who left
            if record.event.sender == username {
                record.acknowledged = true;
            }
        }
        info!("User {} logged out ({} events aborted)", username, aborted.len());
        aborted
    }

    /// Whether a user is logged in.
    pub fn is_online(&self, username: &str) -> bool {
        self.online.contains(username)
    }

    /// Online and not tied up in another pairing.
    pub fn is_available(&self, username: &str) -> bool {
        self.online.contains(username) && !self.events.values().any(|r| r.blocks(username))
    }

    // =========================================================================
    // PAIRING
    // =========================================================================

    /// Snapshot for an UPDATE_PAIRING pull.
    pub fn update_pairing(&self, username: &str) -> PairingSnapshot {
        let available_users = self
            .online
            .iter()
            .filter(|u| u.as_str() != username && self.is_available(u))
            .filter_map(|u| self.directory.get(u))
            .map(|account| account.to_user(true))
            .collect();

        let invitation_response = self
            .events
            .values()
            .find(|r| {
                r.event.sender == username
                    && !r.acknowledged
                    && matches!(
                        r.event.status,
                        EventStatus::Accepted | EventStatus::Declined | EventStatus::Aborted
                    )
            })
            .map(|r| r.event.clone());

        // oldest first; later ones surface after this one is answered
        let invitation = self
            .events
            .values()
            .find(|r| r.event.recipient == username && r.event.status == EventStatus::Pending)
            .map(|r| r.event.clone());

        PairingSnapshot { available_users, invitation_response, invitation }
    }

    /// Create a PENDING invitation.
    pub fn send_invitation(&mut self, sender: &str, opponent: &str) -> Result<Event, LobbyError> {
        let opponent = opponent.trim();
        if opponent == sender {
            return Err(LobbyError::SelfInvitation);
        }
        if !self.directory.contains(opponent) {
            return Err(LobbyError::UnknownUser(opponent.to_string()));
        }
        if !self.is_available(sender) {
            return Err(LobbyError::AlreadyPairing);
        }
        if !self.is_available(opponent) {
            return Err(LobbyError::UserUnavailable(opponent.to_string()));
        }

        let event_id = self.next_event_id;
        self.next_event_id += 1;

        let now = Utc::now();
        let event = Event {
            event_id,
            sender: sender.to_string(),
            recipient: opponent.to_string(),
            status: EventStatus::Pending,
            board_side: self.board_side,
            created_at: now,
        };
        self.events.insert(event_id, EventRecord {
            event: event.clone(),
            acknowledged: false,
            game: None,
            updated_at: now,
            notify: Arc::new(Notify::new()),
        });

        info!("Invitation {} from {} to {}", event_id, sender, opponent);
        Ok(event)
    }

    /// Recipient accepts. Other pending invitations involving either party
    /// are aborted.
    pub fn accept_invitation(&mut self, username: &str, event_id: EventId) -> Result<Event, LobbyError> {
        let record = self.events.get_mut(&event_id).ok_or(LobbyError::EventNotFound(event_id))?;
        if record.event.recipient != username {
            return Err(LobbyError::NotRecipient(event_id));
        }
        record.transition(EventStatus::Accepted)?;
        let event = record.event.clone();

        for (id, other) in self.events.iter_mut() {
            if *id != event_id
                && other.event.status == EventStatus::Pending
                && (other.event.involves(&event.sender) || other.event.involves(&event.recipient))
            {
                if let Err(e) = other.transition(EventStatus::Aborted) {
                    debug!("Could not abort invitation {}: {}", id, e);
                }
                // the accepter withdrew their own invitation
                if other.event.sender == username {
                    other.acknowledged = true;
                }
            }
        }

        info!("Invitation {} accepted by {}", event_id, username);
        Ok(event)
    }

    /// Recipient declines.
    pub fn decline_invitation(&mut self, username: &str, event_id: EventId) -> Result<Event, LobbyError> {
        let record = self.events.get_mut(&event_id).ok_or(LobbyError::EventNotFound(event_id))?;
        if record.event.recipient != username {
            return Err(LobbyError::NotRecipient(event_id));
        }
        record.transition(EventStatus::Declined)?;
        info!("Invitation {} declined by {}", event_id, username);
        Ok(record.event.clone())
    }

    /// Inviter acknowledges the answer. ACCEPTED becomes PLAYING and the
    /// game starts; DECLINED and ABORTED stay as they are.
    pub fn acknowledge_response(&mut self, username: &str, event_id: EventId) -> Result<Event, LobbyError> {
        let record = self.events.get_mut(&event_id).ok_or(LobbyError::EventNotFound(event_id))?;
        if record.event.sender != username {
            return Err(LobbyError::NotSender(event_id));
        }
        if record.acknowledged {
            return Err(LobbyError::AlreadyAcknowledged(event_id));
        }

        match record.event.status {
            EventStatus::Accepted => {
                record.transition(EventStatus::Playing)?;
                record.game = Some(ServerGame::new(record.event.board_side));
            }
            EventStatus::Declined | EventStatus::Aborted => {}
            status if status.is_terminal() => return Err(LobbyError::NoLongerActive(event_id)),
            from => {
                return Err(LobbyError::InvalidTransition { id: event_id, from, to: EventStatus::Playing });
            }
        }
        record.acknowledged = true;
        Ok(record.event.clone())
    }

    // =========================================================================
    // GAME
    // =========================================================================

    /// Submit a move for the user's PLAYING game.
    pub fn send_move(&mut self, username: &str, mv: Move) -> Result<(), LobbyError> {
        let record = self
            .events
            .values_mut()
            .find(|r| r.event.status == EventStatus::Playing && r.event.involves(username))
            .ok_or(LobbyError::NotInGame)?;
        let player = record.player_of(username).ok_or(LobbyError::NotInGame)?;
        let game = record.game.as_mut().ok_or(LobbyError::NotInGame)?;

        game.submit(player, mv)?;
        record.updated_at = Utc::now();
        record.notify.notify_waiters();
        debug!("Event {}: {} played {}", record.event.event_id, player, mv);
        Ok(())
    }

    /// Next move for `username` from their opponent.
    pub fn take_move(&mut self, username: &str) -> MoveTake {
        if let Some(record) = self.events.values_mut().find(|r| r.is_live_game(username)) {
            let player = match record.player_of(username) {
                Some(p) => p,
                None => return MoveTake::Inactive,
            };
            return match record.game.as_mut().and_then(|g| g.take(player)) {
                Some(mv) => MoveTake::Ready(mv),
                None => MoveTake::Waiting(record.notify.clone()),
            };
        }

        // the game just ended: hand over a final move still in the inbox
        let finished = self.events.values_mut().rev().find(|r| {
            r.game.is_some()
                && r.event.involves(username)
                && matches!(r.event.status, EventStatus::Completed | EventStatus::Aborted)
        });
        if let Some(record) = finished {
            if let Some(player) = record.player_of(username) {
                if let Some(mv) = record.game.as_mut().and_then(|g| g.take(player)) {
                    return MoveTake::Ready(mv);
                }
            }
        }
        MoveTake::Inactive
    }

    /// End the user's game as COMPLETED (round decided) or ABORTED.
    pub fn end_game(&mut self, username: &str, status: EventStatus) -> Result<Event, LobbyError> {
        let record = self
            .events
            .values_mut()
            .find(|r| r.is_live_game(username))
            .ok_or(LobbyError::NotInGame)?;

        if status == EventStatus::Completed {
            // a replay the other side already opened does not undo a decided round
            let decided = record
                .game
                .as_ref()
                .map(|g| g.engine.is_game_over() || g.round > 0)
                .unwrap_or(false);
            if !decided {
                return Err(LobbyError::GameInProgress);
            }
        }
        record.transition(status)?;
        info!("Event {} ended as {:?} by {}", record.event.event_id, status, username);
        Ok(record.event.clone())
    }

    // =========================================================================
    // HOUSEKEEPING
    // =========================================================================

    /// Drop finished events last touched before `cutoff`.
    pub fn purge_finished(&mut self, cutoff: DateTime<Utc>) -> usize {
        let before = self.events.len();
        self.events
            .retain(|_, r| !(r.event.status.is_terminal() && r.updated_at < cutoff));
        before - self.events.len()
    }

    /// Look up an event.
    pub fn event(&self, event_id: EventId) -> Option<&Event> {
        self.events.get(&event_id).map(|r| &r.event)
    }

    /// Number of online users.
    pub fn online_count(&self) -> usize {
        self.online.len()
    }

    /// Number of tracked events.
    pub fn event_count(&self) -> usize {
        self.events.len()
    }
}

impl Default for Lobby {
    fn default() -> Self {
        Self::new(crate::game::board::DEFAULT_SIDE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn lobby_with(users: &[&str]) -> Lobby {
        let mut lobby = Lobby::default();
        for user in users {
            lobby
                .register(&Registration {
                    username: user.to_string(),
                    display_name: user.to_uppercase(),
                    password: "pw".to_string(),
                })
                .unwrap();
            lobby
                .login(&Credentials { username: user.to_string(), password: "pw".to_string() })
                .unwrap();
        }
        lobby
    }

    fn playing_pair() -> (Lobby, EventId) {
        let mut lobby = lobby_with(&["alice", "bob"]);
        let id = lobby.send_invitation("alice", "bob").unwrap().event_id;
        lobby.accept_invitation("bob", id).unwrap();
        lobby.acknowledge_response("alice", id).unwrap();
        (lobby, id)
    }

    #[test]
    fn test_login_twice_rejected() {
        let mut lobby = lobby_with(&["alice"]);
        let err = lobby
            .login(&Credentials { username: "alice".into(), password: "pw".into() })
            .unwrap_err();
        assert_eq!(err, LobbyError::AlreadyOnline("alice".to_string()));
    }

    #[test]
    fn test_available_users_exclude_self_and_busy() {
        let mut lobby = lobby_with(&["alice", "bob", "carol"]);
        let names = |s: PairingSnapshot| -> Vec<String> {
            s.available_users.into_iter().map(|u| u.username).collect()
        };
        assert_eq!(names(lobby.update_pairing("alice")), vec!["bob", "carol"]);

        lobby.send_invitation("alice", "bob").unwrap();
        // alice waits on bob; bob can still be invited by others
        assert_eq!(names(lobby.update_pairing("carol")), vec!["bob"]);
    }

    #[test]
    fn test_invitation_rules() {
        let mut lobby = lobby_with(&["alice", "bob", "carol"]);
        assert_eq!(lobby.send_invitation("alice", "alice").unwrap_err(), LobbyError::SelfInvitation);
        assert_eq!(
            lobby.send_invitation("alice", "dave").unwrap_err(),
            LobbyError::UnknownUser("dave".to_string())
        );
        lobby.send_invitation("alice", "bob").unwrap();
        assert_eq!(lobby.send_invitation("alice", "carol").unwrap_err(), LobbyError::AlreadyPairing);
        assert_eq!(
            lobby.send_invitation("carol", "alice").unwrap_err(),
            LobbyError::UserUnavailable("alice".to_string())
        );
    }

    #[test]
    fn test_accept_then_acknowledge_reaches_playing() {
        let mut lobby = lobby_with(&["alice", "bob"]);
        let event = lobby.send_invitation("alice", "bob").unwrap();
        assert_eq!(lobby.update_pairing("bob").invitation, Some(event.clone()));

        let accepted = lobby.accept_invitation("bob", event.event_id).unwrap();
        assert_eq!(accepted.status, EventStatus::Accepted);

        let response = lobby.update_pairing("alice").invitation_response.unwrap();
        assert_eq!(response.status, EventStatus::Accepted);

        let playing = lobby.acknowledge_response("alice", event.event_id).unwrap();
        assert_eq!(playing.status, EventStatus::Playing);
        assert_eq!(lobby.update_pairing("alice").invitation_response, None);
        assert!(!lobby.is_available("alice"));
        assert!(!lobby.is_available("bob"));
    }

    #[test]
    fn test_only_sender_acknowledges_and_only_recipient_answers() {
        let mut lobby = lobby_with(&["alice", "bob"]);
        let id = lobby.send_invitation("alice", "bob").unwrap().event_id;
        assert_eq!(lobby.accept_invitation("alice", id).unwrap_err(), LobbyError::NotRecipient(id));
        assert_eq!(
            lobby.acknowledge_response("alice", id).unwrap_err(),
            LobbyError::InvalidTransition { id, from: EventStatus::Pending, to: EventStatus::Playing }
        );
        lobby.accept_invitation("bob", id).unwrap();
        assert_eq!(lobby.acknowledge_response("bob", id).unwrap_err(), LobbyError::NotSender(id));
    }

    #[test]
    fn test_declined_is_terminal() {
        let mut lobby = lobby_with(&["alice", "bob"]);
        let id = lobby.send_invitation("alice", "bob").unwrap().event_id;
        lobby.decline_invitation("bob", id).unwrap();

        let ack = lobby.acknowledge_response("alice", id).unwrap();
        assert_eq!(ack.status, EventStatus::Declined);
        assert_eq!(lobby.accept_invitation("bob", id).unwrap_err(), LobbyError::NoLongerActive(id));
        assert_eq!(lobby.acknowledge_response("alice", id).unwrap_err(), LobbyError::AlreadyAcknowledged(id));
        assert_eq!(lobby.event(id).unwrap().status, EventStatus::Declined);
        assert!(lobby.is_available("alice"));
    }

    #[test]
    fn test_accept_aborts_competing_invitations() {
        let mut lobby = lobby_with(&["alice", "bob", "carol"]);
        let first = lobby.send_invitation("alice", "bob").unwrap().event_id;
        let second = lobby.send_invitation("carol", "bob").unwrap().event_id;
        assert_eq!(lobby.update_pairing("bob").invitation.unwrap().event_id, first);

        lobby.accept_invitation("bob", first).unwrap();
        assert_eq!(lobby.event(second).unwrap().status, EventStatus::Aborted);
        assert_eq!(lobby.update_pairing("bob").invitation, None);
    }

    #[test]
    fn test_competing_inviter_learns_of_abort() {
        let mut lobby = lobby_with(&["alice", "bob", "carol", "dave"]);
        let first = lobby.send_invitation("alice", "bob").unwrap().event_id;
        let second = lobby.send_invitation("carol", "bob").unwrap().event_id;
        lobby.accept_invitation("bob", first).unwrap();

        let response = lobby.update_pairing("carol").invitation_response.unwrap();
        assert_eq!((response.event_id, response.status), (second, EventStatus::Aborted));

        let ack = lobby.acknowledge_response("carol", second).unwrap();
        assert_eq!(ack.status, EventStatus::Aborted);
        assert_eq!(lobby.update_pairing("carol").invitation_response, None);
        assert!(lobby.is_available("carol"));
        lobby.send_invitation("carol", "dave").unwrap();
    }

    #[test]
    fn test_recipient_logout_reports_abort_to_inviter() {
        let mut lobby = lobby_with(&["alice", "bob"]);
        let id = lobby.send_invitation("alice", "bob").unwrap().event_id;
        assert_eq!(lobby.logout("bob"), vec![id]);

        let response = lobby.update_pairing("alice").invitation_response.unwrap();
        assert_eq!(response.status, EventStatus::Aborted);
        lobby.acknowledge_response("alice", id).unwrap();
        assert_eq!(lobby.update_pairing("alice").invitation_response, None);
        assert_eq!(lobby.event(id).unwrap().status, EventStatus::Aborted);
    }

    #[test]
    fn test_inviter_logout_owes_no_answer() {
        let mut lobby = lobby_with(&["alice", "bob"]);
        lobby.send_invitation("alice", "bob").unwrap();
        lobby.logout("alice");
        lobby
            .login(&Credentials { username: "alice".into(), password: "pw".into() })
            .unwrap();
        assert_eq!(lobby.update_pairing("alice").invitation_response, None);
        assert_eq!(lobby.update_pairing("bob").invitation, None);
    }

    #[test]
    fn test_moves_follow_server_turn_order() {
        let (mut lobby, _) = playing_pair();
        assert_eq!(lobby.send_move("bob", Move::new(0, 0)).unwrap_err(), LobbyError::NotYourTurn);
        lobby.send_move("alice", Move::new(0, 0)).unwrap();
        assert_eq!(
            lobby.send_move("bob", Move::new(0, 0)).unwrap_err(),
            LobbyError::IllegalMove(MoveError::Occupied(Move::new(0, 0)))
        );

        match lobby.take_move("bob") {
            MoveTake::Ready(mv) => assert_eq!(mv, Move::new(0, 0)),
            other => panic!("expected a move, got {:?}", other),
        }
        assert!(matches!(lobby.take_move("bob"), MoveTake::Waiting(_)));
        assert!(matches!(lobby.take_move("alice"), MoveTake::Waiting(_)));
    }

    #[test]
    fn test_invitee_waits_before_acknowledgement() {
        let mut lobby = lobby_with(&["alice", "bob"]);
        let id = lobby.send_invitation("alice", "bob").unwrap().event_id;
        lobby.accept_invitation("bob", id).unwrap();
        assert!(matches!(lobby.take_move("bob"), MoveTake::Waiting(_)));
        assert_eq!(lobby.send_move("alice", Move::new(1, 1)).unwrap_err(), LobbyError::NotInGame);
    }

    #[test]
    fn test_replay_alternates_starter() {
        let (mut lobby, _) = playing_pair();
        for (user, r, c) in [("alice", 0, 0), ("bob", 1, 0), ("alice", 0, 1), ("bob", 1, 1), ("alice", 0, 2)] {
            lobby.send_move(user, Move::new(r, c)).unwrap();
        }
        // round two: bob opens
        assert_eq!(lobby.send_move("alice", Move::new(2, 2)).unwrap_err(), LobbyError::NotYourTurn);
        lobby.send_move("bob", Move::new(2, 2)).unwrap();
    }

    #[test]
    fn test_final_move_delivered_after_completion() {
        let (mut lobby, id) = playing_pair();
        for (user, r, c) in [("alice", 0, 0), ("bob", 1, 0), ("alice", 0, 1), ("bob", 1, 1), ("alice", 0, 2)] {
            lobby.send_move(user, Move::new(r, c)).unwrap();
            let opponent = if user == "alice" { "bob" } else { "alice" };
            if (r, c) != (0, 2) {
                assert!(matches!(lobby.take_move(opponent), MoveTake::Ready(_)));
            }
        }
        lobby.end_game("alice", EventStatus::Completed).unwrap();
        assert_eq!(lobby.event(id).unwrap().status, EventStatus::Completed);

        assert!(matches!(lobby.take_move("bob"), MoveTake::Ready(mv) if mv == Move::new(0, 2)));
        assert!(matches!(lobby.take_move("bob"), MoveTake::Inactive));
    }

    #[test]
    fn test_complete_requires_decided_round() {
        let (mut lobby, _) = playing_pair();
        assert_eq!(lobby.end_game("alice", EventStatus::Completed).unwrap_err(), LobbyError::GameInProgress);
        lobby.end_game("bob", EventStatus::Aborted).unwrap();
        assert!(matches!(lobby.take_move("alice"), MoveTake::Inactive));
    }

    #[test]
    fn test_logout_aborts_live_events() {
        let (mut lobby, id) = playing_pair();
        let aborted = lobby.logout("alice");
        assert_eq!(aborted, vec![id]);
        assert_eq!(lobby.event(id).unwrap().status, EventStatus::Aborted);
        assert!(matches!(lobby.take_move("bob"), MoveTake::Inactive));
        assert!(!lobby.is_online("alice"));
        assert!(lobby.is_available("bob"));
    }

    #[test]
    fn test_purge_finished() {
        let (mut lobby, id) = playing_pair();
        lobby.end_game("alice", EventStatus::Aborted).unwrap();
        assert_eq!(lobby.purge_finished(Utc::now() - chrono::Duration::seconds(60)), 0);
        assert_eq!(lobby.purge_finished(Utc::now() + chrono::Duration::seconds(1)), 1);
        assert!(lobby.event(id).is_none());
    }

    #[derive(Debug, Clone, Copy)]
    enum Op {
        Accept,
        Decline,
        Acknowledge,
        LogoutSender,
        LogoutRecipient,
    }

    fn op_strategy() -> impl Strategy<Value = (Op, bool)> {
        (
            prop_oneof![
                Just(Op::Accept),
                Just(Op::Decline),
                Just(Op::Acknowledge),
                Just(Op::LogoutSender),
                Just(Op::LogoutRecipient),
            ],
            any::<bool>(),
        )
    }

    proptest! {
        #[test]
        fn prop_playing_needs_accept_then_ack(ops in proptest::collection::vec(op_strategy(), 1..12)) {
            let mut lobby = lobby_with(&["alice", "bob"]);
            let id = lobby.send_invitation("alice", "bob").unwrap().event_id;
            let mut seen_accept = false;

            for (op, as_sender) in ops {
                let actor = if as_sender { "alice" } else { "bob" };
                let before = lobby.event(id).unwrap().status;
                let result = match op {
                    Op::Accept => lobby.accept_invitation(actor, id).map(|_| ()),
                    Op::Decline => lobby.decline_invitation(actor, id).map(|_| ()),
                    Op::Acknowledge => lobby.acknowledge_response(actor, id).map(|_| ()),
                    Op::LogoutSender => { lobby.logout("alice"); Ok(()) }
                    Op::LogoutRecipient => { lobby.logout("bob"); Ok(()) }
                };
                let after = lobby.event(id).unwrap().status;

                if after == EventStatus::Accepted {
                    seen_accept = true;
                }
                if after == EventStatus::Playing && before != EventStatus::Playing {
                    prop_assert!(seen_accept);
                    prop_assert_eq!(before, EventStatus::Accepted);
                    prop_assert!(matches!(op, Op::Acknowledge) && as_sender);
                    prop_assert!(result.is_ok());
                }
                if before.is_terminal() {
                    prop_assert_eq!(after, before);
                }
            }
        }
    }
}
