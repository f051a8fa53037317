//! Pairing Coordinator
//!
//! Client side of the invitation handshake:
//!
//! ```text
//! IDLE → POLLING → INVITED ──────────────(accept)──────────→ PAIRED (player 2)
//!           │                                                   ▲
//!           └──→ AWAITING_ACCEPT → ACKNOWLEDGING ──(ack ok)─────┘ (player 1)
//! ```
//!
//! Pulls are driven by timer ticks and gated by `should_update_pairing`;
//! at most one pull is in flight. Results come back through the
//! `handle_*` methods; every outgoing step is queued as a [`ClientCommand`].

use tracing::{debug, error, info, warn};

use tictactoe::game::board::Player;
use tictactoe::network::protocol::{Event, EventStatus, PairingSnapshot, Request, User};

use crate::command::{ClientCommand, Notice, PendingCall};
use crate::error::{ClientError, ValidationError};

/// Where the handshake stands.
#[derive(Debug, Clone, PartialEq)]
pub enum PairingState {
    /// Not started.
    Idle,
    /// Pulling for users and invitations.
    Polling,
    /// Our invitation is waiting for an answer.
    AwaitingAccept {
        /// The invitation we sent.
        invitation: Event,
    },
    /// Someone invited us; accept or decline.
    Invited {
        /// The invitation to answer.
        invitation: Event,
    },
    /// Our invitation was accepted; acknowledgement in flight.
    Acknowledging {
        /// The ACCEPTED answer.
        response: Event,
    },
    /// A game session owns the screen.
    Paired {
        /// The pairing.
        event: Event,
        /// Our side.
        player: Player,
    },
    /// Logged out.
    Closed,
}

/// Drives one user's pairing.
#[derive(Debug)]
pub struct PairingCoordinator {
    username: String,
    state: PairingState,
    should_update_pairing: bool,
    pull_in_flight: bool,
    invite_in_flight: bool,
    answer_in_flight: bool,
    available: Vec<User>,
    commands: Vec<ClientCommand>,
}

impl PairingCoordinator {
    /// Coordinator for a logged-in user.
    pub fn new(username: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            state: PairingState::Idle,
            should_update_pairing: false,
            pull_in_flight: false,
            invite_in_flight: false,
            answer_in_flight: false,
            available: Vec::new(),
            commands: Vec::new(),
        }
    }

    /// Begin polling.
    pub fn start(&mut self) {
        if self.state == PairingState::Idle {
            self.resume_polling();
        }
    }

    /// Back to POLLING, e.g. after a session ended.
    pub fn resume_polling(&mut self) {
        if self.state == PairingState::Closed {
            return;
        }
        self.state = PairingState::Polling;
        self.should_update_pairing = true;
    }

    /// Stop for good.
    pub fn close(&mut self) {
        self.state = PairingState::Closed;
        self.should_update_pairing = false;
    }

    /// Timer tick: pull if allowed.
    pub fn on_tick(&mut self) {
        let polling = matches!(self.state, PairingState::Polling | PairingState::AwaitingAccept { .. });
        if !polling || !self.should_update_pairing || self.pull_in_flight {
            return;
        }
        self.pull_in_flight = true;
        self.send(Request::update_pairing(), PendingCall::UpdatePairing);
    }

    /// Screen went to the background.
    pub fn on_foreground_lost(&mut self) {
        self.should_update_pairing = false;
    }

    /// Screen came back.
    pub fn on_foreground_regained(&mut self) {
        if matches!(self.state, PairingState::Polling | PairingState::AwaitingAccept { .. }) {
            self.should_update_pairing = true;
        }
    }

    // =========================================================================
    // PULL RESULTS
    // =========================================================================

    /// Result of an UPDATE_PAIRING pull.
    pub fn handle_pairing_update(&mut self, result: Result<PairingSnapshot, ClientError>) {
        self.pull_in_flight = false;
        if self.state == PairingState::Closed {
            return;
        }

        let snapshot = match result {
            Ok(snapshot) => snapshot,
            Err(e) => {
                // polling flag untouched; the next tick retries
                warn!("Pairing update failed: {}", e);
                self.notify(Notice::Error(e.to_string()));
                return;
            }
        };

        if snapshot.available_users != self.available {
            self.available = snapshot.available_users.clone();
            self.notify(Notice::AvailableUsers(snapshot.available_users));
        }
        if let Some(response) = snapshot.invitation_response {
            self.handle_invitation_response(response);
        }
        if let Some(invitation) = snapshot.invitation {
            self.handle_incoming_invitation(invitation);
        }
    }

    fn handle_invitation_response(&mut self, response: Event) {
        match &self.state {
            PairingState::AwaitingAccept { invitation } if invitation.event_id != response.event_id => {
                if response.status.is_terminal() {
                    // an older invitation; clear it so the current answer can surface
                    debug!("Clearing stale answer {:?} for {}", response.status, response.event_id);
                    let call = PendingCall::Acknowledge { event: response.clone() };
                    self.send(Request::acknowledge_response(response.event_id), call);
                } else {
                    warn!("Answer for unknown invitation {} ignored", response.event_id);
                }
                return;
            }
            // Polling covers a SEND_INVITATION whose answer was lost
            PairingState::AwaitingAccept { .. } | PairingState::Polling => {}
            _ => {
                debug!("Answer for invitation {} ignored in {:?}", response.event_id, self.state);
                return;
            }
        }

        let call = PendingCall::Acknowledge { event: response.clone() };
        match response.status {
            EventStatus::Accepted => {
                info!("Invitation {} accepted by {}", response.event_id, response.recipient);
                self.should_update_pairing = false;
                self.send(Request::acknowledge_response(response.event_id), call);
                self.state = PairingState::Acknowledging { response };
            }
            EventStatus::Declined | EventStatus::Aborted => {
                info!("Invitation {} to {} ended as {:?}", response.event_id, response.recipient, response.status);
                self.send(Request::acknowledge_response(response.event_id), call);
                self.state = PairingState::Polling;
                self.notify(Notice::InvitationOutcome(response));
            }
            status => warn!("Unexpected answer status {:?} for {}", status, response.event_id),
        }
    }

    fn handle_incoming_invitation(&mut self, invitation: Event) {
        match &self.state {
            PairingState::Polling if !self.invite_in_flight => {
                info!("Invitation {} from {}", invitation.event_id, invitation.sender);
                self.should_update_pairing = false;
                self.notify(Notice::IncomingInvitation(invitation.clone()));
                self.state = PairingState::Invited { invitation };
            }
            PairingState::Invited { invitation: current } if current.event_id == invitation.event_id => {}
            PairingState::Invited { invitation: current } => {
                error!(
                    "Second invitation {} from {} while {} is undecided; ignored",
                    invitation.event_id, invitation.sender, current.event_id
                );
            }
            _ => debug!("Invitation {} ignored in {:?}", invitation.event_id, self.state),
        }
    }

    // =========================================================================
    // INVITING
    // =========================================================================

    /// Invite `opponent`.
    pub fn send_invitation(&mut self, opponent: &str) -> Result<(), ValidationError> {
        let opponent = opponent.trim();
        if opponent.is_empty() {
            return Err(ValidationError::EmptyField("Opponent"));
        }
        if opponent == self.username {
            return Err(ValidationError::SelfInvitation);
        }
        if self.state != PairingState::Polling || self.invite_in_flight {
            return Err(ValidationError::InvitationInProgress);
        }

        self.invite_in_flight = true;
        self.send(
            Request::send_invitation(opponent),
            PendingCall::SendInvitation { opponent: opponent.to_string() },
        );
        Ok(())
    }

    /// Result of SEND_INVITATION.
    pub fn handle_invitation_sent(&mut self, result: Result<Event, ClientError>) {
        self.invite_in_flight = false;
        match result {
            Ok(invitation) if self.state == PairingState::Polling => {
                info!("Invitation {} sent to {}", invitation.event_id, invitation.recipient);
                self.notify(Notice::InvitationSent(invitation.clone()));
                self.state = PairingState::AwaitingAccept { invitation };
            }
            Ok(invitation) => {
                warn!("Invitation {} confirmed in {:?}", invitation.event_id, self.state);
            }
            Err(e) => self.notify(Notice::Error(e.to_string())),
        }
    }

    /// Result of ACKNOWLEDGE_RESPONSE for `response`.
    pub fn handle_acknowledge_result(&mut self, response: Event, result: Result<Event, ClientError>) {
        if response.status != EventStatus::Accepted {
            if let Err(e) = result {
                debug!("Acknowledging {:?} invitation {} failed: {}", response.status, response.event_id, e);
            }
            return;
        }
        if !matches!(&self.state, PairingState::Acknowledging { response: r } if r.event_id == response.event_id) {
            debug!("Acknowledgement for {} arrived in {:?}", response.event_id, self.state);
            return;
        }

        match result {
            Ok(event) if event.status == EventStatus::Playing => {
                self.notify(Notice::InvitationOutcome(response));
                self.pair(event, Player::One);
            }
            Ok(event) => {
                // opponent left between accepting and our acknowledgement
                info!("Invitation {} ended as {:?} before the game began", event.event_id, event.status);
                self.notify(Notice::InvitationOutcome(event));
                self.resume_polling();
            }
            Err(e) => {
                self.notify(Notice::Error(e.to_string()));
                self.resume_polling();
            }
        }
    }

    // =========================================================================
    // ANSWERING
    // =========================================================================

    fn pending_invitation(&self) -> Result<Event, ValidationError> {
        match &self.state {
            PairingState::Invited { invitation } if !self.answer_in_flight => Ok(invitation.clone()),
            _ => Err(ValidationError::NoInvitation),
        }
    }

    /// Accept the current invitation.
    pub fn accept_invitation(&mut self) -> Result<(), ValidationError> {
        let invitation = self.pending_invitation()?;
        self.answer_in_flight = true;
        self.send(
            Request::accept_invitation(invitation.event_id),
            PendingCall::Accept { event: invitation },
        );
        Ok(())
    }

    /// Result of ACCEPT_INVITATION.
    pub fn handle_accept_result(&mut self, invitation: Event, result: Result<Event, ClientError>) {
        self.answer_in_flight = false;
        match result {
            Ok(event) => {
                info!("Accepted invitation {} from {}", invitation.event_id, invitation.sender);
                self.pair(event, Player::Two);
            }
            Err(e) => {
                self.notify(Notice::Error(e.to_string()));
                self.resume_polling();
            }
        }
    }

    /// Decline the current invitation.
    pub fn decline_invitation(&mut self) -> Result<(), ValidationError> {
        let invitation = self.pending_invitation()?;
        self.answer_in_flight = true;
        self.send(
            Request::decline_invitation(invitation.event_id),
            PendingCall::Decline { event: invitation },
        );
        Ok(())
    }

    /// Result of DECLINE_INVITATION.
    pub fn handle_decline_result(&mut self, invitation: Event, result: Result<Event, ClientError>) {
        self.answer_in_flight = false;
        match result {
            Ok(_) => debug!("Declined invitation {}", invitation.event_id),
            Err(e) => self.notify(Notice::Error(e.to_string())),
        }
        self.resume_polling();
    }

    // =========================================================================
    // INTERNALS
    // =========================================================================

    fn pair(&mut self, event: Event, player: Player) {
        self.should_update_pairing = false;
        self.state = PairingState::Paired { event: event.clone(), player };
        self.commands.push(ClientCommand::BeginSession { event, player });
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

    /// Current state.
    pub fn state(&self) -> &PairingState {
        &self.state
    }

    /// Whether timer ticks may pull.
    pub fn should_update_pairing(&self) -> bool {
        self.should_update_pairing
    }

    /// Logged-in user.
    pub fn username(&self) -> &str {
        &self.username
    }

    /// Last known invitable users.
    pub fn available_users(&self) -> &[User] {
        &self.available
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use tictactoe::network::protocol::RequestType;
    use crate::network::transport::TransportError;

    fn event(id: u64, status: EventStatus) -> Event {
        Event {
            event_id: id,
            sender: "alice".to_string(),
            recipient: "bob".to_string(),
            status,
            board_side: 3,
            created_at: Utc::now(),
        }
    }

    fn user(name: &str) -> User {
        User {
            username: name.to_string(),
            display_name: name.to_uppercase(),
            password_hash: None,
            is_available: true,
        }
    }

    fn polling(name: &str) -> PairingCoordinator {
        let mut c = PairingCoordinator::new(name);
        c.start();
        c
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

    fn snapshot(response: Option<Event>, invitation: Option<Event>) -> PairingSnapshot {
        PairingSnapshot { available_users: vec![], invitation_response: response, invitation }
    }

    #[test]
    fn test_tick_pulls_once_while_in_flight() {
        let mut c = polling("alice");
        c.on_tick();
        c.on_tick();
        assert_eq!(sent_types(&c.drain_commands()), vec![RequestType::UpdatePairing]);

        c.handle_pairing_update(Ok(PairingSnapshot::default()));
        c.on_tick();
        assert_eq!(sent_types(&c.drain_commands()), vec![RequestType::UpdatePairing]);
    }

    #[test]
    fn test_idle_and_background_do_not_pull() {
        let mut c = PairingCoordinator::new("alice");
        c.on_tick();
        assert!(c.drain_commands().is_empty());

        c.start();
        c.on_foreground_lost();
        c.on_tick();
        assert!(c.drain_commands().is_empty());

        c.on_foreground_regained();
        c.on_tick();
        assert_eq!(sent_types(&c.drain_commands()), vec![RequestType::UpdatePairing]);
    }

    #[test]
    fn test_available_users_reported_on_change_only() {
        let mut c = polling("alice");
        let snap = PairingSnapshot { available_users: vec![user("bob")], ..Default::default() };
        c.handle_pairing_update(Ok(snap.clone()));
        c.handle_pairing_update(Ok(snap));
        let notices: Vec<_> = c
            .drain_commands()
            .into_iter()
            .filter(|cmd| matches!(cmd, ClientCommand::Notify(Notice::AvailableUsers(_))))
            .collect();
        assert_eq!(notices.len(), 1);
        assert_eq!(c.available_users(), &[user("bob")]);
    }

    #[test]
    fn test_scenario_accept_and_acknowledge() {
        let mut alice = polling("alice");
        let mut bob = polling("bob");

        alice.send_invitation("bob").unwrap();
        assert_eq!(sent_types(&alice.drain_commands()), vec![RequestType::SendInvitation]);
        alice.handle_invitation_sent(Ok(event(1, EventStatus::Pending)));
        assert!(matches!(alice.state(), PairingState::AwaitingAccept { .. }));

        bob.handle_pairing_update(Ok(snapshot(None, Some(event(1, EventStatus::Pending)))));
        assert!(matches!(bob.state(), PairingState::Invited { .. }));
        assert!(!bob.should_update_pairing());
        bob.drain_commands();

        bob.accept_invitation().unwrap();
        let commands = bob.drain_commands();
        assert_eq!(sent_types(&commands), vec![RequestType::AcceptInvitation]);
        bob.handle_accept_result(event(1, EventStatus::Pending), Ok(event(1, EventStatus::Accepted)));
        assert!(matches!(bob.state(), PairingState::Paired { player: Player::Two, .. }));
        assert!(bob
            .drain_commands()
            .iter()
            .any(|c| matches!(c, ClientCommand::BeginSession { player: Player::Two, .. })));

        alice.handle_pairing_update(Ok(snapshot(Some(event(1, EventStatus::Accepted)), None)));
        assert!(matches!(alice.state(), PairingState::Acknowledging { .. }));
        assert!(!alice.should_update_pairing());
        // not paired until the acknowledgement succeeds
        assert!(!alice.drain_commands().iter().any(|c| matches!(c, ClientCommand::BeginSession { .. })));

        alice.handle_acknowledge_result(event(1, EventStatus::Accepted), Ok(event(1, EventStatus::Playing)));
        assert!(matches!(alice.state(), PairingState::Paired { player: Player::One, .. }));
        assert!(alice
            .drain_commands()
            .iter()
            .any(|c| matches!(c, ClientCommand::BeginSession { player: Player::One, .. })));
    }

    #[test]
    fn test_scenario_declined() {
        let mut alice = polling("alice");
        alice.send_invitation("bob").unwrap();
        alice.handle_invitation_sent(Ok(event(1, EventStatus::Pending)));
        alice.drain_commands();

        alice.handle_pairing_update(Ok(snapshot(Some(event(1, EventStatus::Declined)), None)));
        assert_eq!(alice.state(), &PairingState::Polling);
        assert!(alice.should_update_pairing());

        let commands = alice.drain_commands();
        assert_eq!(sent_types(&commands), vec![RequestType::AcknowledgeResponse]);
        assert!(commands
            .iter()
            .any(|c| matches!(c, ClientCommand::Notify(Notice::InvitationOutcome(e)) if e.status == EventStatus::Declined)));
        assert!(!commands.iter().any(|c| matches!(c, ClientCommand::BeginSession { .. })));

        alice.on_tick();
        assert_eq!(sent_types(&alice.drain_commands()), vec![RequestType::UpdatePairing]);
    }

    #[test]
    fn test_aborted_invitation_frees_inviter() {
        let mut alice = polling("alice");
        alice.send_invitation("bob").unwrap();
        alice.handle_invitation_sent(Ok(event(1, EventStatus::Pending)));
        alice.drain_commands();

        // bob paired with someone else or logged out
        alice.handle_pairing_update(Ok(snapshot(Some(event(1, EventStatus::Aborted)), None)));
        assert_eq!(alice.state(), &PairingState::Polling);
        assert!(alice.should_update_pairing());
        let commands = alice.drain_commands();
        assert_eq!(sent_types(&commands), vec![RequestType::AcknowledgeResponse]);
        assert!(commands
            .iter()
            .any(|c| matches!(c, ClientCommand::Notify(Notice::InvitationOutcome(e)) if e.status == EventStatus::Aborted)));

        alice.send_invitation("carol").unwrap();
        assert_eq!(sent_types(&alice.drain_commands()), vec![RequestType::SendInvitation]);
    }

    #[test]
    fn test_abort_during_acknowledgement_returns_to_polling() {
        let mut alice = polling("alice");
        alice.send_invitation("bob").unwrap();
        alice.handle_invitation_sent(Ok(event(1, EventStatus::Pending)));
        alice.handle_pairing_update(Ok(snapshot(Some(event(1, EventStatus::Accepted)), None)));
        alice.drain_commands();

        alice.handle_acknowledge_result(event(1, EventStatus::Accepted), Ok(event(1, EventStatus::Aborted)));
        assert_eq!(alice.state(), &PairingState::Polling);
        assert!(!alice.drain_commands().iter().any(|c| matches!(c, ClientCommand::BeginSession { .. })));
    }

    #[test]
    fn test_stale_answer_is_cleared_while_awaiting() {
        let mut alice = polling("alice");
        alice.send_invitation("bob").unwrap();
        alice.handle_invitation_sent(Ok(event(2, EventStatus::Pending)));
        alice.drain_commands();

        alice.handle_pairing_update(Ok(snapshot(Some(event(1, EventStatus::Aborted)), None)));
        assert!(matches!(alice.state(), PairingState::AwaitingAccept { invitation } if invitation.event_id == 2));
        assert_eq!(sent_types(&alice.drain_commands()), vec![RequestType::AcknowledgeResponse]);
    }

    #[test]
    fn test_decline_returns_to_polling() {
        let mut bob = polling("bob");
        bob.handle_pairing_update(Ok(snapshot(None, Some(event(1, EventStatus::Pending)))));
        bob.decline_invitation().unwrap();
        bob.handle_decline_result(event(1, EventStatus::Pending), Ok(event(1, EventStatus::Declined)));
        assert_eq!(bob.state(), &PairingState::Polling);
        assert!(bob.should_update_pairing());
    }

    #[test]
    fn test_failed_accept_surfaces_error() {
        let mut bob = polling("bob");
        bob.handle_pairing_update(Ok(snapshot(None, Some(event(1, EventStatus::Pending)))));
        bob.accept_invitation().unwrap();
        bob.drain_commands();

        bob.handle_accept_result(
            event(1, EventStatus::Pending),
            Err(ClientError::Protocol("Invitation 1 is no longer active".into())),
        );
        assert_eq!(bob.state(), &PairingState::Polling);
        assert!(bob
            .drain_commands()
            .iter()
            .any(|c| matches!(c, ClientCommand::Notify(Notice::Error(m)) if m == "Invitation 1 is no longer active")));
    }

    #[test]
    fn test_second_invitation_ignored() {
        let mut bob = polling("bob");
        bob.handle_pairing_update(Ok(snapshot(None, Some(event(1, EventStatus::Pending)))));
        bob.drain_commands();

        // same invitation from a racing pull
        bob.handle_pairing_update(Ok(snapshot(None, Some(event(1, EventStatus::Pending)))));
        let mut other = event(2, EventStatus::Pending);
        other.sender = "carol".to_string();
        bob.handle_pairing_update(Ok(snapshot(None, Some(other))));

        match bob.state() {
            PairingState::Invited { invitation } => assert_eq!(invitation.event_id, 1),
            state => panic!("unexpected state {:?}", state),
        }
        assert!(bob.drain_commands().is_empty());
    }

    #[test]
    fn test_scenario_transport_failure_during_pull() {
        let mut c = polling("alice");
        c.on_tick();
        c.drain_commands();

        c.handle_pairing_update(Err(TransportError::Timeout(std::time::Duration::from_secs(1)).into()));
        assert!(c.should_update_pairing());
        assert_eq!(c.state(), &PairingState::Polling);
        assert!(c
            .drain_commands()
            .iter()
            .any(|cmd| matches!(cmd, ClientCommand::Notify(Notice::Error(_)))));

        c.on_tick();
        assert_eq!(sent_types(&c.drain_commands()), vec![RequestType::UpdatePairing]);
    }

    #[test]
    fn test_invitation_validation() {
        let mut c = polling("alice");
        assert_eq!(c.send_invitation("  "), Err(ValidationError::EmptyField("Opponent")));
        assert_eq!(c.send_invitation("alice"), Err(ValidationError::SelfInvitation));
        c.send_invitation("bob").unwrap();
        assert_eq!(c.send_invitation("carol"), Err(ValidationError::InvitationInProgress));
        assert_eq!(c.accept_invitation(), Err(ValidationError::NoInvitation));
    }

    #[test]
    fn test_closed_ignores_everything() {
        let mut c = polling("alice");
        c.close();
        c.on_tick();
        c.handle_pairing_update(Ok(snapshot(None, Some(event(1, EventStatus::Pending)))));
        c.resume_polling();
        assert_eq!(c.state(), &PairingState::Closed);
        assert!(c.drain_commands().is_empty());
    }
}
