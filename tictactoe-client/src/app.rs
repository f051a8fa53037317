//! Client App
//!
//! The foreground loop. It owns the coordinator, the current session and
//! the hooks, and is the only place client state changes. Input, timer
//! ticks and network completions all arrive as [`AppEvent`]s on one channel.

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use tictactoe::network::protocol::{Request, User};

use crate::command::{ClientCommand, Notice, PendingCall, SessionId};
use crate::config::ClientConfig;
use crate::hooks::PresentationHooks;
use crate::network::decode;
use crate::network::transport::TransportClient;
use crate::network::worker::{spawn_worker, Completion, NetworkJob};
use crate::pairing::PairingCoordinator;
use crate::session::{GameSession, SessionEndReason};
use crate::timer::PollTimer;

/// Something the user did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UserInput {
    /// Invite a user by name.
    Invite(String),
    /// Accept the pending invitation.
    Accept,
    /// Decline the pending invitation.
    Decline,
    /// Tap a board cell.
    TapCell {
        /// Row.
        row: usize,
        /// Column.
        col: usize,
    },
    /// Play another round.
    Replay,
    /// Leave the game.
    ExitGame,
    /// App went to the background.
    ForegroundLost,
    /// App came back.
    ForegroundRegained,
    /// Log out and stop.
    Logout,
}

/// Input to the app loop.
#[derive(Debug)]
pub enum AppEvent {
    /// Poll timer fired.
    Tick,
    /// User input.
    Input(UserInput),
    /// A network job finished.
    Completed(Completion),
}

/// Why the app loop stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitReason {
    /// The user logged out.
    LoggedOut,
    /// The connection to the server was lost.
    Disconnected,
}

/// Cloneable sender of user input.
#[derive(Debug, Clone)]
pub struct AppHandle {
    events: mpsc::UnboundedSender<AppEvent>,
}

impl AppHandle {
    /// Deliver input. Returns `false` once the app has stopped.
    pub fn send(&self, input: UserInput) -> bool {
        self.events.send(AppEvent::Input(input)).is_ok()
    }
}

/// A logged-in client.
pub struct ClientApp<H: PresentationHooks> {
    config: ClientConfig,
    user: User,
    coordinator: PairingCoordinator,
    session: Option<GameSession>,
    next_session_id: SessionId,
    hooks: H,
    transport: Option<TransportClient>,
    jobs: Option<mpsc::UnboundedSender<NetworkJob>>,
    worker: Option<JoinHandle<()>>,
    timer: PollTimer,
    events_tx: mpsc::UnboundedSender<AppEvent>,
    events_rx: mpsc::UnboundedReceiver<AppEvent>,
}

impl<H: PresentationHooks> ClientApp<H> {
    /// App for a user logged in over `transport`.
    pub fn new(config: ClientConfig, user: User, transport: TransportClient, hooks: H) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        Self {
            config,
            coordinator: PairingCoordinator::new(user.username.clone()),
            user,
            session: None,
            next_session_id: 0,
            hooks,
            transport: Some(transport),
            jobs: None,
            worker: None,
            timer: PollTimer::new(),
            events_tx,
            events_rx,
        }
    }

    /// Handle for feeding user input.
    pub fn handle(&self) -> AppHandle {
        AppHandle { events: self.events_tx.clone() }
    }

    /// Run until logout or connection loss.
    pub async fn run(mut self) -> ExitReason {
        if let Some(transport) = self.transport.take() {
            let (jobs_tx, jobs_rx) = mpsc::unbounded_channel();
            self.worker = Some(spawn_worker(transport, jobs_rx, self.events_tx.clone()));
            self.jobs = Some(jobs_tx);
        }

        info!("Client started for {}", self.user.username);
        self.coordinator.start();
        self.timer.start(self.config.poll_interval, self.events_tx.clone());

        let reason = loop {
            // we hold a sender, so the channel never closes under us
            let Some(event) = self.events_rx.recv().await else {
                break ExitReason::LoggedOut;
            };

            match event {
                AppEvent::Tick => self.coordinator.on_tick(),
                AppEvent::Input(UserInput::Logout) => break ExitReason::LoggedOut,
                AppEvent::Input(input) => self.handle_input(input),
                AppEvent::Completed(completion) => {
                    if let Err(e) = &completion.result {
                        if e.is_connection_lost() {
                            error!("Lost connection to server: {}", e);
                            if let Some(session) = self.session.take() {
                                info!("Session {} ended by connection loss", session.id());
                                self.hooks.on_session_ended(&SessionEndReason::Failed(e.to_string()));
                            }
                            self.hooks.on_disconnected();
                            break ExitReason::Disconnected;
                        }
                    }
                    self.handle_completion(completion);
                }
            }
            self.pump();
        };

        self.shutdown(reason).await;
        reason
    }

    fn handle_input(&mut self, input: UserInput) {
        let result = match input {
            UserInput::Invite(opponent) => self.coordinator.send_invitation(&opponent),
            UserInput::Accept => self.coordinator.accept_invitation(),
            UserInput::Decline => self.coordinator.decline_invitation(),
            UserInput::ForegroundLost => {
                self.coordinator.on_foreground_lost();
                Ok(())
            }
            UserInput::ForegroundRegained => {
                self.coordinator.on_foreground_regained();
                Ok(())
            }
            UserInput::TapCell { row, col } => match self.session.as_mut() {
                Some(session) => session.tap(row, col),
                None => Err(crate::error::ValidationError::NoSession),
            },
            UserInput::Replay => match self.session.as_mut() {
                Some(session) => session.replay(),
                None => Err(crate::error::ValidationError::NoSession),
            },
            UserInput::ExitGame => {
                if let Some(session) = self.session.as_mut() {
                    session.exit();
                }
                Ok(())
            }
            UserInput::Logout => Ok(()),
        };

        if let Err(e) = result {
            self.hooks.on_error(&e.to_string());
        }
    }

    fn handle_completion(&mut self, completion: Completion) {
        let Completion { call, result } = completion;
        match call {
            PendingCall::UpdatePairing => self.coordinator.handle_pairing_update(decode::pairing(result)),
            PendingCall::SendInvitation { opponent } => {
                debug!("Invitation to {} answered", opponent);
                self.coordinator.handle_invitation_sent(decode::event(result));
            }
            PendingCall::Acknowledge { event } => {
                self.coordinator.handle_acknowledge_result(event, decode::event(result));
            }
            PendingCall::Accept { event } => self.coordinator.handle_accept_result(event, decode::event(result)),
            PendingCall::Decline { event } => self.coordinator.handle_decline_result(event, decode::event(result)),
            PendingCall::RequestMove { session } => match self.current_session(session) {
                Some(s) => s.handle_request_move_result(decode::move_update(result)),
                None => debug!("Discarding move poll of finished session {}", session),
            },
            PendingCall::SendMove { session, mv } => match self.current_session(session) {
                Some(s) => s.handle_send_move_result(mv, decode::empty(result)),
                None => debug!("Discarding move confirmation of finished session {}", session),
            },
            PendingCall::EndGame { session } => {
                if let Err(e) = decode::empty(result) {
                    debug!("Ending session {} on the server failed: {}", session, e);
                }
            }
            PendingCall::Logout => {}
        }
    }

    fn current_session(&mut self, id: SessionId) -> Option<&mut GameSession> {
        self.session.as_mut().filter(|s| s.id() == id)
    }

    /// Execute queued commands until none are left.
    fn pump(&mut self) {
        loop {
            let mut commands = self.coordinator.drain_commands();
            if let Some(session) = self.session.as_mut() {
                commands.extend(session.drain_commands());
            }
            if commands.is_empty() {
                break;
            }
            for command in commands {
                self.execute(command);
            }
        }
    }

    fn execute(&mut self, command: ClientCommand) {
        match command {
            ClientCommand::Send { request, call } => self.submit(request, call),
            ClientCommand::Notify(notice) => self.notify(notice),
            ClientCommand::BeginSession { event, player } => {
                self.next_session_id += 1;
                let id = self.next_session_id;
                match GameSession::new(id, event, player) {
                    Ok(mut session) => {
                        self.hooks.on_session_started(session.event(), player);
                        session.start();
                        self.session = Some(session);
                    }
                    Err(e) => {
                        error!("Cannot start session {}: {}", id, e);
                        self.hooks.on_error(&e.to_string());
                        self.submit(Request::abort_game(), PendingCall::EndGame { session: id });
                        self.coordinator.resume_polling();
                    }
                }
            }
            ClientCommand::LeaveSession { reason } => {
                if let Some(session) = self.session.take() {
                    info!("Session {} ended: {}", session.id(), reason);
                }
                self.hooks.on_session_ended(&reason);
                self.coordinator.resume_polling();
            }
        }
    }

    fn submit(&mut self, request: Request, call: PendingCall) {
        match &self.jobs {
            Some(jobs) => {
                if jobs.send(NetworkJob { request, call }).is_err() {
                    warn!("Network worker is gone; request dropped");
                }
            }
            None => warn!("No network worker; request dropped"),
        }
    }

    fn notify(&mut self, notice: Notice) {
        match notice {
            Notice::AvailableUsers(users) => self.hooks.on_available_users_changed(&users),
            Notice::IncomingInvitation(event) => self.hooks.on_incoming_invitation(&event),
            Notice::InvitationSent(event) => self.hooks.on_invitation_sent(&event),
            Notice::InvitationOutcome(event) => self.hooks.on_invitation_outcome(&event),
            Notice::MoveApplied { player, mv, board } => self.hooks.on_move_applied(player, mv, &board),
            Notice::RoundStarted { round, starting_player } => self.hooks.on_round_started(round, starting_player),
            Notice::GameOver { outcome, board } => self.hooks.on_game_over(outcome, &board),
            Notice::Error(message) => self.hooks.on_error(&message),
        }
    }

    async fn shutdown(&mut self, reason: ExitReason) {
        self.timer.stop();
        self.coordinator.close();

        if reason == ExitReason::LoggedOut {
            if let Some(mut session) = self.session.take() {
                session.exit();
                for command in session.drain_commands() {
                    if let ClientCommand::Send { request, call } = command {
                        self.submit(request, call);
                    }
                }
            }
            self.submit(Request::logout(), PendingCall::Logout);
        }

        // worker drains what is queued, then closes the transport
        self.jobs = None;
        if let Some(worker) = self.worker.take() {
            if let Err(e) = worker.await {
                warn!("Network worker ended abnormally: {}", e);
            }
        }
        info!("Client for {} stopped ({:?})", self.user.username, reason);
    }
}
