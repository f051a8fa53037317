//! Tic-Tac-Toe Client
//!
//! Line-based terminal shell. Logs go to stderr, the game to stdout.
//! Stdin is read on its own thread so a lost connection can end the
//! process without waiting for the next line.
//!
//! Before login:  `register <user> <display name> <password> <confirm>`,
//!                `login <user> <password>`, `quit`
//! After login:   `invite <user>`, `accept`, `decline`, `play <row> <col>`,
//!                `replay`, `exit`, `away`, `back`, `logout`

use std::io::BufRead;

use anyhow::Context;
use tokio::sync::mpsc;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use tictactoe::game::board::{Board, Move, Player};
use tictactoe::game::engine::Outcome;
use tictactoe::network::protocol::{Event, EventStatus, User};
use tictactoe_client::{
    auth, hooks::PresentationHooks, session::SessionEndReason, ClientApp, ClientConfig, ExitReason,
    UserInput,
};

struct TerminalHooks {
    local_player: Option<Player>,
}

impl PresentationHooks for TerminalHooks {
    fn on_available_users_changed(&mut self, users: &[User]) {
        if users.is_empty() {
            println!("No players available.");
        } else {
            let names: Vec<String> =
                users.iter().map(|u| format!("{} ({})", u.username, u.display_name)).collect();
            println!("Available: {}", names.join(", "));
        }
    }

    fn on_incoming_invitation(&mut self, invitation: &Event) {
        println!("{} invites you to play. Type `accept` or `decline`.", invitation.sender);
    }

    fn on_invitation_sent(&mut self, invitation: &Event) {
        println!("Waiting for {} to answer...", invitation.recipient);
    }

    fn on_invitation_outcome(&mut self, event: &Event) {
        match event.status {
            EventStatus::Accepted | EventStatus::Playing => println!("{} accepted.", event.recipient),
            EventStatus::Declined => println!("{} declined your invitation.", event.recipient),
            status => println!("Your invitation to {} ended ({:?}).", event.recipient, status),
        }
    }

    fn on_session_started(&mut self, event: &Event, local_player: Player) {
        self.local_player = Some(local_player);
        println!(
            "Game on: {} vs {}. You are {} ({}).",
            event.sender,
            event.recipient,
            local_player,
            local_player.mark()
        );
    }

    fn on_move_applied(&mut self, player: Player, mv: Move, board: &Board) {
        println!("{} played {}\n{}", player, mv, board);
    }

    fn on_round_started(&mut self, round: u32, starting_player: Player) {
        let whose = if Some(starting_player) == self.local_player { "you start" } else { "opponent starts" };
        println!("Round {}: {}.", round + 1, whose);
    }

    fn on_game_over(&mut self, outcome: Outcome, _board: &Board) {
        let text = match outcome {
            Outcome::Won(p) if Some(p) == self.local_player => "You won!".to_string(),
            Outcome::Won(p) => format!("{} won.", p),
            Outcome::Draw => "Tie game.".to_string(),
            Outcome::InProgress => return,
        };
        println!("{} Type `replay` or `exit`.", text);
    }

    fn on_session_ended(&mut self, reason: &SessionEndReason) {
        self.local_player = None;
        println!("Game over: {}.", reason);
    }

    fn on_error(&mut self, message: &str) {
        println!("! {}", message);
    }

    fn on_disconnected(&mut self) {
        println!("Connection to the server was lost.");
    }
}

fn parse_input(line: &str) -> Option<UserInput> {
    let mut words = line.split_whitespace();
    let input = match words.next()? {
        "invite" => UserInput::Invite(words.collect::<Vec<_>>().join(" ")),
        "accept" => UserInput::Accept,
        "decline" => UserInput::Decline,
        "play" => {
            let row = words.next()?.parse().ok()?;
            let col = words.next()?.parse().ok()?;
            UserInput::TapCell { row, col }
        }
        "replay" => UserInput::Replay,
        "exit" => UserInput::ExitGame,
        "away" => UserInput::ForegroundLost,
        "back" => UserInput::ForegroundRegained,
        "logout" => UserInput::Logout,
        _ => return None,
    };
    Some(input)
}

/// Forward lines from a plain thread. The channel closes at end of input.
fn spawn_line_reader<R: BufRead + Send + 'static>(reader: R) -> mpsc::UnboundedReceiver<String> {
    let (tx, rx) = mpsc::unbounded_channel();
    std::thread::spawn(move || {
        for line in reader.lines() {
            match line {
                Ok(line) => {
                    if tx.send(line).is_err() {
                        break;
                    }
                }
                Err(e) => {
                    warn!("Failed to read input: {}", e);
                    break;
                }
            }
        }
    });
    rx
}

/// Read commands until a login succeeds. `None` on quit or end of input.
async fn login_prompt(
    config: &ClientConfig,
    lines: &mut mpsc::UnboundedReceiver<String>,
) -> anyhow::Result<Option<(tictactoe_client::network::TransportClient, User)>> {
    println!("Commands: register <user> <display name> <password> <confirm> | login <user> <password> | quit");

    while let Some(line) = lines.recv().await {
        let words: Vec<&str> = line.split_whitespace().collect();
        match words.as_slice() {
            ["register", user, rest @ ..] if rest.len() >= 3 => {
                let (name_words, passwords) = rest.split_at(rest.len() - 2);
                let display_name = name_words.join(" ");
                match auth::registration(user, &display_name, passwords[0], passwords[1]) {
                    Ok(registration) => match auth::register(config, &registration).await {
                        Ok(user) => println!("Registered {}. You can log in now.", user.username),
                        Err(e) => println!("! {}", e),
                    },
                    Err(e) => println!("! {}", e),
                }
            }
            ["login", user, password] => match auth::credentials(user, password) {
                Ok(credentials) => match auth::login(config, &credentials).await {
                    Ok(session) => return Ok(Some(session)),
                    Err(e) => println!("! {}", e),
                },
                Err(e) => println!("! {}", e),
            },
            ["quit"] => return Ok(None),
            [] => {}
            _ => println!("Unknown command"),
        }
    }
    Ok(None)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to set tracing subscriber")?;

    let config = ClientConfig::from_env();
    info!("Server: {}", config.server_url);

    let mut lines = spawn_line_reader(std::io::BufReader::new(std::io::stdin()));
    let Some((transport, user)) = login_prompt(&config, &mut lines).await? else {
        return Ok(());
    };
    println!("Welcome, {}! Commands: invite <user> | accept | decline | play <row> <col> | replay | exit | logout", user.display_name);

    let app = ClientApp::new(config, user, transport, TerminalHooks { local_player: None });
    let handle = app.handle();

    let input_task = tokio::spawn(async move {
        while let Some(line) = lines.recv().await {
            match parse_input(&line) {
                Some(input) => {
                    let logout = input == UserInput::Logout;
                    if !handle.send(input) || logout {
                        break;
                    }
                }
                None if line.trim().is_empty() => {}
                None => println!("Unknown command"),
            }
        }
        // end of input logs out
        handle.send(UserInput::Logout);
    });

    let reason = app.run().await;
    input_task.abort();

    if reason == ExitReason::Disconnected {
        anyhow::bail!("Disconnected from server");
    }
    Ok(())
}
