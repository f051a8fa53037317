//! # Tic-Tac-Toe Client
//!
//! Client core for remote tic-tac-toe: login, the pairing handshake and the
//! turn-taking session, driven by a single foreground loop.
//!
//! ```text
//!  user input ──┐                        ┌── PresentationHooks
//!  poll timer ──┼──► ClientApp ──────────┤
//!  completions ─┘     │  PairingCoordinator / GameSession
//!                     ▼
//!               NetworkWorker ──► TransportClient ──► server
//! ```
//!
//! The coordinator and the session never touch the network themselves.
//! They queue [`command::ClientCommand`]s which the app hands to the worker,
//! and they are fed the decoded results in turn.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod app;
pub mod auth;
pub mod command;
pub mod config;
pub mod error;
pub mod hooks;
pub mod network;
pub mod pairing;
pub mod session;
pub mod timer;

pub use app::{AppHandle, ClientApp, ExitReason, UserInput};
pub use config::ClientConfig;
pub use error::{ClientError, ValidationError};
pub use hooks::PresentationHooks;
pub use pairing::{PairingCoordinator, PairingState};
pub use session::{GameSession, SessionEndReason};
