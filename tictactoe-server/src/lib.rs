//! # Tic-Tac-Toe Server
//!
//! Pairing lobby and move relay for remote two-player tic-tac-toe.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    TIC-TAC-TOE SERVER                        │
//! ├─────────────────────────────────────────────────────────────┤
//! │  core/           - Primitives                                │
//! │  └── hash.rs     - Salted password digests                   │
//! │                                                              │
//! │  game/           - Game logic (pure)                         │
//! │  ├── board.rs    - Board, cells, players, moves              │
//! │  └── engine.rs   - Turn order, win/draw detection, reset     │
//! │                                                              │
//! │  network/        - Networking                                │
//! │  ├── protocol.rs - Request/response wire types               │
//! │  ├── auth.rs     - Account directory                         │
//! │  ├── lobby.rs    - Invitation events and game relay          │
//! │  └── server.rs   - WebSocket server                          │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! The `game/` engine is shared with the client crate, so both ends judge
//! move legality with the same code.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod core;
pub mod game;
pub mod network;

// Re-export commonly used types
pub use crate::core::hash::{CredentialHasher, PasswordDigest};
pub use game::board::{Board, Cell, Move, Player, DEFAULT_SIDE, MAX_SIDE};
pub use game::engine::{MoveError, Outcome, TicTacToe, starting_player_for_round};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
