//! Game Logic Module
//!
//! Board rules shared by the server (turn validation) and the client
//! (local board). 100% deterministic.
//!
//! ## Module Structure
//!
//! - `board`: Cells, moves, line checks
//! - `engine`: Turn alternation, win/draw detection, reset

pub mod board;
pub mod engine;

// Re-export key types
pub use board::{Board, Cell, Move, Player, DEFAULT_SIDE, MAX_SIDE};
pub use engine::{MoveError, Outcome, TicTacToe, starting_player_for_round};
