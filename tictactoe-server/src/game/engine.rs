//! Tic-Tac-Toe Engine
//!
//! Pure board-state machine: move legality, turn alternation,
//! win/draw detection and reset. No I/O, no clocks, no randomness, so
//! replaying the same moves always yields the same state.

use serde::{Serialize, Deserialize};
use thiserror::Error;

use crate::game::board::{Board, Cell, Move, Player, DEFAULT_SIDE};

/// Why a move was rejected. State is unchanged whenever one is returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum MoveError {
    /// Coordinates outside the board.
    #[error("move {0} is outside the board")]
    OutOfBounds(Move),
    /// Cell already marked.
    #[error("cell {0} is already taken")]
    Occupied(Move),
    /// The round is finished.
    #[error("the game is already over")]
    GameOver,
}

/// State of a round.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", content = "winner", rename_all = "snake_case")]
pub enum Outcome {
    /// Moves still possible, no line complete.
    InProgress,
    /// A player completed a line.
    Won(Player),
    /// Board full without a line.
    Draw,
}

/// A tic-tac-toe round.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TicTacToe {
    board: Board,
    starting_player: Player,
    current_player: Player,
    game_over: bool,
    winner: Option<Player>,
}

impl TicTacToe {
    /// Create a round on an empty `side`×`side` board.
    pub fn new(side: usize, starting_player: Player) -> Self {
        Self {
            board: Board::new(side),
            starting_player,
            current_player: starting_player,
            game_over: false,
            winner: None,
        }
    }

    /// Check a move without applying it.
    pub fn check(&self, mv: Move) -> Result<(), MoveError> {
        if self.game_over {
            return Err(MoveError::GameOver);
        }
        match self.board.get(mv.row, mv.col) {
            None => Err(MoveError::OutOfBounds(mv)),
            Some(Cell::Empty) => Ok(()),
            Some(_) => Err(MoveError::Occupied(mv)),
        }
    }

    /// Play for the current player. Returns the player who moved.
    pub fn play(&mut self, row: usize, col: usize) -> Result<Player, MoveError> {
        let mv = Move::new(row, col);
        self.check(mv)?;

        let mover = self.current_player;
        if !self.board.place(row, col, mover) {
            // check() already ruled this out
            return Err(MoveError::Occupied(mv));
        }

        if let Some(winner) = self.board.winning_player() {
            self.winner = Some(winner);
            self.game_over = true;
        } else if self.board.is_full() {
            self.game_over = true;
        }

        self.current_player = mover.other();
        Ok(mover)
    }

    /// Apply a `Move`.
    pub fn apply(&mut self, mv: Move) -> Result<Player, MoveError> {
        self.play(mv.row, mv.col)
    }

    /// A line is complete or the board is full.
    #[inline]
    pub fn is_game_over(&self) -> bool {
        self.game_over
    }

    /// Winner of the round, `None` while playing or on a draw.
    #[inline]
    pub fn winner(&self) -> Option<Player> {
        self.winner
    }

    /// Player whose turn it is.
    #[inline]
    pub fn current_player(&self) -> Player {
        self.current_player
    }

    /// Player who opens a fresh round.
    #[inline]
    pub fn starting_player(&self) -> Player {
        self.starting_player
    }

    /// Change who opens the next round. Takes effect on `reset`.
    pub fn set_starting_player(&mut self, player: Player) {
        self.starting_player = player;
    }

    /// Current board.
    pub fn board(&self) -> &Board {
        &self.board
    }

    /// Outcome of the round so far.
    pub fn outcome(&self) -> Outcome {
        match (self.game_over, self.winner) {
            (_, Some(p)) => Outcome::Won(p),
            (true, None) => Outcome::Draw,
            (false, None) => Outcome::InProgress,
        }
    }

    /// Human-readable summary.
    pub fn result(&self) -> String {
        match self.outcome() {
            Outcome::Won(p) => format!("{} won", p),
            Outcome::Draw => "Tie game".to_string(),
            Outcome::InProgress => "In progress".to_string(),
        }
    }

    /// Clear the board and hand the first move to the starting player.
    pub fn reset(&mut self) {
        self.board = Board::new(self.board.side());
        self.current_player = self.starting_player;
        self.game_over = false;
        self.winner = None;
    }
}

impl Default for TicTacToe {
    fn default() -> Self {
        Self::new(DEFAULT_SIDE, Player::One)
    }
}

/// Player who opens a given round of a pairing: rounds alternate starting
/// with player 1.
pub fn starting_player_for_round(round: u32) -> Player {
    if round % 2 == 0 {
        Player::One
    } else {
        Player::Two
    }
}
