//! Board Representation
//!
//! N×N grid of cells plus the line checks used for win detection.
//! Cells are stored row-major in a flat `Vec` so every board of the same
//! side length compares and hashes identically.

use std::fmt;
use serde::{Serialize, Deserialize};

/// Default board side length.
pub const DEFAULT_SIDE: usize = 3;

/// Largest supported board side.
pub const MAX_SIDE: usize = 16;

// =============================================================================
// PLAYER
// =============================================================================

/// One of the two seats at the board.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Player {
    /// Player 1, the inviter.
    One,
    /// Player 2, the invitee.
    Two,
}

impl Player {
    /// Wire/display number (1 or 2).
    #[inline]
    pub fn number(self) -> u8 {
        match self {
            Player::One => 1,
            Player::Two => 2,
        }
    }

    /// The other seat.
    #[inline]
    pub fn other(self) -> Player {
        match self {
            Player::One => Player::Two,
            Player::Two => Player::One,
        }
    }

    /// Board mark used when rendering.
    pub fn mark(self) -> char {
        match self {
            Player::One => 'X',
            Player::Two => 'O',
        }
    }
}

impl fmt::Display for Player {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Player {}", self.number())
    }
}

// =============================================================================
// CELL / MOVE
// =============================================================================

/// Contents of a single board cell.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Cell {
    /// Nobody has played here.
    #[default]
    Empty,
    /// Marked by player 1.
    Player1,
    /// Marked by player 2.
    Player2,
}

impl Cell {
    /// Owner of the cell, if any.
    pub fn owner(self) -> Option<Player> {
        match self {
            Cell::Empty => None,
            Cell::Player1 => Some(Player::One),
            Cell::Player2 => Some(Player::Two),
        }
    }
}

impl From<Player> for Cell {
    fn from(player: Player) -> Self {
        match player {
            Player::One => Cell::Player1,
            Player::Two => Cell::Player2,
        }
    }
}

/// A move on the board (0-indexed).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Move {
    /// Row index.
    pub row: usize,
    /// Column index.
    pub col: usize,
}

impl Move {
    /// Create a move.
    pub const fn new(row: usize, col: usize) -> Self {
        Self { row, col }
    }
}

impl fmt::Display for Move {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.row, self.col)
    }
}

// =============================================================================
// BOARD
// =============================================================================

/// Square game board.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Board {
    side: usize,
    cells: Vec<Cell>,
}

impl Board {
    /// Create an empty board. The side is clamped to `1..=MAX_SIDE`.
    pub fn new(side: usize) -> Self {
        let side = side.clamp(1, MAX_SIDE);
        Self {
            side,
            cells: vec![Cell::Empty; side * side],
        }
    }

    /// Side length.
    #[inline]
    pub fn side(&self) -> usize {
        self.side
    }

    /// Check whether coordinates are on the board.
    #[inline]
    pub fn in_bounds(&self, row: usize, col: usize) -> bool {
        row < self.side && col < self.side
    }

    /// Cell at coordinates, `None` when out of bounds.
    pub fn get(&self, row: usize, col: usize) -> Option<Cell> {
        if self.in_bounds(row, col) {
            Some(self.cells[row * self.side + col])
        } else {
            None
        }
    }

    /// Mark an empty cell. Returns false (board untouched) if the cell is
    /// out of bounds or already taken.
    pub(crate) fn place(&mut self, row: usize, col: usize, player: Player) -> bool {
        match self.get(row, col) {
            Some(Cell::Empty) => {
                self.cells[row * self.side + col] = Cell::from(player);
                true
            }
            _ => false,
        }
    }

    /// Every cell is taken.
    pub fn is_full(&self) -> bool {
        self.cells.iter().all(|c| *c != Cell::Empty)
    }

    /// Number of taken cells.
    pub fn occupied(&self) -> usize {
        self.cells.iter().filter(|c| **c != Cell::Empty).count()
    }

    /// Player owning a complete row, column or diagonal.
    pub fn winning_player(&self) -> Option<Player> {
        let n = self.side;

        for row in 0..n {
            if let Some(p) = self.line_owner((0..n).map(|col| (row, col))) {
                return Some(p);
            }
        }
        for col in 0..n {
            if let Some(p) = self.line_owner((0..n).map(|row| (row, col))) {
                return Some(p);
            }
        }
        if let Some(p) = self.line_owner((0..n).map(|i| (i, i))) {
            return Some(p);
        }
        self.line_owner((0..n).map(|i| (i, n - 1 - i)))
    }

    fn line_owner(&self, mut line: impl Iterator<Item = (usize, usize)>) -> Option<Player> {
        let (row, col) = line.next()?;
        let owner = self.get(row, col)?.owner()?;
        if line.all(|(r, c)| self.get(r, c).and_then(Cell::owner) == Some(owner)) {
            Some(owner)
        } else {
            None
        }
    }

    /// Iterate rows as cell slices.
    pub fn rows(&self) -> impl Iterator<Item = &[Cell]> {
        self.cells.chunks(self.side)
    }
}

impl Default for Board {
    fn default() -> Self {
        Self::new(DEFAULT_SIDE)
    }
}

impl fmt::Display for Board {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, row) in self.rows().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            let line: Vec<String> = row
                .iter()
                .map(|c| c.owner().map(Player::mark).unwrap_or('.').to_string())
                .collect();
            write!(f, "{}", line.join(" "))?;
        }
        Ok(())
    }
}
