//! # Tetris Rules
//!
//! Deterministic rules for one player's falling-block game. Everything in this
//! crate is a pure function of `(state, input)`: no clocks, no I/O and no
//! ambient randomness. Piece order comes from a 7-bag shuffle seeded by the
//! player's logical time, so replaying the same commands at the same times
//! always reproduces the same states.
//!
//! ## Module Organization
//!
//! - [`pieces`]: the piece geometry table (minos and rotation offsets)
//! - [`field`]: the locked-cell grid and line clearing
//! - [`queue`]: the upcoming-piece ring buffer and bag generation
//! - [`state`]: the per-player state machine (movement, rotation, gravity,
//!   locking, hold)
//! - [`command`]: timestamped player commands as they arrive from a transport

use serde::{Deserialize, Serialize};
use std::ops::{Add, Sub};

pub mod command;
pub mod field;
pub mod pieces;
pub mod queue;
pub mod state;

pub use command::{Command, CommandKind, PlayerId, UnknownCommand};
pub use field::{Field, Row};
pub use pieces::{Orientation, Tetromino};
pub use queue::NextQueue;
pub use state::{ActivePiece, PlayerState, Timer};

/// Total rows in the field, including the hidden rows above the visible area.
pub const FIELD_ROWS: usize = 40;
pub const FIELD_COLS: usize = 10;
/// Rows shown to players; the visible area is the bottom `VISIBLE_ROWS` rows.
pub const VISIBLE_ROWS: usize = 20;

/// Anchor cell a new piece spawns at, just above the visible area.
pub const SPAWN_POSITION: Position = Position::new(18, 4);

/// Milliseconds between automatic one-row falls.
pub const FALL_INTERVAL_MS: i64 = 220;
/// Milliseconds a grounded piece rests before it locks.
pub const LOCK_DELAY_MS: i64 = 500;

/// Slots in the upcoming-piece ring buffer.
pub const NEXT_QUEUE_CAPACITY: usize = 14;
/// A new bag is appended whenever fewer than this many pieces are queued.
pub const NEXT_REFILL_THRESHOLD: usize = 7;
/// Upcoming pieces a client is expected to display.
pub const PREVIEW_LEN: usize = 6;

/// A cell coordinate. Rows grow downward, columns grow to the right.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Position {
    pub row: i32,
    pub col: i32,
}

impl Position {
    pub const fn new(row: i32, col: i32) -> Self {
        Self { row, col }
    }

    /// Quarter turn clockwise around the origin.
    pub const fn rotated_cw(self) -> Self {
        Self {
            row: self.col,
            col: -self.row,
        }
    }
}

impl Add for Position {
    type Output = Position;

    fn add(self, other: Position) -> Position {
        Position::new(self.row + other.row, self.col + other.col)
    }
}

impl Sub for Position {
    type Output = Position;

    fn sub(self, other: Position) -> Position {
        Position::new(self.row - other.row, self.col - other.col)
    }
}

/// One row down.
pub const DOWN: Position = Position::new(1, 0);
pub const LEFT: Position = Position::new(0, -1);
pub const RIGHT: Position = Position::new(0, 1);
