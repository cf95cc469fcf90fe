//! Player state machine
//!
//! One player's field, active piece, hold slot and upcoming pieces, plus the
//! transitions that advance them. Every transition is total: an illegal move
//! or rotation is simply discarded, which is itself part of the game rules.
//!
//! Gravity and locking are two countdowns on the active piece. A piece that
//! can fall counts down its fall timer; a grounded piece counts down its lock
//! timer instead. At most one of the two is ever armed.

use crate::command::CommandKind;
use crate::field::Field;
use crate::pieces::{rotate, Orientation, Tetromino};
use crate::queue::{generate_bag, NextQueue};
use crate::{
    Position, DOWN, FALL_INTERVAL_MS, LEFT, LOCK_DELAY_MS, PREVIEW_LEN, RIGHT, SPAWN_POSITION,
};
use log::debug;
use serde::{Deserialize, Serialize};

/// A countdown in milliseconds that is either running or switched off.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Timer {
    Armed(i64),
    Disarmed,
}

impl Timer {
    pub fn is_armed(self) -> bool {
        matches!(self, Timer::Armed(_))
    }

    pub fn remaining(self) -> Option<i64> {
        match self {
            Timer::Armed(ms) => Some(ms),
            Timer::Disarmed => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivePiece {
    pub kind: Tetromino,
    pub orientation: Orientation,
    /// Anchor cell the minos are relative to.
    pub position: Position,
    pub fall_timer: Timer,
    pub lock_timer: Timer,
}

impl ActivePiece {
    /// A piece at its spawn position and orientation, about to fall.
    pub fn spawn(kind: Tetromino) -> Self {
        Self {
            kind,
            orientation: 0,
            position: SPAWN_POSITION,
            fall_timer: Timer::Armed(FALL_INTERVAL_MS),
            lock_timer: Timer::Disarmed,
        }
    }

    /// Absolute cells covered by the piece.
    pub fn cells(&self) -> [Position; 4] {
        let minos = *self.kind.minos(self.orientation);
        minos.map(|mino| self.position + mino)
    }

    fn translated(mut self, offset: Position) -> Self {
        self.position = self.position + offset;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerState {
    pub field: Field,
    pub active_piece: ActivePiece,
    pub hold: Option<Tetromino>,
    /// Set once the piece in play has been swapped into hold.
    pub held: bool,
    pub next_pieces: NextQueue,
    /// Logical time in ms since the game epoch.
    pub time: i64,
    pub lines_cleared: u32,
    /// Times the stack reached the spawn area and the field was reset.
    pub top_outs: u32,
}

impl PlayerState {
    /// Fresh state for a player joining at `time`: empty field and a piece
    /// sequence seeded from the join time.
    pub fn new(time: i64) -> Self {
        let bag = generate_bag(time);
        let mut next_pieces = NextQueue::new();
        next_pieces.extend_from_slice(&bag[1..]);
        Self {
            field: Field::new(),
            active_piece: ActivePiece::spawn(bag[0]),
            hold: None,
            held: false,
            next_pieces,
            time,
            lines_cleared: 0,
            top_outs: 0,
        }
    }

    /// The upcoming pieces a client displays, next first.
    pub fn preview(&self) -> impl Iterator<Item = Tetromino> + '_ {
        self.next_pieces.iter().take(PREVIEW_LEN)
    }

    pub fn collides(&self, piece: &ActivePiece) -> bool {
        piece
            .cells()
            .iter()
            .any(|&cell| !self.field.is_free(cell))
    }

    /// True when the active piece cannot move down one row.
    pub fn is_grounded(&self) -> bool {
        self.collides(&self.active_piece.translated(DOWN))
    }

    /// Rows the active piece can fall before it rests on something.
    pub fn drop_distance(&self) -> i32 {
        let mut distance = 0;
        while !self.collides(&self.active_piece.translated(Position::new(distance + 1, 0))) {
            distance += 1;
        }
        distance
    }

    /// Re-arms the timers after the piece moved or failed to move. With
    /// `break_lock` a running lock countdown starts over.
    fn update_grounded(&mut self, break_lock: bool) {
        let grounded = self.is_grounded();
        let piece = &mut self.active_piece;
        if grounded {
            if !piece.lock_timer.is_armed() || break_lock {
                piece.lock_timer = Timer::Armed(LOCK_DELAY_MS);
            }
            piece.fall_timer = Timer::Disarmed;
        } else {
            piece.lock_timer = Timer::Disarmed;
            if !piece.fall_timer.is_armed() {
                piece.fall_timer = Timer::Armed(FALL_INTERVAL_MS);
            }
        }
    }

    /// Moves the active piece by `offset` unless that collides. Either way
    /// the grounded state is re-evaluated. Returns whether the piece moved.
    pub fn attempt_move(&mut self, offset: Position) -> bool {
        let moved = self.active_piece.translated(offset);
        let fits = !self.collides(&moved);
        if fits {
            self.active_piece = moved;
        }
        self.update_grounded(fits);
        fits
    }

    /// Rotates by `direction` (`1` clockwise, `-1` counter-clockwise), taking
    /// the first kick that fits. Returns false and leaves the piece untouched
    /// when none does.
    pub fn attempt_rotate(&mut self, direction: i8) -> bool {
        let from = self.active_piece.orientation;
        let to = rotate(from, direction);
        for kick in self.active_piece.kind.kicks(from, to) {
            let mut candidate = self.active_piece.translated(kick);
            candidate.orientation = to;
            if !self.collides(&candidate) {
                self.active_piece = candidate;
                self.update_grounded(true);
                return true;
            }
        }
        false
    }

    pub fn hard_drop(&mut self) -> u32 {
        let distance = self.drop_distance();
        self.active_piece = self.active_piece.translated(Position::new(distance, 0));
        self.lock_active_piece()
    }

    /// Writes the active piece into the field, clears any rows it completed
    /// and brings in the next piece. Returns the number of rows cleared.
    pub fn lock_active_piece(&mut self) -> u32 {
        let piece = self.active_piece;
        let cells = piece.cells();
        for &cell in &cells {
            self.field.stamp(cell, piece.kind);
        }

        // Only rows the piece touched can have become full. Clearing top to
        // bottom keeps the indices of the remaining candidates valid.
        let mut rows = cells.map(|cell| cell.row);
        rows.sort_unstable();
        let mut cleared = 0;
        let mut previous = None;
        for row in rows {
            if previous == Some(row) {
                continue;
            }
            previous = Some(row);
            if self.field.is_row_full(row) {
                self.field.clear_row(row);
                cleared += 1;
            }
        }
        self.lines_cleared += cleared;

        self.pop_next_active_piece();
        self.held = false;
        cleared
    }

    /// Swaps the active piece into hold, once per piece in play.
    pub fn hold_active_piece(&mut self) {
        if self.held {
            return;
        }
        match self.hold.replace(self.active_piece.kind) {
            Some(kind) => self.spawn(kind),
            None => self.pop_next_active_piece(),
        }
        self.held = true;
    }

    pub fn pop_next_active_piece(&mut self) {
        let kind = self.next_pieces.draw(self.time);
        self.spawn(kind);
    }

    fn spawn(&mut self, kind: Tetromino) {
        self.active_piece = ActivePiece::spawn(kind);
        if self.collides(&self.active_piece) {
            debug!(
                "Spawn of {:?} blocked at t={}, resetting field",
                kind, self.time
            );
            self.field.clear();
            self.top_outs += 1;
        }
    }

    /// Advances the countdowns to `time`. Calling it again with the same
    /// time does nothing.
    pub fn tick(&mut self, time: i64) {
        let elapsed = (time - self.time).max(0);

        if let Timer::Armed(remaining) = self.active_piece.fall_timer {
            let remaining = remaining - elapsed;
            self.active_piece.fall_timer = Timer::Armed(remaining);
            if remaining <= 0 {
                self.attempt_move(DOWN);
                // Landing disarms the fall timer; keep it that way.
                if self.active_piece.fall_timer.is_armed() {
                    self.active_piece.fall_timer = Timer::Armed(FALL_INTERVAL_MS);
                }
            }
        }

        if let Timer::Armed(remaining) = self.active_piece.lock_timer {
            let remaining = remaining - elapsed;
            self.active_piece.lock_timer = Timer::Armed(remaining);
            if remaining <= 0 {
                self.lock_active_piece();
            }
        }

        self.time = self.time.max(time);
    }

    /// Applies one gameplay command. Control and idle commands are no-ops.
    pub fn apply(&mut self, command: CommandKind) {
        match command {
            CommandKind::MoveLeft => {
                self.attempt_move(LEFT);
            }
            CommandKind::MoveRight => {
                self.attempt_move(RIGHT);
            }
            CommandKind::RotateCw => {
                self.attempt_rotate(1);
            }
            CommandKind::RotateCcw => {
                self.attempt_rotate(-1);
            }
            CommandKind::SoftDrop => {
                self.attempt_move(DOWN);
            }
            CommandKind::HardDrop => {
                self.hard_drop();
            }
            CommandKind::Hold => self.hold_active_piece(),
            CommandKind::Idle | CommandKind::Join | CommandKind::Leave => {}
        }
    }
}
