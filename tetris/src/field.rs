//! Field - the grid of locked cells
//!
//! `FIELD_ROWS x FIELD_COLS` cells stored row-major, top row first. A cell
//! holds the identity of the piece that locked there, or `Tetromino::Empty`.
//! Once filled, a cell only changes again when its row is cleared.

use crate::pieces::Tetromino;
use crate::{Position, FIELD_COLS, FIELD_ROWS, VISIBLE_ROWS};
use serde::{Deserialize, Serialize};

pub type Row = [Tetromino; FIELD_COLS];

const EMPTY_ROW: Row = [Tetromino::Empty; FIELD_COLS];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Field {
    rows: Vec<Row>,
}

impl Default for Field {
    fn default() -> Self {
        Self::new()
    }
}

impl Field {
    pub fn new() -> Self {
        Self {
            rows: vec![EMPTY_ROW; FIELD_ROWS],
        }
    }

    /// Builds a field whose bottom rows are drawn from `picture`, top to
    /// bottom. `.` is an empty cell, a piece letter is a locked cell.
    ///
    /// ```
    /// use tetris::{Field, Position, Tetromino};
    ///
    /// let field = Field::from_bottom_rows(&["..........", "IIIIIIIII."]);
    /// assert_eq!(field.get(Position::new(39, 0)), Some(Tetromino::I));
    /// assert_eq!(field.get(Position::new(39, 9)), Some(Tetromino::Empty));
    /// ```
    pub fn from_bottom_rows(picture: &[&str]) -> Self {
        let mut field = Self::new();
        let skip = picture.len().saturating_sub(FIELD_ROWS);
        let first_row = FIELD_ROWS - (picture.len() - skip);
        for (offset, line) in picture.iter().skip(skip).enumerate() {
            let row = &mut field.rows[first_row + offset];
            for (col, ch) in line.chars().take(FIELD_COLS).enumerate() {
                row[col] = match ch {
                    'Z' => Tetromino::Z,
                    'S' => Tetromino::S,
                    'L' => Tetromino::L,
                    'J' => Tetromino::J,
                    'T' => Tetromino::T,
                    'O' => Tetromino::O,
                    'I' => Tetromino::I,
                    _ => Tetromino::Empty,
                };
            }
        }
        field
    }

    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    /// The bottom rows players get to see.
    pub fn visible_rows(&self) -> &[Row] {
        &self.rows[FIELD_ROWS - VISIBLE_ROWS..]
    }

    fn in_bounds(pos: Position) -> bool {
        pos.row >= 0 && pos.row < FIELD_ROWS as i32 && pos.col >= 0 && pos.col < FIELD_COLS as i32
    }

    /// Cell at `pos`, or `None` when out of bounds.
    pub fn get(&self, pos: Position) -> Option<Tetromino> {
        if Self::in_bounds(pos) {
            Some(self.rows[pos.row as usize][pos.col as usize])
        } else {
            None
        }
    }

    /// True when `pos` is inside the field and empty.
    pub fn is_free(&self, pos: Position) -> bool {
        matches!(self.get(pos), Some(Tetromino::Empty))
    }

    /// Fills an empty in-bounds cell. Returns false (and changes nothing)
    /// when the cell is out of bounds or already filled.
    pub(crate) fn stamp(&mut self, pos: Position, kind: Tetromino) -> bool {
        if !self.is_free(pos) || kind.is_empty() {
            return false;
        }
        self.rows[pos.row as usize][pos.col as usize] = kind;
        true
    }

    pub fn is_row_full(&self, row: i32) -> bool {
        if row < 0 || row >= FIELD_ROWS as i32 {
            return false;
        }
        self.rows[row as usize].iter().all(|cell| !cell.is_empty())
    }

    /// Removes `row`, shifts every row above it down by one and inserts an
    /// empty row at the top.
    pub fn clear_row(&mut self, row: i32) {
        if row < 0 || row >= FIELD_ROWS as i32 {
            return;
        }
        let row = row as usize;
        self.rows.copy_within(0..row, 1);
        self.rows[0] = EMPTY_ROW;
    }

    /// Empties every cell.
    pub fn clear(&mut self) {
        self.rows.fill(EMPTY_ROW);
    }

    pub fn filled_cells(&self) -> usize {
        self.rows
            .iter()
            .flat_map(|row| row.iter())
            .filter(|cell| !cell.is_empty())
            .count()
    }
}
