//! Piece geometry table
//!
//! Minos are stored relative to each piece's rotation anchor, and rotation
//! uses per-orientation offset tables: the kick tried for test `i` when
//! turning from `a` to `b` is `offsets(a)[i] - offsets(b)[i]`. This is the
//! offset form of the Standard Rotation System and yields the familiar SRS
//! wall kicks. Reference: https://tetris.wiki/SRS

use crate::Position;
use serde::{Deserialize, Serialize};

/// Rotation state, always in `0..4`. `0` is the spawn orientation and each
/// step is a clockwise quarter turn.
pub type Orientation = u8;

/// Occupied cells of one piece orientation, relative to the anchor.
pub type Minos = [Position; 4];

/// Rotation offsets of one orientation, one per kick test.
pub type Offsets = [Position; 5];

/// Piece identity. `Empty` is the sentinel used for vacant field cells; the
/// discriminant doubles as the fill value stamped into the field.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
#[repr(u8)]
pub enum Tetromino {
    #[default]
    Empty = 0,
    Z = 1,
    S = 2,
    L = 3,
    J = 4,
    T = 5,
    O = 6,
    I = 7,
}

impl Tetromino {
    /// Every playable piece, in the order a fresh bag starts from.
    pub const ALL: [Tetromino; 7] = [
        Tetromino::Z,
        Tetromino::S,
        Tetromino::L,
        Tetromino::J,
        Tetromino::T,
        Tetromino::O,
        Tetromino::I,
    ];

    pub fn is_empty(self) -> bool {
        self == Tetromino::Empty
    }

    /// Cells occupied in the given orientation, relative to the anchor.
    pub fn minos(self, orientation: Orientation) -> &'static Minos {
        &GEOMETRY[self as usize].minos[(orientation % 4) as usize]
    }

    /// Rotation offsets for the given orientation.
    pub fn offsets(self, orientation: Orientation) -> &'static Offsets {
        &GEOMETRY[self as usize].offsets[(orientation % 4) as usize]
    }

    /// Kick candidates, in test order, for turning from `from` to `to`.
    pub fn kicks(self, from: Orientation, to: Orientation) -> [Position; 5] {
        let before = self.offsets(from);
        let after = self.offsets(to);
        let mut kicks = [Position::default(); 5];
        for (i, kick) in kicks.iter_mut().enumerate() {
            *kick = before[i] - after[i];
        }
        kicks
    }
}

/// Applies a rotation direction (`1` clockwise, `-1` counter-clockwise).
pub fn rotate(orientation: Orientation, direction: i8) -> Orientation {
    (orientation as i8 + direction).rem_euclid(4) as Orientation
}

struct Shape {
    minos: [Minos; 4],
    offsets: [Offsets; 4],
}

const fn p(row: i32, col: i32) -> Position {
    Position::new(row, col)
}

/// Derives all four orientations from the spawn orientation.
const fn orientations(spawn: Minos) -> [Minos; 4] {
    let mut out = [spawn; 4];
    let mut o = 1;
    while o < 4 {
        let mut i = 0;
        while i < 4 {
            out[o][i] = out[o - 1][i].rotated_cw();
            i += 1;
        }
        o += 1;
    }
    out
}

const fn uniform(offset: Position) -> Offsets {
    [offset; 5]
}

const NO_OFFSETS: Offsets = uniform(p(0, 0));

const JLSTZ_OFFSETS: [Offsets; 4] = [
    NO_OFFSETS,
    [p(0, 0), p(0, 1), p(1, 1), p(-2, 0), p(-2, 1)],
    NO_OFFSETS,
    [p(0, 0), p(0, -1), p(1, -1), p(-2, 0), p(-2, -1)],
];

const I_OFFSETS: [Offsets; 4] = [
    [p(0, 0), p(0, -1), p(0, 2), p(0, -1), p(0, 2)],
    [p(0, -1), p(0, 0), p(0, 0), p(-1, 0), p(2, 0)],
    [p(-1, -1), p(-1, 1), p(-1, -2), p(0, 1), p(0, -2)],
    [p(-1, 0), p(-1, 0), p(-1, 0), p(1, 0), p(-2, 0)],
];

// The O piece rotates in place: its offsets cancel the drift of turning a
// 2x2 block around a corner.
const O_OFFSETS: [Offsets; 4] = [
    uniform(p(0, 0)),
    uniform(p(1, 0)),
    uniform(p(1, -1)),
    uniform(p(0, -1)),
];

/// Indexed by `Tetromino as usize`.
static GEOMETRY: [Shape; 8] = [
    // Empty
    Shape {
        minos: [[p(0, 0); 4]; 4],
        offsets: [NO_OFFSETS; 4],
    },
    // Z
    Shape {
        minos: orientations([p(-1, -1), p(-1, 0), p(0, 0), p(0, 1)]),
        offsets: JLSTZ_OFFSETS,
    },
    // S
    Shape {
        minos: orientations([p(-1, 0), p(-1, 1), p(0, -1), p(0, 0)]),
        offsets: JLSTZ_OFFSETS,
    },
    // L
    Shape {
        minos: orientations([p(-1, 1), p(0, -1), p(0, 0), p(0, 1)]),
        offsets: JLSTZ_OFFSETS,
    },
    // J
    Shape {
        minos: orientations([p(-1, -1), p(0, -1), p(0, 0), p(0, 1)]),
        offsets: JLSTZ_OFFSETS,
    },
    // T
    Shape {
        minos: orientations([p(-1, 0), p(0, -1), p(0, 0), p(0, 1)]),
        offsets: JLSTZ_OFFSETS,
    },
    // O
    Shape {
        minos: orientations([p(-1, 0), p(-1, 1), p(0, 0), p(0, 1)]),
        offsets: O_OFFSETS,
    },
    // I
    Shape {
        minos: orientations([p(0, -1), p(0, 0), p(0, 1), p(0, 2)]),
        offsets: I_OFFSETS,
    },
];
