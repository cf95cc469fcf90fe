//! Upcoming pieces - 7-bag generation and a fixed-capacity ring buffer
//!
//! Each bag is a Fisher-Yates shuffle of all seven pieces, seeded from the
//! player's logical time so the sequence is reproducible when a tick is
//! resimulated.

use crate::pieces::Tetromino;
use crate::{NEXT_QUEUE_CAPACITY, NEXT_REFILL_THRESHOLD};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};

/// Shuffled permutation of all seven pieces for the given seed.
pub fn generate_bag(seed: i64) -> [Tetromino; 7] {
    let mut rng = StdRng::seed_from_u64(seed as u64);
    let mut bag = Tetromino::ALL;
    bag.shuffle(&mut rng);
    bag
}

/// Ring buffer of upcoming pieces. Popping moves the head instead of
/// shifting the remaining pieces.
///
/// On the wire it is just the queued pieces in order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "Vec<Tetromino>", try_from = "Vec<Tetromino>")]
pub struct NextQueue {
    slots: [Tetromino; NEXT_QUEUE_CAPACITY],
    head: usize,
    len: usize,
}

impl Default for NextQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl NextQueue {
    pub fn new() -> Self {
        Self {
            slots: [Tetromino::Empty; NEXT_QUEUE_CAPACITY],
            head: 0,
            len: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Appends pieces at the tail. Returns false without changing anything
    /// when they would not fit.
    pub fn extend_from_slice(&mut self, pieces: &[Tetromino]) -> bool {
        if self.len + pieces.len() > NEXT_QUEUE_CAPACITY {
            return false;
        }
        for &piece in pieces {
            let tail = (self.head + self.len) % NEXT_QUEUE_CAPACITY;
            self.slots[tail] = piece;
            self.len += 1;
        }
        true
    }

    pub fn pop(&mut self) -> Option<Tetromino> {
        if self.len == 0 {
            return None;
        }
        let piece = self.slots[self.head];
        self.slots[self.head] = Tetromino::Empty;
        self.head = (self.head + 1) % NEXT_QUEUE_CAPACITY;
        self.len -= 1;
        Some(piece)
    }

    /// Takes the next piece, first appending a fresh bag seeded with `seed`
    /// if the lookahead has run low.
    pub fn draw(&mut self, seed: i64) -> Tetromino {
        if self.len < NEXT_REFILL_THRESHOLD {
            let bag = generate_bag(seed);
            self.extend_from_slice(&bag);
        }
        self.pop().unwrap_or(Tetromino::Empty)
    }

    /// The `i`th upcoming piece, `0` being the next one drawn.
    pub fn peek(&self, i: usize) -> Option<Tetromino> {
        if i >= self.len {
            return None;
        }
        Some(self.slots[(self.head + i) % NEXT_QUEUE_CAPACITY])
    }

    pub fn iter(&self) -> impl Iterator<Item = Tetromino> + '_ {
        (0..self.len).map(move |i| self.slots[(self.head + i) % NEXT_QUEUE_CAPACITY])
    }
}

impl From<NextQueue> for Vec<Tetromino> {
    fn from(queue: NextQueue) -> Self {
        queue.iter().collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{0} queued pieces exceed the next-queue capacity")]
pub struct QueueOverflow(pub usize);

impl TryFrom<Vec<Tetromino>> for NextQueue {
    type Error = QueueOverflow;

    fn try_from(pieces: Vec<Tetromino>) -> Result<Self, Self::Error> {
        let mut queue = NextQueue::new();
        if queue.extend_from_slice(&pieces) {
            Ok(queue)
        } else {
            Err(QueueOverflow(pieces.len()))
        }
    }
}
