//! Per-player reconciliation buffer
//!
//! Holds the last `depth` snapshots of one player's state, oldest first, one
//! per tick. Each snapshot carries the commands that were issued during its
//! tick; the next snapshot is always the previous one with those commands
//! applied and its timers advanced by one tick.
//!
//! Commands may arrive late. A late command is recorded against the tick it was
//! issued in and every snapshot after it is recomputed, so the head ends up
//! exactly where it would have been had the command arrived on time. Only the
//! oldest snapshot is ever shown to other players, which gives every command a
//! full window to arrive before its effect becomes visible.

use log::debug;
use std::collections::VecDeque;
use tetris::{Command, CommandKind, PlayerState};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct PendingInput {
    index: u32,
    arrival: u64,
    kind: CommandKind,
}

#[derive(Debug, Clone)]
struct Frame {
    state: PlayerState,
    /// Commands issued during this tick, kept sorted by `(index, arrival)`.
    inputs: Vec<PendingInput>,
}

impl Frame {
    fn new(state: PlayerState) -> Self {
        Self {
            state,
            inputs: Vec::new(),
        }
    }

    /// The state one tick later: this tick's commands in order, then the
    /// timers advanced to `time`.
    fn advance(&self, time: i64) -> PlayerState {
        let mut state = self.state.clone();
        for input in &self.inputs {
            state.apply(input.kind);
        }
        state.tick(time);
        state
    }
}

/// What happened to a batch handed to [`ReconciliationBuffer::add_inputs`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Insertion {
    /// Gameplay commands recorded in the window.
    pub recorded: usize,
    /// Of those, commands older than the window, recorded at the oldest tick.
    pub clamped: usize,
    /// Snapshots recomputed because a command landed behind the head.
    pub resimulated: usize,
}

#[derive(Debug, Clone)]
pub struct ReconciliationBuffer {
    /// Never empty.
    frames: VecDeque<Frame>,
    depth: usize,
    interval: i64,
    /// Arrival counter, the tie-break for commands with equal indices.
    arrivals: u64,
}

impl ReconciliationBuffer {
    /// Creates a buffer holding a single fresh state at `initial_time`.
    pub fn new(initial_time: i64, depth: usize, interval: i64) -> Self {
        Self::from_state(PlayerState::new(initial_time), depth, interval)
    }

    pub fn from_state(state: PlayerState, depth: usize, interval: i64) -> Self {
        let mut frames = VecDeque::with_capacity(depth.max(1) + 1);
        frames.push_back(Frame::new(state));
        Self {
            frames,
            depth: depth.max(1),
            interval: interval.max(1),
            arrivals: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    /// Always false; a buffer holds at least one snapshot.
    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    /// Oldest retained snapshot.
    pub fn first(&self) -> &PlayerState {
        &self.frames[0].state
    }

    /// Copy of the oldest retained snapshot, ready for publication.
    pub fn get_first(&self) -> PlayerState {
        self.first().clone()
    }

    /// Newest snapshot.
    pub fn head(&self) -> &PlayerState {
        &self.frames[self.frames.len() - 1].state
    }

    pub fn get(&self, index: usize) -> Option<&PlayerState> {
        self.frames.get(index).map(|frame| &frame.state)
    }

    /// Snapshots from oldest to newest.
    pub fn states(&self) -> impl Iterator<Item = &PlayerState> + '_ {
        self.frames.iter().map(|frame| &frame.state)
    }

    /// Commands currently recorded across the window.
    pub fn pending_inputs(&self) -> usize {
        self.frames.iter().map(|frame| frame.inputs.len()).sum()
    }

    /// Appends the snapshot one interval after the head.
    pub fn tick(&mut self) {
        let time = self.head().time + self.interval;
        self.advance_to(time);
    }

    /// Appends a snapshot at `time` (never earlier than the head), evicting
    /// the oldest when the window is full.
    pub fn advance_to(&mut self, time: i64) {
        let head = &self.frames[self.frames.len() - 1];
        let next = head.advance(time.max(head.state.time));
        self.frames.push_back(Frame::new(next));
        while self.frames.len() > self.depth {
            self.frames.pop_front();
        }
    }

    /// Index of the tick a command issued at `time` belongs to, and whether
    /// it had to be clamped to the oldest tick.
    fn slot_for(&self, time: i64) -> (usize, bool) {
        let later = self.frames.partition_point(|frame| frame.state.time <= time);
        match later {
            0 => (0, true),
            n => (n - 1, false),
        }
    }

    /// Records gameplay commands at the ticks they were issued in and
    /// recomputes every snapshot after the earliest one touched.
    ///
    /// Join and leave commands are ignored here. Commands issued at or after
    /// the head take effect on the next [`tick`](Self::tick).
    pub fn add_inputs<I>(&mut self, commands: I) -> Insertion
    where
        I: IntoIterator<Item = Command>,
    {
        let mut insertion = Insertion::default();
        let mut earliest = None;
        let mut touched = vec![false; self.frames.len()];

        for command in commands {
            if command.kind.is_control() {
                continue;
            }
            let (slot, clamped) = self.slot_for(command.time);
            if clamped {
                debug!(
                    "Clamped {:?} from {} issued at t={} to oldest tick t={}",
                    command.kind,
                    command.player,
                    command.time,
                    self.first().time
                );
                insertion.clamped += 1;
            }

            let arrival = self.arrivals;
            self.arrivals += 1;
            self.frames[slot].inputs.push(PendingInput {
                index: command.index,
                arrival,
                kind: command.kind,
            });
            touched[slot] = true;

            insertion.recorded += 1;
            earliest = Some(earliest.map_or(slot, |e: usize| e.min(slot)));
        }

        // One sort per touched tick; arrivals are unique so the order is total.
        for (frame, _) in self.frames.iter_mut().zip(&touched).filter(|(_, t)| **t) {
            frame.inputs.sort_by_key(|input| (input.index, input.arrival));
        }

        if let Some(start) = earliest {
            insertion.resimulated = self.resimulate_from(start);
        }
        insertion
    }

    /// Recomputes every snapshot after `start`, keeping their times.
    fn resimulate_from(&mut self, start: usize) -> usize {
        let head = self.frames.len() - 1;
        for i in start..head {
            let time = self.frames[i + 1].state.time;
            let next = self.frames[i].advance(time);
            self.frames[i + 1].state = next;
        }
        head.saturating_sub(start)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const T0: i64 = 1_000_000;
    const DT: i64 = 17;

    fn buffer(depth: usize) -> ReconciliationBuffer {
        ReconciliationBuffer::new(T0, depth, DT)
    }

    fn cmd(kind: CommandKind, time: i64) -> Command {
        Command::new("p1", kind, time)
    }

    #[test]
    fn test_new_buffer() {
        let buf = buffer(30);
        assert_eq!(buf.len(), 1);
        assert!(!buf.is_empty());
        assert_eq!(buf.first(), &PlayerState::new(T0));
        assert_eq!(buf.first(), buf.head());
        assert_eq!(buf.pending_inputs(), 0);
    }

    #[test]
    fn test_tick_advances_and_evicts() {
        let mut buf = buffer(5);
        for _ in 0..4 {
            buf.tick();
        }
        assert_eq!(buf.len(), 5);
        assert_eq!(buf.first().time, T0);
        assert_eq!(buf.head().time, T0 + 4 * DT);

        buf.tick();
        assert_eq!(buf.len(), 5);
        assert_eq!(buf.first().time, T0 + DT);
        assert_eq!(buf.head().time, T0 + 5 * DT);

        let times: Vec<i64> = buf.states().map(|s| s.time).collect();
        assert!(times.windows(2).all(|w| w[1] - w[0] == DT));
    }

    #[test]
    fn test_command_at_head_applies_on_next_tick() {
        let mut buf = buffer(30);
        buf.tick();
        let before = buf.head().clone();

        let insertion = buf.add_inputs(vec![cmd(CommandKind::MoveLeft, T0 + DT + 5)]);
        assert_eq!(insertion.recorded, 1);
        assert_eq!(insertion.resimulated, 0);
        assert_eq!(buf.head(), &before);

        buf.tick();
        let mut expected = before;
        expected.apply(CommandKind::MoveLeft);
        expected.tick(T0 + 2 * DT);
        assert_eq!(buf.head(), &expected);
    }

    #[test]
    fn test_late_command_matches_on_time_command() {
        let commands = [
            cmd(CommandKind::MoveRight, T0 + 3 * DT + 1),
            cmd(CommandKind::RotateCw, T0 + 6 * DT),
            cmd(CommandKind::HardDrop, T0 + 9 * DT + 16),
        ];

        let mut on_time = buffer(30);
        for tick in 0..20 {
            let now = T0 + tick * DT;
            let due: Vec<Command> = commands
                .iter()
                .filter(|c| c.time >= now && c.time < now + DT)
                .cloned()
                .collect();
            on_time.add_inputs(due);
            on_time.tick();
        }

        let mut late = buffer(30);
        for _ in 0..20 {
            late.tick();
        }
        let insertion = late.add_inputs(commands.to_vec());
        assert_eq!(insertion.recorded, 3);
        assert_eq!(insertion.clamped, 0);
        assert_eq!(insertion.resimulated, 17);

        assert_eq!(late.head(), on_time.head());
        assert!(late.states().eq(on_time.states()));
    }

    #[test]
    fn test_stale_command_is_clamped() {
        let mut buf = buffer(4);
        for _ in 0..10 {
            buf.tick();
        }
        let oldest = buf.first().clone();
        let mut expected = oldest.clone();

        let insertion = buf.add_inputs(vec![cmd(CommandKind::Hold, T0)]);

        assert_eq!(insertion.clamped, 1);
        assert_eq!(insertion.resimulated, 3);
        // The oldest snapshot is never rewritten; the command shows up in the
        // one after it.
        assert_eq!(buf.first(), &oldest);
        expected.apply(CommandKind::Hold);
        expected.tick(oldest.time + DT);
        assert_eq!(buf.get(1), Some(&expected));
        assert!(buf.get(1).is_some_and(|s| s.held));
    }

    #[test]
    fn test_same_tick_ordered_by_index() {
        let mut buf = buffer(30);
        // Arrives first but carries the larger index.
        buf.add_inputs(vec![
            cmd(CommandKind::HardDrop, T0 + 2).with_index(2),
            cmd(CommandKind::Hold, T0 + 2).with_index(1),
        ]);
        buf.tick();

        let mut expected = PlayerState::new(T0);
        expected.apply(CommandKind::Hold);
        expected.apply(CommandKind::HardDrop);
        expected.tick(T0 + DT);
        assert_eq!(buf.head(), &expected);

        let mut wrong = PlayerState::new(T0);
        wrong.apply(CommandKind::HardDrop);
        wrong.apply(CommandKind::Hold);
        wrong.tick(T0 + DT);
        assert_ne!(buf.head(), &wrong);
    }

    #[test]
    fn test_equal_indices_keep_arrival_order() {
        let mut buf = buffer(30);
        buf.add_inputs(vec![cmd(CommandKind::Hold, T0 + 1)]);
        buf.add_inputs(vec![cmd(CommandKind::HardDrop, T0 + 1)]);
        buf.tick();

        let mut expected = PlayerState::new(T0);
        expected.apply(CommandKind::Hold);
        expected.apply(CommandKind::HardDrop);
        expected.tick(T0 + DT);
        assert_eq!(buf.head(), &expected);
    }

    #[test]
    fn test_large_batch_applied_in_index_order() {
        let mut buf = buffer(30);
        for _ in 0..5 {
            buf.tick();
        }
        // Descending indices across two ticks, arriving in one batch.
        let kinds = [CommandKind::MoveLeft, CommandKind::MoveRight, CommandKind::RotateCw];
        let batch: Vec<Command> = (0..600u32)
            .rev()
            .map(|i| {
                let time = if i % 2 == 0 { T0 + 2 * DT } else { T0 + 4 * DT };
                cmd(kinds[i as usize % kinds.len()], time).with_index(i)
            })
            .collect();
        let insertion = buf.add_inputs(batch.clone());
        assert_eq!(insertion.recorded, 600);
        assert_eq!(insertion.resimulated, 3);

        let mut expected = buffer(30);
        for tick in 0..5 {
            let now = T0 + tick * DT;
            let mut due: Vec<Command> = batch
                .iter()
                .filter(|c| c.time >= now && c.time < now + DT)
                .cloned()
                .collect();
            due.sort_by_key(|c| c.index);
            for c in due {
                expected.add_inputs(vec![c]);
            }
            expected.tick();
        }
        assert!(buf.states().eq(expected.states()));
    }

    #[test]
    fn test_control_commands_ignored() {
        let mut buf = buffer(30);
        let insertion = buf.add_inputs(vec![
            Command::join("p1", T0),
            Command::leave("p1", T0),
        ]);
        assert_eq!(insertion, Insertion::default());
        assert_eq!(buf.pending_inputs(), 0);
    }

    #[test]
    fn test_advance_to_never_goes_back() {
        let mut buf = buffer(30);
        buf.advance_to(T0 + 5);
        buf.advance_to(T0 - 100);
        assert_eq!(buf.len(), 3);
        assert_eq!(buf.head().time, T0 + 5);
    }
}
