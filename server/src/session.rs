//! Session table: one reconciliation buffer per active player
//!
//! The table is owned by the scheduler and is the only place player state
//! lives. Buffers are created by join commands and destroyed by leave
//! commands; nothing else adds or removes them.

use crate::buffer::{Insertion, ReconciliationBuffer};
use crate::config::ServerConfig;
use log::info;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tetris::{Command, PlayerId, PlayerState};

/// The published view of the game: every active player's oldest retained
/// snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorldUpdate {
    /// Scheduler tick the update was taken at.
    pub tick: u64,
    /// Scheduler logical time the update was taken at.
    pub time: i64,
    pub player_states: BTreeMap<PlayerId, PlayerState>,
}

#[derive(Debug, Clone)]
pub struct SessionTable {
    buffers: BTreeMap<PlayerId, ReconciliationBuffer>,
    depth: usize,
    interval: i64,
    max_join_lag: i64,
}

impl SessionTable {
    pub fn new(depth: usize, interval: i64) -> Self {
        Self {
            buffers: BTreeMap::new(),
            depth: depth.max(1),
            interval: interval.max(1),
            max_join_lag: ServerConfig::default().max_join_lag_ms,
        }
    }

    /// Sets how far back a join's connect time is replayed tick by tick.
    /// Never less than one window.
    pub fn with_max_join_lag(mut self, lag_ms: i64) -> Self {
        self.max_join_lag = lag_ms;
        self
    }

    pub fn len(&self) -> usize {
        self.buffers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffers.is_empty()
    }

    pub fn contains(&self, player: &str) -> bool {
        self.buffers.contains_key(player)
    }

    pub fn get(&self, player: &str) -> Option<&ReconciliationBuffer> {
        self.buffers.get(player)
    }

    pub fn players(&self) -> impl Iterator<Item = &PlayerId> + '_ {
        self.buffers.keys()
    }

    /// Creates a buffer for `player`, seeded at the time they connected and
    /// fast-forwarded one tick at a time so its head lines up with `now`.
    ///
    /// The snapshots are the last `depth` of that replay; ticks that would
    /// already have left the window run on the bare state. Time older than the
    /// join lag bound is covered by a single tick, and a connect time in the
    /// future is treated as `now`. Joining again under an existing identity
    /// restarts that player. Returns true when the player was not already
    /// present.
    pub fn join(&mut self, player: PlayerId, joined_at: i64, now: i64) -> bool {
        let mut state = PlayerState::new(joined_at.min(now));

        let replay_from = now - self.max_join_lag.max(self.depth as i64 * self.interval);
        if state.time < replay_from {
            state.tick(replay_from);
        }
        while self.ticks_between(state.time, now) >= self.depth {
            state.tick((state.time + self.interval).min(now));
        }

        let mut buffer = ReconciliationBuffer::from_state(state, self.depth, self.interval);
        while buffer.head().time < now {
            let next = (buffer.head().time + self.interval).min(now);
            buffer.advance_to(next);
        }

        let fresh = self.buffers.insert(player.clone(), buffer).is_none();
        if fresh {
            info!("Player {} joined (connected at t={}, now t={})", player, joined_at, now);
        } else {
            info!("Player {} rejoined, state reset", player);
        }
        fresh
    }

    /// Ticks, the last possibly short, needed to get from `from` to `to`.
    fn ticks_between(&self, from: i64, to: i64) -> usize {
        let span = (to - from).max(0);
        ((span + self.interval - 1) / self.interval) as usize
    }

    /// Destroys the player's buffer. Returns false if there was none.
    pub fn leave(&mut self, player: &str) -> bool {
        if self.buffers.remove(player).is_some() {
            info!("Player {} left", player);
            true
        } else {
            false
        }
    }

    /// Hands a batch of one player's commands to their buffer. `None` means
    /// the player is unknown and the batch was not used.
    pub fn add_inputs(&mut self, player: &str, commands: Vec<Command>) -> Option<Insertion> {
        self.buffers
            .get_mut(player)
            .map(|buffer| buffer.add_inputs(commands))
    }

    /// Advances every buffer by one tick.
    pub fn tick_all(&mut self) {
        for buffer in self.buffers.values_mut() {
            buffer.tick();
        }
    }

    /// Collects every player's oldest snapshot.
    pub fn snapshot(&self, tick: u64, time: i64) -> WorldUpdate {
        WorldUpdate {
            tick,
            time,
            player_states: self
                .buffers
                .iter()
                .map(|(player, buffer)| (player.clone(), buffer.get_first()))
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tetris::queue::generate_bag;
    use tetris::CommandKind;

    const NOW: i64 = 2_000_000;
    const DT: i64 = 17;

    #[test]
    fn test_join_aligns_head_with_now() {
        let mut table = SessionTable::new(30, DT);
        assert!(table.join("alice".to_string(), NOW - 100, NOW));

        let buffer = table.get("alice").unwrap();
        assert_eq!(buffer.first().time, NOW - 100);
        assert_eq!(buffer.head().time, NOW);
        // 100ms is five full ticks plus a short one.
        assert_eq!(buffer.len(), 7);
    }

    /// Ticks a bare state from `seed` to `now` the way a buffer created at
    /// `seed` would, keeping every snapshot.
    fn replay(seed: i64, now: i64) -> Vec<PlayerState> {
        let mut state = PlayerState::new(seed);
        let mut states = vec![state.clone()];
        while state.time < now {
            state.tick((state.time + DT).min(now));
            states.push(state.clone());
        }
        states
    }

    #[test]
    fn test_join_keeps_connect_time_seed() {
        let mut table = SessionTable::new(30, DT);
        let joined_at = NOW - 100 * DT;
        table.join("p".to_string(), joined_at, NOW);

        let buffer = table.get("p").unwrap();
        let full = replay(joined_at, NOW);
        assert_eq!(full.len(), 101);
        assert_eq!(buffer.len(), 30);
        assert!(buffer.states().eq(full[full.len() - 30..].iter()));
        assert_eq!(buffer.first().time, NOW - 29 * DT);

        // The first piece is still falling, so the sequence is the one drawn
        // from the connect time.
        let bag = generate_bag(joined_at);
        assert_eq!(buffer.head().active_piece.kind, bag[0]);
        assert!(buffer.head().next_pieces.iter().eq(bag[1..].iter().copied()));
    }

    #[test]
    fn test_join_lag_collapses_old_history() {
        let mut table = SessionTable::new(10, DT).with_max_join_lag(20 * DT);
        let joined_at = NOW - 1_000_000;
        table.join("old".to_string(), joined_at, NOW);
        table.join("future".to_string(), NOW + 500, NOW);

        let mut state = PlayerState::new(joined_at);
        state.tick(NOW - 20 * DT);
        for _ in 0..11 {
            state.tick(state.time + DT);
        }
        let old = table.get("old").unwrap();
        assert_eq!(old.len(), 10);
        assert_eq!(old.head().time, NOW);
        assert_eq!(old.first(), &state);

        let future = table.get("future").unwrap();
        assert_eq!(future.len(), 1);
        assert_eq!(future.head(), &PlayerState::new(NOW));
    }

    #[test]
    fn test_join_lag_never_shorter_than_window() {
        let mut table = SessionTable::new(10, DT).with_max_join_lag(0);
        let joined_at = NOW - 10 * DT;
        table.join("p".to_string(), joined_at, NOW);

        let full = replay(joined_at, NOW);
        let buffer = table.get("p").unwrap();
        assert!(buffer.states().eq(full[1..].iter()));
    }

    #[test]
    fn test_rejoin_resets_player() {
        let mut table = SessionTable::new(30, DT);
        assert!(table.join("p".to_string(), NOW, NOW));
        table.add_inputs("p", vec![Command::new("p", CommandKind::HardDrop, NOW)]);
        table.tick_all();
        assert!(!table.join("p".to_string(), NOW + DT, NOW + DT));
        assert_eq!(table.len(), 1);
        assert_eq!(table.get("p").unwrap().head().field.filled_cells(), 0);
    }

    #[test]
    fn test_leave_and_unknown_player() {
        let mut table = SessionTable::new(30, DT);
        table.join("a".to_string(), NOW, NOW);
        table.join("b".to_string(), NOW, NOW);

        assert!(table.leave("a"));
        assert!(!table.leave("a"));
        assert!(!table.contains("a"));

        let dropped = table.add_inputs("a", vec![Command::new("a", CommandKind::MoveLeft, NOW)]);
        assert_eq!(dropped, None);
        let kept = table.add_inputs("b", vec![Command::new("b", CommandKind::MoveLeft, NOW)]);
        assert_eq!(kept.map(|i| i.recorded), Some(1));
    }

    #[test]
    fn test_snapshot_uses_oldest_states() {
        let mut table = SessionTable::new(3, DT);
        table.join("a".to_string(), NOW, NOW);
        table.join("b".to_string(), NOW, NOW);
        for _ in 0..5 {
            table.tick_all();
        }

        let update = table.snapshot(5, NOW + 5 * DT);
        assert_eq!(update.player_states.len(), 2);
        for (player, state) in &update.player_states {
            assert_eq!(state, table.get(player).unwrap().first());
            assert_eq!(state.time, NOW + 3 * DT);
        }
        assert_eq!(
            table.players().cloned().collect::<Vec<_>>(),
            vec!["a".to_string(), "b".to_string()]
        );
    }
}
