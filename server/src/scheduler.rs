//! Tick scheduler
//!
//! The scheduler owns the session table and is its only mutator. Each tick it
//! takes the commands that arrived since the previous tick and processes them in
//! a fixed order:
//!
//! 1. joins create and time-align new buffers
//! 2. gameplay commands are grouped per player and inserted into their buffers
//! 3. leaves destroy buffers
//! 4. every buffer advances one tick
//! 5. every `publish_every` ticks, the oldest snapshots become a [`WorldUpdate`]
//!
//! Logical time is a counter stepped by exactly one interval per tick. It is
//! compared with the wall clock only periodically, and when it has fallen behind
//! the scheduler runs a bounded number of extra ticks to catch up. It never
//! moves backward.

use crate::broadcast::FanOut;
use crate::config::ServerConfig;
use crate::queue::CommandReceiver;
use crate::session::{SessionTable, WorldUpdate};
use crate::utils::timestamp_ms;
use log::{debug, info, warn};
use std::collections::{BTreeMap, BTreeSet};
use std::future::Future;
use tetris::{Command, CommandKind, PlayerId};
use tokio::time::{interval, Duration, Instant, MissedTickBehavior};

/// Summary of one [`Scheduler::step`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickReport {
    /// Tick number after the step, starting at 1.
    pub tick: u64,
    /// Logical time after the step.
    pub time: i64,
    pub joined: usize,
    pub left: usize,
    /// Gameplay commands recorded into a buffer.
    pub applied: usize,
    /// Of `applied`, commands older than the window.
    pub clamped: usize,
    /// Commands for players with no buffer.
    pub dropped: usize,
    pub update: Option<WorldUpdate>,
}

pub struct Scheduler {
    config: ServerConfig,
    sessions: SessionTable,
    now: i64,
    tick: u64,
}

impl Scheduler {
    /// Creates a scheduler whose logical clock starts at `start_time`.
    pub fn new(config: ServerConfig, start_time: i64) -> Self {
        let config = config.validate();
        Self {
            sessions: SessionTable::new(config.window_depth, config.tick_interval_ms)
                .with_max_join_lag(config.max_join_lag_ms),
            config,
            now: start_time,
            tick: 0,
        }
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn sessions(&self) -> &SessionTable {
        &self.sessions
    }

    /// Current logical time, equal to every buffer's head time.
    pub fn now(&self) -> i64 {
        self.now
    }

    pub fn tick_count(&self) -> u64 {
        self.tick
    }

    /// Runs one tick over the given commands.
    pub fn step(&mut self, commands: Vec<Command>) -> TickReport {
        let mut report = TickReport::default();

        let mut joins: BTreeMap<PlayerId, i64> = BTreeMap::new();
        let mut leaves: BTreeSet<PlayerId> = BTreeSet::new();
        let mut inputs: BTreeMap<PlayerId, Vec<Command>> = BTreeMap::new();
        for command in commands {
            match command.kind {
                // The last join in a batch wins.
                CommandKind::Join => {
                    joins.insert(command.player, command.time);
                }
                CommandKind::Leave => {
                    leaves.insert(command.player);
                }
                _ => inputs.entry(command.player.clone()).or_default().push(command),
            }
        }

        for (player, joined_at) in joins {
            self.sessions.join(player, joined_at, self.now);
            report.joined += 1;
        }

        for (player, batch) in inputs {
            let count = batch.len();
            match self.sessions.add_inputs(&player, batch) {
                Some(insertion) => {
                    report.applied += insertion.recorded;
                    report.clamped += insertion.clamped;
                }
                None => {
                    warn!("Dropped {} command(s) for unknown player {}", count, player);
                    report.dropped += count;
                }
            }
        }

        for player in leaves {
            if self.sessions.leave(&player) {
                report.left += 1;
            } else {
                debug!("Leave for unknown player {}", player);
            }
        }

        self.sessions.tick_all();
        self.now += self.config.tick_interval_ms;
        self.tick += 1;

        report.tick = self.tick;
        report.time = self.now;
        if self.tick % self.config.publish_every == 0 {
            report.update = Some(self.sessions.snapshot(self.tick, self.now));
        }

        debug!(
            "Tick {} t={}: {} players, {} applied, {} clamped",
            self.tick,
            self.now,
            self.sessions.len(),
            report.applied,
            report.clamped
        );
        report
    }

    /// Runs empty ticks while logical time is at least one full interval
    /// behind `wall_now`, up to the configured cap.
    pub fn catch_up(&mut self, wall_now: i64) -> Vec<TickReport> {
        let mut reports = Vec::new();
        while reports.len() < self.config.max_catch_up_ticks as usize
            && self.now + self.config.tick_interval_ms <= wall_now
        {
            reports.push(self.step(Vec::new()));
        }
        reports
    }

    /// How far logical time trails `wall_now`, in ms. Negative when ahead.
    pub fn drift(&self, wall_now: i64) -> i64 {
        wall_now - self.now
    }
}

fn publish(fanout: &FanOut, report: &TickReport) {
    let Some(update) = &report.update else {
        return;
    };
    match fanout.publish(update) {
        Ok(published) => debug!(
            "Published tick {} to {} peers ({} skipped, {} pruned)",
            update.tick, published.delivered, published.skipped, published.pruned
        ),
        Err(e) => warn!("Failed to publish tick {}: {}", update.tick, e),
    }
}

/// Drives `scheduler` at its tick interval until `shutdown` completes, then
/// hands it back.
pub async fn run<F>(
    mut scheduler: Scheduler,
    mut commands: CommandReceiver,
    fanout: FanOut,
    shutdown: F,
) -> Scheduler
where
    F: Future,
{
    let config = *scheduler.config();
    let mut ticker = interval(config.tick_duration());
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    tokio::pin!(shutdown);

    let mut busy = Duration::ZERO;
    let mut measured = 0u32;

    info!(
        "Scheduler started at t={} ({}ms ticks, window of {} = {}ms, publishing every {} ticks)",
        scheduler.now(),
        config.tick_interval_ms,
        config.window_depth,
        config.window_span_ms(),
        config.publish_every
    );

    // The first tick completes immediately.
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = &mut shutdown => {
                let players: Vec<&str> =
                    scheduler.sessions().players().map(String::as_str).collect();
                info!("Scheduler stopping at tick {} with {} players {:?}",
                      scheduler.tick_count(), players.len(), players);
                break;
            }
            _ = ticker.tick() => {
                let started = Instant::now();

                let report = scheduler.step(commands.drain());
                publish(&fanout, &report);

                if report.tick % config.recalibrate_every == 0 {
                    let wall_now = timestamp_ms();
                    let extra = scheduler.catch_up(wall_now);
                    for report in &extra {
                        publish(&fanout, report);
                    }

                    let drift = scheduler.drift(timestamp_ms());
                    if drift.abs() > config.tick_interval_ms {
                        warn!("Logical clock is {}ms off the wall clock after {} catch-up ticks",
                              drift, extra.len());
                    }

                    busy += started.elapsed();
                    measured += 1;
                    debug!("Average tick time {:?}, drift {}ms",
                           busy / measured.max(1), drift);
                    busy = Duration::ZERO;
                    measured = 0;
                } else {
                    busy += started.elapsed();
                    measured += 1;
                }
            }
        }
    }

    scheduler
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::command_queue;
    use tetris::PlayerState;

    const T0: i64 = 5_000_000;

    fn config() -> ServerConfig {
        ServerConfig {
            window_depth: 5,
            publish_every: 3,
            ..ServerConfig::default()
        }
    }

    #[test]
    fn test_step_advances_clock() {
        let mut scheduler = Scheduler::new(config(), T0);
        let report = scheduler.step(Vec::new());
        assert_eq!(report.tick, 1);
        assert_eq!(report.time, T0 + 17);
        assert_eq!(scheduler.now(), T0 + 17);
        assert!(report.update.is_none());
    }

    #[test]
    fn test_join_input_leave_in_one_batch() {
        let mut scheduler = Scheduler::new(config(), T0);
        let report = scheduler.step(vec![
            Command::leave("bob", T0),
            Command::new("bob", CommandKind::HardDrop, T0),
            Command::join("bob", T0),
            Command::join("amy", T0),
        ]);

        // Joins first, so bob's input lands before he leaves.
        assert_eq!(report.joined, 2);
        assert_eq!(report.applied, 1);
        assert_eq!(report.dropped, 0);
        assert_eq!(report.left, 1);
        assert!(scheduler.sessions().contains("amy"));
        assert!(!scheduler.sessions().contains("bob"));
    }

    #[test]
    fn test_duplicate_join_keeps_last() {
        let mut scheduler = Scheduler::new(config(), T0);
        let report = scheduler.step(vec![
            Command::join("amy", T0 - 10),
            Command::join("amy", T0 - 3),
        ]);
        assert_eq!(report.joined, 1);

        let buffer = scheduler.sessions().get("amy").unwrap();
        assert_eq!(buffer.first(), &PlayerState::new(T0 - 3));
        assert_eq!(buffer.head().time, T0 + 17);
    }

    #[test]
    fn test_join_uses_configured_lag() {
        let mut scheduler = Scheduler::new(
            ServerConfig {
                max_join_lag_ms: 0,
                ..config()
            },
            T0,
        );
        scheduler.step(vec![Command::join("amy", T0 - 1_000_000)]);

        // The lag is raised to one window, so history older than five ticks
        // collapses into one.
        let mut expected = PlayerState::new(T0 - 1_000_000);
        expected.tick(T0 - 5 * 17);
        for _ in 0..2 {
            expected.tick(expected.time + 17);
        }
        let buffer = scheduler.sessions().get("amy").unwrap();
        assert_eq!(buffer.first(), &expected);
        assert_eq!(buffer.len(), 5);
    }

    #[test]
    fn test_unknown_player_dropped() {
        let mut scheduler = Scheduler::new(config(), T0);
        scheduler.step(vec![Command::join("amy", T0)]);
        let before = scheduler.sessions().get("amy").unwrap().head().clone();

        let report = scheduler.step(vec![
            Command::new("ghost", CommandKind::MoveLeft, T0 + 17),
            Command::new("ghost", CommandKind::HardDrop, T0 + 17),
        ]);
        assert_eq!(report.dropped, 2);
        assert_eq!(report.applied, 0);

        let mut expected = before;
        expected.tick(T0 + 34);
        assert_eq!(scheduler.sessions().get("amy").unwrap().head(), &expected);
    }

    #[test]
    fn test_publishes_oldest_snapshots_on_cadence() {
        let mut scheduler = Scheduler::new(config(), T0);
        scheduler.step(vec![Command::join("amy", T0)]);
        scheduler.step(Vec::new());
        let report = scheduler.step(Vec::new());

        let update = report.update.unwrap();
        assert_eq!(update.tick, 3);
        assert_eq!(update.time, T0 + 51);
        assert_eq!(update.player_states["amy"].time, T0);

        let later: Vec<TickReport> = (0..6).map(|_| scheduler.step(Vec::new())).collect();
        let published: Vec<u64> = later
            .iter()
            .filter_map(|r| r.update.as_ref().map(|u| u.tick))
            .collect();
        assert_eq!(published, vec![6, 9]);
        // Window of 5: the published snapshot trails the head by four ticks.
        let last = later[5].update.as_ref().unwrap();
        assert_eq!(last.player_states["amy"].time, T0 + 5 * 17);
    }

    #[test]
    fn test_catch_up_is_bounded() {
        let mut scheduler = Scheduler::new(config(), T0);
        let reports = scheduler.catch_up(T0 + 17 * 100);
        assert_eq!(reports.len(), 10);
        assert_eq!(scheduler.now(), T0 + 170);

        let reports = scheduler.catch_up(T0 + 180);
        assert!(reports.is_empty());
        assert_eq!(scheduler.drift(T0 + 180), 10);

        // Never backward.
        scheduler.catch_up(T0);
        assert_eq!(scheduler.now(), T0 + 170);
    }

    #[tokio::test]
    async fn test_run_until_shutdown() {
        let config = ServerConfig {
            tick_interval_ms: 2,
            publish_every: 2,
            ..ServerConfig::default()
        };
        let (sender, receiver) = command_queue(64);
        let fanout = FanOut::new(64);
        let mut peer = fanout.subscribe();
        let (stop_tx, stop_rx) = tokio::sync::oneshot::channel::<()>();

        sender.try_submit(Command::join("amy", timestamp_ms())).unwrap();
        let handle = tokio::spawn(run(
            Scheduler::new(config, timestamp_ms()),
            receiver,
            fanout.clone(),
            async move {
                let _ = stop_rx.await;
            },
        ));

        let bytes = tokio::time::timeout(Duration::from_secs(5), peer.updates.recv())
            .await
            .unwrap()
            .unwrap();
        let update = crate::broadcast::decode_update(&bytes).unwrap();
        assert!(update.player_states.contains_key("amy"));

        stop_tx.send(()).unwrap();
        let scheduler = handle.await.unwrap();
        assert!(scheduler.tick_count() >= 2);
        assert!(scheduler.sessions().contains("amy"));
    }
}
