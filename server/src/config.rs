//! Server tuning knobs
//!
//! Every timing and capacity the scheduler depends on lives here, so a host can
//! build one value from its command line and hand it to [`Scheduler::new`].
//!
//! [`Scheduler::new`]: crate::scheduler::Scheduler::new

use std::time::Duration;

/// Configuration for the tick scheduler and its queues.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServerConfig {
    /// Length of one logical tick, and of the wall-clock interval driving it.
    pub tick_interval_ms: i64,
    /// Snapshots retained per player. The oldest is what gets published, so
    /// this is also the publication delay in ticks.
    pub window_depth: usize,
    /// A world update is emitted every `publish_every` ticks.
    pub publish_every: u64,
    /// Bound of the ingress command queue.
    pub queue_capacity: usize,
    /// Updates a peer may have outstanding before newer ones are skipped for it.
    pub peer_buffer: usize,
    /// Ticks between comparisons of logical time against the wall clock.
    pub recalibrate_every: u64,
    /// Most extra ticks run in one go to catch up with the wall clock.
    pub max_catch_up_ticks: u32,
    /// How far back a join's connect time is replayed tick by tick. Anything
    /// older is covered by a single tick.
    pub max_join_lag_ms: i64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: 17,
            window_depth: 30,
            publish_every: 10,
            queue_capacity: 1 << 14,
            peer_buffer: 4,
            recalibrate_every: 60,
            max_catch_up_ticks: 10,
            max_join_lag_ms: 60_000,
        }
    }
}

impl ServerConfig {
    /// Returns a copy with every zero (or negative) value raised to 1, the
    /// smallest setting the scheduler can run with. The join lag is raised to
    /// at least one window.
    pub fn validate(self) -> Self {
        let mut config = Self {
            tick_interval_ms: self.tick_interval_ms.max(1),
            window_depth: self.window_depth.max(1),
            publish_every: self.publish_every.max(1),
            queue_capacity: self.queue_capacity.max(1),
            peer_buffer: self.peer_buffer.max(1),
            recalibrate_every: self.recalibrate_every.max(1),
            max_catch_up_ticks: self.max_catch_up_ticks,
            max_join_lag_ms: self.max_join_lag_ms,
        };
        config.max_join_lag_ms = config.max_join_lag_ms.max(config.window_span_ms());
        config
    }

    pub fn tick_duration(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms.max(1) as u64)
    }

    /// Logical time spanned by a full window, in ms.
    pub fn window_span_ms(&self) -> i64 {
        self.window_depth as i64 * self.tick_interval_ms
    }
}
