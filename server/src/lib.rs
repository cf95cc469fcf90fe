//! # Authoritative Tetris Server
//!
//! This library hosts the authoritative simulation for a multiplayer
//! falling-block game. It keeps every player's state, applies their commands
//! in the order they were issued rather than the order they arrived, and
//! periodically publishes a consistent view of all players.
//!
//! ## Core Responsibilities
//!
//! ### Authoritative Simulation
//! All game rules run here, through the deterministic state machine of the
//! `tetris` crate. Clients only ever send commands; the state they see is the
//! state published by the server.
//!
//! ### Latency Absorption
//! Each player's recent history is kept in a [`buffer::ReconciliationBuffer`].
//! A command that arrives late is inserted at the tick it was issued in and the
//! history after it is recomputed. Only the oldest snapshot of each history is
//! published, so as long as a command arrives within the window its effect is
//! the same as if it had arrived on time.
//!
//! ### Publication
//! Every few ticks the oldest snapshots are gathered into one
//! [`session::WorldUpdate`], encoded once and fanned out to subscribed peers,
//! none of whom can hold up the tick loop or each other.
//!
//! ## Architecture Design
//!
//! ### Single Consumer Tick Loop
//! One task owns all player state. Connection handlers never touch it; they
//! push commands into a bounded queue ([`queue`]) that the loop drains once per
//! tick. No state is shared behind locks.
//!
//! ### Session Lifecycle
//! A `join` command creates a player's buffer, time-aligned with everyone
//! else; a `leave` command destroys it. Commands for players without a buffer
//! are dropped.
//!
//! ## Module Organization
//!
//! - [`config`]: timing and capacity settings
//! - [`buffer`]: the per-player reconciliation buffer
//! - [`session`]: the table of active players and the world update shape
//! - [`scheduler`]: the tick loop
//! - [`queue`]: the ingress command queue
//! - [`broadcast`]: per-peer fan-out of encoded world updates
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use server::broadcast::FanOut;
//! use server::config::ServerConfig;
//! use server::queue::command_queue;
//! use server::scheduler::{run, Scheduler};
//! use server::utils::timestamp_ms;
//! use tetris::{Command, CommandKind};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ServerConfig::default();
//!     let (commands, receiver) = command_queue(config.queue_capacity);
//!     let fanout = FanOut::new(config.peer_buffer);
//!
//!     // A transport clones `commands` into each connection handler and
//!     // hands each peer a subscription.
//!     let mut peer = fanout.subscribe();
//!     commands.try_submit(Command::join("alice", timestamp_ms()))?;
//!     commands.try_submit(Command::new("alice", CommandKind::HardDrop, timestamp_ms()))?;
//!     tokio::spawn(async move {
//!         while let Some(bytes) = peer.updates.recv().await {
//!             // forward `bytes` to the peer's connection
//!         }
//!     });
//!
//!     let scheduler = Scheduler::new(config, timestamp_ms());
//!     run(scheduler, receiver, fanout, tokio::signal::ctrl_c()).await;
//!     Ok(())
//! }
//! ```

pub mod broadcast;
pub mod buffer;
pub mod config;
pub mod queue;
pub mod scheduler;
pub mod session;
pub mod utils;

pub use broadcast::FanOut;
pub use config::ServerConfig;
pub use scheduler::{Scheduler, TickReport};
pub use session::WorldUpdate;
