//! Ingress command queue
//!
//! Connection handlers push commands from any task through a cloneable
//! [`CommandSender`]; the tick loop is the single consumer and drains the queue
//! once per tick without blocking. The queue is bounded and rejects new commands
//! when full, handing them back to the caller.

use thiserror::Error;
use tetris::Command;
use tokio::sync::mpsc::{self, error::TryRecvError, error::TrySendError};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EnqueueError {
    #[error("command queue is full")]
    Full(Command),
    #[error("command queue is closed")]
    Closed(Command),
}

impl EnqueueError {
    /// The rejected command.
    pub fn into_command(self) -> Command {
        match self {
            EnqueueError::Full(command) | EnqueueError::Closed(command) => command,
        }
    }
}

#[derive(Debug, Clone)]
pub struct CommandSender {
    inner: mpsc::Sender<Command>,
}

impl CommandSender {
    /// Enqueues without waiting.
    pub fn try_submit(&self, command: Command) -> Result<(), EnqueueError> {
        self.inner.try_send(command).map_err(|e| match e {
            TrySendError::Full(command) => EnqueueError::Full(command),
            TrySendError::Closed(command) => EnqueueError::Closed(command),
        })
    }

    /// Enqueues, waiting for room if the queue is full.
    pub async fn submit(&self, command: Command) -> Result<(), EnqueueError> {
        self.inner
            .send(command)
            .await
            .map_err(|e| EnqueueError::Closed(e.0))
    }
}

#[derive(Debug)]
pub struct CommandReceiver {
    inner: mpsc::Receiver<Command>,
    capacity: usize,
}

impl CommandReceiver {
    /// Takes everything queued so far, at most one queue's worth, in arrival
    /// order.
    pub fn drain(&mut self) -> Vec<Command> {
        let mut commands = Vec::new();
        while commands.len() < self.capacity {
            match self.inner.try_recv() {
                Ok(command) => commands.push(command),
                Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => break,
            }
        }
        commands
    }
}

/// Creates a bounded queue holding up to `capacity` commands.
pub fn command_queue(capacity: usize) -> (CommandSender, CommandReceiver) {
    let capacity = capacity.max(1);
    let (tx, rx) = mpsc::channel(capacity);
    (
        CommandSender { inner: tx },
        CommandReceiver {
            inner: rx,
            capacity,
        },
    )
}
