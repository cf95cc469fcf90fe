//! Player commands as handed over by a transport
//!
//! Codes 0-7 are gameplay, 8 and 9 are the join/leave control commands a
//! transport emits around a peer's connection.

use serde::{Deserialize, Serialize};

pub type PlayerId = String;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum CommandKind {
    Idle = 0,
    MoveLeft = 1,
    MoveRight = 2,
    RotateCw = 3,
    RotateCcw = 4,
    SoftDrop = 5,
    HardDrop = 6,
    Hold = 7,
    Join = 8,
    Leave = 9,
}

impl CommandKind {
    pub fn code(self) -> u8 {
        self as u8
    }

    /// Join and leave manage sessions; they never reach a player's state.
    pub fn is_control(self) -> bool {
        matches!(self, CommandKind::Join | CommandKind::Leave)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("unknown command code {0}")]
pub struct UnknownCommand(pub u8);

impl TryFrom<u8> for CommandKind {
    type Error = UnknownCommand;

    fn try_from(code: u8) -> Result<Self, Self::Error> {
        Ok(match code {
            0 => CommandKind::Idle,
            1 => CommandKind::MoveLeft,
            2 => CommandKind::MoveRight,
            3 => CommandKind::RotateCw,
            4 => CommandKind::RotateCcw,
            5 => CommandKind::SoftDrop,
            6 => CommandKind::HardDrop,
            7 => CommandKind::Hold,
            8 => CommandKind::Join,
            9 => CommandKind::Leave,
            other => return Err(UnknownCommand(other)),
        })
    }
}

/// A command stamped with the logical time (ms since the game epoch) at
/// which the player issued it. `index` orders commands that share a tick.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Command {
    pub time: i64,
    pub kind: CommandKind,
    pub player: PlayerId,
    #[serde(default)]
    pub index: u32,
}

impl Command {
    pub fn new(player: impl Into<PlayerId>, kind: CommandKind, time: i64) -> Self {
        Self {
            time,
            kind,
            player: player.into(),
            index: 0,
        }
    }

    pub fn with_index(mut self, index: u32) -> Self {
        self.index = index;
        self
    }

    pub fn join(player: impl Into<PlayerId>, time: i64) -> Self {
        Self::new(player, CommandKind::Join, time)
    }

    pub fn leave(player: impl Into<PlayerId>, time: i64) -> Self {
        Self::new(player, CommandKind::Leave, time)
    }
}
