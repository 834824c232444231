use std::fmt;
use thiserror::Error;

/// Movement commands understood by the rover firmware.
///
/// The numeric codes of the four movement commands mirror the firmware's
/// `rover_cmd_type_t` and must not be reordered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Command {
    MoveForward,
    MoveBackward,
    MoveLeft,
    MoveRight,
    /// Has no numeric code; frames carrying it omit the `cmd` key.
    Stop,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("unknown command code {0}")]
pub struct UnknownCommand(pub u8);

impl Command {
    pub const ALL: [Command; 5] = [
        Command::MoveForward,
        Command::MoveBackward,
        Command::MoveLeft,
        Command::MoveRight,
        Command::Stop,
    ];

    /// The value carried in the `cmd` field, if any.
    pub fn wire_code(self) -> Option<u8> {
        match self {
            Command::MoveForward => Some(0),
            Command::MoveBackward => Some(1),
            Command::MoveLeft => Some(2),
            Command::MoveRight => Some(3),
            Command::Stop => None,
        }
    }

    pub fn from_wire_code(code: Option<u8>) -> Result<Self, UnknownCommand> {
        match code {
            Some(0) => Ok(Command::MoveForward),
            Some(1) => Ok(Command::MoveBackward),
            Some(2) => Ok(Command::MoveLeft),
            Some(3) => Ok(Command::MoveRight),
            Some(other) => Err(UnknownCommand(other)),
            None => Ok(Command::Stop),
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Command::MoveForward => "Forward",
            Command::MoveBackward => "Backward",
            Command::MoveLeft => "Left",
            Command::MoveRight => "Right",
            Command::Stop => "Stop",
        }
    }

    /// Whether the command accepts an optional speed parameter.
    pub fn takes_speed(self) -> bool {
        !matches!(self, Command::Stop)
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}
