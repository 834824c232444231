use rover_link::Command;
use thiserror::Error;

/// One operator request, parsed from a console line.
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    /// A driving key. Only honoured while the rover is online.
    Key(Command),
    /// An explicit movement request, with optional speed.
    Move(Command, Option<f64>),
    Connect(Option<String>),
    Disconnect,
    Status,
    Log,
    ClearError,
    Help,
    Quit,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum InputError {
    #[error("unknown command {0:?} (try `help`)")]
    Unknown(String),
    #[error("invalid speed {0:?}")]
    BadSpeed(String),
    #[error("`{0}` takes no speed")]
    UnexpectedSpeed(&'static str),
}

/// Driving keys: WASD, the arrow keys and space for stop. Accepts browser
/// key names as well as the escape sequences a terminal sends for arrows.
pub fn key_command(key: &str) -> Option<Command> {
    match key {
        "w" | "W" | "ArrowUp" | "\x1b[A" => Some(Command::MoveForward),
        "s" | "S" | "ArrowDown" | "\x1b[B" => Some(Command::MoveBackward),
        "a" | "A" | "ArrowLeft" | "\x1b[D" => Some(Command::MoveLeft),
        "d" | "D" | "ArrowRight" | "\x1b[C" => Some(Command::MoveRight),
        " " => Some(Command::Stop),
        _ => None,
    }
}

pub fn parse_line(line: &str) -> Result<Option<Action>, InputError> {
    let line = line.trim_end_matches(&['\r', '\n'][..]);
    if let Some(cmd) = key_command(line) {
        return Ok(Some(Action::Key(cmd)));
    }

    let mut words = line.split_whitespace();
    let Some(word) = words.next() else {
        return Ok(None);
    };
    let arg = words.next();

    let action = match word.to_ascii_lowercase().as_str() {
        "forward" | "fwd" => Action::Move(Command::MoveForward, parse_speed(arg)?),
        "backward" | "back" => Action::Move(Command::MoveBackward, parse_speed(arg)?),
        "left" => Action::Move(Command::MoveLeft, parse_speed(arg)?),
        "right" => Action::Move(Command::MoveRight, parse_speed(arg)?),
        "stop" => {
            if arg.is_some() {
                return Err(InputError::UnexpectedSpeed("stop"));
            }
            Action::Move(Command::Stop, None)
        }
        "connect" => Action::Connect(arg.map(str::to_string)),
        "disconnect" => Action::Disconnect,
        "status" => Action::Status,
        "log" | "history" => Action::Log,
        "clear" => Action::ClearError,
        "help" | "?" => Action::Help,
        "quit" | "exit" | "q" => Action::Quit,
        _ => return Err(InputError::Unknown(line.trim().to_string())),
    };
    Ok(Some(action))
}

fn parse_speed(arg: Option<&str>) -> Result<Option<f64>, InputError> {
    arg.map(|s| s.parse::<f64>().map_err(|_| InputError::BadSpeed(s.to_string())))
        .transpose()
}

pub const HELP: &str = "\
keys:     w/a/s/d or arrows + enter to drive, a lone space to stop (rover must be online)
commands: forward|backward|left|right [speed], stop
          connect [url], disconnect, status, log, clear, help, quit";
