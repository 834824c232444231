pub mod command;
pub mod message;

pub use command::{Command, UnknownCommand};
pub use message::{
    encode, parse_inbound, validate, InboundMessage, OutboundMessage, ParseError, MAX_ID,
    MAX_PARAMS, MIN_ID,
};
