use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::command::{Command, UnknownCommand};

pub const MIN_ID: u32 = 1;
/// Ids travel as `uint16_t` on the firmware side.
pub const MAX_ID: u32 = u16::MAX as u32;
pub const MAX_PARAMS: usize = 10;

/// Client -> relay command frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(into = "WireOutbound", try_from = "WireOutbound")]
pub struct OutboundMessage {
    pub id: u32,
    pub cmd: Command,
    pub params: Vec<f64>,
}

impl OutboundMessage {
    pub fn new(id: u32, cmd: Command, params: Vec<f64>) -> Self {
        Self { id, cmd, params }
    }
}

#[derive(Serialize, Deserialize)]
struct WireOutbound {
    id: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    cmd: Option<u8>,
    params: Vec<f64>,
}

impl From<OutboundMessage> for WireOutbound {
    fn from(msg: OutboundMessage) -> Self {
        Self {
            id: msg.id,
            cmd: msg.cmd.wire_code(),
            params: msg.params,
        }
    }
}

impl TryFrom<WireOutbound> for OutboundMessage {
    type Error = UnknownCommand;

    fn try_from(wire: WireOutbound) -> Result<Self, Self::Error> {
        Ok(Self {
            id: wire.id,
            cmd: Command::from_wire_code(wire.cmd)?,
            params: wire.params,
        })
    }
}

/// Relay -> client frames.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum InboundMessage {
    /// Whether the relay can currently reach the rover.
    #[serde(rename = "esp_status")]
    DeviceStatus {
        #[serde(default)]
        connected: bool,
    },
    #[serde(rename = "ack")]
    Ack { id: u32 },
    #[serde(rename = "error")]
    Failure {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        id: Option<u32>,
        #[serde(default = "unknown_error")]
        message: String,
    },
    /// Free-form output forwarded from the firmware; diagnostic only.
    #[serde(rename = "esp_message")]
    Telemetry {
        #[serde(default)]
        data: serde_json::Value,
    },
}

fn unknown_error() -> String {
    "unknown error".to_string()
}

#[derive(Debug, Error)]
pub enum ParseError {
    #[error("malformed inbound frame: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("unexpected non-text frame ({0} bytes)")]
    NotText(usize),
}

/// Returns false for any frame the firmware would refuse; such frames must
/// never be sent.
pub fn validate(msg: &OutboundMessage) -> bool {
    if msg.id < MIN_ID || msg.id > MAX_ID {
        return false;
    }
    if msg.params.len() > MAX_PARAMS {
        return false;
    }
    msg.params.iter().all(|p| p.is_finite())
}

pub fn encode(msg: &OutboundMessage) -> Result<String, serde_json::Error> {
    serde_json::to_string(msg)
}

pub fn parse_inbound(raw: &str) -> Result<InboundMessage, ParseError> {
    Ok(serde_json::from_str(raw)?)
}
