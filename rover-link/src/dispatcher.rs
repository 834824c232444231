use log::{debug, warn};
use rover_proto::{encode, validate, Command, OutboundMessage, MAX_ID, MIN_ID};

use crate::error::RoverError;
use crate::history::{CommandLog, LogEntry};
use crate::manager::ConnectionManager;

/// Turns commands into validated, transmitted and logged frames.
///
/// The id counter only advances after a frame has actually been handed to
/// the transport, so rejected dispatches never consume an id.
#[derive(Debug, Clone)]
pub struct Dispatcher {
    next_id: u32,
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl Dispatcher {
    pub fn new() -> Self {
        Self { next_id: MIN_ID }
    }

    /// The id the next successful dispatch will carry.
    pub fn next_id(&self) -> u32 {
        self.next_id
    }

    /// Returns false and records the error on the connection when the command
    /// could not be sent.
    pub fn dispatch(
        &mut self,
        conn: &mut ConnectionManager,
        log: &mut CommandLog,
        cmd: Command,
        params: Vec<f64>,
    ) -> bool {
        match self.try_dispatch(conn, log, cmd, params) {
            Ok(id) => {
                debug!("sent {cmd} as #{id}");
                true
            }
            Err(err) => {
                warn!("{cmd} not sent: {err}");
                conn.record_error(err);
                false
            }
        }
    }

    pub fn try_dispatch(
        &mut self,
        conn: &mut ConnectionManager,
        log: &mut CommandLog,
        cmd: Command,
        params: Vec<f64>,
    ) -> Result<u32, RoverError> {
        if !conn.transport_connected() {
            return Err(RoverError::NotConnected);
        }

        let msg = OutboundMessage::new(self.next_id, cmd, params);
        if !validate(&msg) {
            return Err(RoverError::InvalidMessage);
        }
        let frame = encode(&msg).map_err(|_| RoverError::InvalidMessage)?;
        conn.send_text(frame)?;

        log.append(LogEntry::sent(msg.id, cmd));
        self.advance();
        Ok(msg.id)
    }

    fn advance(&mut self) {
        self.next_id = if self.next_id >= MAX_ID {
            MIN_ID
        } else {
            self.next_id + 1
        };
    }
}
