use chrono::Local;
use log::info;
use rover_proto::Command;
use std::time::Duration;

use crate::dispatcher::Dispatcher;
use crate::error::RoverError;
use crate::history::CommandLog;
use crate::manager::ConnectionManager;
use crate::state::LinkState;
use crate::transport::{Connector, TransportEvent};

/// One operator's control session: connection, id counter and history.
pub struct RoverSession {
    conn: ConnectionManager,
    dispatcher: Dispatcher,
    log: CommandLog,
    ack_timeout: Option<Duration>,
}

impl RoverSession {
    pub fn new(connector: impl Connector) -> Self {
        Self {
            conn: ConnectionManager::new(connector),
            dispatcher: Dispatcher::new(),
            log: CommandLog::new(),
            ack_timeout: None,
        }
    }

    /// Unacknowledged commands older than `timeout` become `TimedOut` on the
    /// next [`RoverSession::expire_stale`]. Without it they stay `Sent`.
    pub fn with_ack_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.ack_timeout = timeout;
        self
    }

    pub fn ack_timeout(&self) -> Option<Duration> {
        self.ack_timeout
    }

    pub fn connect(&mut self, url: &str) {
        self.conn.connect(url);
    }

    pub fn disconnect(&mut self) {
        self.conn.disconnect();
    }

    pub fn state(&self) -> LinkState {
        self.conn.state()
    }

    pub fn transport_connected(&self) -> bool {
        self.conn.transport_connected()
    }

    pub fn device_connected(&self) -> bool {
        self.conn.device_connected()
    }

    pub fn error(&self) -> Option<&RoverError> {
        self.conn.error()
    }

    pub fn clear_error(&mut self) {
        self.conn.clear_error();
    }

    pub fn log(&self) -> &CommandLog {
        &self.log
    }

    pub fn next_id(&self) -> u32 {
        self.dispatcher.next_id()
    }

    pub fn dispatch(&mut self, cmd: Command, params: Vec<f64>) -> bool {
        self.dispatcher
            .dispatch(&mut self.conn, &mut self.log, cmd, params)
    }

    pub fn move_forward(&mut self, speed: Option<f64>) -> bool {
        self.dispatch(Command::MoveForward, speed.into_iter().collect())
    }

    pub fn move_backward(&mut self, speed: Option<f64>) -> bool {
        self.dispatch(Command::MoveBackward, speed.into_iter().collect())
    }

    pub fn move_left(&mut self, speed: Option<f64>) -> bool {
        self.dispatch(Command::MoveLeft, speed.into_iter().collect())
    }

    pub fn move_right(&mut self, speed: Option<f64>) -> bool {
        self.dispatch(Command::MoveRight, speed.into_iter().collect())
    }

    pub fn stop(&mut self) -> bool {
        self.dispatch(Command::Stop, Vec::new())
    }

    /// Waits for the next transport notification. Cancel-safe, so it can sit
    /// in a `tokio::select!` next to operator input.
    pub async fn next_event(&mut self) -> Option<TransportEvent> {
        self.conn.next_event().await
    }

    pub fn try_next_event(&mut self) -> Option<TransportEvent> {
        self.conn.try_next_event()
    }

    pub fn handle_event(&mut self, event: TransportEvent) {
        self.conn.handle_event(event, &mut self.log);
    }

    /// Handles every event already queued.
    pub fn drain_events(&mut self) {
        while let Some(event) = self.try_next_event() {
            self.handle_event(event);
        }
    }

    pub fn expire_stale(&mut self) -> usize {
        let Some(timeout) = self.ack_timeout else {
            return 0;
        };
        let expired = self.log.expire_stale(Local::now(), timeout);
        if expired > 0 {
            info!("{expired} command(s) timed out waiting for acknowledgment");
        }
        expired
    }
}
