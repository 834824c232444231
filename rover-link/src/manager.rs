use log::{debug, info, warn};
use rover_proto::{parse_inbound, InboundMessage, ParseError};
use tokio::sync::mpsc;
use url::Url;

use crate::error::RoverError;
use crate::history::{CommandLog, CommandStatus};
use crate::state::LinkState;
use crate::transport::{Connector, EventSink, Transport, TransportEvent, TransportEventKind};

/// Owns the single transport to the relay and the link health derived from it.
pub struct ConnectionManager {
    connector: Box<dyn Connector>,
    transport: Option<Box<dyn Transport>>,
    state: LinkState,
    error: Option<RoverError>,
    generation: u64,
    events_tx: mpsc::UnboundedSender<TransportEvent>,
    events_rx: mpsc::UnboundedReceiver<TransportEvent>,
}

impl ConnectionManager {
    pub fn new(connector: impl Connector) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        Self {
            connector: Box::new(connector),
            transport: None,
            state: LinkState::Disconnected,
            error: None,
            generation: 0,
            events_tx,
            events_rx,
        }
    }

    pub fn state(&self) -> LinkState {
        self.state
    }

    pub fn transport_connected(&self) -> bool {
        self.state.transport_connected()
    }

    pub fn device_connected(&self) -> bool {
        self.state.device_connected()
    }

    pub fn error(&self) -> Option<&RoverError> {
        self.error.as_ref()
    }

    pub fn record_error(&mut self, err: RoverError) {
        self.error = Some(err);
    }

    pub fn clear_error(&mut self) {
        self.error = None;
    }

    /// Starts opening a transport to `url`. Does nothing while one is already
    /// open or being opened.
    pub fn connect(&mut self, url: &str) {
        if matches!(self.state, LinkState::Connecting | LinkState::Connected { .. }) {
            debug!("connect({url}) ignored: link is {:?}", self.state);
            return;
        }

        let url = match Url::parse(url) {
            Ok(url) => url,
            Err(e) => {
                warn!("invalid server url {url:?}: {e}");
                self.record_error(RoverError::Transport(format!("invalid url {url:?}: {e}")));
                return;
            }
        };

        // A transport that errored without closing yet is replaced.
        self.release_transport();
        self.generation += 1;
        let sink = EventSink::new(self.generation, self.events_tx.clone());
        self.transport = Some(self.connector.open(&url, sink));
        self.state = LinkState::Connecting;
        info!("connecting to {url} (generation {})", self.generation);
    }

    /// Closes the transport if there is one. Safe to call at any time.
    pub fn disconnect(&mut self) {
        if self.transport.is_some() {
            info!("disconnecting");
        }
        self.release_transport();
        self.state = LinkState::Disconnected;
    }

    pub fn send_text(&mut self, text: String) -> Result<(), RoverError> {
        if !self.transport_connected() {
            return Err(RoverError::NotConnected);
        }
        let transport = self.transport.as_mut().ok_or(RoverError::NotConnected)?;
        transport
            .send_text(text)
            .map_err(|e| RoverError::Transport(format!("{e:#}")))
    }

    pub async fn next_event(&mut self) -> Option<TransportEvent> {
        self.events_rx.recv().await
    }

    pub fn try_next_event(&mut self) -> Option<TransportEvent> {
        self.events_rx.try_recv().ok()
    }

    pub fn handle_event(&mut self, event: TransportEvent, log: &mut CommandLog) {
        if event.generation != self.generation || self.transport.is_none() {
            debug!(
                "dropping stale event {:?} from generation {}",
                event.kind, event.generation
            );
            return;
        }

        match event.kind {
            TransportEventKind::Opened => {
                info!("server connection open");
                self.state = LinkState::Connected { device: false };
                self.error = None;
            }
            TransportEventKind::Closed => {
                info!("server connection closed");
                self.transport = None;
                self.state = LinkState::Disconnected;
            }
            TransportEventKind::Error(message) => {
                warn!("transport error: {message}");
                self.record_error(RoverError::Transport(message));
                self.state = LinkState::Disconnected;
            }
            TransportEventKind::Text(raw) => match parse_inbound(&raw) {
                Ok(msg) => self.handle_inbound(msg, log),
                Err(e) => warn!("discarding inbound frame {raw:?}: {e}"),
            },
            TransportEventKind::Binary(len) => {
                warn!("discarding inbound frame: {}", ParseError::NotText(len));
            }
        }
    }

    fn handle_inbound(&mut self, msg: InboundMessage, log: &mut CommandLog) {
        match msg {
            InboundMessage::DeviceStatus { connected } => {
                if let LinkState::Connected { device } = &mut self.state {
                    if *device != connected {
                        info!("rover {}", if connected { "online" } else { "offline" });
                    }
                    *device = connected;
                }
            }
            InboundMessage::Ack { id } => {
                if !log.update_status(id, CommandStatus::Acknowledged, None) {
                    debug!("ack for unknown or settled command {id}");
                }
            }
            InboundMessage::Failure { id, message } => {
                warn!("rover reported error (id {id:?}): {message}");
                if let Some(id) = id {
                    log.update_status(id, CommandStatus::Failed, Some(message.clone()));
                }
                self.record_error(RoverError::Device { id, message });
            }
            InboundMessage::Telemetry { data } => {
                debug!("rover message: {data}");
            }
        }
    }

    fn release_transport(&mut self) {
        if let Some(mut transport) = self.transport.take() {
            transport.close();
        }
    }
}

impl Drop for ConnectionManager {
    fn drop(&mut self) {
        self.release_transport();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::history::LogEntry;
    use crate::transport::FakeConnector;
    use rover_proto::Command;

    fn open_manager() -> (ConnectionManager, FakeConnector, CommandLog) {
        let fake = FakeConnector::new();
        let mut mgr = ConnectionManager::new(fake.clone());
        let mut log = CommandLog::new();
        mgr.connect("ws://localhost:8080");
        fake.last_sink().unwrap().emit(TransportEventKind::Opened);
        pump(&mut mgr, &mut log);
        (mgr, fake, log)
    }

    fn pump(mgr: &mut ConnectionManager, log: &mut CommandLog) {
        while let Some(ev) = mgr.try_next_event() {
            mgr.handle_event(ev, log);
        }
    }

    fn inbound(fake: &FakeConnector, raw: &str) {
        fake.last_sink()
            .unwrap()
            .emit(TransportEventKind::Text(raw.to_string()));
    }

    #[test]
    fn lifecycle() {
        let fake = FakeConnector::new();
        let mut mgr = ConnectionManager::new(fake.clone());
        let mut log = CommandLog::new();
        assert_eq!(mgr.state(), LinkState::Disconnected);

        mgr.connect("ws://localhost:8080");
        assert_eq!(mgr.state(), LinkState::Connecting);
        assert!(!mgr.transport_connected());

        fake.last_sink().unwrap().emit(TransportEventKind::Opened);
        pump(&mut mgr, &mut log);
        assert_eq!(mgr.state(), LinkState::Connected { device: false });

        fake.last_sink().unwrap().emit(TransportEventKind::Closed);
        pump(&mut mgr, &mut log);
        assert_eq!(mgr.state(), LinkState::Disconnected);
    }

    #[test]
    fn connect_is_idempotent() {
        let (mut mgr, fake, _log) = open_manager();
        mgr.connect("ws://localhost:8080");
        mgr.connect("ws://elsewhere:9000");
        assert_eq!(fake.open_count(), 1);
    }

    #[test]
    fn connect_while_opening_does_not_duplicate() {
        let fake = FakeConnector::new();
        let mut mgr = ConnectionManager::new(fake.clone());
        mgr.connect("ws://localhost:8080");
        mgr.connect("ws://localhost:8080");
        assert_eq!(fake.open_count(), 1);
    }

    #[test]
    fn bad_url_is_a_transport_error() {
        let fake = FakeConnector::new();
        let mut mgr = ConnectionManager::new(fake.clone());
        mgr.connect("not a url");
        assert_eq!(fake.open_count(), 0);
        assert_eq!(mgr.state(), LinkState::Disconnected);
        assert!(matches!(mgr.error(), Some(RoverError::Transport(_))));
    }

    #[test]
    fn open_clears_previous_error() {
        let fake = FakeConnector::new();
        let mut mgr = ConnectionManager::new(fake.clone());
        let mut log = CommandLog::new();
        mgr.record_error(RoverError::NotConnected);
        mgr.connect("ws://localhost:8080");
        fake.last_sink().unwrap().emit(TransportEventKind::Opened);
        pump(&mut mgr, &mut log);
        assert_eq!(mgr.error(), None);
    }

    #[test]
    fn close_drops_device_flag() {
        let (mut mgr, fake, mut log) = open_manager();
        inbound(&fake, r#"{"type":"esp_status","connected":true}"#);
        pump(&mut mgr, &mut log);
        assert!(mgr.device_connected());

        fake.last_sink().unwrap().emit(TransportEventKind::Closed);
        pump(&mut mgr, &mut log);
        assert!(!mgr.device_connected());
        assert!(!mgr.transport_connected());
    }

    #[test]
    fn transport_error_is_recorded_without_retry() {
        let (mut mgr, fake, mut log) = open_manager();
        fake.last_sink()
            .unwrap()
            .emit(TransportEventKind::Error("connection reset".into()));
        pump(&mut mgr, &mut log);
        assert_eq!(
            mgr.error(),
            Some(&RoverError::Transport("connection reset".into()))
        );
        assert!(!mgr.transport_connected());
        assert_eq!(fake.open_count(), 1);
    }

    #[test]
    fn disconnect_is_idempotent() {
        let (mut mgr, fake, _log) = open_manager();
        mgr.disconnect();
        mgr.disconnect();
        assert_eq!(mgr.state(), LinkState::Disconnected);
        assert_eq!(fake.closed_count(), 1);
    }

    #[test]
    fn events_from_a_discarded_transport_are_ignored() {
        let (mut mgr, fake, mut log) = open_manager();
        let old = fake.last_sink().unwrap();
        mgr.disconnect();
        mgr.connect("ws://localhost:8080");
        old.emit(TransportEventKind::Opened);
        pump(&mut mgr, &mut log);
        assert_eq!(mgr.state(), LinkState::Connecting);
    }

    #[test]
    fn device_status_needs_open_transport() {
        let fake = FakeConnector::new();
        let mut mgr = ConnectionManager::new(fake.clone());
        let mut log = CommandLog::new();
        mgr.connect("ws://localhost:8080");
        inbound(&fake, r#"{"type":"esp_status","connected":true}"#);
        pump(&mut mgr, &mut log);
        assert!(!mgr.device_connected());
    }

    #[test]
    fn failure_updates_log_and_error() {
        let (mut mgr, fake, mut log) = open_manager();
        log.append(LogEntry::sent(3, Command::MoveRight));
        inbound(&fake, r#"{"type":"error","id":3,"message":"obstacle"}"#);
        pump(&mut mgr, &mut log);

        let entry = log.get(3).unwrap();
        assert_eq!(entry.status, CommandStatus::Failed);
        assert_eq!(entry.detail.as_deref(), Some("obstacle"));
        assert_eq!(
            mgr.error(),
            Some(&RoverError::Device {
                id: Some(3),
                message: "obstacle".into()
            })
        );
    }

    #[test]
    fn malformed_and_binary_frames_change_nothing() {
        let (mut mgr, fake, mut log) = open_manager();
        inbound(&fake, r#"{"type":"esp_status","connected":true}"#);
        pump(&mut mgr, &mut log);
        let before = mgr.state();

        inbound(&fake, "}{ definitely not json");
        fake.last_sink().unwrap().emit(TransportEventKind::Binary(16));
        inbound(&fake, r#"{"type":"esp_message","data":"battery 11.8V"}"#);
        pump(&mut mgr, &mut log);

        assert_eq!(mgr.state(), before);
        assert_eq!(mgr.error(), None);
        assert!(log.is_empty());
    }

    #[test]
    fn drop_closes_transport() {
        let (mgr, fake, _log) = open_manager();
        drop(mgr);
        assert_eq!(fake.closed_count(), 1);
    }
}
