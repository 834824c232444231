use anyhow::{anyhow, Context};
use futures_util::{SinkExt, StreamExt};
use log::{debug, info, warn};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tokio_tungstenite::{connect_async, tungstenite::protocol::Message};
use url::Url;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEventKind {
    Opened,
    Text(String),
    /// Binary frames are not part of the protocol; only the size is kept.
    Binary(usize),
    Error(String),
    Closed,
}

/// A notification from one transport instance. `generation` identifies which
/// `connect` produced it so late events from a discarded socket can be
/// told apart.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportEvent {
    pub generation: u64,
    pub kind: TransportEventKind,
}

#[derive(Debug, Clone)]
pub struct EventSink {
    generation: u64,
    tx: mpsc::UnboundedSender<TransportEvent>,
}

impl EventSink {
    pub fn new(generation: u64, tx: mpsc::UnboundedSender<TransportEvent>) -> Self {
        Self { generation, tx }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn emit(&self, kind: TransportEventKind) {
        let event = TransportEvent {
            generation: self.generation,
            kind,
        };
        if let Err(e) = self.tx.send(event) {
            debug!("event receiver gone, dropping {:?}", e.0.kind);
        }
    }
}

/// Write half of a live connection, owned by the connection manager.
pub trait Transport: Send {
    fn send_text(&mut self, text: String) -> anyhow::Result<()>;
    fn close(&mut self);
}

/// Opens transports. Lifecycle and inbound frames are reported through the
/// given [`EventSink`], never by return value.
pub trait Connector: Send + Sync + 'static {
    fn open(&self, url: &Url, events: EventSink) -> Box<dyn Transport>;
}

/// WebSocket connector. Must be used from within a tokio runtime.
#[derive(Debug, Default, Clone, Copy)]
pub struct WsConnector;

impl Connector for WsConnector {
    fn open(&self, url: &Url, events: EventSink) -> Box<dyn Transport> {
        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(run_socket(url.clone(), rx, events));
        Box::new(WsTransport { outgoing: Some(tx) })
    }
}

struct WsTransport {
    outgoing: Option<mpsc::UnboundedSender<Message>>,
}

impl Transport for WsTransport {
    fn send_text(&mut self, text: String) -> anyhow::Result<()> {
        let tx = self.outgoing.as_ref().context("transport already closed")?;
        tx.send(Message::Text(text))
            .map_err(|_| anyhow!("socket task has exited"))
    }

    fn close(&mut self) {
        // Dropping the sender makes the socket task send a close frame and exit.
        self.outgoing = None;
    }
}

impl Drop for WsTransport {
    fn drop(&mut self) {
        self.close();
    }
}

async fn run_socket(
    url: Url,
    mut outgoing: mpsc::UnboundedReceiver<Message>,
    events: EventSink,
) {
    info!("connecting to {url}");
    let ws = match connect_async(url.as_str()).await {
        Ok((ws, _resp)) => ws,
        Err(e) => {
            warn!("connect {url}: {e}");
            events.emit(TransportEventKind::Error(e.to_string()));
            events.emit(TransportEventKind::Closed);
            return;
        }
    };
    info!("connected to {url}");
    events.emit(TransportEventKind::Opened);

    let (mut ws_tx, mut ws_rx) = ws.split();
    loop {
        tokio::select! {
            out = outgoing.recv() => match out {
                Some(msg) => {
                    if let Err(e) = ws_tx.send(msg).await {
                        events.emit(TransportEventKind::Error(e.to_string()));
                        break;
                    }
                }
                None => {
                    if let Err(e) = ws_tx.close().await {
                        debug!("closing {url}: {e}");
                    }
                    break;
                }
            },
            inbound = ws_rx.next() => match inbound {
                Some(Ok(Message::Text(text))) => events.emit(TransportEventKind::Text(text)),
                Some(Ok(Message::Binary(data))) => {
                    events.emit(TransportEventKind::Binary(data.len()))
                }
                Some(Ok(Message::Close(frame))) => {
                    info!("server closed connection: {frame:?}");
                    break;
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    warn!("websocket error on {url}: {e}");
                    events.emit(TransportEventKind::Error(e.to_string()));
                    break;
                }
                None => break,
            },
        }
    }

    events.emit(TransportEventKind::Closed);
}

#[derive(Debug, Default)]
struct FakeShared {
    urls: Vec<Url>,
    sinks: Vec<EventSink>,
    sent: Vec<String>,
    closed: usize,
    fail_sends: bool,
}

/// In-memory connector for tests. Clones share state, so a test can keep one
/// handle while the session owns another and drive events through the sink
/// the session was given.
#[derive(Debug, Clone, Default)]
pub struct FakeConnector {
    shared: Arc<Mutex<FakeShared>>,
}

impl FakeConnector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn open_count(&self) -> usize {
        self.shared.lock().unwrap().urls.len()
    }

    pub fn opened_urls(&self) -> Vec<Url> {
        self.shared.lock().unwrap().urls.clone()
    }

    pub fn last_sink(&self) -> Option<EventSink> {
        self.shared.lock().unwrap().sinks.last().cloned()
    }

    pub fn sent(&self) -> Vec<String> {
        self.shared.lock().unwrap().sent.clone()
    }

    pub fn closed_count(&self) -> usize {
        self.shared.lock().unwrap().closed
    }

    pub fn set_fail_sends(&self, fail: bool) {
        self.shared.lock().unwrap().fail_sends = fail;
    }
}

impl Connector for FakeConnector {
    fn open(&self, url: &Url, events: EventSink) -> Box<dyn Transport> {
        let mut shared = self.shared.lock().unwrap();
        shared.urls.push(url.clone());
        shared.sinks.push(events);
        Box::new(FakeTransport {
            shared: self.shared.clone(),
            closed: false,
        })
    }
}

struct FakeTransport {
    shared: Arc<Mutex<FakeShared>>,
    closed: bool,
}

impl Transport for FakeTransport {
    fn send_text(&mut self, text: String) -> anyhow::Result<()> {
        let mut shared = self.shared.lock().unwrap();
        if self.closed || shared.fail_sends {
            anyhow::bail!("fake transport refused frame");
        }
        shared.sent.push(text);
        Ok(())
    }

    fn close(&mut self) {
        if !self.closed {
            self.closed = true;
            self.shared.lock().unwrap().closed += 1;
        }
    }
}

impl Drop for FakeTransport {
    fn drop(&mut self) {
        self.close();
    }
}
