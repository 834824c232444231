//! Connection and command state for the rover remote control.
//!
//! [`RoverSession`] owns a [`ConnectionManager`], a [`Dispatcher`] and a
//! [`CommandLog`]. Transport notifications arrive as [`TransportEvent`]s on a
//! single channel and are handled one at a time.

mod dispatcher;
mod error;
mod history;
mod manager;
mod session;
mod state;
mod transport;

pub use dispatcher::Dispatcher;
pub use error::RoverError;
pub use history::{CommandLog, CommandStatus, LogEntry, LOG_CAPACITY};
pub use manager::ConnectionManager;
pub use session::RoverSession;
pub use state::LinkState;
pub use transport::{
    Connector, EventSink, FakeConnector, Transport, TransportEvent, TransportEventKind,
    WsConnector,
};

pub use rover_proto::Command;
