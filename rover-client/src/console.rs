use log::debug;
use rover_link::{CommandLog, CommandStatus, LinkState, RoverError, RoverSession};
use std::io::Write;

use crate::input::{parse_line, Action, HELP};

/// Line-oriented operator console. Prints connection and error changes as
/// they happen so the operator sees the same indicators a status bar would.
pub struct Console<W: Write> {
    out: W,
    default_url: String,
    last_state: LinkState,
    last_error: Option<RoverError>,
}

impl<W: Write> Console<W> {
    pub fn new(out: W, default_url: impl Into<String>) -> Self {
        Self {
            out,
            default_url: default_url.into(),
            last_state: LinkState::Disconnected,
            last_error: None,
        }
    }

    #[cfg(test)]
    pub fn into_inner(self) -> W {
        self.out
    }

    pub fn help(&mut self) -> std::io::Result<()> {
        writeln!(self.out, "{HELP}")
    }

    /// Returns false once the operator asked to quit.
    pub fn handle_line(
        &mut self,
        session: &mut RoverSession,
        line: &str,
    ) -> std::io::Result<bool> {
        let action = match parse_line(line) {
            Ok(Some(action)) => action,
            Ok(None) => return Ok(true),
            Err(e) => {
                writeln!(self.out, "{e}")?;
                return Ok(true);
            }
        };
        debug!("operator action {action:?}");

        match action {
            Action::Key(cmd) => {
                if session.device_connected() {
                    session.dispatch(cmd, Vec::new());
                } else {
                    writeln!(self.out, "rover offline, {cmd} key ignored")?;
                }
            }
            Action::Move(cmd, speed) => {
                session.dispatch(cmd, speed.into_iter().collect());
            }
            Action::Connect(url) => {
                if let Some(url) = url {
                    self.default_url = url;
                }
                session.connect(&self.default_url);
            }
            Action::Disconnect => session.disconnect(),
            Action::Status => writeln!(self.out, "{}", render_status(session))?,
            Action::Log => write!(self.out, "{}", render_log(session.log()))?,
            Action::ClearError => {
                session.clear_error();
                self.last_error = None;
            }
            Action::Help => self.help()?,
            Action::Quit => return Ok(false),
        }

        self.report_changes(session)?;
        Ok(true)
    }

    /// Prints the link state and the current error if either changed since
    /// the last call.
    pub fn report_changes(&mut self, session: &RoverSession) -> std::io::Result<()> {
        if session.state() != self.last_state {
            self.last_state = session.state();
            writeln!(self.out, "{}", render_status(session))?;
        }
        let error = session.error().cloned();
        if error != self.last_error {
            if let Some(err) = &error {
                writeln!(self.out, "error: {err} (`clear` to dismiss)")?;
            }
            self.last_error = error;
        }
        Ok(())
    }
}

fn indicator(ok: bool) -> &'static str {
    if ok {
        "OK"
    } else {
        "---"
    }
}

pub fn render_status(session: &RoverSession) -> String {
    let server = match session.state() {
        LinkState::Connecting => "connecting",
        state => indicator(state.transport_connected()),
    };
    let mut line = format!(
        "server: {server}  rover: {}",
        indicator(session.device_connected())
    );
    if let Some(err) = session.error() {
        line.push_str(&format!("  error: {err}"));
    }
    line
}

pub fn render_log(log: &CommandLog) -> String {
    if log.is_empty() {
        return "no commands sent\n".to_string();
    }
    let mut out = String::new();
    for entry in log.iter() {
        let marker = match entry.status {
            CommandStatus::Sent => '.',
            CommandStatus::Acknowledged => '+',
            CommandStatus::Failed => '!',
            CommandStatus::TimedOut => '?',
        };
        out.push_str(&format!(
            "{marker} #{:<5} {:<8} {}  {}",
            entry.id,
            entry.command.label(),
            entry.created_at.format("%H:%M:%S"),
            entry.status
        ));
        if let Some(detail) = &entry.detail {
            out.push_str(&format!("  ({detail})"));
        }
        out.push('\n');
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use rover_link::{FakeConnector, TransportEventKind};

    fn console() -> Console<Vec<u8>> {
        Console::new(Vec::new(), "ws://localhost:8080")
    }

    fn output(console: Console<Vec<u8>>) -> String {
        String::from_utf8(console.into_inner()).unwrap()
    }

    fn online(fake: &FakeConnector, session: &mut RoverSession, device: bool) {
        session.connect("ws://localhost:8080");
        let sink = fake.last_sink().unwrap();
        sink.emit(TransportEventKind::Opened);
        sink.emit(TransportEventKind::Text(format!(
            r#"{{"type":"esp_status","connected":{device}}}"#
        )));
        session.drain_events();
    }

    #[test]
    fn keys_need_the_rover_online() {
        let fake = FakeConnector::new();
        let mut session = RoverSession::new(fake.clone());
        online(&fake, &mut session, false);
        let mut console = console();

        assert!(console.handle_line(&mut session, "w").unwrap());
        assert!(session.log().is_empty());
        assert!(output(console).contains("rover offline"));
    }

    #[test]
    fn keys_drive_when_online() {
        let fake = FakeConnector::new();
        let mut session = RoverSession::new(fake.clone());
        online(&fake, &mut session, true);
        let mut console = console();

        console.handle_line(&mut session, "w").unwrap();
        console.handle_line(&mut session, " ").unwrap();
        assert_eq!(
            fake.sent(),
            vec![
                r#"{"id":1,"cmd":0,"params":[]}"#.to_string(),
                r#"{"id":2,"params":[]}"#.to_string(),
            ]
        );
    }

    #[test]
    fn typed_move_reports_not_connected() {
        let fake = FakeConnector::new();
        let mut session = RoverSession::new(fake);
        let mut console = console();

        console.handle_line(&mut session, "forward 50").unwrap();
        assert!(output(console).contains("error: not connected to the server"));
    }

    #[test]
    fn connect_uses_given_url_then_remembers_it() {
        let fake = FakeConnector::new();
        let mut session = RoverSession::new(fake.clone());
        let mut console = console();

        console
            .handle_line(&mut session, "connect ws://10.0.0.7:8080")
            .unwrap();
        session.disconnect();
        console.handle_line(&mut session, "connect").unwrap();
        let urls: Vec<String> = fake.opened_urls().iter().map(|u| u.to_string()).collect();
        assert_eq!(urls, vec!["ws://10.0.0.7:8080/", "ws://10.0.0.7:8080/"]);
    }

    #[test]
    fn quit_stops_the_loop() {
        let mut session = RoverSession::new(FakeConnector::new());
        let mut console = console();
        assert!(!console.handle_line(&mut session, "quit").unwrap());
    }

    #[test]
    fn status_line() {
        let fake = FakeConnector::new();
        let mut session = RoverSession::new(fake.clone());
        assert_eq!(render_status(&session), "server: ---  rover: ---");
        online(&fake, &mut session, true);
        assert_eq!(render_status(&session), "server: OK  rover: OK");
    }

    #[test]
    fn log_rendering() {
        let fake = FakeConnector::new();
        let mut session = RoverSession::new(fake.clone());
        assert_eq!(render_log(session.log()), "no commands sent\n");

        online(&fake, &mut session, true);
        session.move_left(Some(10.0));
        session.stop();
        let failure = r#"{"type":"error","id":1,"message":"blocked"}"#;
        fake.last_sink()
            .unwrap()
            .emit(TransportEventKind::Text(failure.to_string()));
        session.drain_events();

        let rendered = render_log(session.log());
        let lines: Vec<&str> = rendered.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with(". #2     Stop"));
        assert!(lines[0].ends_with("sent"));
        assert!(lines[1].starts_with("! #1     Left"));
        assert!(lines[1].ends_with("error  (blocked)"));
    }
}
