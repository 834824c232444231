use clap::Parser;
use rover_link::{RoverSession, WsConnector};
use std::io::BufRead;
use std::time::Duration;
use tokio::sync::mpsc;

mod config;
mod console;
mod input;

use config::{Config, Opts};
use console::Console;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init();

    let opts = Opts::parse();
    let config = Config::resolve(&opts)?;
    log::info!(
        "rover-client starting (server={}, ack_timeout={:?})",
        config.url,
        config.ack_timeout
    );

    let mut session = RoverSession::new(WsConnector).with_ack_timeout(config.ack_timeout);
    let mut console = Console::new(std::io::stdout(), config.url.clone());
    console.help()?;
    if config.connect_on_start {
        session.connect(&config.url);
        console.report_changes(&session)?;
    }

    // Blocking stdin reads stay off the runtime; lines are handled on the
    // same loop as transport events so each runs to completion in turn.
    let (line_tx, mut line_rx) = mpsc::unbounded_channel::<String>();
    std::thread::spawn(move || {
        for line in std::io::stdin().lock().lines() {
            let Ok(line) = line else { break };
            if line_tx.send(line).is_err() {
                break;
            }
        }
    });

    let mut sweep = tokio::time::interval(Duration::from_secs(1));
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            line = line_rx.recv() => {
                let Some(line) = line else { break };
                if !console.handle_line(&mut session, &line)? {
                    break;
                }
            }
            Some(event) = session.next_event() => {
                session.handle_event(event);
                console.report_changes(&session)?;
            }
            _ = sweep.tick() => {
                session.expire_stale();
            }
            _ = &mut ctrl_c => {
                log::info!("interrupted");
                break;
            }
        }
    }

    session.disconnect();
    Ok(())
}
