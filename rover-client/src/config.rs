use anyhow::Context;
use clap::Parser;
use std::time::Duration;

pub const DEFAULT_SERVER_URL: &str = "ws://localhost:8080";

#[derive(Debug, Parser)]
#[command(about = "Rover remote control console (talks to the rover relay over WebSocket)")]
pub struct Opts {
    /// Relay WebSocket URL [env: ROVER_SERVER_URL] [default: ws://localhost:8080]
    #[arg(long)]
    pub url: Option<String>,

    /// Mark commands as timed out when unacknowledged for this long
    /// [env: ROVER_ACK_TIMEOUT_MS]. Unset means wait forever.
    #[arg(long)]
    pub ack_timeout_ms: Option<u64>,

    /// Connect to the relay on startup
    #[arg(long, default_value_t = false)]
    pub connect: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub url: String,
    pub ack_timeout: Option<Duration>,
    pub connect_on_start: bool,
}

impl Config {
    /// Command-line flags win over the environment.
    pub fn resolve(opts: &Opts) -> anyhow::Result<Self> {
        Self::resolve_with(opts, |key| std::env::var(key).ok())
    }

    fn resolve_with(
        opts: &Opts,
        env: impl Fn(&str) -> Option<String>,
    ) -> anyhow::Result<Self> {
        let url = opts
            .url
            .clone()
            .or_else(|| env("ROVER_SERVER_URL").filter(|s| !s.trim().is_empty()))
            .unwrap_or_else(|| DEFAULT_SERVER_URL.to_string());

        let ack_timeout_ms = match opts.ack_timeout_ms {
            Some(ms) => Some(ms),
            None => env("ROVER_ACK_TIMEOUT_MS")
                .filter(|s| !s.trim().is_empty())
                .map(|s| {
                    s.trim()
                        .parse::<u64>()
                        .with_context(|| format!("invalid ROVER_ACK_TIMEOUT_MS {s:?}"))
                })
                .transpose()?,
        };

        Ok(Self {
            url,
            ack_timeout: ack_timeout_ms
                .filter(|ms| *ms > 0)
                .map(Duration::from_millis),
            connect_on_start: opts.connect,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn resolve(args: &[&str], env: &[(&str, &str)]) -> anyhow::Result<Config> {
        let argv = std::iter::once("rover-client").chain(args.iter().copied());
        let opts = Opts::try_parse_from(argv)?;
        let env: HashMap<String, String> = env
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::resolve_with(&opts, |k| env.get(k).cloned())
    }

    #[test]
    fn defaults() {
        let config = resolve(&[], &[]).unwrap();
        assert_eq!(config.url, DEFAULT_SERVER_URL);
        assert_eq!(config.ack_timeout, None);
        assert!(!config.connect_on_start);
    }

    #[test]
    fn environment_fills_gaps() {
        let config = resolve(
            &[],
            &[
                ("ROVER_SERVER_URL", "ws://192.168.1.100:8080"),
                ("ROVER_ACK_TIMEOUT_MS", "1500"),
            ],
        )
        .unwrap();
        assert_eq!(config.url, "ws://192.168.1.100:8080");
        assert_eq!(config.ack_timeout, Some(Duration::from_millis(1500)));
    }

    #[test]
    fn flags_override_environment() {
        let config = resolve(
            &["--url", "ws://rover.local:9000", "--ack-timeout-ms", "250", "--connect"],
            &[
                ("ROVER_SERVER_URL", "ws://192.168.1.100:8080"),
                ("ROVER_ACK_TIMEOUT_MS", "1500"),
            ],
        )
        .unwrap();
        assert_eq!(config.url, "ws://rover.local:9000");
        assert_eq!(config.ack_timeout, Some(Duration::from_millis(250)));
        assert!(config.connect_on_start);
    }

    #[test]
    fn zero_timeout_means_none() {
        let config = resolve(&["--ack-timeout-ms", "0"], &[]).unwrap();
        assert_eq!(config.ack_timeout, None);
    }

    #[test]
    fn bad_timeout_is_rejected() {
        let err = resolve(&[], &[("ROVER_ACK_TIMEOUT_MS", "soon")]).unwrap_err();
        assert!(err.to_string().contains("ROVER_ACK_TIMEOUT_MS"));
    }
}
