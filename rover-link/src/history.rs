use chrono::{DateTime, Local};
use rover_proto::Command;
use std::collections::VecDeque;
use std::fmt;
use std::time::Duration;

/// Number of dispatched commands kept for display.
pub const LOG_CAPACITY: usize = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandStatus {
    Sent,
    Acknowledged,
    Failed,
    /// No acknowledgment arrived within the configured timeout.
    TimedOut,
}

impl CommandStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, CommandStatus::Sent)
    }
}

impl fmt::Display for CommandStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            CommandStatus::Sent => "sent",
            CommandStatus::Acknowledged => "ack",
            CommandStatus::Failed => "error",
            CommandStatus::TimedOut => "timeout",
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LogEntry {
    pub id: u32,
    pub command: Command,
    pub created_at: DateTime<Local>,
    pub status: CommandStatus,
    pub detail: Option<String>,
}

impl LogEntry {
    pub fn sent(id: u32, command: Command) -> Self {
        Self {
            id,
            command,
            created_at: Local::now(),
            status: CommandStatus::Sent,
            detail: None,
        }
    }
}

/// Bounded, newest-first history of dispatched commands.
#[derive(Debug, Clone)]
pub struct CommandLog {
    entries: VecDeque<LogEntry>,
    capacity: usize,
}

impl Default for CommandLog {
    fn default() -> Self {
        Self::new()
    }
}

impl CommandLog {
    pub fn new() -> Self {
        Self::with_capacity(LOG_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(capacity + 1),
            capacity,
        }
    }

    pub fn append(&mut self, entry: LogEntry) {
        self.entries.push_front(entry);
        self.entries.truncate(self.capacity);
    }

    /// Moves a `Sent` entry to a terminal status. Returns false when the id is
    /// unknown (possibly already evicted) or the entry has already settled.
    pub fn update_status(
        &mut self,
        id: u32,
        status: CommandStatus,
        detail: Option<String>,
    ) -> bool {
        if !status.is_terminal() {
            return false;
        }
        match self.entries.iter_mut().find(|e| e.id == id) {
            Some(entry) if !entry.status.is_terminal() => {
                entry.status = status;
                if detail.is_some() {
                    entry.detail = detail;
                }
                true
            }
            _ => false,
        }
    }

    /// Promotes `Sent` entries older than `timeout` to `TimedOut`.
    pub fn expire_stale(&mut self, now: DateTime<Local>, timeout: Duration) -> usize {
        let Ok(limit) = chrono::Duration::from_std(timeout) else {
            return 0;
        };
        let mut expired = 0;
        for entry in self.entries.iter_mut() {
            if entry.status == CommandStatus::Sent
                && now.signed_duration_since(entry.created_at) >= limit
            {
                entry.status = CommandStatus::TimedOut;
                entry.detail = Some(format!("no acknowledgment after {}ms", timeout.as_millis()));
                expired += 1;
            }
        }
        expired
    }

    pub fn get(&self, id: u32) -> Option<&LogEntry> {
        self.entries.iter().find(|e| e.id == id)
    }

    /// Newest first.
    pub fn iter(&self) -> impl Iterator<Item = &LogEntry> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
