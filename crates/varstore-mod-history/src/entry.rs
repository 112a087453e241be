/// Core types for recorded commands and log entries.
use std::fmt;

use serde::{Deserialize, Serialize};

/// Discriminant of a recorded command, without its payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CommandKind {
    Set,
    Unset,
}

impl CommandKind {
    /// Lowercase verb used in history listings.
    pub fn as_str(self) -> &'static str {
        match self {
            CommandKind::Set => "set",
            CommandKind::Unset => "unset",
        }
    }
}

/// A mutating command, carrying everything needed to reverse it.
///
/// `Unset` is only recorded when a binding was actually removed, so its
/// previous value is never absent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Command {
    /// `name` was bound to `value`; `previous` is the binding it replaced.
    Set {
        name: String,
        value: String,
        previous: Option<String>,
    },
    /// `name` was removed; `previous` is the value it held.
    Unset { name: String, previous: String },
}

impl Command {
    pub fn kind(&self) -> CommandKind {
        match self {
            Command::Set { .. } => CommandKind::Set,
            Command::Unset { .. } => CommandKind::Unset,
        }
    }

    /// Variable name the command touched.
    pub fn name(&self) -> &str {
        match self {
            Command::Set { name, .. } | Command::Unset { name, .. } => name,
        }
    }

    /// Value the command wrote, or `None` for an unset.
    pub fn value(&self) -> Option<&str> {
        match self {
            Command::Set { value, .. } => Some(value),
            Command::Unset { .. } => None,
        }
    }

    /// Value bound to the name before the command ran.
    pub fn previous(&self) -> Option<&str> {
        match self {
            Command::Set { previous, .. } => previous.as_deref(),
            Command::Unset { previous, .. } => Some(previous),
        }
    }
}

impl fmt::Display for Command {
    /// Renders as `"{verb} {name} = {value} (Previous: {previous})"`.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} = {} (Previous: {})",
            self.kind().as_str(),
            self.name(),
            self.value().unwrap_or("None"),
            self.previous().unwrap_or("None"),
        )
    }
}

/// A command stored in a `CommandLog`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    /// Order key assigned by the owning log. Strictly increasing per log.
    pub seq: u64,
    pub command: Command,
}

impl fmt::Display for HistoryEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.command, f)
    }
}
