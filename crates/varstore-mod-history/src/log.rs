/// Ordered command log with tail access.
///
/// Used twice by the executor: once as the history of executed commands and
/// once as the redo log of undone commands. Both behave as stacks whose
/// order is fixed by a sequence number assigned at append time.
use std::fmt;

use crate::entry::{Command, HistoryEntry};

/// Which of the two logs a `CommandLog` represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LogKind {
    History,
    Redo,
}

impl LogKind {
    /// Stable name, also used as the storage table name.
    pub fn as_str(self) -> &'static str {
        match self {
            LogKind::History => "history",
            LogKind::Redo => "redo",
        }
    }
}

impl fmt::Display for LogKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Append-only log of commands, consumed from the tail.
#[derive(Clone)]
pub struct CommandLog {
    kind: LogKind,
    /// Entries ordered by seq ascending (oldest first).
    entries: Vec<HistoryEntry>,
    /// Next sequence number to assign.
    next_seq: u64,
}

impl fmt::Debug for CommandLog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommandLog")
            .field("kind", &self.kind)
            .field("len", &self.entries.len())
            .field("next_seq", &self.next_seq)
            .finish()
    }
}

impl CommandLog {
    /// Creates an empty log.
    pub fn new(kind: LogKind) -> Self {
        Self {
            kind,
            entries: Vec::new(),
            next_seq: 0,
        }
    }

    /// Rebuilds a log from stored entries.
    ///
    /// Entries are sorted by seq; the counter resumes after the highest one.
    pub fn from_entries(kind: LogKind, mut entries: Vec<HistoryEntry>) -> Self {
        entries.sort_by_key(|e| e.seq);
        tracing::debug!("Restored {} {kind} entries", entries.len());
        let next_seq = entries.last().map_or(0, |e| e.seq + 1);
        Self {
            kind,
            entries,
            next_seq,
        }
    }

    /// Appends a command at the tail and returns the stored entry.
    pub fn append(&mut self, command: Command) -> &HistoryEntry {
        let entry = HistoryEntry {
            seq: self.next_seq,
            command,
        };
        self.next_seq += 1;
        self.entries.push(entry);
        let idx = self.entries.len() - 1;
        &self.entries[idx]
    }

    /// Most recent entry, if any.
    pub fn peek_last(&self) -> Option<&HistoryEntry> {
        self.entries.last()
    }

    /// Removes and returns the most recent entry.
    pub fn pop_last(&mut self) -> Option<HistoryEntry> {
        self.entries.pop()
    }

    /// Drops every entry. The sequence counter keeps counting.
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Drops every entry and restarts the sequence counter at zero.
    pub fn reset(&mut self) {
        self.entries.clear();
        self.next_seq = 0;
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterates entries oldest first.
    pub fn iter(&self) -> std::slice::Iter<'_, HistoryEntry> {
        self.entries.iter()
    }
}
