/// Command history types for the variable store.
///
/// Provides the `Command` records that describe a reversible mutation, and
/// the `CommandLog` ordered log used for both the history and the redo side
/// of the undo/redo state machine. Storage is handled by `varstore-core`;
/// this crate only knows about ordering.
pub mod entry;
pub mod log;

pub use entry::{Command, CommandKind, HistoryEntry};
pub use log::{CommandLog, LogKind};
