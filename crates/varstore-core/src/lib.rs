/// Variable store with persisted undo/redo.
///
/// `CommandExecutor` is the entry point: it owns the current bindings, the
/// history log and the redo log, serializes every mutation behind one lock,
/// and commits each operation to redb as a single write transaction.
pub mod executor;
pub mod outcome;
pub mod persistence;
pub mod store;

pub use executor::CommandExecutor;
pub use outcome::Outcome;
pub use persistence::{Batch, Mutation, PersistenceLayer};
pub use store::VariableStore;
pub use varstore_mod_history::{Command, CommandKind, HistoryEntry, LogKind};
