/// Command executor: the undo/redo state machine.
///
/// Owns the variable bindings plus the history and redo logs behind a single
/// `RwLock`. Every mutating operation holds the write lock from its first
/// read to the storage commit, so "read the log tail, then pop or append" is
/// never interleaved with another caller. Reads share the lock and only ever
/// see fully applied operations.
use std::sync::{Arc, RwLock, RwLockReadGuard};

use anyhow::{anyhow, Context, Result};
use varstore_mod_history::{Command, CommandLog, HistoryEntry, LogKind};

use crate::outcome::Outcome;
use crate::persistence::{Batch, Mutation, PersistenceLayer};
use crate::store::VariableStore;

/// Everything guarded by the executor lock.
#[derive(Debug)]
struct State {
    variables: VariableStore,
    history: CommandLog,
    redo: CommandLog,
}

impl State {
    fn empty() -> Self {
        Self {
            variables: VariableStore::new(),
            history: CommandLog::new(LogKind::History),
            redo: CommandLog::new(LogKind::Redo),
        }
    }

    fn load(pl: &PersistenceLayer) -> Result<Self> {
        let variables = pl
            .load_variables()
            .context("Failed to load variables from disk")?;
        let history = pl
            .load_log(LogKind::History)
            .context("Failed to load history from disk")?;
        let redo = pl
            .load_log(LogKind::Redo)
            .context("Failed to load redo history from disk")?;

        Ok(Self {
            variables: VariableStore::from_bindings(variables),
            history: CommandLog::from_entries(LogKind::History, history),
            redo: CommandLog::from_entries(LogKind::Redo, redo),
        })
    }

    fn log_mut(&mut self, kind: LogKind) -> &mut CommandLog {
        match kind {
            LogKind::History => &mut self.history,
            LogKind::Redo => &mut self.redo,
        }
    }
}

/// One in-flight mutation: changes go to memory immediately and are
/// recorded in a batch for the storage commit.
///
/// The methods here are history-unaware. Only the executor's `set`/`unset`
/// decide to append history and drop the redo chain.
struct Transaction<'a> {
    state: &'a mut State,
    batch: Batch,
}

impl Transaction<'_> {
    fn current(&self, name: &str) -> Option<String> {
        self.state.variables.get(name).map(str::to_string)
    }

    /// Binds `name` to `value`, or removes it when `value` is `None`.
    fn write_variable(&mut self, name: &str, value: Option<&str>) {
        match value {
            Some(value) => {
                self.state.variables.set(name, value);
                self.batch.push(Mutation::PutVariable {
                    name: name.to_string(),
                    value: value.to_string(),
                });
            }
            None => {
                self.state.variables.unset(name);
                self.batch.push(Mutation::DeleteVariable {
                    name: name.to_string(),
                });
            }
        }
    }

    fn append(&mut self, log: LogKind, command: Command) {
        let entry = self.state.log_mut(log).append(command).clone();
        self.batch.push(Mutation::AppendEntry { log, entry });
    }

    fn pop_last(&mut self, log: LogKind) -> Option<HistoryEntry> {
        let entry = self.state.log_mut(log).pop_last()?;
        self.batch.push(Mutation::RemoveEntry {
            log,
            seq: entry.seq,
        });
        Some(entry)
    }

    fn clear_log(&mut self, log: LogKind) {
        let target = self.state.log_mut(log);
        if target.is_empty() {
            return;
        }
        target.clear();
        self.batch.push(Mutation::ClearLog { log });
    }

    fn clear_all(&mut self) {
        self.state.variables.clear();
        self.state.history.reset();
        self.state.redo.reset();
        self.batch.push(Mutation::ClearVariables);
        self.batch.push(Mutation::ClearLog {
            log: LogKind::History,
        });
        self.batch.push(Mutation::ClearLog { log: LogKind::Redo });
    }

    /// Reports the binding `name` has right now.
    fn binding(&self, name: &str) -> Outcome {
        Outcome::Binding {
            name: name.to_string(),
            value: self.current(name),
        }
    }
}

/// Executes set/unset/undo/redo/clear against the variable store.
///
/// Share it across threads with `Arc<CommandExecutor>`; all methods take
/// `&self`.
pub struct CommandExecutor {
    state: RwLock<State>,
    /// Optional disk persistence (None = in-memory only).
    persistence: Option<Arc<PersistenceLayer>>,
}

impl std::fmt::Debug for CommandExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandExecutor")
            .field("state", &self.state)
            .field("persistent", &self.persistence.is_some())
            .finish()
    }
}

impl CommandExecutor {
    /// Creates an executor with nothing stored and no persistence.
    pub fn in_memory() -> Self {
        Self {
            state: RwLock::new(State::empty()),
            persistence: None,
        }
    }

    /// Loads variables and both logs from disk, or starts empty.
    ///
    /// With `persistence: None` this is the same as `in_memory()`.
    ///
    /// # Errors
    ///
    /// Returns an error if the persistence layer fails to read.
    pub fn load_or_new(persistence: Option<Arc<PersistenceLayer>>) -> Result<Self> {
        let state = match &persistence {
            Some(pl) => State::load(pl)?,
            None => State::empty(),
        };
        tracing::debug!(
            variables = state.variables.len(),
            history = state.history.len(),
            redo = state.redo.len(),
            "Variable store ready"
        );
        Ok(Self {
            state: RwLock::new(state),
            persistence,
        })
    }

    /// Current value of `name`.
    pub fn get(&self, name: &str) -> Result<Option<String>> {
        Ok(self.read()?.variables.get(name).map(str::to_string))
    }

    /// Number of variables whose value equals `value`.
    pub fn count_by_value(&self, value: &str) -> Result<usize> {
        Ok(self.read()?.variables.count_by_value(value))
    }

    /// All bindings, ordered by name.
    pub fn variables(&self) -> Result<Vec<(String, String)>> {
        let state = self.read()?;
        Ok(state
            .variables
            .iter()
            .map(|(name, value)| (name.to_string(), value.to_string()))
            .collect())
    }

    /// History entries, oldest first.
    pub fn history(&self) -> Result<Vec<HistoryEntry>> {
        Ok(self.read()?.history.iter().cloned().collect())
    }

    pub fn can_undo(&self) -> Result<bool> {
        Ok(!self.read()?.history.is_empty())
    }

    pub fn can_redo(&self) -> Result<bool> {
        Ok(!self.read()?.redo.is_empty())
    }

    /// Binds `name` to `value`, recording the binding it replaced.
    ///
    /// Invalidates any pending redo.
    ///
    /// # Errors
    ///
    /// Returns an error if the change cannot be persisted.
    pub fn set(&self, name: &str, value: &str) -> Result<Outcome> {
        self.mutate("set", |txn| {
            let previous = txn.current(name);
            txn.write_variable(name, Some(value));
            txn.append(
                LogKind::History,
                Command::Set {
                    name: name.to_string(),
                    value: value.to_string(),
                    previous,
                },
            );
            txn.clear_log(LogKind::Redo);
            Outcome::Binding {
                name: name.to_string(),
                value: Some(value.to_string()),
            }
        })
    }

    /// Removes the binding for `name`.
    ///
    /// Unsetting an unbound name changes nothing and records nothing, so
    /// pending redo survives it.
    ///
    /// # Errors
    ///
    /// Returns an error if the change cannot be persisted.
    pub fn unset(&self, name: &str) -> Result<Outcome> {
        self.mutate("unset", |txn| {
            let Some(previous) = txn.current(name) else {
                return Outcome::NoBinding {
                    name: name.to_string(),
                };
            };
            txn.write_variable(name, None);
            txn.append(
                LogKind::History,
                Command::Unset {
                    name: name.to_string(),
                    previous,
                },
            );
            txn.clear_log(LogKind::Redo);
            Outcome::Binding {
                name: name.to_string(),
                value: None,
            }
        })
    }

    /// Reverses the most recent command and makes it redoable.
    ///
    /// # Errors
    ///
    /// Returns an error if the change cannot be persisted.
    pub fn undo(&self) -> Result<Outcome> {
        self.mutate("undo", |txn| {
            let Some(entry) = txn.pop_last(LogKind::History) else {
                return Outcome::NoCommands;
            };
            let name = entry.command.name().to_string();
            txn.write_variable(&name, entry.command.previous());
            txn.append(LogKind::Redo, entry.command);
            txn.binding(&name)
        })
    }

    /// Re-applies the most recently undone command.
    ///
    /// The command goes back on top of the history; the rest of the redo
    /// chain stays available.
    ///
    /// # Errors
    ///
    /// Returns an error if the change cannot be persisted.
    pub fn redo(&self) -> Result<Outcome> {
        self.mutate("redo", |txn| {
            let Some(entry) = txn.pop_last(LogKind::Redo) else {
                return Outcome::NoCommands;
            };
            let name = entry.command.name().to_string();
            txn.write_variable(&name, entry.command.value());
            txn.append(LogKind::History, entry.command);
            txn.binding(&name)
        })
    }

    /// Deletes every variable and both logs. Cannot be undone.
    ///
    /// # Errors
    ///
    /// Returns an error if the change cannot be persisted.
    pub fn clear_all(&self) -> Result<Outcome> {
        self.mutate("clear", |txn| {
            txn.clear_all();
            Outcome::Cleaned
        })
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, State>> {
        self.state
            .read()
            .map_err(|_| anyhow!("Variable store lock poisoned"))
    }

    /// Runs `op` under the write lock and commits what it staged.
    ///
    /// On a failed commit nothing reached disk, so memory is reloaded from
    /// disk to drop the staged changes.
    fn mutate<F>(&self, op: &'static str, f: F) -> Result<Outcome>
    where
        F: FnOnce(&mut Transaction<'_>) -> Outcome,
    {
        let mut guard = self
            .state
            .write()
            .map_err(|_| anyhow!("Variable store lock poisoned"))?;

        let mut txn = Transaction {
            state: &mut *guard,
            batch: Batch::new(),
        };
        let outcome = f(&mut txn);
        let batch = txn.batch;

        if let Some(pl) = &self.persistence {
            if let Err(e) = pl.commit(&batch) {
                match State::load(pl) {
                    Ok(state) => *guard = state,
                    Err(reload_err) => {
                        tracing::error!("Failed to reload state after {op} failed: {reload_err:#}");
                    }
                }
                return Err(e.context(format!("Failed to persist {op}")));
            }
        }

        tracing::debug!(op, writes = batch.len(), "{outcome}");
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn persistent_executor(dir: &std::path::Path) -> (CommandExecutor, Arc<PersistenceLayer>) {
        let pl = PersistenceLayer::open(dir).expect("open db");
        let exec = CommandExecutor::load_or_new(Some(Arc::clone(&pl))).expect("load");
        (exec, pl)
    }

    // --- State machine (in-memory) ---

    #[test]
    fn test_set_then_get() {
        let exec = CommandExecutor::in_memory();
        let outcome = exec.set("x", "10").expect("set");
        assert_eq!(outcome.to_string(), "x = 10");
        assert_eq!(exec.get("x").expect("get"), Some("10".to_string()));
    }

    #[test]
    fn test_undo_redo_scenario() {
        let exec = CommandExecutor::in_memory();
        exec.set("x", "1").expect("set");
        exec.set("x", "2").expect("set");

        assert_eq!(exec.undo().expect("undo").to_string(), "x = 1");
        assert_eq!(exec.get("x").expect("get"), Some("1".to_string()));

        assert_eq!(exec.undo().expect("undo").to_string(), "x = None");
        assert_eq!(exec.get("x").expect("get"), None);

        assert_eq!(exec.redo().expect("redo").to_string(), "x = 1");
        assert_eq!(exec.redo().expect("redo").to_string(), "x = 2");
        assert_eq!(exec.redo().expect("redo"), Outcome::NoCommands);
    }

    #[test]
    fn test_empty_logs_report_no_commands() {
        let exec = CommandExecutor::in_memory();
        assert_eq!(exec.undo().expect("undo").to_string(), "NO COMMANDS");
        assert_eq!(exec.redo().expect("redo").to_string(), "NO COMMANDS");
    }

    #[test]
    fn test_unset_missing_records_nothing() {
        let exec = CommandExecutor::in_memory();
        let outcome = exec.unset("never_set").expect("unset");
        assert_eq!(
            outcome,
            Outcome::NoBinding {
                name: "never_set".to_string()
            }
        );
        assert_eq!(outcome.to_string(), "never_set = None");
        assert!(!exec.can_undo().expect("can_undo"));
        assert_eq!(exec.undo().expect("undo"), Outcome::NoCommands);
    }

    #[test]
    fn test_undo_unset_restores_value() {
        let exec = CommandExecutor::in_memory();
        exec.set("a", "5").expect("set");
        assert_eq!(exec.unset("a").expect("unset").to_string(), "a = None");
        assert_eq!(exec.undo().expect("undo").to_string(), "a = 5");
        assert_eq!(exec.redo().expect("redo").to_string(), "a = None");
        assert_eq!(exec.get("a").expect("get"), None);
    }

    #[test]
    fn test_new_set_invalidates_redo() {
        let exec = CommandExecutor::in_memory();
        exec.set("x", "1").expect("set");
        exec.set("x", "2").expect("set");
        exec.undo().expect("undo");
        assert!(exec.can_redo().expect("can_redo"));

        exec.set("y", "3").expect("set");
        assert!(!exec.can_redo().expect("can_redo"));
        assert_eq!(exec.redo().expect("redo"), Outcome::NoCommands);
    }

    #[test]
    fn test_new_unset_invalidates_redo() {
        let exec = CommandExecutor::in_memory();
        exec.set("x", "1").expect("set");
        exec.set("y", "2").expect("set");
        exec.undo().expect("undo");

        exec.unset("x").expect("unset");
        assert_eq!(exec.redo().expect("redo"), Outcome::NoCommands);
    }

    #[test]
    fn test_noop_unset_keeps_redo() {
        let exec = CommandExecutor::in_memory();
        exec.set("x", "1").expect("set");
        exec.undo().expect("undo");

        exec.unset("ghost").expect("unset");
        assert_eq!(exec.redo().expect("redo").to_string(), "x = 1");
    }

    #[test]
    fn test_undo_does_not_record_history() {
        let exec = CommandExecutor::in_memory();
        exec.set("x", "1").expect("set");
        exec.set("x", "2").expect("set");
        exec.undo().expect("undo");

        let history = exec.history().expect("history");
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].command.value(), Some("1"));
    }

    #[test]
    fn test_redo_keeps_remaining_chain() {
        let exec = CommandExecutor::in_memory();
        exec.set("a", "1").expect("set");
        exec.set("b", "2").expect("set");
        exec.set("c", "3").expect("set");
        exec.undo().expect("undo");
        exec.undo().expect("undo");
        exec.undo().expect("undo");

        exec.redo().expect("redo");
        assert!(exec.can_redo().expect("can_redo"));
        exec.redo().expect("redo");
        exec.redo().expect("redo");
        assert!(!exec.can_redo().expect("can_redo"));
        assert_eq!(exec.history().expect("history").len(), 3);
    }

    #[test]
    fn test_count_by_value() {
        let exec = CommandExecutor::in_memory();
        exec.set("a", "5").expect("set");
        exec.set("b", "5").expect("set");
        assert_eq!(exec.count_by_value("5").expect("count"), 2);
        exec.unset("a").expect("unset");
        assert_eq!(exec.count_by_value("5").expect("count"), 1);
    }

    #[test]
    fn test_clear_all() {
        let exec = CommandExecutor::in_memory();
        exec.set("a", "1").expect("set");
        exec.set("b", "2").expect("set");
        exec.undo().expect("undo");

        assert_eq!(exec.clear_all().expect("clear").to_string(), "CLEANED");
        assert!(exec.variables().expect("vars").is_empty());
        assert!(!exec.can_undo().expect("can_undo"));
        assert!(!exec.can_redo().expect("can_redo"));
        assert_eq!(exec.get("a").expect("get"), None);
    }

    #[test]
    fn test_empty_string_value_survives_undo() {
        let exec = CommandExecutor::in_memory();
        exec.set("x", "").expect("set");
        exec.set("x", "full").expect("set");
        assert_eq!(
            exec.undo().expect("undo"),
            Outcome::Binding {
                name: "x".to_string(),
                value: Some(String::new()),
            }
        );
        assert_eq!(exec.get("x").expect("get"), Some(String::new()));
    }

    // --- Persistence ---

    #[test]
    fn test_operations_are_written_through() {
        let dir = TempDir::new().expect("create temp dir");
        let (exec, pl) = persistent_executor(dir.path());

        exec.set("x", "1").expect("set");
        exec.set("x", "2").expect("set");
        exec.undo().expect("undo");

        assert_eq!(pl.load_variable("x").expect("get"), Some("1".to_string()));
        assert_eq!(pl.count_entries(LogKind::History).expect("count"), 1);
        assert_eq!(pl.count_entries(LogKind::Redo).expect("count"), 1);
    }

    #[test]
    fn test_noop_unset_writes_nothing() {
        let dir = TempDir::new().expect("create temp dir");
        let (exec, pl) = persistent_executor(dir.path());

        exec.unset("ghost").expect("unset");
        assert!(pl.load_variables().expect("load").is_empty());
        assert_eq!(pl.count_entries(LogKind::History).expect("count"), 0);
    }

    #[test]
    fn test_clear_all_empties_disk() {
        let dir = TempDir::new().expect("create temp dir");
        let (exec, pl) = persistent_executor(dir.path());

        exec.set("a", "1").expect("set");
        exec.set("b", "2").expect("set");
        exec.undo().expect("undo");
        exec.clear_all().expect("clear");

        assert!(pl.load_variables().expect("load").is_empty());
        assert_eq!(pl.count_entries(LogKind::History).expect("count"), 0);
        assert_eq!(pl.count_entries(LogKind::Redo).expect("count"), 0);
    }

    #[test]
    fn test_failed_commit_restores_memory_from_disk() {
        let dir = TempDir::new().expect("tempdir");
        let (exec, pl) = persistent_executor(dir.path());
        exec.set("x", "1").expect("set");

        pl.fail_next_commit();
        assert!(exec.set("x", "2").is_err());

        assert_eq!(exec.get("x").expect("get"), Some("1".to_string()));
        assert_eq!(exec.history().expect("history").len(), 1);
        assert!(!exec.can_redo().expect("can_redo"));
    }

    #[test]
    fn test_failed_undo_keeps_command_in_history() {
        let dir = TempDir::new().expect("tempdir");
        let (exec, pl) = persistent_executor(dir.path());
        exec.set("x", "1").expect("set");
        exec.set("x", "2").expect("set");

        pl.fail_next_commit();
        assert!(exec.undo().is_err());

        assert_eq!(exec.get("x").expect("get"), Some("2".to_string()));
        assert_eq!(exec.history().expect("history").len(), 2);
        assert!(!exec.can_redo().expect("can_redo"));

        // Later operations see the restored logs
        assert_eq!(exec.undo().expect("undo").to_string(), "x = 1");
        assert_eq!(exec.redo().expect("redo").to_string(), "x = 2");
    }

    #[test]
    fn test_load_or_new_restores_both_logs() {
        let dir = TempDir::new().expect("create temp dir");

        {
            let (exec, _pl) = persistent_executor(dir.path());
            exec.set("x", "1").expect("set");
            exec.set("x", "2").expect("set");
            exec.set("x", "3").expect("set");
            exec.undo().expect("undo");
        }

        {
            let (exec, _pl) = persistent_executor(dir.path());
            assert_eq!(exec.get("x").expect("get"), Some("2".to_string()));
            assert_eq!(exec.redo().expect("redo").to_string(), "x = 3");
            assert_eq!(exec.undo().expect("undo").to_string(), "x = 2");
            assert_eq!(exec.undo().expect("undo").to_string(), "x = 1");
            assert_eq!(exec.undo().expect("undo").to_string(), "x = None");
            assert_eq!(exec.undo().expect("undo"), Outcome::NoCommands);
        }
    }
}
