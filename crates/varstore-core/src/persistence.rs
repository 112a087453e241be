/// Disk persistence layer backed by redb.
///
/// Uses a single redb database file with three tables:
/// - `variables`: variable name → raw value
/// - `history`: sequence number → bincode-serialized `HistoryEntry`
/// - `redo`: sequence number → bincode-serialized `HistoryEntry`
///
/// Writes are grouped into a `Batch` so that one executor operation lands in
/// one write transaction.
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use redb::{Database, ReadableDatabase, ReadableTable, Table, TableDefinition};
use varstore_mod_history::{HistoryEntry, LogKind};

/// Variables table: name → value. Values are stored as-is, empty strings included.
const VARIABLES_TABLE: TableDefinition<&str, &str> = TableDefinition::new("variables");

/// History table: seq → bincode-serialized HistoryEntry.
const HISTORY_TABLE: TableDefinition<u64, &[u8]> = TableDefinition::new("history");

/// Redo table: seq → bincode-serialized HistoryEntry.
const REDO_TABLE: TableDefinition<u64, &[u8]> = TableDefinition::new("redo");

/// Database file name inside the data directory.
const DB_FILE_NAME: &str = "varstore.redb";

fn log_table(kind: LogKind) -> TableDefinition<'static, u64, &'static [u8]> {
    match kind {
        LogKind::History => HISTORY_TABLE,
        LogKind::Redo => REDO_TABLE,
    }
}

/// One storage write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mutation {
    PutVariable { name: String, value: String },
    DeleteVariable { name: String },
    ClearVariables,
    AppendEntry { log: LogKind, entry: HistoryEntry },
    RemoveEntry { log: LogKind, seq: u64 },
    ClearLog { log: LogKind },
}

/// Ordered list of writes committed together.
#[derive(Debug, Clone, Default)]
pub struct Batch {
    mutations: Vec<Mutation>,
}

impl Batch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, mutation: Mutation) {
        self.mutations.push(mutation);
    }

    pub fn is_empty(&self) -> bool {
        self.mutations.is_empty()
    }

    pub fn len(&self) -> usize {
        self.mutations.len()
    }

    pub fn mutations(&self) -> &[Mutation] {
        &self.mutations
    }
}

/// Persistence layer for variables and both command logs.
///
/// Thread-safe: redb supports concurrent readers and serialized writers.
/// Shared via `Arc<PersistenceLayer>`.
pub struct PersistenceLayer {
    db: Database,
    /// Makes the next non-empty commit fail before it lands.
    #[cfg(test)]
    fail_next_commit: std::sync::atomic::AtomicBool,
}

impl std::fmt::Debug for PersistenceLayer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PersistenceLayer").finish()
    }
}

impl PersistenceLayer {
    /// Opens or creates the database in the given directory.
    ///
    /// Creates the directory and database file if they don't exist.
    /// Initializes tables on first use.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created or the database
    /// cannot be opened.
    pub fn open(data_dir: &Path) -> Result<Arc<Self>> {
        std::fs::create_dir_all(data_dir)
            .with_context(|| format!("Failed to create data directory: {}", data_dir.display()))?;

        let db_path = data_dir.join(DB_FILE_NAME);
        let db = Database::create(&db_path)
            .with_context(|| format!("Failed to open database: {}", db_path.display()))?;

        // Ensure tables exist
        let write_txn = db
            .begin_write()
            .context("Failed to begin initial write transaction")?;
        {
            let _ = write_txn
                .open_table(VARIABLES_TABLE)
                .context("Failed to create variables table")?;
            let _ = write_txn
                .open_table(HISTORY_TABLE)
                .context("Failed to create history table")?;
            let _ = write_txn
                .open_table(REDO_TABLE)
                .context("Failed to create redo table")?;
        }
        write_txn
            .commit()
            .context("Failed to commit initial transaction")?;

        tracing::debug!("Opened variable database at {}", db_path.display());
        Ok(Arc::new(Self {
            db,
            #[cfg(test)]
            fail_next_commit: std::sync::atomic::AtomicBool::new(false),
        }))
    }

    /// Applies every mutation of `batch` in one write transaction.
    ///
    /// Either all mutations are durable afterwards or none are.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or any table write fails; the
    /// transaction is then dropped without committing.
    pub fn commit(&self, batch: &Batch) -> Result<()> {
        if batch.is_empty() {
            return Ok(());
        }

        let write_txn = self
            .db
            .begin_write()
            .context("Failed to begin write transaction")?;
        {
            let mut variables = write_txn
                .open_table(VARIABLES_TABLE)
                .context("Failed to open variables table")?;
            let mut history = write_txn
                .open_table(HISTORY_TABLE)
                .context("Failed to open history table")?;
            let mut redo = write_txn
                .open_table(REDO_TABLE)
                .context("Failed to open redo table")?;

            for mutation in batch.mutations() {
                match mutation {
                    Mutation::PutVariable { name, value } => {
                        variables
                            .insert(name.as_str(), value.as_str())
                            .with_context(|| format!("Failed to write variable {name}"))?;
                    }
                    Mutation::DeleteVariable { name } => {
                        variables
                            .remove(name.as_str())
                            .with_context(|| format!("Failed to delete variable {name}"))?;
                    }
                    Mutation::ClearVariables => clear_variables(&mut variables)?,
                    Mutation::AppendEntry { log, entry } => {
                        let table = match log {
                            LogKind::History => &mut history,
                            LogKind::Redo => &mut redo,
                        };
                        let bytes =
                            bincode::serialize(entry).context("Failed to serialize log entry")?;
                        table
                            .insert(entry.seq, bytes.as_slice())
                            .with_context(|| format!("Failed to append {log} entry"))?;
                    }
                    Mutation::RemoveEntry { log, seq } => {
                        let table = match log {
                            LogKind::History => &mut history,
                            LogKind::Redo => &mut redo,
                        };
                        table
                            .remove(*seq)
                            .with_context(|| format!("Failed to remove {log} entry {seq}"))?;
                    }
                    Mutation::ClearLog { log } => {
                        let table = match log {
                            LogKind::History => &mut history,
                            LogKind::Redo => &mut redo,
                        };
                        clear_log(table, *log)?;
                    }
                }
            }
        }
        self.check_injected_failure()?;
        write_txn
            .commit()
            .context("Failed to commit write transaction")?;
        Ok(())
    }

    #[cfg(test)]
    pub(crate) fn fail_next_commit(&self) {
        self.fail_next_commit
            .store(true, std::sync::atomic::Ordering::SeqCst);
    }

    #[cfg(test)]
    fn check_injected_failure(&self) -> Result<()> {
        if self
            .fail_next_commit
            .swap(false, std::sync::atomic::Ordering::SeqCst)
        {
            anyhow::bail!("Injected commit failure");
        }
        Ok(())
    }

    #[cfg(not(test))]
    fn check_injected_failure(&self) -> Result<()> {
        Ok(())
    }

    /// Reads a single variable.
    ///
    /// # Errors
    ///
    /// Returns an error if the read transaction fails.
    pub fn load_variable(&self, name: &str) -> Result<Option<String>> {
        let read_txn = self
            .db
            .begin_read()
            .context("Failed to begin read transaction")?;
        let table = read_txn
            .open_table(VARIABLES_TABLE)
            .context("Failed to open variables table")?;

        let value = table
            .get(name)
            .with_context(|| format!("Failed to read variable {name}"))?
            .map(|guard| guard.value().to_string());
        Ok(value)
    }

    /// Reads all variables, ordered by name.
    ///
    /// # Errors
    ///
    /// Returns an error if the read transaction fails.
    pub fn load_variables(&self) -> Result<Vec<(String, String)>> {
        let read_txn = self
            .db
            .begin_read()
            .context("Failed to begin read transaction")?;
        let table = read_txn
            .open_table(VARIABLES_TABLE)
            .context("Failed to open variables table")?;

        let mut bindings = Vec::new();
        for entry in table.iter().context("Failed to iterate variables table")? {
            let (key_guard, value_guard) = entry.context("Failed to read variable")?;
            bindings.push((
                key_guard.value().to_string(),
                value_guard.value().to_string(),
            ));
        }
        Ok(bindings)
    }

    /// Reads every entry of a log, ordered by sequence number.
    ///
    /// # Errors
    ///
    /// Returns an error if the read transaction or deserialization fails.
    pub fn load_log(&self, kind: LogKind) -> Result<Vec<HistoryEntry>> {
        let read_txn = self
            .db
            .begin_read()
            .context("Failed to begin read transaction")?;
        let table = read_txn
            .open_table(log_table(kind))
            .with_context(|| format!("Failed to open {kind} table"))?;

        let mut entries = Vec::new();
        for entry in table
            .iter()
            .with_context(|| format!("Failed to iterate {kind} table"))?
        {
            let (_, value_guard) = entry.with_context(|| format!("Failed to read {kind} entry"))?;
            let decoded: HistoryEntry = bincode::deserialize(value_guard.value())
                .with_context(|| format!("Failed to deserialize {kind} entry"))?;
            entries.push(decoded);
        }
        Ok(entries)
    }

    /// Counts the entries stored in a log.
    ///
    /// # Errors
    ///
    /// Returns an error if the read transaction fails.
    pub fn count_entries(&self, kind: LogKind) -> Result<usize> {
        let read_txn = self
            .db
            .begin_read()
            .context("Failed to begin read transaction")?;
        let table = read_txn
            .open_table(log_table(kind))
            .with_context(|| format!("Failed to open {kind} table"))?;

        let count = table
            .iter()
            .with_context(|| format!("Failed to iterate {kind} table"))?
            .count();
        Ok(count)
    }
}

fn clear_variables(table: &mut Table<'_, &'static str, &'static str>) -> Result<()> {
    let keys = table
        .iter()
        .context("Failed to iterate variables table")?
        .map(|entry| entry.map(|(k, _)| k.value().to_string()))
        .collect::<Result<Vec<_>, _>>()
        .context("Failed to read variable while clearing")?;

    for key in &keys {
        table
            .remove(key.as_str())
            .context("Failed to remove variable")?;
    }
    Ok(())
}

fn clear_log(table: &mut Table<'_, u64, &'static [u8]>, kind: LogKind) -> Result<()> {
    let keys = table
        .iter()
        .with_context(|| format!("Failed to iterate {kind} table"))?
        .map(|entry| entry.map(|(k, _)| k.value()))
        .collect::<Result<Vec<_>, _>>()
        .with_context(|| format!("Failed to read {kind} entry while clearing"))?;

    for key in keys {
        table
            .remove(key)
            .with_context(|| format!("Failed to remove {kind} entry"))?;
    }
    Ok(())
}
