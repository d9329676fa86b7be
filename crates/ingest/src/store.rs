use async_trait::async_trait;
use catgraph_common::{record_id, CatGraphError, Record, Result};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Record persistence keyed by record id
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Insert or replace the record with the same id
    async fn upsert(&self, record: Record) -> Result<()>;

    async fn get(&self, id: &Uuid) -> Result<Option<Record>>;

    /// All records, ordered by id
    async fn list(&self) -> Result<Vec<Record>>;

    async fn count(&self) -> Result<usize>;

    /// Record for a catalog key
    async fn get_by_package(&self, package_id: &str) -> Result<Option<Record>> {
        self.get(&record_id(package_id)).await
    }

    /// Bring durable storage to its compact form; called after a batch
    async fn flush(&self) -> Result<()> {
        Ok(())
    }
}

/// Volatile store for tests and dry runs
#[derive(Debug, Default)]
pub struct MemoryStore {
    records: RwLock<BTreeMap<Uuid, Record>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RecordStore for MemoryStore {
    async fn upsert(&self, record: Record) -> Result<()> {
        self.records.write().await.insert(record.id, record);
        Ok(())
    }

    async fn get(&self, id: &Uuid) -> Result<Option<Record>> {
        Ok(self.records.read().await.get(id).cloned())
    }

    async fn list(&self) -> Result<Vec<Record>> {
        Ok(self.records.read().await.values().cloned().collect())
    }

    async fn count(&self) -> Result<usize> {
        Ok(self.records.read().await.len())
    }
}

/// Journal lines tolerated before an upsert triggers compaction
const COMPACT_MIN_JOURNAL: usize = 1024;

#[derive(Debug, Default)]
struct FileState {
    records: BTreeMap<Uuid, Record>,
    /// Lines appended since the last snapshot
    journal_lines: usize,
    /// A journal append failed part way; the next write must compact
    journal_torn: bool,
}

/// Records in a pretty-printed JSON snapshot plus an append-only journal.
///
/// Each upsert appends one JSON line to `<path>.log`. Opening the store
/// replays the journal over the snapshot and compacts both into the
/// snapshot, as does [`RecordStore::flush`] and a journal that outgrows
/// the record count.
pub struct JsonFileStore {
    path: PathBuf,
    journal_path: PathBuf,
    state: RwLock<FileState>,
}

fn rekey(mut record: Record) -> Record {
    let id = record_id(&record.package_id);
    if record.id != id {
        debug!("Re-keying {} from {} to {}", record.package_id, record.id, id);
        record.id = id;
    }
    record
}

fn persist_error(path: &Path, e: impl std::fmt::Display) -> CatGraphError {
    CatGraphError::persist(format!("Failed to write {}: {}", path.display(), e))
}

/// Snapshot rows as pretty JSON, written to a temp file and renamed over `path`
fn write_snapshot(path: &Path, records: &BTreeMap<Uuid, Record>) -> Result<()> {
    let rows: Vec<&Record> = records.values().collect();
    let data = serde_json::to_string_pretty(&rows)?;

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    let tmp_path = path.with_extension("json.tmp");
    std::fs::write(&tmp_path, data)?;
    std::fs::rename(&tmp_path, path)?;
    Ok(())
}

impl JsonFileStore {
    /// Open the store at `path`, starting empty if nothing exists yet.
    ///
    /// Rows written by older stores (`package`, `notes_embedding`, random ids)
    /// are re-keyed by their catalog key. Unreadable journal lines (a torn
    /// final write) are skipped.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let journal_path = path.with_extension("json.log");
        let mut records = BTreeMap::new();

        if path.exists() {
            let data = std::fs::read_to_string(&path)?;
            let rows: Vec<Record> = serde_json::from_str(&data).map_err(|e| {
                CatGraphError::persist(format!("Corrupt record store {}: {}", path.display(), e))
            })?;
            for record in rows {
                let record = rekey(record);
                records.insert(record.id, record);
            }
        }

        let mut replayed = 0usize;
        if journal_path.exists() {
            let journal = std::fs::read_to_string(&journal_path)?;
            for (n, line) in journal.lines().enumerate() {
                if line.trim().is_empty() {
                    continue;
                }
                match serde_json::from_str::<Record>(line) {
                    Ok(record) => {
                        let record = rekey(record);
                        records.insert(record.id, record);
                        replayed += 1;
                    }
                    Err(e) => warn!(
                        "Skipping unreadable line {} of {}: {}",
                        n + 1,
                        journal_path.display(),
                        e
                    ),
                }
            }

            write_snapshot(&path, &records).map_err(|e| persist_error(&path, e))?;
            std::fs::remove_file(&journal_path)?;
        }

        info!(
            "Record store opened - {} records at {} ({} journal entries replayed)",
            records.len(),
            path.display(),
            replayed
        );
        Ok(Self {
            path,
            journal_path,
            state: RwLock::new(FileState {
                records,
                ..Default::default()
            }),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Journal file next to the snapshot
    pub fn journal_path(&self) -> &Path {
        &self.journal_path
    }

    async fn append(&self, record: &Record) -> Result<()> {
        let mut line = serde_json::to_string(record)?;
        line.push('\n');

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        let mut journal = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.journal_path)
            .await?;
        journal.write_all(line.as_bytes()).await?;
        journal.flush().await?;
        Ok(())
    }

    /// Rewrite the snapshot from memory and drop the journal
    fn compact(&self, state: &mut FileState) -> Result<()> {
        write_snapshot(&self.path, &state.records).map_err(|e| persist_error(&self.path, e))?;
        match std::fs::remove_file(&self.journal_path) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(persist_error(&self.journal_path, e)),
        }
        debug!(
            "Compacted {} journal entries into {}",
            state.journal_lines,
            self.path.display()
        );
        state.journal_lines = 0;
        state.journal_torn = false;
        Ok(())
    }
}

#[async_trait]
impl RecordStore for JsonFileStore {
    async fn upsert(&self, record: Record) -> Result<()> {
        let mut state = self.state.write().await;
        let id = record.id;

        if state.journal_torn {
            let previous = state.records.insert(id, record);
            if let Err(e) = self.compact(&mut state) {
                match previous {
                    Some(old) => state.records.insert(id, old),
                    None => state.records.remove(&id),
                };
                return Err(e);
            }
            return Ok(());
        }

        if let Err(e) = self.append(&record).await {
            state.journal_torn = true;
            return Err(persist_error(&self.journal_path, e));
        }
        state.records.insert(id, record);
        state.journal_lines += 1;

        if state.journal_lines >= COMPACT_MIN_JOURNAL.max(state.records.len()) {
            // the record is already durable in the journal
            if let Err(e) = self.compact(&mut state) {
                warn!("Journal compaction failed: {}", e);
            }
        }
        Ok(())
    }

    async fn get(&self, id: &Uuid) -> Result<Option<Record>> {
        Ok(self.state.read().await.records.get(id).cloned())
    }

    async fn list(&self) -> Result<Vec<Record>> {
        Ok(self.state.read().await.records.values().cloned().collect())
    }

    async fn count(&self) -> Result<usize> {
        Ok(self.state.read().await.records.len())
    }

    async fn flush(&self) -> Result<()> {
        let mut state = self.state.write().await;
        if state.journal_lines == 0 && !state.journal_torn {
            return Ok(());
        }
        self.compact(&mut state)
    }
}
