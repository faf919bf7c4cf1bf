// File-backed gateway adapters for local operation
//
// The state store is one JSON document rewritten atomically (temp file then
// rename) under an exclusive lock file shared by every process. Events and
// dead letters are append-only JSON lines.

use async_trait::async_trait;
use fd_lock::RwLock;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::debug;

use super::{ChangeNotifier, DeadLetterSink, Gateway, GatewayError, StateStore};
use crate::lifecycle::{DeadLetterEnvelope, EntityStateRecord, StateChangeEvent, StateName};

type RecordMap = BTreeMap<String, EntityStateRecord>;

fn io_error(gateway: Gateway, path: &Path, error: std::io::Error) -> GatewayError {
    GatewayError::unavailable(gateway, format!("{}: {}", path.display(), error))
}

fn corrupt(gateway: Gateway, path: &Path, error: serde_json::Error) -> GatewayError {
    GatewayError::rejected(gateway, format!("{} is not valid JSON: {}", path.display(), error))
}

async fn ensure_parent(gateway: Gateway, path: &Path) -> Result<(), GatewayError> {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => fs::create_dir_all(parent)
            .await
            .map_err(|e| io_error(gateway, parent, e)),
        _ => Ok(()),
    }
}

fn parse_records(path: &Path, content: &str) -> Result<RecordMap, GatewayError> {
    if content.trim().is_empty() {
        return Ok(RecordMap::new());
    }
    serde_json::from_str(content).map_err(|e| corrupt(Gateway::StateStore, path, e))
}

/// Read-modify-write of the record file while holding `<file>.lock`
fn update_locked<F>(path: &Path, apply: F) -> Result<(), GatewayError>
where
    F: FnOnce(&mut RecordMap),
{
    let lock_path = path.with_extension("json.lock");
    let lock_file = std::fs::OpenOptions::new()
        .create(true)
        .truncate(false)
        .write(true)
        .open(&lock_path)
        .map_err(|e| io_error(Gateway::StateStore, &lock_path, e))?;
    let mut lock = RwLock::new(lock_file);
    let _guard = lock
        .write()
        .map_err(|e| io_error(Gateway::StateStore, &lock_path, e))?;

    let mut records = match std::fs::read_to_string(path) {
        Ok(content) => parse_records(path, &content)?,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => RecordMap::new(),
        Err(e) => return Err(io_error(Gateway::StateStore, path, e)),
    };
    apply(&mut records);

    let content = serde_json::to_vec_pretty(&records)
        .map_err(|e| corrupt(Gateway::StateStore, path, e))?;
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let mut temp = tempfile::NamedTempFile::new_in(dir)
        .map_err(|e| io_error(Gateway::StateStore, dir, e))?;
    temp.write_all(&content)
        .map_err(|e| io_error(Gateway::StateStore, temp.path(), e))?;
    temp.persist(path)
        .map_err(|e| io_error(Gateway::StateStore, path, e.error))?;
    Ok(())
}

/// Rider records kept in a single JSON object keyed by entity id
#[derive(Debug)]
pub struct JsonFileStateStore {
    path: PathBuf,
    // Keeps this process's tasks off the blocking pool while one holds the file lock
    write_lock: Mutex<()>,
}

impl JsonFileStateStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn load(&self) -> Result<RecordMap, GatewayError> {
        match fs::read_to_string(&self.path).await {
            Ok(content) => parse_records(&self.path, &content),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(RecordMap::new()),
            Err(e) => Err(io_error(Gateway::StateStore, &self.path, e)),
        }
    }

    async fn update<F>(&self, apply: F) -> Result<(), GatewayError>
    where
        F: FnOnce(&mut RecordMap) + Send + 'static,
    {
        let _guard = self.write_lock.lock().await;
        ensure_parent(Gateway::StateStore, &self.path).await?;

        let path = self.path.clone();
        tokio::task::spawn_blocking(move || update_locked(&path, apply))
            .await
            .map_err(|e| GatewayError::unavailable(Gateway::StateStore, e.to_string()))?
    }

    /// All stored records, ordered by entity id
    pub async fn list(&self) -> Result<Vec<EntityStateRecord>, GatewayError> {
        Ok(self.load().await?.into_values().collect())
    }

    /// Insert or replace a whole record
    pub async fn put(&self, record: EntityStateRecord) -> Result<(), GatewayError> {
        self.update(move |records| {
            records.insert(record.entity_id.clone(), record);
        })
        .await
    }
}

#[async_trait]
impl StateStore for JsonFileStateStore {
    async fn get(&self, entity_id: &str) -> Result<Option<EntityStateRecord>, GatewayError> {
        let mut records = self.load().await?;
        Ok(records.remove(entity_id))
    }

    async fn conditional_update(
        &self,
        entity_id: &str,
        new_state: StateName,
    ) -> Result<(), GatewayError> {
        let id = entity_id.to_string();
        self.update(move |records| {
            let record = records
                .entry(id.clone())
                .or_insert_with(|| EntityStateRecord::new(&id, new_state));
            record.current_state = new_state;
            record.timestamp = chrono::Utc::now().timestamp_millis();
        })
        .await?;

        debug!(path = %self.path.display(), entity_id, state = %new_state, "Wrote rider record");
        Ok(())
    }
}

async fn append_json_line<T: Serialize>(
    gateway: Gateway,
    path: &Path,
    value: &T,
) -> Result<(), GatewayError> {
    ensure_parent(gateway, path).await?;

    let mut line = serde_json::to_string(value)
        .map_err(|e| GatewayError::rejected(gateway, e.to_string()))?;
    line.push('\n');

    let mut file = fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .await
        .map_err(|e| io_error(gateway, path, e))?;
    file.write_all(line.as_bytes())
        .await
        .map_err(|e| io_error(gateway, path, e))?;
    file.flush().await.map_err(|e| io_error(gateway, path, e))
}

/// Read every line of a JSONL file. A missing file reads as empty.
pub async fn read_json_lines<T: DeserializeOwned>(path: &Path) -> anyhow::Result<Vec<T>> {
    let content = match fs::read_to_string(path).await {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e.into()),
    };

    content
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(index, line)| {
            serde_json::from_str(line).map_err(|e| {
                anyhow::anyhow!("{}:{}: {}", path.display(), index + 1, e)
            })
        })
        .collect()
}

/// Appends each change event as one JSON line
#[derive(Debug, Clone)]
pub struct JsonLinesNotifier {
    path: PathBuf,
}

impl JsonLinesNotifier {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub async fn read_all(&self) -> anyhow::Result<Vec<StateChangeEvent>> {
        read_json_lines(&self.path).await
    }
}

#[async_trait]
impl ChangeNotifier for JsonLinesNotifier {
    async fn publish(&self, event: &StateChangeEvent) -> Result<(), GatewayError> {
        append_json_line(Gateway::Notifier, &self.path, event).await
    }
}

/// Appends each dead-letter envelope as one JSON line
#[derive(Debug, Clone)]
pub struct JsonLinesDeadLetterSink {
    path: PathBuf,
}

impl JsonLinesDeadLetterSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub async fn read_all(&self) -> anyhow::Result<Vec<DeadLetterEnvelope>> {
        read_json_lines(&self.path).await
    }
}

#[async_trait]
impl DeadLetterSink for JsonLinesDeadLetterSink {
    async fn send(&self, envelope: &DeadLetterEnvelope) -> Result<(), GatewayError> {
        append_json_line(Gateway::DeadLetter, &self.path, envelope).await
    }
}
