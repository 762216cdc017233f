use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::SystemTime;

use anyhow::anyhow;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::StoreError;

/// Persisted timer for one boss. An explicit scheduled respawn wins over
/// `defeated_at + respawn duration`.
#[derive(Debug, Clone, Copy, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct TimerRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub defeated_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scheduled_respawn_at: Option<DateTime<Utc>>,
}

impl TimerRecord {
    /// `None` when nothing is recorded or the sum leaves the representable
    /// range.
    pub fn respawn_instant(&self, respawn: chrono::Duration) -> Option<DateTime<Utc>> {
        self.scheduled_respawn_at.or_else(|| {
            self.defeated_at
                .and_then(|defeated| defeated.checked_add_signed(respawn))
        })
    }

    pub fn merge(&mut self, update: TimerUpdate) {
        if let Some(defeated_at) = update.defeated_at {
            self.defeated_at = Some(defeated_at);
        }
        if let Some(scheduled) = update.scheduled_respawn_at {
            self.scheduled_respawn_at = Some(scheduled);
        }
    }
}

/// Partial write merged into whatever record already exists.
#[derive(Debug, Clone, Copy, Default, Eq, PartialEq)]
pub struct TimerUpdate {
    pub defeated_at: Option<DateTime<Utc>>,
    pub scheduled_respawn_at: Option<DateTime<Utc>>,
}

impl TimerUpdate {
    pub fn defeated(at: DateTime<Utc>) -> Self {
        Self {
            defeated_at: Some(at),
            scheduled_respawn_at: None,
        }
    }

    pub fn scheduled(at: DateTime<Utc>) -> Self {
        Self {
            defeated_at: None,
            scheduled_respawn_at: Some(at),
        }
    }
}

pub trait TimerStore: Send {
    fn get(&self, boss_id: &str) -> Option<TimerRecord>;
    fn all(&self) -> Vec<(String, TimerRecord)>;
    fn set(&mut self, boss_id: &str, update: TimerUpdate) -> Result<(), StoreError>;
    /// Bumped on every observed change; readers re-derive when it moves.
    fn revision(&self) -> u64;
    /// Picks up changes made outside this process.
    fn refresh(&mut self) -> Result<bool, StoreError> {
        Ok(false)
    }
}

pub type SharedStore = Arc<Mutex<dyn TimerStore>>;

pub fn lock_store(store: &SharedStore) -> anyhow::Result<MutexGuard<'_, dyn TimerStore + 'static>> {
    store
        .lock()
        .map_err(|_| anyhow!("failed to lock timer store"))
}

/// Non-persistent store for exercising views and actions.
#[cfg(test)]
#[derive(Debug, Default)]
pub struct MemoryStore {
    records: BTreeMap<String, TimerRecord>,
    revision: u64,
}

#[cfg(test)]
impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[cfg(test)]
impl TimerStore for MemoryStore {
    fn get(&self, boss_id: &str) -> Option<TimerRecord> {
        self.records.get(boss_id).copied()
    }

    fn all(&self) -> Vec<(String, TimerRecord)> {
        self.records
            .iter()
            .map(|(id, record)| (id.clone(), *record))
            .collect()
    }

    fn set(&mut self, boss_id: &str, update: TimerUpdate) -> Result<(), StoreError> {
        self.records
            .entry(boss_id.to_string())
            .or_default()
            .merge(update);
        self.revision += 1;
        Ok(())
    }

    fn revision(&self) -> u64 {
        self.revision
    }
}

/// Timer records kept in a versioned JSON document. The file is re-read
/// whenever its modification time moves.
#[derive(Debug)]
pub struct JsonFileStore {
    path: PathBuf,
    records: BTreeMap<String, TimerRecord>,
    revision: u64,
    last_modified: Option<SystemTime>,
}

#[derive(Debug, Serialize, Deserialize)]
struct TimerStoreFile {
    version: u32,
    #[serde(default)]
    timers: BTreeMap<String, TimerRecord>,
}

impl JsonFileStore {
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        let mut store = Self {
            path: path.to_path_buf(),
            records: BTreeMap::new(),
            revision: 0,
            last_modified: None,
        };
        store.reload()?;
        Ok(store)
    }

    fn modified(&self) -> Option<SystemTime> {
        fs::metadata(&self.path)
            .and_then(|meta| meta.modified())
            .ok()
    }

    fn reload(&mut self) -> Result<(), StoreError> {
        if !self.path.exists() {
            self.records.clear();
            self.last_modified = None;
            return Ok(());
        }
        let content = fs::read_to_string(&self.path).map_err(|source| StoreError::Read {
            path: self.path.clone(),
            source,
        })?;
        self.records = parse_timer_store_text(&self.path, &content)?;
        self.last_modified = self.modified();
        Ok(())
    }

    /// Re-reads the file unconditionally; bumps the revision if it differed.
    fn adopt_disk_state(&mut self) -> Result<bool, StoreError> {
        let before = self.records.clone();
        self.reload()?;
        if before == self.records {
            return Ok(false);
        }
        self.revision += 1;
        tracing::debug!(path = %self.path.display(), records = self.records.len(), "timer store reloaded");
        Ok(true)
    }

    fn write(&self, records: &BTreeMap<String, TimerRecord>) -> Result<(), StoreError> {
        let payload = TimerStoreFile {
            version: 1,
            timers: records.clone(),
        };
        let text = serde_json::to_string_pretty(&payload)?;
        fs::write(&self.path, format!("{text}\n")).map_err(|source| StoreError::Write {
            path: self.path.clone(),
            source,
        })
    }
}

impl TimerStore for JsonFileStore {
    fn get(&self, boss_id: &str) -> Option<TimerRecord> {
        self.records.get(boss_id).copied()
    }

    fn all(&self) -> Vec<(String, TimerRecord)> {
        self.records
            .iter()
            .map(|(id, record)| (id.clone(), *record))
            .collect()
    }

    fn set(&mut self, boss_id: &str, update: TimerUpdate) -> Result<(), StoreError> {
        // Merge onto what is on disk now; another process may have written
        // since the last refresh.
        self.adopt_disk_state()?;
        let mut next = self.records.clone();
        next.entry(boss_id.to_string()).or_default().merge(update);
        // Only commit in memory once the write has landed.
        self.write(&next)?;
        self.records = next;
        self.last_modified = self.modified();
        self.revision += 1;
        Ok(())
    }

    fn revision(&self) -> u64 {
        self.revision
    }

    fn refresh(&mut self) -> Result<bool, StoreError> {
        if self.modified() == self.last_modified {
            return Ok(false);
        }
        self.adopt_disk_state()
    }
}


fn parse_timer_store_text(
    path: &Path,
    content: &str,
) -> Result<BTreeMap<String, TimerRecord>, StoreError> {
    if content.trim().is_empty() {
        return Ok(BTreeMap::new());
    }
    let raw = serde_json::from_str::<TimerStoreFile>(content).map_err(|err| StoreError::Parse {
        path: path.to_path_buf(),
        line: err.line(),
        column: err.column(),
        message: err.to_string(),
    })?;
    if raw.version != 1 {
        return Err(StoreError::Version(raw.version));
    }
    Ok(raw.timers)
}
