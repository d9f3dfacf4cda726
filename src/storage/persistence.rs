//! Write-Ahead Logging (WAL) and snapshot persistence for the record store

use crate::core::{Record, RecordId, StoreError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use std::str::FromStr;

const WAL_FILE: &str = "rowgate.wal";
const SNAPSHOT_FILE: &str = "rowgate.snapshot";

fn persistence_error(context: &str, err: impl std::fmt::Display) -> StoreError {
    StoreError::Persistence(format!("{}: {}", context, err))
}

// ============================================================================
// WAL Entry Types
// ============================================================================

/// Write-Ahead Log entry types
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum WalEntry {
    /// Records inserted as initial data, outside any transaction.
    Seed { records: Vec<Record> },
    /// Records written by a committed transaction, with their new versions.
    Commit { txn_id: u64, records: Vec<Record> },
}

// ============================================================================
// Store Snapshot
// ============================================================================

#[derive(Debug, Serialize, Deserialize)]
pub struct StoreSnapshot {
    pub version: u32,
    pub records: Vec<Record>,
    pub metadata: SnapshotMetadata,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SnapshotMetadata {
    pub created_at: DateTime<Utc>,
    pub record_count: usize,
}

impl StoreSnapshot {
    pub fn new(records: &HashMap<RecordId, Record>) -> Self {
        let mut records: Vec<Record> = records.values().cloned().collect();
        records.sort_by_key(|r| r.id);
        let record_count = records.len();

        Self {
            version: 1,
            records,
            metadata: SnapshotMetadata {
                created_at: Utc::now(),
                record_count,
            },
        }
    }
}

// ============================================================================
// Durability Configuration
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DurabilityMode {
    /// fsync after every WAL append
    #[default]
    Sync,
    /// flush to the OS, let it decide when to hit the disk
    Async,
    /// keep nothing on disk
    None,
}

impl FromStr for DurabilityMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "sync" => Ok(DurabilityMode::Sync),
            "async" => Ok(DurabilityMode::Async),
            "none" => Ok(DurabilityMode::None),
            other => Err(format!("unknown durability mode '{}'", other)),
        }
    }
}

// ============================================================================
// WAL Manager
// ============================================================================

pub struct WalManager {
    wal_path: PathBuf,
    wal_file: Option<BufWriter<File>>,
    durability_mode: DurabilityMode,
    entries_since_checkpoint: usize,
    checkpoint_threshold: usize,
}

impl WalManager {
    pub fn new<P: AsRef<Path>>(wal_path: P, durability_mode: DurabilityMode) -> Result<Self, StoreError> {
        let wal_path = wal_path.as_ref().to_path_buf();
        if let Some(parent) = wal_path.parent() {
            fs::create_dir_all(parent).map_err(|e| persistence_error("Failed to create WAL directory", e))?;
        }

        let wal_file = if durability_mode != DurabilityMode::None {
            let file = OpenOptions::new().create(true).append(true).open(&wal_path)
                .map_err(|e| persistence_error("Failed to open WAL file", e))?;
            Some(BufWriter::new(file))
        } else {
            None
        };

        Ok(Self {
            wal_path,
            wal_file,
            durability_mode,
            entries_since_checkpoint: 0,
            checkpoint_threshold: 1000,
        })
    }

    pub fn append(&mut self, entry: &WalEntry) -> Result<(), StoreError> {
        if self.durability_mode == DurabilityMode::None { return Ok(()); }
        let file = self.wal_file.as_mut()
            .ok_or_else(|| StoreError::Persistence("WAL file not initialized".to_string()))?;
        let serialized = rmp_serde::to_vec(entry).map_err(|e| persistence_error("Failed to serialize WAL entry", e))?;
        let len = serialized.len() as u32;
        file.write_all(&len.to_le_bytes())?;
        file.write_all(&serialized)?;
        file.flush()?;
        if self.durability_mode == DurabilityMode::Sync {
            file.get_mut().sync_all().map_err(|e| persistence_error("Failed to sync WAL", e))?;
        }
        self.entries_since_checkpoint += 1;
        Ok(())
    }

    pub fn read_all(&self) -> Result<Vec<WalEntry>, StoreError> {
        if !self.wal_path.exists() { return Ok(Vec::new()); }
        let file = File::open(&self.wal_path).map_err(|e| persistence_error("Failed to open WAL for reading", e))?;
        let mut reader = BufReader::new(file);
        let mut entries = Vec::new();
        loop {
            let mut len_bytes = [0u8; 4];
            match reader.read_exact(&mut len_bytes) {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => break,
                Err(e) => return Err(persistence_error("Failed to read WAL entry length", e)),
            }
            let len = u32::from_le_bytes(len_bytes) as usize;
            let mut data = vec![0u8; len];
            match reader.read_exact(&mut data) {
                Ok(()) => {}
                // A torn tail means the last commit never finished; it was not acknowledged.
                Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => break,
                Err(e) => return Err(persistence_error("Failed to read WAL entry data", e)),
            }
            let entry: WalEntry = rmp_serde::from_slice(&data).map_err(|e| persistence_error("Failed to deserialize WAL entry", e))?;
            entries.push(entry);
        }
        Ok(entries)
    }

    pub fn clear(&mut self) -> Result<(), StoreError> {
        if self.durability_mode == DurabilityMode::None { return Ok(()); }
        self.wal_file = None;
        let file = OpenOptions::new().write(true).truncate(true).open(&self.wal_path)
            .map_err(|e| persistence_error("Failed to truncate WAL", e))?;
        drop(file);
        let file = OpenOptions::new().append(true).open(&self.wal_path)
            .map_err(|e| persistence_error("Failed to reopen WAL", e))?;
        self.wal_file = Some(BufWriter::new(file));
        self.entries_since_checkpoint = 0;
        Ok(())
    }

    pub fn needs_checkpoint(&self) -> bool {
        self.entries_since_checkpoint >= self.checkpoint_threshold
    }

    pub fn entries_since_checkpoint(&self) -> usize {
        self.entries_since_checkpoint
    }

    pub fn set_checkpoint_threshold(&mut self, threshold: usize) {
        self.checkpoint_threshold = threshold;
    }
}

// ============================================================================
// Snapshot Manager
// ============================================================================

pub struct SnapshotManager {
    snapshot_path: PathBuf,
}

impl SnapshotManager {
    pub fn new<P: AsRef<Path>>(snapshot_path: P) -> Self {
        Self {
            snapshot_path: snapshot_path.as_ref().to_path_buf(),
        }
    }

    /// Write to a temp file, fsync, then rename over the previous snapshot.
    pub fn save(&self, snapshot: &StoreSnapshot) -> Result<(), StoreError> {
        if let Some(parent) = self.snapshot_path.parent() {
            fs::create_dir_all(parent).map_err(|e| persistence_error("Failed to create snapshot directory", e))?;
        }
        let temp_path = self.snapshot_path.with_extension("tmp");
        let temp_file = File::create(&temp_path).map_err(|e| persistence_error("Failed to create temp file", e))?;
        let mut writer = BufWriter::new(temp_file);
        let serialized = rmp_serde::to_vec(snapshot).map_err(|e| persistence_error("Failed to serialize snapshot", e))?;
        writer.write_all(&serialized).map_err(|e| persistence_error("Failed to write snapshot", e))?;
        writer.flush().map_err(|e| persistence_error("Failed to flush snapshot", e))?;
        writer.get_mut().sync_all().map_err(|e| persistence_error("Failed to sync snapshot", e))?;
        fs::rename(&temp_path, &self.snapshot_path).map_err(|e| persistence_error("Failed to rename snapshot", e))?;
        Ok(())
    }

    pub fn load(&self) -> Result<Option<StoreSnapshot>, StoreError> {
        if !self.snapshot_path.exists() { return Ok(None); }
        let mut file = File::open(&self.snapshot_path).map_err(|e| persistence_error("Failed to open snapshot", e))?;
        let mut data = Vec::new();
        file.read_to_end(&mut data).map_err(|e| persistence_error("Failed to read snapshot", e))?;
        let snapshot: StoreSnapshot = rmp_serde::from_slice(&data).map_err(|e| persistence_error("Failed to deserialize snapshot", e))?;
        Ok(Some(snapshot))
    }

    pub fn exists(&self) -> bool {
        self.snapshot_path.exists()
    }
}

// ============================================================================
// Persistence Manager
// ============================================================================

pub struct PersistenceManager {
    wal: WalManager,
    snapshot: SnapshotManager,
    durability_mode: DurabilityMode,
}

impl PersistenceManager {
    pub fn new<P: AsRef<Path>>(data_dir: P, durability_mode: DurabilityMode) -> Result<Self, StoreError> {
        let data_dir = data_dir.as_ref();
        let wal = WalManager::new(data_dir.join(WAL_FILE), durability_mode)?;
        let snapshot = SnapshotManager::new(data_dir.join(SNAPSHOT_FILE));
        Ok(Self { wal, snapshot, durability_mode })
    }

    pub fn log(&mut self, entry: &WalEntry) -> Result<(), StoreError> {
        self.wal.append(entry)
    }

    pub fn checkpoint(&mut self, records: &HashMap<RecordId, Record>) -> Result<(), StoreError> {
        if self.durability_mode == DurabilityMode::None { return Ok(()); }
        self.snapshot.save(&StoreSnapshot::new(records))?;
        self.wal.clear()?;
        Ok(())
    }

    pub fn needs_checkpoint(&self) -> bool {
        self.wal.needs_checkpoint()
    }

    /// Rebuild committed state from the snapshot plus the WAL tail.
    pub fn recover(&self) -> Result<HashMap<RecordId, Record>, StoreError> {
        let mut records: HashMap<RecordId, Record> = match self.snapshot.load()? {
            Some(snapshot) => snapshot.records.into_iter().map(|r| (r.id, r)).collect(),
            None => HashMap::new(),
        };

        for entry in self.wal.read_all()? {
            match entry {
                WalEntry::Seed { records: seeded } | WalEntry::Commit { records: seeded, .. } => {
                    for record in seeded {
                        records.insert(record.id, record);
                    }
                }
            }
        }
        Ok(records)
    }

    pub fn wal_mut(&mut self) -> &mut WalManager { &mut self.wal }
    pub fn snapshot(&self) -> &SnapshotManager { &self.snapshot }
    pub fn durability_mode(&self) -> DurabilityMode { self.durability_mode }
}
