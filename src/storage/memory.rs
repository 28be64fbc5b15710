//! In-process stores.
//!
//! Both stores can be told to fail a given operation, to delay every
//! call, and they count how often each operation was attempted. This
//! makes them suitable for exercising failure paths of the controller.

use std::collections::{BTreeMap, HashMap};
use std::hash::Hash;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::{newest_first, BlobStore, MetadataStore};
use crate::id::{BlobKey, FileId, OwnerId};
use crate::record::{FileRecord, NewFileRecord};
use crate::{lock, Result, SyncError};

#[derive(Eq, PartialEq, Hash, Clone, Copy, Debug)]
pub enum BlobOp {
    Put,
    Upsert,
    Get,
    Remove,
    List,
}

#[derive(Eq, PartialEq, Hash, Clone, Copy, Debug)]
pub enum MetadataOp {
    Insert,
    List,
    Find,
    Delete,
}

struct Probe<Op> {
    failing: HashMap<Op, String>,
    /// Faults for a single call, keyed by the 1-based call number.
    failing_once: HashMap<(Op, usize), String>,
    calls: HashMap<Op, usize>,
    latency: Option<Duration>,
    /// Per-operation latency, overriding `latency`.
    delays: HashMap<Op, Duration>,
}

impl<Op> Default for Probe<Op> {
    fn default() -> Self {
        Self {
            failing: HashMap::new(),
            failing_once: HashMap::new(),
            calls: HashMap::new(),
            latency: None,
            delays: HashMap::new(),
        }
    }
}

/// Count the call, wait for the configured latency, then apply a fault.
async fn enter<Op: Eq + Hash + Copy>(
    probe: &Mutex<Probe<Op>>,
    op: Op,
) -> std::result::Result<(), String> {
    let (call, latency) = {
        let mut probe = lock(probe);
        let latency = probe.delays.get(&op).copied().or(probe.latency);
        let calls = probe.calls.entry(op).or_insert(0);
        *calls += 1;
        (*calls, latency)
    };
    if let Some(latency) = latency {
        tokio::time::sleep(latency).await;
    }
    let mut probe = lock(probe);
    if let Some(message) = probe.failing_once.remove(&(op, call)) {
        return Err(message);
    }
    match probe.failing.get(&op) {
        Some(message) => Err(message.clone()),
        None => Ok(()),
    }
}

#[derive(Default)]
pub struct MemoryBlobStore {
    objects: Mutex<BTreeMap<BlobKey, Vec<u8>>>,
    probe: Mutex<Probe<BlobOp>>,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent `op` fail with `message`.
    pub fn fail(&self, op: BlobOp, message: impl Into<String>) {
        lock(&self.probe).failing.insert(op, message.into());
    }

    /// Make only the next-but-`skip` call of `op` fail with `message`.
    pub fn fail_once(&self, op: BlobOp, skip: usize, message: impl Into<String>) {
        let mut probe = lock(&self.probe);
        let call = probe.calls.get(&op).copied().unwrap_or(0) + skip + 1;
        probe.failing_once.insert((op, call), message.into());
    }

    pub fn heal(&self, op: BlobOp) {
        lock(&self.probe).failing.remove(&op);
    }

    pub fn set_latency(&self, latency: Option<Duration>) {
        lock(&self.probe).latency = latency;
    }

    /// Delay every call of `op` alone.
    pub fn slow(&self, op: BlobOp, delay: Duration) {
        lock(&self.probe).delays.insert(op, delay);
    }

    pub fn calls(&self, op: BlobOp) -> usize {
        lock(&self.probe).calls.get(&op).copied().unwrap_or(0)
    }

    pub fn contains(&self, key: &BlobKey) -> bool {
        lock(&self.objects).contains_key(key)
    }

    pub fn len(&self) -> usize {
        lock(&self.objects).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    async fn enter(&self, op: BlobOp) -> Result<()> {
        enter(&self.probe, op).await.map_err(SyncError::BlobStore)
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn put(&self, key: &BlobKey, bytes: &[u8]) -> Result<()> {
        self.enter(BlobOp::Put).await?;
        let mut objects = lock(&self.objects);
        if objects.contains_key(key) {
            return Err(SyncError::BlobStore(format!(
                "The resource already exists: {}",
                key
            )));
        }
        objects.insert(key.clone(), bytes.to_vec());
        Ok(())
    }

    async fn upsert(&self, key: &BlobKey, bytes: &[u8]) -> Result<()> {
        self.enter(BlobOp::Upsert).await?;
        lock(&self.objects).insert(key.clone(), bytes.to_vec());
        Ok(())
    }

    async fn get(&self, key: &BlobKey) -> Result<Vec<u8>> {
        self.enter(BlobOp::Get).await?;
        lock(&self.objects)
            .get(key)
            .cloned()
            .ok_or_else(|| SyncError::BlobStore(format!("Object not found: {}", key)))
    }

    async fn remove(&self, key: &BlobKey) -> Result<()> {
        self.enter(BlobOp::Remove).await?;
        lock(&self.objects).remove(key);
        Ok(())
    }

    async fn list(&self, prefix: &str) -> Result<Vec<BlobKey>> {
        self.enter(BlobOp::List).await?;
        Ok(lock(&self.objects)
            .keys()
            .filter(|k| k.as_str().starts_with(prefix))
            .cloned()
            .collect())
    }
}

#[derive(Default)]
pub struct MemoryMetadataStore {
    /// Kept in arrival order.
    records: Mutex<Vec<FileRecord>>,
    fixed_time: Mutex<Option<DateTime<Utc>>>,
    probe: Mutex<Probe<MetadataOp>>,
}

impl MemoryMetadataStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail(&self, op: MetadataOp, message: impl Into<String>) {
        lock(&self.probe).failing.insert(op, message.into());
    }

    /// Make only the next-but-`skip` call of `op` fail with `message`.
    pub fn fail_once(&self, op: MetadataOp, skip: usize, message: impl Into<String>) {
        let mut probe = lock(&self.probe);
        let call = probe.calls.get(&op).copied().unwrap_or(0) + skip + 1;
        probe.failing_once.insert((op, call), message.into());
    }

    pub fn heal(&self, op: MetadataOp) {
        lock(&self.probe).failing.remove(&op);
    }

    pub fn set_latency(&self, latency: Option<Duration>) {
        lock(&self.probe).latency = latency;
    }

    /// Delay every call of `op` alone.
    pub fn slow(&self, op: MetadataOp, delay: Duration) {
        lock(&self.probe).delays.insert(op, delay);
    }

    pub fn calls(&self, op: MetadataOp) -> usize {
        lock(&self.probe).calls.get(&op).copied().unwrap_or(0)
    }

    /// Stamp new records with `time` instead of the current time.
    pub fn freeze_time(&self, time: Option<DateTime<Utc>>) {
        *lock(&self.fixed_time) = time;
    }

    pub fn len(&self) -> usize {
        lock(&self.records).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    async fn enter(&self, op: MetadataOp) -> Result<()> {
        enter(&self.probe, op).await.map_err(SyncError::MetadataStore)
    }
}

#[async_trait]
impl MetadataStore for MemoryMetadataStore {
    async fn insert(&self, record: NewFileRecord) -> Result<FileId> {
        self.enter(MetadataOp::Insert).await?;
        let id = FileId::new();
        let created_at = lock(&self.fixed_time).unwrap_or_else(Utc::now);
        lock(&self.records).push(record.into_record(id, created_at));
        Ok(id)
    }

    async fn list_by_owner(&self, owner: &OwnerId) -> Result<Vec<FileRecord>> {
        self.enter(MetadataOp::List).await?;
        let mut records: Vec<FileRecord> = lock(&self.records)
            .iter()
            .filter(|r| &r.owner_id == owner)
            .cloned()
            .collect();
        newest_first(&mut records);
        Ok(records)
    }

    async fn find_by_id(&self, id: &FileId) -> Result<Option<FileRecord>> {
        self.enter(MetadataOp::Find).await?;
        Ok(lock(&self.records).iter().find(|r| &r.id == id).cloned())
    }

    async fn delete_by_id(&self, id: &FileId) -> Result<()> {
        self.enter(MetadataOp::Delete).await?;
        let mut records = lock(&self.records);
        let before = records.len();
        records.retain(|r| &r.id != id);
        if records.len() == before {
            return Err(SyncError::NotFound(format!("File record {}", id)));
        }
        Ok(())
    }
}
