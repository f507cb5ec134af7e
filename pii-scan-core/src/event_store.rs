//! Event Store (C6): append-only persistence of `ScanEventRecord`s.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use tokio::sync::Mutex;

use crate::types::{EventType, ScanEventRecord, ScanId, SpaceKey};

#[derive(Clone, Debug)]
pub struct SpaceCounters {
    pub space_key: SpaceKey,
    pub pages_done: u64,
    pub attachments_done: u64,
    pub last_event_ts: Option<chrono::DateTime<chrono::Utc>>,
}

#[async_trait]
pub trait EventStore: Send + Sync {
    /// Assigns `eventSeq = max_seq(scanId) + 1` and persists the record.
    /// Returns the record with its assigned `event_seq`.
    async fn append(&self, record: ScanEventRecord) -> ScanEventRecord;
    async fn max_seq(&self, scan_id: &ScanId) -> u64;
    async fn list_by_scan_ordered(&self, scan_id: &ScanId) -> Vec<ScanEventRecord>;
    async fn list_by_scan_and_space(&self, scan_id: &ScanId, space_key: &SpaceKey) -> Vec<ScanEventRecord>;
    async fn aggregate_space_counters(&self, scan_id: &ScanId) -> Vec<SpaceCounters>;
    async fn delete_all(&self);
}

/// In-memory, append-only event log keyed by `(scanId, eventSeq)`.
pub struct InMemoryEventStore {
    by_scan: Mutex<HashMap<String, Vec<ScanEventRecord>>>,
}

impl InMemoryEventStore {
    pub fn new() -> Self {
        Self { by_scan: Mutex::new(HashMap::new()) }
    }
}

impl Default for InMemoryEventStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EventStore for InMemoryEventStore {
    async fn append(&self, mut record: ScanEventRecord) -> ScanEventRecord {
        let mut by_scan = self.by_scan.lock().await;
        let entry = by_scan.entry(record.scan_id.as_str().to_string()).or_default();
        record.event_seq = entry.last().map(|r| r.event_seq + 1).unwrap_or(1);
        entry.push(record.clone());
        record
    }

    async fn max_seq(&self, scan_id: &ScanId) -> u64 {
        self.by_scan
            .lock()
            .await
            .get(scan_id.as_str())
            .and_then(|v| v.last())
            .map(|r| r.event_seq)
            .unwrap_or(0)
    }

    async fn list_by_scan_ordered(&self, scan_id: &ScanId) -> Vec<ScanEventRecord> {
        self.by_scan.lock().await.get(scan_id.as_str()).cloned().unwrap_or_default()
    }

    async fn list_by_scan_and_space(&self, scan_id: &ScanId, space_key: &SpaceKey) -> Vec<ScanEventRecord> {
        self.list_by_scan_ordered(scan_id)
            .await
            .into_iter()
            .filter(|r| r.space_key.as_ref() == Some(space_key))
            .collect()
    }

    async fn aggregate_space_counters(&self, scan_id: &ScanId) -> Vec<SpaceCounters> {
        let mut by_space: HashMap<String, SpaceCounters> = HashMap::new();
        for record in self.list_by_scan_ordered(scan_id).await {
            let Some(space_key) = record.space_key.clone() else { continue };
            let entry = by_space.entry(space_key.as_str().to_string()).or_insert_with(|| SpaceCounters {
                space_key: space_key.clone(),
                pages_done: 0,
                attachments_done: 0,
                last_event_ts: None,
            });
            match record.event_type {
                EventType::PageComplete => entry.pages_done += 1,
                EventType::AttachmentItem => entry.attachments_done += 1,
                _ => {}
            }
            entry.last_event_ts = Some(record.ts);
        }
        by_space.into_values().collect()
    }

    async fn delete_all(&self) {
        self.by_scan.lock().await.clear();
    }
}

/// Decorates any `EventStore` with a SHA-256 hash chain over each
/// appended record, for tamper-evidence. Additive: does not change
/// `eventSeq` assignment.
pub struct IntegrityChainedEventStore<S: EventStore> {
    inner: S,
    prev_hash: Mutex<String>,
}

impl<S: EventStore> IntegrityChainedEventStore<S> {
    pub fn new(inner: S) -> Self {
        let genesis = format!("{:x}", Sha256::digest(b"pii-scan-event-genesis"));
        Self { inner, prev_hash: Mutex::new(genesis) }
    }

    /// Hash chain value after the most recently appended record.
    pub async fn chain_head(&self) -> String {
        self.prev_hash.lock().await.clone()
    }
}

#[async_trait]
impl<S: EventStore> EventStore for IntegrityChainedEventStore<S> {
    async fn append(&self, record: ScanEventRecord) -> ScanEventRecord {
        let appended = self.inner.append(record).await;
        let mut prev_hash = self.prev_hash.lock().await;
        let to_hash = serde_json::to_string(&appended).unwrap_or_default();
        *prev_hash = format!("{:x}", Sha256::digest(format!("{}{}", *prev_hash, to_hash).as_bytes()));
        appended
    }

    async fn max_seq(&self, scan_id: &ScanId) -> u64 {
        self.inner.max_seq(scan_id).await
    }

    async fn list_by_scan_ordered(&self, scan_id: &ScanId) -> Vec<ScanEventRecord> {
        self.inner.list_by_scan_ordered(scan_id).await
    }

    async fn list_by_scan_and_space(&self, scan_id: &ScanId, space_key: &SpaceKey) -> Vec<ScanEventRecord> {
        self.inner.list_by_scan_and_space(scan_id, space_key).await
    }

    async fn aggregate_space_counters(&self, scan_id: &ScanId) -> Vec<SpaceCounters> {
        self.inner.aggregate_space_counters(scan_id).await
    }

    async fn delete_all(&self) {
        self.inner.delete_all().await
    }
}

pub type SharedEventStore = Arc<dyn EventStore>;
