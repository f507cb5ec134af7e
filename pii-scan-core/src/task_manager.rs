//! Scan Task Manager (C7): registry of in-flight scans, each fanning its
//! event stream out to any number of subscribers without being slowed down
//! by them.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, Mutex};
use tokio::time::Instant;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::{Stream, StreamExt};

use crate::error::ScanNotFound;
use crate::types::{ScanEventRecord, ScanId};

const DEFAULT_REPLAY_BUFFER: usize = 1000;
const DEFAULT_TTL: Duration = Duration::from_secs(3600);
const BROADCAST_CAPACITY: usize = 256;

struct ScanTask {
    replay: VecDeque<ScanEventRecord>,
    replay_cap: usize,
    tx: broadcast::Sender<ScanEventRecord>,
    producer_handle: Option<tokio::task::JoinHandle<()>>,
    last_event_at: Instant,
}

impl ScanTask {
    fn new(replay_cap: usize) -> Self {
        let (tx, _rx) = broadcast::channel(BROADCAST_CAPACITY);
        Self { replay: VecDeque::with_capacity(replay_cap), replay_cap, tx, producer_handle: None, last_event_at: Instant::now() }
    }

    fn push(&mut self, event: ScanEventRecord) {
        if self.replay.len() == self.replay_cap {
            self.replay.pop_front();
        }
        self.replay.push_back(event.clone());
        self.last_event_at = Instant::now();
        // A broadcast send fails only when there are no receivers; the scan
        // is never blocked by slow or absent subscribers, so the error is
        // ignored.
        let _ = self.tx.send(event);
    }
}

/// Registry `scanId -> ScanTask`, guarded by a mutex for insertion/removal.
/// Per-task delivery uses `broadcast`'s own synchronization.
pub struct ScanTaskManager {
    tasks: Mutex<HashMap<String, ScanTask>>,
    replay_buffer_size: usize,
    ttl: Duration,
}

impl ScanTaskManager {
    pub fn new(replay_buffer_size: usize, ttl: Duration) -> Self {
        Self { tasks: Mutex::new(HashMap::new()), replay_buffer_size, ttl }
    }

    /// Subscribes to `producer` independently of any caller-side subscriber:
    /// every event it yields is buffered and broadcast as it arrives. The
    /// producer runs to completion even if no one ever calls
    /// [`Self::subscribe_scan`].
    pub async fn start_scan<S>(self: Arc<Self>, scan_id: ScanId, mut producer: S)
    where
        S: Stream<Item = ScanEventRecord> + Send + Unpin + 'static,
    {
        let key = scan_id.as_str().to_string();
        {
            let mut tasks = self.tasks.lock().await;
            tasks.entry(key.clone()).or_insert_with(|| ScanTask::new(self.replay_buffer_size));
        }

        let manager = Arc::clone(&self);
        let producer_scan_id = scan_id.clone();
        let handle = tokio::spawn(async move {
            while let Some(event) = producer.next().await {
                manager.record_event(&producer_scan_id, event).await;
            }
            tracing::info!(scan_id = %producer_scan_id, "scan producer stream ended");
        });

        let mut tasks = self.tasks.lock().await;
        if let Some(task) = tasks.get_mut(&key) {
            task.producer_handle = Some(handle);
        }
    }

    /// Records and broadcasts a single event. Orchestrators that already
    /// hold a `ScanEventRecord` (rather than a `Stream` of them) call this
    /// directly instead of routing through [`Self::start_scan`].
    pub async fn record_event(&self, scan_id: &ScanId, event: ScanEventRecord) {
        let mut tasks = self.tasks.lock().await;
        let task = tasks.entry(scan_id.as_str().to_string()).or_insert_with(|| ScanTask::new(self.replay_buffer_size));
        task.push(event);
    }

    /// Registers a cancellation handle for `scan_id`'s producer, creating the
    /// task entry if this is its first event. For callers that drive a scan
    /// by calling [`Self::record_event`] directly (rather than handing a
    /// `Stream` to [`Self::start_scan`]) but still want `pause_scan` to be
    /// able to cancel it.
    pub async fn register_producer(&self, scan_id: &ScanId, handle: tokio::task::JoinHandle<()>) {
        let mut tasks = self.tasks.lock().await;
        let task = tasks.entry(scan_id.as_str().to_string()).or_insert_with(|| ScanTask::new(self.replay_buffer_size));
        task.producer_handle = Some(handle);
    }

    /// Broadcasts a keepalive to current subscribers without touching the
    /// replay buffer: keepalives are never persisted or counted (§4.8).
    pub async fn publish_keepalive(&self, scan_id: &ScanId, event: ScanEventRecord) {
        let mut tasks = self.tasks.lock().await;
        let task = tasks.entry(scan_id.as_str().to_string()).or_insert_with(|| ScanTask::new(self.replay_buffer_size));
        let _ = task.tx.send(event);
    }

    /// True if at least one subscriber is currently attached to `scan_id`'s
    /// broadcast channel. Used to gate keepalive publication to "while a
    /// subscriber is connected" (§4.8) rather than for the scan's whole
    /// lifetime.
    pub async fn has_subscriber(&self, scan_id: &ScanId) -> bool {
        self.tasks.lock().await.get(scan_id.as_str()).map(|task| task.tx.receiver_count() > 0).unwrap_or(false)
    }

    /// Returns a stream that first replays the buffer, then follows live
    /// events. Fails with `ScanNotFound` if `scan_id` is unknown or expired.
    pub async fn subscribe_scan(&self, scan_id: &ScanId) -> Result<impl Stream<Item = ScanEventRecord>, ScanNotFound> {
        let tasks = self.tasks.lock().await;
        let task = tasks.get(scan_id.as_str()).ok_or_else(|| ScanNotFound(scan_id.clone()))?;
        let replayed: VecDeque<ScanEventRecord> = task.replay.clone();
        let live = BroadcastStream::new(task.tx.subscribe()).filter_map(|r| r.ok());
        Ok(tokio_stream::iter(replayed).chain(live))
    }

    /// Cancels the producer subscription for `scan_id`. Returns `true` if a
    /// live task was cancelled. Pause is definitive for this run; resuming a
    /// scan starts a fresh task via the resume orchestrator.
    pub async fn pause_scan(&self, scan_id: &ScanId) -> bool {
        let mut tasks = self.tasks.lock().await;
        match tasks.get_mut(scan_id.as_str()) {
            Some(task) => match task.producer_handle.take() {
                Some(handle) => {
                    handle.abort();
                    true
                }
                None => false,
            },
            None => false,
        }
    }

    /// Removes tasks whose last event predates the configured TTL. Called
    /// periodically by a background sweep; exposed directly for tests.
    pub async fn sweep_expired(&self) -> Vec<ScanId> {
        let mut tasks = self.tasks.lock().await;
        let ttl = self.ttl;
        let expired: Vec<String> =
            tasks.iter().filter(|(_, task)| task.last_event_at.elapsed() >= ttl).map(|(key, _)| key.clone()).collect();
        for key in &expired {
            tasks.remove(key);
        }
        expired.into_iter().map(ScanId::new).collect()
    }

    pub async fn is_tracked(&self, scan_id: &ScanId) -> bool {
        self.tasks.lock().await.contains_key(scan_id.as_str())
    }
}

impl Default for ScanTaskManager {
    fn default() -> Self {
        Self::new(DEFAULT_REPLAY_BUFFER, DEFAULT_TTL)
    }
}
