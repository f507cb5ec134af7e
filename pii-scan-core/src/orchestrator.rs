//! Scan Orchestrator (C8): the spaces -> pages -> attachments walk, emitting
//! events in the order fixed by §4.8 and persisting every step through C1,
//! C2, C5 and C6.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use crate::checkpoint::SharedCheckpointStore;
use crate::config::ScanConfig;
use crate::context::{ContextBounds, DetectionSpan};
use crate::detector::{DetectorGateway, PiiDetector};
use crate::error::{CheckpointError, OrchestratorError};
use crate::event_factory;
use crate::event_store::SharedEventStore;
use crate::ports::{is_supported_attachment, AttachmentInfo, AttachmentTextExtractor, DocumentationClient};
use crate::severity::scan_progress;
use crate::task_manager::ScanTaskManager;
use crate::types::{CheckpointStatus, DetectedEntity, Initiator, ScanEventRecord, ScanId, SpaceCheckpoint, SpaceKey};

const MAX_DETECTOR_RETRIES: u32 = 3;
const RETRY_BASE_DELAY: Duration = Duration::from_millis(100);

/// Resume-aware cursor into a space: skip pages up to (and attachments
/// within the boundary page up to) the last processed ones.
#[derive(Clone, Debug, Default)]
pub(crate) struct ResumeCursor {
    pub last_processed_page_id: Option<String>,
    pub last_processed_attachment_name: Option<String>,
}

pub struct ScanOrchestrator<C, X, D> {
    docs: Arc<C>,
    extractor: Arc<X>,
    detector: Arc<DetectorGateway<D>>,
    event_store: SharedEventStore,
    checkpoint_store: SharedCheckpointStore,
    task_manager: Arc<ScanTaskManager>,
    config: ScanConfig,
}

impl<C, X, D> ScanOrchestrator<C, X, D>
where
    C: DocumentationClient + 'static,
    X: AttachmentTextExtractor + 'static,
    D: PiiDetector + 'static,
{
    pub fn new(
        docs: Arc<C>,
        extractor: Arc<X>,
        detector: D,
        event_store: SharedEventStore,
        checkpoint_store: SharedCheckpointStore,
        task_manager: Arc<ScanTaskManager>,
        config: ScanConfig,
    ) -> Self {
        let detector = Arc::new(DetectorGateway::new(detector, config.detector_threshold, config.detector_timeout));
        Self { docs, extractor, detector, event_store, checkpoint_store, task_manager, config }
    }

    /// Runs a fresh scan end to end. Every space is entered, regardless of
    /// any checkpoint left over from a prior run with this `scanId`.
    pub async fn run_scan(self: Arc<Self>, scan_id: ScanId) -> Result<(), OrchestratorError> {
        self.run(scan_id, None).await
    }

    /// Runs the same walk as [`Self::run_scan`], but loads the latest
    /// checkpoint for each space first: a `COMPLETED` space is skipped
    /// entirely (no `start`/`complete`); other spaces resume from their
    /// recorded cursor (C9).
    pub(crate) async fn run_resume(self: Arc<Self>, scan_id: ScanId) -> Result<(), OrchestratorError> {
        self.run(scan_id, Some(())).await
    }

    /// Runs [`Self::run_scan`] in the background and registers its join
    /// handle with the task manager, so `ScanTaskManager::pause_scan` can
    /// cancel it mid-walk. Returns immediately; a failed run only surfaces
    /// as a `scanError` event or a WARN log, never a panic.
    pub async fn spawn_scan(self: Arc<Self>, scan_id: ScanId) {
        let task_manager = Arc::clone(&self.task_manager);
        let running_scan_id = scan_id.clone();
        let handle = tokio::spawn(async move {
            if let Err(err) = self.run_scan(scan_id).await {
                tracing::warn!(error = %err, "scan run failed");
            }
        });
        task_manager.register_producer(&running_scan_id, handle).await;
    }

    /// Background-task counterpart to [`Self::run_resume`]; see
    /// [`Self::spawn_scan`].
    pub(crate) async fn spawn_resume(self: Arc<Self>, scan_id: ScanId) {
        let task_manager = Arc::clone(&self.task_manager);
        let running_scan_id = scan_id.clone();
        let handle = tokio::spawn(async move {
            if let Err(err) = self.run_resume(scan_id).await {
                tracing::warn!(error = %err, "scan resume failed");
            }
        });
        task_manager.register_producer(&running_scan_id, handle).await;
    }

    async fn run(self: Arc<Self>, scan_id: ScanId, resuming: Option<()>) -> Result<(), OrchestratorError> {
        let keepalive_handle = self.spawn_keepalive(scan_id.clone());

        let result = self.run_inner(&scan_id, resuming.is_some()).await;

        keepalive_handle.abort();
        result
    }

    /// Ticks every `keepalive_interval` for the scan's lifetime, but only
    /// publishes while `ScanTaskManager::has_subscriber` reports a live
    /// subscriber (§4.8): keepalives exist to hold a subscriber's connection
    /// open, not to do work when nobody is listening.
    fn spawn_keepalive(&self, scan_id: ScanId) -> tokio::task::JoinHandle<()> {
        let manager = Arc::clone(&self.task_manager);
        let interval = self.config.keepalive_interval;
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await; // first tick fires immediately; skip it
            loop {
                ticker.tick().await;
                if manager.has_subscriber(&scan_id).await {
                    manager.publish_keepalive(&scan_id, event_factory::keepalive(&scan_id)).await;
                }
            }
        })
    }

    async fn run_inner(self: Arc<Self>, scan_id: &ScanId, resuming: bool) -> Result<(), OrchestratorError> {
        self.emit(event_factory::multi_start(scan_id)).await;

        let spaces = self.docs.list_spaces().await.map_err(|e| OrchestratorError::ListSpacesFailed(e.to_string()))?;

        for space_key in spaces {
            Arc::clone(&self).run_space(scan_id, space_key, resuming).await?;
        }

        self.emit(event_factory::multi_complete(scan_id)).await;
        Ok(())
    }

    async fn run_space(self: Arc<Self>, scan_id: &ScanId, space_key: SpaceKey, resuming: bool) -> Result<(), OrchestratorError> {
        let existing = self.checkpoint_store.find_by_scan_and_space(scan_id, &space_key).await;

        if resuming {
            if let Some(cp) = &existing {
                if cp.status == CheckpointStatus::Completed {
                    return Ok(());
                }
            }
        }

        let cursor = if resuming {
            existing.as_ref().map(|cp| ResumeCursor {
                last_processed_page_id: cp.last_processed_page_id.clone(),
                last_processed_attachment_name: cp.last_processed_attachment_name.clone(),
            })
        } else {
            None
        };

        self.emit(event_factory::space_start(scan_id, space_key.clone())).await;

        // Paused/Failed -> Running is only valid for a user-initiated
        // resume; a never-started or already-running space transitions (or
        // idempotently re-transitions) as the system would for a fresh run.
        let initiator = match existing.as_ref().map(|cp| cp.status) {
            Some(CheckpointStatus::Paused) | Some(CheckpointStatus::Failed) => Initiator::User,
            _ => Initiator::System,
        };
        let mut checkpoint = existing.clone().unwrap_or_else(|| SpaceCheckpoint::new_not_started(scan_id.clone(), space_key.clone()));
        checkpoint.status = CheckpointStatus::Running;
        let mut checkpoint = self.upsert_checkpoint(checkpoint, initiator).await?;

        let pages = self.docs.list_pages(&space_key).await.map_err(|e| OrchestratorError::ListSpacesFailed(e.to_string()))?;
        let pages_total = pages.len() as u64;
        let pages: Vec<_> = pages
            .into_iter()
            .filter(|p| match &cursor {
                Some(c) => match &c.last_processed_page_id {
                    Some(last) => p.page_id.as_str() > last.as_str(),
                    None => true,
                },
                None => true,
            })
            .collect();

        let semaphore = Arc::new(Semaphore::new(self.config.page_concurrency.max(1)));
        let mut join_set = JoinSet::new();
        let pages_done_counter = Arc::new(AtomicU64::new(pages_total - pages.len() as u64));

        for page in pages {
            let permit = Arc::clone(&semaphore).acquire_owned().await.expect("semaphore not closed");
            let this = Arc::clone(&self);
            let scan_id = scan_id.clone();
            let space_key = space_key.clone();
            let attachment_cursor = cursor.as_ref().filter(|c| c.last_processed_page_id.as_deref() == Some(page.page_id.as_str())).cloned();
            let pages_done_counter = Arc::clone(&pages_done_counter);
            join_set.spawn(async move {
                let _permit = permit;
                this.run_page(&scan_id, space_key, page.page_id, page.title, attachment_cursor, pages_total, pages_done_counter).await
            });
        }

        while let Some(joined) = join_set.join_next().await {
            match joined {
                Ok(Ok(())) => {}
                Ok(Err(message)) => {
                    self.emit(event_factory::scan_error(scan_id, Some(space_key.clone()), None, message)).await;
                }
                Err(join_error) => {
                    self.emit(event_factory::scan_error(scan_id, Some(space_key.clone()), None, join_error.to_string())).await;
                }
            }
            let pages_done = pages_done_counter.fetch_add(1, Ordering::SeqCst) + 1;
            checkpoint.progress_percentage = scan_progress(pages_done, pages_total, 0, 1);
        }

        // Every page in this space has been joined, so every concurrent
        // `record_page_progress` call it made has landed; re-fetch to adopt
        // the version it bumped instead of presenting the stale version this
        // function observed from the `Running` upsert above.
        let mut checkpoint = self.checkpoint_store.find_by_scan_and_space(scan_id, &space_key).await.unwrap_or(checkpoint);
        checkpoint.status = CheckpointStatus::Completed;
        checkpoint.progress_percentage = 100.0;
        let checkpoint = self.upsert_checkpoint(checkpoint, Initiator::System).await?;

        self.emit(event_factory::space_complete(scan_id, space_key, checkpoint.progress_percentage)).await;
        Ok(())
    }

    /// Returns `Err(message)` only for structural page-level failures
    /// (fetch/list errors); detector failures are folded into a
    /// `scanError` event and the page still completes (§7).
    async fn run_page(
        self: Arc<Self>,
        scan_id: &ScanId,
        space_key: SpaceKey,
        page_id: String,
        page_title: String,
        attachment_cursor: Option<ResumeCursor>,
        pages_total: u64,
        pages_done_counter: Arc<AtomicU64>,
    ) -> Result<(), String> {
        self.emit(event_factory::page_start(scan_id, space_key.clone(), page_id.clone(), page_title)).await;

        let content = self.docs.fetch_page_text(&page_id).await.map_err(|e| e.to_string())?;
        let bounds = ContextBounds { max_length: self.config.context_max_length, side_length: self.config.context_side_length };

        let (entities_raw, masked_content) = match self.analyze_with_retry(&content).await {
            Ok(result) => result,
            Err(exception) => {
                self.emit(event_factory::scan_error(scan_id, Some(space_key.clone()), Some(page_id.clone()), exception.to_string())).await;
                (Vec::new(), None)
            }
        };

        let spans: Vec<DetectionSpan> = entities_raw.iter().map(|d| DetectionSpan { start: d.start, end: d.end, pii_type: d.pii_type }).collect();
        let mut entities = Vec::with_capacity(entities_raw.len());
        for detection in &entities_raw {
            match event_factory::build_detected_entity(&content, &spans, detection, self.config.kek.as_ref(), bounds) {
                Ok(entity) => entities.push(entity),
                Err(err) => {
                    tracing::warn!(%page_id, error = %err, "dropping a detection whose envelope encryption failed");
                }
            }
        }

        let attachments = self.docs.list_attachments(&page_id).await.map_err(|e| e.to_string())?;
        let attachments: Vec<_> = attachments
            .into_iter()
            .filter(|a| match &attachment_cursor {
                Some(c) => match &c.last_processed_attachment_name {
                    Some(last) => a.name.as_str() > last.as_str(),
                    None => true,
                },
                None => true,
            })
            .collect();
        let attachments_total = attachments.len() as u64;

        // Pages finished by siblings (or skipped by resume) before this
        // page's own content/attachments are accounted for.
        let pages_done = pages_done_counter.load(Ordering::SeqCst);
        let item_progress = scan_progress(pages_done, pages_total, 0, attachments_total.max(1));
        self.emit(event_factory::item(scan_id, space_key.clone(), page_id.clone(), masked_content, entities, item_progress)).await;

        let semaphore = Arc::new(Semaphore::new(self.config.attachment_concurrency.max(1)));
        let mut join_set = JoinSet::new();
        let attachments_done_counter = Arc::new(AtomicU64::new(0));
        for attachment in attachments {
            let permit = Arc::clone(&semaphore).acquire_owned().await.expect("semaphore not closed");
            let this = Arc::clone(&self);
            let scan_id = scan_id.clone();
            let space_key = space_key.clone();
            let page_id = page_id.clone();
            let attachments_done_counter = Arc::clone(&attachments_done_counter);
            join_set.spawn(async move {
                let _permit = permit;
                this.run_attachment(&scan_id, space_key, page_id, attachment, pages_done, pages_total, attachments_total, attachments_done_counter).await
            });
        }
        while let Some(joined) = join_set.join_next().await {
            if let Err(join_error) = joined {
                tracing::warn!(error = %join_error, "attachment worker panicked");
            }
        }

        self.record_page_progress(scan_id, &space_key, &page_id).await;
        let page_complete_progress = scan_progress(pages_done + 1, pages_total, 0, 1);
        self.emit(event_factory::page_complete(scan_id, space_key, page_id, page_complete_progress)).await;
        Ok(())
    }

    /// Advances `lastProcessedPageId` so a pause right after this completes
    /// resumes past it. Retries on a CAS conflict from a sibling page
    /// completing concurrently in the same space; does not track
    /// `lastProcessedAttachmentName` within the boundary page, so a pause
    /// mid-page re-walks that page's attachments on resume.
    async fn record_page_progress(&self, scan_id: &ScanId, space_key: &SpaceKey, page_id: &str) {
        for _ in 0..3 {
            let Some(mut cp) = self.checkpoint_store.find_by_scan_and_space(scan_id, space_key).await else { return };
            let advance = cp.last_processed_page_id.as_deref().map(|last| page_id > last).unwrap_or(true);
            if !advance {
                return;
            }
            cp.last_processed_page_id = Some(page_id.to_string());
            match self.checkpoint_store.upsert(cp, Initiator::System).await {
                Ok(_) => return,
                Err(CheckpointError::ConcurrentCheckpointUpdate { .. }) => continue,
                Err(err) => {
                    tracing::warn!(%scan_id, %space_key, error = %err, "could not record page progress");
                    return;
                }
            }
        }
    }

    async fn run_attachment(
        self: Arc<Self>,
        scan_id: &ScanId,
        space_key: SpaceKey,
        page_id: String,
        attachment: AttachmentInfo,
        pages_done: u64,
        pages_total: u64,
        attachments_total: u64,
        attachments_done_counter: Arc<AtomicU64>,
    ) {
        let attachments_done = attachments_done_counter.fetch_add(1, Ordering::SeqCst) + 1;

        if !is_supported_attachment(&attachment) {
            return;
        }

        let progress = scan_progress(pages_done, pages_total, attachments_done, attachments_total.max(1));
        let attachment_type = attachment.name.rsplit('.').next().unwrap_or("").to_string();
        let bytes = match self.docs.fetch_attachment_bytes(&page_id, &attachment.name).await {
            Ok(bytes) => bytes,
            Err(err) => {
                self.emit(event_factory::scan_error(scan_id, Some(space_key), Some(page_id), err.to_string())).await;
                return;
            }
        };

        let text = self.extractor.extract(&attachment, &bytes).await;
        let entities: Vec<DetectedEntity> = match &text {
            Some(text) => {
                let bounds = ContextBounds { max_length: self.config.context_max_length, side_length: self.config.context_side_length };
                match self.analyze_with_retry(text).await {
                    Ok((detections, _)) => {
                        let spans: Vec<DetectionSpan> = detections.iter().map(|d| DetectionSpan { start: d.start, end: d.end, pii_type: d.pii_type }).collect();
                        detections
                            .iter()
                            .filter_map(|d| event_factory::build_detected_entity(text, &spans, d, self.config.kek.as_ref(), bounds).ok())
                            .collect()
                    }
                    Err(exception) => {
                        self.emit(event_factory::scan_error(scan_id, Some(space_key.clone()), Some(page_id.clone()), exception.to_string())).await;
                        Vec::new()
                    }
                }
            }
            None => Vec::new(),
        };

        self.emit(event_factory::attachment_item(scan_id, space_key, page_id, attachment.name, attachment_type, entities, progress)).await;
    }

    async fn analyze_with_retry(&self, content: &str) -> Result<(Vec<crate::detector::SensitiveData>, Option<String>), crate::error::PiiDetectionException> {
        let mut attempt = 0;
        loop {
            match self.detector.analyze_with_masked_content(content).await {
                Ok(result) => return Ok(result),
                Err(exception) if exception.is_transient() && attempt < MAX_DETECTOR_RETRIES => {
                    tokio::time::sleep(RETRY_BASE_DELAY * 2u32.pow(attempt)).await;
                    attempt += 1;
                }
                Err(exception) => return Err(exception),
            }
        }
    }

    async fn upsert_checkpoint(&self, checkpoint: SpaceCheckpoint, initiator: Initiator) -> Result<SpaceCheckpoint, CheckpointError> {
        self.checkpoint_store.upsert(checkpoint, initiator).await
    }

    async fn emit(&self, record: ScanEventRecord) -> ScanEventRecord {
        let scan_id = record.scan_id.clone();
        let persisted = self.event_store.append(record).await;
        self.task_manager.record_event(&scan_id, persisted.clone()).await;
        persisted
    }
}
