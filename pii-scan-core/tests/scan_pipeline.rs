//! End-to-end walks of the orchestrator over fake ports: one page with a
//! single detection, overlapping detections on one line, an image-only
//! attachment, a detector timeout, and a pause/resume round trip.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use pii_envelope::Kek;
use pii_scan_core::detector::{DetectionResult, WireEntity};
use pii_scan_core::error::PiiDetectionException;
use pii_scan_core::ports::{AttachmentInfo, AttachmentTextExtractor, DocumentationClient, DocumentationClientError, PageInfo};
use pii_scan_core::{
    CheckpointStore, EventType, InMemoryCheckpointStore, InMemoryEventStore, PiiDetector, ResumeOrchestrator, ScanConfig, ScanId,
    ScanOrchestrator, ScanTaskManager, SpaceKey,
};

fn test_config() -> ScanConfig {
    ScanConfig {
        kek: Arc::new(Kek::from_bytes([5u8; 32])),
        detector_threshold: 0.5,
        detector_timeout: Duration::from_millis(200),
        page_concurrency: 1,
        attachment_concurrency: 2,
        replay_buffer_size: 100,
        scan_ttl: Duration::from_secs(3600),
        keepalive_interval: Duration::from_secs(15),
        context_max_length: 240,
        context_side_length: 120,
    }
}

#[derive(Default)]
struct FakeDocs {
    spaces: Vec<SpaceKey>,
    pages: HashMap<String, Vec<PageInfo>>,
    contents: HashMap<String, String>,
    attachments: HashMap<String, Vec<AttachmentInfo>>,
    bytes: HashMap<(String, String), Vec<u8>>,
    gates: HashMap<String, Arc<tokio::sync::Semaphore>>,
}

impl FakeDocs {
    fn gate(&self, page_id: &str) -> Option<Arc<tokio::sync::Semaphore>> {
        self.gates.get(page_id).cloned()
    }
}

#[async_trait]
impl DocumentationClient for FakeDocs {
    async fn list_spaces(&self) -> Result<Vec<SpaceKey>, DocumentationClientError> {
        Ok(self.spaces.clone())
    }

    async fn list_pages(&self, space_key: &SpaceKey) -> Result<Vec<PageInfo>, DocumentationClientError> {
        Ok(self.pages.get(space_key.as_str()).cloned().unwrap_or_default())
    }

    async fn list_attachments(&self, page_id: &str) -> Result<Vec<AttachmentInfo>, DocumentationClientError> {
        Ok(self.attachments.get(page_id).cloned().unwrap_or_default())
    }

    async fn fetch_page_text(&self, page_id: &str) -> Result<String, DocumentationClientError> {
        if let Some(gate) = self.gate(page_id) {
            gate.acquire().await.expect("gate not closed").forget();
        }
        self.contents.get(page_id).cloned().ok_or_else(|| DocumentationClientError(format!("no such page {page_id}")))
    }

    async fn fetch_attachment_bytes(&self, page_id: &str, name: &str) -> Result<Vec<u8>, DocumentationClientError> {
        Ok(self.bytes.get(&(page_id.to_string(), name.to_string())).cloned().unwrap_or_default())
    }

    async fn modified_pages_since(&self, _space_key: &SpaceKey, _since: chrono::DateTime<chrono::Utc>) -> Result<Vec<PageInfo>, DocumentationClientError> {
        Ok(Vec::new())
    }

    async fn modified_attachments_since(
        &self,
        _space_key: &SpaceKey,
        _since: chrono::DateTime<chrono::Utc>,
    ) -> Result<Vec<AttachmentInfo>, DocumentationClientError> {
        Ok(Vec::new())
    }
}

#[derive(Default)]
struct FakeExtractor {
    extracted: HashMap<String, Option<String>>,
}

#[async_trait]
impl AttachmentTextExtractor for FakeExtractor {
    async fn extract(&self, info: &AttachmentInfo, _bytes: &[u8]) -> Option<String> {
        self.extracted.get(&info.name).cloned().flatten()
    }
}

/// Finds every listed needle verbatim in the content; never misses, never
/// hallucinates, so tests can assert exact offsets.
struct SubstringDetector {
    patterns: Vec<(&'static str, &'static str)>,
}

#[async_trait]
impl PiiDetector for SubstringDetector {
    async fn analyze(&self, content: &str, _threshold: f64, _deadline: Duration) -> Result<DetectionResult, PiiDetectionException> {
        let mut entities = Vec::new();
        for (needle, wire_type) in &self.patterns {
            if let Some(start) = content.find(needle) {
                entities.push(WireEntity { text: (*needle).to_string(), pii_type_raw: (*wire_type).to_string(), start, end: start + needle.len(), score: 0.9 });
            }
        }
        Ok(DetectionResult { entities, summary: Default::default(), masked_content: None })
    }
}

struct AlwaysTimesOut;

#[async_trait]
impl PiiDetector for AlwaysTimesOut {
    async fn analyze(&self, _content: &str, _threshold: f64, _deadline: Duration) -> Result<DetectionResult, PiiDetectionException> {
        Err(PiiDetectionException::Timeout)
    }
}

fn page(id: &str, title: &str) -> PageInfo {
    PageInfo { page_id: id.to_string(), title: title.to_string() }
}

async fn events_for(event_store: &InMemoryEventStore, scan_id: &ScanId) -> Vec<pii_scan_core::ScanEventRecord> {
    pii_scan_core::EventStore::list_by_scan_ordered(event_store, scan_id).await
}

#[tokio::test]
async fn single_page_with_one_email_is_detected_and_masked() {
    let mut docs = FakeDocs::default();
    docs.spaces.push(SpaceKey::new("DEMO"));
    docs.pages.insert("DEMO".into(), vec![page("p1", "Welcome")]);
    docs.contents.insert("p1".into(), "Contact: alice@example.com for details".into());

    let detector = SubstringDetector { patterns: vec![("alice@example.com", "EMAIL")] };
    let event_store = Arc::new(InMemoryEventStore::new());
    let checkpoint_store: pii_scan_core::SharedCheckpointStore = Arc::new(InMemoryCheckpointStore::new());
    let task_manager = Arc::new(ScanTaskManager::default());

    let orchestrator = Arc::new(ScanOrchestrator::new(
        Arc::new(docs),
        Arc::new(FakeExtractor::default()),
        detector,
        event_store.clone() as pii_scan_core::SharedEventStore,
        checkpoint_store,
        task_manager,
        test_config(),
    ));

    let scan_id = ScanId::new("scan-s1");
    Arc::clone(&orchestrator).run_scan(scan_id.clone()).await.unwrap();

    let events = events_for(&event_store, &scan_id).await;
    let types: Vec<EventType> = events.iter().map(|e| e.event_type).collect();
    assert_eq!(
        types,
        vec![
            EventType::MultiStart,
            EventType::Start,
            EventType::PageStart,
            EventType::Item,
            EventType::PageComplete,
            EventType::Complete,
            EventType::MultiComplete,
        ]
    );

    let item = events.iter().find(|e| e.event_type == EventType::Item).unwrap();
    assert_eq!(item.detected_entities.len(), 1);
    let entity = &item.detected_entities[0];
    assert_eq!(entity.masked_context, "Contact: [EMAIL] for details");
    assert!(entity.sensitive_value.starts_with("ENC:v1:"));
    assert!(entity.sensitive_context.starts_with("ENC:v1:"));
    assert_eq!(item.severity_counts.medium, 1);
    assert_eq!(item.severity_counts.high, 0);

    // eventSeq is gap-free and strictly increasing.
    for pair in events.windows(2) {
        assert_eq!(pair[1].event_seq, pair[0].event_seq + 1);
    }
}

#[tokio::test]
async fn two_detections_on_one_line_both_mask_the_other() {
    let mut docs = FakeDocs::default();
    docs.spaces.push(SpaceKey::new("DEMO"));
    docs.pages.insert("DEMO".into(), vec![page("p1", "Contacts")]);
    docs.contents.insert("p1".into(), "SSN 123-45-6789 phone +41 22 555 0000".into());

    let detector = SubstringDetector { patterns: vec![("123-45-6789", "SSN"), ("+41 22 555 0000", "PHONE")] };
    let event_store = Arc::new(InMemoryEventStore::new());
    let orchestrator = Arc::new(ScanOrchestrator::new(
        Arc::new(docs),
        Arc::new(FakeExtractor::default()),
        detector,
        event_store.clone() as pii_scan_core::SharedEventStore,
        Arc::new(InMemoryCheckpointStore::new()) as pii_scan_core::SharedCheckpointStore,
        Arc::new(ScanTaskManager::default()),
        test_config(),
    ));

    let scan_id = ScanId::new("scan-s2");
    Arc::clone(&orchestrator).run_scan(scan_id.clone()).await.unwrap();

    let events = events_for(&event_store, &scan_id).await;
    let item = events.iter().find(|e| e.event_type == EventType::Item).unwrap();
    assert_eq!(item.detected_entities.len(), 2);
    for entity in &item.detected_entities {
        assert_eq!(entity.masked_context, "SSN [SSN] phone [PHONE]");
    }
    assert_eq!(item.severity_counts.high, 1);
    assert_eq!(item.severity_counts.medium, 1);
}

#[tokio::test]
async fn image_only_attachment_yields_zero_detections_without_failing_the_page() {
    let mut docs = FakeDocs::default();
    docs.spaces.push(SpaceKey::new("DEMO"));
    docs.pages.insert("DEMO".into(), vec![page("p1", "Assets")]);
    docs.contents.insert("p1".into(), "no pii here".into());
    docs.attachments.insert(
        "p1".into(),
        vec![
            AttachmentInfo { name: "photo.png".into(), content_type: "image/png".into() },
            AttachmentInfo { name: "scan.pdf".into(), content_type: "application/pdf".into() },
        ],
    );
    docs.bytes.insert(("p1".into(), "scan.pdf".into()), vec![0u8; 4]);

    let mut extracted = HashMap::new();
    extracted.insert("scan.pdf".to_string(), None); // image-only PDF: no extractable text
    let extractor = FakeExtractor { extracted };

    let event_store = Arc::new(InMemoryEventStore::new());
    let orchestrator = Arc::new(ScanOrchestrator::new(
        Arc::new(docs),
        Arc::new(extractor),
        SubstringDetector { patterns: vec![] },
        event_store.clone() as pii_scan_core::SharedEventStore,
        Arc::new(InMemoryCheckpointStore::new()) as pii_scan_core::SharedCheckpointStore,
        Arc::new(ScanTaskManager::default()),
        test_config(),
    ));

    let scan_id = ScanId::new("scan-s3");
    Arc::clone(&orchestrator).run_scan(scan_id.clone()).await.unwrap();

    let events = events_for(&event_store, &scan_id).await;
    let attachment_events: Vec<_> = events.iter().filter(|e| e.event_type == EventType::AttachmentItem).collect();
    assert_eq!(attachment_events.len(), 1, "the unsupported photo.png must not produce an event at all");
    assert_eq!(attachment_events[0].attachment_name.as_deref(), Some("scan.pdf"));
    assert_eq!(attachment_events[0].attachment_type.as_deref(), Some("pdf"));
    assert!(attachment_events[0].detected_entities.is_empty());

    assert!(events.iter().any(|e| e.event_type == EventType::PageComplete));
    assert!(!events.iter().any(|e| e.event_type == EventType::ScanError));
}

#[tokio::test]
async fn detector_timeout_surfaces_as_scan_error_but_the_page_still_completes() {
    let mut docs = FakeDocs::default();
    docs.spaces.push(SpaceKey::new("DEMO"));
    docs.pages.insert("DEMO".into(), vec![page("p1", "Slow page")]);
    docs.contents.insert("p1".into(), "irrelevant content".into());

    let event_store = Arc::new(InMemoryEventStore::new());
    let orchestrator = Arc::new(ScanOrchestrator::new(
        Arc::new(docs),
        Arc::new(FakeExtractor::default()),
        AlwaysTimesOut,
        event_store.clone() as pii_scan_core::SharedEventStore,
        Arc::new(InMemoryCheckpointStore::new()) as pii_scan_core::SharedCheckpointStore,
        Arc::new(ScanTaskManager::default()),
        test_config(),
    ));

    let scan_id = ScanId::new("scan-s5");
    Arc::clone(&orchestrator).run_scan(scan_id.clone()).await.unwrap();

    let events = events_for(&event_store, &scan_id).await;
    let error_event = events.iter().find(|e| e.event_type == EventType::ScanError).expect("a scanError event for the timed-out page");
    assert!(error_event.error_message.as_deref().unwrap().contains("deadline"));

    let item = events.iter().find(|e| e.event_type == EventType::Item).unwrap();
    assert!(item.detected_entities.is_empty());
    assert!(events.iter().any(|e| e.event_type == EventType::PageComplete));
    assert!(events.iter().any(|e| e.event_type == EventType::MultiComplete));
}

#[tokio::test]
async fn pause_mid_scan_then_resume_skips_the_completed_page_and_finishes_the_rest() {
    let gate = Arc::new(tokio::sync::Semaphore::new(0));

    let mut docs = FakeDocs::default();
    docs.spaces.push(SpaceKey::new("DEMO"));
    docs.pages.insert("DEMO".into(), vec![page("p1", "First"), page("p2", "Second")]);
    docs.contents.insert("p1".into(), "no pii in page one".into());
    docs.contents.insert("p2".into(), "no pii in page two".into());
    docs.gates.insert("p2".into(), gate.clone());

    let event_store = Arc::new(InMemoryEventStore::new());
    let checkpoint_store = Arc::new(InMemoryCheckpointStore::new());
    let task_manager = Arc::new(ScanTaskManager::default());

    let orchestrator = Arc::new(ScanOrchestrator::new(
        Arc::new(docs),
        Arc::new(FakeExtractor::default()),
        SubstringDetector { patterns: vec![] },
        event_store.clone() as pii_scan_core::SharedEventStore,
        checkpoint_store.clone() as pii_scan_core::SharedCheckpointStore,
        task_manager.clone(),
        test_config(),
    ));

    let scan_id = ScanId::new("scan-s4");
    Arc::clone(&orchestrator).spawn_scan(scan_id.clone()).await;

    // p2's fetch is gated shut, so the run can only ever get as far as
    // completing p1 before it blocks; poll until that page_complete lands.
    let mut p1_done = false;
    for _ in 0..200 {
        let events = events_for(&event_store, &scan_id).await;
        if events.iter().any(|e| e.event_type == EventType::PageComplete && e.page_id.as_deref() == Some("p1")) {
            p1_done = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    assert!(p1_done, "page one never completed");

    assert!(task_manager.pause_scan(&scan_id).await, "pause_scan should have cancelled a live producer");

    let events_after_pause = events_for(&event_store, &scan_id).await;
    assert!(!events_after_pause.iter().any(|e| e.page_id.as_deref() == Some("p2")), "page two must not have contributed any event yet");

    // Resuming reuses the same scan id and should pick up exactly where the
    // checkpoint left off: p1 is skipped, p2 is processed.
    gate.add_permits(1);
    ResumeOrchestrator::new(Arc::clone(&orchestrator)).resume(scan_id.clone()).await.unwrap();

    let events = events_for(&event_store, &scan_id).await;
    let page_starts: Vec<_> = events.iter().filter(|e| e.event_type == EventType::PageStart).collect();
    assert_eq!(page_starts.len(), 1, "p1 must not be re-walked on resume");
    assert_eq!(page_starts[0].page_id.as_deref(), Some("p2"));

    let page_completes: Vec<_> = events.iter().filter(|e| e.event_type == EventType::PageComplete).map(|e| e.page_id.clone()).collect();
    assert_eq!(page_completes, vec![Some("p1".to_string()), Some("p2".to_string())]);

    let checkpoint = checkpoint_store.find_by_scan_and_space(&scan_id, &SpaceKey::new("DEMO")).await.unwrap();
    assert_eq!(checkpoint.status, pii_scan_core::CheckpointStatus::Completed);
}
